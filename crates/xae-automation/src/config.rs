use std::time::Duration;

use serde::Deserialize;

// ---------------------------------------------------------------------------
// ActivateConfig
// ---------------------------------------------------------------------------

/// Settings for one activation run.
///
/// Every field has a default matching the stock XAE shell deployment, so
/// `ActivateConfig::default()` is a working configuration. The CLI layer
/// can load this from a YAML file and override individual fields from
/// flags or environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivateConfig {
    /// progID of the automation root to instantiate.
    #[serde(default = "default_prog_id")]
    pub prog_id: String,

    /// Lookup key of the PLC subtree under the system manager.
    #[serde(default = "default_plc_tree_key")]
    pub plc_tree_key: String,

    /// Target platform name passed to the build step.
    #[serde(default = "default_platform")]
    pub platform: String,

    /// How long to wait after opening the solution. The automation
    /// surface exposes no readiness signal for solution loading, so this
    /// is a fixed delay.
    #[serde(default = "default_load_wait_secs")]
    pub load_wait_secs: u64,

    /// Window within which the runtime must report started after a
    /// start/restart request.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,

    /// Total time the call filter keeps retrying "retry later"
    /// rejections before cancelling the pending call.
    #[serde(default = "default_retry_budget_secs")]
    pub retry_budget_secs: u64,

    /// Treat a runtime that never reports started as an error instead of
    /// logging and continuing.
    #[serde(default)]
    pub require_started: bool,

    /// Leave the shell's main window hidden.
    #[serde(default)]
    pub headless: bool,
}

fn default_prog_id() -> String {
    "TcXaeShell.DTE.17.0".to_string()
}

fn default_plc_tree_key() -> String {
    "TIPC".to_string()
}

fn default_platform() -> String {
    "TwinCAT RT (x64)".to_string()
}

fn default_load_wait_secs() -> u64 {
    60
}

fn default_start_timeout_secs() -> u64 {
    20
}

fn default_retry_budget_secs() -> u64 {
    300
}

impl Default for ActivateConfig {
    fn default() -> Self {
        Self {
            prog_id: default_prog_id(),
            plc_tree_key: default_plc_tree_key(),
            platform: default_platform(),
            load_wait_secs: default_load_wait_secs(),
            start_timeout_secs: default_start_timeout_secs(),
            retry_budget_secs: default_retry_budget_secs(),
            require_started: false,
            headless: false,
        }
    }
}

impl ActivateConfig {
    pub fn load_wait(&self) -> Duration {
        Duration::from_secs(self.load_wait_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn retry_budget(&self) -> Duration {
        Duration::from_secs(self.retry_budget_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_deployment() {
        let config = ActivateConfig::default();
        assert_eq!(config.prog_id, "TcXaeShell.DTE.17.0");
        assert_eq!(config.plc_tree_key, "TIPC");
        assert_eq!(config.platform, "TwinCAT RT (x64)");
        assert_eq!(config.load_wait(), Duration::from_secs(60));
        assert_eq!(config.start_timeout(), Duration::from_secs(20));
        assert!(!config.require_started);
        assert!(!config.headless);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config: ActivateConfig =
            serde_yaml::from_str("platform: \"TwinCAT RT (ARM)\"\nload_wait_secs: 5\n").unwrap();
        assert_eq!(config.platform, "TwinCAT RT (ARM)");
        assert_eq!(config.load_wait_secs, 5);
        assert_eq!(config.plc_tree_key, "TIPC");
        assert_eq!(config.start_timeout_secs, 20);
    }
}
