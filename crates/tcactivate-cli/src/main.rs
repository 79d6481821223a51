use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use xae_automation::{output, ActivateConfig, Orchestrator};

const USAGE: &str = "Usage: tcactivate <solution-file.sln> <project-name>";

#[derive(Parser)]
#[command(
    name = "tcactivate",
    about = "Build, activate, and start a TwinCAT PLC project through the XAE shell",
    version
)]
struct Cli {
    /// Solution file, resolved against the parent of the invoking directory
    #[arg(value_name = "solution-file.sln")]
    solution: String,

    /// Name of the project inside the solution
    #[arg(value_name = "project-name")]
    project: String,

    /// Optional YAML file with activation settings
    #[arg(long, env = "TCACTIVATE_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds to wait for the solution to finish loading
    #[arg(long, env = "TCACTIVATE_LOAD_WAIT_SECS")]
    load_wait_secs: Option<u64>,

    /// Seconds to wait for the runtime to report started
    #[arg(long, env = "TCACTIVATE_START_TIMEOUT_SECS")]
    start_timeout_secs: Option<u64>,

    /// Target platform to build for
    #[arg(long, env = "TCACTIVATE_PLATFORM")]
    platform: Option<String>,

    /// Lookup key of the PLC subtree
    #[arg(long, env = "TCACTIVATE_PLC_TREE_KEY")]
    plc_tree_key: Option<String>,

    /// Treat a runtime that never reports started as an error
    #[arg(long, env = "TCACTIVATE_REQUIRE_STARTED")]
    require_started: bool,

    /// Leave the XAE main window hidden
    #[arg(long, env = "TCACTIVATE_HEADLESS")]
    headless: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                print!("{err}");
                return ExitCode::SUCCESS;
            }
            output::error(USAGE);
            return ExitCode::FAILURE;
        }
    };

    match run(cli) {
        Ok(()) => {
            output::success("Automation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            // The full chain: automation faults carry their server code.
            output::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let call_dir = std::env::current_dir().context("resolving the invoking directory")?;
    let project_dir = project_directory(&call_dir);
    let solution_path = project_dir.join(&cli.solution);

    output::info(format!("Call directory: {}", call_dir.display()));
    output::info(format!("Project directory: {}", project_dir.display()));
    output::info(format!("Solution: {}", solution_path.display()));
    output::info(format!("Target project name: {}", cli.project));

    let config = build_config(&cli)?;
    let backend = xae_automation::shell_backend(&config);
    Orchestrator::new(config).activate(&*backend, &solution_path, &cli.project)?;
    Ok(())
}

/// The conventional layout places the runner one level below the
/// checkout root, so the solution is taken relative to the parent of
/// the invoking directory. At a filesystem root there is no parent and
/// the invoking directory itself is used.
fn project_directory(call_dir: &Path) -> &Path {
    call_dir.parent().unwrap_or(call_dir)
}

fn build_config(cli: &Cli) -> anyhow::Result<ActivateConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_yaml::from_str(&text)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => ActivateConfig::default(),
    };

    if let Some(secs) = cli.load_wait_secs {
        config.load_wait_secs = secs;
    }
    if let Some(secs) = cli.start_timeout_secs {
        config.start_timeout_secs = secs;
    }
    if let Some(platform) = &cli.platform {
        config.platform = platform.clone();
    }
    if let Some(key) = &cli.plc_tree_key {
        config.plc_tree_key = key.clone();
    }
    if cli.require_started {
        config.require_started = true;
    }
    if cli.headless {
        config.headless = true;
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["tcactivate", "Foo.sln", "MyPlcProj"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn project_directory_is_the_parent_of_the_call_directory() {
        let call_dir = std::env::temp_dir().join("runner");
        assert_eq!(project_directory(&call_dir), std::env::temp_dir());
    }

    #[test]
    fn project_directory_at_filesystem_root_stays_put() {
        let root = PathBuf::from(std::path::MAIN_SEPARATOR.to_string());
        assert_eq!(project_directory(&root), root.as_path());
    }

    #[test]
    fn absolute_solution_argument_passes_through() {
        let absolute = std::env::temp_dir().join("Plant.sln");
        let joined = project_directory(Path::new("anywhere")).join(&absolute);
        assert_eq!(joined, absolute);
    }

    #[test]
    fn flags_override_config_file_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("activate.yaml");
        std::fs::write(&file, "load_wait_secs: 10\nplatform: \"TwinCAT RT (ARM)\"\n").unwrap();

        let cli = cli(&[
            "--config",
            file.to_str().unwrap(),
            "--load-wait-secs",
            "3",
            "--require-started",
        ]);
        let config = build_config(&cli).unwrap();

        assert_eq!(config.load_wait_secs, 3, "flag beats file");
        assert_eq!(config.platform, "TwinCAT RT (ARM)", "file beats default");
        assert!(config.require_started);
        assert_eq!(config.plc_tree_key, "TIPC", "untouched fields keep defaults");
    }

    #[test]
    fn defaults_apply_without_config_file() {
        let config = build_config(&cli(&[])).unwrap();
        assert_eq!(config.platform, "TwinCAT RT (x64)");
        assert_eq!(config.load_wait_secs, 60);
    }
}
