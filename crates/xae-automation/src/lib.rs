//! `xae-automation` — automation-client boundary and activation state
//! machine for the TwinCAT XAE shell.
//!
//! # Architecture
//!
//! ```text
//! ActivateConfig
//!     │
//!     ▼
//! Orchestrator    ← registers the call filter, then drives
//!     │             open → bind → configure → build → activate → start
//!     ▼
//! ports traits    ← the automation server's object model; one blocking
//!     │             cross-apartment call per operation
//!     ▼
//! com adapter     ← Windows-only IDispatch late binding plus the real
//!                   COM message filter; on other targets the backend
//!                   reports the automation root as unavailable
//! ```
//!
//! The shell can reject cross-apartment calls while it is busy; the
//! [`filter`] module holds the process-wide retry policy that keeps
//! those calls alive. The orchestrator owns the policy's lifetime: it is
//! registered before the first automation call and revoked on every exit
//! path.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use xae_automation::{ActivateConfig, Orchestrator};
//!
//! let config = ActivateConfig::default();
//! let backend = xae_automation::shell_backend(&config);
//! Orchestrator::new(config).activate(&*backend, Path::new("Plant.sln"), "MyPlcProj")?;
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod orchestrator;
pub mod output;
pub mod ports;

#[cfg(windows)]
pub mod com;

pub use config::ActivateConfig;
pub use error::{AutomationError, Result};
pub use orchestrator::Orchestrator;

/// Backend wired to the local XAE shell installation named by
/// `config.prog_id`.
pub fn shell_backend(config: &ActivateConfig) -> Box<dyn ports::AutomationBackend> {
    #[cfg(windows)]
    {
        Box::new(com::XaeShellBackend::new(&config.prog_id))
    }
    #[cfg(not(windows))]
    {
        Box::new(UnsupportedBackend {
            prog_id: config.prog_id.clone(),
        })
    }
}

#[cfg(not(windows))]
struct UnsupportedBackend {
    prog_id: String,
}

#[cfg(not(windows))]
impl ports::AutomationBackend for UnsupportedBackend {
    fn instantiate_root(&self) -> Result<Box<dyn ports::AutomationRoot>> {
        Err(AutomationError::RootUnavailable(format!(
            "automation server '{}' requires a Windows COM apartment",
            self.prog_id
        )))
    }
}
