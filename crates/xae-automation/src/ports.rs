//! Boundary traits for the automation server's object model.
//!
//! The orchestrator only ever talks to these traits. On Windows the
//! [`com`](crate::com) module implements them against a live XAE shell;
//! tests implement them in memory. Every method is a blocking call into
//! the out-of-process server and may fail with a
//! [`ServerFault`](crate::AutomationError::ServerFault).

use std::path::Path;

use crate::Result;

/// Whatever can instantiate the automation root — the entry point into
/// the server's object model.
pub trait AutomationBackend {
    /// Instantiate the automation root. Fails when the server is not
    /// installed or the host platform has no automation runtime.
    fn instantiate_root(&self) -> Result<Box<dyn AutomationRoot>>;
}

/// The automation root: window visibility, UI suppression, and the
/// solution handle.
pub trait AutomationRoot {
    fn set_main_window_visible(&self, visible: bool) -> Result<()>;

    fn set_suppress_ui(&self, suppress: bool) -> Result<()>;

    fn solution(&self) -> Result<Box<dyn Solution>>;
}

/// The server's solution handle.
pub trait Solution {
    fn open(&self, path: &Path) -> Result<()>;

    /// Enumerate the member projects in server-reported order. The order
    /// is not guaranteed stable between runs.
    fn projects(&self) -> Result<Vec<Box<dyn Project>>>;
}

/// One member project of an opened solution.
pub trait Project {
    fn name(&self) -> Result<String>;

    /// The system-configuration capability, if the project's underlying
    /// object exposes it. `None` means the project cannot be built or
    /// activated through automation.
    fn system_manager(&self) -> Result<Option<Box<dyn SystemManager>>>;
}

/// The system-configuration capability of a target project: everything
/// needed to configure, build, activate, and start it.
pub trait SystemManager {
    fn lookup_tree_item(&self, key: &str) -> Result<Box<dyn TreeItem>>;

    fn build_target_platform(&self, platform: &str) -> Result<()>;

    fn activate_configuration(&self) -> Result<()>;

    fn start_restart_runtime(&self) -> Result<()>;

    fn is_runtime_started(&self) -> Result<bool>;
}

/// A node in the system manager's configuration tree.
pub trait TreeItem {
    /// The node's immediate children, each cast to a PLC project node.
    /// A child that fails the cast surfaces as a fault.
    fn children(&self) -> Result<Vec<Box<dyn PlcProject>>>;
}

/// A PLC project node whose boot behavior can be configured.
pub trait PlcProject {
    fn set_boot_autostart(&self, autostart: bool) -> Result<()>;
}
