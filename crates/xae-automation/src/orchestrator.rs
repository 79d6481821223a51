//! The activation state machine.
//!
//! One run drives the automation server from a cold start to a running
//! runtime: open the solution, bind the target project, arm
//! boot-autostart on its PLC nodes, then build → activate → start. All
//! transitions are forward-only; the only retries happen invisibly
//! inside the call filter while an individual blocking call waits.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ActivateConfig;
use crate::error::AutomationError;
use crate::filter::{self, CallFilter};
use crate::output;
use crate::ports::{
    AutomationBackend, AutomationRoot, PlcProject, Project, Solution, SystemManager, TreeItem,
};
use crate::Result;

/// Probe cadence while waiting for the runtime to report started.
const START_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The stages of one activation run, in execution order.
#[derive(Debug, Clone, Copy)]
enum Stage {
    SessionStarting,
    SolutionOpening,
    AwaitingLoad,
    Enumerating,
    Configuring,
    Building,
    ActivatingConfig,
    StartingRuntime,
    Settled,
}

/// Runs the end-to-end activation sequence exactly once per call.
pub struct Orchestrator {
    config: ActivateConfig,
}

impl Orchestrator {
    pub fn new(config: ActivateConfig) -> Self {
        Self { config }
    }

    /// Drive the full state machine against `backend`.
    ///
    /// The call filter is registered before the first automation call
    /// and revoked on every exit path, success or failure, via the
    /// guard. Reports success or the first fatal error; there is no
    /// partial-success mode.
    pub fn activate(
        &self,
        backend: &dyn AutomationBackend,
        solution_path: &Path,
        project_name: &str,
    ) -> Result<()> {
        let _guard = filter::register(CallFilter::new(self.config.retry_budget()));
        self.run(backend, solution_path, project_name)
    }

    fn run(
        &self,
        backend: &dyn AutomationBackend,
        solution_path: &Path,
        project_name: &str,
    ) -> Result<()> {
        self.enter(Stage::SessionStarting);
        let root = backend.instantiate_root()?;
        root.set_suppress_ui(false)?;
        root.set_main_window_visible(!self.config.headless)?;
        let solution = root.solution()?;

        self.enter(Stage::SolutionOpening);
        solution.open(solution_path)?;

        self.enter(Stage::AwaitingLoad);
        // The automation surface has no readiness signal for solution
        // loading; a fixed wait is the only synchronization available.
        thread::sleep(self.config.load_wait());

        self.enter(Stage::Enumerating);
        let manager = self.find_target(&*solution, project_name)?;

        self.enter(Stage::Configuring);
        let plc_root = manager.lookup_tree_item(&self.config.plc_tree_key)?;
        for node in plc_root.children()? {
            node.set_boot_autostart(true)?;
        }

        if let Err(err) = self.build_activate_start(&*manager) {
            output::error(format!("Build & activate failed: {err}"));
            return Err(err);
        }
        Ok(())
    }

    /// Scan every project in server order and bind the first exact name
    /// match. Later projects with the same name are logged and ignored;
    /// they are never bound.
    fn find_target(
        &self,
        solution: &dyn Solution,
        target: &str,
    ) -> Result<Box<dyn SystemManager>> {
        let mut bound: Option<Box<dyn SystemManager>> = None;
        for project in solution.projects()? {
            let name = project.name()?;
            output::info(format!("Found project: {name}"));
            if name != target {
                continue;
            }
            if bound.is_some() {
                warn!(project = %name, "duplicate project name; keeping the first match");
                continue;
            }
            let manager = project.system_manager()?.ok_or_else(|| {
                AutomationError::ConfigInterfaceUnavailable(target.to_string())
            })?;
            output::info(format!("{target} found!"));
            bound = Some(manager);
        }
        bound.ok_or_else(|| AutomationError::ProjectNotFound(target.to_string()))
    }

    /// A failed build must never proceed to activation, and a failed
    /// activation must never start the runtime.
    fn build_activate_start(&self, manager: &dyn SystemManager) -> Result<()> {
        self.enter(Stage::Building);
        manager.build_target_platform(&self.config.platform)?;

        self.enter(Stage::ActivatingConfig);
        manager.activate_configuration()?;

        self.enter(Stage::StartingRuntime);
        manager.start_restart_runtime()?;
        self.await_runtime_started(manager)?;

        self.enter(Stage::Settled);
        Ok(())
    }

    /// Probe the runtime's started flag until it reports true or the
    /// start window closes. A runtime that never reports started is
    /// logged and tolerated unless `require_started` is set.
    fn await_runtime_started(&self, manager: &dyn SystemManager) -> Result<()> {
        output::info("Waiting for the runtime to start...");
        let deadline = Instant::now() + self.config.start_timeout();
        loop {
            if manager.is_runtime_started()? {
                output::success("Runtime reports started.");
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(START_POLL_INTERVAL.min(deadline - now));
        }

        if self.config.require_started {
            return Err(AutomationError::RuntimeNotStarted(self.config.start_timeout()));
        }
        warn!(
            timeout = ?self.config.start_timeout(),
            "runtime did not report started within the window; continuing"
        );
        Ok(())
    }

    fn enter(&self, stage: Stage) {
        debug!(?stage, "entering stage");
        match stage {
            Stage::SessionStarting => output::step("Initializing the XAE shell..."),
            Stage::SolutionOpening => output::step("Opening solution..."),
            Stage::AwaitingLoad => output::info("Waiting for the solution to load..."),
            Stage::Building => output::step("Building the TwinCAT configuration..."),
            Stage::ActivatingConfig => output::step("Activating configuration..."),
            Stage::StartingRuntime => output::step("Starting the TwinCAT runtime..."),
            Stage::Enumerating | Stage::Configuring | Stage::Settled => {}
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
