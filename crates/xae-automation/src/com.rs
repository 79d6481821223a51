//! Windows COM adapter for the XAE shell.
//!
//! Everything the shell exposes is reached through `IDispatch` late
//! binding (`GetIDsOfNames` + `Invoke`), so no type library import is
//! needed at build time. This module also hosts the real COM message
//! filter object that forwards the runtime's callbacks to the portable
//! policy in [`filter`](crate::filter).
//!
//! All calls must originate from the single apartment thread that
//! instantiated the root.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use windows::core::{implement, BSTR, GUID, HSTRING, PCWSTR, VARIANT};
use windows::Win32::Foundation::HTASK;
use windows::Win32::System::Com::{
    CLSIDFromProgID, CoCreateInstance, CoInitializeEx, CoRegisterMessageFilter,
    CLSCTX_LOCAL_SERVER, COINIT_APARTMENTTHREADED, DISPATCH_FLAGS, DISPATCH_METHOD,
    DISPATCH_PROPERTYGET, DISPATCH_PROPERTYPUT, DISPPARAMS, EXCEPINFO, IDispatch,
    IMessageFilter, IMessageFilter_Impl, INTERFACEINFO, PENDINGMSG_WAITDEFPROCESS,
    SERVERCALL_ISHANDLED,
};

use crate::error::AutomationError;
use crate::filter::{CallFilter, IncomingDecision, PendingDecision, RejectKind, RetryDecision};
use crate::ports::{
    AutomationBackend, AutomationRoot, PlcProject, Project, Solution, SystemManager, TreeItem,
};
use crate::Result;

const LOCALE_USER_DEFAULT: u32 = 0x0400;
const DISPID_PROPERTYPUT: i32 = -3;

fn fault(context: &str, err: &windows::core::Error) -> AutomationError {
    AutomationError::ServerFault {
        code: err.code().0,
        message: format!("{context}: {}", err.message()),
    }
}

fn bstr(value: &str) -> VARIANT {
    VARIANT::from(BSTR::from(value))
}

// ---------------------------------------------------------------------------
// Late-bound dispatch wrapper
// ---------------------------------------------------------------------------

struct Dispatch {
    inner: IDispatch,
}

impl Dispatch {
    fn new(inner: IDispatch) -> Self {
        Self { inner }
    }

    fn dispid(&self, name: &str) -> Result<i32> {
        let wide: Vec<u16> = name.encode_utf16().chain(Some(0)).collect();
        let names = [PCWSTR(wide.as_ptr())];
        let mut dispid = 0i32;
        unsafe {
            self.inner.GetIDsOfNames(
                &GUID::zeroed(),
                names.as_ptr(),
                1,
                LOCALE_USER_DEFAULT,
                &mut dispid,
            )
        }
        .map_err(|e| fault(&format!("member '{name}' not exposed by server"), &e))?;
        Ok(dispid)
    }

    fn invoke(&self, name: &str, flags: DISPATCH_FLAGS, args: &[VARIANT]) -> Result<VARIANT> {
        let dispid = self.dispid(name)?;

        // Dispatch arguments travel in reverse order.
        let mut rgvarg: Vec<VARIANT> = args.iter().rev().cloned().collect();
        let mut named_put = DISPID_PROPERTYPUT;
        let is_put = flags == DISPATCH_PROPERTYPUT;
        let params = DISPPARAMS {
            rgvarg: rgvarg.as_mut_ptr(),
            rgdispidNamedArgs: if is_put {
                &mut named_put
            } else {
                std::ptr::null_mut()
            },
            cArgs: rgvarg.len() as u32,
            cNamedArgs: u32::from(is_put),
        };

        let mut result = VARIANT::default();
        let mut excep = EXCEPINFO::default();
        unsafe {
            self.inner.Invoke(
                dispid,
                &GUID::zeroed(),
                LOCALE_USER_DEFAULT,
                flags,
                &params,
                Some(&mut result as *mut _),
                Some(&mut excep as *mut _),
                None,
            )
        }
        .map_err(|e| {
            let description = excep.bstrDescription.to_string();
            if description.is_empty() {
                fault(&format!("call '{name}' failed"), &e)
            } else {
                AutomationError::ServerFault {
                    code: e.code().0,
                    message: format!("call '{name}' failed: {description}"),
                }
            }
        })?;
        Ok(result)
    }

    fn get(&self, name: &str) -> Result<VARIANT> {
        self.invoke(name, DISPATCH_PROPERTYGET, &[])
    }

    fn get_dispatch(&self, name: &str) -> Result<Dispatch> {
        let value = self.get(name)?;
        let inner = IDispatch::try_from(&value).map_err(|e| fault(name, &e))?;
        Ok(Dispatch::new(inner))
    }

    fn put(&self, name: &str, value: VARIANT) -> Result<()> {
        self.invoke(name, DISPATCH_PROPERTYPUT, &[value]).map(drop)
    }

    fn call(&self, name: &str, args: &[VARIANT]) -> Result<VARIANT> {
        self.invoke(name, DISPATCH_METHOD, args)
    }

    /// Walk a 1-based automation collection via its count property and
    /// item accessor.
    fn items(&self, count_prop: &str, item_method: &str) -> Result<Vec<Dispatch>> {
        let count = i32::try_from(&self.get(count_prop)?).map_err(|e| fault(count_prop, &e))?;
        let mut out = Vec::with_capacity(count.max(0) as usize);
        for index in 1..=count {
            let item = self.call(item_method, &[VARIANT::from(index)])?;
            let inner = IDispatch::try_from(&item).map_err(|e| fault(item_method, &e))?;
            out.push(Dispatch::new(inner));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Backend and object-model adapters
// ---------------------------------------------------------------------------

/// Backend that instantiates the XAE shell's automation root from its
/// progID.
pub struct XaeShellBackend {
    prog_id: String,
}

impl XaeShellBackend {
    pub fn new(prog_id: impl Into<String>) -> Self {
        Self {
            prog_id: prog_id.into(),
        }
    }
}

impl AutomationBackend for XaeShellBackend {
    fn instantiate_root(&self) -> Result<Box<dyn AutomationRoot>> {
        unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) }
            .ok()
            .map_err(|e| {
                AutomationError::RootUnavailable(format!(
                    "COM apartment initialization failed: {}",
                    e.message()
                ))
            })?;

        let prog = HSTRING::from(self.prog_id.as_str());
        let clsid = unsafe { CLSIDFromProgID(&prog) }.map_err(|e| {
            AutomationError::RootUnavailable(format!(
                "progID '{}' is not registered: {}",
                self.prog_id,
                e.message()
            ))
        })?;

        let inner: IDispatch =
            unsafe { CoCreateInstance(&clsid, None, CLSCTX_LOCAL_SERVER) }.map_err(|e| {
                AutomationError::RootUnavailable(format!(
                    "cannot instantiate '{}': {}",
                    self.prog_id,
                    e.message()
                ))
            })?;

        Ok(Box::new(ComRoot {
            dispatch: Dispatch::new(inner),
        }))
    }
}

struct ComRoot {
    dispatch: Dispatch,
}

impl AutomationRoot for ComRoot {
    fn set_main_window_visible(&self, visible: bool) -> Result<()> {
        self.dispatch
            .get_dispatch("MainWindow")?
            .put("Visible", VARIANT::from(visible))
    }

    fn set_suppress_ui(&self, suppress: bool) -> Result<()> {
        self.dispatch.put("SuppressUI", VARIANT::from(suppress))
    }

    fn solution(&self) -> Result<Box<dyn Solution>> {
        Ok(Box::new(ComSolution {
            dispatch: self.dispatch.get_dispatch("Solution")?,
        }))
    }
}

struct ComSolution {
    dispatch: Dispatch,
}

impl Solution for ComSolution {
    fn open(&self, path: &Path) -> Result<()> {
        self.dispatch
            .call("Open", &[bstr(&path.to_string_lossy())])
            .map(drop)
    }

    fn projects(&self) -> Result<Vec<Box<dyn Project>>> {
        let collection = self.dispatch.get_dispatch("Projects")?;
        Ok(collection
            .items("Count", "Item")?
            .into_iter()
            .map(|dispatch| Box::new(ComProject { dispatch }) as Box<dyn Project>)
            .collect())
    }
}

struct ComProject {
    dispatch: Dispatch,
}

impl Project for ComProject {
    fn name(&self) -> Result<String> {
        let value = self.dispatch.get("Name")?;
        Ok(BSTR::try_from(&value)
            .map_err(|e| fault("Name", &e))?
            .to_string())
    }

    fn system_manager(&self) -> Result<Option<Box<dyn SystemManager>>> {
        // The project's underlying object either exposes the system
        // manager or it is not an automation-buildable project.
        let object = self.dispatch.get("Object")?;
        match IDispatch::try_from(&object) {
            Ok(inner) => Ok(Some(Box::new(ComSystemManager {
                dispatch: Dispatch::new(inner),
            }))),
            Err(_) => Ok(None),
        }
    }
}

struct ComSystemManager {
    dispatch: Dispatch,
}

impl SystemManager for ComSystemManager {
    fn lookup_tree_item(&self, key: &str) -> Result<Box<dyn TreeItem>> {
        let item = self.dispatch.call("LookupTreeItem", &[bstr(key)])?;
        let inner = IDispatch::try_from(&item).map_err(|e| fault("LookupTreeItem", &e))?;
        Ok(Box::new(ComTreeItem {
            dispatch: Dispatch::new(inner),
        }))
    }

    fn build_target_platform(&self, platform: &str) -> Result<()> {
        self.dispatch
            .call("BuildTargetPlatform", &[bstr(platform)])
            .map(drop)
    }

    fn activate_configuration(&self) -> Result<()> {
        self.dispatch.call("ActivateConfiguration", &[]).map(drop)
    }

    fn start_restart_runtime(&self) -> Result<()> {
        self.dispatch.call("StartRestartTwinCAT", &[]).map(drop)
    }

    fn is_runtime_started(&self) -> Result<bool> {
        let value = self.dispatch.call("IsTwinCATStarted", &[])?;
        bool::try_from(&value).map_err(|e| fault("IsTwinCATStarted", &e))
    }
}

struct ComTreeItem {
    dispatch: Dispatch,
}

impl TreeItem for ComTreeItem {
    fn children(&self) -> Result<Vec<Box<dyn PlcProject>>> {
        Ok(self
            .dispatch
            .items("ChildCount", "Child")?
            .into_iter()
            .map(|dispatch| Box::new(ComPlcProject { dispatch }) as Box<dyn PlcProject>)
            .collect())
    }
}

struct ComPlcProject {
    dispatch: Dispatch,
}

impl PlcProject for ComPlcProject {
    fn set_boot_autostart(&self, autostart: bool) -> Result<()> {
        self.dispatch
            .put("BootProjectAutostart", VARIANT::from(autostart))
    }
}

// ---------------------------------------------------------------------------
// COM message filter
// ---------------------------------------------------------------------------

#[implement(IMessageFilter)]
struct PolicyMessageFilter {
    policy: Arc<CallFilter>,
}

impl IMessageFilter_Impl for PolicyMessageFilter_Impl {
    fn HandleInComingCall(
        &self,
        _dwcalltype: u32,
        _htaskcaller: HTASK,
        _dwtickcount: u32,
        _lpinterfaceinfo: *const INTERFACEINFO,
    ) -> u32 {
        match self.policy.decide_incoming() {
            IncomingDecision::Handled => SERVERCALL_ISHANDLED.0 as u32,
        }
    }

    fn RetryRejectedCall(&self, _htaskcallee: HTASK, dwtickcount: u32, dwrejecttype: u32) -> u32 {
        let elapsed = Duration::from_millis(u64::from(dwtickcount));
        match self
            .policy
            .decide_rejected(elapsed, RejectKind::from_raw(dwrejecttype))
        {
            RetryDecision::RetryAfter(hint) => hint,
            RetryDecision::Cancel => u32::MAX,
        }
    }

    fn MessagePending(&self, _htaskcallee: HTASK, dwtickcount: u32, _dwpendingtype: u32) -> u32 {
        match self
            .policy
            .decide_pending(Duration::from_millis(u64::from(dwtickcount)))
        {
            PendingDecision::WaitDefProcess => PENDINGMSG_WAITDEFPROCESS.0 as u32,
        }
    }
}

/// Register the policy with the COM runtime for the current apartment.
/// Any previously installed filter is replaced, not chained.
pub(crate) fn install_message_filter(policy: Arc<CallFilter>) -> Result<()> {
    let com_filter: IMessageFilter = PolicyMessageFilter { policy }.into();
    let mut previous: Option<IMessageFilter> = None;
    unsafe { CoRegisterMessageFilter(&com_filter, Some(&mut previous as *mut _)) }
        .map_err(|e| fault("registering message filter", &e))?;
    drop(previous);
    Ok(())
}

/// Restore the "no filter" state for the current apartment. Best-effort
/// and idempotent.
pub(crate) fn revoke_message_filter() {
    let mut previous: Option<IMessageFilter> = None;
    let _ = unsafe {
        CoRegisterMessageFilter(None::<&IMessageFilter>, Some(&mut previous as *mut _))
    };
}
