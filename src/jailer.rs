//! Child jail creation.
//!
//! Attaching to a jail is a one-way trip, so the attach and the create run in
//! a short-lived fork. The child reports back through a pipe and exits.

use crate::{
    error::{JailError, Result},
    iov::{IovecView, JailIov},
    kernel::Kernel,
    param::{JailId, ParamSet, ParamValue},
    report::{ChildRelayWriter, RelayPipe, RelayStatus, decode_relay},
    sys::{JailFlags, JailSys},
};
use nix::{
    errno::Errno,
    libc,
    sys::wait::waitpid,
    unistd::{ForkResult, fork},
};
use std::sync::{Mutex, PoisonError};

/// Held across every `fork` issued by this crate.
static FORK_LOCK: Mutex<()> = Mutex::new(());

/// Creates jails nested inside `parent`.
pub struct ChildJailer<'k, S: JailSys> {
    kernel: &'k Kernel<S>,
    parent: JailId,
}

impl<'k, S: JailSys> ChildJailer<'k, S> {
    pub fn new(kernel: &'k Kernel<S>, parent: JailId) -> Self {
        Self { kernel, parent }
    }

    #[inline]
    pub fn parent(&self) -> JailId {
        self.parent
    }

    /// Makes room for one more child, raising `children.max` by one when the
    /// parent is full. Returns whether the limit was raised.
    ///
    /// Not atomic with the creation that follows; concurrent creators
    /// against the same parent must serialize.
    pub fn ensure_capacity(&self) -> Result<bool> {
        let query = ParamSet::new()
            .with("jid", self.parent)
            .with("children.max", ParamValue::OutInt)
            .with("children.cur", ParamValue::OutInt);

        let (_, iov) = self.kernel.get_params(&query, JailFlags::empty())?;
        let max = iov.int("children.max").unwrap_or_default();
        let cur = iov.int("children.cur").unwrap_or_default();

        if cur < max {
            tracing::debug!(parent = %self.parent, cur, max, "parent has room for a child");
            return Ok(false);
        }

        let raised = max.checked_add(1).ok_or_else(|| {
            JailError::caller(format!("children.max of jail {} cannot be raised", self.parent))
        })?;

        let raise = ParamSet::new()
            .with("jid", self.parent)
            .with("children.max", raised);
        self.kernel.set_params(&raise, JailFlags::UPDATE)?;

        tracing::debug!(parent = %self.parent, cur, max = raised, "raised children.max");
        Ok(true)
    }

    /// Creates a jail from `params` inside the parent and returns its id.
    pub fn spawn(&self, params: &ParamSet) -> Result<JailId> {
        let name = params.require_name()?;
        let mut iov = JailIov::marshal(params)?;

        self.ensure_capacity()?;

        let (reader, writer) = RelayPipe::new()?.split();
        let mut view = iov.view();

        let forked = {
            let _guard = FORK_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            // SAFETY: the child only issues jail syscalls over buffers prepared
            // above, writes to the pipe and calls `_exit`.
            unsafe { fork() }
        };

        match forked.map_err(|errno| JailError::protocol("fork failed", Some(errno)))? {
            ForkResult::Child => run_child(self.kernel.sys(), self.parent, &mut view, &writer),
            ForkResult::Parent { child } => {
                drop(writer);
                drop(view);

                tracing::debug!(parent = %self.parent, %child, name, "forked child jail creator");

                let status = waitpid(child, None).map_err(|errno| {
                    JailError::protocol(format!("failed to wait for child {child}"), Some(errno))
                })?;
                let payload = reader.read_to_end()?;

                let jid = decode_relay(status, &payload)?;
                tracing::info!(parent = %self.parent, %jid, name, "created child jail");
                Ok(jid)
            }
        }
    }
}

/// Body of the forked child. Attach, create, report, exit: nothing else runs
/// between `fork` and `_exit`.
fn run_child<S: JailSys>(
    sys: &S,
    parent: JailId,
    iov: &mut IovecView<'_>,
    writer: &ChildRelayWriter,
) -> ! {
    let status = match sys.jail_attach(parent) {
        Err(errno) => writer.report_errno(RelayStatus::AttachFailed, errno),
        Ok(()) => match sys.jail_set(iov, JailFlags::CREATE) {
            Ok(jid) if jid >= 0 => writer.report_created(jid),
            Ok(_) => writer.report_create_failure(iov.errmsg_bytes(), Errno::UnknownErrno),
            Err(errno) => writer.report_create_failure(iov.errmsg_bytes(), errno),
        },
    };

    // SAFETY: `_exit` skips atexit handlers and stdio flushing, which the
    // forked copy must not run.
    unsafe { libc::_exit(status.into()) }
}
