//! Kernel call adapter.
//!
//! Issues jail system calls over marshaled parameters and decodes failures:
//! text the kernel left in `errmsg` wins over the bare errno.

use crate::{
    error::{JailError, Result},
    iov::{IovecView, JailIov},
    param::{JailId, ParamSet, ParamValue},
    sys::{HostSys, JailFlags, JailSys},
};
use nix::errno::Errno;

/// Matches the kernel's `MAXHOSTNAMELEN`, the longest jail name.
pub const MAXHOSTNAMELEN: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct Kernel<S: JailSys = HostSys> {
    sys: S,
}

impl Kernel<HostSys> {
    pub fn host() -> Self {
        Self { sys: HostSys }
    }
}

impl<S: JailSys> Kernel<S> {
    pub fn new(sys: S) -> Self {
        Self { sys }
    }

    #[inline]
    pub fn sys(&self) -> &S {
        &self.sys
    }

    /// `jail_get(2)`: reads parameters into the out slots of `iov`.
    pub fn get(&self, iov: &mut JailIov, flags: JailFlags) -> Result<JailId> {
        self.call("jail_get", iov, flags, S::jail_get)
    }

    /// `jail_set(2)`: creates or updates a jail.
    pub fn set(&self, iov: &mut JailIov, flags: JailFlags) -> Result<JailId> {
        self.call("jail_set", iov, flags, S::jail_set)
    }

    /// Marshals `params` and issues `jail_get`, returning the filled slots.
    pub fn get_params(&self, params: &ParamSet, flags: JailFlags) -> Result<(JailId, JailIov)> {
        let mut iov = JailIov::marshal(params)?;
        let jid = self.get(&mut iov, flags)?;
        Ok((jid, iov))
    }

    /// Marshals `params` and issues `jail_set`.
    pub fn set_params(&self, params: &ParamSet, flags: JailFlags) -> Result<JailId> {
        let mut iov = JailIov::marshal(params)?;
        self.set(&mut iov, flags)
    }

    /// Attaches the calling process to `jid`. There is no way back.
    pub fn attach(&self, jid: JailId) -> Result<()> {
        tracing::debug!(%jid, "jail_attach");
        self.sys.jail_attach(jid).map_err(JailError::Syscall)
    }

    /// Kills every process in `jid` and removes the jail.
    pub fn remove(&self, jid: JailId) -> Result<()> {
        tracing::debug!(%jid, "jail_remove");
        self.sys.jail_remove(jid).map_err(JailError::Syscall)
    }

    /// Name of the jail `jid`.
    pub fn get_name(&self, jid: JailId) -> Result<String> {
        let params = ParamSet::new()
            .with("jid", jid)
            .with("name", ParamValue::OutBuf(MAXHOSTNAMELEN));

        let (_, iov) = self.get_params(&params, JailFlags::empty())?;
        Ok(iov.string("name").unwrap_or_default())
    }

    /// Identifier of the jail called `name`; a numeric `name` is taken as a jid.
    pub fn get_id(&self, name: &str) -> Result<JailId> {
        let params = match name.parse::<i32>() {
            Ok(0) => return Ok(JailId::HOST),
            Ok(raw) => ParamSet::new().with("jid", JailId(raw)),
            Err(_) => ParamSet::new().with("name", name),
        };

        let (jid, _) = self.get_params(&params, JailFlags::empty())?;
        Ok(jid)
    }

    fn call<F>(&self, op: &'static str, iov: &mut JailIov, flags: JailFlags, f: F) -> Result<JailId>
    where
        F: FnOnce(&S, &mut IovecView<'_>, JailFlags) -> nix::Result<i32>,
    {
        iov.reset_errmsg();

        let result = {
            let mut view = iov.view();
            f(&self.sys, &mut view, flags)
        };

        match result {
            Ok(jid) if jid >= 0 => {
                tracing::debug!(op, ?flags, jid, "jail call succeeded");
                Ok(JailId(jid))
            }
            Ok(_) => Err(decode_failure(op, iov, Errno::UnknownErrno)),
            Err(errno) => Err(decode_failure(op, iov, errno)),
        }
    }
}

/// Kernel text in `errmsg` takes precedence over the errno.
pub(crate) fn decode_failure(op: &'static str, iov: &JailIov, errno: Errno) -> JailError {
    match iov.errmsg() {
        Some(message) => {
            tracing::debug!(op, %errno, %message, "jail call failed");
            JailError::KernelReported(message)
        }
        None => {
            tracing::debug!(op, %errno, "jail call failed");
            JailError::Syscall(errno)
        }
    }
}
