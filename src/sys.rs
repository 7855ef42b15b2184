//! Raw jail system calls.
//!
//! [`JailSys`] is the seam between the crate and the kernel. [`HostSys`]
//! issues the real FreeBSD calls; other targets report `ENOSYS`.

use crate::{iov::IovecView, param::JailId};
use nix::errno::Errno;
use std::{fmt, ops::BitOr};

/// `jail_get(2)` / `jail_set(2)` flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct JailFlags(i32);

impl JailFlags {
    pub const CREATE: JailFlags = JailFlags(0x01);
    pub const UPDATE: JailFlags = JailFlags(0x02);
    pub const ATTACH: JailFlags = JailFlags(0x04);
    pub const DYING: JailFlags = JailFlags(0x08);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(self) -> i32 {
        self.0
    }

    pub const fn contains(self, other: JailFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for JailFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for JailFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::CREATE, "CREATE"),
            (Self::UPDATE, "UPDATE"),
            (Self::ATTACH, "ATTACH"),
            (Self::DYING, "DYING"),
        ];

        let mut set = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .peekable();

        if set.peek().is_none() {
            return f.write_str("JailFlags(empty)");
        }

        f.write_str("JailFlags(")?;
        for (index, name) in set.enumerate() {
            if index > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(name)?;
        }
        f.write_str(")")
    }
}

/// The four jail system calls.
///
/// `jail_attach` and `jail_set` also run in a freshly forked child, between
/// `fork` and `_exit`. Implementations must not allocate, lock or log there.
pub trait JailSys {
    fn jail_get(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32>;
    fn jail_set(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32>;
    fn jail_attach(&self, jid: JailId) -> nix::Result<()>;
    fn jail_remove(&self, jid: JailId) -> nix::Result<()>;
}

impl<T: JailSys + ?Sized> JailSys for &T {
    fn jail_get(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32> {
        (**self).jail_get(iov, flags)
    }

    fn jail_set(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32> {
        (**self).jail_set(iov, flags)
    }

    fn jail_attach(&self, jid: JailId) -> nix::Result<()> {
        (**self).jail_attach(jid)
    }

    fn jail_remove(&self, jid: JailId) -> nix::Result<()> {
        (**self).jail_remove(jid)
    }
}

/// The running kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostSys;

#[cfg(target_os = "freebsd")]
impl JailSys for HostSys {
    fn jail_get(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32> {
        let niov = iov.len() as nix::libc::c_uint;
        // SAFETY: the view keeps every referenced buffer alive and unmoved for
        // the duration of the call.
        let ret = unsafe { nix::libc::jail_get(iov.as_mut_ptr(), niov, flags.bits()) };
        Errno::result(ret)
    }

    fn jail_set(&self, iov: &mut IovecView<'_>, flags: JailFlags) -> nix::Result<i32> {
        let niov = iov.len() as nix::libc::c_uint;
        // SAFETY: see `jail_get`.
        let ret = unsafe { nix::libc::jail_set(iov.as_mut_ptr(), niov, flags.bits()) };
        Errno::result(ret)
    }

    fn jail_attach(&self, jid: JailId) -> nix::Result<()> {
        // SAFETY: takes a plain integer, no memory is shared with the kernel.
        let ret = unsafe { nix::libc::jail_attach(jid.as_raw()) };
        Errno::result(ret).map(drop)
    }

    fn jail_remove(&self, jid: JailId) -> nix::Result<()> {
        // SAFETY: see `jail_attach`.
        let ret = unsafe { nix::libc::jail_remove(jid.as_raw()) };
        Errno::result(ret).map(drop)
    }
}

#[cfg(not(target_os = "freebsd"))]
impl JailSys for HostSys {
    fn jail_get(&self, _iov: &mut IovecView<'_>, _flags: JailFlags) -> nix::Result<i32> {
        Err(Errno::ENOSYS)
    }

    fn jail_set(&self, _iov: &mut IovecView<'_>, _flags: JailFlags) -> nix::Result<i32> {
        Err(Errno::ENOSYS)
    }

    fn jail_attach(&self, _jid: JailId) -> nix::Result<()> {
        Err(Errno::ENOSYS)
    }

    fn jail_remove(&self, _jid: JailId) -> nix::Result<()> {
        Err(Errno::ENOSYS)
    }
}
