use anyhow::{Result, bail};
use nix::unistd::{Uid, geteuid, getuid};
use once_cell::sync::OnceCell;

static GLOBAL_CONTEXT: OnceCell<GlobalContext> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrivilegeLevel {
    Root,
    Setuid,
    Rootless,
}

/// Identity of the running process, captured once at startup.
#[derive(Debug, Clone, Copy)]
pub struct GlobalContext {
    ruid: Uid,
    euid: Uid,
    level: PrivilegeLevel,
}

impl GlobalContext {
    /// Initializes the global context. Later calls return the first value.
    pub fn init() -> Result<&'static Self> {
        GLOBAL_CONTEXT.get_or_try_init(Self::new)
    }

    #[inline]
    pub fn ruid(&self) -> Uid {
        self.ruid
    }

    #[inline]
    pub fn euid(&self) -> Uid {
        self.euid
    }

    #[inline]
    pub fn root(&self) -> bool {
        self.euid().is_root()
    }

    #[inline]
    pub fn privilege_level(&self) -> PrivilegeLevel {
        self.level
    }

    fn new() -> Result<Self> {
        Self::classify(getuid(), geteuid())
    }

    fn classify(ruid: Uid, euid: Uid) -> Result<Self> {
        let level = if ruid != euid {
            if !euid.is_root() {
                bail!("setuid binary must elevate to root (euid=0), but got euid={euid}");
            }
            PrivilegeLevel::Setuid
        } else if euid.is_root() {
            PrivilegeLevel::Root
        } else {
            PrivilegeLevel::Rootless
        };

        Ok(Self { ruid, euid, level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privilege_levels() -> Result<()> {
        let root = Uid::from_raw(0);
        let user = Uid::from_raw(1000);

        assert_eq!(GlobalContext::classify(root, root)?.privilege_level(), PrivilegeLevel::Root);
        assert_eq!(GlobalContext::classify(user, root)?.privilege_level(), PrivilegeLevel::Setuid);
        assert_eq!(GlobalContext::classify(user, user)?.privilege_level(), PrivilegeLevel::Rootless);
        assert!(GlobalContext::classify(user, Uid::from_raw(1001)).is_err());
        Ok(())
    }

    #[test]
    fn test_init_once() -> Result<()> {
        let first = GlobalContext::init()?;
        let second = GlobalContext::init()?;
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.root(), first.euid().is_root());
        Ok(())
    }
}
