//! Create, inspect and nest FreeBSD jails.
//!
//! Parameters are typed [`ParamValue`]s collected in a [`ParamSet`], marshaled
//! into the name/value `iovec` layout of `jail_get(2)` and `jail_set(2)` by
//! [`JailIov`], and issued through a [`Kernel`]. [`Jail`] is the handle most
//! callers want; [`ChildJailer`] creates jails nested inside an existing one.

pub mod encode;
pub mod error;
pub mod iov;
pub mod jail;
pub mod jailer;
pub mod kernel;
pub mod param;
pub mod report;
pub mod sys;

mod utils;

#[cfg(test)]
mod testing;

pub use error::{JailError, Result};
pub use iov::JailIov;
pub use jail::Jail;
pub use jailer::ChildJailer;
pub use kernel::Kernel;
pub use param::{JailId, ParamSet, ParamValue};
pub use sys::{HostSys, JailFlags, JailSys};
