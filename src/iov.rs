//! Parameter set marshaling.
//!
//! [`JailIov`] owns every name and value buffer of one jail call.
//! [`IovecView`] is the `struct iovec` array handed to the kernel; it borrows
//! the `JailIov` mutably, so no buffer can be moved or freed while a call
//! referencing it is in flight.

use crate::{
    encode::{EncodedParam, encode},
    error::{JailError, Result},
    param::{JailId, ParamSet},
    utils::{c_string_lossy, until_nul},
};
use nix::libc;
use std::{marker::PhantomData, net::IpAddr, ptr, slice};

pub const ERRMSG: &str = "errmsg";

/// Capacity of the kernel error text buffer.
pub const ERRMSG_LEN: usize = 1024;

/// Marshaled jail parameters, always terminated by the `errmsg` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JailIov {
    params: Vec<EncodedParam>,
}

impl JailIov {
    /// Encodes every parameter of `params` and appends the `errmsg` slot.
    pub fn marshal(params: &ParamSet) -> Result<Self> {
        let mut encoded = Vec::with_capacity(params.len() + 1);

        for (key, value) in params {
            let param = encode(key, value)?;
            if key == ERRMSG || param.name_str() == ERRMSG {
                return Err(JailError::caller(format!(
                    "usage of {ERRMSG} is reserved"
                )));
            }
            encoded.push(param);
        }

        encoded.push(EncodedParam {
            name: b"errmsg\0".to_vec(),
            value: Some(vec![0; ERRMSG_LEN]),
        });

        Ok(Self { params: encoded })
    }

    /// Number of `iovec` descriptors, two per parameter.
    pub fn descriptor_count(&self) -> usize {
        self.params.len() * 2
    }

    pub fn params(&self) -> &[EncodedParam] {
        &self.params
    }

    /// Transmitted parameter names, after flag renaming.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(EncodedParam::name_str)
    }

    /// Value buffer of the last parameter transmitted as `name`.
    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.params
            .iter()
            .rev()
            .find(|param| param.name_str() == name)?
            .value
            .as_deref()
    }

    pub fn int(&self, name: &str) -> Option<i32> {
        Some(i32::from_ne_bytes(self.bytes(name)?.try_into().ok()?))
    }

    pub fn uint(&self, name: &str) -> Option<u32> {
        Some(u32::from_ne_bytes(self.bytes(name)?.try_into().ok()?))
    }

    pub fn jid(&self, name: &str) -> Option<JailId> {
        self.int(name).map(JailId)
    }

    /// String value, cut at the first NUL.
    pub fn string(&self, name: &str) -> Option<String> {
        self.bytes(name).map(c_string_lossy)
    }

    /// Address list of an `ip4.*` or `ip6.*` parameter. For other names the
    /// family follows the length: a multiple of 16 bytes reads as IPv6.
    pub fn ip_addrs(&self, name: &str) -> Option<Vec<IpAddr>> {
        let bytes = self.bytes(name)?;
        let width = if name.starts_with("ip4.") {
            4
        } else if name.starts_with("ip6.") || bytes.len() % 16 == 0 {
            16
        } else {
            4
        };

        if bytes.len() % width != 0 {
            return None;
        }

        let addrs = bytes
            .chunks_exact(width)
            .map(|chunk| match *chunk {
                [a, b, c, d] => IpAddr::from([a, b, c, d]),
                _ => {
                    let mut octets = [0u8; 16];
                    octets.copy_from_slice(chunk);
                    IpAddr::from(octets)
                }
            })
            .collect();
        Some(addrs)
    }

    /// Kernel error text, if the kernel wrote any.
    pub fn errmsg(&self) -> Option<String> {
        let buffer = self.errmsg_buffer()?;
        match buffer.first() {
            Some(0) | None => None,
            Some(_) => Some(c_string_lossy(buffer)),
        }
    }

    /// Raw error text bytes up to the first NUL.
    pub fn errmsg_bytes(&self) -> &[u8] {
        self.errmsg_buffer().map(until_nul).unwrap_or_default()
    }

    /// Zeroes the `errmsg` slot so a previous failure cannot leak into the next call.
    pub fn reset_errmsg(&mut self) {
        if let Some(buffer) = self
            .params
            .last_mut()
            .and_then(|param| param.value.as_mut())
        {
            buffer.fill(0);
        }
    }

    fn errmsg_buffer(&self) -> Option<&[u8]> {
        self.params.last()?.value.as_deref()
    }

    /// Borrows the buffers as an `iovec` array for one kernel call.
    pub fn view(&mut self) -> IovecView<'_> {
        IovecView::new(&mut self.params)
    }
}

/// `iovec` array over the buffers of a [`JailIov`].
pub struct IovecView<'a> {
    iov: Vec<libc::iovec>,
    _owner: PhantomData<&'a mut [EncodedParam]>,
}

impl<'a> IovecView<'a> {
    fn new(params: &'a mut [EncodedParam]) -> Self {
        let mut iov = Vec::with_capacity(params.len() * 2);

        for param in params.iter_mut() {
            iov.push(libc::iovec {
                iov_base: param.name.as_mut_ptr().cast(),
                iov_len: param.name.len(),
            });

            iov.push(match param.value.as_mut() {
                Some(value) if !value.is_empty() => libc::iovec {
                    iov_base: value.as_mut_ptr().cast(),
                    iov_len: value.len(),
                },
                _ => libc::iovec {
                    iov_base: ptr::null_mut(),
                    iov_len: 0,
                },
            });
        }

        Self {
            iov,
            _owner: PhantomData,
        }
    }

    pub fn as_mut_ptr(&mut self) -> *mut libc::iovec {
        self.iov.as_mut_ptr()
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.iov.len()
    }

    pub fn is_empty(&self) -> bool {
        self.iov.is_empty()
    }

    pub fn param_count(&self) -> usize {
        self.iov.len() / 2
    }

    /// Name of parameter `index`, without its NUL.
    pub fn name(&self, index: usize) -> Option<&[u8]> {
        let name = self.descriptor(index * 2)?;
        Some(until_nul(name))
    }

    /// Value of parameter `index`; empty for flags.
    pub fn value(&self, index: usize) -> Option<&[u8]> {
        self.descriptor(index * 2 + 1)
    }

    pub fn value_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let iov = self.iov.get(index * 2 + 1)?;
        if iov.iov_base.is_null() {
            return Some(&mut []);
        }

        // SAFETY: the pointer and length come from a live buffer of the
        // `JailIov` this view exclusively borrows for `'a`.
        Some(unsafe { slice::from_raw_parts_mut(iov.iov_base.cast::<u8>(), iov.iov_len) })
    }

    /// Index of the last parameter named `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        (0..self.param_count())
            .rev()
            .find(|&index| self.name(index) == Some(name.as_bytes()))
    }

    /// Error text written into the trailing `errmsg` slot, up to the first NUL.
    pub fn errmsg_bytes(&self) -> &[u8] {
        self.param_count()
            .checked_sub(1)
            .and_then(|last| self.value(last))
            .map(until_nul)
            .unwrap_or_default()
    }

    fn descriptor(&self, slot: usize) -> Option<&[u8]> {
        let iov = self.iov.get(slot)?;
        if iov.iov_base.is_null() {
            return Some(&[]);
        }

        // SAFETY: see `value_mut`.
        Some(unsafe { slice::from_raw_parts(iov.iov_base.cast::<u8>(), iov.iov_len) })
    }
}
