//! Typed parameter encoder.
//!
//! Turns one `(key, value)` pair into the name/value buffer pair that
//! `jail_get(2)` and `jail_set(2)` consume.

use crate::{
    error::{JailError, Result},
    param::ParamValue,
    utils::c_name,
};
use std::net::IpAddr;

/// Parameters whose string values `disabled`, `new` and `inherit` are
/// really the `JAIL_SYS_*` integers.
pub const JAILSYS_PARAMS: [&str; 8] = [
    "host", "ip4", "ip6", "vnet", "sysvmsg", "sysvsem", "sysvshm", "linux",
];

const JAILSYS_ALIASES: [(&str, i32); 3] = [("disabled", 0), ("new", 1), ("inherit", 2)];

/// An encoded parameter: NUL-terminated name plus optional value bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedParam {
    pub name: Vec<u8>,
    pub value: Option<Vec<u8>>,
}

impl EncodedParam {
    /// Name without the trailing NUL.
    pub fn name_str(&self) -> &str {
        let name = self.name.strip_suffix(&[0]).unwrap_or(&self.name[..]);
        std::str::from_utf8(name).unwrap_or_default()
    }
}

/// Encodes a single parameter.
pub fn encode(key: &str, value: &ParamValue) -> Result<EncodedParam> {
    let (name, value) = match value {
        ParamValue::Int(raw) => (c_name(key)?, Some(raw.to_ne_bytes().to_vec())),
        ParamValue::UInt(raw) => (c_name(key)?, Some(raw.to_ne_bytes().to_vec())),
        ParamValue::Jid(jid) => (c_name(key)?, Some(jid.as_raw().to_ne_bytes().to_vec())),
        ParamValue::OutInt | ParamValue::OutUInt | ParamValue::OutJid => {
            (c_name(key)?, Some(vec![0; 4]))
        }
        ParamValue::Str(text) => (c_name(key)?, Some(encode_str(key, text))),
        ParamValue::Bytes(bytes) => (c_name(key)?, Some(bytes.clone())),
        ParamValue::OutBuf(capacity) => (c_name(key)?, Some(vec![0; *capacity])),
        ParamValue::IpAddrs(addrs) => (c_name(key)?, Some(encode_addrs(key, addrs)?)),
        ParamValue::Bool(flag) => (c_name(&flag_name(key, *flag))?, None),
    };

    Ok(EncodedParam { name, value })
}

/// Applies the `no` prefix convention for flag parameters.
pub fn flag_name(key: &str, flag: bool) -> String {
    match (flag, key.strip_prefix("no")) {
        (false, None) => format!("no{key}"),
        (true, Some(positive)) => positive.to_owned(),
        _ => key.to_owned(),
    }
}

fn encode_str(key: &str, text: &str) -> Vec<u8> {
    if is_jailsys(key) {
        if let Some((_, raw)) = JAILSYS_ALIASES.iter().find(|(alias, _)| *alias == text) {
            return raw.to_ne_bytes().to_vec();
        }
    }

    let mut bytes = Vec::with_capacity(text.len() + 1);
    bytes.extend_from_slice(text.as_bytes());
    bytes.push(0);
    bytes
}

fn is_jailsys(key: &str) -> bool {
    JAILSYS_PARAMS.contains(&key)
}

fn encode_addrs(key: &str, addrs: &[IpAddr]) -> Result<Vec<u8>> {
    let v4 = addrs.iter().filter(|addr| as_v4(addr).is_some()).count();
    if v4 != 0 && v4 != addrs.len() {
        return Err(JailError::MixedAddressFamily {
            key: key.to_owned(),
        });
    }

    let mut bytes = Vec::with_capacity(addrs.len() * if v4 == 0 { 16 } else { 4 });
    for addr in addrs {
        match addr {
            IpAddr::V4(v4) => bytes.extend_from_slice(&v4.octets()),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => bytes.extend_from_slice(&v4.octets()),
                None => bytes.extend_from_slice(&v6.octets()),
            },
        }
    }

    Ok(bytes)
}

// IPv4-mapped IPv6 addresses travel as IPv4.
fn as_v4(addr: &IpAddr) -> Option<[u8; 4]> {
    match addr {
        IpAddr::V4(v4) => Some(v4.octets()),
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(|v4| v4.octets()),
    }
}
