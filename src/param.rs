//! Jail parameter values and parameter sets.

use crate::error::{JailError, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::{
    collections::{BTreeMap, btree_map},
    fmt,
    net::IpAddr,
};

/// Parameters carrying IP address lists.
const ADDRESS_PARAMS: [&str; 2] = ["ip4.addr", "ip6.addr"];

/// Parameters whose text is never reinterpreted.
const STRING_PARAMS: [&str; 3] = ["name", "path", "osrelease"];

fn is_string_param(key: &str) -> bool {
    STRING_PARAMS.contains(&key) || key.starts_with("host.")
}

/// Kernel jail identifier. `0` is the host, negative values are never valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JailId(pub i32);

impl JailId {
    pub const HOST: JailId = JailId(0);

    #[inline]
    pub fn as_raw(self) -> i32 {
        self.0
    }

    /// `true` for identifiers naming an actual jail.
    #[inline]
    pub fn is_jail(self) -> bool {
        self.0 > 0
    }
}

impl From<i32> for JailId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single jail parameter value.
///
/// The `Out*` variants are zero-filled slots the kernel populates during
/// `jail_get`; read them back from the marshaled [`JailIov`](crate::iov::JailIov).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Int(i32),
    UInt(u32),
    Jid(JailId),
    OutInt,
    OutUInt,
    OutJid,
    /// UTF-8 string, sent NUL-terminated.
    Str(String),
    /// Raw bytes, sent verbatim. Strings sent this way must carry their own NUL.
    Bytes(Vec<u8>),
    /// Zero-filled output buffer of the given capacity.
    OutBuf(usize),
    /// Homogeneous list of IPv4 or IPv6 addresses.
    IpAddrs(Vec<IpAddr>),
    /// Flag parameter, expressed through the `no` name prefix.
    Bool(bool),
}

impl ParamValue {
    /// Name of the value's kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Int(_) => "int32",
            Self::UInt(_) => "uint32",
            Self::Jid(_) => "jid",
            Self::OutInt => "out int32",
            Self::OutUInt => "out uint32",
            Self::OutJid => "out jid",
            Self::Str(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::OutBuf(_) => "out buffer",
            Self::IpAddrs(_) => "ip list",
            Self::Bool(_) => "bool",
        }
    }

    /// Converts an untyped JSON value. Anything without a jail wire encoding
    /// is an [`JailError::UnsupportedType`].
    pub fn from_json(key: &str, value: &Value) -> Result<Self> {
        let unsupported = |kind| JailError::UnsupportedType {
            key: key.to_owned(),
            kind,
        };

        match value {
            Value::Bool(flag) => Ok(Self::Bool(*flag)),
            Value::String(text) => Ok(Self::Str(text.clone())),
            Value::Number(number) => match number.as_i64() {
                Some(raw) => i32::try_from(raw)
                    .map(Self::Int)
                    .or_else(|_| u32::try_from(raw).map(Self::UInt))
                    .map_err(|_| unsupported("int64")),
                None if number.is_u64() => Err(unsupported("uint64")),
                None => Err(unsupported("float")),
            },
            Value::Array(items) => Self::from_json_array(items).ok_or_else(|| unsupported("array")),
            Value::Null => Err(unsupported("null")),
            Value::Object(_) => Err(unsupported("object")),
        }
    }

    fn from_json_array(items: &[Value]) -> Option<Self> {
        let addrs = items
            .iter()
            .map(|item| item.as_str()?.parse::<IpAddr>().ok())
            .collect::<Option<Vec<_>>>();

        if let Some(addrs) = addrs {
            return Some(Self::IpAddrs(addrs));
        }

        items
            .iter()
            .map(|item| u8::try_from(item.as_u64()?).ok())
            .collect::<Option<Vec<_>>>()
            .map(Self::Bytes)
    }

    /// Interprets command-line text for parameter `key` the way jail(8)
    /// parameters read. String parameters keep their text untouched, and only
    /// address parameters are parsed as IP lists.
    pub fn parse_text(key: &str, text: &str) -> Self {
        if is_string_param(key) {
            return Self::Str(text.to_owned());
        }

        match text {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }

        if let Ok(raw) = text.parse::<i32>() {
            return Self::Int(raw);
        }
        if let Ok(raw) = text.parse::<u32>() {
            return Self::UInt(raw);
        }

        if ADDRESS_PARAMS.contains(&key) && !text.is_empty() {
            let addrs = text
                .split(',')
                .map(|part| part.trim().parse::<IpAddr>())
                .collect::<std::result::Result<Vec<_>, _>>();
            if let Ok(addrs) = addrs {
                return Self::IpAddrs(addrs);
            }
        }

        Self::Str(text.to_owned())
    }

    /// Splits `key=value`; a bare `key` is a set flag.
    pub fn parse_assignment(arg: &str) -> (String, Self) {
        match arg.split_once('=') {
            Some((key, value)) => (key.to_owned(), Self::parse_text(key, value)),
            None => (arg.to_owned(), Self::Bool(true)),
        }
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<JailId> for ParamValue {
    fn from(value: JailId) -> Self {
        Self::Jid(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<u8>> for ParamValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<IpAddr>> for ParamValue {
    fn from(value: Vec<IpAddr>) -> Self {
        Self::IpAddrs(value)
    }
}

/// Unordered set of named jail parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamSet {
    params: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts or overwrites `key`, returning the previous value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<ParamValue>,
    ) -> Option<ParamValue> {
        self.params.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.params.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.params.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ParamValue> {
        self.params.iter()
    }

    /// The `name` parameter, mandatory when creating a jail.
    pub fn require_name(&self) -> Result<&str> {
        match self.params.get("name") {
            None => Err(JailError::caller("name param mandatory for jail creation")),
            Some(ParamValue::Str(name)) => Ok(name),
            Some(other) => Err(JailError::caller(format!(
                "name param must be a string, got {}",
                other.kind()
            ))),
        }
    }

    /// Converts a JSON object into a parameter set.
    pub fn from_json(document: &Value) -> Result<Self> {
        let Value::Object(entries) = document else {
            return Err(JailError::UnsupportedType {
                key: String::new(),
                kind: "non-object document",
            });
        };

        entries
            .iter()
            .map(|(key, value)| -> Result<(String, ParamValue)> {
                Ok((key.clone(), ParamValue::from_json(key, value)?))
            })
            .collect()
    }

    /// Merges `other` into `self`, `other` winning on conflicts.
    pub fn extend(&mut self, other: ParamSet) {
        self.params.extend(other.params);
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ParamSet {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = btree_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'de> Deserialize<'de> for ParamSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let document = Value::deserialize(deserializer)?;
        ParamSet::from_json(&document).map_err(serde::de::Error::custom)
    }
}
