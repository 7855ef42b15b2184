use crate::error::{JailError, Result};

/// Returns `key` as a NUL-terminated byte string.
pub(crate) fn c_name(key: &str) -> Result<Vec<u8>> {
    if key.is_empty() {
        return Err(JailError::caller("empty parameter name"));
    }

    if key.as_bytes().contains(&0) {
        return Err(JailError::caller(format!(
            "parameter name {key:?} contains a NUL byte"
        )));
    }

    let mut name = Vec::with_capacity(key.len() + 1);
    name.extend_from_slice(key.as_bytes());
    name.push(0);
    Ok(name)
}

/// The prefix of `bytes` before the first NUL (or all of it).
pub(crate) fn until_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&byte| byte == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

/// Lossy string view of a kernel-filled C string buffer.
pub(crate) fn c_string_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(until_nul(bytes)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_name() {
        assert_eq!(c_name("jid").ok(), Some(b"jid\0".to_vec()));
        assert!(c_name("").is_err());
        assert!(c_name("a\0b").is_err());
    }

    #[test]
    fn test_until_nul() {
        assert_eq!(until_nul(b"www\0\0\0"), b"www");
        assert_eq!(until_nul(b"www"), b"www");
        assert_eq!(until_nul(b"\0www"), b"");
        assert_eq!(c_string_lossy(b"jail 7 not found\0garbage"), "jail 7 not found");
    }
}
