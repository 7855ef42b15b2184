//! Error taxonomy shared by every jail operation.

use nix::errno::Errno;
use thiserror::Error;

/// Errors returned by parameter marshaling, jail syscalls and child creation.
#[derive(Debug, Error)]
pub enum JailError {
    /// The parameter set is malformed (missing or non-string `name`,
    /// reserved key, bad parameter name).
    #[error("invalid jail parameters: {message}")]
    CallerInput {
        /// What the caller got wrong.
        message: String,
    },

    /// An IP address list mixes IPv4 and IPv6 entries.
    #[error("invalid jail parameters: {key}: mixing IPv4 and IPv6 addresses is not allowed")]
    MixedAddressFamily {
        /// Parameter holding the list.
        key: String,
    },

    /// A value of this kind has no wire encoding.
    #[error("parameter {key:?}: type {kind} not implemented")]
    UnsupportedType {
        /// Offending parameter.
        key: String,
        /// Name of the offending dynamic type.
        kind: &'static str,
    },

    /// The kernel filled the `errmsg` buffer.
    #[error("{0}")]
    KernelReported(String),

    /// The kernel call failed without any error text.
    #[error("jail syscall failed: {0}")]
    Syscall(#[from] Errno),

    /// Pipe, fork, wait or relay failure while creating a child jail.
    #[error("child jail creation: {message}")]
    Protocol {
        /// Stage that failed.
        message: String,
        /// Underlying OS error, if any.
        #[source]
        source: Option<Errno>,
    },
}

impl JailError {
    pub(crate) fn caller(message: impl Into<String>) -> Self {
        Self::CallerInput {
            message: message.into(),
        }
    }

    pub(crate) fn protocol(message: impl Into<String>, source: Option<Errno>) -> Self {
        Self::Protocol {
            message: message.into(),
            source,
        }
    }

    /// Whether the error was detected before any kernel call was made.
    pub fn is_caller_input(&self) -> bool {
        matches!(
            self,
            Self::CallerInput { .. } | Self::MixedAddressFamily { .. } | Self::UnsupportedType { .. }
        )
    }

    /// Raw errno, for `Syscall` and errno-carrying `Protocol` errors.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Self::Syscall(errno) => Some(*errno),
            Self::Protocol { source, .. } => *source,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, JailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_text_is_displayed_verbatim() {
        let error = JailError::KernelReported("jail \"www\" not found".into());
        assert_eq!(error.to_string(), "jail \"www\" not found");
    }

    #[test]
    fn caller_input_classification() {
        assert!(JailError::caller("name param mandatory").is_caller_input());
        assert!(
            JailError::MixedAddressFamily {
                key: "ip4.addr".into()
            }
            .is_caller_input()
        );
        assert!(!JailError::Syscall(Errno::EPERM).is_caller_input());
        assert_eq!(JailError::Syscall(Errno::EPERM).errno(), Some(Errno::EPERM));
    }
}
