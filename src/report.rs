use crate::{
    error::{JailError, Result},
    param::JailId,
    utils::{c_string_lossy, until_nul},
};
use nix::{
    errno::Errno,
    fcntl::OFlag,
    sys::wait::WaitStatus,
    unistd::{pipe2, read, write},
};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::os::fd::OwnedFd;

/// Exit status of the forked child, telling the parent how to read the pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum RelayStatus {
    /// Payload: the new jid, 4 native-endian bytes.
    Created = 0,
    /// Payload: kernel error text.
    KernelError = 1,
    /// Payload: errno of the failed `jail_attach`, 4 native-endian bytes.
    AttachFailed = 2,
    /// Payload: errno of a `jail_set` that left no error text.
    CreateFailed = 3,
}

/// Pipe carrying the child's outcome back to the parent.
#[derive(Debug)]
pub struct RelayPipe {
    /// Read end of the pipe
    reader: OwnedFd,

    /// Write end of the pipe
    writer: OwnedFd,
}

impl RelayPipe {
    /// Create new instance of `RelayPipe`
    pub fn new() -> Result<Self> {
        let (reader, writer) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|errno| JailError::protocol("failed to create relay pipe", Some(errno)))?;

        Ok(Self { reader, writer })
    }

    /// Consumes the pipe, handing one end to each side of the fork.
    pub fn split(self) -> (ParentRelayReader, ChildRelayWriter) {
        (
            ParentRelayReader {
                reader: self.reader,
            },
            ChildRelayWriter {
                writer: self.writer,
            },
        )
    }
}

/// Write end, used only by the forked child. Nothing here allocates.
#[derive(Debug)]
pub struct ChildRelayWriter {
    writer: OwnedFd,
}

impl ChildRelayWriter {
    pub fn report_created(&self, jid: i32) -> RelayStatus {
        self.report(RelayStatus::Created, &jid.to_ne_bytes())
    }

    /// Relays the kernel's error text, or the errno when the kernel left none.
    pub fn report_create_failure(&self, errmsg: &[u8], errno: Errno) -> RelayStatus {
        let text = until_nul(errmsg);
        if text.is_empty() {
            return self.report_errno(RelayStatus::CreateFailed, errno);
        }
        self.report(RelayStatus::KernelError, text)
    }

    pub fn report_errno(&self, status: RelayStatus, errno: Errno) -> RelayStatus {
        self.report(status, &(errno as i32).to_ne_bytes())
    }

    // A failed write leaves the parent with a short payload, which it
    // rejects as a protocol error.
    fn report(&self, status: RelayStatus, payload: &[u8]) -> RelayStatus {
        let _ = self.send(payload);
        status
    }

    fn send(&self, bytes: &[u8]) -> nix::Result<()> {
        let mut rest = bytes;
        while !rest.is_empty() {
            match write(&self.writer, rest) {
                Ok(0) => return Err(Errno::EPIPE),
                Ok(n) => rest = &rest[n..],
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(errno),
            }
        }
        Ok(())
    }
}

/// Read end, kept by the original process.
#[derive(Debug)]
pub struct ParentRelayReader {
    reader: OwnedFd,
}

impl ParentRelayReader {
    /// Reads until every write end is closed.
    pub fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();
        let mut chunk = [0u8; 512];

        loop {
            match read(&self.reader, &mut chunk) {
                Ok(0) => break,
                Ok(n) => payload.extend_from_slice(&chunk[..n]),
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(JailError::protocol(
                        "failed to read child relay",
                        Some(errno),
                    ));
                }
            }
        }

        Ok(payload)
    }
}

/// Turns the child's exit status and relayed bytes into the new jid.
pub fn decode_relay(status: WaitStatus, payload: &[u8]) -> Result<JailId> {
    let code = match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(pid, signal, _) => {
            return Err(JailError::protocol(
                format!("child {pid} killed by signal {signal:?}"),
                None,
            ));
        }
        other => {
            return Err(JailError::protocol(
                format!("unexpected wait status: {other:?}"),
                None,
            ));
        }
    };

    let status = RelayStatus::try_from(code)
        .map_err(|_| JailError::protocol(format!("unknown child exit status {code}"), None))?;

    match status {
        RelayStatus::Created => Ok(JailId(read_i32(status, payload)?)),
        RelayStatus::KernelError if until_nul(payload).is_empty() => Err(JailError::protocol(
            "child reported a kernel error without text",
            None,
        )),
        RelayStatus::KernelError => Err(JailError::KernelReported(c_string_lossy(payload))),
        RelayStatus::AttachFailed | RelayStatus::CreateFailed => Err(JailError::Syscall(
            Errno::from_raw(read_i32(status, payload)?),
        )),
    }
}

fn read_i32(status: RelayStatus, payload: &[u8]) -> Result<i32> {
    let bytes: [u8; 4] = payload.try_into().map_err(|_| {
        JailError::protocol(
            format!(
                "child relayed {} bytes for {status:?}, expected 4",
                payload.len()
            ),
            None,
        )
    })?;
    Ok(i32::from_ne_bytes(bytes))
}
