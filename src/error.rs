//! Error taxonomy for the UDP module
//!
//! Every failure surfaced to the consumer carries a stable string code
//! plus a human-readable message. Consumers dispatch on the code, never
//! on the message text, so the codes form the wire contract between the
//! native core and the scripting side and must not change.

use std::fmt;

use once_cell::sync::Lazy;
use serde_json::Value;

/// Closed set of failure classes.
///
/// Grouped by category: socket lifecycle, parameter validation, system
/// failures wrapping the transport, buffer/zero-copy failures, and
/// internal faults caught at the command boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // Socket lifecycle
    SocketNotFound,
    AlreadyBound,
    SocketClosed,

    // Parameter validation
    InvalidArguments,
    InvalidBase64,
    InvalidAddress,

    // System failures
    BindFailed,
    SendFailed,
    ReceiveFailed,
    BeginReceiveFailed,

    // Buffer / zero-copy
    BufferNotFound,
    BufferCreationFailed,
    BufferAccessFailed,

    // Internal
    InternalException,
    OperationFailed,
}

impl ErrorKind {
    /// All kinds, in export order.
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::SocketNotFound,
        ErrorKind::AlreadyBound,
        ErrorKind::SocketClosed,
        ErrorKind::InvalidArguments,
        ErrorKind::InvalidBase64,
        ErrorKind::InvalidAddress,
        ErrorKind::BindFailed,
        ErrorKind::SendFailed,
        ErrorKind::ReceiveFailed,
        ErrorKind::BeginReceiveFailed,
        ErrorKind::BufferNotFound,
        ErrorKind::BufferCreationFailed,
        ErrorKind::BufferAccessFailed,
        ErrorKind::InternalException,
        ErrorKind::OperationFailed,
    ];

    /// Stable wire code for this kind.
    pub const fn code(self) -> &'static str {
        match self {
            ErrorKind::SocketNotFound => "ERR_SOCKET_NOT_FOUND",
            ErrorKind::AlreadyBound => "ERR_ALREADY_BOUND",
            ErrorKind::SocketClosed => "ERR_SOCKET_CLOSED",
            ErrorKind::InvalidArguments => "ERR_INVALID_ARGUMENTS",
            ErrorKind::InvalidBase64 => "ERR_INVALID_BASE64",
            ErrorKind::InvalidAddress => "ERR_INVALID_ADDRESS",
            ErrorKind::BindFailed => "ERR_BIND_FAILED",
            ErrorKind::SendFailed => "ERR_SEND_FAILED",
            ErrorKind::ReceiveFailed => "ERR_RECEIVE_FAILED",
            ErrorKind::BeginReceiveFailed => "ERR_BEGIN_RECEIVE_FAILED",
            ErrorKind::BufferNotFound => "ERR_BUFFER_NOT_FOUND",
            ErrorKind::BufferCreationFailed => "ERR_BUFFER_CREATION_FAILED",
            ErrorKind::BufferAccessFailed => "ERR_BUFFER_ACCESS_FAILED",
            ErrorKind::InternalException => "ERR_INTERNAL_EXCEPTION",
            ErrorKind::OperationFailed => "ERR_OPERATION_FAILED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A typed module error: stable code plus message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct UdpError {
    pub kind: ErrorKind,
    pub message: String,
}

impl UdpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Wrap a transport-level failure, keeping the underlying cause in
    /// the message.
    pub fn system(kind: ErrorKind, context: &str, source: impl fmt::Display) -> Self {
        Self {
            kind,
            message: format!("{}: {}", context, source),
        }
    }

    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

pub type UdpResult<T> = Result<T, UdpError>;

static ERROR_CONSTANTS: Lazy<Value> = Lazy::new(|| {
    let mut map = serde_json::Map::with_capacity(ErrorKind::ALL.len());
    for kind in ErrorKind::ALL {
        map.insert(kind.code().to_string(), Value::from(kind.code()));
    }
    Value::Object(map)
});

/// The exported constants object: one entry per error code, keyed by the
/// code itself so the consumer can build a string union from it.
pub fn error_constants() -> &'static Value {
    &ERROR_CONSTANTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique_and_stable() {
        let mut seen = std::collections::HashSet::new();
        for kind in ErrorKind::ALL {
            assert!(seen.insert(kind.code()), "duplicate code {}", kind.code());
            assert!(kind.code().starts_with("ERR_"));
        }
        assert_eq!(seen.len(), 15);
    }

    #[test]
    fn test_display_carries_code_and_message() {
        let err = UdpError::new(ErrorKind::AlreadyBound, "socket 3 is already bound");
        assert_eq!(err.code(), "ERR_ALREADY_BOUND");
        assert_eq!(err.to_string(), "ERR_ALREADY_BOUND: socket 3 is already bound");
    }

    #[test]
    fn test_constants_export() {
        let constants = error_constants();
        assert_eq!(
            constants["ERR_SOCKET_NOT_FOUND"],
            Value::from("ERR_SOCKET_NOT_FOUND")
        );
        assert_eq!(constants.as_object().unwrap().len(), ErrorKind::ALL.len());
    }
}
