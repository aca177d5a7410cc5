//! Canonical status codes, RPC status, and the per-item write error entry
//! shared by both protocol variants.

use std::fmt;

use bytes::Bytes;

use serde::{Deserialize, Serialize};

/// Canonical RPC status code.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize, Default,
)]
pub enum Code {
    #[default]
    Ok = 0,
    Cancelled = 1,
    Unknown = 2,
    InvalidArgument = 3,
    DeadlineExceeded = 4,
    NotFound = 5,
    AlreadyExists = 6,
    PermissionDenied = 7,
    ResourceExhausted = 8,
    FailedPrecondition = 9,
    Aborted = 10,
    OutOfRange = 11,
    Unimplemented = 12,
    Internal = 13,
    Unavailable = 14,
    DataLoss = 15,
    Unauthenticated = 16,
}

impl Code {
    /// Converts a raw wire code; anything out of range is `Unknown`.
    pub fn from_i32(code: i32) -> Code {
        match code {
            0 => Code::Ok,
            1 => Code::Cancelled,
            2 => Code::Unknown,
            3 => Code::InvalidArgument,
            4 => Code::DeadlineExceeded,
            5 => Code::NotFound,
            6 => Code::AlreadyExists,
            7 => Code::PermissionDenied,
            8 => Code::ResourceExhausted,
            9 => Code::FailedPrecondition,
            10 => Code::Aborted,
            11 => Code::OutOfRange,
            12 => Code::Unimplemented,
            13 => Code::Internal,
            14 => Code::Unavailable,
            15 => Code::DataLoss,
            16 => Code::Unauthenticated,
            _ => Code::Unknown,
        }
    }

    /// Raw wire value of the code.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Type-tagged opaque payload, the wire convention for structured status
/// details.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Any {
    /// Fully qualified type URL of the packed message.
    pub type_url: String,

    /// Serialized message bytes.
    pub value: Bytes,
}

/// Status of a failed RPC call.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: Code,
    pub message: String,

    /// Structured details; per-item errors of a batch write travel here.
    pub details: Vec<Any>,
}

impl RpcStatus {
    /// Creates a status without details.
    pub fn new(code: Code, message: impl ToString) -> Self {
        RpcStatus {
            code,
            message: message.to_string(),
            details: vec![],
        }
    }

    /// Creates a status carrying the given details.
    pub fn with_details(
        code: Code,
        message: impl ToString,
        details: Vec<Any>,
    ) -> Self {
        RpcStatus {
            code,
            message: message.to_string(),
            details,
        }
    }
}

impl fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Outcome of one update within a batch write. A result array always holds
/// exactly one entry per update, aligned by position.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct WriteError {
    /// Canonical status code of this update.
    pub canonical_code: Code,

    pub message: String,

    /// Namespace of `code`; names the layer that produced a synthesized
    /// entry.
    pub space: String,

    /// Target-specific error code within `space`.
    pub code: i32,

    pub details: Option<Any>,
}

impl WriteError {
    /// Explicit success entry.
    pub fn ok() -> Self {
        WriteError::new(Code::Ok, "")
    }

    /// Entry with the given canonical code and message only.
    pub fn new(canonical_code: Code, message: impl ToString) -> Self {
        WriteError {
            canonical_code,
            message: message.to_string(),
            space: String::new(),
            code: 0,
            details: None,
        }
    }

    /// Returns true if this update succeeded.
    pub fn is_ok(&self) -> bool {
        self.canonical_code == Code::Ok
    }
}

#[cfg(test)]
mod status_tests {
    use super::*;

    #[test]
    fn code_from_wire() {
        for raw in 0..=16 {
            assert_eq!(Code::from_i32(raw).as_i32(), raw);
        }
        assert_eq!(Code::from_i32(-1), Code::Unknown);
        assert_eq!(Code::from_i32(17), Code::Unknown);
    }

    #[test]
    fn status_display() {
        let status = RpcStatus::new(Code::Unavailable, "switch unreachable");
        assert_eq!(
            format!("{}", status),
            String::from("Unavailable: switch unreachable")
        );
    }

    #[test]
    fn ok_entry_explicit() {
        let ok = WriteError::ok();
        assert!(ok.is_ok());
        assert_eq!(ok.canonical_code.as_i32(), 0);
        assert!(!WriteError::new(Code::Internal, "x").is_ok());
    }
}
