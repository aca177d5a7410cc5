//! Per-item error codecs and translation of one write RPC outcome into a
//! positionally aligned error array.

use std::fmt;

use crate::runtime::{Any, Code, RpcStatus, WriteError};
use crate::utils::P4PerfError;

use serde::{Deserialize, Serialize};

use rmp_serde::decode::from_slice as decode_from_slice;
use rmp_serde::encode::to_vec as encode_to_vec;

/// Type URL of a P4Runtime per-item error detail.
pub const P4RT_ERROR_TYPE_URL: &str = "type.googleapis.com/p4.v1.Error";

/// Type URL of a BfRuntime per-item error detail.
pub const BFRT_ERROR_TYPE_URL: &str = "type.googleapis.com/bfrt_proto.Error";

/// Wire layout of a P4Runtime per-item error detail.
#[derive(Debug, Serialize, Deserialize)]
struct P4ErrorDetail {
    canonical_code: i32,
    message: String,
    space: String,
    code: i32,
    details: Option<Any>,
}

/// Wire layout of a BfRuntime per-item error detail. The legacy schema has
/// no nested details.
#[derive(Debug, Serialize, Deserialize)]
struct BfrtErrorDetail {
    canonical_code: i32,
    message: String,
    space: String,
    code: i32,
}

/// Codec for the per-item error details embedded in a failed write status.
/// Selected per client, defaulting to the protocol's own schema.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCodec {
    P4Runtime,
    BfRuntime,
}

impl fmt::Display for ErrorCodec {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorCodec::P4Runtime => write!(f, "p4runtime"),
            ErrorCodec::BfRuntime => write!(f, "bfruntime"),
        }
    }
}

impl ErrorCodec {
    /// Type URL of the detail messages this codec understands.
    pub fn type_url(&self) -> &'static str {
        match self {
            ErrorCodec::P4Runtime => P4RT_ERROR_TYPE_URL,
            ErrorCodec::BfRuntime => BFRT_ERROR_TYPE_URL,
        }
    }

    /// Namespace stamped on entries synthesized by this layer.
    pub fn space(&self) -> &'static str {
        match self {
            ErrorCodec::P4Runtime => "p4rt-rs",
            ErrorCodec::BfRuntime => "bfrt-rs",
        }
    }

    /// Decodes one per-item detail.
    pub fn decode(&self, detail: &Any) -> Result<WriteError, P4PerfError> {
        if detail.type_url != self.type_url() {
            return Err(P4PerfError(format!(
                "unexpected error detail type '{}'",
                detail.type_url
            )));
        }

        match self {
            ErrorCodec::P4Runtime => {
                let wire: P4ErrorDetail = decode_from_slice(&detail.value)?;
                Ok(WriteError {
                    canonical_code: Code::from_i32(wire.canonical_code),
                    message: wire.message,
                    space: wire.space,
                    code: wire.code,
                    details: wire.details,
                })
            }
            ErrorCodec::BfRuntime => {
                let wire: BfrtErrorDetail = decode_from_slice(&detail.value)?;
                Ok(WriteError {
                    canonical_code: Code::from_i32(wire.canonical_code),
                    message: wire.message,
                    space: wire.space,
                    code: wire.code,
                    details: None,
                })
            }
        }
    }

    /// Encodes one per-item error the way a target packs it into a status
    /// detail.
    pub fn encode(&self, err: &WriteError) -> Result<Any, P4PerfError> {
        let value = match self {
            ErrorCodec::P4Runtime => encode_to_vec(&P4ErrorDetail {
                canonical_code: err.canonical_code.as_i32(),
                message: err.message.clone(),
                space: err.space.clone(),
                code: err.code,
                details: err.details.clone(),
            })?,
            ErrorCodec::BfRuntime => encode_to_vec(&BfrtErrorDetail {
                canonical_code: err.canonical_code.as_i32(),
                message: err.message.clone(),
                space: err.space.clone(),
                code: err.code,
            })?,
        };
        Ok(Any {
            type_url: self.type_url().into(),
            value: value.into(),
        })
    }

    /// Stand-in entry originating from this layer.
    pub fn synthesize(&self, code: Code, message: impl ToString) -> WriteError {
        WriteError {
            space: self.space().into(),
            ..WriteError::new(code, message)
        }
    }

    /// Translates one write RPC outcome into exactly `batch_size` entries:
    ///   - success: all entries explicitly OK
    ///   - failure carrying exactly `batch_size` details: each detail decoded
    ///     in place, a malformed one replaced by an `Internal` stand-in
    ///   - any other failure: the aggregate status replicated everywhere
    pub fn translate(
        &self,
        outcome: &Result<(), RpcStatus>,
        batch_size: usize,
    ) -> Vec<WriteError> {
        let status = match outcome {
            Ok(()) => return vec![WriteError::ok(); batch_size],
            Err(status) => status,
        };

        if batch_size > 0
            && status.code != Code::Ok
            && status.details.len() == batch_size
        {
            return status
                .details
                .iter()
                .map(|detail| {
                    self.decode(detail).unwrap_or_else(|e| {
                        self.synthesize(Code::Internal, e.to_string())
                    })
                })
                .collect();
        }

        vec![WriteError::new(status.code, &status.message); batch_size]
    }
}
