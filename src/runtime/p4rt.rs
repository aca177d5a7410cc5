//! P4Runtime (cross-vendor) protocol variant.

use crate::runtime::{Code, DeviceId, ErrorCodec, RpcStatus, SwitchRuntime};
use crate::utils::P4PerfError;

use bytes::Bytes;

use serde::{Deserialize, Serialize};

/// 128-bit election ID used for mastership arbitration.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Serialize,
    Deserialize,
)]
pub struct Uint128 {
    pub high: u64,
    pub low: u64,
}

impl Uint128 {
    pub fn new(high: u64, low: u64) -> Self {
        Uint128 { high, low }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum UpdateType {
    Unspecified,
    Insert,
    Modify,
    Delete,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Atomicity {
    ContinueOnError,
    RollbackOnError,
    DataplaneAtomic,
}

/// Match on one header/metadata field.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct FieldMatch {
    pub field_id: u32,
    pub kind: FieldMatchKind,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum FieldMatchKind {
    Exact { value: Bytes },
    Ternary { value: Bytes, mask: Bytes },
    Lpm { value: Bytes, prefix_len: i32 },
    Range { low: Bytes, high: Bytes },
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ActionParam {
    pub param_id: u32,
    pub value: Bytes,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: u32,
    pub params: Vec<ActionParam>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum TableAction {
    Action(Action),
    ActionProfileMemberId(u32),
    ActionProfileGroupId(u32),
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub table_id: u32,
    pub matches: Vec<FieldMatch>,
    pub action: Option<TableAction>,

    /// Required for ternary/range tables, ignored otherwise.
    pub priority: i32,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum Entity {
    TableEntry(TableEntry),
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Update {
    pub kind: UpdateType,
    pub entity: Entity,
}

/// Batch write request.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub device_id: DeviceId,
    pub role_id: u64,
    pub election_id: Option<Uint128>,
    pub updates: Vec<Update>,
    pub atomicity: Atomicity,
}

/// Mastership arbitration message, sent by the client and echoed back by
/// the target with a status.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct MasterArbitrationUpdate {
    pub device_id: DeviceId,
    pub election_id: Option<Uint128>,

    /// `Ok` if the receiver is master; set by the target only.
    pub status: Option<RpcStatus>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PacketOut {
    pub payload: Bytes,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct PacketIn {
    pub payload: Bytes,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StreamMessageRequest {
    Arbitration(MasterArbitrationUpdate),
    Packet(PacketOut),
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StreamMessageResponse {
    Arbitration(MasterArbitrationUpdate),
    Packet(PacketIn),
    Error(RpcStatus),
}

/// P4Runtime protocol marker.
#[derive(Debug, Clone, Copy)]
pub struct P4Runtime;

impl SwitchRuntime for P4Runtime {
    const NAME: &'static str = "p4runtime";

    type Identity = Uint128;
    type WriteRequest = WriteRequest;
    type StreamRequest = StreamMessageRequest;
    type StreamResponse = StreamMessageResponse;

    fn update_count(req: &WriteRequest) -> usize {
        req.updates.len()
    }

    fn mastership_request(
        device_id: DeviceId,
        election_id: &Uint128,
    ) -> Result<StreamMessageRequest, P4PerfError> {
        Ok(StreamMessageRequest::Arbitration(MasterArbitrationUpdate {
            device_id,
            election_id: Some(*election_id),
            status: None,
        }))
    }

    fn arbitration_status(resp: &StreamMessageResponse) -> Option<Code> {
        match resp {
            // absent status decodes as the zero code on the wire
            StreamMessageResponse::Arbitration(arb) => {
                Some(arb.status.as_ref().map_or(Code::Ok, |s| s.code))
            }
            _ => None,
        }
    }

    fn default_codec() -> ErrorCodec {
        ErrorCodec::P4Runtime
    }
}

#[cfg(test)]
mod p4rt_tests {
    use super::*;

    #[test]
    fn arbitration_request() -> Result<(), P4PerfError> {
        let req = P4Runtime::mastership_request(3, &Uint128::new(0, 1))?;
        assert_eq!(
            req,
            StreamMessageRequest::Arbitration(MasterArbitrationUpdate {
                device_id: 3,
                election_id: Some(Uint128::new(0, 1)),
                status: None,
            })
        );
        Ok(())
    }

    #[test]
    fn arbitration_outcome() {
        let arb = |status| {
            StreamMessageResponse::Arbitration(MasterArbitrationUpdate {
                device_id: 1,
                election_id: Some(Uint128::new(0, 1)),
                status,
            })
        };
        assert_eq!(P4Runtime::arbitration_status(&arb(None)), Some(Code::Ok));
        assert_eq!(
            P4Runtime::arbitration_status(&arb(Some(RpcStatus::new(
                Code::AlreadyExists,
                "not master"
            )))),
            Some(Code::AlreadyExists)
        );
        let pkt = StreamMessageResponse::Packet(PacketIn {
            payload: Bytes::from_static(b"\x00"),
        });
        assert_eq!(P4Runtime::arbitration_status(&pkt), None);
    }

    #[test]
    fn election_id_order() {
        assert!(Uint128::new(1, 0) > Uint128::new(0, u64::MAX));
    }
}
