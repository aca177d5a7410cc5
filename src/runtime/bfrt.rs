//! BfRuntime (vendor legacy) protocol variant.

use crate::runtime::{Code, DeviceId, ErrorCodec, RpcStatus, SwitchRuntime};
use crate::utils::P4PerfError;

use bytes::Bytes;

use serde::{Deserialize, Serialize};

/// BfRuntime client ID, presented as the mastership identity.
pub type ClientId = u32;

/// Addressing of a device, pipe, and parser within a target.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct TargetDevice {
    pub device_id: u32,
    pub pipe_id: u32,
    pub direction: u32,
    pub prsr_id: u32,
}

impl TargetDevice {
    /// Target covering all pipes of a device.
    pub fn all_pipes(device_id: u32) -> Self {
        TargetDevice {
            device_id,
            pipe_id: 0xffff,
            direction: 0xff,
            prsr_id: 0xff,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum UpdateType {
    Unspecified,
    Insert,
    Modify,
    InsertOrModify,
    Delete,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Atomicity {
    ContinueOnError,
    RollbackOnError,
    DataplaneAtomic,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct KeyField {
    pub field_id: u32,
    pub kind: KeyMatch,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum KeyMatch {
    Exact { value: Bytes },
    Ternary { value: Bytes, mask: Bytes },
    Lpm { value: Bytes, prefix_len: i32 },
    Range { low: Bytes, high: Bytes },
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct DataField {
    pub field_id: u32,
    pub value: Bytes,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct TableData {
    pub action_id: u32,
    pub fields: Vec<DataField>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct TableEntry {
    pub table_id: u32,
    pub key: Vec<KeyField>,
    pub data: Option<TableData>,
    pub is_default_entry: bool,
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
    pub target: TargetDevice,
    pub client_id: ClientId,
    pub updates: Vec<Update>,
    pub atomicity: Atomicity,

    /// Name of the program the entries belong to.
    pub p4_name: String,
}

/// Notification kinds a subscriber opts into.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub struct Notifications {
    pub enable_learn_notifications: bool,
    pub enable_idletimeout_notifications: bool,
    pub enable_port_status_change_notifications: bool,
}

/// Subscription (mastership) request, echoed back by the target with a
/// status.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Subscribe {
    pub device_id: u32,
    pub is_master: bool,
    pub notifications: Notifications,

    /// Set by the target only.
    pub status: Option<RpcStatus>,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StreamRequestUpdate {
    Subscribe(Subscribe),
    DigestAck { digest_id: u32, list_id: u32 },
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct StreamMessageRequest {
    pub client_id: ClientId,
    pub update: StreamRequestUpdate,
}

#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum StreamMessageResponse {
    Subscribe(Subscribe),
    Digest {
        digest_id: u32,
        list_id: u32,
        data: Vec<Bytes>,
    },
    IdleTimeout {
        table_id: u32,
    },
    PortStatusChange {
        port: u32,
        up: bool,
    },
}

/// BfRuntime protocol marker.
#[derive(Debug, Clone, Copy)]
pub struct BfRuntime;

impl SwitchRuntime for BfRuntime {
    const NAME: &'static str = "bfruntime";

    type Identity = ClientId;
    type WriteRequest = WriteRequest;
    type StreamRequest = StreamMessageRequest;
    type StreamResponse = StreamMessageResponse;

    fn update_count(req: &WriteRequest) -> usize {
        req.updates.len()
    }

    fn mastership_request(
        device_id: DeviceId,
        client_id: &ClientId,
    ) -> Result<StreamMessageRequest, P4PerfError> {
        let device_id = u32::try_from(device_id)?;
        Ok(StreamMessageRequest {
            client_id: *client_id,
            update: StreamRequestUpdate::Subscribe(Subscribe {
                device_id,
                is_master: true,
                notifications: Notifications {
                    enable_learn_notifications: true,
                    enable_idletimeout_notifications: true,
                    enable_port_status_change_notifications: true,
                },
                status: None,
            }),
        })
    }

    fn arbitration_status(resp: &StreamMessageResponse) -> Option<Code> {
        match resp {
            StreamMessageResponse::Subscribe(sub) => {
                Some(sub.status.as_ref().map_or(Code::Ok, |s| s.code))
            }
            _ => None,
        }
    }

    fn default_codec() -> ErrorCodec {
        ErrorCodec::BfRuntime
    }
}
