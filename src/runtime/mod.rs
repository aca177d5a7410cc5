//! Switch runtime protocol model: status codes, per-item errors, codecs,
//! transport seams, and the two protocol variants.

mod codec;
mod status;
mod transport;

pub mod bfrt;
pub mod p4rt;

use std::fmt;

use crate::utils::P4PerfError;

pub use codec::{ErrorCodec, BFRT_ERROR_TYPE_URL, P4RT_ERROR_TYPE_URL};
pub use status::{Any, Code, RpcStatus, WriteError};
pub use transport::{
    ConnState, ControlStream, DialOptions, Dialer, RuntimeStub, Transport,
};

/// Device identifier within a host.
pub type DeviceId = u64;

/// Unique identity of one switch endpoint.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub struct Target {
    /// Host address of the switch agent.
    pub host: String,

    /// Device identifier on that host.
    pub device_id: DeviceId,
}

impl Target {
    pub fn new(host: impl ToString, device_id: DeviceId) -> Self {
        Target {
            host: host.to_string(),
            device_id,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}#{}", self.host, self.device_id)
    }
}

/// Protocol variant trait, implemented by the P4Runtime and BfRuntime
/// marker types. Everything the write pipeline and the mastership session
/// need to know about a protocol goes through here.
pub trait SwitchRuntime: Send + Sync + 'static {
    /// Protocol name used in logs.
    const NAME: &'static str;

    /// Identity presented in the mastership request (election ID or
    /// client ID).
    type Identity: Clone + fmt::Debug + Send + Sync + 'static;

    /// Batch write request.
    type WriteRequest: Clone + fmt::Debug + Send + Sync + 'static;

    /// Message sent on the control stream.
    type StreamRequest: fmt::Debug + Send + 'static;

    /// Message received on the control stream.
    type StreamResponse: fmt::Debug + Send + 'static;

    /// Number of updates carried by a write request.
    fn update_count(req: &Self::WriteRequest) -> usize;

    /// Builds the single control message requesting mastership of a device.
    fn mastership_request(
        device_id: DeviceId,
        identity: &Self::Identity,
    ) -> Result<Self::StreamRequest, P4PerfError>;

    /// Returns the status carried by an arbitration acknowledgement, or
    /// `None` if the message is anything else.
    fn arbitration_status(resp: &Self::StreamResponse) -> Option<Code>;

    /// Error codec matching this protocol's wire detail schema.
    fn default_codec() -> ErrorCodec;
}
