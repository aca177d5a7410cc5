//! Transport seams: the shared per-host connection, its dialer, and the
//! per-protocol RPC surface issued over it.

use std::fmt;

use crate::runtime::{RpcStatus, SwitchRuntime};
use crate::utils::P4PerfError;

use async_trait::async_trait;

use tokio::sync::mpsc;

/// Connectivity state of a shared connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ConnState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,

    /// Terminal state; the connection is never used again.
    Shutdown,
}

impl fmt::Display for ConnState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ConnState::Idle => "IDLE",
            ConnState::Connecting => "CONNECTING",
            ConnState::Ready => "READY",
            ConnState::TransientFailure => "TRANSIENT_FAILURE",
            ConnState::Shutdown => "SHUTDOWN",
        };
        write!(f, "{}", name)
    }
}

/// Options used when dialing a host.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DialOptions {
    /// Max size in bytes of one outgoing message.
    pub max_send_msg_size: usize,

    /// Max size in bytes of one incoming message.
    pub max_recv_msg_size: usize,
}

impl Default for DialOptions {
    fn default() -> Self {
        // bulk batches of table entries easily exceed the usual 4 MiB
        DialOptions {
            max_send_msg_size: 128 * 1024 * 1024,
            max_recv_msg_size: 128 * 1024 * 1024,
        }
    }
}

impl DialOptions {
    /// Parses dial options from an optional TOML string, falling back to
    /// defaults for fields not given.
    pub fn from_config_str(
        config_str: Option<&str>,
    ) -> Result<Self, P4PerfError> {
        let opts = parsed_config!(config_str => DialOptions;
                                  max_send_msg_size, max_recv_msg_size)?;
        if opts.max_send_msg_size == 0 || opts.max_recv_msg_size == 0 {
            return logged_err!("dial"; "invalid zero message size limit");
        }
        Ok(opts)
    }
}

/// Shared transport to one host. Must support concurrent independent calls
/// from any number of clients.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address this connection was dialed to.
    fn host(&self) -> &str;

    /// Current connectivity state.
    fn state(&self) -> ConnState;

    /// Waits until the state differs from `from`, returning the new state.
    async fn wait_for_state_change(&self, from: ConnState) -> ConnState;
}

/// Creates connections to hosts.
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Conn: Transport;

    /// Dials `host` with the given options.
    async fn dial(
        &self,
        host: &str,
        opts: &DialOptions,
    ) -> Result<Self::Conn, P4PerfError>;
}

/// Client-side ends of one duplex control stream.
pub struct ControlStream<P: SwitchRuntime> {
    /// Outgoing half; a closed channel means the stream is gone.
    pub tx: mpsc::Sender<P::StreamRequest>,

    /// Incoming half; yields an `Err` once on a receive error, or ends when
    /// the stream is closed.
    pub rx: mpsc::Receiver<Result<P::StreamResponse, RpcStatus>>,
}

/// RPC surface of protocol `P` over a shared connection.
#[async_trait]
pub trait RuntimeStub<P: SwitchRuntime>: Transport {
    /// Issues one batch write RPC. The reply message carries nothing; any
    /// failure details are in the returned status.
    async fn write(&self, req: P::WriteRequest) -> Result<(), RpcStatus>;

    /// Opens the duplex control stream used for mastership arbitration.
    async fn stream_channel(&self) -> Result<ControlStream<P>, RpcStatus>;
}

#[cfg(test)]
mod transport_tests {
    use super::*;

    #[test]
    fn dial_options_default() -> Result<(), P4PerfError> {
        let opts = DialOptions::from_config_str(None)?;
        assert_eq!(opts.max_send_msg_size, 128 * 1024 * 1024);
        assert_eq!(opts.max_recv_msg_size, 128 * 1024 * 1024);
        Ok(())
    }

    #[test]
    fn dial_options_parse() -> Result<(), P4PerfError> {
        let opts =
            DialOptions::from_config_str(Some("max_recv_msg_size = 4096"))?;
        assert_eq!(opts.max_send_msg_size, 128 * 1024 * 1024);
        assert_eq!(opts.max_recv_msg_size, 4096);
        assert!(
            DialOptions::from_config_str(Some("max_send_msg_size = 0"))
                .is_err()
        );
        assert!(DialOptions::from_config_str(Some("timeout = 1")).is_err());
        Ok(())
    }

    #[test]
    fn state_display() {
        assert_eq!(format!("{}", ConnState::Shutdown), "SHUTDOWN");
        assert_eq!(
            format!("{}", ConnState::TransientFailure),
            "TRANSIENT_FAILURE"
        );
    }
}
