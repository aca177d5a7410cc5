//! Per-client control stream session and mastership arbitration.

use std::fmt;
use std::sync::Arc;

use crate::runtime::{Code, RpcStatus, RuntimeStub, SwitchRuntime};
use crate::utils::P4PerfError;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

/// Lifecycle phase of a control stream session.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum SessionPhase {
    Unopened,
    Streaming,
    Master,
    Standby,
    Closed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Mastership view of one client, written only by its session.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct MastershipState<I> {
    /// Identity presented by the latest mastership request.
    pub identity: Option<I>,

    pub phase: SessionPhase,
}

impl<I> MastershipState<I> {
    pub fn is_master(&self) -> bool {
        self.phase == SessionPhase::Master
    }
}

/// Control stream session of one client. Owns the outgoing half of the
/// stream and the reader thread draining the incoming half.
pub(crate) struct Session<P: SwitchRuntime> {
    /// Logging prefix (client target).
    me: String,

    device_id: u64,

    /// Outgoing half of the control stream; the lock makes me the only
    /// writer at a time.
    tx_stream: Mutex<Option<mpsc::Sender<P::StreamRequest>>>,

    /// Mastership state, shared with the stream reader thread.
    tx_state: Arc<watch::Sender<MastershipState<P::Identity>>>,

    /// Join handle of the stream reader thread.
    reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl<P: SwitchRuntime> Session<P> {
    /// Creates an unopened session.
    pub(crate) fn new(me: String, device_id: u64) -> Self {
        let (tx_state, _) = watch::channel(MastershipState {
            identity: None,
            phase: SessionPhase::Unopened,
        });
        Session {
            me,
            device_id,
            tx_stream: Mutex::new(None),
            tx_state: Arc::new(tx_state),
            reader_handle: Mutex::new(None),
        }
    }

    /// Opens the duplex control stream over `conn` and spawns the stream
    /// reader thread.
    pub(crate) async fn open<C>(&self, conn: &C) -> Result<(), P4PerfError>
    where
        C: RuntimeStub<P>,
    {
        let mut reader_handle = self.reader_handle.lock().await;
        if reader_handle.is_some() {
            return logged_err!(self.me; "control stream already opened");
        }

        let stream = match conn.stream_channel().await {
            Ok(stream) => stream,
            Err(status) => {
                return logged_err!(
                    self.me;
                    "error opening control stream: {}",
                    status
                );
            }
        };
        *self.tx_stream.lock().await = Some(stream.tx);
        self.tx_state
            .send_modify(|state| state.phase = SessionPhase::Streaming);

        *reader_handle = Some(tokio::spawn(Self::stream_reader_thread(
            self.me.clone(),
            stream.rx,
            self.tx_state.clone(),
        )));
        pf_info!(self.me; "{} control stream opened", P::NAME);
        Ok(())
    }

    /// Sends one mastership request carrying `identity`. Does not wait for
    /// the acknowledgement; only a send failure is reported.
    pub(crate) async fn set_mastership(
        &self,
        identity: P::Identity,
    ) -> Result<(), P4PerfError> {
        let req = P::mastership_request(self.device_id, &identity)?;
        self.tx_state
            .send_modify(|state| state.identity = Some(identity.clone()));

        let tx_stream = self.tx_stream.lock().await;
        match tx_stream.as_ref() {
            Some(tx) => {
                pf_debug!(self.me; "requesting mastership as {:?}", identity);
                tx.send(req).await.map_err(|e| {
                    pf_error!(self.me; "error sending mastership request");
                    P4PerfError::from(e)
                })
            }
            None => logged_err!(self.me; "control stream not opened"),
        }
    }

    /// Current mastership snapshot.
    pub(crate) fn state(&self) -> MastershipState<P::Identity> {
        self.tx_state.borrow().clone()
    }

    /// Subscribes to mastership state changes.
    pub(crate) fn subscribe(
        &self,
    ) -> watch::Receiver<MastershipState<P::Identity>> {
        self.tx_state.subscribe()
    }

    /// Stops the reader thread and drops the outgoing half of the stream.
    pub(crate) async fn close(&self) {
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        self.tx_stream.lock().await.take();
        self.tx_state
            .send_modify(|state| state.phase = SessionPhase::Closed);
    }
}

// Session stream reader thread implementation
impl<P: SwitchRuntime> Session<P> {
    /// Phase reached on receiving one stream message.
    fn next_phase(resp: &P::StreamResponse) -> SessionPhase {
        match P::arbitration_status(resp) {
            Some(Code::Ok) => SessionPhase::Master,
            _ => SessionPhase::Standby,
        }
    }

    /// Stream reader thread function. Exits on the first receive error; no
    /// reconnection is attempted.
    async fn stream_reader_thread(
        me: String,
        mut rx_stream: mpsc::Receiver<Result<P::StreamResponse, RpcStatus>>,
        tx_state: Arc<watch::Sender<MastershipState<P::Identity>>>,
    ) {
        pf_debug!(me; "stream reader thread spawned");

        loop {
            match rx_stream.recv().await {
                Some(Ok(resp)) => {
                    let phase = Self::next_phase(&resp);
                    pf_trace!(me; "stream recv {:?}", resp);
                    let prev = tx_state.borrow().phase;
                    if prev != phase {
                        tx_state.send_modify(|state| state.phase = phase);
                        match phase {
                            SessionPhase::Master => {
                                pf_info!(me; "client is master")
                            }
                            _ => pf_info!(me; "client is not master"),
                        }
                    }
                }
                Some(Err(status)) => {
                    pf_warn!(me; "stream recv error: {}", status);
                    break;
                }
                None => {
                    pf_warn!(me; "stream closed by target");
                    break;
                }
            }
        }

        tx_state.send_modify(|state| state.phase = SessionPhase::Closed);
        pf_debug!(me; "stream reader thread exitted");
    }
}
