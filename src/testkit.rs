//! In-memory transport doubles shared by unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::runtime::p4rt::{self, P4Runtime};
use crate::runtime::{
    Code, ConnState, ControlStream, DialOptions, Dialer, RpcStatus,
    RuntimeStub, SwitchRuntime, Transport,
};
use crate::utils::P4PerfError;

use async_trait::async_trait;

use bytes::Bytes;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::{self, Duration};

/// Scripted write outcome.
pub(crate) type Responder<P> = Arc<
    dyn Fn(&<P as SwitchRuntime>::WriteRequest) -> Result<(), RpcStatus>
        + Send
        + Sync,
>;

/// How mock connections behave.
pub(crate) struct MockBehavior<P: SwitchRuntime> {
    pub(crate) responder: Responder<P>,

    /// If set, every write RPC holds until it takes one permit.
    pub(crate) gate: Option<Arc<Semaphore>>,

    pub(crate) fail_stream: bool,
}

impl<P: SwitchRuntime> Clone for MockBehavior<P> {
    fn clone(&self) -> Self {
        MockBehavior {
            responder: self.responder.clone(),
            gate: self.gate.clone(),
            fail_stream: self.fail_stream,
        }
    }
}

impl<P: SwitchRuntime> MockBehavior<P> {
    pub(crate) fn ok() -> Self {
        Self::responding(|_| Ok(()))
    }

    pub(crate) fn responding<F>(f: F) -> Self
    where
        F: Fn(&P::WriteRequest) -> Result<(), RpcStatus>
            + Send
            + Sync
            + 'static,
    {
        MockBehavior {
            responder: Arc::new(f),
            gate: None,
            fail_stream: false,
        }
    }

    pub(crate) fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn failing_stream(mut self) -> Self {
        self.fail_stream = true;
        self
    }
}

/// Start/end of the n-th write RPC seen by a connection.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum RpcEvent {
    Start(usize),
    End(usize),
}

/// Target-side ends of one control stream.
pub(crate) struct StreamServer<P: SwitchRuntime> {
    pub(crate) rx_req: mpsc::Receiver<P::StreamRequest>,
    pub(crate) tx_resp: mpsc::Sender<Result<P::StreamResponse, RpcStatus>>,
}

/// Mock connection to one host.
pub(crate) struct MockConn<P: SwitchRuntime> {
    host: String,
    behavior: MockBehavior<P>,
    tx_state: watch::Sender<ConnState>,
    calls: AtomicUsize,
    writes: Mutex<Vec<P::WriteRequest>>,
    events: Mutex<Vec<RpcEvent>>,
    servers: Mutex<Vec<StreamServer<P>>>,
    streams_opened: AtomicUsize,
}

impl<P: SwitchRuntime> MockConn<P> {
    pub(crate) fn new(host: &str, behavior: MockBehavior<P>) -> Self {
        let (tx_state, _) = watch::channel(ConnState::Ready);
        MockConn {
            host: host.into(),
            behavior,
            tx_state,
            calls: AtomicUsize::new(0),
            writes: Mutex::new(vec![]),
            events: Mutex::new(vec![]),
            servers: Mutex::new(vec![]),
            streams_opened: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_state(&self, state: ConnState) {
        self.tx_state.send_replace(state);
    }

    /// Requests received so far, in RPC start order.
    pub(crate) fn writes(&self) -> Vec<P::WriteRequest> {
        self.writes.lock().unwrap().clone()
    }

    pub(crate) fn events(&self) -> Vec<RpcEvent> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }

    /// Takes the target side of the oldest open control stream.
    pub(crate) fn take_stream_server(&self) -> StreamServer<P> {
        self.servers.lock().unwrap().remove(0)
    }
}

#[async_trait]
impl<P: SwitchRuntime> Transport for MockConn<P> {
    fn host(&self) -> &str {
        &self.host
    }

    fn state(&self) -> ConnState {
        *self.tx_state.borrow()
    }

    async fn wait_for_state_change(&self, from: ConnState) -> ConnState {
        let mut rx_state = self.tx_state.subscribe();
        let changed = rx_state.wait_for(|s| *s != from).await.map(|s| *s);
        changed.unwrap_or(ConnState::Shutdown)
    }
}

#[async_trait]
impl<P: SwitchRuntime> RuntimeStub<P> for MockConn<P> {
    async fn write(&self, req: P::WriteRequest) -> Result<(), RpcStatus> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push(RpcEvent::Start(idx));
        self.writes.lock().unwrap().push(req.clone());
        if let Some(gate) = &self.behavior.gate {
            gate.acquire().await.unwrap().forget();
        }
        let outcome = (self.behavior.responder)(&req);
        self.events.lock().unwrap().push(RpcEvent::End(idx));
        outcome
    }

    async fn stream_channel(&self) -> Result<ControlStream<P>, RpcStatus> {
        if self.behavior.fail_stream {
            return Err(RpcStatus::new(Code::Unavailable, "stream refused"));
        }
        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let (tx_req, rx_req) = mpsc::channel(16);
        let (tx_resp, rx_resp) = mpsc::channel(16);
        self.servers
            .lock()
            .unwrap()
            .push(StreamServer { rx_req, tx_resp });
        Ok(ControlStream {
            tx: tx_req,
            rx: rx_resp,
        })
    }
}

/// Mock dialer counting dials; refuses hosts on its refusal list.
pub(crate) struct MockDialer<P: SwitchRuntime> {
    behavior: MockBehavior<P>,
    dials: Arc<AtomicUsize>,
    refused: Mutex<HashSet<String>>,
}

impl<P: SwitchRuntime> MockDialer<P> {
    pub(crate) fn new(behavior: MockBehavior<P>) -> Self {
        MockDialer {
            behavior,
            dials: Arc::new(AtomicUsize::new(0)),
            refused: Mutex::new(HashSet::new()),
        }
    }

    pub(crate) fn refuse(&self, host: &str) {
        self.refused.lock().unwrap().insert(host.into());
    }

    pub(crate) fn allow(&self, host: &str) {
        self.refused.lock().unwrap().remove(host);
    }

    /// Shared dial counter, readable after the dialer moved into a registry.
    pub(crate) fn dial_counter(&self) -> Arc<AtomicUsize> {
        self.dials.clone()
    }
}

#[async_trait]
impl<P: SwitchRuntime> Dialer for MockDialer<P> {
    type Conn = MockConn<P>;

    async fn dial(
        &self,
        host: &str,
        _opts: &DialOptions,
    ) -> Result<MockConn<P>, P4PerfError> {
        // widen the window for racing first-use callers
        time::sleep(Duration::from_millis(20)).await;
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.refused.lock().unwrap().contains(host) {
            return Err(P4PerfError::msg(format!(
                "connection refused: {}",
                host
            )));
        }
        Ok(MockConn::new(host, self.behavior.clone()))
    }
}

/// P4Runtime batch of `size` inserts tagged with `tag` in its role ID.
pub(crate) fn p4rt_batch(tag: u64, size: usize) -> p4rt::WriteRequest {
    let updates = (0..size)
        .map(|i| p4rt::Update {
            kind: p4rt::UpdateType::Insert,
            entity: p4rt::Entity::TableEntry(p4rt::TableEntry {
                table_id: 1,
                matches: vec![p4rt::FieldMatch {
                    field_id: 1,
                    kind: p4rt::FieldMatchKind::Exact {
                        value: Bytes::copy_from_slice(
                            &(i as u32).to_be_bytes(),
                        ),
                    },
                }],
                action: None,
                priority: 0,
            }),
        })
        .collect();
    p4rt::WriteRequest {
        device_id: 1,
        role_id: tag,
        election_id: None,
        updates,
        atomicity: p4rt::Atomicity::ContinueOnError,
    }
}

/// Responder failing every batch with a message naming its tag.
pub(crate) fn tag_echo() -> MockBehavior<P4Runtime> {
    MockBehavior::responding(|req: &p4rt::WriteRequest| {
        Err(RpcStatus::new(Code::Aborted, format!("req {}", req.role_id)))
    })
}
