//! Per-target runtime client: control stream session plus write pipeline.

use std::sync::Arc;

use crate::client::pipeline::{stopping_errors, WorkerContext, WriteUnit};
use crate::client::session::Session;
use crate::client::{MastershipState, TraceSink};
use crate::runtime::{
    DeviceId, ErrorCodec, RuntimeStub, SwitchRuntime, Target, WriteError,
};
use crate::utils::P4PerfError;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// Configuration parameters struct.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ClientConfig {
    /// Expected number of updates per batch; sizes the submission queue.
    pub batch_size: usize,

    /// Number of write worker threads.
    pub num_workers: usize,

    /// Submission queue capacity is `batch_size * num_workers * this`.
    pub queue_cap_factor: usize,

    /// Deadline of every write RPC in millisecs.
    pub rpc_timeout_ms: u64,

    /// Hold writes until the session is master instead of issuing them
    /// best-effort.
    ///
    /// Any stream message other than an OK arbitration ack demotes the
    /// session to standby. BfRuntime subscriptions enable learn, idle-timeout
    /// and port-status notifications, so on BfRuntime the first such
    /// notification makes every later write wait out the RPC deadline and
    /// fail with `FailedPrecondition`. Only enable this for P4Runtime.
    pub require_mastership: bool,

    /// Per-item error codec; `None` picks the protocol's own.
    pub error_codec: Option<ErrorCodec>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            batch_size: 100,
            num_workers: 1,
            queue_cap_factor: 10,
            rpc_timeout_ms: 30000,
            require_mastership: false,
            error_codec: None,
        }
    }
}

impl ClientConfig {
    /// Parses a config from an optional TOML string over the defaults.
    pub fn from_config_str(
        config_str: Option<&str>,
    ) -> Result<Self, P4PerfError> {
        parsed_config!(config_str => ClientConfig;
                       batch_size, num_workers, queue_cap_factor,
                       rpc_timeout_ms, require_mastership, error_codec)
    }

    /// Capacity of the bounded submission queue.
    pub fn queue_capacity(&self) -> usize {
        self.batch_size * self.num_workers * self.queue_cap_factor
    }

    fn validate(&self, me: &str) -> Result<(), P4PerfError> {
        if self.batch_size == 0 {
            return logged_err!(me; "invalid config.batch_size '{}'",
                                   self.batch_size);
        }
        if self.num_workers == 0 {
            return logged_err!(me; "invalid config.num_workers '{}'",
                                   self.num_workers);
        }
        if self.queue_cap_factor == 0 {
            return logged_err!(me; "invalid config.queue_cap_factor '{}'",
                                   self.queue_cap_factor);
        }
        if self.rpc_timeout_ms == 0 {
            return logged_err!(me; "invalid config.rpc_timeout_ms '{}'",
                                   self.rpc_timeout_ms);
        }
        Ok(())
    }
}

/// Runtime client of one target, speaking protocol `P` over a shared
/// connection `C`. Created once per target and shared behind an `Arc`.
pub struct RuntimeClient<P: SwitchRuntime, C: RuntimeStub<P>> {
    target: Target,

    config: ClientConfig,

    program_name: String,

    codec: ErrorCodec,

    session: Session<P>,

    /// Sender side of the submission queue.
    tx_write: mpsc::Sender<WriteUnit<P>>,

    /// Trace sink slot, observed by the write workers.
    tx_trace: watch::Sender<Option<TraceSink>>,

    /// Stop signal for the write workers.
    tx_stop: watch::Sender<bool>,

    /// State shared with the write worker threads.
    workers: Arc<WorkerContext<P, C>>,

    /// Join handles of the write worker threads.
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
}

// RuntimeClient public API implementation
impl<P: SwitchRuntime, C: RuntimeStub<P>> RuntimeClient<P, C> {
    /// Creates a client of `target` over `conn` and initializes it: opens
    /// the control stream and its reader thread, allocates the submission
    /// queue, and spawns the write worker threads.
    pub async fn new_and_setup(
        target: Target,
        conn: Arc<C>,
        config: ClientConfig,
        program_name: &str,
    ) -> Result<Self, P4PerfError> {
        let me = target.to_string();
        config.validate(&me)?;
        let codec = config.error_codec.unwrap_or_else(P::default_codec);

        let session = Session::new(me.clone(), target.device_id);
        session.open(conn.as_ref()).await?;

        let (tx_write, rx_write) = mpsc::channel(config.queue_capacity());
        let (tx_trace, rx_trace) = watch::channel(None);
        let (tx_stop, rx_stop) = watch::channel(false);

        let workers = Arc::new(WorkerContext {
            me: me.clone(),
            conn,
            codec,
            rpc_timeout: Duration::from_millis(config.rpc_timeout_ms),
            require_mastership: config.require_mastership,
            rx_write: Mutex::new(rx_write),
            rx_trace,
            rx_state: session.subscribe(),
        });
        let worker_handles = (0..config.num_workers)
            .map(|id| {
                tokio::spawn(
                    workers.clone().write_worker_thread(id, rx_stop.clone()),
                )
            })
            .collect();

        pf_info!(me; "{} client ready with {} workers, queue capacity {}",
                     P::NAME, config.num_workers, config.queue_capacity());
        Ok(RuntimeClient {
            target,
            config,
            program_name: program_name.into(),
            codec,
            session,
            tx_write,
            tx_trace,
            tx_stop,
            workers,
            worker_handles: Mutex::new(worker_handles),
        })
    }

    /// Requests mastership presenting `identity`. Returns once the request
    /// is sent; the outcome shows up later in `mastership()`.
    pub async fn set_mastership(
        &self,
        identity: P::Identity,
    ) -> Result<(), P4PerfError> {
        self.session.set_mastership(identity).await
    }

    /// Submits a batch write. The request is copied, so the caller may
    /// reuse or drop it right away. Waits only while the submission queue
    /// is full. The returned channel yields exactly one error array with
    /// one entry per update of `req`.
    pub async fn write(
        &self,
        req: &P::WriteRequest,
    ) -> oneshot::Receiver<Vec<WriteError>> {
        let (tx_reply, rx_reply) = oneshot::channel();
        let unit = WriteUnit {
            req: req.clone(),
            tx_reply,
        };

        if let Err(mpsc::error::SendError(unit)) =
            self.tx_write.send(unit).await
        {
            pf_debug!(self.target; "write submitted after shutdown");
            let batch_size = P::update_count(&unit.req);
            let _ = unit.tx_reply.send(stopping_errors(batch_size));
        }
        rx_reply
    }

    /// Installs (or with `None`, removes) the trace sink. Trace records are
    /// offered without blocking and dropped when the sink is full.
    pub fn set_write_trace_chan(&self, tx_trace: Option<TraceSink>) {
        self.tx_trace.send_replace(tx_trace);
    }

    /// Stops the client: write workers stop dequeuing (an RPC in flight
    /// finishes within its deadline), the control stream is closed, and
    /// every write still queued or submitted later is answered with
    /// `Unavailable` "service stopping" entries.
    pub async fn shutdown(&self) {
        if self.tx_stop.send_replace(true) {
            return; // already stopped
        }

        let handles: Vec<JoinHandle<()>> =
            self.worker_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                pf_warn!(self.target; "error joining write worker: {}", e);
            }
        }
        self.session.close().await;

        let mut rx_write = self.workers.rx_write.lock().await;
        let drained = WorkerContext::<P, C>::drain_stopping(&mut rx_write);
        pf_info!(self.target; "client stopped, {} queued writes cancelled",
                              drained);
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn device_id(&self) -> DeviceId {
        self.target.device_id
    }

    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Error codec in use for per-item details.
    pub fn codec(&self) -> ErrorCodec {
        self.codec
    }

    /// Shared connection this client issues its RPCs over.
    pub fn connection(&self) -> &Arc<C> {
        &self.workers.conn
    }

    /// Identity presented by the latest mastership request.
    pub fn identity(&self) -> Option<P::Identity> {
        self.session.state().identity
    }

    /// Snapshot of the mastership state.
    pub fn mastership(&self) -> MastershipState<P::Identity> {
        self.session.state()
    }

    pub fn is_master(&self) -> bool {
        self.session.state().is_master()
    }
}
