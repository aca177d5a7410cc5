//! Write pipeline: the bounded submission queue drained by a fixed pool of
//! write worker threads, and the response dispatch of each completed RPC.

use std::sync::Arc;

use crate::client::{MastershipState, SessionPhase};
use crate::runtime::{
    Code, ErrorCodec, RpcStatus, RuntimeStub, SwitchRuntime, WriteError,
};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::{self, Duration, Instant};

/// Latency/outcome sample of one completed batch write.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct WriteTrace {
    /// Number of updates in the batch.
    pub batch_size: usize,

    /// Wall time of the write RPC.
    pub duration: Duration,

    pub errors: Vec<WriteError>,
}

/// Sender side of an externally owned trace channel.
pub type TraceSink = mpsc::Sender<WriteTrace>;

/// One queued write: a private copy of the request plus its single-use
/// reply channel.
pub(crate) struct WriteUnit<P: SwitchRuntime> {
    pub(crate) req: P::WriteRequest,
    pub(crate) tx_reply: oneshot::Sender<Vec<WriteError>>,
}

/// Error array answering a write that will never be issued.
pub(crate) fn stopping_errors(batch_size: usize) -> Vec<WriteError> {
    vec![WriteError::new(Code::Unavailable, "service stopping"); batch_size]
}

/// State shared by all write worker threads of one client.
pub(crate) struct WorkerContext<P: SwitchRuntime, C: RuntimeStub<P>> {
    /// Logging prefix (client target).
    pub(crate) me: String,

    pub(crate) conn: Arc<C>,

    pub(crate) codec: ErrorCodec,

    /// Deadline of every write RPC.
    pub(crate) rpc_timeout: Duration,

    /// If true, RPCs are only issued while the session is master.
    pub(crate) require_mastership: bool,

    /// Receiver side of the submission queue; workers take turns on it.
    pub(crate) rx_write: Mutex<mpsc::Receiver<WriteUnit<P>>>,

    /// Currently installed trace sink, if any.
    pub(crate) rx_trace: watch::Receiver<Option<TraceSink>>,

    pub(crate) rx_state: watch::Receiver<MastershipState<P::Identity>>,
}

// WorkerContext write worker thread implementation
impl<P: SwitchRuntime, C: RuntimeStub<P>> WorkerContext<P, C> {
    /// Write worker thread function. Dequeues one unit at a time and issues
    /// its RPC; RPCs of one worker never overlap. Stops dequeuing once the
    /// stop signal is raised, finishing any RPC in flight first.
    pub(crate) async fn write_worker_thread(
        self: Arc<Self>,
        id: usize,
        mut rx_stop: watch::Receiver<bool>,
    ) {
        pf_debug!(self.me; "write worker {} spawned", id);

        loop {
            if *rx_stop.borrow() {
                break;
            }

            let unit = tokio::select! {
                biased;

                changed = rx_stop.changed() => {
                    if changed.is_err() {
                        pf_debug!(self.me; "client dropped, worker {} stopping", id);
                    }
                    break;
                }

                unit = async { self.rx_write.lock().await.recv().await } => {
                    match unit {
                        Some(unit) => unit,
                        None => break,
                    }
                }
            };

            let batch_size = P::update_count(&unit.req);
            let gate = if self.require_mastership {
                self.await_mastership().await
            } else {
                Ok(())
            };

            let start = Instant::now();
            let outcome = match gate {
                Ok(()) => self.issue_write(unit.req).await,
                Err(status) => Err(status),
            };
            let duration = start.elapsed();

            self.dispatch(unit.tx_reply, &outcome, batch_size, duration);
        }

        pf_debug!(self.me; "write worker {} exitted", id);
    }

    /// Answers every unit left in the closed submission queue.
    pub(crate) fn drain_stopping(
        rx_write: &mut mpsc::Receiver<WriteUnit<P>>,
    ) -> usize {
        rx_write.close();
        let mut drained = 0;
        while let Ok(unit) = rx_write.try_recv() {
            let batch_size = P::update_count(&unit.req);
            let _ = unit.tx_reply.send(stopping_errors(batch_size));
            drained += 1;
        }
        drained
    }

    /// Waits until the session is master, bounded by the RPC deadline.
    async fn await_mastership(&self) -> Result<(), RpcStatus> {
        let mut rx_state = self.rx_state.clone();
        let phase = time::timeout(
            self.rpc_timeout,
            rx_state.wait_for(|s| {
                s.phase == SessionPhase::Master
                    || s.phase == SessionPhase::Closed
            }),
        )
        .await
        .ok()
        .and_then(|r| r.ok().map(|s| s.phase));

        match phase {
            Some(SessionPhase::Master) => Ok(()),
            _ => Err(RpcStatus::new(
                Code::FailedPrecondition,
                "mastership not acquired",
            )),
        }
    }

    /// Issues one write RPC under the configured deadline.
    async fn issue_write(&self, req: P::WriteRequest) -> Result<(), RpcStatus> {
        match time::timeout(self.rpc_timeout, self.conn.write(req)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(RpcStatus::new(
                Code::DeadlineExceeded,
                format!(
                    "write RPC timed out after {} ms",
                    self.rpc_timeout.as_millis()
                ),
            )),
        }
    }

    /// Translates an RPC outcome into the unit's error array, delivers it,
    /// and offers a trace record to the sink if one is installed. Never
    /// blocks.
    fn dispatch(
        &self,
        tx_reply: oneshot::Sender<Vec<WriteError>>,
        outcome: &Result<(), RpcStatus>,
        batch_size: usize,
        duration: Duration,
    ) {
        let errors = self.codec.translate(outcome, batch_size);
        let sink = self.rx_trace.borrow().clone();
        let trace_errors = sink.as_ref().map(|_| errors.clone());

        if tx_reply.send(errors).is_err() {
            pf_debug!(self.me; "reply receiver dropped before completion");
        }

        if let (Some(tx_trace), Some(errors)) = (sink, trace_errors) {
            let trace = WriteTrace {
                batch_size,
                duration,
                errors,
            };
            match tx_trace.try_send(trace) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    pf_warn!(self.me; "write trace channel full, discarding trace");
                }
                Err(TrySendError::Closed(_)) => {
                    pf_debug!(self.me; "write trace channel closed, discarding trace");
                }
            }
        }
    }
}

// Runs once the owning client and every worker are gone, so a client
// dropped without `shutdown()` still answers its queued writes.
impl<P: SwitchRuntime, C: RuntimeStub<P>> Drop for WorkerContext<P, C> {
    fn drop(&mut self) {
        let drained = Self::drain_stopping(self.rx_write.get_mut());
        if drained > 0 {
            pf_info!(self.me; "{} queued writes cancelled on drop", drained);
        }
    }
}
