//! Benchmark helpers: routing-table write workload generation, failure
//! counting, and latency summaries of write traces.

use crate::client::{RuntimeClient, TraceSink, WriteTrace};
use crate::resolver::IdResolver;
use crate::runtime::p4rt::{
    self, Action, ActionParam, Atomicity, Entity, FieldMatch, FieldMatchKind,
    TableAction, TableEntry, Uint128, Update, UpdateType,
};
use crate::runtime::{DeviceId, RuntimeStub, SwitchRuntime, WriteError};
use crate::utils::P4PerfError;

use bytes::Bytes;

use tokio::sync::mpsc;
use tokio::time::Duration;

use statistical::{mean, standard_deviation};

/// Fully qualified name of the IPv4 routing table.
pub const ROUTING_TABLE: &str = "FabricIngress.forwarding.routing_v4";

/// Fully qualified name of the routing table's next-id action.
pub const ROUTING_ACTION: &str =
    "FabricIngress.forwarding.set_next_id_routing_v4";

/// Number of non-OK entries in an error array.
pub fn count_failed(errors: &[WriteError]) -> usize {
    errors.iter().filter(|e| !e.is_ok()).count()
}

/// Generator of P4Runtime insert batches into the IPv4 routing table. Route
/// number `n` is a /32 to the address made of the low 32 bits of `n`, all
/// pointing to next id 1.
#[derive(Debug, Clone)]
pub struct RoutingWorkload {
    table_id: u32,
    action_id: u32,
    device_id: DeviceId,
    election_id: Option<Uint128>,
}

impl RoutingWorkload {
    /// Resolves the routing table and action IDs through `resolver`.
    pub fn new(
        resolver: &impl IdResolver,
        device_id: DeviceId,
        election_id: Option<Uint128>,
    ) -> Result<Self, P4PerfError> {
        Ok(RoutingWorkload {
            table_id: resolver.resolve(ROUTING_TABLE)?,
            action_id: resolver.resolve(ROUTING_ACTION)?,
            device_id,
            election_id,
        })
    }

    /// Insert of route number `n`.
    fn route_update(&self, n: usize) -> Update {
        let dst = (n as u64 & 0xffff_ffff) as u32;
        Update {
            kind: UpdateType::Insert,
            entity: Entity::TableEntry(TableEntry {
                table_id: self.table_id,
                matches: vec![FieldMatch {
                    field_id: 1, // ipv4_dst
                    kind: FieldMatchKind::Lpm {
                        value: Bytes::copy_from_slice(&dst.to_be_bytes()),
                        prefix_len: 32,
                    },
                }],
                action: Some(TableAction::Action(Action {
                    action_id: self.action_id,
                    params: vec![ActionParam {
                        param_id: 1, // next_id
                        value: Bytes::copy_from_slice(&1u32.to_be_bytes()),
                    }],
                })),
                priority: 0,
            }),
        }
    }

    /// The `iter`-th batch: routes `iter * batch_size` up to the next batch.
    pub fn batch(&self, iter: usize, batch_size: usize) -> p4rt::WriteRequest {
        p4rt::WriteRequest {
            device_id: self.device_id,
            role_id: 0,
            election_id: self.election_id,
            updates: (0..batch_size)
                .map(|j| self.route_update(iter * batch_size + j))
                .collect(),
            atomicity: Atomicity::ContinueOnError,
        }
    }

    /// All `iterations` batches in issue order.
    pub fn batches(
        &self,
        iterations: usize,
        batch_size: usize,
    ) -> Vec<p4rt::WriteRequest> {
        (0..iterations).map(|i| self.batch(i, batch_size)).collect()
    }
}

/// Submits every request through `client` back to back, then waits for all
/// replies. Returns the total number of failed updates; each failure is
/// logged.
pub async fn issue_all<P, C>(
    client: &RuntimeClient<P, C>,
    reqs: &[P::WriteRequest],
) -> Result<usize, P4PerfError>
where
    P: SwitchRuntime,
    C: RuntimeStub<P>,
{
    let mut rx_replies = Vec::with_capacity(reqs.len());
    for req in reqs {
        rx_replies.push(client.write(req).await);
    }

    let mut failed = 0;
    for (i, rx_reply) in rx_replies.into_iter().enumerate() {
        let errors = rx_reply.await?;
        for (j, e) in errors.iter().enumerate().filter(|(_, e)| !e.is_ok()) {
            pf_warn!(client.target(); "batch {} update {} -> {}: {}",
                                      i, j, e.canonical_code, e.message);
        }
        failed += count_failed(&errors);
    }
    Ok(failed)
}

/// Latency/outcome summary over a run of write traces.
#[derive(Debug, PartialEq, Clone)]
pub struct TraceSummary {
    /// Per-batch RPC durations in completion order.
    pub durations: Vec<Duration>,

    /// Total number of failed updates.
    pub failed: usize,

    pub mean_us: f64,
    pub stdev_us: f64,
}

/// Receiving end of a trace sink.
#[derive(Debug)]
pub struct TraceCollector {
    rx_trace: mpsc::Receiver<WriteTrace>,
}

impl TraceCollector {
    /// Creates a collector and the sink to install on clients.
    pub fn new(capacity: usize) -> (Self, TraceSink) {
        let (tx_trace, rx_trace) = mpsc::channel(capacity);
        (TraceCollector { rx_trace }, tx_trace)
    }

    /// Collects exactly `iterations` traces and summarizes them. Fails if
    /// every sink sender is dropped before that.
    pub async fn collect(
        &mut self,
        iterations: usize,
    ) -> Result<TraceSummary, P4PerfError> {
        let mut durations = Vec::with_capacity(iterations);
        let mut failed = 0;
        while durations.len() < iterations {
            let trace = match self.rx_trace.recv().await {
                Some(trace) => trace,
                None => {
                    return logged_err!("bench"; "trace channel closed after {} of {} traces",
                                                durations.len(), iterations);
                }
            };
            failed += count_failed(&trace.errors);
            durations.push(trace.duration);
        }
        Ok(Self::summarize(durations, failed))
    }

    fn summarize(durations: Vec<Duration>, failed: usize) -> TraceSummary {
        let us: Vec<f64> =
            durations.iter().map(|d| d.as_micros() as f64).collect();
        let (mean_us, stdev_us) = match us.len() {
            0 => (0.0, 0.0),
            1 => (us[0], 0.0),
            _ => {
                let mean_us = mean(&us);
                (mean_us, standard_deviation(&us, Some(mean_us)))
            }
        };
        TraceSummary {
            durations,
            failed,
            mean_us,
            stdev_us,
        }
    }
}
