//! P4Perf: a concurrent batch-write pipeline for programmable switches over
//! P4Runtime and BfRuntime, with shared per-host connections, per-target
//! clients and mastership sessions, and per-update error translation.

#[macro_use]
mod utils;

pub mod bench;
pub mod client;
pub mod resolver;
pub mod runtime;

#[cfg(test)]
mod testkit;

pub use utils::{logger_init, P4PerfError};

pub use client::{
    BfRuntimeClient, ClientConfig, ClientRegistry, ConnectionRegistry,
    MastershipState, P4RuntimeClient, RuntimeClient, SessionPhase, TraceSink,
    WriteTrace,
};
pub use resolver::{IdResolver, P4IdMap};
pub use runtime::{
    DeviceId, ErrorCodec, RpcStatus, SwitchRuntime, Target, WriteError,
};
