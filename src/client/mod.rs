//! Runtime client modules: shared connections, per-target clients with
//! their control stream session and write pipeline, and the registries
//! caching both.

mod client;
mod connection;
mod pipeline;
mod registry;
mod session;

pub use client::{ClientConfig, RuntimeClient};
pub use connection::ConnectionRegistry;
pub use pipeline::{TraceSink, WriteTrace};
pub use registry::ClientRegistry;
pub use session::{MastershipState, SessionPhase};

use crate::runtime::bfrt::BfRuntime;
use crate::runtime::p4rt::P4Runtime;

/// P4Runtime client over connection type `C`.
pub type P4RuntimeClient<C> = RuntimeClient<P4Runtime, C>;

/// BfRuntime client over connection type `C`.
pub type BfRuntimeClient<C> = RuntimeClient<BfRuntime, C>;
