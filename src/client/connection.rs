//! Connection registry: one shared transport per host.

use std::sync::Arc;

use crate::runtime::{ConnState, DialOptions, Dialer, Transport};
use crate::utils::{OnceMap, P4PerfError};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Registry caching one shared connection per host address. The first
/// caller for a host dials it and spawns its monitor thread; concurrent
/// first-use callers wait for that single dial.
pub struct ConnectionRegistry<D: Dialer> {
    dialer: D,

    opts: DialOptions,

    /// Map from host address -> shared connection.
    conns: OnceMap<String, Arc<D::Conn>>,

    /// Join handles of the connection monitor threads.
    monitor_handles: Mutex<Vec<JoinHandle<()>>>,
}

// ConnectionRegistry public API implementation
impl<D: Dialer> ConnectionRegistry<D> {
    /// Creates an empty registry dialing with `dialer` and `opts`.
    pub fn new(dialer: D, opts: DialOptions) -> Self {
        ConnectionRegistry {
            dialer,
            opts,
            conns: OnceMap::new(),
            monitor_handles: Mutex::new(vec![]),
        }
    }

    /// Returns the shared connection to `host`, dialing it on first use.
    pub async fn get_connection(
        &self,
        host: &str,
    ) -> Result<Arc<D::Conn>, P4PerfError> {
        self.conns
            .get_or_try_init(host.to_string(), || async {
                pf_info!(host; "dialing...");
                let conn = match self.dialer.dial(host, &self.opts).await {
                    Ok(conn) => Arc::new(conn),
                    Err(e) => {
                        return logged_err!(host; "error dialing: {}", e);
                    }
                };

                let monitor_handle =
                    tokio::spawn(Self::conn_monitor_thread(conn.clone()));
                self.monitor_handles.lock().await.push(monitor_handle);
                Ok(conn)
            })
            .await
    }

    /// Number of cached connections.
    pub async fn num_connections(&self) -> usize {
        self.conns.len().await
    }

    /// Number of monitor threads still running.
    pub async fn num_live_monitors(&self) -> usize {
        let monitor_handles = self.monitor_handles.lock().await;
        monitor_handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Aborts all connection monitor threads. Connections stay cached.
    pub async fn shutdown(&self) {
        for handle in self.monitor_handles.lock().await.drain(..) {
            handle.abort();
        }
    }
}

// ConnectionRegistry monitor thread implementation
impl<D: Dialer> ConnectionRegistry<D> {
    /// Connection monitor thread function. Logs every state transition and
    /// exits once the connection reaches `Shutdown`.
    async fn conn_monitor_thread(conn: Arc<D::Conn>) {
        let mut state = conn.state();
        loop {
            pf_info!(conn.host(); "connection state update: {}", state);
            if state == ConnState::Shutdown {
                break;
            }
            state = conn.wait_for_state_change(state).await;
        }

        pf_debug!(conn.host(); "connection monitor thread exitted");
    }
}
