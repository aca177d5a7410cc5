//! Client registry: one shared runtime client per target.

use std::sync::Arc;

use crate::client::{ClientConfig, ConnectionRegistry, RuntimeClient};
use crate::runtime::{Dialer, RuntimeStub, SwitchRuntime, Target};
use crate::utils::{OnceMap, P4PerfError};

/// Registry caching one client per target, on top of a connection registry
/// shared with any other registry serving the same hosts. Concurrent
/// first-use callers of a target get the same client, created once.
pub struct ClientRegistry<P, D>
where
    P: SwitchRuntime,
    D: Dialer,
    D::Conn: RuntimeStub<P>,
{
    connections: Arc<ConnectionRegistry<D>>,

    /// Map from target -> shared client.
    clients: OnceMap<Target, Arc<RuntimeClient<P, D::Conn>>>,
}

// ClientRegistry public API implementation
impl<P, D> ClientRegistry<P, D>
where
    P: SwitchRuntime,
    D: Dialer,
    D::Conn: RuntimeStub<P>,
{
    /// Creates an empty registry drawing connections from `connections`.
    pub fn new(connections: Arc<ConnectionRegistry<D>>) -> Self {
        ClientRegistry {
            connections,
            clients: OnceMap::new(),
        }
    }

    /// Returns the client of `target`, creating and setting it up on first
    /// use. Later callers get the cached client; their `config` and
    /// `program_name` are ignored. A failed setup caches nothing.
    pub async fn create_or_get_client(
        &self,
        target: Target,
        config: ClientConfig,
        program_name: &str,
    ) -> Result<Arc<RuntimeClient<P, D::Conn>>, P4PerfError> {
        self.clients
            .get_or_try_init(target.clone(), || async {
                let conn =
                    self.connections.get_connection(&target.host).await?;
                let client = RuntimeClient::new_and_setup(
                    target,
                    conn,
                    config,
                    program_name,
                )
                .await?;
                Ok::<_, P4PerfError>(Arc::new(client))
            })
            .await
    }

    /// Returns the client of `target` if it has been created.
    pub async fn get_client(
        &self,
        target: &Target,
    ) -> Option<Arc<RuntimeClient<P, D::Conn>>> {
        self.clients.get(target).await
    }

    pub async fn num_clients(&self) -> usize {
        self.clients.len().await
    }

    /// Connection registry backing this registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry<D>> {
        &self.connections
    }

    /// Shuts down every client created so far.
    pub async fn shutdown(&self) {
        for client in self.clients.values().await {
            client.shutdown().await;
        }
        pf_info!("registry"; "all {} clients stopped", P::NAME);
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use crate::client::SessionPhase;
    use crate::runtime::p4rt::P4Runtime;
    use crate::runtime::{DialOptions, WriteError};
    use crate::testkit::{p4rt_batch, MockBehavior, MockDialer};
    use futures::future::join_all;
    use std::sync::atomic::Ordering;

    type TestRegistry = ClientRegistry<P4Runtime, MockDialer<P4Runtime>>;

    fn registry(dialer: MockDialer<P4Runtime>) -> Arc<TestRegistry> {
        Arc::new(ClientRegistry::new(Arc::new(ConnectionRegistry::new(
            dialer,
            DialOptions::default(),
        ))))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_create_once() -> Result<(), P4PerfError> {
        let dialer = MockDialer::new(MockBehavior::ok());
        let dials = dialer.dial_counter();
        let reg = registry(dialer);
        let target = Target::new("10.0.0.1:9559", 1);

        let futs = (0..8).map(|_| {
            let reg = reg.clone();
            let target = target.clone();
            async move {
                reg.create_or_get_client(
                    target,
                    ClientConfig::default(),
                    "fabric",
                )
                .await
            }
        });
        let mut clients = vec![];
        for client in join_all(futs).await {
            clients.push(client?);
        }
        assert!(clients.iter().all(|c| Arc::ptr_eq(c, &clients[0])));
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(clients[0].connection().streams_opened(), 1);
        assert_eq!(reg.num_clients().await, 1);
        assert!(Arc::ptr_eq(
            &reg.get_client(&target).await.unwrap(),
            &clients[0]
        ));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shared_connection_per_host() -> Result<(), P4PerfError> {
        let dialer = MockDialer::new(MockBehavior::ok());
        let dials = dialer.dial_counter();
        let reg = registry(dialer);

        let dev1 = reg
            .create_or_get_client(
                Target::new("10.0.0.1:9559", 1),
                ClientConfig::default(),
                "fabric",
            )
            .await?;
        let dev2 = reg
            .create_or_get_client(
                Target::new("10.0.0.1:9559", 2),
                ClientConfig::default(),
                "fabric",
            )
            .await?;
        assert!(!Arc::ptr_eq(&dev1, &dev2));
        assert!(Arc::ptr_eq(dev1.connection(), dev2.connection()));
        assert_eq!(dials.load(Ordering::SeqCst), 1);
        assert_eq!(dev1.connection().streams_opened(), 2);
        assert_eq!(reg.connections().num_connections().await, 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_setup_not_cached() -> Result<(), P4PerfError> {
        let dialer = MockDialer::new(MockBehavior::ok());
        dialer.refuse("10.0.0.9:9559");
        let reg = registry(dialer);
        let target = Target::new("10.0.0.9:9559", 1);

        assert!(reg
            .create_or_get_client(
                target.clone(),
                ClientConfig::default(),
                "fabric"
            )
            .await
            .is_err());
        assert_eq!(reg.num_clients().await, 0);
        assert!(reg.get_client(&target).await.is_none());

        let bad_config = ClientConfig {
            num_workers: 0,
            ..Default::default()
        };
        let target = Target::new("10.0.0.1:9559", 1);
        assert!(reg
            .create_or_get_client(target.clone(), bad_config, "fabric")
            .await
            .is_err());
        assert_eq!(reg.num_clients().await, 0);

        // a later attempt with a good config retries from scratch
        let client = reg
            .create_or_get_client(target, ClientConfig::default(), "fabric")
            .await?;
        assert_eq!(client.write(&p4rt_batch(0, 2)).await.await?.len(), 2);
        assert_eq!(reg.num_clients().await, 1);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_stream_not_cached() {
        let reg =
            registry(MockDialer::new(MockBehavior::ok().failing_stream()));
        let target = Target::new("10.0.0.1:9559", 1);
        assert!(reg
            .create_or_get_client(target, ClientConfig::default(), "fabric")
            .await
            .is_err());
        assert_eq!(reg.num_clients().await, 0);
        // the connection itself stays cached
        assert_eq!(reg.connections().num_connections().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_stops_clients() -> Result<(), P4PerfError> {
        let reg = registry(MockDialer::new(MockBehavior::ok()));
        let mut clients = vec![];
        for dev in 1..=3 {
            clients.push(
                reg.create_or_get_client(
                    Target::new("10.0.0.1:9559", dev),
                    ClientConfig::default(),
                    "fabric",
                )
                .await?,
            );
        }
        reg.shutdown().await;
        for client in clients {
            assert_eq!(client.mastership().phase, SessionPhase::Closed);
            let errors = client.write(&p4rt_batch(0, 1)).await.await?;
            assert_eq!(
                errors[0],
                WriteError::new(
                    crate::runtime::Code::Unavailable,
                    "service stopping"
                )
            );
        }
        Ok(())
    }
}
