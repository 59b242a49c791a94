//! Server handle.
//!
//! # Responsibilities
//! - Own every socket, timer and node of one server instance
//! - Enforce the lifecycle: `create` → `iterate`* → `shutdown`
//! - Expose timer registration to the embedding program
//!
//! # Design Decisions
//! - All resources live in one `Option<Resources>`; releasing them is a
//!   single `take()`, so no partially torn-down state is observable
//! - `iterate` borrows the handle mutably and is never reentrant
//! - Dropping an active handle releases resources and logs a warning

pub mod state;

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::address_space::{AddressSpace, Variant, SERVER_CURRENT_TIME};
use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::net::{EndpointUrl, Transport};
use crate::observability::metrics;
use crate::scheduler::{IterationResult, Scheduler, TimerId};

pub use state::ServerState;

struct Resources {
    transport: Transport,
    scheduler: Scheduler,
    address_space: AddressSpace,
    clock_timer: Option<TimerId>,
}

impl Resources {
    fn release(mut self) {
        self.scheduler.timers_mut().clear();
        self.transport.close_all();
    }
}

/// A minimal OPC UA server driven by repeated `iterate` calls.
pub struct Server {
    config: ServerConfig,
    state: ServerState,
    resources: Option<Resources>,
}

impl Server {
    /// Build an unallocated handle.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            state: ServerState::Uninitialized,
            resources: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn invalid(&self, operation: &'static str) -> ServerError {
        ServerError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn resources_mut(&mut self, operation: &'static str) -> Result<&mut Resources, ServerError> {
        let state = self.state;
        match self.resources.as_mut() {
            Some(resources) if state.is_active() => Ok(resources),
            _ => Err(ServerError::InvalidState { operation, state }),
        }
    }

    /// Allocate the address space, bind every endpoint and start the clock timer.
    pub async fn create(&mut self) -> Result<(), ServerError> {
        if self.state != ServerState::Uninitialized {
            return Err(self.invalid("create"));
        }

        let endpoints = self
            .config
            .server
            .endpoints
            .iter()
            .map(|raw| {
                EndpointUrl::parse(raw).map_err(|e| {
                    ServerError::resource(format!("endpoint {raw}"), io::Error::new(io::ErrorKind::InvalidInput, e))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut address_space = AddressSpace::new(&self.config.server.application_uri);
        for namespace in &self.config.namespaces {
            address_space.register_namespace(&namespace.uri);
        }
        let configured = address_space.populate(self.config.nodes.clone())?;

        let transport = Transport::bind(&endpoints, self.config.limits.clone()).await?;

        let mut scheduler = Scheduler::new(Duration::from_millis(self.config.scheduler.max_wait_ms));
        let clock_interval = self.config.scheduler.clock_interval_ms;
        let clock_timer = (clock_interval > 0).then(|| {
            scheduler.timers_mut().add_repeated(
                Instant::now(),
                Duration::from_millis(clock_interval),
                Box::new(update_clock),
            )
        });

        tracing::info!(
            name = %self.config.server.name,
            application_uri = %self.config.server.application_uri,
            endpoints = ?self.config.server.endpoints,
            local_addrs = ?transport.local_addrs(),
            configured_nodes = configured,
            "Server created"
        );

        self.resources = Some(Resources {
            transport,
            scheduler,
            address_space,
            clock_timer,
        });
        self.state = ServerState::Created;
        Ok(())
    }

    /// Run one pass of timers and network I/O.
    ///
    /// With `wait` set, an idle pass blocks until the nearest timer, socket
    /// readiness or the configured maximum wait.
    pub async fn iterate(&mut self, wait: bool) -> Result<IterationResult, ServerError> {
        let resources = self.resources_mut("iterate")?;
        let outcome = resources
            .scheduler
            .iterate(&mut resources.transport, &mut resources.address_space, wait)
            .await;

        match outcome {
            Ok(result) => {
                if self.state == ServerState::Created {
                    self.state = ServerState::Running;
                    tracing::info!("Server running");
                }
                Ok(result)
            }
            Err(e) => {
                metrics::record_iteration_error();
                tracing::warn!(error = %e, "Iteration failed");
                Err(e.into())
            }
        }
    }

    /// Release every resource. Valid once, from `Created` or `Running`.
    pub fn shutdown(&mut self) -> Result<(), ServerError> {
        if !self.state.is_active() {
            return Err(self.invalid("shutdown"));
        }
        if let Some(resources) = self.resources.take() {
            resources.release();
        }
        self.state = ServerState::Stopped;
        tracing::info!("Server shut down");
        Ok(())
    }

    /// Register a one-shot callback due at `at`.
    pub fn add_timed_callback<F>(&mut self, at: Instant, callback: F) -> Result<TimerId, ServerError>
    where
        F: FnMut(&mut AddressSpace) + Send + 'static,
    {
        let resources = self.resources_mut("add_timed_callback")?;
        Ok(resources.scheduler.timers_mut().add_timed(at, Box::new(callback)))
    }

    /// Register a callback repeating every `interval`, first due one interval from now.
    pub fn add_repeated_callback<F>(&mut self, interval: Duration, callback: F) -> Result<TimerId, ServerError>
    where
        F: FnMut(&mut AddressSpace) + Send + 'static,
    {
        let resources = self.resources_mut("add_repeated_callback")?;
        Ok(resources
            .scheduler
            .timers_mut()
            .add_repeated(Instant::now(), interval, Box::new(callback)))
    }

    /// Returns false when `id` is unknown or not a repeated timer.
    pub fn change_repeated_interval(&mut self, id: TimerId, interval: Duration) -> Result<bool, ServerError> {
        let resources = self.resources_mut("change_repeated_interval")?;
        Ok(resources.scheduler.timers_mut().change_interval(id, Instant::now(), interval))
    }

    /// Returns false when `id` is unknown or already fired.
    pub fn remove_callback(&mut self, id: TimerId) -> Result<bool, ServerError> {
        let resources = self.resources_mut("remove_callback")?;
        Ok(resources.scheduler.timers_mut().remove(id))
    }

    /// Timer that refreshes `Server_ServerStatus_CurrentTime`.
    pub fn clock_timer(&self) -> Option<TimerId> {
        self.resources.as_ref().and_then(|r| r.clock_timer)
    }

    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.resources
            .as_ref()
            .map(|r| r.transport.local_addrs())
            .unwrap_or_default()
    }

    pub fn connection_count(&self) -> usize {
        self.resources.as_ref().map_or(0, |r| r.transport.connection_count())
    }

    /// Largest partial chunk currently held for any connection.
    pub fn max_buffered_input(&self) -> usize {
        self.resources
            .as_ref()
            .and_then(|r| r.transport.connections().map(|c| c.buffered_input()).max())
            .unwrap_or(0)
    }

    pub fn address_space(&self) -> Option<&AddressSpace> {
        self.resources.as_ref().map(|r| &r.address_space)
    }

    pub fn address_space_mut(&mut self) -> Option<&mut AddressSpace> {
        self.resources.as_mut().map(|r| &mut r.address_space)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(resources) = self.resources.take() {
            tracing::warn!(state = %self.state, "Server dropped without shutdown, releasing resources");
            resources.release();
        }
    }
}

fn update_clock(space: &mut AddressSpace) {
    if let Err(e) = space.set_value(&SERVER_CURRENT_TIME, Variant::DateTime(SystemTime::now())) {
        tracing::warn!(error = %e, "Failed to update server clock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address_space::{NodeClass, NodeDefinition, NodeId, OBJECTS_FOLDER};
    use crate::config::NamespaceConfig;
    use std::sync::{Arc, Mutex};

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.endpoints = vec!["opc.tcp://127.0.0.1:0/test/".to_string()];
        config.scheduler.clock_interval_ms = 0;
        config
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let mut server = Server::new(test_config());
        assert_eq!(server.state(), ServerState::Uninitialized);

        server.create().await.unwrap();
        assert_eq!(server.state(), ServerState::Created);
        assert_eq!(server.local_addrs().len(), 1);

        server.iterate(false).await.unwrap();
        assert_eq!(server.state(), ServerState::Running);

        server.shutdown().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.address_space().is_none());
    }

    #[tokio::test]
    async fn second_shutdown_is_invalid_state() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();
        server.shutdown().unwrap();

        assert!(matches!(
            server.shutdown(),
            Err(ServerError::InvalidState {
                operation: "shutdown",
                state: ServerState::Stopped
            })
        ));
    }

    #[tokio::test]
    async fn operations_rejected_outside_active_states() {
        let mut server = Server::new(test_config());
        assert!(matches!(server.iterate(false).await, Err(ServerError::InvalidState { .. })));
        assert!(matches!(server.shutdown(), Err(ServerError::InvalidState { .. })));
        assert!(matches!(
            server.add_repeated_callback(Duration::from_secs(1), |_| {}),
            Err(ServerError::InvalidState { .. })
        ));

        server.create().await.unwrap();
        assert!(matches!(server.create().await, Err(ServerError::InvalidState { .. })));

        server.shutdown().unwrap();
        assert!(matches!(server.iterate(true).await, Err(ServerError::InvalidState { .. })));
        assert!(matches!(server.create().await, Err(ServerError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn shutdown_without_iterating_releases_port() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();
        let addr = server.local_addrs()[0];
        server.shutdown().unwrap();

        let rebound = tokio::net::TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }

    #[tokio::test]
    async fn bind_failure_leaves_handle_uninitialized() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = occupied.local_addr().unwrap().port();

        let mut config = test_config();
        config.server.endpoints = vec![format!("opc.tcp://127.0.0.1:{port}/")];
        let mut server = Server::new(config);

        assert!(matches!(server.create().await, Err(ServerError::Resource { .. })));
        assert_eq!(server.state(), ServerState::Uninitialized);
    }

    #[tokio::test]
    async fn invalid_node_definition_fails_create() {
        let mut config = test_config();
        config.nodes = vec![NodeDefinition {
            node_id: NodeId::numeric(2, 1),
            node_class: NodeClass::Object,
            browse_name: "Orphan".to_string(),
            display_name: None,
            description: None,
            parent: OBJECTS_FOLDER,
            value: None,
            readable: true,
            writable: false,
        }];
        let mut server = Server::new(config);
        assert!(matches!(server.create().await, Err(ServerError::AddressSpace(_))));
        assert_eq!(server.state(), ServerState::Uninitialized);
    }

    #[tokio::test]
    async fn configured_namespaces_and_nodes_are_loaded() {
        let mut config = test_config();
        config.namespaces = vec![NamespaceConfig {
            uri: "http://mynodes.local".to_string(),
        }];
        config.nodes = vec![NodeDefinition {
            node_id: NodeId::numeric(2, 1),
            node_class: NodeClass::Variable,
            browse_name: "Temperature".to_string(),
            display_name: None,
            description: None,
            parent: OBJECTS_FOLDER,
            value: Some(Variant::Double(21.5)),
            readable: true,
            writable: true,
        }];
        let mut server = Server::new(config);
        server.create().await.unwrap();

        let space = server.address_space().unwrap();
        assert_eq!(space.namespaces().index_of("http://mynodes.local"), Some(2));
        assert_eq!(
            space.read_value(&NodeId::numeric(2, 1)).unwrap(),
            &Variant::Double(21.5)
        );
        server.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn timers_fire_in_deadline_order_across_iterations() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let start = Instant::now();
        for (name, ms) in [("c", 30u64), ("a", 10), ("b", 20), ("a2", 10)] {
            let log = Arc::clone(&log);
            server
                .add_timed_callback(start + Duration::from_millis(ms), move |_: &mut AddressSpace| {
                    log.lock().unwrap().push(name)
                })
                .unwrap();
        }

        while log.lock().unwrap().len() < 4 {
            server.iterate(true).await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), vec!["a", "a2", "b", "c"]);
        server.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_non_blocking_iterate_has_no_deadline() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();

        let start = Instant::now();
        let result = server.iterate(false).await.unwrap();
        assert_eq!(result.next_deadline, None);
        assert_eq!(start.elapsed(), Duration::ZERO);
        server.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn blocking_iterate_fires_timer_exactly_once() {
        let mut config = test_config();
        config.scheduler.max_wait_ms = 500;
        let mut server = Server::new(config);
        server.create().await.unwrap();

        let hits = Arc::new(Mutex::new(0));
        let start = Instant::now();
        let counter = Arc::clone(&hits);
        server
            .add_timed_callback(start + Duration::from_millis(100), move |_: &mut AddressSpace| {
                *counter.lock().unwrap() += 1
            })
            .unwrap();

        let result = server.iterate(true).await.unwrap();
        assert!(start.elapsed() <= Duration::from_millis(100));
        assert_eq!(result.timers_fired, 1);
        assert_eq!(*hits.lock().unwrap(), 1);

        server.iterate(false).await.unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
        server.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_callbacks_can_be_changed_and_removed() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();

        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        let id = server
            .add_repeated_callback(Duration::from_secs(60), move |_: &mut AddressSpace| {
                *counter.lock().unwrap() += 1
            })
            .unwrap();

        assert!(server.change_repeated_interval(id, Duration::from_millis(10)).unwrap());
        let result = server.iterate(true).await.unwrap();
        assert_eq!(result.timers_fired, 1);
        assert_eq!(result.next_deadline, Some(Duration::from_millis(10)));

        assert!(server.remove_callback(id).unwrap());
        assert!(!server.remove_callback(id).unwrap());
        assert_eq!(server.iterate(false).await.unwrap().next_deadline, None);
        assert_eq!(*hits.lock().unwrap(), 1);
        server.shutdown().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn clock_timer_refreshes_current_time() {
        let mut config = test_config();
        config.scheduler.clock_interval_ms = 100;
        config.scheduler.max_wait_ms = 1_000;
        let mut server = Server::new(config);
        server.create().await.unwrap();
        assert!(server.clock_timer().is_some());

        server
            .address_space_mut()
            .unwrap()
            .set_value(&SERVER_CURRENT_TIME, Variant::Int32(0))
            .unwrap();

        let result = server.iterate(true).await.unwrap();
        assert_eq!(result.timers_fired, 1);
        assert!(matches!(
            server.address_space().unwrap().read_value(&SERVER_CURRENT_TIME),
            Ok(Variant::DateTime(_))
        ));
        server.shutdown().unwrap();
    }
}
