//! Backend instance: one socket, one sequence space, one device registry.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::Connection;
use crate::discovery::{self, LightStream};
use crate::error::{LichtError, Result};
use crate::light::Light;
use crate::registry::{DeviceState, Registry};
use crate::wire::{MessageType, Payload, LIFX_PORT};

/// Configuration for a backend instance
#[derive(Debug, Clone)]
pub struct LifxConfig {
    /// Local address to bind; the ephemeral-port default lets several
    /// backend instances coexist on one host
    pub bind_addr: SocketAddr,
    /// Where discovery broadcasts go
    pub broadcast_addr: SocketAddr,
    /// Deadline applied to each single request issued by a [`Light`]
    pub timeout: Duration,
    /// How many discovery broadcasts are spread over one window
    pub tries: u32,
    /// 32-bit source identifier; devices echo it so a backend can tell
    /// its own traffic from other clients on the subnet
    pub source: u32,
}

impl Default for LifxConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0),
            broadcast_addr: SocketAddr::new(Ipv4Addr::BROADCAST.into(), LIFX_PORT),
            timeout: Duration::from_secs(3),
            tries: 3,
            source: rand::random::<u32>() | 1,
        }
    }
}

pub(crate) struct BackendInner {
    connection: Connection,
    registry: Registry,
    config: LifxConfig,
}

/// Client for discovering and controlling LIFX lights on the local network
///
/// A `LifxBackend` owns the UDP socket, the sequence-number space and the
/// device registry. It is cheap to clone; clones share the same instance.
/// Independently created backends are fully isolated from each other.
#[derive(Clone)]
pub struct LifxBackend {
    inner: Arc<BackendInner>,
}

impl LifxBackend {
    /// Bind a backend with the default configuration
    pub async fn bind() -> Result<Self> {
        Self::with_config(LifxConfig::default()).await
    }

    /// Bind a backend with an explicit configuration
    pub async fn with_config(config: LifxConfig) -> Result<Self> {
        let connection = Connection::bind(config.bind_addr, config.source).await?;
        Ok(Self {
            inner: Arc::new(BackendInner {
                connection,
                registry: Registry::default(),
                config,
            }),
        })
    }

    /// Discover lights on the local network.
    ///
    /// Broadcasts a service query and collects responses for `window`,
    /// yielding each newly seen device immediately through the returned
    /// stream. Duplicate responses from the same hardware identifier are
    /// collapsed into one [`Light`]. Calling this again issues a fresh
    /// broadcast and a fresh window.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use licht::LifxBackend;
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let backend = LifxBackend::bind().await?;
    ///     let mut lights = backend.discover_lights(Duration::from_secs(3)).await?;
    ///     while let Some(light) = lights.recv().await {
    ///         println!("Found {}", light.get_label().await?);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    pub async fn discover_lights(&self, window: Duration) -> Result<LightStream> {
        discovery::discover(self.clone(), window).await
    }

    /// Reach a light at a known address directly, without a broadcast.
    ///
    /// Sends a unicast service query to learn the device's hardware
    /// identifier and advertised port; fails with
    /// [`LichtError::Timeout`](crate::LichtError::Timeout) if nothing
    /// answers there.
    pub async fn get_light(&self, addr: SocketAddr) -> Result<Light> {
        let response = self
            .inner
            .connection
            .send_request(
                addr,
                0,
                Payload::GetService,
                MessageType::StateService,
                self.inner.config.timeout,
            )
            .await?;

        match response.payload {
            Payload::StateService { port, .. } => {
                let device_addr = SocketAddr::new(addr.ip(), port as u16);
                let entry = self.inner.registry.upsert(response.target, device_addr);
                Ok(Light::new(self.clone(), entry))
            }
            other => Err(LichtError::MalformedFrame(format!(
                "expected StateService, got {:?}",
                other.message_type()
            ))),
        }
    }

    /// Handles for every device currently in the registry
    pub fn lights(&self) -> Vec<Light> {
        self.inner
            .registry
            .entries()
            .into_iter()
            .map(|entry| Light::new(self.clone(), entry))
            .collect()
    }

    /// Snapshot of every known device's observed state
    pub fn devices(&self) -> Vec<DeviceState> {
        self.inner.registry.snapshot()
    }

    /// Local address of the backend's socket
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.connection.local_addr()
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub(crate) fn config(&self) -> &LifxConfig {
        &self.inner.config
    }
}
