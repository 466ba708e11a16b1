//! Blocking facade over the asynchronous core.
//!
//! Each call drives a private current-thread runtime until the underlying
//! asynchronous operation resolves. Result values and error kinds are
//! identical to the async API; only the calling convention changes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;

use crate::backend::{LifxBackend, LifxConfig};
use crate::color::{LightColor, LightPower};
use crate::error::Result;
use crate::fade::FadeOutcome;
use crate::light::Light;
use crate::registry::DeviceState;

/// Blocking wrapper around [`LifxBackend`]
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use licht::blocking::BlockingBackend;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = BlockingBackend::bind()?;
///     for light in backend.discover_lights(Duration::from_secs(3))? {
///         light.poweron()?;
///     }
///     Ok(())
/// }
/// ```
pub struct BlockingBackend {
    runtime: Arc<Runtime>,
    backend: LifxBackend,
}

impl BlockingBackend {
    /// Bind a backend with the default configuration
    pub fn bind() -> Result<Self> {
        Self::with_config(LifxConfig::default())
    }

    /// Bind a backend with an explicit configuration
    pub fn with_config(config: LifxConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let backend = runtime.block_on(LifxBackend::with_config(config))?;
        Ok(Self {
            runtime: Arc::new(runtime),
            backend,
        })
    }

    /// Discover lights, blocking for the whole window, and return every
    /// device that answered
    pub fn discover_lights(&self, window: Duration) -> Result<Vec<BlockingLight>> {
        let lights = self.runtime.block_on(async {
            let mut stream = self.backend.discover_lights(window).await?;
            let mut lights = Vec::new();
            while let Some(light) = stream.recv().await {
                lights.push(light);
            }
            Ok::<_, crate::LichtError>(lights)
        })?;
        Ok(lights.into_iter().map(|l| self.wrap(l)).collect())
    }

    /// Reach a light at a known address directly
    pub fn get_light(&self, addr: SocketAddr) -> Result<BlockingLight> {
        let light = self.runtime.block_on(self.backend.get_light(addr))?;
        Ok(self.wrap(light))
    }

    /// Snapshot of every known device's observed state
    pub fn devices(&self) -> Vec<DeviceState> {
        self.backend.devices()
    }

    fn wrap(&self, light: Light) -> BlockingLight {
        BlockingLight {
            runtime: self.runtime.clone(),
            light,
        }
    }
}

/// Blocking wrapper around [`Light`]
pub struct BlockingLight {
    runtime: Arc<Runtime>,
    light: Light,
}

impl BlockingLight {
    /// Hardware identifier of the device
    pub fn target(&self) -> u64 {
        self.light.target()
    }

    /// Network address the device last responded from
    pub fn addr(&self) -> SocketAddr {
        self.light.addr()
    }

    /// Snapshot of the device's last observed state
    pub fn state(&self) -> DeviceState {
        self.light.state()
    }

    pub fn ping(&self) -> Result<()> {
        self.runtime.block_on(self.light.ping())
    }

    pub fn get_power(&self) -> Result<LightPower> {
        self.runtime.block_on(self.light.get_power())
    }

    pub fn set_power(&self, power: LightPower) -> Result<()> {
        self.runtime.block_on(self.light.set_power(power))
    }

    pub fn poweron(&self) -> Result<()> {
        self.runtime.block_on(self.light.poweron())
    }

    pub fn poweroff(&self) -> Result<()> {
        self.runtime.block_on(self.light.poweroff())
    }

    pub fn get_color(&self) -> Result<LightColor> {
        self.runtime.block_on(self.light.get_color())
    }

    pub fn set_color(&self, color: LightColor) -> Result<()> {
        self.runtime.block_on(self.light.set_color(color))
    }

    pub fn get_label(&self) -> Result<String> {
        self.runtime.block_on(self.light.get_label())
    }

    /// Fade to `target`, blocking until the fade completes or a newer
    /// fade cancels it
    pub fn fade_color(&self, target: LightColor, duration: Duration) -> Result<FadeOutcome> {
        self.runtime.block_on(self.light.fade_color(target, duration))
    }

    /// The underlying async handle
    pub fn into_inner(self) -> Light {
        self.light
    }
}
