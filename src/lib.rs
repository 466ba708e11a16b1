//! Rust library for discovering and controlling LIFX lights over the LAN protocol
//!
//! This library provides an async client for the LIFX UDP protocol. It
//! supports:
//!
//! - Device discovery via subnet broadcast, deduplicated by hardware id
//! - Power control (on/off, queried state)
//! - Color control with the two-variant white/color model
//! - Smooth time-based color fades with cancellation
//! - Echo-based device pings and label queries
//! - A blocking facade for synchronous callers
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use licht::{LifxBackend, LightColor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // One backend instance owns the socket and the device registry
//!     let backend = LifxBackend::bind().await?;
//!
//!     // Lights are yielded as soon as they answer the broadcast
//!     let mut lights = backend.discover_lights(Duration::from_secs(3)).await?;
//!     while let Some(light) = lights.recv().await {
//!         println!("Found \"{}\"", light.get_label().await?);
//!
//!         light.poweron().await?;
//!         light.set_color(LightColor::Color {
//!             hue: 120.0,
//!             saturation: 1.0,
//!             brightness: 1.0,
//!         })
//!         .await?;
//!
//!         // Fade to warm white over two seconds
//!         light.fade_color(
//!             LightColor::White {
//!                 brightness: 0.8,
//!                 kelvin: 2700,
//!             },
//!             Duration::from_secs(2),
//!         )
//!         .await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the address of a light, you can skip discovery:
//!
//! ```no_run
//! use licht::{wire::LIFX_PORT, LifxBackend};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = LifxBackend::bind().await?;
//!     let light = backend
//!         .get_light(format!("192.168.1.40:{}", LIFX_PORT).parse()?)
//!         .await?;
//!     light.poweroff().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Backend**: one instance per socket, owning the sequence-number
//!   space and the device registry; independent instances never interfere
//! - **Discovery**: broadcast service queries with per-window dedup
//! - **Light**: high-level per-device control API
//! - **Connection**: UDP transport and request/response correlation
//! - **Wire**: bit-exact binary frame codec
//! - **Color**: the white-temperature / hue-saturation color model
//!
//! Requests carry a wrapping 8-bit sequence number scoped to one backend;
//! responses are matched by it, and a request that gets no response within
//! its deadline fails with [`LichtError::Timeout`]. Lost datagrams are not
//! retried implicitly; callers re-issue calls when they need resilience.

mod backend;
pub mod blocking;
mod color;
mod connection;
mod discovery;
mod error;
mod fade;
mod light;
mod registry;
pub mod wire;

// Public exports
pub use backend::{LifxBackend, LifxConfig};
pub use color::{LightColor, LightPower, KELVIN_MAX, KELVIN_MIN};
pub use discovery::LightStream;
pub use error::{LichtError, Result};
pub use fade::FadeOutcome;
pub use light::Light;
pub use registry::DeviceState;
