//! Network discovery of lights via broadcast service queries.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

use crate::backend::LifxBackend;
use crate::error::Result;
use crate::light::Light;
use crate::wire::Payload;

/// Lazy, finite sequence of newly discovered lights.
///
/// Each light is yielded the moment its first service response arrives;
/// the stream ends when the discovery window closes or the backend shuts
/// down.
pub struct LightStream {
    rx: mpsc::UnboundedReceiver<Light>,
}

impl LightStream {
    /// Next newly discovered light, or `None` once the window has closed
    pub async fn recv(&mut self) -> Option<Light> {
        self.rx.recv().await
    }
}

/// Run one discovery window against the network.
///
/// Opens the connection's discovery sink, broadcasts the service query
/// (repeated `tries` times over the window, since broadcast datagrams get
/// lost), and deduplicates responses by hardware identifier so each
/// device yields exactly one [`Light`] no matter how often it answers.
pub(crate) async fn discover(backend: LifxBackend, window: Duration) -> Result<LightStream> {
    let (handle, sightings) = backend.connection().open_discovery();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        run_window(&backend, sightings, tx, window).await;
        backend.connection().close_discovery(&handle);
        tracing::debug!("Discovery window closed");
    });

    Ok(LightStream { rx })
}

async fn run_window(
    backend: &LifxBackend,
    mut sightings: mpsc::UnboundedReceiver<crate::connection::ServiceSighting>,
    out: mpsc::UnboundedSender<Light>,
    window: Duration,
) {
    let deadline = Instant::now() + window;
    let broadcaster = spawn_broadcaster(backend.clone(), window);

    let mut seen = HashSet::new();
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => break,
            sighting = sightings.recv() => {
                let Some(sighting) = sighting else { break };
                if !seen.insert(sighting.target) {
                    tracing::debug!(
                        "Duplicate service response from {:#014x}, skipping",
                        sighting.target
                    );
                    continue;
                }

                let addr = SocketAddr::new(sighting.from.ip(), sighting.port as u16);
                tracing::info!("Discovered light {:#014x} at {}", sighting.target, addr);

                let entry = backend.registry().upsert(sighting.target, addr);
                let light = Light::new(backend.clone(), entry);
                if out.send(light).is_err() {
                    // Caller dropped the stream, stop early
                    break;
                }
            }
        }
    }

    broadcaster.abort();
}

/// Send the service query `tries` times, spread evenly over the window
fn spawn_broadcaster(backend: LifxBackend, window: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let tries = backend.config().tries.max(1);
        let pause = window / tries;
        for attempt in 0..tries {
            if attempt > 0 {
                sleep(pause).await;
            }
            let broadcast_addr = backend.config().broadcast_addr;
            if let Err(e) = backend
                .connection()
                .send_broadcast(broadcast_addr, Payload::GetService)
                .await
            {
                tracing::warn!("Discovery broadcast to {} failed: {}", broadcast_addr, e);
            }
        }
    })
}
