//! Per-device control interface.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

use crate::backend::LifxBackend;
use crate::color::{LightColor, LightPower};
use crate::error::{LichtError, Result};
use crate::fade::{self, FadeOutcome};
use crate::registry::{DeviceEntry, DeviceState};
use crate::wire::{decode_label, MessageType, Packet, Payload, ECHO_PAYLOAD_SIZE};

/// Handle for controlling one light.
///
/// Each operation is a single request/response round trip against the
/// device's current address. If the device has moved since discovery the
/// call fails with [`LichtError::Timeout`]; re-discover to refresh the
/// address. Handles are cheap to clone; every handle for the same device
/// shares the same registry entry, however it was obtained.
#[derive(Clone)]
pub struct Light {
    backend: LifxBackend,
    device: Arc<DeviceEntry>,
}

impl Light {
    pub(crate) fn new(backend: LifxBackend, device: Arc<DeviceEntry>) -> Self {
        Self { backend, device }
    }

    /// Hardware identifier of the device
    pub fn target(&self) -> u64 {
        self.device.state.lock().unwrap().target
    }

    /// Network address the device last responded from
    pub fn addr(&self) -> SocketAddr {
        self.device.state.lock().unwrap().addr
    }

    /// Snapshot of the device's last observed state
    pub fn state(&self) -> DeviceState {
        self.device.state.lock().unwrap().clone()
    }

    /// One tracked round trip against this device
    async fn request(&self, payload: Payload, expected: MessageType) -> Result<Packet> {
        let (addr, target) = {
            let device = self.device.state.lock().unwrap();
            (device.addr, device.target)
        };
        let response = self
            .backend
            .connection()
            .send_request(addr, target, payload, expected, self.backend.config().timeout)
            .await?;
        self.device.state.lock().unwrap().last_seen = Instant::now();
        Ok(response)
    }

    /// Check the device is alive by echoing a random payload off it
    pub async fn ping(&self) -> Result<()> {
        let mut echo = [0u8; ECHO_PAYLOAD_SIZE];
        rand::thread_rng().fill(&mut echo[..]);

        let response = self
            .request(Payload::EchoRequest { payload: echo }, MessageType::EchoResponse)
            .await?;
        match response.payload {
            Payload::EchoResponse { payload } if payload == echo => Ok(()),
            _ => Err(LichtError::MalformedFrame(
                "echo response does not match request payload".into(),
            )),
        }
    }

    /// Read the device's power state
    pub async fn get_power(&self) -> Result<LightPower> {
        let response = self
            .request(Payload::GetPower, MessageType::StatePower)
            .await?;
        let Payload::StatePower { level } = response.payload else {
            return Err(unexpected(MessageType::StatePower, &response));
        };
        let power = LightPower::from_level(level);
        self.device.state.lock().unwrap().power = Some(power);
        Ok(power)
    }

    /// Switch the device on or off; resolves once the device acknowledges
    pub async fn set_power(&self, power: LightPower) -> Result<()> {
        self.request(
            Payload::SetPower {
                level: power.level(),
            },
            MessageType::Acknowledgement,
        )
        .await?;
        self.device.state.lock().unwrap().power = Some(power);
        Ok(())
    }

    /// Convenience for `set_power(LightPower::On)`
    pub async fn poweron(&self) -> Result<()> {
        self.set_power(LightPower::On).await
    }

    /// Convenience for `set_power(LightPower::Off)`
    pub async fn poweroff(&self) -> Result<()> {
        self.set_power(LightPower::Off).await
    }

    /// Read the device's color state; the returned variant reflects the
    /// mode the device is actually in
    pub async fn get_color(&self) -> Result<LightColor> {
        let response = self
            .request(Payload::LightGet, MessageType::LightState)
            .await?;
        let Payload::LightState {
            color,
            power,
            label,
        } = response.payload
        else {
            return Err(unexpected(MessageType::LightState, &response));
        };

        let color = LightColor::from_hsbk(color);
        {
            let mut device = self.device.state.lock().unwrap();
            device.color = Some(color);
            device.power = Some(LightPower::from_level(power));
            device.label = Some(decode_label(&label));
        }
        Ok(color)
    }

    /// Set the device's color; parameters are validated before anything
    /// goes out on the wire
    pub async fn set_color(&self, color: LightColor) -> Result<()> {
        color.validate()?;
        self.request(
            Payload::LightSetColor {
                color: color.to_hsbk(),
                duration_ms: 0,
            },
            MessageType::Acknowledgement,
        )
        .await?;
        self.device.state.lock().unwrap().color = Some(color);
        Ok(())
    }

    /// Read the device's label
    pub async fn get_label(&self) -> Result<String> {
        let response = self
            .request(Payload::GetLabel, MessageType::StateLabel)
            .await?;
        let Payload::StateLabel { label } = response.payload else {
            return Err(unexpected(MessageType::StateLabel, &response));
        };
        let label = decode_label(&label);
        self.device.state.lock().unwrap().label = Some(label.clone());
        Ok(label)
    }

    /// Fade smoothly from the current color to `target` over `duration`.
    ///
    /// Reads the current color, then issues a bounded number of
    /// interpolated `set_color` steps; the final step always sets the
    /// exact target value. Starting a new fade on the device cancels a
    /// running one, leaving the device at the last applied step; the
    /// cancel slot lives in the registry entry, so handles obtained
    /// through separate discoveries still cancel each other.
    pub async fn fade_color(&self, target: LightColor, duration: Duration) -> Result<FadeOutcome> {
        target.validate()?;

        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut slot = self.device.running_fade.lock().unwrap();
            if let Some(previous) = slot.replace(cancel.clone()) {
                previous.store(true, Ordering::Relaxed);
            }
        }

        let start = self.get_color().await?;
        let outcome = fade::run(self, start, target, duration, &cancel).await;

        {
            let mut slot = self.device.running_fade.lock().unwrap();
            if slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &cancel))
            {
                *slot = None;
            }
        }
        outcome
    }
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let device = self.device.state.lock().unwrap();
        f.debug_struct("Light")
            .field("target", &format_args!("{:#014x}", device.target))
            .field("addr", &device.addr)
            .finish()
    }
}

fn unexpected(expected: MessageType, response: &Packet) -> LichtError {
    LichtError::MalformedFrame(format!(
        "expected {:?}, got {:?}",
        expected,
        response.payload.message_type()
    ))
}
