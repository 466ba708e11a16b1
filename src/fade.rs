//! Time-driven color transitions.
//!
//! A fade runs Idle → Running → Completed, or → Cancelled when a newer
//! fade on the same light takes over. Each step applies a color
//! interpolated in the active variant's own parameter space; the final
//! step writes the exact target so interpolation rounding never drifts
//! the endpoint.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

use crate::color::LightColor;
use crate::error::Result;
use crate::light::Light;

/// Interval between interpolation steps
const STEP_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on steps per fade, however long it runs
const MAX_STEPS: u32 = 100;

/// How a fade ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    /// All steps ran and the device holds the exact target color
    Completed,
    /// A newer fade took over; the device holds the last applied step
    Cancelled,
}

/// Drive one fade to completion or cancellation
pub(crate) async fn run(
    light: &Light,
    start: LightColor,
    target: LightColor,
    duration: Duration,
    cancel: &AtomicBool,
) -> Result<FadeOutcome> {
    let steps = step_count(duration);
    let begun = Instant::now();

    tracing::debug!(
        "Fading {:?} from {:?} to {:?} over {:?} in {} steps",
        light,
        start,
        target,
        duration,
        steps
    );

    for step in 1..=steps {
        let t = step as f64 / steps as f64;
        sleep_until(begun + duration.mul_f64(t)).await;

        if cancel.load(Ordering::Relaxed) {
            tracing::debug!("Fade on {:?} cancelled at step {}/{}", light, step, steps);
            return Ok(FadeOutcome::Cancelled);
        }

        let color = if step == steps {
            target
        } else {
            interpolate(&start, &target, t)
        };
        light.set_color(color).await?;
    }

    Ok(FadeOutcome::Completed)
}

fn step_count(duration: Duration) -> u32 {
    let steps = (duration.as_millis() / STEP_INTERVAL.as_millis()) as u32;
    steps.clamp(1, MAX_STEPS)
}

/// Linear interpolation between two color states at `t` in `[0, 1]`.
///
/// Within one variant every parameter interpolates in its own space, with
/// hue taking the shorter way around the circle. Across variants the
/// brightness interpolates throughout while the variant itself switches
/// exactly once, at the halfway point; incompatible parameters are never
/// blended.
pub(crate) fn interpolate(start: &LightColor, target: &LightColor, t: f64) -> LightColor {
    match (*start, *target) {
        (
            LightColor::White {
                brightness: b0,
                kelvin: k0,
            },
            LightColor::White {
                brightness: b1,
                kelvin: k1,
            },
        ) => LightColor::White {
            brightness: lerp(b0, b1, t),
            kelvin: lerp(k0 as f64, k1 as f64, t).round() as u16,
        },
        (
            LightColor::Color {
                hue: h0,
                saturation: s0,
                brightness: b0,
            },
            LightColor::Color {
                hue: h1,
                saturation: s1,
                brightness: b1,
            },
        ) => LightColor::Color {
            hue: lerp_hue(h0, h1, t),
            saturation: lerp(s0, s1, t),
            brightness: lerp(b0, b1, t),
        },
        _ => {
            let brightness = lerp(start.brightness(), target.brightness(), t);
            if t < 0.5 {
                start.with_brightness(brightness)
            } else {
                target.with_brightness(brightness)
            }
        }
    }
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

/// Interpolate hue along the shorter circular path, in degrees
fn lerp_hue(a: f64, b: f64, t: f64) -> f64 {
    let delta = (b - a + 540.0).rem_euclid(360.0) - 180.0;
    (a + delta * t).rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: LightColor = LightColor::Color {
        hue: 0.0,
        saturation: 1.0,
        brightness: 1.0,
    };

    #[test]
    fn endpoints_are_exact() {
        let a = LightColor::Color {
            hue: 10.0,
            saturation: 0.25,
            brightness: 0.5,
        };
        let b = LightColor::Color {
            hue: 200.0,
            saturation: 1.0,
            brightness: 1.0,
        };
        assert_eq!(interpolate(&a, &b, 0.0), a);
        assert_eq!(interpolate(&a, &b, 1.0), b);
    }

    #[test]
    fn hue_takes_the_shorter_circular_path() {
        let a = LightColor::Color {
            hue: 350.0,
            saturation: 1.0,
            brightness: 1.0,
        };
        let b = LightColor::Color {
            hue: 10.0,
            saturation: 1.0,
            brightness: 1.0,
        };
        let LightColor::Color { hue, .. } = interpolate(&a, &b, 0.5) else {
            panic!("variant changed");
        };
        assert!((hue - 0.0).abs() < 1e-9, "midpoint hue was {}", hue);

        // and a quarter of the way wraps to 355, not 265
        let LightColor::Color { hue, .. } = interpolate(&a, &b, 0.25) else {
            panic!("variant changed");
        };
        assert!((hue - 355.0).abs() < 1e-9, "quarter hue was {}", hue);
    }

    #[test]
    fn white_fade_interpolates_kelvin() {
        let a = LightColor::White {
            brightness: 0.0,
            kelvin: 2000,
        };
        let b = LightColor::White {
            brightness: 1.0,
            kelvin: 4000,
        };
        assert_eq!(
            interpolate(&a, &b, 0.5),
            LightColor::White {
                brightness: 0.5,
                kelvin: 3000,
            }
        );
    }

    #[test]
    fn cross_variant_switches_once_at_halfway() {
        let white = LightColor::White {
            brightness: 1.0,
            kelvin: 3500,
        };

        let before = interpolate(&white, &RED, 0.49);
        assert!(matches!(before, LightColor::White { .. }));

        let after = interpolate(&white, &RED, 0.5);
        let LightColor::Color {
            hue, saturation, ..
        } = after
        else {
            panic!("expected target variant after the transition point");
        };
        // target's own parameters, not a blend
        assert_eq!(hue, 0.0);
        assert_eq!(saturation, 1.0);
    }

    #[test]
    fn step_count_is_bounded() {
        assert_eq!(step_count(Duration::ZERO), 1);
        assert_eq!(step_count(Duration::from_millis(40)), 1);
        assert_eq!(step_count(Duration::from_millis(500)), 10);
        assert_eq!(step_count(Duration::from_secs(3600)), MAX_STEPS);
    }
}
