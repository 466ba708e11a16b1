//! Domain types for light state: power and the two-variant color model.

use crate::error::{LichtError, Result};
use crate::wire::Hsbk;

/// Lowest color temperature a device accepts, in kelvin
pub const KELVIN_MIN: u16 = 1500;

/// Highest color temperature a device accepts, in kelvin
pub const KELVIN_MAX: u16 = 9000;

/// Kelvin value sent alongside hue/saturation colors, where it is inert
const KELVIN_NEUTRAL: u16 = 3500;

/// On/off power state of a light
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightPower {
    Off,
    On,
}

impl LightPower {
    /// Interpret a wire-level power value; any non-zero level is on
    pub fn from_level(level: u16) -> Self {
        if level == 0 {
            LightPower::Off
        } else {
            LightPower::On
        }
    }

    /// The wire-level power value for this state
    pub fn level(self) -> u16 {
        match self {
            LightPower::Off => 0,
            LightPower::On => 65535,
        }
    }
}

/// Color state of a light.
///
/// Exactly one variant is active at a time and reflects the device's
/// current mode: `White` for temperature mode (the device reports
/// saturation zero), `Color` for hue/saturation mode. There is no
/// implicit conversion between the two; consumers match on the variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightColor {
    /// White-temperature mode
    White {
        /// Brightness in `[0, 1]`
        brightness: f64,
        /// Color temperature in `[KELVIN_MIN, KELVIN_MAX]`
        kelvin: u16,
    },
    /// Hue/saturation mode
    Color {
        /// Hue in degrees, `[0, 360)`
        hue: f64,
        /// Saturation in `[0, 1]`
        saturation: f64,
        /// Brightness in `[0, 1]`
        brightness: f64,
    },
}

impl LightColor {
    /// Check all parameters against the protocol ranges.
    ///
    /// Called before any value is put on the wire, so out-of-range input
    /// fails without network I/O.
    pub fn validate(&self) -> Result<()> {
        match *self {
            LightColor::White { brightness, kelvin } => {
                check_unit("brightness", brightness)?;
                if !(KELVIN_MIN..=KELVIN_MAX).contains(&kelvin) {
                    return Err(LichtError::Validation(format!(
                        "kelvin {} outside [{}, {}]",
                        kelvin, KELVIN_MIN, KELVIN_MAX
                    )));
                }
            }
            LightColor::Color {
                hue,
                saturation,
                brightness,
            } => {
                if !(0.0..360.0).contains(&hue) {
                    return Err(LichtError::Validation(format!(
                        "hue {} outside [0, 360)",
                        hue
                    )));
                }
                check_unit("saturation", saturation)?;
                check_unit("brightness", brightness)?;
            }
        }
        Ok(())
    }

    /// Brightness component, whichever variant is active
    pub fn brightness(&self) -> f64 {
        match *self {
            LightColor::White { brightness, .. } => brightness,
            LightColor::Color { brightness, .. } => brightness,
        }
    }

    /// Same color with the brightness replaced
    pub fn with_brightness(&self, brightness: f64) -> LightColor {
        match *self {
            LightColor::White { kelvin, .. } => LightColor::White { brightness, kelvin },
            LightColor::Color {
                hue, saturation, ..
            } => LightColor::Color {
                hue,
                saturation,
                brightness,
            },
        }
    }

    /// Scale brightness by `factor` in `[0, 1]`, leaving every other
    /// parameter untouched; a dimmed white keeps its kelvin exactly
    pub fn dimmed(&self, factor: f64) -> Result<LightColor> {
        check_unit("dim factor", factor)?;
        Ok(self.with_brightness(self.brightness() * factor))
    }

    /// Convert to the wire quadruple
    pub fn to_hsbk(&self) -> Hsbk {
        match *self {
            LightColor::White { brightness, kelvin } => Hsbk {
                hue: 0,
                saturation: 0,
                brightness: scale_unit(brightness),
                kelvin,
            },
            LightColor::Color {
                hue,
                saturation,
                brightness,
            } => Hsbk {
                hue: (hue / 360.0 * 65535.0).round() as u16,
                saturation: scale_unit(saturation),
                brightness: scale_unit(brightness),
                kelvin: KELVIN_NEUTRAL,
            },
        }
    }

    /// Interpret a wire quadruple; zero saturation signals white mode
    pub fn from_hsbk(hsbk: Hsbk) -> LightColor {
        if hsbk.saturation == 0 {
            LightColor::White {
                brightness: hsbk.brightness as f64 / 65535.0,
                kelvin: hsbk.kelvin,
            }
        } else {
            LightColor::Color {
                hue: hsbk.hue as f64 * 360.0 / 65535.0,
                saturation: hsbk.saturation as f64 / 65535.0,
                brightness: hsbk.brightness as f64 / 65535.0,
            }
        }
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(LichtError::Validation(format!(
            "{} {} outside [0, 1]",
            name, value
        )))
    }
}

fn scale_unit(value: f64) -> u16 {
    (value * 65535.0).round() as u16
}
