//! View-position variants
//!
//! The viewpoint can be pinned, follow the sun or moon, jump randomly, or
//! ride a simple circular orbit. Each variant resolves to a (latitude,
//! longitude) pair in degrees for the frame being rendered.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::celestial;
use crate::util::Rng;

const DEGS_PER_RAD: f64 = 180.0 / PI;

/// Where the camera sits for a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ViewPosition {
    /// Stay at the given latitude/longitude (degrees)
    Fixed { lat: f64, lon: f64 },
    /// Sub-solar point plus an offset (degrees)
    SunRelative { lat_offset: f64, lon_offset: f64 },
    /// Track the sub-lunar point
    MoonTracking,
    /// Pick a fresh uniform position every frame
    Random,
    /// Circular orbit: `period_hours` per revolution, inclined by
    /// `inclination` degrees, with the ground track shifted west by
    /// `shift` degrees per completed circuit
    Orbit {
        period_hours: f64,
        inclination: f64,
        shift: f64,
    },
}

impl ViewPosition {
    /// Resolve the view position for the frame at Unix time `t`.
    /// Returns (latitude, longitude) in degrees, unwrapped; the renderer's
    /// `set_view_pos` applies pole-reflection and longitude wrapping.
    pub fn compute(&self, t: i64, rng: &mut Rng) -> (f64, f64) {
        match *self {
            ViewPosition::Fixed { lat, lon } => (lat, lon),
            ViewPosition::SunRelative {
                lat_offset,
                lon_offset,
            } => {
                let (sun_lat, sun_lon) = celestial::sun_position(t);
                (
                    sun_lat * DEGS_PER_RAD + lat_offset,
                    sun_lon * DEGS_PER_RAD + lon_offset,
                )
            }
            ViewPosition::MoonTracking => {
                let (moon_lat, moon_lon) = celestial::moon_position(t);
                (moon_lat * DEGS_PER_RAD, moon_lon * DEGS_PER_RAD)
            }
            ViewPosition::Random => (
                (rng.below(30_001) as f64 / 30_000.0) * 180.0 - 90.0,
                (rng.below(30_001) as f64 / 30_000.0) * 360.0 - 180.0,
            ),
            ViewPosition::Orbit {
                period_hours,
                inclination,
                shift,
            } => orbit_position(t, period_hours, inclination, shift),
        }
    }
}

/// Ground track of a circular orbit. Starts at 0N 0E at the epoch.
fn orbit_position(t: i64, period_hours: f64, inclination: f64, shift: f64) -> (f64, f64) {
    // start at 0 N 0 E
    let mut x: f64 = 0.0;
    let mut y: f64 = 0.0;
    let mut z: f64 = 1.0;

    // rotate about the y axis (z towards x) by the number of orbits completed
    let a = (t as f64 / (period_hours * 3600.0)) * TAU;
    // sign-preserving remainder: a negative shift walks the track east
    let lon_shift = (a * shift) % 360.0;
    let (s, c) = a.sin_cos();
    let t1 = c * z - s * x;
    let t2 = s * z + c * x;
    z = t1;
    x = t2;

    // rotate about the z axis (x towards y) by the orbit's inclination
    let (s, c) = (inclination * PI / 180.0).sin_cos();
    let t1 = c * x - s * y;
    let t2 = s * x + c * y;
    x = t1;
    y = t2;

    // rotate about the y axis (x towards z) by the number of earth rotations
    let a = (t as f64 / 86_400.0) * TAU;
    let (s, c) = a.sin_cos();
    let t1 = c * x - s * z;
    let t2 = s * x + c * z;
    x = t1;
    z = t2;

    let lat = y.asin() * DEGS_PER_RAD;
    let mut lon = x.atan2(z) * DEGS_PER_RAD;
    if lon + lon_shift > 180.0 {
        lon = -180.0 + (lon_shift - (180.0 - lon));
    } else {
        lon += lon_shift;
    }
    (lat, lon)
}
