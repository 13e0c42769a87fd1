use crate::geometry::attitude::PingAttitude;
use crate::utils::constants::{DTR, MIN_RANGE};
use crate::utils::coords::DegreeScale;
use std::f64::consts::PI;

/// A sounding as decoded, relative to the sonar reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBeam {
    /// Depth below the sea surface
    pub bath: f64,
    /// Starboard positive
    pub across: f64,
    /// Forward positive
    pub along: f64,
}

/// A sounding placed on the earth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedBeam {
    pub bathcorr: f64,
    pub lon: f64,
    pub lat: f64,
}

/// Splits a sonar-relative vector into slant range, along angle and across angle.
fn angles(across: f64, along: f64, z: f64) -> (f64, f64, f64) {
    let range = (across * across + along * along + z * z).sqrt();
    let (alpha, mut beta) = if range.abs() < MIN_RANGE {
        (0.0, 0.5 * PI)
    } else {
        let alpha = (along / range).clamp(-1.0, 1.0).asin();
        let beta = (across / (range * alpha.cos())).clamp(-1.0, 1.0).acos();
        (alpha, beta)
    };
    if z < 0.0 {
        beta = 2.0 * PI - beta;
    }
    (range, alpha, beta)
}

fn components(range: f64, alpha: f64, beta: f64) -> (f64, f64, f64) {
    (
        range * alpha.cos() * beta.cos(),
        range * alpha.sin(),
        range * alpha.cos() * beta.sin(),
    )
}

/// Rotates a sonar-relative sounding by additional roll and pitch, in degrees.
/// Returns the new `(across, along, z)`.
pub fn rotate_beam(across: f64, along: f64, z: f64, roll_delta: f64, pitch_delta: f64) -> (f64, f64, f64) {
    let (range, alpha, beta) = angles(across, along, z);
    components(range, alpha + DTR * pitch_delta, beta + DTR * roll_delta)
}

/// Re-bends the across-track angle for a change in the sound speed used at beamforming.
///
/// The angle is taken relative to vertical after removing `roll` (degrees), scaled through
/// Snell's law by `snell`, and rotated back.
pub fn snell_correction(snell: f64, roll: f64, across: f64, along: f64, z: f64) -> (f64, f64, f64) {
    if snell == 1.0 {
        return (across, along, z);
    }
    let (range, alpha, mut beta) = angles(across, along, z);
    beta -= DTR * roll;
    beta = (snell * (beta - 0.5 * PI).sin()).clamp(-1.0, 1.0).asin() + 0.5 * PI;
    beta += DTR * roll;
    components(range, alpha, beta)
}

/// Corrects a sounding for attitude changes and locates it relative to the ping navigation.
///
/// `logged_sensor_depth` is the sensor depth the decoded depth was referenced to.
pub fn correct_beam(
    raw: &RawBeam,
    logged_sensor_depth: f64,
    nav_lon: f64,
    nav_lat: f64,
    scale: &DegreeScale,
    attitude: &PingAttitude,
    snell: f64,
) -> CorrectedBeam {
    let (across, along, z) = snell_correction(
        snell,
        attitude.roll,
        raw.across,
        raw.along,
        raw.bath - logged_sensor_depth,
    );
    let (across, along, z) = rotate_beam(across, along, z, attitude.roll_delta, attitude.pitch_delta);

    let (sinh, cosh) = (DTR * attitude.heading).sin_cos();
    let east = across * cosh + along * sinh;
    let north = -across * sinh + along * cosh;
    let (lon, lat) = scale.offset(nav_lon, nav_lat, east, north);

    CorrectedBeam {
        bathcorr: z + attitude.sensor_depth,
        lon,
        lat,
    }
}
