use std::f64::consts::PI;

pub(crate) const DTR: f64 = PI / 180.0;
pub(crate) const RTD: f64 = 180.0 / PI;

/// Maximum time difference in seconds for an edit record to match a ping.
pub const EDIT_TIME_TOLERANCE: f64 = 0.00011;

/// Beam numbers in edit records carry the ping multiplicity in multiples of this factor.
pub const MULTIPLICITY_FACTOR: i32 = 1_000_000;

/// Smallest half-width or half-length a beam footprint may have, in meters.
pub const MIN_FOOTPRINT: f64 = 0.01;

/// Half beam width in degrees used when a file reports a non-positive beam width.
pub const DEFAULT_HALF_BEAMWIDTH: f64 = 1.0;

/// Value written to grid cells that hold no data.
pub const NO_DATA: f64 = f32::MAX as f64;

/// Accumulators are fixed-point integers scaled by 2^40.
pub(crate) const FIXED_POINT_SCALE: f64 = 1_099_511_627_776.0;

/// Range in meters below which a beam is treated as pointing straight down.
pub(crate) const MIN_RANGE: f64 = 0.001;
