use crate::error::SwathEditError;
use crate::utils::coords::{normalize_longitude, DegreeScale};
use geodesy::prelude::*;
use std::fmt;

type Result<T> = std::result::Result<T, SwathEditError>;

/// False northing of the southern UTM zones.
const SOUTH_FALSE_NORTHING: f64 = 10_000_000.0;

/// Maps geographic coordinates in degrees to planar meters and back.
pub trait Projection {
    /// Returns `None` outside the projection's domain.
    fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)>;

    fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)>;

    /// Short identifier such as `UTM19N`.
    fn id(&self) -> String;
}

fn finite_pair(a: f64, b: f64) -> Option<(f64, f64)> {
    (a.is_finite() && b.is_finite()).then_some((a, b))
}

/// Flat-earth projection in meters about a reference point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    lon0: f64,
    lat0: f64,
    scale: DegreeScale,
}

impl LocalProjection {
    pub fn new(lon0: f64, lat0: f64) -> Self {
        LocalProjection {
            lon0,
            lat0,
            scale: DegreeScale::at_latitude(lat0),
        }
    }
}

impl Projection for LocalProjection {
    fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        finite_pair(
            (lon - self.lon0) / self.scale.mtodeglon,
            (lat - self.lat0) / self.scale.mtodeglat,
        )
    }

    fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        finite_pair(
            self.lon0 + x * self.scale.mtodeglon,
            self.lat0 + y * self.scale.mtodeglat,
        )
    }

    fn id(&self) -> String {
        format!("LOCAL{:.6}/{:.6}", self.lon0, self.lat0)
    }
}

/// UTM zone containing a reference position, with its hemisphere.
pub fn utm_zone(reference_lon: f64, reference_lat: f64) -> (u8, bool) {
    let lon = normalize_longitude(reference_lon);
    let zone = ((lon + 183.0) / 6.0 + 0.5) as i32;
    (zone.clamp(1, 60) as u8, reference_lat >= 0.0)
}

/// Universal Transverse Mercator on WGS84.
pub struct UtmProjection {
    zone: u8,
    north: bool,
    ctx: Minimal,
    op: OpHandle,
}

impl fmt::Debug for UtmProjection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UtmProjection({})", self.id())
    }
}

impl UtmProjection {
    pub fn new(zone: u8, north: bool) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(SwathEditError::Projection(format!("Invalid UTM zone {zone}")));
        }
        let mut ctx = Minimal::new();
        let op = ctx
            .op(&format!("utm zone={zone}"))
            .map_err(|e| SwathEditError::Projection(e.to_string()))?;
        Ok(UtmProjection {
            zone,
            north,
            ctx,
            op,
        })
    }

    /// Projection for the zone containing the reference position.
    pub fn for_reference(reference_lon: f64, reference_lat: f64) -> Result<Self> {
        let (zone, north) = utm_zone(reference_lon, reference_lat);
        UtmProjection::new(zone, north)
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn is_north(&self) -> bool {
        self.north
    }

    fn false_northing(&self) -> f64 {
        if self.north {
            0.0
        } else {
            SOUTH_FALSE_NORTHING
        }
    }
}

impl Projection for UtmProjection {
    fn forward(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !(lon.is_finite() && lat.is_finite()) || lat.abs() > 90.0 {
            return None;
        }
        let mut data = [Coor2D::geo(lat, lon)];
        let done = self.ctx.apply(self.op, Fwd, &mut data).ok()?;
        if done != 1 {
            return None;
        }
        finite_pair(data[0][0], data[0][1] + self.false_northing())
    }

    fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !(x.is_finite() && y.is_finite()) {
            return None;
        }
        let mut data = [Coor2D::raw(x, y - self.false_northing())];
        let done = self.ctx.apply(self.op, Inv, &mut data).ok()?;
        if done != 1 {
            return None;
        }
        finite_pair(data[0][0].to_degrees(), data[0][1].to_degrees())
    }

    fn id(&self) -> String {
        format!("UTM{:02}{}", self.zone, if self.north { 'N' } else { 'S' })
    }
}
