use crate::gridding::grid::{GridError, GridGeometry};
use crate::projection::Projection;
use tracing::info;

type Result<T> = std::result::Result<T, GridError>;

/// Fraction of the deepest altitude or depth used as the default cell size.
const CELL_FRACTION: f64 = 0.02;

/// Number of cells across the survey when no depth information is available.
const FALLBACK_CELLS: f64 = 250.0;

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl GeoBounds {
    pub fn from_point(lon: f64, lat: f64) -> Self {
        GeoBounds {
            lon_min: lon,
            lon_max: lon,
            lat_min: lat,
            lat_max: lat,
        }
    }

    pub fn include(&mut self, lon: f64, lat: f64) {
        self.lon_min = self.lon_min.min(lon);
        self.lon_max = self.lon_max.max(lon);
        self.lat_min = self.lat_min.min(lat);
        self.lat_max = self.lat_max.max(lat);
    }

    pub fn union(&self, other: &GeoBounds) -> GeoBounds {
        GeoBounds {
            lon_min: self.lon_min.min(other.lon_min),
            lon_max: self.lon_max.max(other.lon_max),
            lat_min: self.lat_min.min(other.lat_min),
            lat_max: self.lat_max.max(other.lat_max),
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.lon_min + self.lon_max),
            0.5 * (self.lat_min + self.lat_max),
        )
    }

    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.lon_min, self.lat_min),
            (self.lon_max, self.lat_min),
            (self.lon_min, self.lat_max),
            (self.lon_max, self.lat_max),
        ]
    }
}

/// Spatial and vertical extent of the loaded soundings.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurveyExtent {
    pub bounds: Option<GeoBounds>,
    pub depth_max: f64,
    pub altitude_max: f64,
}

impl SurveyExtent {
    pub fn include_sounding(&mut self, lon: f64, lat: f64, depth: f64) {
        if !(lon.is_finite() && lat.is_finite()) {
            return;
        }
        match self.bounds.as_mut() {
            Some(b) => b.include(lon, lat),
            None => self.bounds = Some(GeoBounds::from_point(lon, lat)),
        }
        if depth.is_finite() {
            self.depth_max = self.depth_max.max(depth);
        }
    }

    pub fn include_altitude(&mut self, altitude: f64) {
        if altitude.is_finite() {
            self.altitude_max = self.altitude_max.max(altitude);
        }
    }

    pub fn merge(&self, other: &SurveyExtent) -> SurveyExtent {
        let bounds = match (self.bounds, other.bounds) {
            (Some(a), Some(b)) => Some(a.union(&b)),
            (a, b) => a.or(b),
        };
        SurveyExtent {
            bounds,
            depth_max: self.depth_max.max(other.depth_max),
            altitude_max: self.altitude_max.max(other.altitude_max),
        }
    }
}

/// Default cell size for a survey `width` meters across.
pub fn default_cell_size(extent: &SurveyExtent, width: f64) -> f64 {
    if extent.altitude_max > 0.0 {
        CELL_FRACTION * extent.altitude_max
    } else if extent.depth_max > 0.0 {
        CELL_FRACTION * extent.depth_max
    } else {
        width / FALLBACK_CELLS
    }
}

/// Lays a grid over the projected survey bounds.
pub fn grid_geometry(
    extent: &SurveyExtent,
    projection: &dyn Projection,
    cell_size: Option<f64>,
) -> Result<GridGeometry> {
    let bounds = extent.bounds.ok_or(GridError::NoData)?;
    if bounds.lon_max < bounds.lon_min || bounds.lat_max < bounds.lat_min {
        return Err(GridError::InvalidBounds(format!(
            "lon {} to {}, lat {} to {}",
            bounds.lon_min, bounds.lon_max, bounds.lat_min, bounds.lat_max
        )));
    }

    let mut xmin = f64::INFINITY;
    let mut xmax = f64::NEG_INFINITY;
    let mut ymin = f64::INFINITY;
    let mut ymax = f64::NEG_INFINITY;
    for (lon, lat) in bounds.corners() {
        let (x, y) = projection.forward(lon, lat).ok_or_else(|| {
            GridError::Projection(format!(
                "{} cannot project corner {lon} {lat}",
                projection.id()
            ))
        })?;
        xmin = xmin.min(x);
        xmax = xmax.max(x);
        ymin = ymin.min(y);
        ymax = ymax.max(y);
    }

    let cell = cell_size
        .filter(|c| *c > 0.0)
        .unwrap_or_else(|| default_cell_size(extent, (xmax - xmin).max(ymax - ymin)));
    if !(cell > 0.0 && cell.is_finite()) {
        return Err(GridError::InvalidBounds(format!(
            "no cell size for x {xmin} to {xmax}, y {ymin} to {ymax}"
        )));
    }
    // an axis narrower than one cell becomes three cells centered on it
    if xmax - xmin < cell {
        let c = 0.5 * (xmin + xmax);
        (xmin, xmax) = (c - cell, c + 1.5 * cell);
    }
    if ymax - ymin < cell {
        let c = 0.5 * (ymin + ymax);
        (ymin, ymax) = (c - cell, c + 1.5 * cell);
    }
    let geometry = GridGeometry::new(xmin, xmax, ymin, ymax, cell, cell)?;
    info!(
        projection = %projection.id(),
        cell,
        columns = geometry.n_columns,
        rows = geometry.n_rows,
        "grid bounds"
    );
    Ok(geometry)
}
