use crate::utils::constants::DTR;

/// Coefficients of the ellipsoidal meters-per-degree series.
const C1: f64 = 111412.84;
const C2: f64 = -93.5;
const C3: f64 = 0.118;
const C4: f64 = 111132.92;
const C5: f64 = -559.82;
const C6: f64 = 1.175;
const C7: f64 = 0.0023;

/// Degrees of longitude and latitude per meter at a given latitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegreeScale {
    pub mtodeglon: f64,
    pub mtodeglat: f64,
}

impl DegreeScale {
    /// Scale factors for the WGS84 ellipsoid at `lat` degrees.
    pub fn at_latitude(lat: f64) -> Self {
        let radlat = lat * DTR;
        let mtodeglon =
            1.0 / (C1 * radlat.cos() + C2 * (3.0 * radlat).cos() + C3 * (5.0 * radlat).cos()).abs();
        let mtodeglat = 1.0
            / (C4
                + C5 * (2.0 * radlat).cos()
                + C6 * (4.0 * radlat).cos()
                + C7 * (6.0 * radlat).cos())
            .abs();
        DegreeScale {
            mtodeglon,
            mtodeglat,
        }
    }

    /// Offsets a position by `east` and `north` meters.
    pub fn offset(&self, lon: f64, lat: f64, east: f64, north: f64) -> (f64, f64) {
        (lon + self.mtodeglon * east, lat + self.mtodeglat * north)
    }
}

/// Brings a longitude into [-180, 180).
pub fn normalize_longitude(lon: f64) -> f64 {
    let mut lon = lon;
    if lon < -180.0 {
        lon += 360.0;
    }
    if lon >= 180.0 {
        lon -= 360.0;
    }
    lon
}
