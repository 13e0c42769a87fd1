use crate::utils::constants::{DEFAULT_HALF_BEAMWIDTH, DTR, MIN_FOOTPRINT, RTD};

/// Insonified patch of seafloor of one beam, approximated as an ellipse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    /// Half extent across track, meters
    pub half_width: f64,
    /// Half extent along track, meters
    pub half_length: f64,
    /// Incidence angle from vertical, degrees
    pub theta: f64,
    /// Unit vector pointing away from the sonar across track, in projected coordinates
    pub unit: (f64, f64),
}

fn sanitize(extent: f64) -> f64 {
    if extent.is_finite() && extent >= MIN_FOOTPRINT {
        extent
    } else {
        MIN_FOOTPRINT
    }
}

fn half_angle(beamwidth: f64) -> f64 {
    let half = 0.5 * beamwidth;
    if half > 0.0 && half.is_finite() {
        half
    } else {
        DEFAULT_HALF_BEAMWIDTH
    }
}

impl Footprint {
    /// Footprint of a beam landing `lateral` meters from nadir, `depth` below the sensor.
    /// Beam widths are full angles in degrees.
    pub fn estimate(
        lateral: f64,
        depth: f64,
        altitude: f64,
        beamwidth_across: f64,
        beamwidth_along: f64,
    ) -> Footprint {
        let dtheta = half_angle(beamwidth_across);
        let dphi = half_angle(beamwidth_along);
        let range = (lateral * lateral + altitude * altitude).sqrt();
        let theta = RTD * lateral.atan2(depth);
        let half_width = depth * (DTR * (theta + dtheta)).tan() - lateral;
        let half_length = range * (DTR * dphi).tan();

        Footprint {
            half_width: sanitize(half_width),
            half_length: sanitize(half_length),
            theta,
            unit: (1.0, 0.0),
        }
    }

    /// Footprint of a beam at projected `beam` position for a sonar at projected `nav` position.
    pub fn for_beam(
        beam: (f64, f64),
        nav: (f64, f64),
        depth: f64,
        altitude: f64,
        beamwidth_across: f64,
        beamwidth_along: f64,
    ) -> Footprint {
        let dx = beam.0 - nav.0;
        let dy = beam.1 - nav.1;
        let lateral = (dx * dx + dy * dy).sqrt();
        let mut footprint =
            Footprint::estimate(lateral, depth, altitude, beamwidth_across, beamwidth_along);
        if lateral > 0.0 && lateral.is_finite() {
            footprint.unit = (dx / lateral, dy / lateral);
        }
        footprint
    }

    /// Number of cells to search on either side of the beam's cell.
    ///
    /// Covers twice the bounding box of the rotated footprint so that cells reaching the
    /// conditional contour are visited, and never less than two cells.
    pub fn search_window(&self, dx: f64, dy: f64) -> (usize, usize) {
        let (ux, uy) = self.unit;
        let ex = (self.half_width * ux).abs() + (self.half_length * uy).abs();
        let ey = (self.half_width * uy).abs() + (self.half_length * ux).abs();
        let cells = |extent: f64, step: f64| -> usize {
            let n = (2.0 * extent / step).ceil();
            if n.is_finite() && n > 2.0 {
                n as usize
            } else {
                2
            }
        };
        (cells(ex, dx), cells(ey, dy))
    }

    /// Rotates a projected offset into the footprint frame (across, along).
    pub fn to_frame(&self, x: f64, y: f64) -> (f64, f64) {
        let (ux, uy) = self.unit;
        (x * ux + y * uy, -x * uy + y * ux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn nadir_beam() {
        let fp = Footprint::estimate(0.0, 100.0, 100.0, 2.0, 2.0);
        assert_relative_eq!(fp.theta, 0.0);
        assert_relative_eq!(fp.half_width, 100.0 * DTR.tan(), max_relative = 1e-12);
        assert_relative_eq!(fp.half_length, 100.0 * DTR.tan(), max_relative = 1e-12);
    }

    #[test]
    fn oblique_beam_widens() {
        let nadir = Footprint::estimate(0.0, 100.0, 100.0, 2.0, 2.0);
        let outer = Footprint::estimate(100.0, 100.0, 100.0, 2.0, 2.0);
        assert_relative_eq!(outer.theta, 45.0, max_relative = 1e-12);
        assert!(outer.half_width > nadir.half_width);
        assert!(outer.half_length > nadir.half_length);
    }

    #[test]
    fn degenerate_inputs_use_minimum() {
        let fp = Footprint::estimate(0.0, 0.0, 0.0, 2.0, 2.0);
        assert_eq!(fp.half_width, MIN_FOOTPRINT);
        assert_eq!(fp.half_length, MIN_FOOTPRINT);

        let fp = Footprint::estimate(10.0, -5.0, -5.0, 2.0, 2.0);
        assert!(fp.half_width >= MIN_FOOTPRINT);
        assert!(fp.half_length >= MIN_FOOTPRINT);

        let fp = Footprint::estimate(f64::NAN, 10.0, 10.0, 2.0, 2.0);
        assert_eq!(fp.half_width, MIN_FOOTPRINT);
        assert_eq!(fp.half_length, MIN_FOOTPRINT);
    }

    #[test]
    fn nonpositive_beamwidth_uses_default() {
        let default = Footprint::estimate(0.0, 50.0, 50.0, 0.0, -1.0);
        let explicit = Footprint::estimate(0.0, 50.0, 50.0, 2.0, 2.0);
        assert_eq!(default, explicit);
    }

    #[test]
    fn frame_and_window() {
        let fp = Footprint::for_beam((3.0, 4.0), (0.0, 0.0), 20.0, 20.0, 2.0, 2.0);
        assert_relative_eq!(fp.unit.0, 0.6);
        assert_relative_eq!(fp.unit.1, 0.8);
        let (across, along) = fp.to_frame(3.0, 4.0);
        assert_abs_diff_eq!(across, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(along, 0.0, epsilon = 1e-12);
        assert_eq!(fp.search_window(100.0, 100.0), (2, 2));
        let (wx, wy) = fp.search_window(0.01, 0.01);
        assert!(wx > 2 && wy > 2);
    }
}
