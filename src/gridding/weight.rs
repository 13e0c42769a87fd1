//! Probability mass of a beam footprint falling inside one grid cell.
//!
//! A footprint deposits weight `w(x, y) = exp(-(x²/a² + y²/b²)) / (π a b)` in its own frame,
//! x across track and y along track. Integrated over an axis-aligned rectangle this is a product
//! of error function differences. Grid cells are rotated in the footprint frame; their weight
//! is approximated by the same-sized rectangle centered at the rotated cell center.

/// Weight above which a cell is always used.
pub const WEIGHT_THRESHOLD: f64 = 0.05;

/// Whether a cell should take a share of a beam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Usage {
    Use,
    /// Only within twice the 1/e contour of the footprint
    Conditional,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinWeight {
    pub weight: f64,
    pub usage: Usage,
}

/// Complementary error function, fractional error below 1.2e-7.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398
                                + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let ans = t * (-z * z + poly).exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Error function.
pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// Distance of `(px, py)` from the footprint center relative to the 1/e ellipse along the
/// same direction.
fn contour_ratio(foot_a: f64, foot_b: f64, px: f64, py: f64) -> f64 {
    let ang = py.atan2(px);
    let xe = foot_a * ang.cos();
    let ye = foot_b * ang.sin();
    ((px * px + py * py) / (xe * xe + ye * ye)).sqrt()
}

/// Weight of a cell for a footprint with half axes `foot_a` (across) and `foot_b` (along).
///
/// `center` is the cell center and `corners` its corners, both in the footprint frame relative
/// to the beam; `half` holds the cell half extents. `scale` stretches the footprint.
pub fn bin_weight(
    foot_a: f64,
    foot_b: f64,
    scale: f64,
    center: (f64, f64),
    half: (f64, f64),
    corners: &[(f64, f64); 4],
) -> BinWeight {
    let fa = scale * foot_a;
    let fb = scale * foot_b;
    let (pcx, pcy) = center;
    let (dx, dy) = half;
    let weight = 0.25
        * (erf((pcx + dx) / fa) - erf((pcx - dx) / fa))
        * (erf((pcy + dy) / fb) - erf((pcy - dy) / fb));

    if weight > WEIGHT_THRESHOLD {
        return BinWeight {
            weight,
            usage: Usage::Use,
        };
    }

    let best = corners
        .iter()
        .map(|&(px, py)| contour_ratio(foot_a, foot_b, px, py))
        .fold(f64::INFINITY, f64::min);
    let usage = if best <= 1.0 {
        Usage::Use
    } else if best <= 2.0 {
        Usage::Conditional
    } else {
        Usage::Skip
    };

    match usage {
        Usage::Skip => BinWeight { weight: 0.0, usage },
        _ => BinWeight {
            weight: weight.max(0.0),
            usage,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn corners(cx: f64, cy: f64, hx: f64, hy: f64) -> [(f64, f64); 4] {
        [
            (cx - hx, cy - hy),
            (cx + hx, cy - hy),
            (cx - hx, cy + hy),
            (cx + hx, cy + hy),
        ]
    }

    #[test]
    fn erf_reference_values() {
        let cases = [
            (0.0, 0.0),
            (0.1, 0.1124629160182849),
            (0.5, 0.5204998778130465),
            (1.0, 0.8427007929497149),
            (1.5, 0.9661051464753108),
            (2.0, 0.9953222650189527),
            (3.0, 0.9999779095030014),
        ];
        for (x, expected) in cases {
            assert_abs_diff_eq!(erf(x), expected, epsilon = 2e-7);
            assert_abs_diff_eq!(erf(-x), -expected, epsilon = 2e-7);
        }
    }

    #[test]
    fn centered_cell_takes_most_weight() {
        let w = bin_weight(1.0, 1.0, 1.0, (0.0, 0.0), (5.0, 5.0), &corners(0.0, 0.0, 5.0, 5.0));
        assert_eq!(w.usage, Usage::Use);
        assert_abs_diff_eq!(w.weight, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn accepted_weights_hold_most_of_unit_mass() {
        let mut total = 0.0;
        for i in -3..=3 {
            for j in -3..=3 {
                let (cx, cy) = (i as f64, j as f64);
                let w = bin_weight(1.2, 0.8, 1.0, (cx, cy), (0.5, 0.5), &corners(cx, cy, 0.5, 0.5));
                assert!(w.weight >= 0.0);
                total += w.weight;
            }
        }
        assert!(total > 0.99);
        assert!(total <= 1.0 + 1e-9);
    }

    #[test]
    fn far_cells_are_skipped_with_zero_weight() {
        let w = bin_weight(1.0, 1.0, 1.0, (50.0, 0.0), (0.5, 0.5), &corners(50.0, 0.0, 0.5, 0.5));
        assert_eq!(w.usage, Usage::Skip);
        assert_eq!(w.weight, 0.0);
    }

    #[test]
    fn contour_classification() {
        // a corner inside the 1/e ellipse
        let w = bin_weight(2.0, 1.0, 1.0, (2.0, 1.0), (0.5, 0.5), &corners(2.0, 1.0, 0.5, 0.5));
        assert!(w.weight <= WEIGHT_THRESHOLD);
        assert_eq!(w.usage, Usage::Use);

        // nearest corner at 1.5 times the contour
        let w = bin_weight(2.0, 1.0, 1.0, (3.5, 0.0), (0.5, 0.5), &corners(3.5, 0.0, 0.5, 0.5));
        assert_eq!(w.usage, Usage::Conditional);
        assert!(w.weight > 0.0);
    }
}
