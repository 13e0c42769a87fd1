/// Locates the pair of samples bracketing `t` in a series sorted by time.
/// Times before the first sample or after the last clamp to the end values.
fn bracket(times: &[f64], t: f64) -> Option<(usize, usize, f64)> {
    if times.is_empty() || !t.is_finite() {
        return None;
    }
    let last = times.len() - 1;
    if t <= times[0] {
        return Some((0, 0, 0.0));
    }
    if t >= times[last] {
        return Some((last, last, 0.0));
    }
    let hi = times.partition_point(|&x| x <= t);
    if hi == 0 || hi > last {
        return None;
    }
    let lo = hi - 1;
    let span = times[hi] - times[lo];
    let frac = if span > 0.0 { (t - times[lo]) / span } else { 0.0 };
    Some((lo, hi, frac))
}

/// Linear interpolation of `values` sampled at `times`.
pub fn linear_interp(times: &[f64], values: &[f64], t: f64) -> Option<f64> {
    if times.len() != values.len() {
        return None;
    }
    let (lo, hi, frac) = bracket(times, t)?;
    Some(values[lo] + frac * (values[hi] - values[lo]))
}

/// Linear interpolation of headings in degrees across the 0/360 wrap.
pub fn heading_interp(times: &[f64], headings: &[f64], t: f64) -> Option<f64> {
    if times.len() != headings.len() {
        return None;
    }
    let (lo, hi, frac) = bracket(times, t)?;
    let mut delta = headings[hi] - headings[lo];
    if delta > 180.0 {
        delta -= 360.0;
    } else if delta < -180.0 {
        delta += 360.0;
    }
    Some((headings[lo] + frac * delta).rem_euclid(360.0))
}
