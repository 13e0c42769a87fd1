use crate::utils::interp::{heading_interp, linear_interp};

/// Calibration offsets applied to every sounding of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasParameters {
    /// Roll bias in degrees
    pub roll: f64,
    /// Pitch bias in degrees
    pub pitch: f64,
    /// Heading bias in degrees
    pub heading: f64,
    /// Time lag in seconds between the sonar clock and the attitude sensors
    pub time_lag: f64,
    /// Ratio of corrected to beamforming sound speed, 1.0 leaves angles alone
    pub snell: f64,
}

impl Default for BiasParameters {
    fn default() -> Self {
        BiasParameters {
            roll: 0.0,
            pitch: 0.0,
            heading: 0.0,
            time_lag: 0.0,
            snell: 1.0,
        }
    }
}

impl BiasParameters {
    pub fn is_identity(&self) -> bool {
        *self == BiasParameters::default()
    }
}

/// Navigation and attitude logged with a ping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Navigation {
    /// Epoch seconds
    pub time_d: f64,
    pub lon: f64,
    pub lat: f64,
    /// Speed over ground in km/hr
    pub speed: f64,
    /// Degrees clockwise from north
    pub heading: f64,
    pub roll: f64,
    pub pitch: f64,
    pub heave: f64,
    /// Depth of the transducer below the sea surface, meters
    pub sensor_depth: f64,
    /// Height of the transducer above the seafloor, meters
    pub altitude: f64,
}

/// A time-stamped series sampled independently of the pings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsyncSeries {
    pub time_d: Vec<f64>,
    pub values: Vec<f64>,
}

impl AsyncSeries {
    pub fn new(time_d: Vec<f64>, values: Vec<f64>) -> Self {
        AsyncSeries { time_d, values }
    }

    fn at(&self, t: f64) -> Option<f64> {
        linear_interp(&self.time_d, &self.values, t)
    }
}

/// Asynchronous sensor data carried by a swath file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AsyncNavigation {
    pub heading: Option<AsyncSeries>,
    pub sensor_depth: Option<AsyncSeries>,
    pub roll: Option<AsyncSeries>,
    pub pitch: Option<AsyncSeries>,
}

/// Attitude used to place the beams of one ping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingAttitude {
    /// Absolute heading, bias included
    pub heading: f64,
    pub sensor_depth: f64,
    /// Roll to add on top of the roll already compensated in the beam angles
    pub roll_delta: f64,
    /// Pitch to add on top of the pitch already compensated in the beam angles
    pub pitch_delta: f64,
    /// Absolute roll, bias included
    pub roll: f64,
}

/// Resolves the attitude of a ping under the given biases.
///
/// With a nonzero time lag the heading, sensor depth, roll and pitch are re-sampled from the
/// asynchronous series at the lagged time wherever the file carries them. Roll and pitch are
/// returned as deltas relative to the values logged with the ping, since the beam angles already
/// include those.
pub fn attitude_for_ping(
    nav: &Navigation,
    async_nav: &AsyncNavigation,
    bias: &BiasParameters,
) -> PingAttitude {
    let mut heading = nav.heading;
    let mut sensor_depth = nav.sensor_depth;
    let mut roll = nav.roll;
    let mut pitch = nav.pitch;

    if bias.time_lag != 0.0 {
        let t = nav.time_d + bias.time_lag;
        if let Some(h) = async_nav
            .heading
            .as_ref()
            .and_then(|s| heading_interp(&s.time_d, &s.values, t))
        {
            heading = h;
        }
        if let Some(d) = async_nav.sensor_depth.as_ref().and_then(|s| s.at(t)) {
            sensor_depth = d;
        }
        if let Some(r) = async_nav.roll.as_ref().and_then(|s| s.at(t)) {
            roll = r;
        }
        if let Some(p) = async_nav.pitch.as_ref().and_then(|s| s.at(t)) {
            pitch = p;
        }
    }

    PingAttitude {
        heading: heading + bias.heading,
        sensor_depth,
        roll_delta: roll - nav.roll + bias.roll,
        pitch_delta: pitch - nav.pitch + bias.pitch,
        roll: roll + bias.roll,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn nav() -> Navigation {
        Navigation {
            time_d: 10.0,
            heading: 45.0,
            roll: 2.0,
            pitch: -1.0,
            sensor_depth: 3.0,
            ..Default::default()
        }
    }

    #[test]
    fn biases_without_lag() {
        let bias = BiasParameters {
            roll: 0.5,
            pitch: 0.25,
            heading: 1.0,
            ..Default::default()
        };
        let att = attitude_for_ping(&nav(), &AsyncNavigation::default(), &bias);
        assert_abs_diff_eq!(att.heading, 46.0);
        assert_abs_diff_eq!(att.sensor_depth, 3.0);
        assert_abs_diff_eq!(att.roll_delta, 0.5);
        assert_abs_diff_eq!(att.pitch_delta, 0.25);
        assert_abs_diff_eq!(att.roll, 2.5);
    }

    #[test]
    fn lag_resamples_async_series() {
        let async_nav = AsyncNavigation {
            heading: Some(AsyncSeries::new(vec![10.0, 12.0], vec![40.0, 50.0])),
            sensor_depth: Some(AsyncSeries::new(vec![10.0, 12.0], vec![3.0, 5.0])),
            roll: Some(AsyncSeries::new(vec![10.0, 12.0], vec![2.0, 4.0])),
            pitch: None,
        };
        let bias = BiasParameters {
            time_lag: 1.0,
            ..Default::default()
        };
        let att = attitude_for_ping(&nav(), &async_nav, &bias);
        assert_abs_diff_eq!(att.heading, 45.0);
        assert_abs_diff_eq!(att.sensor_depth, 4.0);
        assert_abs_diff_eq!(att.roll_delta, 1.0);
        assert_abs_diff_eq!(att.pitch_delta, 0.0);
    }

    #[test]
    fn lag_with_bad_ping_time_keeps_logged_attitude() {
        let async_nav = AsyncNavigation {
            heading: Some(AsyncSeries::new(vec![10.0, 12.0], vec![40.0, 50.0])),
            roll: Some(AsyncSeries::new(vec![10.0, 12.0], vec![2.0, 4.0])),
            ..Default::default()
        };
        let bias = BiasParameters {
            time_lag: 1.0,
            ..Default::default()
        };
        let bad = Navigation {
            time_d: f64::NAN,
            ..nav()
        };
        let att = attitude_for_ping(&bad, &async_nav, &bias);
        assert_abs_diff_eq!(att.heading, 45.0);
        assert_abs_diff_eq!(att.roll_delta, 0.0);
        assert_abs_diff_eq!(att.sensor_depth, 3.0);
    }

    #[test]
    fn identity_bias() {
        assert!(BiasParameters::default().is_identity());
        let bias = BiasParameters {
            snell: 1.01,
            ..Default::default()
        };
        assert!(!bias.is_identity());
    }
}
