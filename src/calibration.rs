//! Bias calibration: how well the selected soundings agree with each other under a set of
//! biases, and a stepped search for the biases that make them agree best.
//!
//! Agreement is measured on a local grid at twice the main grid spacing laid over the
//! selection frame. Each bin holds the `Ok` soundings falling in it; its variance is taken about
//! the first sounding in the bin to keep the sums small, and the score is the mean variance over
//! the bins that hold anything.

use crate::error::SwathEditError;
use crate::geometry::attitude::BiasParameters;
use crate::projection::Projection;
use crate::selection::{SelectedSounding, SelectionBuffer};
use crate::swath::store::FileSwathStore;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, SwathEditError>;

/// Fraction of the selection extent added on each side of the variance grid.
const PADDING: f64 = 0.25;

/// Bins of the variance grid.
#[derive(Debug, Clone, PartialEq)]
pub struct VarianceGrid {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub dx: f64,
    pub dy: f64,
    pub n_columns: usize,
    pub n_rows: usize,
    first: Vec<f64>,
    sum: Vec<f64>,
    sum2: Vec<f64>,
    num: Vec<usize>,
}

/// Mean bin variance and the number of bins it was taken over.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VarianceScore {
    pub variance: f64,
    pub bins: usize,
}

impl VarianceGrid {
    /// Grid over the selection frame with bins twice the size of the main grid cells.
    pub fn for_selection(selection: &SelectionBuffer, cell_dx: f64, cell_dy: f64) -> Result<Self> {
        let dx = 2.0 * cell_dx;
        let dy = 2.0 * cell_dy;
        if !(dx > 0.0 && dy > 0.0) {
            return Err(SwathEditError::Input(format!("bad variance bin size {dx} x {dy}")));
        }
        let pad_x = PADDING * (selection.xmax - selection.xmin);
        let pad_y = PADDING * (selection.ymax - selection.ymin);
        let xmin = selection.xmin - pad_x;
        let ymin = selection.ymin - pad_y;
        let n_columns = ((selection.xmax + pad_x - xmin) / dx) as usize + 1;
        let n_rows = ((selection.ymax + pad_y - ymin) / dy) as usize + 1;

        let n = n_columns
            .checked_mul(n_rows)
            .ok_or_else(|| SwathEditError::AllocationFailed("variance grid".to_string()))?;
        let zeros = |what: &str| -> Result<Vec<f64>> {
            let mut v = Vec::new();
            v.try_reserve_exact(n)
                .map_err(|_| SwathEditError::AllocationFailed(what.to_string()))?;
            v.resize(n, 0.0);
            Ok(v)
        };
        let mut num = Vec::new();
        num.try_reserve_exact(n)
            .map_err(|_| SwathEditError::AllocationFailed("variance counts".to_string()))?;
        num.resize(n, 0);

        Ok(VarianceGrid {
            xmin,
            xmax: xmin + n_columns as f64 * dx,
            ymin,
            ymax: ymin + n_rows as f64 * dy,
            dx,
            dy,
            n_columns,
            n_rows,
            first: zeros("variance references")?,
            sum: zeros("variance sums")?,
            sum2: zeros("variance squares")?,
            num,
        })
    }

    fn bin_of(&self, x: f64, y: f64) -> Option<usize> {
        let fi = ((x - self.xmin) / self.dx).floor();
        let fj = ((y - self.ymin) / self.dy).floor();
        if !(fi >= 0.0 && fj >= 0.0) {
            return None;
        }
        let (i, j) = (fi as usize, fj as usize);
        (i < self.n_columns && j < self.n_rows).then_some(i * self.n_rows + j)
    }

    /// Scores soundings in the selection frame, or `None` when no bin receives any.
    pub fn evaluate(&mut self, soundings: &[SelectedSounding]) -> Option<VarianceScore> {
        self.first.fill(0.0);
        self.sum.fill(0.0);
        self.sum2.fill(0.0);
        self.num.fill(0);

        for s in soundings.iter().filter(|s| s.flag.is_ok()) {
            let Some(k) = self.bin_of(s.x, s.y) else {
                continue;
            };
            if self.num[k] == 0 {
                self.first[k] = s.z;
            }
            let z = s.z - self.first[k];
            self.sum[k] += z;
            self.sum2[k] += z * z;
            self.num[k] += 1;
        }

        let mut total = 0.0;
        let mut bins = 0;
        for k in 0..self.num.len() {
            let n = self.num[k] as f64;
            if self.num[k] > 0 {
                total += (self.sum2[k] - self.sum[k] * self.sum[k] / n) / n;
                bins += 1;
            }
        }
        (bins > 0).then(|| VarianceScore {
            variance: total / bins as f64,
            bins,
        })
    }
}

/// Mean bin variance of `selection` once repositioned under `bias`. The selection is left at
/// the new positions.
pub fn bias_variance(
    store: &FileSwathStore,
    selection: &mut SelectionBuffer,
    grid: &mut VarianceGrid,
    bias: &BiasParameters,
    projection: &dyn Projection,
) -> Option<VarianceScore> {
    selection.rebias(store, bias, projection);
    grid.evaluate(&selection.soundings)
}

/// Which bias parameters a search varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OptimizeMode {
    pub roll: bool,
    pub pitch: bool,
    pub heading: bool,
    pub time_lag: bool,
    pub snell: bool,
}

impl OptimizeMode {
    pub const ROLL: u8 = 0x01;
    pub const PITCH: u8 = 0x02;
    pub const HEADING: u8 = 0x04;
    pub const TIME_LAG: u8 = 0x08;
    pub const SNELL: u8 = 0x10;

    pub fn from_bits(bits: u8) -> Self {
        OptimizeMode {
            roll: bits & Self::ROLL != 0,
            pitch: bits & Self::PITCH != 0,
            heading: bits & Self::HEADING != 0,
            time_lag: bits & Self::TIME_LAG != 0,
            snell: bits & Self::SNELL != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        [
            (self.roll, Self::ROLL),
            (self.pitch, Self::PITCH),
            (self.heading, Self::HEADING),
            (self.time_lag, Self::TIME_LAG),
            (self.snell, Self::SNELL),
        ]
        .iter()
        .filter(|(on, _)| *on)
        .fold(0, |acc, (_, bit)| acc | bit)
    }

    pub fn is_empty(&self) -> bool {
        self.bits() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parameter {
    Roll,
    Pitch,
    Heading,
    TimeLag,
    Snell,
}

impl Parameter {
    fn get(self, bias: &BiasParameters) -> f64 {
        match self {
            Parameter::Roll => bias.roll,
            Parameter::Pitch => bias.pitch,
            Parameter::Heading => bias.heading,
            Parameter::TimeLag => bias.time_lag,
            Parameter::Snell => bias.snell,
        }
    }

    fn set(self, bias: &mut BiasParameters, value: f64) {
        match self {
            Parameter::Roll => bias.roll = value,
            Parameter::Pitch => bias.pitch = value,
            Parameter::Heading => bias.heading = value,
            Parameter::TimeLag => bias.time_lag = value,
            Parameter::Snell => bias.snell = value,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Parameter::Roll => "roll bias",
            Parameter::Pitch => "pitch bias",
            Parameter::Heading => "heading bias",
            Parameter::TimeLag => "time lag",
            Parameter::Snell => "snell",
        }
    }
}

/// A sweep of one parameter: number of steps and half range about the current best.
#[derive(Debug, Clone, Copy)]
struct Sweep {
    parameter: Parameter,
    steps: usize,
    half_range: f64,
}

const fn coarse(parameter: Parameter) -> Sweep {
    Sweep {
        parameter,
        steps: 11,
        half_range: 5.0,
    }
}

const fn fine(parameter: Parameter) -> Sweep {
    Sweep {
        parameter,
        steps: 19,
        half_range: 0.9,
    }
}

/// Order in which the parameters of `mode` are searched.
fn schedule(mode: OptimizeMode) -> Vec<Sweep> {
    let mut sweeps = vec![];
    let attitude = [
        (mode.roll, Parameter::Roll, OptimizeMode::ROLL),
        (mode.pitch, Parameter::Pitch, OptimizeMode::PITCH),
        (mode.heading, Parameter::Heading, OptimizeMode::HEADING),
    ];
    for (on, p, _) in attitude {
        if on {
            sweeps.push(coarse(p));
            sweeps.push(fine(p));
        }
    }
    // refine again when searched together with anything else
    for (on, p, bit) in attitude {
        if on && mode.bits() != bit {
            sweeps.push(fine(p));
        }
    }
    if mode.time_lag {
        sweeps.push(Sweep {
            parameter: Parameter::TimeLag,
            steps: 21,
            half_range: 1.0,
        });
        sweeps.push(Sweep {
            parameter: Parameter::TimeLag,
            steps: 19,
            half_range: 0.09,
        });
    }
    if mode.snell {
        sweeps.push(Sweep {
            parameter: Parameter::Snell,
            steps: 21,
            half_range: 0.1,
        });
        sweeps.push(Sweep {
            parameter: Parameter::Snell,
            steps: 19,
            half_range: 0.009,
        });
    }
    sweeps
}

/// Outcome of a bias search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiasOptimization {
    pub bias: BiasParameters,
    /// Score of `bias`, `None` when no candidate put soundings in any bin
    pub score: Option<VarianceScore>,
    pub evaluations: usize,
}

/// Searches for the biases that minimize the bin variance of `selection`.
///
/// Parameters are swept one at a time about the best values so far, starting from `start`.
/// The selection itself is left untouched and nothing is applied.
pub fn optimize_bias(
    store: &FileSwathStore,
    selection: &SelectionBuffer,
    projection: &dyn Projection,
    cell: (f64, f64),
    start: BiasParameters,
    mode: OptimizeMode,
    progress: &mut dyn FnMut(&str, usize, usize),
) -> Result<BiasOptimization> {
    if selection.is_empty() {
        return Err(SwathEditError::NoSelection);
    }
    let mut grid = VarianceGrid::for_selection(selection, cell.0, cell.1)?;
    let mut working = selection.clone();
    let sweeps = schedule(mode);
    let total: usize = sweeps.iter().map(|s| s.steps).sum();

    let mut best = start;
    let mut best_score: Option<VarianceScore> = None;
    let mut evaluations = 0;
    for sweep in sweeps {
        let center = sweep.parameter.get(&best);
        let first = center - sweep.half_range;
        let step = 2.0 * sweep.half_range / (sweep.steps - 1) as f64;
        for i in 0..sweep.steps {
            let mut candidate = best;
            sweep.parameter.set(&mut candidate, first + i as f64 * step);
            let score = bias_variance(store, &mut working, &mut grid, &candidate, projection);
            evaluations += 1;
            if let Some(s) = score {
                if best_score.map_or(true, |b| s.variance < b.variance) {
                    best = candidate;
                    best_score = Some(s);
                }
            }
            debug!(
                parameter = sweep.parameter.name(),
                value = sweep.parameter.get(&candidate),
                variance = score.map(|s| s.variance),
                "bias candidate"
            );
            progress(
                &format!("Optimizing {}", sweep.parameter.name()),
                evaluations,
                total,
            );
        }
    }

    info!(
        roll = best.roll,
        pitch = best.pitch,
        heading = best.heading,
        time_lag = best.time_lag,
        snell = best.snell,
        variance = best_score.map(|s| s.variance),
        evaluations,
        "bias search done"
    );
    Ok(BiasOptimization {
        bias: best,
        score: best_score,
        evaluations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::BeamFlag;
    use approx::assert_abs_diff_eq;

    fn sounding(x: f64, y: f64, z: f64) -> SelectedSounding {
        SelectedSounding {
            file: 0,
            ping: 0,
            beam: 0,
            x,
            y,
            z,
            flag: BeamFlag::Ok,
            original_flag: BeamFlag::Ok,
            amp: 0.0,
        }
    }

    fn frame(half: f64) -> SelectionBuffer {
        let mut b = SelectionBuffer::with_frame(0.0, 0.0, 90.0);
        b.xmin = -half;
        b.xmax = half;
        b.ymin = -half;
        b.ymax = half;
        b
    }

    #[test]
    fn grid_is_padded_around_selection() {
        let g = VarianceGrid::for_selection(&frame(10.0), 1.0, 1.0).unwrap();
        assert_abs_diff_eq!(g.xmin, -15.0);
        assert_eq!(g.n_columns, 16);
        assert_abs_diff_eq!(g.xmax, 17.0);
        assert_eq!(g.dx, 2.0);
        assert!(VarianceGrid::for_selection(&frame(10.0), 0.0, 1.0).is_err());
    }

    #[test]
    fn variance_of_bins() {
        let mut g = VarianceGrid::for_selection(&frame(10.0), 1.0, 1.0).unwrap();
        // one bin with z 1, 2, 3 and one with a single sounding
        let mut soundings = vec![
            sounding(0.1, 0.1, 1.0),
            sounding(0.2, 0.3, 2.0),
            sounding(0.5, 0.4, 3.0),
            sounding(5.0, 5.0, 7.0),
        ];
        let score = g.evaluate(&soundings).unwrap();
        assert_eq!(score.bins, 2);
        assert_abs_diff_eq!(score.variance, (2.0 / 3.0) / 2.0, epsilon = 1e-12);

        // flagged soundings do not count
        soundings[2].flag = BeamFlag::ManualFlag;
        let score = g.evaluate(&soundings).unwrap();
        assert_abs_diff_eq!(score.variance, 0.25 / 2.0, epsilon = 1e-12);

        assert_eq!(g.evaluate(&[sounding(500.0, 0.0, 1.0)]), None);
    }

    #[test]
    fn mode_bits() {
        let m = OptimizeMode::from_bits(0x01 | 0x08);
        assert!(m.roll && m.time_lag && !m.pitch);
        assert_eq!(m.bits(), 0x09);
        assert!(OptimizeMode::default().is_empty());
    }

    #[test]
    fn schedule_follows_mode() {
        let steps = |bits: u8| -> Vec<(Parameter, usize)> {
            schedule(OptimizeMode::from_bits(bits))
                .iter()
                .map(|s| (s.parameter, s.steps))
                .collect()
        };
        assert_eq!(steps(0x01), vec![(Parameter::Roll, 11), (Parameter::Roll, 19)]);
        assert_eq!(
            steps(0x03),
            vec![
                (Parameter::Roll, 11),
                (Parameter::Roll, 19),
                (Parameter::Pitch, 11),
                (Parameter::Pitch, 19),
                (Parameter::Roll, 19),
                (Parameter::Pitch, 19),
            ]
        );
        assert_eq!(
            steps(0x18),
            vec![
                (Parameter::TimeLag, 21),
                (Parameter::TimeLag, 19),
                (Parameter::Snell, 21),
                (Parameter::Snell, 19),
            ]
        );
        assert!(steps(0x00).is_empty());
    }

    #[test]
    fn empty_selection_is_rejected() {
        let store = FileSwathStore::new();
        let p = crate::projection::LocalProjection::new(0.0, 0.0);
        let err = optimize_bias(
            &store,
            &SelectionBuffer::default(),
            &p,
            (1.0, 1.0),
            BiasParameters::default(),
            OptimizeMode::from_bits(0x01),
            &mut |_, _, _| {},
        )
        .unwrap_err();
        assert!(matches!(err, SwathEditError::NoSelection));
    }
}
