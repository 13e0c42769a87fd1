use crate::geometry::footprint::Footprint;
use crate::gridding::weight::{bin_weight, Usage};
use crate::utils::constants::{FIXED_POINT_SCALE, NO_DATA};
use itertools::iproduct;
use ndarray::Array2;
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

type Result<T> = std::result::Result<T, GridError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GridError {
    /// Bounds or spacing that cannot describe a grid
    #[error("Invalid grid bounds: {0}")]
    InvalidBounds(String),

    /// No loaded soundings to take bounds from
    #[error("No soundings are loaded to define a grid")]
    NoData,

    /// Not enough memory for the grid arrays
    #[error("Unable to allocate a {columns} x {rows} grid")]
    AllocationFailed { columns: usize, rows: usize },

    /// Projection could not place the grid bounds
    #[error("{0}")]
    Projection(String),
}

/// How a beam is spread over the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GridAlgorithm {
    /// Footprint-weighted over neighboring cells
    #[default]
    Footprint,
    /// Unit weight into the containing cell only
    SimpleMean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    Add,
    Remove,
}

/// Node-registered grid in projected meters. Cell `(i, j)` is centered at
/// `(xmin + i dx, ymin + j dy)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
    pub dx: f64,
    pub dy: f64,
    pub n_columns: usize,
    pub n_rows: usize,
}

impl GridGeometry {
    /// Fits cells of `dx` by `dy` over the bounds. Upper bounds are moved onto the last cell.
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64, dx: f64, dy: f64) -> Result<Self> {
        let all_finite = [xmin, xmax, ymin, ymax, dx, dy].iter().all(|v| v.is_finite());
        if !all_finite {
            return Err(GridError::InvalidBounds(format!(
                "non-finite bounds {xmin} {xmax} {ymin} {ymax} or spacing {dx} {dy}"
            )));
        }
        if dx <= 0.0 || dy <= 0.0 {
            return Err(GridError::InvalidBounds(format!("cell size {dx} x {dy}")));
        }
        if xmax < xmin || ymax < ymin {
            return Err(GridError::InvalidBounds(format!(
                "x {xmin} to {xmax}, y {ymin} to {ymax}"
            )));
        }
        let n_columns = ((xmax - xmin) / dx) as usize + 1;
        let n_rows = ((ymax - ymin) / dy) as usize + 1;
        Ok(GridGeometry {
            xmin,
            xmax: xmin + (n_columns - 1) as f64 * dx,
            ymin,
            ymax: ymin + (n_rows - 1) as f64 * dy,
            dx,
            dy,
            n_columns,
            n_rows,
        })
    }

    /// Cell whose center is nearest to `(x, y)`, if inside the grid.
    pub fn cell_of(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let fi = ((x - self.xmin) / self.dx + 0.5).floor();
        let fj = ((y - self.ymin) / self.dy + 0.5).floor();
        if !(fi.is_finite() && fj.is_finite()) || fi < 0.0 || fj < 0.0 {
            return None;
        }
        let (i, j) = (fi as usize, fj as usize);
        if i < self.n_columns && j < self.n_rows {
            Some((i, j))
        } else {
            None
        }
    }

    pub fn cell_center(&self, i: usize, j: usize) -> (f64, f64) {
        (
            self.xmin + i as f64 * self.dx,
            self.ymin + j as f64 * self.dy,
        )
    }

    /// Linear index with rows varying fastest.
    pub fn index(&self, i: usize, j: usize) -> usize {
        i * self.n_rows + j
    }
}

/// A beam as the grid sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamSample {
    pub x: f64,
    pub y: f64,
    /// Corrected depth, positive down
    pub depth: f64,
    pub footprint: Footprint,
}

fn to_fixed(value: f64) -> i128 {
    if value.is_finite() {
        (value * FIXED_POINT_SCALE).round() as i128
    } else {
        0
    }
}

fn from_fixed(value: i128) -> f64 {
    value as f64 / FIXED_POINT_SCALE
}

/// Share of one beam in one cell, quantized once so that adding and removing it cancel
/// exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BeamContribution {
    pub weight: i128,
    pub sum: i128,
    pub sigma: i128,
}

impl BeamContribution {
    pub fn new(weight: f64, depth: f64) -> Self {
        BeamContribution {
            weight: to_fixed(weight),
            sum: to_fixed(weight * -depth),
            sigma: to_fixed(weight * depth * depth),
        }
    }

    pub fn signed(self, sign: Sign) -> Self {
        match sign {
            Sign::Add => self,
            Sign::Remove => BeamContribution {
                weight: -self.weight,
                sum: -self.sum,
                sigma: -self.sigma,
            },
        }
    }

    pub fn weight(&self) -> f64 {
        from_fixed(self.weight)
    }
}

fn try_filled<T: Clone>(columns: usize, rows: usize, fill: T) -> Result<Array2<T>> {
    let failed = GridError::AllocationFailed { columns, rows };
    let n = columns.checked_mul(rows).ok_or_else(|| failed.clone())?;
    let mut cells = Vec::new();
    cells.try_reserve_exact(n).map_err(|_| failed.clone())?;
    cells.resize(n, fill);
    Array2::from_shape_vec((columns, rows), cells).map_err(|_| failed)
}

#[derive(Debug, Clone, PartialEq)]
struct Accumulators {
    weight: Array2<i128>,
    sum: Array2<i128>,
    sigma: Array2<i128>,
}

impl Accumulators {
    fn zeros(columns: usize, rows: usize) -> Result<Self> {
        Ok(Accumulators {
            weight: try_filled(columns, rows, 0)?,
            sum: try_filled(columns, rows, 0)?,
            sigma: try_filled(columns, rows, 0)?,
        })
    }

    fn apply(&mut self, i: usize, j: usize, c: BeamContribution) {
        self.weight[[i, j]] += c.weight;
        self.sum[[i, j]] += c.sum;
        self.sigma[[i, j]] += c.sigma;
    }

    fn absorb(&mut self, other: &Accumulators) {
        self.weight += &other.weight;
        self.sum += &other.sum;
        self.sigma += &other.sigma;
    }
}

/// Behavior switches of an [`IncrementalGrid`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridOptions {
    pub algorithm: GridAlgorithm,
    /// Cells with less total weight than this hold no data
    pub epsilon: f64,
    pub nodata: f64,
    /// Also deposit into cells within twice the footprint's 1/e contour
    pub accept_conditional: bool,
    /// Refresh cell values on every add or remove
    pub immediate_recompute: bool,
    /// Spread full rebuilds over the rayon thread pool
    pub parallel: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        GridOptions {
            algorithm: GridAlgorithm::Footprint,
            epsilon: 1e-6,
            nodata: NO_DATA,
            accept_conditional: false,
            immediate_recompute: true,
            parallel: true,
        }
    }
}

/// Statistics of one cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell {
    pub weight: f64,
    /// Weighted mean elevation, negative below the sea surface
    pub value: Option<f64>,
    /// Weighted standard deviation
    pub sigma: Option<f64>,
}

impl GridCell {
    /// Weighted mean depth, positive down.
    pub fn depth(&self) -> Option<f64> {
        self.value.map(|v| -v)
    }
}

fn widen(range: &mut Option<(f64, f64)>, v: f64) {
    *range = match *range {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    };
}

/// Weighted bathymetry grid that can take beams in and out one at a time.
#[derive(Debug, Clone)]
pub struct IncrementalGrid {
    geometry: GridGeometry,
    options: GridOptions,
    acc: Accumulators,
    value: Array2<f64>,
    sigma: Array2<f64>,
    value_range: Option<(f64, f64)>,
    sigma_range: Option<(f64, f64)>,
}

impl IncrementalGrid {
    pub fn new(geometry: GridGeometry, options: GridOptions) -> Result<Self> {
        let (columns, rows) = (geometry.n_columns, geometry.n_rows);
        let grid = IncrementalGrid {
            geometry,
            options,
            acc: Accumulators::zeros(columns, rows)?,
            value: try_filled(columns, rows, options.nodata)?,
            sigma: try_filled(columns, rows, options.nodata)?,
            value_range: None,
            sigma_range: None,
        };
        info!(columns, rows, dx = geometry.dx, dy = geometry.dy, "grid allocated");
        Ok(grid)
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn options(&self) -> &GridOptions {
        &self.options
    }

    /// Visits every cell that takes a share of `beam`, with that share.
    fn deposit<F: FnMut(usize, usize, BeamContribution)>(&self, beam: &BeamSample, visit: &mut F) {
        if !(beam.x.is_finite() && beam.y.is_finite() && beam.depth.is_finite()) {
            return;
        }
        let Some((i, j)) = self.geometry.cell_of(beam.x, beam.y) else {
            debug!(x = beam.x, y = beam.y, "beam outside grid");
            return;
        };

        match self.options.algorithm {
            GridAlgorithm::SimpleMean => visit(i, j, BeamContribution::new(1.0, beam.depth)),
            GridAlgorithm::Footprint => {
                let g = &self.geometry;
                let fp = &beam.footprint;
                let (wx, wy) = fp.search_window(g.dx, g.dy);
                let columns = i.saturating_sub(wx)..=i.saturating_add(wx).min(g.n_columns - 1);
                let rows = j.saturating_sub(wy)..=j.saturating_add(wy).min(g.n_rows - 1);
                let (hx, hy) = (0.5 * g.dx, 0.5 * g.dy);

                for (ii, jj) in iproduct!(columns, rows) {
                    let (cx, cy) = g.cell_center(ii, jj);
                    let (x0, y0) = (cx - beam.x, cy - beam.y);
                    let corners = [
                        fp.to_frame(x0 - hx, y0 - hy),
                        fp.to_frame(x0 + hx, y0 - hy),
                        fp.to_frame(x0 - hx, y0 + hy),
                        fp.to_frame(x0 + hx, y0 + hy),
                    ];
                    let bw = bin_weight(
                        fp.half_width,
                        fp.half_length,
                        1.0,
                        fp.to_frame(x0, y0),
                        (hx, hy),
                        &corners,
                    );
                    let accepted = match bw.usage {
                        Usage::Use => true,
                        Usage::Conditional => self.options.accept_conditional,
                        Usage::Skip => false,
                    };
                    if accepted && bw.weight > 0.0 {
                        visit(ii, jj, BeamContribution::new(bw.weight, beam.depth));
                    }
                }
            }
        }
    }

    /// Every cell share of `beam`, in visiting order.
    pub fn contributions(&self, beam: &BeamSample) -> Vec<(usize, usize, BeamContribution)> {
        let mut shares = Vec::new();
        self.deposit(beam, &mut |i, j, c| shares.push((i, j, c)));
        shares
    }

    /// Adds or removes a beam. Returns the cells that changed.
    pub fn apply_beam(&mut self, beam: &BeamSample, sign: Sign) -> Vec<(usize, usize)> {
        let shares = self.contributions(beam);
        let mut touched = Vec::with_capacity(shares.len());
        for (i, j, c) in shares {
            self.acc.apply(i, j, c.signed(sign));
            if self.options.immediate_recompute {
                self.recompute_cell(i, j);
            }
            touched.push((i, j));
        }
        touched
    }

    pub fn add_beam(&mut self, beam: &BeamSample) -> Vec<(usize, usize)> {
        self.apply_beam(beam, Sign::Add)
    }

    pub fn remove_beam(&mut self, beam: &BeamSample) -> Vec<(usize, usize)> {
        self.apply_beam(beam, Sign::Remove)
    }

    /// Total weight `beam` would deposit into the grid.
    pub fn footprint_mass(&self, beam: &BeamSample) -> f64 {
        let mut total = 0i128;
        self.deposit(beam, &mut |_, _, c| total += c.weight);
        from_fixed(total)
    }

    /// Sum of the weights of every cell.
    pub fn total_weight(&self) -> f64 {
        from_fixed(self.acc.weight.iter().sum())
    }

    /// Clears the grid and adds every beam in `beams`, then refreshes all cells.
    pub fn rebuild_from(&mut self, beams: &[BeamSample]) -> Result<()> {
        let (columns, rows) = (self.geometry.n_columns, self.geometry.n_rows);
        let mut acc = Accumulators::zeros(columns, rows)?;

        if self.options.parallel && beams.len() > 1 {
            let workers = rayon::current_num_threads().max(1);
            let chunk = beams.len().div_ceil(workers);
            let partials: Vec<Result<Accumulators>> = beams
                .par_chunks(chunk)
                .map(|part| {
                    let mut local = Accumulators::zeros(columns, rows)?;
                    for beam in part {
                        self.deposit(beam, &mut |i, j, c| local.apply(i, j, c));
                    }
                    Ok(local)
                })
                .collect();
            for partial in partials {
                acc.absorb(&partial?);
            }
        } else {
            for beam in beams {
                self.deposit(beam, &mut |i, j, c| acc.apply(i, j, c));
            }
        }

        self.acc = acc;
        self.recompute_all();
        info!(
            beams = beams.len(),
            value_range = ?self.value_range,
            "grid rebuilt"
        );
        Ok(())
    }

    /// Derives value and sigma of one cell from its accumulators. Returns the value.
    pub fn recompute_cell(&mut self, i: usize, j: usize) -> f64 {
        let w = self.acc.weight[[i, j]];
        if from_fixed(w) > self.options.epsilon {
            let val = self.acc.sum[[i, j]] as f64 / w as f64;
            let sgm = (self.acc.sigma[[i, j]] as f64 / w as f64 - val * val).abs().sqrt();
            self.value[[i, j]] = val;
            self.sigma[[i, j]] = sgm;
            widen(&mut self.value_range, val);
            widen(&mut self.sigma_range, sgm);
            val
        } else {
            self.value[[i, j]] = self.options.nodata;
            self.sigma[[i, j]] = self.options.nodata;
            self.options.nodata
        }
    }

    /// Refreshes every cell and recomputes the value ranges from scratch.
    pub fn recompute_all(&mut self) {
        self.value_range = None;
        self.sigma_range = None;
        let (columns, rows) = (self.geometry.n_columns, self.geometry.n_rows);
        for (i, j) in iproduct!(0..columns, 0..rows) {
            self.recompute_cell(i, j);
        }
    }

    pub fn cell(&self, i: usize, j: usize) -> Option<GridCell> {
        let w = *self.acc.weight.get((i, j))?;
        let weight = from_fixed(w);
        if weight <= self.options.epsilon {
            return Some(GridCell {
                weight,
                value: None,
                sigma: None,
            });
        }
        let val = self.acc.sum[[i, j]] as f64 / w as f64;
        let sgm = (self.acc.sigma[[i, j]] as f64 / w as f64 - val * val).abs().sqrt();
        Some(GridCell {
            weight,
            value: Some(val),
            sigma: Some(sgm),
        })
    }

    /// Raw fixed-point accumulators of a cell.
    pub fn accumulated(&self, i: usize, j: usize) -> Option<BeamContribution> {
        Some(BeamContribution {
            weight: *self.acc.weight.get((i, j))?,
            sum: self.acc.sum[[i, j]],
            sigma: self.acc.sigma[[i, j]],
        })
    }

    /// Cell values indexed `[column, row]`, `nodata` where empty.
    pub fn values(&self) -> &Array2<f64> {
        &self.value
    }

    pub fn sigmas(&self) -> &Array2<f64> {
        &self.sigma
    }

    /// Smallest and largest cell value seen since the last full refresh.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.value_range
    }

    pub fn sigma_range(&self) -> Option<(f64, f64)> {
        self.sigma_range
    }

    pub fn cells_with_data(&self) -> usize {
        self.acc
            .weight
            .iter()
            .filter(|&&w| from_fixed(w) > self.options.epsilon)
            .count()
    }
}
