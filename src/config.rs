use crate::edits::store::EditOutput;
use crate::gridding::grid::{GridAlgorithm, GridOptions};
use crate::utils::constants::NO_DATA;

/// Settings of an editing session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub algorithm: GridAlgorithm,
    /// Cell size in meters, derived from the survey depth when unset
    pub cell_size: Option<f64>,
    /// Weight below which a cell holds no data
    pub epsilon: f64,
    pub nodata: f64,
    /// Recompute and report cells as soon as a sounding changes
    pub immediate_recompute: bool,
    /// Let cells within twice the footprint contour take weight
    pub accept_conditional: bool,
    /// Pull secondary picks into selections
    pub include_secondary: bool,
    /// Full beam widths in degrees for files that do not report them
    pub default_beamwidth_across: f64,
    pub default_beamwidth_along: f64,
    pub edit_output: EditOutput,
    pub parallel_rebuild: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            algorithm: GridAlgorithm::Footprint,
            cell_size: None,
            epsilon: 1.0e-6,
            nodata: NO_DATA,
            immediate_recompute: true,
            accept_conditional: false,
            include_secondary: false,
            default_beamwidth_across: 2.0,
            default_beamwidth_along: 2.0,
            edit_output: EditOutput::Write,
            parallel_rebuild: true,
        }
    }
}

impl SessionConfig {
    pub fn grid_options(&self) -> GridOptions {
        GridOptions {
            algorithm: self.algorithm,
            epsilon: self.epsilon,
            nodata: self.nodata,
            accept_conditional: self.accept_conditional,
            immediate_recompute: self.immediate_recompute,
            parallel: self.parallel_rebuild,
        }
    }
}
