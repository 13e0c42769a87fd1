use crate::calibration::{optimize_bias, BiasOptimization, OptimizeMode};
use crate::config::SessionConfig;
use crate::edits::esf::{EditAction, EditLog, EditRecord, ReplayReport};
use crate::edits::store::EditStateStore;
use crate::error::SwathEditError;
use crate::flags::BeamFlag;
use crate::geometry::attitude::BiasParameters;
use crate::gridding::bounds::grid_geometry;
use crate::gridding::grid::{BeamSample, GridError, IncrementalGrid, Sign};
use crate::projection::{Projection, UtmProjection};
use crate::selection::{select, Region, SelectionBuffer};
use crate::swath::decoded::DecodedFile;
use crate::swath::store::FileSwathStore;
use crate::utils::time::format_epoch;
use itertools::Itertools;
use ndarray::Array2;
use tracing::{debug, info, warn};

type Result<T> = std::result::Result<T, SwathEditError>;

/// Receives notifications from an [`EditorSession`]. Every method does nothing by default.
pub trait SessionObserver {
    /// One cell changed; `value` is the new elevation or the no-data value.
    fn grid_cell_updated(&mut self, _i: usize, _j: usize, _value: f64) {}

    /// The whole grid changed.
    fn grid_replaced(&mut self, _columns: usize, _rows: usize, _values: &Array2<f64>) {}

    fn plot_requested(&mut self) {}

    /// New biases were applied to every sounding.
    fn bias_applied(&mut self, _bias: &BiasParameters) {}

    fn progress(&mut self, _message: &str, _done: usize, _total: usize) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

/// When a redraw follows an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Apply the edit without a redraw
    NoFlush,
    /// Apply the edit and redraw
    #[default]
    Flush,
    /// Apply nothing, only redraw what earlier edits changed
    FlushPrevious,
}

/// Everything an editing session owns: files, edit logs, grid, selection and biases.
pub struct EditorSession {
    config: SessionConfig,
    observer: Box<dyn SessionObserver>,
    projection: Option<Box<dyn Projection>>,
    store: FileSwathStore,
    edits: EditStateStore,
    grid: Option<IncrementalGrid>,
    /// Biases the stored soundings and the grid reflect
    bias: BiasParameters,
    /// Biases the selection was last positioned with
    selection_bias: BiasParameters,
    selection: Option<SelectionBuffer>,
    projection_failures: usize,
}

impl EditorSession {
    pub fn new(config: SessionConfig, observer: Box<dyn SessionObserver>) -> Self {
        let edits = EditStateStore::new(config.edit_output);
        EditorSession {
            config,
            observer,
            projection: None,
            store: FileSwathStore::new(),
            edits,
            grid: None,
            bias: BiasParameters::default(),
            selection_bias: BiasParameters::default(),
            selection: None,
            projection_failures: 0,
        }
    }

    /// Uses `projection` instead of the UTM zone of the survey.
    pub fn with_projection(mut self, projection: Box<dyn Projection>) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn bias(&self) -> BiasParameters {
        self.bias
    }

    pub fn store(&self) -> &FileSwathStore {
        &self.store
    }

    pub fn grid(&self) -> Option<&IncrementalGrid> {
        self.grid.as_ref()
    }

    pub fn selection(&self) -> Option<&SelectionBuffer> {
        self.selection.as_ref()
    }

    pub fn edit_log(&self, file: usize) -> Option<&EditLog> {
        self.edits.log(file)
    }

    pub fn projection(&self) -> Option<&dyn Projection> {
        self.projection.as_deref()
    }

    /// Soundings left out of the grid or a selection because they could not be projected.
    pub fn projection_failures(&self) -> usize {
        self.projection_failures
    }

    fn fill_beamwidths(&self, decoded: &mut DecodedFile) {
        if !(decoded.beamwidth_across > 0.0) {
            decoded.beamwidth_across = self.config.default_beamwidth_across;
        }
        if !(decoded.beamwidth_along > 0.0) {
            decoded.beamwidth_along = self.config.default_beamwidth_along;
        }
    }

    /// Replays the edit log of a file over its load-time flags.
    fn replay_edits(&mut self, index: usize) -> Result<ReplayReport> {
        let file = self.store.file(index)?;
        let Some(log) = self.edits.log(index) else {
            return Ok(ReplayReport::default());
        };
        let (flags, report) = log.apply(&file.ping_keys(), &file.original_flags());
        self.store.file_mut(index)?.set_flags(flags);
        if report.skipped() > 0 {
            warn!(
                file = index,
                applied = report.applied,
                missing_ping = report.missing_ping,
                beam_out_of_range = report.beam_out_of_range,
                "some edits could not be replayed"
            );
        } else if report.applied > 0 {
            info!(file = index, applied = report.applied, "edits replayed");
        }
        Ok(report)
    }

    /// Opens the edit log of a freshly filled file, replays it and puts the file in the grid.
    fn attach(&mut self, index: usize) -> Result<ReplayReport> {
        let path = self.store.file(index)?.path.clone();
        self.edits.open(index, path.as_deref())?;
        let report = self.replay_edits(index)?;
        if self.grid.is_some() {
            self.project_file(index)?;
            self.grid_file(index, Sign::Add)?;
            self.notify_grid();
        }
        Ok(report)
    }

    /// Loads a decoded file and replays its edit log.
    /// Returns the file index and what the replay did.
    pub fn load_file(&mut self, mut decoded: DecodedFile) -> Result<(usize, ReplayReport)> {
        self.fill_beamwidths(&mut decoded);
        let index = self.store.load(decoded, &self.bias)?;
        match self.attach(index) {
            Ok(report) => Ok((index, report)),
            Err(e) => {
                self.edits.remove(index);
                self.store.delete(index)?;
                Err(e)
            }
        }
    }

    /// Fills a previously unloaded file again.
    pub fn reload_file(&mut self, index: usize, mut decoded: DecodedFile) -> Result<ReplayReport> {
        if self.store.file(index)?.is_loaded() {
            self.unload_file(index)?;
        }
        self.fill_beamwidths(&mut decoded);
        self.store.reload(index, &decoded, &self.bias)?;
        self.attach(index)
    }

    /// Takes a file's soundings out of the grid and releases its pings.
    pub fn unload_file(&mut self, index: usize) -> Result<()> {
        let file = self.store.file(index)?;
        if !file.is_loaded() {
            return Ok(());
        }
        if self.grid.is_some() {
            self.grid_file(index, Sign::Remove)?;
            self.notify_grid();
        }
        if self
            .selection
            .as_ref()
            .is_some_and(|s| s.soundings.iter().any(|x| x.file == index))
        {
            self.dismiss_selection();
        }
        self.edits.close(index);
        self.store.unload(index)
    }

    /// Unloads a file and forgets it; later files shift down by one.
    pub fn delete_file(&mut self, index: usize) -> Result<()> {
        self.unload_file(index)?;
        self.store.delete(index)?;
        self.edits.remove(index);
        self.dismiss_selection();
        Ok(())
    }

    fn project_file(&mut self, index: usize) -> Result<usize> {
        let projection = self
            .projection
            .as_deref()
            .ok_or_else(|| SwathEditError::Projection("No projection set up".to_string()))?;
        let failures = self.store.file_mut(index)?.project(projection);
        if failures > 0 {
            warn!(file = index, failures, "soundings could not be projected");
        }
        self.projection_failures += failures;
        Ok(failures)
    }

    /// Adds or removes every `Ok` sounding of a file.
    fn grid_file(&mut self, index: usize, sign: Sign) -> Result<()> {
        let samples = self.store.file(index)?.ok_samples();
        let grid = self.grid.as_mut().ok_or(SwathEditError::NoGrid)?;
        for sample in &samples {
            grid.apply_beam(sample, sign);
        }
        debug!(file = index, beams = samples.len(), ?sign, "file gridded");
        Ok(())
    }

    fn notify_grid(&mut self) {
        if let Some(grid) = &self.grid {
            let g = grid.geometry();
            self.observer
                .grid_replaced(g.n_columns, g.n_rows, grid.values());
        }
    }

    /// Lays out the grid over the loaded files and fills it.
    ///
    /// Without a projection given at construction, the UTM zone of the survey center is used.
    pub fn setup_grid(&mut self) -> Result<()> {
        let extent = self.store.extent();
        if self.projection.is_none() {
            let bounds = extent.bounds.ok_or(GridError::NoData)?;
            let (lon, lat) = bounds.center();
            let utm = UtmProjection::for_reference(lon, lat)?;
            info!(projection = %utm.id(), "projection chosen");
            self.projection = Some(Box::new(utm));
        }
        let projection = self
            .projection
            .as_deref()
            .ok_or_else(|| SwathEditError::Projection("No projection set up".to_string()))?;
        let geometry = grid_geometry(&extent, projection, self.config.cell_size)?;
        self.grid = Some(IncrementalGrid::new(geometry, self.config.grid_options())?);
        self.project_all()?;
        self.make_grid()
    }

    fn project_all(&mut self) -> Result<()> {
        self.projection_failures = 0;
        for index in 0..self.store.len() {
            if self.store.file(index)?.is_loaded() {
                self.project_file(index)?;
            }
        }
        Ok(())
    }

    /// Re-derives every sounding position under the current biases.
    pub fn correct_all(&mut self) -> Result<()> {
        let total = self.store.len();
        for (i, file) in self.store.files_mut().iter_mut().enumerate() {
            if file.is_loaded() {
                file.correct(&self.bias);
            }
            self.observer.progress("Correcting soundings", i + 1, total);
        }
        if self.projection.is_some() {
            self.project_all()?;
        }
        Ok(())
    }

    /// Rebuilds the grid from every `Ok` sounding of every loaded file.
    pub fn make_grid(&mut self) -> Result<()> {
        if self.grid.is_none() {
            return Err(SwathEditError::NoGrid);
        }
        let total = self.store.len();
        let mut samples: Vec<BeamSample> = Vec::new();
        for (i, file) in self.store.files().iter().enumerate() {
            if file.is_loaded() {
                let s = file.ok_samples();
                samples
                    .try_reserve(s.len())
                    .map_err(|_| SwathEditError::AllocationFailed("grid samples".to_string()))?;
                samples.extend(s);
            }
            self.observer.progress("Gridding soundings", i + 1, total);
        }
        let grid = self.grid.as_mut().ok_or(SwathEditError::NoGrid)?;
        grid.rebuild_from(&samples)?;
        self.notify_grid();
        Ok(())
    }

    /// Applies a flag change made in the editor.
    ///
    /// The edit is logged before the grid changes. Flags are stored as the log will replay
    /// them, so a sonar flag set here comes back as a manual flag.
    pub fn on_edit(
        &mut self,
        file: usize,
        ping: usize,
        beam: usize,
        flag: BeamFlag,
        flush: FlushPolicy,
    ) -> Result<()> {
        if flush == FlushPolicy::FlushPrevious {
            self.observer.plot_requested();
            return Ok(());
        }

        let swath = self.store.file(file)?;
        let (beamwidth_across, beamwidth_along) = (swath.beamwidth_across, swath.beamwidth_along);
        let p = self.store.ping(file, ping)?;
        if beam >= p.beam_count() {
            return Err(SwathEditError::BeamIndex { file, ping, beam });
        }
        let current = p.flags[beam];
        if current.is_null() {
            debug!(file, ping, beam, "null sounding not edited");
            return Ok(());
        }

        let action = EditAction::for_flag(flag);
        let new = action.resulting_flag();
        let record = EditRecord::new(p.nav.time_d, beam, p.multiplicity, action);
        let sample = p.sample(beam, beamwidth_across, beamwidth_along);
        self.edits.record(file, record)?;

        let mut touched = vec![];
        if let (Some(grid), Some(sample)) = (self.grid.as_mut(), sample) {
            touched = match (current.is_ok(), new.is_ok()) {
                (true, false) => grid.apply_beam(&sample, Sign::Remove),
                (false, true) => grid.apply_beam(&sample, Sign::Add),
                _ => vec![],
            };
        }
        self.store.ping_mut(file, ping)?.flags[beam] = new;
        if let Some(selection) = self.selection.as_mut() {
            selection.set_flag(file, ping, beam, new);
        }

        if let Some(grid) = &self.grid {
            if self.config.immediate_recompute {
                for (i, j) in touched.into_iter().unique() {
                    self.observer.grid_cell_updated(i, j, grid.values()[[i, j]]);
                }
            }
        }
        if flush == FlushPolicy::Flush {
            self.observer.plot_requested();
        }
        Ok(())
    }

    /// Takes a sounding back to its state before its most recent edit.
    ///
    /// Returns the action recorded, or `None` when the sounding was never edited.
    pub fn undo_last_edit(
        &mut self,
        file: usize,
        ping: usize,
        beam: usize,
        flush: FlushPolicy,
    ) -> Result<Option<EditAction>> {
        let p = self.store.ping(file, ping)?;
        let original = *p
            .original_flags
            .get(beam)
            .ok_or(SwathEditError::BeamIndex { file, ping, beam })?;
        let log = self.edits.log(file).ok_or(SwathEditError::FileUnloaded(file))?;
        let Some(action) = log.undo_action(p.key(), beam, original) else {
            return Ok(None);
        };
        self.on_edit(file, ping, beam, action.resulting_flag(), flush)?;
        Ok(Some(action))
    }

    /// Applies new biases to every sounding and rebuilds the grid.
    pub fn on_bias_changed(&mut self, bias: BiasParameters) -> Result<()> {
        info!(
            roll = bias.roll,
            pitch = bias.pitch,
            heading = bias.heading,
            time_lag = bias.time_lag,
            snell = bias.snell,
            "applying biases"
        );
        self.bias = bias;
        self.selection_bias = bias;
        self.correct_all()?;
        if self.grid.is_some() {
            self.make_grid()?;
        }
        if let (Some(selection), Some(projection)) =
            (self.selection.as_mut(), self.projection.as_deref())
        {
            selection.rebias(&self.store, &bias, projection);
        }
        self.observer.bias_applied(&bias);
        self.observer.plot_requested();
        Ok(())
    }

    /// Repositions the selection under `bias` without touching the grid or stored soundings.
    pub fn apply_bias_to_selection(&mut self, bias: BiasParameters) -> Result<()> {
        let selection = self.selection.as_mut().ok_or(SwathEditError::NoSelection)?;
        let projection = self
            .projection
            .as_deref()
            .ok_or_else(|| SwathEditError::Projection("No projection set up".to_string()))?;
        selection.rebias(&self.store, &bias, projection);
        self.selection_bias = bias;
        Ok(())
    }

    /// Replaces the selection with the soundings in `region`.
    pub fn select(&mut self, region: &Region) -> Result<&SelectionBuffer> {
        let projection = self
            .projection
            .as_deref()
            .ok_or_else(|| SwathEditError::Projection("No projection set up".to_string()))?;
        let buffer = select(
            &self.store,
            region,
            &self.selection_bias,
            projection,
            self.config.include_secondary,
        );
        self.projection_failures += buffer.projection_failures;
        info!(
            soundings = buffer.len(),
            unflagged = buffer.num_unflagged(),
            "soundings selected"
        );
        Ok(self.selection.insert(buffer))
    }

    pub fn dismiss_selection(&mut self) {
        self.selection = None;
    }

    /// Searches for the biases that best reconcile the selected soundings. Nothing is applied.
    pub fn optimize_bias(&mut self, mode: OptimizeMode) -> Result<BiasOptimization> {
        let selection = self.selection.as_ref().ok_or(SwathEditError::NoSelection)?;
        let grid = self.grid.as_ref().ok_or(SwathEditError::NoGrid)?;
        let projection = self
            .projection
            .as_deref()
            .ok_or_else(|| SwathEditError::Projection("No projection set up".to_string()))?;
        let cell = (grid.geometry().dx, grid.geometry().dy);
        let observer = &mut self.observer;
        optimize_bias(
            &self.store,
            selection,
            projection,
            cell,
            self.selection_bias,
            mode,
            &mut |message, done, total| observer.progress(message, done, total),
        )
    }

    /// Human-readable description of one sounding.
    pub fn sounding_info(&self, file: usize, ping: usize, beam: usize) -> Result<String> {
        let f = self.store.file(file)?;
        let p = self.store.ping(file, ping)?;
        if beam >= p.beam_count() {
            return Err(SwathEditError::BeamIndex { file, ping, beam });
        }
        Ok(format!(
            "Beam {beam} of {}   Ping {ping} of {}   File:{}\n\
             Ping Time: {} {:.6}\n\
             Lon:{:.6} Lat:{:.6} Depth:{:.3} X:{:.3} L:{:.3} A:{:.3} Flag:{}",
            p.beam_count(),
            f.pings.len(),
            f.name,
            format_epoch(p.nav.time_d),
            p.nav.time_d,
            p.lon[beam],
            p.lat[beam],
            p.bath[beam],
            p.across[beam],
            p.along[beam],
            p.amp[beam],
            p.flags[beam].label(),
        ))
    }
}
