use crate::error::SwathEditError;
use crate::flags::BeamFlag;
use crate::utils::constants::{EDIT_TIME_TOLERANCE, MULTIPLICITY_FACTOR};
use std::cmp::Ordering;
use tracing::warn;

type Result<T> = std::result::Result<T, SwathEditError>;

/// Change of state recorded in an edit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditAction {
    Flag,
    Unflag,
    Zero,
    Filter,
}

impl EditAction {
    /// Numeric code used on disk.
    pub fn code(self) -> i32 {
        match self {
            EditAction::Flag => 1,
            EditAction::Unflag => 2,
            EditAction::Zero => 3,
            EditAction::Filter => 4,
        }
    }

    pub fn from_code(code: i32) -> Option<EditAction> {
        match code {
            1 => Some(EditAction::Flag),
            2 => Some(EditAction::Unflag),
            3 => Some(EditAction::Zero),
            4 => Some(EditAction::Filter),
            _ => None,
        }
    }

    /// Action that puts a sounding into `flag`, or its nearest recordable class.
    pub fn for_flag(flag: BeamFlag) -> EditAction {
        match flag {
            BeamFlag::Ok => EditAction::Unflag,
            BeamFlag::FilterFlag | BeamFlag::Filter2Flag => EditAction::Filter,
            BeamFlag::ManualFlag | BeamFlag::SonarFlag | BeamFlag::SecondaryPick => EditAction::Flag,
            BeamFlag::Null => EditAction::Zero,
        }
    }

    /// Flag a sounding carries after this action is replayed.
    pub fn resulting_flag(self) -> BeamFlag {
        match self {
            EditAction::Flag => BeamFlag::ManualFlag,
            EditAction::Unflag => BeamFlag::Ok,
            EditAction::Zero => BeamFlag::Null,
            EditAction::Filter => BeamFlag::FilterFlag,
        }
    }
}

/// One edit: which sounding, when, and what happened to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EditRecord {
    /// Ping time in epoch seconds
    pub time_d: f64,
    /// Beam index plus ping multiplicity times 1,000,000
    pub beam: i32,
    pub action: EditAction,
}

impl EditRecord {
    pub fn new(time_d: f64, beam_index: usize, multiplicity: i32, action: EditAction) -> Self {
        EditRecord {
            time_d,
            beam: beam_index as i32 + multiplicity * MULTIPLICITY_FACTOR,
            action,
        }
    }

    pub fn beam_index(&self) -> i32 {
        self.beam % MULTIPLICITY_FACTOR
    }

    pub fn multiplicity(&self) -> i32 {
        self.beam / MULTIPLICITY_FACTOR
    }
}

/// Time and multiplicity that identify a ping in edit records.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingKey {
    pub time_d: f64,
    pub multiplicity: i32,
}

/// Lookup of pings by time.
#[derive(Debug, Clone)]
pub struct PingIndex {
    sorted: Vec<(f64, i32, usize)>,
}

impl PingIndex {
    pub fn new(pings: &[PingKey]) -> Self {
        let mut sorted: Vec<_> = pings
            .iter()
            .enumerate()
            .map(|(i, k)| (k.time_d, k.multiplicity, i))
            .collect();
        sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        PingIndex { sorted }
    }

    /// Ping closest in time to `time_d` within the edit tolerance, with matching multiplicity.
    pub fn find(&self, time_d: f64, multiplicity: i32) -> Option<usize> {
        let start = self
            .sorted
            .partition_point(|&(t, _, _)| t < time_d - EDIT_TIME_TOLERANCE);
        self.sorted[start..]
            .iter()
            .take_while(|&&(t, _, _)| t <= time_d + EDIT_TIME_TOLERANCE)
            .filter(|&&(_, m, _)| m == multiplicity)
            .min_by(|a, b| {
                let da = (a.0 - time_d).abs();
                let db = (b.0 - time_d).abs();
                da.partial_cmp(&db).unwrap_or(Ordering::Equal)
            })
            .map(|&(_, _, i)| i)
    }
}

/// Why a record could not be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingPing,
    BeamOutOfRange,
}

/// Outcome of replaying an edit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayReport {
    pub applied: usize,
    pub missing_ping: usize,
    pub beam_out_of_range: usize,
}

impl ReplayReport {
    pub fn skipped(&self) -> usize {
        self.missing_ping + self.beam_out_of_range
    }
}

/// Applies one record to the flag arrays of a file's pings.
pub fn apply_record(
    index: &PingIndex,
    flags: &mut [Vec<BeamFlag>],
    record: &EditRecord,
) -> std::result::Result<usize, SkipReason> {
    let ping = index
        .find(record.time_d, record.multiplicity())
        .ok_or(SkipReason::MissingPing)?;
    let beams = flags.get_mut(ping).ok_or(SkipReason::MissingPing)?;
    let beam = usize::try_from(record.beam_index()).map_err(|_| SkipReason::BeamOutOfRange)?;
    let slot = beams.get_mut(beam).ok_or(SkipReason::BeamOutOfRange)?;
    *slot = record.action.resulting_flag();
    Ok(ping)
}

/// Append-only list of edits to one swath file, in the order they were made.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EditLog {
    records: Vec<EditRecord>,
}

impl EditLog {
    pub fn new() -> Self {
        EditLog::default()
    }

    pub fn from_records(records: Vec<EditRecord>) -> Self {
        EditLog { records }
    }

    /// Makes room for one more record without pushing it.
    pub fn reserve(&mut self) -> Result<()> {
        self.records
            .try_reserve(1)
            .map_err(|_| SwathEditError::AllocationFailed("edit log".to_string()))
    }

    pub fn record(&mut self, record: EditRecord) -> Result<()> {
        self.reserve()?;
        self.records.push(record);
        Ok(())
    }

    pub fn records(&self) -> &[EditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replays every record onto `flags`, skipping records that do not resolve.
    pub fn replay(&self, pings: &[PingKey], flags: &mut [Vec<BeamFlag>]) -> ReplayReport {
        let index = PingIndex::new(pings);
        let mut report = ReplayReport::default();
        for record in &self.records {
            match apply_record(&index, flags, record) {
                Ok(_) => report.applied += 1,
                Err(reason) => {
                    warn!(
                        time_d = record.time_d,
                        beam = record.beam,
                        ?reason,
                        "edit record skipped"
                    );
                    match reason {
                        SkipReason::MissingPing => report.missing_ping += 1,
                        SkipReason::BeamOutOfRange => report.beam_out_of_range += 1,
                    }
                }
            }
        }
        report
    }

    /// Current flags of a file whose load-time flags are `original`.
    pub fn apply(
        &self,
        pings: &[PingKey],
        original: &[Vec<BeamFlag>],
    ) -> (Vec<Vec<BeamFlag>>, ReplayReport) {
        let mut flags = original.to_vec();
        let report = self.replay(pings, &mut flags);
        (flags, report)
    }

    /// Action that takes a sounding back to where it was before its most recent edit.
    ///
    /// Returns `None` when the sounding has never been edited.
    pub fn undo_action(&self, ping: PingKey, beam: usize, original: BeamFlag) -> Option<EditAction> {
        let code = beam as i32 + ping.multiplicity * MULTIPLICITY_FACTOR;
        let history: Vec<EditAction> = self
            .records
            .iter()
            .filter(|r| r.beam == code && (r.time_d - ping.time_d).abs() <= EDIT_TIME_TOLERANCE)
            .map(|r| r.action)
            .collect();
        let previous = match history.len() {
            0 => return None,
            1 => original,
            n => history[n - 2].resulting_flag(),
        };
        Some(EditAction::for_flag(previous))
    }
}
