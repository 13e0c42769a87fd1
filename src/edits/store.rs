use crate::edits::esf::{EditLog, EditRecord};
use crate::edits::io::{esf_path, read_esf, EsfWriter};
use crate::error::SwathEditError;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

type Result<T> = std::result::Result<T, SwathEditError>;

/// Whether edits are written back to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditOutput {
    /// Append every edit to the file's `.esf` log
    #[default]
    Write,
    /// Keep edits in memory only
    Browse,
}

#[derive(Debug)]
struct FileEdits {
    log: EditLog,
    writer: Option<EsfWriter>,
}

/// Edit logs of every open swath file, indexed like the swath store.
#[derive(Debug, Default)]
pub struct EditStateStore {
    output: EditOutput,
    files: Vec<Option<FileEdits>>,
}

impl EditStateStore {
    pub fn new(output: EditOutput) -> Self {
        EditStateStore {
            output,
            files: vec![],
        }
    }

    pub fn output(&self) -> EditOutput {
        self.output
    }

    /// Opens the log of file `file`, reading any existing `.esf` next to `swath_path`.
    ///
    /// Files without a path get an in-memory log.
    pub fn open(&mut self, file: usize, swath_path: Option<&Path>) -> Result<&EditLog> {
        if self.files.len() <= file {
            let extra = file + 1 - self.files.len();
            self.files
                .try_reserve(extra)
                .map_err(|_| SwathEditError::AllocationFailed("edit logs".to_string()))?;
            self.files.resize_with(file + 1, || None);
        }

        let esf: Option<PathBuf> = swath_path.map(esf_path);
        let mut log = EditLog::new();
        if let Some(path) = esf.as_deref().filter(|p| p.exists()) {
            let contents = read_esf(path)?;
            if contents.unknown_actions > 0 {
                warn!(?path, count = contents.unknown_actions, "unknown edit actions ignored");
            }
            info!(?path, records = contents.records.len(), "edit log loaded");
            log = EditLog::from_records(contents.records);
        }
        let writer = match (self.output, esf) {
            (EditOutput::Write, Some(path)) => Some(EsfWriter::open(&path)?),
            _ => None,
        };

        let entry = self.files[file].insert(FileEdits { log, writer });
        Ok(&entry.log)
    }

    pub fn log(&self, file: usize) -> Option<&EditLog> {
        self.files.get(file)?.as_ref().map(|f| &f.log)
    }

    /// Appends `record` to the log of `file` and to its `.esf` when writing.
    ///
    /// Memory for the record is reserved before anything reaches disk, so a failed
    /// allocation leaves the log and the `.esf` in agreement.
    pub fn record(&mut self, file: usize, record: EditRecord) -> Result<()> {
        let entry = self
            .files
            .get_mut(file)
            .and_then(Option::as_mut)
            .ok_or(SwathEditError::FileUnloaded(file))?;
        entry.log.reserve()?;
        if let Some(writer) = entry.writer.as_mut() {
            writer.append(&record)?;
        }
        entry.log.record(record)
    }

    /// Closes the log of `file`, keeping its slot.
    pub fn close(&mut self, file: usize) {
        if let Some(slot) = self.files.get_mut(file) {
            *slot = None;
        }
    }

    /// Removes the slot of `file`, shifting later files down by one.
    pub fn remove(&mut self, file: usize) {
        if file < self.files.len() {
            self.files.remove(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edits::esf::EditAction;
    use crate::edits::io::read_esf;
    use tempfile::tempdir;

    #[test]
    fn write_mode_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let swath = dir.path().join("line.csv");
        let mut store = EditStateStore::new(EditOutput::Write);
        assert!(store.open(0, Some(&swath)).unwrap().is_empty());
        store
            .record(0, EditRecord::new(10.0, 2, 0, EditAction::Flag))
            .unwrap();
        store.close(0);
        assert!(store.log(0).is_none());

        assert_eq!(read_esf(&esf_path(&swath)).unwrap().records.len(), 1);
        let log = store.open(0, Some(&swath)).unwrap();
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn browse_mode_keeps_edits_in_memory() {
        let dir = tempdir().unwrap();
        let swath = dir.path().join("line.csv");
        let mut store = EditStateStore::new(EditOutput::Browse);
        store.open(1, Some(&swath)).unwrap();
        store
            .record(1, EditRecord::new(10.0, 2, 0, EditAction::Zero))
            .unwrap();
        assert_eq!(store.log(1).map(EditLog::len), Some(1));
        assert!(store.log(0).is_none());
        assert!(!esf_path(&swath).exists());
    }

    #[test]
    fn disk_and_memory_logs_agree() {
        let dir = tempdir().unwrap();
        let swath = dir.path().join("line.csv");
        let mut store = EditStateStore::new(EditOutput::Write);
        store.open(0, Some(&swath)).unwrap();
        for beam in 0..5 {
            store
                .record(0, EditRecord::new(10.0, beam, 0, EditAction::Flag))
                .unwrap();
        }
        let on_disk = read_esf(&esf_path(&swath)).unwrap().records;
        assert_eq!(store.log(0).unwrap().records(), on_disk.as_slice());
    }

    #[test]
    fn record_needs_open_log() {
        let mut store = EditStateStore::new(EditOutput::Browse);
        let err = store
            .record(0, EditRecord::new(1.0, 0, 0, EditAction::Flag))
            .unwrap_err();
        assert!(matches!(err, SwathEditError::FileUnloaded(0)));
    }

    #[test]
    fn remove_shifts_indices() {
        let mut store = EditStateStore::new(EditOutput::Browse);
        store.open(0, None).unwrap();
        store.open(1, None).unwrap();
        store
            .record(1, EditRecord::new(1.0, 0, 0, EditAction::Flag))
            .unwrap();
        store.remove(0);
        assert_eq!(store.log(0).map(EditLog::len), Some(1));
        assert!(store.log(1).is_none());
    }
}
