use crate::edits::error::EditLogError;
use crate::edits::esf::{EditAction, EditRecord};
use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

type Result<T> = std::result::Result<T, EditLogError>;

/// First bytes of every edit log.
pub const ESF_HEADER: &[u8; 12] = b"ESFVERSION03";

/// Bytes per record: time (f64), beam (i32), action (i32).
const RECORD_SIZE: usize = 16;

/// Path of the edit log that belongs to a swath file.
pub fn esf_path(swath: &Path) -> PathBuf {
    let mut name: OsString = swath.as_os_str().to_owned();
    name.push(".esf");
    PathBuf::from(name)
}

/// Records read from an edit log.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EsfContents {
    pub records: Vec<EditRecord>,
    /// Records whose action code is not known
    pub unknown_actions: usize,
}

/// Fills `buf` as far as the reader allows, returning the number of bytes read.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Reads an edit log from any byte stream. `path` is only used in errors.
pub fn read_esf_from<R: Read>(reader: &mut R, path: &Path) -> Result<EsfContents> {
    let mut header = [0u8; 12];
    let n = read_up_to(reader, &mut header)?;
    if n < header.len() || &header != ESF_HEADER {
        return Err(EditLogError::BadHeader {
            path: path.to_path_buf(),
            found: String::from_utf8_lossy(&header[..n]).into_owned(),
        });
    }

    let mut contents = EsfContents::default();
    let mut buf = [0u8; RECORD_SIZE];
    let mut offset = ESF_HEADER.len() as u64;
    loop {
        let n = read_up_to(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        if n < RECORD_SIZE {
            return Err(EditLogError::Truncated {
                path: path.to_path_buf(),
                offset,
            });
        }
        let time_d = BigEndian::read_f64(&buf[0..8]);
        let beam = BigEndian::read_i32(&buf[8..12]);
        let code = BigEndian::read_i32(&buf[12..16]);
        match EditAction::from_code(code) {
            Some(action) => contents.records.push(EditRecord {
                time_d,
                beam,
                action,
            }),
            None => {
                warn!(?path, offset, code, "unknown edit action");
                contents.unknown_actions += 1;
            }
        }
        offset += RECORD_SIZE as u64;
    }
    debug!(?path, records = contents.records.len(), "edit log read");
    Ok(contents)
}

/// Reads the edit log at `path`.
pub fn read_esf(path: &Path) -> Result<EsfContents> {
    let mut reader = BufReader::new(File::open(path)?);
    read_esf_from(&mut reader, path)
}

fn write_record<W: Write>(writer: &mut W, record: &EditRecord) -> std::io::Result<()> {
    writer.write_f64::<BigEndian>(record.time_d)?;
    writer.write_i32::<BigEndian>(record.beam)?;
    writer.write_i32::<BigEndian>(record.action.code())
}

/// Writes a complete edit log, replacing any file at `path`.
pub fn write_esf(path: &Path, records: &[EditRecord]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(ESF_HEADER)?;
    for record in records {
        write_record(&mut writer, record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Appends records to an edit log as they are made.
#[derive(Debug)]
pub struct EsfWriter {
    file: File,
    path: PathBuf,
}

impl EsfWriter {
    /// Opens `path` for appending, writing the header if the file is new or empty.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(ESF_HEADER)?;
        }
        Ok(EsfWriter {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes one record straight through to the file.
    pub fn append(&mut self, record: &EditRecord) -> Result<()> {
        let mut buf = Vec::with_capacity(RECORD_SIZE);
        write_record(&mut buf, record)?;
        self.file.write_all(&buf)?;
        self.file.flush()?;
        Ok(())
    }
}
