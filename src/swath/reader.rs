use crate::error::SwathEditError;
use crate::geometry::attitude::Navigation;
use crate::swath::decoded::{DecodedBeam, DecodedFile, DecodedPing};
use csv::{ReaderBuilder, StringRecord};
use std::io::Read;
use std::path::Path;

type Result<T> = std::result::Result<T, SwathEditError>;

/// Columns of a decoded-sounding CSV file, one row per beam.
pub const COLUMNS: [&str; 16] = [
    "ping",
    "time_d",
    "lon",
    "lat",
    "heading",
    "speed",
    "roll",
    "pitch",
    "heave",
    "sensor_depth",
    "altitude",
    "bath",
    "across",
    "along",
    "amp",
    "flag",
];

struct Row {
    ping: u64,
    nav: Navigation,
    beam: DecodedBeam,
}

fn field<T: std::str::FromStr>(record: &StringRecord, index: usize, line: u64) -> Result<T> {
    let text = record.get(index).unwrap_or("").trim();
    text.parse::<T>().map_err(|_| {
        SwathEditError::Input(format!(
            "line {line}: bad {} value {text:?}",
            COLUMNS[index]
        ))
    })
}

impl Row {
    fn from_record(record: &StringRecord) -> Result<Row> {
        let line = record.position().map_or(0, |p| p.line());
        if record.len() < COLUMNS.len() {
            return Err(SwathEditError::Input(format!(
                "line {line}: expected {} fields, found {}",
                COLUMNS.len(),
                record.len()
            )));
        }
        let f = |i: usize| field::<f64>(record, i, line);
        Ok(Row {
            ping: field(record, 0, line)?,
            nav: Navigation {
                time_d: f(1)?,
                lon: f(2)?,
                lat: f(3)?,
                heading: f(4)?,
                speed: f(5)?,
                roll: f(6)?,
                pitch: f(7)?,
                heave: f(8)?,
                sensor_depth: f(9)?,
                altitude: f(10)?,
            },
            beam: DecodedBeam {
                bath: f(11)?,
                across: f(12)?,
                along: f(13)?,
                amp: f(14)?,
                flag: field(record, 15, line)?,
            },
        })
    }
}

/// Reads decoded soundings from CSV. Consecutive rows with the same ping number form one ping,
/// in beam order; navigation is taken from the first row of each ping.
pub fn read_soundings<R: Read>(reader: R, name: &str) -> Result<DecodedFile> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut pings: Vec<DecodedPing> = vec![];
    let mut current: Option<u64> = None;
    for result in rdr.records() {
        let row = Row::from_record(&result?)?;
        if current == Some(row.ping) {
            if let Some(ping) = pings.last_mut() {
                ping.beams.push(row.beam);
                continue;
            }
        }
        pings.push(DecodedPing {
            nav: row.nav,
            sensor_head: None,
            beams: vec![row.beam],
        });
        current = Some(row.ping);
    }
    Ok(DecodedFile::new(name, pings))
}

/// Reads a decoded-sounding CSV file; the file's path becomes the edit log location.
pub fn read_soundings_file(path: &Path) -> Result<DecodedFile> {
    let file = std::fs::File::open(path)
        .map_err(|e| SwathEditError::Input(format!("{}: {e}", path.display())))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(read_soundings(std::io::BufReader::new(file), &name)?.with_path(path))
}
