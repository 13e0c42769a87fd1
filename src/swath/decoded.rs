use crate::geometry::attitude::{AsyncNavigation, Navigation};
use std::path::PathBuf;

/// One sounding as delivered by a swath reader.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DecodedBeam {
    /// Depth below the sea surface, positive down
    pub bath: f64,
    pub across: f64,
    pub along: f64,
    pub amp: f64,
    /// Packed legacy flag byte
    pub flag: u8,
}

/// One ping as delivered by a swath reader.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecodedPing {
    pub nav: Navigation,
    /// Sensor head number, when the format records one
    pub sensor_head: Option<i32>,
    pub beams: Vec<DecodedBeam>,
}

/// A whole decoded swath file.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFile {
    /// Location on disk, also where the edit log lives
    pub path: Option<PathBuf>,
    pub name: String,
    /// Full beam widths in degrees
    pub beamwidth_across: f64,
    pub beamwidth_along: f64,
    pub pings: Vec<DecodedPing>,
    pub async_nav: AsyncNavigation,
}

impl DecodedFile {
    pub fn new(name: impl Into<String>, pings: Vec<DecodedPing>) -> Self {
        DecodedFile {
            path: None,
            name: name.into(),
            beamwidth_across: 2.0,
            beamwidth_along: 2.0,
            pings,
            async_nav: AsyncNavigation::default(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_beamwidths(mut self, across: f64, along: f64) -> Self {
        self.beamwidth_across = across;
        self.beamwidth_along = along;
        self
    }
}

/// Anything that can hand over a decoded swath file.
pub trait PingSource {
    type Error;

    fn decode(&mut self) -> Result<DecodedFile, Self::Error>;
}

impl PingSource for DecodedFile {
    type Error = std::convert::Infallible;

    fn decode(&mut self) -> Result<DecodedFile, Self::Error> {
        Ok(self.clone())
    }
}
