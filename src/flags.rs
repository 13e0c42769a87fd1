/// Legacy packed flag bits found in decoded swath records.
pub mod bits {
    pub const NONE: u8 = 0x00;
    pub const FLAG: u8 = 0x01;
    pub const NULL: u8 = 0x02;
    pub const MANUAL: u8 = 0x04;
    pub const FILTER: u8 = 0x08;
    pub const FILTER2: u8 = 0x10;
    pub const SONAR: u8 = 0x20;
    pub const MULTIPICK: u8 = 0x80;
}

/// Edit state of a single sounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BeamFlag {
    /// Good sounding, contributes to the grid
    #[default]
    Ok,
    /// Flagged by hand in the editor
    ManualFlag,
    /// Flagged by the sonar during acquisition
    SonarFlag,
    /// Flagged by an automatic filter
    FilterFlag,
    /// Flagged by a second automatic filter
    Filter2Flag,
    /// Secondary pick of a multi-detect beam
    SecondaryPick,
    /// No usable sounding
    Null,
}

impl BeamFlag {
    pub fn is_ok(self) -> bool {
        matches!(self, BeamFlag::Ok)
    }

    pub fn is_null(self) -> bool {
        matches!(self, BeamFlag::Null)
    }

    /// A sounding that exists but is excluded from the grid.
    pub fn is_flagged(self) -> bool {
        match self {
            BeamFlag::Ok | BeamFlag::Null => false,
            BeamFlag::ManualFlag
            | BeamFlag::SonarFlag
            | BeamFlag::FilterFlag
            | BeamFlag::Filter2Flag
            | BeamFlag::SecondaryPick => true,
        }
    }

    /// Whether the sounding belongs in a selection.
    pub fn is_selectable(self, include_secondary: bool) -> bool {
        match self {
            BeamFlag::Null => false,
            BeamFlag::SecondaryPick => include_secondary,
            _ => true,
        }
    }

    /// Decodes a legacy packed flag byte.
    pub fn from_byte(byte: u8) -> BeamFlag {
        if byte & bits::NULL != 0 {
            BeamFlag::Null
        } else if byte & bits::FLAG == 0 {
            BeamFlag::Ok
        } else if byte & bits::MULTIPICK != 0 {
            BeamFlag::SecondaryPick
        } else if byte & bits::SONAR != 0 {
            BeamFlag::SonarFlag
        } else if byte & bits::FILTER2 != 0 {
            BeamFlag::Filter2Flag
        } else if byte & bits::FILTER != 0 {
            BeamFlag::FilterFlag
        } else {
            BeamFlag::ManualFlag
        }
    }

    /// Encodes to the legacy packed flag byte.
    pub fn to_byte(self) -> u8 {
        match self {
            BeamFlag::Ok => bits::NONE,
            BeamFlag::ManualFlag => bits::FLAG | bits::MANUAL,
            BeamFlag::SonarFlag => bits::FLAG | bits::SONAR,
            BeamFlag::FilterFlag => bits::FLAG | bits::FILTER,
            BeamFlag::Filter2Flag => bits::FLAG | bits::FILTER2,
            BeamFlag::SecondaryPick => bits::FLAG | bits::MULTIPICK,
            BeamFlag::Null => bits::NULL,
        }
    }

    /// Short label used in sounding info strings.
    pub fn label(self) -> &'static str {
        match self {
            BeamFlag::Ok => "ok",
            BeamFlag::ManualFlag => "manual",
            BeamFlag::SonarFlag => "sonar",
            BeamFlag::FilterFlag => "filter",
            BeamFlag::Filter2Flag => "filter2",
            BeamFlag::SecondaryPick => "secondary",
            BeamFlag::Null => "null",
        }
    }
}
