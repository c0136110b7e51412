use std::fmt;

use crate::overlay::Region;


#[derive(Debug)]
pub enum Error {
    Io(std::io::Error),
    Truncated { offset: u64, what: &'static str },
    InvalidDirectoryRecord { offset: u64, length: usize },
    HeaderInconsistency { entry_count: i32, entry_count_aux: i32 },
    NegativeEntryCount(i32),
    MissingOverlayConfiguration { region: Region },
    RelinkNameMismatch { name: String },
    MissingSubdirectoryListing { name: String },
    ValueOutOfRange { what: &'static str },
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
            Self::Truncated { offset, what }
                => write!(f, "stream ends within {} starting at {:#X}", what, offset),
            Self::InvalidDirectoryRecord { offset, length }
                => write!(f, "directory record at {:#X} has invalid length {}", offset, length),
            Self::HeaderInconsistency { entry_count, entry_count_aux }
                => write!(f, "directory listing header has entry count {} but auxiliary entry count {}", entry_count, entry_count_aux),
            Self::NegativeEntryCount(count)
                => write!(f, "directory listing header has negative entry count {}", count),
            Self::MissingOverlayConfiguration { region }
                => write!(f, "no overlay offsets configured for region {}", region),
            Self::RelinkNameMismatch { name }
                => write!(f, "no directory record named {:?} to relink against", name),
            Self::MissingSubdirectoryListing { name }
                => write!(f, "directory entry {:?} has no directory listing", name),
            Self::ValueOutOfRange { what }
                => write!(f, "{} does not fit into its on-disk field", what),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Truncated { .. } => None,
            Self::InvalidDirectoryRecord { .. } => None,
            Self::HeaderInconsistency { .. } => None,
            Self::NegativeEntryCount(_) => None,
            Self::MissingOverlayConfiguration { .. } => None,
            Self::RelinkNameMismatch { .. } => None,
            Self::MissingSubdirectoryListing { .. } => None,
            Self::ValueOutOfRange { .. } => None,
        }
    }
}
impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self { Self::Io(value) }
}
