//! Region-specific relocation of directory listings.
//!
//! Some disc builds store the listing of the directory named `SFD` out of line at a fixed absolute
//! offset, and the listing of the directory that follows it in yet another fixed place. Neither
//! offset can be derived from the image itself, so they are looked up by region in an
//! [`OverlayTable`].


use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use from_to_repr::from_to_other;
use tracing::debug;

use crate::error::Error;


/// The name of the directory whose listing is stored in the overlay region.
pub const SFD_DIRECTORY_NAME: &str = "SFD";


/// The region a disc build was released for.
///
/// [`Region::Unspecified`] switches the overlay jump rule off entirely.
#[derive(Clone, Copy, Debug)]
#[from_to_other(base_type = u8, derive_compare = "as_int")]
pub enum Region {
    Unspecified = 0,
    Pal = 1,
    Ntsc = 2,
    Other(u8),
}
impl Default for Region {
    fn default() -> Self { Self::Unspecified }
}
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "unspecified"),
            Self::Pal => write!(f, "pal"),
            Self::Ntsc => write!(f, "ntsc"),
            Self::Other(other) => write!(f, "{}", other),
        }
    }
}
impl FromStr for Region {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unspecified"|"none" => Ok(Self::Unspecified),
            "pal" => Ok(Self::Pal),
            "ntsc"|"usa" => Ok(Self::Ntsc),
            other => {
                let number: u8 = other.parse()
                    .map_err(|_| ParseRegionError { text: s.to_owned() })?;
                Ok(Self::from_base_type(number))
            },
        }
    }
}
#[cfg(feature = "serde")]
impl serde::Serialize for Region {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}
#[cfg(feature = "serde")]
impl<'d> serde::Deserialize<'d> for Region {
    fn deserialize<D: serde::Deserializer<'d>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        let stringy: String = serde::Deserialize::deserialize(deserializer)?;
        Region::from_str(&stringy)
            .map_err(|e| D::Error::custom(e))
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ParseRegionError {
    text: String,
}
impl fmt::Display for ParseRegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown region {:?}", self.text)
    }
}
impl std::error::Error for ParseRegionError {
}


/// The absolute byte offsets of the relocated listings of one disc build.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct OverlayOffsets {
    /// Where the listing of the `SFD` directory is stored.
    pub sfd_offset: u64,

    /// Where the listing of the next directory after `SFD` is stored.
    pub relocated_offset: u64,
}


/// One row of an [`OverlayTable`] as it appears in configuration files.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct RegionOffsets {
    pub region: Region,
    pub sfd_offset: u64,
    pub relocated_offset: u64,
}


/// Overlay offsets keyed by region.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "serde", serde(from = "Vec<RegionOffsets>", into = "Vec<RegionOffsets>"))]
pub struct OverlayTable {
    region_to_offsets: BTreeMap<u8, OverlayOffsets>,
}
impl OverlayTable {
    pub const fn new() -> Self {
        Self {
            region_to_offsets: BTreeMap::new(),
        }
    }

    /// The disc builds whose overlay offsets are known.
    ///
    /// Currently only the North American build.
    pub fn known_builds() -> Self {
        let mut table = Self::new();
        table.insert(Region::Ntsc, OverlayOffsets {
            sfd_offset: 0x6CDF00,
            relocated_offset: 0x5377F0,
        });
        table
    }

    pub fn insert(&mut self, region: Region, offsets: OverlayOffsets) -> Option<OverlayOffsets> {
        self.region_to_offsets.insert(region.to_base_type(), offsets)
    }

    pub fn get(&self, region: Region) -> Option<OverlayOffsets> {
        self.region_to_offsets.get(&region.to_base_type()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.region_to_offsets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Region, OverlayOffsets)> + '_ {
        self.region_to_offsets.iter()
            .map(|(region, offsets)| (Region::from_base_type(*region), *offsets))
    }
}
impl From<Vec<RegionOffsets>> for OverlayTable {
    fn from(value: Vec<RegionOffsets>) -> Self {
        let mut table = Self::new();
        for row in value {
            table.insert(row.region, OverlayOffsets {
                sfd_offset: row.sfd_offset,
                relocated_offset: row.relocated_offset,
            });
        }
        table
    }
}
impl From<OverlayTable> for Vec<RegionOffsets> {
    fn from(value: OverlayTable) -> Self {
        value.iter()
            .map(|(region, offsets)| RegionOffsets {
                region,
                sfd_offset: offsets.sfd_offset,
                relocated_offset: offsets.relocated_offset,
            })
            .collect()
    }
}


/// Whether the walk over one listing's entries is inside the overlay region.
///
/// Each listing's entry loop starts from [`OverlayState::default()`].
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OverlayState {
    inside_overlay: bool,
}
impl OverlayState {
    pub fn inside_overlay() -> Self {
        Self { inside_overlay: true }
    }

    pub fn is_inside_overlay(&self) -> bool { self.inside_overlay }
}


static NO_OVERLAYS: OverlayTable = OverlayTable::new();

/// The overlay table together with the region of the image being processed.
#[derive(Clone, Copy, Debug)]
pub struct OverlayContext<'a> {
    table: &'a OverlayTable,
    region: Region,
}
impl<'a> OverlayContext<'a> {
    pub fn new(table: &'a OverlayTable, region: Region) -> Self {
        Self {
            table,
            region,
        }
    }

    /// A context in which no jumps ever happen.
    pub fn disabled() -> OverlayContext<'static> {
        OverlayContext {
            table: &NO_OVERLAYS,
            region: Region::Unspecified,
        }
    }

    pub fn region(&self) -> Region { self.region }

    pub fn is_enabled(&self) -> bool {
        self.region != Region::Unspecified
    }

    fn offsets(&self) -> Result<OverlayOffsets, Error> {
        self.table.get(self.region)
            .ok_or(Error::MissingOverlayConfiguration { region: self.region })
    }

    /// Decides where the listing of the next sub-directory named `entry_name` lives.
    ///
    /// Returns the absolute offset to seek to, or `None` to stay at the current position. The state
    /// is only updated if no error is returned.
    pub fn next_jump(&self, state: &mut OverlayState, entry_name: &str) -> Result<Option<u64>, Error> {
        if !self.is_enabled() {
            return Ok(None);
        }

        if state.inside_overlay {
            let offset = self.offsets()?.relocated_offset;
            state.inside_overlay = false;
            debug!("leaving overlay region; {:?} is relocated to {:#X}", entry_name, offset);
            Ok(Some(offset))
        } else if entry_name == SFD_DIRECTORY_NAME {
            let offset = self.offsets()?.sfd_offset;
            state.inside_overlay = true;
            debug!("entering overlay region; {:?} is relocated to {:#X}", entry_name, offset);
            Ok(Some(offset))
        } else {
            Ok(None)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{OverlayContext, OverlayOffsets, OverlayState, OverlayTable, Region};
    use crate::error::Error;
    use std::str::FromStr;

    fn test_table() -> OverlayTable {
        let mut table = OverlayTable::new();
        table.insert(Region::Pal, OverlayOffsets {
            sfd_offset: 0x1000,
            relocated_offset: 0x2000,
        });
        table
    }

    #[test]
    fn test_jump_sequence() {
        let table = test_table();
        let context = OverlayContext::new(&table, Region::Pal);
        let mut state = OverlayState::default();

        assert_eq!(context.next_jump(&mut state, "MOVIE").unwrap(), None);
        assert!(!state.is_inside_overlay());

        assert_eq!(context.next_jump(&mut state, "SFD").unwrap(), Some(0x1000));
        assert!(state.is_inside_overlay());

        // whatever comes next goes to the relocated region, even another SFD
        assert_eq!(context.next_jump(&mut state, "SFD").unwrap(), Some(0x2000));
        assert!(!state.is_inside_overlay());

        assert_eq!(context.next_jump(&mut state, "SOUND").unwrap(), None);
    }

    #[test]
    fn test_disabled_never_jumps() {
        let context = OverlayContext::disabled();
        let mut state = OverlayState::default();
        assert_eq!(context.next_jump(&mut state, "SFD").unwrap(), None);
        assert!(!state.is_inside_overlay());
    }

    #[test]
    fn test_unconfigured_region() {
        let table = test_table();
        let context = OverlayContext::new(&table, Region::Ntsc);
        let mut state = OverlayState::default();

        // no jump, no lookup
        assert_eq!(context.next_jump(&mut state, "DATA").unwrap(), None);

        match context.next_jump(&mut state, "SFD") {
            Err(Error::MissingOverlayConfiguration { region: Region::Ntsc }) => {},
            other => panic!("unexpected result {:?}", other),
        }
        assert!(!state.is_inside_overlay());
    }

    #[test]
    fn test_known_builds() {
        let table = OverlayTable::known_builds();
        let ntsc = table.get(Region::Ntsc).unwrap();
        assert_eq!(ntsc.sfd_offset, 0x6CDF00);
        assert_eq!(ntsc.relocated_offset, 0x5377F0);
        assert!(table.get(Region::Pal).is_none());
    }

    #[test]
    fn test_region_parse() {
        assert!(matches!(Region::from_str("NTSC").unwrap(), Region::Ntsc));
        assert!(matches!(Region::from_str("pal").unwrap(), Region::Pal));
        assert!(matches!(Region::from_str("none").unwrap(), Region::Unspecified));
        assert!(matches!(Region::from_str("7").unwrap(), Region::Other(7)));
        assert!(Region::from_str("atlantis").is_err());
        assert_eq!(Region::Other(9).to_string(), "9");
    }

    #[test]
    fn test_zero_region_is_disabled() {
        let table = OverlayTable::new();
        let context = OverlayContext::new(&table, Region::Other(0));
        assert!(!context.is_enabled());

        let mut state = OverlayState::default();
        assert_eq!(context.next_jump(&mut state, "SFD").unwrap(), None);
        assert!(!state.is_inside_overlay());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_table_json_round_trip() {
        let table = OverlayTable::known_builds();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"[{"region":"ntsc","sfd_offset":7134976,"relocated_offset":5470192}]"#);

        let read_back: OverlayTable = serde_json::from_str(&json).unwrap();
        assert_eq!(read_back, table);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_table_json_regions() {
        let json = r#"[
            {"region": "PAL", "sfd_offset": 4096, "relocated_offset": 8192},
            {"region": "7", "sfd_offset": 1, "relocated_offset": 2}
        ]"#;
        let table: OverlayTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.get(Region::Pal).unwrap().relocated_offset, 8192);
        assert_eq!(table.get(Region::Other(7)).unwrap().sfd_offset, 1);
        assert!(table.get(Region::Ntsc).is_none());

        let bad = r#"[{"region": "atlantis", "sfd_offset": 1, "relocated_offset": 2}]"#;
        assert!(serde_json::from_str::<OverlayTable>(bad).is_err());
    }
}
