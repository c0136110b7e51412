//! CVM directory listings.
//!
//! A CVM image carries, next to the ISO9660 directory records, its own copy of the directory tree.
//! Each directory is stored as a listing: a [`ListingHeader`], the directory's entries back to back,
//! and zero padding up to the next multiple of [`LISTING_ALIGNMENT`] bytes. The listings of
//! sub-directories follow depth-first, each directly after its parent, except where the overlay
//! rule (see [`crate::overlay`]) moves them to a fixed offset.
//!
//! The first two entries of each listing stand for the directory itself and its parent; they never
//! own a listing.


mod entry;
mod header;


use std::io::{Read, Seek, SeekFrom, Write};

use tracing::debug;

pub use crate::listing::entry::{DirectoryEntry, ENTRY_FIXED_SIZE};
pub use crate::listing::header::{DEFAULT_LISTING_TAG, LISTING_HEADER_SIZE, ListingHeader, ListingTag};

use crate::error::Error;
use crate::io_util::{align_position_read, align_position_write};
use crate::iso9660::IsoDirectory;
use crate::overlay::{OverlayContext, OverlayState};


/// Each listing is padded to a multiple of this many bytes.
pub const LISTING_ALIGNMENT: u64 = 16;

/// Entries before this index describe the directory itself and its parent.
pub const FIRST_SUBDIRECTORY_INDEX: usize = 2;

/// Listings nested deeper than this are assumed to be looping.
const MAX_LISTING_DEPTH: usize = 64;


/// A directory listing and, through its entries, the listings of all its sub-directories.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DirectoryListing {
    directory_record_lba: i32,
    tag: ListingTag,

    /// Index of the entry in the parent listing that owns this listing; `None` for the root.
    #[cfg_attr(feature = "serde", serde(skip))]
    origin: Option<usize>,

    entries: Vec<DirectoryEntry>,
}
impl DirectoryListing {
    /// Assembles a listing in memory, e.g. to be written out later.
    ///
    /// `origin` is the index of the owning entry within the parent listing, or `None` for the root.
    pub fn new(origin: Option<usize>, directory_record_lba: i32, entries: Vec<DirectoryEntry>) -> Self {
        Self {
            directory_record_lba,
            tag: ListingTag::default(),
            origin,
            entries,
        }
    }

    /// Reads the listing at the reader's position together with all nested listings.
    ///
    /// On success, the reader is positioned after the last listing read.
    pub fn read<R: Read + Seek>(
        reader: &mut R,
        origin: Option<usize>,
        context: &OverlayContext<'_>,
    ) -> Result<Self, Error> {
        Self::read_at_depth(reader, origin, context, 0)
    }

    fn read_at_depth<R: Read + Seek>(
        reader: &mut R,
        origin: Option<usize>,
        context: &OverlayContext<'_>,
        depth: usize,
    ) -> Result<Self, Error> {
        if depth >= MAX_LISTING_DEPTH {
            return Err(Error::ValueOutOfRange { what: "directory nesting depth" });
        }

        let listing_offset = reader.stream_position()?;
        let header = ListingHeader::read(reader)?;
        if header.entry_count != header.entry_count_aux {
            return Err(Error::HeaderInconsistency {
                entry_count: header.entry_count,
                entry_count_aux: header.entry_count_aux,
            });
        }
        let entry_count = usize::try_from(header.entry_count)
            .map_err(|_| Error::NegativeEntryCount(header.entry_count))?;
        debug!(
            "listing at {:#X}: {} entries, directory record LBA {}",
            listing_offset, entry_count, header.directory_record_lba,
        );

        // don't trust the count too much when preallocating
        let mut entries = Vec::with_capacity(entry_count.min(1024));
        for _ in 0..entry_count {
            entries.push(DirectoryEntry::read(reader)?);
        }

        let padding = align_position_read(reader, LISTING_ALIGNMENT)?;
        debug!("listing at {:#X}: skipped {} bytes of padding", listing_offset, padding);

        let mut state = OverlayState::default();
        for (index, entry) in entries.iter_mut().enumerate().skip(FIRST_SUBDIRECTORY_INDEX) {
            if !entry.is_directory() {
                continue;
            }

            if let Some(jump_offset) = context.next_jump(&mut state, &entry.name())? {
                reader.seek(SeekFrom::Start(jump_offset))?;
            }
            let sub_listing = Self::read_at_depth(reader, Some(index), context, depth + 1)?;
            entry.set_listing(Some(sub_listing));
        }

        Ok(Self {
            directory_record_lba: header.directory_record_lba,
            tag: header.tag,
            origin,
            entries,
        })
    }

    /// Writes this listing and all nested listings at the writer's position.
    ///
    /// `state` is the overlay state this listing's entry loop starts in; nested listings always
    /// start outside the overlay region, as they do when reading. Pass [`OverlayState::default()`]
    /// to reproduce the layout that [`DirectoryListing::read`] expects.
    pub fn write<W: Write + Seek>(
        &self,
        writer: &mut W,
        state: OverlayState,
        context: &OverlayContext<'_>,
    ) -> Result<(), Error> {
        let listing_offset = writer.stream_position()?;
        let entry_count = i32::try_from(self.entries.len())
            .map_err(|_| Error::ValueOutOfRange { what: "directory listing entry count" })?;
        let header = ListingHeader {
            entry_count,
            entry_count_aux: entry_count,
            directory_record_lba: self.directory_record_lba,
            tag: self.tag,
            unused: 0,
        };
        debug!("writing listing with {} entries at {:#X}", entry_count, listing_offset);

        header.write(writer)?;
        for entry in &self.entries {
            entry.write(writer)?;
        }
        align_position_write(writer, LISTING_ALIGNMENT)?;

        let mut state = state;
        for entry in self.entries.iter().skip(FIRST_SUBDIRECTORY_INDEX) {
            if !entry.is_directory() {
                continue;
            }

            let name = entry.name();
            let sub_listing = entry.listing()
                .ok_or_else(|| Error::MissingSubdirectoryListing { name: name.clone() })?;
            if let Some(jump_offset) = context.next_jump(&mut state, &name)? {
                writer.seek(SeekFrom::Start(jump_offset))?;
            }
            sub_listing.write(writer, OverlayState::default(), context)?;
        }

        Ok(())
    }

    /// Takes over the logical block addresses of a rebuilt ISO9660 directory tree.
    ///
    /// Entries are matched to the sub-records of `directory` by name. If any entry anywhere in this
    /// subtree has no counterpart, nothing is changed and [`Error::RelinkNameMismatch`] is returned.
    pub fn relink(&mut self, directory: &IsoDirectory) -> Result<(), Error> {
        let plan = self.plan_relink(directory)?;
        self.apply_relink(plan);
        Ok(())
    }

    fn plan_relink<'r>(&self, directory: &'r IsoDirectory) -> Result<RelinkPlan<'r>, Error> {
        let directory_record_lba = i32::try_from(directory.lba())
            .map_err(|_| Error::ValueOutOfRange { what: "directory record LBA" })?;

        let mut entries = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let name = entry.name();
            let Some(record) = directory.find(&name) else {
                return Err(Error::RelinkNameMismatch { name });
            };
            let sub_plan = match entry.listing() {
                Some(sub_listing) => Some(sub_listing.plan_relink(record)?),
                None => None,
            };
            entries.push((record, sub_plan));
        }

        Ok(RelinkPlan {
            directory_record_lba,
            entries,
        })
    }

    fn apply_relink(&mut self, plan: RelinkPlan<'_>) {
        if self.directory_record_lba != plan.directory_record_lba {
            debug!(
                "relinking listing from LBA {} to {}",
                self.directory_record_lba, plan.directory_record_lba,
            );
        }
        self.directory_record_lba = plan.directory_record_lba;

        for (entry, (record, sub_plan)) in self.entries.iter_mut().zip(plan.entries) {
            entry.apply_record(record);
            if let (Some(sub_listing), Some(sub_plan)) = (entry.listing_mut(), sub_plan) {
                sub_listing.apply_relink(sub_plan);
            }
        }
    }

    /// Finds the entry at `path`, whose components are separated by `/` or `\`.
    pub fn find(&self, path: &str) -> Option<&DirectoryEntry> {
        let mut components = path.split(['/', '\\'])
            .filter(|c| !c.is_empty())
            .peekable();
        let mut listing = self;
        while let Some(component) = components.next() {
            let entry = listing.entries.iter()
                .skip(FIRST_SUBDIRECTORY_INDEX)
                .find(|e| e.name() == component)?;
            if components.peek().is_none() {
                return Some(entry);
            }
            listing = entry.listing()?;
        }
        None
    }

    /// Calls `visitor` with the path and entry of every file and directory below this listing,
    /// depth-first in on-disk order.
    pub fn walk<F: FnMut(&str, &DirectoryEntry)>(&self, mut visitor: F) {
        self.walk_with_prefix("", &mut visitor);
    }

    fn walk_with_prefix<F: FnMut(&str, &DirectoryEntry)>(&self, prefix: &str, visitor: &mut F) {
        for entry in self.entries.iter().skip(FIRST_SUBDIRECTORY_INDEX) {
            let path = format!("{}/{}", prefix, entry.name());
            visitor(&path, entry);
            if let Some(sub_listing) = entry.listing() {
                sub_listing.walk_with_prefix(&path, visitor);
            }
        }
    }

    pub fn directory_record_lba(&self) -> i32 { self.directory_record_lba }
    pub fn set_directory_record_lba(&mut self, lba: i32) { self.directory_record_lba = lba; }
    pub fn tag(&self) -> ListingTag { self.tag }
    pub fn set_tag(&mut self, tag: ListingTag) { self.tag = tag; }

    /// The index of the entry in the parent listing that owns this listing.
    pub fn origin(&self) -> Option<usize> { self.origin }
    pub fn is_root(&self) -> bool { self.origin.is_none() }

    /// Resolves [`DirectoryListing::origin`] against the parent listing.
    pub fn origin_entry<'p>(&self, parent: &'p DirectoryListing) -> Option<&'p DirectoryEntry> {
        self.origin.and_then(|index| parent.entries.get(index))
    }

    pub fn entries(&self) -> &[DirectoryEntry] { &self.entries }
    pub fn entries_mut(&mut self) -> &mut Vec<DirectoryEntry> { &mut self.entries }
}


/// The changes [`DirectoryListing::relink`] makes, collected before any of them are applied.
struct RelinkPlan<'r> {
    directory_record_lba: i32,
    entries: Vec<(&'r IsoDirectory, Option<RelinkPlan<'r>>)>, // one per entry, in entry order
}
