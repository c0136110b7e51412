//! Reading and writing the directory listings of CVM disc images.
//!
//! A CVM image is an ISO9660 volume behind a small container header. Besides the ISO9660 directory
//! records, it stores the directory tree a second time in its own format; [`DirectoryListing`] reads
//! and writes that tree and can take over block addresses from a rebuilt ISO9660 tree.


mod error;
mod io_util;
pub mod iso9660;
pub mod listing;
pub mod overlay;


use std::io::{Read, Seek, SeekFrom};

pub use crate::error::Error;
pub use crate::io_util::{align_position_read, align_position_write, padding_to_alignment};
pub use crate::listing::{DirectoryEntry, DirectoryListing};
pub use crate::overlay::{OverlayContext, OverlayState, OverlayTable, Region};


/// Reads the root directory listing stored at `offset`.
pub fn read_root_listing<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    context: &OverlayContext<'_>,
) -> Result<DirectoryListing, Error> {
    reader.seek(SeekFrom::Start(offset))?;
    DirectoryListing::read(reader, None, context)
}
