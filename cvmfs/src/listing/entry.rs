use std::io::{Read, Seek, Write};

use crate::error::Error;
use crate::io_util::{ByteBufReadable, ByteBufWritable, ReadEndian, WriteEndian, read_exact_or_truncated};
use crate::iso9660::{FileFlags, IsoDirectory, identifier_to_name};
use crate::listing::DirectoryListing;


/// The size of the fixed part of a directory entry, up to and including the name length byte.
pub const ENTRY_FIXED_SIZE: usize = 19;


/// One entry of a directory listing.
///
/// If [`FileFlags::DIRECTORY`] is set, the entry describes a sub-directory and (except for the
/// first two entries of each listing) owns that sub-directory's listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DirectoryEntry {
    pub unknown0: u16,

    /// The size of the file, or of the ISO9660 directory extent if this is a directory.
    pub file_size: u32,

    pub unknown1: u32,

    /// The logical block address of the file data or directory extent.
    pub lba: u32,

    pub flags: FileFlags, // u8
    pub unknown2: u8,
    pub unknown3: u16,

    // identifier_length: u8,
    identifier: Vec<u8>,
    // padding: u8 if identifier.len() is even

    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    listing: Option<Box<DirectoryListing>>,
}
impl DirectoryEntry {
    pub fn new(name: &str, flags: FileFlags) -> Self {
        Self {
            flags,
            identifier: name.as_bytes().to_vec(),
            ..Default::default()
        }
    }

    pub fn from_identifier(identifier: Vec<u8>, flags: FileFlags) -> Self {
        Self {
            flags,
            identifier,
            ..Default::default()
        }
    }

    /// Reads one entry, leaving the reader positioned at the start of the next one.
    ///
    /// The entry's own listing is not read; that is up to the listing containing it.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, Error> {
        let mut buf = [0u8; ENTRY_FIXED_SIZE];
        read_exact_or_truncated(reader, &mut buf, "directory entry")?;

        let mut pos = 0;
        let unknown0 = ReadEndian::read_le(&buf, &mut pos);
        let file_size = ReadEndian::read_le(&buf, &mut pos);
        let unknown1 = ReadEndian::read_le(&buf, &mut pos);
        let lba = ReadEndian::read_le(&buf, &mut pos);
        let flags = FileFlags::from_bits_retain(ByteBufReadable::read(&buf, &mut pos));
        let unknown2 = ByteBufReadable::read(&buf, &mut pos);
        let unknown3 = ReadEndian::read_le(&buf, &mut pos);
        let identifier_length: u8 = ByteBufReadable::read(&buf, &mut pos);

        // name plus padding to an even entry size
        let padded_length = Self::padded_identifier_length(usize::from(identifier_length));
        let mut identifier = vec![0u8; padded_length];
        read_exact_or_truncated(reader, &mut identifier, "directory entry name")?;
        identifier.truncate(usize::from(identifier_length));

        Ok(Self {
            unknown0,
            file_size,
            unknown1,
            lba,
            flags,
            unknown2,
            unknown3,
            identifier,
            listing: None,
        })
    }

    fn padded_identifier_length(identifier_length: usize) -> usize {
        if (ENTRY_FIXED_SIZE + identifier_length) % 2 == 0 {
            identifier_length
        } else {
            identifier_length + 1
        }
    }

    /// The number of bytes this entry occupies on disk.
    pub fn encoded_size(&self) -> usize {
        ENTRY_FIXED_SIZE + Self::padded_identifier_length(self.identifier.len())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let identifier_length = u8::try_from(self.identifier.len())
            .map_err(|_| Error::ValueOutOfRange { what: "directory entry name length" })?;

        let mut buf = vec![0u8; self.encoded_size()];
        let mut pos = 0;
        self.unknown0.write_le(&mut buf, &mut pos);
        self.file_size.write_le(&mut buf, &mut pos);
        self.unknown1.write_le(&mut buf, &mut pos);
        self.lba.write_le(&mut buf, &mut pos);
        self.flags.bits().write(&mut buf, &mut pos);
        self.unknown2.write(&mut buf, &mut pos);
        self.unknown3.write_le(&mut buf, &mut pos);
        identifier_length.write(&mut buf, &mut pos);
        buf[pos..pos+self.identifier.len()].copy_from_slice(&self.identifier);
        // padding stays zero

        writer.write_all(&buf)?;
        Ok(())
    }

    /// The name used for lookups, without version suffix; the identifiers 0x00 and 0x01 read as `.`
    /// and `..`.
    pub fn name(&self) -> String {
        identifier_to_name(&self.identifier)
    }

    /// The raw name bytes as stored on disk.
    pub fn identifier(&self) -> &[u8] { &self.identifier }

    pub fn is_directory(&self) -> bool {
        self.flags.contains(FileFlags::DIRECTORY)
    }

    pub fn listing(&self) -> Option<&DirectoryListing> {
        self.listing.as_deref()
    }

    pub fn listing_mut(&mut self) -> Option<&mut DirectoryListing> {
        self.listing.as_deref_mut()
    }

    pub fn set_listing(&mut self, listing: Option<DirectoryListing>) {
        self.listing = listing.map(Box::new);
    }

    /// Takes over location and size from a rebuilt directory record.
    pub(crate) fn apply_record(&mut self, record: &IsoDirectory) {
        self.lba = record.lba();
        self.file_size = record.record.data_length.little_endian;
    }
}


#[cfg(test)]
mod tests {
    use super::DirectoryEntry;
    use crate::error::Error;
    use crate::iso9660::FileFlags;
    use std::io::Cursor;

    #[test]
    fn test_entry_read() {
        let bytes = [
            0x34, 0x12, // unknown0
            0x00, 0x08, 0x00, 0x00, // file size
            0x01, 0x00, 0x00, 0x00, // unknown1
            0x2A, 0x00, 0x00, 0x00, // LBA
            0x02, // flags
            0x00, // unknown2
            0x00, 0x00, // unknown3
            0x03, b'S', b'F', b'D', // name
            0xFF, // trailing garbage
        ];
        let mut cursor = Cursor::new(&bytes[..]);
        let entry = DirectoryEntry::read(&mut cursor).unwrap();
        // 19 + 3 is even, so no padding
        assert_eq!(cursor.position(), 22);
        assert_eq!(entry.unknown0, 0x1234);
        assert_eq!(entry.file_size, 0x800);
        assert_eq!(entry.unknown1, 1);
        assert_eq!(entry.lba, 42);
        assert!(entry.is_directory());
        assert_eq!(entry.name(), "SFD");
        assert!(entry.listing().is_none());
    }

    #[test]
    fn test_entry_padding() {
        let mut entry = DirectoryEntry::new("AB", FileFlags::empty());
        entry.lba = 7;
        assert_eq!(entry.encoded_size(), 22);

        let mut written = Vec::new();
        entry.write(&mut written).unwrap();
        assert_eq!(written.len(), 22);
        assert_eq!(written[18], 2);
        assert_eq!(&written[19..], &[b'A', b'B', 0x00]);

        let mut cursor = Cursor::new(&written);
        let read_back = DirectoryEntry::read(&mut cursor).unwrap();
        assert_eq!(cursor.position(), 22);
        assert_eq!(read_back, entry);
    }

    #[test]
    fn test_special_names() {
        let this = DirectoryEntry::from_identifier(vec![0x00], FileFlags::DIRECTORY);
        let parent = DirectoryEntry::from_identifier(vec![0x01], FileFlags::DIRECTORY);
        let versioned = DirectoryEntry::new("MOVIE.SFD;1", FileFlags::empty());
        assert_eq!(this.name(), ".");
        assert_eq!(parent.name(), "..");
        assert_eq!(versioned.name(), "MOVIE.SFD");
        assert_eq!(versioned.identifier(), b"MOVIE.SFD;1");
    }

    #[test]
    fn test_entry_truncated_name() {
        let bytes = [
            0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00,
            0x00,
            0x00, 0x00,
            0x08, b'S', b'H',
        ];
        match DirectoryEntry::read(&mut Cursor::new(&bytes[..])) {
            Err(Error::Truncated { offset: 19, .. }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }
}
