//! ISO9660 directory records within a CVM image.
//!
//! A CVM image wraps an ISO9660 volume behind a header of [`CVM_ISO_BASE_OFFSET`] bytes; logical
//! block addresses in directory records are relative to the start of that volume.


use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use bitflags::bitflags;
use tracing::debug;

use crate::error::Error;
use crate::io_util::{ByteBufReadable, ByteBufWritable, ReadEndian, WriteEndian, read_exact_or_truncated};


/// The number of bytes per logical sector.
///
/// According to ISO9660 § 6.1.2, each logical sector contains 2**n bytes but at least 2048 bytes.
/// CVM images always use 2048.
pub const BYTES_PER_LOGICAL_SECTOR: u64 = 2048;

/// The offset within the CVM image at which the ISO9660 volume begins.
pub const CVM_ISO_BASE_OFFSET: u64 = 0x1800;

/// The length of a directory record without its file identifier, padding and system use area.
const DIRECTORY_RECORD_FIXED_LENGTH: usize = 33;

/// Directory trees deeper than this are assumed to be looping.
const MAX_DIRECTORY_DEPTH: usize = 64;


/// Converts a logical block address into an absolute byte offset within the CVM image.
pub fn lba_to_offset(lba: u32) -> u64 {
    CVM_ISO_BASE_OFFSET + u64::from(lba) * BYTES_PER_LOGICAL_SECTOR
}


/// The same value, encoded once as big and once as little endian.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EndianPair<T> {
    pub little_endian: T,
    pub big_endian: T,
}
impl<T: Copy> EndianPair<T> {
    pub fn both(value: T) -> Self {
        Self {
            little_endian: value,
            big_endian: value,
        }
    }
}
impl<T: ReadEndian> EndianPair<T> {
    fn read(buf: &[u8], pos: &mut usize) -> Self {
        let little_endian = T::read_le(buf, pos);
        let big_endian = T::read_be(buf, pos);
        Self {
            little_endian,
            big_endian,
        }
    }
}
impl<T: WriteEndian> EndianPair<T> {
    fn write(&self, buf: &mut [u8], pos: &mut usize) {
        self.little_endian.write_le(buf, pos);
        self.big_endian.write_be(buf, pos);
    }
}


/// An ISO9660 directory record.
///
/// See ISO9660 § 9.1.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DirectoryRecord {
    // length: u8,

    /// The length of the extended attribute record.
    ///
    /// This is the number of logical blocks preceding the file data that contain the extended
    /// attribute record.
    pub extended_attribute_record_length: u8,

    /// The location of this extent as a logical block number.
    pub extent_location: EndianPair<u32>, // [u32; 2]

    /// The number of bytes contained in this extent.
    ///
    /// This only reflects the length of the data itself, not the length of the extended attribute
    /// record.
    pub data_length: EndianPair<u32>, // [u32; 2]

    /// The date and time at which this file was recorded.
    pub recording_timestamp: BinaryTimestamp, // [u8; 7]

    /// Various flags describing the kind of file.
    pub file_flags: FileFlags, // u8

    /// The unit size if the file is recorded in interleaved mode.
    ///
    /// Zero if the file is recorded contiguously.
    pub interleave_unit_size: u8,

    /// The gap size if the file is recorded in interleaved mode.
    ///
    /// Zero if the file is recorded contiguously.
    pub interleave_gap_size: u8,

    /// Specifies which volume in the volume set contains this file.
    pub volume_sequence_number: EndianPair<u16>,

    // file_identifier_length: u8,

    /// The file identifier.
    ///
    /// A single byte 0x00 describes the directory itself, a single byte 0x01 its parent.
    pub file_identifier: Vec<u8>,

    // padding: u8 if file_identifier.len() is even

    /// Bytes reserved for system use.
    pub system_use_bytes: Vec<u8>,
}
impl DirectoryRecord {
    /// Reads a directory record. Returns `None` if the length byte is zero, which marks the unused
    /// remainder of a sector.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Option<Self>, Error> {
        let offset = reader.stream_position()?;
        let mut length_buf = [0u8];
        read_exact_or_truncated(reader, &mut length_buf, "directory record")?;
        let length = usize::from(length_buf[0]);
        if length == 0 {
            return Ok(None);
        }
        if length < DIRECTORY_RECORD_FIXED_LENGTH {
            return Err(Error::InvalidDirectoryRecord { offset, length });
        }

        let mut buf = vec![0u8; length - 1];
        read_exact_or_truncated(reader, &mut buf, "directory record")?;

        let mut pos = 0;
        let extended_attribute_record_length = ByteBufReadable::read(&buf, &mut pos);
        let extent_location = EndianPair::read(&buf, &mut pos);
        let data_length = EndianPair::read(&buf, &mut pos);
        let recording_timestamp = BinaryTimestamp::from_bytes(ByteBufReadable::read(&buf, &mut pos));
        let file_flags = FileFlags::from_bits_retain(ByteBufReadable::read(&buf, &mut pos));
        let interleave_unit_size = ByteBufReadable::read(&buf, &mut pos);
        let interleave_gap_size = ByteBufReadable::read(&buf, &mut pos);
        let volume_sequence_number = EndianPair::read(&buf, &mut pos);
        let file_identifier_length: u8 = ByteBufReadable::read(&buf, &mut pos);

        let identifier_end = pos + usize::from(file_identifier_length);
        if identifier_end > buf.len() {
            debug!(
                "file identifier length {} exceeds directory record length {}",
                file_identifier_length, length,
            );
            return Err(Error::InvalidDirectoryRecord { offset, length });
        }
        let file_identifier = buf[pos..identifier_end].to_vec();
        pos = identifier_end;
        if file_identifier_length % 2 == 0 && pos < buf.len() {
            // skip padding
            pos += 1;
        }
        let system_use_bytes = buf[pos..].to_vec();

        Ok(Some(Self {
            extended_attribute_record_length,
            extent_location,
            data_length,
            recording_timestamp,
            file_flags,
            interleave_unit_size,
            interleave_gap_size,
            volume_sequence_number,
            file_identifier,
            system_use_bytes,
        }))
    }

    /// The number of bytes this record occupies on disk.
    pub fn encoded_length(&self) -> usize {
        let padding = if self.file_identifier.len() % 2 == 0 { 1 } else { 0 };
        DIRECTORY_RECORD_FIXED_LENGTH + self.file_identifier.len() + padding + self.system_use_bytes.len()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let length = u8::try_from(self.encoded_length())
            .map_err(|_| Error::ValueOutOfRange { what: "directory record length" })?;
        let file_identifier_length = u8::try_from(self.file_identifier.len())
            .map_err(|_| Error::ValueOutOfRange { what: "file identifier length" })?;

        let mut buf = vec![0u8; usize::from(length)];
        let mut pos = 0;
        length.write(&mut buf, &mut pos);
        self.extended_attribute_record_length.write(&mut buf, &mut pos);
        self.extent_location.write(&mut buf, &mut pos);
        self.data_length.write(&mut buf, &mut pos);
        self.recording_timestamp.to_bytes().write(&mut buf, &mut pos);
        self.file_flags.bits().write(&mut buf, &mut pos);
        self.interleave_unit_size.write(&mut buf, &mut pos);
        self.interleave_gap_size.write(&mut buf, &mut pos);
        self.volume_sequence_number.write(&mut buf, &mut pos);
        file_identifier_length.write(&mut buf, &mut pos);
        buf[pos..pos+self.file_identifier.len()].copy_from_slice(&self.file_identifier);
        pos += self.file_identifier.len();
        if self.file_identifier.len() % 2 == 0 {
            // padding stays zero
            pos += 1;
        }
        buf[pos..].copy_from_slice(&self.system_use_bytes);

        writer.write_all(&buf)?;
        Ok(())
    }

    pub fn is_directory(&self) -> bool {
        self.file_flags.contains(FileFlags::DIRECTORY)
    }

    /// Whether this record describes the directory containing it (0x00) or that directory's parent
    /// (0x01).
    pub fn is_self_or_parent(&self) -> bool {
        self.file_identifier == [0x00] || self.file_identifier == [0x01]
    }

    /// The name by which directory listing entries refer to this record.
    pub fn name(&self) -> String {
        identifier_to_name(&self.file_identifier)
    }
}


/// Turns a file identifier into the name used for lookups.
///
/// The version suffix (`;1`) is removed; the identifiers 0x00 and 0x01 become `.` and `..`.
pub(crate) fn identifier_to_name(identifier: &[u8]) -> String {
    match identifier {
        [0x00] => ".".to_owned(),
        [0x01] => "..".to_owned(),
        identifier => {
            let without_version = match identifier.iter().position(|b| *b == b';') {
                Some(semicolon) => &identifier[..semicolon],
                None => identifier,
            };
            String::from_utf8_lossy(without_version).into_owned()
        },
    }
}


/// A binary representation of a timestamp.
///
/// Apart from a valid date and time, a special zero value may be encoded by setting all fields to
/// 0.
///
/// 7 bytes on ISO9660 (§ 9.1.5).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BinaryTimestamp {
    /// The year since the year 1900.
    pub year_since_1900: u8,

    /// The month, a value from 1 to 12, or 0 if encoding the zero value.
    pub month: u8,

    /// The day, a value from 1 to 31, or 0 if encoding the zero value.
    pub day: u8,

    pub hour: u8,
    pub minute: u8,
    pub second: u8,

    /// Offset from GMT in units of 15min, from -48 to 52.
    pub gmt_offset_15min: i8,
}
impl BinaryTimestamp {
    pub fn from_bytes(bytes: [u8; 7]) -> Self {
        Self {
            year_since_1900: bytes[0],
            month: bytes[1],
            day: bytes[2],
            hour: bytes[3],
            minute: bytes[4],
            second: bytes[5],
            gmt_offset_15min: i8::from_ne_bytes([bytes[6]]),
        }
    }

    pub fn to_bytes(&self) -> [u8; 7] {
        [
            self.year_since_1900,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            self.gmt_offset_15min.to_ne_bytes()[0],
        ]
    }
}


bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct FileFlags : u8 {
        /// Whether the file should be hidden from the user.
        const EXISTENCE = (1 << 0);

        /// Whether the entry is a directory, not a file.
        ///
        /// CVM directory listing entries use the same bit to mark sub-directories.
        const DIRECTORY = (1 << 1);

        /// Whether this is an associated file, which contains additional metadata pertaining to the
        /// actual file with the same `file_identifier`.
        const ASSOCIATED_FILE = (1 << 2);

        /// Whether the structure of the file data is reflected by the Record Format field in the
        /// file's Extended Attribute Record.
        const RECORD = (1 << 3);

        /// Whether access control information should be considered valid when deciding whether a
        /// user may access the file.
        const PROTECTION = (1 << 4);

        /// If this bit is set, more directory entries follow that describe further extents of the
        /// file.
        const MULTI_EXTENT = (1 << 7);
    }
}


/// A directory record together with the records in its extent.
///
/// Only directories have sub-records; the self and parent records are kept as leaves.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct IsoDirectory {
    pub record: DirectoryRecord,
    pub sub_records: Vec<IsoDirectory>,
}
impl IsoDirectory {
    pub fn leaf(record: DirectoryRecord) -> Self {
        Self {
            record,
            sub_records: Vec::new(),
        }
    }

    pub fn lba(&self) -> u32 { self.record.extent_location.little_endian }
    pub fn name(&self) -> String { self.record.name() }

    pub fn find(&self, name: &str) -> Option<&IsoDirectory> {
        self.sub_records.iter()
            .find(|sub| sub.name() == name)
    }

    /// Reads the extent of `record` and, recursively, the extents of all its sub-directories.
    pub fn read_tree<R: Read + Seek>(reader: &mut R, record: DirectoryRecord) -> Result<Self, Error> {
        Self::read_tree_at_depth(reader, record, 0)
    }

    fn read_tree_at_depth<R: Read + Seek>(reader: &mut R, record: DirectoryRecord, depth: usize) -> Result<Self, Error> {
        if !record.is_directory() {
            return Ok(Self::leaf(record));
        }
        if depth >= MAX_DIRECTORY_DEPTH {
            return Err(Error::ValueOutOfRange { what: "directory nesting depth" });
        }

        let extent_offset = lba_to_offset(record.extent_location.little_endian);
        let extent_length: usize = record.data_length.little_endian.try_into()
            .map_err(|_| Error::ValueOutOfRange { what: "directory extent length" })?;
        debug!(
            "reading directory {:?} extent at {:#X} ({} bytes)",
            record.name(), extent_offset, extent_length,
        );

        reader.seek(SeekFrom::Start(extent_offset))?;
        let mut extent = vec![0u8; extent_length];
        read_exact_or_truncated(reader, &mut extent, "directory extent")?;

        let mut child_records = Vec::new();
        let mut extent_cursor = Cursor::new(extent.as_slice());
        while (extent_cursor.position() as usize) < extent.len() {
            match DirectoryRecord::read(&mut extent_cursor)? {
                Some(child) => child_records.push(child),
                None => {
                    // rest of this sector is unused; continue with the next one
                    let position = extent_cursor.position();
                    let next_sector = (position / BYTES_PER_LOGICAL_SECTOR + 1) * BYTES_PER_LOGICAL_SECTOR;
                    extent_cursor.set_position(next_sector);
                },
            }
        }

        let mut sub_records = Vec::with_capacity(child_records.len());
        for child in child_records {
            if child.is_self_or_parent() {
                sub_records.push(Self::leaf(child));
            } else {
                sub_records.push(Self::read_tree_at_depth(reader, child, depth + 1)?);
            }
        }

        Ok(Self {
            record,
            sub_records,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::{
        BYTES_PER_LOGICAL_SECTOR, CVM_ISO_BASE_OFFSET, DirectoryRecord, EndianPair, FileFlags,
        IsoDirectory, lba_to_offset,
    };
    use crate::error::Error;
    use std::io::Cursor;

    fn record(name: &[u8], lba: u32, length: u32, flags: FileFlags) -> DirectoryRecord {
        DirectoryRecord {
            extent_location: EndianPair::both(lba),
            data_length: EndianPair::both(length),
            file_flags: flags,
            volume_sequence_number: EndianPair::both(1),
            file_identifier: name.to_vec(),
            ..Default::default()
        }
    }

    fn place(image: &mut Vec<u8>, offset: u64, records: &[DirectoryRecord]) {
        let mut buf = Vec::new();
        for r in records {
            r.write(&mut buf).unwrap();
        }
        let offset = offset as usize;
        if image.len() < offset + buf.len() {
            image.resize(offset + buf.len(), 0);
        }
        image[offset..offset+buf.len()].copy_from_slice(&buf);
    }

    #[test]
    fn test_lba_to_offset() {
        assert_eq!(lba_to_offset(0), CVM_ISO_BASE_OFFSET);
        assert_eq!(lba_to_offset(2), 0x1800 + 2 * 0x800);
    }

    #[test]
    fn test_record_read() {
        let original = record(b"FILE.BIN;1", 0x20, 1234, FileFlags::empty());
        let mut buf = Vec::new();
        original.write(&mut buf).unwrap();
        // 33 + 10 + 1 padding byte
        assert_eq!(buf.len(), 44);
        assert_eq!(buf[0], 44);
        assert_eq!(&buf[2..6], &[0x20, 0x00, 0x00, 0x00]);
        assert_eq!(&buf[6..10], &[0x00, 0x00, 0x00, 0x20]);

        let read_back = DirectoryRecord::read(&mut Cursor::new(&buf)).unwrap().unwrap();
        assert_eq!(read_back, original);
        assert_eq!(read_back.name(), "FILE.BIN");
    }

    #[test]
    fn test_zero_length_record() {
        let buf = [0u8; 4];
        assert!(DirectoryRecord::read(&mut Cursor::new(&buf[..])).unwrap().is_none());
    }

    #[test]
    fn test_read_tree() {
        let sector = BYTES_PER_LOGICAL_SECTOR as u32;
        let root = record(&[0x00], 1, sector, FileFlags::DIRECTORY);
        let mut image = Vec::new();
        place(&mut image, lba_to_offset(1), &[
            record(&[0x00], 1, sector, FileFlags::DIRECTORY),
            record(&[0x01], 1, sector, FileFlags::DIRECTORY),
            record(b"DATA", 2, sector, FileFlags::DIRECTORY),
            record(b"README.TXT;1", 9, 77, FileFlags::empty()),
        ]);
        place(&mut image, lba_to_offset(2), &[
            record(&[0x00], 2, sector, FileFlags::DIRECTORY),
            record(&[0x01], 1, sector, FileFlags::DIRECTORY),
            record(b"A.BIN;1", 10, 5, FileFlags::empty()),
        ]);
        image.resize(lba_to_offset(3) as usize, 0);

        let tree = IsoDirectory::read_tree(&mut Cursor::new(&image), root).unwrap();
        let names: Vec<String> = tree.sub_records.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec![".", "..", "DATA", "README.TXT"]);

        let data = tree.find("DATA").unwrap();
        assert_eq!(data.lba(), 2);
        assert_eq!(data.sub_records.len(), 3);
        assert_eq!(data.find("A.BIN").unwrap().lba(), 10);
        assert!(tree.find(".").unwrap().sub_records.is_empty());
    }

    #[test]
    fn test_record_invalid_length() {
        let mut buf = vec![0xFFu8; 4];
        buf.push(0x10);
        buf.resize(4 + 0x10, 0);
        let mut cursor = Cursor::new(&buf);
        cursor.set_position(4);
        match DirectoryRecord::read(&mut cursor) {
            Err(Error::InvalidDirectoryRecord { offset: 4, length: 0x10 }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_record_identifier_overflow() {
        let mut buf = vec![0u8; 34];
        buf[0] = 34;
        buf[32] = 10;
        match DirectoryRecord::read(&mut Cursor::new(&buf)) {
            Err(Error::InvalidDirectoryRecord { offset: 0, length: 34 }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }
}
