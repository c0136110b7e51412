use std::fmt;
use std::io::{Read, Seek, Write};

use crate::error::Error;
use crate::io_util::{ByteBufReadable, ByteBufWritable, ReadEndian, WriteEndian, read_exact_or_truncated};


/// The size of a directory listing header in bytes.
pub const LISTING_HEADER_SIZE: usize = 22;

/// The tag found in the headers of all known directory listings.
pub const DEFAULT_LISTING_TAG: [u8; 8] = *b"#DirLst#";


/// The format tag of a directory listing.
///
/// The tag is a nine-character field whose last character overlaps the reserved field that follows
/// it, leaving eight usable bytes, NUL-padded.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListingTag([u8; 8]);
impl ListingTag {
    /// Creates a tag from text of at most eight bytes.
    pub fn new(text: &str) -> Option<Self> {
        let bytes = text.as_bytes();
        if bytes.len() > 8 {
            return None;
        }
        let mut buf = [0u8; 8];
        buf[..bytes.len()].copy_from_slice(bytes);
        Some(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8; 8] { &self.0 }

    /// The tag text up to the first NUL byte.
    pub fn text(&self) -> String {
        let end = self.0.iter().position(|b| *b == 0x00).unwrap_or(self.0.len());
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}
impl Default for ListingTag {
    fn default() -> Self { Self(DEFAULT_LISTING_TAG) }
}
impl From<[u8; 8]> for ListingTag {
    fn from(value: [u8; 8]) -> Self { Self(value) }
}
impl fmt::Display for ListingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}
impl fmt::Debug for ListingTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ListingTag({:?})", self.text())
    }
}
#[cfg(feature = "serde")]
impl serde::Serialize for ListingTag {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}


/// The fixed-size record at the start of each directory listing.
///
/// Values are taken as they are; [`DirectoryListing`](super::DirectoryListing) checks that both
/// entry counts agree.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ListingHeader {
    pub entry_count: i32,
    pub entry_count_aux: i32,

    /// The logical block address of the ISO9660 directory record describing the same directory.
    pub directory_record_lba: i32,

    pub tag: ListingTag, // [u8; 8]

    /// Reserved; ignored on read, always written as zero.
    pub unused: u16,
}
impl ListingHeader {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, Error> {
        let mut buf = [0u8; LISTING_HEADER_SIZE];
        read_exact_or_truncated(reader, &mut buf, "directory listing header")?;

        let mut pos = 0;
        let entry_count = ReadEndian::read_le(&buf, &mut pos);
        let entry_count_aux = ReadEndian::read_le(&buf, &mut pos);
        let directory_record_lba = ReadEndian::read_le(&buf, &mut pos);
        let tag_bytes: [u8; 8] = ByteBufReadable::read(&buf, &mut pos);
        let unused = ReadEndian::read_le(&buf, &mut pos);

        Ok(Self {
            entry_count,
            entry_count_aux,
            directory_record_lba,
            tag: ListingTag(tag_bytes),
            unused,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), Error> {
        let mut buf = [0u8; LISTING_HEADER_SIZE];
        let mut pos = 0;
        self.entry_count.write_le(&mut buf, &mut pos);
        self.entry_count_aux.write_le(&mut buf, &mut pos);
        self.directory_record_lba.write_le(&mut buf, &mut pos);
        self.tag.0.write(&mut buf, &mut pos);
        0u16.write_le(&mut buf, &mut pos);

        writer.write_all(&buf)?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::{LISTING_HEADER_SIZE, ListingHeader, ListingTag};
    use crate::error::Error;
    use std::io::Cursor;

    const HEADER: [u8; 22] = [
        0x05, 0x00, 0x00, 0x00,
        0x05, 0x00, 0x00, 0x00,
        0x34, 0x12, 0x00, 0x00,
        b'#', b'D', b'i', b'r', b'L', b's', b't', b'#',
        0x00, 0x00,
    ];

    #[test]
    fn test_header_read() {
        let mut cursor = Cursor::new(&HEADER[..]);
        let header = ListingHeader::read(&mut cursor).unwrap();
        assert_eq!(cursor.position(), LISTING_HEADER_SIZE as u64);
        assert_eq!(header.entry_count, 5);
        assert_eq!(header.entry_count_aux, 5);
        assert_eq!(header.directory_record_lba, 0x1234);
        assert_eq!(header.tag.text(), "#DirLst#");
    }

    #[test]
    fn test_header_write_clears_unused() {
        let mut with_unused = HEADER;
        with_unused[20] = 0xAB;
        with_unused[21] = 0xCD;
        let header = ListingHeader::read(&mut Cursor::new(&with_unused[..])).unwrap();
        assert_eq!(header.unused, 0xCDAB);

        let mut written = Vec::new();
        header.write(&mut written).unwrap();
        assert_eq!(written.as_slice(), &HEADER[..]);
    }

    #[test]
    fn test_header_truncated() {
        let mut cursor = Cursor::new(&HEADER[..21]);
        match ListingHeader::read(&mut cursor) {
            Err(Error::Truncated { offset: 0, .. }) => {},
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_tag() {
        assert_eq!(ListingTag::default().text(), "#DirLst#");
        let short = ListingTag::new("DIR").unwrap();
        assert_eq!(short.as_bytes(), b"DIR\0\0\0\0\0");
        assert_eq!(short.to_string(), "DIR");
        assert!(ListingTag::new("TOOLONGTAG").is_none());
    }
}
