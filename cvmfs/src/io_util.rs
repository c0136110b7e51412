use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::error::Error;


pub(crate) trait ByteBufReadable {
    fn read(buf: &[u8], pos: &mut usize) -> Self;
}
impl ByteBufReadable for u8 {
    fn read(buf: &[u8], pos: &mut usize) -> Self {
        let ret = buf[*pos];
        *pos += 1;
        ret
    }
}
impl<const N: usize> ByteBufReadable for [u8; N] {
    fn read(buf: &[u8], pos: &mut usize) -> Self {
        let mut ret = [0u8; N];
        ret.copy_from_slice(&buf[*pos..*pos+N]);
        *pos += N;
        ret
    }
}

pub(crate) trait ByteBufWritable {
    fn write(&self, buf: &mut [u8], pos: &mut usize);
}
impl ByteBufWritable for u8 {
    fn write(&self, buf: &mut [u8], pos: &mut usize) {
        buf[*pos] = *self;
        *pos += 1;
    }
}
impl<const N: usize> ByteBufWritable for [u8; N] {
    fn write(&self, buf: &mut [u8], pos: &mut usize) {
        buf[*pos..*pos+N].copy_from_slice(self);
        *pos += N;
    }
}

pub(crate) trait ReadEndian {
    fn read_be(buf: &[u8], pos: &mut usize) -> Self;
    fn read_le(buf: &[u8], pos: &mut usize) -> Self;
}
pub(crate) trait WriteEndian {
    fn write_be(&self, buf: &mut [u8], pos: &mut usize);
    fn write_le(&self, buf: &mut [u8], pos: &mut usize);
}
macro_rules! impl_endian {
    ($type:ty) => {
        impl ReadEndian for $type {
            fn read_be(buf: &[u8], pos: &mut usize) -> Self {
                const SIZE: usize = ::std::mem::size_of::<$type>();
                let mut bytes = [0u8; SIZE];
                bytes.copy_from_slice(&buf[*pos..*pos+SIZE]);
                *pos += SIZE;
                <$type>::from_be_bytes(bytes)
            }
            fn read_le(buf: &[u8], pos: &mut usize) -> Self {
                const SIZE: usize = ::std::mem::size_of::<$type>();
                let mut bytes = [0u8; SIZE];
                bytes.copy_from_slice(&buf[*pos..*pos+SIZE]);
                *pos += SIZE;
                <$type>::from_le_bytes(bytes)
            }
        }
        impl WriteEndian for $type {
            fn write_be(&self, buf: &mut [u8], pos: &mut usize) {
                const SIZE: usize = ::std::mem::size_of::<$type>();
                buf[*pos..*pos+SIZE].copy_from_slice(&self.to_be_bytes());
                *pos += SIZE;
            }
            fn write_le(&self, buf: &mut [u8], pos: &mut usize) {
                const SIZE: usize = ::std::mem::size_of::<$type>();
                buf[*pos..*pos+SIZE].copy_from_slice(&self.to_le_bytes());
                *pos += SIZE;
            }
        }
    };
}
impl_endian!(u16);
impl_endian!(u32);
impl_endian!(i32);


/// Fills `buf` from the reader, reporting a short read as [`Error::Truncated`].
///
/// `what` names the structure being read and ends up in the error message.
pub(crate) fn read_exact_or_truncated<R: Read + Seek>(
    reader: &mut R,
    buf: &mut [u8],
    what: &'static str,
) -> Result<(), Error> {
    let offset = reader.stream_position()?;
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::Truncated { offset, what }),
        Err(e) => Err(Error::Io(e)),
    }
}


/// The number of bytes between `position` and the next multiple of `alignment`.
///
/// Zero if `position` is already aligned.
pub fn padding_to_alignment(position: u64, alignment: u64) -> u64 {
    (alignment - position % alignment) % alignment
}

/// Skips forward to the next multiple of `alignment`. Returns the number of bytes skipped.
///
/// The skipped bytes are not read, so their contents are never checked.
pub fn align_position_read<S: Seek>(stream: &mut S, alignment: u64) -> Result<u64, io::Error> {
    let position = stream.stream_position()?;
    let padding = padding_to_alignment(position, alignment);
    if padding > 0 {
        stream.seek(SeekFrom::Start(position + padding))?;
    }
    Ok(padding)
}

/// Writes zero bytes up to the next multiple of `alignment`. Returns the number of bytes written.
pub fn align_position_write<W: Write + Seek>(writer: &mut W, alignment: u64) -> Result<u64, io::Error> {
    let position = writer.stream_position()?;
    let padding = padding_to_alignment(position, alignment);
    const ZEROES: [u8; 16] = [0u8; 16];
    let mut remaining = padding;
    while remaining > 0 {
        let chunk = remaining.min(ZEROES.len() as u64) as usize;
        writer.write_all(&ZEROES[..chunk])?;
        remaining -= chunk as u64;
    }
    Ok(padding)
}
