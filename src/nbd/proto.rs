use super::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

pub const NBD_MAGIC: u64 = 0x4e42_444d_4147_4943;
pub const IHAVEOPT: u64 = 0x4948_4156_454f_5054;
pub const REPLY_MAGIC: u64 = 0x0003_e889_0455_65a9;
pub const REQUEST_MAGIC: u32 = 0x2560_9513;
pub const SIMPLE_REPLY_MAGIC: u32 = 0x6744_6698;

/// Handshake flags, sent by the server
pub const FLAG_FIXED_NEWSTYLE: u16 = 1 << 0;
pub const FLAG_NO_ZEROES: u16 = 1 << 1;

/// Client flags
pub const FLAG_C_FIXED_NEWSTYLE: u32 = 1 << 0;
pub const FLAG_C_NO_ZEROES: u32 = 1 << 1;

/// Transmission flags
pub const FLAG_HAS_FLAGS: u16 = 1 << 0;
pub const FLAG_READ_ONLY: u16 = 1 << 1;
pub const FLAG_SEND_FLUSH: u16 = 1 << 2;

pub mod opt {
    pub const EXPORT_NAME: u32 = 1;
    pub const ABORT: u32 = 2;
    pub const LIST: u32 = 3;
    pub const INFO: u32 = 6;
    pub const GO: u32 = 7;
}

pub mod rep {
    pub const ACK: u32 = 1;
    pub const SERVER: u32 = 2;
    pub const INFO: u32 = 3;
    pub const ERR_UNSUP: u32 = 1 << 31 | 1;
    pub const ERR_INVALID: u32 = 1 << 31 | 3;
    pub const ERR_UNKNOWN: u32 = 1 << 31 | 6;
}

pub mod info {
    pub const EXPORT: u16 = 0;
    pub const NAME: u16 = 1;
    pub const DESCRIPTION: u16 = 2;
    pub const BLOCK_SIZE: u16 = 3;
}

pub mod cmd {
    pub const READ: u16 = 0;
    pub const WRITE: u16 = 1;
    pub const DISC: u16 = 2;
    pub const FLUSH: u16 = 3;
}

pub fn expect_magic<R: Read>(reader: &mut R, expected: u64) -> Result<()> {
    let got = reader.read_u64::<BigEndian>()?;
    if got != expected {
        return Err(Error::BadMagic { expected, got });
    }
    Ok(())
}

pub fn write_option_reply<W: Write>(
    writer: &mut W,
    option: u32,
    kind: u32,
    data: &[u8],
) -> io::Result<()> {
    writer.write_u64::<BigEndian>(REPLY_MAGIC)?;
    writer.write_u32::<BigEndian>(option)?;
    writer.write_u32::<BigEndian>(kind)?;
    writer.write_u32::<BigEndian>(data.len() as u32)?;
    writer.write_all(data)
}

pub fn write_simple_reply<W: Write>(writer: &mut W, error: u32, handle: u64) -> io::Result<()> {
    writer.write_u32::<BigEndian>(SIMPLE_REPLY_MAGIC)?;
    writer.write_u32::<BigEndian>(error)?;
    writer.write_u64::<BigEndian>(handle)
}

#[derive(Debug)]
pub struct Request {
    pub flags: u16,
    pub kind: u16,
    pub handle: u64,
    pub offset: u64,
    pub length: u32,
}

impl Request {
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<BigEndian>()?;
        if magic != REQUEST_MAGIC {
            return Err(Error::BadMagic {
                expected: REQUEST_MAGIC as u64,
                got: magic as u64,
            });
        }

        Ok(Self {
            flags: reader.read_u16::<BigEndian>()?,
            kind: reader.read_u16::<BigEndian>()?,
            handle: reader.read_u64::<BigEndian>()?,
            offset: reader.read_u64::<BigEndian>()?,
            length: reader.read_u32::<BigEndian>()?,
        })
    }
}
