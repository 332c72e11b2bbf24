//! OKA header: the sibling container for scoring reference data. Only the
//! 40-byte header differs from OKD; it shares the scramble transform.

use std::io::{Read, Write};

use crate::dtype::OkdError;

use super::{read_u32_be, FIXED_PART_LENGTH};

pub const OKA_MAGIC_BYTES: [u8; 4] = *b"YOKA";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OkaHeader {
    pub length: u32,
    pub version: String,
    pub id_karaoke: u32,
    pub data_offset: u32,
    pub unknown_0: u32,
    pub crc: u32,
}

impl OkaHeader {
    /// Read the header, optionally through the scramble transform (the
    /// caller detects the index against the `YOKA` magic).
    pub fn read<R: Read>(
        reader: &mut R,
        scramble_pattern_index: Option<u8>,
    ) -> Result<OkaHeader, OkdError> {
        let (buffer, _) = super::read_region(reader, FIXED_PART_LENGTH, scramble_pattern_index)?;

        let magic_bytes = [buffer[0], buffer[1], buffer[2], buffer[3]];
        if magic_bytes != OKA_MAGIC_BYTES {
            return Err(OkdError::BadMagic(magic_bytes));
        }

        Ok(OkaHeader {
            length: read_u32_be(&buffer, 4),
            version: String::from_utf8_lossy(&buffer[8..24]).into_owned(),
            id_karaoke: read_u32_be(&buffer, 24),
            data_offset: read_u32_be(&buffer, 28),
            unknown_0: read_u32_be(&buffer, 32),
            crc: read_u32_be(&buffer, 36),
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_all(&OKA_MAGIC_BYTES)?;
        writer.write_all(&self.length.to_be_bytes())?;
        let mut version_bytes = self.version.as_bytes().to_vec();
        version_bytes.resize(16, 0x00);
        writer.write_all(&version_bytes)?;
        writer.write_all(&self.id_karaoke.to_be_bytes())?;
        writer.write_all(&self.data_offset.to_be_bytes())?;
        writer.write_all(&self.unknown_0.to_be_bytes())?;
        writer.write_all(&self.crc.to_be_bytes())?;
        Ok(())
    }
}
