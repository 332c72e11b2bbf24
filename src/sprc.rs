//! SPRC envelope: an optional 16-byte header in front of an OKD payload
//! carrying a CRC-16/GENIBUS of everything after itself.

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};
use crc::{Crc, CRC_16_GENIBUS};

use crate::dtype::OkdError;

const MAGIC_BYTES: [u8; 4] = *b"SPRC";

const CRC_GENIBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_GENIBUS);

/// CRC-16/GENIBUS of a payload, as stored in the header's `crc_value`.
pub fn crc16_genibus(data: &[u8]) -> u16 {
    CRC_GENIBUS.checksum(data)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SprcHeader {
    pub revision: u16,
    pub crc_value: u16,
    pub force_flag: u8,
    pub unknown_0: [u8; 7],
}

impl SprcHeader {
    pub const HEADER_SIZE: usize = 16;

    /// Check for the SPRC magic without consuming the stream.
    pub fn has_sprc_header<R: Read + Seek>(reader: &mut R) -> Result<bool, OkdError> {
        let position = reader.stream_position()?;
        let mut buffer = [0u8; SprcHeader::HEADER_SIZE];
        let read_result = reader.read_exact(&mut buffer);
        reader.seek(SeekFrom::Start(position))?;
        match read_result {
            Ok(()) => Ok(buffer[0..4] == MAGIC_BYTES),
            Err(_) => Ok(false),
        }
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<SprcHeader, OkdError> {
        let mut buffer = [0u8; SprcHeader::HEADER_SIZE];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        let magic_bytes = [buffer[0], buffer[1], buffer[2], buffer[3]];
        if magic_bytes != MAGIC_BYTES {
            return Err(OkdError::BadMagic(magic_bytes));
        }
        let revision = u16::from_be_bytes([buffer[4], buffer[5]]);
        let crc_value = u16::from_be_bytes([buffer[6], buffer[7]]);
        let force_flag = buffer[8];
        let mut unknown_0 = [0u8; 7];
        unknown_0.copy_from_slice(&buffer[9..16]);

        Ok(SprcHeader {
            revision,
            crc_value,
            force_flag,
            unknown_0,
        })
    }

    /// Validate the post-header payload against the stored CRC.
    pub fn validate_crc(&self, data: &[u8]) -> Result<(), OkdError> {
        let computed = crc16_genibus(data);
        if computed != self.crc_value {
            return Err(OkdError::CrcMismatch {
                header: self.crc_value,
                computed,
            });
        }
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u16::<BigEndian>(self.revision)?;
        writer.write_u16::<BigEndian>(self.crc_value)?;
        writer.write_u8(self.force_flag)?;
        writer.write_all(&self.unknown_0)?;
        Ok(())
    }

    /// Build a header for the given payload.
    pub fn create(data: &[u8], revision: u16, force_flag: u8) -> SprcHeader {
        SprcHeader {
            revision,
            crc_value: crc16_genibus(data),
            force_flag,
            unknown_0: [0u8; 7],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn genibus_check_value() {
        assert_eq!(crc16_genibus(b"123456789"), 0xD64E);
        assert_eq!(crc16_genibus(b""), 0x0000);
    }

    #[test]
    fn header_round_trip() {
        let header = SprcHeader::create(b"payload bytes", 1, 0);
        let mut written = Vec::new();
        header.write(&mut written).unwrap();
        assert_eq!(written.len(), SprcHeader::HEADER_SIZE);

        let mut reader = Cursor::new(&written);
        assert!(SprcHeader::has_sprc_header(&mut reader).unwrap());
        let read_back = SprcHeader::read(&mut reader).unwrap();
        assert_eq!(read_back, header);
        assert!(read_back.validate_crc(b"payload bytes").is_ok());
        assert!(matches!(
            read_back.validate_crc(b"other bytes"),
            Err(OkdError::CrcMismatch { .. })
        ));
    }

    #[test]
    fn short_or_foreign_streams_have_no_header() {
        let mut reader = Cursor::new(&b"SPR"[..]);
        assert!(!SprcHeader::has_sprc_header(&mut reader).unwrap());

        let mut reader = Cursor::new(&[0u8; 16][..]);
        assert!(!SprcHeader::has_sprc_header(&mut reader).unwrap());

        let mut reader = Cursor::new(&[0u8; 16][..]);
        assert!(matches!(
            SprcHeader::read(&mut reader),
            Err(OkdError::BadMagic(_))
        ));
    }
}
