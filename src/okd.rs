//! The OKD container: header variants keyed by optional-data length, the
//! chunk list, and the optionally scrambled byte stream around both.

pub mod adpcm;
pub mod chunks;
pub mod conversion;
pub mod m_track_conversion;
pub mod midi;
pub mod oka;
pub mod p_track_conversion;
pub mod scramble;
pub mod scramble_pattern;

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, WriteBytesExt};
use log::info;
use serde::{Deserialize, Serialize};

use crate::dtype::OkdError;
use crate::sprc::SprcHeader;

use chunks::OkdChunk;
use scramble::{choose_scramble_pattern_index, descramble, detect_scramble_pattern_index, scramble};

pub const OKD_MAGIC_BYTES: [u8; 4] = *b"YKS1";
pub const FIXED_PART_LENGTH: u64 = 40;

/// The header tail beyond the 40-byte fixed part. The variant is keyed by
/// the tail's length; unknown lengths stay raw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OkdOptionalData {
    Yks,
    Mmt {
        yks_chunks_length: u32,
        mmt_chunks_length: u32,
        yks_chunks_crc: u16,
        crc: u16,
    },
    Mmk {
        yks_chunks_length: u32,
        mmt_chunks_length: u32,
        mmk_chunks_length: u32,
        yks_chunks_crc: u16,
        yks_mmt_chunks_crc: u16,
        crc: u16,
    },
    Spr {
        yks_chunks_length: u32,
        mmt_chunks_length: u32,
        mmk_chunks_length: u32,
        spr_chunks_length: u32,
        yks_chunks_crc: u16,
        yks_mmt_chunks_crc: u16,
        yks_mmt_mmk_chunks_crc: u16,
        crc: u16,
    },
    Dio {
        yks_chunks_length: u32,
        mmt_chunks_length: u32,
        mmk_chunks_length: u32,
        spr_chunks_length: u32,
        dio_chunks_length: u32,
        yks_chunks_crc: u16,
        yks_mmt_chunks_crc: u16,
        yks_mmt_mmk_chunks_crc: u16,
        yks_mmt_mmk_spr_chunks_crc: u16,
        crc: u16,
    },
    Generic(Vec<u8>),
}

fn read_u32_be(buffer: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buffer[offset],
        buffer[offset + 1],
        buffer[offset + 2],
        buffer[offset + 3],
    ])
}

fn read_u16_be(buffer: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buffer[offset], buffer[offset + 1]])
}

impl OkdOptionalData {
    pub fn from_optional_data(data: &[u8]) -> OkdOptionalData {
        match data.len() {
            0 => OkdOptionalData::Yks,
            12 => OkdOptionalData::Mmt {
                yks_chunks_length: read_u32_be(data, 0),
                mmt_chunks_length: read_u32_be(data, 4),
                yks_chunks_crc: read_u16_be(data, 8),
                crc: read_u16_be(data, 10),
            },
            20 => OkdOptionalData::Mmk {
                yks_chunks_length: read_u32_be(data, 0),
                mmt_chunks_length: read_u32_be(data, 4),
                mmk_chunks_length: read_u32_be(data, 8),
                yks_chunks_crc: read_u16_be(data, 12),
                yks_mmt_chunks_crc: read_u16_be(data, 14),
                crc: read_u16_be(data, 16),
            },
            24 => OkdOptionalData::Spr {
                yks_chunks_length: read_u32_be(data, 0),
                mmt_chunks_length: read_u32_be(data, 4),
                mmk_chunks_length: read_u32_be(data, 8),
                spr_chunks_length: read_u32_be(data, 12),
                yks_chunks_crc: read_u16_be(data, 16),
                yks_mmt_chunks_crc: read_u16_be(data, 18),
                yks_mmt_mmk_chunks_crc: read_u16_be(data, 20),
                crc: read_u16_be(data, 22),
            },
            32 => OkdOptionalData::Dio {
                yks_chunks_length: read_u32_be(data, 0),
                mmt_chunks_length: read_u32_be(data, 4),
                mmk_chunks_length: read_u32_be(data, 8),
                spr_chunks_length: read_u32_be(data, 12),
                dio_chunks_length: read_u32_be(data, 16),
                yks_chunks_crc: read_u16_be(data, 20),
                yks_mmt_chunks_crc: read_u16_be(data, 22),
                yks_mmt_mmk_chunks_crc: read_u16_be(data, 24),
                yks_mmt_mmk_spr_chunks_crc: read_u16_be(data, 26),
                crc: read_u16_be(data, 28),
            },
            _ => OkdOptionalData::Generic(data.to_vec()),
        }
    }

    pub fn buffer(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        match self {
            OkdOptionalData::Yks => {}
            OkdOptionalData::Mmt {
                yks_chunks_length,
                mmt_chunks_length,
                yks_chunks_crc,
                crc,
            } => {
                buffer.extend_from_slice(&yks_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmt_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&yks_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&crc.to_be_bytes());
            }
            OkdOptionalData::Mmk {
                yks_chunks_length,
                mmt_chunks_length,
                mmk_chunks_length,
                yks_chunks_crc,
                yks_mmt_chunks_crc,
                crc,
            } => {
                buffer.extend_from_slice(&yks_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmt_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmk_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&yks_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&yks_mmt_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&crc.to_be_bytes());
                // Padding
                buffer.extend_from_slice(&[0x00, 0x00]);
            }
            OkdOptionalData::Spr {
                yks_chunks_length,
                mmt_chunks_length,
                mmk_chunks_length,
                spr_chunks_length,
                yks_chunks_crc,
                yks_mmt_chunks_crc,
                yks_mmt_mmk_chunks_crc,
                crc,
            } => {
                buffer.extend_from_slice(&yks_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmt_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmk_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&spr_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&yks_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&yks_mmt_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&yks_mmt_mmk_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&crc.to_be_bytes());
            }
            OkdOptionalData::Dio {
                yks_chunks_length,
                mmt_chunks_length,
                mmk_chunks_length,
                spr_chunks_length,
                dio_chunks_length,
                yks_chunks_crc,
                yks_mmt_chunks_crc,
                yks_mmt_mmk_chunks_crc,
                yks_mmt_mmk_spr_chunks_crc,
                crc,
            } => {
                buffer.extend_from_slice(&yks_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmt_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&mmk_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&spr_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&dio_chunks_length.to_be_bytes());
                buffer.extend_from_slice(&yks_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&yks_mmt_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&yks_mmt_mmk_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&yks_mmt_mmk_spr_chunks_crc.to_be_bytes());
                buffer.extend_from_slice(&crc.to_be_bytes());
                // Padding
                buffer.extend_from_slice(&[0x00, 0x00]);
            }
            OkdOptionalData::Generic(data) => buffer.extend_from_slice(data),
        }
        buffer
    }

    pub fn buffer_size(&self) -> u64 {
        match self {
            OkdOptionalData::Yks => 0,
            OkdOptionalData::Mmt { .. } => 12,
            OkdOptionalData::Mmk { .. } => 20,
            OkdOptionalData::Spr { .. } => 24,
            OkdOptionalData::Dio { .. } => 32,
            OkdOptionalData::Generic(data) => data.len() as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkdHeader {
    /// Total file length minus 8, refreshed on write.
    pub length: u32,
    /// 16 ASCII characters, null-padded.
    pub version: String,
    pub id_karaoke: u32,
    /// Offset of the plaintext ADPCM tail; 0 when absent.
    pub adpcm_offset: u32,
    pub encryption_mode: u32,
    pub optional_data: OkdOptionalData,
}

impl OkdHeader {
    pub fn new(version: &str) -> OkdHeader {
        OkdHeader {
            length: 0,
            version: version.to_string(),
            id_karaoke: 0,
            adpcm_offset: 0,
            encryption_mode: 0,
            optional_data: OkdOptionalData::Yks,
        }
    }

    pub fn buffer(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&OKD_MAGIC_BYTES);
        buffer.extend_from_slice(&self.length.to_be_bytes());
        let mut version_bytes = self.version.as_bytes().to_vec();
        version_bytes.resize(16, 0x00);
        buffer.extend_from_slice(&version_bytes);
        buffer.extend_from_slice(&self.id_karaoke.to_be_bytes());
        buffer.extend_from_slice(&self.adpcm_offset.to_be_bytes());
        buffer.extend_from_slice(&self.encryption_mode.to_be_bytes());
        let optional_data_buffer = self.optional_data.buffer();
        buffer.extend_from_slice(&(optional_data_buffer.len() as u32).to_be_bytes());
        buffer.extend_from_slice(&optional_data_buffer);
        buffer
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_all(&self.buffer())?;
        Ok(())
    }
}

/// Read a region of `length` bytes, descrambling when an index is given.
/// Returns the bytes and the continuation index.
fn read_region<R: Read>(
    reader: &mut R,
    length: u64,
    scramble_pattern_index: Option<u8>,
) -> Result<(Vec<u8>, Option<u8>), OkdError> {
    match scramble_pattern_index {
        None => {
            let mut buffer = vec![0u8; length as usize];
            reader
                .read_exact(&mut buffer)
                .map_err(|_| OkdError::ShortRead)?;
            Ok((buffer, None))
        }
        Some(index) => {
            let mut buffer = Vec::with_capacity(length as usize);
            let next = descramble(reader, &mut buffer, index, Some(length))?;
            Ok((buffer, Some(next)))
        }
    }
}

/// Read and dispatch the header. The scramble index continues through the
/// fixed and optional parts.
pub fn read_okd_header<R: Read>(
    reader: &mut R,
    scramble_pattern_index: Option<u8>,
) -> Result<OkdHeader, OkdError> {
    let (fixed_part, scramble_pattern_index) =
        read_region(reader, FIXED_PART_LENGTH, scramble_pattern_index)?;

    let magic_bytes = [fixed_part[0], fixed_part[1], fixed_part[2], fixed_part[3]];
    if magic_bytes != OKD_MAGIC_BYTES {
        return Err(OkdError::BadMagic(magic_bytes));
    }
    let length = read_u32_be(&fixed_part, 4);
    let version = String::from_utf8_lossy(&fixed_part[8..24]).into_owned();
    let id_karaoke = read_u32_be(&fixed_part, 24);
    let adpcm_offset = read_u32_be(&fixed_part, 28);
    let encryption_mode = read_u32_be(&fixed_part, 32);
    let optional_data_length = read_u32_be(&fixed_part, 36);

    let (optional_data, _) = read_region(
        reader,
        optional_data_length as u64,
        scramble_pattern_index,
    )?;

    Ok(OkdHeader {
        length,
        version,
        id_karaoke,
        adpcm_offset,
        encryption_mode,
        optional_data: OkdOptionalData::from_optional_data(&optional_data),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct OkdFile {
    pub header: OkdHeader,
    pub chunks: Vec<OkdChunk>,
}

impl OkdFile {
    /// Read a whole OKD. Only `Read` is required; the stream is buffered and
    /// parsed in memory.
    pub fn read<R: Read>(reader: &mut R) -> Result<OkdFile, OkdError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut stream = Cursor::new(&bytes[..]);

        if SprcHeader::has_sprc_header(&mut stream)? {
            info!("SPRC Header detected.");
            let sprc_header = SprcHeader::read(&mut stream)?;
            sprc_header.validate_crc(&bytes[SprcHeader::HEADER_SIZE..])?;
            info!("SPRC Header CRC validation succeeded.");
        }

        let scramble_pattern_index =
            detect_scramble_pattern_index(&mut stream, &OKD_MAGIC_BYTES)?;

        let header = read_okd_header(&mut stream, scramble_pattern_index)?;
        let header_length = FIXED_PART_LENGTH + header.optional_data.buffer_size();
        let (scrambled_length, plaintext_length) = if header.adpcm_offset == 0 {
            ((header.length as i64 + 8 - header_length as i64).max(0), 0i64)
        } else {
            (
                (header.adpcm_offset as i64 - header_length as i64).max(0),
                (header.length as i64 + 8 - header.adpcm_offset as i64).max(0),
            )
        };

        let mut chunks_buffer: Vec<u8> = Vec::new();
        match scramble_pattern_index {
            None => {
                stream.read_to_end(&mut chunks_buffer)?;
            }
            Some(index) => {
                // The chunk region restarts at the detected index.
                descramble(
                    &mut stream,
                    &mut chunks_buffer,
                    index,
                    Some(scrambled_length as u64),
                )?;
                // Plaintext part
                let mut plaintext = vec![0u8; plaintext_length as usize];
                let n = stream.read(&mut plaintext)?;
                chunks_buffer.extend_from_slice(&plaintext[..n]);
            }
        }

        let mut chunks: Vec<OkdChunk> = Vec::new();
        let mut chunks_stream = Cursor::new(&chunks_buffer[..]);
        while let Some(chunk) = OkdChunk::read(&mut chunks_stream)? {
            chunks.push(chunk);
        }

        Ok(OkdFile { header, chunks })
    }

    /// Write the OKD, refreshing the header length and encryption mode.
    /// Scrambling runs the header and the chunk region each from the chosen
    /// index; the end-of-file mark stays plaintext.
    pub fn write<W: Write>(&mut self, writer: &mut W, should_scramble: bool) -> Result<(), OkdError> {
        let mut chunks_buffer = Vec::new();
        for chunk in &self.chunks {
            chunk.write(&mut chunks_buffer)?;
        }
        self.header.length = (FIXED_PART_LENGTH + self.header.optional_data.buffer_size()
            + chunks_buffer.len() as u64
            - 8) as u32;
        self.header.encryption_mode = if should_scramble { 1 } else { 0 };

        let header_buffer = self.header.buffer();

        if should_scramble {
            let scramble_pattern_index = choose_scramble_pattern_index();
            scramble(
                &mut Cursor::new(&header_buffer),
                writer,
                scramble_pattern_index,
                None,
            )?;
            scramble(
                &mut Cursor::new(&chunks_buffer),
                writer,
                scramble_pattern_index,
                None,
            )?;
        } else {
            writer.write_all(&header_buffer)?;
            writer.write_all(&chunks_buffer)?;
        }
        // End of file
        writer.write_u32::<BigEndian>(0)?;
        Ok(())
    }
}
