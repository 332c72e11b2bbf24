//! ADPCM chunk (`YADD`): a sequence of `YAWV` sub-chunks of raw codec data.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::dtype::OkdError;
use crate::okd::adpcm::AdpcmDecoder;

use super::{write_chunk, GenericChunk};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdpcmChunkTrack {
    pub data: Vec<u8>,
}

impl AdpcmChunkTrack {
    pub const TRACK_ID: [u8; 4] = *b"YAWV";

    pub fn decode(&self) -> Vec<i16> {
        let mut decoder = AdpcmDecoder::new();
        decoder.decode(&mut Cursor::new(&self.data))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_all(&AdpcmChunkTrack::TRACK_ID)?;
        writer.write_u32::<BigEndian>(self.data.len() as u32)?;
        writer.write_all(&self.data)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdpcmChunk {
    pub id: [u8; 4],
    pub tracks: Vec<AdpcmChunkTrack>,
}

impl AdpcmChunk {
    pub fn from_generic(generic: &GenericChunk) -> Result<AdpcmChunk, OkdError> {
        let mut reader = Cursor::new(&generic.payload[..]);
        let mut tracks = Vec::new();
        loop {
            let mut buffer = [0u8; 8];
            let mut filled = 0;
            while filled < 8 {
                let n = reader.read(&mut buffer[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled < 8 {
                break;
            }

            let chunk_id = [buffer[0], buffer[1], buffer[2], buffer[3]];
            if chunk_id != AdpcmChunkTrack::TRACK_ID {
                return Err(OkdError::UnknownChunkId(chunk_id));
            }
            let chunk_size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]);
            let mut data = vec![0u8; chunk_size as usize];
            reader
                .read_exact(&mut data)
                .map_err(|_| OkdError::ShortRead)?;
            tracks.push(AdpcmChunkTrack { data });
        }

        Ok(AdpcmChunk {
            id: generic.id,
            tracks,
        })
    }

    /// The chunk body serializes as the bare track data, without `YAWV`
    /// sub-chunk headers.
    pub fn payload_buffer(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        for track in &self.tracks {
            buffer.extend_from_slice(&track.data);
        }
        buffer
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_chunk(writer, &self.id, &self.payload_buffer())
    }

    pub fn decode_tracks(&self) -> Vec<Vec<i16>> {
        self.tracks.iter().map(AdpcmChunkTrack::decode).collect()
    }
}
