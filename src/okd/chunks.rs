//! Chunked container layer: 8-byte headers, id unmasking, end-of-file
//! sentinel, and dispatch from generic chunks to their typed forms.

pub mod adpcm_chunk;
pub mod extended_p_track_info;
pub mod m_track;
pub mod p3_track_info;
pub mod p_track;
pub mod p_track_info;

use std::io::{Read, Seek, SeekFrom, Write};

use byteorder::{BigEndian, WriteBytesExt};

use crate::dtype::OkdError;

pub use adpcm_chunk::{AdpcmChunk, AdpcmChunkTrack};
pub use extended_p_track_info::{
    ExtendedPTrackInfoChannelInfoEntry, ExtendedPTrackInfoChunk, ExtendedPTrackInfoEntry,
};
pub use m_track::{MTrackAbsoluteTimeEvent, MTrackChunk, MTrackEvent, MTrackInterpretation};
pub use p3_track_info::P3TrackInfoChunk;
pub use p_track::{PTrackAbsoluteTimeEvent, PTrackChunk, PTrackEvent};
pub use p_track_info::{
    PTrackInfoChannelInfoEntry, PTrackInfoChunk, PTrackInfoEntry, TrackInfoEntry,
};

pub const END_OF_FILE_MARK: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// The YADD chunk hides behind an obfuscated id; its size word is masked
/// with the same constant.
const SCRAMBLED_ADPCM_CHUNK_ID: [u8; 4] = [0x4E, 0x96, 0x53, 0x93];
const ADPCM_CHUNK_SIZE_MASK: u32 = 0x17D7_17D7;

fn descramble_header(id: [u8; 4], size: u32) -> ([u8; 4], u32) {
    if id == SCRAMBLED_ADPCM_CHUNK_ID {
        (*b"YADD", size ^ ADPCM_CHUNK_SIZE_MASK)
    } else {
        (id, size)
    }
}

/// Read as many bytes as the stream still has, up to `buf.len()`.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one chunk header and payload. `None` marks the end of the chunk
/// stream: a zero-length read, a short header, or the end-of-file sentinel.
pub fn read_chunk_common<R: Read + Seek>(
    reader: &mut R,
) -> Result<Option<([u8; 4], Vec<u8>)>, OkdError> {
    let mut buffer = [0u8; 8];
    let n = read_up_to(reader, &mut buffer)?;
    if n == 0 || (n == 8 && buffer[0..4] == END_OF_FILE_MARK) {
        return Ok(None);
    }
    if n != 8 {
        reader.seek(SeekFrom::Current(-(n as i64)))?;
        return Ok(None);
    }

    let id = [buffer[0], buffer[1], buffer[2], buffer[3]];
    let size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]);
    let (id, size) = descramble_header(id, size);

    let mut payload = vec![0u8; size as usize];
    let filled = read_up_to(reader, &mut payload)?;
    payload.truncate(filled);
    Ok(Some((id, payload)))
}

/// Peek the next chunk header without consuming it.
pub fn peek_chunk_header<R: Read + Seek>(
    reader: &mut R,
) -> Result<Option<([u8; 4], u32)>, OkdError> {
    let mut buffer = [0u8; 8];
    let n = read_up_to(reader, &mut buffer)?;
    reader.seek(SeekFrom::Current(-(n as i64)))?;
    if n != 8 || buffer[0..4] == END_OF_FILE_MARK {
        return Ok(None);
    }

    let id = [buffer[0], buffer[1], buffer[2], buffer[3]];
    let size = u32::from_be_bytes([buffer[4], buffer[5], buffer[6], buffer[7]]);
    Ok(Some(descramble_header(id, size)))
}

/// Scan forward to the next chunk header, optionally only stopping at a
/// specific id. The reader is left positioned at the found header.
pub fn seek_chunk_header<R: Read + Seek>(
    reader: &mut R,
    id: Option<[u8; 4]>,
) -> Result<Option<([u8; 4], u32)>, OkdError> {
    loop {
        let (current_id, current_size) = match peek_chunk_header(reader)? {
            Some(header) => header,
            None => return Ok(None),
        };
        match id {
            None => return Ok(Some((current_id, current_size))),
            Some(id) if current_id == id => return Ok(Some((current_id, current_size))),
            Some(_) => {
                reader.seek(SeekFrom::Current(8 + current_size as i64))?;
            }
        }
    }
}

/// Index the chunk stream as `(offset, length, id)` rows.
pub fn index_chunks<R: Read + Seek>(reader: &mut R) -> Result<Vec<(u64, u64, [u8; 4])>, OkdError> {
    let mut headers: Vec<(u64, [u8; 4])> = Vec::new();
    loop {
        let (id, size) = match seek_chunk_header(reader, None)? {
            Some(header) => header,
            None => break,
        };
        let position = reader.stream_position()?;
        headers.push((position, id));
        reader.seek(SeekFrom::Current(8 + size as i64))?;
    }
    let end = reader.stream_position()?;

    Ok(headers
        .iter()
        .enumerate()
        .map(|(i, &(position, id))| {
            let next = headers
                .get(i + 1)
                .map_or(end, |&(next_position, _)| next_position);
            (position, next - position, id)
        })
        .collect())
}

/// Write one chunk: id, size, payload padded to even length.
pub fn write_chunk<W: Write>(writer: &mut W, id: &[u8; 4], payload: &[u8]) -> Result<(), OkdError> {
    writer.write_all(id)?;
    let pad = payload.len() % 2 != 0;
    let padded_len = payload.len() + pad as usize;
    writer.write_u32::<BigEndian>(padded_len as u32)?;
    writer.write_all(payload)?;
    if pad {
        writer.write_u8(0x00)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericChunk {
    pub id: [u8; 4],
    pub payload: Vec<u8>,
}

impl GenericChunk {
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Option<GenericChunk>, OkdError> {
        Ok(read_chunk_common(reader)?.map(|(id, payload)| GenericChunk { id, payload }))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_chunk(writer, &self.id, &self.payload)
    }
}

/// Every chunk flavor the container knows about. The dispatch set is closed,
/// so unknown ids stay generic.
#[derive(Debug, Clone, PartialEq)]
pub enum OkdChunk {
    Generic(GenericChunk),
    PTrackInfo(PTrackInfoChunk),
    P3TrackInfo(P3TrackInfoChunk),
    ExtendedPTrackInfo(ExtendedPTrackInfoChunk),
    MTrack(MTrackChunk),
    PTrack(PTrackChunk),
    Adpcm(AdpcmChunk),
}

impl OkdChunk {
    /// Read the next chunk and lift it to its typed form.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Option<OkdChunk>, OkdError> {
        let generic = match GenericChunk::read(reader)? {
            Some(generic) => generic,
            None => return Ok(None),
        };

        Ok(Some(match &generic.id {
            b"YPTI" => OkdChunk::PTrackInfo(PTrackInfoChunk::from_generic(&generic)?),
            b"YP3I" => OkdChunk::P3TrackInfo(P3TrackInfoChunk::from_generic(&generic)?),
            b"YPXI" => OkdChunk::ExtendedPTrackInfo(ExtendedPTrackInfoChunk::from_generic(
                &generic,
            )?),
            id if id[0..3] == *b"\xffMR" => OkdChunk::MTrack(MTrackChunk::from_generic(&generic)?),
            id if id[0..3] == *b"\xffPR" => OkdChunk::PTrack(PTrackChunk::from_generic(&generic)?),
            b"YADD" => OkdChunk::Adpcm(AdpcmChunk::from_generic(&generic)?),
            _ => OkdChunk::Generic(generic),
        }))
    }

    pub fn id(&self) -> &[u8; 4] {
        match self {
            OkdChunk::Generic(chunk) => &chunk.id,
            OkdChunk::PTrackInfo(chunk) => &chunk.id,
            OkdChunk::P3TrackInfo(chunk) => &chunk.id,
            OkdChunk::ExtendedPTrackInfo(chunk) => &chunk.id,
            OkdChunk::MTrack(chunk) => &chunk.id,
            OkdChunk::PTrack(chunk) => &chunk.id,
            OkdChunk::Adpcm(chunk) => &chunk.id,
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        match self {
            OkdChunk::Generic(chunk) => chunk.write(writer),
            OkdChunk::PTrackInfo(chunk) => chunk.write(writer),
            OkdChunk::P3TrackInfo(chunk) => chunk.write(writer),
            OkdChunk::ExtendedPTrackInfo(chunk) => chunk.write(writer),
            OkdChunk::MTrack(chunk) => chunk.write(writer),
            OkdChunk::PTrack(chunk) => chunk.write(writer),
            OkdChunk::Adpcm(chunk) => chunk.write(writer),
        }
    }
}

/// Any of the three P-track info flavors, as selected for playback.
#[derive(Debug, Clone, PartialEq)]
pub enum PTrackInfo {
    Standard(PTrackInfoChunk),
    Extended(ExtendedPTrackInfoChunk),
    P3(P3TrackInfoChunk),
}

impl PTrackInfo {
    /// The info entry for a P-track chunk number, if present.
    pub fn entry_for_track(&self, track_number: u8) -> Option<&dyn TrackInfoEntry> {
        match self {
            PTrackInfo::Standard(chunk) => chunk
                .data
                .iter()
                .find(|entry| entry.track_number == track_number)
                .map(|entry| entry as &dyn TrackInfoEntry),
            PTrackInfo::Extended(chunk) => chunk
                .data
                .iter()
                .find(|entry| entry.track_number == track_number)
                .map(|entry| entry as &dyn TrackInfoEntry),
            PTrackInfo::P3(chunk) => {
                if chunk.track_number == track_number {
                    Some(chunk as &dyn TrackInfoEntry)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn obfuscated_adpcm_header_is_unmasked() {
        let bytes = [0x4Eu8, 0x96, 0x53, 0x93, 0x17, 0xD7, 0x17, 0xD7];
        let mut reader = Cursor::new(&bytes[..]);
        let (id, payload) = read_chunk_common(&mut reader).unwrap().unwrap();
        assert_eq!(&id, b"YADD");
        assert_eq!(payload.len(), 0);
    }

    #[test]
    fn odd_payloads_are_padded_to_even_length() {
        let mut written = Vec::new();
        write_chunk(&mut written, b"YINF", &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(written, b"YINF\x00\x00\x00\x04\x01\x02\x03\x00");

        let (id, payload) = read_chunk_common(&mut Cursor::new(&written))
            .unwrap()
            .unwrap();
        assert_eq!(&id, b"YINF");
        assert_eq!(payload, [0x01, 0x02, 0x03, 0x00]);
    }

    #[test]
    fn sentinel_and_short_reads_terminate_iteration() {
        let mut reader = Cursor::new(&END_OF_FILE_MARK[..]);
        assert!(read_chunk_common(&mut reader).unwrap().is_none());

        let mut reader = Cursor::new(&[][..]);
        assert!(read_chunk_common(&mut reader).unwrap().is_none());

        let mut reader = Cursor::new(&b"YIN"[..]);
        assert!(read_chunk_common(&mut reader).unwrap().is_none());
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn seek_and_index_walk_the_stream() {
        let mut stream = Vec::new();
        write_chunk(&mut stream, b"AAAA", &[0u8; 4]).unwrap();
        write_chunk(&mut stream, b"BBBB", &[0u8; 2]).unwrap();
        stream.extend_from_slice(&END_OF_FILE_MARK);

        let mut reader = Cursor::new(&stream);
        let header = seek_chunk_header(&mut reader, Some(*b"BBBB")).unwrap();
        assert_eq!(header, Some((*b"BBBB", 2)));
        assert_eq!(reader.position(), 12);

        let mut reader = Cursor::new(&stream);
        let index = index_chunks(&mut reader).unwrap();
        assert_eq!(index, vec![(0, 12, *b"AAAA"), (12, 10, *b"BBBB")]);
    }

    #[test]
    fn unknown_ids_stay_generic() {
        let mut stream = Vec::new();
        write_chunk(&mut stream, b"YXYZ", &[0xAA, 0xBB]).unwrap();
        let chunk = OkdChunk::read(&mut Cursor::new(&stream)).unwrap().unwrap();
        match chunk {
            OkdChunk::Generic(generic) => {
                assert_eq!(&generic.id, b"YXYZ");
                assert_eq!(generic.payload, [0xAA, 0xBB]);
            }
            other => panic!("expected generic chunk, got {other:?}"),
        }
    }
}
