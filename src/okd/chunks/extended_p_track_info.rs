//! Extended P-track information (`YPXI`), the wide-attribute flavor.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::dtype::OkdError;

use super::p_track_info::{TrackInfoEntry, TrackStatus};
use super::{write_chunk, GenericChunk};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPTrackInfoChannelInfoEntry {
    /// 16-bit attribute, stored little-endian unlike everything around it.
    pub attribute: u16,
    pub ports: u16,
    pub unknown_0: u16,
    pub control_change_ax: u8,
    pub control_change_cx: u8,
}

impl ExtendedPTrackInfoChannelInfoEntry {
    pub fn read<R: Read>(reader: &mut R) -> Result<ExtendedPTrackInfoChannelInfoEntry, OkdError> {
        let mut buffer = [0u8; 8];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        Ok(ExtendedPTrackInfoChannelInfoEntry {
            attribute: u16::from_le_bytes([buffer[0], buffer[1]]),
            ports: u16::from_be_bytes([buffer[2], buffer[3]]),
            unknown_0: u16::from_be_bytes([buffer[4], buffer[5]]),
            control_change_ax: buffer[6],
            control_change_cx: buffer[7],
        })
    }

    pub fn is_chorus(&self) -> bool {
        self.attribute & 0x0080 != 0x0080
    }

    pub fn is_guide_melody(&self) -> bool {
        self.attribute & 0x0100 == 0x0100
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_u16::<LittleEndian>(self.attribute)?;
        writer.write_u16::<BigEndian>(self.ports)?;
        writer.write_u16::<BigEndian>(self.unknown_0)?;
        writer.write_u8(self.control_change_ax)?;
        writer.write_u8(self.control_change_cx)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPTrackInfoEntry {
    pub track_number: u8,
    pub track_status: u8,
    pub unused_0: u16,
    pub default_channel_groups: Vec<u16>,
    pub channel_groups: Vec<u16>,
    pub channel_info: Vec<ExtendedPTrackInfoChannelInfoEntry>,
    pub system_ex_ports: u16,
    pub unknown_0: u16,
}

impl ExtendedPTrackInfoEntry {
    pub fn read<R: Read>(reader: &mut R) -> Result<ExtendedPTrackInfoEntry, OkdError> {
        let mut buffer = [0u8; 68];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        let track_number = buffer[0];
        let track_status = buffer[1];
        let unused_0 = u16::from_be_bytes([buffer[2], buffer[3]]);

        let mut default_channel_groups = Vec::with_capacity(16);
        for channel in 0..16 {
            let offset = 4 + 2 * channel;
            default_channel_groups.push(u16::from_be_bytes([
                buffer[offset],
                buffer[offset + 1],
            ]));
        }

        let mut channel_groups = Vec::with_capacity(16);
        for channel in 0..16 {
            let offset = 36 + 2 * channel;
            channel_groups.push(u16::from_be_bytes([buffer[offset], buffer[offset + 1]]));
        }

        let mut channel_info = Vec::with_capacity(16);
        for _ in 0..16 {
            channel_info.push(ExtendedPTrackInfoChannelInfoEntry::read(reader)?);
        }

        let system_ex_ports = reader
            .read_u16::<BigEndian>()
            .map_err(|_| OkdError::ShortRead)?;
        let unknown_0 = reader
            .read_u16::<BigEndian>()
            .map_err(|_| OkdError::ShortRead)?;

        Ok(ExtendedPTrackInfoEntry {
            track_number,
            track_status,
            unused_0,
            default_channel_groups,
            channel_groups,
            channel_info,
            system_ex_ports,
            unknown_0,
        })
    }

    pub fn is_lossless_track(&self) -> bool {
        TrackStatus::from_bits_retain(self.track_status).contains(TrackStatus::LOSSLESS)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_u8(self.track_number)?;
        writer.write_u8(self.track_status)?;
        writer.write_u16::<BigEndian>(self.unused_0)?;
        for &default_channel_group in &self.default_channel_groups {
            writer.write_u16::<BigEndian>(default_channel_group)?;
        }
        for &channel_group in &self.channel_groups {
            writer.write_u16::<BigEndian>(channel_group)?;
        }
        for channel_info_entry in &self.channel_info {
            channel_info_entry.write(writer)?;
        }
        writer.write_u16::<BigEndian>(self.system_ex_ports)?;
        writer.write_u16::<BigEndian>(self.unknown_0)?;
        Ok(())
    }
}

impl TrackInfoEntry for ExtendedPTrackInfoEntry {
    fn track_number(&self) -> u8 {
        self.track_number
    }
    fn is_lossless_track(&self) -> bool {
        self.is_lossless_track()
    }
    fn system_ex_ports(&self) -> u16 {
        self.system_ex_ports
    }
    fn default_channel_group(&self, channel: usize) -> u16 {
        self.default_channel_groups[channel]
    }
    fn channel_group(&self, channel: usize) -> u16 {
        self.channel_groups[channel]
    }
    fn channel_ports(&self, channel: usize) -> u16 {
        self.channel_info[channel].ports
    }
    fn control_change_ax(&self, channel: usize) -> u8 {
        self.channel_info[channel].control_change_ax
    }
    fn control_change_cx(&self, channel: usize) -> u8 {
        self.channel_info[channel].control_change_cx
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedPTrackInfoChunk {
    #[serde(skip, default = "ExtendedPTrackInfoChunk::default_id")]
    pub id: [u8; 4],
    pub unknown_0: Vec<u8>,
    pub tg_mode: u16,
    pub data: Vec<ExtendedPTrackInfoEntry>,
}

impl ExtendedPTrackInfoChunk {
    fn default_id() -> [u8; 4] {
        *b"YPXI"
    }

    pub fn from_generic(generic: &GenericChunk) -> Result<ExtendedPTrackInfoChunk, OkdError> {
        if generic.payload.len() < 12 {
            return Err(OkdError::ShortRead);
        }
        let unknown_0 = generic.payload[0..8].to_vec();
        let tg_mode = u16::from_be_bytes([generic.payload[8], generic.payload[9]]);
        let entry_count = u16::from_be_bytes([generic.payload[10], generic.payload[11]]);
        let mut reader = Cursor::new(&generic.payload[12..]);
        let mut data = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            data.push(ExtendedPTrackInfoEntry::read(&mut reader)?);
        }
        Ok(ExtendedPTrackInfoChunk {
            id: generic.id,
            unknown_0,
            tg_mode,
            data,
        })
    }

    pub fn payload_buffer(&self) -> Result<Vec<u8>, OkdError> {
        let mut buffer = self.unknown_0.clone();
        buffer.write_u16::<BigEndian>(self.tg_mode)?;
        buffer.write_u16::<BigEndian>(self.data.len() as u16)?;
        for entry in &self.data {
            entry.write(&mut buffer)?;
        }
        Ok(buffer)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_chunk(writer, &self.id, &self.payload_buffer()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(track_number: u8) -> ExtendedPTrackInfoEntry {
        ExtendedPTrackInfoEntry {
            track_number,
            track_status: 0x40,
            unused_0: 0,
            default_channel_groups: (0..16).map(|channel| channel as u16).collect(),
            channel_groups: vec![0x0101; 16],
            channel_info: (0..16)
                .map(|channel| ExtendedPTrackInfoChannelInfoEntry {
                    attribute: 0x0180,
                    ports: 0x0003,
                    unknown_0: 0,
                    control_change_ax: channel,
                    control_change_cx: channel + 0x40,
                })
                .collect(),
            system_ex_ports: 0x0005,
            unknown_0: 0,
        }
    }

    #[test]
    fn entry_round_trip() {
        let entry = sample_entry(3);
        let mut written = Vec::new();
        entry.write(&mut written).unwrap();
        assert_eq!(written.len(), 68 + 16 * 8 + 4);
        let read_back = ExtendedPTrackInfoEntry::read(&mut Cursor::new(&written)).unwrap();
        assert_eq!(read_back, entry);
    }

    #[test]
    fn channel_attribute_is_little_endian() {
        let entry = sample_entry(0);
        let mut written = Vec::new();
        entry.channel_info[0].write(&mut written).unwrap();
        assert_eq!(&written[0..2], &[0x80, 0x01]);
        assert_eq!(&written[2..4], &[0x00, 0x03]);
    }

    #[test]
    fn chunk_round_trip() {
        let chunk = ExtendedPTrackInfoChunk {
            id: *b"YPXI",
            unknown_0: vec![0u8; 8],
            tg_mode: 1,
            data: vec![sample_entry(0), sample_entry(1), sample_entry(3)],
        };
        let generic = GenericChunk {
            id: *b"YPXI",
            payload: chunk.payload_buffer().unwrap(),
        };
        assert_eq!(ExtendedPTrackInfoChunk::from_generic(&generic).unwrap(), chunk);
    }

    #[test]
    fn wide_attribute_bits() {
        let entry = sample_entry(0);
        assert!(!entry.channel_info[0].is_chorus());
        assert!(entry.channel_info[0].is_guide_melody());
    }
}
