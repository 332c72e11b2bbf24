//! P-track information: per-track port and channel-group routing tables.

use std::io::{Cursor, Read, Write};

use bitflags::bitflags;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::dtype::OkdError;

use super::{write_chunk, GenericChunk};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TrackStatus: u8 {
        /// Durations of a lossless track are stored unscaled.
        const LOSSLESS = 0x80;
    }
}

/// Routing information common to all three P-track info flavors, as consumed
/// by the channel fan-out engine.
pub trait TrackInfoEntry {
    fn track_number(&self) -> u8;
    fn is_lossless_track(&self) -> bool;
    fn system_ex_ports(&self) -> u16;
    fn default_channel_group(&self, channel: usize) -> u16;
    fn channel_group(&self, channel: usize) -> u16;
    fn channel_ports(&self, channel: usize) -> u16;
    fn control_change_ax(&self, channel: usize) -> u8;
    fn control_change_cx(&self, channel: usize) -> u8;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTrackInfoChannelInfoEntry {
    pub attribute: u8,
    pub ports: u8,
    pub control_change_ax: u8,
    pub control_change_cx: u8,
}

impl PTrackInfoChannelInfoEntry {
    pub fn read<R: Read>(reader: &mut R) -> Result<PTrackInfoChannelInfoEntry, OkdError> {
        let mut buffer = [0u8; 4];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        Ok(PTrackInfoChannelInfoEntry {
            attribute: buffer[0],
            ports: buffer[1],
            control_change_ax: buffer[2],
            control_change_cx: buffer[3],
        })
    }

    pub fn is_chorus(&self) -> bool {
        self.attribute & 0x01 != 0x01
    }

    pub fn is_guide_melody(&self) -> bool {
        self.attribute & 0x80 != 0x80
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_u8(self.attribute)?;
        writer.write_u8(self.ports)?;
        writer.write_u8(self.control_change_ax)?;
        writer.write_u8(self.control_change_cx)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTrackInfoEntry {
    pub track_number: u8,
    pub track_status: u8,
    pub use_channel_group_flag: u16,
    pub default_channel_groups: Vec<u16>,
    pub channel_groups: Vec<u16>,
    pub channel_info: Vec<PTrackInfoChannelInfoEntry>,
    pub system_ex_ports: u16,
}

impl PTrackInfoEntry {
    pub fn read<R: Read>(reader: &mut R) -> Result<PTrackInfoEntry, OkdError> {
        let mut buffer = [0u8; 4];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        let track_number = buffer[0];
        let track_status = buffer[1];
        let use_channel_group_flag = u16::from_be_bytes([buffer[2], buffer[3]]);

        // Default channel group slots exist in the stream only where the
        // flag bit is set; the rest read back as zero.
        let mut default_channel_groups = Vec::with_capacity(16);
        for channel in 0..16 {
            if (use_channel_group_flag >> channel) & 0x0001 == 0x0001 {
                let group = reader
                    .read_u16::<BigEndian>()
                    .map_err(|_| OkdError::ShortRead)?;
                default_channel_groups.push(group);
            } else {
                default_channel_groups.push(0x0000);
            }
        }

        let mut channel_groups = Vec::with_capacity(16);
        for _ in 0..16 {
            channel_groups.push(
                reader
                    .read_u16::<BigEndian>()
                    .map_err(|_| OkdError::ShortRead)?,
            );
        }

        let mut channel_info = Vec::with_capacity(16);
        for _ in 0..16 {
            channel_info.push(PTrackInfoChannelInfoEntry::read(reader)?);
        }

        let system_ex_ports = reader
            .read_u16::<LittleEndian>()
            .map_err(|_| OkdError::ShortRead)?;

        Ok(PTrackInfoEntry {
            track_number,
            track_status,
            use_channel_group_flag,
            default_channel_groups,
            channel_groups,
            channel_info,
            system_ex_ports,
        })
    }

    pub fn is_lossless_track(&self) -> bool {
        TrackStatus::from_bits_retain(self.track_status).contains(TrackStatus::LOSSLESS)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        writer.write_u8(self.track_number)?;
        writer.write_u8(self.track_status)?;
        writer.write_u16::<BigEndian>(self.use_channel_group_flag)?;
        for (channel, &default_channel_group) in self.default_channel_groups.iter().enumerate() {
            if (self.use_channel_group_flag >> channel) & 0x0001 != 0x0001 {
                continue;
            }
            writer.write_u16::<BigEndian>(default_channel_group)?;
        }
        for &channel_group in &self.channel_groups {
            writer.write_u16::<BigEndian>(channel_group)?;
        }
        for channel_info_entry in &self.channel_info {
            channel_info_entry.write(writer)?;
        }
        writer.write_u16::<LittleEndian>(self.system_ex_ports)?;
        Ok(())
    }
}

impl TrackInfoEntry for PTrackInfoEntry {
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
        self.channel_info[channel].ports as u16
    }
    fn control_change_ax(&self, channel: usize) -> u8 {
        self.channel_info[channel].control_change_ax
    }
    fn control_change_cx(&self, channel: usize) -> u8 {
        self.channel_info[channel].control_change_cx
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTrackInfoChunk {
    #[serde(skip, default = "PTrackInfoChunk::default_id")]
    pub id: [u8; 4],
    pub data: Vec<PTrackInfoEntry>,
}

impl PTrackInfoChunk {
    fn default_id() -> [u8; 4] {
        *b"YPTI"
    }

    pub fn from_generic(generic: &GenericChunk) -> Result<PTrackInfoChunk, OkdError> {
        if generic.payload.len() < 2 {
            return Err(OkdError::ShortRead);
        }
        let entry_count = u16::from_be_bytes([generic.payload[0], generic.payload[1]]);
        let mut reader = Cursor::new(&generic.payload[2..]);
        let mut data = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            data.push(PTrackInfoEntry::read(&mut reader)?);
        }
        Ok(PTrackInfoChunk {
            id: generic.id,
            data,
        })
    }

    pub fn payload_buffer(&self) -> Result<Vec<u8>, OkdError> {
        let mut buffer = Vec::new();
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

    pub(crate) fn entry_with_groups(
        track_number: u8,
        use_channel_group_flag: u16,
    ) -> PTrackInfoEntry {
        let mut default_channel_groups = vec![0u16; 16];
        for channel in 0..16 {
            if (use_channel_group_flag >> channel) & 1 == 1 {
                default_channel_groups[channel] = 0x0003 << (channel % 8);
            }
        }
        PTrackInfoEntry {
            track_number,
            track_status: 0x40,
            use_channel_group_flag,
            default_channel_groups,
            channel_groups: (0..16).map(|channel| 1 << channel).collect(),
            channel_info: (0..16)
                .map(|channel| PTrackInfoChannelInfoEntry {
                    attribute: 0xFF,
                    ports: 0x01,
                    control_change_ax: 0x10 + channel,
                    control_change_cx: 0x20 + channel,
                })
                .collect(),
            system_ex_ports: 0x0001,
        }
    }

    #[test]
    fn entry_round_trip_with_gated_slots() {
        for flag in [0x0000u16, 0x0005, 0xFFFF] {
            let entry = entry_with_groups(1, flag);
            let mut written = Vec::new();
            entry.write(&mut written).unwrap();

            // Only flagged slots occupy stream bytes.
            let expected_len = 4 + 2 * flag.count_ones() as usize + 32 + 64 + 2;
            assert_eq!(written.len(), expected_len);

            let read_back = PTrackInfoEntry::read(&mut Cursor::new(&written)).unwrap();
            assert_eq!(read_back, entry);
        }
    }

    #[test]
    fn system_ex_ports_are_little_endian() {
        let mut entry = entry_with_groups(0, 0x0000);
        entry.system_ex_ports = 0x0102;
        let mut written = Vec::new();
        entry.write(&mut written).unwrap();
        assert_eq!(&written[written.len() - 2..], &[0x02, 0x01]);
    }

    #[test]
    fn chunk_round_trip() {
        let chunk = PTrackInfoChunk {
            id: *b"YPTI",
            data: vec![entry_with_groups(0, 0x0000), entry_with_groups(1, 0x0021)],
        };
        let payload = chunk.payload_buffer().unwrap();
        let generic = GenericChunk {
            id: *b"YPTI",
            payload,
        };
        assert_eq!(PTrackInfoChunk::from_generic(&generic).unwrap(), chunk);
    }

    #[test]
    fn json_round_trip_is_keyed_by_field_names() {
        let entry = entry_with_groups(2, 0x0003);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"track_number\":2"));
        assert!(json.contains("\"use_channel_group_flag\":3"));
        let back: PTrackInfoEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn lossless_flag_lives_in_the_status_high_bit() {
        let mut entry = entry_with_groups(0, 0);
        assert!(!entry.is_lossless_track());
        entry.track_status = 0xC0;
        assert!(entry.is_lossless_track());
    }

    #[test]
    fn attribute_bits() {
        let entry = PTrackInfoChannelInfoEntry {
            attribute: 0x00,
            ports: 0,
            control_change_ax: 0,
            control_change_cx: 0,
        };
        assert!(entry.is_chorus());
        assert!(entry.is_guide_melody());
        let entry = PTrackInfoChannelInfoEntry {
            attribute: 0x81,
            ..entry
        };
        assert!(!entry.is_chorus());
        assert!(!entry.is_guide_melody());
    }
}
