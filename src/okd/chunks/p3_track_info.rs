//! P3-track information (`YP3I`): a single routing entry inlined into the
//! chunk body.

use std::io::{Cursor, Read, Write};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::dtype::OkdError;

use super::p_track_info::{PTrackInfoChannelInfoEntry, TrackInfoEntry, TrackStatus};
use super::{write_chunk, GenericChunk};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct P3TrackInfoChunk {
    #[serde(skip, default = "P3TrackInfoChunk::default_id")]
    pub id: [u8; 4],
    pub track_number: u8,
    pub track_status: u8,
    pub use_channel_group_flag: u16,
    pub default_channel_groups: Vec<u16>,
    pub channel_groups: Vec<u16>,
    pub channel_info: Vec<PTrackInfoChannelInfoEntry>,
    pub system_ex_ports: u16,
}

impl P3TrackInfoChunk {
    fn default_id() -> [u8; 4] {
        *b"YP3I"
    }

    pub fn from_generic(generic: &GenericChunk) -> Result<P3TrackInfoChunk, OkdError> {
        let mut reader = Cursor::new(&generic.payload[..]);

        let mut buffer = [0u8; 4];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        let track_number = buffer[0];
        let track_status = buffer[1];
        let use_channel_group_flag = u16::from_be_bytes([buffer[2], buffer[3]]);

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
            channel_info.push(PTrackInfoChannelInfoEntry::read(&mut reader)?);
        }

        // Stored big-endian on read but little-endian on write.
        let system_ex_ports = reader
            .read_u16::<BigEndian>()
            .map_err(|_| OkdError::ShortRead)?;

        Ok(P3TrackInfoChunk {
            id: generic.id,
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

    pub fn payload_buffer(&self) -> Result<Vec<u8>, OkdError> {
        let mut buffer = Vec::new();
        buffer.write_u8(self.track_number)?;
        buffer.write_u8(self.track_status)?;
        buffer.write_u16::<BigEndian>(self.use_channel_group_flag)?;
        for (channel, &default_channel_group) in self.default_channel_groups.iter().enumerate() {
            if (self.use_channel_group_flag >> channel) & 0x0001 != 0x0001 {
                continue;
            }
            buffer.write_u16::<BigEndian>(default_channel_group)?;
        }
        for &channel_group in &self.channel_groups {
            buffer.write_u16::<BigEndian>(channel_group)?;
        }
        for channel_info_entry in &self.channel_info {
            channel_info_entry.write(&mut buffer)?;
        }
        buffer.write_u16::<LittleEndian>(self.system_ex_ports)?;
        Ok(buffer)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_chunk(writer, &self.id, &self.payload_buffer()?)
    }
}

impl TrackInfoEntry for P3TrackInfoChunk {
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
