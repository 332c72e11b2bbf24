//! P-track: delta-timed channel-voice events with the duration-following
//! convention, and the channel fan-out engine that expands each stored event
//! to its (port, channel) destinations.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::WriteBytesExt;
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::dtype::OkdError;
use crate::okd::midi::{
    is_data_bytes, read_extended_variable_int, read_status_byte, read_variable_int,
    write_extended_variable_int, write_variable_int,
};
use crate::peek_byte;

use super::p_track_info::TrackInfoEntry;
use super::{write_chunk, GenericChunk, PTrackInfo};

const END_OF_TRACK_MARK: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Data byte counts of the system statuses that are not SysEx and carry no
/// compensation prefix.
static SYSTEM_DATA_LENGTHS: phf::Map<u8, usize> = phf_map! {
    0xF8u8 => 3, // ADPCM note on
    0xF9u8 => 1, // Unknown
    0xFAu8 => 1, // ADPCM channel volume
    0xFDu8 => 0, // Enable channel grouping
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTrackEvent {
    pub delta_time: u64,
    pub status_byte: u8,
    pub data_bytes: Vec<u8>,
    /// Present iff the status high nibble is 0x80 or 0x90.
    pub duration: Option<u64>,
}

impl PTrackEvent {
    /// Read SysEx data bytes up to the `0xF7` terminator, which is included.
    fn read_sysex_data_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, OkdError> {
        let mut data_bytes = Vec::new();
        loop {
            let byte = {
                let mut buf = [0u8; 1];
                reader.read_exact(&mut buf).map_err(|_| OkdError::ShortRead)?;
                buf[0]
            };
            data_bytes.push(byte);
            if byte & 0x80 == 0x80 {
                if byte != 0xF7 {
                    return Err(OkdError::UnterminatedSysEx(byte));
                }
                break;
            }
        }
        Ok(data_bytes)
    }

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Option<PTrackEvent>, OkdError> {
        let delta_time = read_extended_variable_int(reader)?;

        let mut end_of_track = [0u8; 4];
        let n = reader.read(&mut end_of_track)?;
        if n == 0 || (n == 4 && end_of_track == END_OF_TRACK_MARK) {
            return Ok(None);
        }
        reader.seek(SeekFrom::Current(-(n as i64)))?;

        let status_byte = read_status_byte(reader)?;
        let status_type = status_byte & 0xF0;

        let data_bytes_length = match status_type {
            0x80 => 3, // Note off: note, on velocity, off velocity
            0x90 => 2, // Note on
            0xA0 => 1, // Alternative CC AX
            0xB0 => 2, // Control change
            0xC0 => 1, // Alternative CC CX
            0xD0 => 1, // Channel pressure
            0xE0 => 2, // Pitch bend
            _ => match status_byte {
                0xF0 => {
                    // SysEx message
                    let data_bytes = PTrackEvent::read_sysex_data_bytes(reader)?;
                    return Ok(Some(PTrackEvent {
                        delta_time,
                        status_byte,
                        data_bytes,
                        duration: None,
                    }));
                }
                0xFE => {
                    // Compensation of Alternative CC: the first data byte is
                    // the real status.
                    let byte = peek_byte!(reader).map_err(|_| OkdError::ShortRead)?;
                    match byte & 0xF0 {
                        0xA0 => 3, // Polyphonic key pressure
                        0xC0 => 2, // Program change
                        _ => return Err(OkdError::UnknownCompensation(byte)),
                    }
                }
                _ => *SYSTEM_DATA_LENGTHS
                    .get(&status_byte)
                    .ok_or(OkdError::UnknownStatus(status_byte))?,
            },
        };

        let mut data_bytes = vec![0u8; data_bytes_length];
        reader
            .read_exact(&mut data_bytes)
            .map_err(|_| OkdError::ShortRead)?;
        let data_bytes_validate = if status_byte == 0xFE {
            &data_bytes[1..]
        } else {
            &data_bytes[..]
        };
        if !is_data_bytes(data_bytes_validate) {
            let bad = data_bytes_validate
                .iter()
                .find(|&&byte| byte & 0x80 == 0x80)
                .copied()
                .unwrap_or(0);
            return Err(OkdError::BadStatusByte {
                byte: bad,
                expected: "data",
            });
        }

        let duration = if status_type == 0x80 || status_type == 0x90 {
            Some(read_variable_int(reader)?)
        } else {
            None
        };

        Ok(Some(PTrackEvent {
            delta_time,
            status_byte,
            data_bytes,
            duration,
        }))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_extended_variable_int(writer, self.delta_time)?;
        writer.write_u8(self.status_byte)?;
        writer.write_all(&self.data_bytes)?;
        if let Some(duration) = self.duration {
            write_variable_int(writer, duration)?;
        }
        Ok(())
    }

    pub fn status_byte_type(&self) -> u8 {
        self.status_byte & 0xF0
    }

    pub fn channel(&self) -> u8 {
        self.status_byte & 0x0F
    }
}

/// A stored event expanded to one concrete destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PTrackAbsoluteTimeEvent {
    pub status_byte: u8,
    pub data_bytes: Vec<u8>,
    pub port: u8,
    pub track: usize,
    pub time: i64,
}

impl PTrackAbsoluteTimeEvent {
    pub fn status_byte_type(&self) -> u8 {
        self.status_byte & 0xF0
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![self.status_byte];
        bytes.extend_from_slice(&self.data_bytes);
        bytes
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PTrackChunk {
    #[serde(skip, default = "PTrackChunk::default_id")]
    pub id: [u8; 4],
    pub events: Vec<PTrackEvent>,
}

impl PTrackChunk {
    pub const PORTS: usize = 4;
    pub const CHANNELS_PER_PORT: usize = 16;
    pub const TOTAL_CHANNELS: usize = PTrackChunk::CHANNELS_PER_PORT * PTrackChunk::PORTS;

    /// Destination port of each P-track chunk number.
    pub const CHUNK_NUMBER_PORT_MAP: [u8; 5] = [0, 1, 2, 2, 3];

    fn default_id() -> [u8; 4] {
        *b"\xffPR\x00"
    }

    pub fn new(id: [u8; 4], events: Vec<PTrackEvent>) -> PTrackChunk {
        PTrackChunk { id, events }
    }

    pub fn from_generic(generic: &GenericChunk) -> Result<PTrackChunk, OkdError> {
        let mut reader = Cursor::new(&generic.payload[..]);
        let mut events = Vec::new();
        while let Some(event) = PTrackEvent::read(&mut reader)? {
            events.push(event);
        }
        Ok(PTrackChunk {
            id: generic.id,
            events,
        })
    }

    pub fn track_number(&self) -> u8 {
        self.id[3]
    }

    /// Whether any channel-voice event addresses the given channel.
    pub fn exists_channel_message(&self, channel: u8) -> bool {
        self.events.iter().any(|event| {
            event.status_byte_type() != 0xF0 && event.channel() == channel
        })
    }

    pub fn payload_buffer(&self) -> Result<Vec<u8>, OkdError> {
        let mut buffer = Vec::new();
        for event in &self.events {
            event.write(&mut buffer)?;
        }
        Ok(buffer)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_chunk(writer, &self.id, &self.payload_buffer()?)
    }

    /// Expand one event to its destinations per the info entry's bitmasks.
    fn relocate_event(
        track_info_entry: &dyn TrackInfoEntry,
        status_byte: u8,
        data_bytes: &[u8],
        time: i64,
        group_channel: bool,
    ) -> Vec<PTrackAbsoluteTimeEvent> {
        let mut status_byte = status_byte;
        let mut data_bytes = data_bytes;
        let mut status_type = status_byte & 0xF0;

        if status_byte == 0xFE {
            // Compensation of Alternative CC
            status_byte = data_bytes[0];
            status_type = status_byte & 0xF0;
            data_bytes = &data_bytes[1..];
        }

        let mut relocated_events = Vec::new();

        if status_type == 0xF0 {
            // System messages go to the head track of each flagged port.
            for port in 0..PTrackChunk::PORTS {
                if (track_info_entry.system_ex_ports() >> port) & 0x0001 != 0x0001 {
                    continue;
                }
                let track = port * PTrackChunk::CHANNELS_PER_PORT;
                relocated_events.push(PTrackAbsoluteTimeEvent {
                    status_byte,
                    data_bytes: data_bytes.to_vec(),
                    port: port as u8,
                    track,
                    time,
                });
            }
            return relocated_events;
        }

        let channel = (status_byte & 0x0F) as usize;

        let mut default_channel_group = track_info_entry.default_channel_group(channel);
        if default_channel_group == 0x0000 {
            default_channel_group = 0x0001 << channel;
        }

        for port in 0..PTrackChunk::PORTS {
            if (track_info_entry.channel_ports(channel) >> port) & 0x0001 != 0x0001 {
                continue;
            }

            for grouped_channel in 0..PTrackChunk::CHANNELS_PER_PORT {
                if group_channel {
                    if (track_info_entry.channel_group(channel) >> grouped_channel) & 0x0001
                        != 0x0001
                    {
                        continue;
                    }
                } else if (default_channel_group >> grouped_channel) & 0x0001 != 0x0001 {
                    continue;
                }

                let track = port * PTrackChunk::CHANNELS_PER_PORT + grouped_channel;
                relocated_events.push(PTrackAbsoluteTimeEvent {
                    status_byte: status_type | grouped_channel as u8,
                    data_bytes: data_bytes.to_vec(),
                    port: port as u8,
                    track,
                    time,
                });
            }
        }

        relocated_events
    }

    /// Expand the stored event stream to a time-sorted absolute event list.
    pub fn absolute_time_track(
        &self,
        track_info: &PTrackInfo,
    ) -> Result<Vec<PTrackAbsoluteTimeEvent>, OkdError> {
        let track_info_entry = track_info
            .entry_for_track(self.track_number())
            .ok_or(OkdError::MissingChunk("P-Track info entry"))?;

        let is_lossless_track = track_info_entry.is_lossless_track();

        let mut absolute_time_track: Vec<PTrackAbsoluteTimeEvent> = Vec::new();
        let mut absolute_time: i64 = 0;
        let mut channel_grouping_enabled = false;
        for event in &self.events {
            absolute_time += event.delta_time as i64;

            match event.status_byte_type() {
                0x80 => {
                    let channel = event.channel();
                    let note_number = event.data_bytes[0];
                    let note_on_velocity = event.data_bytes[1];
                    let note_off_velocity = event.data_bytes[2];
                    let mut duration = event.duration.unwrap_or(0) as i64;
                    if !is_lossless_track {
                        duration <<= 2;
                    }
                    // Note on
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        0x90 | channel,
                        &[note_number, note_on_velocity],
                        absolute_time,
                        channel_grouping_enabled,
                    ));
                    // Note off
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        0x80 | channel,
                        &[note_number, note_off_velocity],
                        absolute_time + duration,
                        channel_grouping_enabled,
                    ));
                }
                0x90 => {
                    let channel = event.channel();
                    let note_number = event.data_bytes[0];
                    let mut duration = event.duration.unwrap_or(0) as i64;
                    if !is_lossless_track {
                        duration <<= 2;
                    }
                    // Note on
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        event.status_byte,
                        &event.data_bytes,
                        absolute_time,
                        channel_grouping_enabled,
                    ));
                    // Synthesized note off
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        0x80 | channel,
                        &[note_number, 0x40],
                        absolute_time + duration,
                        channel_grouping_enabled,
                    ));
                }
                0xA0 => {
                    let channel = event.channel();
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        0xB0 | channel,
                        &[
                            track_info_entry.control_change_ax(channel as usize),
                            event.data_bytes[0],
                        ],
                        absolute_time,
                        channel_grouping_enabled,
                    ));
                }
                0xC0 => {
                    let channel = event.channel();
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        0xB0 | channel,
                        &[
                            track_info_entry.control_change_cx(channel as usize),
                            event.data_bytes[0],
                        ],
                        absolute_time,
                        channel_grouping_enabled,
                    ));
                }
                _ => {
                    absolute_time_track.extend(PTrackChunk::relocate_event(
                        track_info_entry,
                        event.status_byte,
                        &event.data_bytes,
                        absolute_time,
                        channel_grouping_enabled,
                    ));
                }
            }

            // 0xFD arms channel grouping for exactly the next event.
            channel_grouping_enabled = event.status_byte == 0xFD;
        }

        absolute_time_track.sort_by_key(|absolute_time_event| absolute_time_event.time);

        Ok(absolute_time_track)
    }
}

#[cfg(test)]
mod tests {
    use super::super::p_track_info::{PTrackInfoChannelInfoEntry, PTrackInfoChunk, PTrackInfoEntry};
    use super::*;

    fn plain_entry(track_number: u8, track_status: u8) -> PTrackInfoEntry {
        PTrackInfoEntry {
            track_number,
            track_status,
            use_channel_group_flag: 0,
            default_channel_groups: vec![0u16; 16],
            channel_groups: vec![0u16; 16],
            channel_info: (0..16)
                .map(|_| PTrackInfoChannelInfoEntry {
                    attribute: 0xFF,
                    ports: 0x01,
                    control_change_ax: 0x10,
                    control_change_cx: 0x11,
                })
                .collect(),
            system_ex_ports: 0x0001,
        }
    }

    fn info(entry: PTrackInfoEntry) -> PTrackInfo {
        PTrackInfo::Standard(PTrackInfoChunk {
            id: *b"YPTI",
            data: vec![entry],
        })
    }

    fn chunk(events: Vec<PTrackEvent>) -> PTrackChunk {
        PTrackChunk::new(*b"\xffPR\x00", events)
    }

    fn event(
        delta_time: u64,
        status_byte: u8,
        data_bytes: &[u8],
        duration: Option<u64>,
    ) -> PTrackEvent {
        PTrackEvent {
            delta_time,
            status_byte,
            data_bytes: data_bytes.to_vec(),
            duration,
        }
    }

    #[test]
    fn stream_round_trip() {
        let chunk = chunk(vec![
            event(0, 0x90, &[0x3C, 0x64], Some(100)),
            event(100, 0x80, &[0x3C, 0x64, 0x40], Some(25)),
            event(0, 0xA0, &[0x55], None),
            event(0, 0xC0, &[0x21], None),
            event(50, 0xB0, &[0x07, 0x64], None),
            event(0, 0xE0, &[0x00, 0x40], None),
            event(0, 0xF0, &[0x43, 0x10, 0x4C, 0xF7], None),
            event(0, 0xF8, &[0x01, 0x02, 0x03], None),
            event(0, 0xFD, &[], None),
            event(0, 0xFE, &[0xC5, 0x42], None),
        ]);
        let mut payload = chunk.payload_buffer().unwrap();
        payload.extend_from_slice(&END_OF_TRACK_MARK);
        let generic = GenericChunk {
            id: *b"\xffPR\x00",
            payload,
        };
        assert_eq!(PTrackChunk::from_generic(&generic).unwrap(), chunk);
    }

    #[test]
    fn sysex_requires_the_f7_terminator() {
        let mut reader = Cursor::new(&[0xF0, 0x43, 0x10, 0xFE][..]);
        assert!(matches!(
            PTrackEvent::read(&mut reader),
            Err(OkdError::UnterminatedSysEx(0xFE))
        ));
    }

    #[test]
    fn unknown_compensation_is_rejected() {
        let mut reader = Cursor::new(&[0xFE, 0x95, 0x00][..]);
        assert!(matches!(
            PTrackEvent::read(&mut reader),
            Err(OkdError::UnknownCompensation(0x95))
        ));
    }

    #[test]
    fn compensation_keeps_its_prefix_and_embedded_status() {
        let mut reader = Cursor::new(&[0xFE, 0xA3, 0x40, 0x22, 0x00, 0x00, 0x00, 0x00][..]);
        let event = PTrackEvent::read(&mut reader).unwrap().unwrap();
        assert_eq!(event.status_byte, 0xFE);
        assert_eq!(event.data_bytes, [0xA3, 0x40, 0x22]);
        assert_eq!(event.duration, None);
    }

    #[test]
    fn duration_shift_on_regular_and_lossless_tracks() {
        let stored = chunk(vec![event(0, 0x90, &[0x3C, 0x64], Some(100))]);

        let regular = info(plain_entry(0, 0x00));
        let events = stored.absolute_time_track(&regular).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status_byte, 0x90);
        assert_eq!(events[0].time, 0);
        assert_eq!(events[1].status_byte, 0x80);
        assert_eq!(events[1].data_bytes, [0x3C, 0x40]);
        assert_eq!(events[1].time, 400);

        let lossless = info(plain_entry(0, 0x80));
        let events = stored.absolute_time_track(&lossless).unwrap();
        assert_eq!(events[1].time, 100);
    }

    #[test]
    fn explicit_note_off_events_carry_velocities() {
        let stored = chunk(vec![event(10, 0x80, &[0x3C, 0x64, 0x23], Some(10))]);
        let events = stored
            .absolute_time_track(&info(plain_entry(0, 0x00)))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status_byte, 0x90);
        assert_eq!(events[0].data_bytes, [0x3C, 0x64]);
        assert_eq!(events[0].time, 10);
        assert_eq!(events[1].status_byte, 0x80);
        assert_eq!(events[1].data_bytes, [0x3C, 0x23]);
        assert_eq!(events[1].time, 50);
    }

    #[test]
    fn alternative_cc_remaps_to_the_info_controllers() {
        let stored = chunk(vec![
            event(0, 0xA2, &[0x55], None),
            event(0, 0xC2, &[0x2A], None),
        ]);
        let events = stored
            .absolute_time_track(&info(plain_entry(0, 0x00)))
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status_byte, 0xB2);
        assert_eq!(events[0].data_bytes, [0x10, 0x55]);
        assert_eq!(events[1].status_byte, 0xB2);
        assert_eq!(events[1].data_bytes, [0x11, 0x2A]);
    }

    #[test]
    fn fan_out_follows_port_and_group_masks() {
        let mut entry = plain_entry(0, 0x00);
        entry.channel_info[2].ports = 0x05; // ports 0 and 2
        entry.default_channel_groups[2] = 0x0006; // channels 1 and 2
        let stored = chunk(vec![event(0, 0x92, &[0x40, 0x50], Some(1))]);
        let events = stored.absolute_time_track(&info(entry)).unwrap();

        let note_ons: Vec<_> = events
            .iter()
            .filter(|event| event.status_byte & 0xF0 == 0x90)
            .collect();
        assert_eq!(note_ons.len(), 4);
        let destinations: Vec<(u8, usize, u8)> = note_ons
            .iter()
            .map(|event| (event.port, event.track, event.status_byte))
            .collect();
        assert_eq!(
            destinations,
            vec![(0, 1, 0x91), (0, 2, 0x92), (2, 33, 0x91), (2, 34, 0x92)]
        );
        assert!(events.iter().all(|event| event.track < PTrackChunk::TOTAL_CHANNELS));
    }

    #[test]
    fn zero_default_group_falls_back_to_the_own_channel() {
        let stored = chunk(vec![event(0, 0x95, &[0x40, 0x50], Some(1))]);
        let events = stored
            .absolute_time_track(&info(plain_entry(0, 0x00)))
            .unwrap();
        assert_eq!(events[0].track, 5);
        assert_eq!(events[0].status_byte, 0x95);
    }

    #[test]
    fn channel_grouping_is_armed_for_one_event_only() {
        let mut entry = plain_entry(0, 0x00);
        entry.channel_groups[0] = 0x000C; // channels 2 and 3
        let stored = chunk(vec![
            event(0, 0xFD, &[], None),
            event(0, 0xB0, &[0x07, 0x7F], None),
            event(0, 0xB0, &[0x07, 0x7E], None),
        ]);
        let events = stored.absolute_time_track(&info(entry)).unwrap();

        let grouped: Vec<_> = events
            .iter()
            .filter(|event| event.data_bytes == [0x07, 0x7F])
            .collect();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].track, 2);
        assert_eq!(grouped[1].track, 3);

        let ungrouped: Vec<_> = events
            .iter()
            .filter(|event| event.data_bytes == [0x07, 0x7E])
            .collect();
        assert_eq!(ungrouped.len(), 1);
        assert_eq!(ungrouped[0].track, 0);
    }

    #[test]
    fn system_events_fan_out_to_sysex_ports() {
        let mut entry = plain_entry(0, 0x00);
        entry.system_ex_ports = 0x0005; // ports 0 and 2
        let stored = chunk(vec![event(0, 0xF0, &[0x43, 0xF7], None)]);
        let events = stored.absolute_time_track(&info(entry)).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].port, events[0].track), (0, 0));
        assert_eq!((events[1].port, events[1].track), (2, 32));
    }

    #[test]
    fn compensation_events_relocate_as_their_embedded_status() {
        let stored = chunk(vec![event(0, 0xFE, &[0xC4, 0x42], None)]);
        let events = stored
            .absolute_time_track(&info(plain_entry(0, 0x00)))
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status_byte, 0xC4);
        assert_eq!(events[0].data_bytes, [0x42]);
        assert_eq!(events[0].track, 4);
    }

    #[test]
    fn missing_info_entry_is_an_error() {
        let stored = PTrackChunk::new(*b"\xffPR\x01", vec![]);
        let result = stored.absolute_time_track(&info(plain_entry(0, 0x00)));
        assert!(matches!(result, Err(OkdError::MissingChunk(_))));
    }

    #[test]
    fn exists_channel_message_ignores_system_events() {
        let stored = chunk(vec![
            event(0, 0xF8, &[0x00, 0x00, 0x00], None),
            event(0, 0x93, &[0x40, 0x50], Some(1)),
        ]);
        assert!(stored.exists_channel_message(3));
        assert!(!stored.exists_channel_message(8));
    }
}
