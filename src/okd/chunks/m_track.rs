//! M-track: the master track of structural markers (beats, hooks, sections,
//! ADPCM gates) and its derived interpretation tables.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use phf::phf_map;
use serde::{Deserialize, Serialize};

use crate::dtype::OkdError;
use crate::okd::midi::{
    is_data_bytes, read_extended_variable_int, read_status_byte, write_extended_variable_int,
};

use super::{write_chunk, GenericChunk};

const END_OF_TRACK_MARK: [u8; 4] = [0x00, 0x00, 0x00, 0x00];

/// Data byte counts of the fixed-length marker statuses.
static MARKER_DATA_LENGTHS: phf::Map<u8, usize> = phf_map! {
    0xF1u8 => 0, // Strong beat
    0xF2u8 => 0, // Weak beat
    0xF3u8 => 1, // Hook section
    0xF4u8 => 1, // Visible Guide Melody page delimiter
    0xF5u8 => 0, // Two chorus fadeout position
    0xF6u8 => 1, // Playing section
    0xF8u8 => 1, // ADPCM playing section
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MTrackEvent {
    pub delta_time: u64,
    pub status_byte: u8,
    pub data_bytes: Vec<u8>,
}

impl MTrackEvent {
    /// Read SysEx data bytes up to the `0xFE` terminator, which is included.
    fn read_sysex_data_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, OkdError> {
        let mut data_bytes = Vec::new();
        loop {
            let byte = reader.read_u8().map_err(|_| OkdError::ShortRead)?;
            data_bytes.push(byte);
            if byte & 0x80 == 0x80 {
                if byte != 0xFE {
                    return Err(OkdError::UnterminatedSysEx(byte));
                }
                break;
            }
        }
        Ok(data_bytes)
    }

    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Option<MTrackEvent>, OkdError> {
        let delta_time = read_extended_variable_int(reader)?;

        let mut end_of_track = [0u8; 4];
        let n = reader.read(&mut end_of_track)?;
        if n == 0 || (n == 4 && end_of_track == END_OF_TRACK_MARK) {
            return Ok(None);
        }
        reader.seek(SeekFrom::Current(-(n as i64)))?;

        let status_byte = read_status_byte(reader)?;

        if status_byte == 0xFF {
            // SysEx message
            let data_bytes = MTrackEvent::read_sysex_data_bytes(reader)?;
            return Ok(Some(MTrackEvent {
                delta_time,
                status_byte,
                data_bytes,
            }));
        }

        let data_bytes_length = *MARKER_DATA_LENGTHS
            .get(&status_byte)
            .ok_or(OkdError::UnknownStatus(status_byte))?;

        let mut data_bytes = vec![0u8; data_bytes_length];
        reader
            .read_exact(&mut data_bytes)
            .map_err(|_| OkdError::ShortRead)?;
        if !is_data_bytes(&data_bytes) {
            return Err(OkdError::BadStatusByte {
                byte: data_bytes.iter().find(|&&byte| byte & 0x80 == 0x80).copied().unwrap_or(0),
                expected: "data",
            });
        }

        Ok(Some(MTrackEvent {
            delta_time,
            status_byte,
            data_bytes,
        }))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), OkdError> {
        write_extended_variable_int(writer, self.delta_time)?;
        writer.write_u8(self.status_byte)?;
        writer.write_all(&self.data_bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MTrackAbsoluteTimeEvent {
    pub status_byte: u8,
    pub data_bytes: Vec<u8>,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MTrackChunk {
    #[serde(skip, default = "MTrackChunk::default_id")]
    pub id: [u8; 4],
    pub events: Vec<MTrackEvent>,
}

impl MTrackChunk {
    fn default_id() -> [u8; 4] {
        *b"\xffMR\x00"
    }

    pub fn from_generic(generic: &GenericChunk) -> Result<MTrackChunk, OkdError> {
        let mut reader = Cursor::new(&generic.payload[..]);
        let mut events = Vec::new();
        while let Some(event) = MTrackEvent::read(&mut reader)? {
            events.push(event);
        }
        Ok(MTrackChunk {
            id: generic.id,
            events,
        })
    }

    pub fn track_number(&self) -> u8 {
        self.id[3]
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

    pub fn absolute_time_track(&self) -> Vec<MTrackAbsoluteTimeEvent> {
        let mut absolute_time_track = Vec::with_capacity(self.events.len());
        let mut absolute_time: i64 = 0;
        for event in &self.events {
            absolute_time += event.delta_time as i64;
            absolute_time_track.push(MTrackAbsoluteTimeEvent {
                status_byte: event.status_byte,
                data_bytes: event.data_bytes.clone(),
                time: absolute_time,
            });
        }
        absolute_time_track
    }
}

/// Tables derived from an M-track; never stored, always recomputed.
#[derive(Debug, Clone, PartialEq)]
pub struct MTrackInterpretation {
    /// (time_ms, bpm)
    pub tempos: Vec<(i64, u32)>,
    /// (time_ms, numerator, denominator)
    pub time_signatures: Vec<(i64, u8, u32)>,
    /// (start_ms, end_ms)
    pub hooks: Vec<(i64, i64)>,
    /// (time_ms, kind)
    pub visible_guide_melody_delimiters: Vec<(i64, u8)>,
    pub two_chorus_fadeout_time: i64,
    pub song_section: (i64, i64),
    /// (start_ms, end_ms)
    pub adpcm_sections: Vec<(i64, i64)>,
}

impl MTrackInterpretation {
    pub fn from_track(track: &MTrackChunk) -> MTrackInterpretation {
        let mut tempos: Vec<(i64, u32)> = Vec::new();
        let mut time_signatures: Vec<(i64, u8, u32)> = Vec::new();
        let mut hooks: Vec<(i64, i64)> = Vec::new();
        let mut visible_guide_melody_delimiters: Vec<(i64, u8)> = Vec::new();
        let mut two_chorus_fadeout_time: i64 = -1;
        let mut song_section: (i64, i64) = (-1, -1);
        let mut adpcm_sections: Vec<(i64, i64)> = Vec::new();

        let absolute_time_track = track.absolute_time_track();

        let mut current_beat_start = absolute_time_track
            .iter()
            .find(|event| event.status_byte == 0xF1 || event.status_byte == 0xF2)
            .map_or(-1, |event| event.time);
        let mut current_bpm: u32 = 125;
        let mut current_hook_start_time: i64 = 0;
        let mut song_section_start: i64 = -1;
        let mut current_adpcm_section_start: i64 = -1;

        for event in &absolute_time_track {
            match event.status_byte {
                0xF1 | 0xF2 => {
                    if current_beat_start != -1 {
                        let beat_length = event.time - current_beat_start;
                        if beat_length == 0 {
                            continue;
                        }
                        let bpm =
                            crate::dtype::round_half_even(60000.0 / beat_length as f64) as u32;
                        if bpm != current_bpm {
                            tempos.push((current_beat_start, bpm));
                        }
                        current_bpm = bpm;
                    }
                    current_beat_start = event.time;
                }
                0xF3 => {
                    let mark_type = event.data_bytes[0];
                    if mark_type == 0x00 || mark_type == 0x02 {
                        current_hook_start_time = event.time;
                    } else if mark_type == 0x01 || mark_type == 0x03 {
                        hooks.push((current_hook_start_time, event.time));
                    }
                }
                0xF4 => {
                    visible_guide_melody_delimiters.push((event.time, event.data_bytes[0]));
                }
                0xF5 => {
                    two_chorus_fadeout_time = event.time;
                }
                0xF6 => {
                    let mark_type = event.data_bytes[0];
                    if mark_type == 0x00 {
                        song_section_start = event.time;
                    } else if mark_type == 0x01 {
                        song_section = (song_section_start, event.time);
                    }
                }
                0xF8 => {
                    let mark_type = event.data_bytes[0];
                    if mark_type == 0x00 {
                        current_adpcm_section_start = event.time;
                    } else if mark_type == 0x01 {
                        adpcm_sections.push((current_adpcm_section_start, event.time));
                    }
                }
                0xFF => {
                    time_signatures.push((
                        event.time,
                        event.data_bytes[1],
                        1u32 << event.data_bytes[2],
                    ));
                }
                _ => {}
            }
        }

        MTrackInterpretation {
            tempos,
            time_signatures,
            hooks,
            visible_guide_melody_delimiters,
            two_chorus_fadeout_time,
            song_section,
            adpcm_sections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(delta_time: u64, status_byte: u8, data_bytes: &[u8]) -> MTrackEvent {
        MTrackEvent {
            delta_time,
            status_byte,
            data_bytes: data_bytes.to_vec(),
        }
    }

    fn chunk(events: Vec<MTrackEvent>) -> MTrackChunk {
        MTrackChunk {
            id: *b"\xffMR\x00",
            events,
        }
    }

    #[test]
    fn stream_round_trip() {
        let chunk = chunk(vec![
            event(0, 0xF6, &[0x00]),
            event(500, 0xF1, &[]),
            event(500, 0xF2, &[]),
            event(0, 0xFF, &[0x00, 0x04, 0x02, 0xFE]),
            event(1000, 0xF3, &[0x00]),
        ]);
        let payload = chunk.payload_buffer().unwrap();
        let mut with_end = payload.clone();
        with_end.extend_from_slice(&END_OF_TRACK_MARK);
        let generic = GenericChunk {
            id: *b"\xffMR\x00",
            payload: with_end,
        };
        assert_eq!(MTrackChunk::from_generic(&generic).unwrap(), chunk);
    }

    #[test]
    fn a_bare_payload_end_terminates_reading() {
        let generic = GenericChunk {
            id: *b"\xffMR\x00",
            payload: Vec::new(),
        };
        assert!(MTrackChunk::from_generic(&generic).unwrap().events.is_empty());
    }

    #[test]
    fn sysex_requires_the_fe_terminator() {
        let mut reader = Cursor::new(&[0xFF, 0x00, 0x04, 0x02, 0xF7][..]);
        assert!(matches!(
            MTrackEvent::read(&mut reader),
            Err(OkdError::UnterminatedSysEx(0xF7))
        ));
    }

    #[test]
    fn unknown_marker_status_is_rejected() {
        let mut reader = Cursor::new(&[0xF7, 0x00][..]);
        assert!(matches!(
            MTrackEvent::read(&mut reader),
            Err(OkdError::UnknownStatus(0xF7))
        ));
    }

    #[test]
    fn hook_fold_and_tempo_inference() {
        let chunk = chunk(vec![
            event(0, 0xF1, &[]),
            event(500, 0xF1, &[]),
            event(500, 0xF3, &[0x00]),
            event(1000, 0xF3, &[0x01]),
        ]);
        let interpretation = MTrackInterpretation::from_track(&chunk);
        assert_eq!(interpretation.tempos, vec![(0, 120)]);
        assert_eq!(interpretation.hooks, vec![(1000, 2000)]);
    }

    #[test]
    fn tempo_entries_only_on_change() {
        let chunk = chunk(vec![
            event(0, 0xF1, &[]),
            event(500, 0xF2, &[]),
            event(500, 0xF2, &[]),
            event(250, 0xF1, &[]),
            event(250, 0xF2, &[]),
        ]);
        let interpretation = MTrackInterpretation::from_track(&chunk);
        // 120 BPM from the first two intervals, then 240 from the half-length
        // ones; each change is recorded once, at the interval start.
        assert_eq!(interpretation.tempos, vec![(0, 120), (1000, 240)]);
    }

    #[test]
    fn zero_length_beats_are_skipped() {
        let chunk = chunk(vec![
            event(0, 0xF1, &[]),
            event(0, 0xF2, &[]),
            event(500, 0xF1, &[]),
        ]);
        let interpretation = MTrackInterpretation::from_track(&chunk);
        assert_eq!(interpretation.tempos, vec![(0, 120)]);
    }

    #[test]
    fn sections_and_signatures_fold() {
        let chunk = chunk(vec![
            event(0, 0xFF, &[0x00, 0x03, 0x03, 0xFE]),
            event(0, 0xF6, &[0x00]),
            event(100, 0xF8, &[0x00]),
            event(100, 0xF8, &[0x01]),
            event(100, 0xF5, &[]),
            event(100, 0xF4, &[0x02]),
            event(100, 0xF6, &[0x01]),
        ]);
        let interpretation = MTrackInterpretation::from_track(&chunk);
        assert_eq!(interpretation.time_signatures, vec![(0, 3, 8)]);
        assert_eq!(interpretation.song_section, (0, 500));
        assert_eq!(interpretation.adpcm_sections, vec![(100, 200)]);
        assert_eq!(interpretation.two_chorus_fadeout_time, 300);
        assert_eq!(interpretation.visible_guide_melody_delimiters, vec![(400, 2)]);
    }
}
