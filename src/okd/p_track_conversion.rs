//! Conversion between P-track chunks and SMF tracks, one track per
//! (port, channel) destination.

use midly::{
    num::{u14, u15, u24, u28, u4, u7},
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
};
use log::warn;

use crate::dtype::OkdError;
use crate::midi::time_converter::bpm_to_tempo;
use crate::midi::utils::get_track_port;
use crate::midi::MidiTimeConverter;
use crate::mmt_tg::MmtTg;

use super::chunks::{
    MTrackInterpretation, PTrackAbsoluteTimeEvent, PTrackChunk, PTrackEvent, PTrackInfo,
};

fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// A track event whose payload is owned, so SMF assembly can borrow from it.
enum PendingKind {
    Owned(TrackEventKind<'static>),
    Text(String),
    SysEx(Vec<u8>),
}

struct PendingEvent {
    delta: u32,
    kind: PendingKind,
}

fn push_owned(track: &mut Vec<PendingEvent>, delta: u32, kind: TrackEventKind<'static>) {
    track.push(PendingEvent {
        delta,
        kind: PendingKind::Owned(kind),
    });
}

/// Channel-voice message from a status type and raw data bytes.
fn message_from_data(status_type: u8, data_bytes: &[u8]) -> Option<MidiMessage> {
    match status_type {
        0x80 => Some(MidiMessage::NoteOff {
            key: u7::new(data_bytes[0]),
            vel: u7::new(data_bytes[1]),
        }),
        0x90 => Some(MidiMessage::NoteOn {
            key: u7::new(data_bytes[0]),
            vel: u7::new(data_bytes[1]),
        }),
        0xA0 => Some(MidiMessage::Aftertouch {
            key: u7::new(data_bytes[0]),
            vel: u7::new(data_bytes[1]),
        }),
        0xB0 => Some(MidiMessage::Controller {
            controller: u7::new(data_bytes[0]),
            value: u7::new(data_bytes[1]),
        }),
        0xC0 => Some(MidiMessage::ProgramChange {
            program: u7::new(data_bytes[0]),
        }),
        0xD0 => Some(MidiMessage::ChannelAftertouch {
            vel: u7::new(data_bytes[0]),
        }),
        0xE0 => Some(MidiMessage::PitchBend {
            bend: midly::PitchBend(
                u14::new(((data_bytes[1] as u16) << 7) | data_bytes[0] as u16),
            ),
        }),
        _ => None,
    }
}

/// Status byte and data bytes of a parsed channel-voice message.
fn message_to_data(channel: u8, message: &MidiMessage) -> (u8, Vec<u8>) {
    match *message {
        MidiMessage::NoteOff { key, vel } => (0x80 | channel, vec![key.as_int(), vel.as_int()]),
        MidiMessage::NoteOn { key, vel } => (0x90 | channel, vec![key.as_int(), vel.as_int()]),
        MidiMessage::Aftertouch { key, vel } => (0xA0 | channel, vec![key.as_int(), vel.as_int()]),
        MidiMessage::Controller { controller, value } => {
            (0xB0 | channel, vec![controller.as_int(), value.as_int()])
        }
        MidiMessage::ProgramChange { program } => (0xC0 | channel, vec![program.as_int()]),
        MidiMessage::ChannelAftertouch { vel } => (0xD0 | channel, vec![vel.as_int()]),
        MidiMessage::PitchBend { bend } => {
            let value = bend.0.as_int();
            (
                0xE0 | channel,
                vec![(value & 0x7F) as u8, (value >> 7) as u8],
            )
        }
    }
}

/// Expand P-tracks to an SMF. One track per (port, channel); SysEx to the
/// virtual sound module is re-expressed as control/program changes.
pub fn p_track_to_midi(
    m_track_interpretation: &MTrackInterpretation,
    track_info: &PTrackInfo,
    tracks: &[&PTrackChunk],
    sysex_to_text: bool,
) -> Result<Vec<u8>, OkdError> {
    let mut midi_time_converter = MidiTimeConverter::new();
    for &(time, tempo) in &m_track_interpretation.tempos {
        midi_time_converter.add_tempo_change(time, tempo as f64);
    }

    let mut midi_devices = [MmtTg::new(), MmtTg::new()];

    let mut pending_tracks: Vec<Vec<PendingEvent>> = Vec::with_capacity(PTrackChunk::TOTAL_CHANNELS);
    for port in 0..PTrackChunk::PORTS {
        for channel in 0..PTrackChunk::CHANNELS_PER_PORT {
            let mut pending_track = Vec::new();

            // Set port
            push_owned(
                &mut pending_track,
                0,
                TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(port as u8))),
            );
            // Track setup messages
            let midi_device = &midi_devices[if port < 2 { 0 } else { 1 }];
            let multi_part_entry_index = port / 2 * MmtTg::PARTS_PER_PORT + channel;
            let multi_part_entry = midi_device.multi_part_entry(multi_part_entry_index);
            let part_number = port * MmtTg::PARTS_PER_PORT + channel;
            for event in multi_part_entry.to_midi_messages(
                None,
                (part_number % PTrackChunk::CHANNELS_PER_PORT) as u8,
                0,
            ) {
                push_owned(&mut pending_track, event.delta.as_int(), event.kind);
            }

            pending_tracks.push(pending_track);
        }
    }

    enum AbsoluteEvent {
        Voice(PTrackAbsoluteTimeEvent),
        Tempo { time: i64, bpm: u32 },
        TimeSignature { time: i64, numerator: u8, denominator_log2: u8 },
    }

    impl AbsoluteEvent {
        fn time(&self) -> i64 {
            match self {
                AbsoluteEvent::Voice(event) => event.time,
                AbsoluteEvent::Tempo { time, .. } => *time,
                AbsoluteEvent::TimeSignature { time, .. } => *time,
            }
        }
    }

    let mut absolute_time_track: Vec<AbsoluteEvent> = Vec::new();
    let mut voice_events: Vec<PTrackAbsoluteTimeEvent> = Vec::new();
    for track in tracks {
        voice_events.extend(track.absolute_time_track(track_info)?);
    }
    voice_events.sort_by_key(|event| event.time);
    if voice_events.is_empty() {
        return Err(OkdError::MissingTrack("P-Track events"));
    }
    absolute_time_track.extend(voice_events.into_iter().map(AbsoluteEvent::Voice));

    for &(time, bpm) in &m_track_interpretation.tempos {
        absolute_time_track.push(AbsoluteEvent::Tempo { time, bpm });
    }
    for &(time, numerator, denominator) in &m_track_interpretation.time_signatures {
        absolute_time_track.push(AbsoluteEvent::TimeSignature {
            time,
            numerator,
            denominator_log2: (31 - denominator.leading_zeros()) as u8,
        });
    }
    absolute_time_track.sort_by_key(AbsoluteEvent::time);

    let mut track_times = [0i64; PTrackChunk::TOTAL_CHANNELS];
    for absolute_event in &absolute_time_track {
        let tick = midi_time_converter.ms_to_ticks(absolute_event.time())?;

        let event = match absolute_event {
            AbsoluteEvent::Tempo { bpm, .. } => {
                let delta = (tick - track_times[0]).max(0) as u32;
                track_times[0] = tick;
                push_owned(
                    &mut pending_tracks[0],
                    delta,
                    TrackEventKind::Meta(MetaMessage::Tempo(u24::new(bpm_to_tempo(*bpm as f64)))),
                );
                continue;
            }
            AbsoluteEvent::TimeSignature {
                numerator,
                denominator_log2,
                ..
            } => {
                let delta = (tick - track_times[0]).max(0) as u32;
                track_times[0] = tick;
                push_owned(
                    &mut pending_tracks[0],
                    delta,
                    TrackEventKind::Meta(MetaMessage::TimeSignature(
                        *numerator,
                        *denominator_log2,
                        24,
                        8,
                    )),
                );
                continue;
            }
            AbsoluteEvent::Voice(event) => event,
        };

        let delta_time = (tick - track_times[event.track]).max(0) as u32;
        track_times[event.track] = tick;

        let status_type = event.status_byte_type();
        if status_type == 0xF0 {
            if event.status_byte != 0xF0 {
                // ADPCM gates and friends survive only as text.
                pending_tracks[event.track].push(PendingEvent {
                    delta: delta_time,
                    kind: PendingKind::Text(hex_string(&event.to_bytes())),
                });
                continue;
            }

            // Convert SysEx event to General MIDI messages
            let midi_device = &mut midi_devices[if event.port < 2 { 0 } else { 1 }];
            if let Some(part_number) = MmtTg::effecting_multi_part_number(&event.data_bytes) {
                let part_number = part_number as usize;
                let before_sysex = midi_device.multi_part_entry(part_number);
                midi_device.receive_sysex_message(&event.data_bytes)?;
                let after_sysex = midi_device.multi_part_entry(part_number);
                let setup_messages = after_sysex.to_midi_messages(
                    Some(&before_sysex),
                    (part_number % PTrackChunk::CHANNELS_PER_PORT) as u8,
                    delta_time,
                );
                let track_number =
                    event.port as usize * MmtTg::PARTS_PER_PORT + part_number;
                if track_number < pending_tracks.len() {
                    for message in setup_messages {
                        push_owned(
                            &mut pending_tracks[track_number],
                            message.delta.as_int(),
                            message.kind,
                        );
                    }
                } else {
                    warn!("SysEx part out of track range. track_number={track_number}");
                }
            }

            if sysex_to_text {
                pending_tracks[event.track].push(PendingEvent {
                    delta: delta_time,
                    kind: PendingKind::Text(hex_string(&event.to_bytes())),
                });
            } else {
                pending_tracks[event.track].push(PendingEvent {
                    delta: delta_time,
                    kind: PendingKind::SysEx(event.data_bytes.clone()),
                });
            }
            continue;
        }

        if !event.data_bytes.iter().all(|&byte| byte & 0x80 == 0) {
            warn!(
                "Invalid MIDI event data. message=`{}`",
                hex_string(&event.to_bytes())
            );
            continue;
        }
        match message_from_data(status_type, &event.data_bytes) {
            Some(message) => push_owned(
                &mut pending_tracks[event.track],
                delta_time,
                TrackEventKind::Midi {
                    channel: u4::new(event.status_byte & 0x0F),
                    message,
                },
            ),
            None => {
                warn!(
                    "Unknown MIDI message detected. status_byte={:#04X}",
                    event.status_byte
                );
            }
        }
    }

    // Assemble and serialize, borrowing text and SysEx payloads from the
    // pending events.
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(midi_time_converter.ppqn)),
    ));
    for pending_track in &pending_tracks {
        let mut track: Vec<TrackEvent> = Vec::with_capacity(pending_track.len() + 1);
        for pending_event in pending_track {
            let kind = match &pending_event.kind {
                PendingKind::Owned(kind) => kind.clone(),
                PendingKind::Text(text) => TrackEventKind::Meta(MetaMessage::Text(text.as_bytes())),
                PendingKind::SysEx(data) => TrackEventKind::SysEx(data.as_slice()),
            };
            track.push(TrackEvent {
                delta: u28::new(pending_event.delta),
                kind,
            });
        }
        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    let mut bytes = Vec::new();
    smf.write_std(&mut bytes)
        .map_err(|error| OkdError::SmfParse(error.to_string()))?;
    Ok(bytes)
}

/// Split an SMF into per-port absolute-time event lists. Each port gets its
/// own independently allocated list.
fn midi_to_absolute_time_tracks(
    smf: &Smf,
) -> Result<Vec<Vec<PTrackAbsoluteTimeEvent>>, OkdError> {
    let mut midi_time_converter = MidiTimeConverter::new();
    midi_time_converter.load_from_midi(smf);

    let mut absolute_time_tracks: Vec<Vec<PTrackAbsoluteTimeEvent>> =
        (0..PTrackChunk::PORTS).map(|_| Vec::new()).collect();
    for (i, midi_track) in smf.tracks.iter().enumerate() {
        let port = match get_track_port(midi_track) {
            Some(port) => port as usize,
            None => {
                warn!("Port undefined. track={i}");
                continue;
            }
        };
        if port >= PTrackChunk::PORTS {
            warn!("Port out of range. track={i} port={port}");
            continue;
        }

        let mut track_time: i64 = 0;
        for event in midi_track {
            track_time += event.delta.as_int() as i64;
            let absolute_time = midi_time_converter.ticks_to_ms(track_time)?;

            match &event.kind {
                TrackEventKind::Midi { channel, message } => {
                    let (status_byte, data_bytes) = message_to_data(channel.as_int(), message);
                    let track =
                        port * PTrackChunk::CHANNELS_PER_PORT + (status_byte & 0x0F) as usize;
                    absolute_time_tracks[port].push(PTrackAbsoluteTimeEvent {
                        status_byte,
                        data_bytes,
                        port: port as u8,
                        track,
                        time: absolute_time,
                    });
                }
                TrackEventKind::SysEx(data) => {
                    let track = port * PTrackChunk::CHANNELS_PER_PORT;
                    absolute_time_tracks[port].push(PTrackAbsoluteTimeEvent {
                        status_byte: 0xF0,
                        data_bytes: data.to_vec(),
                        port: port as u8,
                        track,
                        time: absolute_time,
                    });
                }
                _ => {}
            }
        }
    }

    for absolute_time_track in &mut absolute_time_tracks {
        absolute_time_track.sort_by_key(|absolute_time_event| absolute_time_event.time);
    }

    Ok(absolute_time_tracks)
}

/// Fold an absolute-time event list back into stored P-track events.
/// Note-ons pair with their matching note-off to produce durations.
fn absolute_time_track_to_p_track(
    absolute_time_track: &[PTrackAbsoluteTimeEvent],
) -> Vec<PTrackEvent> {
    let mut events: Vec<PTrackEvent> = Vec::new();
    let mut current_time: i64 = 0;
    for (event_index, event) in absolute_time_track.iter().enumerate() {
        let status_type = event.status_byte_type();
        let delta_time = (event.time - current_time) as u64;

        match status_type {
            0x80 => {
                // Absorbed into the paired note-on.
                continue;
            }
            0x90 => {
                let channel = event.status_byte & 0x0F;
                let note_number = event.data_bytes[0];
                let mut note_off_time = event.time;
                for note_off_event in &absolute_time_track[event_index..] {
                    if note_off_event.status_byte_type() == 0x80
                        && note_off_event.status_byte & 0x0F == channel
                        && note_off_event.data_bytes[0] == note_number
                    {
                        note_off_time = note_off_event.time;
                        break;
                    }
                }
                let duration = ((note_off_time - event.time) >> 2) as u64;
                events.push(PTrackEvent {
                    delta_time,
                    status_byte: event.status_byte,
                    data_bytes: event.data_bytes.clone(),
                    duration: Some(duration),
                });
            }
            0xA0 | 0xC0 => {
                let mut data_bytes = vec![event.status_byte];
                data_bytes.extend_from_slice(&event.data_bytes);
                events.push(PTrackEvent {
                    delta_time,
                    status_byte: 0xFE,
                    data_bytes,
                    duration: None,
                });
            }
            0xF0 => {
                if event.status_byte != 0xF0 {
                    continue;
                }
                events.push(PTrackEvent {
                    delta_time,
                    status_byte: 0xF0,
                    data_bytes: event.data_bytes.clone(),
                    duration: None,
                });
            }
            _ => {
                events.push(PTrackEvent {
                    delta_time,
                    status_byte: event.status_byte,
                    data_bytes: event.data_bytes.clone(),
                    duration: None,
                });
            }
        }

        current_time = event.time;
    }

    // End of Track
    events.push(PTrackEvent {
        delta_time: 0,
        status_byte: 0x00,
        data_bytes: vec![0x00, 0x00, 0x00],
        duration: None,
    });

    events
}

/// Build the P-track chunks of an SMF, one per populated port. The chunk
/// numbers of the 3rd and 4th tracks skip over 2, which is reserved.
pub fn midi_to_p_tracks(smf: &Smf) -> Result<Vec<PTrackChunk>, OkdError> {
    let absolute_time_tracks = midi_to_absolute_time_tracks(smf)?;
    let mut p_tracks: Vec<PTrackChunk> = Vec::new();
    let mut track_count: u8 = 0;
    for absolute_time_track in &absolute_time_tracks {
        if absolute_time_track.is_empty() {
            continue;
        }

        let track_number = if track_count >= 2 {
            track_count + 1
        } else {
            track_count
        };
        p_tracks.push(PTrackChunk::new(
            [0xFF, b'P', b'R', track_number],
            absolute_time_track_to_p_track(absolute_time_track),
        ));
        track_count += 1;
    }
    Ok(p_tracks)
}

/// Build the P3 track from port 2, keeping only note events.
pub fn midi_to_p3_track(smf: &Smf) -> Result<PTrackChunk, OkdError> {
    let absolute_time_tracks = midi_to_absolute_time_tracks(smf)?;
    let absolute_time_track = &absolute_time_tracks[2];
    if absolute_time_track.is_empty() {
        return Err(OkdError::MissingTrack("P-Track 2"));
    }
    let note_events: Vec<PTrackAbsoluteTimeEvent> = absolute_time_track
        .iter()
        .filter(|event| matches!(event.status_byte_type(), 0x80 | 0x90))
        .cloned()
        .collect();
    Ok(PTrackChunk::new(
        *b"\xffPR\x02",
        absolute_time_track_to_p_track(&note_events),
    ))
}

#[cfg(test)]
mod tests {
    use midly::Track;

    use crate::okd::chunks::{PTrackInfoChannelInfoEntry, PTrackInfoChunk, PTrackInfoEntry};

    use super::*;

    fn event(delta: u32, kind: TrackEventKind) -> TrackEvent {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn plain_info() -> PTrackInfo {
        PTrackInfo::Standard(PTrackInfoChunk {
            id: *b"YPTI",
            data: vec![PTrackInfoEntry {
                track_number: 0,
                track_status: 0x00,
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
            }],
        })
    }

    fn interpretation() -> MTrackInterpretation {
        MTrackInterpretation {
            tempos: vec![(0, 120)],
            time_signatures: vec![(0, 4, 4)],
            hooks: Vec::new(),
            visible_guide_melody_delimiters: Vec::new(),
            two_chorus_fadeout_time: -1,
            song_section: (-1, -1),
            adpcm_sections: Vec::new(),
        }
    }

    fn stored_track() -> PTrackChunk {
        PTrackChunk::new(
            *b"\xffPR\x00",
            vec![
                PTrackEvent {
                    delta_time: 0,
                    status_byte: 0x90,
                    data_bytes: vec![0x3C, 0x64],
                    duration: Some(125),
                },
                PTrackEvent {
                    delta_time: 1000,
                    status_byte: 0xB0,
                    data_bytes: vec![0x07, 0x50],
                    duration: None,
                },
            ],
        )
    }

    #[test]
    fn p_track_to_midi_produces_64_tracks() {
        let chunk = stored_track();
        let bytes = p_track_to_midi(&interpretation(), &plain_info(), &[&chunk], true).unwrap();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), PTrackChunk::TOTAL_CHANNELS);

        // Every track opens with its port meta.
        for (i, track) in smf.tracks.iter().enumerate() {
            match track[0].kind {
                TrackEventKind::Meta(MetaMessage::MidiPort(port)) => {
                    assert_eq!(port.as_int() as usize, i / 16);
                }
                ref other => panic!("expected a port meta, got {other:?}"),
            }
        }

        // Track 0 carries the tempo and time signature metas.
        assert!(smf.tracks[0].iter().any(|event| matches!(
            event.kind,
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) if tempo.as_int() == 500_000
        )));
        assert!(smf.tracks[0].iter().any(|event| matches!(
            event.kind,
            TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8))
        )));

        // The stored note lands on track 0 with its synthesized note-off
        // 500 ms (= 480 ticks) later.
        let mut note_events = smf.tracks[0].iter().filter_map(|event| match event.kind {
            TrackEventKind::Midi { message, .. } => match message {
                MidiMessage::NoteOn { key, vel } => Some((0x90u8, key.as_int(), vel.as_int(), event.delta.as_int())),
                MidiMessage::NoteOff { key, vel } => Some((0x80, key.as_int(), vel.as_int(), event.delta.as_int())),
                _ => None,
            },
            _ => None,
        });
        assert_eq!(note_events.next(), Some((0x90, 0x3C, 0x64, 0)));
        assert_eq!(note_events.next(), Some((0x80, 0x3C, 0x40, 480)));
    }

    #[test]
    fn smf_round_trips_back_to_p_track_events() {
        let chunk = stored_track();
        let bytes = p_track_to_midi(&interpretation(), &plain_info(), &[&chunk], true).unwrap();
        let smf = Smf::parse(&bytes).unwrap();

        let p_tracks = midi_to_p_tracks(&smf).unwrap();
        assert_eq!(p_tracks.len(), 1);
        assert_eq!(p_tracks[0].track_number(), 0);

        let events = &p_tracks[0].events;
        // The setup prelude, then the note with its duration restored
        // (500 ms >> 2), the volume change, and the terminator.
        let note = events
            .iter()
            .find(|event| event.status_byte == 0x90)
            .unwrap();
        assert_eq!(note.data_bytes, vec![0x3C, 0x64]);
        assert_eq!(note.duration, Some(125));

        let volume = events
            .iter()
            .find(|event| event.status_byte == 0xB0 && event.data_bytes == vec![0x07, 0x50])
            .unwrap();
        assert!(volume.duration.is_none());

        let last = events.last().unwrap();
        assert_eq!(last.status_byte, 0x00);
        assert_eq!(last.data_bytes, vec![0x00, 0x00, 0x00]);
    }

    #[test]
    fn aftertouch_and_program_change_wrap_in_compensation_events() {
        let track: Track = vec![
            event(0, TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(0)))),
            event(
                0,
                TrackEventKind::Midi {
                    channel: u4::new(2),
                    message: MidiMessage::NoteOn {
                        key: u7::new(60),
                        vel: u7::new(1),
                    },
                },
            ),
            event(
                10,
                TrackEventKind::Midi {
                    channel: u4::new(2),
                    message: MidiMessage::ProgramChange { program: u7::new(7) },
                },
            ),
            event(
                10,
                TrackEventKind::Midi {
                    channel: u4::new(2),
                    message: MidiMessage::Aftertouch {
                        key: u7::new(60),
                        vel: u7::new(3),
                    },
                },
            ),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks = vec![track];

        let p_tracks = midi_to_p_tracks(&smf).unwrap();
        let compensations: Vec<&PTrackEvent> = p_tracks[0]
            .events
            .iter()
            .filter(|event| event.status_byte == 0xFE)
            .collect();
        assert_eq!(compensations.len(), 2);
        assert_eq!(compensations[0].data_bytes, vec![0xC2, 0x07]);
        assert_eq!(compensations[1].data_bytes, vec![0xA2, 0x3C, 0x03]);
    }

    #[test]
    fn p3_track_keeps_only_notes() {
        let track: Track = vec![
            event(0, TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(2)))),
            event(
                0,
                TrackEventKind::Midi {
                    channel: u4::new(14),
                    message: MidiMessage::NoteOn {
                        key: u7::new(70),
                        vel: u7::new(100),
                    },
                },
            ),
            event(
                40,
                TrackEventKind::Midi {
                    channel: u4::new(14),
                    message: MidiMessage::Controller {
                        controller: u7::new(7),
                        value: u7::new(100),
                    },
                },
            ),
            event(
                40,
                TrackEventKind::Midi {
                    channel: u4::new(14),
                    message: MidiMessage::NoteOff {
                        key: u7::new(70),
                        vel: u7::new(64),
                    },
                },
            ),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks = vec![track];

        let p3_track = midi_to_p3_track(&smf).unwrap();
        assert_eq!(p3_track.track_number(), 2);
        let statuses: Vec<u8> = p3_track
            .events
            .iter()
            .map(|event| event.status_byte)
            .collect();
        // One note-on (with duration) and the terminator; the controller is
        // dropped and the note-off absorbed.
        assert_eq!(statuses, vec![0x9E, 0x00]);
        // 80 ticks at 120 BPM is about 83 ms, stored right-shifted by 2.
        assert_eq!(p3_track.events[0].duration, Some(83 >> 2));
    }

    #[test]
    fn tracks_without_a_port_are_skipped() {
        let track: Track = vec![
            event(
                0,
                TrackEventKind::Midi {
                    channel: u4::new(0),
                    message: MidiMessage::NoteOn {
                        key: u7::new(60),
                        vel: u7::new(100),
                    },
                },
            ),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));
        smf.tracks = vec![track];
        assert!(midi_to_p_tracks(&smf).unwrap().is_empty());
    }
}
