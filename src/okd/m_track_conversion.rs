//! Derivation of the M-track marker stream from an SMF: beats from the time
//! signatures, hooks and fadeout from the dedicated hook track, page
//! delimiters from the melody.

use std::collections::VecDeque;

use midly::{MidiMessage, Smf, TrackEventKind};

use crate::dtype::OkdError;
use crate::midi::utils::{
    get_first_and_last_note_times, get_time_signatures, get_track_by_port_channel,
};
use crate::midi::MidiTimeConverter;

use super::chunks::{MTrackAbsoluteTimeEvent, MTrackChunk, MTrackEvent};

/// Port of the optional hook/fadeout marker track.
pub const MIDI_M_TRACK_PORT: u8 = 16;

const HOOK_NOTE: u8 = 48;
const TWO_CHORUS_FADEOUT_NOTE: u8 = 72;

/// A guide melody page longer than this (or a void longer than this) forces
/// a page break.
const PAGE_BREAK_THRESHOLD_MS: i64 = 7000;

fn log2_u32(value: u32) -> u8 {
    31 - value.leading_zeros() as u8
}

fn midi_to_absolute_time_track(smf: &Smf) -> Result<Vec<MTrackAbsoluteTimeEvent>, OkdError> {
    let mut midi_time_converter = MidiTimeConverter::new();
    midi_time_converter.load_from_midi(smf);

    let melody_track_index = get_track_by_port_channel(&smf.tracks, 1, 8)
        .ok_or(OkdError::MissingTrack("melody track"))?;

    // Melody notes as (start_ms, end_ms).
    let mut melody_notes: Vec<(i64, i64)> = Vec::new();
    let mut current_melody_note_start: i64 = -1;
    let mut current_melody_note_number: i32 = -1;
    let mut track_time: i64 = 0;
    for event in &smf.tracks[melody_track_index] {
        track_time += event.delta.as_int() as i64;
        let absolute_time = midi_time_converter.ticks_to_ms(track_time)?;

        match event.kind {
            TrackEventKind::Midi {
                message: MidiMessage::NoteOn { key, .. },
                ..
            } => {
                current_melody_note_start = absolute_time;
                current_melody_note_number = key.as_int() as i32;
            }
            TrackEventKind::Midi {
                message: MidiMessage::NoteOff { key, .. },
                ..
            } if key.as_int() as i32 == current_melody_note_number => {
                melody_notes.push((current_melody_note_start, absolute_time));
            }
            _ => {}
        }
    }
    if melody_notes.is_empty() {
        return Err(OkdError::MissingTrack("melody note"));
    }

    // Hooks and the fadeout come from the dedicated marker track when it
    // exists.
    let m_track_index = get_track_by_port_channel(&smf.tracks, MIDI_M_TRACK_PORT, 0);
    let mut hooks: Vec<(i64, i64)> = Vec::new();
    let mut two_chorus_fadeout_time: i64 = -1;
    if let Some(m_track_index) = m_track_index {
        let mut current_hook_start: i64 = -1;
        track_time = 0;
        for event in &smf.tracks[m_track_index] {
            track_time += event.delta.as_int() as i64;
            let absolute_time = midi_time_converter.ticks_to_ms(track_time)?;

            match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { key, .. },
                    ..
                } => {
                    if key.as_int() == HOOK_NOTE {
                        current_hook_start = absolute_time;
                    } else if key.as_int() == TWO_CHORUS_FADEOUT_NOTE {
                        two_chorus_fadeout_time = absolute_time;
                    }
                }
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { key, .. },
                    ..
                } if key.as_int() == HOOK_NOTE => {
                    hooks.push((current_hook_start, absolute_time));
                }
                _ => {}
            }
        }
    }

    let (first_note_on_tick, last_note_off_tick) = get_first_and_last_note_times(&smf.tracks);
    let first_note_on_time = midi_time_converter.ticks_to_ms(first_note_on_tick)?;
    let last_note_off_time = midi_time_converter.ticks_to_ms(last_note_off_tick)?;

    let time_signatures = get_time_signatures(&smf.tracks);

    let mut absolute_time_track: Vec<MTrackAbsoluteTimeEvent> = Vec::new();

    for &(tick, numerator, denominator) in &time_signatures {
        absolute_time_track.push(MTrackAbsoluteTimeEvent {
            status_byte: 0xFF,
            data_bytes: vec![0x00, numerator, log2_u32(denominator), 0xFE],
            time: midi_time_converter.ticks_to_ms(tick)?,
        });
    }

    // Page delimiters over the melody: a page closes after 7 seconds, either
    // into a long void (kind 1, page restart) or at the next note-on
    // (kind 3); the last note closes the final page (kind 2).
    let mut visible_guide_melody_delimiters: Vec<(i64, u8)> = Vec::new();
    let mut melody_notes_queue: VecDeque<(i64, i64)> = melody_notes.iter().copied().collect();
    let mut current_page_start: i64 = -1;
    while let Some((melody_note_start, melody_note_end)) = melody_notes_queue.pop_front() {
        if current_page_start == -1 {
            current_page_start = melody_note_start;
            visible_guide_melody_delimiters.push((melody_note_start, 0));
            continue;
        }

        let next_melody_note_start = match melody_notes_queue.front() {
            Some(&(next_start, _)) => next_start,
            None => {
                visible_guide_melody_delimiters.push((melody_note_end + 1, 2));
                break;
            }
        };

        let page_length = melody_note_end - current_page_start;
        if page_length > PAGE_BREAK_THRESHOLD_MS {
            let void_length = next_melody_note_start - melody_note_end;
            if void_length > PAGE_BREAK_THRESHOLD_MS {
                melody_notes_queue.pop_front();
                visible_guide_melody_delimiters.push((melody_note_end + 1, 1));
                current_page_start = -1;
            } else {
                visible_guide_melody_delimiters.push((next_melody_note_start, 3));
                current_page_start = next_melody_note_start;
            }
        }
    }

    // Beat markers stepped by the beat length; the downbeat of each bar is
    // strong per the active signature's numerator.
    if !time_signatures.is_empty() {
        let ticks_per_beat = midi_time_converter.ppqn as i64;
        let mut current_beat_tick: i64 = 0;
        let mut current_beat_count = time_signatures[0].1;
        while current_beat_tick < last_note_off_tick + 1 {
            let time_signature = time_signatures
                .iter()
                .rev()
                .find(|&&(tick, _, _)| tick <= current_beat_tick)
                .ok_or(OkdError::MissingTrack("time signature"))?;

            if current_beat_count < time_signature.1 {
                absolute_time_track.push(MTrackAbsoluteTimeEvent {
                    status_byte: 0xF2,
                    data_bytes: Vec::new(),
                    time: midi_time_converter.ticks_to_ms(current_beat_tick)?,
                });
                current_beat_count += 1;
            } else {
                absolute_time_track.push(MTrackAbsoluteTimeEvent {
                    status_byte: 0xF1,
                    data_bytes: Vec::new(),
                    time: midi_time_converter.ticks_to_ms(current_beat_tick)?,
                });
                current_beat_count = 1;
            }

            current_beat_tick += ticks_per_beat;
        }
    }

    absolute_time_track.push(MTrackAbsoluteTimeEvent {
        status_byte: 0xF6,
        data_bytes: vec![0x00],
        time: first_note_on_time,
    });
    absolute_time_track.push(MTrackAbsoluteTimeEvent {
        status_byte: 0xF6,
        data_bytes: vec![0x01],
        time: last_note_off_time,
    });

    if !hooks.is_empty() {
        for &(hook_start, hook_end) in &hooks[..hooks.len() - 1] {
            absolute_time_track.push(MTrackAbsoluteTimeEvent {
                status_byte: 0xF3,
                data_bytes: vec![0x00],
                time: hook_start,
            });
            absolute_time_track.push(MTrackAbsoluteTimeEvent {
                status_byte: 0xF3,
                data_bytes: vec![0x01],
                time: hook_end,
            });
        }
        let (last_hook_start, last_hook_end) = hooks[hooks.len() - 1];
        absolute_time_track.push(MTrackAbsoluteTimeEvent {
            status_byte: 0xF3,
            data_bytes: vec![0x02],
            time: last_hook_start,
        });
        absolute_time_track.push(MTrackAbsoluteTimeEvent {
            status_byte: 0xF3,
            data_bytes: vec![0x03],
            time: last_hook_end,
        });
    }

    for &(delimiter_time, delimiter_type) in &visible_guide_melody_delimiters {
        absolute_time_track.push(MTrackAbsoluteTimeEvent {
            status_byte: 0xF4,
            data_bytes: vec![delimiter_type],
            time: delimiter_time,
        });
    }

    if two_chorus_fadeout_time != -1 {
        absolute_time_track.push(MTrackAbsoluteTimeEvent {
            status_byte: 0xF5,
            data_bytes: Vec::new(),
            time: two_chorus_fadeout_time,
        });
    }

    absolute_time_track.sort_by_key(|absolute_time_event| absolute_time_event.time);

    Ok(absolute_time_track)
}

/// Build the M-track chunk for an SMF.
pub fn midi_to_m_track(smf: &Smf) -> Result<MTrackChunk, OkdError> {
    let absolute_time_track = midi_to_absolute_time_track(smf)?;
    let mut events: Vec<MTrackEvent> = Vec::with_capacity(absolute_time_track.len() + 1);
    let mut current_time: i64 = 0;
    for event in absolute_time_track {
        let delta_time = (event.time - current_time) as u64;
        current_time = event.time;
        events.push(MTrackEvent {
            delta_time,
            status_byte: event.status_byte,
            data_bytes: event.data_bytes,
        });
    }
    // End of Track
    events.push(MTrackEvent {
        delta_time: 0,
        status_byte: 0x00,
        data_bytes: vec![0x00, 0x00, 0x00],
    });
    Ok(MTrackChunk {
        id: *b"\xffMR\x00",
        events,
    })
}

#[cfg(test)]
mod tests {
    use midly::{num::{u4, u7, u15, u24, u28}, Format, Header, MetaMessage, Timing, Track, TrackEvent};

    use crate::okd::chunks::MTrackInterpretation;

    use super::*;

    fn event(delta: u32, kind: TrackEventKind) -> TrackEvent {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn note_on(channel: u8, key: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(100),
            },
        }
    }

    fn note_off(channel: u8, key: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(channel),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(64),
            },
        }
    }

    /// 480 tpb at 120 BPM: a beat is 500 ms. Four one-beat melody notes on
    /// (port 1, channel 8), 4/4 metre.
    fn sample_smf() -> Smf<'static> {
        let mut smf = Smf::new(Header::new(
            Format::Parallel,
            Timing::Metrical(u15::new(480)),
        ));

        let meta_track: Track = vec![
            event(
                0,
                TrackEventKind::Meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
            ),
            event(0, TrackEventKind::Meta(MetaMessage::Tempo(u24::new(500_000)))),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];

        let mut melody_track: Track = vec![event(
            0,
            TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(1))),
        )];
        for _ in 0..4 {
            melody_track.push(event(0, note_on(8, 60)));
            melody_track.push(event(480, note_off(8, 60)));
        }
        melody_track.push(event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)));

        let hook_track: Track = vec![
            event(0, TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(16)))),
            event(0, note_on(0, HOOK_NOTE)),
            event(960, note_off(0, HOOK_NOTE)),
            event(0, note_on(0, TWO_CHORUS_FADEOUT_NOTE)),
            event(240, note_off(0, TWO_CHORUS_FADEOUT_NOTE)),
            event(0, TrackEventKind::Meta(MetaMessage::EndOfTrack)),
        ];

        smf.tracks = vec![meta_track, melody_track, hook_track];
        smf
    }

    #[test]
    fn m_track_folds_back_to_the_source_markers() {
        let smf = sample_smf();
        let m_track = midi_to_m_track(&smf).unwrap();
        let interpretation = MTrackInterpretation::from_track(&m_track);

        // One hook (the last) from note 48 held for two beats.
        assert_eq!(interpretation.hooks, vec![(0, 1000)]);
        // Fadeout note at the hook's end.
        assert_eq!(interpretation.two_chorus_fadeout_time, 1000);
        // Song section spans the first note-on to the last note-off.
        assert_eq!(interpretation.song_section, (0, 2000));
        // 4/4 metre from the meta track.
        assert_eq!(interpretation.time_signatures, vec![(0, 4, 4)]);
    }

    #[test]
    fn beats_follow_the_signature_numerator() {
        let smf = sample_smf();
        let m_track = midi_to_m_track(&smf).unwrap();
        let beats: Vec<(u8, u64)> = m_track
            .events
            .iter()
            .filter(|event| event.status_byte == 0xF1 || event.status_byte == 0xF2)
            .map(|event| (event.status_byte, event.delta_time))
            .collect();
        // Strong beat on the downbeat, weak for the other three, stepping
        // 500 ms; the last note-off lands at 2000 ms so a fifth beat opens
        // the next bar.
        assert_eq!(
            beats.iter().map(|&(status, _)| status).collect::<Vec<_>>(),
            vec![0xF1, 0xF2, 0xF2, 0xF2, 0xF1]
        );
    }

    #[test]
    fn page_delimiters_open_and_close_the_melody() {
        let smf = sample_smf();
        let m_track = midi_to_m_track(&smf).unwrap();
        let interpretation = MTrackInterpretation::from_track(&m_track);
        // A short melody yields one opening delimiter and one final close.
        assert_eq!(
            interpretation.visible_guide_melody_delimiters,
            vec![(0, 0), (2001, 2)]
        );
    }

    #[test]
    fn the_terminal_event_is_four_zero_bytes() {
        let smf = sample_smf();
        let m_track = midi_to_m_track(&smf).unwrap();
        let last = m_track.events.last().unwrap();
        assert_eq!(last.status_byte, 0x00);
        assert_eq!(last.data_bytes, vec![0x00, 0x00, 0x00]);
        let payload = m_track.payload_buffer().unwrap();
        assert_eq!(&payload[payload.len() - 4..], &[0, 0, 0, 0]);
    }

    #[test]
    fn missing_melody_track_is_an_error() {
        let mut smf = sample_smf();
        smf.tracks.remove(1);
        assert!(matches!(
            midi_to_m_track(&smf),
            Err(OkdError::MissingTrack("melody track"))
        ));
    }
}
