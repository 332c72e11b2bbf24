//! Track selection helpers over parsed SMF data.

use midly::{MetaMessage, MidiMessage, Track, TrackEventKind};

/// Check if a MIDI track contains any meta messages.
pub fn is_meta_track(track: &Track) -> bool {
    track
        .iter()
        .any(|event| matches!(event.kind, TrackEventKind::Meta(_)))
}

/// Find the index of the first meta track.
pub fn get_meta_track(tracks: &[Track]) -> Option<usize> {
    tracks.iter().position(is_meta_track)
}

/// The MIDI port number of a track, taken from its first `midi_port` meta.
pub fn get_track_port(track: &Track) -> Option<u8> {
    track.iter().find_map(|event| match event.kind {
        TrackEventKind::Meta(MetaMessage::MidiPort(port)) => Some(port.as_int()),
        _ => None,
    })
}

/// Find the first track on the given port carrying a note-on for the given
/// channel.
pub fn get_track_by_port_channel(tracks: &[Track], port: u8, channel: u8) -> Option<usize> {
    tracks.iter().position(|track| {
        let has_matching_port = get_track_port(track) == Some(port);
        has_matching_port
            && track.iter().any(|event| match event.kind {
                TrackEventKind::Midi {
                    channel: event_channel,
                    message: MidiMessage::NoteOn { .. },
                } => event_channel.as_int() == channel,
                _ => false,
            })
    })
}

/// Absolute tick of the first note-on and the last note-off across all
/// tracks. The first-note time degrades to `0xFFFFFFFF` when no note exists.
pub fn get_first_and_last_note_times(tracks: &[Track]) -> (i64, i64) {
    let mut first_note_time: i64 = 0xFFFF_FFFF;
    let mut last_note_time: i64 = 0;
    for track in tracks {
        let mut absolute_time: i64 = 0;
        for event in track {
            absolute_time += event.delta.as_int() as i64;

            match event.kind {
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOn { .. },
                    ..
                } => {
                    if absolute_time < first_note_time {
                        first_note_time = absolute_time;
                    }
                }
                TrackEventKind::Midi {
                    message: MidiMessage::NoteOff { .. },
                    ..
                } => {
                    if absolute_time > last_note_time {
                        last_note_time = absolute_time;
                    }
                }
                _ => {}
            }
        }
    }
    (first_note_time, last_note_time)
}

/// Time signatures from all tracks as `(tick, numerator, denominator)`,
/// sorted by tick.
pub fn get_time_signatures(tracks: &[Track]) -> Vec<(i64, u8, u32)> {
    let mut time_signatures: Vec<(i64, u8, u32)> = Vec::new();
    for track in tracks {
        let mut absolute_tick: i64 = 0;
        for event in track {
            absolute_tick += event.delta.as_int() as i64;
            if let TrackEventKind::Meta(MetaMessage::TimeSignature(
                numerator,
                denominator_log2,
                _,
                _,
            )) = event.kind
            {
                time_signatures.push((absolute_tick, numerator, 1u32 << denominator_log2));
            }
        }
    }
    time_signatures.sort_by_key(|&(tick, _, _)| tick);
    time_signatures
}
