//! Piecewise linear conversion between MIDI ticks and milliseconds over an
//! ordered list of tempo changes.

use midly::{MetaMessage, Smf, Timing, TrackEventKind};

use crate::dtype::{round_half_even, OkdError};

pub fn tempo_to_bpm(tempo: u32) -> f64 {
    60_000_000.0 / tempo as f64
}

pub fn bpm_to_tempo(bpm: f64) -> u32 {
    round_half_even(60_000_000.0 / bpm) as u32
}

pub struct MidiTimeConverter {
    pub ppqn: u16,
    /// Tempo changes (position_ms, tempo_bpm), kept sorted by position.
    pub tempo_changes: Vec<(i64, f64)>,
}

impl Default for MidiTimeConverter {
    fn default() -> Self {
        MidiTimeConverter::new()
    }
}

impl MidiTimeConverter {
    pub fn new() -> MidiTimeConverter {
        MidiTimeConverter {
            ppqn: 480,
            tempo_changes: Vec::new(),
        }
    }

    /// Add a tempo change event at the specified position.
    pub fn add_tempo_change(&mut self, position_ms: i64, tempo_bpm: f64) {
        self.tempo_changes.push((position_ms, tempo_bpm));
        self.tempo_changes
            .sort_by_key(|&(position_ms, _)| position_ms);
    }

    /// Load tempo changes from the first tempo-bearing track of an SMF.
    pub fn load_from_midi(&mut self, smf: &Smf) {
        if let Timing::Metrical(ticks_per_beat) = smf.header.timing {
            self.ppqn = ticks_per_beat.as_int();
        }

        let mut current_time_ms = 0.0f64;
        let mut current_tempo: u32 = 500_000; // 120 BPM

        self.tempo_changes = vec![(0, tempo_to_bpm(current_tempo))];

        let tempo_track = smf.tracks.iter().find(|track| {
            track
                .iter()
                .any(|event| matches!(event.kind, TrackEventKind::Meta(MetaMessage::Tempo(_))))
        });

        if let Some(tempo_track) = tempo_track {
            for event in tempo_track {
                let delta = event.delta.as_int();
                if delta > 0 {
                    let ms_per_tick = current_tempo as f64 / (self.ppqn as f64 * 1000.0);
                    current_time_ms += delta as f64 * ms_per_tick;
                }

                if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                    current_tempo = tempo.as_int();
                    self.add_tempo_change(round_half_even(current_time_ms), tempo_to_bpm(current_tempo));
                }
            }
        }
    }

    fn ticks_at_tempo(&self, duration_ms: f64, tempo_bpm: f64) -> f64 {
        let microseconds_per_beat = 60_000_000.0 / tempo_bpm;
        let microseconds = duration_ms * 1000.0;
        (microseconds / microseconds_per_beat) * self.ppqn as f64
    }

    /// Convert milliseconds to MIDI ticks.
    pub fn ms_to_ticks(&self, time_ms: i64) -> Result<i64, OkdError> {
        if self.tempo_changes.is_empty() {
            return Err(OkdError::MissingTrack("tempo information"));
        }

        let mut total_ticks = 0.0f64;

        // Time before the first tempo change runs at the first tempo.
        if time_ms < self.tempo_changes[0].0 {
            return Ok(round_half_even(
                self.ticks_at_tempo(time_ms as f64, self.tempo_changes[0].1),
            ));
        }

        for (i, &(section_start, tempo_bpm)) in self.tempo_changes.iter().enumerate() {
            let section_end = if i < self.tempo_changes.len() - 1 {
                self.tempo_changes[i + 1].0
            } else {
                time_ms
            };
            let section_end = section_end.min(time_ms);

            let section_duration = section_end - section_start;
            if section_duration > 0 {
                total_ticks += self.ticks_at_tempo(section_duration as f64, tempo_bpm);
            }

            if section_end == time_ms {
                break;
            }
        }

        Ok(round_half_even(total_ticks))
    }

    /// Convert MIDI ticks to milliseconds.
    pub fn ticks_to_ms(&self, ticks: i64) -> Result<i64, OkdError> {
        if self.tempo_changes.is_empty() {
            return Err(OkdError::MissingTrack("tempo information"));
        }

        let mut remaining_ticks = ticks as f64;
        let mut current_time: i64 = 0;

        for (i, &(_, tempo_bpm)) in self.tempo_changes.iter().enumerate() {
            let section_ticks = if i < self.tempo_changes.len() - 1 {
                let section_duration = self.tempo_changes[i + 1].0 - self.tempo_changes[i].0;
                self.ticks_at_tempo(section_duration as f64, tempo_bpm)
            } else {
                remaining_ticks
            };

            if remaining_ticks <= section_ticks {
                let microseconds_per_beat = 60_000_000.0 / tempo_bpm;
                let ms = (remaining_ticks * microseconds_per_beat) / (self.ppqn as f64 * 1000.0);
                return Ok(round_half_even(current_time as f64 + ms));
            }

            remaining_ticks -= section_ticks;
            current_time = self.tempo_changes[i + 1].0;
        }

        Ok(current_time)
    }
}
