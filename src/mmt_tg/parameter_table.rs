//! Strongly-typed views over the MMT-TG native parameter memory and their
//! translation into standard control/program change messages.

use midly::{num::{u4, u7, u28}, MidiMessage, TrackEvent, TrackEventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
    pub master_tune: u16,
    pub master_volume: u8,
    pub transpose: u8,
    pub master_pan: u8,
    pub master_cutoff: u8,
    pub master_pitch_modulation_depth: u8,
    pub variation_effect_send_control_change_number: u8,
}

impl System {
    pub fn from_memory(memory: &[u8]) -> System {
        System {
            master_tune: (((memory[0x000000] & 0x0F) as u16) << 12)
                | (((memory[0x000001] & 0x0F) as u16) << 8)
                | (((memory[0x000002] & 0x0F) as u16) << 4)
                | (memory[0x000003] & 0x0F) as u16,
            master_volume: memory[0x000004],
            transpose: memory[0x000005],
            master_pan: memory[0x000006],
            master_cutoff: memory[0x000007],
            master_pitch_modulation_depth: memory[0x000008],
            variation_effect_send_control_change_number: memory[0x000009],
        }
    }
}

/// One multi part's worth of the native parameter table. Field order mirrors
/// the device memory layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiPartEntry {
    pub bank_select_msb: u8,
    pub bank_select_lsb: u8,
    pub program_number: u8,
    pub rcv_channel: u8,
    pub rcv_pitch_bend: u8,
    pub rcv_ch_after_touch: u8,
    pub rcv_program_change: u8,
    pub rcv_control_change: u8,
    pub rcv_poly_after_touch: u8,
    pub rcv_note_message: u8,
    pub rcv_rpn: u8,
    pub rcv_nrpn: u8,
    pub rcv_modulation: u8,
    pub rcv_volume: u8,
    pub rcv_pan: u8,
    pub rcv_expression: u8,
    pub rcv_hold_1: u8,
    pub rcv_portamento: u8,
    pub rcv_sostenuto: u8,
    pub rcv_soft_pedal: u8,

    pub mono_poly_mode: u8,
    pub same_note_number_key_on_assign: u8,
    pub part_mode: u8,
    pub note_shift: u8,
    pub detune: u8,
    pub volume: u8,
    pub velocity_sense_depth: u8,
    pub velocity_sense_offset: u8,
    pub pan: u8,
    pub note_limit_low: u8,
    pub note_limit_high: u8,
    pub ac_1_controller_number: u8,
    pub ac_2_controller_number: u8,
    pub dry_level: u8,
    pub chorus_send: u8,
    pub reverb_send: u8,
    pub variation_send: u8,

    pub vibrato_rate: u8,
    pub vibrato_depth: u8,
    pub filter_cutoff_frequency: u8,
    pub filter_resonance: u8,
    pub eg_attack_time: u8,
    pub eg_decay_time: u8,
    pub eg_release_time: u8,
    pub vibrato_delay: u8,

    pub scale_tuning: [u8; 12],

    pub mw_pitch_control: u8,
    pub mw_filter_control: u8,
    pub mw_amplitude_control: u8,
    pub mw_lfo_pmod_depth: u8,
    pub mw_lfo_fmod_depth: u8,

    pub bend_pitch_control: u8,
    pub bend_filter_control: u8,
    pub bend_amplitude_control: u8,
    pub bend_lfo_pmod_depth: u8,
    pub bend_lfo_fmod_depth: u8,

    pub cat_pitch_control: u8,
    pub cat_filter_control: u8,
    pub cat_amplitude_control: u8,
    pub cat_lfo_pmod_depth: u8,
    pub cat_lfo_fmod_depth: u8,

    pub pat_pitch_control: u8,
    pub pat_filter_control: u8,
    pub pat_amplitude_control: u8,
    pub pat_lfo_pmod_depth: u8,
    pub pat_lfo_fmod_depth: u8,

    pub ac_1_pitch_control: u8,
    pub ac_1_filter_control: u8,
    pub ac_1_amplitude_control: u8,
    pub ac_1_lfo_pmod_depth: u8,
    pub ac_1_lfo_fmod_depth: u8,

    pub ac_2_pitch_control: u8,
    pub ac_2_filter_control: u8,
    pub ac_2_amplitude_control: u8,
    pub ac_2_lfo_pmod_depth: u8,
    pub ac_2_lfo_fmod_depth: u8,

    pub portamento_switch: u8,
    pub portamento_time: u8,
}

fn control_change(channel: u8, control: u8, value: u8, delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(channel & 0x0F),
            message: MidiMessage::Controller {
                controller: u7::new(control & 0x7F),
                value: u7::new(value & 0x7F),
            },
        },
    }
}

fn program_change(channel: u8, program: u8, delta: u32) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::new(delta),
        kind: TrackEventKind::Midi {
            channel: u4::new(channel & 0x0F),
            message: MidiMessage::ProgramChange {
                program: u7::new(program & 0x7F),
            },
        },
    }
}

impl MultiPartEntry {
    /// Part number to the index of its entry in device memory.
    pub const PART_NUMBER_TO_ENTRY_INDEX_TABLE: [u8; 32] = [
        0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x00, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x19, 0x10, 0x1A, 0x1B, 0x1C, 0x1D,
        0x1E, 0x1F,
    ];

    /// The inverse of [`Self::PART_NUMBER_TO_ENTRY_INDEX_TABLE`].
    pub const ENTRY_INDEX_TO_PART_NUMBER_TABLE: [u8; 32] = [
        0x09, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F, 0x19, 0x10, 0x11, 0x12, 0x13, 0x14, 0x15, 0x16, 0x17, 0x18, 0x1A, 0x1B, 0x1C, 0x1D,
        0x1E, 0x1F,
    ];

    pub fn from_memory(memory: &[u8], part_number: usize) -> MultiPartEntry {
        let entry_index = MultiPartEntry::PART_NUMBER_TO_ENTRY_INDEX_TABLE[part_number] as usize;
        let entry_address = 0x008000 + (entry_index << 7);
        let at = |offset: usize| memory[entry_address + offset];

        let mut scale_tuning = [0u8; 12];
        for (i, tuning) in scale_tuning.iter_mut().enumerate() {
            *tuning = at(0x2F + i);
        }

        MultiPartEntry {
            bank_select_msb: at(0x01),
            bank_select_lsb: at(0x02),
            program_number: at(0x03),
            rcv_channel: at(0x04),
            rcv_pitch_bend: at(0x05),
            rcv_ch_after_touch: at(0x06),
            rcv_program_change: at(0x07),
            rcv_control_change: at(0x08),
            rcv_poly_after_touch: at(0x09),
            rcv_note_message: at(0x0A),
            rcv_rpn: at(0x0B),
            rcv_nrpn: at(0x0C),
            rcv_modulation: at(0x0D),
            rcv_volume: at(0x0E),
            rcv_pan: at(0x0F),
            rcv_expression: at(0x10),
            rcv_hold_1: at(0x11),
            rcv_portamento: at(0x12),
            rcv_sostenuto: at(0x13),
            rcv_soft_pedal: at(0x14),
            mono_poly_mode: at(0x15),
            same_note_number_key_on_assign: at(0x16),
            part_mode: at(0x17),
            note_shift: at(0x18),
            detune: ((at(0x19) & 0x0F) << 4) | (at(0x1A) & 0x0F),
            volume: at(0x1B),
            velocity_sense_depth: at(0x1C),
            velocity_sense_offset: at(0x1D),
            pan: at(0x1E),
            note_limit_low: at(0x1F),
            note_limit_high: at(0x20),
            ac_1_controller_number: at(0x21),
            ac_2_controller_number: at(0x22),
            dry_level: at(0x23),
            chorus_send: at(0x24),
            reverb_send: at(0x25),
            variation_send: at(0x26),
            vibrato_rate: at(0x27),
            vibrato_depth: at(0x28),
            filter_cutoff_frequency: at(0x29),
            filter_resonance: at(0x2A),
            eg_attack_time: at(0x2B),
            eg_decay_time: at(0x2C),
            eg_release_time: at(0x2D),
            vibrato_delay: at(0x2E),
            scale_tuning,
            mw_pitch_control: at(0x3B),
            mw_filter_control: at(0x3C),
            mw_amplitude_control: at(0x3D),
            mw_lfo_pmod_depth: at(0x3E),
            mw_lfo_fmod_depth: at(0x3F),
            bend_pitch_control: at(0x41),
            bend_filter_control: at(0x42),
            bend_amplitude_control: at(0x43),
            bend_lfo_pmod_depth: at(0x44),
            bend_lfo_fmod_depth: at(0x45),
            cat_pitch_control: at(0x47),
            cat_filter_control: at(0x48),
            cat_amplitude_control: at(0x49),
            cat_lfo_pmod_depth: at(0x4A),
            cat_lfo_fmod_depth: at(0x4B),
            pat_pitch_control: at(0x4D),
            pat_filter_control: at(0x4E),
            pat_amplitude_control: at(0x4F),
            pat_lfo_pmod_depth: at(0x50),
            pat_lfo_fmod_depth: at(0x51),
            ac_1_pitch_control: at(0x53),
            ac_1_filter_control: at(0x54),
            ac_1_amplitude_control: at(0x55),
            ac_1_lfo_pmod_depth: at(0x56),
            ac_1_lfo_fmod_depth: at(0x57),
            ac_2_pitch_control: at(0x59),
            ac_2_filter_control: at(0x5A),
            ac_2_amplitude_control: at(0x5B),
            ac_2_lfo_pmod_depth: at(0x5C),
            ac_2_lfo_fmod_depth: at(0x5D),
            portamento_switch: at(0x5F),
            portamento_time: at(0x60),
        }
    }

    /// Express this entry (or its delta against `previous`) as standard
    /// control/program changes. Only fields with a documented controller
    /// mapping produce messages; changed fields emit in memory-layout order.
    pub fn to_midi_messages(
        &self,
        previous: Option<&MultiPartEntry>,
        channel: u8,
        delta_time: u32,
    ) -> Vec<TrackEvent<'static>> {
        let changed =
            |get: fn(&MultiPartEntry) -> u8| previous.map_or(true, |p| get(p) != get(self));

        let mut messages = Vec::new();
        if changed(|e| e.bank_select_msb) {
            messages.push(control_change(channel, 0x00, self.bank_select_msb, delta_time));
        }
        if changed(|e| e.bank_select_lsb) {
            messages.push(control_change(channel, 0x20, self.bank_select_lsb, delta_time));
        }
        if changed(|e| e.program_number) {
            messages.push(program_change(channel, self.program_number, delta_time));
        }
        if changed(|e| e.volume) {
            messages.push(control_change(channel, 0x07, self.volume, delta_time));
        }
        if changed(|e| e.pan) {
            messages.push(control_change(channel, 0x0A, self.pan, delta_time));
        }
        if changed(|e| e.chorus_send) {
            messages.push(control_change(channel, 0x5D, self.chorus_send, delta_time));
        }
        if changed(|e| e.reverb_send) {
            messages.push(control_change(channel, 0x5B, self.reverb_send, delta_time));
        }
        if changed(|e| e.variation_send) {
            messages.push(control_change(channel, 0x5E, self.variation_send, delta_time));
        }
        if changed(|e| e.vibrato_rate) {
            messages.push(control_change(channel, 0x4C, self.vibrato_rate, delta_time));
        }
        if changed(|e| e.vibrato_depth) {
            messages.push(control_change(channel, 0x4D, self.vibrato_depth, delta_time));
        }
        if changed(|e| e.vibrato_delay) {
            messages.push(control_change(channel, 0x4E, self.vibrato_delay, delta_time));
        }
        if changed(|e| e.bend_pitch_control) {
            // Pitch bend range goes out through RPN 0000 + data entry.
            messages.push(control_change(channel, 0x65, 0x00, delta_time));
            messages.push(control_change(channel, 0x64, 0x00, 0));
            messages.push(control_change(
                channel,
                0x06,
                self.bend_pitch_control.saturating_sub(0x40),
                0,
            ));
        }
        if changed(|e| e.portamento_switch) {
            let value = if self.portamento_switch == 0x00 { 0x00 } else { 0x7F };
            messages.push(control_change(channel, 0x41, value, delta_time));
        }
        if changed(|e| e.portamento_time) {
            messages.push(control_change(channel, 0x05, self.portamento_time, delta_time));
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use crate::mmt_tg::MmtTg;

    use super::*;

    fn controller_of(event: &TrackEvent) -> Option<(u8, u8)> {
        match event.kind {
            TrackEventKind::Midi {
                message: MidiMessage::Controller { controller, value },
                ..
            } => Some((controller.as_int(), value.as_int())),
            _ => None,
        }
    }

    #[test]
    fn initial_snapshot_emits_the_full_mapped_set() {
        let device = MmtTg::new();
        let entry = device.multi_part_entry(0);
        let messages = entry.to_midi_messages(None, 0, 0);

        let controllers: Vec<u8> = messages
            .iter()
            .filter_map(controller_of)
            .map(|(controller, _)| controller)
            .collect();
        assert_eq!(
            controllers,
            vec![
                0x00, 0x20, 0x07, 0x0A, 0x5D, 0x5B, 0x5E, 0x4C, 0x4D, 0x4E, 0x65, 0x64, 0x06,
                0x41, 0x05
            ]
        );
        // One program change in between.
        assert!(messages.iter().any(|event| matches!(
            event.kind,
            TrackEventKind::Midi {
                message: MidiMessage::ProgramChange { .. },
                ..
            }
        )));
        // Default bend range 0x42 becomes a data entry of 2.
        assert!(messages
            .iter()
            .filter_map(controller_of)
            .any(|pair| pair == (0x06, 0x02)));
    }

    #[test]
    fn diff_emits_only_changed_fields() {
        let device = MmtTg::new();
        let before = device.multi_part_entry(0);
        let mut after = before.clone();
        after.volume = 0x22;
        after.reverb_send = 0x13;

        let messages = after.to_midi_messages(Some(&before), 3, 42);
        let pairs: Vec<(u8, u8)> = messages.iter().filter_map(controller_of).collect();
        assert_eq!(pairs, vec![(0x07, 0x22), (0x5B, 0x13)]);
        assert!(messages
            .iter()
            .all(|event| event.delta.as_int() == 42));

        // Unmapped fields change nothing.
        let mut after = before.clone();
        after.rcv_volume = 0x00;
        after.eg_attack_time = 0x55;
        assert!(after.to_midi_messages(Some(&before), 0, 0).is_empty());
    }

    #[test]
    fn portamento_switch_is_boolean() {
        let device = MmtTg::new();
        let before = device.multi_part_entry(0);
        let mut after = before.clone();
        after.portamento_switch = 0x01;
        let messages = after.to_midi_messages(Some(&before), 0, 0);
        assert_eq!(messages.iter().filter_map(controller_of).collect::<Vec<_>>(), vec![(0x41, 0x7F)]);
    }

    #[test]
    fn part_number_tables_are_inverse() {
        for part_number in 0..32usize {
            let entry_index =
                MultiPartEntry::PART_NUMBER_TO_ENTRY_INDEX_TABLE[part_number] as usize;
            assert_eq!(
                MultiPartEntry::ENTRY_INDEX_TO_PART_NUMBER_TABLE[entry_index] as usize,
                part_number
            );
        }
    }

    #[test]
    fn system_view_reads_the_low_memory() {
        let mut memory = vec![0u8; 0x20_0000];
        memory[0x000000] = 0x01;
        memory[0x000001] = 0x02;
        memory[0x000002] = 0x03;
        memory[0x000003] = 0x04;
        memory[0x000004] = 0x7F;
        let system = System::from_memory(&memory);
        assert_eq!(system.master_tune, 0x1234);
        assert_eq!(system.master_volume, 0x7F);
    }
}
