//! Top-level OKD ⇄ SMF drivers and the info-chunk builders they rely on.

use log::info;
use midly::{num::{u4, u7}, MetaMessage, Smf, Track, TrackEvent, TrackEventKind};

use crate::dtype::OkdError;
use crate::midi::utils::{get_meta_track, get_track_by_port_channel};

use super::chunks::{
    ExtendedPTrackInfoChannelInfoEntry, ExtendedPTrackInfoChunk, ExtendedPTrackInfoEntry,
    MTrackInterpretation, OkdChunk, P3TrackInfoChunk, PTrackChunk, PTrackInfo,
    PTrackInfoChannelInfoEntry, PTrackInfoChunk, PTrackInfoEntry,
};
use super::m_track_conversion::midi_to_m_track;
use super::p_track_conversion::{midi_to_p3_track, midi_to_p_tracks, p_track_to_midi};
use super::{OkdFile, OkdHeader};

/// Build the P-track info chunk matching a set of P-track chunks. Up to two
/// tracks fit the v1 layout; more switch to the extended one.
pub fn p_track_info_chunk_from_p_tracks(p_track_chunks: &[PTrackChunk]) -> OkdChunk {
    if p_track_chunks.len() <= 2 {
        let mut entries: Vec<PTrackInfoEntry> = Vec::new();
        for p_track_chunk in p_track_chunks {
            let track_number = p_track_chunk.track_number();
            let ports =
                0x0001u8 << PTrackChunk::CHUNK_NUMBER_PORT_MAP[track_number as usize];
            let system_ex_ports: u16 = if track_number >= 2 { 4 } else { 1 };

            let channel_info = (0..16)
                .map(|channel| {
                    let exists_message = p_track_chunk.exists_channel_message(channel);
                    let channel_attribute: u8 = if track_number == 1 && channel == 9 {
                        127
                    } else {
                        255
                    };
                    PTrackInfoChannelInfoEntry {
                        attribute: if exists_message { channel_attribute } else { 0 },
                        ports,
                        control_change_ax: 0x00,
                        control_change_cx: 0x00,
                    }
                })
                .collect();

            entries.push(PTrackInfoEntry {
                track_number,
                track_status: 0x40,
                use_channel_group_flag: 0x0000,
                default_channel_groups: vec![0u16; 16],
                channel_groups: vec![0u16; 16],
                channel_info,
                system_ex_ports,
            });
        }

        OkdChunk::PTrackInfo(PTrackInfoChunk {
            id: *b"YPTI",
            data: entries,
        })
    } else {
        let mut entries: Vec<ExtendedPTrackInfoEntry> = Vec::new();
        for p_track_chunk in p_track_chunks {
            let track_number = p_track_chunk.track_number();
            let ports =
                0x0001u16 << PTrackChunk::CHUNK_NUMBER_PORT_MAP[track_number as usize];
            let system_ex_ports: u16 = if track_number >= 2 { 4 } else { 1 };

            let channel_info = (0..16)
                .map(|channel| {
                    let exists_message = p_track_chunk.exists_channel_message(channel);
                    let channel_attribute: u16 = if track_number == 1 && channel == 9 {
                        127
                    } else {
                        255
                    };
                    ExtendedPTrackInfoChannelInfoEntry {
                        attribute: if exists_message { channel_attribute } else { 0 },
                        ports,
                        unknown_0: 0x0000,
                        control_change_ax: 0x00,
                        control_change_cx: 0x00,
                    }
                })
                .collect();

            entries.push(ExtendedPTrackInfoEntry {
                track_number,
                track_status: 0x40,
                unused_0: 0x0000,
                default_channel_groups: vec![0u16; 16],
                channel_groups: vec![0u16; 16],
                channel_info,
                system_ex_ports,
                unknown_0: 0x0000,
            });
        }

        OkdChunk::ExtendedPTrackInfo(ExtendedPTrackInfoChunk {
            id: *b"YPXI",
            unknown_0: vec![0u8; 8],
            tg_mode: 0x0000,
            data: entries,
        })
    }
}

/// Build the P3 info chunk for a P3-track chunk.
pub fn p3_track_info_chunk_from_p_track(p_track_chunk: &PTrackChunk) -> P3TrackInfoChunk {
    let channel_info = (0..16)
        .map(|channel| PTrackInfoChannelInfoEntry {
            attribute: if p_track_chunk.exists_channel_message(channel) {
                255
            } else {
                0
            },
            ports: 0x04,
            control_change_ax: 0x00,
            control_change_cx: 0x00,
        })
        .collect();

    P3TrackInfoChunk {
        id: *b"YP3I",
        track_number: 0x02,
        track_status: 0x40,
        use_channel_group_flag: 0x0000,
        default_channel_groups: vec![0u16; 16],
        channel_groups: vec![0u16; 16],
        channel_info,
        system_ex_ports: 0x0004,
    }
}

/// Convert an OKD to a Standard MIDI File (serialized bytes).
pub fn okd_to_midi(okd: &OkdFile, sysex_to_text: bool) -> Result<Vec<u8>, OkdError> {
    info!("OKD loaded. header={:?}", okd.header);

    let mut m_track_interpretation: Option<MTrackInterpretation> = None;
    let mut p_track_info: Option<PTrackInfo> = None;
    let mut p_tracks: Vec<&PTrackChunk> = Vec::new();

    for chunk in &okd.chunks {
        match chunk {
            OkdChunk::MTrack(m_track) => {
                m_track_interpretation = Some(MTrackInterpretation::from_track(m_track));
            }
            OkdChunk::PTrackInfo(info) => {
                p_track_info = Some(PTrackInfo::Standard(info.clone()));
            }
            OkdChunk::ExtendedPTrackInfo(info) => {
                p_track_info = Some(PTrackInfo::Extended(info.clone()));
            }
            OkdChunk::P3TrackInfo(info) => {
                p_track_info = Some(PTrackInfo::P3(info.clone()));
            }
            OkdChunk::PTrack(p_track) => p_tracks.push(p_track),
            _ => {}
        }
    }

    let m_track_interpretation =
        m_track_interpretation.ok_or(OkdError::MissingChunk("M-Track"))?;
    let p_track_info = p_track_info.ok_or(OkdError::MissingChunk("P-Track information"))?;
    if p_tracks.is_empty() {
        return Err(OkdError::MissingChunk("P-Tracks"));
    }

    info!("Make P-Track MIDI file.");
    p_track_to_midi(
        &m_track_interpretation,
        &p_track_info,
        &p_tracks,
        sysex_to_text,
    )
}

/// Remap a track to the P3 destination: port 2, channel 14.
fn remap_p3_track<'a>(track: &Track<'a>) -> Track<'a> {
    track
        .iter()
        .map(|event| {
            let kind = match event.kind {
                TrackEventKind::Meta(MetaMessage::MidiPort(_)) => {
                    TrackEventKind::Meta(MetaMessage::MidiPort(u7::new(2)))
                }
                TrackEventKind::Midi { message, .. } => TrackEventKind::Midi {
                    channel: u4::new(14),
                    message,
                },
                kind => kind,
            };
            TrackEvent {
                delta: event.delta,
                kind,
            }
        })
        .collect()
}

/// Convert an SMF to the "playing" OKD and its companion P3 OKD.
pub fn midi_to_okds(smf: &Smf, header: &OkdHeader) -> Result<(OkdFile, OkdFile), OkdError> {
    let meta_track_index =
        get_meta_track(&smf.tracks).ok_or(OkdError::MissingTrack("meta track"))?;

    let m_track_chunk = midi_to_m_track(smf)?;

    let mut p_track_indices: Vec<usize> = Vec::new();
    for port in 0..2u8 {
        for channel in 0..16u8 {
            if let Some(index) = get_track_by_port_channel(&smf.tracks, port, channel) {
                p_track_indices.push(index);
            }
        }
    }
    if p_track_indices.is_empty() {
        return Err(OkdError::MissingTrack("P-Track"));
    }
    let mut p_track_midi = Smf::new(smf.header);
    p_track_midi
        .tracks
        .push(smf.tracks[meta_track_index].clone());
    for index in p_track_indices {
        p_track_midi.tracks.push(smf.tracks[index].clone());
    }
    let p_track_chunks = midi_to_p_tracks(&p_track_midi)?;
    let p_track_info_chunk = p_track_info_chunk_from_p_tracks(&p_track_chunks);

    let p3_track_index = get_track_by_port_channel(&smf.tracks, 1, 8)
        .ok_or(OkdError::MissingTrack("P3-Track"))?;
    let p3_track = remap_p3_track(&smf.tracks[p3_track_index]);
    let mut p3_track_midi = Smf::new(smf.header);
    p3_track_midi
        .tracks
        .push(smf.tracks[meta_track_index].clone());
    p3_track_midi.tracks.push(p3_track);
    let p3_track_chunk = midi_to_p3_track(&p3_track_midi)?;
    let p3_track_info_chunk = p3_track_info_chunk_from_p_track(&p3_track_chunk);

    let mut playing_chunks = vec![OkdChunk::MTrack(m_track_chunk), p_track_info_chunk];
    playing_chunks.extend(p_track_chunks.into_iter().map(OkdChunk::PTrack));
    let playing_okd = OkdFile {
        header: header.clone(),
        chunks: playing_chunks,
    };

    let p3_okd = OkdFile {
        header: header.clone(),
        chunks: vec![
            OkdChunk::P3TrackInfo(p3_track_info_chunk),
            OkdChunk::PTrack(p3_track_chunk),
        ],
    };

    Ok((playing_okd, p3_okd))
}
