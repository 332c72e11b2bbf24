//! Decoder for the ADPCM variant shared by OKD audio chunks and MTF assets.
//!
//! The stream is made of 128-byte frames, 18 frames to a frame group, with
//! 20 bytes of padding between groups. Each frame carries 16 parameter bytes
//! and 112 packed sample bytes and decodes to 224 signed 16-bit samples.

use std::io::{Read, Seek, SeekFrom};

use crate::dtype::{round_half_even, OkdError};

pub const FRAMES_PER_FRAME_GROUP: usize = 18;

pub const SUB_FRAMES: usize = 4;
pub const SUB_FRAME_NIBBLES: usize = 28;
pub const SAMPLES_PER_FRAME: usize = SUB_FRAME_NIBBLES * SUB_FRAMES * 2;
pub const SAMPLES_PER_FRAME_GROUP: usize = SAMPLES_PER_FRAME * FRAMES_PER_FRAME_GROUP;

/// Bytes of padding between frame groups.
pub const FRAME_GROUP_PADDING: i64 = 20;

const SHIFT_LIMIT: u8 = 12;
const INDEX_LIMIT: u8 = 3;

const K0: [f64; 4] = [0.0, 0.9375, 1.796875, 1.53125];
const K1: [f64; 4] = [0.0, 0.0, -0.8125, -0.859375];
const SIGNED_NIBBLES: [i32; 16] = [0, 1, 2, 3, 4, 5, 6, 7, -8, -7, -6, -5, -4, -3, -2, -1];

pub struct AdpcmFrame {
    parameters: [u8; 16],
    samples: [u8; 112],
}

impl AdpcmFrame {
    pub fn read<R: Read>(reader: &mut R) -> Result<AdpcmFrame, OkdError> {
        let mut buffer = [0u8; 128];
        reader
            .read_exact(&mut buffer)
            .map_err(|_| OkdError::ShortRead)?;

        let mut parameters = [0u8; 16];
        parameters.copy_from_slice(&buffer[0..16]);
        let mut samples = [0u8; 112];
        samples.copy_from_slice(&buffer[16..128]);

        Ok(AdpcmFrame {
            parameters,
            samples,
        })
    }
}

/// Two-tap predictive decoder. `prev1`/`prev2` carry the sample history
/// across frames and frame groups.
pub struct AdpcmDecoder {
    prev1: i32,
    prev2: i32,
}

impl Default for AdpcmDecoder {
    fn default() -> Self {
        AdpcmDecoder::new()
    }
}

impl AdpcmDecoder {
    pub fn new() -> AdpcmDecoder {
        AdpcmDecoder { prev1: 0, prev2: 0 }
    }

    fn clamp16(value: f64) -> i32 {
        if value > 32767.0 {
            32767
        } else if value < -32768.0 {
            -32768
        } else {
            round_half_even(value) as i32
        }
    }

    fn decode_sample(&mut self, sp: u8, su: u8) -> Result<i16, OkdError> {
        let shift = sp & 0x0F;
        if shift > SHIFT_LIMIT {
            return Err(OkdError::BadAdpcmShift(shift));
        }
        let index = sp >> 4;
        if index > INDEX_LIMIT {
            return Err(OkdError::BadAdpcmIndex(index));
        }

        let predicted = SIGNED_NIBBLES[su as usize] << (12 - (shift & 0x1F));
        let sample = predicted as f64
            + K0[index as usize] * self.prev1 as f64
            + K1[index as usize] * self.prev2 as f64;
        let sample = AdpcmDecoder::clamp16(sample);

        self.prev2 = self.prev1;
        self.prev1 = sample;

        Ok(sample as i16)
    }

    /// Decode one 28-nibble pass of a subframe. `nibble` selects the half of
    /// each sample byte: 0 for the low nibble, 1 for the high.
    fn decode_subframe(
        &mut self,
        sp: u8,
        samples: &[u8; 112],
        subframe_index: usize,
        nibble: usize,
    ) -> Result<Vec<i16>, OkdError> {
        let mut decoded = Vec::with_capacity(SUB_FRAME_NIBBLES);
        for i in 0..SUB_FRAME_NIBBLES {
            let su = samples[i * SUB_FRAMES + subframe_index];
            let su = if nibble != 0 { su >> 4 } else { su & 0x0F };
            decoded.push(self.decode_sample(sp, su)?);
        }
        Ok(decoded)
    }

    fn decode_frame(&mut self, frame: &AdpcmFrame) -> Result<Vec<i16>, OkdError> {
        let mut decoded = Vec::with_capacity(SAMPLES_PER_FRAME);
        for i in 0..SUB_FRAMES {
            for j in 0..2 {
                // Parameter pairs for subframes 2 and 3 sit four slots up.
                let mut sp_index = j + i * 2;
                if i >= 2 {
                    sp_index += 4;
                }
                let sp = frame.parameters[sp_index];
                decoded.extend(self.decode_subframe(sp, &frame.samples, i, j)?);
            }
        }
        Ok(decoded)
    }

    fn decode_frame_group<R: Read>(&mut self, reader: &mut R) -> Result<Vec<i16>, OkdError> {
        let mut decoded = Vec::with_capacity(SAMPLES_PER_FRAME_GROUP);
        for _ in 0..FRAMES_PER_FRAME_GROUP {
            let frame = AdpcmFrame::read(reader)?;
            decoded.extend(self.decode_frame(&frame)?);
        }
        Ok(decoded)
    }

    /// Decode frame groups until a frame read fails or a parameter is out of
    /// range. Malformed input ends decoding cleanly; only complete frame
    /// groups contribute samples.
    pub fn decode<R: Read + Seek>(&mut self, reader: &mut R) -> Vec<i16> {
        let mut decoded = Vec::new();
        loop {
            match self.decode_frame_group(reader) {
                Ok(frame_group) => decoded.extend(frame_group),
                Err(_) => break,
            }
            // Skip null bytes
            if reader.seek(SeekFrom::Current(FRAME_GROUP_PADDING)).is_err() {
                break;
            }
        }
        decoded
    }
}
