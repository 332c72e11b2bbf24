use std::io::{Read, Seek, Write};

use byteorder::{BigEndian, WriteBytesExt};
use log::info;

use crate::dtype::OkdError;
use crate::peek_n_bytes;

use super::scramble_pattern::OKD_SCRAMBLE_PATTERN;

pub fn choose_scramble_pattern_index() -> u8 {
    rand::random::<u8>()
}

/// Read one 16-bit word, or None at a clean end of stream. A single trailing
/// byte is a hard error since the transform only works on whole words.
fn read_word<R: Read>(reader: &mut R) -> Result<Option<u16>, OkdError> {
    let mut buf = [0u8; 2];
    let n = reader.read(&mut buf)?;
    match n {
        0 => Ok(None),
        1 => {
            let m = reader.read(&mut buf[1..])?;
            if m == 0 {
                return Err(OkdError::OddLength(1));
            }
            Ok(Some(u16::from_be_bytes(buf)))
        }
        _ => Ok(Some(u16::from_be_bytes(buf))),
    }
}

fn transform<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    scramble_pattern_index: u8,
    length: Option<u64>,
) -> Result<u8, OkdError> {
    if let Some(length) = length {
        if length % 2 != 0 {
            return Err(OkdError::OddLength(length));
        }
    }

    let mut index = scramble_pattern_index as usize;
    let mut processed: u64 = 0;
    while length.map_or(true, |length| processed < length) {
        let word = match read_word(input)? {
            Some(word) => word,
            None => {
                if length.is_none() {
                    break;
                }
                return Err(OkdError::UnexpectedEnd);
            }
        };
        let pattern = OKD_SCRAMBLE_PATTERN[index % 0x100];
        output.write_u16::<BigEndian>(word ^ pattern)?;
        index += 1;
        processed += 2;
    }
    Ok((index % 0x100) as u8)
}

/// Scramble `length` bytes (or the whole stream) under the pattern starting
/// at `scramble_pattern_index`. Returns the pattern index after the last
/// word.
pub fn scramble<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    scramble_pattern_index: u8,
    length: Option<u64>,
) -> Result<u8, OkdError> {
    transform(input, output, scramble_pattern_index, length)
}

/// The inverse of [`scramble`]. XOR makes them the same transform.
pub fn descramble<R: Read, W: Write>(
    input: &mut R,
    output: &mut W,
    scramble_pattern_index: u8,
    length: Option<u64>,
) -> Result<u8, OkdError> {
    transform(input, output, scramble_pattern_index, length)
}

/// Detect the scramble pattern index from the leading four bytes without
/// consuming them. `None` means the file is plaintext.
pub fn detect_scramble_pattern_index<R: Read + Seek>(
    reader: &mut R,
    expected_magic_bytes: &[u8; 4],
) -> Result<Option<u8>, OkdError> {
    let expected = u32::from_be_bytes(*expected_magic_bytes);

    let magic_bytes = peek_n_bytes!(reader, 4).map_err(|_| OkdError::ShortRead)?;
    let magic = u32::from_be_bytes(magic_bytes);
    if magic == expected {
        info!("OKD file is not scrambled.");
        return Ok(None);
    }

    info!("OKD file is scrambled.");
    let expected_pattern = magic ^ expected;
    for scramble_pattern_index in 0..0x100usize {
        let next = OKD_SCRAMBLE_PATTERN[(scramble_pattern_index + 1) % 0x100];
        let candidate =
            ((OKD_SCRAMBLE_PATTERN[scramble_pattern_index] as u32) << 16) | next as u32;
        if candidate == expected_pattern {
            info!(
                "OKD file scramble pattern index detected. scramble_pattern_index={}",
                scramble_pattern_index
            );
            return Ok(Some(scramble_pattern_index as u8));
        }
    }
    Err(OkdError::ScrambleDetect)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn round_trip_restores_input_and_index() {
        let plaintext: Vec<u8> = (0u8..=251).collect();
        for &index in &[0u8, 1, 127, 255] {
            let mut scrambled = Vec::new();
            let last_scramble =
                scramble(&mut Cursor::new(&plaintext), &mut scrambled, index, None).unwrap();
            assert_ne!(scrambled, plaintext);

            let mut restored = Vec::new();
            let last_descramble =
                descramble(&mut Cursor::new(&scrambled), &mut restored, index, None).unwrap();
            assert_eq!(restored, plaintext);
            assert_eq!(last_scramble, last_descramble);
        }
    }

    #[test]
    fn index_wraps_past_the_table_end() {
        let plaintext = vec![0u8; 8];
        let mut output = Vec::new();
        let last = scramble(&mut Cursor::new(&plaintext), &mut output, 0xFE, None).unwrap();
        assert_eq!(last, 0x02);
        assert_eq!(
            output[0..2],
            OKD_SCRAMBLE_PATTERN[0xFE].to_be_bytes(),
        );
        assert_eq!(output[4..6], OKD_SCRAMBLE_PATTERN[0x00].to_be_bytes());
    }

    #[test]
    fn odd_length_is_rejected() {
        let mut output = Vec::new();
        assert!(matches!(
            scramble(&mut Cursor::new(&[0u8; 4]), &mut output, 0, Some(3)),
            Err(OkdError::OddLength(3))
        ));
    }

    #[test]
    fn bounded_transform_past_end_of_stream_fails() {
        let mut output = Vec::new();
        assert!(matches!(
            descramble(&mut Cursor::new(&[0u8; 2]), &mut output, 0, Some(4)),
            Err(OkdError::UnexpectedEnd)
        ));
    }

    #[test]
    fn detection_finds_every_index() {
        let magic = *b"YKS1";
        for index in 0..=0xFFu8 {
            let mut scrambled = Vec::new();
            scramble(&mut Cursor::new(&magic[..]), &mut scrambled, index, None).unwrap();
            let detected =
                detect_scramble_pattern_index(&mut Cursor::new(&scrambled), &magic).unwrap();
            assert_eq!(detected, Some(index));
        }
    }

    #[test]
    fn detection_passes_plaintext_through() {
        let magic = *b"YKS1";
        let mut reader = Cursor::new(b"YKS1rest".to_vec());
        assert_eq!(
            detect_scramble_pattern_index(&mut reader, &magic).unwrap(),
            None
        );
        // Peek only.
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn detection_failure_is_reported() {
        // Flipping one bit of a valid scrambled magic cannot match any
        // pattern pair since all pairs are distinct words.
        let magic = *b"YKS1";
        let mut scrambled = Vec::new();
        scramble(&mut Cursor::new(&magic[..]), &mut scrambled, 42, None).unwrap();
        scrambled[1] ^= 0x01;
        scrambled[3] ^= 0x80;
        let result = detect_scramble_pattern_index(&mut Cursor::new(&scrambled), &magic);
        assert!(matches!(result, Err(OkdError::ScrambleDetect)));
    }
}
