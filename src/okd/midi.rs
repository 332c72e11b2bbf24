//! The OKD flavor of MIDI byte-stream primitives: status/data byte
//! validation and the proprietary 6-bit-continuation variable int used for
//! delta times and note durations.

use std::io::{Read, Seek, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};

use crate::dtype::OkdError;
use crate::peek_byte;

/// Largest value the plain (non-extended) variable int can carry.
pub const MAX_VARIABLE_INT: u64 = 0x04103F;

pub fn read_status_byte<R: Read>(reader: &mut R) -> Result<u8, OkdError> {
    let byte = reader.read_u8().map_err(|_| OkdError::ShortRead)?;
    if byte & 0x80 != 0x80 {
        return Err(OkdError::BadStatusByte {
            byte,
            expected: "status",
        });
    }
    Ok(byte)
}

pub fn peek_status_byte<R: Read + Seek>(reader: &mut R) -> Result<u8, OkdError> {
    let byte = peek_byte!(reader).map_err(|_| OkdError::ShortRead)?;
    if byte & 0x80 != 0x80 {
        return Err(OkdError::BadStatusByte {
            byte,
            expected: "status",
        });
    }
    Ok(byte)
}

pub fn read_data_byte<R: Read>(reader: &mut R) -> Result<u8, OkdError> {
    let byte = reader.read_u8().map_err(|_| OkdError::ShortRead)?;
    if byte & 0x80 == 0x80 {
        return Err(OkdError::BadStatusByte {
            byte,
            expected: "data",
        });
    }
    Ok(byte)
}

pub fn peek_data_byte<R: Read + Seek>(reader: &mut R) -> Result<u8, OkdError> {
    let byte = peek_byte!(reader).map_err(|_| OkdError::ShortRead)?;
    if byte & 0x80 == 0x80 {
        return Err(OkdError::BadStatusByte {
            byte,
            expected: "data",
        });
    }
    Ok(byte)
}

pub fn is_data_bytes(data: &[u8]) -> bool {
    data.iter().all(|byte| byte & 0x80 != 0x80)
}

/// Read a variable int of up to three bytes. Each byte contributes its full
/// value shifted by six bits per position; bit 6 marks continuation. A third
/// byte still carrying the continuation bit is malformed.
pub fn read_variable_int<R: Read>(reader: &mut R) -> Result<u64, OkdError> {
    let mut value: u64 = 0;
    for i in 0..3 {
        let byte = read_data_byte(reader)?;
        value += (byte as u64) << (i * 6);
        if byte & 0x40 != 0x40 {
            return Ok(value);
        }
    }
    Err(OkdError::BadVarint)
}

pub fn write_variable_int<W: Write>(writer: &mut W, value: u64) -> Result<(), OkdError> {
    if value > MAX_VARIABLE_INT {
        return Err(OkdError::BadVarint);
    }

    let mut value = value;
    for i in 0..3 {
        let masked_value = value & (0x3Fu64 << (i * 6));
        let mut byte = (masked_value >> (i * 6)) as u8;
        let mut next_value = value - masked_value;
        if next_value != 0 {
            byte |= 0x40;
            next_value -= 0x40u64 << (i * 6);
        }
        value = next_value;
        writer.write_u8(byte)?;

        if value == 0 {
            if byte & 0x40 == 0x40 {
                writer.write_u8(0x00)?;
            }
            break;
        }
    }
    Ok(())
}

/// Read the chained extension of the variable int. A `0x00` start byte or
/// anything that is not a data byte (including end of stream) terminates the
/// chain; the values of all chained variable ints are summed.
pub fn read_extended_variable_int<R: Read + Seek>(reader: &mut R) -> Result<u64, OkdError> {
    let mut value: u64 = 0;
    loop {
        match peek_data_byte(reader) {
            Ok(0x00) => {
                // Maybe end of track
                return Ok(value);
            }
            Ok(_) => {}
            Err(_) => break,
        }
        value += read_variable_int(reader)?;
    }
    Ok(value)
}

pub fn write_extended_variable_int<W: Write>(writer: &mut W, value: u64) -> Result<(), OkdError> {
    let mut value = value;
    while value > 0 {
        let write_value = value.min(MAX_VARIABLE_INT);
        write_variable_int(writer, write_value)?;
        value -= write_value;
    }
    Ok(())
}
