use thiserror::Error;

#[macro_export]
macro_rules! peek_n_bytes {
    ($reader:ident, $n:literal) => {{
        let mut buf: [u8; $n] = [0; $n];
        $reader
            .read_exact(&mut buf)
            .and_then(|_| $reader.seek(std::io::SeekFrom::Current(-$n)))
            .map(move |_| buf)
    }};
}

#[macro_export]
macro_rules! peek_byte {
    ($reader:ident) => {{
        let mut buf: [u8; 1] = [0; 1];
        $reader
            .read_exact(&mut buf)
            .and_then(|_| $reader.seek(std::io::SeekFrom::Current(-1)))
            .map(move |_| buf[0])
    }};
}

#[derive(Debug, Error)]
pub enum OkdError {
    #[error("too few bytes read")]
    ShortRead,
    #[error("invalid magic bytes `{0:02X?}`")]
    BadMagic([u8; 4]),
    #[error("malformed variable int, or value too large for the non-extended form")]
    BadVarint,
    #[error("invalid byte {byte:#04X} where a {expected} byte is required")]
    BadStatusByte { byte: u8, expected: &'static str },
    #[error("unknown status byte {0:#04X}")]
    UnknownStatus(u8),
    #[error("unterminated SysEx message, stop byte {0:#04X}")]
    UnterminatedSysEx(u8),
    #[error("unknown compensation of alternative CC, leading data byte {0:#04X}")]
    UnknownCompensation(u8),
    #[error("ADPCM parameter `shift` {0} out of range")]
    BadAdpcmShift(u8),
    #[error("ADPCM parameter `index` {0} out of range")]
    BadAdpcmIndex(u8),
    #[error("failed to detect scramble pattern index")]
    ScrambleDetect,
    #[error("SPRC CRC mismatch, header {header:#06X} computed {computed:#06X}")]
    CrcMismatch { header: u16, computed: u16 },
    #[error("scramble length {0} must be a multiple of 2")]
    OddLength(u64),
    #[error("reached unexpected end of stream")]
    UnexpectedEnd,
    #[error("unknown chunk id `{0:02X?}`")]
    UnknownChunkId([u8; 4]),
    #[error("required chunk missing: {0}")]
    MissingChunk(&'static str),
    #[error("required track missing: {0}")]
    MissingTrack(&'static str),
    #[error("SMF parse error: {0}")]
    SmfParse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Round half to even.
pub fn round_half_even(value: f64) -> i64 {
    let floor = value.floor();
    let diff = value - floor;
    if diff > 0.5 {
        floor as i64 + 1
    } else if diff < 0.5 {
        floor as i64
    } else if (floor as i64) % 2 == 0 {
        floor as i64
    } else {
        floor as i64 + 1
    }
}
