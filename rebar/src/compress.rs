//! Deflate codec for BINARY! data.
//!
//! Raw deflate, zlib and gzip envelopes, plus the historical form that
//! appends the uncompressed length (32-bit little endian) to a zlib stream.
//! Decompression grows its output buffer until the stream completes; a
//! caller-supplied maximum bounds the growth.

use std::io::Write;

use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
use flate2::{Compression, Decompress, FlushDecompress, Status};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Raw,
    Zlib,
    Gzip,
    /// zlib followed by the uncompressed length
    ZlibWithLength,
}

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("decompressed data exceeds the {0} byte limit")]
    SizeLimit(usize),
    #[error("corrupt {envelope} data: {message}")]
    Corrupt { envelope: &'static str, message: String },
    #[error("truncated {0} data")]
    Truncated(&'static str),
    #[error("length trailer says {expected} bytes but {actual} were produced")]
    LengthMismatch { expected: usize, actual: usize },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Envelope {
    pub fn name(self) -> &'static str {
        match self {
            Envelope::Raw => "deflate",
            Envelope::Zlib | Envelope::ZlibWithLength => "zlib",
            Envelope::Gzip => "gzip",
        }
    }

    /// Guesses the envelope from the leading bytes.
    pub fn detect(data: &[u8]) -> Envelope {
        match data {
            [0x1f, 0x8b, ..] => Envelope::Gzip,
            [cmf, flg, ..] if cmf & 0x0f == 8 && (u16::from(*cmf) << 8 | u16::from(*flg)) % 31 == 0 => {
                Envelope::Zlib
            }
            _ => Envelope::Raw,
        }
    }
}

pub fn compress(data: &[u8], envelope: Envelope) -> Result<Vec<u8>, CompressError> {
    let level = Compression::default();
    let mut out = match envelope {
        Envelope::Raw => {
            let mut encoder = DeflateEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Envelope::Zlib | Envelope::ZlibWithLength => {
            let mut encoder = ZlibEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
        Envelope::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), level);
            encoder.write_all(data)?;
            encoder.finish()?
        }
    };
    if envelope == Envelope::ZlibWithLength {
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    Ok(out)
}

/// Decompresses `data`. `max` bounds the output size.
pub fn decompress(data: &[u8], envelope: Envelope, max: Option<usize>) -> Result<Vec<u8>, CompressError> {
    match envelope {
        Envelope::Raw => inflate(data, false, envelope, max, None),
        Envelope::Zlib => inflate(data, true, envelope, max, None),
        Envelope::ZlibWithLength => {
            let Some(split) = data.len().checked_sub(4) else {
                return Err(CompressError::Truncated(envelope.name()));
            };
            let (stream, trailer) = data.split_at(split);
            let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as usize;
            if let Some(max) = max
                && expected > max
            {
                return Err(CompressError::SizeLimit(max));
            }
            let out = inflate(stream, true, envelope, max, Some(expected))?;
            if out.len() != expected {
                return Err(CompressError::LengthMismatch {
                    expected,
                    actual: out.len(),
                });
            }
            Ok(out)
        }
        Envelope::Gzip => gunzip(data, max),
    }
}

/// Deflate never expands a stream by more than this factor.
const MAX_RATIO: usize = 1032;

/// Runs the decoder over `data`. `size_hint` comes from a trailer and is
/// not trusted beyond the largest output `data` could produce.
fn inflate(
    data: &[u8],
    zlib_header: bool,
    envelope: Envelope,
    max: Option<usize>,
    size_hint: Option<usize>,
) -> Result<Vec<u8>, CompressError> {
    let ceiling = data.len().saturating_mul(MAX_RATIO).max(64);
    let mut guess = size_hint
        .unwrap_or_else(|| data.len().saturating_mul(3))
        .clamp(64, ceiling);
    if let Some(max) = max {
        guess = guess.min(max.saturating_add(1));
    }
    let mut decoder = Decompress::new(zlib_header);
    let mut out = Vec::with_capacity(guess);
    loop {
        if out.len() == out.capacity() {
            let mut room = out.capacity().max(64);
            if let Some(max) = max {
                // one byte past the limit is enough to tell it was exceeded
                room = room.min(max.saturating_add(1) - out.len());
            }
            out.reserve(room);
        }
        let before = (decoder.total_in(), decoder.total_out());
        let input = &data[before.0 as usize..];
        let status = decoder
            .decompress_vec(input, &mut out, FlushDecompress::None)
            .map_err(|err| CompressError::Corrupt {
                envelope: envelope.name(),
                message: err.to_string(),
            })?;
        if let Some(max) = max
            && out.len() > max
        {
            return Err(CompressError::SizeLimit(max));
        }
        match status {
            Status::StreamEnd => return Ok(out),
            Status::Ok | Status::BufError => {
                let progressed = (decoder.total_in(), decoder.total_out()) != before;
                if !progressed && out.len() < out.capacity() {
                    // room was left, so the decoder wants input we do not have
                    return Err(CompressError::Truncated(envelope.name()));
                }
            }
        }
    }
}

/// Parses the gzip member header and trailer around a raw deflate body.
fn gunzip(data: &[u8], max: Option<usize>) -> Result<Vec<u8>, CompressError> {
    const FTEXT_MASK: u8 = 0x01;
    const FHCRC: u8 = 0x02;
    const FEXTRA: u8 = 0x04;
    const FNAME: u8 = 0x08;
    const FCOMMENT: u8 = 0x10;

    let truncated = || CompressError::Truncated("gzip");
    let corrupt = |message: &str| CompressError::Corrupt {
        envelope: "gzip",
        message: message.to_string(),
    };

    if data.len() < 18 {
        return Err(truncated());
    }
    if data[0] != 0x1f || data[1] != 0x8b {
        return Err(corrupt("bad magic"));
    }
    if data[2] != 8 {
        return Err(corrupt("unknown compression method"));
    }
    let flags = data[3] & !FTEXT_MASK;
    let mut at = 10;
    if flags & FEXTRA != 0 {
        let len = data.get(at..at + 2).ok_or_else(truncated)?;
        at += 2 + usize::from(u16::from_le_bytes([len[0], len[1]]));
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            let end = data.get(at..).ok_or_else(truncated)?.iter().position(|&b| b == 0).ok_or_else(truncated)?;
            at += end + 1;
        }
    }
    if flags & FHCRC != 0 {
        at += 2;
    }
    let body_end = data.len() - 8;
    if at > body_end {
        return Err(truncated());
    }
    let trailer = &data[body_end..];
    let expected = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]) as usize;
    let out = inflate(&data[at..body_end], false, Envelope::Gzip, max, Some(expected))?;
    if out.len() as u32 != expected as u32 {
        return Err(CompressError::LengthMismatch {
            expected,
            actual: out.len(),
        });
    }
    let crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let mut hasher = flate2::Crc::new();
    hasher.update(&out);
    if hasher.sum() != crc {
        return Err(corrupt("checksum mismatch"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(len: usize) -> Vec<u8> {
        // xorshift, so the data is not trivially compressible
        let mut state = 0x2545_f491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect()
    }

    #[test]
    fn every_envelope_round_trips() {
        let data = sample(70_000);
        for envelope in [Envelope::Raw, Envelope::Zlib, Envelope::Gzip, Envelope::ZlibWithLength] {
            let packed = compress(&data, envelope).unwrap();
            assert_eq!(decompress(&packed, envelope, None).unwrap(), data, "{envelope:?}");
        }
    }

    #[test]
    fn compressible_data_round_trips() {
        let data = b"abc".repeat(2000);
        for envelope in [Envelope::Raw, Envelope::Zlib, Envelope::Gzip, Envelope::ZlibWithLength] {
            let packed = compress(&data, envelope).unwrap();
            assert!(packed.len() * 20 < data.len(), "{envelope:?}");
            assert_eq!(decompress(&packed, envelope, None).unwrap(), data, "{envelope:?}");
            assert_eq!(decompress(&packed, envelope, Some(6000)).unwrap(), data, "{envelope:?}");
        }
        let zeros = vec![0u8; 1 << 20];
        let packed = compress(&zeros, Envelope::Zlib).unwrap();
        assert_eq!(decompress(&packed, Envelope::Zlib, None).unwrap(), zeros);
    }

    #[test]
    fn forged_length_trailers_are_rejected() {
        let mut packed = compress(b"hi", Envelope::Gzip).unwrap();
        let at = packed.len() - 4;
        packed[at..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decompress(&packed, Envelope::Gzip, None),
            Err(CompressError::LengthMismatch { actual: 2, .. })
        ));

        let mut packed = compress(b"hi", Envelope::ZlibWithLength).unwrap();
        let at = packed.len() - 4;
        packed[at..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decompress(&packed, Envelope::ZlibWithLength, None),
            Err(CompressError::LengthMismatch { actual: 2, .. })
        ));
    }

    #[test]
    fn detects_envelopes() {
        let data = b"detect me detect me detect me";
        assert_eq!(Envelope::detect(&compress(data, Envelope::Gzip).unwrap()), Envelope::Gzip);
        assert_eq!(Envelope::detect(&compress(data, Envelope::Zlib).unwrap()), Envelope::Zlib);
    }

    #[test]
    fn growth_is_bounded_by_max() {
        let data = vec![0u8; 100_000];
        let packed = compress(&data, Envelope::Raw).unwrap();
        assert!(matches!(
            decompress(&packed, Envelope::Raw, Some(1000)),
            Err(CompressError::SizeLimit(1000))
        ));
        assert_eq!(decompress(&packed, Envelope::Raw, Some(100_000)).unwrap().len(), 100_000);
    }

    #[test]
    fn corrupt_input_is_an_error() {
        let mut packed = compress(b"some text to damage", Envelope::Zlib).unwrap();
        let last = packed.len() - 1;
        packed[last] ^= 0xff;
        assert!(decompress(&packed, Envelope::Zlib, None).is_err());
        assert!(decompress(&[1, 2], Envelope::Gzip, None).is_err());
        let packed = compress(&b"abc".repeat(2000), Envelope::Zlib).unwrap();
        assert!(matches!(
            decompress(&packed[..packed.len() / 2], Envelope::Zlib, None),
            Err(CompressError::Truncated(_))
        ));
    }
}
