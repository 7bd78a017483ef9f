//! Compression natives over the deflate codec.

use crate::compress::{self, Envelope};
use crate::error::{Error, ErrorId, Result};
use crate::function::Bounce;
use crate::interp::{Frame, Interp};
use crate::symbol::SymId;
use crate::value::{Kind, Value};

use super::{bytes_of, expect_count, expect_word, make_bytes, out};

/// Envelope named by a `/envelope` word. `detect` is only meaningful when
/// decoding.
fn envelope_named(interp: &Interp, format: Value, data: &[u8], decoding: bool) -> Result<Envelope> {
    let sym = expect_word(format)?;
    if interp.symbols.is(sym, SymId::Zlib) {
        Ok(Envelope::Zlib)
    } else if interp.symbols.is(sym, SymId::Gzip) {
        Ok(Envelope::Gzip)
    } else if decoding && interp.symbols.is(sym, SymId::Detect) {
        Ok(Envelope::detect(data))
    } else {
        Err(Error::arg(ErrorId::InvalidArg, format))
    }
}

fn historical(gzip: bool, only: bool) -> Result<Envelope> {
    match (gzip, only) {
        (true, true) => Err(Error::arg(ErrorId::BadRefine, Value::word(Kind::Refinement, SymId::Only.symbol()))),
        (true, false) => Ok(Envelope::Gzip),
        (false, true) => Ok(Envelope::Raw),
        (false, false) => Ok(Envelope::ZlibWithLength),
    }
}

pub fn compress(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let data = bytes_of(interp, interp.arg(frame, 1))?;
    let envelope = historical(interp.refine(frame, 2), interp.refine(frame, 3))?;
    let packed = compress::compress(&data, envelope)?;
    out(make_bytes(interp, packed))
}

pub fn decompress(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let data = bytes_of(interp, interp.arg(frame, 1))?;
    let envelope = historical(interp.refine(frame, 2), interp.refine(frame, 3))?;
    let max = if interp.refine(frame, 4) {
        Some(expect_count(interp.arg(frame, 5))?)
    } else {
        None
    };
    let unpacked = compress::decompress(&data, envelope, max)?;
    out(make_bytes(interp, unpacked))
}

pub fn deflate(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let data = bytes_of(interp, interp.arg(frame, 1))?;
    let envelope = if interp.refine(frame, 2) {
        envelope_named(interp, interp.arg(frame, 3), &data, false)?
    } else {
        Envelope::Raw
    };
    let packed = compress::compress(&data, envelope)?;
    out(make_bytes(interp, packed))
}

pub fn inflate(interp: &mut Interp, frame: &Frame) -> Result<Bounce> {
    let data = bytes_of(interp, interp.arg(frame, 1))?;
    let envelope = if interp.refine(frame, 2) {
        envelope_named(interp, interp.arg(frame, 3), &data, true)?
    } else {
        Envelope::Raw
    };
    let max = if interp.refine(frame, 4) {
        Some(expect_count(interp.arg(frame, 5))?)
    } else {
        None
    };
    let unpacked = compress::decompress(&data, envelope, max)?;
    out(make_bytes(interp, unpacked))
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::error::ErrorId;
    use crate::interp::Interp;
    use crate::value::Value;

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn form(interp: &mut Interp, source: &str) -> String {
        let value = interp.do_text(source).expect(source);
        interp.form(value)
    }

    #[test]
    fn historical_format_round_trips() {
        let mut interp = interp();
        interp.do_text(r#"text: "abcabcabcabcabcabcabcabc""#).unwrap();
        assert_eq!(form(&mut interp, "to string! decompress compress text"), "abcabcabcabcabcabcabcabc");
        assert_eq!(form(&mut interp, "to string! decompress/gzip compress/gzip text"), "abcabcabcabcabcabcabcabc");
        assert_eq!(form(&mut interp, "to string! decompress/only compress/only text"), "abcabcabcabcabcabcabcabc");
        let packed = interp.do_text("length-of compress text").unwrap();
        let raw = interp.do_text("length-of compress/only text").unwrap();
        assert!(packed.as_integer().unwrap() > raw.as_integer().unwrap());
    }

    #[test]
    fn envelopes_and_detection() {
        let mut interp = interp();
        interp.do_text(r#"data: to binary! "hello hello hello""#).unwrap();
        assert_eq!(
            form(&mut interp, "to string! inflate/envelope deflate/envelope data 'gzip 'detect"),
            "hello hello hello"
        );
        assert_eq!(
            form(&mut interp, "to string! inflate/envelope deflate/envelope data 'zlib 'zlib"),
            "hello hello hello"
        );
        assert_eq!(form(&mut interp, "to string! inflate deflate data"), "hello hello hello");
        let err = interp.do_text("deflate/envelope data 'detect").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::InvalidArg));
    }

    #[test]
    fn limits_and_corruption() {
        let mut interp = interp();
        interp.do_text(r#"big: compress "0123456789012345678901234567890123456789""#).unwrap();
        let err = interp.do_text("decompress/limit big 10").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::SizeLimit));
        assert_eq!(interp.do_text("length-of decompress/limit big 40").unwrap(), Value::integer(40));
        let err = interp.do_text("decompress #{DEADBEEF}").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadCompression));
        let err = interp.do_text("compress/gzip/only big").unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::BadRefine));
    }
}
