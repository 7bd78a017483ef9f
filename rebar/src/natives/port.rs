//! Port actor.
//!
//! A PORT! is a context with `scheme`, `spec` and `state` fields. While the
//! port is open `state` holds a HANDLE! wrapping its [`DeviceRequest`];
//! a closed port has a blank state. FILE! and URL! subjects of `read`,
//! `write` and `query` go through a transient request opened and closed
//! around the one operation.

use std::path::PathBuf;

use log::debug;

use crate::device::{DeviceCommand, DeviceError, DeviceRequest, DeviceTable, RequestData, RequestFlags, SecurityPolicy};
use crate::error::{Error, ErrorId, Result};
use crate::function::Bounce;
use crate::handle;
use crate::interp::{Frame, Interp};
use crate::series::SeriesId;
use crate::symbol::SymId;
use crate::value::{Kind, Value};

use super::series::{Verb, cannot_use};
use super::{expect_context, expect_count, logic, make_bytes, make_text, out, text_of};

/// Device name and path a port spec designates.
fn locate(interp: &Interp, spec: Value) -> Result<(String, Option<PathBuf>)> {
    match spec.kind {
        Kind::File => Ok(("file".to_string(), Some(PathBuf::from(text_of(interp, spec)?)))),
        Kind::Url => {
            let text = text_of(interp, spec)?;
            let (scheme, rest) = text
                .split_once("://")
                .ok_or_else(|| Error::arg(ErrorId::NoScheme, spec))?;
            let path = (!rest.is_empty()).then(|| PathBuf::from(rest));
            Ok((scheme.to_ascii_lowercase(), path))
        }
        Kind::Block => {
            let series = super::expect_series(spec)?;
            let cells = interp.heap.array(series.series)?.get(series.index..).unwrap_or_default();
            let mut scheme = None;
            let mut path = None;
            for pair in cells.chunks(2) {
                let [key, value] = pair else { break };
                if key.kind != Kind::SetWord {
                    return Err(Error::arg(ErrorId::InvalidArg, *key));
                }
                let field = key.symbol().map(|sym| interp.symbols.spelling(sym).to_ascii_lowercase());
                match field.as_deref() {
                    Some("scheme") => {
                        scheme = value.symbol().map(|sym| interp.symbols.spelling(sym).to_ascii_lowercase());
                    }
                    Some("path") if value.kind.is_any_string() => path = Some(PathBuf::from(text_of(interp, *value)?)),
                    _ => {}
                }
            }
            let scheme = scheme.ok_or_else(|| Error::arg(ErrorId::NoScheme, spec))?;
            Ok((scheme, path))
        }
        _ => Err(Error::arg(ErrorId::NoScheme, spec)),
    }
}

/// Fresh request for `spec`, after the security policy has had its say.
fn request_for(interp: &Interp, spec: Value) -> Result<DeviceRequest> {
    let (scheme, path) = locate(interp, spec)?;
    let device = interp
        .devices
        .find(&scheme)
        .ok_or_else(|| Error::arg(ErrorId::NoScheme, spec))?;
    if scheme == "file" {
        match interp.settings.security {
            SecurityPolicy::Allow => {}
            SecurityPolicy::Deny => return Err(Error::arg(ErrorId::Security, spec)),
            SecurityPolicy::Quit => {
                debug!("security policy halts file access");
                return Err(Error::Halt);
            }
        }
    }
    let mut req = DeviceRequest::new(device);
    req.path = path;
    Ok(req)
}

/// Runs `op` between an open and a close of a one-off request.
fn transient<R>(
    interp: &mut Interp,
    spec: Value,
    flags: RequestFlags,
    op: impl FnOnce(&mut DeviceTable, &mut DeviceRequest) -> Result<R, DeviceError>,
) -> Result<R> {
    let mut req = request_for(interp, spec)?;
    req.flags = flags;
    interp.devices.request(DeviceCommand::Open, &mut req)?;
    let result = op(&mut interp.devices, &mut req);
    let closed = interp.devices.request(DeviceCommand::Close, &mut req);
    let value = result?;
    closed?;
    Ok(value)
}

fn take_bytes(req: &mut DeviceRequest) -> Vec<u8> {
    match std::mem::take(&mut req.data) {
        RequestData::Bytes(bytes) => bytes,
        _ => Vec::new(),
    }
}

fn read_bytes(devices: &mut DeviceTable, req: &mut DeviceRequest, limit: usize) -> Result<Vec<u8>, DeviceError> {
    req.length = limit;
    devices.request(DeviceCommand::Read, req)?;
    Ok(take_bytes(req))
}

fn write_bytes(devices: &mut DeviceTable, req: &mut DeviceRequest, bytes: Vec<u8>) -> Result<(), DeviceError> {
    req.data = RequestData::Bytes(bytes);
    devices.request(DeviceCommand::Write, req)?;
    Ok(())
}

/// Text of a file, for `do %script`.
pub(crate) fn read_text(interp: &mut Interp, source: Value) -> Result<String> {
    let bytes = transient(interp, source, RequestFlags::READ, |devices, req| read_bytes(devices, req, 0))?;
    String::from_utf8(bytes).map_err(|err| {
        Error::arg(ErrorId::ReadError, source).with_message(format!("{}: {err}", interp.form(source)))
    })
}

// ── port contexts ────────────────────────────────────────────────

fn field(interp: &Interp, varlist: SeriesId, sym: SymId) -> Result<usize> {
    interp
        .find_in_context(varlist, sym.symbol())
        .ok_or_else(|| Error::Panic(format!("port without {} field", sym.spelling())))
}

pub(crate) fn make_port(interp: &mut Interp, spec: Value) -> Result<Value> {
    let (scheme, _) = locate(interp, spec)?;
    if interp.devices.find(&scheme).is_none() {
        return Err(Error::arg(ErrorId::NoScheme, spec));
    }
    let keylist = interp
        .specials
        .port_keylist
        .ok_or_else(|| Error::Panic("port keylist missing".to_string()))?;
    let varlist = interp.make_context_with_keylist(Kind::Port, keylist);
    let scheme = interp.symbols.intern(&scheme);
    let index = field(interp, varlist, SymId::Scheme)?;
    interp.set_context_var(varlist, index, Value::word(Kind::Word, scheme))?;
    let index = field(interp, varlist, SymId::Spec)?;
    interp.set_context_var(varlist, index, spec)?;
    let index = field(interp, varlist, SymId::State)?;
    interp.set_context_var(varlist, index, Value::BLANK)?;
    Ok(Value::context(Kind::Port, varlist))
}

/// Handle of an open port's request.
fn open_request(interp: &Interp, varlist: SeriesId) -> Result<Option<SeriesId>> {
    let state = interp.context_var(varlist, field(interp, varlist, SymId::State)?)?;
    Ok(state.as_handle().filter(|_| state.kind == Kind::Handle))
}

fn port_spec(interp: &Interp, varlist: SeriesId) -> Result<Value> {
    interp.context_var(varlist, field(interp, varlist, SymId::Spec)?)
}

fn open_port(interp: &mut Interp, varlist: SeriesId, flags: RequestFlags) -> Result<()> {
    if open_request(interp, varlist)?.is_some() {
        return Ok(());
    }
    let spec = port_spec(interp, varlist)?;
    let mut req = request_for(interp, spec)?;
    req.flags = flags;
    interp.devices.request(DeviceCommand::Open, &mut req)?;
    let id = handle::make_handle(&mut interp.heap, Box::new(req), size_of::<DeviceRequest>(), None);
    let index = field(interp, varlist, SymId::State)?;
    interp.set_context_var(varlist, index, Value::handle(id))
}

fn close_port(interp: &mut Interp, varlist: SeriesId) -> Result<()> {
    let Some(id) = open_request(interp, varlist)? else {
        return Ok(());
    };
    let req = handle::downcast_mut::<DeviceRequest>(&mut interp.heap, id)?;
    interp.devices.request(DeviceCommand::Close, req)?;
    let index = field(interp, varlist, SymId::State)?;
    interp.set_context_var(varlist, index, Value::BLANK)
}

/// Runs `op` on the port's open request, or on a transient one for its
/// spec when the port is closed.
fn on_port<R>(
    interp: &mut Interp,
    varlist: SeriesId,
    flags: RequestFlags,
    op: impl FnOnce(&mut DeviceTable, &mut DeviceRequest) -> Result<R, DeviceError>,
) -> Result<R> {
    match open_request(interp, varlist)? {
        Some(id) => {
            let req = handle::downcast_mut::<DeviceRequest>(&mut interp.heap, id)?;
            Ok(op(&mut interp.devices, req)?)
        }
        None => {
            let spec = port_spec(interp, varlist)?;
            transient(interp, spec, flags, op)
        }
    }
}

// ── actions ──────────────────────────────────────────────────────

fn read(interp: &mut Interp, subject: Value, limit: usize, as_string: bool) -> Result<Value> {
    let fetch = |devices: &mut DeviceTable, req: &mut DeviceRequest| read_bytes(devices, req, limit);
    let bytes = match subject.kind {
        Kind::Port => on_port(interp, expect_context(subject)?, RequestFlags::READ, fetch)?,
        _ => transient(interp, subject, RequestFlags::READ, fetch)?,
    };
    if !as_string {
        return Ok(make_bytes(interp, bytes));
    }
    let text = String::from_utf8(bytes)
        .map_err(|err| Error::arg(ErrorId::ReadError, subject).with_message(err.to_string()))?;
    Ok(make_text(interp, Kind::String, &text))
}

fn payload(interp: &Interp, data: Value) -> Result<Vec<u8>> {
    match data.kind {
        Kind::Block => Ok(interp.mold_only(data).into_bytes()),
        _ => super::bytes_of(interp, data),
    }
}

fn write(interp: &mut Interp, subject: Value, data: Value, append: bool) -> Result<()> {
    let bytes = payload(interp, data)?;
    let flags = RequestFlags::WRITE | if append { RequestFlags::APPEND } else { RequestFlags::NEW };
    let store = move |devices: &mut DeviceTable, req: &mut DeviceRequest| write_bytes(devices, req, bytes);
    match subject.kind {
        Kind::Port => on_port(interp, expect_context(subject)?, flags, store),
        _ => transient(interp, subject, flags, store),
    }
}

/// Size and type of the target, or BLANK when it does not exist.
fn query(interp: &mut Interp, subject: Value) -> Result<Value> {
    let spec = match subject.kind {
        Kind::Port => port_spec(interp, expect_context(subject)?)?,
        _ => subject,
    };
    let mut req = request_for(interp, spec)?;
    if let Some(varlist) = subject.as_context().filter(|_| subject.kind == Kind::Port)
        && let Some(id) = open_request(interp, varlist)?
    {
        req.handle = handle::downcast::<DeviceRequest>(&interp.heap, id)?.handle;
    }
    match interp.devices.request(DeviceCommand::Query, &mut req) {
        Ok(_) => {}
        Err(DeviceError::Read { .. }) => return Ok(Value::BLANK),
        Err(err) => return Err(err.into()),
    }
    let size = interp.symbols.intern("size");
    let kind = interp.symbols.intern("type");
    let varlist = interp.make_context(Kind::Object, &[size, kind]);
    interp.set_context_var(varlist, 1, Value::integer(req.length as i64))?;
    let type_name = if req.flags.contains(RequestFlags::DIR) { "dir" } else { "file" };
    let type_word = interp.symbols.intern(type_name);
    interp.set_context_var(varlist, 2, Value::word(Kind::Word, type_word))?;
    Ok(Value::context(Kind::Object, varlist))
}

pub(crate) fn port_actor(interp: &mut Interp, frame: &Frame, verb: Verb) -> Result<Bounce> {
    let subject = interp.arg(frame, 1);
    match verb {
        Verb::Open => {
            let port = match subject.kind {
                Kind::Port => subject,
                Kind::File | Kind::Url | Kind::Block => make_port(interp, subject)?,
                _ => return Err(cannot_use(interp, verb, subject)),
            };
            let mut flags = RequestFlags::empty();
            if interp.refine(frame, 2) {
                flags |= RequestFlags::NEW | RequestFlags::WRITE;
            }
            if interp.refine(frame, 3) {
                flags |= RequestFlags::READ;
            }
            if interp.refine(frame, 4) {
                flags |= RequestFlags::WRITE;
            }
            if flags.is_empty() {
                flags = RequestFlags::READ;
            }
            let varlist = expect_context(port)?;
            interp.with_guard(port, |interp| open_port(interp, varlist, flags))?;
            out(port)
        }
        Verb::Close if subject.kind == Kind::Port => {
            close_port(interp, expect_context(subject)?)?;
            out(subject)
        }
        Verb::Read => {
            let limit = if interp.refine(frame, 2) {
                expect_count(interp.arg(frame, 3))?
            } else {
                0
            };
            let as_string = interp.refine(frame, 4);
            out(read(interp, subject, limit, as_string)?)
        }
        Verb::Copy if subject.kind == Kind::Port => out(read(interp, subject, 0, false)?),
        Verb::Write => {
            let data = interp.arg(frame, 2);
            let append = interp.refine(frame, 3);
            write(interp, subject, data, append)?;
            out(subject)
        }
        Verb::Append if subject.kind == Kind::Port => {
            let data = interp.arg(frame, 2);
            write(interp, subject, data, true)?;
            out(subject)
        }
        Verb::Query => out(query(interp, subject)?),
        Verb::LengthOf if subject.kind == Kind::Port => {
            let info = query(interp, subject)?;
            match info.as_context() {
                Some(varlist) => out(interp.context_var(varlist, 1)?),
                None => out(Value::BLANK),
            }
        }
        Verb::EmptyQ if subject.kind == Kind::Port => {
            let varlist = expect_context(subject)?;
            logic(open_request(interp, varlist)?.is_none())
        }
        _ if subject.kind == Kind::Port => {
            let action = interp.symbols.intern(verb.name());
            Err(Error::arg(ErrorId::NoPortAction, Value::word(Kind::Word, action)))
        }
        _ => Err(cannot_use(interp, verb, subject)),
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Settings;
    use crate::device::SecurityPolicy;
    use crate::error::{Error, ErrorId};
    use crate::interp::Interp;
    use crate::value::{Kind, Value};

    fn interp() -> Interp {
        Interp::new(Settings::default()).expect("boot")
    }

    fn text(interp: &mut Interp, source: &str) -> String {
        let value = interp.do_text(source).expect(source);
        interp.form(value)
    }

    #[test]
    fn files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        let mut interp = interp();
        interp
            .do_text(&format!(r#"f: to file! "{}""#, path.display()))
            .unwrap();
        interp.do_text(r#"write f "hello""#).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
        interp.do_text(r#"write/append f " world""#).unwrap();
        assert_eq!(text(&mut interp, "read/string f"), "hello world");
        assert_eq!(text(&mut interp, "read/string/part f 5"), "hello");
        assert_eq!(interp.do_text("length-of read f").unwrap(), Value::integer(11));
        interp.do_text("write f [a 1]").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a 1");
    }

    #[test]
    fn open_ports_keep_their_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        let mut interp = interp();
        interp
            .do_text(&format!(r#"p: open/new to file! "{}""#, path.display()))
            .unwrap();
        assert_eq!(interp.do_text("p/scheme").unwrap().kind, Kind::Word);
        assert_eq!(interp.do_text("empty? p").unwrap(), Value::FALSE);
        interp.do_text(r#"write p "one" append p "two" close p"#).unwrap();
        assert_eq!(interp.do_text("empty? p").unwrap(), Value::TRUE);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "onetwo");
        assert_eq!(interp.do_text("length-of p").unwrap(), Value::integer(6));
    }

    #[test]
    fn query_reports_size_or_blank() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("q.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();
        let mut interp = interp();
        interp
            .do_text(&format!(r#"info: query to file! "{}""#, path.display()))
            .unwrap();
        assert_eq!(interp.do_text("info/size").unwrap(), Value::integer(3));
        assert_eq!(text(&mut interp, "info/type"), "file");
        let missing = dir.path().join("absent");
        let result = interp
            .do_text(&format!(r#"query to file! "{}""#, missing.display()))
            .unwrap();
        assert_eq!(result, Value::BLANK);
    }

    #[test]
    fn clipboard_scheme() {
        let mut interp = interp();
        interp.do_text(r#"clip: to url! "clipboard://" write clip "copied""#).unwrap();
        assert_eq!(text(&mut interp, "read/string clip"), "copied");
    }

    #[test]
    fn unknown_scheme() {
        let mut interp = interp();
        let err = interp.do_text(r#"make port! to url! "nope://x""#).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::NoScheme));
        let err = interp.do_text(r#"p: make port! to url! "clipboard://" take p"#).unwrap_err();
        assert!(matches!(err.id(), Some(ErrorId::NoPortAction) | Some(ErrorId::ExpectArg)));
    }

    #[test]
    fn security_policy_guards_files() {
        let dir = tempfile::tempdir().unwrap();
        let source = format!(r#"read to file! "{}""#, dir.path().join("x").display());

        let mut settings = Settings::default();
        settings.security = SecurityPolicy::Deny;
        let mut interp = Interp::new(settings.clone()).unwrap();
        let err = interp.do_text(&source).unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::Security));

        settings.security = SecurityPolicy::Quit;
        let mut interp = Interp::new(settings).unwrap();
        assert!(matches!(interp.do_text(&source), Err(Error::Halt)));

        let mut settings = Settings::default();
        settings.security = SecurityPolicy::Deny;
        let mut interp = Interp::new(settings).unwrap();
        interp.do_text(r#"write to url! "clipboard://" "ok""#).unwrap();
    }

    #[test]
    fn missing_file_is_an_access_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut interp = interp();
        let err = interp
            .do_text(&format!(r#"read to file! "{}""#, dir.path().join("none").display()))
            .unwrap_err();
        assert_eq!(err.id(), Some(ErrorId::CannotOpen));
    }
}
