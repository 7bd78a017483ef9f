//! Boot: natives, prototypes and constants into `lib`, then the mezzanine.
//!
//! Runs once from [`Interp::new`] with the collector disabled. Extra boot
//! source given on the command line goes through [`load_boot_source`]
//! after the interpreter is up.

use log::{debug, info};

use crate::compress::{self, Envelope};
use crate::context::field_key;
use crate::error::{Error, ErrorId, Result};
use crate::function::{enfixed, paramlist_of};
use crate::interp::Interp;
use crate::natives::default_natives;
use crate::series::SeriesId;
use crate::symbol::SymId;
use crate::value::{KINDS, Kind, TypeBits, Value};

/// Source run in `lib` after the natives are in place.
const MEZZANINE: &str = r#"
also: func [
    "Returns the first value, ignoring the second."
    value1 [<opt> any-value!]
    value2 [<opt> any-value!]
][
    :value1
]

join: func [
    "Copy of a series with a value appended."
    value [any-series!]
    rest [<opt> any-value!]
][
    append copy value :rest
]

repend: func [
    "Appends a reduced block."
    series [any-series!]
    value [block!]
][
    append series reduce value
]

ajoin: func [
    "Forms each value of a reduced block, without spaces."
    block [block!]
    <local> result
][
    result: copy ""
    for-each item reduce block [append result form :item]
    result
]

void?: func [value [<opt> any-value!]] [equal? _ type-of :value]

system: make object! [
    product: 'rebar
    version: _
    options: make object! [
        script: _
        args: []
        boot: _
        quiet: false
    ]
]
"#;

const OPERATORS: &[(&str, &str)] = &[
    ("+", "add"),
    ("-", "subtract"),
    ("*", "multiply"),
    ("/", "divide"),
    ("=", "equal?"),
    ("<>", "not-equal?"),
    ("==", "strict-equal?"),
    ("<", "lesser?"),
    (">", "greater?"),
    ("<=", "lesser-or-equal?"),
    (">=", "greater-or-equal?"),
];

const TYPESETS: &[&str] = &[
    "any-value!",
    "any-word!",
    "any-path!",
    "any-array!",
    "any-string!",
    "any-series!",
    "any-number!",
    "any-scalar!",
    "any-context!",
];

const ERROR_FIELDS: &[SymId] = &[
    SymId::Code,
    SymId::Type,
    SymId::Id,
    SymId::Message,
    SymId::Arg1,
    SymId::Arg2,
    SymId::Arg3,
    SymId::Near,
    SymId::Where,
];

const PORT_FIELDS: &[SymId] = &[SymId::Scheme, SymId::Spec, SymId::State];

pub fn boot(interp: &mut Interp) -> Result<()> {
    let natives = install_natives(interp)?;
    install_prototypes(interp)?;
    install_constants(interp)?;
    install_operators(interp)?;
    run_source(interp, MEZZANINE)?;
    run_source(interp, &type_predicates())?;
    run_source(interp, &format!("system/version: {}", crate::VERSION))?;
    debug!("boot: {natives} natives, {} lib words", interp.context_len(interp.lib));
    Ok(())
}

fn install_natives(interp: &mut Interp) -> Result<usize> {
    let natives = default_natives();
    for desc in &natives {
        let native = interp.make_native(desc.spec, desc.dispatcher)?;
        let native = if desc.enfix { enfixed(native) } else { native };
        interp.set_lib(desc.name, native)?;
    }
    let special = |interp: &Interp, name: &str| -> Result<_> {
        let value = interp
            .lib_value(name)
            .ok_or_else(|| Error::Panic(format!("boot: native {name} missing")))?;
        Ok(Some(paramlist_of(value)?))
    };
    interp.specials.return_ = special(interp, "return")?;
    interp.specials.break_ = special(interp, "break")?;
    interp.specials.continue_ = special(interp, "continue")?;
    interp.specials.quit = special(interp, "quit")?;
    Ok(natives.len())
}

/// Keylists shared by every ERROR! and PORT!, kept alive through a rooted
/// prototype context each.
fn install_prototypes(interp: &mut Interp) -> Result<()> {
    let keys: Vec<_> = ERROR_FIELDS.iter().map(|id| field_key(id.symbol())).collect();
    let keylist = interp.make_keylist(&keys);
    let prototype = interp.make_context_with_keylist(Kind::Error, keylist);
    interp.add_root(Value::context(Kind::Error, prototype))?;
    interp.specials.error_keylist = Some(keylist);

    let keys: Vec<_> = PORT_FIELDS.iter().map(|id| field_key(id.symbol())).collect();
    let keylist = interp.make_keylist(&keys);
    let prototype = interp.make_context_with_keylist(Kind::Port, keylist);
    interp.add_root(Value::context(Kind::Port, prototype))?;
    interp.specials.port_keylist = Some(keylist);
    Ok(())
}

fn install_constants(interp: &mut Interp) -> Result<()> {
    let constants = [
        (SymId::True, Value::TRUE),
        (SymId::False, Value::FALSE),
        (SymId::On, Value::TRUE),
        (SymId::Off, Value::FALSE),
        (SymId::Yes, Value::TRUE),
        (SymId::No, Value::FALSE),
        (SymId::Blank, Value::BLANK),
        (SymId::Bar, Value::BAR),
    ];
    for (id, value) in constants {
        interp.set_lib(id.spelling(), value)?;
    }
    for kind in KINDS.into_iter().filter(|kind| !matches!(kind, Kind::End | Kind::Trash)) {
        interp.set_lib(kind.name(), Value::datatype(kind))?;
    }
    for &name in TYPESETS {
        let bits = TypeBits::from_typeset_name(name)
            .ok_or_else(|| Error::Panic(format!("boot: unknown typeset {name}")))?;
        interp.set_lib(name, Value::typeset(bits))?;
    }
    Ok(())
}

fn install_operators(interp: &mut Interp) -> Result<()> {
    for &(op, name) in OPERATORS {
        let function = interp
            .lib_value(name)
            .ok_or_else(|| Error::Panic(format!("boot: {name} missing for {op}")))?;
        interp.set_lib(op, enfixed(function))?;
    }
    Ok(())
}

/// `integer?` and friends, one per datatype.
fn type_predicates() -> String {
    KINDS
        .into_iter()
        .filter(|kind| !matches!(kind, Kind::End | Kind::Trash | Kind::Void))
        .map(|kind| {
            let name = kind.name();
            let stem = name.trim_end_matches('!');
            format!("{stem}?: func [value [<opt> any-value!]] [equal? {name} type-of :value]\n")
        })
        .collect()
}

fn run_source(interp: &mut Interp, text: &str) -> Result<()> {
    interp.do_text(text).map(drop)
}

/// Sets a field of `system/options`.
pub fn set_system_option(interp: &mut Interp, name: &str, value: Value) -> Result<()> {
    let context_field = |interp: &mut Interp, varlist: SeriesId, name: &str| -> Result<(SeriesId, usize)> {
        let sym = interp.symbols.intern(name);
        let index = interp
            .find_in_context(varlist, sym)
            .ok_or_else(|| Error::Panic(format!("system has no {name} field")))?;
        Ok((varlist, index))
    };
    let system = interp
        .lib_value("system")
        .and_then(|system| system.as_context())
        .ok_or_else(|| Error::Panic("system object missing".to_string()))?;
    let (system, index) = context_field(interp, system, "options")?;
    let options = interp
        .context_var(system, index)?
        .as_context()
        .ok_or_else(|| Error::Panic("system/options is not an object".to_string()))?;
    let (options, index) = context_field(interp, options, name)?;
    interp.set_context_var(options, index, value)
}

/// Runs extra boot source, which may be zlib or gzip compressed (told
/// apart by its leading bytes).
pub fn load_boot_source(interp: &mut Interp, bytes: &[u8]) -> Result<()> {
    let text = match Envelope::detect(bytes) {
        Envelope::Gzip => compress::decompress(bytes, Envelope::Gzip, None)?,
        Envelope::Zlib => compress::decompress(bytes, Envelope::ZlibWithLength, None)
            .or_else(|_| compress::decompress(bytes, Envelope::Zlib, None))?,
        _ => bytes.to_vec(),
    };
    let text = String::from_utf8(text)
        .map_err(|err| Error::raised(ErrorId::Invalid).with_message(format!("boot source: {err}")))?;
    info!("loading {} bytes of boot source", text.len());
    run_source(interp, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn natives_and_constants_are_in_lib() {
        let interp = Interp::new(Settings::default()).unwrap();
        assert!(interp.lib_value("append").is_some_and(|v| v.is_function()));
        assert_eq!(interp.lib_value("on"), Some(Value::TRUE));
        assert_eq!(interp.lib_value("integer!"), Some(Value::datatype(Kind::Integer)));
        assert_eq!(interp.lib_value("+").map(|v| v.is_enfixed()), Some(true));
        assert!(interp.specials.return_.is_some() && interp.specials.error_keylist.is_some());
    }

    #[test]
    fn mezzanine_helpers() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        assert_eq!(interp.do_text("also 1 2").unwrap(), Value::integer(1));
        let joined = interp.do_text(r#"join "ab" "cd""#).unwrap();
        assert_eq!(interp.form(joined), "abcd");
        let joined = interp.do_text(r#"ajoin ["x" 1 + 1]"#).unwrap();
        assert_eq!(interp.form(joined), "x2");
        assert_eq!(interp.do_text("integer? 1").unwrap(), Value::TRUE);
        assert_eq!(interp.do_text("block? 1").unwrap(), Value::FALSE);
        assert_eq!(interp.do_text("void? if false [1]").unwrap(), Value::TRUE);
    }

    #[test]
    fn system_options() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        assert_eq!(interp.do_text("system/product").unwrap().kind, Kind::Word);
        assert_eq!(interp.do_text("system/version").unwrap().kind, Kind::Tuple);
        set_system_option(&mut interp, "quiet", Value::TRUE).unwrap();
        assert_eq!(interp.do_text("system/options/quiet").unwrap(), Value::TRUE);
        assert!(set_system_option(&mut interp, "missing", Value::TRUE).is_err());
    }

    #[test]
    fn compressed_boot_source() {
        let mut interp = Interp::new(Settings::default()).unwrap();
        let source = b"boot-extra: 42";
        let packed = compress::compress(source, Envelope::Gzip).unwrap();
        load_boot_source(&mut interp, &packed).unwrap();
        assert_eq!(interp.lib_value("boot-extra"), Some(Value::integer(42)));
        let packed = compress::compress(b"boot-zlib: 7", Envelope::ZlibWithLength).unwrap();
        load_boot_source(&mut interp, &packed).unwrap();
        assert_eq!(interp.lib_value("boot-zlib"), Some(Value::integer(7)));
        load_boot_source(&mut interp, b"boot-plain: 1").unwrap();
        assert_eq!(interp.lib_value("boot-plain"), Some(Value::integer(1)));
    }
}
