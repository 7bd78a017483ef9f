use rebar::compress::{self, Envelope};
use rebar::{Error, ErrorId, Interp, Kind, OutputBuffer, SecurityPolicy, Settings, Value};

fn interp() -> Interp {
    Interp::new(Settings::default()).expect("boot")
}

fn eval(interp: &mut Interp, source: &str) -> Value {
    interp.do_text(source).expect(source)
}

fn mold(interp: &mut Interp, source: &str) -> String {
    let value = eval(interp, source);
    interp.mold(value)
}

#[test]
fn arithmetic_runs_left_to_right() {
    let mut interp = interp();
    assert_eq!(eval(&mut interp, "1 + 2 * 3"), Value::integer(9));
    assert_eq!(eval(&mut interp, "1 + (2 * 3)"), Value::integer(7));
    assert_eq!(eval(&mut interp, "negate 2 + 3"), Value::integer(-5));
    assert_eq!(eval(&mut interp, "10 - 4 = 6"), Value::TRUE);
    assert_eq!(eval(&mut interp, "x: 3 x > 1 and x < 5"), Value::TRUE);
    assert_eq!(eval(&mut interp, "x = 3 or x = 4"), Value::TRUE);
    let err = interp.do_text("1 / 0").unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::ZeroDivide));
}

#[test]
fn recursive_functions_and_return() {
    let mut interp = interp();
    eval(
        &mut interp,
        "fib: func [n] [if n < 2 [return n] (fib n - 1) + (fib n - 2)]",
    );
    assert_eq!(eval(&mut interp, "fib 15"), Value::integer(610));

    eval(
        &mut interp,
        "first-even: func [block] [for-each x block [if even? x [return x]] _]",
    );
    assert_eq!(eval(&mut interp, "first-even [1 3 8 5 6]"), Value::integer(8));
    assert_eq!(eval(&mut interp, "first-even [1 3]"), Value::BLANK);
}

#[test]
fn runaway_recursion_is_an_error() {
    let mut interp = interp();
    let err = interp.do_text("forever-down: func [] [forever-down] forever-down").unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::StackOverflow));

    eval(&mut interp, "count-down: func [n] [either n = 0 [0] [1 + (count-down n - 1)]]");
    assert_eq!(eval(&mut interp, "count-down 20"), Value::integer(20));
    let err = interp.do_text("count-down 100000").unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::StackOverflow));
    assert_eq!(eval(&mut interp, "count-down 3"), Value::integer(3));
}

#[test]
fn loops_with_break_and_continue() {
    let mut interp = interp();
    let source = r#"
        total: 0
        repeat i 10 [
            if odd? i [continue]
            if i > 8 [break]
            total: total + i
        ]
        total
    "#;
    assert_eq!(eval(&mut interp, source), Value::integer(20));
    assert_eq!(eval(&mut interp, "n: 0 while [true] [n: n + 1 if n = 3 [break/return n * 10]]"), Value::integer(30));
}

#[test]
fn errors_can_be_trapped_and_reported() {
    let mut interp = interp();
    eval(&mut interp, "safe-div: func [a b] [trap/with [a / b] [0]]");
    assert_eq!(eval(&mut interp, "safe-div 10 2"), Value::integer(5));
    assert_eq!(eval(&mut interp, "safe-div 10 0"), Value::integer(0));

    let err = interp.do_text(r#"check: func [x] [if x < 0 [fail "negative"] x] check -1"#).unwrap_err();
    let report = interp.format_error(&err);
    assert!(report.starts_with("** User error: negative"), "{report}");

    assert_eq!(mold(&mut interp, "e: trap [undefined-word] e/id"), "no-value");
}

#[test]
fn objects_and_paths() {
    let mut interp = interp();
    let source = r#"
        account: make object! [
            balance: 100
            deposit: func [amount] [balance: balance + amount]
        ]
        account/deposit 50
        account/balance
    "#;
    assert_eq!(eval(&mut interp, source), Value::integer(150));
    eval(&mut interp, "savings: make account [rate: 2]");
    assert_eq!(eval(&mut interp, "savings/balance"), Value::integer(150));
    eval(&mut interp, "savings/balance: 1");
    assert_eq!(eval(&mut interp, "account/balance"), Value::integer(150));
    assert_eq!(mold(&mut interp, "words-of savings"), "[balance deposit rate]");

    eval(&mut interp, "savings/deposit 50");
    assert_eq!(eval(&mut interp, "savings/balance"), Value::integer(51));
    assert_eq!(eval(&mut interp, "account/balance"), Value::integer(150));
    eval(&mut interp, "account/deposit 5");
    assert_eq!(eval(&mut interp, "account/balance"), Value::integer(155));
    assert_eq!(eval(&mut interp, "savings/balance"), Value::integer(51));
}

#[test]
fn protected_data_refuses_changes() {
    let mut interp = interp();
    let err = interp.do_text("config: [debug false] protect config append config 1").unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::Protected));
    eval(&mut interp, "unprotect config append config 1");
    assert_eq!(eval(&mut interp, "length-of config"), Value::integer(3));
    eval(&mut interp, "frozen: freeze [1 [2]]");
    assert_eq!(eval(&mut interp, "frozen? frozen"), Value::TRUE);
    let err = interp.do_text("append second frozen 3").unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::Protected));
}

#[test]
fn reduce_and_compose_build_code() {
    let mut interp = interp();
    assert_eq!(mold(&mut interp, "x: 5 reduce [x x * 2 'x]"), "[5 10 x]");
    assert_eq!(mold(&mut interp, "compose [a (x) (reduce [1 2])]"), "[a 5 1 2]");
    assert_eq!(mold(&mut interp, "compose/only [a (reduce [1 2])]"), "[a [1 2]]");
    assert_eq!(eval(&mut interp, "do compose [(x) + 1]"), Value::integer(6));
}

#[test]
fn series_editing() {
    let mut interp = interp();
    let source = r#"
        words: copy []
        for-each w [alpha beta gamma] [append words w]
        remove words
        insert words 'start
        words
    "#;
    assert_eq!(mold(&mut interp, source), "[start beta gamma]");
    assert_eq!(mold(&mut interp, r#"s: copy "hello" append s " world" s"#), r#""hello world""#);
    assert_eq!(mold(&mut interp, r#"ajoin ["n=" 1 + 1]"#), r#""n=2""#);
    assert_eq!(mold(&mut interp, "select [a 1 b 2] 'b"), "2");
}

#[test]
fn print_writes_to_host_output() {
    let mut interp = interp();
    let out = OutputBuffer::new();
    interp.set_output(Box::new(out.clone()));
    eval(&mut interp, r#"name: "world" print ["hello" name] print 1 + 1"#);
    assert_eq!(out.contents(), "hello world\n2\n");
}

#[test]
fn compression_round_trip() {
    let mut interp = interp();
    let source = r#"
        text: "the quick brown fox jumps over the quick brown dog"
        packed: compress text
        to string! decompress packed
    "#;
    let value = eval(&mut interp, source);
    assert_eq!(interp.form(value), "the quick brown fox jumps over the quick brown dog");
    let source = "to string! inflate/envelope deflate/envelope text 'gzip 'detect";
    let value = eval(&mut interp, source);
    assert_eq!(interp.form(value), "the quick brown fox jumps over the quick brown dog");
}

#[test]
fn file_ports() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    let mut interp = interp();
    eval(&mut interp, &format!(r#"file: to file! "{}""#, path.display()));
    eval(&mut interp, r#"write file "line one""#);
    eval(&mut interp, r#"write/append file " and two""#);
    let value = eval(&mut interp, "read/string file");
    assert_eq!(interp.form(value), "line one and two");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "line one and two");

    let mut locked = Interp::new(Settings {
        security: SecurityPolicy::Deny,
        ..Settings::default()
    })
    .unwrap();
    let source = format!(r#"read to file! "{}""#, path.display());
    let err = locked.do_text(&source).unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::Security));
}

#[test]
fn garbage_is_reclaimed() {
    let mut interp = interp();
    interp.recycle();
    let before = interp.heap.live_count();
    eval(&mut interp, "loop 200 [copy [1 2 3]] keep: copy [4 5 6]");
    assert!(interp.heap.live_count() > before);
    let stats = interp.recycle();
    assert!(stats.swept >= 200);
    assert_eq!(mold(&mut interp, "keep"), "[4 5 6]");
    assert_eq!(interp.stats.recycles, 2);
}

#[test]
fn quit_and_halt_reach_the_host() {
    let mut interp = interp();
    let err = interp.do_text("loop 3 [quit/return 7]").unwrap_err();
    assert!(matches!(err, Error::Quit(7)));
    assert_eq!(err.exit_code(), 7);
    let err = interp.do_text("quit").unwrap_err();
    assert_eq!(err.exit_code(), 0);
    let err = interp.do_text("halt").unwrap_err();
    assert!(matches!(err, Error::Halt));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(interp.do_text("1 +").unwrap_err().exit_code(), 1);
}

#[test]
fn type_queries() {
    let mut interp = interp();
    assert_eq!(eval(&mut interp, "type-of 1.5"), Value::datatype(Kind::Decimal));
    assert_eq!(eval(&mut interp, "string? \"x\""), Value::TRUE);
    assert_eq!(eval(&mut interp, "block? first [[a]]"), Value::TRUE);
    assert_eq!(eval(&mut interp, "to integer! \"42\""), Value::integer(42));
}

#[test]
fn throws_abandon_the_enclosing_expression() {
    let mut interp = interp();
    assert_eq!(eval(&mut interp, "catch [throw 10]"), Value::integer(10));
    assert_eq!(eval(&mut interp, "catch [1 + throw 10]"), Value::integer(10));
    let err = interp.do_text("throw 10").unwrap_err();
    assert_eq!(err.id(), Some(ErrorId::NoCatch));
}

#[test]
fn methods_mutate_their_object() {
    let mut interp = interp();
    let source = "obj: make object! [n: 1 inc: func [] [n: n + 1]] obj/inc obj/inc obj/n";
    assert_eq!(eval(&mut interp, source), Value::integer(3));
}

#[test]
fn bars_in_reduce_follow_the_setting() {
    let mut interp = interp();
    assert_eq!(mold(&mut interp, "reduce [1 + 2 3 + 4]"), "[3 7]");
    assert_eq!(mold(&mut interp, "reduce [1 | 2]"), "[1 2]");
    assert_eq!(mold(&mut interp, "reduce [bar]"), "[]");
    assert_eq!(mold(&mut interp, "do [reduce [bar]]"), "[]");

    let mut keeping = Interp::new(Settings {
        keep_bars: true,
        ..Settings::default()
    })
    .unwrap();
    assert_eq!(mold(&mut keeping, "reduce [1 | 2]"), "[1 | 2]");
    assert_eq!(mold(&mut keeping, "reduce [bar]"), "[|]");
    assert_eq!(mold(&mut keeping, "do [reduce [bar]]"), "[|]");
}

/// Deterministic noise so the codec sees incompressible input.
fn noise(len: usize) -> Vec<u8> {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
            (state >> 56) as u8
        })
        .collect()
}

#[test]
fn megabyte_codec_round_trip() {
    let data = noise(1 << 20);
    for envelope in [Envelope::Zlib, Envelope::Gzip, Envelope::ZlibWithLength] {
        let packed = compress::compress(&data, envelope).unwrap();
        let unpacked = compress::decompress(&packed, envelope, None).unwrap();
        assert!(unpacked == data, "{envelope:?} round trip differs");
    }
    let packed = compress::compress(&data, Envelope::Raw).unwrap();
    assert_eq!(compress::decompress(&packed, Envelope::Raw, Some(data.len())).unwrap(), data);
    assert!(compress::decompress(&packed, Envelope::Raw, Some(1024)).is_err());
}
