use clap::{ArgAction, Parser as ClapParser};
use log::{LevelFilter, debug, error};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
    thread,
};

use rebar::{Error, ErrorId, Interp, Kind, SecurityPolicy, Settings, Value, boot};

/// Evaluation recurses on the native stack; give it room.
const STACK_SIZE: usize = 256 * 1024 * 1024;

/// Call depth that fits comfortably in [`STACK_SIZE`].
const STACK_LIMIT: usize = 10_000;

#[derive(ClapParser, Debug)]
#[command(name = "rebar", author, version, about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Script to run
    script: Option<PathBuf>,

    /// Arguments handed to the script in `system/options/args`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Evaluate an expression (may be repeated)
    #[arg(long = "do", value_name = "EXPR")]
    eval: Vec<String>,

    #[arg(short = 'v', visible_short_alias = 'V', long, action = ArgAction::Version, help = "Print version")]
    version: Option<bool>,

    /// Extra boot source, plain or zlib/gzip compressed
    #[arg(short = 'b', long, value_name = "PATH")]
    boot: Option<PathBuf>,

    /// Load and run a file into lib before the script (may be repeated)
    #[arg(short = 'i', long, value_name = "PATH")]
    import: Vec<PathBuf>,

    /// File access policy; `+s` and `-s` are shorthand for `--secure deny`
    #[arg(long, value_enum, default_value_t)]
    secure: SecurityPolicy,

    /// Report evaluation counts at exit, to PATH or stderr
    #[arg(short = 'p', long, value_name = "PATH", num_args = 0..=1, default_missing_value = "-")]
    profile: Option<PathBuf>,

    /// Print a CGI header before any output
    #[arg(short = 'c', long)]
    cgi: bool,

    /// Enter the REPL after the script finishes
    #[arg(long)]
    halt: bool,

    #[arg(short = 'd', long, help = "Debug logging")]
    debug: bool,

    #[arg(short = 'q', long, help = "No banner, errors-only logging")]
    quiet: bool,

    #[arg(short = 't', long, help = "Log every evaluator step")]
    trace: bool,

    #[arg(long, help = "Verbose logging")]
    verbose: bool,
}

/// Rewrites the historical `+s` / `-s` switches into `--secure deny`.
fn normalize_args(args: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out = Vec::new();
    for arg in args {
        match arg.as_str() {
            "+s" | "-s" => {
                out.push("--secure".to_string());
                out.push("deny".to_string());
            }
            _ => out.push(arg),
        }
    }
    out
}

fn init_logging(cli: &Cli) {
    let level = if cli.trace {
        LevelFilter::Trace
    } else if cli.debug || cli.verbose {
        LevelFilter::Debug
    } else if cli.quiet {
        LevelFilter::Error
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args()));
    init_logging(&cli);

    let worker = thread::Builder::new()
        .name("rebar".to_string())
        .stack_size(STACK_SIZE)
        .spawn(move || run(cli));
    match worker.map(|handle| handle.join()) {
        Ok(Ok(code)) => code,
        Ok(Err(_)) => {
            error!("interpreter thread panicked");
            ExitCode::from(255)
        }
        Err(err) => {
            eprintln!("cannot start interpreter thread: {err}");
            ExitCode::from(255)
        }
    }
}

/// Process status for `code`. The OS keeps only the low byte, so a
/// failing code whose low byte is zero still reports failure.
fn status_byte(code: i32) -> u8 {
    match (code & 0xff) as u8 {
        0 if code != 0 => 1,
        byte => byte,
    }
}

fn exit_code(err: &Error) -> ExitCode {
    ExitCode::from(status_byte(err.exit_code()))
}

fn run(cli: Cli) -> ExitCode {
    let settings = Settings {
        security: cli.secure,
        trace: cli.trace,
        stack_limit: STACK_LIMIT,
        ..Default::default()
    };
    let mut interp = match Interp::new(settings) {
        Ok(interp) => interp,
        Err(err) => {
            eprintln!("boot failed: {err}");
            return ExitCode::from(255);
        }
    };

    let result = session(&mut interp, &cli);
    if let Some(path) = &cli.profile {
        report_profile(&interp, path);
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(Error::Quit(code)) => {
            debug!("quit with status {code}");
            ExitCode::from(status_byte(code))
        }
        Err(err) => {
            eprintln!("{}", interp.format_error(&err));
            exit_code(&err)
        }
    }
}

fn read_source(path: &Path) -> rebar::Result<String> {
    fs::read_to_string(path).map_err(|err| {
        Error::raised(ErrorId::CannotOpen).with_message(format!("cannot read {}: {err}", path.display()))
    })
}

fn session(interp: &mut Interp, cli: &Cli) -> rebar::Result<()> {
    if cli.cgi {
        interp.write_out("Content-Type: text/html\r\n\r\n")?;
    }
    if let Some(path) = &cli.boot {
        let bytes = fs::read(path).map_err(|err| {
            Error::raised(ErrorId::CannotOpen).with_message(format!("cannot read {}: {err}", path.display()))
        })?;
        boot::load_boot_source(interp, &bytes)?;
        let file = interp.heap.make_string(&path.display().to_string());
        boot::set_system_option(interp, "boot", Value::series(Kind::File, file, 0))?;
    }
    for path in &cli.import {
        let source = read_source(path)?;
        interp.do_text(&source)?;
    }

    let args: Vec<Value> = cli
        .args
        .iter()
        .map(|arg| {
            let text = interp.heap.make_string(arg);
            Value::series(Kind::String, text, 0)
        })
        .collect();
    let args = interp.heap.make_array(&args);
    boot::set_system_option(interp, "args", Value::block(args))?;
    boot::set_system_option(interp, "quiet", Value::logic(cli.quiet))?;

    for expr in &cli.eval {
        interp.do_text(expr)?;
    }
    if let Some(path) = &cli.script {
        let file = interp.heap.make_string(&path.display().to_string());
        boot::set_system_option(interp, "script", Value::series(Kind::File, file, 0))?;
        let source = read_source(path)?;
        interp.do_text(&source)?;
    }
    if (cli.script.is_none() && cli.eval.is_empty()) || cli.halt {
        repl(interp, cli.quiet)?;
    }
    Ok(())
}

fn repl(interp: &mut Interp, quiet: bool) -> rebar::Result<()> {
    if !quiet {
        println!("rebar {}", rebar::VERSION);
        println!("Type 'quit' to leave.");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                if input_buffer.trim().is_empty() {
                    continue;
                }
                match interp.do_text(&input_buffer) {
                    Ok(value) if value.is_void() => {}
                    Ok(value) => println!("== {}", interp.mold(value)),
                    Err(err @ Error::Quit(_)) => return Err(err),
                    Err(err) => eprintln!("{}", interp.format_error(&err)),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
    Ok(())
}

fn report_profile(interp: &Interp, path: &Path) {
    let report = format!(
        "steps: {}\ncalls: {}\nrecycles: {}\nseries: {}\nallocations: {}\nfrees: {}\n",
        interp.stats.steps,
        interp.stats.calls,
        interp.stats.recycles,
        interp.heap.live_count(),
        interp.heap.stats.allocations,
        interp.heap.stats.frees,
    );
    if path == Path::new("-") {
        eprint!("{report}");
    } else if let Err(err) = fs::write(path, report) {
        eprintln!("cannot write profile to {}: {err}", path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plus_s_means_secure_deny() {
        let args = normalize_args(["rebar", "+s", "x.r"].map(String::from));
        let cli = Cli::parse_from(args);
        assert_eq!(cli.secure, SecurityPolicy::Deny);
        assert_eq!(cli.script, Some(PathBuf::from("x.r")));
    }

    #[test]
    fn flags_and_script_args() {
        let cli = Cli::parse_from(["rebar", "-q", "--profile", "--do", "1 + 1", "run.r", "a", "-b"]);
        assert!(cli.quiet);
        assert_eq!(cli.eval, vec!["1 + 1".to_string()]);
        assert_eq!(cli.script, Some(PathBuf::from("run.r")));
        assert_eq!(cli.args, vec!["a".to_string(), "-b".to_string()]);
        assert_eq!(cli.profile, Some(PathBuf::from("-")));
    }

    #[test]
    fn failing_codes_never_wrap_to_success() {
        assert_eq!(status_byte(0), 0);
        assert_eq!(status_byte(7), 7);
        assert_eq!(status_byte(256), 1);
        assert_eq!(status_byte(-256), 1);
        assert_eq!(status_byte(300), 44);
        assert_eq!(status_byte(-1), 255);
    }

    #[test]
    fn secure_policy_by_name() {
        let cli = Cli::parse_from(["rebar", "--secure", "quit"]);
        assert_eq!(cli.secure, SecurityPolicy::Quit);
    }
}
