//! binedit: line-driven front end for the binary editing session
//!
//! Usage: `binedit [FILE] [--delta] [--read-only]`, then one command per
//! line on stdin. Type `help` for the command list.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use binedit::error::{CommandError, SessionError, StoreError};
use binedit::{EditCommand, EditingSession, HandlingMode, SegmentsRepository, SessionSettings, UserChoice};
use thiserror::Error;

const HELP: &str = "\
commands:
  insert <offset> <hex>    insert bytes
  remove <offset> <len>    remove bytes
  write <offset> <hex>     overwrite bytes (may grow the document)
  read <offset> <len>      print bytes as hex
  undo [n] | redo [n]      step through history
  save | save-as <path>    write the document
  mode memory|delta        switch the backing store
  status                   show document state
  close                    close the document
  quit                     exit";

#[derive(Debug, Error)]
enum DriverError {
    #[error("{0}")]
    Usage(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

type DriverResult<T> = Result<T, DriverError>;

/// Parsed command line
#[derive(Debug, Default)]
struct Args {
    path: Option<PathBuf>,
    delta: bool,
    read_only: bool,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> DriverResult<Self> {
        let mut parsed = Args::default();
        for arg in args {
            match arg.as_str() {
                "--delta" => parsed.delta = true,
                "--read-only" => parsed.read_only = true,
                flag if flag.starts_with("--") => {
                    return Err(DriverError::Usage(format!("unknown option {}", flag)));
                }
                _ if parsed.path.is_some() => {
                    return Err(DriverError::Usage("only one file can be opened".into()));
                }
                _ => parsed.path = Some(PathBuf::from(&arg)),
            }
        }
        Ok(parsed)
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal number
fn parse_number(text: Option<&str>, what: &str) -> DriverResult<u64> {
    let text = text.ok_or_else(|| DriverError::Usage(format!("missing {}", what)))?;
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|_| DriverError::Usage(format!("invalid {}: {}", what, text)))
}

/// Parse a string of hex digit pairs, e.g. `deadBEEF`
fn parse_hex(text: Option<&str>) -> DriverResult<Vec<u8>> {
    let text = text.ok_or_else(|| DriverError::Usage("missing hex bytes".into()))?;
    if text.len() % 2 != 0 {
        return Err(DriverError::Usage("hex bytes need an even number of digits".into()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| DriverError::Usage(format!("invalid hex bytes: {}", text)))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(" ")
}

/// Ask how to handle unsaved changes; end of input counts as cancel
fn ask_user(lines: &mut impl Iterator<Item = io::Result<String>>) -> UserChoice {
    loop {
        print!("document has unsaved changes: [s]ave/[d]iscard/[c]ancel? ");
        let _ = io::stdout().flush();
        let Some(Ok(answer)) = lines.next() else {
            return UserChoice::Cancel;
        };
        match answer.trim() {
            "s" | "save" => return UserChoice::Save,
            "d" | "discard" => return UserChoice::Discard,
            "c" | "cancel" => return UserChoice::Cancel,
            _ => continue,
        }
    }
}

fn print_status(session: &EditingSession) {
    let name = session
        .document_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<unnamed>".to_string());
    println!(
        "{} | {} bytes | {} mode{} | position {}/{}{}",
        name,
        session.document_size(),
        session.handling_mode(),
        if session.is_writable() { "" } else { " | read-only" },
        session.history().command_position(),
        session.history().command_count(),
        if session.has_unsaved_changes() { " | unsaved" } else { "" }
    );
}

/// Run one input line. Returns `false` when the driver should exit.
fn run_line(
    session: &mut EditingSession,
    line: &str,
    confirm: &mut dyn FnMut() -> UserChoice,
) -> DriverResult<bool> {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return Ok(true);
    };

    match command {
        "insert" => {
            let offset = parse_number(words.next(), "offset")?;
            session.execute(EditCommand::insert(offset, parse_hex(words.next())?))?;
        }
        "remove" => {
            let offset = parse_number(words.next(), "offset")?;
            let len = parse_number(words.next(), "length")?;
            session.execute(EditCommand::remove(offset, len))?;
        }
        "write" => {
            let offset = parse_number(words.next(), "offset")?;
            session.execute(EditCommand::overwrite(offset, parse_hex(words.next())?))?;
        }
        "read" => {
            let offset = parse_number(words.next(), "offset")?;
            let len = parse_number(words.next(), "length")?;
            println!("{}", to_hex(&session.read(offset, len)?));
        }
        "undo" => {
            let steps = words.next().map_or(Ok(1), |n| parse_number(Some(n), "count"))?;
            session.undo_steps(steps as usize)?;
        }
        "redo" => {
            let steps = words.next().map_or(Ok(1), |n| parse_number(Some(n), "count"))?;
            session.redo_steps(steps as usize)?;
        }
        "save" => session.save()?,
        "save-as" => {
            let path = words
                .next()
                .ok_or_else(|| DriverError::Usage("missing path".into()))?;
            session.save_as(path)?;
        }
        "mode" => {
            let mode = words
                .next()
                .ok_or_else(|| DriverError::Usage("missing mode".into()))?
                .parse::<HandlingMode>()
                .map_err(DriverError::Usage)?;
            session.switch_handling_mode(mode, &mut *confirm)?;
        }
        "status" => print_status(session),
        "close" => session.close(),
        "help" => println!("{}", HELP),
        "quit" | "exit" => {
            if session.is_modified() {
                log::warn!("Exiting with unsaved changes");
            }
            return Ok(false);
        }
        other => return Err(DriverError::Usage(format!("unknown command {}; try help", other))),
    }
    Ok(true)
}

fn main() -> ExitCode {
    env_logger::init();

    let args = match Args::parse(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("usage: binedit [FILE] [--delta] [--read-only]");
            return ExitCode::FAILURE;
        }
    };

    let mut settings = SessionSettings::load();
    let mut session = EditingSession::with_settings(SegmentsRepository::shared(), &settings);

    if let Some(path) = &args.path {
        let mode = if args.delta {
            HandlingMode::Delta
        } else {
            settings.default_handling_mode
        };
        if let Err(e) = session.open(path, !args.read_only, mode) {
            eprintln!("cannot open {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        settings.add_recent_file(path.clone());
        settings.save();
    }

    let mut lines = io::stdin().lock().lines();
    while let Some(line) = lines.next() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("error reading input: {}", e);
                return ExitCode::FAILURE;
            }
        };

        let mut confirm = || ask_user(&mut lines);
        match run_line(&mut session, &line, &mut confirm) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {}", e),
        }
    }

    ExitCode::SUCCESS
}
