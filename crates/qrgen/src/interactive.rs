use std::path::PathBuf;

use log::info;
use qrgen_core::{ApplyResult, UpdateConfig, UpdateOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::AppError;
use crate::render::{EcLevel, OutputFormat, QrSettings};
use crate::session::{Message, SaveOutcome, Session};
use crate::updater::{Interrupts, run_update};

const HELP: &str = "\
Type text or a URL to encode it. Commands:
  :ec L|M|Q|H       error correction level
  :box 5-50         module size in pixels
  :border 1-10      quiet zone in modules
  :format png|svg   output format
  :save <path>      write the current code
  :update           check for and install updates
  :help             show this help
  :quit             exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Edit(Message),
    Save(PathBuf),
    Update,
    Help,
    Quit,
}

pub fn parse_line(line: &str) -> Result<Command, String> {
    let Some(command) = line.strip_prefix(':') else {
        return Ok(Command::Edit(Message::TextChanged(line.to_string())));
    };

    let (name, argument) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command.trim(), ""),
    };

    match name {
        "ec" => argument
            .parse::<EcLevel>()
            .map(|level| Command::Edit(Message::EcLevelChanged(level))),
        "box" => parse_number(argument, "box size")
            .map(|size| Command::Edit(Message::BoxSizeChanged(size))),
        "border" => parse_number(argument, "border")
            .map(|border| Command::Edit(Message::BorderChanged(border))),
        "format" => argument
            .parse::<OutputFormat>()
            .map(|format| Command::Edit(Message::FormatChanged(format))),
        "save" if argument.is_empty() => Err("usage: :save <path>".to_string()),
        "save" => Ok(Command::Save(PathBuf::from(argument))),
        "update" => Ok(Command::Update),
        "help" | "h" => Ok(Command::Help),
        "quit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command ':{other}' (try :help)")),
    }
}

fn parse_number(argument: &str, what: &str) -> Result<u32, String> {
    argument
        .parse()
        .map_err(|_| format!("{what} must be a whole number, got '{argument}'"))
}

fn show(session: &Session) {
    match session.current() {
        Some(code) => {
            println!("{}", code.preview);
            println!("{}", code.content);
        }
        None => println!("(no QR code)"),
    }
}

pub enum SessionEnd {
    Quit(QrSettings),
    Updated(ApplyResult),
}

/// Line-driven editing loop on stdin.
pub async fn run(
    mut session: Session,
    config: &UpdateConfig,
    interrupts: &Interrupts,
) -> Result<SessionEnd, AppError> {
    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let Some(line) = lines
            .next_line()
            .await
            .map_err(|error| AppError::from(format!("Failed to read input: {error}")))?
        else {
            return Ok(SessionEnd::Quit(*session.settings()));
        };

        let command = match parse_line(line.trim_end()) {
            Ok(command) => command,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };

        match command {
            Command::Edit(message) => match session.update(message) {
                Ok(true) => show(&session),
                Ok(false) => {}
                Err(error) => eprintln!("{}", AppError::render_failed(error)),
            },
            Command::Save(path) => match session.save(&path) {
                Ok(SaveOutcome::Saved(path)) => {
                    info!("Saved QR code to {}", path.display());
                    println!("Saved {}", path.display());
                }
                Ok(SaveOutcome::NothingToSave) => println!("Nothing to save yet."),
                Err(error) => eprintln!("{error}"),
            },
            Command::Update => {
                if let UpdateOutcome::Applied(result) =
                    run_update(config.clone(), false, interrupts).await?
                {
                    return Ok(SessionEnd::Updated(result));
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return Ok(SessionEnd::Quit(*session.settings())),
        }
    }
}
