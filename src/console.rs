//! Line commands on stdin, standing in for the dashboard's buttons.

use std::{
    io::{self, BufRead},
    thread,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{scheduler::Trigger, Window};

// ---

pub const HELP: &str =
    "commands: refresh | window <1h|6h|24h|7d> | recalc | export | expand | collapse | help | quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Trigger(Trigger),
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    Unknown(String),
    #[error("{0}")]
    BadWindow(String),
    #[error("missing window, expected one of 1h, 6h, 24h, 7d")]
    MissingWindow,
}

pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    // ---
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(Command::Help);
    };

    let trigger = match verb.to_ascii_lowercase().as_str() {
        "refresh" | "r" => Trigger::Refresh,
        "window" | "w" => {
            let arg = parts.next().ok_or(CommandError::MissingWindow)?;
            let window = arg
                .parse::<Window>()
                .map_err(|e| CommandError::BadWindow(e.to_string()))?;
            Trigger::SetWindow(window)
        }
        "recalc" => Trigger::Recalculate,
        "export" | "e" => Trigger::Export,
        "expand" | "collapse" | "table" => Trigger::ToggleTable,
        "help" | "?" => return Ok(Command::Help),
        "quit" | "q" | "exit" => return Ok(Command::Quit),
        other => return Err(CommandError::Unknown(other.to_string())),
    };

    Ok(Command::Trigger(trigger))
}

/// Read commands from stdin on a dedicated thread until it closes or `quit`
/// is entered. `quit` cancels the token so the rest of the process shuts down.
///
/// A plain thread is used so a blocked read never holds up process exit.
pub fn spawn_console(
    triggers: mpsc::Sender<Trigger>,
    cancel: CancellationToken,
) -> std::io::Result<thread::JoinHandle<()>> {
    // ---
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || read_commands(io::stdin().lock(), &triggers, &cancel))
}

fn read_commands(
    input: impl BufRead,
    triggers: &mpsc::Sender<Trigger>,
    cancel: &CancellationToken,
) {
    // ---
    for line in input.lines() {
        if cancel.is_cancelled() {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read console input: {}", e);
                return;
            }
        };

        match parse_command(&line) {
            Ok(Command::Trigger(trigger)) => {
                if triggers.blocking_send(trigger).is_err() {
                    return;
                }
            }
            Ok(Command::Help) => println!("{HELP}"),
            Ok(Command::Quit) => {
                cancel.cancel();
                return;
            }
            Err(e) => println!("{e}\n{HELP}"),
        }
    }

    debug!("stdin closed, console input disabled");
}
