//! Operator commands typed while a job runs.
//!
//! A background task reads lines, parses them and forwards the result to the
//! controller over a bounded channel. The listener only ever enqueues
//! commands; acting on them is the controller's business.

use std::fmt;
use tokio::io::{AsyncBufRead, Lines};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    /// Stop after the current chunk and keep progress.
    StopSave,
    /// Stop now, abandoning the chunk in flight. Progress is kept.
    ForceStop,
    /// Stop and erase every trace of the job.
    StopDelete,
    Help,
    /// Sent by the listener when operator input ends. Never parsed.
    InputClosed,
}

/// Summary printed for `h`/`help` and unknown input.
pub const HELP: &str = "\
Commands:
  p, pause             pause after the current chunk
  r, resume            resume from pause
  s, stop, q, quit     stop and save progress
  f, force, fs         stop immediately; the current chunk is redone on resume
  sd, delete           stop and DELETE all progress and audio files
  h, help              show this help
Ctrl-C acts like force stop.";

impl Command {
    /// Parse one line of operator input.
    pub fn parse(input: &str) -> Option<Self> {
        let cmd = match input.trim().to_lowercase().as_str() {
            "p" | "pause" => Command::Pause,
            "r" | "resume" => Command::Resume,
            "s" | "stop" | "q" | "quit" => Command::StopSave,
            "f" | "force" | "fs" | "force-stop" => Command::ForceStop,
            "sd" | "delete" | "stop-delete" | "abort" => Command::StopDelete,
            "h" | "help" | "?" => Command::Help,
            _ => return None,
        };
        Some(cmd)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::StopSave => "stop",
            Command::ForceStop => "force-stop",
            Command::StopDelete => "stop-delete",
            Command::Help => "help",
            Command::InputClosed => "end-of-input",
        };
        f.write_str(name)
    }
}

/// Read commands from `lines` until input ends or the controller goes away.
///
/// End of input is reported with [`Command::InputClosed`].
pub fn spawn_listener<R>(mut lines: Lines<R>, tx: mpsc::Sender<Command>) -> JoinHandle<()>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "command input closed");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match Command::parse(&line) {
                Some(cmd) => {
                    debug!(%cmd, "operator command");
                    if tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                None => {
                    debug!(input = %line.trim(), "ignoring unknown command");
                    println!("{HELP}");
                }
            }
        }
        let _ = tx.send(Command::InputClosed).await;
    })
}

/// Turn Ctrl-C into [`Command::ForceStop`].
pub fn forward_interrupts(tx: mpsc::Sender<Command>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if tx.send(Command::ForceStop).await.is_err() {
                break;
            }
        }
    })
}
