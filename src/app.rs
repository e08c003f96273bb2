//! Interactive run loop: wires the orchestrator to the terminal.
//!
//! The session runs until the user quits (or stdin closes after `q`).
//! Commands are plain lines on stdin so the tool works over ssh and in
//! scripts:
//!
//! ```text
//! c | cut          end the current turn now
//! p | pause        stop listening, keep the session
//! s | start        resume listening
//! lang <code>      switch translation target
//! threshold <dur>  change the silence threshold (e.g. 750ms, 1s)
//! q | quit         end the session
//! ```

use crate::cli::parse_threshold_ms;
use crate::config::Config;
use crate::error::Result;
use crate::orchestrator::{Command, Notice, OrchestratorHandle};
use crate::session::{self, SessionOptions};
use crossbeam_channel::{never, select, unbounded, Receiver};
use owo_colors::OwoColorize;
use std::io::BufRead;
use std::thread;

enum LineAction {
    Continue,
    Quit,
}

pub fn run(config: Config, options: SessionOptions, quiet: bool, verbose: u8) -> Result<()> {
    let (deps, settings) = session::build(&config, &options)?;
    let (notice_tx, notice_rx) = unbounded();
    let mut orchestrator = OrchestratorHandle::spawn(deps, settings, notice_tx)?;

    let mut lines = spawn_stdin_reader();

    if !quiet {
        eprintln!(
            "{} listening for {} -> {} (c=cut p=pause s=start q=quit)",
            "voxflow:".bold(),
            config.translation.source_language,
            config.translation.target_language
        );
    }
    orchestrator.send(Command::Start);

    loop {
        select! {
            recv(notice_rx) -> notice => match notice {
                Ok(Notice::Stopped) => {
                    print_notice(&Notice::Stopped, quiet, verbose);
                    break;
                }
                Ok(notice) => print_notice(&notice, quiet, verbose),
                Err(_) => break,
            },
            recv(lines) -> line => match line {
                Ok(line) => {
                    if let LineAction::Quit = handle_line(&orchestrator, &line) {
                        orchestrator.send(Command::Stop);
                    }
                }
                // stdin closed (piped input); keep draining notices.
                Err(_) => lines = never(),
            },
        }
    }

    orchestrator.stop();
    Ok(())
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("stdin-reader".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
            }
        })
        .ok();
    rx
}

fn handle_line(orchestrator: &OrchestratorHandle, line: &str) -> LineAction {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "c" | "cut" => orchestrator.send(Command::ForceEndTurn),
        "p" | "pause" => orchestrator.send(Command::Pause),
        "s" | "start" | "resume" => orchestrator.send(Command::Start),
        "q" | "quit" | "exit" => return LineAction::Quit,
        "lang" => {
            if rest.is_empty() {
                eprintln!("usage: lang <code>");
            } else {
                orchestrator.send(Command::SetTargetLanguage(rest.to_string()));
            }
        }
        "threshold" => match parse_threshold_ms(rest) {
            Ok(ms) => orchestrator.send(Command::SetSilenceThreshold(ms)),
            Err(e) => eprintln!("bad threshold {:?}: {}", rest, e),
        },
        other => eprintln!("unknown command {:?} (c/p/s/lang/threshold/q)", other),
    }
    LineAction::Continue
}

fn print_notice(notice: &Notice, quiet: bool, verbose: u8) {
    match notice {
        Notice::Listening => {
            if !quiet {
                eprintln!("{}", "listening".green());
            }
        }
        Notice::Paused => {
            if !quiet {
                eprintln!("{}", "paused".yellow());
            }
        }
        Notice::Stopped => {
            if !quiet {
                eprintln!("{}", "session ended".dimmed());
            }
        }
        Notice::ChannelOpen => {
            if verbose >= 2 {
                eprintln!("{}", "channel open".dimmed());
            }
        }
        Notice::Partial(text) => {
            if verbose >= 1 {
                eprintln!("{} {}", "...".dimmed(), text.dimmed());
            }
        }
        Notice::Final(text) => {
            if verbose >= 1 {
                eprintln!("{} {}", "+".dimmed(), text);
            }
        }
        Notice::SegmentFlushed(text) => {
            if !quiet {
                println!("{} {}", ">".bold(), text);
            }
        }
        Notice::Translated { translated, .. } => {
            println!("{} {}", "=".bold().green(), translated.green());
        }
        Notice::TranslationReady(language) => {
            if verbose >= 1 {
                eprintln!("translation ready for {}", language);
            }
        }
        Notice::TranslationUnavailable { language, message } => {
            eprintln!(
                "{} translation unavailable for {}: {}",
                "!".red(),
                language,
                message
            );
        }
        Notice::TranscriptionSuspended(message) => {
            eprintln!("{} transcription suspended: {}", "!".red(), message);
        }
        Notice::Error(message) => {
            eprintln!("{} {}", "!".red(), message);
        }
    }
}
