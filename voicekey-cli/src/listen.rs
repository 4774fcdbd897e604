//! The `listen` command: live capture, console control, session storage.

use std::io::BufRead;
use std::path::Path;
use std::thread;

use anyhow::{bail, Result};
use crossbeam_channel::{select, Receiver};
use tracing::{debug, info, warn};
use voicekey_core::audio::CpalCapture;
use voicekey_core::{Command, Driver, EngineConfig, EngineOutput, NoteEventKind, OperatingMode};

use crate::console::{self, ConsoleInput};
use crate::sessions;

/// State the console needs to resolve toggles.
struct ListenState {
    mode: OperatingMode,
    monitor: bool,
}

pub fn run(config: EngineConfig, sessions_dir: &Path) -> Result<()> {
    let frame_size = config.frame_size;
    let mut state = ListenState {
        mode: config.mode,
        monitor: config.monitor_enabled,
    };

    let driver = Driver::spawn(config, move || CpalCapture::start(frame_size))?;
    let lines = spawn_stdin_reader();

    println!("{}", console::HELP);
    info!(mode = ?state.mode, sessions_dir = %sessions_dir.display(), "listening");

    loop {
        select! {
            recv(lines) -> line => {
                let Ok(line) = line else {
                    debug!("stdin closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match console::parse_line(&line) {
                    Ok(ConsoleInput::Quit) => break,
                    Ok(ConsoleInput::Help) => println!("{}", console::HELP),
                    Ok(input) => {
                        let command = console::to_command(input, state.mode, state.monitor);
                        if let Some(command) = command {
                            if let Command::SetMonitor(enabled) = command {
                                state.monitor = enabled;
                                println!("monitor {}", if enabled { "on" } else { "off" });
                            }
                            driver.send(command)?;
                        }
                    }
                    Err(message) => println!("{} (type `help`)", message),
                }
            },
            recv(driver.outputs()) -> output => match output {
                Ok(output) => handle_output(output, &mut state, sessions_dir),
                Err(_) => bail!("driver stopped unexpectedly"),
            },
        }
    }

    info!("shutting down");
    for output in driver.shutdown().try_iter() {
        handle_output(output, &mut state, sessions_dir);
    }
    Ok(())
}

fn handle_output(output: EngineOutput, state: &mut ListenState, sessions_dir: &Path) {
    match output {
        EngineOutput::Note(event) => {
            let verb = match event.kind {
                NoteEventKind::Attack => "attack ",
                NoteEventKind::Release => "release",
            };
            println!("{:>9.3}s  {}  {}", event.time, verb, event.label());
        }
        EngineOutput::Meter {
            level,
            frequency,
            cents_deviation,
            armed,
            ..
        } => {
            debug!(level, ?frequency, ?cents_deviation, armed, "meter");
        }
        EngineOutput::ModeChanged {
            previous,
            current,
            voice_routed,
        } => {
            state.mode = current;
            info!(?previous, ?current, voice_routed, "mode changed");
            println!("mode: {:?}", current);
        }
        EngineOutput::SessionComplete(session) => {
            match sessions::save_session(&session, sessions_dir) {
                Ok(path) => println!(
                    "saved {} notes ({:.2}s) to {}",
                    session.notes().len(),
                    session.duration(),
                    path.display()
                ),
                Err(e) => warn!("could not save session {}: {:#}", session.id(), e),
            }
        }
    }
}

/// Forwards stdin lines to a channel; the channel closes at end of input.
fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new()
        .name("voicekey-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if sender.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("console input unavailable: {}", e);
    }
    receiver
}
