//! # Driver Module
//!
//! Runs the engine at a fixed cadence on a dedicated thread.
//!
//! ## Architecture
//! - **Driver thread**: owns the [`Engine`] and the [`FrameSource`]; the only
//!   writer of tracker state
//! - **Ticker**: `crossbeam_channel::tick` re-enqueues one tick per period
//! - **Commands**: mode and setting changes, applied between ticks so no tick
//!   ever sees a half-applied switch
//! - **Outputs**: note events, meter readings and sealed sessions, sent back
//!   over an unbounded channel
//!
//! Cancellation is a shutdown message; the loop releases any held note,
//! seals an open recording, reports both and exits.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use crossbeam_channel::{select, Receiver, Sender};
use tracing::{debug, error, info};

use crate::config::EngineConfig;
use crate::engine::{Engine, ModeSwitch, OperatingMode};
use crate::frame::AudioFrame;
use crate::recording::RecordingSession;
use crate::tracker::NoteEvent;
use crate::tuning::PitchIndex;

/// Pull-based audio input, called once per tick.
///
/// Must not block. Returning `None` skips the tick.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<AudioFrame>;
}

/// External state changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    SetMode(OperatingMode),
    SetSensitivity(f32),
    SetGain(f32),
    SetMonitor(bool),
}

/// Everything the driver reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOutput {
    /// Attack or release for the synthesizer.
    Note(NoteEvent),
    /// Per-tick reading for display.
    Meter {
        time: f64,
        level: f32,
        frequency: Option<f32>,
        pitch: Option<PitchIndex>,
        cents_deviation: Option<f32>,
        armed: bool,
    },
    ModeChanged {
        previous: OperatingMode,
        current: OperatingMode,
        voice_routed: bool,
    },
    /// A recording finished and is ready to be stored.
    SessionComplete(RecordingSession),
}

/// Handle to the running driver thread.
#[derive(Debug)]
pub struct Driver {
    commands: Sender<Command>,
    outputs: Receiver<EngineOutput>,
    shutdown_tx: Sender<()>,
    thread_handle: Option<JoinHandle<()>>,
}

impl Driver {
    /// Spawns the driver thread.
    ///
    /// `make_source` runs on the driver thread, so sources that are not
    /// `Send` (such as a CPAL stream) can be used. Returns once the source is
    /// ready, or with its error.
    pub fn spawn<S, F>(config: EngineConfig, make_source: F) -> Result<Self>
    where
        S: FrameSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        config.validate()?;
        let period = config.tick_period()?;

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (output_tx, output_rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<std::result::Result<(), String>>(1);

        let thread_handle = thread::Builder::new()
            .name("voicekey-driver".into())
            .spawn(move || {
                debug!("driver thread starting");
                let source = match make_source() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        error!("Fatal error starting frame source: {:#}", e);
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                let engine = Engine::new(&config);
                run_loop(engine, source, period, command_rx, shutdown_rx, output_tx);
                debug!("driver thread finished");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                commands: command_tx,
                outputs: output_rx,
                shutdown_tx,
                thread_handle: Some(thread_handle),
            }),
            Ok(Err(message)) => {
                let _ = thread_handle.join();
                Err(anyhow!(message))
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(anyhow!("driver thread exited before becoming ready"))
            }
        }
    }

    pub fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("driver is no longer running"))
    }

    /// A second sender, e.g. for an input thread.
    pub fn commands(&self) -> Sender<Command> {
        self.commands.clone()
    }

    pub fn outputs(&self) -> &Receiver<EngineOutput> {
        &self.outputs
    }

    /// Stops the loop and waits for the thread. Final outputs stay readable
    /// from the returned receiver.
    pub fn shutdown(mut self) -> Receiver<EngineOutput> {
        self.stop();
        self.outputs.clone()
    }

    fn stop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.shutdown_tx.try_send(());
            if handle.join().is_err() {
                error!("driver thread panicked");
            }
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop<S: FrameSource>(
    mut engine: Engine,
    mut source: S,
    period: Duration,
    commands: Receiver<Command>,
    shutdown: Receiver<()>,
    outputs: Sender<EngineOutput>,
) {
    let clock = Instant::now();
    let ticker = crossbeam_channel::tick(period);
    info!(period_ms = period.as_secs_f64() * 1000.0, mode = ?engine.mode(), "driver loop running");

    loop {
        select! {
            recv(ticker) -> _ => {
                let now = clock.elapsed().as_secs_f64();
                let Some(frame) = source.next_frame() else {
                    continue;
                };
                let report = engine.tick(&frame, now);
                let mut sent = report
                    .transition
                    .events()
                    .all(|event| outputs.send(EngineOutput::Note(event)).is_ok());
                sent &= outputs
                    .send(EngineOutput::Meter {
                        time: report.time,
                        level: report.level,
                        frequency: report.frequency,
                        pitch: report.pitch,
                        cents_deviation: report.cents_deviation,
                        armed: report.armed,
                    })
                    .is_ok();
                if !sent {
                    break;
                }
            },
            recv(commands) -> msg => match msg {
                Ok(command) => {
                    let now = clock.elapsed().as_secs_f64();
                    if !apply_command(&mut engine, command, now, &outputs) {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }

    let now = clock.elapsed().as_secs_f64();
    let switch = engine.shutdown(now);
    emit_mode_switch(&engine, switch, &outputs);
    info!("driver loop stopped");
}

/// Applies one command. Returns false once nobody listens to outputs.
fn apply_command(
    engine: &mut Engine,
    command: Command,
    now: f64,
    outputs: &Sender<EngineOutput>,
) -> bool {
    debug!(?command, "applying command");
    match command {
        Command::SetMode(mode) => {
            let switch = engine.set_mode(mode, now);
            emit_mode_switch(engine, switch, outputs)
        }
        Command::SetSensitivity(value) => {
            engine.set_sensitivity(value);
            true
        }
        Command::SetGain(value) => {
            engine.set_gain(value);
            true
        }
        Command::SetMonitor(enabled) => {
            engine.set_monitor(enabled);
            true
        }
    }
}

fn emit_mode_switch(engine: &Engine, switch: ModeSwitch, outputs: &Sender<EngineOutput>) -> bool {
    let mut sent = true;
    if let Some(event) = switch.release {
        sent &= outputs.send(EngineOutput::Note(event)).is_ok();
    }
    if let Some(session) = switch.session {
        sent &= outputs.send(EngineOutput::SessionComplete(session)).is_ok();
    }
    if switch.previous != switch.current {
        sent &= outputs
            .send(EngineOutput::ModeChanged {
                previous: switch.previous,
                current: switch.current,
                voice_routed: engine.voice_routed(),
            })
            .is_ok();
    }
    sent
}
