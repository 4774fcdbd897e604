//! Line-based command vocabulary read from stdin while listening.

use voicekey_core::{Command, OperatingMode};

/// One parsed console line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleInput {
    Mode(OperatingMode),
    ToggleRecording,
    ToggleMonitor,
    Sensitivity(f32),
    Gain(f32),
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  i, idle          stop producing notes
  n, notes         voice plays notes
  p, passthrough   route the voice, no notes
  r, record        start/stop recording
  m, monitor       toggle monitoring
  s <value>        set sensitivity (RMS gate)
  g <value>        set microphone gain
  h, help          show this help
  q, quit          exit";

/// Parses one line of user input.
pub fn parse_line(line: &str) -> Result<ConsoleInput, String> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err("empty command".to_string());
    };
    let mut value = |allow_zero: bool| -> Result<f32, String> {
        let text = words
            .next()
            .ok_or_else(|| format!("`{}` needs a value", head))?;
        let value: f32 = text
            .parse()
            .map_err(|_| format!("`{}` is not a number", text))?;
        let in_range = if allow_zero { value >= 0.0 } else { value > 0.0 };
        if value.is_finite() && in_range {
            Ok(value)
        } else if allow_zero {
            Err(format!("`{}` must be a non-negative number", text))
        } else {
            Err(format!("`{}` must be a positive number", text))
        }
    };

    match head.to_ascii_lowercase().as_str() {
        "i" | "idle" => Ok(ConsoleInput::Mode(OperatingMode::Idle)),
        "n" | "notes" => Ok(ConsoleInput::Mode(OperatingMode::NoteInput)),
        "p" | "passthrough" => Ok(ConsoleInput::Mode(OperatingMode::VoicePassthrough)),
        "r" | "record" => Ok(ConsoleInput::ToggleRecording),
        "m" | "monitor" => Ok(ConsoleInput::ToggleMonitor),
        "s" | "sensitivity" => value(true).map(ConsoleInput::Sensitivity),
        "g" | "gain" => value(false).map(ConsoleInput::Gain),
        "h" | "help" | "?" => Ok(ConsoleInput::Help),
        "q" | "quit" | "exit" => Ok(ConsoleInput::Quit),
        other => Err(format!("unknown command `{}`", other)),
    }
}

/// Turns console input into a driver command given the current state.
///
/// Stopping a recording returns to note input so the voice keeps playing.
pub fn to_command(input: ConsoleInput, mode: OperatingMode, monitor: bool) -> Option<Command> {
    match input {
        ConsoleInput::Mode(mode) => Some(Command::SetMode(mode)),
        ConsoleInput::ToggleRecording => {
            let next = if mode == OperatingMode::Recording {
                OperatingMode::NoteInput
            } else {
                OperatingMode::Recording
            };
            Some(Command::SetMode(next))
        }
        ConsoleInput::ToggleMonitor => Some(Command::SetMonitor(!monitor)),
        ConsoleInput::Sensitivity(value) => Some(Command::SetSensitivity(value)),
        ConsoleInput::Gain(value) => Some(Command::SetGain(value)),
        ConsoleInput::Help | ConsoleInput::Quit => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_forms() {
        assert_eq!(parse_line("n"), Ok(ConsoleInput::Mode(OperatingMode::NoteInput)));
        assert_eq!(
            parse_line("  Passthrough "),
            Ok(ConsoleInput::Mode(OperatingMode::VoicePassthrough))
        );
        assert_eq!(parse_line("record"), Ok(ConsoleInput::ToggleRecording));
        assert_eq!(parse_line("q"), Ok(ConsoleInput::Quit));
    }

    #[test]
    fn parses_values() {
        assert_eq!(parse_line("s 0.02"), Ok(ConsoleInput::Sensitivity(0.02)));
        assert_eq!(parse_line("gain 2"), Ok(ConsoleInput::Gain(2.0)));
        assert!(parse_line("s").is_err());
        assert!(parse_line("g loud").is_err());
        assert!(parse_line("g -1").is_err());
        assert!(parse_line("g 0").is_err());
        assert!(parse_line("g NaN").is_err());
        assert_eq!(parse_line("s 0"), Ok(ConsoleInput::Sensitivity(0.0)));
        assert!(parse_line("s inf").is_err());
    }

    #[test]
    fn rejects_unknown_and_empty_lines() {
        assert!(parse_line("").is_err());
        assert!(parse_line("play").is_err());
    }

    #[test]
    fn recording_toggles_against_current_mode() {
        assert_eq!(
            to_command(ConsoleInput::ToggleRecording, OperatingMode::Idle, false),
            Some(Command::SetMode(OperatingMode::Recording))
        );
        assert_eq!(
            to_command(ConsoleInput::ToggleRecording, OperatingMode::Recording, false),
            Some(Command::SetMode(OperatingMode::NoteInput))
        );
        assert_eq!(
            to_command(ConsoleInput::ToggleMonitor, OperatingMode::Idle, true),
            Some(Command::SetMonitor(false))
        );
        assert_eq!(to_command(ConsoleInput::Quit, OperatingMode::Idle, false), None);
    }
}
