//! Recording sessions on disk, one pretty-printed JSON file per session.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use voicekey_core::RecordingSession;

/// Saves a session as `<dir>/<id>.json`.
///
/// # Arguments
/// * `session` - The sealed session to store
/// * `dir` - Directory to write into; created when missing
///
/// # Returns
/// * `Ok(path)` - Where the session was written
/// * `Err(e)` - File I/O or serialization error
pub fn save_session(session: &RecordingSession, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(format!("{}.json", session.id()));
    let json_string = serde_json::to_string_pretty(session).context("serializing session")?;
    let mut file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    file.write_all(json_string.as_bytes())?;
    Ok(path)
}

/// Loads a session previously written by [`save_session`].
pub fn load_session(path: &Path) -> Result<RecordingSession> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut data = String::new();
    file.read_to_string(&mut data)?;
    let session = serde_json::from_str(&data)
        .with_context(|| format!("parsing session {}", path.display()))?;
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicekey_core::{NoteEvent, PitchIndex, RecordingSegmenter};

    #[test]
    fn session_survives_save_and_load() {
        let mut segmenter = RecordingSegmenter::default();
        segmenter.start(0.0).unwrap();
        segmenter.observe(&NoteEvent::attack(PitchIndex(60), 0.1));
        segmenter.observe(&NoteEvent::release(PitchIndex(60), 0.6));
        let session = segmenter.stop(1.0, Some("take.wav".to_string())).unwrap();

        let dir = std::env::temp_dir().join(format!("voicekey-sessions-{}", session.id()));
        let path = save_session(&session, &dir).unwrap();
        assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("{}.json", session.id()));

        let loaded = load_session(&path).unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.audio_asset(), Some("take.wav"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_session(Path::new("/nonexistent/voicekey/session.json")).unwrap_err();
        assert!(format!("{:#}", err).contains("/nonexistent/voicekey/session.json"));
    }
}
