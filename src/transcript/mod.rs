//! Transcript sink: one timestamped text file per session.
//!
//! Appends can be triggered from several places (translation completions,
//! session teardown), so all writes go through one mutex-guarded writer.

use crate::error::{Result, VoxflowError};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// RFC3339 timestamp with colons swapped out so it is filename-safe.
fn file_stamp(now: SystemTime) -> String {
    humantime::format_rfc3339_seconds(now)
        .to_string()
        .replace(':', "-")
}

fn line_stamp(now: SystemTime) -> String {
    humantime::format_rfc3339_seconds(now).to_string()
}

struct OpenSession {
    path: PathBuf,
    file: File,
}

/// Serialized writer for session transcripts.
pub struct TranscriptWriter {
    directory: PathBuf,
    session: Mutex<Option<OpenSession>>,
}

impl TranscriptWriter {
    pub fn new(directory: &Path) -> Self {
        Self {
            directory: directory.to_path_buf(),
            session: Mutex::new(None),
        }
    }

    /// Open a new session file if none is open. Idempotent.
    pub fn ensure_session_started(&self) -> Result<PathBuf> {
        let mut guard = self.lock()?;
        if let Some(session) = guard.as_ref() {
            return Ok(session.path.clone());
        }

        fs::create_dir_all(&self.directory)?;
        let now = SystemTime::now();
        let path = self
            .directory
            .join(format!("voxflow-{}.txt", file_stamp(now)));
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        writeln!(file, "--- session started {} ---", line_stamp(now))?;
        file.flush()?;

        let result = path.clone();
        *guard = Some(OpenSession { path, file });
        Ok(result)
    }

    /// Write one record, opening a session first if needed.
    pub fn append(&self, line: &str) -> Result<()> {
        {
            let guard = self.lock()?;
            if guard.is_none() {
                drop(guard);
                self.ensure_session_started()?;
            }
        }

        let mut guard = self.lock()?;
        if let Some(session) = guard.as_mut() {
            writeln!(session.file, "{}", line)?;
            session.file.flush()?;
        }
        Ok(())
    }

    /// Record one transcribed/translated pair, the format readers of the
    /// transcript files expect.
    pub fn append_exchange(
        &self,
        source_lang: &str,
        original: &str,
        target_lang: &str,
        translated: &str,
    ) -> Result<()> {
        self.append(&format!(
            "[{}]: {}\n[{}]: {}",
            source_lang.to_uppercase(),
            original,
            target_lang.to_uppercase(),
            translated
        ))
    }

    /// Write the closing marker and close the file. No-op when no session is
    /// open.
    pub fn end_session(&self, reason: &str) -> Result<()> {
        let mut guard = self.lock()?;
        if let Some(mut session) = guard.take() {
            writeln!(
                session.file,
                "--- session ended ({}) {} ---",
                reason,
                line_stamp(SystemTime::now())
            )?;
            session.file.flush()?;
        }
        Ok(())
    }

    /// Path of the open session file, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.path.clone()))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<OpenSession>>> {
        self.session.lock().map_err(|_| VoxflowError::Transcript {
            message: "transcript writer lock poisoned".to_string(),
        })
    }
}
