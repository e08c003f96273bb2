//! Translator backed by an external command-line translator
//! (translate-shell's `trans` by default).

use crate::error::{Result, VoxflowError};
use crate::translate::Translator;
use std::process::{Command, Stdio};

pub struct CommandTranslator {
    program: String,
    source: String,
    target: String,
}

impl CommandTranslator {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            source: String::new(),
            target: String::new(),
        }
    }
}

impl Default for CommandTranslator {
    fn default() -> Self {
        Self::new("trans")
    }
}

impl Translator for CommandTranslator {
    fn prepare(&mut self, source: &str, target: &str) -> Result<()> {
        // Readiness here means the binary exists and runs.
        let probe = Command::new(&self.program)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        match probe {
            Ok(status) if status.success() => {
                self.source = source.to_string();
                self.target = target.to_string();
                Ok(())
            }
            Ok(status) => Err(VoxflowError::Translation {
                message: format!("{} probe exited with {}", self.program, status),
            }),
            Err(e) => Err(VoxflowError::Translation {
                message: format!("{} not available: {}", self.program, e),
            }),
        }
    }

    fn translate(&mut self, text: &str) -> Result<String> {
        if self.target.is_empty() {
            return Err(VoxflowError::TranslationNotReady {
                language: self.target.clone(),
            });
        }
        let output = Command::new(&self.program)
            .arg("-b")
            .arg(format!("{}:{}", self.source, self.target))
            .arg(text)
            .output()
            .map_err(|e| VoxflowError::Translation {
                message: format!("failed to run {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            return Err(VoxflowError::Translation {
                message: format!("{} exited with {}", self.program, output.status),
            });
        }

        let translated = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if translated.is_empty() {
            return Err(VoxflowError::Translation {
                message: "translator produced no output".to_string(),
            });
        }
        Ok(translated)
    }
}
