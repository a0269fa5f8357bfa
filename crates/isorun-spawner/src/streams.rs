//! Scoped temporary files for capturing a sub-process's standard streams.

use std::fs;
use std::io;
use std::path::Path;
use std::process::Stdio;

use tempfile::NamedTempFile;

/// A uniquely-named temporary file a subprocess writes a standard stream
/// into, removed unconditionally when the value is dropped — on success,
/// error, and panic paths alike.
pub struct TemporaryStreamCapture {
    file: NamedTempFile,
}

impl TemporaryStreamCapture {
    /// Create a fresh capture file.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            file: NamedTempFile::new()?,
        })
    }

    /// Path of the capture file while it exists.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// An [`Stdio`] handle for a subprocess to write into. Each call opens
    /// an independent descriptor onto the same file.
    pub fn writer(&self) -> io::Result<Stdio> {
        Ok(Stdio::from(self.file.reopen()?))
    }

    /// Re-read the whole captured stream as text, after the writer has
    /// finished.
    pub fn read(&self) -> io::Result<String> {
        fs::read_to_string(self.file.path())
    }
}
