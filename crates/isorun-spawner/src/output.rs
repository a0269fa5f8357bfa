//! Output artifact collection.
//!
//! A task persists its artifacts in an externally-resolved results
//! directory; a one-line pointer file names the actual source directory.
//! [`OutputCollector`] turns that layout into a lazy stream of
//! (filename, bytes) pairs, memory-mapping each file through
//! [`ByteSource`].

use std::fs::{self, File};
use std::io;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use tracing::debug;

use isorun_core::{expand_user, string_to_safe_path, JobId, JobResultsResolver, SpawnerError, TaskId};

/// Size of the slices yielded by [`ByteSource::chunks`].
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Directory component under the job results dir holding per-task entries.
const TASK_RESULTS_DIR: &str = "task-results";

/// Name of the per-task pointer file.
const DATA_POINTER: &str = "data";

/// A local file's contents, memory-mapped read-only.
///
/// The mapping is released when the value is dropped, whether the caller
/// consumed every chunk or stopped early.
#[derive(Debug)]
pub struct ByteSource {
    map: Mmap,
}

impl ByteSource {
    /// Map a non-empty regular file. Mapping an empty file is refused
    /// (`InvalidInput`) since there are no bytes to expose.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot map an empty file",
            ));
        }
        // Safety: the map is read-only and the file is an output artifact
        // that no longer has a writer once collection starts.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self { map })
    }

    /// Total number of mapped bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Always false: empty files are refused at open time.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The full contents as one borrowed slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    /// Lazy sequence of zero-copy [`CHUNK_SIZE`] slices.
    pub fn chunks(&self) -> impl Iterator<Item = &[u8]> {
        self.map.chunks(CHUNK_SIZE)
    }
}

impl Deref for ByteSource {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl AsRef<[u8]> for ByteSource {
    fn as_ref(&self) -> &[u8] {
        &self.map
    }
}

/// Locates and streams the output files a task produced.
#[derive(Clone)]
pub struct OutputCollector {
    resolver: Arc<dyn JobResultsResolver>,
}

impl OutputCollector {
    /// Create a collector over the given results-directory resolver.
    pub fn new(resolver: Arc<dyn JobResultsResolver>) -> Self {
        Self { resolver }
    }

    /// Stream the (filename, bytes) pairs a task produced.
    ///
    /// Resolves the job's results directory, reads the task's pointer file
    /// (one line, trailing whitespace stripped, `~` expanded), and
    /// enumerates the pointed-to directory lazily. A missing source
    /// directory is the one translated error ([`SpawnerError::TaskNotFound`],
    /// with no partial entries); every other filesystem error propagates
    /// unmodified.
    pub fn stream(&self, job_id: &JobId, task_id: &TaskId) -> Result<OutputFiles, SpawnerError> {
        let results_dir = self.resolver.get_results_dir(job_id);
        let safe_id = string_to_safe_path(task_id.as_str());
        let pointer = results_dir
            .join(TASK_RESULTS_DIR)
            .join(&safe_id)
            .join(DATA_POINTER);

        let text = fs::read_to_string(&pointer)?;
        let src = expand_user(text.lines().next().unwrap_or("").trim_end());
        debug!(task_id = %task_id, source = %src.display(), "streaming task output");

        let entries = match fs::read_dir(&src) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(SpawnerError::TaskNotFound(format!(
                    "{}: {}",
                    task_id,
                    src.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        Ok(OutputFiles { entries })
    }
}

/// Lazy, finite, non-restartable stream of a task's output files.
///
/// Yields (filename, [`ByteSource`]) pairs for regular, non-empty files in
/// filesystem enumeration order. Each file is mapped only when its entry is
/// reached.
#[derive(Debug)]
pub struct OutputFiles {
    entries: fs::ReadDir,
}

impl Iterator for OutputFiles {
    type Item = io::Result<(String, ByteSource)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e)),
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => return Some(Err(e)),
            };
            if !meta.is_file() || meta.len() == 0 {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            return Some(ByteSource::open(&entry.path()).map(|source| (name, source)));
        }
    }
}
