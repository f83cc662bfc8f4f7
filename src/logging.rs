//! Logging setup.
//!
//! Console output goes to stderr from the start. The run log files live in
//! the run's `0_log` folder, which only exists once the run directory has
//! been created, so the file layers write into handles that are attached
//! later and discard records until then.

use crate::error::{FluxRunError, Result};
use crate::models::RunId;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log file that can be opened after the subscriber is installed
#[derive(Debug, Clone, Default)]
pub struct LogFile {
    inner: Arc<Mutex<Option<File>>>,
}

impl LogFile {
    /// Start writing records to `path`, appending if it exists
    pub fn open(&self, path: &Path) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| FluxRunError::io_at(path, e))?;
        *lock(&self.inner) = Some(file);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        lock(&self.inner).is_some()
    }
}

/// A writer that panicked mid-record leaves the file itself usable
fn lock(file: &Mutex<Option<File>>) -> MutexGuard<'_, Option<File>> {
    file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Writer handed out per record
pub struct LogFileWriter<'a> {
    file: &'a Mutex<Option<File>>,
}

impl Write for LogFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match lock(self.file).as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(self.file).as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        LogFileWriter { file: &self.inner }
    }
}

/// The two per-run log files: everything, and warnings only
#[derive(Debug, Clone, Default)]
pub struct RunLogFiles {
    main: LogFile,
    warnings: LogFile,
}

impl RunLogFiles {
    /// Open `{run_id}_main.log` and `{run_id}_warnings.log` in `log_dir`
    pub fn attach(&self, log_dir: &Path, run_id: &RunId) -> Result<()> {
        let (main, warnings) = Self::file_paths(log_dir, run_id);
        self.main.open(&main)?;
        self.warnings.open(&warnings)?;
        debug!("Logging to {}", main.display());
        Ok(())
    }

    pub fn file_paths(log_dir: &Path, run_id: &RunId) -> (PathBuf, PathBuf) {
        (
            log_dir.join(format!("{}_main.log", run_id)),
            log_dir.join(format!("{}_warnings.log", run_id)),
        )
    }

    pub fn is_attached(&self) -> bool {
        self.main.is_open() && self.warnings.is_open()
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level`. Quiet mode limits the console
/// to errors; the log files still receive everything the filter lets
/// through. Returns the file handles to attach once `0_log` exists.
pub fn init(level: &str, quiet: bool) -> RunLogFiles {
    let files = RunLogFiles::default();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fluxrun={}", level)));

    let console_level = if quiet {
        LevelFilter::ERROR
    } else {
        LevelFilter::TRACE
    };

    let console = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_timer(fmt::time::uptime())
        .with_writer(io::stderr)
        .with_filter(console_level);

    let main_file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(files.main.clone());

    let warnings_file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(files.warnings.clone())
        .with_filter(LevelFilter::WARN);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(main_file)
        .with(warnings_file)
        .try_init();

    if installed.is_ok() {
        debug!("Logging initialized at level: {}", level);
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_records_before_attach_are_discarded() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("main.log");
        let log = LogFile::default();

        log.make_writer().write_all(b"dropped\n").unwrap();
        assert!(!log.is_open());

        log.open(&path).unwrap();
        log.make_writer().write_all(b"kept\n").unwrap();
        log.make_writer().flush().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn test_open_after_poisoned_lock() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("main.log");
        let log = LogFile::default();

        let inner = Arc::clone(&log.inner);
        let _ = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("writer panicked");
        })
        .join();
        assert!(log.inner.is_poisoned());

        log.open(&path).unwrap();
        assert!(log.is_open());
        log.make_writer().write_all(b"kept\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "kept\n");
    }

    #[test]
    fn test_attach_creates_both_files() {
        let temp_dir = TempDir::new().unwrap();
        let run_id = RunId::from("FR-20240101-000000");
        let files = RunLogFiles::default();

        files.attach(temp_dir.path(), &run_id).unwrap();

        assert!(files.is_attached());
        assert!(temp_dir.path().join("FR-20240101-000000_main.log").is_file());
        assert!(temp_dir.path().join("FR-20240101-000000_warnings.log").is_file());
    }
}
