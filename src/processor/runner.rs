//! External process runner
//!
//! Launches an EddyPro executable, relays its console output line by line
//! into the log while it runs, and reports the exit status once it ends.

use crate::constants::NEW_PERIOD_MARKER;
use crate::error::{FluxRunError, Result};
use futures::stream::{self, Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{error, info, warn};

/// How a single output line is logged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Logged as-is with the program name
    Output,
    /// Logged as a separator rule
    Separator,
    /// Not logged
    Ignored,
}

/// Decides how output lines are presented
pub trait LineClassifier: Send + Sync {
    fn classify(&self, line: &str) -> LineKind;
}

/// EddyPro console output: one rule per averaging period, blank lines dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct EddyProClassifier;

impl LineClassifier for EddyProClassifier {
    fn classify(&self, line: &str) -> LineKind {
        if line.contains(NEW_PERIOD_MARKER) {
            LineKind::Separator
        } else if line.trim().is_empty() {
            LineKind::Ignored
        } else {
            LineKind::Output
        }
    }
}

/// Lazily read lines from a child's output
///
/// Bytes are decoded as lossy UTF-8 and trailing `\r\n` or `\n` removed. The
/// stream ends at end of input or after the first read error.
pub fn line_stream<R>(reader: R) -> impl Stream<Item = io::Result<String>>
where
    R: AsyncRead + Unpin,
{
    stream::unfold(Some(BufReader::new(reader)), |state| async move {
        let mut reader = state?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                while matches!(buf.last(), Some(b'\n' | b'\r')) {
                    buf.pop();
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                Some((Ok(line), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Lifecycle of one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Succeeded,
    Failed { exit_code: Option<i32> },
}

/// What the finished process left behind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub lines: usize,
    pub separators: usize,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs one executable to completion; no retries
pub struct ProcessRunner {
    program: PathBuf,
    working_dir: PathBuf,
    label: String,
    classifier: Box<dyn LineClassifier>,
    state: RunState,
}

impl ProcessRunner {
    /// A relative `program` is resolved before the child changes into
    /// `working_dir`
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let program = std::path::absolute(&program).unwrap_or(program);
        let label = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        Self {
            program,
            working_dir: working_dir.into(),
            label,
            classifier: Box::new(EddyProClassifier),
            state: RunState::NotStarted,
        }
    }

    pub fn with_classifier(mut self, classifier: impl LineClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Launch the program and follow it until it exits
    ///
    /// A program that cannot be started is an error; a non-zero exit code
    /// is not.
    pub async fn run(&mut self) -> Result<ProcessOutcome> {
        info!("Starting {} in {}", self.label, self.working_dir.display());

        let mut child = Command::new(&self.program)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| FluxRunError::ProcessLaunch {
                program: self.program.display().to_string(),
                source,
            })?;
        self.state = RunState::Running;

        let mut lines = 0;
        let mut separators = 0;

        if let Some(stdout) = child.stdout.take() {
            let mut output = pin!(line_stream(stdout));
            while let Some(line) = output.next().await {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Could not read output of {}: {}", self.label, e);
                        break;
                    }
                };
                lines += 1;
                match self.classifier.classify(&line) {
                    LineKind::Output => info!("[EDDYPRO LOG] [{}] {}", self.label, line),
                    LineKind::Separator => {
                        separators += 1;
                        info!("{}", "-".repeat(60));
                    }
                    LineKind::Ignored => {}
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| FluxRunError::io_at(&self.program, e))?;
        let exit_code = status.code();

        info!("{}", "*".repeat(30));
        match exit_code {
            Some(code) => info!("[EDDYPRO LOG] {} return code: {}", self.label, code),
            None => info!("[EDDYPRO LOG] {} was terminated by a signal", self.label),
        }
        if exit_code == Some(0) {
            self.state = RunState::Succeeded;
            info!("[EDDYPRO LOG] {} finished successfully.", self.label);
        } else {
            self.state = RunState::Failed { exit_code };
            error!("[EDDYPRO LOG] (!)ERROR {} encountered a problem.", self.label);
        }
        info!("{}", "*".repeat(30));

        Ok(ProcessOutcome {
            exit_code,
            lines,
            separators,
        })
    }
}
