//! Readiness detection over a container's live output.
//!
//! The detector consumes the log stream incrementally, reassembles complete
//! lines per output source, and evaluates the rule on each line. It never
//! polls: the task sleeps until the engine delivers output or the timeout
//! fires.

use std::time::Duration;

use bollard::container::LogOutput;
use bollard::errors::Error as BollardError;
use futures_util::{Stream, StreamExt};
use regex::Regex;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ConfigError, EphemeraError, HarnessError};

/// Output source a readiness rule listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogSource {
    /// Standard output only.
    Stdout,
    /// Standard error only.
    Stderr,
    /// Either stream.
    #[default]
    Any,
}

impl LogSource {
    const fn accepts(self, channel: Channel) -> bool {
        matches!(
            (self, channel),
            (Self::Any, _) | (Self::Stdout, Channel::Stdout) | (Self::Stderr, Channel::Stderr)
        )
    }
}

/// How a single output line is matched.
#[derive(Debug, Clone)]
pub enum LogPattern {
    /// The line contains this substring.
    Contains(String),
    /// The line matches this regular expression.
    Matches(Regex),
}

impl LogPattern {
    fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Contains(needle) => line.contains(needle.as_str()),
            Self::Matches(regex) => regex.is_match(line),
        }
    }
}

/// Predicate over a container's output that signals the service is ready.
#[derive(Debug, Clone)]
pub struct ReadinessRule {
    pattern: LogPattern,
    occurrences: usize,
    source: LogSource,
}

impl ReadinessRule {
    /// Ready once a line containing `needle` is emitted.
    #[must_use]
    pub fn log_contains(needle: impl Into<String>) -> Self {
        Self {
            pattern: LogPattern::Contains(needle.into()),
            occurrences: 1,
            source: LogSource::Any,
        }
    }

    /// Ready once a line matching the regular expression `pattern` is emitted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `pattern` does not compile.
    pub fn log_matches(pattern: &str) -> Result<Self, EphemeraError> {
        let regex = Regex::new(pattern).map_err(|error| ConfigError::InvalidValue {
            field: String::from("readiness pattern"),
            reason: error.to_string(),
        })?;
        Ok(Self {
            pattern: LogPattern::Matches(regex),
            occurrences: 1,
            source: LogSource::Any,
        })
    }

    /// Require `count` matching lines; values below one are raised to one.
    #[must_use]
    pub fn with_occurrences(mut self, count: usize) -> Self {
        self.occurrences = count.max(1);
        self
    }

    /// Restrict matching to one output source.
    #[must_use]
    pub const fn from_source(mut self, source: LogSource) -> Self {
        self.source = source;
        self
    }

    /// The line pattern.
    #[must_use]
    pub const fn pattern(&self) -> &LogPattern {
        &self.pattern
    }

    /// Number of matching lines required.
    #[must_use]
    pub const fn occurrences(&self) -> usize {
        self.occurrences
    }

    /// Output source the rule listens to.
    #[must_use]
    pub const fn source(&self) -> LogSource {
        self.source
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Stdout,
    Stderr,
}

enum ScanOutcome {
    Ready,
    Exited,
    Failed(String),
}

/// Incremental line matcher. Kept outside the timed future so the last
/// observed line survives a timeout.
struct LogScanner<'rule> {
    rule: &'rule ReadinessRule,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    matched: usize,
    last_line: Option<String>,
}

impl<'rule> LogScanner<'rule> {
    const fn new(rule: &'rule ReadinessRule) -> Self {
        Self {
            rule,
            stdout: Vec::new(),
            stderr: Vec::new(),
            matched: 0,
            last_line: None,
        }
    }

    async fn consume<S>(&mut self, stream: &mut S) -> ScanOutcome
    where
        S: Stream<Item = Result<LogOutput, BollardError>> + Unpin,
    {
        while let Some(item) = stream.next().await {
            let (channel, bytes) = match item {
                Ok(LogOutput::StdOut { message } | LogOutput::Console { message }) => {
                    (Channel::Stdout, message)
                }
                Ok(LogOutput::StdErr { message }) => (Channel::Stderr, message),
                Ok(LogOutput::StdIn { .. }) => continue,
                Err(error) => return ScanOutcome::Failed(error.to_string()),
            };
            if self.push(channel, &bytes) {
                return ScanOutcome::Ready;
            }
        }

        if self.flush() {
            ScanOutcome::Ready
        } else {
            ScanOutcome::Exited
        }
    }

    /// Append a chunk and evaluate every line it completes.
    fn push(&mut self, channel: Channel, chunk: &[u8]) -> bool {
        let buffer = match channel {
            Channel::Stdout => &mut self.stdout,
            Channel::Stderr => &mut self.stderr,
        };
        buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            lines.push(line);
        }

        lines
            .iter()
            .any(|line| self.observe(channel, line))
    }

    /// Evaluate whatever partial lines remain once the stream has ended.
    fn flush(&mut self) -> bool {
        let stdout = std::mem::take(&mut self.stdout);
        let stderr = std::mem::take(&mut self.stderr);
        [(Channel::Stdout, stdout), (Channel::Stderr, stderr)]
            .iter()
            .filter(|(_, rest)| !rest.is_empty())
            .any(|(channel, rest)| self.observe(*channel, rest))
    }

    fn observe(&mut self, channel: Channel, raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let line = text.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return false;
        }
        debug!(?channel, line, "container output");
        self.last_line = Some(String::from(line));

        if self.rule.source.accepts(channel) && self.rule.pattern.is_match(line) {
            self.matched += 1;
        }
        self.matched >= self.rule.occurrences
    }
}

/// Wait until `stream` satisfies `rule`, bounded by `timeout`.
///
/// # Errors
///
/// - `HarnessError::ReadinessTimeout` when the rule is not satisfied in time,
///   carrying the elapsed time and the last line observed.
/// - `HarnessError::ExitedBeforeReady` when the stream ends first.
/// - `HarnessError::LogStreamFailed` when the engine reports a stream error.
pub async fn await_ready<S>(
    mut stream: S,
    rule: &ReadinessRule,
    timeout: Duration,
    container_id: &str,
) -> Result<(), HarnessError>
where
    S: Stream<Item = Result<LogOutput, BollardError>> + Unpin,
{
    let started = Instant::now();
    let mut scanner = LogScanner::new(rule);
    let outcome = tokio::time::timeout(timeout, scanner.consume(&mut stream)).await;

    match outcome {
        Ok(ScanOutcome::Ready) => {
            debug!(container_id, elapsed = ?started.elapsed(), "readiness rule satisfied");
            Ok(())
        }
        Ok(ScanOutcome::Exited) => Err(HarnessError::ExitedBeforeReady {
            container_id: String::from(container_id),
            last_output: scanner.last_line,
        }),
        Ok(ScanOutcome::Failed(message)) => Err(HarnessError::LogStreamFailed {
            container_id: String::from(container_id),
            message,
        }),
        Err(_) => Err(HarnessError::ReadinessTimeout {
            elapsed: started.elapsed(),
            last_output: scanner.last_line,
        }),
    }
}
