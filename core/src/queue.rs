//! Append-only log of deferred calls and its batch replay.
//!
//! # Design
//! In delayed mode write calls are appended to a flat file, one call per line
//! as `url|||METHOD|||body`, instead of being sent. A replay renames the live
//! log to a uniquely named working file first, so calls enqueued while the
//! replay runs start a fresh log, then sends every line in file order.
//!
//! The separator is not escaped. A URL containing it corrupts its line. The
//! body is the last field and keeps any separator text it contains, where a
//! split on every separator would have truncated it to the text before the
//! next `|||`.
//!
//! Lines that are not valid UTF-8 (a write cut inside a multi-byte character)
//! are skipped like any other malformed line.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::client::IntercomClient;
use crate::error::QueueError;
use crate::http::{HttpMethod, HttpRequest, Transport};

/// Field separator inside one log line.
pub const SEPARATOR: &str = "|||";

/// Log location used when none is configured.
pub const DEFAULT_LOG_PATH: &str = "/tmp/intercom_delayed_commands";

const PROGRESS_INTERVAL: usize = 100;

/// The part of an outbound call that survives in the log. Headers are not
/// stored; the client re-attaches them on replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredCall {
    pub url: String,
    pub method: HttpMethod,
    pub body: Option<String>,
}

impl DeferredCall {
    /// One log line, without the trailing newline.
    pub fn encode(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.url,
            self.method,
            self.body.as_deref().unwrap_or_default()
        )
    }

    /// Decode one log line. Returns `None` for lines with fewer than three
    /// fields, an empty URL, or an unknown method.
    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(3, SEPARATOR);
        let url = fields.next()?;
        let method = fields.next()?.parse().ok()?;
        let body = fields.next()?;
        if url.is_empty() {
            return None;
        }
        Some(Self {
            url: url.to_string(),
            method,
            body: (!body.is_empty()).then(|| body.to_string()),
        })
    }
}

impl From<&HttpRequest> for DeferredCall {
    fn from(request: &HttpRequest) -> Self {
        Self {
            url: request.path.clone(),
            method: request.method,
            body: request.body.clone(),
        }
    }
}

/// Outcome of one replay run.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Calls dispatched to the transport.
    pub handled: usize,
    /// Non-blank lines that did not decode.
    pub skipped: usize,
    /// Dispatched calls that got a transport error or a non-2xx status.
    pub failed: usize,
    /// Set when the loop stopped early; the working file is left behind.
    pub aborted: Option<QueueError>,
}

impl ReplayReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }
}

/// File-backed FIFO of deferred calls.
#[derive(Debug, Clone)]
pub struct DeferredQueue {
    path: PathBuf,
}

impl DeferredQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one call. The line is written with a single `write_all`, so a
    /// crash can at worst leave a truncated final line.
    pub fn enqueue(&self, call: &DeferredCall) -> Result<(), QueueError> {
        let write_failed = |source| QueueError::WriteFailed {
            path: self.path.clone(),
            source,
        };
        let mut line = call.encode();
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_failed)?;
        file.write_all(line.as_bytes()).map_err(write_failed)?;
        debug!(url = %call.url, method = %call.method, "call deferred");
        Ok(())
    }

    /// Decode the live log without draining it. A missing log is empty.
    pub fn pending(&self) -> Result<Vec<DeferredCall>, QueueError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(QueueError::ReadFailed {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        Ok(contents
            .split(|byte| *byte == b'\n')
            .filter_map(|line| std::str::from_utf8(line).ok())
            .filter_map(DeferredCall::decode)
            .collect())
    }

    /// Move the live log aside and send every call in it, in order.
    ///
    /// A missing log, or a rename that fails, means there is nothing to
    /// replay. Malformed lines are counted and skipped; failed calls are
    /// counted and never retried. The working file is deleted once fully
    /// consumed and kept if the loop aborts.
    pub fn drain_and_replay<T>(&self, client: &IntercomClient, transport: &T) -> ReplayReport
    where
        T: Transport + ?Sized,
    {
        let working = self.working_path();
        if let Err(err) = fs::rename(&self.path, &working) {
            debug!(path = %self.path.display(), error = %err, "no deferred log to replay");
            return ReplayReport::default();
        }

        let mut report = ReplayReport::default();
        if let Err(source) = replay_file(&working, client, transport, &mut report) {
            warn!(
                path = %working.display(),
                handled = report.handled,
                error = %source,
                "deferred replay aborted"
            );
            report.aborted = Some(QueueError::ReplayAborted {
                path: working,
                handled: report.handled,
                source,
            });
            return report;
        }

        if let Err(err) = fs::remove_file(&working) {
            warn!(path = %working.display(), error = %err, "failed to remove replay working file");
        }
        info!(
            handled = report.handled,
            skipped = report.skipped,
            failed = report.failed,
            "deferred replay finished"
        );
        report
    }

    fn working_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "deferred".to_string());
        self.path.with_file_name(format!("{name}.{}.replay", Uuid::new_v4()))
    }
}

fn replay_file<T>(
    working: &Path,
    client: &IntercomClient,
    transport: &T,
    report: &mut ReplayReport,
) -> io::Result<()>
where
    T: Transport + ?Sized,
{
    let mut reader = BufReader::new(File::open(working)?);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        // A crash mid-append can cut a multi-byte character.
        let Ok(line) = std::str::from_utf8(&buf) else {
            report.skipped += 1;
            warn!(skipped = report.skipped, "skipping non-UTF-8 deferred line");
            continue;
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(call) = DeferredCall::decode(line) else {
            report.skipped += 1;
            warn!(skipped = report.skipped, "skipping malformed deferred line");
            continue;
        };

        debug!(url = %call.url, method = %call.method, "sending deferred call");
        match transport.execute(&client.build_replay(&call)) {
            Ok(response) if response.is_success() => {}
            Ok(response) => {
                report.failed += 1;
                warn!(url = %call.url, status = response.status, "deferred call rejected");
            }
            Err(err) => {
                report.failed += 1;
                warn!(url = %call.url, error = %err, "deferred call failed");
            }
        }

        report.handled += 1;
        if report.handled % PROGRESS_INTERVAL == 0 {
            info!(handled = report.handled, "deferred replay progress");
        }
    }
    Ok(())
}
