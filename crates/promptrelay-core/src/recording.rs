//! Session recording.
//!
//! Appends one JSON object per line for each notable session event so a
//! relayed run can be audited afterwards: what was launched, what it
//! printed, which prompts went out and which answers came back.

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Start { command: String, args: Vec<String> },
    /// Output chunk, control sequences stripped.
    Output { text: String },
    Prompt { text: String },
    Reply { text: String, id: i64 },
    End { state: String, exit_code: Option<i32> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Milliseconds since the recorder was created.
    pub elapsed_ms: u64,
    #[serde(flatten)]
    pub event: SessionEvent,
}

/// Appends [`RecordedEvent`]s to one NDJSON file per session.
///
/// Write failures are logged and dropped; a broken recording never ends the
/// session.
pub struct SessionRecorder {
    path: PathBuf,
    started: Instant,
}

impl SessionRecorder {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            started: Instant::now(),
        }
    }

    /// A recorder writing `session-<unix secs>.jsonl` under `dir`, creating
    /// the directory if needed.
    pub async fn in_dir(dir: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Ok(Self::new(dir.join(format!("session-{stamp}.jsonl"))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an event. Failures are logged and otherwise ignored.
    pub async fn record(&self, event: SessionEvent) {
        let entry = RecordedEvent {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            event,
        };

        let mut line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to serialize session event");
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append_line(&line).await {
            warn!(path = %self.path.display(), error = %e, "failed to write session recording");
        }
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Read a recording back, skipping lines that do not parse.
pub async fn load_recording(path: &Path) -> std::io::Result<Vec<RecordedEvent>> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut entries = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<RecordedEvent>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => debug!(error = %e, "skipping malformed recording line"),
        }
    }
    Ok(entries)
}
