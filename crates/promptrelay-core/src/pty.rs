//! PTY session using portable-pty.
//!
//! The child runs on the slave side of a pseudo-terminal so it behaves as it
//! would for a person at a keyboard (line editing, prompts, colors). Output
//! is pulled off the master by a dedicated reader thread and handed to the
//! async side through a bounded channel. The bound matters: while nobody
//! drains the channel the reader blocks, the kernel buffer fills, and the
//! child's writes stall the same way they would with an unattended terminal.

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info, warn};

use crate::error::{RelayError, RelayResult};

const READ_CHUNK: usize = 4096;
const OUTPUT_QUEUE_CHUNKS: usize = 8;
const EXIT_POLL: Duration = Duration::from_millis(50);
const REAP_AFTER_KILL: Duration = Duration::from_secs(1);

/// What to run and how the terminal should look to it.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Program name, looked up on `PATH` unless it contains a `/`.
    pub command: String,
    pub args: Vec<String>,
    /// Directory the child starts in. Relative `command` paths resolve here.
    pub working_dir: Option<PathBuf>,
    /// Value of `TERM` in the child's environment.
    pub term: String,
    /// Terminal height in rows.
    pub rows: u16,
    /// Terminal width in columns.
    pub cols: u16,
}

impl LaunchOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            term: "xterm-256color".to_string(),
            rows: 24,
            cols: 80,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Result of a non-blocking read.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    /// Nothing buffered right now.
    WouldBlock,
    /// The terminal is closed; no further output will arrive.
    Eof,
}

/// A child process attached to a pseudo-terminal.
pub struct PtySession {
    // Held so the master stays open for the reader thread.
    _master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    output_rx: mpsc::Receiver<Vec<u8>>,
    command: String,
    exit_code: Option<i32>,
}

impl PtySession {
    /// Spawn `opts.command` on a fresh pseudo-terminal.
    ///
    /// Fails with [`RelayError::CommandNotFound`] before anything is opened
    /// when the program cannot be resolved.
    pub fn open(opts: &LaunchOptions) -> RelayResult<Self> {
        let program = resolve_program(&opts.command, opts.working_dir.as_deref())
            .ok_or_else(|| RelayError::CommandNotFound(opts.command.clone()))?;

        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: opts.rows,
                cols: opts.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| RelayError::Pty(format!("failed to open PTY: {e}")))?;

        let mut cmd = CommandBuilder::new(program.as_os_str());
        for arg in &opts.args {
            cmd.arg(arg);
        }
        if let Some(dir) = &opts.working_dir {
            cmd.cwd(dir.as_os_str());
        }
        cmd.env("TERM", &opts.term);

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| RelayError::Spawn {
                command: opts.command.clone(),
                reason: e.to_string(),
            })?;
        // Only the child should hold the slave, otherwise EOF never arrives.
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| RelayError::Pty(format!("failed to clone PTY reader: {e}")))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| RelayError::Pty(format!("failed to take PTY writer: {e}")))?;

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_QUEUE_CHUNKS);
        std::thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || pump_output(reader, output_tx))?;

        info!(
            command = %opts.command,
            pid = child.process_id(),
            rows = opts.rows,
            cols = opts.cols,
            "PTY spawned"
        );

        Ok(Self {
            _master: pair.master,
            writer,
            child,
            output_rx,
            command: opts.command.clone(),
            exit_code: None,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Take whatever output is already buffered without waiting.
    pub fn read_available(&mut self) -> ReadOutcome {
        match self.output_rx.try_recv() {
            Ok(chunk) => ReadOutcome::Data(chunk),
            Err(TryRecvError::Empty) => ReadOutcome::WouldBlock,
            Err(TryRecvError::Disconnected) => ReadOutcome::Eof,
        }
    }

    /// Wait for the next chunk of output. Cancel safe.
    pub async fn next_output(&mut self) -> ReadOutcome {
        match self.output_rx.recv().await {
            Some(chunk) => ReadOutcome::Data(chunk),
            None => ReadOutcome::Eof,
        }
    }

    /// Write raw bytes to the child's terminal and flush.
    pub fn write(&mut self, data: &[u8]) -> RelayResult<()> {
        self.writer.write_all(data)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Write `line` followed by a newline.
    pub fn write_line(&mut self, line: &str) -> RelayResult<()> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.write(&data)
    }

    /// Whether the child is still running. Reaps it if it has exited.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_code.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                let code = status.exit_code() as i32;
                debug!(command = %self.command, code, "child exited");
                self.exit_code = Some(code);
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(command = %self.command, "try_wait failed, treating child as gone: {e}");
                self.exit_code = Some(-1);
                false
            }
        }
    }

    /// Exit code once the child has been reaped.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Ask the child to stop (SIGTERM on unix).
    pub fn terminate(&mut self) {
        self.signal(false);
    }

    /// Force the child to stop (SIGKILL on unix).
    pub fn kill(&mut self) {
        self.signal(true);
    }

    #[cfg(unix)]
    fn signal(&mut self, force: bool) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.process_id() else {
            return;
        };
        let pid = Pid::from_raw(pid as i32);
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        debug!(%pid, ?signal, "signalling child");
        if let Err(e) = kill(pid, signal) {
            debug!(%pid, "signal failed: {e}");
        }
    }

    #[cfg(not(unix))]
    fn signal(&mut self, _force: bool) {
        use portable_pty::ChildKiller;

        if let Err(e) = self.child.kill() {
            debug!(command = %self.command, "kill failed: {e}");
        }
    }

    /// Poll for exit for up to `limit`. Returns the exit code if it exited.
    pub async fn wait_for_exit(&mut self, limit: Duration) -> Option<i32> {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            if !self.is_alive() {
                return self.exit_code;
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(EXIT_POLL).await;
        }
    }

    /// Stop the child: SIGTERM, up to `grace` to exit, then SIGKILL.
    ///
    /// Safe to call on a child that already exited.
    pub async fn shutdown(&mut self, grace: Duration) -> Option<i32> {
        if !self.is_alive() {
            return self.exit_code;
        }

        self.terminate();
        if let Some(code) = self.wait_for_exit(grace).await {
            return Some(code);
        }

        info!(command = %self.command, "grace period expired, killing child");
        self.kill();
        self.wait_for_exit(REAP_AFTER_KILL).await
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        if self.is_alive() {
            self.kill();
            let _ = self.child.try_wait();
        }
    }
}

fn pump_output(mut reader: Box<dyn Read + Send>, tx: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if tx.blocking_send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            // Linux reports EIO once the slave side is gone.
            Err(e) => {
                debug!("PTY reader stopping: {e}");
                break;
            }
        }
    }
    debug!("PTY reader thread exiting");
}

/// Resolve `command` to an executable path, searching `PATH` for bare names.
///
/// Relative paths with a directory component are taken relative to
/// `working_dir` when one is set, since that is where the child starts.
fn resolve_program(command: &str, working_dir: Option<&Path>) -> Option<PathBuf> {
    if command.is_empty() {
        return None;
    }

    let candidate = Path::new(command);
    if candidate.components().count() > 1 {
        let full = match working_dir {
            Some(dir) if candidate.is_relative() => dir.join(candidate),
            _ => candidate.to_path_buf(),
        };
        return is_executable(&full).then_some(full);
    }

    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(OsStr::new(command)))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
