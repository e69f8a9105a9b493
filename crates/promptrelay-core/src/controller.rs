//! Session controller.
//!
//! Drives one child from launch to a terminal state. A single `select!`
//! loop waits on whichever comes first: new output, the silence timer for
//! the pending buffer, the overall deadline, or a periodic liveness check.
//! When the child goes quiet on something that looks like a question, the
//! controller hands it to the operator through the [`ReplyBridge`] and feeds
//! the answer back in.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::ansi::strip_ansi;
use crate::bridge::{ReplyBridge, Watermark};
use crate::classifier::{PromptEvent, PromptPolicy};
use crate::output::OutputAccumulator;
use crate::pty::{PtySession, ReadOutcome};
use crate::recording::{SessionEvent, SessionRecorder};
use crate::silence::SilenceTracker;

/// How long to keep collecting output after the child is seen to exit.
const TAIL_DRAIN: Duration = Duration::from_millis(200);

/// Where a session is in its lifecycle.
///
/// `Running` and `AwaitingReply` alternate while the child is alive; the
/// other three are terminal and end up in [`SessionOutcome::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading output and watching for prompts.
    Running,
    /// A prompt went to the operator; reading is paused until they answer.
    AwaitingReply,
    /// The operator did not answer within the reply timeout.
    TimedOut,
    /// The child exited or closed its terminal.
    Completed,
    /// The overall session budget ran out.
    DeadlineExceeded,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::TimedOut | SessionState::Completed | SessionState::DeadlineExceeded
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Running => "running",
            SessionState::AwaitingReply => "awaiting_reply",
            SessionState::TimedOut => "timed_out",
            SessionState::Completed => "completed",
            SessionState::DeadlineExceeded => "deadline_exceeded",
        };
        f.write_str(name)
    }
}

/// Timing budgets for one session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Quiet time before the pending buffer is classified.
    pub silence_threshold: Duration,
    /// How long to wait for the operator per prompt.
    pub reply_timeout: Duration,
    /// Budget for the whole session, reply waits included.
    pub overall_timeout: Duration,
    /// Time between SIGTERM and SIGKILL.
    pub grace_period: Duration,
    pub liveness_interval: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(500),
            reply_timeout: Duration::from_secs(300),
            overall_timeout: Duration::from_secs(300),
            grace_period: Duration::from_secs(5),
            liveness_interval: Duration::from_millis(250),
        }
    }
}

/// What a finished session hands back to its caller.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub state: SessionState,
    /// Everything the child printed, control sequences stripped.
    pub transcript: String,
    /// Highest reply id consumed; pass it to the next session.
    pub watermark: Watermark,
    pub exit_code: Option<i32>,
    pub prompts_answered: usize,
}

/// Drives one [`PtySession`] to a terminal state, relaying prompts through
/// a [`ReplyBridge`] and deciding what counts as a prompt with a
/// [`PromptPolicy`].
///
/// Progress can be followed from another task with
/// [`subscribe`](Self::subscribe).
pub struct SessionController<'a, B, P> {
    pty: PtySession,
    bridge: &'a B,
    policy: P,
    settings: SessionSettings,
    output: OutputAccumulator,
    tracker: SilenceTracker,
    watermark: Watermark,
    state: watch::Sender<SessionState>,
    recorder: Option<SessionRecorder>,
    display_name: String,
    prompts_answered: usize,
}

impl<'a, B, P> SessionController<'a, B, P>
where
    B: ReplyBridge,
    P: PromptPolicy,
{
    pub fn new(
        pty: PtySession,
        bridge: &'a B,
        policy: P,
        settings: SessionSettings,
        watermark: Watermark,
    ) -> Self {
        let display_name = Path::new(pty.command())
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| pty.command().to_string());
        Self {
            pty,
            bridge,
            policy,
            settings,
            output: OutputAccumulator::new(),
            tracker: SilenceTracker::new(std::time::Instant::now()),
            watermark,
            state: watch::Sender::new(SessionState::Running),
            recorder: None,
            display_name,
            prompts_answered: 0,
        }
    }

    pub fn with_recorder(mut self, recorder: SessionRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Name used in operator messages, e.g. `kiro-cli asks:`.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// A receiver that sees every state change, ending with the terminal
    /// state once [`run`](Self::run) has stopped the child.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, state = %next, "session state changed");
        }
    }

    /// Run the session to a terminal state. The child is always stopped and
    /// reaped before this returns.
    pub async fn run(mut self) -> SessionOutcome {
        let deadline = Instant::now() + self.settings.overall_timeout;
        let mut liveness = tokio::time::interval(self.settings.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            command = %self.pty.command(),
            watermark = %self.watermark,
            timeout_secs = self.settings.overall_timeout.as_secs(),
            "session started"
        );

        let terminal = loop {
            let check_at = self
                .tracker
                .check_due(self.settings.silence_threshold, self.output.has_pending())
                .map(Instant::from_std);

            tokio::select! {
                biased;
                _ = sleep_until(deadline) => break SessionState::DeadlineExceeded,
                outcome = self.pty.next_output() => match outcome {
                    ReadOutcome::Data(chunk) => {
                        self.absorb(&chunk).await;
                        if self.drain_ready().await {
                            break SessionState::Completed;
                        }
                    }
                    ReadOutcome::Eof => break SessionState::Completed,
                    ReadOutcome::WouldBlock => {}
                },
                _ = sleep_until_opt(check_at) => {}
                _ = liveness.tick() => {
                    if !self.pty.is_alive() {
                        self.drain_tail().await;
                        break SessionState::Completed;
                    }
                }
            }

            if let Some(event) = self.detect_prompt() {
                if let Some(terminal) = self.handle_prompt(event, deadline).await {
                    break terminal;
                }
            }
        };

        self.finish(terminal).await
    }

    fn detect_prompt(&mut self) -> Option<PromptEvent> {
        let now = std::time::Instant::now();
        let has_pending = self.output.has_pending();
        if !self
            .tracker
            .should_check(now, self.settings.silence_threshold, has_pending)
        {
            return None;
        }
        let pending = self.output.normalized_pending();
        let event = self.policy.detect(&pending, self.tracker.idle_for(now));
        if event.is_none() {
            debug!(bytes = pending.len(), "quiet output does not look like a prompt");
        }
        event
    }

    /// Returns a terminal state if the session must end.
    async fn handle_prompt(
        &mut self,
        event: PromptEvent,
        deadline: Instant,
    ) -> Option<SessionState> {
        self.transition(SessionState::AwaitingReply);
        info!(
            silence_ms = event.silence.as_millis() as u64,
            watermark = %self.watermark,
            "prompt detected, waiting for operator"
        );
        self.record(SessionEvent::Prompt {
            text: event.text.clone(),
        })
        .await;

        let message = format!("{} asks:\n\n{}", self.display_name, event.text);
        if !self.notify_before(deadline, &message).await {
            return Some(SessionState::DeadlineExceeded);
        }

        let reply = tokio::select! {
            biased;
            _ = sleep_until(deadline) => return Some(SessionState::DeadlineExceeded),
            reply = self.bridge.await_reply(self.watermark, self.settings.reply_timeout) => reply,
        };

        let Some(reply) = reply else {
            warn!(
                reply_timeout_secs = self.settings.reply_timeout.as_secs(),
                "no operator reply, ending session"
            );
            let notice = format!(
                "No reply received within {}s, terminating {} session.",
                self.settings.reply_timeout.as_secs(),
                self.display_name
            );
            self.notify_before(deadline, &notice).await;
            return Some(SessionState::TimedOut);
        };

        self.watermark = reply.watermark();
        info!(id = reply.id, "operator replied");
        self.record(SessionEvent::Reply {
            text: reply.text.clone(),
            id: reply.id,
        })
        .await;

        if let Err(e) = self.pty.write_line(&reply.text) {
            warn!("failed to write reply to child: {e}");
            return Some(SessionState::Completed);
        }

        self.output.clear_pending();
        self.tracker.note_activity(std::time::Instant::now());
        self.prompts_answered += 1;
        self.transition(SessionState::Running);
        None
    }

    /// Send `message` unless the deadline passes first. Returns false if
    /// the deadline won.
    async fn notify_before(&self, deadline: Instant, message: &str) -> bool {
        tokio::select! {
            biased;
            _ = sleep_until(deadline) => {
                warn!("overall deadline reached while notifying the operator");
                false
            }
            _ = self.bridge.notify(message) => true,
        }
    }

    async fn absorb(&mut self, chunk: &[u8]) {
        self.output.append(chunk);
        self.tracker.note_activity(std::time::Instant::now());
        if self.recorder.is_some() {
            self.record(SessionEvent::Output {
                text: strip_ansi(chunk),
            })
            .await;
        }
    }

    /// Take everything already queued. Returns true on end of stream.
    async fn drain_ready(&mut self) -> bool {
        loop {
            match self.pty.read_available() {
                ReadOutcome::Data(chunk) => self.absorb(&chunk).await,
                ReadOutcome::WouldBlock => return false,
                ReadOutcome::Eof => return true,
            }
        }
    }

    /// The child is gone; collect whatever it flushed on the way out.
    async fn drain_tail(&mut self) {
        let collect = async {
            while let ReadOutcome::Data(chunk) = self.pty.next_output().await {
                self.absorb(&chunk).await;
            }
        };
        let _ = tokio::time::timeout(TAIL_DRAIN, collect).await;
    }

    async fn finish(mut self, terminal: SessionState) -> SessionOutcome {
        let grace = self.settings.grace_period;
        if terminal == SessionState::Completed {
            self.pty.wait_for_exit(grace).await;
        }
        let exit_code = self.pty.shutdown(grace).await;

        self.record(SessionEvent::End {
            state: terminal.to_string(),
            exit_code,
        })
        .await;
        self.transition(terminal);
        info!(
            state = %terminal,
            exit_code,
            prompts = self.prompts_answered,
            bytes = self.output.bytes_received(),
            "session finished"
        );

        SessionOutcome {
            state: terminal,
            transcript: self.output.transcript(),
            watermark: self.watermark,
            exit_code,
            prompts_answered: self.prompts_answered,
        }
    }

    async fn record(&self, event: SessionEvent) {
        if let Some(recorder) = &self.recorder {
            recorder.record(event).await;
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::bridge::MemoryBridge;
    use crate::classifier::HeuristicPolicy;
    use crate::pty::LaunchOptions;

    fn settings(reply: u64, overall: u64) -> SessionSettings {
        SessionSettings {
            silence_threshold: Duration::from_millis(200),
            reply_timeout: Duration::from_secs(reply),
            overall_timeout: Duration::from_secs(overall),
            grace_period: Duration::from_secs(1),
            liveness_interval: Duration::from_millis(100),
        }
    }

    fn script(body: &str) -> PtySession {
        PtySession::open(&LaunchOptions::new("sh").args(["-c", body])).expect("spawn sh")
    }

    fn in_order(haystack: &str, needles: &[&str]) -> bool {
        let mut from = 0;
        for needle in needles {
            match haystack[from..].find(needle) {
                Some(at) => from += at + needle.len(),
                None => return false,
            }
        }
        true
    }

    #[tokio::test]
    async fn child_that_never_pauses() {
        let bridge = MemoryBridge::new();
        let pty = script("printf 'alpha\\nbeta\\n'");
        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(5, 20), Watermark(3))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.transcript, "alpha\nbeta\n");
        assert_eq!(outcome.watermark, Watermark(3));
        assert_eq!(outcome.exit_code, Some(0));
        assert!(bridge.notifications().is_empty());
    }

    #[tokio::test]
    async fn prompt_answered_end_to_end() {
        let bridge = MemoryBridge::with_replies([(7, "y")]);
        let pty = script(
            "printf 'Step 1 done.\\n'; printf 'Delete old files? (y/n) '; read ans; \
             printf 'Deleting...\\ndone.\\n'",
        );
        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(5, 20), Watermark(0))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.watermark, Watermark(7));
        assert_eq!(outcome.prompts_answered, 1);
        assert!(
            in_order(
                &outcome.transcript,
                &["Step 1 done.\n", "Delete old files? (y/n) ", "Deleting...\ndone.\n"]
            ),
            "transcript: {:?}",
            outcome.transcript
        );
        assert_eq!(
            bridge.notifications(),
            vec!["sh asks:\n\nStep 1 done.\nDelete old files? (y/n)"]
        );
    }

    #[tokio::test]
    async fn answers_successive_prompts_in_order() {
        let bridge = MemoryBridge::with_replies([(11, "left"), (12, "right")]);
        let pty = script("printf 'First? '; read a; printf 'Second? '; read b; echo \"[$a-$b]\"");
        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(5, 20), Watermark(10))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.prompts_answered, 2);
        assert_eq!(outcome.watermark, Watermark(12));
        assert!(outcome.transcript.contains("[left-right]"), "{:?}", outcome.transcript);
    }

    #[tokio::test]
    async fn reply_timeout_ends_session() {
        let bridge = MemoryBridge::new();
        let pty = script("printf 'Proceed? '; exec sleep 30");
        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(1, 20), Watermark(0))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::TimedOut);
        assert!(outcome.transcript.contains("Proceed? "));
        assert!(outcome.exit_code.is_some(), "child should have been reaped");
        assert_eq!(outcome.watermark, Watermark(0));

        let sent = bridge.notifications();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], "sh asks:\n\nProceed?");
        assert!(sent[1].starts_with("No reply received within 1s"));
    }

    #[tokio::test]
    async fn overall_deadline_while_running() {
        let bridge = MemoryBridge::new();
        let pty = script("echo working; exec sleep 30");
        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(5, 1), Watermark(0))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::DeadlineExceeded);
        assert!(outcome.transcript.contains("working"));
        assert!(outcome.exit_code.is_some());
    }

    #[tokio::test]
    async fn overall_deadline_bounds_reply_wait() {
        let bridge = MemoryBridge::new();
        let pty = script("printf 'Continue? '; exec sleep 30");
        let started = std::time::Instant::now();
        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(60, 1), Watermark(0))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(bridge.notifications().len(), 1);
    }

    #[tokio::test]
    async fn custom_policy_can_decline() {
        let bridge = MemoryBridge::with_replies([(1, "ignored")]);
        let pty = script("printf 'Continue? '; sleep 1");
        let never = |_: &str, _: Duration| -> Option<PromptEvent> { None };
        let outcome = SessionController::new(pty, &bridge, never, settings(5, 20), Watermark(0))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::Completed);
        assert_eq!(outcome.watermark, Watermark(0));
        assert!(bridge.notifications().is_empty());
    }

    #[tokio::test]
    async fn records_session_events() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = SessionRecorder::new(dir.path().join("run.jsonl"));
        let path = recorder.path().to_path_buf();
        let bridge = MemoryBridge::with_replies([(2, "ok")]);
        let pty = script("printf 'Name: '; read n; echo \"hi $n\"");

        let outcome = SessionController::new(pty, &bridge, HeuristicPolicy, settings(5, 20), Watermark(0))
            .with_recorder(recorder)
            .run()
            .await;
        assert_eq!(outcome.state, SessionState::Completed);

        let events: Vec<_> = crate::recording::load_recording(&path)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event)
            .collect();
        assert!(events.contains(&SessionEvent::Reply {
            text: "ok".into(),
            id: 2
        }));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::End { state, .. }) if state == "completed"
        ));
    }

    /// Accepts notifications but takes far longer than any session budget
    /// to deliver them.
    struct StalledBridge;

    impl ReplyBridge for StalledBridge {
        async fn notify(&self, _message: &str) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        async fn await_reply(&self, _after: Watermark, _timeout: Duration) -> Option<crate::Reply> {
            None
        }
    }

    #[tokio::test]
    async fn overall_deadline_bounds_slow_notification() {
        let pty = script("printf 'Continue? '; exec sleep 30");
        let started = std::time::Instant::now();
        let outcome = SessionController::new(pty, &StalledBridge, HeuristicPolicy, settings(60, 1), Watermark(0))
            .run()
            .await;

        assert_eq!(outcome.state, SessionState::DeadlineExceeded);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(outcome.exit_code.is_some());
    }

    #[tokio::test]
    async fn subscribers_see_each_transition() {
        let bridge = MemoryBridge::new();
        let pty = script("printf 'Proceed? '; exec sleep 30");
        let controller =
            SessionController::new(pty, &bridge, HeuristicPolicy, settings(1, 20), Watermark(0));
        let mut states = controller.subscribe();
        assert_eq!(*states.borrow(), SessionState::Running);

        let watcher = async {
            let mut seen = Vec::new();
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                seen.push(state);
                if state.is_terminal() {
                    break;
                }
            }
            seen
        };
        let (outcome, seen) = tokio::join!(controller.run(), watcher);

        assert_eq!(outcome.state, SessionState::TimedOut);
        assert_eq!(seen, vec![SessionState::AwaitingReply, SessionState::TimedOut]);
    }

    #[test]
    fn terminal_states() {
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::AwaitingReply.is_terminal());
        assert!(SessionState::TimedOut.is_terminal());
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::DeadlineExceeded.is_terminal());
    }
}
