//! One-call entry point used by the outer conversation loop.

use tracing::warn;

use crate::bridge::{ReplyBridge, Watermark};
use crate::classifier::HeuristicPolicy;
use crate::config::SessionConfig;
use crate::controller::{SessionController, SessionOutcome};
use crate::error::RelayResult;
use crate::pty::PtySession;
use crate::recording::{SessionEvent, SessionRecorder};

/// Run `prompt` through the configured interactive program, relaying any
/// questions it asks through `bridge`.
///
/// `last_consumed` is the highest reply id the caller has already seen; the
/// returned outcome carries the updated value. Only launch failures are
/// errors: every other ending (completion, reply timeout, deadline) comes
/// back as a [`SessionOutcome`] with the transcript so far.
pub async fn run_interactive<B: ReplyBridge>(
    prompt: &str,
    bridge: &B,
    last_consumed: Watermark,
    extra_args: &[String],
    config: &SessionConfig,
) -> RelayResult<SessionOutcome> {
    let opts = config.launch_options(prompt, extra_args);
    let pty = PtySession::open(&opts)?;

    let mut controller = SessionController::new(
        pty,
        bridge,
        HeuristicPolicy,
        config.settings(),
        last_consumed,
    );

    if let Some(dir) = &config.record_dir {
        match SessionRecorder::in_dir(dir).await {
            Ok(recorder) => {
                recorder
                    .record(SessionEvent::Start {
                        command: opts.command.clone(),
                        args: opts.args.clone(),
                    })
                    .await;
                controller = controller.with_recorder(recorder);
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "session recording disabled"),
        }
    }

    Ok(controller.run().await)
}
