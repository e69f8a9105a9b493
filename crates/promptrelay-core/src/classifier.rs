//! Prompt detection heuristics.
//!
//! The child never announces that it is waiting for input, so the decision
//! is inferred from what the quiet buffer looks like. The primary signal is
//! an unterminated last line: prompts leave the cursor mid-line, finished
//! output flushes a newline. A line-terminated buffer can still be a prompt
//! when its last line reads like a question.
//!
//! Detection is best effort. A wrong "yes" costs the operator a needless
//! message; a wrong "no" is recovered by the session deadline.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ansi::strip_ansi_str;

/// Patterns checked against the last non-blank line of a terminated buffer.
static PROMPT_LINE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\?\s*$|\(y[/|]n\)|yes/no|>\s*$|enter\s+\S|choose\s+\S|please\s+\S|input\s+\S|:\s*$)",
    )
    .unwrap()
});

/// A detected prompt, carrying the text the operator should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptEvent {
    /// Pending output, control sequences stripped and outer whitespace trimmed.
    pub text: String,
    /// How long the child had been quiet when the prompt was detected.
    pub silence: Duration,
}

/// Decides whether a quiet buffer is the child waiting for input.
///
/// The controller calls this at most once per silence window. Closures of
/// the same shape implement it, which keeps alternative heuristics cheap to
/// plug in.
pub trait PromptPolicy: Send {
    fn detect(&self, pending: &str, silence: Duration) -> Option<PromptEvent>;
}

impl<F> PromptPolicy for F
where
    F: Fn(&str, Duration) -> Option<PromptEvent> + Send,
{
    fn detect(&self, pending: &str, silence: Duration) -> Option<PromptEvent> {
        self(pending, silence)
    }
}

/// The default policy: [`looks_like_prompt`] on the pending text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicPolicy;

impl PromptPolicy for HeuristicPolicy {
    fn detect(&self, pending: &str, silence: Duration) -> Option<PromptEvent> {
        if !looks_like_prompt(pending) {
            return None;
        }
        Some(PromptEvent {
            text: strip_ansi_str(pending).trim().to_string(),
            silence,
        })
    }
}

/// Whether `text` looks like the child is waiting for input.
pub fn looks_like_prompt(text: &str) -> bool {
    let clean = strip_ansi_str(text);
    if clean.trim().is_empty() {
        return false;
    }

    if !clean.ends_with('\n') {
        return true;
    }

    let last_line = clean
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("");
    PROMPT_LINE_PATTERN.is_match(last_line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unterminated_prompts() {
        assert!(looks_like_prompt("Continue? (y/n) "));
        assert!(looks_like_prompt("Please enter your name: "));
        assert!(looks_like_prompt("> "));
        assert!(looks_like_prompt("Step 1 done.\nDelete old files? (y/n) "));
    }

    #[test]
    fn finished_line_is_not_a_prompt() {
        assert!(!looks_like_prompt("Build succeeded.\n"));
        assert!(!looks_like_prompt("Compiling foo v0.1.0\nFinished in 2.1s\n"));
    }

    #[test]
    fn blank_input() {
        assert!(!looks_like_prompt(""));
        assert!(!looks_like_prompt("   \n\t\n"));
        assert!(!looks_like_prompt("\x1b[0m\x1b[2K"));
    }

    #[test]
    fn terminated_question_lines() {
        assert!(looks_like_prompt("Overwrite config?\n"));
        assert!(looks_like_prompt("Apply changes (Y/N)\n"));
        assert!(looks_like_prompt("Apply changes (y|n)\n"));
        assert!(looks_like_prompt("Type YES/NO to confirm\n"));
        assert!(looks_like_prompt(">\n"));
        assert!(looks_like_prompt("Select a model:\n"));
    }

    #[test]
    fn imperative_lead_ins() {
        assert!(looks_like_prompt("Enter the branch name\n"));
        assert!(looks_like_prompt("choose an option\n"));
        assert!(looks_like_prompt("PLEASE confirm the target\n"));
        assert!(looks_like_prompt("Input value\n"));
        // A bare keyword with nothing after it is not a lead-in.
        assert!(!looks_like_prompt("Press Enter\n"));
    }

    #[test]
    fn trailing_blank_lines_are_skipped() {
        assert!(looks_like_prompt("Proceed?\n\n  \n"));
        assert!(!looks_like_prompt("All tests passed.\n\n"));
    }

    #[test]
    fn control_sequences_are_ignored() {
        assert!(!looks_like_prompt("\x1b[32mBuild succeeded.\x1b[0m\r\n"));
        assert!(looks_like_prompt("\x1b[1mContinue?\x1b[0m\r\n"));
        assert!(looks_like_prompt("\x1b[1mContinue?\x1b(B\x1b[m\r\n"));
    }

    #[test]
    fn heuristic_policy_trims_text() {
        let silence = Duration::from_millis(600);
        let event = HeuristicPolicy
            .detect("\x1b[1mStep 1 done.\x1b[0m\r\nProceed? ", silence)
            .expect("prompt expected");
        assert_eq!(event.text, "Step 1 done.\nProceed?");
        assert_eq!(event.silence, silence);

        assert_eq!(HeuristicPolicy.detect("done.\n", silence), None);
    }

    #[test]
    fn closures_are_policies() {
        let never = |_: &str, _: Duration| -> Option<PromptEvent> { None };
        assert_eq!(never.detect("Continue? ", Duration::ZERO), None);
    }
}
