//! Typing signals on both ends of a conversation
//!
//! [`TypingDebouncer`] decides when the local user's keystrokes should emit
//! `typing_start` / `typing_stop`. [`PeerTypingIndicator`] decides whether
//! the other side is shown as typing; it expires on its own so a lost stop
//! event cannot leave the indicator on.

use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Local typing state for one conversation
#[derive(Debug)]
pub struct TypingDebouncer {
    quiet: Duration,
    last_keystroke: Option<Instant>,
}

impl TypingDebouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_keystroke: None,
        }
    }

    /// Record a keystroke. Returns true when `typing_start` should be sent.
    pub fn keystroke(&mut self) -> bool {
        let was_idle = !self.is_active();
        self.last_keystroke = Some(Instant::now());
        was_idle
    }

    /// End typing now. Returns true when `typing_stop` should be sent.
    pub fn stop(&mut self) -> bool {
        self.last_keystroke.take().is_some()
    }

    /// Returns true once when the quiet interval has elapsed since the last
    /// keystroke; the caller then sends `typing_stop`.
    pub fn poll_expired(&mut self) -> bool {
        match self.last_keystroke {
            Some(at) if at.elapsed() >= self.quiet => {
                self.last_keystroke = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.last_keystroke.is_some()
    }

    /// When the pending `typing_stop` falls due
    pub fn deadline(&self) -> Option<Instant> {
        self.last_keystroke.map(|at| at + self.quiet)
    }
}

/// Who is shown as typing in a conversation
#[derive(Debug)]
pub struct PeerTypingIndicator {
    quiet: Duration,
    /// Expiry per typing participant
    typing: HashMap<String, Instant>,
}

impl PeerTypingIndicator {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            typing: HashMap::new(),
        }
    }

    /// A `user_typing` arrived; refreshes the expiry
    pub fn started(&mut self, user_id: &str) {
        self.typing
            .insert(user_id.to_string(), Instant::now() + self.quiet);
    }

    /// A `user_typing_stopped` arrived, or the user sent a message
    pub fn stopped(&mut self, user_id: &str) {
        self.typing.remove(user_id);
    }

    pub fn is_typing(&self) -> bool {
        let now = Instant::now();
        self.typing.values().any(|expiry| *expiry > now)
    }

    pub fn typing_users(&self) -> Vec<&str> {
        let now = Instant::now();
        self.typing
            .iter()
            .filter(|(_, expiry)| **expiry > now)
            .map(|(user, _)| user.as_str())
            .collect()
    }

    /// Forget expired entries
    pub fn prune(&mut self) {
        let now = Instant::now();
        self.typing.retain(|_, expiry| *expiry > now);
    }

    /// Earliest expiry still pending
    pub fn deadline(&self) -> Option<Instant> {
        self.typing.values().min().copied()
    }

    pub fn clear(&mut self) {
        self.typing.clear();
    }
}
