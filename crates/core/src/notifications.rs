use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Danger,
}

impl Severity {
    /// Single-cell glyph drawn in front of the toast title.
    #[must_use]
    pub fn icon(self) -> &'static str {
        match self {
            Self::Success => "✔",
            Self::Info => "ℹ",
            Self::Warning => "⚠",
            Self::Danger => "✖",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Danger => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ToastId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: ToastId,
    pub message: String,
    pub severity: Severity,
    pub shown_at: Instant,
    pub duration: Duration,
}

impl Toast {
    #[must_use]
    pub fn expires_at(&self) -> Instant {
        self.shown_at
            .checked_add(self.duration)
            .unwrap_or(self.shown_at)
    }

    #[must_use]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at()
    }
}

/// Sink for user-facing messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity);
}

#[derive(Debug, Default)]
struct ToastState {
    next_id: u64,
    toasts: Vec<Toast>,
}

/// Stack of toasts, each with its own expiry. Display is non-blocking; the
/// UI prunes expired toasts on its tick.
#[derive(Debug)]
pub struct ToastCenter {
    default_duration: Duration,
    state: Mutex<ToastState>,
}

impl Default for ToastCenter {
    fn default() -> Self {
        Self::new(DEFAULT_TOAST_DURATION)
    }
}

impl ToastCenter {
    #[must_use]
    pub fn new(default_duration: Duration) -> Self {
        Self {
            default_duration,
            state: Mutex::new(ToastState::default()),
        }
    }

    #[must_use]
    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    pub fn show(&self, message: impl Into<String>, severity: Severity, duration: Duration) -> ToastId {
        self.show_at(Instant::now(), message, severity, duration)
    }

    pub fn show_at(
        &self,
        now: Instant,
        message: impl Into<String>,
        severity: Severity,
        duration: Duration,
    ) -> ToastId {
        let message = message.into();
        tracing::debug!(severity = severity.label(), %message, "toast shown");

        let mut state = self.state.lock();
        state.next_id += 1;
        let id = ToastId(state.next_id);
        state.toasts.push(Toast {
            id,
            message,
            severity,
            shown_at: now,
            duration,
        });
        id
    }

    pub fn dismiss(&self, id: ToastId) -> bool {
        let mut state = self.state.lock();
        let before = state.toasts.len();
        state.toasts.retain(|toast| toast.id != id);
        state.toasts.len() != before
    }

    /// Drops the newest toast, if any.
    pub fn dismiss_latest(&self) -> bool {
        self.state.lock().toasts.pop().is_some()
    }

    pub fn prune_expired(&self, now: Instant) -> usize {
        let mut state = self.state.lock();
        let before = state.toasts.len();
        state.toasts.retain(|toast| !toast.is_expired(now));
        before - state.toasts.len()
    }

    /// Non-expired toasts, oldest first.
    #[must_use]
    pub fn visible(&self, now: Instant) -> Vec<Toast> {
        self.state
            .lock()
            .toasts
            .iter()
            .filter(|toast| !toast.is_expired(now))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn all(&self) -> Vec<Toast> {
        self.state.lock().toasts.clone()
    }

    #[must_use]
    pub fn latest(&self) -> Option<Toast> {
        self.state.lock().toasts.last().cloned()
    }
}

impl Notifier for ToastCenter {
    fn notify(&self, message: &str, severity: Severity) {
        self.show(message, severity, self.default_duration);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::{Duration, Instant};

    use super::{Notifier, Severity, ToastCenter, DEFAULT_TOAST_DURATION};

    #[test]
    fn toasts_expire_on_independent_timers() {
        let center = ToastCenter::default();
        let start = Instant::now();
        center.show_at(start, "short", Severity::Info, Duration::from_secs(1));
        center.show_at(start, "long", Severity::Success, Duration::from_secs(10));

        let later = start + Duration::from_secs(2);
        assert_eq!(center.visible(later).len(), 1);
        assert_eq!(center.prune_expired(later), 1);
        assert_eq!(center.all()[0].message, "long");
    }

    #[test]
    fn toasts_stack_in_display_order() {
        let center = ToastCenter::default();
        center.notify("first", Severity::Warning);
        center.notify("second", Severity::Danger);

        let messages: Vec<_> = center.all().into_iter().map(|toast| toast.message).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(
            center.latest().map(|toast| toast.duration),
            Some(DEFAULT_TOAST_DURATION)
        );
    }

    #[test]
    fn dismiss_removes_before_expiry() {
        let center = ToastCenter::default();
        let id = center.show("closable", Severity::Info, Duration::from_secs(60));

        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
        assert!(center.visible(Instant::now()).is_empty());
    }

    #[test]
    fn severities_have_distinct_icons() {
        let icons: HashSet<_> = [
            Severity::Success,
            Severity::Info,
            Severity::Warning,
            Severity::Danger,
        ]
        .into_iter()
        .map(Severity::icon)
        .collect();

        assert_eq!(icons.len(), 4);
        assert_eq!(Severity::Danger.icon(), "✖");
    }
}
