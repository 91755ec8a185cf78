/**
 * BANNIÈRE DE NOTIFICATION - Messages transitoires du dashboard
 *
 * Un seul message visible à la fois (le dernier gagne), masqué après
 * `banner_ms` (500 ms d'attente + 300 ms de fondu par défaut).
 */

use crate::state::{new_state, Shared};
use serde::Serialize;
use std::time::{Duration, Instant};

pub const DEFAULT_BANNER: Duration = Duration::from_millis(800);

#[derive(Debug, Clone)]
struct Banner {
    message: String,
    shown_at: Instant,
}

/// Vue sérialisable de la bannière courante.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    pub remaining_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    banner: Shared<Option<Banner>>,
    ttl: Duration,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_BANNER)
    }
}

impl Notifier {
    pub fn new(ttl: Duration) -> Self {
        Self { banner: new_state(None), ttl }
    }

    pub fn notify(&self, message: impl Into<String>) {
        self.notify_at(message, Instant::now());
    }

    pub fn notify_at(&self, message: impl Into<String>, now: Instant) {
        let message = message.into();
        tracing::info!("[notify] {message}");
        *self.banner.lock() = Some(Banner { message, shown_at: now });
    }

    pub fn current(&self) -> Option<Notification> {
        self.current_at(Instant::now())
    }

    pub fn current_at(&self, now: Instant) -> Option<Notification> {
        let guard = self.banner.lock();
        let banner = guard.as_ref()?;
        let elapsed = now.saturating_duration_since(banner.shown_at);
        let remaining = self.ttl.checked_sub(elapsed).filter(|d| !d.is_zero())?;
        Some(Notification { message: banner.message.clone(), remaining_ms: remaining.as_millis() as u64 })
    }

    /// Dernier message émis, même masqué.
    pub fn last_message(&self) -> Option<String> {
        self.banner.lock().as_ref().map(|b| b.message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_hides_after_ttl() {
        let notifier = Notifier::default();
        let t0 = Instant::now();
        notifier.notify_at("No access to database.", t0);

        let shown = notifier.current_at(t0 + Duration::from_millis(500)).unwrap();
        assert_eq!(shown.message, "No access to database.");
        assert_eq!(shown.remaining_ms, 300);

        assert!(notifier.current_at(t0 + Duration::from_millis(800)).is_none());
        assert_eq!(notifier.last_message().as_deref(), Some("No access to database."));
    }

    #[test]
    fn latest_message_wins() {
        let notifier = Notifier::new(Duration::from_secs(5));
        notifier.notify("Showing Router IDs.");
        notifier.notify("Showing RLOC16s.");
        assert_eq!(notifier.current().unwrap().message, "Showing RLOC16s.");
    }

    #[test]
    fn clones_share_the_banner() {
        let notifier = Notifier::new(Duration::from_secs(5));
        let other = notifier.clone();
        other.notify("Errors.");
        assert_eq!(notifier.current().unwrap().message, "Errors.");
    }
}
