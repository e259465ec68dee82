//! User-facing operation outcomes
//!
//! Successes become toasts that expire after a fixed delay. Errors become a
//! single banner that stays until it is dismissed or the next operation
//! reports its own outcome. Time is passed in explicitly so expiry is
//! deterministic.

use std::time::{Duration, Instant};

use kbm_common::config::NotificationConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub message: String,
    pub expires_at: Instant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub message: String,
    pub raised_at: Instant,
}

#[derive(Debug)]
pub struct NotificationCenter {
    toasts: Vec<Toast>,
    banner: Option<Banner>,
    success_ttl: Duration,
    next_id: u64,
}

impl NotificationCenter {
    pub fn new(success_ttl: Duration) -> Self {
        Self {
            toasts: Vec::new(),
            banner: None,
            success_ttl,
            next_id: 0,
        }
    }

    pub fn from_config(config: &NotificationConfig) -> Self {
        Self::new(Duration::from_secs(config.success_dismiss_secs))
    }

    /// Show a success toast; clears any pending error banner
    ///
    /// Toasts already expired at `now` are dropped first.
    pub fn success(&mut self, message: impl Into<String>, now: Instant) -> u64 {
        self.prune(now);
        self.banner = None;
        self.next_id += 1;
        self.toasts.push(Toast {
            id: self.next_id,
            message: message.into(),
            expires_at: now + self.success_ttl,
        });
        self.next_id
    }

    /// Raise the error banner, replacing the previous one
    pub fn error(&mut self, message: impl Into<String>, now: Instant) {
        self.banner = Some(Banner {
            message: message.into(),
            raised_at: now,
        });
    }

    pub fn dismiss_banner(&mut self) {
        self.banner = None;
    }

    pub fn dismiss_toast(&mut self, id: u64) {
        self.toasts.retain(|t| t.id != id);
    }

    pub fn banner(&self) -> Option<&Banner> {
        self.banner.as_ref()
    }

    /// Toasts that have not expired at `now`
    pub fn active_toasts(&self, now: Instant) -> Vec<&Toast> {
        self.toasts.iter().filter(|t| t.expires_at > now).collect()
    }

    /// Drop expired toasts
    pub fn prune(&mut self, now: Instant) {
        self.toasts.retain(|t| t.expires_at > now);
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::from_config(&NotificationConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_toast_expires_after_ttl() {
        let mut center = NotificationCenter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        center.success("Successfully uploaded 2 files", t0);

        assert_eq!(center.active_toasts(t0 + Duration::from_secs(4)).len(), 1);
        assert!(center.active_toasts(t0 + Duration::from_secs(5)).is_empty());

        center.prune(t0 + Duration::from_secs(6));
        assert!(center.active_toasts(t0).is_empty());
    }

    #[test]
    fn test_new_toast_drops_expired_ones() {
        let mut center = NotificationCenter::new(Duration::from_secs(5));
        let t0 = Instant::now();
        center.success("first", t0);
        center.success("second", t0 + Duration::from_secs(6));

        assert_eq!(center.toasts.len(), 1);
        assert_eq!(center.toasts[0].message, "second");
    }

    #[test]
    fn test_banner_persists_until_dismissed() {
        let mut center = NotificationCenter::default();
        let t0 = Instant::now();
        center.error("Network error", t0);
        center.prune(t0 + Duration::from_secs(3600));
        assert_eq!(center.banner().unwrap().message, "Network error");

        center.dismiss_banner();
        assert!(center.banner().is_none());
    }

    #[test]
    fn test_banner_superseded_by_next_outcome() {
        let mut center = NotificationCenter::default();
        let t0 = Instant::now();
        center.error("first", t0);
        center.error("second", t0);
        assert_eq!(center.banner().unwrap().message, "second");

        center.success("done", t0);
        assert!(center.banner().is_none());
    }

    #[test]
    fn test_dismiss_toast_by_id() {
        let mut center = NotificationCenter::default();
        let t0 = Instant::now();
        let a = center.success("a", t0);
        center.success("b", t0);
        center.dismiss_toast(a);
        let left: Vec<&str> = center.active_toasts(t0).iter().map(|t| t.message.as_str()).collect();
        assert_eq!(left, vec!["b"]);
    }
}
