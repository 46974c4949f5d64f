//! Bearer credential and refresh margin

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Time-bounded bearer token
///
/// Cloning is cheap; clones of one fetched credential compare as the same
/// credential in [`Credential::same_as`].
#[derive(Clone)]
pub struct Credential {
    token: Arc<str>,
    issued_at: Instant,
    expires_at: Option<Instant>,
}

impl Credential {
    /// Credential valid for `lifetime` starting now
    ///
    /// A lifetime past the range of the monotonic clock yields a
    /// non-expiring credential.
    pub fn new(token: impl Into<Arc<str>>, lifetime: Duration) -> Self {
        let issued_at = Instant::now();
        Self { token: token.into(), issued_at, expires_at: issued_at.checked_add(lifetime) }
    }

    /// Credential that never needs a refresh (local mode)
    pub fn non_expiring(token: impl Into<Arc<str>>) -> Self {
        Self { token: token.into(), issued_at: Instant::now(), expires_at: None }
    }

    /// Raw bearer token; only the request executor should read this
    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub const fn issued_at(&self) -> Instant {
        self.issued_at
    }

    pub const fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// Total validity window, `None` for non-expiring credentials
    pub fn lifetime(&self) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(self.issued_at))
    }

    /// Validity left at `now`
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Whether both values originate from the same fetch
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.token, &other.token) && self.issued_at == other.issued_at
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// When a cached credential is considered due for refresh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshPolicy {
    /// Fraction of the lifetime kept as a safety margin
    pub ratio: f64,
    /// Minimum safety margin
    pub floor: Duration,
}

impl RefreshPolicy {
    pub const fn new(ratio: f64, floor: Duration) -> Self {
        Self { ratio, floor }
    }

    /// Safety margin for a credential with the given lifetime
    ///
    /// `max(lifetime * ratio, floor)`, never more than half the lifetime so
    /// that short-lived credentials are still cached between refreshes.
    pub fn margin(&self, lifetime: Duration) -> Duration {
        let proportional = lifetime.mul_f64(self.ratio.clamp(0.0, 1.0));
        proportional.max(self.floor).min(lifetime / 2)
    }

    pub fn needs_refresh(&self, credential: &Credential, now: Instant) -> bool {
        match (credential.lifetime(), credential.remaining(now)) {
            (Some(lifetime), Some(remaining)) => remaining <= self.margin(lifetime),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_margin_uses_larger_of_ratio_and_floor() {
        let policy = RefreshPolicy::new(0.1, Duration::from_secs(30));
        assert_eq!(policy.margin(Duration::from_secs(3600)), Duration::from_secs(360));
        assert_eq!(policy.margin(Duration::from_secs(120)), Duration::from_secs(30));
        // Capped at half the lifetime
        assert_eq!(policy.margin(Duration::from_secs(40)), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_needs_refresh_inside_margin() {
        let policy = RefreshPolicy::new(0.1, Duration::from_secs(30));
        let credential = Credential::new("abc", Duration::from_secs(600));

        assert!(!policy.needs_refresh(&credential, Instant::now()));
        tokio::time::advance(Duration::from_secs(535)).await;
        assert!(!policy.needs_refresh(&credential, Instant::now()));
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(policy.needs_refresh(&credential, Instant::now()));
        assert!(!credential.is_expired(Instant::now()));
    }

    #[test]
    fn test_non_expiring_never_refreshes() {
        let policy = RefreshPolicy::new(0.5, Duration::from_secs(3600));
        let credential = Credential::non_expiring("local-dev-token");
        assert!(!policy.needs_refresh(&credential, Instant::now()));
        assert_eq!(credential.lifetime(), None);
    }

    #[test]
    fn test_unrepresentable_lifetime_never_expires() {
        let policy = RefreshPolicy::new(0.1, Duration::from_secs(30));
        let credential = Credential::new("abc", Duration::from_secs(u64::MAX));
        assert_eq!(credential.expires_at(), None);
        assert!(!credential.is_expired(Instant::now()));
        assert!(!policy.needs_refresh(&credential, Instant::now()));
    }

    #[test]
    fn test_debug_redacts_token() {
        let credential = Credential::new("super-secret", Duration::from_secs(60));
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_same_as_tracks_origin() {
        let a = Credential::new("abc", Duration::from_secs(60));
        let b = Credential::new("abc", Duration::from_secs(60));
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }
}
