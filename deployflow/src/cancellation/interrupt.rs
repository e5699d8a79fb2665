//! The global cap on a run: an external token plus an optional deadline.

use super::CancellationToken;
use tokio::time::Instant;

/// Reason reported when the run deadline passes.
pub const DEADLINE_EXCEEDED: &str = "run deadline exceeded";

/// Everything that can end a run early, independent of stage timeouts.
#[derive(Debug, Clone, Copy, Default)]
pub struct Interrupt<'a> {
    token: Option<&'a CancellationToken>,
    deadline: Option<Instant>,
}

impl<'a> Interrupt<'a> {
    /// An interrupt that never fires.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            token: None,
            deadline: None,
        }
    }

    /// Creates an interrupt from a token and an optional deadline.
    #[must_use]
    pub const fn new(token: &'a CancellationToken, deadline: Option<Instant>) -> Self {
        Self {
            token: Some(token),
            deadline,
        }
    }

    /// Returns the run deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason if the interrupt has already fired.
    #[must_use]
    pub fn check(&self) -> Option<String> {
        if let Some(token) = self.token {
            if token.is_cancelled() {
                return Some(token.reason().unwrap_or_else(|| "cancelled".to_string()));
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DEADLINE_EXCEEDED.to_string()),
            _ => None,
        }
    }

    /// Completes with a reason once the token is cancelled or the deadline passes.
    ///
    /// Never completes if neither is set.
    pub async fn triggered(&self) -> String {
        match (self.token, self.deadline) {
            (Some(token), Some(deadline)) => {
                tokio::select! {
                    () = token.cancelled() => token.reason().unwrap_or_else(|| "cancelled".to_string()),
                    () = tokio::time::sleep_until(deadline) => DEADLINE_EXCEEDED.to_string(),
                }
            }
            (Some(token), None) => {
                token.cancelled().await;
                token.reason().unwrap_or_else(|| "cancelled".to_string())
            }
            (None, Some(deadline)) => {
                tokio::time::sleep_until(deadline).await;
                DEADLINE_EXCEEDED.to_string()
            }
            (None, None) => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_none_never_fires() {
        assert!(Interrupt::none().check().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_fires() {
        let token = CancellationToken::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        let interrupt = Interrupt::new(&token, Some(deadline));

        assert!(interrupt.check().is_none());
        let reason = interrupt.triggered().await;
        assert_eq!(reason, DEADLINE_EXCEEDED);
        assert!(Instant::now() >= deadline);
        assert_eq!(interrupt.check().as_deref(), Some(DEADLINE_EXCEEDED));
    }

    #[tokio::test]
    async fn test_token_reason_reported() {
        let token = CancellationToken::new();
        token.cancel("ctrl-c");
        let interrupt = Interrupt::new(&token, None);

        assert_eq!(interrupt.check().as_deref(), Some("ctrl-c"));
        assert_eq!(interrupt.triggered().await, "ctrl-c");
    }
}
