use std::fmt;

use crate::error::{SyncError, SyncResult};

/// Where a sync session is in its lifecycle.
///
/// `Init -> Negotiating -> {Fetching | Pushing} -> Closed`; any state may
/// jump straight to `Closed` on error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Init,
    Negotiating,
    Fetching,
    Pushing,
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Init => "init",
            SessionState::Negotiating => "negotiating",
            SessionState::Fetching => "fetching",
            SessionState::Pushing => "pushing",
            SessionState::Closed => "closed",
        }
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Init, Negotiating)
                | (Negotiating, Fetching)
                | (Negotiating, Pushing)
                | (_, Closed)
        ) && *self != Closed
    }

    /// Move to `next`, refusing transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: SessionState) -> SyncResult<()> {
        if !self.can_transition_to(next) {
            return Err(SyncError::InvalidTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let mut s = SessionState::Init;
        s.advance(SessionState::Negotiating).unwrap();
        s.advance(SessionState::Pushing).unwrap();
        s.advance(SessionState::Closed).unwrap();
        assert!(s.advance(SessionState::Closed).is_err());
    }

    #[test]
    fn cannot_skip_negotiation() {
        let mut s = SessionState::Init;
        let err = s.advance(SessionState::Fetching).unwrap_err();
        assert!(matches!(
            err,
            SyncError::InvalidTransition {
                from: SessionState::Init,
                to: SessionState::Fetching
            }
        ));
        assert!(!SessionState::Fetching.can_transition_to(SessionState::Pushing));
    }
}
