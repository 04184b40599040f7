//! Optimistic state for counter actions.
//!
//! A key press changes what the operator expects the counter to be serving
//! before the daemon has said so.  `IntentState` holds both values until a
//! push confirms the intent, or until the wait is long enough that the panel
//! should flag it.

use std::time::{Duration, Instant};

/// How long an intent may stay unconfirmed before it is flagged.
pub const INTENT_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Debug, Clone)]
pub enum IntentState<T: Clone + PartialEq> {
    Confirmed(T),
    Pending {
        intended: T,
        confirmed: T,
        since: Instant,
    },
    /// No push arrived within [`INTENT_TIMEOUT`].
    TimedOut { intended: T, confirmed: T },
}

impl<T: Clone + PartialEq> IntentState<T> {
    pub fn new(value: T) -> Self {
        Self::Confirmed(value)
    }

    pub fn intended(&self) -> &T {
        match self {
            Self::Confirmed(v) | Self::Pending { intended: v, .. } | Self::TimedOut { intended: v, .. } => v,
        }
    }

    pub fn confirmed(&self) -> &T {
        match self {
            Self::Confirmed(v)
            | Self::Pending { confirmed: v, .. }
            | Self::TimedOut { confirmed: v, .. } => v,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    /// Record an intent.  Matching the confirmed value is a no-op.
    pub fn set_intent(&mut self, intended: T) {
        let confirmed = self.confirmed().clone();
        *self = if intended == confirmed {
            Self::Confirmed(intended)
        } else {
            Self::Pending {
                intended,
                confirmed,
                since: Instant::now(),
            }
        };
    }

    /// Returns true when a pending intent just timed out.
    pub fn tick(&mut self) -> bool {
        let Self::Pending {
            intended,
            confirmed,
            since,
        } = self
        else {
            return false;
        };
        if since.elapsed() < INTENT_TIMEOUT {
            return false;
        }
        *self = Self::TimedOut {
            intended: intended.clone(),
            confirmed: confirmed.clone(),
        };
        true
    }

    /// The daemon reported `value`.  A pending intent survives an unrelated
    /// value; a timed out one gives way to whatever arrives.
    pub fn on_confirmed(&mut self, value: T) -> bool {
        match self {
            Self::Pending {
                intended,
                confirmed,
                ..
            } => {
                if value == *intended {
                    *self = Self::Confirmed(value);
                    true
                } else {
                    *confirmed = value;
                    false
                }
            }
            Self::TimedOut { .. } => {
                *self = Self::Confirmed(value);
                true
            }
            Self::Confirmed(v) if *v != value => {
                *v = value;
                true
            }
            Self::Confirmed(_) => false,
        }
    }

    /// Drop the intent and show the confirmed value again.
    pub fn abandon(&mut self) {
        let confirmed = self.confirmed().clone();
        *self = Self::Confirmed(confirmed);
    }

    pub fn render_state(&self) -> RenderHint {
        match self {
            Self::Confirmed(_) => RenderHint::Normal,
            Self::Pending { since, .. } => {
                // 400ms pulse.
                if (since.elapsed().as_millis() / 400) % 2 == 0 {
                    RenderHint::PendingVisible
                } else {
                    RenderHint::PendingHidden
                }
            }
            Self::TimedOut { .. } => RenderHint::TimedOut,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderHint {
    Normal,
    PendingVisible,
    PendingHidden,
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_confirmed_by_matching_push() {
        let mut s = IntentState::new(None::<u32>);
        s.set_intent(Some(4));
        assert!(s.is_pending());
        assert_eq!(s.intended(), &Some(4));
        assert_eq!(s.confirmed(), &None);

        assert!(!s.on_confirmed(None));
        assert!(s.is_pending());
        assert!(s.on_confirmed(Some(4)));
        assert_eq!(s.render_state(), RenderHint::Normal);
    }

    #[test]
    fn test_same_value_is_not_pending() {
        let mut s = IntentState::new(Some(1u32));
        s.set_intent(Some(1));
        assert!(!s.is_pending());
    }

    #[test]
    fn test_abandon_restores_confirmed() {
        let mut s = IntentState::new(None::<u32>);
        s.set_intent(Some(9));
        s.abandon();
        assert_eq!(s.intended(), &None);
        assert!(!s.is_pending());
    }

    #[test]
    fn test_timed_out_accepts_anything() {
        let mut s = IntentState::TimedOut {
            intended: Some(2u32),
            confirmed: None,
        };
        assert_eq!(s.render_state(), RenderHint::TimedOut);
        assert!(s.on_confirmed(Some(7)));
        assert_eq!(s.confirmed(), &Some(7));
    }
}
