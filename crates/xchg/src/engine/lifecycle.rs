//! Engine-wide lifecycle (§4.5): `Uninitialized -> Initialized ->
//! (Active|Standby) -> Stopped`. `Stopped` is terminal and idempotent so a
//! repeated stop request is a no-op rather than an error.

use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Active,
    Standby,
    Stopped,
}

#[derive(Debug, Error)]
#[error("illegal engine lifecycle transition: {from:?} -> {to:?}")]
pub struct IllegalTransition {
    pub from: LifecycleState,
    pub to: LifecycleState,
}

impl LifecycleState {
    fn legal_transition_to(self, to: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, to),
            (Uninitialized, Initialized)
                | (Initialized, Active)
                | (Initialized, Standby)
                | (Active, Standby)
                | (Standby, Active)
                | (Active, Stopped)
                | (Standby, Stopped)
                | (Initialized, Stopped)
        )
    }
}

/// Guards the engine's coarse lifecycle, independent of any one session's
/// `ManagedState` (§4.5 "Engine lifecycle").
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { state: LifecycleState::Uninitialized }
    }
}

impl Lifecycle {
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Applies a transition, or no-ops if already in `to` (stop is
    /// idempotent — see module docs).
    pub fn transition(&mut self, to: LifecycleState) -> Result<(), IllegalTransition> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.legal_transition_to(to) {
            return Err(IllegalTransition { from: self.state, to });
        }
        tracing::info!(from = ?self.state, to = ?to, "engine lifecycle transition");
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walks_the_happy_path() {
        let mut lc = Lifecycle::default();
        lc.transition(LifecycleState::Initialized).unwrap();
        lc.transition(LifecycleState::Active).unwrap();
        lc.transition(LifecycleState::Standby).unwrap();
        lc.transition(LifecycleState::Active).unwrap();
        lc.transition(LifecycleState::Stopped).unwrap();
    }

    #[test]
    fn repeated_stop_is_a_no_op() {
        let mut lc = Lifecycle::default();
        lc.transition(LifecycleState::Initialized).unwrap();
        lc.transition(LifecycleState::Active).unwrap();
        lc.transition(LifecycleState::Stopped).unwrap();
        lc.transition(LifecycleState::Stopped).unwrap();
    }

    #[test]
    fn rejects_skipping_initialization() {
        let mut lc = Lifecycle::default();
        assert!(lc.transition(LifecycleState::Active).is_err());
    }
}
