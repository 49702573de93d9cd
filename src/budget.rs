//! Remaining execution budget of the current invocation.

use std::time::{Duration, Instant};

/// Reports how much wall-clock time the invocation has left.
///
/// Probed once after every committed page; it is the only way a run is cut
/// short, and it always ends in a clean checkpoint.
pub trait BudgetProbe: Send + Sync {
    fn remaining(&self) -> Duration;
}

/// A fixed deadline measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    deadline: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            deadline: Instant::now() + budget,
        }
    }

    /// A budget that never runs low.
    pub fn unlimited() -> Self {
        Self::after(Duration::from_secs(60 * 60 * 24 * 365))
    }
}

impl BudgetProbe for Deadline {
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl<F> BudgetProbe for F
where
    F: Fn() -> Duration + Send + Sync,
{
    fn remaining(&self) -> Duration {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_counts_down() {
        let d = Deadline::after(Duration::from_secs(900));
        let left = d.remaining();
        assert!(left <= Duration::from_secs(900));
        assert!(left > Duration::from_secs(890));
    }

    #[test]
    fn expired_deadline_saturates() {
        assert_eq!(Deadline::after(Duration::ZERO).remaining(), Duration::ZERO);
    }

    #[test]
    fn closures_are_probes() {
        let probe = || Duration::from_secs(5);
        assert_eq!(BudgetProbe::remaining(&probe), Duration::from_secs(5));
    }
}
