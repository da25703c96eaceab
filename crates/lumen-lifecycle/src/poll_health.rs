//! Poll failure-run accounting.

/// Failed polls logged in full at the start of a run.
const LOGGED_RUN_HEAD: u32 = 3;

/// Heartbeat interval once a run is being folded.
const HEARTBEAT_EVERY: u32 = 25;

/// Decides which failed polls are worth a log line.
///
/// A poll loop can run for minutes against a dead network; logging every
/// failed round trip would drown the rest of the log. The head of a failure
/// run is logged in full, the remainder folds down to a periodic heartbeat,
/// and the recovery reports how long the run was.
#[derive(Debug, Default)]
pub(crate) struct PollHealth {
    streak: u32,
}

impl PollHealth {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a failed poll. Returns whether this one gets a log line.
    pub(crate) fn note_failure(&mut self) -> bool {
        self.streak += 1;
        self.streak <= LOGGED_RUN_HEAD || self.streak % HEARTBEAT_EVERY == 0
    }

    /// Record a completed poll. Returns the length of the failure run this
    /// ends, if part of it was folded away.
    pub(crate) fn note_success(&mut self) -> Option<u32> {
        let run = std::mem::take(&mut self.streak);
        (run > LOGGED_RUN_HEAD).then_some(run)
    }

    /// Consecutive failed polls so far.
    pub(crate) fn streak(&self) -> u32 {
        self.streak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_outage_folds_to_a_heartbeat() {
        let mut health = PollHealth::new();

        // The head of the run is logged in full.
        for _ in 0..LOGGED_RUN_HEAD {
            assert!(health.note_failure());
        }

        // A hundred more failed polls surface only as heartbeats.
        let logged = (0..100).filter(|_| health.note_failure()).count();
        assert_eq!(logged, 4);

        // The recovery reports the whole run once, then the slate is clean.
        assert_eq!(health.note_success(), Some(103));
        assert_eq!(health.streak(), 0);
        assert!(health.note_failure());
    }

    #[test]
    fn test_short_blip_recovers_silently() {
        let mut health = PollHealth::new();
        assert!(health.note_failure());
        assert!(health.note_failure());
        assert_eq!(health.note_success(), None);
    }
}
