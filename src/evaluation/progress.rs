use std::fmt::{Display, Formatter, Result};

/// Periodic progress report of a running analysis.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Progress {
    pub events_seen: u64,
    pub samples_seen: u64,
    pub seconds: f64,
}

impl Display for Progress {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "events={}, samples={}, t={:.3}s",
            self.events_seen, self.samples_seen, self.seconds
        )
    }
}
