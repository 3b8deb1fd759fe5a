use crate::streams::EventStream;
use std::io::Error;

/// Replays a fixed list of events.
pub struct VecEventStream {
    pub events: Vec<Vec<f64>>,
    idx: usize,
}

impl VecEventStream {
    pub fn new(events: Vec<Vec<f64>>) -> Self {
        Self { events, idx: 0 }
    }

    /// `count` copies of the same event.
    pub fn repeated(event: Vec<f64>, count: usize) -> Self {
        Self::new(vec![event; count])
    }
}

impl EventStream for VecEventStream {
    fn has_more_events(&self) -> bool {
        self.idx < self.events.len()
    }

    fn next_event(&mut self) -> Option<Vec<f64>> {
        let event = self.events.get(self.idx)?.clone();
        self.idx += 1;
        Some(event)
    }

    fn restart(&mut self) -> Result<(), Error> {
        self.idx = 0;
        Ok(())
    }
}
