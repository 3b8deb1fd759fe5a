use std::io::Error;

/// Pull-based source of events, each event being the sample values of one
/// observation (e.g. particle coordinates along one axis).
///
/// Implementations may represent finite recorded datasets or unbounded
/// generators.
pub trait EventStream {
    /// Indicates whether the stream *may* produce more events.
    ///
    /// If it returns `false`, a subsequent call to [`next_event`] must return
    /// `None`.
    ///
    /// [`next_event`]: EventStream::next_event
    fn has_more_events(&self) -> bool;

    /// Produces the next event, or `None` if the stream is exhausted.
    ///
    /// An event may be empty: zero samples is a legitimate observation.
    fn next_event(&mut self) -> Option<Vec<f64>>;

    /// Resets the stream to its initial state; generators re-seed their RNG.
    fn restart(&mut self) -> Result<(), Error>;
}
