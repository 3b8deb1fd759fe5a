mod diagnostics;
mod progress;
mod series;

pub use diagnostics::{Degeneracy, DegeneracyKind};
pub use progress::Progress;
pub use series::{ResultSeries, SeriesFormat, SeriesPoint};
