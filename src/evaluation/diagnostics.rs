use serde::Serialize;
use std::fmt::{Display, Formatter, Result};
use strum_macros::{Display as StrumDisplay, IntoStaticStr};

/// What went numerically wrong in one cell of a finalize pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, StrumDisplay, IntoStaticStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum DegeneracyKind {
    /// The denominator rate `H[q-1]` of a bunching parameter was zero.
    ZeroRate,
    /// `E[f^2] - E[f]^2` came out negative and was floored.
    NegativeVariance,
    /// Mean occupancy was zero, so the moment could not be normalized.
    ZeroMeanOccupancy,
    /// Fewer than two events: no sample variance exists.
    InsufficientEvents,
}

/// A degenerate `(resolution, order)` cell patched during `eval`.
///
/// The estimate for that cell is still produced (with a substitute constant),
/// so callers that only look at the boolean returned by `eval` get biased
/// numbers without knowing where; this record says where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Degeneracy {
    pub resolution: usize,
    pub sub_bins: usize,
    pub order: usize,
    pub kind: DegeneracyKind,
}

impl Display for Degeneracy {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{} at resolution {} ({} sub-bins), order {}",
            self.kind, self.resolution, self.sub_bins, self.order
        )
    }
}
