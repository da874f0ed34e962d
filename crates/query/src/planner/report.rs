//! Optimization reports.

use core::fmt;
use serde::Serialize;

/// What one optimization run did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OptimizationReport {
    /// Rule firings, including declined and failed ones.
    pub rule_firings: usize,
    /// The firing budget ran out before the search reached a fixpoint.
    pub budget_exhausted: bool,
    /// The search stopped because the root plan stopped improving.
    pub stopped_early: bool,
    /// Live equivalence classes at the end of the run.
    pub classes: usize,
    /// Registered expressions.
    pub expressions: usize,
    /// Class merges.
    pub merges: usize,
    /// Firings that failed or produced an expression of the wrong shape.
    pub rule_failures: usize,
}

impl OptimizationReport {
    /// Returns true if the plan may be worse than the search space allows.
    pub fn degraded(&self) -> bool {
        self.budget_exhausted
    }
}

impl fmt::Display for OptimizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} firings ({} failed), {} classes, {} expressions, {} merges",
            self.rule_firings, self.rule_failures, self.classes, self.expressions, self.merges
        )?;
        if self.budget_exhausted {
            f.write_str(", budget exhausted")?;
        }
        if self.stopped_early {
            f.write_str(", stopped early")?;
        }
        Ok(())
    }
}
