//! Turn-transition statistics.
//!
//! A route's turn sequence of length `L` yields `L - 1` adjacent-pair
//! transitions. Its alternating fraction is `(LR + RL) / (L - 1)` and is
//! undefined (`None`) when `L < 2`; undefined routes are left out of city
//! aggregation entirely.
//!
//! City aggregation uses the sample mean, the sample standard deviation
//! (`n - 1` divisor) and a 95% confidence interval from the normal
//! approximation `mean ± 1.96 · stddev / √n`. No t-correction is applied,
//! so intervals for small `n` are narrower than a t-interval would be.

use std::fmt;

use serde::Serialize;

use crate::analyzers::utility::{mean, sample_stddev};
use crate::turns::{Turn, TurnSequence};

/// z-score of the two-sided 95% normal interval.
pub const Z_95: f64 = 1.96;

/// Direction pair of two consecutive turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    LeftLeft,
    LeftRight,
    RightLeft,
    RightRight,
}

impl Transition {
    pub fn between(a: Turn, b: Turn) -> Self {
        match (a, b) {
            (Turn::Left, Turn::Left) => Transition::LeftLeft,
            (Turn::Left, Turn::Right) => Transition::LeftRight,
            (Turn::Right, Turn::Left) => Transition::RightLeft,
            (Turn::Right, Turn::Right) => Transition::RightRight,
        }
    }

    pub fn is_alternating(self) -> bool {
        matches!(self, Transition::LeftRight | Transition::RightLeft)
    }

    pub fn code(self) -> &'static str {
        match self {
            Transition::LeftLeft => "LL",
            Transition::LeftRight => "LR",
            Transition::RightLeft => "RL",
            Transition::RightRight => "RR",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Adjacent-pair transitions of a sequence, in order. Empty for `L < 2`.
pub fn transitions(seq: &TurnSequence) -> Vec<Transition> {
    seq.turns()
        .windows(2)
        .map(|w| Transition::between(w[0], w[1]))
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransitionCounts {
    pub ll: usize,
    pub lr: usize,
    pub rl: usize,
    pub rr: usize,
}

impl TransitionCounts {
    pub fn from_sequence(seq: &TurnSequence) -> Self {
        let mut c = TransitionCounts::default();
        for t in transitions(seq) {
            match t {
                Transition::LeftLeft => c.ll += 1,
                Transition::LeftRight => c.lr += 1,
                Transition::RightLeft => c.rl += 1,
                Transition::RightRight => c.rr += 1,
            }
        }
        c
    }

    pub fn total(&self) -> usize {
        self.ll + self.lr + self.rl + self.rr
    }

    pub fn alternating(&self) -> usize {
        self.lr + self.rl
    }

    /// `None` when there is no transition to measure.
    pub fn alternating_fraction(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.alternating() as f64 / total as f64),
        }
    }
}

/// Alternating fraction of one route, `None` when the sequence has fewer
/// than two turns.
pub fn alternating_fraction(seq: &TurnSequence) -> Option<f64> {
    TransitionCounts::from_sequence(seq).alternating_fraction()
}

/// Aggregate of the defined per-route fractions of one place (or of all
/// places). Recomputed from scratch on every call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityStatistics {
    /// Routes with a defined ratio.
    pub routes: usize,
    pub mean: f64,
    pub stddev: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

impl CityStatistics {
    /// `None` for an empty input. A single route gives `stddev = 0` and a
    /// degenerate interval at the mean.
    pub fn from_fractions(fractions: &[f64]) -> Option<Self> {
        if fractions.is_empty() {
            return None;
        }
        let n = fractions.len();
        let m = mean(fractions);
        let sd = sample_stddev(fractions, m);
        let half_width = Z_95 * sd / (n as f64).sqrt();

        Some(CityStatistics {
            routes: n,
            mean: m,
            stddev: sd,
            ci_lower: m - half_width,
            ci_upper: m + half_width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> TurnSequence {
        TurnSequence::from_letters(s).unwrap()
    }

    #[test]
    fn test_fully_alternating() {
        let s = seq("LRLR");
        assert_eq!(
            transitions(&s),
            vec![
                Transition::LeftRight,
                Transition::RightLeft,
                Transition::LeftRight
            ]
        );
        assert_eq!(alternating_fraction(&s), Some(1.0));
    }

    #[test]
    fn test_repeated_left() {
        let s = seq("LL");
        assert_eq!(transitions(&s), vec![Transition::LeftLeft]);
        assert_eq!(alternating_fraction(&s), Some(0.0));
    }

    #[test]
    fn test_short_sequences_are_undefined() {
        assert_eq!(alternating_fraction(&seq("L")), None);
        assert_eq!(alternating_fraction(&seq("")), None);
        assert!(transitions(&seq("R")).is_empty());
    }

    #[test]
    fn test_counts_sum_to_len_minus_one() {
        let s = seq("LLRRLRL");
        let c = TransitionCounts::from_sequence(&s);
        assert_eq!(c.total(), s.len() - 1);
        assert_eq!(c, TransitionCounts { ll: 1, lr: 2, rl: 2, rr: 1 });
        assert_eq!(c.alternating_fraction(), Some(4.0 / 6.0));
    }

    #[test]
    fn test_city_statistics() {
        let stats = CityStatistics::from_fractions(&[0.0, 0.5, 1.0]).unwrap();
        assert_eq!(stats.routes, 3);
        assert!((stats.mean - 0.5).abs() < 1e-12);
        assert!((stats.stddev - 0.5).abs() < 1e-12);
        let half = 1.96 * 0.5 / 3f64.sqrt();
        assert!((stats.ci_lower - (0.5 - half)).abs() < 1e-12);
        assert!((stats.ci_upper - (0.5 + half)).abs() < 1e-12);
    }

    #[test]
    fn test_city_statistics_edge_sizes() {
        assert_eq!(CityStatistics::from_fractions(&[]), None);
        let one = CityStatistics::from_fractions(&[0.25]).unwrap();
        assert_eq!(one.stddev, 0.0);
        assert_eq!(one.ci_lower, 0.25);
        assert_eq!(one.ci_upper, 0.25);
    }

    #[test]
    fn test_aggregation_is_idempotent() {
        let fractions = [0.2, 0.9, 0.4, 0.4];
        assert_eq!(
            CityStatistics::from_fractions(&fractions),
            CityStatistics::from_fractions(&fractions)
        );
    }
}
