use std::fmt;

use serde::Deserialize;

use super::maneuver::{Maneuver, Side, TurnDegree};

/// Label assigned to every maneuver. Classification is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TurnLabel {
    Left,
    Right,
    Other,
}

/// A kept turn in a [`TurnSequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Turn {
    Left,
    Right,
}

impl Turn {
    pub fn letter(self) -> char {
        match self {
            Turn::Left => 'L',
            Turn::Right => 'R',
        }
    }
}

impl From<Side> for Turn {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Turn::Left,
            Side::Right => Turn::Right,
        }
    }
}

/// Ordered left/right turns of one route, with non-turn maneuvers elided.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnSequence(Vec<Turn>);

impl TurnSequence {
    pub fn new(turns: Vec<Turn>) -> Self {
        Self(turns)
    }

    pub fn turns(&self) -> &[Turn] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the persisted `"LRRL"` form. Whitespace is ignored.
    pub fn from_letters(s: &str) -> Result<Self, char> {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| match c {
                'L' | 'l' => Ok(Turn::Left),
                'R' | 'r' => Ok(Turn::Right),
                other => Err(other),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl fmt::Display for TurnSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.0 {
            write!(f, "{}", t.letter())?;
        }
        Ok(())
    }
}

/// Decides which maneuvers count as a left or right turn.
///
/// A plain turn counts when its degree is at least `min_degree`. The other
/// sided maneuvers count only when their flag is enabled. Heading changes
/// count when their magnitude reaches `min_heading_change_deg`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TurnClassifier {
    pub min_degree: TurnDegree,
    pub count_uturns: bool,
    pub count_ramps: bool,
    pub count_forks: bool,
    pub count_keeps: bool,
    pub count_roundabouts: bool,
    pub min_heading_change_deg: f64,
}

impl Default for TurnClassifier {
    fn default() -> Self {
        Self {
            min_degree: TurnDegree::Normal,
            count_uturns: true,
            count_ramps: false,
            count_forks: false,
            count_keeps: false,
            count_roundabouts: false,
            min_heading_change_deg: 45.0,
        }
    }
}

impl TurnClassifier {
    /// Any maneuver naming a side is a turn, including slight bears,
    /// ramps and forks.
    pub fn keyword_compatible() -> Self {
        Self {
            min_degree: TurnDegree::Slight,
            count_uturns: true,
            count_ramps: true,
            count_forks: true,
            count_keeps: true,
            count_roundabouts: true,
            min_heading_change_deg: f64::MIN_POSITIVE,
        }
    }

    pub fn classify(&self, maneuver: &Maneuver) -> TurnLabel {
        let side = match *maneuver {
            Maneuver::Turn { side, degree } if degree >= self.min_degree => Some(side),
            Maneuver::UTurn { side } if self.count_uturns => Some(side),
            Maneuver::Ramp { side } if self.count_ramps => Some(side),
            Maneuver::Fork { side } if self.count_forks => Some(side),
            Maneuver::Keep { side } if self.count_keeps => Some(side),
            Maneuver::Roundabout { side } if self.count_roundabouts => Some(side),
            Maneuver::Heading { change_deg } if change_deg.abs() >= self.min_heading_change_deg => {
                if change_deg > 0.0 {
                    Some(Side::Right)
                } else {
                    Some(Side::Left)
                }
            }
            _ => None,
        };
        match side {
            Some(Side::Left) => TurnLabel::Left,
            Some(Side::Right) => TurnLabel::Right,
            None => TurnLabel::Other,
        }
    }

    /// Labels every maneuver and keeps the left/right ones in order.
    pub fn extract(&self, maneuvers: &[Maneuver]) -> TurnSequence {
        let turns = maneuvers
            .iter()
            .filter_map(|m| match self.classify(m) {
                TurnLabel::Left => Some(Turn::Left),
                TurnLabel::Right => Some(Turn::Right),
                TurnLabel::Other => None,
            })
            .collect();
        TurnSequence(turns)
    }
}
