//! Turn sequence extraction: provider steps are normalized into
//! [`Maneuver`]s, each maneuver is labeled Left/Right/Other by a
//! [`TurnClassifier`], and the Left/Right labels form a [`TurnSequence`].

mod classify;
mod maneuver;

pub use classify::{Turn, TurnClassifier, TurnLabel, TurnSequence};
pub use maneuver::{Maneuver, Side, TurnDegree, normalize_step};
