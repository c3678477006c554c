//! Internal maneuver type and its normalization from provider data.
//!
//! Routing providers describe a step in one of three ways: an enum-like
//! maneuver code (`TURN_SHARP_LEFT`, `turn-slight-right`), free-form
//! instruction text ("Turn left onto Main St"), or a raw heading change
//! taken from route geometry. All of them collapse into [`Maneuver`] here so
//! the classifier never sees provider formats.

use std::fmt;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn as_str(self) -> &'static str {
        match self {
            Side::Left => "LEFT",
            Side::Right => "RIGHT",
        }
    }
}

/// How hard a turn is. Ordered so that `Slight < Normal < Sharp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnDegree {
    Slight,
    Normal,
    Sharp,
}

/// One normalized step of a route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Maneuver {
    Turn { side: Side, degree: TurnDegree },
    UTurn { side: Side },
    Ramp { side: Side },
    Fork { side: Side },
    Keep { side: Side },
    Roundabout { side: Side },
    Merge,
    Straight,
    Depart,
    NameChange,
    Ferry,
    /// Signed bearing change in degrees, normalized to `(-180, 180]`.
    /// Positive is clockwise (to the right).
    Heading { change_deg: f64 },
    Unspecified,
}

impl Maneuver {
    /// Parses a provider maneuver code. Accepts both the Routes API style
    /// (`TURN_SLIGHT_LEFT`) and the legacy Directions style
    /// (`turn-slight-left`). Returns `None` for codes it does not know.
    pub fn from_code(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_uppercase().replace('-', "_");
        let (stem, side) = if let Some(stem) = code.strip_suffix("_LEFT") {
            (stem, Some(Side::Left))
        } else if let Some(stem) = code.strip_suffix("_RIGHT") {
            (stem, Some(Side::Right))
        } else {
            (code.as_str(), None)
        };

        let maneuver = match (stem, side) {
            ("TURN", Some(side)) => Maneuver::Turn {
                side,
                degree: TurnDegree::Normal,
            },
            ("TURN_SLIGHT", Some(side)) => Maneuver::Turn {
                side,
                degree: TurnDegree::Slight,
            },
            ("TURN_SHARP", Some(side)) => Maneuver::Turn {
                side,
                degree: TurnDegree::Sharp,
            },
            ("UTURN", Some(side)) => Maneuver::UTurn { side },
            ("RAMP", Some(side)) => Maneuver::Ramp { side },
            ("FORK", Some(side)) => Maneuver::Fork { side },
            ("KEEP", Some(side)) => Maneuver::Keep { side },
            ("ROUNDABOUT", Some(side)) => Maneuver::Roundabout { side },
            ("MERGE", None) => Maneuver::Merge,
            ("STRAIGHT", None) => Maneuver::Straight,
            ("DEPART", None) => Maneuver::Depart,
            ("NAME_CHANGE", None) => Maneuver::NameChange,
            ("FERRY", None) | ("FERRY_TRAIN", None) => Maneuver::Ferry,
            ("MANEUVER_UNSPECIFIED", None) => Maneuver::Unspecified,
            _ => return None,
        };
        Some(maneuver)
    }

    /// Parses free-form instruction text such as "Turn left onto Main St"
    /// or "Slight right toward I-95". Only the verb phrase before the
    /// destination ("onto", "toward", "on <street>") is read, so street
    /// names never change the maneuver. The side is the one attached to the
    /// verb ("Use the right lane to turn left" is a left turn).
    /// Unrecognized text is [`Maneuver::Unspecified`].
    pub fn from_instruction(text: &str) -> Self {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let head = verb_phrase(&words);
        let has = |w: &str| head.iter().any(|x| *x == w);
        let first_side = head.iter().find_map(|w| side_word(w));

        if has("uturn") || head.windows(2).any(|w| w == ["u", "turn"]) {
            return Maneuver::UTurn {
                side: first_side.unwrap_or(Side::Left),
            };
        }
        if has("roundabout") || has("rotary") || head.windows(2).any(|w| w == ["traffic", "circle"]) {
            return match first_side {
                Some(side) => Maneuver::Roundabout { side },
                None => Maneuver::Unspecified,
            };
        }
        if has("merge") {
            return Maneuver::Merge;
        }
        if has("ferry") {
            return Maneuver::Ferry;
        }

        let (verb, side, degree) = match verb_with_side(head) {
            Some(found) => found,
            None => match first_side {
                Some(side) => ("", side, None),
                None if has("head") || has("depart") => return Maneuver::Depart,
                None if has("continue") || has("straight") => return Maneuver::Straight,
                None => return Maneuver::Unspecified,
            },
        };

        match verb {
            "keep" | "stay" | "" if has("fork") => Maneuver::Fork { side },
            "keep" | "stay" | "exit" | "ramp" | "" if has("ramp") || has("exit") => {
                Maneuver::Ramp { side }
            }
            "keep" | "stay" => Maneuver::Keep { side },
            "fork" => Maneuver::Fork { side },
            "bear" => Maneuver::Turn {
                side,
                degree: TurnDegree::Slight,
            },
            "" if has("keep") || has("stay") => Maneuver::Keep { side },
            _ => Maneuver::Turn {
                side,
                degree: degree.unwrap_or(TurnDegree::Normal),
            },
        }
    }

    /// A heading change between consecutive route segments.
    pub fn from_heading(change_deg: f64) -> Self {
        if !change_deg.is_finite() {
            return Maneuver::Unspecified;
        }
        let mut d = change_deg % 360.0;
        if d > 180.0 {
            d -= 360.0;
        } else if d <= -180.0 {
            d += 360.0;
        }
        Maneuver::Heading { change_deg: d }
    }

    /// Canonical code, persisted as the raw direction data of a route.
    pub fn code(&self) -> String {
        match self {
            Maneuver::Turn { side, degree } => match degree {
                TurnDegree::Slight => format!("TURN_SLIGHT_{}", side.as_str()),
                TurnDegree::Normal => format!("TURN_{}", side.as_str()),
                TurnDegree::Sharp => format!("TURN_SHARP_{}", side.as_str()),
            },
            Maneuver::UTurn { side } => format!("UTURN_{}", side.as_str()),
            Maneuver::Ramp { side } => format!("RAMP_{}", side.as_str()),
            Maneuver::Fork { side } => format!("FORK_{}", side.as_str()),
            Maneuver::Keep { side } => format!("KEEP_{}", side.as_str()),
            Maneuver::Roundabout { side } => format!("ROUNDABOUT_{}", side.as_str()),
            Maneuver::Merge => "MERGE".into(),
            Maneuver::Straight => "STRAIGHT".into(),
            Maneuver::Depart => "DEPART".into(),
            Maneuver::NameChange => "NAME_CHANGE".into(),
            Maneuver::Ferry => "FERRY".into(),
            Maneuver::Heading { change_deg } => format!("HEADING_{change_deg:+.1}"),
            Maneuver::Unspecified => "MANEUVER_UNSPECIFIED".into(),
        }
    }
}

impl fmt::Display for Maneuver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

fn side_word(word: &str) -> Option<Side> {
    match word {
        "left" => Some(Side::Left),
        "right" => Some(Side::Right),
        _ => None,
    }
}

fn degree_word(word: &str) -> Option<TurnDegree> {
    match word {
        "slight" | "slightly" => Some(TurnDegree::Slight),
        "sharp" | "sharply" => Some(TurnDegree::Sharp),
        _ => None,
    }
}

/// Words up to the start of the destination: "onto", "toward", "via", or
/// "on" naming a street rather than a side ("on the right").
fn verb_phrase<'a>(words: &'a [&'a str]) -> &'a [&'a str] {
    let end = words
        .iter()
        .enumerate()
        .position(|(i, w)| match *w {
            "onto" | "toward" | "towards" | "via" => true,
            "on" => words.get(i + 1) != Some(&"the"),
            _ => false,
        })
        .unwrap_or(words.len());
    &words[..end]
}

/// First verb directly followed by a side, skipping degree words and
/// articles in between: "turn slightly left", "keep right", "slight right".
fn verb_with_side<'a>(head: &[&'a str]) -> Option<(&'a str, Side, Option<TurnDegree>)> {
    for (i, &verb) in head.iter().enumerate() {
        if !matches!(
            verb,
            "turn" | "keep" | "stay" | "bear" | "fork" | "exit" | "ramp" | "slight" | "slightly" | "sharp"
        ) {
            continue;
        }
        let mut degree = degree_word(verb);
        for next in &head[i + 1..] {
            if let Some(side) = side_word(next) {
                return Some((verb, side, degree));
            }
            match degree_word(next) {
                Some(d) => degree = Some(d),
                None if *next == "a" => {}
                None => break,
            }
        }
    }
    None
}

/// Normalizes one provider step. The maneuver code wins when it is known
/// and specific; otherwise the instruction text is parsed.
pub fn normalize_step(code: Option<&str>, instruction: Option<&str>) -> Maneuver {
    let from_code = code.and_then(Maneuver::from_code);
    match from_code {
        Some(m) if m != Maneuver::Unspecified => m,
        _ => instruction
            .map(Maneuver::from_instruction)
            .unwrap_or(Maneuver::Unspecified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code_routes_style() {
        assert_eq!(
            Maneuver::from_code("TURN_SHARP_LEFT"),
            Some(Maneuver::Turn {
                side: Side::Left,
                degree: TurnDegree::Sharp
            })
        );
        assert_eq!(
            Maneuver::from_code("ROUNDABOUT_RIGHT"),
            Some(Maneuver::Roundabout { side: Side::Right })
        );
        assert_eq!(Maneuver::from_code("FERRY_TRAIN"), Some(Maneuver::Ferry));
        assert_eq!(Maneuver::from_code("TELEPORT"), None);
    }

    #[test]
    fn test_from_code_legacy_style() {
        assert_eq!(
            Maneuver::from_code("turn-slight-right"),
            Some(Maneuver::Turn {
                side: Side::Right,
                degree: TurnDegree::Slight
            })
        );
        assert_eq!(
            Maneuver::from_code("keep-left"),
            Some(Maneuver::Keep { side: Side::Left })
        );
    }

    #[test]
    fn test_code_is_parseable_again() {
        let m = Maneuver::Turn {
            side: Side::Right,
            degree: TurnDegree::Sharp,
        };
        assert_eq!(Maneuver::from_code(&m.code()), Some(m));
    }

    #[test]
    fn test_from_instruction() {
        assert_eq!(
            Maneuver::from_instruction("Turn left onto Beacon St"),
            Maneuver::Turn {
                side: Side::Left,
                degree: TurnDegree::Normal
            }
        );
        assert_eq!(
            Maneuver::from_instruction("Slight right toward I-93 N"),
            Maneuver::Turn {
                side: Side::Right,
                degree: TurnDegree::Slight
            }
        );
        assert_eq!(
            Maneuver::from_instruction("Keep left at the fork"),
            Maneuver::Fork { side: Side::Left }
        );
        assert_eq!(
            Maneuver::from_instruction("Take the exit on the right"),
            Maneuver::Ramp { side: Side::Right }
        );
        assert_eq!(
            Maneuver::from_instruction("Make a U-turn"),
            Maneuver::UTurn { side: Side::Left }
        );
        assert_eq!(
            Maneuver::from_instruction("Merge onto I-90 W"),
            Maneuver::Merge
        );
        assert_eq!(
            Maneuver::from_instruction("Head north on Tremont St"),
            Maneuver::Depart
        );
        assert_eq!(
            Maneuver::from_instruction("Continue onto Cambridge St"),
            Maneuver::Straight
        );
        assert_eq!(
            Maneuver::from_instruction("Your destination"),
            Maneuver::Unspecified
        );
    }

    fn turn(side: Side, degree: TurnDegree) -> Maneuver {
        Maneuver::Turn { side, degree }
    }

    #[test]
    fn test_from_instruction_ignores_street_names() {
        assert_eq!(
            Maneuver::from_instruction("Turn left onto Ferry St"),
            turn(Side::Left, TurnDegree::Normal)
        );
        assert_eq!(
            Maneuver::from_instruction("Turn right onto Rotary Dr"),
            turn(Side::Right, TurnDegree::Normal)
        );
        assert_eq!(
            Maneuver::from_instruction("Turn right on Merge Ln"),
            turn(Side::Right, TurnDegree::Normal)
        );
        assert_eq!(
            Maneuver::from_instruction("Take the Boston ferry"),
            Maneuver::Ferry
        );
    }

    #[test]
    fn test_from_instruction_reads_side_from_verb() {
        assert_eq!(
            Maneuver::from_instruction("Turn right to stay on Washington St"),
            turn(Side::Right, TurnDegree::Normal)
        );
        assert_eq!(
            Maneuver::from_instruction("Use the right lane to turn left onto Storrow Dr"),
            turn(Side::Left, TurnDegree::Normal)
        );
        assert_eq!(
            Maneuver::from_instruction("Keep right to stay on I-93 N"),
            Maneuver::Keep { side: Side::Right }
        );
        assert_eq!(
            Maneuver::from_instruction("Bear left toward Main St"),
            turn(Side::Left, TurnDegree::Slight)
        );
    }

    #[test]
    fn test_from_instruction_degree_words() {
        assert_eq!(
            Maneuver::from_instruction("Turn slightly left onto Main St"),
            turn(Side::Left, TurnDegree::Slight)
        );
        assert_eq!(
            Maneuver::from_instruction("Sharp right onto Elm St"),
            turn(Side::Right, TurnDegree::Sharp)
        );
        assert_eq!(
            Maneuver::from_instruction("Turn sharply left"),
            turn(Side::Left, TurnDegree::Sharp)
        );
    }

    #[test]
    fn test_from_heading_wraps() {
        assert_eq!(
            Maneuver::from_heading(270.0),
            Maneuver::Heading { change_deg: -90.0 }
        );
        assert_eq!(
            Maneuver::from_heading(-200.0),
            Maneuver::Heading { change_deg: 160.0 }
        );
        assert_eq!(Maneuver::from_heading(f64::NAN), Maneuver::Unspecified);
    }

    #[test]
    fn test_normalize_step_prefers_specific_code() {
        assert_eq!(
            normalize_step(Some("TURN_RIGHT"), Some("Turn left")),
            Maneuver::Turn {
                side: Side::Right,
                degree: TurnDegree::Normal
            }
        );
        assert_eq!(
            normalize_step(Some("MANEUVER_UNSPECIFIED"), Some("Turn left")),
            Maneuver::Turn {
                side: Side::Left,
                degree: TurnDegree::Normal
            }
        );
        assert_eq!(normalize_step(None, None), Maneuver::Unspecified);
    }
}
