use chrono::Utc;

use crate::analyzers::types::{PlaceReport, StatsReport};
use crate::stats::{CityStatistics, alternating_fraction};
use crate::storage::records::{StoredDirection, StoredPlace};

/// Fractions of the routes that have one, in input order.
fn fractions<'a>(directions: impl Iterator<Item = &'a StoredDirection>) -> Vec<f64> {
    directions
        .filter_map(|d| d.turns.as_ref())
        .filter_map(alternating_fraction)
        .collect()
}

/// Builds the report from stored tables.
///
/// Places appear in Places-table order; directions whose place has no row
/// there are reported after them under their bare id.
pub fn build_report(places: &[StoredPlace], directions: &[StoredDirection]) -> StatsReport {
    let mut ids: Vec<(&str, Option<&StoredPlace>)> =
        places.iter().map(|p| (p.id.as_str(), Some(p))).collect();
    for d in directions {
        if !ids.iter().any(|(id, _)| *id == d.place_id) {
            ids.push((d.place_id.as_str(), None));
        }
    }
    // A place analyzed in several runs has several rows; report it once.
    let mut seen = std::collections::HashSet::new();
    ids.retain(|(id, _)| seen.insert(*id));

    let reports = ids
        .into_iter()
        .map(|(id, place)| {
            let of_place = || directions.iter().filter(move |d| d.place_id == id);
            PlaceReport {
                place_id: id.to_string(),
                display_name: place.map(|p| p.display_name.clone()).unwrap_or_else(|| id.to_string()),
                granularity: place.map(|p| p.granularity),
                routes: of_place().count(),
                routes_found: of_place().filter(|d| d.turns.is_some()).count(),
                statistics: CityStatistics::from_fractions(&fractions(of_place())),
            }
        })
        .collect();

    StatsReport {
        generated_at: Utc::now(),
        places: reports,
        total: CityStatistics::from_fractions(&fractions(directions.iter())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turns::TurnSequence;

    fn direction(place: &str, letters: Option<&str>) -> StoredDirection {
        StoredDirection {
            place_id: place.into(),
            status: if letters.is_some() { "found" } else { "not_found" }.into(),
            turns: letters.map(|l| TurnSequence::from_letters(l).unwrap()),
        }
    }

    fn place(id: &str) -> StoredPlace {
        StoredPlace {
            id: id.into(),
            name: id.into(),
            display_name: format!("{id} display"),
            granularity: 4,
        }
    }

    #[test]
    fn test_per_place_and_total() {
        let places = vec![place("a"), place("b")];
        let directions = vec![
            direction("a", Some("LRLR")),
            direction("a", Some("LL")),
            direction("a", Some("L")),
            direction("b", Some("LRR")),
            direction("b", None),
            direction("c", Some("RL")),
        ];

        let report = build_report(&places, &directions);

        assert_eq!(report.places.len(), 3);
        let a = &report.places[0];
        assert_eq!(a.routes, 3);
        let stats = a.statistics.as_ref().unwrap();
        assert_eq!(stats.routes, 2);
        assert!((stats.mean - 0.5).abs() < 1e-12);

        let b = &report.places[1];
        assert_eq!(b.routes, 2);
        assert_eq!(b.routes_found, 1);
        assert_eq!(b.statistics.as_ref().unwrap().routes, 1);

        let c = &report.places[2];
        assert_eq!(c.display_name, "c");
        assert_eq!(c.granularity, None);

        let total = report.total.unwrap();
        assert_eq!(total.routes, 4);
        assert!((total.mean - (1.0 + 0.0 + 0.5 + 1.0) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_duplicate_place_rows_reported_once() {
        let report = build_report(&[place("a"), place("a")], &[]);
        assert_eq!(report.places.len(), 1);
        assert!(report.places[0].statistics.is_none());
        assert!(report.total.is_none());
    }
}
