use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geo::{Contains, MultiPolygon, polygon};
use proptest::prelude::*;
use turn_sequence::error::ServiceError;
use turn_sequence::fetch::{Dispatcher, RetryPolicy, TokioSleeper};
use turn_sequence::grid::sample_polygon;
use turn_sequence::model::{BoundingBox, Coordinate};
use turn_sequence::services::{RoadSnapper, SnapResult};
use turn_sequence::snap::{FailurePolicy, SnapStage};
use turn_sequence::stats::{CityStatistics, TransitionCounts, transitions};
use turn_sequence::turns::{Maneuver, Side, Turn, TurnClassifier, TurnDegree, TurnLabel, TurnSequence};

fn turn_sequence() -> impl Strategy<Value = TurnSequence> {
    prop::collection::vec(prop::bool::ANY, 0..40).prop_map(|bits| {
        TurnSequence::new(
            bits.into_iter()
                .map(|left| if left { Turn::Left } else { Turn::Right })
                .collect(),
        )
    })
}

fn maneuver() -> impl Strategy<Value = Maneuver> {
    let side = prop_oneof![Just(Side::Left), Just(Side::Right)];
    let degree = prop_oneof![
        Just(TurnDegree::Slight),
        Just(TurnDegree::Normal),
        Just(TurnDegree::Sharp)
    ];
    prop_oneof![
        (side.clone(), degree).prop_map(|(side, degree)| Maneuver::Turn { side, degree }),
        side.clone().prop_map(|side| Maneuver::Fork { side }),
        side.prop_map(|side| Maneuver::Ramp { side }),
        Just(Maneuver::Merge),
        Just(Maneuver::Straight),
        (-720.0..720.0f64).prop_map(Maneuver::from_heading),
    ]
}

/// Drops points whose latitude falls in the lower third of the unit box.
struct ShoreSnapper;

#[async_trait]
impl RoadSnapper for ShoreSnapper {
    fn max_batch_size(&self) -> usize {
        7
    }

    async fn snap_batch(&self, coords: &[Coordinate]) -> Result<Vec<SnapResult>, ServiceError> {
        Ok(coords
            .iter()
            .map(|c| {
                if c.lat < 1.0 / 3.0 {
                    SnapResult::NoNearbyRoad
                } else {
                    SnapResult::Snapped(Coordinate::new((c.lat * 4.0).round() / 4.0, c.lon))
                }
            })
            .collect())
    }
}

proptest! {
    #[test]
    fn grid_points_lie_inside_box_and_polygon(
        lat_min in -60.0..60.0f64,
        lon_min in -170.0..170.0f64,
        height in 0.01..5.0f64,
        width in 0.01..5.0f64,
        g in 1i64..25,
    ) {
        let bbox = BoundingBox::new(lat_min, lat_min + height, lon_min, lon_min + width).unwrap();
        let triangle = MultiPolygon(vec![polygon![
            (x: lon_min, y: lat_min),
            (x: lon_min + width, y: lat_min),
            (x: lon_min, y: lat_min + height),
            (x: lon_min, y: lat_min),
        ]]);

        let points = sample_polygon(&bbox, &triangle, g).unwrap();

        prop_assert!(points.len() as i64 <= g * g);
        for p in &points {
            prop_assert!(bbox.contains(p.coord));
            prop_assert!(triangle.contains(&p.coord.to_point()));
        }
    }

    #[test]
    fn transitions_count_is_length_minus_one(seq in turn_sequence()) {
        let counts = TransitionCounts::from_sequence(&seq);
        if seq.len() >= 2 {
            prop_assert_eq!(transitions(&seq).len(), seq.len() - 1);
            prop_assert_eq!(counts.total(), seq.len() - 1);
            let f = counts.alternating_fraction().unwrap();
            prop_assert!((0.0..=1.0).contains(&f));
        } else {
            prop_assert!(transitions(&seq).is_empty());
            prop_assert_eq!(counts.alternating_fraction(), None);
        }
    }

    #[test]
    fn classification_is_deterministic_and_ordered(ms in prop::collection::vec(maneuver(), 0..30)) {
        let classifier = TurnClassifier::default();
        let first = classifier.extract(&ms);
        let second = classifier.extract(&ms);
        prop_assert_eq!(&first, &second);
        prop_assert!(first.len() <= ms.len());

        let expected: Vec<Turn> = ms
            .iter()
            .filter_map(|m| match classifier.classify(m) {
                TurnLabel::Left => Some(Turn::Left),
                TurnLabel::Right => Some(Turn::Right),
                TurnLabel::Other => None,
            })
            .collect();
        prop_assert_eq!(first.turns(), expected.as_slice());
    }

    #[test]
    fn city_statistics_are_bounded_and_pure(fractions in prop::collection::vec(0.0..=1.0f64, 1..60)) {
        let stats = CityStatistics::from_fractions(&fractions).unwrap();
        prop_assert_eq!(stats.routes, fractions.len());
        prop_assert!((0.0..=1.0).contains(&stats.mean));
        prop_assert!(stats.stddev >= 0.0);
        prop_assert!(stats.ci_lower <= stats.mean && stats.mean <= stats.ci_upper);
        prop_assert_eq!(CityStatistics::from_fractions(&fractions).unwrap(), stats);
    }

    #[test]
    fn snapping_yields_one_slot_per_point(g in 1i64..12) {
        let bbox = BoundingBox::new(0.0, 1.0, 0.0, 1.0).unwrap();
        let square = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ]]);
        let grid = sample_polygon(&bbox, &square, g).unwrap();
        let stage = SnapStage {
            snapper: Arc::new(ShoreSnapper),
            dispatcher: Arc::new(Dispatcher::new(3, None)),
            retry: RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                jitter: 0.0,
                call_timeout: Duration::from_secs(5),
            },
            sleeper: Arc::new(TokioSleeper),
            on_failure: FailurePolicy::Skip,
        };

        let rt = tokio::runtime::Runtime::new().unwrap();
        let report = rt.block_on(stage.run(&grid)).unwrap();

        prop_assert_eq!(report.slots.len(), grid.len());
        prop_assert_eq!(report.assignments.len(), grid.len());
        let mapped: usize = report.points.iter().map(|p| p.grid_indices.len()).sum();
        prop_assert_eq!(mapped + report.no_road() + report.failed(), grid.len());
    }
}
