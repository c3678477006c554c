//! Conversion between pipeline results and table rows.

use std::collections::VecDeque;

use tracing::{debug, info};

use super::{Row, Schema, Table, TableData, TabularStore};
use crate::error::StorageError;
use crate::model::boundary_to_geojson;
use crate::pipeline::{PlaceRun, RouteAnalysis};
use crate::snap::SnapSlot;
use crate::stats::transitions;
use crate::turns::TurnSequence;

fn place_row(run: &PlaceRun) -> Row {
    let p = &run.place;
    vec![
        p.id.clone(),
        p.name.clone(),
        p.display_name.clone(),
        p.bbox.lat_min.to_string(),
        p.bbox.lat_max.to_string(),
        p.bbox.lon_min.to_string(),
        p.bbox.lon_max.to_string(),
        p.granularity.to_string(),
        boundary_to_geojson(&p.boundary),
    ]
}

/// One row per sampled grid point, including the dropped ones.
fn point_rows(run: &PlaceRun) -> Vec<Row> {
    run.grid
        .iter()
        .zip(&run.snap.slots)
        .zip(&run.snap.assignments)
        .map(|((gp, slot), assignment)| {
            let (lat, lon) = match slot {
                SnapSlot::Snapped(c) => (c.lat.to_string(), c.lon.to_string()),
                _ => (String::new(), String::new()),
            };
            vec![
                run.place.id.clone(),
                gp.index.to_string(),
                gp.coord.lat.to_string(),
                gp.coord.lon.to_string(),
                assignment.map(|id| id.to_string()).unwrap_or_default(),
                lat,
                lon,
                slot.status().to_string(),
            ]
        })
        .collect()
}

fn direction_row(place_id: &str, route: &RouteAnalysis) -> Row {
    let maneuvers = route
        .outcome
        .maneuvers()
        .map(|m| m.iter().map(|m| m.code()).collect::<Vec<_>>().join(" "))
        .unwrap_or_default();
    let turns = route.turns.as_ref().map(|t| t.to_string()).unwrap_or_default();
    let pairs = route
        .turns
        .as_ref()
        .map(|t| {
            transitions(t)
                .iter()
                .map(|t| t.code())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    vec![
        place_id.to_string(),
        route.pair.origin.to_string(),
        route.pair.destination.to_string(),
        route.outcome.status().to_string(),
        maneuvers,
        turns,
        pairs,
        route.fraction.map(|f| f.to_string()).unwrap_or_default(),
    ]
}

/// Table writes for one run that have not reached the store yet.
///
/// Tables are written in order and a batch is only dropped once its write
/// succeeded, so calling [`flush`](Self::flush) again after a failure
/// resumes where it stopped without duplicating rows.
#[derive(Debug, Clone)]
pub struct PendingWrites {
    batches: VecDeque<(Table, Vec<String>, Vec<Row>)>,
}

impl PendingWrites {
    pub fn for_run(schema: &Schema, run: &PlaceRun) -> Self {
        let directions = run
            .routes
            .iter()
            .map(|r| direction_row(&run.place.id, r))
            .collect();
        let batches = VecDeque::from([
            (Table::Places, schema.places.header(), vec![place_row(run)]),
            (Table::Points, schema.points.header(), point_rows(run)),
            (Table::Directions, schema.directions.header(), directions),
        ]);
        Self { batches }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn flush(&mut self, store: &dyn TabularStore) -> Result<(), StorageError> {
        while let Some((table, header, rows)) = self.batches.front() {
            store.append_rows(*table, header, rows)?;
            debug!(%table, rows = rows.len(), "Table written");
            self.batches.pop_front();
        }
        info!("Run persisted");
        Ok(())
    }
}

/// A place as read back from the Places table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPlace {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub granularity: i64,
}

/// A route as read back from the Directions table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDirection {
    pub place_id: String,
    pub status: String,
    /// `None` for routes that were not found.
    pub turns: Option<TurnSequence>,
}

fn cell<'a>(data: &'a TableData, row: &'a Row, table: Table, column: &str) -> Result<&'a str, StorageError> {
    let i = data.column(table, column)?;
    Ok(row.get(i).map(String::as_str).unwrap_or_default())
}

fn invalid(table: Table, column: &str, value: &str) -> StorageError {
    StorageError::InvalidValue {
        table: table.to_string(),
        column: column.to_string(),
        value: value.to_string(),
    }
}

pub fn read_places(store: &dyn TabularStore, schema: &Schema) -> Result<Vec<StoredPlace>, StorageError> {
    let cols = &schema.places;
    let data = store.read_table(Table::Places)?;
    data.rows
        .iter()
        .map(|row| {
            let granularity = cell(&data, row, Table::Places, &cols.granularity)?;
            Ok(StoredPlace {
                id: cell(&data, row, Table::Places, &cols.id)?.to_string(),
                name: cell(&data, row, Table::Places, &cols.name)?.to_string(),
                display_name: cell(&data, row, Table::Places, &cols.display_name)?.to_string(),
                granularity: granularity
                    .parse()
                    .map_err(|_| invalid(Table::Places, &cols.granularity, granularity))?,
            })
        })
        .collect()
}

/// Reads the Directions table. Only the L/R sequence column is parsed; the
/// stored fraction is ignored and recomputed by consumers.
pub fn read_directions(store: &dyn TabularStore, schema: &Schema) -> Result<Vec<StoredDirection>, StorageError> {
    let cols = &schema.directions;
    let data = store.read_table(Table::Directions)?;
    data.rows
        .iter()
        .map(|row| {
            let status = cell(&data, row, Table::Directions, &cols.status)?.to_string();
            let letters = cell(&data, row, Table::Directions, &cols.turns)?;
            let turns = if status == "found" {
                Some(
                    TurnSequence::from_letters(letters)
                        .map_err(|_| invalid(Table::Directions, &cols.turns, letters))?,
                )
            } else {
                None
            };
            Ok(StoredDirection {
                place_id: cell(&data, row, Table::Directions, &cols.place_id)?.to_string(),
                status,
                turns,
            })
        })
        .collect()
}
