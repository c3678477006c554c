//! Reporting over persisted directions.
//!
//! Statistics are recomputed from the stored L/R sequences rather than from
//! the stored fractions, per place and over all places together.

pub mod aggregate;
pub mod types;
pub mod utility;
