pub mod analyzers;
pub mod config;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod infra;
pub mod model;
pub mod pipeline;
pub mod routes;
pub mod services;
pub mod snap;
pub mod stats;
pub mod storage;
pub mod turns;
