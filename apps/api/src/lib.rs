pub mod config;
pub mod db;
pub mod enrichment;
pub mod errors;
pub mod imports;
pub mod libraries;
pub mod models;
pub mod pagination;
pub mod reconciliation;
pub mod routes;
pub mod state;
pub mod storage;
pub mod store;
pub mod telemetry;

#[cfg(test)]
mod testing;
