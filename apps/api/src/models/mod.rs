pub mod import;
pub mod library;
pub mod reconciliation;
pub mod vulnerability;
