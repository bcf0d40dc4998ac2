// Matcher and reconciliation state machine.
// Synchronous path: map_import → match_row. Background path: fuzzy_reconcile.
// Terminal transitions happen only in resolve.

pub mod fuzzy;
pub mod handlers;
pub mod matcher;
pub mod resolve;
pub mod scoring;
