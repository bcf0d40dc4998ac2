//! Relational store seam. All coordination between the request path and the
//! background workers happens through this trait and the job queue.
//!
//! `PgCatalogStore` is the production backend; tests run against `MemoryCatalogStore`.

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::import::{Import, ImportRow, ImportStatus, RowPayload, RowUpdate};
use crate::models::library::{Library, LibraryAttributes};
use crate::models::reconciliation::{
    NewReconciliationItem, ReconciliationItem, ReconciliationStatus,
};
use crate::models::vulnerability::{FeedVulnerability, Vulnerability};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryCatalogStore;
pub use postgres::PgCatalogStore;

/// Insert parameters for a new import. Imports always start `pending`.
#[derive(Debug, Clone)]
pub struct NewImport<'a> {
    pub filename: &'a str,
    pub uploaded_by: Option<Uuid>,
    pub rows_count: i32,
    pub storage_key: &'a str,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    // Imports

    async fn insert_import(&self, new: NewImport<'_>) -> Result<Import, AppError>;
    async fn get_import(&self, id: Uuid) -> Result<Option<Import>, AppError>;
    async fn set_import_status(&self, id: Uuid, status: ImportStatus) -> Result<(), AppError>;

    async fn insert_import_row(
        &self,
        import_id: Uuid,
        source_id: &str,
        raw: &RowPayload,
    ) -> Result<ImportRow, AppError>;
    async fn get_import_row(&self, id: Uuid) -> Result<Option<ImportRow>, AppError>;
    /// Rows of an import in insertion order. `limit = None` returns all of them.
    async fn list_import_rows(
        &self,
        import_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<ImportRow>, AppError>;
    async fn count_import_rows(&self, import_id: Uuid) -> Result<i64, AppError>;
    async fn update_import_row(&self, id: Uuid, update: RowUpdate) -> Result<(), AppError>;
    async fn set_row_payload(&self, id: Uuid, raw: &RowPayload) -> Result<(), AppError>;

    // Libraries. Every lookup excludes soft-deleted rows.

    async fn find_library(&self, name: &str, version: &str) -> Result<Option<Library>, AppError>;
    async fn get_library(&self, id: Uuid) -> Result<Option<Library>, AppError>;
    /// Case-insensitive substring match on name.
    async fn search_libraries(&self, fragment: &str, limit: i64)
        -> Result<Vec<Library>, AppError>;
    async fn insert_library(&self, attrs: &LibraryAttributes) -> Result<Uuid, AppError>;
    async fn update_vulnerability_count(&self, id: Uuid, count: i32) -> Result<(), AppError>;
    /// Returns false when the library does not exist or is already deleted.
    async fn soft_delete_library(&self, id: Uuid) -> Result<bool, AppError>;

    // Vulnerabilities

    async fn list_vulnerabilities(&self, library_id: Uuid) -> Result<Vec<Vulnerability>, AppError>;
    /// Insert-if-absent on (library_id, cve_id). `None` when the CVE is already stored.
    async fn insert_vulnerability(
        &self,
        library_id: Uuid,
        vuln: &FeedVulnerability,
    ) -> Result<Option<Uuid>, AppError>;

    // Reconciliation

    async fn insert_reconciliation_item(
        &self,
        new: NewReconciliationItem,
    ) -> Result<ReconciliationItem, AppError>;
    async fn get_reconciliation_item(
        &self,
        id: Uuid,
    ) -> Result<Option<ReconciliationItem>, AppError>;
    async fn list_reconciliation_items(
        &self,
        status: Option<ReconciliationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReconciliationItem>, AppError>;
    async fn count_reconciliation_items(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<i64, AppError>;
    async fn set_reconciliation_status(
        &self,
        id: Uuid,
        status: ReconciliationStatus,
    ) -> Result<(), AppError>;
}
