//! In-process `CatalogStore` used by unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::import::{Import, ImportRow, ImportStatus, RowPayload, RowStatus, RowUpdate};
use crate::models::library::{Library, LibraryAttributes};
use crate::models::reconciliation::{
    NewReconciliationItem, ReconciliationItem, ReconciliationStatus,
};
use crate::models::vulnerability::{FeedVulnerability, Vulnerability};
use crate::store::{CatalogStore, NewImport};

#[derive(Default)]
struct Tables {
    imports: Vec<Import>,
    rows: Vec<ImportRow>,
    libraries: Vec<Library>,
    vulnerabilities: Vec<Vulnerability>,
    items: Vec<ReconciliationItem>,
}

#[derive(Default)]
pub struct MemoryCatalogStore {
    tables: Mutex<Tables>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All libraries, soft-deleted ones included.
    pub fn all_libraries(&self) -> Vec<Library> {
        self.tables.lock().unwrap().libraries.clone()
    }

    pub fn all_items(&self) -> Vec<ReconciliationItem> {
        self.tables.lock().unwrap().items.clone()
    }

    pub fn all_vulnerabilities(&self) -> Vec<Vulnerability> {
        self.tables.lock().unwrap().vulnerabilities.clone()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn insert_import(&self, new: NewImport<'_>) -> Result<Import, AppError> {
        let now = Utc::now();
        let import = Import {
            id: Uuid::new_v4(),
            filename: new.filename.to_string(),
            uploaded_by: new.uploaded_by,
            rows_count: new.rows_count,
            storage_key: new.storage_key.to_string(),
            status: ImportStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().imports.push(import.clone());
        Ok(import)
    }

    async fn get_import(&self, id: Uuid) -> Result<Option<Import>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.imports.iter().find(|i| i.id == id).cloned())
    }

    async fn set_import_status(&self, id: Uuid, status: ImportStatus) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(import) = tables.imports.iter_mut().find(|i| i.id == id) {
            import.status = status;
            import.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_import_row(
        &self,
        import_id: Uuid,
        source_id: &str,
        raw: &RowPayload,
    ) -> Result<ImportRow, AppError> {
        let now = Utc::now();
        let row = ImportRow {
            id: Uuid::new_v4(),
            import_id,
            source_id: source_id.to_string(),
            raw_json: Json(raw.clone()),
            mapped_library_id: None,
            status: RowStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().rows.push(row.clone());
        Ok(row)
    }

    async fn get_import_row(&self, id: Uuid) -> Result<Option<ImportRow>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.rows.iter().find(|r| r.id == id).cloned())
    }

    async fn list_import_rows(
        &self,
        import_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<ImportRow>, AppError> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .rows
            .iter()
            .filter(|r| r.import_id == import_id)
            .skip(offset.max(0) as usize);
        Ok(match limit {
            Some(limit) => rows.take(limit.max(0) as usize).cloned().collect(),
            None => rows.cloned().collect(),
        })
    }

    async fn count_import_rows(&self, import_id: Uuid) -> Result<i64, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.rows.iter().filter(|r| r.import_id == import_id).count() as i64)
    }

    async fn update_import_row(&self, id: Uuid, update: RowUpdate) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables.rows.iter_mut().find(|r| r.id == id) {
            if let Some(library_id) = update.mapped_library_id {
                row.mapped_library_id = Some(library_id);
            }
            if let Some(status) = update.status {
                row.status = status;
            }
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_row_payload(&self, id: Uuid, raw: &RowPayload) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(row) = tables.rows.iter_mut().find(|r| r.id == id) {
            row.raw_json = Json(raw.clone());
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_library(&self, name: &str, version: &str) -> Result<Option<Library>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .libraries
            .iter()
            .find(|l| l.deleted_at.is_none() && l.name == name && l.version == version)
            .cloned())
    }

    async fn get_library(&self, id: Uuid) -> Result<Option<Library>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .libraries
            .iter()
            .find(|l| l.id == id && l.deleted_at.is_none())
            .cloned())
    }

    async fn search_libraries(
        &self,
        fragment: &str,
        limit: i64,
    ) -> Result<Vec<Library>, AppError> {
        let needle = fragment.to_lowercase();
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .libraries
            .iter()
            .filter(|l| l.deleted_at.is_none() && l.name.to_lowercase().contains(&needle))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_library(&self, attrs: &LibraryAttributes) -> Result<Uuid, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let (name, version) = (attrs.name_or_empty(), attrs.version_or_empty());
        let duplicate = tables
            .libraries
            .iter()
            .any(|l| l.deleted_at.is_none() && l.name == name && l.version == version);
        if duplicate {
            return Err(AppError::Database(sqlx::Error::Protocol(format!(
                "duplicate key: library {name}@{version} already exists"
            ))));
        }
        let now = Utc::now();
        let id = Uuid::new_v4();
        tables.libraries.push(Library {
            id,
            name: name.to_string(),
            version: version.to_string(),
            purl: attrs.purl.clone(),
            license_declared: attrs.license_declared.clone(),
            license_detected: attrs.license_detected.clone(),
            vulnerability_count: 0,
            owner: attrs.owner.clone(),
            environment: attrs.environment.clone(),
            deleted_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn update_vulnerability_count(&self, id: Uuid, count: i32) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(library) = tables.libraries.iter_mut().find(|l| l.id == id) {
            library.vulnerability_count = count;
        }
        Ok(())
    }

    async fn soft_delete_library(&self, id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().unwrap();
        match tables
            .libraries
            .iter_mut()
            .find(|l| l.id == id && l.deleted_at.is_none())
        {
            Some(library) => {
                library.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_vulnerabilities(&self, library_id: Uuid) -> Result<Vec<Vulnerability>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .vulnerabilities
            .iter()
            .filter(|v| v.library_id == library_id)
            .cloned()
            .collect())
    }

    async fn insert_vulnerability(
        &self,
        library_id: Uuid,
        vuln: &FeedVulnerability,
    ) -> Result<Option<Uuid>, AppError> {
        let mut tables = self.tables.lock().unwrap();
        if tables
            .vulnerabilities
            .iter()
            .any(|v| v.library_id == library_id && v.cve_id == vuln.cve_id)
        {
            return Ok(None);
        }
        let id = Uuid::new_v4();
        tables.vulnerabilities.push(Vulnerability {
            id,
            library_id,
            cve_id: vuln.cve_id.clone(),
            severity: vuln.severity,
            description: vuln.description.clone(),
            published_date: vuln.published_date,
            fixed_in: vuln.fixed_in.clone(),
            created_at: Utc::now(),
        });
        Ok(Some(id))
    }

    async fn insert_reconciliation_item(
        &self,
        new: NewReconciliationItem,
    ) -> Result<ReconciliationItem, AppError> {
        let now = Utc::now();
        let item = ReconciliationItem {
            id: Uuid::new_v4(),
            import_row_id: new.import_row_id,
            suggested_lib_name: new.suggested_lib_name,
            suggested_version: new.suggested_version,
            detected_license: new.detected_license,
            status: ReconciliationStatus::Pending,
            confidence: new.confidence,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().unwrap().items.push(item.clone());
        Ok(item)
    }

    async fn get_reconciliation_item(
        &self,
        id: Uuid,
    ) -> Result<Option<ReconciliationItem>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.items.iter().find(|i| i.id == id).cloned())
    }

    async fn list_reconciliation_items(
        &self,
        status: Option<ReconciliationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReconciliationItem>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .items
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_reconciliation_items(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<i64, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .items
            .iter()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .count() as i64)
    }

    async fn set_reconciliation_status(
        &self,
        id: Uuid,
        status: ReconciliationStatus,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(item) = tables.items.iter_mut().find(|i| i.id == id) {
            item.status = status;
            item.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::vulns::tests::finding;
    use crate::testing::attrs;

    #[tokio::test]
    async fn test_vulnerability_insert_skips_stored_cve() {
        let store = MemoryCatalogStore::new();
        let a = store.insert_library(&attrs("lodash", "4.17.20")).await.unwrap();
        let b = store.insert_library(&attrs("lodash", "4.17.21")).await.unwrap();

        assert!(store
            .insert_vulnerability(a, &finding("CVE-1", "NVD"))
            .await
            .unwrap()
            .is_some());
        assert_eq!(
            store
                .insert_vulnerability(a, &finding("CVE-1", "GitHub"))
                .await
                .unwrap(),
            None
        );
        // Same CVE on another library is a separate row.
        assert!(store
            .insert_vulnerability(b, &finding("CVE-1", "NVD"))
            .await
            .unwrap()
            .is_some());

        let rows = store.all_vulnerabilities();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].description.as_deref(), Some("CVE-1 from NVD"));
    }
}
