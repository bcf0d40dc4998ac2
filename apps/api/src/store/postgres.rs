use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::import::{Import, ImportRow, ImportStatus, RowPayload, RowUpdate};
use crate::models::library::{Library, LibraryAttributes};
use crate::models::reconciliation::{
    NewReconciliationItem, ReconciliationItem, ReconciliationStatus,
};
use crate::models::vulnerability::{FeedVulnerability, Vulnerability};
use crate::store::{CatalogStore, NewImport};

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escapes LIKE metacharacters so the fragment matches literally.
fn escape_like(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn insert_import(&self, new: NewImport<'_>) -> Result<Import, AppError> {
        Ok(sqlx::query_as::<_, Import>(
            r#"
            INSERT INTO imports (id, filename, uploaded_by, rows_count, storage_key, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.filename)
        .bind(new.uploaded_by)
        .bind(new.rows_count)
        .bind(new.storage_key)
        .bind(ImportStatus::Pending)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_import(&self, id: Uuid) -> Result<Option<Import>, AppError> {
        Ok(
            sqlx::query_as::<_, Import>("SELECT * FROM imports WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn set_import_status(&self, id: Uuid, status: ImportStatus) -> Result<(), AppError> {
        sqlx::query("UPDATE imports SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_import_row(
        &self,
        import_id: Uuid,
        source_id: &str,
        raw: &RowPayload,
    ) -> Result<ImportRow, AppError> {
        Ok(sqlx::query_as::<_, ImportRow>(
            r#"
            INSERT INTO import_rows (id, import_id, source_id, raw_json, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(import_id)
        .bind(source_id)
        .bind(Json(raw))
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_import_row(&self, id: Uuid) -> Result<Option<ImportRow>, AppError> {
        Ok(
            sqlx::query_as::<_, ImportRow>("SELECT * FROM import_rows WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn list_import_rows(
        &self,
        import_id: Uuid,
        limit: Option<i64>,
        offset: i64,
    ) -> Result<Vec<ImportRow>, AppError> {
        Ok(sqlx::query_as::<_, ImportRow>(
            "SELECT * FROM import_rows WHERE import_id = $1 ORDER BY seq LIMIT $2 OFFSET $3",
        )
        .bind(import_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_import_rows(&self, import_id: Uuid) -> Result<i64, AppError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM import_rows WHERE import_id = $1")
                .bind(import_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn update_import_row(&self, id: Uuid, update: RowUpdate) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE import_rows
            SET mapped_library_id = COALESCE($2, mapped_library_id),
                status = COALESCE($3, status),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(update.mapped_library_id)
        .bind(update.status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_row_payload(&self, id: Uuid, raw: &RowPayload) -> Result<(), AppError> {
        sqlx::query("UPDATE import_rows SET raw_json = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(raw))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_library(&self, name: &str, version: &str) -> Result<Option<Library>, AppError> {
        Ok(sqlx::query_as::<_, Library>(
            "SELECT * FROM libraries WHERE name = $1 AND version = $2 AND deleted_at IS NULL",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_library(&self, id: Uuid) -> Result<Option<Library>, AppError> {
        Ok(sqlx::query_as::<_, Library>(
            "SELECT * FROM libraries WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn search_libraries(
        &self,
        fragment: &str,
        limit: i64,
    ) -> Result<Vec<Library>, AppError> {
        Ok(sqlx::query_as::<_, Library>(
            r#"
            SELECT * FROM libraries
            WHERE name ILIKE '%' || $1 || '%' AND deleted_at IS NULL
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(escape_like(fragment))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_library(&self, attrs: &LibraryAttributes) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO libraries
                (id, name, version, purl, license_declared, license_detected, owner, environment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id)
        .bind(attrs.name_or_empty())
        .bind(attrs.version_or_empty())
        .bind(&attrs.purl)
        .bind(&attrs.license_declared)
        .bind(&attrs.license_detected)
        .bind(&attrs.owner)
        .bind(&attrs.environment)
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    async fn update_vulnerability_count(&self, id: Uuid, count: i32) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE libraries SET vulnerability_count = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete_library(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE libraries SET deleted_at = NOW(), updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_vulnerabilities(&self, library_id: Uuid) -> Result<Vec<Vulnerability>, AppError> {
        Ok(sqlx::query_as::<_, Vulnerability>(
            "SELECT * FROM vulnerabilities WHERE library_id = $1 ORDER BY published_date DESC NULLS LAST",
        )
        .bind(library_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_vulnerability(
        &self,
        library_id: Uuid,
        vuln: &FeedVulnerability,
    ) -> Result<Option<Uuid>, AppError> {
        Ok(sqlx::query_scalar(
            r#"
            INSERT INTO vulnerabilities
                (id, library_id, cve_id, severity, description, published_date, fixed_in)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (library_id, cve_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(library_id)
        .bind(&vuln.cve_id)
        .bind(vuln.severity)
        .bind(&vuln.description)
        .bind(vuln.published_date)
        .bind(&vuln.fixed_in)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_reconciliation_item(
        &self,
        new: NewReconciliationItem,
    ) -> Result<ReconciliationItem, AppError> {
        Ok(sqlx::query_as::<_, ReconciliationItem>(
            r#"
            INSERT INTO reconciliation_items
                (id, import_row_id, suggested_lib_name, suggested_version,
                 detected_license, status, confidence)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.import_row_id)
        .bind(new.suggested_lib_name)
        .bind(new.suggested_version)
        .bind(new.detected_license)
        .bind(ReconciliationStatus::Pending)
        .bind(new.confidence)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn get_reconciliation_item(
        &self,
        id: Uuid,
    ) -> Result<Option<ReconciliationItem>, AppError> {
        Ok(sqlx::query_as::<_, ReconciliationItem>(
            "SELECT * FROM reconciliation_items WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_reconciliation_items(
        &self,
        status: Option<ReconciliationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReconciliationItem>, AppError> {
        Ok(sqlx::query_as::<_, ReconciliationItem>(
            r#"
            SELECT * FROM reconciliation_items
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn count_reconciliation_items(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT COUNT(*) FROM reconciliation_items WHERE ($1::text IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn set_reconciliation_status(
        &self,
        id: Uuid,
        status: ReconciliationStatus,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE reconciliation_items SET status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(status)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
