//! PostgreSQL durable tier.
//!
//! Enable with the `postgres` feature flag.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{PgPool, Row};

use super::PluginStore;
use crate::error::{PluginError, PluginResult, StorageResultExt};
use crate::manifest::{CodePayload, PluginData};
use crate::record::{NewPluginRecord, PluginId, PluginPatch, PluginRecord, PluginStatus};

/// Descriptive fields stored as one JSONB column; hot fields (`key_name`,
/// `hook`, `status`) get their own columns so the exclusivity update and the
/// status probe stay single-statement.
#[derive(Serialize, Deserialize)]
struct RecordMeta {
    name: String,
    version: String,
    author: String,
    description: String,
    readme: String,
    logo: String,
    plugin_json: Value,
}

pub struct PostgresStore {
    pool: Arc<PgPool>,
    table_name: String,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    pub fn with_pool(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            table_name: "plugin_info".to_string(),
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                id BIGSERIAL PRIMARY KEY,
                key_name VARCHAR(255) NOT NULL UNIQUE,
                hook VARCHAR(255),
                status SMALLINT NOT NULL DEFAULT 1,
                config JSONB NOT NULL DEFAULT 'null'::jsonb,
                content JSONB NOT NULL,
                ts_content JSONB NOT NULL,
                meta JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_hook_status ON {t} (hook, status);
            "#,
            t = self.table_name
        );
        sqlx::query(&query).execute(&*self.pool).await?;
        Ok(())
    }

    fn row_to_record(&self, row: &sqlx::postgres::PgRow) -> PluginResult<PluginRecord> {
        let status_raw: i16 = row.get("status");
        let status = PluginStatus::try_from(status_raw as u8)
            .map_err(|message| PluginError::Storage { message })?;
        let content: Value = row.get("content");
        let ts_content: Value = row.get("ts_content");
        let meta_raw: Value = row.get("meta");
        let meta: RecordMeta = serde_json::from_value(meta_raw)?;
        let content: CodePayload = serde_json::from_value(content)?;
        let ts_content: CodePayload = serde_json::from_value(ts_content)?;
        let created_at: DateTime<Utc> = row.get("created_at");
        let updated_at: DateTime<Utc> = row.get("updated_at");
        Ok(PluginRecord {
            id: row.get("id"),
            key_name: row.get("key_name"),
            name: meta.name,
            version: meta.version,
            author: meta.author,
            description: meta.description,
            hook: row.get("hook"),
            status,
            readme: meta.readme,
            logo: meta.logo,
            content,
            ts_content,
            config: row.get("config"),
            plugin_json: meta.plugin_json,
            created_at,
            updated_at,
        })
    }

    fn meta_value(record: &NewPluginRecord) -> PluginResult<Value> {
        Ok(serde_json::to_value(RecordMeta {
            name: record.name.clone(),
            version: record.version.clone(),
            author: record.author.clone(),
            description: record.description.clone(),
            readme: record.readme.clone(),
            logo: record.logo.clone(),
            plugin_json: record.plugin_json.clone(),
        })?)
    }
}

#[async_trait]
impl PluginStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn insert(&self, record: NewPluginRecord) -> PluginResult<PluginId> {
        let meta = Self::meta_value(&record)?;
        let query = format!(
            r#"
            INSERT INTO {} (key_name, hook, status, config, content, ts_content, meta)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
            self.table_name
        );
        let row = sqlx::query(&query)
            .bind(&record.key_name)
            .bind(&record.hook)
            .bind(u8::from(record.status) as i16)
            .bind(&record.config)
            .bind(serde_json::to_value(&record.content)?)
            .bind(serde_json::to_value(&record.ts_content)?)
            .bind(&meta)
            .fetch_one(&*self.pool)
            .await
            .storage_err()?;
        Ok(row.get("id"))
    }

    async fn reinstall(&self, id: PluginId, record: NewPluginRecord) -> PluginResult<()> {
        let meta = Self::meta_value(&record)?;
        let query = format!(
            r#"
            UPDATE {} SET
                key_name = $2,
                hook = $3,
                status = $4,
                config = $5,
                content = $6,
                ts_content = $7,
                meta = $8,
                updated_at = NOW()
            WHERE id = $1
            "#,
            self.table_name
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(&record.key_name)
            .bind(&record.hook)
            .bind(u8::from(record.status) as i16)
            .bind(&record.config)
            .bind(serde_json::to_value(&record.content)?)
            .bind(serde_json::to_value(&record.ts_content)?)
            .bind(&meta)
            .execute(&*self.pool)
            .await
            .storage_err()?;
        if result.rows_affected() == 0 {
            return Err(PluginError::Storage {
                message: format!("plugin record {} not found", id),
            });
        }
        Ok(())
    }

    async fn update(&self, id: PluginId, patch: PluginPatch) -> PluginResult<()> {
        let query = format!(
            r#"
            UPDATE {} SET
                status = COALESCE($2, status),
                config = COALESCE($3, config),
                updated_at = NOW()
            WHERE id = $1
            "#,
            self.table_name
        );
        let result = sqlx::query(&query)
            .bind(id)
            .bind(patch.status.map(|s| u8::from(s) as i16))
            .bind(patch.config)
            .execute(&*self.pool)
            .await
            .storage_err()?;
        if result.rows_affected() == 0 {
            return Err(PluginError::Storage {
                message: format!("plugin record {} not found", id),
            });
        }
        Ok(())
    }

    async fn find_by_key(&self, key: &str) -> PluginResult<Option<PluginRecord>> {
        let query = format!("SELECT * FROM {} WHERE key_name = $1", self.table_name);
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .storage_err()?;
        row.map(|r| self.row_to_record(&r)).transpose()
    }

    async fn find_by_id(&self, id: PluginId) -> PluginResult<Option<PluginRecord>> {
        let query = format!("SELECT * FROM {} WHERE id = $1", self.table_name);
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .storage_err()?;
        row.map(|r| self.row_to_record(&r)).transpose()
    }

    async fn find_by_ids(&self, ids: &[PluginId]) -> PluginResult<Vec<PluginRecord>> {
        let query = format!("SELECT * FROM {} WHERE id = ANY($1)", self.table_name);
        let rows = sqlx::query(&query)
            .bind(ids.to_vec())
            .fetch_all(&*self.pool)
            .await
            .storage_err()?;
        rows.iter().map(|r| self.row_to_record(r)).collect()
    }

    async fn list_enabled(&self) -> PluginResult<Vec<PluginRecord>> {
        let query = format!("SELECT * FROM {} WHERE status = 1", self.table_name);
        let rows = sqlx::query(&query)
            .fetch_all(&*self.pool)
            .await
            .storage_err()?;
        rows.iter().map(|r| self.row_to_record(r)).collect()
    }

    async fn disable_conflicting(&self, hook: &str, keep: PluginId) -> PluginResult<u64> {
        // the single conditional write enforcing hook exclusivity
        let query = format!(
            "UPDATE {} SET status = 0, updated_at = NOW() \
             WHERE hook = $1 AND status = 1 AND id <> $2",
            self.table_name
        );
        let result = sqlx::query(&query)
            .bind(hook)
            .bind(keep)
            .execute(&*self.pool)
            .await
            .storage_err()?;
        Ok(result.rows_affected())
    }

    async fn is_enabled(&self, key: &str) -> PluginResult<bool> {
        let query = format!(
            "SELECT id FROM {} WHERE key_name = $1 AND status = 1",
            self.table_name
        );
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .storage_err()?;
        Ok(row.is_some())
    }

    async fn payload(&self, key: &str) -> PluginResult<Option<PluginData>> {
        let query = format!(
            "SELECT content, ts_content FROM {} WHERE key_name = $1",
            self.table_name
        );
        let row = sqlx::query(&query)
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .storage_err()?;
        match row {
            Some(row) => {
                let content: Value = row.get("content");
                let ts_content: Value = row.get("ts_content");
                Ok(Some(PluginData {
                    content: serde_json::from_value(content)?,
                    ts_content: serde_json::from_value(ts_content)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: PluginId) -> PluginResult<bool> {
        let query = format!("DELETE FROM {} WHERE id = $1", self.table_name);
        let result = sqlx::query(&query)
            .bind(id)
            .execute(&*self.pool)
            .await
            .storage_err()?;
        Ok(result.rows_affected() > 0)
    }
}
