use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ActiveValue::Set, ColumnTrait, ConnectOptions,
    ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Schema,
};

use crate::error_handling::types::StorageError;
use crate::storage::db_entities::{ActiveModel, Column, Entity, Model};
use crate::storage::storage_trait::LogStorage;
use crate::storage::types::{LogKind, LogRecord, LogUpdate};

impl Model {
    fn into_record(self) -> Result<LogRecord, StorageError> {
        let kind = LogKind::parse(&self.kind)
            .ok_or_else(|| StorageError::ReadFailed(format!("unknown kind `{}`", self.kind)))?;
        Ok(LogRecord {
            source_addr: self.source_addr,
            user_id: self.user_id,
            session_id: self.session_id,
            kind,
            payload: serde_json::from_str(&self.payload)
                .map_err(|e| StorageError::ReadFailed(e.to_string()))?,
            rpc_id: self.rpc_id,
            response: match self.response {
                Some(raw) => Some(
                    serde_json::from_str(&raw)
                        .map_err(|e| StorageError::ReadFailed(e.to_string()))?,
                ),
                None => None,
            },
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::ReadFailed(format!("bad timestamp `{}`: {}", raw, e)))
}

fn to_json_text(value: &serde_json::Value) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::WriteFailed(e.to_string()))
}

/// SQLite log store through SeaORM.
pub struct DatabaseStorage {
    db: DatabaseConnection,
}

impl DatabaseStorage {
    /// Create or open the database at `path`, creating parent directories and the schema.
    pub async fn new_file<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        }

        let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
        opts.max_connections(5).sqlx_logging(false);
        let db = Database::connect(opts)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        // create schema
        let backend = db.get_database_backend();
        let mut table = Schema::new(backend).create_table_from_entity(Entity);
        table.if_not_exists();
        db.execute(backend.build(&table))
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        info!("DatabaseStorage initialized at {}", path.display());
        Ok(Self { db })
    }
}

#[async_trait]
impl LogStorage for DatabaseStorage {
    async fn insert(&self, record: &LogRecord) -> Result<(), StorageError> {
        let row = ActiveModel {
            id: NotSet,
            session_id: Set(record.session_id.clone()),
            source_addr: Set(record.source_addr.clone()),
            user_id: Set(record.user_id.clone()),
            kind: Set(record.kind.as_str().to_string()),
            payload: Set(to_json_text(&record.payload)?),
            rpc_id: Set(record.rpc_id.clone()),
            response: Set(record.response.as_ref().map(to_json_text).transpose()?),
            created_at: Set(record.created_at.to_rfc3339()),
            updated_at: Set(record.updated_at.to_rfc3339()),
        };
        Entity::insert(row)
            .exec(&self.db)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn update(
        &self,
        session_id: &str,
        rpc_id: &str,
        patch: &LogUpdate,
    ) -> Result<bool, StorageError> {
        let first = Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .filter(Column::RpcId.eq(rpc_id))
            .order_by_asc(Column::Id)
            .one(&self.db)
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        let Some(model) = first else {
            return Ok(false);
        };

        let row_id = model.id;
        let mut row: ActiveModel = model.into();
        row.response = Set(Some(to_json_text(&patch.response)?));
        row.updated_at = Set(patch.updated_at.to_rfc3339());
        row.update(&self.db)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        debug!("[{}] log record {} updated for rpc id {}", session_id, row_id, rpc_id);
        Ok(true)
    }

    async fn records_for_session(&self, session_id: &str) -> Result<Vec<LogRecord>, StorageError> {
        let rows = Entity::find()
            .filter(Column::SessionId.eq(session_id))
            .order_by_asc(Column::Id)
            .all(&self.db)
            .await
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;
        rows.into_iter().map(Model::into_record).collect()
    }
}
