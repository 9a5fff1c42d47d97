//! SeaORM entity model used by the database storage backend.
//!
//! The struct maps to the `log_records` table created by `database_storage`. Timestamps are
//! RFC3339 strings and JSON values are stored as text, for portability.

use sea_orm::entity::prelude::*;

/// Log records table entity model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "log_records")]
pub struct Model {
    /// Auto-increment row id, also the insertion order
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Session the record is attributed to
    pub session_id: String,
    /// Client address captured at connect time
    pub source_addr: String,
    /// Caller-supplied user identifier, possibly empty
    pub user_id: String,
    /// `rpc`, `system` or `error`
    pub kind: String,
    /// JSON text of the payload
    #[sea_orm(column_type = "Text")]
    pub payload: String,
    /// Correlation key of requests
    pub rpc_id: Option<String>,
    /// JSON text of the correlated response
    #[sea_orm(column_type = "Text", nullable)]
    pub response: Option<String>,
    /// RFC3339 creation timestamp
    pub created_at: String,
    /// RFC3339 timestamp of the last correlation
    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
