use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "storage_object")]
pub struct Model {
    /// Owner-scoped content address: `{owner}-{sha256 hex}`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub storage_id: String,

    /// Raw sha256 digest, hex encoded.
    pub digest: String,

    /// Owning account identifier.
    pub owner: String,

    /// Display name used for download disposition.
    pub name: String,

    /// Size of the object in bytes.
    pub size: i64,

    pub mime_type: String,

    pub garbage: bool,
    pub garbage_removal_at: Option<DateTimeUtc>,
}

impl ActiveModelBehavior for ActiveModel {}
