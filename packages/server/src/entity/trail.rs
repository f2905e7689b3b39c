use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trail")]
pub struct Model {
    /// Equals the owning device id; one device owns one trail.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Owning account identifier.
    pub owner: String,

    /// Revision-0 (factory) state document.
    pub factory_state: Json,

    /// Ordered array of storage ids referenced by the factory state.
    pub used_objects: Json,

    pub garbage: bool,
    pub garbage_removal_at: Option<DateTimeUtc>,
    pub gc_processed: bool,
}

impl ActiveModelBehavior for ActiveModel {}
