use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "device")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Ownership-claim challenge; empty once the device has been claimed.
    pub challenge: String,

    pub time_created: DateTimeUtc,

    pub garbage: bool,
    pub garbage_removal_at: Option<DateTimeUtc>,
    pub gc_processed: bool,
}

impl ActiveModelBehavior for ActiveModel {}
