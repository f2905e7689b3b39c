use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "step")]
pub struct Model {
    /// `{trail_id}-{rev}`.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub trail_id: String,

    /// Revision number within the trail; revision 0 is the factory state.
    pub rev: i64,

    /// Owning account identifier.
    pub owner: String,

    /// Device-state document for this revision.
    pub state: Json,

    /// Ordered array of storage ids referenced by the state document.
    pub used_objects: Json,

    pub garbage: bool,
    pub garbage_removal_at: Option<DateTimeUtc>,
    pub gc_processed: bool,
}

impl ActiveModelBehavior for ActiveModel {}
