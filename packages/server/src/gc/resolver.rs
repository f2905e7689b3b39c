use common::{ContentHash, StorageId};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, sea_query::Expr};
use serde_json::Value;
use tracing::warn;

use crate::entity::storage_object;

/// Key carrying the state-document format marker.
pub const SPEC_MARKER_KEY: &str = "#spec";

/// Keys with this suffix hold inline state fragments, not object references.
pub const INLINE_SUFFIX: &str = ".json";

/// Result of resolving the object references of one state document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRefs {
    /// Whether the document carried the expected format marker.
    pub document_valid: bool,
    /// Deduplicated storage ids of all resolvable references.
    pub storage_ids: Vec<String>,
    /// Entries that were not valid object references.
    pub invalid_refs: u32,
}

impl ResolvedRefs {
    pub fn is_clean(&self) -> bool {
        self.document_valid && self.invalid_refs == 0
    }
}

/// Extract and validate the object references embedded in a device-state
/// document.
///
/// Entries whose key is the format marker or ends in the inline suffix are
/// skipped. Every other value must be a hex sha256 naming an existing object
/// of `owner`; anything else counts as invalid without aborting the walk. A
/// referenced object that was flagged garbage is un-marked: being referenced
/// again makes it alive (the GC rescue path).
///
/// `label` only feeds diagnostics.
pub async fn resolve_state_refs<C: ConnectionTrait>(
    db: &C,
    owner: &str,
    state: &Value,
    label: &str,
) -> Result<ResolvedRefs, DbErr> {
    let mut resolved = ResolvedRefs {
        document_valid: false,
        storage_ids: Vec::new(),
        invalid_refs: 0,
    };

    let Some(entries) = state.as_object() else {
        warn!(label, "state document is not an object");
        return Ok(resolved);
    };

    for (key, value) in entries {
        if key == SPEC_MARKER_KEY {
            resolved.document_valid = value.is_string();
            continue;
        }
        if key.ends_with(INLINE_SUFFIX) {
            continue;
        }

        let Some(sha) = value.as_str() else {
            warn!(label, key, "state entry is not a string");
            resolved.invalid_refs += 1;
            continue;
        };

        let digest = match ContentHash::from_hex(sha) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(label, key, "state entry is not a sha256: {e}");
                resolved.invalid_refs += 1;
                continue;
            }
        };

        let storage_id = StorageId::new(owner, digest).to_string();

        let Some(object) = storage_object::Entity::find_by_id(&storage_id).one(db).await? else {
            warn!(label, key, storage_id, "referenced object does not exist");
            resolved.invalid_refs += 1;
            continue;
        };

        if object.garbage {
            storage_object::Entity::update_many()
                .col_expr(storage_object::Column::Garbage, Expr::value(false))
                .col_expr(
                    storage_object::Column::GarbageRemovalAt,
                    Expr::value(None::<chrono::DateTime<chrono::Utc>>),
                )
                .filter(storage_object::Column::StorageId.eq(&storage_id))
                .exec(db)
                .await?;
        }

        if !resolved.storage_ids.contains(&storage_id) {
            resolved.storage_ids.push(storage_id);
        }
    }

    Ok(resolved)
}
