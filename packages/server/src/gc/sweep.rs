use chrono::Utc;
use common::{StorageBackend, StorageId};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use tracing::info;

use crate::entity::{device, step, storage_object, trail};
use crate::gc::report::GcReport;

/// Resources physically removed by one sweep run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepTotals {
    pub devices: u64,
    pub trails: u64,
    pub steps: u64,
    pub objects: u64,
}

/// Physically removes resources whose grace period has elapsed.
///
/// Deletion order is trails, then steps, then objects, which narrows (but
/// does not eliminate) the window in which a stale reference can be read.
/// Object deletions trust the usage decision made by the Process engine;
/// usage is not re-verified here.
pub struct SweepService<'a, C: ConnectionTrait> {
    conn: &'a C,
    backend: &'a dyn StorageBackend,
    enabled: bool,
}

impl<'a, C: ConnectionTrait> SweepService<'a, C> {
    pub fn new(conn: &'a C, backend: &'a dyn StorageBackend, enabled: bool) -> Self {
        Self {
            conn,
            backend,
            enabled,
        }
    }

    pub async fn sweep(&self) -> Result<(SweepTotals, GcReport), DbErr> {
        let mut totals = SweepTotals::default();
        let mut report = GcReport::default();

        if !self.enabled {
            report.warning(
                "SWEEP_DISABLED",
                "gc.remove_garbage",
                "sweep is disabled by configuration; nothing removed",
            );
            return Ok((totals, report));
        }

        let now = Utc::now();

        // Device, trail and step rows are only removable once Processed;
        // an unprocessed mark must first go through the Process engine.
        totals.trails = trail::Entity::delete_many()
            .filter(trail::Column::Garbage.eq(true))
            .filter(trail::Column::GcProcessed.eq(true))
            .filter(trail::Column::GarbageRemovalAt.lte(now))
            .exec(self.conn)
            .await?
            .rows_affected;

        totals.steps = step::Entity::delete_many()
            .filter(step::Column::Garbage.eq(true))
            .filter(step::Column::GcProcessed.eq(true))
            .filter(step::Column::GarbageRemovalAt.lte(now))
            .exec(self.conn)
            .await?
            .rows_affected;

        let due_objects = storage_object::Entity::find()
            .filter(storage_object::Column::Garbage.eq(true))
            .filter(storage_object::Column::GarbageRemovalAt.lte(now))
            .all(self.conn)
            .await?;

        for object in due_objects {
            let key = match StorageId::parse(&object.storage_id) {
                Ok(id) => id.key(),
                Err(e) => {
                    report.error("BAD_STORAGE_ID", &object.storage_id, e.to_string());
                    continue;
                }
            };

            // Backing bytes go first; a row without bytes would break
            // downloads, bytes without a row are re-collected next run.
            if let Err(e) = self.backend.delete(&key).await {
                report.error("OBJECT_DELETE_FAILED", &object.storage_id, e.to_string());
                continue;
            }

            storage_object::Entity::delete_by_id(&object.storage_id)
                .exec(self.conn)
                .await?;
            totals.objects += 1;
            info!(storage_id = object.storage_id, "object removed");
        }

        totals.devices = device::Entity::delete_many()
            .filter(device::Column::Garbage.eq(true))
            .filter(device::Column::GcProcessed.eq(true))
            .filter(device::Column::GarbageRemovalAt.lte(now))
            .exec(self.conn)
            .await?
            .rows_affected;

        info!(
            devices = totals.devices,
            trails = totals.trails,
            steps = totals.steps,
            objects = totals.objects,
            "sweep complete"
        );

        Ok((totals, report))
    }
}
