use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, sea_query::Expr,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::entity::{device, step, storage_object, trail};
use crate::gc::lifecycle::Lifecycle;
use crate::gc::mark::cascade_device_trail;
use crate::gc::report::GcReport;
use crate::gc::resolver::resolve_state_refs;

/// Walks marked-but-unprocessed resources and materializes the cascade one
/// level per resource kind: device → trail → step → object.
///
/// Safe to re-run and to run concurrently: every decision derives from the
/// persisted flags, and a resource whose pass fails keeps
/// `gc_processed = false` so the next run retries it.
pub struct ProcessService<'a, C: ConnectionTrait> {
    conn: &'a C,
    grace: Duration,
}

impl<'a, C: ConnectionTrait> ProcessService<'a, C> {
    pub fn new(conn: &'a C, grace: Duration) -> Self {
        Self { conn, grace }
    }

    /// Cascade device marks down to their trails.
    ///
    /// The cascade already ran at mark time; re-running it here covers marks
    /// written by batch scans and is idempotent, so `gc_processed` is set
    /// unconditionally afterwards.
    pub async fn process_devices(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();

        let pending = device::Entity::find()
            .filter(device::Column::Garbage.eq(true))
            .filter(device::Column::GcProcessed.eq(false))
            .all(self.conn)
            .await?;

        for dev in pending {
            let lifecycle =
                Lifecycle::from_flags(dev.garbage, dev.gc_processed, dev.garbage_removal_at);
            if !lifecycle.needs_processing() {
                continue;
            }

            if let Err(e) = cascade_device_trail(self.conn, self.grace, &dev.id, &mut report).await
            {
                report.error("CASCADE_FAILED", &dev.id, e.to_string());
            }

            device::Entity::update_many()
                .col_expr(device::Column::GcProcessed, Expr::value(true))
                .filter(device::Column::Id.eq(&dev.id))
                .exec(self.conn)
                .await?;
            report.affected += 1;
        }

        Ok(report)
    }

    /// Process garbage trails: recompute references, cascade to steps, and
    /// mark now-unreferenced objects garbage.
    pub async fn process_trails(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();

        let pending = trail::Entity::find()
            .filter(trail::Column::Garbage.eq(true))
            .filter(trail::Column::GcProcessed.eq(false))
            .all(self.conn)
            .await?;

        for trail_row in pending {
            let lifecycle = Lifecycle::from_flags(
                trail_row.garbage,
                trail_row.gc_processed,
                trail_row.garbage_removal_at,
            );
            if !lifecycle.needs_processing() {
                continue;
            }

            let mut item_ok = true;
            let label = format!("trail {} rev 0", trail_row.id);

            let refs = match resolve_state_refs(
                self.conn,
                &trail_row.owner,
                &trail_row.factory_state,
                &label,
            )
            .await
            {
                Ok(refs) => {
                    trail::Entity::update_many()
                        .col_expr(
                            trail::Column::UsedObjects,
                            Expr::value(serde_json::json!(refs.storage_ids)),
                        )
                        .filter(trail::Column::Id.eq(&trail_row.id))
                        .exec(self.conn)
                        .await?;
                    Some(refs)
                }
                Err(e) => {
                    report.error("RESOLVE_FAILED", &trail_row.id, e.to_string());
                    item_ok = false;
                    None
                }
            };

            // Parent re-mark: all child steps go back to Marked, even ones a
            // previous pass already processed.
            step::Entity::update_many()
                .col_expr(step::Column::Garbage, Expr::value(true))
                .col_expr(
                    step::Column::GarbageRemovalAt,
                    Expr::value(Utc::now() + self.grace),
                )
                .col_expr(step::Column::GcProcessed, Expr::value(false))
                .filter(step::Column::TrailId.eq(&trail_row.id))
                .exec(self.conn)
                .await?;

            if let Some(refs) = refs {
                self.collect_objects(&refs.storage_ids, &mut report).await?;
            }

            if item_ok {
                trail::Entity::update_many()
                    .col_expr(trail::Column::GcProcessed, Expr::value(true))
                    .filter(trail::Column::Id.eq(&trail_row.id))
                    .exec(self.conn)
                    .await?;
                report.affected += 1;
                info!(trail_id = trail_row.id, "trail processed");
            } else {
                warn!(trail_id = trail_row.id, "trail left unprocessed for retry");
            }
        }

        Ok(report)
    }

    /// Process garbage steps: recompute the step's own references and mark
    /// now-unreferenced objects garbage.
    pub async fn process_steps(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();

        let pending = step::Entity::find()
            .filter(step::Column::Garbage.eq(true))
            .filter(step::Column::GcProcessed.eq(false))
            .all(self.conn)
            .await?;

        for step_row in pending {
            let lifecycle = Lifecycle::from_flags(
                step_row.garbage,
                step_row.gc_processed,
                step_row.garbage_removal_at,
            );
            if !lifecycle.needs_processing() {
                continue;
            }

            let label = format!("step {}", step_row.id);

            match resolve_state_refs(self.conn, &step_row.owner, &step_row.state, &label).await {
                Ok(refs) => {
                    step::Entity::update_many()
                        .col_expr(
                            step::Column::UsedObjects,
                            Expr::value(serde_json::json!(refs.storage_ids)),
                        )
                        .filter(step::Column::Id.eq(&step_row.id))
                        .exec(self.conn)
                        .await?;

                    self.collect_objects(&refs.storage_ids, &mut report).await?;

                    step::Entity::update_many()
                        .col_expr(step::Column::GcProcessed, Expr::value(true))
                        .filter(step::Column::Id.eq(&step_row.id))
                        .exec(self.conn)
                        .await?;
                    report.affected += 1;
                }
                Err(e) => {
                    report.error("RESOLVE_FAILED", &step_row.id, e.to_string());
                    warn!(step_id = step_row.id, "step left unprocessed for retry");
                }
            }
        }

        Ok(report)
    }

    /// Decide per referenced object whether it can be marked garbage: only
    /// when no non-garbage trail or step still references it.
    async fn collect_objects(
        &self,
        storage_ids: &[String],
        report: &mut GcReport,
    ) -> Result<(), DbErr> {
        for storage_id in storage_ids {
            let usage = count_live_references(self.conn, storage_id).await?;

            if usage > 0 {
                report.warning(
                    "OBJECT_IN_USE",
                    storage_id,
                    format!("{usage} live referencer(s); not marked"),
                );
                report.ignored(storage_id);
                continue;
            }

            storage_object::Entity::update_many()
                .col_expr(storage_object::Column::Garbage, Expr::value(true))
                .col_expr(
                    storage_object::Column::GarbageRemovalAt,
                    Expr::value(Utc::now() + self.grace),
                )
                .filter(storage_object::Column::StorageId.eq(storage_id))
                .filter(storage_object::Column::Garbage.eq(false))
                .exec(self.conn)
                .await?;
            info!(storage_id, "object marked garbage");
        }

        Ok(())
    }
}

/// Count non-garbage trails and steps whose `used_objects` contains the
/// given storage id.
///
/// Containment is checked in Rust over the fetched arrays rather than with
/// DB-specific JSON operators; reference lists are small.
pub(crate) async fn count_live_references<C: ConnectionTrait>(
    conn: &C,
    storage_id: &str,
) -> Result<u64, DbErr> {
    let trail_lists: Vec<Value> = trail::Entity::find()
        .select_only()
        .column(trail::Column::UsedObjects)
        .filter(trail::Column::Garbage.eq(false))
        .into_tuple()
        .all(conn)
        .await?;

    let step_lists: Vec<Value> = step::Entity::find()
        .select_only()
        .column(step::Column::UsedObjects)
        .filter(step::Column::Garbage.eq(false))
        .into_tuple()
        .all(conn)
        .await?;

    let count = trail_lists
        .iter()
        .chain(step_lists.iter())
        .filter(|list| {
            list.as_array()
                .is_some_and(|ids| ids.iter().any(|id| id.as_str() == Some(storage_id)))
        })
        .count();

    Ok(count as u64)
}
