use chrono::{Duration, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect, sea_query::Expr,
};
use tracing::info;

use crate::entity::{device, trail};
use crate::gc::report::GcReport;
use crate::gc::resolver::resolve_state_refs;

/// Flags resources garbage with a grace-period removal time.
///
/// Marking is the only entry into the GC pipeline: everything downstream
/// (Process, Sweep) derives its work purely from the persisted flags this
/// service writes, so runs may overlap or crash without coordination.
pub struct MarkService<'a, C: ConnectionTrait> {
    conn: &'a C,
    grace: Duration,
    unclaimed_expiry: Duration,
}

impl<'a, C: ConnectionTrait> MarkService<'a, C> {
    pub fn new(conn: &'a C, grace: Duration, unclaimed_expiry: Duration) -> Self {
        Self {
            conn,
            grace,
            unclaimed_expiry,
        }
    }

    /// Mark one device garbage and cascade the mark to its trail.
    ///
    /// Returns `None` if no such device exists.
    pub async fn mark_device(&self, device_id: &str) -> Result<Option<GcReport>, DbErr> {
        let Some(_) = device::Entity::find_by_id(device_id).one(self.conn).await? else {
            return Ok(None);
        };

        let mut report = GcReport::default();
        let removal_at = Utc::now() + self.grace;

        device::Entity::update_many()
            .col_expr(device::Column::Garbage, Expr::value(true))
            .col_expr(device::Column::GarbageRemovalAt, Expr::value(removal_at))
            .col_expr(device::Column::GcProcessed, Expr::value(false))
            .filter(device::Column::Id.eq(device_id))
            .exec(self.conn)
            .await?;
        report.affected += 1;

        cascade_device_trail(self.conn, self.grace, device_id, &mut report).await?;

        info!(device_id, "device marked garbage");
        Ok(Some(report))
    }

    /// Mark every trail whose owning device no longer exists.
    pub async fn mark_orphan_trails(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();

        let live_trail_ids: Vec<String> = trail::Entity::find()
            .select_only()
            .column(trail::Column::Id)
            .filter(trail::Column::Garbage.eq(false))
            .into_tuple()
            .all(self.conn)
            .await?;

        for trail_id in live_trail_ids {
            let device_exists = device::Entity::find_by_id(&trail_id)
                .one(self.conn)
                .await?
                .is_some();
            if device_exists {
                continue;
            }

            mark_trail_row(self.conn, self.grace, &trail_id).await?;
            info!(trail_id, "orphan trail marked garbage");
            report.affected += 1;
        }

        Ok(report)
    }

    /// Mark devices whose ownership-claim challenge was never resolved and
    /// that were created before `now - unclaimed_expiry`.
    ///
    /// Idempotent: already-garbage devices are excluded by the scan.
    pub async fn mark_unclaimed_devices(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();
        let cutoff = Utc::now() - self.unclaimed_expiry;
        let removal_at = Utc::now() + self.grace;

        let stale = device::Entity::find()
            .filter(device::Column::Garbage.eq(false))
            .filter(device::Column::Challenge.ne(""))
            .filter(device::Column::TimeCreated.lt(cutoff))
            .all(self.conn)
            .await?;

        for dev in stale {
            device::Entity::update_many()
                .col_expr(device::Column::Garbage, Expr::value(true))
                .col_expr(device::Column::GarbageRemovalAt, Expr::value(removal_at))
                .col_expr(device::Column::GcProcessed, Expr::value(false))
                .filter(device::Column::Id.eq(&dev.id))
                .exec(self.conn)
                .await?;

            cascade_device_trail(self.conn, self.grace, &dev.id, &mut report).await?;
            info!(device_id = dev.id, "unclaimed device marked garbage");
            report.affected += 1;
        }

        Ok(report)
    }
}

/// Flag a trail garbage and reset its processing guard so the Process engine
/// re-cascades it.
pub(crate) async fn mark_trail_row<C: ConnectionTrait>(
    conn: &C,
    grace: Duration,
    trail_id: &str,
) -> Result<(), DbErr> {
    trail::Entity::update_many()
        .col_expr(trail::Column::Garbage, Expr::value(true))
        .col_expr(
            trail::Column::GarbageRemovalAt,
            Expr::value(Utc::now() + grace),
        )
        .col_expr(trail::Column::GcProcessed, Expr::value(false))
        .filter(trail::Column::Id.eq(trail_id))
        .exec(conn)
        .await?;
    Ok(())
}

/// Cascade a device mark to its trail and immediately re-resolve the trail's
/// revision-0 (factory) state so the object references stay tracked through
/// the cascade.
pub(crate) async fn cascade_device_trail<C: ConnectionTrait>(
    conn: &C,
    grace: Duration,
    device_id: &str,
    report: &mut GcReport,
) -> Result<(), DbErr> {
    let Some(trail_row) = trail::Entity::find_by_id(device_id).one(conn).await? else {
        report.warning("TRAIL_MISSING", device_id, "device has no trail");
        return Ok(());
    };

    mark_trail_row(conn, grace, device_id).await?;

    let label = format!("trail {device_id} rev 0");
    let refs = resolve_state_refs(conn, &trail_row.owner, &trail_row.factory_state, &label).await?;

    trail::Entity::update_many()
        .col_expr(
            trail::Column::UsedObjects,
            Expr::value(serde_json::json!(refs.storage_ids)),
        )
        .filter(trail::Column::Id.eq(device_id))
        .exec(conn)
        .await?;

    if !refs.document_valid {
        report.warning(
            "INVALID_STATE_DOCUMENT",
            device_id,
            "factory state is missing the format marker",
        );
    }
    if refs.invalid_refs > 0 {
        report.warning(
            "INVALID_REFERENCES",
            device_id,
            format!("{} unresolvable reference(s) in factory state", refs.invalid_refs),
        );
    }

    Ok(())
}
