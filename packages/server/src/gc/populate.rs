use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, sea_query::Expr};

use crate::entity::{step, trail};
use crate::gc::report::GcReport;
use crate::gc::resolver::resolve_state_refs;

/// Recomputes `used_objects` for every trail or step from its state
/// document.
///
/// Operational fixup for rows written before reference tracking existed (or
/// after a resolver bug). Also re-runs the resolver's rescue path, so
/// garbage-flagged objects that are in fact still referenced come back.
pub struct PopulateService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> PopulateService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    pub async fn populate_trails(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();

        for trail_row in trail::Entity::find().all(self.conn).await? {
            let label = format!("trail {} rev 0", trail_row.id);
            let refs = resolve_state_refs(
                self.conn,
                &trail_row.owner,
                &trail_row.factory_state,
                &label,
            )
            .await?;

            if !refs.document_valid {
                report.warning("INVALID_STATE_DOCUMENT", &trail_row.id, "missing format marker");
            }
            if refs.invalid_refs > 0 {
                report.warning(
                    "INVALID_REFERENCES",
                    &trail_row.id,
                    format!("{} unresolvable reference(s)", refs.invalid_refs),
                );
            }

            trail::Entity::update_many()
                .col_expr(
                    trail::Column::UsedObjects,
                    Expr::value(serde_json::json!(refs.storage_ids)),
                )
                .filter(trail::Column::Id.eq(&trail_row.id))
                .exec(self.conn)
                .await?;
            report.affected += 1;
        }

        Ok(report)
    }

    pub async fn populate_steps(&self) -> Result<GcReport, DbErr> {
        let mut report = GcReport::default();

        for step_row in step::Entity::find().all(self.conn).await? {
            let label = format!("step {}", step_row.id);
            let refs =
                resolve_state_refs(self.conn, &step_row.owner, &step_row.state, &label).await?;

            if !refs.document_valid {
                report.warning("INVALID_STATE_DOCUMENT", &step_row.id, "missing format marker");
            }
            if refs.invalid_refs > 0 {
                report.warning(
                    "INVALID_REFERENCES",
                    &step_row.id,
                    format!("{} unresolvable reference(s)", refs.invalid_refs),
                );
            }

            step::Entity::update_many()
                .col_expr(
                    step::Column::UsedObjects,
                    Expr::value(serde_json::json!(refs.storage_ids)),
                )
                .filter(step::Column::Id.eq(&step_row.id))
                .exec(self.conn)
                .await?;
            report.affected += 1;
        }

        Ok(report)
    }
}
