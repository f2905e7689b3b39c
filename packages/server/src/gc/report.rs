use serde::Serialize;

/// One problem encountered during a GC pass, tied to the resource that
/// caused it.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct GcIssue {
    /// Machine-readable issue code, e.g. `OBJECT_IN_USE`.
    pub code: &'static str,
    /// Identifier of the affected resource.
    pub resource: String,
    pub message: String,
}

/// Accumulated outcome of one GC operation.
///
/// Per-item failures land in `errors` and leave the item's `gc_processed`
/// flag untouched so the next run retries it; the operation as a whole only
/// counts as successful when `errors` is empty.
#[derive(Debug, Default, Serialize)]
pub struct GcReport {
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    /// Storage ids skipped because live references still exist.
    pub objects_ignored: Vec<String>,
    /// Resources acted upon (marked / processed / populated).
    pub affected: u64,
}

impl GcReport {
    pub fn error(&mut self, code: &'static str, resource: impl Into<String>, message: impl Into<String>) {
        self.errors.push(GcIssue {
            code,
            resource: resource.into(),
            message: message.into(),
        });
    }

    pub fn warning(
        &mut self,
        code: &'static str,
        resource: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.warnings.push(GcIssue {
            code,
            resource: resource.into(),
            message: message.into(),
        });
    }

    pub fn ignored(&mut self, storage_id: impl Into<String>) {
        self.objects_ignored.push(storage_id.into());
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: GcReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.objects_ignored.extend(other.objects_ignored);
        self.affected += other.affected;
    }
}
