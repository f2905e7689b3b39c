use chrono::{DateTime, Utc};

/// GC lifecycle of a resource, derived from its persisted flag columns.
///
/// The persistence schema keeps `garbage`, `gc_processed` and
/// `garbage_removal_at` as independent columns; this type is the single
/// place that combination is interpreted, so the engines cannot observe a
/// "removable but never processed" state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Live resource.
    Active,
    /// Flagged garbage, cascade not yet executed.
    Marked { removal_at: DateTime<Utc> },
    /// Cascade executed; removable once the grace period elapses.
    Processed { removal_at: DateTime<Utc> },
}

impl Lifecycle {
    pub fn from_flags(
        garbage: bool,
        gc_processed: bool,
        removal_at: Option<DateTime<Utc>>,
    ) -> Self {
        if !garbage {
            return Self::Active;
        }

        // A garbage row without a removal time predates the grace-period
        // columns; treat it as freshly marked and never due.
        let removal_at = removal_at.unwrap_or(DateTime::<Utc>::MAX_UTC);

        if gc_processed {
            Self::Processed { removal_at }
        } else {
            Self::Marked { removal_at }
        }
    }

    /// The Process engine may only act on `Marked` resources.
    pub fn needs_processing(&self) -> bool {
        matches!(self, Self::Marked { .. })
    }

    /// The Sweep engine may only remove `Processed` resources whose grace
    /// period has elapsed.
    pub fn removable(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::Processed { removal_at } if *removal_at <= now)
    }
}
