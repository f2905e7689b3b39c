//! Response bodies for the GC control endpoints.
//!
//! Every operation reports `status` (1 when no per-item errors occurred),
//! the accumulated `errors` and `warnings`, and an operation-specific count.

use serde::Serialize;
use utoipa::ToSchema;

use crate::gc::{GcIssue, GcReport, SweepTotals};

fn status_of(report: &GcReport) -> u8 {
    if report.ok() { 1 } else { 0 }
}

#[derive(Serialize, ToSchema)]
pub struct MarkDevicesResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub devices_marked: u64,
}

impl From<GcReport> for MarkDevicesResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            devices_marked: report.affected,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct MarkTrailsResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub trails_marked: u64,
}

impl From<GcReport> for MarkTrailsResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            trails_marked: report.affected,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProcessDevicesResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub devices_processed: u64,
    /// Storage ids that stayed live because references still exist.
    pub objects_ignored: Vec<String>,
}

impl From<GcReport> for ProcessDevicesResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            devices_processed: report.affected,
            objects_ignored: report.objects_ignored,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProcessTrailsResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub trails_processed: u64,
    pub objects_ignored: Vec<String>,
}

impl From<GcReport> for ProcessTrailsResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            trails_processed: report.affected,
            objects_ignored: report.objects_ignored,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProcessStepsResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub steps_processed: u64,
    pub objects_ignored: Vec<String>,
}

impl From<GcReport> for ProcessStepsResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            steps_processed: report.affected,
            objects_ignored: report.objects_ignored,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SweepResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub devices_removed: u64,
    pub trails_removed: u64,
    pub steps_removed: u64,
    pub objects_removed: u64,
}

impl SweepResponse {
    pub fn new(totals: SweepTotals, report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            devices_removed: totals.devices,
            trails_removed: totals.trails,
            steps_removed: totals.steps,
            objects_removed: totals.objects,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PopulateTrailsResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub trails_populated: u64,
}

impl From<GcReport> for PopulateTrailsResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            trails_populated: report.affected,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PopulateStepsResponse {
    pub status: u8,
    pub errors: Vec<GcIssue>,
    pub warnings: Vec<GcIssue>,
    pub steps_populated: u64,
}

impl From<GcReport> for PopulateStepsResponse {
    fn from(report: GcReport) -> Self {
        Self {
            status: status_of(&report),
            steps_populated: report.affected,
            errors: report.errors,
            warnings: report.warnings,
        }
    }
}
