pub mod lifecycle;
pub mod mark;
pub mod populate;
pub mod process;
pub mod report;
pub mod resolver;
pub mod sweep;

pub use lifecycle::Lifecycle;
pub use mark::MarkService;
pub use populate::PopulateService;
pub use process::ProcessService;
pub use report::{GcIssue, GcReport};
pub use resolver::{ResolvedRefs, resolve_state_refs};
pub use sweep::{SweepService, SweepTotals};
