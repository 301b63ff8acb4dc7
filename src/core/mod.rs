mod finding;
mod report;
mod solution;

pub use finding::Finding;
pub use report::{DiagnosticReport, ReportStatus};
pub use solution::{GroupKey, SolutionEntry};
