//! Read-only views of a consultation record: the confirmation summary, progress counters and
//! the localized report export.

pub mod export;
pub mod progress;
pub mod summary;

pub use export::{export_record, ExportRow, RecordSnapshot};
pub use progress::Progress;
pub use summary::{display_value, summary_lines, SummaryLine};
