pub mod bucket_ops;
pub mod log_ops;
pub mod quota;
pub mod sync;

pub use log_ops::MutationOutcome;
pub use quota::{Nudges, Prompt, QuotaGate};
pub use sync::ReconcileReport;
