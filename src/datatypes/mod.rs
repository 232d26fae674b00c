mod job_id;
mod mo_status;
mod session_status;
mod signal;

pub use job_id::{JobId, JobIds};
pub use mo_status::MoStatusCode;
pub use session_status::{MO_SUCCESS_MAX, SBDIX_TOKEN, SessionStatus};
pub use signal::{CSQ_TOKEN, parse_signal_quality};
