mod record;
mod registry;

pub use record::{JobId, JobRecord};
pub use registry::{JOBS_KEY, JobRegistry};
