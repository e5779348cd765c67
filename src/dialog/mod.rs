mod engine;
mod profile;
mod state;

pub use engine::{DialogEngine, StepOutput};
pub use profile::UserProfile;
pub use state::{DialogFrame, DialogId, DialogInput, DialogState, Effect, Step, Transition, transition};
