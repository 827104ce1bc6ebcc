mod capture;
mod handle;
mod types;

pub use capture::{CaptureGuard, OutputBuffer};
pub use handle::{InstanceHandle, OutputSinks};
pub use types::{InstanceData, LifecycleState};
