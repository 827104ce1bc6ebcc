mod event;
mod line;
mod log;

pub use event::{EventPayload, InstanceEvent};
pub use line::{StreamLine, StreamSource};
pub use log::{LogLevel, LogMeta};
