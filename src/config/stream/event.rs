use std::fmt::{self, Display};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::instance::LifecycleState;

use super::line::{StreamLine, StreamSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventPayload {
    StateChange {
        old: LifecycleState,
        new: LifecycleState,
    },

    StdLine {
        line: StreamLine,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEvent {
    pub id: Uuid,

    pub timestamp: DateTime<Utc>,

    pub payload: EventPayload,
}

impl InstanceEvent {
    pub fn line<S: Into<String>>(line: S, source: StreamSource) -> Self {
        let s_line = StreamLine::new(line, source);
        let timestamp = s_line.extract_timestamp().unwrap_or_else(Utc::now);

        Self {
            id: Uuid::new_v4(),
            timestamp,
            payload: EventPayload::StdLine { line: s_line },
        }
    }

    pub fn state_change(old: LifecycleState, new: LifecycleState) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            payload: EventPayload::StateChange { old, new },
        }
    }
}

impl Display for InstanceEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ", self.timestamp.format("%H:%M:%S"), self.id)?;
        match &self.payload {
            EventPayload::StdLine { line } => write!(f, "{line}"),
            EventPayload::StateChange { old, new } => {
                write!(f, "State changed: {old:?} -> {new:?}")
            }
        }
    }
}
