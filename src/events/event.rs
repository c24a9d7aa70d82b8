//! Event payloads emitted during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::NodeKind;

/// Discriminated event payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// Coarse progress feed: stage name plus 0-100 percentage.
    Progress {
        stage: String,
        progress: u8,
        message: String,
    },
    /// Per-node intermediate result (streaming variant payload).
    Stage { stage: String, payload: Value },
    /// Free-form diagnostic line.
    Log { level: String, message: String },
    /// Best-effort LLM stream chunk.
    LlmChunk {
        stage: String,
        chunk: String,
        is_final: bool,
    },
    /// Final result payload.
    Result { payload: Value },
    Complete,
    Error { message: String },
    Cancelled,
}

impl EventKind {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Progress { .. } => "progress",
            EventKind::Stage { .. } => "stream",
            EventKind::Log { .. } => "log",
            EventKind::LlmChunk { .. } => "stream",
            EventKind::Result { .. } => "result",
            EventKind::Complete => "complete",
            EventKind::Error { .. } => "error",
            EventKind::Cancelled => "cancelled",
        }
    }

    /// Terminal events close the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Complete | EventKind::Error { .. } | EventKind::Cancelled
        )
    }
}

/// A timestamped event bound to one task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub task_id: String,
    pub when: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(task_id: impl Into<String>, kind: EventKind) -> Self {
        Event {
            task_id: task_id.into(),
            when: Utc::now(),
            kind,
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Rough progress percentage for each pipeline stage, used by the
/// progress feed. Loop stages report the entry percentage on every pass.
pub fn stage_progress(node: NodeKind) -> u8 {
    match node {
        NodeKind::Start => 0,
        NodeKind::Researcher => 10,
        NodeKind::Planner => 20,
        NodeKind::Writer => 35,
        NodeKind::CheckKnowledge | NodeKind::RefineSearch | NodeKind::EnhanceWithKnowledge => 45,
        NodeKind::Questioner | NodeKind::DeepenContent => 50,
        NodeKind::SectionEvaluate | NodeKind::SectionImprove => 55,
        NodeKind::CoderAndArtist => 65,
        NodeKind::CrossSectionDedup => 70,
        NodeKind::ConsistencyCheck => 72,
        NodeKind::Reviewer | NodeKind::Revision => 78,
        NodeKind::FactCheck => 84,
        NodeKind::TextCleanup => 86,
        NodeKind::Humanizer => 90,
        NodeKind::Assembler => 95,
        NodeKind::SummaryGenerator => 98,
        NodeKind::End => 100,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_events_are_flagged() {
        assert!(EventKind::Complete.is_terminal());
        assert!(EventKind::Cancelled.is_terminal());
        assert!(
            !EventKind::Progress {
                stage: "writer".into(),
                progress: 35,
                message: String::new()
            }
            .is_terminal()
        );
    }

    #[test]
    fn progress_is_monotonic_along_the_happy_path() {
        let path = [
            NodeKind::Researcher,
            NodeKind::Planner,
            NodeKind::Writer,
            NodeKind::Questioner,
            NodeKind::CoderAndArtist,
            NodeKind::Reviewer,
            NodeKind::Humanizer,
            NodeKind::Assembler,
            NodeKind::SummaryGenerator,
            NodeKind::End,
        ];
        for pair in path.windows(2) {
            assert!(stage_progress(pair[0]) < stage_progress(pair[1]));
        }
    }

    #[test]
    fn event_serializes_with_flattened_kind() {
        let event = Event::new(
            "task-1",
            EventKind::Progress {
                stage: "writer".into(),
                progress: 35,
                message: "writing sections".into(),
            },
        );
        let json = event.to_json();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["stage"], "writer");
        assert_eq!(json["task_id"], "task-1");
    }
}
