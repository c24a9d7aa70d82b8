//! Structured per-run task log.
//!
//! One log per generation run: every node execution appends a step with
//! duration and token delta, aggregates roll up per agent, and the whole
//! object is persisted as a single JSON file when the run ends.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::utils::text::truncate_chars;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTokens {
    pub input: u64,
    pub output: u64,
}

/// One recorded step.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepLog {
    pub timestamp: String,
    pub agent: String,
    pub action: String,
    pub level: String,
    /// Truncated to 500 chars.
    pub detail: String,
    pub duration_ms: u64,
    pub tokens: StepTokens,
    #[serde(default)]
    pub metadata: FxHashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub steps: u64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub duration_ms: u64,
}

/// The per-run log object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskLog {
    pub task_id: String,
    pub topic: String,
    pub article_type: String,
    pub target_length: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,

    pub steps: Vec<StepLog>,
    pub total_tokens: StepTokens,
    pub total_duration_ms: u64,
    pub agent_stats: FxHashMap<String, AgentStats>,

    pub final_score: u32,
    pub revision_rounds: u32,
    pub word_count: usize,

    #[serde(default)]
    pub token_summary: serde_json::Value,
}

impl TaskLog {
    pub fn new(topic: &str, article_type: &str, target_length: &str) -> Self {
        let now = Utc::now();
        TaskLog {
            task_id: format!("blog_{}", now.format("%Y%m%d_%H%M%S")),
            topic: topic.to_string(),
            article_type: article_type.to_string(),
            target_length: target_length.to_string(),
            start_time: now,
            end_time: None,
            status: TaskStatus::Running,
            steps: Vec::new(),
            total_tokens: StepTokens::default(),
            total_duration_ms: 0,
            agent_stats: FxHashMap::default(),
            final_score: 0,
            revision_rounds: 0,
            word_count: 0,
            token_summary: serde_json::Value::Null,
        }
    }

    /// Append a step and roll aggregates forward.
    pub fn log_step(
        &mut self,
        agent: &str,
        action: &str,
        level: &str,
        detail: &str,
        duration_ms: u64,
        tokens: StepTokens,
    ) {
        self.total_tokens.input += tokens.input;
        self.total_tokens.output += tokens.output;
        self.total_duration_ms += duration_ms;

        let stats = self.agent_stats.entry(agent.to_string()).or_default();
        stats.steps += 1;
        stats.duration_ms += duration_ms;
        stats.tokens_input += tokens.input;
        stats.tokens_output += tokens.output;

        self.steps.push(StepLog {
            timestamp: Utc::now().to_rfc3339(),
            agent: agent.to_string(),
            action: action.to_string(),
            level: level.to_string(),
            detail: truncate_chars(detail, 500),
            duration_ms,
            tokens,
            metadata: FxHashMap::default(),
        });
    }

    pub fn complete(&mut self, score: u32, word_count: usize, revision_rounds: u32) {
        self.status = TaskStatus::Completed;
        self.end_time = Some(Utc::now());
        self.final_score = score;
        self.word_count = word_count;
        self.revision_rounds = revision_rounds;
    }

    pub fn fail(&mut self, error: &str) {
        self.status = TaskStatus::Failed;
        self.end_time = Some(Utc::now());
        self.log_step("system", "task_failed", "error", error, 0, StepTokens::default());
    }

    /// Persist as `<logs_dir>/<task_id>/task.json`.
    pub async fn save(&self, logs_dir: &Path) -> std::io::Result<PathBuf> {
        let task_dir = logs_dir.join(&self.task_id);
        tokio::fs::create_dir_all(&task_dir).await?;
        let path = task_dir.join("task.json");
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(&path, json).await?;
        tracing::info!(path = %path.display(), "task log saved");
        Ok(path)
    }

    /// Human-readable run report.
    #[must_use]
    pub fn render_summary(&self) -> String {
        let total = self.total_tokens.input + self.total_tokens.output;
        let mut lines = vec![
            format!("generation report [{}]", self.task_id),
            format!("  topic: {}", self.topic),
            format!("  status: {:?}", self.status),
            format!("  duration: {:.1}s", self.total_duration_ms as f64 / 1000.0),
            format!("  tokens: {total}"),
            format!("  revisions: {}", self.revision_rounds),
            format!("  score: {}/100", self.final_score),
            format!("  word count: {}", self.word_count),
        ];
        let mut agents: Vec<_> = self.agent_stats.iter().collect();
        agents.sort_by(|a, b| b.1.duration_ms.cmp(&a.1.duration_ms));
        if !agents.is_empty() {
            lines.push("  agents:".into());
            for (agent, stats) in agents {
                lines.push(format!(
                    "  - {agent}: {} steps | {:.1}s | {} tokens",
                    stats.steps,
                    stats.duration_ms as f64 / 1000.0,
                    stats.tokens_input + stats.tokens_output,
                ));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_roll_up_into_aggregates() {
        let mut log = TaskLog::new("topic", "tutorial", "medium");
        log.log_step(
            "writer",
            "write_sections",
            "info",
            "ok",
            1200,
            StepTokens { input: 100, output: 900 },
        );
        log.log_step(
            "writer",
            "enhance",
            "info",
            "ok",
            300,
            StepTokens { input: 50, output: 100 },
        );
        log.log_step("reviewer", "review", "info", "ok", 200, StepTokens::default());

        assert_eq!(log.steps.len(), 3);
        assert_eq!(log.total_duration_ms, 1700);
        assert_eq!(log.total_tokens.output, 1000);
        let writer = log.agent_stats.get("writer").unwrap();
        assert_eq!(writer.steps, 2);
        assert_eq!(writer.duration_ms, 1500);
    }

    #[test]
    fn detail_is_truncated() {
        let mut log = TaskLog::new("t", "tutorial", "mini");
        let long = "x".repeat(2000);
        log.log_step("a", "b", "info", &long, 0, StepTokens::default());
        assert!(log.steps[0].detail.chars().count() <= 503);
    }

    #[tokio::test]
    async fn save_writes_one_json_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = TaskLog::new("t", "tutorial", "mini");
        log.complete(88, 1234, 1);
        let path = log.save(dir.path()).await.unwrap();
        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let back: TaskLog = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.final_score, 88);
        assert_eq!(back.status, TaskStatus::Completed);
    }
}
