//! Composite nodes driving the bounded quality loops: content deepening,
//! section evaluate/improve, knowledge enhancement, and revision.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::article::{KnowledgeGap, ReviewIssue, SectionEvaluation, VaguePoint};
use crate::executor::{ParallelTask, TaskConfig};
use crate::llm::ChatRequest;
use crate::profile::RevisionStrategy;
use crate::prompts;
use crate::state::ArticleState;
use crate::types::NodeKind;

use super::{Agent, AgentContext, AgentError, QuestionerAgent, WriterAgent};

/// Below this overall score a section is queued for improvement.
const IMPROVE_THRESHOLD: f32 = 7.0;

/// Deepen node: rewrites every section flagged shallow by the questioner,
/// in parallel, and bumps the questioning counter.
pub struct DeepenContentAgent {
    writer: Arc<WriterAgent>,
}

impl DeepenContentAgent {
    pub fn new(writer: Arc<WriterAgent>) -> Self {
        DeepenContentAgent { writer }
    }
}

#[async_trait]
impl Agent for DeepenContentAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::DeepenContent
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        state.questioning_count += 1;
        let before = state.content_word_count();

        let targets: Vec<(String, String, String, Vec<VaguePoint>)> = state
            .question_results
            .iter()
            .filter(|v| !v.is_detailed_enough)
            .filter_map(|verdict| {
                state.section_by_id(&verdict.section_id).map(|section| {
                    (
                        section.id.clone(),
                        section.title.clone(),
                        section.content.clone(),
                        verdict.vague_points.clone(),
                    )
                })
            })
            .collect();
        if targets.is_empty() {
            tracing::info!("no sections need deepening");
            return Ok(());
        }

        let tasks: Vec<ParallelTask<(String, String)>> = targets
            .into_iter()
            .map(|(id, title, content, points)| {
                let writer = Arc::clone(&self.writer);
                ParallelTask::new(format!("deepen-{title}"), async move {
                    let enhanced = writer.enhance_section(&content, &points, &title).await?;
                    Ok((id, enhanced))
                })
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("content_deepen")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;
        for outcome in outcomes {
            match outcome.result {
                Some((id, content)) => {
                    if let Some(section) = state.section_by_id_mut(&id) {
                        section.content = content;
                    }
                }
                None => state.record_node_error(format!(
                    "deepen failed for {}: {}",
                    outcome.task_name,
                    outcome.error.unwrap_or_default()
                )),
            }
        }

        let after = state.content_word_count();
        tracing::info!(
            round = state.questioning_count,
            chars_added = after as i64 - before as i64,
            "deepen round complete"
        );
        Ok(())
    }
}

/// Section-evaluate node: the critic half of the improve loop. Scores all
/// sections on four dimensions and flags whether improvement is needed.
pub struct SectionEvaluateAgent {
    questioner: Arc<QuestionerAgent>,
}

impl SectionEvaluateAgent {
    pub fn new(questioner: Arc<QuestionerAgent>) -> Self {
        SectionEvaluateAgent { questioner }
    }
}

#[async_trait]
impl Agent for SectionEvaluateAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::SectionEvaluate
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        let style_enabled = state.style.enable_thread_check;
        if !(ctx.settings.section_eval_enabled && style_enabled) {
            state.section_evaluations = Vec::new();
            state.needs_section_improvement = false;
            return Ok(());
        }

        let mut evaluations = Vec::with_capacity(state.sections.len());
        let mut needs_improvement = false;
        for i in 0..state.sections.len() {
            let prev = if i > 0 { state.sections[i - 1].title.clone() } else { String::new() };
            let next = state
                .sections
                .get(i + 1)
                .map(|s| s.title.clone())
                .unwrap_or_default();
            let section = &state.sections[i];
            let mut evaluation = self
                .questioner
                .evaluate_section(&section.content, &section.title, &prev, &next)
                .await;
            evaluation.section_idx = i;
            if evaluation.overall_quality < IMPROVE_THRESHOLD {
                needs_improvement = true;
                tracing::info!(
                    section = %section.title,
                    overall = evaluation.overall_quality,
                    "section flagged for improvement"
                );
            }
            evaluations.push(evaluation);
        }

        let avg = average_quality(&evaluations);
        tracing::info!(avg, needs_improvement, "section evaluation complete");
        state.section_evaluations = evaluations;
        state.needs_section_improvement = needs_improvement;
        Ok(())
    }
}

pub(crate) fn average_quality(evaluations: &[SectionEvaluation]) -> f32 {
    if evaluations.is_empty() {
        return 0.0;
    }
    evaluations.iter().map(|e| e.overall_quality).sum::<f32>() / evaluations.len() as f32
}

/// Section-improve node: the generator half of the improve loop.
pub struct SectionImproveAgent {
    writer: Arc<WriterAgent>,
}

impl SectionImproveAgent {
    pub fn new(writer: Arc<WriterAgent>) -> Self {
        SectionImproveAgent { writer }
    }
}

#[async_trait]
impl Agent for SectionImproveAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::SectionImprove
    }

    async fn run(&self, state: &mut ArticleState, _ctx: &AgentContext) -> Result<(), AgentError> {
        let mut improved = 0usize;
        let evaluations = state.section_evaluations.clone();
        for evaluation in &evaluations {
            if evaluation.overall_quality >= IMPROVE_THRESHOLD {
                continue;
            }
            let Some(section) = state.sections.get(evaluation.section_idx) else {
                continue;
            };
            let title = section.title.clone();
            match self
                .writer
                .improve_section(&section.content, evaluation, &title)
                .await
            {
                Ok(content) => {
                    state.sections[evaluation.section_idx].content = content;
                    improved += 1;
                }
                Err(err) => state.record_node_error(format!("improve failed for {title}: {err}")),
            }
        }
        state.section_improve_count += 1;
        tracing::info!(
            improved,
            round = state.section_improve_count,
            "section improvement round complete"
        );
        Ok(())
    }
}

/// Knowledge-enhancement node: folds refinement-search findings back into
/// the affected sections, then clears the gap list so the loop predicate
/// re-evaluates from a clean slate.
pub struct EnhanceWithKnowledgeAgent {
    writer: Arc<WriterAgent>,
}

impl EnhanceWithKnowledgeAgent {
    pub fn new(writer: Arc<WriterAgent>) -> Self {
        EnhanceWithKnowledgeAgent { writer }
    }
}

#[async_trait]
impl Agent for EnhanceWithKnowledgeAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::EnhanceWithKnowledge
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        let gaps = state.knowledge_gaps.clone();
        let knowledge = state.accumulated_knowledge.clone();
        if gaps.is_empty() || knowledge.is_empty() {
            state.knowledge_gaps.clear();
            return Ok(());
        }

        // A gap either names a section or applies article-wide.
        let targets: Vec<(String, String, String, Vec<KnowledgeGap>)> = state
            .sections
            .iter()
            .filter_map(|section| {
                let relevant: Vec<KnowledgeGap> = gaps
                    .iter()
                    .filter(|g| g.section_id.is_empty() || g.section_id == section.id)
                    .cloned()
                    .collect();
                (!relevant.is_empty()).then(|| {
                    (
                        section.id.clone(),
                        section.title.clone(),
                        section.content.clone(),
                        relevant,
                    )
                })
            })
            .collect();

        let tasks: Vec<ParallelTask<(String, String)>> = targets
            .into_iter()
            .map(|(id, title, content, relevant)| {
                let writer = Arc::clone(&self.writer);
                let knowledge = knowledge.clone();
                ParallelTask::new(format!("enhance-{title}"), async move {
                    let prompt =
                        prompts::writer_enhance_with_knowledge(&content, &knowledge, &relevant);
                    let enhanced = writer
                        .llm()
                        .chat(ChatRequest::new(prompt).caller("writer.knowledge"))
                        .await
                        .map_err(|e| e.to_string())?;
                    Ok((id, enhanced))
                })
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("knowledge_enhance")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;
        let mut enhanced = 0usize;
        for outcome in outcomes {
            match outcome.result {
                Some((id, content)) if !content.trim().is_empty() => {
                    if let Some(section) = state.section_by_id_mut(&id) {
                        section.content = content;
                        enhanced += 1;
                    }
                }
                Some(_) => {}
                None => state.record_node_error(format!(
                    "knowledge enhancement failed: {}",
                    outcome.error.unwrap_or_default()
                )),
            }
        }
        tracing::info!(enhanced, "knowledge enhancement complete");
        state.knowledge_gaps.clear();
        Ok(())
    }
}

/// Revision node: applies reviewer issues with the configured strategy.
pub struct RevisionAgent {
    writer: Arc<WriterAgent>,
}

impl RevisionAgent {
    pub fn new(writer: Arc<WriterAgent>) -> Self {
        RevisionAgent { writer }
    }

    async fn correct_only(&self, state: &mut ArticleState, ctx: &AgentContext) {
        // Group issues by section; one correction call per section.
        let mut by_section: Vec<(String, Vec<ReviewIssue>)> = Vec::new();
        for issue in &state.review_issues {
            match by_section.iter_mut().find(|(id, _)| *id == issue.section_id) {
                Some((_, list)) => list.push(issue.clone()),
                None => by_section.push((issue.section_id.clone(), vec![issue.clone()])),
            }
        }

        let tasks: Vec<ParallelTask<(String, String)>> = by_section
            .into_iter()
            .filter_map(|(section_id, issues)| {
                let section = state.section_by_id(&section_id)?;
                let writer = Arc::clone(&self.writer);
                let title = section.title.clone();
                let content = section.content.clone();
                Some(ParallelTask::new(format!("correct-{title}"), async move {
                    let corrected = writer.correct_section(&content, &issues, &title).await?;
                    Ok((section_id, corrected))
                }))
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("revision_correct")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;
        for outcome in outcomes {
            match outcome.result {
                Some((id, content)) => {
                    if let Some(section) = state.section_by_id_mut(&id) {
                        section.content = content;
                    }
                }
                None => state.record_node_error(format!(
                    "correction failed: {}",
                    outcome.error.unwrap_or_default()
                )),
            }
        }
    }

    async fn full_revise(&self, state: &mut ArticleState, ctx: &AgentContext) {
        let issues = state.review_issues.clone();
        let tasks: Vec<ParallelTask<(String, String)>> = issues
            .iter()
            .filter_map(|issue| {
                let section = state.section_by_id(&issue.section_id)?;
                let writer = Arc::clone(&self.writer);
                let title = section.title.clone();
                let content = section.content.clone();
                let section_id = issue.section_id.clone();
                let points = vec![VaguePoint {
                    location: title.clone(),
                    issue: issue.description.clone(),
                    question: issue.suggestion.clone(),
                    suggestion: "根据审核建议修改".to_string(),
                }];
                Some(ParallelTask::new(format!("revise-{title}"), async move {
                    let revised = writer.enhance_section(&content, &points, &title).await?;
                    Ok((section_id, revised))
                }))
            })
            .collect();

        let outcomes = ctx
            .executor
            .run_parallel(
                tasks,
                TaskConfig::new("revision_enhance")
                    .timeout(Duration::from_secs(120))
                    .max_workers(ctx.workers()),
            )
            .await;
        for outcome in outcomes {
            match outcome.result {
                Some((id, content)) => {
                    if let Some(section) = state.section_by_id_mut(&id) {
                        section.content = content;
                    }
                }
                None => state.record_node_error(format!(
                    "revision failed: {}",
                    outcome.error.unwrap_or_default()
                )),
            }
        }
    }
}

#[async_trait]
impl Agent for RevisionAgent {
    fn kind(&self) -> NodeKind {
        NodeKind::Revision
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        state.revision_count += 1;
        let before = state.content_word_count();
        if state.review_issues.is_empty() {
            tracing::info!("no issues to revise");
            return Ok(());
        }
        match state.style.revision_strategy {
            RevisionStrategy::CorrectOnly => self.correct_only(state, ctx).await,
            RevisionStrategy::FullRevise => self.full_revise(state, ctx).await,
        }
        let after = state.content_word_count();
        tracing::info!(
            round = state.revision_count,
            delta = after as i64 - before as i64,
            "revision round complete"
        );
        Ok(())
    }
}
