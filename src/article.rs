//! Article domain model: outline, sections, code blocks, images, search
//! material, and the quality-signal records produced along the pipeline.
//!
//! Everything here is plain serializable data. Cross references between
//! sections and their code blocks / images are id-based indirections into
//! the flat lists held by the shared state, so there are no object cycles.

use serde::{Deserialize, Serialize};

use crate::types::{GapType, ImageKind, NarrativeMode, NarrativeRole, RenderMethod, Severity};

/// Planned shape of the article produced by the planner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub introduction: String,
    #[serde(default)]
    pub core_value: String,
    /// Estimated reading time in minutes.
    #[serde(default)]
    pub reading_time: u32,
    pub sections: Vec<SectionPlan>,
    #[serde(default)]
    pub narrative_mode: NarrativeMode,
    #[serde(default)]
    pub narrative_flow: NarrativeFlow,
    #[serde(default)]
    pub conclusion: Conclusion,
}

/// One planned section of the outline.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionPlan {
    /// Stable id, matched by the written [`Section`]. Filled in by the
    /// planner when the model omits it.
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub key_concept: String,
    #[serde(default)]
    pub image_type: ImageKind,
    #[serde(default)]
    pub image_description: String,
    /// Type x Style axis; empty means "infer from content".
    #[serde(default)]
    pub illustration_type: String,
    #[serde(default)]
    pub narrative_role: NarrativeRole,
}

/// Reader journey the outline commits to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NarrativeFlow {
    #[serde(default)]
    pub reader_start: String,
    #[serde(default)]
    pub reader_end: String,
    /// At least three stops when produced by the planner.
    #[serde(default)]
    pub logic_chain: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conclusion {
    #[serde(default)]
    pub summary_points: Vec<String>,
    #[serde(default)]
    pub next_steps: String,
}

/// A written section. `id` matches the corresponding [`SectionPlan`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub image_ids: Vec<String>,
    #[serde(default)]
    pub code_ids: Vec<String>,
    #[serde(default)]
    pub narrative_role: NarrativeRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humanizer_score_before: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humanizer_score_after: Option<u32>,
    #[serde(default)]
    pub humanizer_skipped: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humanizer_error: Option<String>,
}

impl Section {
    pub fn from_plan(plan: &SectionPlan, content: String) -> Self {
        Section {
            id: plan.id.clone(),
            title: plan.title.clone(),
            content,
            narrative_role: plan.narrative_role,
            ..Default::default()
        }
    }
}

/// Generated code block, referenced from sections by id (`code_<n>`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: String,
    #[serde(default)]
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub explanation: String,
}

/// Generated image asset, referenced from sections by id (`img_<n>`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: String,
    #[serde(default)]
    pub render_method: RenderMethod,
    /// Mermaid/SVG source, or the rendering prompt for `ai_image`.
    pub content: String,
    #[serde(default)]
    pub caption: String,
    /// URL or local path once rendered; `ai_image` assets without one are
    /// dropped at assembly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_path: Option<String>,
}

/// One piece of web material collected by the researcher.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub source_type: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyConcept {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLink {
    pub title: String,
    pub url: String,
}

/// Knowledge gap reported by the search coordinator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    #[serde(default)]
    pub gap_type: GapType,
    pub description: String,
    #[serde(default)]
    pub suggested_query: String,
    /// Empty means the gap applies article-wide.
    #[serde(default)]
    pub section_id: String,
}

/// One refinement round recorded for observability.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRound {
    pub round: u32,
    pub queries: Vec<String>,
    pub results_count: usize,
    pub gaps_addressed: Vec<String>,
}

/// A vague passage flagged by the questioner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VaguePoint {
    #[serde(default)]
    pub location: String,
    pub issue: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub suggestion: String,
}

/// Per-section depth verdict from the questioner.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DepthVerdict {
    pub section_id: String,
    pub is_detailed_enough: bool,
    pub depth_score: u32,
    #[serde(default)]
    pub vague_points: Vec<VaguePoint>,
}

/// Four-dimension scores, each 1-10.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionScores {
    pub information_density: f32,
    pub logical_coherence: f32,
    pub professional_depth: f32,
    pub expression_quality: f32,
}

impl Default for SectionScores {
    fn default() -> Self {
        SectionScores {
            information_density: 7.0,
            logical_coherence: 7.0,
            professional_depth: 7.0,
            expression_quality: 7.0,
        }
    }
}

impl SectionScores {
    #[must_use]
    pub fn mean(&self) -> f32 {
        (self.information_density
            + self.logical_coherence
            + self.professional_depth
            + self.expression_quality)
            / 4.0
    }
}

/// Critic output for one section in the evaluate/improve loop.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionEvaluation {
    pub section_idx: usize,
    #[serde(default)]
    pub scores: SectionScores,
    pub overall_quality: f32,
    #[serde(default)]
    pub specific_issues: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
}

/// Issue raised by the reviewer or a consistency checker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewIssue {
    #[serde(default)]
    pub section_id: String,
    #[serde(default)]
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub suggestion: String,
    #[serde(default)]
    pub affected_content: String,
}

/// Literal strings that must survive into the final article unchanged.
pub type VerbatimData = Vec<String>;
