//! The shared, monotonically growing state every agent reads and updates.
//!
//! The driver owns an [`ArticleState`] per run; exactly one node mutates it
//! at a time. Intra-node parallel tasks clone the inputs they need and
//! write results back in submission order, so the state itself is never
//! shared across threads mutably.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::article::{
    CodeBlock, DepthVerdict, ImageAsset, KeyConcept, KnowledgeGap, Outline, ReferenceLink,
    ReviewIssue, SearchResult, SearchRound, Section, SectionEvaluation, VerbatimData,
};
use crate::profile::StyleProfile;
use crate::types::TargetLength;

/// Inputs for one generation run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArticleRequest {
    pub topic: String,
    pub article_type: String,
    pub target_audience: String,
    pub target_length: TargetLength,
    #[serde(default)]
    pub source_material: Option<String>,
    #[serde(default)]
    pub style: Option<StyleProfile>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default)]
    pub document_knowledge: Option<String>,
    #[serde(default)]
    pub document_ids: Vec<String>,
    #[serde(default)]
    pub image_style: String,
}

impl ArticleRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        ArticleRequest {
            topic: topic.into(),
            article_type: "tutorial".into(),
            target_audience: "intermediate".into(),
            target_length: TargetLength::Medium,
            source_material: None,
            style: None,
            interactive: false,
            document_knowledge: None,
            document_ids: Vec::new(),
            image_style: String::new(),
        }
    }

    pub fn article_type(mut self, t: impl Into<String>) -> Self {
        self.article_type = t.into();
        self
    }

    pub fn target_audience(mut self, a: impl Into<String>) -> Self {
        self.target_audience = a.into();
        self
    }

    pub fn target_length(mut self, l: TargetLength) -> Self {
        self.target_length = l;
        self
    }

    pub fn style(mut self, s: StyleProfile) -> Self {
        self.style = Some(s);
        self
    }

    pub fn interactive(mut self, on: bool) -> Self {
        self.interactive = on;
        self
    }
}

/// The shared task state. See the field groups below; every agent reads
/// and writes a documented subset.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ArticleState {
    // -- Request (immutable after init) --
    pub topic: String,
    pub article_type: String,
    pub target_audience: String,
    pub target_length: TargetLength,
    pub audience_adaptation: String,
    pub style: StyleProfile,
    pub image_style: String,
    #[serde(default)]
    pub source_material: Option<String>,
    #[serde(default)]
    pub document_knowledge: Option<String>,
    #[serde(default)]
    pub document_ids: Vec<String>,
    pub trace_id: String,

    // -- Research outputs --
    #[serde(default)]
    pub background_knowledge: String,
    #[serde(default)]
    pub key_concepts: Vec<KeyConcept>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(default)]
    pub reference_links: Vec<ReferenceLink>,
    #[serde(default)]
    pub distilled_sources: Vec<Value>,
    #[serde(default)]
    pub material_by_type: FxHashMap<String, Vec<String>>,
    #[serde(default)]
    pub common_themes: Vec<String>,
    #[serde(default)]
    pub contradictions: Vec<String>,
    #[serde(default)]
    pub content_gaps: Vec<String>,
    #[serde(default)]
    pub unique_angles: Vec<String>,
    #[serde(default)]
    pub writing_recommendations: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub verbatim_data: VerbatimData,
    #[serde(default)]
    pub knowledge_source_stats: FxHashMap<String, usize>,
    #[serde(default)]
    pub prefetch_docs: Vec<Value>,

    // -- Plan and content --
    #[serde(default)]
    pub outline: Option<Outline>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub code_blocks: Vec<CodeBlock>,
    #[serde(default)]
    pub images: Vec<ImageAsset>,
    #[serde(default)]
    pub persona_prompt: String,

    // -- Knowledge loop --
    #[serde(default)]
    pub accumulated_knowledge: String,
    #[serde(default)]
    pub knowledge_gaps: Vec<KnowledgeGap>,
    #[serde(default)]
    pub search_history: Vec<SearchRound>,
    pub search_count: u32,
    pub max_search_count: u32,

    // -- Quality loops --
    pub questioning_count: u32,
    #[serde(default)]
    pub question_results: Vec<DepthVerdict>,
    #[serde(default = "default_true")]
    pub all_sections_detailed: bool,
    pub section_improve_count: u32,
    #[serde(default)]
    pub section_evaluations: Vec<SectionEvaluation>,
    #[serde(default)]
    pub needs_section_improvement: bool,
    #[serde(default)]
    pub prev_section_avg_score: f32,
    pub revision_count: u32,
    #[serde(default)]
    pub review_score: u32,
    #[serde(default)]
    pub review_issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub review_approved: bool,
    #[serde(default)]
    pub thread_issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub voice_issues: Vec<ReviewIssue>,
    #[serde(default)]
    pub factcheck_issues: Vec<ReviewIssue>,

    // -- Derived outputs --
    #[serde(default)]
    pub final_markdown: String,
    #[serde(default)]
    pub seo_keywords: Vec<String>,
    #[serde(default)]
    pub social_summary: String,
    #[serde(default)]
    pub meta_description: String,

    // -- Error channel --
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_history: Vec<String>,
    /// Per-node scratch, drained into `error_history` by middleware.
    #[serde(default)]
    pub node_errors: Vec<String>,

    // -- Budget signals --
    #[serde(default)]
    pub token_budget_warning: bool,
    #[serde(default)]
    pub context_usage_ratio: f32,
}

fn default_true() -> bool {
    true
}

impl ArticleState {
    /// Initialize state for a run. Applies the search cap for the length
    /// and resolves the style profile (explicit > length preset).
    pub fn new(request: &ArticleRequest) -> Self {
        let style = request
            .style
            .clone()
            .unwrap_or_else(|| StyleProfile::from_target_length(request.target_length));
        let image_style = if !request.image_style.is_empty() {
            request.image_style.clone()
        } else {
            style.image_style.clone()
        };
        ArticleState {
            topic: request.topic.clone(),
            article_type: request.article_type.clone(),
            target_audience: request.target_audience.clone(),
            target_length: request.target_length,
            audience_adaptation: format!("technical-{}", request.target_audience),
            style,
            image_style,
            source_material: request.source_material.clone(),
            document_knowledge: request.document_knowledge.clone(),
            document_ids: request.document_ids.clone(),
            trace_id: short_trace_id(),
            max_search_count: request.target_length.max_search_count(),
            all_sections_detailed: true,
            ..Default::default()
        }
    }

    /// Record a fatal failure. All downstream nodes become no-ops.
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(error = %message, "workflow failed");
        if self.error.is_none() {
            self.error = Some(message);
        }
    }

    /// Record a non-fatal node error into the per-node scratch channel.
    pub fn record_node_error(&mut self, message: impl Into<String>) {
        self.node_errors.push(message.into());
    }

    #[must_use]
    pub fn has_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Total character count across section contents.
    #[must_use]
    pub fn content_word_count(&self) -> usize {
        self.sections.iter().map(|s| s.content.chars().count()).sum()
    }

    #[must_use]
    pub fn section_by_id(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    pub fn section_by_id_mut(&mut self, id: &str) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == id)
    }

    /// Knowledge available to content-enhancing passes: accumulated if
    /// present, else the researcher baseline.
    #[must_use]
    pub fn effective_knowledge(&self) -> &str {
        if self.accumulated_knowledge.is_empty() {
            &self.background_knowledge
        } else {
            &self.accumulated_knowledge
        }
    }
}

fn short_trace_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_applies_length_caps() {
        let req = ArticleRequest::new("rust atomics").target_length(TargetLength::Short);
        let state = ArticleState::new(&req);
        assert_eq!(state.max_search_count, 3);
        assert_eq!(state.search_count, 0);
        assert!(state.all_sections_detailed);
        assert_eq!(state.trace_id.len(), 8);
    }

    #[test]
    fn explicit_style_wins_over_preset() {
        let custom = StyleProfile {
            max_revision_rounds: 9,
            ..StyleProfile::medium()
        };
        let req = ArticleRequest::new("t")
            .target_length(TargetLength::Mini)
            .style(custom);
        let state = ArticleState::new(&req);
        assert_eq!(state.style.max_revision_rounds, 9);
    }

    #[test]
    fn fail_keeps_first_error() {
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.fail("first");
        state.fail("second");
        assert_eq!(state.error.as_deref(), Some("first"));
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.background_knowledge = "bg".into();
        state.search_count = 2;
        let json = serde_json::to_string(&state).unwrap();
        let back: ArticleState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.search_count, 2);
        assert_eq!(back.background_knowledge, "bg");
    }
}
