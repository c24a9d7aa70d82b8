//! Style profiles: the preset-driven switch board for loop bounds and
//! optional stages.
//!
//! A profile is resolved once per run, either explicitly or from the
//! requested target length, and then travels inside the shared state. The
//! workflow is the skeleton; the profile is the skin.

use serde::{Deserialize, Serialize};

use crate::types::{DepthRequirement, TargetLength};

/// How the revision node applies reviewer issues.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStrategy {
    /// Group issues by section and correct in place (word count capped).
    CorrectOnly,
    /// Rewrite around each issue individually.
    #[default]
    FullRevise,
}

/// Which reviewer issues are worth a revision round.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityFilter {
    HighOnly,
    #[default]
    All,
}

/// Image generation mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMode {
    /// One styled image per section, shared look, usable as video frames.
    MiniSection,
    #[default]
    Full,
}

/// Immutable per-run configuration controlling loop caps and optional
/// stages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub max_revision_rounds: u32,
    pub revision_strategy: RevisionStrategy,
    pub revision_severity_filter: SeverityFilter,
    pub depth_requirement: DepthRequirement,
    pub enable_knowledge_refinement: bool,
    pub image_generation_mode: ImageMode,

    pub tone: String,
    pub complexity: String,
    pub verbosity: String,

    /// Image style id; empty means "use the caller-provided value".
    pub image_style: String,

    pub enable_fact_check: bool,
    pub enable_thread_check: bool,
    pub enable_voice_check: bool,
    pub enable_humanizer: bool,
    pub enable_text_cleanup: bool,
    pub enable_summary_gen: bool,

    /// Auto-augment AI topics with the curated research sources.
    pub enable_ai_boost: bool,

    /// Preset author voice key; empty means no persona injection.
    pub persona_key: String,

    /// Custom review criteria; empty means the default dimensions.
    pub review_guidelines: Vec<String>,
}

impl Default for StyleProfile {
    fn default() -> Self {
        StyleProfile {
            max_revision_rounds: 3,
            revision_strategy: RevisionStrategy::FullRevise,
            revision_severity_filter: SeverityFilter::All,
            depth_requirement: DepthRequirement::Medium,
            enable_knowledge_refinement: true,
            image_generation_mode: ImageMode::Full,
            tone: "professional".into(),
            complexity: "intermediate".into(),
            verbosity: "balanced".into(),
            image_style: String::new(),
            enable_fact_check: false,
            enable_thread_check: true,
            enable_voice_check: true,
            enable_humanizer: true,
            enable_text_cleanup: true,
            enable_summary_gen: true,
            enable_ai_boost: true,
            persona_key: String::new(),
            review_guidelines: Vec::new(),
        }
    }
}

impl StyleProfile {
    pub fn mini() -> Self {
        StyleProfile {
            max_revision_rounds: 1,
            revision_strategy: RevisionStrategy::CorrectOnly,
            revision_severity_filter: SeverityFilter::HighOnly,
            depth_requirement: DepthRequirement::Minimal,
            enable_knowledge_refinement: false,
            image_generation_mode: ImageMode::MiniSection,
            tone: "casual".into(),
            complexity: "beginner".into(),
            verbosity: "concise".into(),
            enable_fact_check: true,
            enable_thread_check: false,
            enable_voice_check: false,
            enable_ai_boost: false,
            ..Default::default()
        }
    }

    pub fn short() -> Self {
        StyleProfile {
            max_revision_rounds: 1,
            revision_strategy: RevisionStrategy::CorrectOnly,
            revision_severity_filter: SeverityFilter::HighOnly,
            depth_requirement: DepthRequirement::Shallow,
            enable_knowledge_refinement: false,
            image_generation_mode: ImageMode::MiniSection,
            verbosity: "concise".into(),
            ..Default::default()
        }
    }

    pub fn medium() -> Self {
        StyleProfile::default()
    }

    pub fn long() -> Self {
        StyleProfile {
            max_revision_rounds: 5,
            depth_requirement: DepthRequirement::Deep,
            complexity: "advanced".into(),
            verbosity: "detailed".into(),
            enable_fact_check: true,
            ..Default::default()
        }
    }

    pub fn deep_analysis() -> Self {
        StyleProfile {
            tone: "academic".into(),
            ..Self::long()
        }
    }

    pub fn science_popular() -> Self {
        StyleProfile {
            tone: "casual".into(),
            complexity: "beginner".into(),
            image_style: "watercolor".into(),
            ..Default::default()
        }
    }

    /// Map a target length to its preset.
    pub fn from_target_length(length: TargetLength) -> Self {
        match length {
            TargetLength::Mini => Self::mini(),
            TargetLength::Short => Self::short(),
            TargetLength::Medium | TargetLength::Custom => Self::medium(),
            TargetLength::Long => Self::long(),
        }
    }

    /// Resolve a preset by name, used by the `style` config option.
    pub fn by_name(name: &str) -> Option<Self> {
        match name {
            "mini" => Some(Self::mini()),
            "short" => Some(Self::short()),
            "medium" => Some(Self::medium()),
            "long" => Some(Self::long()),
            "deep_analysis" => Some(Self::deep_analysis()),
            "science_popular" => Some(Self::science_popular()),
            _ => None,
        }
    }

    /// Persona prompt segment for the writer, gated by
    /// `AGENT_PERSONA_ENABLED`.
    pub fn persona_prompt(&self) -> String {
        if self.persona_key.is_empty() {
            return String::new();
        }
        let enabled = std::env::var("AGENT_PERSONA_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if !enabled {
            return String::new();
        }
        persona_segment(&self.persona_key).unwrap_or_default()
    }
}

/// Size targets derived from the requested length.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthPreset {
    pub target_sections_count: usize,
    pub target_images_count: usize,
    pub target_code_blocks_count: usize,
    pub target_word_count: usize,
}

impl LengthPreset {
    pub fn for_length(length: TargetLength) -> Self {
        match length {
            TargetLength::Mini => LengthPreset {
                target_sections_count: 1,
                target_images_count: 3,
                target_code_blocks_count: 1,
                target_word_count: 800,
            },
            TargetLength::Short => LengthPreset {
                target_sections_count: 3,
                target_images_count: 5,
                target_code_blocks_count: 2,
                target_word_count: 2000,
            },
            TargetLength::Medium | TargetLength::Custom => LengthPreset {
                target_sections_count: 5,
                target_images_count: 8,
                target_code_blocks_count: 3,
                target_word_count: 4000,
            },
            TargetLength::Long => LengthPreset {
                target_sections_count: 8,
                target_images_count: 12,
                target_code_blocks_count: 5,
                target_word_count: 8000,
            },
        }
    }
}

/// Predefined author voices. Deliberately small; the writer prompt quotes
/// the segment verbatim.
fn persona_segment(key: &str) -> Option<String> {
    let (name, voice) = match key {
        "tech_expert" => (
            "seasoned platform engineer",
            "direct, example-first, allergic to hype; cites numbers before adjectives",
        ),
        "patient_teacher" => (
            "patient teacher",
            "walks the reader through one idea at a time, anticipates confusion, uses analogies sparingly",
        ),
        "storyteller" => (
            "technical storyteller",
            "opens with a concrete scene, keeps a through-line, lands every section on a takeaway",
        ),
        _ => return None,
    };
    Some(format!(
        "Write in the voice of a {name}. Voice notes: {voice}."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mini_preset_is_tightly_bounded() {
        let p = StyleProfile::mini();
        assert_eq!(p.max_revision_rounds, 1);
        assert_eq!(p.revision_strategy, RevisionStrategy::CorrectOnly);
        assert_eq!(p.revision_severity_filter, SeverityFilter::HighOnly);
        assert!(!p.enable_knowledge_refinement);
        assert_eq!(p.image_generation_mode, ImageMode::MiniSection);
    }

    #[test]
    fn long_preset_enables_all_checkers() {
        let p = StyleProfile::long();
        assert_eq!(p.max_revision_rounds, 5);
        assert!(p.enable_fact_check);
        assert!(p.enable_thread_check);
        assert!(p.enable_voice_check);
    }

    #[test]
    fn length_presets_scale_up() {
        let mini = LengthPreset::for_length(TargetLength::Mini);
        let long = LengthPreset::for_length(TargetLength::Long);
        assert_eq!(mini.target_sections_count, 1);
        assert!(long.target_sections_count > mini.target_sections_count);
        assert!(long.target_word_count > mini.target_word_count);
    }

    #[test]
    fn unknown_preset_name_is_none() {
        assert!(StyleProfile::by_name("nope").is_none());
        assert!(StyleProfile::by_name("deep_analysis").is_some());
    }
}
