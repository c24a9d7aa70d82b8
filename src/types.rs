//! Core identifier and classification types for the article workflow.
//!
//! [`NodeKind`] names every node in the generation graph; the remaining
//! enums classify lengths, model tiers, narrative structure, image kinds,
//! and issue severities used across the shared state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a node within the generation workflow graph.
///
/// `Start` and `End` are virtual endpoints: they are never registered with
/// an agent and never executed. Every other variant corresponds to exactly
/// one agent node.
///
/// # Persistence
///
/// `NodeKind` round-trips through [`encode`](Self::encode) /
/// [`decode`](Self::decode) for checkpoints and task logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Start,
    Researcher,
    Planner,
    Writer,
    CheckKnowledge,
    RefineSearch,
    EnhanceWithKnowledge,
    Questioner,
    DeepenContent,
    SectionEvaluate,
    SectionImprove,
    CoderAndArtist,
    CrossSectionDedup,
    ConsistencyCheck,
    Reviewer,
    Revision,
    FactCheck,
    TextCleanup,
    Humanizer,
    Assembler,
    SummaryGenerator,
    End,
}

impl NodeKind {
    /// All executable nodes, in canonical pipeline order.
    pub const ALL: [NodeKind; 20] = [
        NodeKind::Researcher,
        NodeKind::Planner,
        NodeKind::Writer,
        NodeKind::CheckKnowledge,
        NodeKind::RefineSearch,
        NodeKind::EnhanceWithKnowledge,
        NodeKind::Questioner,
        NodeKind::DeepenContent,
        NodeKind::SectionEvaluate,
        NodeKind::SectionImprove,
        NodeKind::CoderAndArtist,
        NodeKind::CrossSectionDedup,
        NodeKind::ConsistencyCheck,
        NodeKind::Reviewer,
        NodeKind::Revision,
        NodeKind::FactCheck,
        NodeKind::TextCleanup,
        NodeKind::Humanizer,
        NodeKind::Assembler,
        NodeKind::SummaryGenerator,
    ];

    /// Encode into the persisted string form.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            NodeKind::Start => "start",
            NodeKind::Researcher => "researcher",
            NodeKind::Planner => "planner",
            NodeKind::Writer => "writer",
            NodeKind::CheckKnowledge => "check_knowledge",
            NodeKind::RefineSearch => "refine_search",
            NodeKind::EnhanceWithKnowledge => "enhance_with_knowledge",
            NodeKind::Questioner => "questioner",
            NodeKind::DeepenContent => "deepen_content",
            NodeKind::SectionEvaluate => "section_evaluate",
            NodeKind::SectionImprove => "section_improve",
            NodeKind::CoderAndArtist => "coder_and_artist",
            NodeKind::CrossSectionDedup => "cross_section_dedup",
            NodeKind::ConsistencyCheck => "consistency_check",
            NodeKind::Reviewer => "reviewer",
            NodeKind::Revision => "revision",
            NodeKind::FactCheck => "factcheck",
            NodeKind::TextCleanup => "text_cleanup",
            NodeKind::Humanizer => "humanizer",
            NodeKind::Assembler => "assembler",
            NodeKind::SummaryGenerator => "summary_generator",
            NodeKind::End => "end",
        }
    }

    /// Decode a persisted string form. Unknown strings fall back to `End`
    /// so a stale checkpoint terminates instead of executing a wrong node.
    pub fn decode(s: &str) -> Self {
        NodeKind::ALL
            .iter()
            .copied()
            .chain([NodeKind::Start, NodeKind::End])
            .find(|k| k.encode() == s)
            .unwrap_or(NodeKind::End)
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        matches!(self, NodeKind::Start | NodeKind::End)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}

impl From<&str> for NodeKind {
    fn from(s: &str) -> Self {
        NodeKind::decode(s)
    }
}

/// Target article length preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetLength {
    Mini,
    Short,
    #[default]
    Medium,
    Long,
    Custom,
}

impl TargetLength {
    pub fn parse(s: &str) -> Self {
        match s {
            "mini" => TargetLength::Mini,
            "short" => TargetLength::Short,
            "long" => TargetLength::Long,
            "custom" => TargetLength::Custom,
            _ => TargetLength::Medium,
        }
    }

    /// Cap on knowledge-refinement search rounds for this length.
    #[must_use]
    pub fn max_search_count(&self) -> u32 {
        match self {
            TargetLength::Mini => 2,
            TargetLength::Short => 3,
            TargetLength::Medium | TargetLength::Custom => 5,
            TargetLength::Long => 8,
        }
    }

    /// Cap on total generated images for this length.
    #[must_use]
    pub fn image_budget(&self) -> usize {
        match self {
            TargetLength::Mini => 3,
            TargetLength::Short => 5,
            TargetLength::Medium | TargetLength::Custom => 8,
            TargetLength::Long => 12,
        }
    }
}

impl fmt::Display for TargetLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetLength::Mini => "mini",
            TargetLength::Short => "short",
            TargetLength::Medium => "medium",
            TargetLength::Long => "long",
            TargetLength::Custom => "custom",
        };
        f.write_str(s)
    }
}

/// LLM model class an agent is routed to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Fast,
    #[default]
    Smart,
    Strategic,
}

impl Tier {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fast" => Some(Tier::Fast),
            "smart" => Some(Tier::Smart),
            "strategic" => Some(Tier::Strategic),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Fast => "fast",
            Tier::Smart => "smart",
            Tier::Strategic => "strategic",
        };
        f.write_str(s)
    }
}

/// Whole-article narrative structure chosen by the planner.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NarrativeMode {
    #[default]
    WhatWhyHow,
    ProblemSolution,
    BeforeAfter,
    Tutorial,
    DeepDive,
    Catalog,
}

/// Function a section plays within the narrative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeRole {
    Hook,
    #[default]
    What,
    Why,
    How,
    Compare,
    DeepDive,
    Verify,
    Summary,
    CatalogItem,
}

/// Kind of illustration declared for a section or placeholder.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    #[default]
    None,
    Flowchart,
    Infographic,
    Comparison,
    Framework,
    Timeline,
    Scene,
    AiImage,
}

impl ImageKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "flowchart" => ImageKind::Flowchart,
            "infographic" => ImageKind::Infographic,
            "comparison" => ImageKind::Comparison,
            "framework" => ImageKind::Framework,
            "timeline" => ImageKind::Timeline,
            "scene" => ImageKind::Scene,
            "ai_image" => ImageKind::AiImage,
            _ => ImageKind::None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageKind::None => "none",
            ImageKind::Flowchart => "flowchart",
            ImageKind::Infographic => "infographic",
            ImageKind::Comparison => "comparison",
            ImageKind::Framework => "framework",
            ImageKind::Timeline => "timeline",
            ImageKind::Scene => "scene",
            ImageKind::AiImage => "ai_image",
        }
    }
}

/// How a generated image is rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMethod {
    #[default]
    Mermaid,
    AiImage,
    Svg,
}

/// Severity of a review or consistency issue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    pub fn parse(s: &str) -> Self {
        match s {
            "high" => Severity::High,
            "low" => Severity::Low,
            _ => Severity::Medium,
        }
    }
}

/// Classification of a detected knowledge gap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    #[default]
    MissingData,
    VagueConcept,
    NoExample,
}

impl GapType {
    pub fn parse(s: &str) -> Self {
        match s {
            "vague_concept" => GapType::VagueConcept,
            "no_example" => GapType::NoExample,
            _ => GapType::MissingData,
        }
    }

    /// Gaps of these types are worth another search round.
    #[must_use]
    pub fn warrants_search(&self) -> bool {
        matches!(self, GapType::MissingData | GapType::VagueConcept)
    }
}

/// Depth bar the questioner holds sections to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthRequirement {
    Minimal,
    Shallow,
    #[default]
    Medium,
    Deep,
}

impl DepthRequirement {
    /// Minimum acceptable depth score (0-100) for this requirement.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        match self {
            DepthRequirement::Minimal => 50,
            DepthRequirement::Shallow => 60,
            DepthRequirement::Medium => 70,
            DepthRequirement::Deep => 80,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_encode_decode_round_trip() {
        for kind in NodeKind::ALL
            .iter()
            .copied()
            .chain([NodeKind::Start, NodeKind::End])
        {
            assert_eq!(NodeKind::decode(kind.encode()), kind);
        }
    }

    #[test]
    fn unknown_node_kind_decodes_to_end() {
        assert_eq!(NodeKind::decode("no_such_node"), NodeKind::End);
    }

    #[test]
    fn search_caps_follow_length() {
        assert_eq!(TargetLength::Mini.max_search_count(), 2);
        assert_eq!(TargetLength::Short.max_search_count(), 3);
        assert_eq!(TargetLength::Medium.max_search_count(), 5);
        assert_eq!(TargetLength::Long.max_search_count(), 8);
    }

    #[test]
    fn depth_thresholds_are_monotonic() {
        assert!(DepthRequirement::Minimal.threshold() < DepthRequirement::Shallow.threshold());
        assert!(DepthRequirement::Shallow.threshold() < DepthRequirement::Medium.threshold());
        assert!(DepthRequirement::Medium.threshold() < DepthRequirement::Deep.threshold());
    }
}
