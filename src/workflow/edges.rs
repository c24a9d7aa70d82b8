//! The four conditional-edge predicates.
//!
//! Predicates take the state mutably, matching the original semantics: the
//! revise predicate narrows the issue list under the high-only filter, and
//! the improve predicate records the rolling average it compared against.

use crate::profile::SeverityFilter;
use crate::state::ArticleState;
use crate::types::{NodeKind, Severity};

/// Regular cap on deepen rounds.
pub const MAX_QUESTIONING_ROUNDS: u32 = 2;
/// Hard cap guarding against a stuck depth verdict.
pub const QUESTIONING_HARD_CAP: u32 = 5;
/// Cap on section-improvement rounds.
pub const MAX_SECTION_IMPROVE_ROUNDS: u32 = 2;
/// Minimum average-score gain for another improvement round.
const CONVERGENCE_DELTA: f32 = 0.3;

/// After check-knowledge: refine the search or move on to the questioner.
pub fn should_refine_search(state: &mut ArticleState) -> NodeKind {
    if !state.style.enable_knowledge_refinement {
        tracing::info!("knowledge refinement disabled by style");
        return NodeKind::Questioner;
    }
    if state.search_count < state.max_search_count {
        let important = state
            .knowledge_gaps
            .iter()
            .filter(|g| g.gap_type.warrants_search())
            .count();
        if important > 0 {
            tracing::info!(important, "important knowledge gaps found, refining search");
            return NodeKind::RefineSearch;
        }
    }
    NodeKind::Questioner
}

/// After the questioner: deepen shallow sections or move to evaluation.
pub fn should_deepen(state: &mut ArticleState) -> NodeKind {
    if state.questioning_count >= QUESTIONING_HARD_CAP {
        tracing::warn!(cap = QUESTIONING_HARD_CAP, "deepen hard cap reached");
        return NodeKind::SectionEvaluate;
    }
    if !state.all_sections_detailed && state.questioning_count < MAX_QUESTIONING_ROUNDS {
        return NodeKind::DeepenContent;
    }
    NodeKind::SectionEvaluate
}

/// After section evaluation: improve or continue to media generation.
pub fn should_improve_sections(state: &mut ArticleState) -> NodeKind {
    if !state.needs_section_improvement {
        return NodeKind::CoderAndArtist;
    }
    if state.section_improve_count >= MAX_SECTION_IMPROVE_ROUNDS {
        tracing::info!("section improvement round cap reached");
        return NodeKind::CoderAndArtist;
    }
    let evaluations = &state.section_evaluations;
    let curr_avg = if evaluations.is_empty() {
        0.0
    } else {
        evaluations.iter().map(|e| e.overall_quality).sum::<f32>() / evaluations.len() as f32
    };
    let prev_avg = state.prev_section_avg_score;
    if prev_avg > 0.0 && (curr_avg - prev_avg) < CONVERGENCE_DELTA {
        tracing::info!(prev_avg, curr_avg, "section improvement converged");
        return NodeKind::CoderAndArtist;
    }
    state.prev_section_avg_score = curr_avg;
    NodeKind::SectionImprove
}

/// After the reviewer: another revision round or on toward assembly.
pub fn should_revise(state: &mut ArticleState) -> NodeKind {
    if state.revision_count >= state.style.max_revision_rounds {
        tracing::info!(
            rounds = state.style.max_revision_rounds,
            "revision round cap reached"
        );
        return NodeKind::FactCheck;
    }
    if state.style.revision_severity_filter == SeverityFilter::HighOnly {
        let high: Vec<_> = state
            .review_issues
            .iter()
            .filter(|i| i.severity == Severity::High)
            .cloned()
            .collect();
        if high.is_empty() {
            tracing::info!("no high-severity issues, skipping revision");
            return NodeKind::FactCheck;
        }
        tracing::info!(count = high.len(), "revising high-severity issues only");
        state.review_issues = high;
        return NodeKind::Revision;
    }
    if !state.review_approved {
        return NodeKind::Revision;
    }
    NodeKind::FactCheck
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::{KnowledgeGap, ReviewIssue, SectionEvaluation};
    use crate::profile::StyleProfile;
    use crate::state::ArticleRequest;
    use crate::types::{GapType, TargetLength};

    fn state() -> ArticleState {
        let style = StyleProfile {
            enable_knowledge_refinement: true,
            ..StyleProfile::medium()
        };
        ArticleState::new(
            &ArticleRequest::new("t")
                .target_length(TargetLength::Short)
                .style(style),
        )
    }

    #[test]
    fn refine_search_requires_important_gaps_and_quota() {
        let mut s = state();
        assert_eq!(should_refine_search(&mut s), NodeKind::Questioner);

        s.knowledge_gaps = vec![KnowledgeGap {
            gap_type: GapType::NoExample,
            description: "needs example".into(),
            ..Default::default()
        }];
        // no_example gaps alone never trigger another search round
        assert_eq!(should_refine_search(&mut s), NodeKind::Questioner);

        s.knowledge_gaps[0].gap_type = GapType::MissingData;
        assert_eq!(should_refine_search(&mut s), NodeKind::RefineSearch);

        s.search_count = s.max_search_count;
        assert_eq!(should_refine_search(&mut s), NodeKind::Questioner);
    }

    #[test]
    fn refine_search_respects_style_switch() {
        let mut s = ArticleState::new(
            &ArticleRequest::new("t").style(StyleProfile::mini()),
        );
        s.knowledge_gaps = vec![KnowledgeGap {
            gap_type: GapType::MissingData,
            description: "gap".into(),
            ..Default::default()
        }];
        assert_eq!(should_refine_search(&mut s), NodeKind::Questioner);
    }

    #[test]
    fn deepen_is_bounded_twice_and_hard_capped() {
        let mut s = state();
        s.all_sections_detailed = false;
        assert_eq!(should_deepen(&mut s), NodeKind::DeepenContent);
        s.questioning_count = MAX_QUESTIONING_ROUNDS;
        assert_eq!(should_deepen(&mut s), NodeKind::SectionEvaluate);
        s.questioning_count = QUESTIONING_HARD_CAP;
        assert_eq!(should_deepen(&mut s), NodeKind::SectionEvaluate);
    }

    #[test]
    fn improvement_stops_on_convergence() {
        let mut s = state();
        s.needs_section_improvement = true;
        s.section_evaluations = vec![SectionEvaluation {
            overall_quality: 6.0,
            ..Default::default()
        }];
        assert_eq!(should_improve_sections(&mut s), NodeKind::SectionImprove);
        assert_eq!(s.prev_section_avg_score, 6.0);

        // Second round: score barely moved, converged.
        s.section_evaluations[0].overall_quality = 6.2;
        assert_eq!(should_improve_sections(&mut s), NodeKind::CoderAndArtist);
    }

    #[test]
    fn improvement_round_cap_holds() {
        let mut s = state();
        s.needs_section_improvement = true;
        s.section_improve_count = MAX_SECTION_IMPROVE_ROUNDS;
        assert_eq!(should_improve_sections(&mut s), NodeKind::CoderAndArtist);
    }

    #[test]
    fn revision_cap_and_approval_routing() {
        let mut s = state();
        s.review_approved = false;
        assert_eq!(should_revise(&mut s), NodeKind::Revision);
        s.review_approved = true;
        assert_eq!(should_revise(&mut s), NodeKind::FactCheck);
        s.review_approved = false;
        s.revision_count = s.style.max_revision_rounds;
        assert_eq!(should_revise(&mut s), NodeKind::FactCheck);
    }

    #[test]
    fn high_only_filter_narrows_issues_before_revision() {
        let mut s = ArticleState::new(
            &ArticleRequest::new("t").style(StyleProfile {
                revision_severity_filter: SeverityFilter::HighOnly,
                ..StyleProfile::medium()
            }),
        );
        s.review_issues = vec![
            ReviewIssue {
                severity: Severity::High,
                description: "broken claim".into(),
                ..Default::default()
            },
            ReviewIssue {
                severity: Severity::Low,
                description: "nit".into(),
                ..Default::default()
            },
        ];
        assert_eq!(should_revise(&mut s), NodeKind::Revision);
        assert_eq!(s.review_issues.len(), 1);
        assert_eq!(s.review_issues[0].severity, Severity::High);

        s.review_issues = vec![ReviewIssue {
            severity: Severity::Medium,
            description: "meh".into(),
            ..Default::default()
        }];
        assert_eq!(should_revise(&mut s), NodeKind::FactCheck);
    }
}
