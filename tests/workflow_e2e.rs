//! End-to-end workflow scenarios with a stubbed LLM and search service.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::{CancellingManager, StubLlm, StubSearch};
use quillweave::agents::OutlineDecision;
use quillweave::article::Outline;
use quillweave::events::EventKind;
use quillweave::generator::{ArticleGenerator, GenerateOutcome};
use quillweave::profile::StyleProfile;
use quillweave::settings::WorkflowSettings;
use quillweave::state::{ArticleRequest, ArticleState};
use quillweave::types::TargetLength;

fn generator_with(llm: StubLlm) -> ArticleGenerator {
    ArticleGenerator::builder(Arc::new(llm))
        .settings(WorkflowSettings::default())
        .search(Arc::new(StubSearch::new(3)))
        .build()
        .expect("graph compiles")
}

fn expect_complete(outcome: GenerateOutcome) -> quillweave::generator::GenerateReport {
    match outcome {
        GenerateOutcome::Complete(report) => *report,
        GenerateOutcome::Interrupted { .. } => panic!("unexpected interrupt"),
    }
}

/// Drain the event stream after a run has returned. All events are
/// already queued at this point; the idle timeout just lets the bus
/// listener catch up.
async fn drain_all(stream: &quillweave::events::EventStream) -> Vec<quillweave::events::Event> {
    let mut events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(250), stream.next()).await
    {
        events.push(event);
    }
    events
}

/// Pull the state snapshot emitted after the given stage, last occurrence
/// wins.
fn last_stage_state(events: &[quillweave::events::Event], stage: &str) -> Option<ArticleState> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Stage { stage: s, payload } if s == stage => {
                serde_json::from_value(payload.clone()).ok()
            }
            _ => None,
        })
        .last()
}

#[tokio::test]
async fn happy_path_mini_produces_article_with_tldr() {
    let mut generator = generator_with(StubLlm::happy_path(1));
    let stream = generator.subscribe();
    let request = ArticleRequest::new("Python decorators intro")
        .article_type("tutorial")
        .target_audience("beginner")
        .target_length(TargetLength::Mini);

    let report = expect_complete(generator.generate(request).await);

    assert!(report.success, "error: {:?}", report.error);
    let outline = report.outline.expect("outline present");
    assert_eq!(outline.sections.len(), 1);
    assert_eq!(report.sections_count, 1);
    assert!(report.images_count <= 3);
    assert!(report.markdown.starts_with("> **TL;DR**"));
    assert!(!report.seo_keywords.is_empty());
    assert!(report.review_score >= 80);
    assert!(report.token_summary.is_some());

    // Sections were actually written.
    let events = drain_all(&stream).await;
    let writer_state = last_stage_state(&events, "writer").expect("writer stage streamed");
    assert!(!writer_state.sections[0].content.is_empty());
    // The run terminates the stream with a Complete event.
    assert!(events.iter().any(|e| matches!(e.kind, EventKind::Complete)));
}

#[tokio::test]
async fn interactive_edit_reruns_writer_on_new_outline() {
    let mut generator = generator_with(StubLlm::happy_path(3));
    let request = ArticleRequest::new("Graph databases")
        .target_length(TargetLength::Medium)
        .interactive(true);

    let (session_id, payload) = match generator.generate(request).await {
        GenerateOutcome::Interrupted {
            session_id,
            payload,
        } => (session_id, payload),
        GenerateOutcome::Complete(r) => panic!("expected interrupt, got {:?}", r.error),
    };
    assert_eq!(payload.r#type, "confirm_outline");
    assert_eq!(payload.title, "Stubbed Deep Dive");
    assert_eq!(payload.sections.len(), 3);

    // Edit down to two sections with new titles.
    let edited: Outline = serde_json::from_value(json!({
        "title": "Graph Databases, Edited",
        "sections": [
            {"id": "section_1", "title": "Property Graphs"},
            {"id": "section_2", "title": "Query Languages"}
        ]
    }))
    .unwrap();
    let stream = generator.subscribe();
    let report = expect_complete(
        generator
            .resume(&session_id, OutlineDecision::Edit { outline: edited })
            .await,
    );

    assert!(report.success, "error: {:?}", report.error);
    assert_eq!(report.sections_count, 2);
    let outline = report.outline.unwrap();
    assert_eq!(outline.title, "Graph Databases, Edited");
    assert_eq!(outline.sections[0].title, "Property Graphs");

    // The writer re-ran against the edited outline: no stale sections.
    let events = drain_all(&stream).await;
    let writer_state = last_stage_state(&events, "writer").expect("writer stage streamed");
    assert_eq!(writer_state.sections.len(), 2);
    assert_eq!(writer_state.sections[0].title, "Property Graphs");
    assert_eq!(writer_state.sections[1].id, "section_2");
}

#[tokio::test]
async fn knowledge_loop_terminates_at_search_cap() {
    // One important gap every round; the loop must stop at the short cap.
    let llm = StubLlm::happy_path(2).respond(
        "search_coordinator",
        json!({
            "gaps": [{
                "gap_type": "missing_data",
                "description": "missing benchmark numbers",
                "suggested_query": "benchmark numbers"
            }]
        })
        .to_string(),
    );
    let style = StyleProfile {
        enable_knowledge_refinement: true,
        ..StyleProfile::medium()
    };
    let mut generator = generator_with(llm);
    let stream = generator.subscribe();
    let request = ArticleRequest::new("Vector search engines")
        .target_length(TargetLength::Short)
        .style(style);

    let report = expect_complete(generator.generate(request).await);
    assert!(report.success, "error: {:?}", report.error);

    let events = drain_all(&stream).await;
    let final_state =
        last_stage_state(&events, "summary_generator").expect("final stage streamed");
    assert_eq!(final_state.search_count, 3);
    assert_eq!(final_state.max_search_count, 3);
    assert_eq!(final_state.search_history.len(), 3);
    // The questioner stage was eventually reached.
    assert!(last_stage_state(&events, "questioner").is_some());
}

#[tokio::test]
async fn deepen_loop_is_bounded() {
    // Every depth check fails; the deepen loop still stops after two
    // rounds.
    let llm = StubLlm::happy_path(1).respond(
        "questioner",
        json!({
            "is_detailed_enough": false,
            "depth_score": 30,
            "vague_points": [{
                "location": "intro",
                "issue": "hand-wavy",
                "question": "how exactly?",
                "suggestion": "add numbers"
            }]
        })
        .to_string(),
    );
    let mut generator = generator_with(llm);
    let stream = generator.subscribe();
    let report = expect_complete(
        generator
            .generate(ArticleRequest::new("Bloom filters").target_length(TargetLength::Medium))
            .await,
    );
    assert!(report.success);

    let events = drain_all(&stream).await;
    let final_state =
        last_stage_state(&events, "summary_generator").expect("final stage streamed");
    assert_eq!(final_state.questioning_count, 2);
}

#[tokio::test]
async fn revision_cap_completes_pipeline_without_approval() {
    // Reviewer rejects with a high-severity issue on every call.
    let llm = StubLlm::happy_path(1).respond(
        "reviewer",
        json!({
            "score": 60,
            "issues": [{
                "section_id": "section_1",
                "severity": "high",
                "description": "claim lacks support",
                "suggestion": "cite a source"
            }],
            "summary": "needs work"
        })
        .to_string(),
    );
    let mut generator = generator_with(llm);
    let stream = generator.subscribe();
    let report = expect_complete(
        generator
            .generate(ArticleRequest::new("Consistent hashing").target_length(TargetLength::Medium))
            .await,
    );

    // Pipeline completes even though approval never came.
    assert!(report.success, "error: {:?}", report.error);
    assert_eq!(report.review_score, 60);

    let events = drain_all(&stream).await;
    let final_state =
        last_stage_state(&events, "summary_generator").expect("final stage streamed");
    // Medium style caps revisions at three.
    assert_eq!(final_state.revision_count, 3);
    assert!(!final_state.review_approved);
}

#[tokio::test]
async fn humanizer_rolls_back_on_lost_placeholder() {
    let llm = StubLlm::happy_path(1)
        .respond(
            "writer",
            "本章引用了一个重要数据 {source_012}，并进行了展开。",
        )
        .respond("humanizer.score", json!({"score": {"total": 10}}).to_string())
        .respond(
            "humanizer",
            json!({
                "humanized_content": "改写后的内容，但引用不见了。",
                "changes": ["dropped the citation"]
            })
            .to_string(),
        );
    let mut generator = generator_with(llm);
    let stream = generator.subscribe();
    let report = expect_complete(
        generator
            .generate(ArticleRequest::new("Cache invalidation").target_length(TargetLength::Medium))
            .await,
    );
    assert!(report.success);

    let events = drain_all(&stream).await;
    let state = last_stage_state(&events, "humanizer").expect("humanizer stage streamed");
    let section = &state.sections[0];
    assert!(section.content.contains("{source_012}"), "content rolled back");
    assert!(section.humanizer_skipped);
    assert!(
        section
            .humanizer_error
            .as_deref()
            .unwrap_or_default()
            .contains("source_012")
    );
}

#[tokio::test]
async fn cancellation_stops_before_writer_with_one_event() {
    let manager = Arc::new(CancellingManager::cancel_at_poll(3));
    let mut generator = ArticleGenerator::builder(Arc::new(StubLlm::happy_path(1)))
        .settings(WorkflowSettings::default())
        .search(Arc::new(StubSearch::new(3)))
        .task_manager(manager.clone())
        .build()
        .unwrap();
    let stream = generator.subscribe();

    let report = expect_complete(
        generator
            .generate(ArticleRequest::new("Raft consensus").target_length(TargetLength::Mini))
            .await,
    );
    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("cancelled"));
    assert!(report.markdown.is_empty());

    let events = drain_all(&stream).await;
    let cancelled = events
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Cancelled))
        .count();
    assert_eq!(cancelled, 1, "exactly one cancelled event");
    // The writer never ran.
    assert!(last_stage_state(&events, "writer").is_none());
    assert!(last_stage_state(&events, "planner").is_some());
}

#[tokio::test]
async fn fatal_planner_error_short_circuits_downstream() {
    // Unparseable outline is fatal: no markdown, success=false, and the
    // writer is skipped.
    let llm = StubLlm::happy_path(1).respond("planner.outline", "not json at all");
    let mut generator = generator_with(llm);
    let stream = generator.subscribe();
    let report = expect_complete(
        generator
            .generate(ArticleRequest::new("Broken plan").target_length(TargetLength::Mini))
            .await,
    );
    assert!(!report.success);
    assert!(report.markdown.is_empty());
    assert!(report.error.unwrap().contains("planner"));

    let events = drain_all(&stream).await;
    let writer_state = last_stage_state(&events, "writer").expect("writer stage still streamed");
    // The node was a no-op: nothing was written.
    assert!(writer_state.sections.is_empty());
}
