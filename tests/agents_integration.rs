//! Agent-level integration tests: writer ordering, image budget, and the
//! coder/artist placeholder flow.

mod common;

use std::sync::Arc;

use serde_json::json;

use common::StubLlm;
use quillweave::agents::{Agent, AgentContext, ArtistAgent, CoderAgent, CoderAndArtistAgent, WriterAgent};
use quillweave::article::{Outline, Section, SectionPlan};
use quillweave::events::EventBus;
use quillweave::executor::ParallelTaskExecutor;
use quillweave::llm::{LlmClient, TieredLlm};
use quillweave::settings::WorkflowSettings;
use quillweave::state::{ArticleRequest, ArticleState};
use quillweave::types::{ImageKind, RenderMethod, TargetLength};

fn context(bus: &EventBus) -> AgentContext {
    AgentContext {
        emitter: bus.emitter("test-task"),
        executor: ParallelTaskExecutor::new(),
        settings: Arc::new(WorkflowSettings::default()),
    }
}

fn proxy(llm: &Arc<StubLlm>, agent: &str) -> TieredLlm {
    TieredLlm::new(Arc::clone(llm) as Arc<dyn LlmClient>, agent)
}

fn outline_of(n: usize, image_type: ImageKind) -> Outline {
    Outline {
        title: "T".into(),
        sections: (1..=n)
            .map(|i| SectionPlan {
                id: format!("section_{i}"),
                title: format!("Section {i}"),
                key_concept: format!("concept {i}"),
                image_type,
                image_description: format!("diagram for {i}"),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn writer_emits_sections_in_outline_order() {
    let llm = Arc::new(StubLlm::happy_path(1));
    let bus = EventBus::default();
    let ctx = context(&bus);
    let writer = WriterAgent::new(proxy(&llm, "writer"));

    for n in [1usize, 4, 9] {
        let mut state = ArticleState::new(
            &ArticleRequest::new("ordering").target_length(TargetLength::Medium),
        );
        state.outline = Some(outline_of(n, ImageKind::None));
        writer.run(&mut state, &ctx).await.unwrap();

        assert_eq!(state.sections.len(), n);
        let outline = state.outline.as_ref().unwrap();
        for (i, section) in state.sections.iter().enumerate() {
            assert_eq!(section.id, outline.sections[i].id);
            assert!(!section.content.is_empty());
        }
    }
}

#[tokio::test]
async fn image_budget_caps_full_mode_generation() {
    // Ten outline-declared images on a medium article: the budget is 8.
    let llm = Arc::new(StubLlm::happy_path(1));
    let bus = EventBus::default();
    let ctx = context(&bus);
    let artist = ArtistAgent::new(proxy(&llm, "artist"));

    let mut state = ArticleState::new(
        &ArticleRequest::new("budget").target_length(TargetLength::Medium),
    );
    state.outline = Some(outline_of(10, ImageKind::Flowchart));
    state.sections = (1..=10)
        .map(|i| Section {
            id: format!("section_{i}"),
            title: format!("Section {i}"),
            content: format!("body of section {i}"),
            ..Default::default()
        })
        .collect();

    let output = artist.generate(&state, &ctx).await;
    assert!(output.images.len() <= 8, "got {} images", output.images.len());
    // Every produced mermaid chart is structurally valid.
    for image in &output.images {
        if image.render_method == RenderMethod::Mermaid {
            quillweave::agents::validate_mermaid(&image.content).unwrap();
        }
    }
}

#[tokio::test]
async fn coder_and_artist_resolve_placeholders_concurrently() {
    let llm = Arc::new(
        StubLlm::happy_path(1)
            .respond(
                "coder",
                json!({
                    "language": "rust",
                    "code": "fn main() { println!(\"hi\"); }",
                    "output": "hi",
                    "explanation": "entry point"
                })
                .to_string(),
            )
            .respond("artist.missing", json!({"missing": []}).to_string()),
    );
    let bus = EventBus::default();
    let ctx = context(&bus);
    let node = CoderAndArtistAgent::new(
        Arc::new(CoderAgent::new(proxy(&llm, "coder"))),
        Arc::new(ArtistAgent::new(proxy(&llm, "artist"))),
    );

    let mut state = ArticleState::new(
        &ArticleRequest::new("combo").target_length(TargetLength::Medium),
    );
    state.outline = Some(outline_of(1, ImageKind::None));
    state.sections = vec![Section {
        id: "section_1".into(),
        title: "Section 1".into(),
        content: "intro\n\n[CODE: code_1 - hello world]\n\n[IMAGE: flowchart - the flow]\n\nend"
            .into(),
        ..Default::default()
    }];

    node.run(&mut state, &ctx).await.unwrap();

    let section = &state.sections[0];
    assert!(section.content.contains("[CODE:code_1]"));
    assert!(!section.content.contains("[CODE: code_1 -"));
    assert_eq!(section.code_ids, vec!["code_1"]);
    assert_eq!(state.code_blocks.len(), 1);

    assert_eq!(section.image_ids.len(), 1);
    let image_ref = format!("[IMAGE:{}]", section.image_ids[0]);
    assert!(section.content.contains(&image_ref));
    assert_eq!(state.images.len(), 1);
    assert_eq!(state.images[0].render_method, RenderMethod::Mermaid);
}
