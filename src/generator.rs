//! The article generator: wiring and public entry points.
//!
//! Builds the agents, middleware pipeline, and workflow graph once, then
//! drives one session per `generate` call. Streaming consumers subscribe
//! to the event bus; interactive runs pause after the planner and resume
//! through [`ArticleGenerator::resume`].

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::agents::{
    Agent, AgentContext, ArtistAgent, AssemblerAgent, CoderAgent, CoderAndArtistAgent,
    ConsistencyCheckAgent, CrossSectionDedup, DeepenContentAgent, EnhanceWithKnowledgeAgent,
    FactCheckAgent, HumanizerAgent, OutlineDecision, PlannerAgent, QuestionerAgent,
    RefineSearchAgent, ResearcherAgent, ReviewerAgent, RevisionAgent, SearchCoordinator,
    SectionEvaluateAgent, SectionImproveAgent, SummaryGeneratorAgent, TextCleanupAgent,
    ThreadCheckerAgent, VoiceCheckerAgent, WriterAgent,
};
use crate::article::Outline;
use crate::events::{EventBus, EventKind, EventStream, StdOutSink, TaskManagerSink};
use crate::executor::ParallelTaskExecutor;
use crate::knowledge::{DeepScraper, DiskCache, SmartSearchService};
use crate::llm::{LlmClient, TieredLlm, TokenSummary, TokenTracker};
use crate::middleware::{
    ContextManagementMiddleware, ContextPrefetchMiddleware, ErrorTrackingMiddleware,
    MiddlewarePipeline, ReducerMiddleware, TaskLogMiddleware, TokenBudgetMiddleware,
    TracingMiddleware,
};
use crate::services::{DocumentService, ImageService, SearchService, TaskManager};
use crate::settings::WorkflowSettings;
use crate::state::{ArticleRequest, ArticleState};
use crate::tasklog::TaskLog;
use crate::types::NodeKind;
use crate::utils::text::safe_title;
use crate::workflow::{
    Checkpointer, GraphError, InMemoryCheckpointer, InterruptPayload, RunOutcome,
    WorkflowBuilder, WorkflowDriver, should_deepen, should_improve_sections,
    should_refine_search, should_revise,
};

/// Default whole-run token budget for the budget middleware.
const DEFAULT_TOKEN_BUDGET: u64 = 1_500_000;

/// Final result of a generation run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerateReport {
    pub success: bool,
    pub markdown: String,
    pub outline: Option<Outline>,
    pub sections_count: usize,
    pub images_count: usize,
    pub code_blocks_count: usize,
    pub review_score: u32,
    pub token_summary: Option<TokenSummary>,
    pub seo_keywords: Vec<String>,
    pub social_summary: String,
    pub meta_description: String,
    pub error: Option<String>,
}

/// Outcome of a `generate`/`resume` call.
pub enum GenerateOutcome {
    Complete(Box<GenerateReport>),
    /// Interactive run paused after the planner; resume with an
    /// [`OutlineDecision`].
    Interrupted {
        session_id: String,
        payload: Box<InterruptPayload>,
    },
}

/// Builder for [`ArticleGenerator`].
pub struct ArticleGeneratorBuilder {
    llm: Arc<dyn LlmClient>,
    settings: Option<WorkflowSettings>,
    search: Option<Arc<dyn SearchService>>,
    smart_search: Option<Arc<SmartSearchService>>,
    deep_scraper: Option<Arc<DeepScraper>>,
    image_service: Option<Arc<dyn ImageService>>,
    document_service: Option<Arc<dyn DocumentService>>,
    task_manager: Option<Arc<dyn TaskManager>>,
    checkpointer: Option<Arc<dyn Checkpointer>>,
    output_dir: Option<PathBuf>,
    token_budget: u64,
}

impl ArticleGeneratorBuilder {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        ArticleGeneratorBuilder {
            llm,
            settings: None,
            search: None,
            smart_search: None,
            deep_scraper: None,
            image_service: None,
            document_service: None,
            task_manager: None,
            checkpointer: None,
            output_dir: None,
            token_budget: DEFAULT_TOKEN_BUDGET,
        }
    }

    #[must_use]
    pub fn settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    #[must_use]
    pub fn search(mut self, search: Arc<dyn SearchService>) -> Self {
        self.search = Some(search);
        self
    }

    #[must_use]
    pub fn smart_search(mut self, smart: Arc<SmartSearchService>) -> Self {
        self.smart_search = Some(smart);
        self
    }

    #[must_use]
    pub fn deep_scraper(mut self, scraper: Arc<DeepScraper>) -> Self {
        self.deep_scraper = Some(scraper);
        self
    }

    #[must_use]
    pub fn image_service(mut self, service: Arc<dyn ImageService>) -> Self {
        self.image_service = Some(service);
        self
    }

    #[must_use]
    pub fn document_service(mut self, service: Arc<dyn DocumentService>) -> Self {
        self.document_service = Some(service);
        self
    }

    #[must_use]
    pub fn task_manager(mut self, manager: Arc<dyn TaskManager>) -> Self {
        self.task_manager = Some(manager);
        self
    }

    #[must_use]
    pub fn checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Directory for the final markdown artifact; nothing is written when
    /// unset.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn token_budget(mut self, budget: u64) -> Self {
        self.token_budget = budget;
        self
    }

    pub fn build(self) -> Result<ArticleGenerator, GraphError> {
        let settings = Arc::new(self.settings.unwrap_or_else(WorkflowSettings::from_env));
        // Share the client's tracker when it has one so budget checks and
        // the task log see the same numbers the client records.
        let tracker = self
            .llm
            .token_tracker()
            .unwrap_or_else(|| Arc::new(TokenTracker::new()));
        let task_log = Arc::new(Mutex::new(TaskLog::new("", "", "")));

        let proxy = |agent: &str| TieredLlm::new(Arc::clone(&self.llm), agent);

        // Agents. Shared ones (writer, questioner) are reused by the
        // composite loop nodes.
        let mut researcher = ResearcherAgent::new(proxy("researcher"));
        if let Some(search) = &self.search {
            researcher = researcher.with_search(Arc::clone(search));
        }
        if let Some(smart) = &self.smart_search {
            researcher = researcher.with_smart_search(Arc::clone(smart));
        }
        if let Some(docs) = &self.document_service {
            researcher = researcher.with_documents(Arc::clone(docs));
        }
        if let Some(scraper) = &self.deep_scraper {
            researcher = researcher.with_scraper(Arc::clone(scraper));
        }
        if settings.researcher_cache_enabled
            && let Some(dir) = &settings.cache_dir
        {
            researcher = researcher.with_cache(DiskCache::new(dir.clone(), settings.cache_ttl));
        }

        let writer = Arc::new(WriterAgent::new(proxy("writer")));
        let questioner = Arc::new(QuestionerAgent::new(proxy("questioner")));
        let mut coordinator = SearchCoordinator::new(proxy("search_coordinator"));
        if let Some(search) = &self.search {
            coordinator = coordinator.with_search(Arc::clone(search));
        }
        if let Some(smart) = &self.smart_search {
            coordinator = coordinator.with_smart_search(Arc::clone(smart));
        }
        let coordinator = Arc::new(coordinator);
        let coder = Arc::new(CoderAgent::new(proxy("coder")));
        let mut artist = ArtistAgent::new(proxy("artist"));
        if let Some(images) = &self.image_service {
            artist = artist.with_image_service(Arc::clone(images));
        }
        let artist = Arc::new(artist);
        let thread_checker = Arc::new(ThreadCheckerAgent::new(proxy("thread_checker")));
        let voice_checker = Arc::new(VoiceCheckerAgent::new(proxy("voice_checker")));

        // Graph wiring: the linear spine plus the four bounded loops.
        let workflow = WorkflowBuilder::new()
            .add_node(NodeKind::Researcher, Arc::new(researcher))
            .add_node(NodeKind::Planner, Arc::new(PlannerAgent::new(proxy("planner"))))
            .add_node(NodeKind::Writer, Arc::clone(&writer) as Arc<dyn Agent>)
            .add_node(
                NodeKind::CheckKnowledge,
                Arc::clone(&coordinator) as Arc<dyn Agent>,
            )
            .add_node(
                NodeKind::RefineSearch,
                Arc::new(RefineSearchAgent::new(Arc::clone(&coordinator))),
            )
            .add_node(
                NodeKind::EnhanceWithKnowledge,
                Arc::new(EnhanceWithKnowledgeAgent::new(Arc::clone(&writer))),
            )
            .add_node(NodeKind::Questioner, Arc::clone(&questioner) as Arc<dyn Agent>)
            .add_node(
                NodeKind::DeepenContent,
                Arc::new(DeepenContentAgent::new(Arc::clone(&writer))),
            )
            .add_node(
                NodeKind::SectionEvaluate,
                Arc::new(SectionEvaluateAgent::new(Arc::clone(&questioner))),
            )
            .add_node(
                NodeKind::SectionImprove,
                Arc::new(SectionImproveAgent::new(Arc::clone(&writer))),
            )
            .add_node(
                NodeKind::CoderAndArtist,
                Arc::new(CoderAndArtistAgent::new(coder, artist)),
            )
            .add_node(NodeKind::CrossSectionDedup, Arc::new(CrossSectionDedup::new()))
            .add_node(
                NodeKind::ConsistencyCheck,
                Arc::new(ConsistencyCheckAgent::new(thread_checker, voice_checker)),
            )
            .add_node(NodeKind::Reviewer, Arc::new(ReviewerAgent::new(proxy("reviewer"))))
            .add_node(
                NodeKind::Revision,
                Arc::new(RevisionAgent::new(Arc::clone(&writer))),
            )
            .add_node(NodeKind::FactCheck, Arc::new(GatedFactCheck::new(proxy("factcheck"))))
            .add_node(NodeKind::TextCleanup, Arc::new(GatedTextCleanup))
            .add_node(NodeKind::Humanizer, Arc::new(GatedHumanizer::new(proxy("humanizer"))))
            .add_node(NodeKind::Assembler, Arc::new(AssemblerAgent))
            .add_node(
                NodeKind::SummaryGenerator,
                Arc::new(GatedSummary::new(proxy("summary_generator"))),
            )
            .add_edge(NodeKind::Start, NodeKind::Researcher)
            .add_edge(NodeKind::Researcher, NodeKind::Planner)
            .add_edge(NodeKind::Planner, NodeKind::Writer)
            .add_edge(NodeKind::Writer, NodeKind::CheckKnowledge)
            .add_conditional_edge(NodeKind::CheckKnowledge, Arc::new(should_refine_search))
            .add_edge(NodeKind::RefineSearch, NodeKind::EnhanceWithKnowledge)
            .add_edge(NodeKind::EnhanceWithKnowledge, NodeKind::CheckKnowledge)
            .add_conditional_edge(NodeKind::Questioner, Arc::new(should_deepen))
            .add_edge(NodeKind::DeepenContent, NodeKind::Questioner)
            .add_conditional_edge(NodeKind::SectionEvaluate, Arc::new(should_improve_sections))
            .add_edge(NodeKind::SectionImprove, NodeKind::SectionEvaluate)
            .add_edge(NodeKind::CoderAndArtist, NodeKind::CrossSectionDedup)
            .add_edge(NodeKind::CrossSectionDedup, NodeKind::ConsistencyCheck)
            .add_edge(NodeKind::ConsistencyCheck, NodeKind::Reviewer)
            .add_conditional_edge(NodeKind::Reviewer, Arc::new(should_revise))
            .add_edge(NodeKind::Revision, NodeKind::Reviewer)
            .add_edge(NodeKind::FactCheck, NodeKind::TextCleanup)
            .add_edge(NodeKind::TextCleanup, NodeKind::Humanizer)
            .add_edge(NodeKind::Humanizer, NodeKind::Assembler)
            .add_edge(NodeKind::Assembler, NodeKind::SummaryGenerator)
            .add_edge(NodeKind::SummaryGenerator, NodeKind::End)
            .compile()?;

        // Middleware pipeline, in the canonical order.
        let pipeline = MiddlewarePipeline::new(settings.middleware_pipeline_enabled)
            .with(Arc::new(TracingMiddleware::new(settings.tracing_enabled)))
            .with(Arc::new(TaskLogMiddleware::new(
                Arc::clone(&task_log),
                Arc::clone(&tracker),
            )))
            .with(Arc::new(ReducerMiddleware::new(settings.state_reducers_enabled)))
            .with(Arc::new(ErrorTrackingMiddleware))
            .with(Arc::new(ContextManagementMiddleware::new(
                settings.context_compression_enabled,
                Some(TieredLlm::new(Arc::clone(&self.llm), "context_compressor")),
                settings.context_fold_threshold,
                settings.context_summary_threshold,
            )))
            .with(Arc::new(TokenBudgetMiddleware::new(
                settings.token_budget_enabled,
                Arc::clone(&tracker),
                self.token_budget,
            )))
            .with(Arc::new(ContextPrefetchMiddleware::new(
                self.document_service.clone(),
            )));

        let checkpointer = self
            .checkpointer
            .unwrap_or_else(|| Arc::new(InMemoryCheckpointer::new()));

        let mut sinks: Vec<Box<dyn crate::events::EventSink>> = vec![Box::new(StdOutSink)];
        if let Some(manager) = &self.task_manager {
            sinks.push(Box::new(TaskManagerSink::new(Arc::clone(manager))));
        }
        let bus = EventBus::with_sinks(sinks);

        let driver = WorkflowDriver::new(
            Arc::new(workflow),
            Arc::new(pipeline),
            Some(checkpointer),
            self.task_manager.clone(),
        );

        Ok(ArticleGenerator {
            driver,
            bus,
            settings,
            tracker,
            task_log,
            output_dir: self.output_dir,
            session_tasks: FxHashMap::default(),
        })
    }
}

pub struct ArticleGenerator {
    driver: WorkflowDriver,
    bus: EventBus,
    settings: Arc<WorkflowSettings>,
    tracker: Arc<TokenTracker>,
    task_log: Arc<Mutex<TaskLog>>,
    output_dir: Option<PathBuf>,
    session_tasks: FxHashMap<String, String>,
}

impl ArticleGenerator {
    pub fn builder(llm: Arc<dyn LlmClient>) -> ArticleGeneratorBuilder {
        ArticleGeneratorBuilder::new(llm)
    }

    /// Subscribe to the run's event feed (progress, per-stage state
    /// snapshots, terminal events). Call before `generate` to see
    /// everything.
    pub fn subscribe(&self) -> EventStream {
        self.bus.subscribe()
    }

    fn make_context(&self, task_id: &str) -> AgentContext {
        AgentContext {
            emitter: self.bus.emitter(task_id),
            executor: ParallelTaskExecutor::new().serial(self.settings.tracing_enabled),
            settings: Arc::clone(&self.settings),
        }
    }

    /// Generate an article. Interactive requests may return
    /// [`GenerateOutcome::Interrupted`]; resume with
    /// [`resume`](Self::resume).
    pub async fn generate(&mut self, request: ArticleRequest) -> GenerateOutcome {
        let state = ArticleState::new(&request);
        let session_id = format!("blog_{}", safe_title(&request.topic));
        {
            let mut log = self.task_log.lock().expect("task log poisoned");
            *log = TaskLog::new(
                &request.topic,
                &request.article_type,
                &request.target_length.to_string(),
            );
        }
        let task_id = self
            .task_log
            .lock()
            .expect("task log poisoned")
            .task_id
            .clone();
        self.session_tasks.insert(session_id.clone(), task_id.clone());
        let ctx = self.make_context(&task_id);

        tracing::info!(
            topic = %request.topic,
            article_type = %request.article_type,
            length = %request.target_length,
            "starting generation"
        );
        if let Err(err) = self.driver.create_session(&session_id, state).await {
            return self.finalize_error(&ctx, err.to_string()).await;
        }
        let outcome = self
            .driver
            .run_until_complete(&session_id, &ctx, request.interactive)
            .await;
        self.conclude(&session_id, outcome, &ctx).await
    }

    /// Resume an interactive session after outline confirmation.
    pub async fn resume(
        &mut self,
        session_id: &str,
        decision: OutlineDecision,
    ) -> GenerateOutcome {
        let task_id = self
            .session_tasks
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| session_id.to_string());
        let ctx = self.make_context(&task_id);
        let outcome = self.driver.resume(session_id, decision, &ctx).await;
        self.conclude(session_id, outcome, &ctx).await
    }

    async fn conclude(
        &mut self,
        _session_id: &str,
        outcome: Result<RunOutcome, crate::workflow::DriverError>,
        ctx: &AgentContext,
    ) -> GenerateOutcome {
        match outcome {
            Ok(RunOutcome::Completed(state)) => self.finalize(ctx, *state).await,
            Ok(RunOutcome::Cancelled(state)) => {
                let mut log = self.task_log.lock().expect("task log poisoned");
                log.fail("cancelled");
                drop(log);
                self.persist_task_log().await;
                GenerateOutcome::Complete(Box::new(GenerateReport {
                    success: false,
                    review_score: state.review_score,
                    error: Some("cancelled".to_string()),
                    ..Default::default()
                }))
            }
            Ok(RunOutcome::Interrupted {
                session_id: sid,
                payload,
            }) => GenerateOutcome::Interrupted {
                session_id: sid,
                payload,
            },
            Err(err) => self.finalize_error(ctx, err.to_string()).await,
        }
    }

    async fn finalize(&mut self, ctx: &AgentContext, state: ArticleState) -> GenerateOutcome {
        let token_summary = self.tracker.summary();
        let success = state.error.is_none() && !state.final_markdown.is_empty();
        let report = GenerateReport {
            success,
            markdown: state.final_markdown.clone(),
            outline: state.outline.clone(),
            sections_count: state.sections.len(),
            images_count: state.images.len(),
            code_blocks_count: state.code_blocks.len(),
            review_score: state.review_score,
            token_summary: Some(token_summary.clone()),
            seo_keywords: state.seo_keywords.clone(),
            social_summary: state.social_summary.clone(),
            meta_description: state.meta_description.clone(),
            error: state.error.clone(),
        };

        {
            let mut log = self.task_log.lock().expect("task log poisoned");
            if success {
                log.complete(
                    state.review_score,
                    state.final_markdown.chars().count(),
                    state.revision_count,
                );
            } else {
                log.fail(state.error.as_deref().unwrap_or("empty markdown"));
            }
            log.token_summary =
                serde_json::to_value(&token_summary).unwrap_or(serde_json::Value::Null);
        }
        self.persist_task_log().await;
        self.persist_markdown(&state).await;

        if success {
            ctx.emitter.emit(EventKind::Result {
                payload: serde_json::to_value(&report).unwrap_or(serde_json::Value::Null),
            });
            ctx.emitter.emit(EventKind::Complete);
        } else {
            ctx.emitter.emit(EventKind::Error {
                message: report.error.clone().unwrap_or_default(),
            });
        }
        tracing::info!(
            success,
            score = report.review_score,
            chars = report.markdown.chars().count(),
            "generation finished"
        );
        GenerateOutcome::Complete(Box::new(report))
    }

    async fn finalize_error(&mut self, ctx: &AgentContext, message: String) -> GenerateOutcome {
        {
            let mut log = self.task_log.lock().expect("task log poisoned");
            log.fail(&message);
        }
        self.persist_task_log().await;
        ctx.emitter.emit(EventKind::Error {
            message: message.clone(),
        });
        GenerateOutcome::Complete(Box::new(GenerateReport {
            success: false,
            error: Some(message),
            ..Default::default()
        }))
    }

    async fn persist_task_log(&self) {
        let Some(dir) = &self.settings.logs_dir else {
            return;
        };
        let log = self.task_log.lock().expect("task log poisoned").clone();
        if let Err(err) = log.save(dir).await {
            tracing::warn!(%err, "task log save failed");
        }
    }

    async fn persist_markdown(&self, state: &ArticleState) {
        let Some(dir) = &self.output_dir else { return };
        if state.final_markdown.is_empty() {
            return;
        }
        let title = state
            .outline
            .as_ref()
            .map(|o| o.title.as_str())
            .unwrap_or(&state.topic);
        let filename = format!(
            "{}_{}.md",
            safe_title(title),
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        );
        if tokio::fs::create_dir_all(dir).await.is_err() {
            return;
        }
        let path = dir.join(filename);
        match tokio::fs::write(&path, &state.final_markdown).await {
            Ok(()) => tracing::info!(path = %path.display(), "markdown saved"),
            Err(err) => tracing::warn!(%err, "markdown save failed"),
        }
    }
}

// ---- Gated stages ----
//
// Optional stages honor the env AND style double switch. The gates live
// here rather than in the agents so each agent stays a pure operation.

use async_trait::async_trait;

use crate::agents::AgentError;

struct GatedFactCheck {
    inner: FactCheckAgent,
}

impl GatedFactCheck {
    fn new(llm: TieredLlm) -> Self {
        GatedFactCheck {
            inner: FactCheckAgent::new(llm),
        }
    }
}

#[async_trait]
impl Agent for GatedFactCheck {
    fn kind(&self) -> NodeKind {
        NodeKind::FactCheck
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if !(ctx.settings.factcheck_enabled && state.style.enable_fact_check) {
            tracing::info!("fact check disabled, skipping");
            return Ok(());
        }
        self.inner.run(state, ctx).await
    }
}

struct GatedTextCleanup;

#[async_trait]
impl Agent for GatedTextCleanup {
    fn kind(&self) -> NodeKind {
        NodeKind::TextCleanup
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if !(ctx.settings.text_cleanup_enabled && state.style.enable_text_cleanup) {
            tracing::info!("text cleanup disabled, skipping");
            return Ok(());
        }
        TextCleanupAgent.run(state, ctx).await
    }
}

struct GatedHumanizer {
    inner: HumanizerAgent,
}

impl GatedHumanizer {
    fn new(llm: TieredLlm) -> Self {
        GatedHumanizer {
            inner: HumanizerAgent::new(llm),
        }
    }
}

#[async_trait]
impl Agent for GatedHumanizer {
    fn kind(&self) -> NodeKind {
        NodeKind::Humanizer
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if !(ctx.settings.humanizer_enabled && state.style.enable_humanizer) {
            tracing::info!("humanizer disabled, skipping");
            return Ok(());
        }
        self.inner.run(state, ctx).await
    }
}

struct GatedSummary {
    inner: SummaryGeneratorAgent,
}

impl GatedSummary {
    fn new(llm: TieredLlm) -> Self {
        GatedSummary {
            inner: SummaryGeneratorAgent::new(llm),
        }
    }
}

#[async_trait]
impl Agent for GatedSummary {
    fn kind(&self) -> NodeKind {
        NodeKind::SummaryGenerator
    }

    async fn run(&self, state: &mut ArticleState, ctx: &AgentContext) -> Result<(), AgentError> {
        if !(ctx.settings.summary_generator_enabled && state.style.enable_summary_gen) {
            tracing::info!("summary generation disabled, skipping");
            return Ok(());
        }
        self.inner.run(state, ctx).await
    }
}
