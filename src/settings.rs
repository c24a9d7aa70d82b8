//! Environment-variable configuration surface.
//!
//! Settings are snapshotted once per generator construction so a run sees a
//! consistent view. Every middleware and optional stage has a kill-switch
//! here; stage switches combine with the style profile as env AND style.

use std::path::PathBuf;
use std::time::Duration;

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(v) => v.eq_ignore_ascii_case("true") || v == "1",
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Snapshot of the recognized environment surface.
#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    // Middleware switches
    pub middleware_pipeline_enabled: bool,
    pub tracing_enabled: bool,
    pub token_budget_enabled: bool,
    pub context_compression_enabled: bool,
    pub state_reducers_enabled: bool,

    // Parallelism
    pub max_workers: usize,

    // Stage switches (combined with StyleProfile as env AND style)
    pub humanizer_enabled: bool,
    pub thread_check_enabled: bool,
    pub voice_check_enabled: bool,
    pub factcheck_enabled: bool,
    pub text_cleanup_enabled: bool,
    pub summary_generator_enabled: bool,
    pub section_eval_enabled: bool,

    // Humanizer tuning
    pub humanizer_skip_threshold: u32,
    pub humanizer_max_retries: u32,

    // Artist tuning
    pub mermaid_repair_max_retries: u32,
    pub image_preplan_enabled: bool,

    // Optional subsystems
    pub cross_section_dedup_enabled: bool,
    pub knowledge_gap_detector_enabled: bool,
    pub ai_boost_enabled: bool,

    // Context management thresholds
    pub context_fold_threshold: f32,
    pub context_summary_threshold: f32,

    // Researcher cache
    pub researcher_cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_dir: Option<PathBuf>,

    // Task log persistence
    pub logs_dir: Option<PathBuf>,
}

impl WorkflowSettings {
    /// Read the full surface from the environment. Loads `.env` first so
    /// local development mirrors deployment.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let skip_threshold = env_u32("HUMANIZER_SKIP_THRESHOLD", 40).min(50);

        WorkflowSettings {
            middleware_pipeline_enabled: env_bool("MIDDLEWARE_PIPELINE_ENABLED", true),
            tracing_enabled: env_bool("TRACING_ENABLED", false),
            token_budget_enabled: env_bool("TOKEN_BUDGET_ENABLED", true),
            context_compression_enabled: env_bool("CONTEXT_COMPRESSION_MIDDLEWARE_ENABLED", false),
            state_reducers_enabled: env_bool("STATE_REDUCERS_ENABLED", true),
            max_workers: env_usize("BLOG_GENERATOR_MAX_WORKERS", 3).max(1),
            humanizer_enabled: env_bool("HUMANIZER_ENABLED", true),
            thread_check_enabled: env_bool("THREAD_CHECK_ENABLED", true),
            voice_check_enabled: env_bool("VOICE_CHECK_ENABLED", true),
            factcheck_enabled: env_bool("FACTCHECK_ENABLED", true),
            text_cleanup_enabled: env_bool("TEXT_CLEANUP_ENABLED", true),
            summary_generator_enabled: env_bool("SUMMARY_GENERATOR_ENABLED", true),
            section_eval_enabled: env_bool("SECTION_EVAL_ENABLED", true),
            humanizer_skip_threshold: skip_threshold,
            humanizer_max_retries: env_u32("HUMANIZER_MAX_RETRIES", 1),
            mermaid_repair_max_retries: env_u32("MERMAID_REPAIR_MAX_RETRIES", 2),
            image_preplan_enabled: env_bool("IMAGE_PREPLAN_ENABLED", false),
            cross_section_dedup_enabled: env_bool("CROSS_SECTION_DEDUP_ENABLED", false),
            knowledge_gap_detector_enabled: env_bool("KNOWLEDGE_GAP_DETECTOR_ENABLED", false),
            ai_boost_enabled: env_bool("AI_BOOST_ENABLED", true),
            context_fold_threshold: env_f32("CONTEXT_FOLD_THRESHOLD", 0.7),
            context_summary_threshold: env_f32("CONTEXT_SUMMARY_THRESHOLD", 0.9),
            researcher_cache_enabled: env_bool("RESEARCHER_CACHE_ENABLED", true),
            cache_ttl: Duration::from_secs(env_u32("CACHE_TTL_HOURS", 24) as u64 * 3600),
            cache_dir: std::env::var("QUILLWEAVE_CACHE_DIR").ok().map(PathBuf::from),
            logs_dir: std::env::var("QUILLWEAVE_LOGS_DIR").ok().map(PathBuf::from),
        }
    }

    /// Effective intra-node parallelism. Tracing forces serial execution to
    /// preserve call-context propagation.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        if self.tracing_enabled { 1 } else { self.max_workers }
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        WorkflowSettings {
            middleware_pipeline_enabled: true,
            tracing_enabled: false,
            token_budget_enabled: true,
            context_compression_enabled: false,
            state_reducers_enabled: true,
            max_workers: 3,
            humanizer_enabled: true,
            thread_check_enabled: true,
            voice_check_enabled: true,
            factcheck_enabled: true,
            text_cleanup_enabled: true,
            summary_generator_enabled: true,
            section_eval_enabled: true,
            humanizer_skip_threshold: 40,
            humanizer_max_retries: 1,
            mermaid_repair_max_retries: 2,
            image_preplan_enabled: false,
            cross_section_dedup_enabled: false,
            knowledge_gap_detector_enabled: false,
            ai_boost_enabled: true,
            context_fold_threshold: 0.7,
            context_summary_threshold: 0.9,
            researcher_cache_enabled: true,
            cache_ttl: Duration::from_secs(24 * 3600),
            cache_dir: None,
            logs_dir: None,
        }
    }
}
