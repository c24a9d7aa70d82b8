//! Artist: plans and generates article illustrations.
//!
//! Full mode collects image tasks from three places: outline-declared
//! images, in-section `[IMAGE: <type> - <description>]` placeholders, and
//! an LLM missing-diagram pass; enforces the per-length image budget; and
//! renders each task as Mermaid/SVG source or an external AI image.
//! Mini-section mode (mini/short lengths) produces one shared-style image
//! per section instead.
//!
//! ASCII flowcharts embedded in section text are detected up front and
//! rewritten into image placeholders so they flow through the same
//! pipeline. Mermaid output is sanitized and validated; invalid charts get
//! up to two LLM repair passes and are dropped if still broken.

use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;

use crate::article::ImageAsset;
use crate::executor::{ParallelTask, TaskConfig};
use crate::llm::{ChatRequest, TieredLlm};
use crate::profile::ImageMode;
use crate::prompts;
use crate::services::ImageService;
use crate::state::ArticleState;
use crate::types::{ImageKind, RenderMethod, TargetLength};
use crate::utils::json_ext::extract_json_object;
use crate::utils::text::flatten_lines;

use super::AgentContext;

const IMAGE_TIMEOUT: Duration = Duration::from_secs(180);
const MAX_MISSING_DIAGRAMS: usize = 3;

fn image_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[IMAGE:\s*([a-z_]+)\s*-\s*([^\]]+)\]").expect("valid regex")
    })
}

fn ascii_strong_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[┌┐└┘├┤┬┴┼╔╗╚╝║═]|│|\+-{2,}|-{2,}>|─{2,}").expect("valid regex")
    })
}

fn ascii_weak_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"->|=>|\|").expect("valid regex"))
}

fn markdown_table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\|.*\|\s*$|^\s*\|?[\s:|-]+\|?\s*$").expect("valid regex"))
}

fn mermaid_chart_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(flowchart|graph|sequenceDiagram|classDiagram|stateDiagram|gantt|pie|erDiagram|mindmap|timeline)",
        )
        .expect("valid regex")
    })
}

fn mermaid_label_newline_res() -> &'static [(Regex, &'static str); 2] {
    static RES: OnceLock<[(Regex, &'static str); 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            (
                Regex::new(r"\[([^\]]*?)\\n([^\]]*?)\]").expect("valid regex"),
                "[$1 $2]",
            ),
            (
                Regex::new(r"\(([^\)]*?)\\n([^\)]*?)\)").expect("valid regex"),
                "($1 $2)",
            ),
        ]
    })
}

fn duplicate_arrow_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(-+>)\s*-+>").expect("valid regex"))
}

/// Strip fences, squash literal `\n` inside node labels, collapse
/// duplicated arrows.
pub fn sanitize_mermaid(code: &str) -> String {
    let mut out = code.trim().to_string();
    if let Some(rest) = out.strip_prefix("```mermaid") {
        out = rest.trim_start().to_string();
    } else if let Some(rest) = out.strip_prefix("```") {
        out = rest.trim_start().to_string();
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest.trim_end().to_string();
    }
    for (re, rep) in mermaid_label_newline_res() {
        loop {
            let next = re.replace_all(&out, *rep).into_owned();
            if next == out {
                break;
            }
            out = next;
        }
    }
    out = duplicate_arrow_re().replace_all(&out, "$1").into_owned();
    out.trim().to_string()
}

/// Minimal structural validation: a chart-type declaration on the first
/// line, and balanced `subgraph`/`end` pairs.
pub fn validate_mermaid(code: &str) -> Result<(), String> {
    let mut errors = Vec::new();
    let first_line = code.trim().lines().next().unwrap_or("").trim();
    if !mermaid_chart_type_re().is_match(first_line) {
        errors.push("missing chart type declaration".to_string());
    }
    let subgraphs = code.matches("subgraph").count();
    let ends = code
        .lines()
        .filter(|l| l.trim() == "end")
        .count();
    if subgraphs != ends {
        errors.push(format!("subgraph({subgraphs}) and end({ends}) are unbalanced"));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Keyword/pattern signals for inferring an illustration type. Keyword
/// hits score 1, pattern hits score 2; ties go to the first category.
fn type_signals() -> &'static [(&'static str, &'static [&'static str], &'static [&'static str])] {
    &[
        (
            "flowchart",
            &[
                "步骤", "流程", "pipeline", "workflow", "工作流", "然后", "接着", "阶段",
                "phase", "stage", "step", "执行顺序",
            ],
            &[r"步骤\s*\d+", r"(?i)step\s*\d+", r"→.*→", r"->.*->", r"第[一二三四五六七八九十]+步"],
        ),
        (
            "comparison",
            &["对比", "比较", "vs", "versus", "区别", "差异", "优缺点", "相比", "pros", "cons"],
            &[r"(?i)\bvs\.?\b", r"方案[一二1-9]"],
        ),
        (
            "framework",
            &[
                "架构", "组件", "模块", "分层", "architecture", "framework", "层级", "拓扑",
                "微服务", "中间件", "接口",
            ],
            &[r"架构图", r"系统架构", r"(表现|业务|数据|基础设施)层"],
        ),
        (
            "timeline",
            &["历史", "演进", "版本", "发展", "路线图", "里程碑", "roadmap", "演变", "迭代"],
            &[r"\d{4}\s*年", r"v\d+\.\d+", r"(19|20)\d{2}", r"第[一二三四五]代"],
        ),
        (
            "infographic",
            &["数据", "指标", "统计", "百分比", "排名", "概览", "总结", "分布", "占比"],
            &[r"\d+%", r"\d+\s*(个|项|种|条|张|篇)", r"(?i)top\s*\d+"],
        ),
        (
            "scene",
            &["想象", "场景", "故事", "案例", "日常", "情景", "体验", "用户", "开发者"],
            &[r"想象一下", r"假设你", r"比如说"],
        ),
    ]
}

/// Infer an illustration type from content signals.
pub fn infer_illustration_type(content: &str) -> &'static str {
    if content.trim().is_empty() {
        return "infographic";
    }
    let lower = content.to_lowercase();
    let mut best = ("infographic", 0usize);
    for (type_id, keywords, patterns) in type_signals() {
        let mut score = 0usize;
        for kw in *keywords {
            if lower.contains(&kw.to_lowercase()) {
                score += 1;
            }
        }
        for pat in *patterns {
            if Regex::new(pat).is_ok_and(|re| re.is_match(content)) {
                score += 2;
            }
        }
        if score > best.1 {
            best = (type_id, score);
        }
    }
    best.0
}

/// Where an image task came from; decides budget priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TaskSource {
    Outline,
    Placeholder,
    MissingDiagram,
}

#[derive(Clone, Debug)]
pub struct ImageTask {
    pub order_idx: usize,
    pub image_id: String,
    pub section_idx: Option<usize>,
    pub source: TaskSource,
    pub image_type: ImageKind,
    pub description: String,
    pub context: String,
    pub illustration_type: String,
    /// Exact placeholder text to rewrite, for placeholder-sourced tasks.
    pub placeholder_text: Option<String>,
}

/// Everything the artist wants to change, computed against a snapshot.
#[derive(Debug, Default)]
pub struct ArtistOutput {
    pub images: Vec<ImageAsset>,
    /// `(section_idx, placeholder_text, image_id)`; a `None` placeholder
    /// binds the image to the section without a text rewrite.
    pub replacements: Vec<(Option<usize>, Option<String>, String)>,
}

#[derive(Clone)]
pub struct ArtistAgent {
    llm: TieredLlm,
    image_service: Option<Arc<dyn ImageService>>,
}

impl ArtistAgent {
    pub fn new(llm: TieredLlm) -> Self {
        ArtistAgent {
            llm,
            image_service: None,
        }
    }

    #[must_use]
    pub fn with_image_service(mut self, service: Arc<dyn ImageService>) -> Self {
        self.image_service = Some(service);
        self
    }

    // ---- ASCII flowchart preprocessing ----

    /// Detect ASCII flowchart regions in one section body. A region is at
    /// least three consecutive graph-like lines with at least one strong
    /// signal, outside code fences and markdown tables.
    pub fn detect_ascii_regions(content: &str) -> Vec<(usize, usize)> {
        let lines: Vec<&str> = content.split('\n').collect();
        let mut regions = Vec::new();
        let mut in_code = false;
        let mut run_start: Option<usize> = None;
        let mut run_strong = false;

        let close_run = |start: Option<usize>, end: usize, strong: bool, out: &mut Vec<(usize, usize)>| {
            if let Some(s) = start
                && strong
                && end - s >= 3
            {
                out.push((s, end));
            }
        };

        for (i, line) in lines.iter().enumerate() {
            if line.trim_start().starts_with("```") {
                close_run(run_start.take(), i, run_strong, &mut regions);
                run_strong = false;
                in_code = !in_code;
                continue;
            }
            if in_code || markdown_table_re().is_match(line) || line.trim().is_empty() {
                close_run(run_start.take(), i, run_strong, &mut regions);
                run_strong = false;
                continue;
            }
            let strong = ascii_strong_re().is_match(line);
            let weak = ascii_weak_re().is_match(line);
            if strong || weak {
                if run_start.is_none() {
                    run_start = Some(i);
                }
                run_strong |= strong;
            } else {
                close_run(run_start.take(), i, run_strong, &mut regions);
                run_strong = false;
            }
        }
        close_run(run_start.take(), lines.len(), run_strong, &mut regions);
        regions
    }

    /// Rewrite detected ASCII flowcharts into image placeholders so they
    /// are regenerated as proper diagrams.
    pub fn preprocess_ascii_flowcharts(state: &mut ArticleState) -> usize {
        let mut converted = 0usize;
        for section in &mut state.sections {
            let regions = Self::detect_ascii_regions(&section.content);
            if regions.is_empty() {
                continue;
            }
            let lines: Vec<String> = section.content.split('\n').map(str::to_string).collect();
            let mut out: Vec<String> = Vec::with_capacity(lines.len());
            let mut cursor = 0usize;
            for (start, end) in regions {
                out.extend_from_slice(&lines[cursor..start]);
                let ascii = lines[start..end].join("\n");
                let summary = flatten_lines(&ascii, 500);
                out.push(format!(
                    "[IMAGE: flowchart - 根据以下 ASCII 流程图生成 Mermaid 图表: {summary}]"
                ));
                cursor = end;
                converted += 1;
            }
            out.extend_from_slice(&lines[cursor..]);
            section.content = out.join("\n");
        }
        if converted > 0 {
            tracing::info!(converted, "ascii flowcharts converted to placeholders");
        }
        converted
    }

    // ---- Task collection ----

    pub fn extract_image_placeholders(content: &str) -> Vec<(String, ImageKind, String)> {
        image_placeholder_re()
            .captures_iter(content)
            .map(|caps| {
                (
                    caps[0].to_string(),
                    ImageKind::parse(&caps[1]),
                    caps[2].trim().to_string(),
                )
            })
            .collect()
    }

    async fn detect_missing_diagrams(&self, state: &ArticleState) -> Vec<ImageTask> {
        let digest: Vec<String> = state
            .sections
            .iter()
            .enumerate()
            .map(|(i, s)| {
                format!(
                    "[{i}] {}\n{}",
                    s.title,
                    s.content.chars().take(800).collect::<String>()
                )
            })
            .collect();
        let prompt = prompts::artist_missing_diagrams(&digest.join("\n\n"));
        let Ok(response) = self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("artist.missing"))
            .await
        else {
            return Vec::new();
        };
        let Ok(map) = extract_json_object(&response) else {
            return Vec::new();
        };
        map.get("missing")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .take(MAX_MISSING_DIAGRAMS)
                    .filter_map(|item| {
                        let section_idx = item.get("section_idx").and_then(Value::as_u64)? as usize;
                        if section_idx >= state.sections.len() {
                            return None;
                        }
                        Some(ImageTask {
                            order_idx: 0,
                            image_id: String::new(),
                            section_idx: Some(section_idx),
                            source: TaskSource::MissingDiagram,
                            image_type: ImageKind::parse(
                                item.get("image_type").and_then(Value::as_str).unwrap_or(""),
                            ),
                            description: item
                                .get("description")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            context: item
                                .get("context")
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                            illustration_type: String::new(),
                            placeholder_text: None,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn collect_tasks(&self, state: &ArticleState, missing: Vec<ImageTask>) -> Vec<ImageTask> {
        let mut tasks: Vec<ImageTask> = Vec::new();
        let plans = state
            .outline
            .as_ref()
            .map(|o| o.sections.clone())
            .unwrap_or_default();

        // 1. Outline-declared images.
        for (i, plan) in plans.iter().enumerate() {
            if plan.image_type == ImageKind::None {
                continue;
            }
            let section_content = state
                .sections
                .get(i)
                .map(|s| s.content.chars().take(1000).collect::<String>())
                .unwrap_or_default();
            let illustration_type = if plan.illustration_type.is_empty() {
                infer_illustration_type(&section_content).to_string()
            } else {
                plan.illustration_type.clone()
            };
            tasks.push(ImageTask {
                order_idx: tasks.len(),
                image_id: String::new(),
                section_idx: (i < state.sections.len()).then_some(i),
                source: TaskSource::Outline,
                image_type: plan.image_type,
                description: plan.image_description.clone(),
                context: format!("章节标题: {}\n\n章节内容摘要:\n{section_content}", plan.title),
                illustration_type,
                placeholder_text: None,
            });
        }

        // 2. In-content placeholders.
        for (section_idx, section) in state.sections.iter().enumerate() {
            for (placeholder_text, kind, description) in
                Self::extract_image_placeholders(&section.content)
            {
                let pos = section.content.find(&placeholder_text).unwrap_or(0);
                let start = pos.saturating_sub(1000);
                let end = (pos + placeholder_text.len() + 1000).min(section.content.len());
                let surrounding = section
                    .content
                    .get(start..end)
                    .unwrap_or(&section.content)
                    .to_string();
                tasks.push(ImageTask {
                    order_idx: tasks.len(),
                    image_id: String::new(),
                    section_idx: Some(section_idx),
                    source: TaskSource::Placeholder,
                    image_type: kind,
                    description,
                    illustration_type: infer_illustration_type(&surrounding).to_string(),
                    context: format!("章节标题: {}\n\n相关内容:\n{surrounding}", section.title),
                    placeholder_text: Some(placeholder_text),
                });
            }
        }

        // 3. Missing-diagram detections.
        for mut task in missing {
            task.order_idx = tasks.len();
            task.illustration_type = infer_illustration_type(&task.context).to_string();
            tasks.push(task);
        }

        // Budget: keep outline images first, then placeholders, then
        // detected gaps, preserving order inside each bucket.
        let budget = state.target_length.image_budget();
        if tasks.len() > budget {
            tracing::info!(
                tasks = tasks.len(),
                budget,
                length = %state.target_length,
                "image budget applied"
            );
            tasks.sort_by_key(|t| (t.source, t.order_idx));
            tasks.truncate(budget);
        }
        for (i, task) in tasks.iter_mut().enumerate() {
            task.order_idx = i;
            task.image_id = format!("img_{}", i + 1);
        }
        tasks
    }

    // ---- Generation ----

    async fn repair_mermaid(&self, mut code: String, mut error: String, max_retries: u32) -> Result<String, String> {
        for attempt in 0..max_retries {
            tracing::info!(attempt, %error, "attempting mermaid repair");
            let prompt = prompts::artist_repair_mermaid(&code, &error);
            let response = self
                .llm
                .chat(ChatRequest::new(prompt).caller("artist.repair"))
                .await
                .map_err(|e| e.to_string())?;
            let repaired = sanitize_mermaid(&response);
            match validate_mermaid(&repaired) {
                Ok(()) => return Ok(repaired),
                Err(new_error) => {
                    code = repaired;
                    error = new_error;
                }
            }
        }
        Err(error)
    }

    /// Generate one image asset. Returns `Err` when the image should be
    /// skipped (invalid chart after repairs, or an unavailable provider).
    pub async fn generate_image(&self, task: &ImageTask, mermaid_retries: u32) -> Result<ImageAsset, String> {
        let prompt = prompts::artist_image(
            task.image_type.as_str(),
            &task.description,
            &task.context,
            &task.illustration_type,
        );
        let response = self
            .llm
            .chat(ChatRequest::new(prompt).json().caller("artist"))
            .await
            .map_err(|e| e.to_string())?;
        let map = extract_json_object(&response).map_err(|e| e.to_string())?;
        let method = map
            .get("render_method")
            .and_then(Value::as_str)
            .unwrap_or("mermaid");
        let content = map
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let caption = map
            .get("caption")
            .and_then(Value::as_str)
            .unwrap_or(&task.description)
            .to_string();
        if content.trim().is_empty() {
            return Err("model returned empty image content".into());
        }

        match method {
            "ai_image" => {
                let Some(service) = &self.image_service else {
                    return Err("no image provider configured".into());
                };
                let rendered = service
                    .generate(&content, "16:9", "1024x576", 180, true)
                    .await?;
                let reference = rendered
                    .best_reference()
                    .ok_or_else(|| "image provider returned no reference".to_string())?
                    .to_string();
                Ok(ImageAsset {
                    id: task.image_id.clone(),
                    render_method: RenderMethod::AiImage,
                    content,
                    caption,
                    rendered_path: Some(reference),
                })
            }
            "svg" => Ok(ImageAsset {
                id: task.image_id.clone(),
                render_method: RenderMethod::Svg,
                content,
                caption,
                rendered_path: None,
            }),
            _ => {
                let sanitized = sanitize_mermaid(&content);
                let valid = match validate_mermaid(&sanitized) {
                    Ok(()) => sanitized,
                    Err(error) => self.repair_mermaid(sanitized, error, mermaid_retries).await?,
                };
                Ok(ImageAsset {
                    id: task.image_id.clone(),
                    render_method: RenderMethod::Mermaid,
                    content: valid,
                    caption,
                    rendered_path: None,
                })
            }
        }
    }

    /// Full-mode generation over a state snapshot.
    pub async fn generate(&self, state: &ArticleState, ctx: &AgentContext) -> ArtistOutput {
        if matches!(state.target_length, TargetLength::Mini | TargetLength::Short)
            || state.style.image_generation_mode == ImageMode::MiniSection
        {
            return self.generate_mini_sections(state, ctx).await;
        }
        let missing = self.detect_missing_diagrams(state).await;
        if !missing.is_empty() {
            tracing::info!(count = missing.len(), "missing diagram positions detected");
        }
        let tasks = self.collect_tasks(state, missing);
        if tasks.is_empty() {
            return ArtistOutput::default();
        }
        tracing::info!(count = tasks.len(), "generating images");
        self.run_tasks(tasks, ctx).await
    }

    /// Mini-section mode: one shared-style image per section, capped by
    /// the budget. Used both as figures and as cover-video frames.
    async fn generate_mini_sections(&self, state: &ArticleState, ctx: &AgentContext) -> ArtistOutput {
        let style = if state.image_style.is_empty() {
            "clean flat illustration".to_string()
        } else {
            state.image_style.clone()
        };
        let budget = state.target_length.image_budget();
        let tasks: Vec<ImageTask> = state
            .sections
            .iter()
            .enumerate()
            .take(budget)
            .map(|(i, section)| ImageTask {
                order_idx: i,
                image_id: format!("img_{}", i + 1),
                section_idx: Some(i),
                source: TaskSource::Outline,
                image_type: ImageKind::AiImage,
                description: format!("章节「{}」的主题配图，统一风格：{style}", section.title),
                context: section.content.chars().take(800).collect(),
                illustration_type: infer_illustration_type(&section.content).to_string(),
                placeholder_text: None,
            })
            .collect();
        self.run_tasks(tasks, ctx).await
    }

    async fn run_tasks(&self, tasks: Vec<ImageTask>, ctx: &AgentContext) -> ArtistOutput {
        let retries = ctx.settings.mermaid_repair_max_retries;
        let parallel: Vec<ParallelTask<ImageAsset>> = tasks
            .iter()
            .map(|task| {
                let agent = self.clone();
                let task = task.clone();
                ParallelTask::new(format!("image-{}", task.image_id), async move {
                    agent.generate_image(&task, retries).await
                })
            })
            .collect();
        let outcomes = ctx
            .executor
            .run_parallel(
                parallel,
                TaskConfig::new("image_generation")
                    .timeout(IMAGE_TIMEOUT)
                    .max_workers(ctx.workers()),
            )
            .await;

        let mut output = ArtistOutput::default();
        for (task, outcome) in tasks.into_iter().zip(outcomes) {
            match outcome.result {
                Some(asset) => {
                    output.replacements.push((
                        task.section_idx,
                        task.placeholder_text,
                        asset.id.clone(),
                    ));
                    output.images.push(asset);
                }
                None => {
                    tracing::warn!(
                        id = %task.image_id,
                        error = ?outcome.error,
                        "image skipped"
                    );
                }
            }
        }
        output
    }

    /// Apply generated images: rewrite placeholders to `[IMAGE:id]`
    /// references and bind images to their sections.
    pub fn apply(state: &mut ArticleState, output: ArtistOutput) {
        for (section_idx, placeholder_text, image_id) in &output.replacements {
            let Some(idx) = section_idx else { continue };
            if let Some(section) = state.sections.get_mut(*idx) {
                if let Some(text) = placeholder_text {
                    section.content = section.content.replace(text, &format!("[IMAGE:{image_id}]"));
                }
                if !section.image_ids.contains(image_id) {
                    section.image_ids.push(image_id.clone());
                }
            }
        }
        state.images.extend(output.images);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_fences_and_label_newlines() {
        let raw = "```mermaid\nflowchart TD\n  A[first\\nstep] --> --> B(second\\npart)\n```";
        let clean = sanitize_mermaid(raw);
        assert!(clean.starts_with("flowchart TD"));
        assert!(!clean.contains("```"));
        assert!(!clean.contains("\\n"));
        assert!(!clean.contains("--> -->"));
    }

    #[test]
    fn validate_requires_chart_type_and_balanced_subgraphs() {
        assert!(validate_mermaid("flowchart TD\n  A --> B").is_ok());
        assert!(validate_mermaid("A --> B").is_err());
        assert!(validate_mermaid("flowchart TD\nsubgraph S\n  A --> B").is_err());
        assert!(validate_mermaid("flowchart TD\nsubgraph S\n  A --> B\nend").is_ok());
    }

    #[test]
    fn illustration_type_follows_signals() {
        assert_eq!(
            infer_illustration_type("第一步 安装，第二步 配置，然后 运行，步骤 3 完成"),
            "flowchart"
        );
        assert_eq!(infer_illustration_type("Redis vs Memcached 的区别与优缺点对比"), "comparison");
        assert_eq!(infer_illustration_type(""), "infographic");
    }

    #[test]
    fn ascii_regions_need_three_lines_and_a_strong_signal() {
        let content = "intro\n┌────┐\n│ A  │\n└─┬──┘\n  ▼\noutro";
        let regions = ArtistAgent::detect_ascii_regions(content);
        assert_eq!(regions.len(), 1);

        // A markdown table is not a flowchart.
        let table = "| a | b |\n|---|---|\n| 1 | 2 |";
        assert!(ArtistAgent::detect_ascii_regions(table).is_empty());

        // Art inside a code fence is left alone.
        let fenced = "```\n┌──┐\n│AB│\n└──┘\n```";
        assert!(ArtistAgent::detect_ascii_regions(fenced).is_empty());
    }

    #[test]
    fn ascii_preprocessing_rewrites_to_placeholder() {
        use crate::article::Section;
        use crate::state::{ArticleRequest, ArticleState};
        let mut state = ArticleState::new(&ArticleRequest::new("t"));
        state.sections = vec![Section {
            id: "s1".into(),
            title: "flow".into(),
            content: "before\n┌────┐\n│ A  │\n└────┘\nafter".into(),
            ..Default::default()
        }];
        let converted = ArtistAgent::preprocess_ascii_flowcharts(&mut state);
        assert_eq!(converted, 1);
        assert!(state.sections[0].content.contains("[IMAGE: flowchart -"));
        assert!(!state.sections[0].content.contains("┌"));
        assert!(state.sections[0].content.contains("before"));
        assert!(state.sections[0].content.contains("after"));
    }
}
