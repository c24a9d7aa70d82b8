//! Prompt templates for every agent.
//!
//! Kept in one module so the JSON contracts the agents parse stay next to
//! the text that asks for them. All templates return plain strings; agents
//! attach temperature/format/caller metadata themselves.

use crate::article::{
    KnowledgeGap, Outline, ReviewIssue, SearchResult, SectionEvaluation, SectionPlan, VaguePoint,
};
use crate::types::DepthRequirement;
use crate::utils::text::truncate_chars;

fn results_digest(results: &[SearchResult], limit: usize, chars_each: usize) -> String {
    if results.is_empty() {
        return "（无搜索结果）".to_string();
    }
    results
        .iter()
        .take(limit)
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. {} ({})\n{}",
                i + 1,
                r.title,
                r.source,
                truncate_chars(&r.content, chars_each)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// ---- Researcher ----

pub fn researcher_queries(topic: &str, article_type: &str) -> String {
    format!(
        "为撰写一篇关于「{topic}」的{article_type}文章生成 3 个互补的搜索查询：\
         一个查核心概念，一个查实际案例或数据，一个查最新进展。\n\
         输出 JSON：{{\"queries\": [\"...\", \"...\", \"...\"]}}"
    )
}

pub fn researcher_summary(topic: &str, results: &[SearchResult]) -> String {
    format!(
        "根据以下搜索结果，为「{topic}」整理一份背景知识摘要（500 字以内），\
         保留具体数字和出处。\n\n{}",
        results_digest(results, 10, 400)
    )
}

pub fn researcher_concepts(topic: &str, background: &str) -> String {
    format!(
        "从以下关于「{topic}」的背景知识中提取 3-6 个关键概念。\n\
         输出 JSON：{{\"concepts\": [{{\"name\": \"...\", \"description\": \"...\"}}]}}\n\n\
         背景知识：\n{}",
        truncate_chars(background, 3000)
    )
}

pub fn researcher_distill(topic: &str, results: &[SearchResult]) -> String {
    format!(
        "将以下关于「{topic}」的搜索结果蒸馏为结构化素材。\n\
         输出 JSON：{{\n\
           \"material_by_type\": {{\"concepts\": [], \"cases\": [], \"data\": [], \"comparisons\": []}},\n\
           \"common_themes\": [],\n\
           \"contradictions\": [],\n\
           \"verbatim_data\": [],\n\
           \"learning_objectives\": []\n\
         }}\n\
         verbatim_data 放必须原样引用的数字和引语。\n\n{}",
        results_digest(results, 10, 500)
    )
}

pub fn researcher_gap_analysis(topic: &str, background: &str) -> String {
    format!(
        "分析以下关于「{topic}」的背景知识，找出内容空白和差异化切入角度。\n\
         输出 JSON：{{\"content_gaps\": [\"...\"], \"unique_angles\": [\"...\"], \
         \"writing_recommendations\": [\"...\"]}}\n\n背景知识：\n{}",
        truncate_chars(background, 3000)
    )
}

// ---- Planner ----

pub fn planner_outline(
    topic: &str,
    article_type: &str,
    target_audience: &str,
    sections_count: usize,
    word_count: usize,
    background: &str,
    key_concepts: &str,
    recommendations: &str,
) -> String {
    format!(
        "为「{topic}」规划一篇{article_type}文章的大纲，目标读者：{target_audience}，\
         约 {sections_count} 个章节、{word_count} 字。\n\
         每个章节要有 narrative_role（hook/what/why/how/compare/deep_dive/verify/summary/catalog_item），\
         全文要有 narrative_mode（what-why-how/problem-solution/before-after/tutorial/deep-dive/catalog）\
         和 narrative_flow（reader_start、reader_end、至少 3 步 logic_chain）。\n\
         需要配图的章节给出 image_type（flowchart/infographic/comparison/framework/timeline/scene/ai_image）\
         和 image_description。\n\
         输出 JSON：{{\n\
           \"title\": \"...\", \"subtitle\": \"...\", \"introduction\": \"...\", \"core_value\": \"...\",\n\
           \"narrative_mode\": \"...\",\n\
           \"narrative_flow\": {{\"reader_start\": \"...\", \"reader_end\": \"...\", \"logic_chain\": []}},\n\
           \"sections\": [{{\"id\": \"section_1\", \"title\": \"...\", \"key_concept\": \"...\",\n\
             \"narrative_role\": \"...\", \"image_type\": \"none\", \"image_description\": \"\"}}],\n\
           \"conclusion\": {{\"summary_points\": [], \"next_steps\": \"...\"}}\n\
         }}\n\n\
         背景知识：\n{}\n\n关键概念：\n{key_concepts}\n\n写作建议：\n{recommendations}",
        truncate_chars(background, 4000)
    )
}

pub fn planner_image_preplan(outline: &Outline, article_type: &str) -> String {
    let sections: Vec<String> = outline
        .sections
        .iter()
        .map(|s| format!("- {} ({}): {}", s.id, s.title, s.image_description))
        .collect();
    format!(
        "以下是一篇{article_type}文章《{}》的章节配图计划。判断哪些图不依赖正文内容、\
         可以在写作前预生成。\n\
         输出 JSON：{{\"pregeneratable\": [\"section_1\", ...]}}\n\n{}",
        outline.title,
        sections.join("\n")
    )
}

// ---- Writer ----

#[allow(clippy::too_many_arguments)]
pub fn writer_section(
    plan: &SectionPlan,
    topic: &str,
    prev_summary: &str,
    next_preview: &str,
    background: &str,
    results: &[SearchResult],
    verbatim_data: &[String],
    persona: &str,
) -> String {
    let verbatim = if verbatim_data.is_empty() {
        String::new()
    } else {
        format!(
            "\n\n以下数据必须原样出现（一字不差）：\n{}",
            verbatim_data.join("\n")
        )
    };
    let persona_block = if persona.is_empty() {
        String::new()
    } else {
        format!("\n\n{persona}")
    };
    format!(
        "撰写文章「{topic}」的章节《{}》。核心概念：{}。叙事角色：{:?}。\n\
         上一章概要：{prev_summary}\n下一章预告：{next_preview}\n\
         引用网络素材时使用 {{source_NNN}} 占位符（NNN 为素材编号）。\n\
         需要代码示例处写 [CODE: code_<编号> - <说明>]，需要配图处写 [IMAGE: <类型> - <说明>]。\n\
         用 Markdown 输出正文，### 起头的小节标题，不要重复章节标题本身。{verbatim}{persona_block}\n\n\
         背景知识：\n{}\n\n可引用素材：\n{}",
        plan.title,
        plan.key_concept,
        plan.narrative_role,
        truncate_chars(background, 3000),
        results_digest(results, 8, 300),
    )
}

pub fn writer_enhance(content: &str, vague_points: &[VaguePoint], section_title: &str) -> String {
    let points: Vec<String> = vague_points
        .iter()
        .map(|p| format!("- [{}] {}（建议：{}）", p.location, p.issue, p.suggestion))
        .collect();
    format!(
        "深化章节《{section_title}》：针对下面列出的模糊点补充细节、数据或例子，\
         保持原有结构和所有 {{source_NNN}} 占位符。只输出修改后的完整章节正文。\n\n\
         模糊点：\n{}\n\n原文：\n{content}",
        points.join("\n")
    )
}

pub fn writer_correct(content: &str, issues: &[ReviewIssue], section_title: &str) -> String {
    let list: Vec<String> = issues
        .iter()
        .map(|i| format!("- [{:?}] {}", i.severity, i.description))
        .collect();
    format!(
        "更正章节《{section_title}》中的以下问题。只改错误之处，不扩写不删减，\
         字数不超过原文的 110%，保持所有 {{source_NNN}} 占位符。只输出更正后的完整章节正文。\n\n\
         问题：\n{}\n\n原文：\n{content}",
        list.join("\n")
    )
}

pub fn writer_improve(content: &str, critique: &SectionEvaluation, section_title: &str) -> String {
    format!(
        "改进章节《{section_title}》。评估结果：总分 {:.1}/10，具体问题：{}；改进建议：{}。\n\
         保持原有结构和所有 {{source_NNN}} 占位符。只输出改进后的完整章节正文。\n\n原文：\n{content}",
        critique.overall_quality,
        critique.specific_issues.join("；"),
        critique.improvement_suggestions.join("；"),
    )
}

pub fn writer_enhance_with_knowledge(
    content: &str,
    new_knowledge: &str,
    gaps: &[KnowledgeGap],
) -> String {
    let gap_list: Vec<String> = gaps.iter().map(|g| format!("- {}", g.description)).collect();
    format!(
        "用下面的新素材补强这一章节，填补列出的知识空白。保持原有结构和所有 \
         {{source_NNN}} 占位符。只输出增强后的完整章节正文。\n\n\
         知识空白：\n{}\n\n新素材：\n{}\n\n原文：\n{content}",
        gap_list.join("\n"),
        truncate_chars(new_knowledge, 3000),
    )
}

// ---- Questioner ----

pub fn questioner_depth(
    content: &str,
    plan: &SectionPlan,
    depth_requirement: DepthRequirement,
) -> String {
    format!(
        "以苛刻读者的视角检查章节《{}》是否讲透了「{}」。深度要求：{depth_requirement:?}。\n\
         输出 JSON：{{\"is_detailed_enough\": true/false, \"depth_score\": 0-100,\n\
           \"vague_points\": [{{\"location\": \"...\", \"issue\": \"...\", \
           \"question\": \"...\", \"suggestion\": \"...\"}}]}}\n\n正文：\n{}",
        plan.title,
        plan.key_concept,
        truncate_chars(content, 5000)
    )
}

pub fn questioner_evaluate(
    content: &str,
    section_title: &str,
    prev_summary: &str,
    next_preview: &str,
) -> String {
    format!(
        "对章节《{section_title}》做四维评估，每项 1-10 分：信息密度、逻辑连贯、专业深度、表达质量。\n\
         上一章：{prev_summary}；下一章：{next_preview}。\n\
         输出 JSON：{{\"scores\": {{\"information_density\": n, \"logical_coherence\": n,\n\
           \"professional_depth\": n, \"expression_quality\": n}}, \"overall_quality\": n.n,\n\
           \"specific_issues\": [], \"improvement_suggestions\": []}}\n\n正文：\n{}",
        truncate_chars(content, 5000)
    )
}

// ---- Search coordinator ----

pub fn gap_detector(content: &str, existing_knowledge: &str, topic: &str) -> String {
    format!(
        "对比文章内容与已有知识，找出关于「{topic}」还缺什么。\n\
         每个空白标注 gap_type：missing_data（缺数据）/vague_concept（概念模糊）/no_example（缺例子）。\n\
         输出 JSON：{{\"gaps\": [{{\"gap_type\": \"...\", \"description\": \"...\", \
         \"suggested_query\": \"...\"}}]}}\n没有明显空白时输出 {{\"gaps\": []}}。\n\n\
         已有知识：\n{}\n\n文章内容：\n{}",
        truncate_chars(existing_knowledge, 2000),
        truncate_chars(content, 6000)
    )
}

pub fn search_summarizer(gaps: &[KnowledgeGap], results: &[SearchResult]) -> String {
    let gap_list: Vec<String> = gaps.iter().map(|g| format!("- {}", g.description)).collect();
    format!(
        "将以下补充搜索结果总结为针对这些知识空白的新知识（300 字以内），保留具体数字。\n\n\
         知识空白：\n{}\n\n搜索结果：\n{}",
        gap_list.join("\n"),
        results_digest(results, 6, 300)
    )
}

// ---- Coder ----

pub fn coder_generate(code_id: &str, description: &str, context: &str, topic: &str) -> String {
    format!(
        "为文章「{topic}」生成代码示例 {code_id}：{description}。\n\
         输出 JSON：{{\"language\": \"...\", \"code\": \"...\", \"output\": \"...\", \
         \"explanation\": \"...\"}}\n\
         代码要能独立运行，output 是运行结果。\n\n上下文：\n{}",
        truncate_chars(context, 2000)
    )
}

// ---- Artist ----

pub fn artist_image(
    image_type: &str,
    description: &str,
    context: &str,
    illustration_type: &str,
) -> String {
    format!(
        "为技术文章生成一张「{image_type}」类型的配图（风格类型：{illustration_type}）。\n\
         描述：{description}\n\
         如果适合用图表表达，输出 JSON：{{\"render_method\": \"mermaid\", \"content\": \
         \"<纯 Mermaid 源码，不带 ``` 标记>\", \"caption\": \"...\"}}；\n\
         如果需要照片级画面，输出 JSON：{{\"render_method\": \"ai_image\", \"content\": \
         \"<英文绘图 prompt>\", \"caption\": \"...\"}}。\n\
         Mermaid 节点文本不要用 \\n，含特殊字符的文本用双引号包裹，节点 ID 只用字母数字。\n\n\
         上下文：\n{}",
        truncate_chars(context, 1500)
    )
}

pub fn artist_missing_diagrams(sections_digest: &str) -> String {
    format!(
        "分析以下文章章节，找出确实需要补充图表才能讲清楚的位置（最多 3 处）。\n\
         输出 JSON：{{\"missing\": [{{\"section_idx\": n, \"image_type\": \"flowchart\", \
         \"description\": \"...\", \"context\": \"...\"}}]}}\n没有就输出 {{\"missing\": []}}。\n\n{}",
        truncate_chars(sections_digest, 6000)
    )
}

pub fn artist_repair_mermaid(code: &str, error: &str) -> String {
    format!(
        "以下 Mermaid 代码有语法错误，请修复。只输出修复后的纯 Mermaid 代码，\
         不要包含 ``` 标记。只修语法，不改内容结构。节点文本不要用 \\n，\
         含特殊字符的文本用双引号包裹，确保每个 subgraph 都有对应的 end。\n\n\
         错误信息：{error}\n\n原始代码：\n{code}"
    )
}

// ---- Reviewer ----

pub fn reviewer(
    document: &str,
    outline: &Outline,
    verbatim_data: &[String],
    learning_objectives: &[String],
    guidelines: &[String],
) -> String {
    let criteria = if guidelines.is_empty() {
        "结构完整性（是否覆盖大纲全部章节）、Verbatim 数据是否原样保留、学习目标是否覆盖".to_string()
    } else {
        guidelines.join("、")
    };
    format!(
        "审核以下文章。审核维度：{criteria}。\n\
         输出 JSON：{{\"score\": 0-100, \"issues\": [{{\"section_id\": \"...\", \
         \"severity\": \"high/medium/low\", \"description\": \"...\", \"suggestion\": \"...\"}}],\n\
           \"summary\": \"...\"}}\n\n\
         大纲标题：{}\n章节：{}\n\nVerbatim 数据：\n{}\n\n学习目标：\n{}\n\n正文：\n{}",
        outline.title,
        outline
            .sections
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        verbatim_data.join("\n"),
        learning_objectives.join("\n"),
        truncate_chars(document, 12000)
    )
}

// ---- Fact check ----

pub fn factcheck(document: &str, results: &[SearchResult]) -> String {
    format!(
        "对照引用来源核查文章中的事实性声明，列出与来源矛盾或无来源支撑的断言。\n\
         输出 JSON：{{\"issues\": [{{\"section_id\": \"...\", \"severity\": \"high/medium/low\", \
         \"description\": \"...\", \"suggestion\": \"...\"}}]}}\n没有问题输出 {{\"issues\": []}}。\n\n\
         来源：\n{}\n\n正文：\n{}",
        results_digest(results, 10, 200),
        truncate_chars(document, 10000)
    )
}

// ---- Humanizer ----

pub fn humanizer_score(content: &str) -> String {
    format!(
        "给这段文字的「人味」打分（0-50，越高越像人写的）。评分维度各 0-10：\
         句式变化、用词自然度、观点具体性、节奏感、痕迹词密度。\n\
         输出 JSON：{{\"score\": {{\"total\": n, \"details\": {{}}}}}}\n\n{}",
        truncate_chars(content, 4000)
    )
}

pub fn humanizer_rewrite(content: &str, audience_adaptation: &str) -> String {
    format!(
        "改写这段文字，去掉 AI 写作痕迹（排比堆砌、空洞总结、千篇一律的过渡），\
         面向 {audience_adaptation} 读者。保持信息完整、结构不变、所有 {{source_NNN}} \
         占位符原样保留，字数变化控制在 ±10% 内。\n\
         输出 JSON：{{\"humanized_content\": \"...\", \"changes\": [\"...\"]}}\n\n{}",
        truncate_chars(content, 5000)
    )
}

// ---- Consistency checkers ----

pub fn thread_checker(narrative_mode: &str, sections_digest: &str) -> String {
    format!(
        "检查文章叙事是否符合「{narrative_mode}」模式：章节承接是否自然、逻辑链是否断裂。\n\
         输出 JSON：{{\"issues\": [{{\"section_id\": \"...\", \"severity\": \"high/medium/low\", \
         \"description\": \"...\", \"suggestion\": \"...\"}}]}}\n没有问题输出 {{\"issues\": []}}。\n\n{}",
        truncate_chars(sections_digest, 8000)
    )
}

pub fn voice_checker(sections_digest: &str) -> String {
    format!(
        "检查文章语气和人称是否一致（如是否在「你」「我们」「开发者」之间漂移，正式度是否忽高忽低）。\n\
         输出 JSON：{{\"issues\": [{{\"section_id\": \"...\", \"severity\": \"high/medium/low\", \
         \"description\": \"...\", \"suggestion\": \"...\"}}]}}\n没有问题输出 {{\"issues\": []}}。\n\n{}",
        truncate_chars(sections_digest, 8000)
    )
}

// ---- Summary generator ----

pub fn summary_generator(title: &str, article: &str) -> String {
    format!(
        "为文章《{title}》生成导读和元信息。\n\
         输出 JSON：{{\"tldr\": \"2-3 句话\", \"seo_keywords\": [\"10-15 个\"],\n\
           \"social_summary\": \"50-100 字\", \"meta_description\": \"150 字以内\"}}\n\n{}",
        truncate_chars(article, 8000)
    )
}
