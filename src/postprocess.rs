//! Deterministic markdown post-processing.
//!
//! Pure functions shared by the assembler and text-cleanup stages:
//! separator repair, placeholder and source-reference substitution,
//! subheading extraction, and the regex-only text cleanup pass. Nothing
//! here calls an LLM, and every function is idempotent.

use regex::Regex;
use std::sync::OnceLock;

use crate::article::{CodeBlock, ImageAsset, SearchResult};
use crate::types::RenderMethod;

fn source_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{source_(\d{1,3})\}").expect("valid regex"))
}

fn code_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[CODE:([A-Za-z0-9_]+)\]").expect("valid regex"))
}

fn image_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[IMAGE:([A-Za-z0-9_]+)\]").expect("valid regex"))
}

fn verbose_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[(?:CODE|IMAGE):\s*[^\]\n-]+\s*-\s*[^\]]*\]").expect("valid regex")
    })
}

fn subheading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(#{3,4})\s+(.+?)\s*$").expect("valid regex"))
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid regex"))
}

/// Repair `---` separators so they never parse as Setext headings:
/// a standalone separator gets empty lines before and after, `---##`
/// adjacency is split, and lines inside fenced code blocks are untouched.
/// Runs of three or more blank lines collapse to one blank line.
pub fn fix_markdown_separators(text: &str) -> String {
    let mut result: Vec<String> = Vec::new();
    let mut in_code_block = false;

    for line in text.split('\n') {
        let stripped = line.trim();
        if stripped.starts_with("```") {
            in_code_block = !in_code_block;
            result.push(line.to_string());
            continue;
        }
        if in_code_block {
            result.push(line.to_string());
            continue;
        }
        if stripped == "---" {
            if result.last().is_some_and(|prev| !prev.trim().is_empty()) {
                result.push(String::new());
            }
            result.push("---".to_string());
            result.push(String::new());
        } else if let Some(rest) = stripped.strip_prefix("---")
            && !rest.is_empty()
            && !rest.starts_with('-')
        {
            if result.last().is_some_and(|prev| !prev.trim().is_empty()) {
                result.push(String::new());
            }
            result.push("---".to_string());
            result.push(String::new());
            result.push(rest.trim_start().to_string());
        } else {
            result.push(line.to_string());
        }
    }

    let joined = result.join("\n");
    blank_run_re().replace_all(&joined, "\n\n").into_owned()
}

/// Render a code block as markdown.
fn render_code_block(block: &CodeBlock) -> String {
    let mut out = String::new();
    out.push_str(&format!("```{}\n{}\n```\n", block.language, block.code.trim_end()));
    if !block.output.is_empty() {
        out.push_str(&format!("\n输出：\n\n```text\n{}\n```\n", block.output.trim_end()));
    }
    if !block.explanation.is_empty() {
        out.push('\n');
        out.push_str(block.explanation.trim());
        out.push('\n');
    }
    out
}

/// Render an image asset as markdown, or `None` when it cannot be shown
/// (an `ai_image` that was never rendered).
fn render_image(image: &ImageAsset) -> Option<String> {
    match image.render_method {
        RenderMethod::Mermaid => {
            let mut out = format!("```mermaid\n{}\n```\n", image.content.trim());
            if !image.caption.is_empty() {
                out.push_str(&format!("\n*{}*\n", image.caption));
            }
            Some(out)
        }
        RenderMethod::Svg => {
            let mut out = format!("{}\n", image.content.trim());
            if !image.caption.is_empty() {
                out.push_str(&format!("\n*{}*\n", image.caption));
            }
            Some(out)
        }
        RenderMethod::AiImage => {
            let path = image.rendered_path.as_deref()?;
            Some(format!("![{}]({})\n", image.caption, path))
        }
    }
}

/// Substitute `[CODE:id]` and `[IMAGE:id]` references in a section body.
///
/// Images listed in `section_image_ids` but not referenced inline are
/// appended after the content. Unresolvable references and leftover
/// verbose placeholders are removed.
pub fn replace_placeholders(
    content: &str,
    code_blocks: &[CodeBlock],
    images: &[ImageAsset],
    section_image_ids: &[String],
) -> String {
    let mut out = code_ref_re()
        .replace_all(content, |caps: &regex::Captures<'_>| {
            match code_blocks.iter().find(|c| c.id == caps[1]) {
                Some(block) => render_code_block(block),
                None => String::new(),
            }
        })
        .into_owned();

    let mut referenced: Vec<String> = Vec::new();
    out = image_ref_re()
        .replace_all(&out, |caps: &regex::Captures<'_>| {
            referenced.push(caps[1].to_string());
            images
                .iter()
                .find(|i| i.id == caps[1])
                .and_then(render_image)
                .unwrap_or_default()
        })
        .into_owned();

    // Placeholders that never became assets carry no content for the
    // reader; drop them.
    out = verbose_placeholder_re().replace_all(&out, "").into_owned();

    for id in section_image_ids {
        if referenced.iter().any(|r| r == id) {
            continue;
        }
        if let Some(rendered) = images.iter().find(|i| &i.id == id).and_then(render_image) {
            out.push_str("\n\n");
            out.push_str(&rendered);
        }
    }
    out
}

/// Substitute `{source_NNN}` citations with markdown links into the
/// 1-indexed search results. Out-of-range references stay verbatim.
pub fn replace_source_references(content: &str, search_results: &[SearchResult]) -> String {
    if search_results.is_empty() {
        return content.to_string();
    }
    source_ref_re()
        .replace_all(content, |caps: &regex::Captures<'_>| {
            let idx: usize = caps[1].parse().unwrap_or(0);
            if idx >= 1 && idx <= search_results.len() {
                let source = &search_results[idx - 1];
                let title = if source.title.is_empty() { "来源" } else { &source.title };
                if source.url.is_empty() {
                    format!("（{title}）")
                } else {
                    format!("（[{title}]({})）", source.url)
                }
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Collect every `{source_NNN}` token present in a text.
pub fn extract_source_placeholders(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = source_ref_re()
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// A `###`/`####` subheading extracted for the table of contents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subheading {
    pub title: String,
    pub level: u8,
    pub children: Vec<Subheading>,
}

/// Extract third- and fourth-level headings; level-4 entries nest under
/// the closest preceding level-3 entry.
pub fn extract_subheadings(content: &str) -> Vec<Subheading> {
    let mut result: Vec<Subheading> = Vec::new();
    for caps in subheading_re().captures_iter(content) {
        let level = caps[1].len() as u8;
        let title = caps[2].trim().to_string();
        if level == 3 {
            result.push(Subheading { title, level, children: Vec::new() });
        } else if let Some(parent) = result.last_mut() {
            parent.children.push(Subheading { title, level, children: Vec::new() });
        }
    }
    result
}

/// Reading time estimate in minutes, assuming ~450 chars per minute.
pub fn estimate_reading_time(char_count: usize) -> u32 {
    ((char_count as f64 / 450.0).ceil() as u32).max(1)
}

/// Outcome of the deterministic cleanup pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub text: String,
    pub fixes: usize,
}

fn space_before_punct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" +([,.;:!?，。；：！？])").expect("valid regex"))
}

fn repeated_terminal_res() -> &'static [(Regex, &'static str)] {
    static RES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RES.get_or_init(|| {
        [
            (r"!{2,}", "!"),
            (r"\?{2,}", "?"),
            (r"！{2,}", "！"),
            (r"？{2,}", "？"),
            (r"，{2,}", "，"),
        ]
        .into_iter()
        .map(|(pat, rep)| (Regex::new(pat).expect("valid regex"), rep))
        .collect()
    })
}

fn dash_list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\s*)-([^\s\-])").expect("valid regex"))
}

/// Regex-only cleanup: trailing whitespace, spaces glued to punctuation,
/// stuttered terminal punctuation, and malformed dash list markers. Fenced
/// code blocks pass through untouched.
pub fn apply_text_cleanup(text: &str) -> CleanupReport {
    let mut fixes = 0usize;
    let mut out_lines: Vec<String> = Vec::new();
    let mut in_code_block = false;
    let mut buffer: Vec<&str> = Vec::new();

    fn flush(buffer: &mut Vec<&str>, out_lines: &mut Vec<String>, fixes: &mut usize) {
        if buffer.is_empty() {
            return;
        }
        let chunk = buffer.join("\n");
        let mut cleaned = chunk.clone();
        let re = space_before_punct_re();
        let next = re.replace_all(&cleaned, "$1").into_owned();
        if next != cleaned {
            *fixes += re.find_iter(&cleaned).count();
            cleaned = next;
        }
        for (re, rep) in repeated_terminal_res() {
            let next = re.replace_all(&cleaned, *rep).into_owned();
            if next != cleaned {
                *fixes += re.find_iter(&cleaned).count();
                cleaned = next;
            }
        }
        let next = dash_list_re().replace_all(&cleaned, "$1- $2").into_owned();
        if next != cleaned {
            *fixes += dash_list_re().find_iter(&cleaned).count();
            cleaned = next;
        }
        for line in cleaned.split('\n') {
            let trimmed = line.trim_end();
            if trimmed.len() != line.len() {
                *fixes += 1;
            }
            out_lines.push(trimmed.to_string());
        }
        buffer.clear();
    }

    for line in text.split('\n') {
        if line.trim_start().starts_with("```") {
            if in_code_block {
                out_lines.push(line.to_string());
            } else {
                flush(&mut buffer, &mut out_lines, &mut fixes);
                out_lines.push(line.to_string());
            }
            in_code_block = !in_code_block;
            continue;
        }
        if in_code_block {
            out_lines.push(line.to_string());
        } else {
            buffer.push(line);
        }
    }
    flush(&mut buffer, &mut out_lines, &mut fixes);

    CleanupReport { text: out_lines.join("\n"), fixes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(id: &str) -> CodeBlock {
        CodeBlock {
            id: id.into(),
            language: "python".into(),
            code: "print('hi')".into(),
            ..Default::default()
        }
    }

    fn mermaid(id: &str) -> ImageAsset {
        ImageAsset {
            id: id.into(),
            render_method: RenderMethod::Mermaid,
            content: "flowchart TD\n  A --> B".into(),
            caption: "flow".into(),
            rendered_path: None,
        }
    }

    #[test]
    fn separators_get_blank_line_framing() {
        let fixed = fix_markdown_separators("text\n---\nmore");
        assert!(fixed.contains("text\n\n---\n\nmore"));
    }

    #[test]
    fn glued_separator_heading_is_split() {
        let fixed = fix_markdown_separators("text\n---## Heading");
        assert!(!fixed.contains("---#"));
        assert!(fixed.contains("## Heading"));
    }

    #[test]
    fn code_fences_are_left_alone() {
        let input = "```text\nA ---> B\n---\n```";
        assert_eq!(fix_markdown_separators(input), input);
    }

    #[test]
    fn blank_runs_collapse() {
        let fixed = fix_markdown_separators("a\n\n\n\n\nb");
        assert_eq!(fixed, "a\n\nb");
    }

    #[test]
    fn separator_repair_is_idempotent() {
        let once = fix_markdown_separators("x\n---## H\ny\n---\nz");
        let twice = fix_markdown_separators(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn code_and_image_references_resolve() {
        let out = replace_placeholders(
            "intro\n[CODE:code_1]\n[IMAGE:img_1]\ndone",
            &[code("code_1")],
            &[mermaid("img_1")],
            &["img_1".to_string()],
        );
        assert!(out.contains("```python"));
        assert!(out.contains("```mermaid"));
        assert!(!out.contains("[CODE:"));
        assert!(!out.contains("[IMAGE:"));
    }

    #[test]
    fn unreferenced_section_images_are_appended() {
        let out = replace_placeholders("text only", &[], &[mermaid("img_2")], &["img_2".to_string()]);
        assert!(out.contains("```mermaid"));
    }

    #[test]
    fn unrendered_ai_images_are_dropped() {
        let ai = ImageAsset {
            id: "img_3".into(),
            render_method: RenderMethod::AiImage,
            content: "a prompt".into(),
            caption: "cover".into(),
            rendered_path: None,
        };
        let out = replace_placeholders("[IMAGE:img_3]", &[], &[ai], &["img_3".to_string()]);
        assert!(!out.contains("img_3"));
        assert!(!out.contains("!["));
    }

    #[test]
    fn verbose_placeholders_without_assets_are_removed() {
        let out = replace_placeholders("a [IMAGE: flowchart - some diagram] b", &[], &[], &[]);
        assert!(!out.contains("[IMAGE:"));
    }

    #[test]
    fn source_references_link_one_indexed() {
        let results = vec![SearchResult {
            title: "Rust Book".into(),
            url: "https://doc.rust-lang.org/book".into(),
            ..Default::default()
        }];
        let out = replace_source_references("see {source_001} and {source_009}", &results);
        assert!(out.contains("[Rust Book](https://doc.rust-lang.org/book)"));
        // Out of range stays verbatim.
        assert!(out.contains("{source_009}"));
    }

    #[test]
    fn subheadings_nest_level_four_under_three() {
        let content = "### Install\n#### Prereqs\n#### Steps\n### Configure";
        let subs = extract_subheadings(content);
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].children.len(), 2);
        assert_eq!(subs[1].title, "Configure");
    }

    #[test]
    fn cleanup_counts_fixes_and_spares_code() {
        let input = "hello ,world!!\n```\nx = 1  \n```\n-item";
        let report = apply_text_cleanup(input);
        assert!(report.text.contains("hello,world!"));
        assert!(report.text.contains("x = 1  "));
        assert!(report.text.contains("- item"));
        assert!(report.fixes >= 3);
    }

    #[test]
    fn reading_time_is_at_least_one_minute() {
        assert_eq!(estimate_reading_time(10), 1);
        assert!(estimate_reading_time(10_000) > 10);
    }
}
