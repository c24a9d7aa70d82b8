//! Property tests for the deterministic machinery: separator repair and
//! reducer merges.

use proptest::prelude::*;

use quillweave::article::Section;
use quillweave::middleware::{merge_list_dedup, merge_sections};
use quillweave::postprocess::fix_markdown_separators;

/// Lines of plausible markdown: text, separators, glued separators,
/// headings, blanks, and fences.
fn markdown_line() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-zA-Z ]{0,20}",
        Just("---".to_string()),
        Just("---## Heading".to_string()),
        Just("## Heading".to_string()),
        Just(String::new()),
        Just("```".to_string()),
    ]
}

fn markdown_doc() -> impl Strategy<Value = String> {
    prop::collection::vec(markdown_line(), 0..40).prop_map(|lines| lines.join("\n"))
}

/// Split a repaired document into fenced and unfenced lines.
fn unfenced_lines(doc: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_code = false;
    for line in doc.split('\n') {
        if line.trim().starts_with("```") {
            in_code = !in_code;
            continue;
        }
        if !in_code {
            out.push(line.to_string());
        }
    }
    out
}

proptest! {
    #[test]
    fn repaired_markdown_has_no_glued_separators(doc in markdown_doc()) {
        let fixed = fix_markdown_separators(&doc);
        for line in unfenced_lines(&fixed) {
            let t = line.trim();
            prop_assert!(!t.starts_with("---#"), "glued separator in {t:?}");
        }
    }

    #[test]
    fn repaired_separators_are_framed_by_blanks(doc in markdown_doc()) {
        let fixed = fix_markdown_separators(&doc);
        let lines: Vec<&str> = fixed.split('\n').collect();
        let mut in_code = false;
        for (i, line) in lines.iter().enumerate() {
            if line.trim().starts_with("```") {
                in_code = !in_code;
                continue;
            }
            if in_code || line.trim() != "---" {
                continue;
            }
            if i > 0 {
                prop_assert!(lines[i - 1].trim().is_empty(), "no blank before --- at line {i}");
            }
            if i + 1 < lines.len() {
                prop_assert!(lines[i + 1].trim().is_empty(), "no blank after --- at line {i}");
            }
        }
    }

    #[test]
    fn repaired_markdown_has_no_blank_runs(doc in markdown_doc()) {
        let fixed = fix_markdown_separators(&doc);
        prop_assert!(!fixed.contains("\n\n\n"));
    }

    #[test]
    fn separator_repair_is_idempotent(doc in markdown_doc()) {
        let once = fix_markdown_separators(&doc);
        prop_assert_eq!(fix_markdown_separators(&once), once);
    }

    #[test]
    fn list_merge_is_a_dedup_union(
        existing in prop::collection::vec("[a-e]{1,3}", 0..10),
        new in prop::collection::vec("[a-e]{1,3}", 0..10),
    ) {
        let merged = merge_list_dedup(&existing, &new);

        // No duplicates.
        let mut seen = std::collections::HashSet::new();
        for item in &merged {
            prop_assert!(seen.insert(item.clone()), "duplicate {item:?}");
        }
        // Every input element is present.
        for item in existing.iter().chain(new.iter()) {
            prop_assert!(merged.contains(item));
        }
        // Existing elements keep their first-seen relative order.
        let positions: Vec<usize> = existing
            .iter()
            .filter_map(|e| merged.iter().position(|m| m == e))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        prop_assert_eq!(&positions, &sorted);
    }

    #[test]
    fn section_merge_id_set_is_union_with_new_winning(
        existing_ids in prop::collection::vec("[a-d]", 0..6),
        new_ids in prop::collection::vec("[a-d]", 0..6),
    ) {
        let mk = |ids: &[String], tag: &str| -> Vec<Section> {
            ids.iter()
                .map(|id| Section {
                    id: id.clone(),
                    title: id.clone(),
                    content: format!("{tag}-{id}"),
                    ..Default::default()
                })
                .collect()
        };
        let existing = mk(&existing_ids, "old");
        let new = mk(&new_ids, "new");
        let merged = merge_sections(&existing, &new);

        // Id set is the union.
        let mut expected: Vec<&String> = existing_ids.iter().chain(new_ids.iter()).collect();
        expected.sort();
        expected.dedup();
        let mut got: Vec<&String> = merged.iter().map(|s| &s.id).collect();
        got.sort();
        got.dedup();
        prop_assert_eq!(got.len(), expected.len());

        // Later writes of the same id win.
        for section in &merged {
            if new_ids.contains(&section.id) {
                prop_assert!(section.content.starts_with("new-"));
            }
        }
    }
}
