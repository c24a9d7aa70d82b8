//! Field-level reducers protecting list fields from lost updates.
//!
//! List-typed fields are snapshotted before each node; afterwards, if a
//! registered field changed, the snapshot and the node's version are
//! merged through a per-field reducer: union-dedup by serialized form for
//! most lists, id-keyed merge for sections (later writes of the same id
//! win, new ids append).

use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Mutex;

use super::NodeMiddleware;
use crate::article::{
    CodeBlock, ImageAsset, KeyConcept, ReferenceLink, ReviewIssue, SearchResult, Section,
};
use crate::state::ArticleState;
use crate::types::NodeKind;

/// Union-dedup merge: existing entries first, then new entries not yet
/// present. Identity is the serialized JSON form.
pub fn merge_list_dedup<T: serde::Serialize + Clone>(existing: &[T], new: &[T]) -> Vec<T> {
    if new.is_empty() {
        return existing.to_vec();
    }
    if existing.is_empty() {
        return new.to_vec();
    }
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut merged = Vec::with_capacity(existing.len() + new.len());
    for item in existing.iter().chain(new.iter()) {
        let key = serde_json::to_string(item).unwrap_or_default();
        if seen.insert(key) {
            merged.push(item.clone());
        }
    }
    merged
}

/// Id-keyed merge for sections: same id is overwritten by the newer entry
/// in place, new ids append in first-seen order.
pub fn merge_sections(existing: &[Section], new: &[Section]) -> Vec<Section> {
    if new.is_empty() {
        return existing.to_vec();
    }
    if existing.is_empty() {
        return new.to_vec();
    }
    let mut order: Vec<String> = Vec::new();
    let mut by_id: FxHashMap<String, Section> = FxHashMap::default();
    for section in existing.iter().chain(new.iter()) {
        if !by_id.contains_key(&section.id) {
            order.push(section.id.clone());
        }
        by_id.insert(section.id.clone(), section.clone());
    }
    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}

#[derive(Clone, Default)]
struct ListSnapshot {
    search_results: Vec<SearchResult>,
    sections: Vec<Section>,
    images: Vec<ImageAsset>,
    code_blocks: Vec<CodeBlock>,
    key_concepts: Vec<KeyConcept>,
    reference_links: Vec<ReferenceLink>,
    review_issues: Vec<ReviewIssue>,
}

/// The snapshot/merge middleware.
pub struct ReducerMiddleware {
    enabled: bool,
    snapshots: Mutex<FxHashMap<NodeKind, ListSnapshot>>,
}

impl ReducerMiddleware {
    pub fn new(enabled: bool) -> Self {
        ReducerMiddleware {
            enabled,
            snapshots: Mutex::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl NodeMiddleware for ReducerMiddleware {
    fn name(&self) -> &'static str {
        "reducers"
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn before_node(&self, state: &mut ArticleState, node: NodeKind) {
        let snapshot = ListSnapshot {
            search_results: state.search_results.clone(),
            sections: state.sections.clone(),
            images: state.images.clone(),
            code_blocks: state.code_blocks.clone(),
            key_concepts: state.key_concepts.clone(),
            reference_links: state.reference_links.clone(),
            review_issues: state.review_issues.clone(),
        };
        self.snapshots
            .lock()
            .expect("reducer stash poisoned")
            .insert(node, snapshot);
    }

    async fn after_node(&self, state: &mut ArticleState, node: NodeKind) {
        let Some(snapshot) = self
            .snapshots
            .lock()
            .expect("reducer stash poisoned")
            .remove(&node)
        else {
            return;
        };
        if state.search_results != snapshot.search_results {
            state.search_results = merge_list_dedup(&snapshot.search_results, &state.search_results);
        }
        if state.sections != snapshot.sections {
            state.sections = merge_sections(&snapshot.sections, &state.sections);
        }
        if state.images != snapshot.images {
            state.images = merge_list_dedup(&snapshot.images, &state.images);
        }
        if state.code_blocks != snapshot.code_blocks {
            state.code_blocks = merge_list_dedup(&snapshot.code_blocks, &state.code_blocks);
        }
        if state.key_concepts != snapshot.key_concepts {
            state.key_concepts = merge_list_dedup(&snapshot.key_concepts, &state.key_concepts);
        }
        if state.reference_links != snapshot.reference_links {
            state.reference_links =
                merge_list_dedup(&snapshot.reference_links, &state.reference_links);
        }
        if state.review_issues != snapshot.review_issues {
            state.review_issues = merge_list_dedup(&snapshot.review_issues, &state.review_issues);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(id: &str, content: &str) -> Section {
        Section {
            id: id.into(),
            title: id.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn dedup_merge_unions_and_preserves_first_seen_order() {
        let a = vec!["x".to_string(), "y".to_string()];
        let b = vec!["y".to_string(), "z".to_string()];
        assert_eq!(merge_list_dedup(&a, &b), vec!["x", "y", "z"]);
    }

    #[test]
    fn dedup_merge_with_empty_sides() {
        let a = vec!["x".to_string()];
        assert_eq!(merge_list_dedup(&a, &[]), vec!["x"]);
        assert_eq!(merge_list_dedup(&[], &a), vec!["x"]);
    }

    #[test]
    fn section_merge_overwrites_same_id_in_place() {
        let existing = vec![section("s1", "old"), section("s2", "keep")];
        let new = vec![section("s1", "new"), section("s3", "added")];
        let merged = merge_sections(&existing, &new);
        let ids: Vec<&str> = merged.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2", "s3"]);
        assert_eq!(merged[0].content, "new");
        assert_eq!(merged[1].content, "keep");
    }

    #[test]
    fn section_merge_id_set_is_union() {
        let existing = vec![section("a", ""), section("b", "")];
        let new = vec![section("c", ""), section("b", "2")];
        let merged = merge_sections(&existing, &new);
        let mut ids: Vec<&str> = merged.iter().map(|s| s.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
