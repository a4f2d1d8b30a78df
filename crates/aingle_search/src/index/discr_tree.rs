//! Discrimination tree and the rule index built on it.

use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use super::keys::{skip_subterm, Key, Reductions};
use super::mode::{IndexMatchLocation, IndexMatchResult, IndexingMode};
use crate::engine::GoalView;

#[derive(Debug, Clone)]
struct Node<V> {
    values: Vec<V>,
    children: IndexMap<Key, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            children: IndexMap::new(),
        }
    }
}

/// A trie over key sequences.
///
/// Lookups treat [`Key::Star`] as a wildcard on both sides: a stored star
/// skips one subterm of the query, a star in the query skips one stored
/// subterm.
#[derive(Debug, Clone)]
pub struct DiscrTree<V> {
    root: Node<V>,
    len: usize,
}

impl<V> Default for DiscrTree<V> {
    fn default() -> Self {
        Self {
            root: Node::default(),
            len: 0,
        }
    }
}

impl<V: PartialEq> DiscrTree<V> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `keys`. Returns `false` if the same value was
    /// already stored under these keys.
    pub fn insert(&mut self, keys: &[Key], value: V) -> bool {
        let mut node = &mut self.root;
        for key in keys {
            node = node.children.entry(key.clone()).or_default();
        }
        if node.values.contains(&value) {
            return false;
        }
        node.values.push(value);
        self.len += 1;
        true
    }

    /// Returns every value whose keys are compatible with `query`.
    pub fn get_match(&self, query: &[Key]) -> Vec<&V> {
        let mut out = Vec::new();
        Self::collect(&self.root, query, &mut out);
        out
    }

    fn collect<'a>(node: &'a Node<V>, query: &[Key], out: &mut Vec<&'a V>) {
        let Some((head, rest)) = query.split_first() else {
            out.extend(node.values.iter());
            return;
        };
        if *head == Key::Star {
            Self::skip_stored(node, 1, rest, out);
            return;
        }
        if let Some(star) = node.children.get(&Key::Star) {
            Self::collect(star, skip_subterm(query), out);
        }
        if let Some(child) = node.children.get(head) {
            Self::collect(child, rest, out);
        }
    }

    /// Descends past `pending` complete stored subterms, then resumes
    /// matching `query`.
    fn skip_stored<'a>(node: &'a Node<V>, pending: usize, query: &[Key], out: &mut Vec<&'a V>) {
        if pending == 0 {
            Self::collect(node, query, out);
            return;
        }
        for (key, child) in &node.children {
            Self::skip_stored(child, pending - 1 + key.arity(), query, out);
        }
    }

    /// Number of stored values.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Retrieves the rules that may apply to a goal.
#[derive(Debug, Clone)]
pub struct RuleIndex<R> {
    target: DiscrTree<R>,
    hyps: DiscrTree<R>,
    unindexed: Vec<R>,
}

impl<R> Default for RuleIndex<R> {
    fn default() -> Self {
        Self {
            target: DiscrTree::default(),
            hyps: DiscrTree::default(),
            unindexed: Vec::new(),
        }
    }
}

impl<R: Clone + Ord> RuleIndex<R> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `rule` under every part of `mode`.
    pub fn insert(&mut self, mode: &IndexingMode, rule: R) {
        match mode {
            IndexingMode::Unindexed => {
                if !self.unindexed.contains(&rule) {
                    self.unindexed.push(rule);
                }
            }
            IndexingMode::Target(keys) => {
                self.target.insert(keys, rule);
            }
            IndexingMode::Hyps(keys) => {
                self.hyps.insert(keys, rule);
            }
            IndexingMode::Or(modes) => {
                for m in modes {
                    self.insert(m, rule.clone());
                }
            }
        }
    }

    /// Returns the rules matching `goal`, one result per rule, sorted by rule.
    pub fn applicable(&self, goal: &GoalView, reductions: &Reductions) -> Vec<IndexMatchResult<R>> {
        let mut found: BTreeMap<R, BTreeSet<IndexMatchLocation>> = BTreeMap::new();
        for rule in &self.unindexed {
            found.entry(rule.clone()).or_default().insert(IndexMatchLocation::None);
        }
        if !self.target.is_empty() {
            let keys = reductions.keys(&goal.target);
            for rule in self.target.get_match(&keys) {
                found.entry(rule.clone()).or_default().insert(IndexMatchLocation::Target);
            }
        }
        if !self.hyps.is_empty() {
            for hyp in &goal.hyps {
                let keys = reductions.keys(&hyp.ty);
                for rule in self.hyps.get_match(&keys) {
                    found
                        .entry(rule.clone())
                        .or_default()
                        .insert(IndexMatchLocation::Hyp(hyp.fvar));
                }
            }
        }
        found
            .into_iter()
            .map(|(rule, locations)| IndexMatchResult::new(rule, locations))
            .collect()
    }
}
