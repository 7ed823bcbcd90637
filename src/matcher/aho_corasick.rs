//! Aho-Corasick automaton for sensitive-word screening.
//!
//! Nodes live in an arena indexed by `usize`; node 0 is the root. Failure
//! links are computed breadth-first once all words are inserted, after which
//! the automaton is frozen into a [`PatternMatcher`] that is `Send + Sync`
//! and shared read-only across requests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

const ROOT: usize = 0;

/// How matches are reported when several keywords end at the same position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Report only the first terminal node on the fail chain (the longest
    /// keyword ending at that position), then stop walking.
    #[default]
    FirstPerPosition,
    /// Report every keyword ending at that position, longest first.
    AllPerPosition,
}

#[derive(Debug, Default)]
struct TrieNode {
    children: HashMap<char, usize>,
    /// `None` only for the root.
    fail: Option<usize>,
    word: Option<Arc<str>>,
}

/// Mutable trie under construction.
///
/// Insertion requires `&mut self`, so a builder has a single writer by
/// construction. Call [`build`](Self::build) to compute failure links.
#[derive(Debug)]
pub struct PatternMatcherBuilder {
    nodes: Vec<TrieNode>,
    words: usize,
}

impl Default for PatternMatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcherBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            words: 0,
        }
    }

    /// Insert a keyword. Empty keywords are ignored.
    pub fn insert(&mut self, word: &str) -> &mut Self {
        if word.is_empty() {
            return self;
        }

        let mut node = ROOT;
        for c in word.chars() {
            node = match self.nodes[node].children.get(&c) {
                Some(&next) => next,
                None => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node].children.insert(c, next);
                    next
                },
            };
        }

        if self.nodes[node].word.is_none() {
            self.words += 1;
        }
        self.nodes[node].word = Some(Arc::from(word));
        self
    }

    /// Insert every keyword from an iterator.
    pub fn extend<I, S>(&mut self, words: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for word in words {
            self.insert(word.as_ref());
        }
        self
    }

    /// Compute failure links and freeze the automaton.
    pub fn build(mut self, mode: MatchMode) -> PatternMatcher {
        let mut queue = VecDeque::new();
        queue.push_back(ROOT);

        while let Some(current) = queue.pop_front() {
            let edges: Vec<(char, usize)> = self.nodes[current]
                .children
                .iter()
                .map(|(&c, &child)| (c, child))
                .collect();

            for (c, child) in edges {
                // Start from the parent's fail link and walk until some node
                // has an edge for `c`; children of the root fail to the root.
                let mut fail = self.nodes[current].fail;
                let target = loop {
                    match fail {
                        Some(candidate) => {
                            if let Some(&next) = self.nodes[candidate].children.get(&c) {
                                break next;
                            }
                            fail = self.nodes[candidate].fail;
                        },
                        None => break ROOT,
                    }
                };
                self.nodes[child].fail = Some(target);
                queue.push_back(child);
            }
        }

        tracing::debug!(
            words = self.words,
            nodes = self.nodes.len(),
            ?mode,
            "Built sensitive-word automaton"
        );

        PatternMatcher {
            nodes: self.nodes,
            words: self.words,
            mode,
        }
    }
}

/// Immutable multi-keyword matcher.
#[derive(Debug)]
pub struct PatternMatcher {
    nodes: Vec<TrieNode>,
    words: usize,
    mode: MatchMode,
}

impl PatternMatcher {
    /// Build a matcher from keywords in one step.
    pub fn from_words<I, S>(words: I, mode: MatchMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = PatternMatcherBuilder::new();
        builder.extend(words);
        builder.build(mode)
    }

    /// Number of distinct keywords.
    pub fn len(&self) -> usize {
        self.words
    }

    /// True if no keyword was inserted.
    pub fn is_empty(&self) -> bool {
        self.words == 0
    }

    /// Reporting mode.
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Advance from `current` on `c`, following failure links as needed.
    fn step(&self, mut current: usize, c: char) -> usize {
        loop {
            if let Some(&next) = self.nodes[current].children.get(&c) {
                return next;
            }
            match self.nodes[current].fail {
                Some(fail) => current = fail,
                None => return ROOT,
            }
        }
    }

    /// Scan `text` and return matched keywords in order of occurrence.
    ///
    /// Duplicates are kept: `"worse and worse"` against `{worse}` yields two
    /// entries.
    pub fn search(&self, text: &str) -> Vec<String> {
        let mut hits = Vec::new();
        let mut current = ROOT;

        for c in text.chars() {
            current = self.step(current, c);

            let mut probe = current;
            while probe != ROOT {
                let node = &self.nodes[probe];
                if let Some(word) = &node.word {
                    hits.push(word.to_string());
                    if self.mode == MatchMode::FirstPerPosition {
                        break;
                    }
                }
                probe = node.fail.unwrap_or(ROOT);
            }
        }

        hits
    }

    /// True as soon as any keyword occurs in `text`.
    pub fn is_match(&self, text: &str) -> bool {
        let mut current = ROOT;
        for c in text.chars() {
            current = self.step(current, c);
            let mut probe = current;
            while probe != ROOT {
                if self.nodes[probe].word.is_some() {
                    return true;
                }
                probe = self.nodes[probe].fail.unwrap_or(ROOT);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(words: &[&str], mode: MatchMode) -> PatternMatcher {
        PatternMatcher::from_words(words.iter().copied(), mode)
    }

    #[test]
    fn test_single_hit() {
        let m = matcher(&["bad", "worse"], MatchMode::FirstPerPosition);
        assert_eq!(m.search("this is bad"), vec!["bad"]);
    }

    #[test]
    fn test_duplicates_in_order() {
        let m = matcher(&["bad", "worse"], MatchMode::FirstPerPosition);
        assert_eq!(m.search("it got worse and worse"), vec!["worse", "worse"]);
    }

    #[test]
    fn test_no_hit() {
        let m = matcher(&["bad", "worse"], MatchMode::FirstPerPosition);
        assert!(m.search("all good here").is_empty());
        assert!(!m.is_match("all good here"));
    }

    #[test]
    fn test_first_per_position_stops_at_longest() {
        let m = matcher(&["he", "she", "hers"], MatchMode::FirstPerPosition);
        // At the 'e' of "she" both "she" and "he" end; only "she" is reported.
        assert_eq!(m.search("ushers"), vec!["she", "hers"]);
    }

    #[test]
    fn test_all_per_position_reports_chain() {
        let m = matcher(&["he", "she", "hers"], MatchMode::AllPerPosition);
        assert_eq!(m.search("ushers"), vec!["she", "he", "hers"]);
    }

    #[test]
    fn test_failure_link_recovery() {
        // "abcd" partially matches before falling back to "bcx".
        let m = matcher(&["abcd", "bcx"], MatchMode::FirstPerPosition);
        assert_eq!(m.search("abcx"), vec!["bcx"]);
    }

    #[test]
    fn test_multibyte_keywords() {
        let m = matcher(&["违规", "敏感词"], MatchMode::FirstPerPosition);
        assert_eq!(m.search("这是一个敏感词和违规内容"), vec!["敏感词", "违规"]);
        assert!(m.is_match("含有违规"));
    }

    #[test]
    fn test_empty_and_duplicate_words() {
        let mut builder = PatternMatcherBuilder::new();
        builder.insert("").insert("spam").insert("spam");
        let m = builder.build(MatchMode::FirstPerPosition);
        assert_eq!(m.len(), 1);
        assert!(!m.is_empty());
        assert_eq!(m.search("spam"), vec!["spam"]);
    }

    #[test]
    fn test_empty_matcher_never_matches() {
        let m = PatternMatcherBuilder::new().build(MatchMode::AllPerPosition);
        assert!(m.is_empty());
        assert!(m.search("anything").is_empty());
    }

    #[test]
    fn test_matcher_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PatternMatcher>();
    }
}
