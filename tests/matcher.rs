//! Sensitive-word matcher: cache behaviour and properties against a naive scan.

use std::collections::BTreeSet;
use std::sync::Arc;

use contentguard::matcher::{FileWordSource, MatchMode, MatcherCache, PatternMatcher};
use proptest::prelude::*;

/// Every (end position, keyword) pair, longest keyword first per position.
fn naive(words: &BTreeSet<String>, text: &str) -> Vec<(usize, String)> {
    let chars: Vec<char> = text.chars().collect();
    let mut hits = Vec::new();
    for end in 0..chars.len() {
        let prefix: String = chars[..=end].iter().collect();
        let mut here: Vec<&String> = words.iter().filter(|w| prefix.ends_with(w.as_str())).collect();
        here.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));
        hits.extend(here.into_iter().map(|w| (end, w.clone())));
    }
    hits
}

#[test]
fn test_ushers_by_mode() {
    let words = ["he", "she", "hers"];
    let first = PatternMatcher::from_words(words, MatchMode::FirstPerPosition);
    let all = PatternMatcher::from_words(words, MatchMode::AllPerPosition);

    assert_eq!(first.search("ushers"), vec!["she", "hers"]);
    assert_eq!(all.search("ushers"), vec!["she", "he", "hers"]);
}

#[test]
fn test_mixed_script_keywords() {
    let matcher = PatternMatcher::from_words(["敏感词", "违禁", "spam"], MatchMode::FirstPerPosition);
    assert_eq!(
        matcher.search("这段文字含有敏感词，还有spam和违禁内容"),
        vec!["敏感词", "spam", "违禁"]
    );
    assert!(!matcher.is_match("一切正常"));
}

#[tokio::test]
async fn test_cache_builds_from_files_once_per_version() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("default.txt"), "bad\nworse\n").unwrap();
    let source = FileWordSource::new(dir.path());
    let cache = MatcherCache::new();

    let first = cache
        .get_or_build("default", "1", MatchMode::FirstPerPosition, &source)
        .await
        .unwrap();
    assert_eq!(first.search("it got worse and worse"), vec!["worse", "worse"]);

    // Same version: the file is not read again.
    std::fs::write(dir.path().join("default.txt"), "bad\nworse\nugly\n").unwrap();
    let again = cache
        .get_or_build("default", "1", MatchMode::FirstPerPosition, &source)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(again.len(), 2);

    // New version: rebuilt from the updated file.
    let bumped = cache
        .get_or_build("default", "2", MatchMode::FirstPerPosition, &source)
        .await
        .unwrap();
    assert_eq!(bumped.len(), 3);
}

#[tokio::test]
async fn test_missing_list_is_an_error_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let source = FileWordSource::new(dir.path());
    let cache = MatcherCache::new();

    assert!(cache
        .get_or_build("late", "1", MatchMode::FirstPerPosition, &source)
        .await
        .is_err());

    std::fs::write(dir.path().join("late.txt"), "bad\n").unwrap();
    let matcher = cache
        .get_or_build("late", "1", MatchMode::FirstPerPosition, &source)
        .await
        .unwrap();
    assert!(matcher.is_match("so bad"));
}

proptest! {
    #[test]
    fn prop_all_per_position_matches_naive_scan(
        words in prop::collection::btree_set("[ab]{1,3}", 1..6),
        text in "[abc]{0,30}",
    ) {
        let matcher = PatternMatcher::from_words(&words, MatchMode::AllPerPosition);
        let expected: Vec<String> = naive(&words, &text).into_iter().map(|(_, w)| w).collect();
        prop_assert_eq!(matcher.search(&text), expected);
    }

    #[test]
    fn prop_first_per_position_reports_longest_at_each_end(
        words in prop::collection::btree_set("[ab]{1,3}", 1..6),
        text in "[abc]{0,30}",
    ) {
        let matcher = PatternMatcher::from_words(&words, MatchMode::FirstPerPosition);
        let mut expected = Vec::new();
        let mut last_end = None;
        for (end, word) in naive(&words, &text) {
            if last_end != Some(end) {
                expected.push(word);
                last_end = Some(end);
            }
        }
        prop_assert_eq!(matcher.search(&text), expected.clone());
        prop_assert_eq!(matcher.is_match(&text), !expected.is_empty());
    }
}
