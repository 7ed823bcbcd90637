//! Local sensitive-word screening.
//!
//! An Aho-Corasick automaton finds every configured keyword in one pass over
//! the text. Automata are built once per `(source, version, mode)` and shared
//! through [`MatcherCache`].
//!
//! # Example
//!
//! ```
//! use contentguard::matcher::{MatchMode, PatternMatcher};
//!
//! let matcher = PatternMatcher::from_words(["bad", "worse"], MatchMode::FirstPerPosition);
//! assert_eq!(matcher.search("it got worse and worse"), vec!["worse", "worse"]);
//! ```

mod aho_corasick;
mod cache;
mod source;

pub use aho_corasick::{MatchMode, PatternMatcher, PatternMatcherBuilder};
pub use cache::MatcherCache;
pub use source::{parse_word_list, FileWordSource, StaticWordSource, WordSource};
