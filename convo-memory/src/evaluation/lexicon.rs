//! Phrase lists and matchers used by the rule-based scorers.
//!
//! Phrases match on word boundaries against lowercased text, so "hi" does
//! not fire inside "this". Each list compiles once into a `RegexSet`.

use std::sync::LazyLock;

use regex::{Regex, RegexSet};

pub(crate) const GREETING_PHRASES: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
    "welcome",
];

pub(crate) const CLOSING_PHRASES: &[&str] = &[
    "bye",
    "goodbye",
    "farewell",
    "see you",
    "take care",
    "have a nice day",
    "thank you",
    "thanks",
];

pub(crate) const FILLER_PHRASES: &[&str] = &[
    "i see",
    "okay",
    "alright",
    "sure",
    "got it",
    "understood",
    "makes sense",
    "right",
    "yeah",
    "yes",
];

pub(crate) const ERROR_PHRASES: &[&str] = &[
    "error",
    "mistake",
    "wrong",
    "incorrect",
    "sorry",
    "apologize",
    "my bad",
    "oops",
    "fault",
];

pub(crate) const TEMPORAL_PHRASES: &[&str] = &[
    "today",
    "tomorrow",
    "yesterday",
    "now",
    "currently",
    "this week",
    "next",
    "last",
    "soon",
    "recently",
];

pub(crate) const TASK_PHRASES: &[&str] = &[
    "need", "want", "help", "please", "could", "would", "should", "must", "have to", "try",
    "let's", "will",
];

pub(crate) const SUBSTANCE_PHRASES: &[&str] = &[
    "because",
    "therefore",
    "however",
    "although",
    "despite",
    "specifically",
    "particularly",
    "especially",
    "exactly",
    "for example",
    "such as",
    "like",
    "including",
    "first",
    "second",
    "finally",
    "step",
    "process",
];

pub(crate) const CODE_MARKERS: &[&str] = &["```", "def ", "class ", "function", "import", "return"];

pub(crate) const CONTRADICTION_PHRASES: &[&str] = &[
    "no, actually",
    "that's wrong",
    "incorrect",
    "not true",
    "false",
    "mistake",
    "error",
];

pub(crate) const CONFIDENCE_PHRASES: &[&str] = &[
    "definitely",
    "certainly",
    "absolutely",
    "clearly",
    "obviously",
    "without doubt",
    "for sure",
];

pub(crate) const UNCERTAINTY_PHRASES: &[&str] = &[
    "maybe",
    "perhaps",
    "possibly",
    "might be",
    "could be",
    "not sure",
    "uncertain",
    "unclear",
];

/// Simple substantive markers used by the model evaluator's local scoring.
pub(crate) const MODEL_SUBSTANCE_PHRASES: &[&str] = &[
    "because",
    "therefore",
    "however",
    "specifically",
    "example",
    "means",
    "important",
    "explain",
];

/// Context patterns that mark a sentence as a factual statement.
pub(crate) const FACT_PATTERNS: &[&str] = &[
    " is ", " are ", " was ", " were ", " has ", " have ", " equals ", " means ",
];

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "from", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "must", "shall", "can",
];

const QUESTION_PATTERNS: &[&str] = &[
    r"\?",
    r"^\s*(what|where|when|why|how|who|which)\b",
    r"\b(can|could|would|should|may|might) (you|i|we)\b",
];

// =============================================================================
// PhraseSet
// =============================================================================

/// Compiled phrase list.
#[derive(Debug)]
pub(crate) struct PhraseSet {
    set: RegexSet,
}

impl PhraseSet {
    fn new(phrases: &'static [&'static str]) -> Self {
        let set = RegexSet::new(phrases.iter().map(|p| bounded(p)))
            .expect("invalid phrase set");
        Self { set }
    }

    /// Number of distinct phrases present in `lowered`.
    pub(crate) fn count(&self, lowered: &str) -> usize {
        self.set.matches(lowered).iter().count()
    }

    /// Whether any phrase is present in `lowered`.
    pub(crate) fn any(&self, lowered: &str) -> bool {
        self.set.is_match(lowered)
    }
}

/// Escape `phrase` and anchor it on word boundaries where it starts or ends
/// with a word character.
fn bounded(phrase: &str) -> String {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut pattern = String::new();
    if phrase.chars().next().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(phrase));
    if phrase.chars().last().is_some_and(is_word) {
        pattern.push_str(r"\b");
    }
    pattern
}

macro_rules! phrase_set {
    ($name:ident, $phrases:expr) => {
        pub(crate) fn $name() -> &'static PhraseSet {
            static SET: LazyLock<PhraseSet> = LazyLock::new(|| PhraseSet::new($phrases));
            &SET
        }
    };
}

phrase_set!(greetings, GREETING_PHRASES);
phrase_set!(closings, CLOSING_PHRASES);
phrase_set!(fillers, FILLER_PHRASES);
phrase_set!(errors, ERROR_PHRASES);
phrase_set!(temporal, TEMPORAL_PHRASES);
phrase_set!(tasks, TASK_PHRASES);
phrase_set!(substance, SUBSTANCE_PHRASES);
phrase_set!(code, CODE_MARKERS);
phrase_set!(contradictions, CONTRADICTION_PHRASES);
phrase_set!(confidence, CONFIDENCE_PHRASES);
phrase_set!(uncertainty, UNCERTAINTY_PHRASES);
phrase_set!(model_substance, MODEL_SUBSTANCE_PHRASES);

// =============================================================================
// Helpers
// =============================================================================

/// Whether `lowered` reads as a question.
pub(crate) fn is_question(lowered: &str) -> bool {
    static PATTERNS: LazyLock<RegexSet> =
        LazyLock::new(|| RegexSet::new(QUESTION_PATTERNS).expect("invalid question patterns"));
    PATTERNS.is_match(lowered)
}

/// Lowercased non-stopword tokens longer than two characters.
pub(crate) fn keywords(text: &str) -> std::collections::HashSet<String> {
    static WORD: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b\w+\b").expect("invalid word regex"));
    let lowered = text.to_lowercase();

    WORD.find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|t| t.chars().count() > 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two keyword sets; 0.0 when both are empty.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn jaccard(
    a: &std::collections::HashSet<String>,
    b: &std::collections::HashSet<String>,
) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Whitespace-separated word count.
pub(crate) fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}
