//! Evidence drawn from the request context.

use indexmap::IndexMap;
use serde_json::Value;
use std::sync::OnceLock;
use toolguard_core::text::{fold, tokenize, Token};
use toolguard_core::{CallContext, Role};

/// Longest word run indexed as a phrase
pub const MAX_PHRASE_WORDS: usize = 4;

#[derive(Debug, Clone, Copy)]
struct PhraseShape {
    words: usize,
    /// Length of the folded phrase
    chars: usize,
}

/// Everything a parameter value may be traced back to
#[derive(Debug, Clone, Default)]
pub struct EvidenceIndex {
    /// Tokenized messages from evidence roles, in conversation order
    messages: Vec<Vec<Token>>,
    /// Session entities as `(kind, value)`
    entities: Vec<(String, String)>,
    /// Scalar fact values rendered as text
    facts: Vec<String>,
    /// Distinct word runs from messages, built on first use
    phrases: OnceLock<IndexMap<String, PhraseShape>>,
}

impl EvidenceIndex {
    /// Build the index for one request.
    ///
    /// Only messages authored by one of `roles` count; model-authored text
    /// is never evidence unless configured so.
    #[must_use]
    pub fn build(context: &CallContext, roles: &[Role]) -> Self {
        let messages = context
            .messages()
            .iter()
            .filter(|m| roles.contains(&m.role))
            .map(|m| tokenize(&m.content))
            .filter(|tokens| !tokens.is_empty())
            .collect();

        let (entities, facts) = match &context.session_state {
            Some(state) => {
                let entities = state
                    .entities
                    .iter()
                    .flat_map(|(kind, values)| {
                        values.iter().map(move |v| (fold(kind), v.clone()))
                    })
                    .collect();
                let mut facts = Vec::new();
                for value in state.facts.values() {
                    collect_scalars(value, &mut facts);
                }
                (entities, facts)
            }
            None => (Vec::new(), Vec::new()),
        };

        Self {
            messages,
            entities,
            facts,
            phrases: OnceLock::new(),
        }
    }

    /// Check whether there is no evidence at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.entities.is_empty() && self.facts.is_empty()
    }

    /// Session entities for a kind; every entity when none is listed under
    /// that kind
    pub fn entities_of<'a>(&'a self, kind: &str) -> impl Iterator<Item = &'a str> + 'a {
        let kind = fold(kind);
        let known = self.entities.iter().any(|(k, _)| *k == kind);
        self.entities
            .iter()
            .filter(move |(k, _)| !known || *k == kind)
            .map(|(_, v)| v.as_str())
    }

    /// Fact values as text
    pub fn facts(&self) -> impl Iterator<Item = &str> {
        self.facts.iter().map(String::as_str)
    }

    /// Tokenized evidence messages
    #[must_use]
    pub fn messages(&self) -> &[Vec<Token>] {
        &self.messages
    }

    /// Distinct word runs of at most `max_words` tokens from evidence
    /// messages, in original casing and first-seen order, whose folded
    /// length is within `slack` characters of `chars`
    pub fn phrases_near(
        &self,
        chars: usize,
        slack: usize,
        max_words: usize,
    ) -> impl Iterator<Item = &str> {
        self.phrase_index()
            .iter()
            .filter(move |(_, shape)| shape.words <= max_words && shape.chars.abs_diff(chars) <= slack)
            .map(|(phrase, _)| phrase.as_str())
    }

    fn phrase_index(&self) -> &IndexMap<String, PhraseShape> {
        self.phrases.get_or_init(|| {
            let mut index = IndexMap::new();
            for tokens in &self.messages {
                for words in 1..=MAX_PHRASE_WORDS {
                    for window in tokens.windows(words) {
                        let phrase = window
                            .iter()
                            .map(|t| t.raw.as_str())
                            .collect::<Vec<_>>()
                            .join(" ");
                        let chars = fold(&phrase).chars().count();
                        index.entry(phrase).or_insert(PhraseShape { words, chars });
                    }
                }
            }
            index
        })
    }
}

fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(b.to_string()),
        Value::Number(n) => out.push(n.to_string()),
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_scalars(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_scalars(v, out)),
    }
}
