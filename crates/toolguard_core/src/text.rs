//! Text folding, tokenization and edit distance.
//!
//! Shared by the grounding checker (is this value mentioned?) and the
//! correction synthesizer (is this name a near miss?). Both sides must fold
//! text identically or mentions stop matching.

/// A word from free text, kept in original and folded form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Text as written, surrounding punctuation removed
    pub raw: String,
    /// Folded form used for comparison
    pub norm: String,
}

impl Token {
    /// Numeric reading of the token, if it is a number
    #[must_use]
    pub fn number(&self) -> Option<f64> {
        parse_number(&self.raw)
    }
}

/// Fold a string for comparison: lowercase, `-` and `_` unified
#[must_use]
pub fn fold(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| if c == '-' { '_' } else { c })
        .flat_map(char::to_lowercase)
        .collect()
}

/// Split free text into tokens.
///
/// Whitespace and most punctuation separate words; `-`, `_`, `.`, `,` and
/// `'` survive inside a word so dates, decimals and identifiers stay whole.
/// A trailing possessive `'s` is dropped.
#[must_use]
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let flush = |current: &mut String, tokens: &mut Vec<Token>| {
        let trimmed = current.trim_matches(|c: char| !c.is_alphanumeric());
        let trimmed = trimmed
            .strip_suffix("'s")
            .or_else(|| trimmed.strip_suffix("\u{2019}s"))
            .unwrap_or(trimmed);
        if !trimmed.is_empty() {
            tokens.push(Token {
                raw: trimmed.to_string(),
                norm: trimmed.to_lowercase(),
            });
        }
        current.clear();
    };

    for c in text.chars() {
        if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ',' | '\'' | '\u{2019}' | '$' | '€' | '£') {
            current.push(c);
        } else {
            flush(&mut current, &mut tokens);
        }
    }
    flush(&mut current, &mut tokens);

    // Commas only survive between digits ("1,000"); elsewhere they separate.
    tokens
        .into_iter()
        .flat_map(|t| {
            if t.raw.contains(',') && parse_number(&t.raw).is_none() {
                tokenize_commas(&t.raw)
            } else {
                vec![t]
            }
        })
        .collect()
}

fn tokenize_commas(raw: &str) -> Vec<Token> {
    raw.split(',')
        .map(|part| part.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|part| !part.is_empty())
        .map(|part| Token {
            raw: part.to_string(),
            norm: part.to_lowercase(),
        })
        .collect()
}

/// Parse a number as people write it: `500`, `$1,000.00`, `12.5`, `€40`.
#[must_use]
pub fn parse_number(s: &str) -> Option<f64> {
    let s = s.trim().trim_start_matches(['$', '€', '£']);
    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
    {
        return None;
    }
    let cleaned: String = s.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Levenshtein distance over chars
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Outcome of a nearest-candidate search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closest<'a> {
    /// Exactly one candidate at the smallest distance
    Unique {
        /// The candidate
        candidate: &'a str,
        /// Distance of folded forms
        distance: usize,
    },
    /// Several distinct candidates tie at the smallest distance
    Ambiguous(Vec<&'a str>),
    /// Nothing within the allowed distance
    None,
}

/// Find the candidate closest to `input` within `max_distance`.
///
/// Comparison is on [`fold`]ed forms. Candidates that fold to the same
/// string count once.
#[must_use]
pub fn closest<'a, I>(input: &str, candidates: I, max_distance: usize) -> Closest<'a>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = fold(input);
    let mut best: Option<usize> = None;
    let mut at_best: Vec<(&'a str, String)> = Vec::new();

    for candidate in candidates {
        let folded = fold(candidate);
        let distance = levenshtein(&needle, &folded);
        if distance > max_distance {
            continue;
        }
        match best {
            Some(d) if distance > d => {}
            Some(d) if distance == d => {
                if !at_best.iter().any(|(_, f)| *f == folded) {
                    at_best.push((candidate, folded));
                }
            }
            _ => {
                best = Some(distance);
                at_best.clear();
                at_best.push((candidate, folded));
            }
        }
    }

    match (best, at_best.len()) {
        (Some(distance), 1) => Closest::Unique {
            candidate: at_best[0].0,
            distance,
        },
        (Some(_), _) => Closest::Ambiguous(at_best.into_iter().map(|(c, _)| c).collect()),
        (None, _) => Closest::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("get_whether", "get_weather"), 2);
    }

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("What's the weather in Paris, in celsius?");
        let norms: Vec<&str> = tokens.iter().map(|t| t.norm.as_str()).collect();
        assert_eq!(norms, vec!["what", "the", "weather", "in", "paris", "in", "celsius"]);
    }

    #[test]
    fn test_tokenize_keeps_numbers_and_dates() {
        let tokens = tokenize("Transfer $1,000.50 on 2024-07-01 to AAPL's desk");
        let raws: Vec<&str> = tokens.iter().map(|t| t.raw.as_str()).collect();
        assert_eq!(raws, vec!["Transfer", "1,000.50", "on", "2024-07-01", "to", "AAPL", "desk"]);
        assert_eq!(tokens[1].number(), Some(1000.5));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("500"), Some(500.0));
        assert_eq!(parse_number("€40"), Some(40.0));
        assert_eq!(parse_number("2024-07-01"), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_fold() {
        assert_eq!(fold(" Get-Weather "), "get_weather");
    }

    #[test]
    fn test_closest_unique() {
        let names = ["get_weather", "transfer_money", "get_stock_price"];
        assert_eq!(
            closest("get_whether", names, 2),
            Closest::Unique {
                candidate: "get_weather",
                distance: 2
            }
        );
    }

    #[test]
    fn test_closest_ambiguous_and_none() {
        let names = ["cat", "car"];
        assert_eq!(closest("cab", names, 1), Closest::Ambiguous(vec!["cat", "car"]));
        assert_eq!(closest("zebra", names, 1), Closest::None);
    }

    proptest! {
        #[test]
        fn prop_levenshtein_symmetric(a in "[a-z_]{0,12}", b in "[a-z_]{0,12}") {
            prop_assert_eq!(levenshtein(&a, &b), levenshtein(&b, &a));
        }

        #[test]
        fn prop_levenshtein_bounded_by_longer(a in "[a-z]{0,12}", b in "[a-z]{0,12}") {
            let d = levenshtein(&a, &b);
            prop_assert!(d <= a.chars().count().max(b.chars().count()));
            prop_assert_eq!(d == 0, a == b);
        }
    }
}
