//! Expression normalizer.
//!
//! Rewrites raw include/exclude keyword text into the compact token
//! string the boolean parser consumes: terms are lowercase
//! `[a-z0-9_]+` words, operators are `&` (AND), `|` (OR), `~` (NOT),
//! and parentheses are the only surviving punctuation.

/// Normalize a user intent into a parser-ready token string.
///
/// `exclude` is a plain keyword list: every word in it is negated and
/// ANDed onto the include expression. Inline ` -word` shorthand in the
/// include text means the same thing. Returns an empty string when no
/// terms remain, which callers must treat as an empty-query condition
/// rather than a syntax error.
pub fn normalize_intent(include: &str, exclude: &str) -> String {
    let mut text = include.to_lowercase();

    // Every exclude word becomes "not <word>"; pre-existing "not"
    // tokens are dropped first so nothing gets negated twice.
    for word in exclude.to_lowercase().split_whitespace() {
        if word == "not" {
            continue;
        }
        text.push_str(" not ");
        text.push_str(word);
    }

    // Inline exclusion shorthand: "a -b" reads as "a and not b".
    let text = text.replace(" -", " and not ");
    let text = text.replace('"', "'");

    // Collapse whitespace runs before phrase extraction so quoted
    // phrases join with single underscores.
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let text = join_quoted_phrases(&text);
    let text = strip_punctuation(&text);

    to_operator_string(&text)
}

/// Replace every `'quoted phrase'` with a single underscore-joined
/// token. An unpaired quote is left in place and removed later with
/// the rest of the punctuation.
fn join_quoted_phrases(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('\'') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('\'') {
            Some(end) => {
                out.push_str(&after[..end].replace(' ', "_"));
                rest = &after[end + 1..];
            }
            None => {
                out.push('\'');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Drop all punctuation except parentheses. Underscores survive
/// because quoted phrases were already joined with them.
fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')'))
        .collect()
}

/// Rewrite connective words into operator symbols and insert the
/// implicit AND between adjacent terms ("a b" means "a&b").
fn to_operator_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // True once a term has been emitted and the next term needs a
    // connective in front of it.
    let mut needs_connective = false;

    for token in text.split_whitespace() {
        match token {
            "and" => {
                out.push('&');
                needs_connective = false;
            }
            "or" => {
                out.push('|');
                needs_connective = false;
            }
            "not" => {
                if needs_connective {
                    out.push('&');
                }
                out.push('~');
                needs_connective = false;
            }
            term => {
                if needs_connective {
                    out.push('&');
                }
                out.push_str(term);
                needs_connective = true;
            }
        }
    }

    // A term string containing only parens or underscores is as empty
    // as no input at all.
    if out.chars().all(|c| !c.is_alphanumeric()) {
        return String::new();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_and_and_or() {
        assert_eq!(normalize_intent("a b or c", ""), "a&b|c");
    }

    #[test]
    fn test_hyphen_shorthand_matches_not() {
        assert_eq!(normalize_intent("a -b", ""), "a&~b");
        assert_eq!(normalize_intent("a not b", ""), "a&~b");
    }

    #[test]
    fn test_exclude_words_are_negated() {
        assert_eq!(normalize_intent("alpha", "beta gamma"), "alpha&~beta&~gamma");
    }

    #[test]
    fn test_exclude_drops_existing_not() {
        assert_eq!(normalize_intent("alpha", "not beta"), "alpha&~beta");
    }

    #[test]
    fn test_quoted_phrase_becomes_single_term() {
        assert_eq!(
            normalize_intent("\"machine learning\" and not deep", ""),
            "machine_learning&~deep"
        );
    }

    #[test]
    fn test_single_quotes_work_too() {
        assert_eq!(normalize_intent("'neural networks'", "survey"), "neural_networks&~survey");
    }

    #[test]
    fn test_parentheses_survive() {
        assert_eq!(normalize_intent("(a or b) c", ""), "(a|b)&c");
    }

    #[test]
    fn test_punctuation_is_stripped() {
        assert_eq!(normalize_intent("bayes, nets!", ""), "bayes&nets");
    }

    #[test]
    fn test_uppercase_is_folded() {
        assert_eq!(normalize_intent("Alpha OR Beta", ""), "alpha|beta");
    }

    #[test]
    fn test_empty_input_yields_empty_string() {
        assert_eq!(normalize_intent("", ""), "");
        assert_eq!(normalize_intent("  ,;  ", ""), "");
    }
}
