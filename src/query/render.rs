//! Per-backend query renderers.
//!
//! Each renderer is a pure function from a canonical [`Expr`] to that
//! backend's native query grammar. The engine never inspects rendered
//! queries; they go straight to the matching adapter.

use super::parser::Expr;

/// How one backend spells the boolean connectives and its terms.
struct Grammar {
    and_sep: &'static str,
    or_sep: &'static str,
    /// Connective used when the right-hand operand of an AND is negated.
    andnot_sep: &'static str,
    /// Prefix for a negation that does not follow an AND operand.
    not_prefix: &'static str,
    term: fn(&str) -> String,
}

/// arXiv export API grammar: `all:` field prefix on every term,
/// multi-word phrases keep their spaces, negation is ANDNOT.
pub fn arxiv_query(expr: &Expr) -> String {
    let grammar = Grammar {
        and_sep: " AND ",
        or_sep: " OR ",
        andnot_sep: " ANDNOT ",
        not_prefix: "ANDNOT ",
        term: |t| format!("all:{}", t.replace('_', " ")),
    };
    render(expr, &grammar)
}

/// Google Scholar grammar: implicit AND (space), `-` exclusion,
/// multi-word terms re-quoted as phrases.
pub fn scholar_query(expr: &Expr) -> String {
    let grammar = Grammar {
        and_sep: " ",
        or_sep: " OR ",
        andnot_sep: " -",
        not_prefix: "-",
        term: |t| {
            if t.contains('_') {
                format!("\"{}\"", t.replace('_', " "))
            } else {
                t.to_string()
            }
        },
    };
    render(expr, &grammar)
}

/// Scopus advanced-search grammar: every term wrapped in the ALL field
/// qualifier, spelled-out AND / OR / AND NOT connectives.
pub fn scopus_query(expr: &Expr) -> String {
    let grammar = Grammar {
        and_sep: " AND ",
        or_sep: " OR ",
        andnot_sep: " AND NOT ",
        not_prefix: "NOT ",
        term: |t| format!("ALL({})", t.replace('_', " ")),
    };
    render(expr, &grammar)
}

fn render(expr: &Expr, g: &Grammar) -> String {
    match expr {
        Expr::Term(t) => (g.term)(t),
        Expr::Not(inner) => format!("{}{}", g.not_prefix, negated_operand(inner, g)),
        Expr::And(children) => {
            let mut out = and_operand(&children[0], g);
            for child in &children[1..] {
                match child {
                    Expr::Not(inner) => {
                        out.push_str(g.andnot_sep);
                        out.push_str(&negated_operand(inner, g));
                    }
                    other => {
                        out.push_str(g.and_sep);
                        out.push_str(&and_operand(other, g));
                    }
                }
            }
            out
        }
        Expr::Or(children) => children
            .iter()
            .map(|c| render(c, g))
            .collect::<Vec<_>>()
            .join(g.or_sep),
    }
}

/// A negated operand keeps parentheses unless it is a bare term.
fn negated_operand(expr: &Expr, g: &Grammar) -> String {
    match expr {
        Expr::Term(_) => render(expr, g),
        _ => format!("({})", render(expr, g)),
    }
}

/// An AND operand needs parentheses only around a nested OR.
fn and_operand(expr: &Expr, g: &Grammar) -> String {
    match expr {
        Expr::Or(_) => format!("({})", render(expr, g)),
        _ => render(expr, g),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parser::parse;

    #[test]
    fn test_arxiv_connectives() {
        let expr = parse("a&~b|c").unwrap();
        assert_eq!(arxiv_query(&expr), "all:a ANDNOT all:b OR all:c");
    }

    #[test]
    fn test_arxiv_restores_phrase_spaces() {
        let expr = parse("machine_learning&robotics").unwrap();
        assert_eq!(arxiv_query(&expr), "all:machine learning AND all:robotics");
    }

    #[test]
    fn test_arxiv_grouping() {
        let expr = parse("(a|b)&~c").unwrap();
        assert_eq!(arxiv_query(&expr), "(all:a OR all:b) ANDNOT all:c");
    }

    #[test]
    fn test_scholar_connectives() {
        let expr = parse("a&~b|c").unwrap();
        let query = scholar_query(&expr);
        assert_eq!(query, "a -b OR c");
        assert!(!query.contains('&') && !query.contains('|') && !query.contains('~'));
    }

    #[test]
    fn test_scholar_quotes_phrases_only() {
        let expr = parse("machine_learning&deep").unwrap();
        assert_eq!(scholar_query(&expr), "\"machine learning\" deep");
    }

    #[test]
    fn test_scopus_connectives() {
        let expr = parse("a&~b|c").unwrap();
        assert_eq!(scopus_query(&expr), "ALL(a) AND NOT ALL(b) OR ALL(c)");
    }

    #[test]
    fn test_neural_networks_scenario() {
        let tokens = crate::query::normalize_intent("\"neural networks\"", "survey");
        let expr = parse(&tokens).unwrap();
        assert_eq!(expr.canonical(), "neural_networks&~survey");

        let query = arxiv_query(&expr);
        assert!(!query.contains(" AND "), "single include term must not emit AND: {query}");
        assert!(query.contains("ANDNOT all:survey"));
    }
}
