//! Normalized matcher: two-tier lookup of a query against the knowledge table
//!
//! Normalization is Turkish-locale lowercasing followed by trimming:
//! - `İ` (U+0130) lowers to `i`
//! - `I` lowers to dotless `ı`, unless followed by a combining dot above (U+0307),
//!   in which case the pair lowers to `i`
//!
//! Tier 1 is exact equality of normalized strings. Tier 2 accepts the first
//! record whose normalized pattern is contained in the normalized query. Both
//! tiers walk the table in the order given, so callers control tie-breaking.

use crate::models::KnowledgeRecord;

const COMBINING_DOT_ABOVE: char = '\u{307}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    Fuzzy,
}

#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub record: &'a KnowledgeRecord,
    pub tier: MatchTier,
}

/// Lowercase with the tr-TR dotted/dotless I rules.
pub fn to_lowercase_tr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            'İ' => out.push('i'),
            'I' => {
                if chars.peek() == Some(&COMBINING_DOT_ABOVE) {
                    chars.next();
                    out.push('i');
                } else {
                    out.push('ı');
                }
            }
            other => out.extend(other.to_lowercase()),
        }
    }
    out
}

pub fn normalize(text: &str) -> String {
    to_lowercase_tr(text).trim().to_string()
}

pub fn find_match<'a>(query: &str, table: &'a [KnowledgeRecord]) -> Option<Match<'a>> {
    let query = normalize(query);
    let patterns: Vec<String> = table.iter().map(|r| normalize(&r.pattern)).collect();

    if let Some(i) = patterns.iter().position(|p| *p == query) {
        return Some(Match {
            record: &table[i],
            tier: MatchTier::Exact,
        });
    }

    // An empty pattern would be contained in every query.
    patterns
        .iter()
        .position(|p| !p.is_empty() && query.contains(p.as_str()))
        .map(|i| Match {
            record: &table[i],
            tier: MatchTier::Fuzzy,
        })
}

pub fn resolve<'a>(query: &str, table: &'a [KnowledgeRecord]) -> Option<&'a KnowledgeRecord> {
    find_match(query, table).map(|m| m.record)
}
