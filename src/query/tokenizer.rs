//! Query tokenizer.
//!
//! Splits a query into its top-level clauses. Words are separated by
//! whitespace, except inside parentheses and quoted literals, so
//! `COUNT(DISTINCT p.id)` or `'a b'` stay single tokens:
//!
//! ```text
//! SELECT u.id, COUNT(p.id) FROM User u LEFT JOIN u.Phonenumbers p WHERE u.name = 'a b'
//! └─ SELECT ["u.id,", "COUNT(p.id)"]
//! └─ FROM   ["User", "u", "LEFT", "JOIN", "u.Phonenumbers", "p"]
//! └─ WHERE  ["u.name", "=", "'a b'"]
//! ```
//!
//! The splitters used by clause parsers (top-level commas, placeholder
//! counting) live here too, since they share the same quote/paren scanner.

use super::clause::ClauseKind;
use crate::error::{CompileError, CompileResult};
use crate::execution::Value;
use crate::sql::query::Fragment;

/// One top-level clause and its raw tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct ClauseTokens {
    pub kind: ClauseKind,
    pub tokens: Vec<String>,
}

impl ClauseTokens {
    /// Clause body with tokens joined by single spaces.
    pub fn body(&self) -> String {
        self.tokens.join(" ")
    }
}

/// Split a query into clauses in canonical order.
pub fn tokenize(query: &str) -> CompileResult<Vec<ClauseTokens>> {
    let words = split_words(query)?;
    let mut clauses: Vec<ClauseTokens> = Vec::new();

    let mut i = 0;
    while i < words.len() {
        let next = words.get(i + 1).map(String::as_str);
        if let Some((kind, width)) = ClauseKind::from_keyword(&words[i], next) {
            if let Some(previous) = clauses.last() {
                check_order(previous.kind, kind)?;
            }
            clauses.push(ClauseTokens {
                kind,
                tokens: Vec::new(),
            });
            i += width;
            continue;
        }

        match clauses.last_mut() {
            Some(clause) => clause.tokens.push(words[i].clone()),
            None => {
                return Err(CompileError::malformed(format!(
                    "unexpected '{}' before the first clause keyword",
                    words[i]
                )))
            }
        }
        i += 1;
    }

    if clauses.is_empty() {
        return Err(CompileError::malformed("query is empty"));
    }

    if let Some(empty) = clauses
        .iter()
        .find(|c| c.tokens.is_empty() && c.kind != ClauseKind::Delete)
    {
        return Err(CompileError::malformed(format!(
            "{} clause has no body",
            empty.kind.keyword()
        )));
    }

    Ok(clauses)
}

fn check_order(previous: ClauseKind, next: ClauseKind) -> CompileResult<()> {
    if next.rank() > previous.rank() {
        return Ok(());
    }
    if next == previous {
        Err(CompileError::malformed(format!(
            "duplicate {} clause",
            next.keyword()
        )))
    } else {
        Err(CompileError::malformed(format!(
            "{} clause cannot follow {}",
            next.keyword(),
            previous.keyword()
        )))
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Every character outside quoted literals, with its byte offset and the
/// parenthesis depth it sits at. Parentheses report the depth outside them.
fn unquoted_chars(text: &str) -> CompileResult<Vec<(usize, char, usize)>> {
    let mut out = Vec::with_capacity(text.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if let Some(q) = quote {
            if c == q {
                // Doubled quote is an escaped quote
                if chars.peek().map(|&(_, n)| n) == Some(q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                continue;
            }
            '(' => {
                out.push((i, c, depth));
                depth += 1;
                continue;
            }
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| {
                    CompileError::malformed(format!("unbalanced ')' in '{}'", text))
                })?;
            }
            _ => {}
        }
        out.push((i, c, depth));
    }

    if quote.is_some() {
        return Err(CompileError::malformed(format!(
            "unterminated string literal in '{}'",
            text
        )));
    }
    if depth > 0 {
        return Err(CompileError::malformed(format!(
            "unbalanced '(' in '{}'",
            text
        )));
    }

    Ok(out)
}

/// Split `text` at every top-level occurrence of a character matching `is_sep`.
fn split_top_level_by(text: &str, is_sep: impl Fn(char) -> bool) -> CompileResult<Vec<&str>> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c, depth) in unquoted_chars(text)? {
        if depth == 0 && is_sep(c) {
            pieces.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    pieces.push(&text[start..]);
    Ok(pieces)
}

/// Whitespace-separated words, never splitting inside parentheses or quotes.
pub fn split_words(text: &str) -> CompileResult<Vec<String>> {
    Ok(split_top_level_by(text, char::is_whitespace)?
        .into_iter()
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect())
}

/// Comma-separated items at depth 0, trimmed. Empty items are an error.
pub fn split_top_level_commas(text: &str) -> CompileResult<Vec<String>> {
    let items: Vec<String> = split_top_level_by(text, |c| c == ',')?
        .into_iter()
        .map(|item| item.trim().to_string())
        .collect();

    if items.iter().any(String::is_empty) {
        return Err(CompileError::malformed(format!(
            "empty item in list '{}'",
            text
        )));
    }
    Ok(items)
}

/// Byte offset of the first top-level occurrence of `target`.
pub fn find_top_level(text: &str, target: char) -> CompileResult<Option<usize>> {
    Ok(unquoted_chars(text)?
        .into_iter()
        .find(|&(_, c, depth)| depth == 0 && c == target)
        .map(|(i, _, _)| i))
}

/// Number of positional `?` placeholders outside string literals.
pub fn count_placeholders(text: &str) -> CompileResult<usize> {
    Ok(unquoted_chars(text)?
        .into_iter()
        .filter(|&(_, c, _)| c == '?')
        .count())
}

/// Case-insensitive keyword comparison.
pub fn is_keyword(word: &str, keyword: &str) -> bool {
    word.eq_ignore_ascii_case(keyword)
}

/// Whether `word` is a plain identifier usable as an alias.
pub fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Hand each item the parameters its placeholders consume, in order.
pub fn pair_params(items: Vec<String>, params: &[Value]) -> CompileResult<Vec<Fragment>> {
    let mut fragments = Vec::with_capacity(items.len());
    let mut offset = 0;

    for item in items {
        let count = count_placeholders(&item)?;
        let end = offset + count;
        let slice = params.get(offset..end).ok_or_else(|| {
            CompileError::malformed(format!(
                "'{}' needs {} parameter(s) but only {} remain",
                item,
                count,
                params.len().saturating_sub(offset)
            ))
        })?;
        fragments.push(Fragment::with_params(item, slice.to_vec()));
        offset = end;
    }

    if offset != params.len() {
        return Err(CompileError::malformed(format!(
            "{} parameter(s) bound but only {} placeholder(s) found",
            params.len(),
            offset
        )));
    }

    Ok(fragments)
}
