//! Expression rewriting for WHERE, HAVING, ON, GROUP BY, ORDER BY and SET
//! operands.
//!
//! Expressions are copied through unchanged except for:
//!
//! - `alias.field` paths, rewritten to `shortAlias.column`;
//! - a bare component alias, rewritten to its identifier column;
//! - `(SELECT ...)`, compiled as a nested query in a child alias namespace;
//! - select-list aliases in GROUP BY, HAVING and ORDER BY;
//! - `?` placeholders, which pick up their bound value in order.
//!
//! Everything else (operators, SQL functions, literals, `:named`
//! placeholders) passes through verbatim.

use std::sync::Arc;

use super::clause::ClauseKind;
use super::compiler::{Compilation, Projection};
use super::tokenizer::{
    count_placeholders, find_top_level, is_identifier, is_keyword, pair_params,
    split_top_level_commas, split_words,
};
use crate::error::{CompileError, CompileResult};
use crate::execution::Value;
use crate::sql::query::{Fragment, OrderByExpr, SortDir, StatementKind};

/// Clause an expression is rewritten for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExprMode {
    Select,
    Condition,
    GroupBy,
    Having,
    OrderBy,
}

impl ExprMode {
    /// Whether bare words may name select-list aliases.
    fn sees_select_aliases(self) -> bool {
        matches!(self, ExprMode::GroupBy | ExprMode::Having | ExprMode::OrderBy)
    }
}

/// A rewritten expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Rewritten {
    pub sql: String,
    pub params: Vec<Value>,
    /// Component aliases the expression referenced, in order.
    pub aliases: Vec<String>,
}

impl Rewritten {
    pub fn into_fragment(self) -> Fragment {
        Fragment::with_params(self.sql, self.params)
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Index just past the literal opened at `start`.
fn literal_end(chars: &[char], start: usize) -> CompileResult<usize> {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        if chars[i] == quote {
            if chars.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(CompileError::malformed("unterminated string literal"))
}

/// Index of the parenthesis closing the one at `open`.
fn matching_paren(chars: &[char], open: usize) -> CompileResult<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\'' | '"' => {
                i = literal_end(chars, i)?;
                continue;
            }
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    Err(CompileError::malformed("unbalanced '(' in expression"))
}

/// Whether the parenthesis at `open` starts a nested SELECT.
fn opens_subquery(chars: &[char], open: usize) -> bool {
    let rest: Vec<char> = chars[open + 1..]
        .iter()
        .copied()
        .skip_while(|c| c.is_whitespace())
        .take(7)
        .collect();
    rest.len() >= 6
        && is_keyword(&rest[..6].iter().collect::<String>(), "SELECT")
        && !rest.get(6).is_some_and(|&c| is_word_char(c))
}

/// Body of `(SELECT ...)` when `text` is exactly one parenthesized subquery.
pub(crate) fn subquery_body(text: &str) -> Option<String> {
    let chars: Vec<char> = text.trim().chars().collect();
    if chars.first() != Some(&'(') || !opens_subquery(&chars, 0) {
        return None;
    }
    let close = matching_paren(&chars, 0).ok()?;
    (close == chars.len() - 1).then(|| chars[1..close].iter().collect::<String>().trim().to_string())
}

/// Name and argument text of `name(args)` when `text` is exactly one call.
pub(crate) fn function_call(text: &str) -> Option<(String, String)> {
    let chars: Vec<char> = text.trim().chars().collect();
    let open = chars.iter().position(|&c| c == '(')?;
    let name = chars[..open].iter().collect::<String>().trim_end().to_string();
    if !is_identifier(&name) {
        return None;
    }
    let close = matching_paren(&chars, open).ok()?;
    (close == chars.len() - 1).then(|| (name, chars[open + 1..close].iter().collect()))
}

impl<'q> Compilation<'q> {
    /// Rewrite one expression, consuming exactly `params.len()` placeholders.
    pub(crate) fn rewrite(
        &mut self,
        text: &str,
        params: &[Value],
        mode: ExprMode,
    ) -> CompileResult<Rewritten> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = Rewritten::default();
        let mut next_param = 0;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = literal_end(&chars, i)?;
                    out.sql.extend(&chars[i..end]);
                    i = end;
                }
                '?' => {
                    let value = params.get(next_param).ok_or_else(|| {
                        CompileError::malformed(format!(
                            "'{}' has more placeholders than bound parameters",
                            text
                        ))
                    })?;
                    out.params.push(value.clone());
                    out.sql.push('?');
                    next_param += 1;
                    i += 1;
                }
                ':' if chars.get(i + 1).is_some_and(|n| n.is_ascii_alphabetic()) => {
                    let end = (i + 1..chars.len())
                        .find(|&j| !is_word_char(chars[j]))
                        .unwrap_or(chars.len());
                    out.sql.extend(&chars[i..end]);
                    i = end;
                }
                '(' if opens_subquery(&chars, i) => {
                    let close = matching_paren(&chars, i)?;
                    let inner: String = chars[i + 1..close].iter().collect();
                    let count = count_placeholders(&inner)?;
                    let bound = params.get(next_param..next_param + count).ok_or_else(|| {
                        CompileError::malformed(format!(
                            "subquery '{}' has more placeholders than bound parameters",
                            inner.trim()
                        ))
                    })?;
                    next_param += count;

                    let fragment = self.compile_subquery(inner.trim(), bound)?;
                    out.sql.push('(');
                    out.sql.push_str(&fragment.sql);
                    out.sql.push(')');
                    out.params.extend(fragment.params);
                    i = close + 1;
                }
                c if c.is_ascii_digit() => {
                    let end = (i..chars.len())
                        .find(|&j| !(is_word_char(chars[j]) || chars[j] == '.'))
                        .unwrap_or(chars.len());
                    out.sql.extend(&chars[i..end]);
                    i = end;
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let end = path_end(&chars, i);
                    let path: String = chars[i..end].iter().collect();
                    let is_call = chars[end..]
                        .iter()
                        .find(|c| !c.is_whitespace())
                        .is_some_and(|&c| c == '(');
                    if is_call {
                        out.sql.push_str(&path);
                    } else {
                        self.rewrite_path(&path, mode, &mut out)?;
                    }
                    i = end;
                }
                _ => {
                    out.sql.push(c);
                    i += 1;
                }
            }
        }

        if next_param != params.len() {
            return Err(CompileError::malformed(format!(
                "{} parameter(s) bound to '{}' but {} placeholder(s) found",
                params.len(),
                text,
                next_param
            )));
        }

        Ok(out)
    }

    fn rewrite_path(&mut self, path: &str, mode: ExprMode, out: &mut Rewritten) -> CompileResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        match segments.as_slice() {
            [word] => {
                if mode.sees_select_aliases() {
                    if let Some(alias) = self.select_aliases.get(*word).cloned() {
                        if mode == ExprMode::OrderBy && self.projection == Projection::Full {
                            out.sql.push_str(&self.quoter.ident(&alias.sql_alias));
                        } else {
                            out.sql.push_str(&alias.expr.sql);
                            out.params.extend(alias.expr.params);
                        }
                        out.aliases.extend(alias.components);
                        if alias.keeps_all_joins {
                            self.registry.mark_all_needed();
                        }
                        return Ok(());
                    }
                }

                let bound = self
                    .registry
                    .lookup(word)
                    .map(|(component, _)| Arc::clone(&component.entity));
                if let Some(entity) = bound {
                    let ids = self.identifier_columns(&entity)?;
                    let [id] = ids.as_slice() else {
                        return Err(CompileError::unsupported(format!(
                            "alias '{}' has a composite identifier and cannot be compared directly",
                            word
                        )));
                    };
                    let column = self.resolve_column(word, &id.field)?;
                    out.sql.push_str(&column.sql);
                    out.aliases.push(word.to_string());
                    return Ok(());
                }

                out.sql.push_str(word);
                Ok(())
            }
            [alias, "*"] => Err(CompileError::malformed(format!(
                "'{}.*' is only allowed in SELECT",
                alias
            ))),
            [alias, field] => {
                let column = self.resolve_column(alias, field)?;
                out.sql.push_str(&column.sql);
                out.aliases.push(alias.to_string());
                Ok(())
            }
            _ => Err(CompileError::unsupported(format!(
                "implicit join through '{}'; join the relation explicitly",
                path
            ))),
        }
    }

    /// Mark every referenced alias as needed so its join survives pruning.
    pub(crate) fn mark_referenced(&mut self, aliases: &[String]) {
        for alias in aliases {
            self.registry.mark_needed(alias);
        }
    }

    fn rewrite_needed(
        &mut self,
        text: &str,
        params: &[Value],
        mode: ExprMode,
    ) -> CompileResult<Fragment> {
        let rewritten = self.rewrite(text, params, mode)?;
        self.mark_referenced(&rewritten.aliases);
        Ok(rewritten.into_fragment())
    }

    // =========================================================================
    // Clause parsers
    // =========================================================================

    pub(crate) fn parse_where(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        for fragment in fragments {
            let condition = self.rewrite_needed(&fragment.sql, &fragment.params, ExprMode::Condition)?;
            self.parts.where_parts.push(condition);
        }
        Ok(())
    }

    pub(crate) fn parse_having(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        for fragment in fragments {
            let condition = self.rewrite_needed(&fragment.sql, &fragment.params, ExprMode::Having)?;
            self.parts.having.push(condition);
        }
        Ok(())
    }

    pub(crate) fn parse_group_by(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        for fragment in fragments {
            let items = pair_params(split_top_level_commas(&fragment.sql)?, &fragment.params)?;
            for item in items {
                let expr = self.rewrite_needed(&item.sql, &item.params, ExprMode::GroupBy)?;
                self.parts.group_by.push(expr);
            }
        }
        Ok(())
    }

    pub(crate) fn parse_order_by(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        for fragment in fragments {
            let items = pair_params(split_top_level_commas(&fragment.sql)?, &fragment.params)?;
            for item in items {
                let mut words = split_words(&item.sql)?;
                let dir = match words.last() {
                    Some(w) if is_keyword(w, "ASC") => Some(SortDir::Asc),
                    Some(w) if is_keyword(w, "DESC") => Some(SortDir::Desc),
                    _ => None,
                };
                if dir.is_some() {
                    words.pop();
                }
                if words.is_empty() {
                    return Err(CompileError::malformed(format!(
                        "ORDER BY item '{}' has no expression",
                        item.sql
                    )));
                }

                let expr = self.rewrite_needed(&words.join(" "), &item.params, ExprMode::OrderBy)?;
                self.parts.order_by.push(OrderByExpr::new(expr, dir));
            }
        }
        Ok(())
    }

    /// `SET field = expr, ...` for UPDATE. Targets render as bare columns of
    /// the root table.
    pub(crate) fn parse_set(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        if fragments.is_empty() {
            return Ok(());
        }
        if self.parts.kind != StatementKind::Update {
            return Err(CompileError::malformed(format!(
                "{} is only valid in UPDATE statements",
                ClauseKind::Set
            )));
        }

        let root_alias = self.root_alias()?;
        let root = self.root_entity()?;

        for fragment in fragments {
            let items = pair_params(split_top_level_commas(&fragment.sql)?, &fragment.params)?;
            for item in items {
                let eq = find_top_level(&item.sql, '=')?.ok_or_else(|| {
                    CompileError::malformed(format!("SET item '{}' has no '='", item.sql))
                })?;
                let target = item.sql[..eq].trim();
                let value = item.sql[eq + 1..].trim();

                let field = match target.split_once('.') {
                    Some((alias, field)) if alias == root_alias => field,
                    Some((alias, _)) => return Err(CompileError::UnknownAlias(alias.to_string())),
                    None => target,
                };
                if !is_identifier(field) {
                    return Err(CompileError::malformed(format!(
                        "SET target '{}' is not a field",
                        target
                    )));
                }
                if value.is_empty() {
                    return Err(CompileError::malformed(format!(
                        "SET item '{}' has no value",
                        item.sql
                    )));
                }

                let (_, column) = self.find_column(&root, field)?;
                let value = self.rewrite_needed(value, &item.params, ExprMode::Condition)?;
                self.parts.set.push(Fragment::with_params(
                    format!("{} = {}", self.quoter.ident(column.column_name()), value.sql),
                    value.params,
                ));
            }
        }
        Ok(())
    }
}

/// End of an identifier path starting at `start`: words joined by dots,
/// optionally ending in `.*`.
fn path_end(chars: &[char], start: usize) -> usize {
    let mut i = start;
    loop {
        while i < chars.len() && is_word_char(chars[i]) {
            i += 1;
        }
        match (chars.get(i), chars.get(i + 1)) {
            (Some('.'), Some('*')) => return i + 2,
            (Some('.'), Some(&n)) if n.is_ascii_alphabetic() || n == '_' => i += 1,
            _ => return i,
        }
    }
}
