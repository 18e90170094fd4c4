//! SELECT parsing and deferred select-list resolution.
//!
//! A select item may reference a component alias bound later in FROM, so
//! parsing only records work items. Resolution runs once the join graph is
//! complete, in a fixed order: fields grouped by component, then aggregates,
//! then SELECT-part subqueries.

use std::collections::HashSet;
use std::sync::Arc;

use super::compiler::{Compilation, Projection, SelectAlias};
use super::expr::{function_call, subquery_body, ExprMode};
use super::tokenizer::{is_identifier, is_keyword, pair_params, split_top_level_commas, split_words};
use super::ResultColumn;
use crate::error::{CompileError, CompileResult};
use crate::execution::Value;
use crate::metadata::{ColumnDef, EntityMetadata};
use crate::sql::query::Fragment;

/// Which fields of a component a select item asks for.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FieldRef {
    All,
    Named(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingField {
    pub alias: String,
    pub field: FieldRef,
    pub user_alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingAggregate {
    pub function: String,
    pub distinct: bool,
    pub args: String,
    pub params: Vec<Value>,
    pub user_alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingSubquery {
    pub text: String,
    pub params: Vec<Value>,
    pub user_alias: Option<String>,
}

/// Select items waiting for the FROM graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PendingSelect {
    pub distinct: bool,
    pub fields: Vec<PendingField>,
    pub aggregates: Vec<PendingAggregate>,
    pub subqueries: Vec<PendingSubquery>,
}

/// Split a trailing `[AS] name` off a select item.
fn split_user_alias(text: &str) -> CompileResult<(String, Option<String>)> {
    let mut words = split_words(text)?;
    let alias = match words.len() {
        0 => return Err(CompileError::malformed("empty select item")),
        1 => None,
        n if n >= 3 && is_keyword(&words[n - 2], "AS") => {
            let alias = words.pop();
            words.pop();
            alias
        }
        2 => words.pop(),
        _ => {
            return Err(CompileError::unsupported(format!(
                "select expression '{}'",
                text
            )))
        }
    };

    if let Some(alias) = &alias {
        if !is_identifier(alias) {
            return Err(CompileError::malformed(format!(
                "'{}' is not a valid result alias",
                alias
            )));
        }
    }
    Ok((words.join(" "), alias))
}

impl<'q> Compilation<'q> {
    pub(crate) fn parse_select(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        for fragment in fragments {
            let mut text = fragment.sql.trim();
            if let Some((first, rest)) = text.split_once(char::is_whitespace) {
                if is_keyword(first, "DISTINCT") {
                    self.pending.distinct = true;
                    text = rest.trim_start();
                }
            }

            for item in pair_params(split_top_level_commas(text)?, &fragment.params)? {
                self.parse_select_item(item)?;
            }
        }
        Ok(())
    }

    fn parse_select_item(&mut self, item: Fragment) -> CompileResult<()> {
        let (expr, user_alias) = split_user_alias(&item.sql)?;

        if let Some(text) = subquery_body(&expr) {
            self.pending.subqueries.push(PendingSubquery {
                text,
                params: item.params,
                user_alias,
            });
            return Ok(());
        }

        if let Some((function, args)) = function_call(&expr) {
            let args = args.trim();
            let (distinct, args) = match args.split_once(char::is_whitespace) {
                Some((first, rest)) if is_keyword(first, "DISTINCT") => (true, rest.trim()),
                _ => (false, args),
            };
            self.pending.aggregates.push(PendingAggregate {
                function: function.to_ascii_uppercase(),
                distinct,
                args: args.to_string(),
                params: item.params,
                user_alias,
            });
            return Ok(());
        }

        let field = match expr.split_once('.') {
            Some((alias, "*")) if is_identifier(alias) => (alias, FieldRef::All),
            Some((alias, field)) if is_identifier(alias) && is_identifier(field) => {
                (alias, FieldRef::Named(field.to_string()))
            }
            None if is_identifier(&expr) => (expr.as_str(), FieldRef::All),
            _ => {
                return Err(CompileError::unsupported(format!(
                    "select expression '{}'",
                    expr
                )))
            }
        };

        if field.1 == FieldRef::All && user_alias.is_some() {
            return Err(CompileError::malformed(format!(
                "'{}' selects a whole component and cannot be aliased",
                expr
            )));
        }

        self.pending.fields.push(PendingField {
            alias: field.0.to_string(),
            field: field.1,
            user_alias,
        });
        Ok(())
    }

    /// Columns a wildcard expands to: the hierarchy root's columns first,
    /// then each subtype's down to `entity`, then single-table descendants.
    fn wildcard_columns(&self, entity: &Arc<EntityMetadata>) -> CompileResult<Vec<ColumnDef>> {
        let mut owners = self.entity_chain(entity)?;
        owners.reverse();
        if self.is_single_table(entity)? {
            owners.extend(super::inheritance::descendants(self.provider, entity)?);
        }

        let mut seen = HashSet::new();
        Ok(owners
            .iter()
            .flat_map(|owner| owner.columns.iter())
            .filter(|column| seen.insert(column.field.clone()))
            .cloned()
            .collect())
    }

    fn selected_columns(
        &self,
        entity: &Arc<EntityMetadata>,
        fields: &[&PendingField],
    ) -> CompileResult<Vec<ColumnDef>> {
        if fields.iter().any(|f| f.field == FieldRef::All) {
            return self.wildcard_columns(entity);
        }

        // Subqueries select exactly what they name
        let mut columns = match self.projection {
            Projection::Full => self.identifier_columns(entity)?,
            Projection::Nested | Projection::IdsOnly => Vec::new(),
        };
        for pending in fields {
            if let FieldRef::Named(name) = &pending.field {
                let (_, column) = self.find_column(entity, name)?;
                if !columns.iter().any(|c| c.field == column.field) {
                    columns.push(column);
                }
            }
        }
        Ok(columns)
    }

    fn push_select(&mut self, expr: &Fragment, sql_alias: &str) {
        let sql = match self.projection {
            Projection::Full => format!("{} AS {}", expr.sql, self.quoter.ident(sql_alias)),
            Projection::Nested | Projection::IdsOnly => expr.sql.clone(),
        };
        self.parts.select.push(Fragment::with_params(sql, expr.params.clone()));
    }

    /// Resolve pending fields, grouped by component in first-mention order.
    pub(crate) fn resolve_fields(&mut self) -> CompileResult<()> {
        let pending = std::mem::take(&mut self.pending.fields);
        if self.projection == Projection::IdsOnly {
            return self.register_field_aliases(&pending);
        }
        self.parts.distinct = self.pending.distinct;

        let mut aliases: Vec<&str> = Vec::new();
        for field in &pending {
            if !aliases.contains(&field.alias.as_str()) {
                aliases.push(&field.alias);
            }
        }

        for alias in aliases {
            let entity = Arc::clone(&self.registry.component(alias)?.entity);
            self.registry.mark_needed(alias);

            let fields: Vec<&PendingField> = pending.iter().filter(|f| f.alias == alias).collect();
            for column in self.selected_columns(&entity, &fields)? {
                let resolved = self.resolve_column(alias, &column.field)?;
                let sql_alias = format!("{}__{}", resolved.table_alias, column.column_name());
                self.push_select(&Fragment::new(resolved.sql.clone()), &sql_alias);

                for user_alias in fields.iter().filter_map(|f| match (&f.field, &f.user_alias) {
                    (FieldRef::Named(name), Some(user_alias))
                        if name == &column.field || name == column.column_name() =>
                    {
                        Some(user_alias)
                    }
                    _ => None,
                }) {
                    self.select_aliases.insert(
                        user_alias.clone(),
                        SelectAlias {
                            sql_alias: sql_alias.clone(),
                            expr: Fragment::new(resolved.sql.clone()),
                            components: vec![alias.to_string()],
                            keeps_all_joins: false,
                        },
                    );
                }

                self.columns.push(ResultColumn {
                    sql_alias,
                    component: alias.to_string(),
                    field: column.field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Register user-aliased fields without selecting them, so GROUP BY,
    /// HAVING and ORDER BY of an identifier query can name them. Joins are
    /// kept only once an alias is referenced.
    fn register_field_aliases(&mut self, pending: &[PendingField]) -> CompileResult<()> {
        for field in pending {
            let (FieldRef::Named(name), Some(user_alias)) = (&field.field, &field.user_alias) else {
                continue;
            };
            let resolved = self.resolve_column(&field.alias, name)?;
            self.select_aliases.insert(
                user_alias.clone(),
                SelectAlias {
                    sql_alias: format!("{}__{}", resolved.table_alias, resolved.column.column_name()),
                    expr: Fragment::new(resolved.sql),
                    components: vec![field.alias.clone()],
                    keeps_all_joins: false,
                },
            );
        }
        Ok(())
    }

    /// Resolve pending aggregates into `FUNC(args) AS shortAlias__n`.
    pub(crate) fn resolve_aggregates(&mut self) -> CompileResult<()> {
        let pending = std::mem::take(&mut self.pending.aggregates);
        self.aggregated = !pending.is_empty();

        for aggregate in pending {
            let args = self.rewrite(&aggregate.args, &aggregate.params, ExprMode::Select)?;
            let components: Vec<String> = args
                .aliases
                .iter()
                .filter(|a| self.registry.contains(a))
                .cloned()
                .collect();
            // Identifier queries keep the joins only if the aggregate is referenced
            if self.projection != Projection::IdsOnly {
                self.mark_referenced(&args.aliases);
                if components.is_empty() {
                    self.registry.mark_all_needed();
                }
            }

            let owner = match components.first() {
                Some(alias) => alias.clone(),
                None => self.root_alias()?,
            };
            let table = self.registry.component(&owner)?.entity.table.clone();
            let short = self.registry.short_alias(&owner, &table)?;

            let expr = Fragment::with_params(
                format!(
                    "{}({}{})",
                    aggregate.function,
                    if aggregate.distinct { "DISTINCT " } else { "" },
                    args.sql
                ),
                args.params,
            );
            let sql_alias = format!("{}__{}", short, self.select_index);
            self.select_index += 1;

            if self.projection != Projection::IdsOnly {
                self.push_select(&expr, &sql_alias);
                self.columns.push(ResultColumn {
                    sql_alias: sql_alias.clone(),
                    component: owner,
                    field: aggregate
                        .user_alias
                        .clone()
                        .unwrap_or_else(|| sql_alias.clone()),
                });
            }
            if let Some(user_alias) = aggregate.user_alias {
                self.select_aliases.insert(
                    user_alias,
                    SelectAlias {
                        sql_alias,
                        expr,
                        keeps_all_joins: components.is_empty(),
                        components,
                    },
                );
            }
        }
        Ok(())
    }

    /// Compile SELECT-part subqueries into `(sql) AS rootShortAlias__n`.
    pub(crate) fn resolve_subqueries(&mut self) -> CompileResult<()> {
        let mut pending = std::mem::take(&mut self.pending.subqueries);
        if self.projection == Projection::IdsOnly {
            // Only the aliased ones can be referenced
            pending.retain(|s| s.user_alias.is_some());
        }
        if pending.is_empty() {
            return Ok(());
        }

        let root_alias = self.root_alias()?;
        let root_table = self.root_entity()?.table.clone();
        let short = self.registry.short_alias(&root_alias, &root_table)?;

        for subquery in pending {
            let compiled = self.compile_subquery(&subquery.text, &subquery.params)?;
            let expr = Fragment::with_params(format!("({})", compiled.sql), compiled.params);
            let sql_alias = format!("{}__{}", short, self.select_index);
            self.select_index += 1;

            if self.projection != Projection::IdsOnly {
                self.push_select(&expr, &sql_alias);
                self.columns.push(ResultColumn {
                    sql_alias: sql_alias.clone(),
                    component: root_alias.clone(),
                    field: subquery
                        .user_alias
                        .clone()
                        .unwrap_or_else(|| sql_alias.clone()),
                });
            }
            if let Some(user_alias) = subquery.user_alias {
                self.select_aliases.insert(
                    user_alias,
                    SelectAlias {
                        sql_alias,
                        expr,
                        components: Vec::new(),
                        keeps_all_joins: false,
                    },
                );
            }
        }
        Ok(())
    }
}
