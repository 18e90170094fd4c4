//! FROM/JOIN parsing and the join graph builder.
//!
//! ```text
//! FROM User u                                 root component
//! FROM User.Phonenumbers p                    path: '.' LEFT JOIN, ':' INNER JOIN
//! LEFT JOIN u.Groups g WITH g.name = ?        explicit join plus extra condition
//! JOIN u.Phonenumbers p                       plain JOIN is INNER
//! ```
//!
//! Each relation step binds a component alias and emits one join (two for
//! many-to-many, through the association table), plus one join per ancestor
//! table for joined-inheritance subclasses.

use std::sync::Arc;

use tracing::trace;

use super::alias::Component;
use super::compiler::Compilation;
use super::expr::ExprMode;
use super::tokenizer::{count_placeholders, is_identifier, is_keyword, split_words};
use crate::error::{CompileError, CompileResult};
use crate::execution::Value;
use crate::metadata::{EntityMetadata, InheritanceKind, Relation, RelationKind};
use crate::sql::query::{Fragment, Join, JoinType, StatementKind, TableRef};

/// One `[LEFT|INNER] JOIN ...` item, split into words.
struct JoinItem {
    join_type: JoinType,
    words: Vec<String>,
}

/// Split FROM words into the root item and the join items.
fn split_joins(words: Vec<String>) -> CompileResult<(Vec<String>, Vec<JoinItem>)> {
    let mut root = Vec::new();
    let mut joins: Vec<JoinItem> = Vec::new();
    let mut i = 0;

    while i < words.len() {
        let word = &words[i];
        let join_type = if is_keyword(word, "JOIN") {
            Some((JoinType::Inner, 1))
        } else if is_keyword(word, "LEFT") || is_keyword(word, "INNER") {
            let join_type = if is_keyword(word, "LEFT") {
                JoinType::Left
            } else {
                JoinType::Inner
            };
            match words.get(i + 1) {
                Some(next) if is_keyword(next, "JOIN") => Some((join_type, 2)),
                Some(next)
                    if is_keyword(next, "OUTER")
                        && join_type == JoinType::Left
                        && words.get(i + 2).is_some_and(|w| is_keyword(w, "JOIN")) =>
                {
                    Some((join_type, 3))
                }
                _ => None,
            }
        } else {
            None
        };

        match join_type {
            Some((join_type, width)) => {
                joins.push(JoinItem {
                    join_type,
                    words: Vec::new(),
                });
                i += width;
            }
            None => {
                match joins.last_mut() {
                    Some(join) => join.words.push(word.clone()),
                    None => root.push(word.clone()),
                }
                i += 1;
            }
        }
    }

    Ok((root, joins))
}

/// Split `Path [AS] alias` into the path and the optional alias.
fn path_and_alias(words: &[String]) -> CompileResult<(&str, Option<&str>)> {
    match words {
        [path] => Ok((path, None)),
        [path, alias] => Ok((path, Some(alias))),
        [path, as_kw, alias] if is_keyword(as_kw, "AS") => Ok((path, Some(alias))),
        _ => Err(CompileError::malformed(format!(
            "cannot parse '{}' as 'Path [AS] alias'",
            words.join(" ")
        ))),
    }
    .and_then(|(path, alias)| match alias {
        Some(alias) if !is_identifier(alias) => Err(CompileError::malformed(format!(
            "'{}' is not a valid component alias",
            alias
        ))),
        _ => Ok((path.as_str(), alias.map(String::as_str))),
    })
}

/// Split a component path into its segments and the join type reaching each
/// segment after the first.
fn path_segments(path: &str) -> CompileResult<Vec<(&str, JoinType)>> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut join_type = JoinType::Inner;
    for (i, c) in path.char_indices() {
        let next = match c {
            '.' => JoinType::Left,
            ':' => JoinType::Inner,
            _ => continue,
        };
        segments.push((&path[start..i], join_type));
        join_type = next;
        start = i + 1;
    }
    segments.push((&path[start..], join_type));

    if let Some((bad, _)) = segments.iter().find(|(s, _)| !is_identifier(s)) {
        return Err(CompileError::malformed(format!(
            "invalid path segment '{}' in '{}'",
            bad, path
        )));
    }
    Ok(segments)
}

impl<'q> Compilation<'q> {
    /// Parse FROM (or the UPDATE/DELETE target) and build the join graph.
    pub(crate) fn parse_from(&mut self, fragments: &[Fragment]) -> CompileResult<()> {
        let mut text = String::new();
        let mut params: Vec<Value> = Vec::new();
        for fragment in fragments {
            if !text.is_empty() {
                let starts_join = split_words(&fragment.sql)?.first().is_some_and(|w| {
                    ["JOIN", "LEFT", "INNER"].iter().any(|k| is_keyword(w, k))
                });
                text.push_str(if starts_join { " " } else { ", " });
            }
            text.push_str(&fragment.sql);
            params.extend(fragment.params.iter().cloned());
        }

        let (root, joins) = split_joins(split_words(&text)?)?;
        if root.iter().any(|w| w.contains(',')) {
            return Err(CompileError::unsupported(
                "multiple root components in FROM",
            ));
        }
        if root.is_empty() {
            return Err(CompileError::IncompleteQuery("FROM part is empty".into()));
        }

        let (path, alias) = path_and_alias(&root)?;
        self.bind_root_path(path, alias)?;

        let mut offset = 0;
        for join in joins {
            let count = count_placeholders(&join.words.join(" "))?;
            let bound = params.get(offset..offset + count).ok_or_else(|| {
                CompileError::malformed("FROM has more placeholders than bound parameters")
            })?;
            offset += count;
            self.parse_join(join, bound)?;
        }
        if offset != params.len() {
            return Err(CompileError::malformed(format!(
                "FROM has {} placeholder(s) but {} parameter(s) were bound",
                offset,
                params.len()
            )));
        }
        Ok(())
    }

    fn bind_root_path(&mut self, path: &str, alias: Option<&str>) -> CompileResult<()> {
        let segments = path_segments(path)?;
        let (entity_name, _) = segments[0];

        let root_alias = match (segments.len(), alias) {
            (1, Some(alias)) => alias,
            _ => entity_name,
        };
        self.bind_root(entity_name, root_alias)?;

        let mut parent = root_alias.to_string();
        let mut derived = root_alias.to_string();
        for (n, &(relation, join_type)) in segments.iter().enumerate().skip(1) {
            derived = format!("{}.{}", derived, relation);
            let component = match alias {
                Some(alias) if n == segments.len() - 1 => alias.to_string(),
                _ => derived.clone(),
            };
            self.join_relation(&parent, relation, &component, join_type, None)?;
            parent = component;
        }
        Ok(())
    }

    fn bind_root(&mut self, entity_name: &str, alias: &str) -> CompileResult<()> {
        let entity = self.entity(entity_name)?;
        self.registry.bind(alias, Component::root(Arc::clone(&entity)))?;

        let short = self.registry.short_alias(alias, &entity.table)?;
        let table = TableRef::new(self.quoter.ident(&entity.table));
        self.parts.from = Some(match self.parts.kind {
            StatementKind::Select => table.with_alias(self.quoter.ident(&short)),
            StatementKind::Update | StatementKind::Delete => table,
        });

        self.join_ancestors(alias, &entity, JoinType::Inner)
    }

    fn parse_join(&mut self, join: JoinItem, params: &[Value]) -> CompileResult<()> {
        let split = join
            .words
            .iter()
            .position(|w| is_keyword(w, "ON") || is_keyword(w, "WITH"));
        let (head, condition) = match split {
            Some(at) => {
                let condition = join.words[at + 1..].join(" ");
                if condition.is_empty() {
                    return Err(CompileError::malformed("join condition is empty"));
                }
                (&join.words[..at], Some((condition, params.to_vec())))
            }
            None => (&join.words[..], None),
        };

        let (path, alias) = path_and_alias(head)?;
        let alias = alias.ok_or_else(|| {
            CompileError::malformed(format!("join '{}' needs an alias", path))
        })?;

        let segments = path_segments(path)?;
        let (start, _) = segments[0];
        if !self.registry.contains(start) {
            return Err(CompileError::UnknownAlias(start.to_string()));
        }
        if segments.len() < 2 {
            return Err(CompileError::malformed(format!(
                "join '{}' must follow a relation, as in 'alias.relation'",
                path
            )));
        }

        let mut parent = start.to_string();
        let mut derived = start.to_string();
        let last = segments.len() - 1;
        for (n, &(relation, _)) in segments.iter().enumerate().skip(1) {
            derived = format!("{}.{}", derived, relation);
            let (component, condition) = if n == last {
                (alias.to_string(), condition.clone())
            } else {
                (derived.clone(), None)
            };
            self.join_relation(&parent, relation, &component, join.join_type, condition)?;
            parent = component;
        }
        Ok(())
    }

    /// Find a relation on the entity or one of its supertypes.
    fn find_relation(
        &self,
        entity: &Arc<EntityMetadata>,
        name: &str,
    ) -> CompileResult<(Arc<EntityMetadata>, Relation)> {
        for owner in self.entity_chain(entity)? {
            if let Some(relation) = owner.find_relation(name) {
                let relation = relation.clone();
                return Ok((owner, relation));
            }
        }
        Err(CompileError::UnknownRelation {
            entity: entity.name.clone(),
            relation: name.to_string(),
        })
    }

    /// Single-column identifier of an entity, for many-to-many joins.
    fn single_identifier(&self, entity: &Arc<EntityMetadata>) -> CompileResult<String> {
        let ids = self.identifier_columns(entity)?;
        match ids.as_slice() {
            [id] => Ok(id.column_name().to_string()),
            _ => Err(CompileError::unsupported(format!(
                "many-to-many join on '{}' requires a single-column identifier",
                entity.name
            ))),
        }
    }

    fn table_ref(&self, table: &str, short: &str) -> TableRef {
        TableRef::new(self.quoter.ident(table)).with_alias(self.quoter.ident(short))
    }

    /// Join `parent.relation` as component `alias`.
    fn join_relation(
        &mut self,
        parent: &str,
        relation_name: &str,
        alias: &str,
        join_type: JoinType,
        condition: Option<(String, Vec<Value>)>,
    ) -> CompileResult<()> {
        let parent_entity = Arc::clone(&self.registry.component(parent)?.entity);
        // Resolve everything before binding so a failed join leaves no trace
        let (owner, relation) = self.find_relation(&parent_entity, relation_name)?;
        let target = self.entity(&relation.target)?;

        self.registry.bind(
            alias,
            Component::joined(Arc::clone(&target), parent, relation_name, join_type),
        )?;
        let to_many = relation.kind.is_to_many();

        let main = match (&relation.kind, &relation.join_table) {
            (RelationKind::ManyToMany, Some(join_table)) => {
                let parent_id = self.single_identifier(&parent_entity)?;
                let target_id = self.single_identifier(&target)?;
                let parent_short = self.registry.short_alias(parent, &parent_entity.table)?;
                let assoc_short = self.registry.short_alias(alias, &join_table.name)?;
                let target_short = self.registry.short_alias(alias, &target.table)?;

                let q = self.quoter;
                let parent_key = q.qualified(&parent_short, &parent_id);
                let target_key = q.qualified(&target_short, &target_id);
                let local = q.qualified(&assoc_short, &join_table.local);
                let foreign = q.qualified(&assoc_short, &join_table.foreign);

                let (assoc_on, target_on) = if relation.equal {
                    (
                        vec![Fragment::new(format!(
                            "({} = {} OR {} = {})",
                            parent_key, local, parent_key, foreign
                        ))],
                        vec![
                            Fragment::new(format!(
                                "({} = {} OR {} = {})",
                                target_key, foreign, target_key, local
                            )),
                            Fragment::new(format!("{} <> {}", target_key, parent_key)),
                        ],
                    )
                } else {
                    (
                        vec![Fragment::new(format!("{} = {}", parent_key, local))],
                        vec![Fragment::new(format!("{} = {}", target_key, foreign))],
                    )
                };

                self.push_join(Join {
                    join_type,
                    table: self.table_ref(&join_table.name, &assoc_short),
                    on: assoc_on,
                    component: alias.to_string(),
                    parent: parent.to_string(),
                    to_many: true,
                });
                self.push_join(Join {
                    join_type,
                    table: self.table_ref(&target.table, &target_short),
                    on: target_on,
                    component: alias.to_string(),
                    parent: alias.to_string(),
                    to_many: true,
                })
            }
            (RelationKind::ManyToMany, None) => {
                return Err(CompileError::unsupported(format!(
                    "many-to-many relation '{}' has no join table",
                    relation.name
                )))
            }
            _ => {
                let local_table = match self.find_column(&parent_entity, &relation.local) {
                    Ok((table, _)) => table,
                    Err(_) => owner.table.clone(),
                };
                let parent_short = self.registry.short_alias(parent, &local_table)?;
                let target_short = self.registry.short_alias(alias, &target.table)?;
                let on = format!(
                    "{} = {}",
                    self.quoter.qualified(&parent_short, &relation.local),
                    self.quoter.qualified(&target_short, &relation.foreign)
                );

                self.push_join(Join {
                    join_type,
                    table: self.table_ref(&target.table, &target_short),
                    on: vec![Fragment::new(on)],
                    component: alias.to_string(),
                    parent: parent.to_string(),
                    to_many,
                })
            }
        };

        self.join_ancestors(alias, &target, join_type)?;

        if let Some((text, params)) = condition {
            let rewritten = self.rewrite(&text, &params, ExprMode::Condition)?;
            let others: Vec<String> = rewritten
                .aliases
                .iter()
                .filter(|a| a.as_str() != alias && a.as_str() != parent)
                .cloned()
                .collect();
            self.mark_referenced(&others);
            self.parts.joins[main].on.push(rewritten.into_fragment());
        }

        Ok(())
    }

    fn push_join(&mut self, join: Join) -> usize {
        trace!(
            component = %join.component,
            table = %join.table.table,
            join_type = ?join.join_type,
            to_many = join.to_many,
            "join"
        );
        self.parts.joins.push(join);
        self.parts.joins.len() - 1
    }

    /// Join every ancestor table of a joined-inheritance subclass on the
    /// identifier columns.
    fn join_ancestors(
        &mut self,
        alias: &str,
        entity: &Arc<EntityMetadata>,
        join_type: JoinType,
    ) -> CompileResult<()> {
        let joined = super::inheritance::hierarchy(self.provider, entity)?
            .is_some_and(|(_, h)| h.kind == InheritanceKind::Joined);
        if !joined {
            return Ok(());
        }

        let ids = self.identifier_columns(entity)?;
        let own_short = self.registry.short_alias(alias, &entity.table)?;
        let mut seen = vec![entity.table.clone()];

        for ancestor in super::inheritance::ancestors(self.provider, entity)? {
            if seen.contains(&ancestor.table) {
                continue;
            }
            seen.push(ancestor.table.clone());

            let short = self.registry.short_alias(alias, &ancestor.table)?;
            let on: Vec<Fragment> = ids
                .iter()
                .map(|id| {
                    Fragment::new(format!(
                        "{} = {}",
                        self.quoter.qualified(&own_short, id.column_name()),
                        self.quoter.qualified(&short, id.column_name())
                    ))
                })
                .collect();

            self.push_join(Join {
                join_type,
                table: self.table_ref(&ancestor.table, &short),
                on,
                component: alias.to_string(),
                parent: alias.to_string(),
                to_many: false,
            });
        }
        Ok(())
    }
}
