//! Component aliases and the short SQL aliases generated for them.
//!
//! A query names entity occurrences with component aliases (`u`, `p`, or
//! path-derived ones like `User.Phonenumbers`). Every table that backs a
//! component gets a short SQL alias, keyed by the (component alias, table)
//! pair, so a joined-inheritance component owns one alias per table:
//!
//! ```text
//! component   table          short alias
//! ---------   -----          -----------
//! u           users          u
//! p           phonenumbers   p
//! g           groupuser      g
//! g           user_group     u2
//! ```
//!
//! Aliases are the first alphanumeric character of the table, followed by a
//! counter on collision. Generation is deterministic within one registry.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use crate::error::{CompileError, CompileResult};
use crate::metadata::EntityMetadata;
use crate::sql::query::JoinType;

/// A bound entity occurrence.
#[derive(Debug, Clone)]
pub struct Component {
    pub entity: Arc<EntityMetadata>,
    /// Component this one was joined from; `None` for the root.
    pub parent: Option<String>,
    /// Relation followed from the parent.
    pub relation: Option<String>,
    pub join_type: Option<JoinType>,
}

impl Component {
    pub fn root(entity: Arc<EntityMetadata>) -> Self {
        Self {
            entity,
            parent: None,
            relation: None,
            join_type: None,
        }
    }

    pub fn joined(
        entity: Arc<EntityMetadata>,
        parent: impl Into<String>,
        relation: impl Into<String>,
        join_type: JoinType,
    ) -> Self {
        Self {
            entity,
            parent: Some(parent.into()),
            relation: Some(relation.into()),
            join_type: Some(join_type),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Component alias map and short alias table of one (sub)query.
#[derive(Debug, Clone, Default)]
pub struct AliasRegistry {
    components: Vec<(String, Component)>,
    short_aliases: HashMap<(String, String), String>,
    /// Short aliases in use here or in any enclosing query.
    taken: HashSet<String>,
    needed: BTreeSet<String>,
    /// Enclosing-query aliases referenced from this namespace.
    outer_refs: BTreeSet<String>,
    outer: Option<Box<AliasRegistry>>,
    max_length: Option<usize>,
    table_names: bool,
}

impl AliasRegistry {
    pub fn new(max_length: Option<usize>) -> Self {
        Self {
            max_length,
            ..Default::default()
        }
    }

    /// Use each table's own name as its alias, for UPDATE and DELETE.
    pub fn with_table_names(mut self) -> Self {
        self.table_names = true;
        self
    }

    /// Bind a component alias. Binding an alias twice is ambiguous.
    pub fn bind(&mut self, alias: &str, component: Component) -> CompileResult<()> {
        if self.contains(alias) {
            return Err(CompileError::AmbiguousAlias(alias.to_string()));
        }
        self.components.push((alias.to_string(), component));
        Ok(())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.components.iter().any(|(a, _)| a == alias)
    }

    /// A component bound in this namespace.
    pub fn component(&self, alias: &str) -> CompileResult<&Component> {
        self.components
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, c)| c)
            .ok_or_else(|| CompileError::UnknownAlias(alias.to_string()))
    }

    /// Resolve an alias here or in an enclosing query, returning the
    /// component and the registry that owns it.
    pub fn lookup(&self, alias: &str) -> Option<(&Component, &AliasRegistry)> {
        match self.components.iter().find(|(a, _)| a == alias) {
            Some((_, component)) => Some((component, self)),
            None => self.outer.as_deref()?.lookup(alias),
        }
    }

    /// Alias of the first bound component.
    pub fn root_alias(&self) -> Option<&str> {
        self.components.first().map(|(a, _)| a.as_str())
    }

    /// Bound components in binding order.
    pub fn components(&self) -> impl Iterator<Item = (&str, &Component)> {
        self.components.iter().map(|(a, c)| (a.as_str(), c))
    }

    /// Short SQL alias for a component's table, generating one on first use.
    pub fn short_alias(&mut self, alias: &str, table: &str) -> CompileResult<String> {
        let key = (alias.to_string(), table.to_string());
        if let Some(existing) = self.short_aliases.get(&key) {
            return Ok(existing.clone());
        }

        let generated = if self.table_names {
            table.to_string()
        } else {
            self.generate(table)?
        };

        self.taken.insert(generated.clone());
        self.short_aliases.insert(key, generated.clone());
        Ok(generated)
    }

    /// Short alias already assigned to the pair, without generating.
    pub fn get_short_alias(&self, alias: &str, table: &str) -> Option<&str> {
        self.short_aliases
            .get(&(alias.to_string(), table.to_string()))
            .map(String::as_str)
    }

    fn generate(&self, table: &str) -> CompileResult<String> {
        let base = table
            .chars()
            .find(char::is_ascii_alphanumeric)
            .filter(char::is_ascii_alphabetic)
            .map(|c| c.to_ascii_lowercase())
            .unwrap_or('t');

        let mut candidate = base.to_string();
        let mut counter = 1;
        while self.taken.contains(&candidate) {
            counter += 1;
            candidate = format!("{}{}", base, counter);
        }

        if let Some(max) = self.max_length {
            if candidate.len() > max {
                return Err(CompileError::unsupported(format!(
                    "generated alias '{}' exceeds the {}-character identifier limit",
                    candidate, max
                )));
            }
        }

        Ok(candidate)
    }

    /// Fresh namespace for a nested query.
    ///
    /// The child starts with no components but can resolve this registry's
    /// aliases for correlation, and never generates a short alias already
    /// taken here.
    pub fn regenerate_for_subquery(&self) -> AliasRegistry {
        AliasRegistry {
            taken: self.taken.clone(),
            outer: Some(Box::new(self.clone())),
            max_length: self.max_length,
            ..Default::default()
        }
    }

    /// Reserve short aliases generated by a nested query so siblings differ.
    pub fn reserve(&mut self, aliases: impl IntoIterator<Item = String>) {
        self.taken.extend(aliases);
    }

    pub fn taken(&self) -> &HashSet<String> {
        &self.taken
    }

    /// Record that the component is referenced by the statement.
    pub fn mark_needed(&mut self, alias: &str) {
        if self.contains(alias) {
            self.needed.insert(alias.to_string());
        } else if self
            .outer
            .as_deref()
            .is_some_and(|outer| outer.lookup(alias).is_some())
        {
            self.outer_refs.insert(alias.to_string());
        }
    }

    /// Disable join pruning: every bound component is kept.
    pub fn mark_all_needed(&mut self) {
        let aliases: Vec<String> = self.components.iter().map(|(a, _)| a.clone()).collect();
        self.needed.extend(aliases);
    }

    pub fn needed(&self) -> &BTreeSet<String> {
        &self.needed
    }

    pub fn outer_refs(&self) -> &BTreeSet<String> {
        &self.outer_refs
    }
}
