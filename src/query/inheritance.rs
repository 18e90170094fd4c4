//! Inheritance hierarchies and discriminator filters.
//!
//! Hierarchies are declared on their root entity: the discriminator column
//! and the map from discriminator value to concrete entity. Querying an
//! entity restricts rows to the values of that entity and its descendants:
//!
//! ```text
//! Person (root, map: per -> Person, emp -> Employee, mgr -> Manager)
//!   └─ Employee
//!        └─ Manager
//!
//! FROM Person p    -> p.type IN ('emp', 'mgr', 'per')
//! FROM Employee e  -> e.type IN ('emp', 'mgr')
//! FROM Manager m   -> m.type IN ('mgr')
//! ```
//!
//! Filters are computed from the bound components and applied to a copy of
//! the query parts, so rendering the same query again never stacks them.

use std::collections::HashSet;
use std::sync::Arc;

use super::alias::AliasRegistry;
use crate::error::{CompileError, CompileResult};
use crate::metadata::{EntityMetadata, Inheritance, InheritanceKind, MetadataProvider};
use crate::sql::dialect::{Dialect, IdentQuoter, SqlDialect};
use crate::sql::query::{Fragment, SqlParts};

fn load(provider: &dyn MetadataProvider, name: &str) -> CompileResult<Arc<EntityMetadata>> {
    provider
        .entity(name)
        .ok_or_else(|| CompileError::UnknownEntity(name.to_string()))
}

/// Supertypes of `entity`, nearest first.
pub fn ancestors(
    provider: &dyn MetadataProvider,
    entity: &EntityMetadata,
) -> CompileResult<Vec<Arc<EntityMetadata>>> {
    let mut chain: Vec<Arc<EntityMetadata>> = Vec::new();
    let mut seen = HashSet::from([entity.name.clone()]);
    let mut next = entity.parent.clone();

    while let Some(name) = next {
        if !seen.insert(name.clone()) {
            return Err(CompileError::unsupported(format!(
                "inheritance cycle through '{}'",
                name
            )));
        }
        let parent = load(provider, &name)?;
        next = parent.parent.clone();
        chain.push(parent);
    }

    Ok(chain)
}

/// Topmost supertype of `entity`, or the entity itself.
pub fn hierarchy_root(
    provider: &dyn MetadataProvider,
    entity: &Arc<EntityMetadata>,
) -> CompileResult<Arc<EntityMetadata>> {
    Ok(ancestors(provider, entity)?
        .pop()
        .unwrap_or_else(|| Arc::clone(entity)))
}

/// Inheritance definition of the hierarchy `entity` belongs to.
pub fn hierarchy(
    provider: &dyn MetadataProvider,
    entity: &Arc<EntityMetadata>,
) -> CompileResult<Option<(Arc<EntityMetadata>, Inheritance)>> {
    let root = hierarchy_root(provider, entity)?;
    Ok(root.inheritance.clone().map(|inheritance| (root, inheritance)))
}

fn is_same_or_subtype(
    provider: &dyn MetadataProvider,
    candidate: &EntityMetadata,
    ancestor: &str,
) -> CompileResult<bool> {
    if candidate.name == ancestor {
        return Ok(true);
    }
    Ok(ancestors(provider, candidate)?
        .iter()
        .any(|a| a.name == ancestor))
}

/// Mapped subtypes of `entity`, in discriminator-value order.
pub fn descendants(
    provider: &dyn MetadataProvider,
    entity: &Arc<EntityMetadata>,
) -> CompileResult<Vec<Arc<EntityMetadata>>> {
    let Some((_, inheritance)) = hierarchy(provider, entity)? else {
        return Ok(Vec::new());
    };

    let mut found: Vec<Arc<EntityMetadata>> = Vec::new();
    for name in inheritance.map.values() {
        if name == &entity.name || found.iter().any(|e| &e.name == name) {
            continue;
        }
        let candidate = load(provider, name)?;
        if is_same_or_subtype(provider, &candidate, &entity.name)? {
            found.push(candidate);
        }
    }
    Ok(found)
}

/// Discriminator values selecting `entity` and every mapped subtype.
pub fn discriminator_values(
    provider: &dyn MetadataProvider,
    entity: &Arc<EntityMetadata>,
) -> CompileResult<Vec<String>> {
    let Some((_, inheritance)) = hierarchy(provider, entity)? else {
        return Ok(Vec::new());
    };

    let mut values = Vec::new();
    for (value, name) in &inheritance.map {
        let mapped = if name == &entity.name {
            true
        } else {
            is_same_or_subtype(provider, load(provider, name)?.as_ref(), &entity.name)?
        };
        if mapped {
            values.push(value.clone());
        }
    }
    Ok(values)
}

/// Where a discriminator predicate goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Root component: WHERE.
    Where,
    /// Joined component: ON of its last join.
    Join,
}

/// A discriminator predicate for one component.
#[derive(Debug, Clone, PartialEq)]
pub struct InheritanceFilter {
    pub alias: String,
    pub placement: Placement,
    pub predicate: Fragment,
}

/// Discriminator predicates for every bound component in a hierarchy.
pub fn inheritance_filters(
    provider: &dyn MetadataProvider,
    registry: &AliasRegistry,
    quoter: IdentQuoter,
    dialect: Dialect,
) -> CompileResult<Vec<InheritanceFilter>> {
    let mut filters = Vec::new();

    for (alias, component) in registry.components() {
        let Some((root, inheritance)) = hierarchy(provider, &component.entity)? else {
            continue;
        };
        let values = discriminator_values(provider, &component.entity)?;
        if values.is_empty() {
            continue;
        }

        // Joined hierarchies keep the discriminator on the root table
        let table = match inheritance.kind {
            InheritanceKind::SingleTable => &component.entity.table,
            InheritanceKind::Joined => &root.table,
        };
        let short = registry.get_short_alias(alias, table).ok_or_else(|| {
            CompileError::unsupported(format!(
                "table '{}' of component '{}' is not joined",
                table, alias
            ))
        })?;

        let literals: Vec<String> = values.iter().map(|v| dialect.quote_string(v)).collect();
        let predicate = format!(
            "{} IN ({})",
            quoter.qualified(short, &inheritance.discriminator),
            literals.join(", ")
        );

        filters.push(InheritanceFilter {
            alias: alias.to_string(),
            placement: if component.is_root() {
                Placement::Where
            } else {
                Placement::Join
            },
            predicate: Fragment::new(predicate),
        });
    }

    Ok(filters)
}

/// Return `parts` with the filters applied.
pub fn apply_filters(mut parts: SqlParts, filters: Vec<InheritanceFilter>) -> SqlParts {
    for filter in filters {
        match filter.placement {
            Placement::Where => parts.where_parts.push(filter.predicate),
            Placement::Join => {
                if let Some(join) = parts
                    .joins
                    .iter_mut()
                    .rev()
                    .find(|j| j.component == filter.alias)
                {
                    join.on.push(filter.predicate);
                }
            }
        }
    }
    parts
}
