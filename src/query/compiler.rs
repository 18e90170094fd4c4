//! The compilation pipeline.
//!
//! A [`Compilation`] turns the clause fragments of one query into rendered
//! [`SqlParts`]. It runs once per render, walking forward through fixed
//! phases:
//!
//! ```text
//! Parsing ──► FieldsPending ──► JoinsResolved ──► FieldsResolved
//!   (SELECT parsed    (FROM/JOIN      (fields and
//!    into pending      graph built)    aggregates
//!    work items)                       resolved)
//!                                          │
//!  Rendered ◄── InheritanceApplied ◄── SubqueriesResolved
//!  (pruning,     (discriminator         (SELECT subqueries,
//!   limit         filters)               WHERE/GROUP BY/HAVING/
//!   rewrite)                             ORDER BY/SET rewritten)
//! ```
//!
//! Nested queries (SELECT subqueries, WHERE subqueries, the identifier
//! subquery of the limit rewrite) run their own `Compilation` over a child
//! alias namespace.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::alias::AliasRegistry;
use super::clause::{ClauseKind, ClauseSet};
use super::inheritance;
use super::limit::{self, IdSubquery, LimitContext};
use super::select::PendingSelect;
use super::{CompiledQuery, QueryState, ResultColumn};
use crate::config::CompilerOptions;
use crate::error::{CompileError, CompileResult};
use crate::execution::{Executor, Value};
use crate::metadata::{ColumnDef, EntityMetadata, InheritanceKind, MetadataProvider};
use crate::sql::dialect::{IdentQuoter, SqlDialect};
use crate::sql::query::{
    retain_needed_joins, Fragment, LimitOffset, SortDir, SqlParts, StatementKind, TableRef,
};

/// Output alias of the count column.
const COUNT_COLUMN: &str = "num_results";
/// Table alias of the derived table wrapped by grouped counts.
const COUNT_SUBQUERY_ALIAS: &str = "dctrn_count_query";

/// What a compilation renders in its select list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Projection {
    /// Top-level query: every item carries an output alias.
    Full,
    /// Subquery: same items, no output aliases.
    Nested,
    /// Only the DISTINCT root identifier. Used by the limit rewrite and by
    /// count queries.
    IdsOnly,
}

/// A select-list alias the user can reference from GROUP BY, HAVING and
/// ORDER BY.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SelectAlias {
    pub sql_alias: String,
    pub expr: Fragment,
    /// Components the expression reads. Referencing the alias keeps their
    /// joins.
    pub components: Vec<String>,
    /// The expression reads no component, so a reference keeps every join.
    pub keeps_all_joins: bool,
}

/// A resolved `alias.field` reference.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedColumn {
    /// `tableAlias.column`, quoted as configured.
    pub sql: String,
    pub table_alias: String,
    pub column: ColumnDef,
}

/// Result of running a compilation.
#[derive(Debug, Clone)]
pub(crate) struct Compiled {
    pub parts: SqlParts,
    pub columns: Vec<ResultColumn>,
    /// Every short alias taken, to reserve in the enclosing query.
    pub taken: HashSet<String>,
    /// Enclosing-query aliases the statement referenced.
    pub outer_refs: BTreeSet<String>,
}

/// State of one compilation run.
pub(crate) struct Compilation<'q> {
    pub(crate) provider: &'q dyn MetadataProvider,
    pub(crate) options: &'q CompilerOptions,
    pub(crate) executor: Option<&'q dyn Executor>,
    pub(crate) quoter: IdentQuoter,
    pub(crate) projection: Projection,
    /// Count queries drop ORDER BY and pagination.
    pub(crate) for_count: bool,
    pub(crate) registry: AliasRegistry,
    pub(crate) pending: PendingSelect,
    pub(crate) select_aliases: HashMap<String, SelectAlias>,
    /// Whether the select list has an aggregate.
    pub(crate) aggregated: bool,
    /// Aggregates and subqueries numbered so far.
    pub(crate) select_index: usize,
    pub(crate) parts: SqlParts,
    pub(crate) columns: Vec<ResultColumn>,
    phase: QueryState,
}

impl<'q> Compilation<'q> {
    pub(crate) fn new(
        provider: &'q dyn MetadataProvider,
        options: &'q CompilerOptions,
        executor: Option<&'q dyn Executor>,
    ) -> Self {
        let registry = AliasRegistry::new(options.dialect.max_identifier_length());
        Self::with_registry(provider, options, executor, registry, Projection::Full)
    }

    pub(crate) fn with_registry(
        provider: &'q dyn MetadataProvider,
        options: &'q CompilerOptions,
        executor: Option<&'q dyn Executor>,
        registry: AliasRegistry,
        projection: Projection,
    ) -> Self {
        Self {
            provider,
            options,
            executor,
            quoter: IdentQuoter::new(options.dialect, options.quote_identifiers),
            projection,
            for_count: false,
            registry,
            pending: PendingSelect::default(),
            select_aliases: HashMap::new(),
            aggregated: false,
            select_index: 0,
            parts: SqlParts::default(),
            columns: Vec::new(),
            phase: QueryState::Empty,
        }
    }

    fn advance(&mut self, next: QueryState) {
        debug_assert!(next > self.phase, "{:?} cannot follow {:?}", next, self.phase);
        trace!(from = ?self.phase, to = ?next, "compilation phase");
        self.phase = next;
    }

    fn dispatch(&mut self, kind: ClauseKind, clauses: &ClauseSet) -> CompileResult<()> {
        match kind.parser() {
            Some(parser) => parser(self, clauses.fragments(kind)),
            None => Ok(()),
        }
    }

    /// Run every phase and return the final parts.
    pub(crate) fn run(mut self, clauses: &ClauseSet) -> CompileResult<Compiled> {
        let statement = clauses.statement;
        debug!(
            dialect = %self.options.dialect,
            statement = ?statement,
            projection = ?self.projection,
            "compiling query"
        );

        if clauses.from.is_empty() {
            return Err(CompileError::IncompleteQuery("FROM part is empty".into()));
        }
        if statement == StatementKind::Select && clauses.select.is_empty() {
            return Err(CompileError::IncompleteQuery("SELECT part is empty".into()));
        }
        if statement != StatementKind::Select {
            if !clauses.select.is_empty() {
                return Err(CompileError::malformed(
                    "UPDATE and DELETE statements have no SELECT clause",
                ));
            }
            self.registry = std::mem::take(&mut self.registry).with_table_names();
        }
        self.parts.kind = statement;

        self.advance(QueryState::Parsing);
        self.dispatch(ClauseKind::Select, clauses)?;
        self.advance(QueryState::FieldsPending);

        self.dispatch(ClauseKind::From, clauses)?;
        self.advance(QueryState::JoinsResolved);

        self.resolve_fields()?;
        self.resolve_aggregates()?;
        self.advance(QueryState::FieldsResolved);

        self.resolve_subqueries()?;
        for kind in [
            ClauseKind::Set,
            ClauseKind::Where,
            ClauseKind::GroupBy,
            ClauseKind::Having,
        ] {
            self.dispatch(kind, clauses)?;
        }
        if !self.for_count {
            self.dispatch(ClauseKind::OrderBy, clauses)?;
        }
        self.advance(QueryState::SubqueriesResolved);

        let filters = inheritance::inheritance_filters(
            self.provider,
            &self.registry,
            self.quoter,
            self.options.dialect,
        )?;
        self.parts = inheritance::apply_filters(std::mem::take(&mut self.parts), filters);
        self.advance(QueryState::InheritanceApplied);

        let parts = match statement {
            StatementKind::Select => self.finish_select(clauses)?,
            StatementKind::Update | StatementKind::Delete => self.finish_dml(clauses)?,
        };
        self.advance(QueryState::Rendered);

        Ok(Compiled {
            parts,
            columns: self.columns,
            taken: self.registry.taken().clone(),
            outer_refs: self.registry.outer_refs().clone(),
        })
    }

    fn pagination(&self, clauses: &ClauseSet) -> Option<LimitOffset> {
        let limit_offset = LimitOffset {
            limit: clauses.limit,
            offset: clauses.offset,
        };
        (!self.for_count && !limit_offset.is_empty()).then_some(limit_offset)
    }

    fn finish_select(&mut self, clauses: &ClauseSet) -> CompileResult<SqlParts> {
        let mut parts = std::mem::take(&mut self.parts);
        parts.joins = retain_needed_joins(&parts.joins, self.registry.needed());
        parts.limit_offset = self.pagination(clauses);

        if self.projection == Projection::IdsOnly {
            let ids: Vec<Fragment> = self
                .root_id_columns()?
                .into_iter()
                .map(|c| Fragment::new(c.sql))
                .collect();
            if parts.order_by.is_empty()
                || !parts.group_by.is_empty()
                || !parts.having.is_empty()
                || self.aggregated
            {
                parts.distinct = true;
            } else {
                group_by_root(&mut parts, &ids);
            }
            parts.select = ids;
            return Ok(parts);
        }

        if limit::needs_rewrite(&parts, self.options.limit_strategy) {
            let root_id = self.single_root_id()?;
            let inner = self.limit_subquery(clauses)?;
            let context = LimitContext {
                dialect: self.options.dialect,
                quoter: self.quoter,
                executor: self.executor,
            };
            parts = limit::rewrite(&parts, &root_id.sql, inner, &context)?;
        }

        Ok(parts)
    }

    fn finish_dml(&mut self, clauses: &ClauseSet) -> CompileResult<SqlParts> {
        let mut parts = std::mem::take(&mut self.parts);
        let dialect = self.options.dialect;

        if !parts.joins.is_empty() {
            return Err(CompileError::unsupported(
                "joins are not supported in UPDATE or DELETE",
            ));
        }
        if !parts.group_by.is_empty() || !parts.having.is_empty() {
            return Err(CompileError::unsupported(
                "GROUP BY and HAVING are not supported in UPDATE or DELETE",
            ));
        }
        if parts.kind == StatementKind::Delete && !parts.set.is_empty() {
            return Err(CompileError::malformed("DELETE statements have no SET clause"));
        }

        parts.limit_offset = self.pagination(clauses);
        if parts.limit_offset.is_some() || !parts.order_by.is_empty() {
            if !dialect.supports_limit_in_dml() {
                return Err(CompileError::unsupported(format!(
                    "{} does not support LIMIT or ORDER BY in UPDATE and DELETE",
                    dialect
                )));
            }
            if clauses.offset.is_some() {
                return Err(CompileError::unsupported(
                    "OFFSET is not supported in UPDATE or DELETE",
                ));
            }
        }

        Ok(parts)
    }

    /// Compile the DISTINCT root identifier query bounded by LIMIT/OFFSET.
    fn limit_subquery(&mut self, clauses: &ClauseSet) -> CompileResult<IdSubquery> {
        let registry = self.registry.regenerate_for_subquery();
        let child = Compilation::with_registry(
            self.provider,
            self.options,
            self.executor,
            registry,
            Projection::IdsOnly,
        );
        let compiled = child.run(clauses)?;
        self.registry.reserve(compiled.taken);

        let root = self.root_entity()?;
        let id_column = self
            .identifier_columns(&root)?
            .into_iter()
            .next()
            .ok_or_else(|| no_identifier(&root))?;

        Ok(IdSubquery {
            parts: compiled.parts,
            id_column: id_column.column_name().to_string(),
        })
    }

    /// Compile a nested SELECT in a child namespace of this query.
    pub(crate) fn compile_subquery(
        &mut self,
        text: &str,
        params: &[Value],
    ) -> CompileResult<Fragment> {
        let clauses = ClauseSet::parse(text, params)?;
        if clauses.statement != StatementKind::Select {
            return Err(CompileError::malformed(
                "subqueries must be SELECT statements",
            ));
        }

        let registry = self.registry.regenerate_for_subquery();
        let child = Compilation::with_registry(
            self.provider,
            self.options,
            self.executor,
            registry,
            Projection::Nested,
        );
        let compiled = child.run(&clauses)?;

        self.registry.reserve(compiled.taken);
        for alias in &compiled.outer_refs {
            self.registry.mark_needed(alias);
        }

        let sql = compiled.parts.to_sql(self.options.dialect)?;
        Ok(Fragment::with_params(sql, compiled.parts.params()))
    }

    // =========================================================================
    // Metadata helpers
    // =========================================================================

    pub(crate) fn entity(&self, name: &str) -> CompileResult<Arc<EntityMetadata>> {
        self.provider
            .entity(name)
            .ok_or_else(|| CompileError::UnknownEntity(name.to_string()))
    }

    /// The entity and its supertypes, nearest first.
    pub(crate) fn entity_chain(
        &self,
        entity: &Arc<EntityMetadata>,
    ) -> CompileResult<Vec<Arc<EntityMetadata>>> {
        let mut chain = vec![Arc::clone(entity)];
        chain.extend(inheritance::ancestors(self.provider, entity)?);
        Ok(chain)
    }

    /// Whether `entity` shares one table with its whole hierarchy.
    pub(crate) fn is_single_table(&self, entity: &Arc<EntityMetadata>) -> CompileResult<bool> {
        Ok(inheritance::hierarchy(self.provider, entity)?
            .is_some_and(|(_, h)| h.kind == InheritanceKind::SingleTable))
    }

    /// Find a column by field or column name on the entity, its supertypes
    /// and, for single-table hierarchies, its subtypes. Returns the table the
    /// column lives in.
    pub(crate) fn find_column(
        &self,
        entity: &Arc<EntityMetadata>,
        field: &str,
    ) -> CompileResult<(String, ColumnDef)> {
        for owner in self.entity_chain(entity)? {
            if let Some(column) = owner.find_column(field) {
                return Ok((owner.table.clone(), column.clone()));
            }
        }

        if self.is_single_table(entity)? {
            for subtype in inheritance::descendants(self.provider, entity)? {
                if let Some(column) = subtype.find_column(field) {
                    return Ok((subtype.table.clone(), column.clone()));
                }
            }
        }

        Err(CompileError::UnknownColumn {
            entity: entity.name.clone(),
            field: field.to_string(),
        })
    }

    /// Identifier columns of `entity`, inherited from the nearest supertype
    /// that declares them.
    pub(crate) fn identifier_columns(
        &self,
        entity: &Arc<EntityMetadata>,
    ) -> CompileResult<Vec<ColumnDef>> {
        let chain = self.entity_chain(entity)?;
        let Some(declaring) = chain.iter().find(|e| !e.identifier.is_empty()) else {
            return Err(no_identifier(entity));
        };

        declaring
            .identifier
            .iter()
            .map(|field| self.find_column(entity, field).map(|(_, column)| column))
            .collect()
    }

    /// Resolve `alias.field` against this query or an enclosing one.
    pub(crate) fn resolve_column(
        &mut self,
        alias: &str,
        field: &str,
    ) -> CompileResult<ResolvedColumn> {
        let (component, is_local) = match self.registry.lookup(alias) {
            Some((component, owner)) => (component.clone(), std::ptr::eq(owner, &self.registry)),
            None => return Err(CompileError::UnknownAlias(alias.to_string())),
        };

        let (table, column) = self.find_column(&component.entity, field)?;
        let table_alias = if is_local {
            self.registry.short_alias(alias, &table)?
        } else {
            self.registry
                .lookup(alias)
                .and_then(|(_, owner)| owner.get_short_alias(alias, &table))
                .map(str::to_string)
                .ok_or_else(|| CompileError::UnknownAlias(alias.to_string()))?
        };

        Ok(ResolvedColumn {
            sql: self.quoter.qualified(&table_alias, column.column_name()),
            table_alias,
            column,
        })
    }

    pub(crate) fn root_alias(&self) -> CompileResult<String> {
        self.registry
            .root_alias()
            .map(str::to_string)
            .ok_or_else(|| CompileError::IncompleteQuery("FROM part is empty".into()))
    }

    pub(crate) fn root_entity(&self) -> CompileResult<Arc<EntityMetadata>> {
        let alias = self.root_alias()?;
        Ok(Arc::clone(&self.registry.component(&alias)?.entity))
    }

    /// Qualified identifier columns of the root component.
    pub(crate) fn root_id_columns(&mut self) -> CompileResult<Vec<ResolvedColumn>> {
        let alias = self.root_alias()?;
        let root = self.root_entity()?;
        self.identifier_columns(&root)?
            .into_iter()
            .map(|column| self.resolve_column(&alias, &column.field))
            .collect()
    }

    fn single_root_id(&mut self) -> CompileResult<ResolvedColumn> {
        let mut ids = self.root_id_columns()?;
        if ids.len() != 1 {
            return Err(CompileError::unsupported(
                "LIMIT over to-many joins requires a single-column root identifier",
            ));
        }
        Ok(ids.remove(0))
    }
}

/// Collapse the identifier query to one row per root, ordered by the
/// smallest (ascending) or largest (descending) value among its rows.
fn group_by_root(parts: &mut SqlParts, ids: &[Fragment]) {
    parts.distinct = false;
    parts.group_by = ids.to_vec();
    for order in &mut parts.order_by {
        let function = match order.dir {
            Some(SortDir::Desc) => "MAX",
            Some(SortDir::Asc) | None => "MIN",
        };
        order.expr = Fragment::with_params(
            format!("{}({})", function, order.expr.sql),
            std::mem::take(&mut order.expr.params),
        );
    }
}

fn no_identifier(entity: &EntityMetadata) -> CompileError {
    CompileError::unsupported(format!("entity '{}' has no identifier", entity.name))
}

/// Compile a query into SQL, parameters and the result-column mapping.
pub(crate) fn compile(
    provider: &dyn MetadataProvider,
    options: &CompilerOptions,
    executor: Option<&dyn Executor>,
    clauses: &ClauseSet,
) -> CompileResult<CompiledQuery> {
    let compiled = Compilation::new(provider, options, executor).run(clauses)?;
    let sql = compiled.parts.to_sql(options.dialect)?;
    debug!(sql = %sql, "compiled query");

    Ok(CompiledQuery {
        sql,
        params: compiled.parts.params(),
        columns: compiled.columns,
        has_to_many_joins: compiled.parts.has_to_many_join(),
    })
}

/// Compile the COUNT variant of a SELECT query.
///
/// Ungrouped queries over a single-column identifier count distinct root
/// identifiers directly; anything else counts the rows of the DISTINCT
/// identifier query.
pub(crate) fn compile_count(
    provider: &dyn MetadataProvider,
    options: &CompilerOptions,
    clauses: &ClauseSet,
) -> CompileResult<(String, Vec<Value>)> {
    if clauses.statement != StatementKind::Select {
        return Err(CompileError::unsupported(
            "only SELECT queries can be counted",
        ));
    }

    let mut compilation = Compilation::new(provider, options, None);
    compilation.projection = Projection::IdsOnly;
    compilation.for_count = true;
    let quoter = compilation.quoter;
    let mut parts = compilation.run(clauses)?.parts;
    let params = parts.params();

    if parts.group_by.is_empty() && parts.having.is_empty() && parts.select.len() == 1 {
        let id = parts.select.remove(0);
        parts.distinct = false;
        parts.select = vec![Fragment::new(format!(
            "COUNT(DISTINCT {}) AS {}",
            id.sql,
            quoter.ident(COUNT_COLUMN)
        ))];
        return Ok((parts.to_sql(options.dialect)?, params));
    }

    let inner = parts.to_sql(options.dialect)?;
    let from = TableRef::new(format!("({})", inner)).with_alias(quoter.ident(COUNT_SUBQUERY_ALIAS));
    let outer = SqlParts {
        select: vec![Fragment::new(format!(
            "COUNT(*) AS {}",
            quoter.ident(COUNT_COLUMN)
        ))],
        from: Some(from),
        ..Default::default()
    };
    Ok((outer.to_sql(options.dialect)?, params))
}
