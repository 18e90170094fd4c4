//! LIMIT/OFFSET over to-many joins: the identifier subquery and its three
//! embeddings.

#[path = "../common/mod.rs"]
mod common;

use std::cell::RefCell;

use common::{options, registry, validate_sql};
use dqlc::prelude::*;
use test_case::test_case;

const USERS_WITH_PHONES: &str = "SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p";
const OUTER_SELECT: &str = "SELECT u.id AS u__id, u.name AS u__name, p.id AS p__id, \
     p.phonenumber AS p__phonenumber, p.user_id AS p__user_id \
     FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id";

/// Returns canned rows and records every statement it is asked to run.
struct Recorder {
    rows: Vec<Row>,
    seen: RefCell<Vec<(String, Vec<Value>)>>,
}

impl Recorder {
    fn returning(ids: &[i64]) -> Self {
        Self {
            rows: ids.iter().map(|&id| vec![Value::Int(id)]).collect(),
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl Executor for Recorder {
    fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutionError> {
        self.seen.borrow_mut().push((sql.to_string(), params.to_vec()));
        Ok(self.rows.clone())
    }
}

struct Unreachable;

impl Executor for Unreachable {
    fn execute(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, ExecutionError> {
        Err(ExecutionError::new("database is unreachable"))
    }
}

fn limited(
    options: CompilerOptions,
    dql: &str,
    params: &[Value],
    limit: u64,
    offset: Option<u64>,
) -> CompileResult<CompiledQuery> {
    let metadata = registry();
    let mut query = Query::new(&metadata, options);
    query.parse_with_params(dql, params)?;
    query.limit(limit);
    if let Some(offset) = offset {
        query.offset(offset);
    }
    Ok(query.get_sql()?.clone())
}

fn limited_with(
    executor: &dyn Executor,
    dialect: Dialect,
    dql: &str,
    params: &[Value],
    limit: u64,
) -> CompileResult<CompiledQuery> {
    let metadata = registry();
    let mut query = Query::new(&metadata, options(dialect)).with_executor(executor);
    query.parse_with_params(dql, params)?;
    query.limit(limit);
    Ok(query.get_sql()?.clone())
}

// ============================================================================
// Nested LIMIT
// ============================================================================

#[test]
fn test_nested_limit() {
    let compiled = limited(options(Dialect::Sqlite), USERS_WITH_PHONES, &[], 2, None).unwrap();

    assert_eq!(
        compiled.sql,
        format!("{} WHERE u.id IN (SELECT DISTINCT u2.id FROM users u2 LIMIT 2)", OUTER_SELECT)
    );
    assert!(compiled.has_to_many_joins);
    validate_sql(&compiled.sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_nested_limit_with_offset() {
    let compiled = limited(options(Dialect::Sqlite), USERS_WITH_PHONES, &[], 2, Some(1)).unwrap();

    assert_eq!(
        compiled.sql,
        format!(
            "{} WHERE u.id IN (SELECT DISTINCT u2.id FROM users u2 LIMIT 2 OFFSET 1)",
            OUTER_SELECT
        )
    );
}

#[test]
fn test_limit_and_offset_in_query_text() {
    let metadata = registry();
    let mut query = Query::new(&metadata, options(Dialect::Sqlite));
    query
        .parse(&format!("{} LIMIT 2 OFFSET 1", USERS_WITH_PHONES))
        .unwrap();

    assert_eq!(
        query.get_sql().unwrap().sql,
        limited(options(Dialect::Sqlite), USERS_WITH_PHONES, &[], 2, Some(1))
            .unwrap()
            .sql
    );
}

#[test]
fn test_subquery_keeps_filtering_joins() {
    let compiled = limited(
        options(Dialect::Sqlite),
        &format!("{} WHERE p.phonenumber LIKE ?", USERS_WITH_PHONES),
        &[Value::from("555-01%")],
        2,
        None,
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        format!(
            "{} WHERE (u.id IN (SELECT DISTINCT u2.id FROM users u2 \
             LEFT JOIN phonenumbers p2 ON u2.id = p2.user_id \
             WHERE p2.phonenumber LIKE ? LIMIT 2)) AND (p.phonenumber LIKE ?)",
            OUTER_SELECT
        )
    );
    // Identifier subquery placeholders come first
    assert_eq!(
        compiled.params,
        vec![Value::from("555-01%"), Value::from("555-01%")]
    );
}

#[test]
fn test_nested_limit_keeps_order_by() {
    let compiled = limited(
        options(Dialect::Sqlite),
        &format!("{} ORDER BY u.name DESC", USERS_WITH_PHONES),
        &[],
        2,
        None,
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        format!(
            "{} WHERE u.id IN (SELECT u2.id FROM users u2 GROUP BY u2.id \
             ORDER BY MAX(u2.name) DESC LIMIT 2) ORDER BY u.name DESC",
            OUTER_SELECT
        )
    );
}

#[test]
fn test_order_by_to_many_column_groups_by_root() {
    let compiled = limited(
        options(Dialect::Sqlite),
        &format!("{} ORDER BY p.phonenumber", USERS_WITH_PHONES),
        &[],
        2,
        None,
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        format!(
            "{} WHERE u.id IN (SELECT u2.id FROM users u2 \
             LEFT JOIN phonenumbers p2 ON u2.id = p2.user_id \
             GROUP BY u2.id ORDER BY MIN(p2.phonenumber) LIMIT 2) ORDER BY p.phonenumber",
            OUTER_SELECT
        )
    );
    validate_sql(&compiled.sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_order_by_field_alias_in_identifier_query() {
    let compiled = limited(
        options(Dialect::Sqlite),
        "SELECT u.*, p.phonenumber AS num FROM User u LEFT JOIN u.Phonenumbers p ORDER BY num DESC",
        &[],
        2,
        None,
    )
    .unwrap();

    assert!(
        compiled.sql.contains(
            "WHERE u.id IN (SELECT u2.id FROM users u2 \
             LEFT JOIN phonenumbers p2 ON u2.id = p2.user_id \
             GROUP BY u2.id ORDER BY MAX(p2.phonenumber) DESC LIMIT 2)"
        ),
        "{}",
        compiled.sql
    );
    assert!(compiled.sql.ends_with("ORDER BY p__phonenumber DESC"), "{}", compiled.sql);
    validate_sql(&compiled.sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_grouped_identifier_query_resolves_aliases() {
    let compiled = limited(
        options(Dialect::Sqlite),
        "SELECT u.name AS uname, COUNT(p.id) AS n FROM User u LEFT JOIN u.Phonenumbers p \
         GROUP BY u.id HAVING n > 1 ORDER BY uname",
        &[],
        2,
        None,
    )
    .unwrap();

    insta::assert_snapshot!(compiled.sql, @"SELECT u.id AS u__id, u.name AS u__name, COUNT(p.id) AS p__0 FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id WHERE u.id IN (SELECT DISTINCT u2.id FROM users u2 LEFT JOIN phonenumbers p2 ON u2.id = p2.user_id GROUP BY u2.id HAVING COUNT(p2.id) > 1 ORDER BY u2.name LIMIT 2) GROUP BY u.id HAVING COUNT(p.id) > 1 ORDER BY u__name");
    validate_sql(&compiled.sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_unreferenced_aggregate_does_not_keep_joins() {
    let compiled = limited(
        options(Dialect::Sqlite),
        "SELECT u.name, COUNT(p.id) AS phones FROM User u LEFT JOIN u.Phonenumbers p GROUP BY u.id",
        &[],
        2,
        None,
    )
    .unwrap();

    assert!(
        compiled
            .sql
            .contains("WHERE u.id IN (SELECT DISTINCT u2.id FROM users u2 GROUP BY u2.id LIMIT 2)"),
        "{}",
        compiled.sql
    );
}

// ============================================================================
// Double wrap
// ============================================================================

#[test]
fn test_double_wrap_projects_order_columns() {
    let compiled = limited(
        options(Dialect::Postgres),
        &format!("{} ORDER BY u.name", USERS_WITH_PHONES),
        &[],
        2,
        None,
    )
    .unwrap();

    insta::assert_snapshot!(compiled.sql, @"SELECT u.id AS u__id, u.name AS u__name, p.id AS p__id, p.phonenumber AS p__phonenumber, p.user_id AS p__user_id FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id WHERE u.id IN (SELECT dctrn_limit.id FROM (SELECT u2.id AS id, MIN(u2.name) AS dctrn_ord_0 FROM users u2 GROUP BY u2.id ORDER BY dctrn_ord_0 LIMIT 2) dctrn_limit) ORDER BY u.name");
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_double_wrap_orders_by_to_many_column() {
    let compiled = limited(
        options(Dialect::Postgres),
        &format!("{} ORDER BY p.phonenumber DESC", USERS_WITH_PHONES),
        &[],
        2,
        None,
    )
    .unwrap();

    assert!(
        compiled.sql.contains(
            "(SELECT u2.id AS id, MAX(p2.phonenumber) AS dctrn_ord_0 FROM users u2 \
             LEFT JOIN phonenumbers p2 ON u2.id = p2.user_id \
             GROUP BY u2.id ORDER BY dctrn_ord_0 DESC LIMIT 2) dctrn_limit"
        ),
        "{}",
        compiled.sql
    );
    validate_sql(&compiled.sql, Dialect::Postgres).unwrap();
}

#[test]
fn test_double_wrap_oracle_pagination() {
    let compiled = limited(options(Dialect::Oracle), USERS_WITH_PHONES, &[], 5, Some(10)).unwrap();

    assert!(compiled.sql.contains(
        "u.id IN (SELECT dctrn_limit.id FROM (SELECT DISTINCT u2.id AS id FROM users u2 \
         OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY) dctrn_limit)"
    ));
    assert!(!compiled.sql.ends_with("ONLY"));
}

// ============================================================================
// Literal substitution
// ============================================================================

#[test]
fn test_literal_substitution() {
    let executor = Recorder::returning(&[1, 2, 2]);
    let compiled = limited_with(&executor, Dialect::MySql, USERS_WITH_PHONES, &[], 2).unwrap();

    assert_eq!(compiled.sql, format!("{} WHERE u.id IN (1, 2)", OUTER_SELECT));
    assert!(compiled.params.is_empty());

    let seen = executor.seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "SELECT DISTINCT u2.id AS id FROM users u2 LIMIT 2");
}

#[test]
fn test_literal_substitution_passes_subquery_params() {
    let executor = Recorder::returning(&[3]);
    let compiled = limited_with(
        &executor,
        Dialect::MySql,
        &format!("{} WHERE u.name <> ?", USERS_WITH_PHONES),
        &[Value::from("bob")],
        1,
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        format!("{} WHERE (u.id IN (3)) AND (u.name <> ?)", OUTER_SELECT)
    );
    assert_eq!(compiled.params, vec![Value::from("bob")]);

    let seen = executor.seen.borrow();
    assert_eq!(
        seen[0],
        (
            "SELECT DISTINCT u2.id AS id FROM users u2 WHERE u2.name <> ? LIMIT 1".to_string(),
            vec![Value::from("bob")]
        )
    );
}

#[test]
fn test_literal_substitution_with_no_rows() {
    let executor = Recorder::returning(&[]);
    let compiled = limited_with(&executor, Dialect::MySql, USERS_WITH_PHONES, &[], 2).unwrap();
    assert_eq!(compiled.sql, format!("{} WHERE u.id IN (NULL)", OUTER_SELECT));
}

#[test]
fn test_literal_substitution_needs_an_executor() {
    let err = limited(options(Dialect::MySql), USERS_WITH_PHONES, &[], 2, None).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
}

#[test]
fn test_executor_failure_propagates() {
    let err = limited_with(&Unreachable, Dialect::MySql, USERS_WITH_PHONES, &[], 2).unwrap_err();
    assert!(matches!(err, CompileError::Execution(_)));
}

// ============================================================================
// No rewrite
// ============================================================================

#[test_case("SELECT u.name FROM User u"; "no join")]
#[test_case("SELECT u.name FROM User u LEFT JOIN u.Phonenumbers p"; "pruned to-many join")]
#[test_case("SELECT u.name, a.city FROM User u LEFT JOIN u.Address a"; "to-one join")]
fn test_plain_limit(dql: &str) {
    let compiled = limited(options(Dialect::Sqlite), dql, &[], 2, None).unwrap();
    assert!(compiled.sql.ends_with(" LIMIT 2"), "{}", compiled.sql);
    assert!(!compiled.sql.contains("IN ("), "{}", compiled.sql);
}

#[test]
fn test_row_strategy_limits_rows() {
    let compiled = limited(
        options(Dialect::Sqlite).with_limit_strategy(LimitStrategy::Rows),
        USERS_WITH_PHONES,
        &[],
        2,
        None,
    )
    .unwrap();

    assert_eq!(compiled.sql, format!("{} LIMIT 2", OUTER_SELECT));
}

#[test]
fn test_composite_root_identifier_is_unsupported() {
    let err = limited(
        options(Dialect::Sqlite),
        "SELECT m.*, n.* FROM Membership m LEFT JOIN m.Notes n",
        &[],
        2,
        None,
    )
    .unwrap_err();

    assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
}
