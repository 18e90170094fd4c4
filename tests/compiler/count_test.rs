//! COUNT variants of SELECT queries.

#[path = "../common/mod.rs"]
mod common;

use common::{options, registry, validate_sql};
use dqlc::prelude::*;

fn count_sql(dql: &str, params: &[Value]) -> CompileResult<(String, Vec<Value>)> {
    let metadata = registry();
    let mut query = Query::new(&metadata, options(Dialect::Sqlite));
    query.parse_with_params(dql, params)?;
    query.count_sql()
}

struct Canned(Vec<Row>);

impl Executor for Canned {
    fn execute(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>, ExecutionError> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_count_prunes_unreferenced_joins() {
    let (sql, params) = count_sql("SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p", &[]).unwrap();
    assert_eq!(sql, "SELECT COUNT(DISTINCT u.id) AS num_results FROM users u");
    assert!(params.is_empty());
}

#[test]
fn test_count_keeps_filtering_joins() {
    let (sql, params) = count_sql(
        "SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p WHERE p.phonenumber LIKE ?",
        &[Value::from("555%")],
    )
    .unwrap();

    insta::assert_snapshot!(sql, @"SELECT COUNT(DISTINCT u.id) AS num_results FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id WHERE p.phonenumber LIKE ?");
    assert_eq!(params, vec![Value::from("555%")]);
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_grouped_count_wraps_identifier_query() {
    let (sql, _) = count_sql(
        "SELECT u.name, COUNT(p.id) AS n FROM User u LEFT JOIN u.Phonenumbers p GROUP BY u.id HAVING n > 1",
        &[],
    )
    .unwrap();

    insta::assert_snapshot!(sql, @"SELECT COUNT(*) AS num_results FROM (SELECT DISTINCT u.id FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id GROUP BY u.id HAVING COUNT(p.id) > 1) dctrn_count_query");
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_grouped_count_resolves_field_aliases() {
    let (sql, params) = count_sql(
        "SELECT u.name, p.phonenumber AS num FROM User u LEFT JOIN u.Phonenumbers p \
         GROUP BY u.id, num HAVING num LIKE ?",
        &[Value::from("555-01%")],
    )
    .unwrap();

    insta::assert_snapshot!(sql, @"SELECT COUNT(*) AS num_results FROM (SELECT DISTINCT u.id FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id GROUP BY u.id, p.phonenumber HAVING p.phonenumber LIKE ?) dctrn_count_query");
    assert_eq!(params, vec![Value::from("555-01%")]);
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_grouped_count_prunes_unreferenced_aggregates() {
    let (sql, _) = count_sql(
        "SELECT u.name, COUNT(p.id) AS phones FROM User u LEFT JOIN u.Phonenumbers p GROUP BY u.id",
        &[],
    )
    .unwrap();

    assert_eq!(
        sql,
        "SELECT COUNT(*) AS num_results FROM (SELECT DISTINCT u.id FROM users u GROUP BY u.id) dctrn_count_query"
    );
}

#[test]
fn test_grouped_count_keeps_joins_for_star_aggregate() {
    let (sql, _) = count_sql(
        "SELECT u.name, COUNT(*) AS total FROM User u LEFT JOIN u.Phonenumbers p GROUP BY u.id HAVING total > 1",
        &[],
    )
    .unwrap();

    assert_eq!(
        sql,
        "SELECT COUNT(*) AS num_results FROM (SELECT DISTINCT u.id FROM users u \
         LEFT JOIN phonenumbers p ON u.id = p.user_id GROUP BY u.id HAVING COUNT(*) > 1) dctrn_count_query"
    );
}

#[test]
fn test_count_ignores_order_and_pagination() {
    let metadata = registry();
    let mut query = Query::new(&metadata, options(Dialect::Sqlite));
    query
        .parse("SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p ORDER BY u.name")
        .unwrap();
    query.limit(2).offset(4);

    let (sql, _) = query.count_sql().unwrap();
    assert_eq!(sql, "SELECT COUNT(DISTINCT u.id) AS num_results FROM users u");
}

#[test]
fn test_count_applies_discriminator() {
    let (sql, _) = count_sql("SELECT e.name FROM Employee e", &[]).unwrap();
    assert_eq!(
        sql,
        "SELECT COUNT(DISTINCT p.id) AS num_results FROM person p WHERE p.type IN ('emp', 'mgr')"
    );
}

#[test]
fn test_count_of_dml_is_unsupported() {
    let err = count_sql("DELETE FROM User u", &[]).unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
}

#[test]
fn test_count_reads_first_cell() {
    let metadata = registry();
    let mut query = Query::new(&metadata, options(Dialect::Sqlite));
    query.parse("SELECT u.name FROM User u").unwrap();

    assert_eq!(query.count(&Canned(vec![vec![Value::Int(3)]])).unwrap(), 3);
    assert_eq!(query.count(&Canned(vec![vec![Value::from("12")]])).unwrap(), 12);
    assert!(query.count(&Canned(Vec::new())).is_err());
    assert!(query.count(&Canned(vec![vec![Value::Int(-1)]])).is_err());
}
