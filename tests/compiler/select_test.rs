//! SELECT list resolution: wildcards, identifier injection, aggregates,
//! result aliases and join pruning.

#[path = "../common/mod.rs"]
mod common;

use common::{compile, registry, sqlite_sql, validate_sql};
use dqlc::prelude::*;
use test_case::test_case;

// ============================================================================
// Fields and wildcards
// ============================================================================

#[test]
fn test_wildcards_across_a_join() {
    let sql = sqlite_sql("SELECT u.*, p.* FROM User u LEFT JOIN u.Phonenumbers p");
    insta::assert_snapshot!(sql, @"SELECT u.id AS u__id, u.name AS u__name, p.id AS p__id, p.phonenumber AS p__phonenumber, p.user_id AS p__user_id FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id");
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_identifier_is_always_selected() {
    assert_eq!(
        sqlite_sql("SELECT u.name FROM User u"),
        "SELECT u.id AS u__id, u.name AS u__name FROM users u"
    );
}

#[test]
fn test_bare_alias_selects_whole_component() {
    assert_eq!(
        sqlite_sql("SELECT u FROM User u"),
        sqlite_sql("SELECT u.* FROM User u")
    );
}

#[test]
fn test_mapped_column_name() {
    let metadata = registry();
    let compiled = compile(&metadata, Dialect::Sqlite, "SELECT a.zipCode FROM Address a", &[]).unwrap();

    assert_eq!(
        compiled.sql,
        "SELECT a.id AS a__id, a.zip_code AS a__zip_code FROM addresses a"
    );
    assert_eq!(compiled.columns[1].sql_alias, "a__zip_code");
    assert_eq!(compiled.columns[1].field, "zipCode");
}

#[test]
fn test_distinct() {
    assert_eq!(
        sqlite_sql("SELECT DISTINCT u.name FROM User u"),
        "SELECT DISTINCT u.id AS u__id, u.name AS u__name FROM users u"
    );
}

#[test]
fn test_fields_grouped_by_component() {
    // p is mentioned first, so its columns come first
    assert_eq!(
        sqlite_sql("SELECT p.phonenumber, u.name, p.id FROM User u LEFT JOIN u.Phonenumbers p"),
        "SELECT p.id AS p__id, p.phonenumber AS p__phonenumber, u.id AS u__id, u.name AS u__name \
         FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id"
    );
}

// ============================================================================
// Aggregates and result aliases
// ============================================================================

#[test]
fn test_aggregate_alias_in_having_and_order_by() {
    let sql = sqlite_sql(
        "SELECT u.name, COUNT(p.id) AS num FROM User u LEFT JOIN u.Phonenumbers p \
         GROUP BY u.id HAVING num > 1 ORDER BY num DESC",
    );
    insta::assert_snapshot!(sql, @"SELECT u.id AS u__id, u.name AS u__name, COUNT(p.id) AS p__0 FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id GROUP BY u.id HAVING COUNT(p.id) > 1 ORDER BY p__0 DESC");
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_distinct_aggregate() {
    assert_eq!(
        sqlite_sql("SELECT u.name, count(DISTINCT p.phonenumber) FROM User u LEFT JOIN u.Phonenumbers p GROUP BY u.id"),
        "SELECT u.id AS u__id, u.name AS u__name, COUNT(DISTINCT p.phonenumber) AS p__0 \
         FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id GROUP BY u.id"
    );
}

#[test]
fn test_aggregates_are_numbered_in_order() {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name, MIN(p.id) AS first, MAX(p.id) FROM User u LEFT JOIN u.Phonenumbers p GROUP BY u.id",
        &[],
    )
    .unwrap();

    let columns: Vec<(&str, &str, &str)> = compiled
        .columns
        .iter()
        .map(|c| (c.sql_alias.as_str(), c.component.as_str(), c.field.as_str()))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("u__id", "u", "id"),
            ("u__name", "u", "name"),
            ("p__0", "p", "first"),
            ("p__1", "p", "p__1"),
        ]
    );
}

#[test]
fn test_field_alias_in_order_by() {
    assert_eq!(
        sqlite_sql("SELECT u.name AS username FROM User u ORDER BY username"),
        "SELECT u.id AS u__id, u.name AS u__name FROM users u ORDER BY u__name"
    );
}

// ============================================================================
// Join pruning
// ============================================================================

#[test]
fn test_unreferenced_left_join_is_pruned() {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u LEFT JOIN u.Phonenumbers p",
        &[],
    )
    .unwrap();

    assert_eq!(compiled.sql, "SELECT u.id AS u__id, u.name AS u__name FROM users u");
    assert!(!compiled.has_to_many_joins);
}

#[test]
fn test_inner_join_is_kept() {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u INNER JOIN u.Phonenumbers p",
        &[],
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        "SELECT u.id AS u__id, u.name AS u__name FROM users u INNER JOIN phonenumbers p ON u.id = p.user_id"
    );
    assert!(compiled.has_to_many_joins);
}

#[test]
fn test_join_referenced_from_where_is_kept() {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u LEFT JOIN u.Phonenumbers p WHERE p.phonenumber LIKE ?",
        &[Value::from("555%")],
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        "SELECT u.id AS u__id, u.name AS u__name FROM users u \
         LEFT JOIN phonenumbers p ON u.id = p.user_id WHERE p.phonenumber LIKE ?"
    );
    assert_eq!(compiled.params, vec![Value::from("555%")]);
}

#[test]
fn test_aggregate_without_alias_keeps_every_join() {
    assert_eq!(
        sqlite_sql("SELECT COUNT(*) FROM User u LEFT JOIN u.Phonenumbers p"),
        "SELECT COUNT(*) AS u__0 FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id"
    );
}

// ============================================================================
// Dialects
// ============================================================================

#[test_case(Dialect::Postgres, r#"SELECT "u"."id" AS "u__id", "u"."name" AS "u__name" FROM "users" "u" WHERE "u"."id" = ?"#; "postgres")]
#[test_case(Dialect::MySql, "SELECT `u`.`id` AS `u__id`, `u`.`name` AS `u__name` FROM `users` `u` WHERE `u`.`id` = ?"; "mysql")]
#[test_case(Dialect::TSql, "SELECT [u].[id] AS [u__id], [u].[name] AS [u__name] FROM [users] [u] WHERE [u].[id] = ?"; "tsql")]
fn test_quoted_identifiers(dialect: Dialect, expected: &str) {
    let metadata = registry();
    let options = CompilerOptions::default()
        .with_dialect(dialect)
        .with_quoted_identifiers(true);
    let mut query = Query::new(&metadata, options);
    query
        .parse_with_params("SELECT u.name FROM User u WHERE u.id = ?", &[Value::Int(1)])
        .unwrap();

    assert_eq!(query.get_sql().unwrap().sql, expected);
}

#[test_case(Dialect::Postgres)]
#[test_case(Dialect::MySql)]
#[test_case(Dialect::Sqlite)]
#[test_case(Dialect::TSql)]
#[test_case(Dialect::Oracle)]
fn test_output_is_valid_sql(dialect: Dialect) {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        dialect,
        "SELECT u.*, p.phonenumber FROM User u LEFT JOIN u.Phonenumbers p ORDER BY u.name",
        &[],
    )
    .unwrap();

    if let Err(e) = validate_sql(&compiled.sql, dialect) {
        panic!("{}", e);
    }
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_unknown_entity() {
    let metadata = registry();
    let err = compile(&metadata, Dialect::Sqlite, "SELECT x.id FROM Nope x", &[]).unwrap_err();
    assert!(matches!(err, CompileError::UnknownEntity(name) if name == "Nope"));
}

#[test]
fn test_unknown_alias() {
    let metadata = registry();
    let err = compile(&metadata, Dialect::Sqlite, "SELECT z.name FROM User u", &[]).unwrap_err();
    assert!(matches!(err, CompileError::UnknownAlias(alias) if alias == "z"));
}

#[test]
fn test_unknown_column() {
    let metadata = registry();
    let err = compile(&metadata, Dialect::Sqlite, "SELECT u.shoeSize FROM User u", &[]).unwrap_err();
    assert!(matches!(
        err,
        CompileError::UnknownColumn { entity, field } if entity == "User" && field == "shoeSize"
    ));
}

#[test]
fn test_alias_bound_twice() {
    let metadata = registry();
    let err = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u LEFT JOIN u.Phonenumbers u",
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::AmbiguousAlias(alias) if alias == "u"));
}

#[test]
fn test_wildcard_cannot_be_aliased() {
    let metadata = registry();
    let err = compile(&metadata, Dialect::Sqlite, "SELECT u.* AS everything FROM User u", &[])
        .unwrap_err();
    assert!(matches!(err, CompileError::MalformedQuery(_)));
}

#[test]
fn test_multiple_roots_are_unsupported() {
    let metadata = registry();
    let err = compile(&metadata, Dialect::Sqlite, "SELECT u.name FROM User u, Group g", &[])
        .unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
}

#[test]
fn test_clauses_out_of_order() {
    let metadata = registry();
    let err = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u ORDER BY u.name WHERE u.id = 1",
        &[],
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::MalformedQuery(_)));
}
