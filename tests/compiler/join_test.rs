//! Join graph: relation kinds, association tables, path syntax and join
//! conditions.

#[path = "../common/mod.rs"]
mod common;

use common::{compile, registry, sqlite_sql, validate_sql};
use dqlc::prelude::*;

#[test]
fn test_one_to_many() {
    let sql = sqlite_sql("SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumbers p");
    assert_eq!(
        sql,
        "SELECT u.id AS u__id, u.name AS u__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
         FROM users u LEFT JOIN phonenumbers p ON u.id = p.user_id"
    );
}

#[test]
fn test_many_to_one() {
    assert_eq!(
        sqlite_sql("SELECT u.name, a.city FROM User u INNER JOIN u.Address a"),
        "SELECT u.id AS u__id, u.name AS u__name, a.id AS a__id, a.city AS a__city \
         FROM users u INNER JOIN addresses a ON u.address_id = a.id"
    );
}

#[test]
fn test_many_to_many_through_association_table() {
    let sql = sqlite_sql("SELECT u.name, g.name FROM User u LEFT JOIN u.Groups g");
    insta::assert_snapshot!(sql, @"SELECT u.id AS u__id, u.name AS u__name, u2.id AS u2__id, u2.name AS u2__name FROM users u LEFT JOIN groupuser g ON u.id = g.user_id LEFT JOIN user_group u2 ON u2.id = g.group_id");
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_symmetric_self_reference() {
    let sql = sqlite_sql("SELECT u.name, f.name FROM User u LEFT JOIN u.Friends f");
    insta::assert_snapshot!(sql, @"SELECT u.id AS u__id, u.name AS u__name, u2.id AS u2__id, u2.name AS u2__name FROM users u LEFT JOIN friends f ON (u.id = f.user_id OR u.id = f.friend_id) LEFT JOIN users u2 ON (u2.id = f.friend_id OR u2.id = f.user_id) AND (u2.id <> u.id)");
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_plain_join_is_inner() {
    assert_eq!(
        sqlite_sql("SELECT p.phonenumber FROM User u JOIN u.Phonenumbers p"),
        sqlite_sql("SELECT p.phonenumber FROM User u INNER JOIN u.Phonenumbers p"),
    );
}

#[test]
fn test_left_outer_join() {
    assert_eq!(
        sqlite_sql("SELECT p.phonenumber FROM User u LEFT OUTER JOIN u.Phonenumbers p"),
        sqlite_sql("SELECT p.phonenumber FROM User u LEFT JOIN u.Phonenumbers p"),
    );
}

#[test]
fn test_with_condition_is_added_to_on() {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumbers p WITH p.phonenumber LIKE ?",
        &[Value::from("555%")],
    )
    .unwrap();

    assert_eq!(
        compiled.sql,
        "SELECT u.id AS u__id, u.name AS u__name, p.id AS p__id, p.phonenumber AS p__phonenumber \
         FROM users u LEFT JOIN phonenumbers p ON (u.id = p.user_id) AND (p.phonenumber LIKE ?)"
    );
    assert_eq!(compiled.params, vec![Value::from("555%")]);
}

#[test]
fn test_on_and_with_are_equivalent() {
    assert_eq!(
        sqlite_sql("SELECT p.id FROM User u LEFT JOIN u.Phonenumbers p ON p.id > 3"),
        sqlite_sql("SELECT p.id FROM User u LEFT JOIN u.Phonenumbers p WITH p.id > 3"),
    );
}

#[test]
fn test_join_params_precede_where_params() {
    let metadata = registry();
    let compiled = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name, p.phonenumber FROM User u LEFT JOIN u.Phonenumbers p WITH p.id > ? WHERE u.name = ?",
        &[Value::Int(10), Value::from("alice")],
    )
    .unwrap();

    assert_eq!(compiled.params, vec![Value::Int(10), Value::from("alice")]);
}

#[test]
fn test_condition_referencing_another_join_keeps_it() {
    assert_eq!(
        sqlite_sql(
            "SELECT u.name, p.id FROM User u LEFT JOIN u.Address a \
             LEFT JOIN u.Phonenumbers p WITH p.phonenumber = a.city"
        ),
        "SELECT u.id AS u__id, u.name AS u__name, p.id AS p__id FROM users u \
         LEFT JOIN addresses a ON u.address_id = a.id \
         LEFT JOIN phonenumbers p ON (u.id = p.user_id) AND (p.phonenumber = a.city)"
    );
}

#[test]
fn test_path_in_from() {
    assert_eq!(
        sqlite_sql("SELECT p.phonenumber FROM User.Phonenumbers p"),
        "SELECT p.id AS p__id, p.phonenumber AS p__phonenumber FROM users u \
         LEFT JOIN phonenumbers p ON u.id = p.user_id"
    );
}

#[test]
fn test_chained_join_path() {
    let sql = sqlite_sql("SELECT x.name FROM Phonenumber p INNER JOIN p.User.Groups x");
    assert_eq!(
        sql,
        "SELECT u2.id AS u2__id, u2.name AS u2__name FROM phonenumbers p \
         INNER JOIN users u ON p.user_id = u.id \
         INNER JOIN groupuser g ON u.id = g.user_id \
         INNER JOIN user_group u2 ON u2.id = g.group_id"
    );
    validate_sql(&sql, Dialect::Sqlite).unwrap();
}

#[test]
fn test_unknown_relation() {
    let metadata = registry();
    let err = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u LEFT JOIN u.Ghosts x",
        &[],
    )
    .unwrap_err();

    assert!(matches!(
        err,
        CompileError::UnknownRelation { entity, relation } if entity == "User" && relation == "Ghosts"
    ));
}

#[test]
fn test_join_from_unbound_alias() {
    let metadata = registry();
    let err = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u LEFT JOIN z.Phonenumbers p",
        &[],
    )
    .unwrap_err();

    assert!(matches!(err, CompileError::UnknownAlias(alias) if alias == "z"));
}

#[test]
fn test_join_needs_an_alias() {
    let metadata = registry();
    let err = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u LEFT JOIN u.Phonenumbers",
        &[],
    )
    .unwrap_err();

    assert!(matches!(err, CompileError::MalformedQuery(_)));
}

#[test]
fn test_implicit_join_is_unsupported() {
    let metadata = registry();
    let err = compile(
        &metadata,
        Dialect::Sqlite,
        "SELECT u.name FROM User u WHERE u.Address.city = ?",
        &[Value::from("Oslo")],
    )
    .unwrap_err();

    assert!(matches!(err, CompileError::UnsupportedConstruct(_)));
}

#[test]
fn test_incremental_joins() {
    let metadata = registry();
    let mut query = Query::new(&metadata, common::options(Dialect::Sqlite));
    query
        .add_select("u.name, g.name", &[])
        .unwrap()
        .add_from("User u", &[])
        .unwrap()
        .add_from("LEFT JOIN u.Groups g WITH g.name = ?", &[Value::from("staff")])
        .unwrap();

    let compiled = query.get_sql().unwrap();
    assert_eq!(
        compiled.sql,
        "SELECT u.id AS u__id, u.name AS u__name, u2.id AS u2__id, u2.name AS u2__name \
         FROM users u LEFT JOIN groupuser g ON u.id = g.user_id \
         LEFT JOIN user_group u2 ON (u2.id = g.group_id) AND (u2.name = ?)"
    );
    assert_eq!(compiled.params, vec![Value::from("staff")]);
}
