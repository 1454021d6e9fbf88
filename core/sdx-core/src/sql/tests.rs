use super::converter::{QueryConverter, kind_scope};
use crate::query::context::QueryRuntimeContext;
use crate::query::types::{MatchType, NumericRange, Occurrence, Query, QueryTerm};
use crate::query::QueryBuilder;
use crate::schema::{DocumentDescription, DocumentType, IndexingOption, PropertyDescription, TableDescription};

fn table() -> TableDescription {
    let ty = DocumentType::new(
        "ItemState",
        "Item",
        DocumentDescription::builder()
            .property("name", PropertyDescription::string().case_insensitive())
            .property("code", PropertyDescription::string())
            .property("count", PropertyDescription::long())
            .property("score", PropertyDescription::double())
            .property("flag", PropertyDescription::boolean())
            .property(
                "notes",
                PropertyDescription::string().with_indexing(IndexingOption::Text),
            )
            .property("tags", PropertyDescription::collection(PropertyDescription::string()))
            .property("labels", PropertyDescription::map(PropertyDescription::string()))
            .build(),
    );
    TableDescription::build("/items", &ty).unwrap()
}

fn convert(query: &Query) -> String {
    let mut context = QueryRuntimeContext::default();
    QueryConverter::new().convert(query, &mut context, &table()).unwrap()
}

fn term_sql(term: QueryTerm) -> String {
    convert(&Query::from_term(term))
}

#[test]
fn test_typed_equality() {
    assert_eq!(term_sql(QueryTerm::new("count", "5")), "json_extract(data, '$.count') = 5");
    assert_eq!(term_sql(QueryTerm::new("score", "2.5")), "json_extract(data, '$.score') = 2.5");
    assert_eq!(term_sql(QueryTerm::new("flag", "true")), "json_extract(data, '$.flag') = 1");
    assert_eq!(term_sql(QueryTerm::new("code", "a'b")), "json_extract(data, '$.code') = 'a''b'");
    assert_eq!(
        term_sql(QueryTerm::new("name", "Foo")),
        "LOWER(json_extract(data, '$.name')) = 'foo'"
    );
    assert_eq!(
        term_sql(QueryTerm::new("count", "abc")),
        "CAST(json_extract(data, '$.count') AS TEXT) = 'abc'"
    );
}

#[test]
fn test_patterns() {
    assert_eq!(
        term_sql(QueryTerm::new("code", "a_b").with_match_type(MatchType::Prefix)),
        "json_extract(data, '$.code') LIKE 'a\\_b%' ESCAPE '\\'"
    );
    assert_eq!(
        term_sql(QueryTerm::new("code", "a*b?").with_match_type(MatchType::Wildcard)),
        "json_extract(data, '$.code') LIKE 'a%b_' ESCAPE '\\'"
    );
    // a single trailing star is a prefix
    assert_eq!(
        term_sql(QueryTerm::new("code", "ab*").with_match_type(MatchType::Wildcard)),
        "json_extract(data, '$.code') LIKE 'ab%' ESCAPE '\\'"
    );
    assert_eq!(
        term_sql(QueryTerm::new("notes", "fox")),
        "json_extract(data, '$.notes') LIKE '%fox%' ESCAPE '\\'"
    );
    assert_eq!(
        term_sql(QueryTerm::new("code", "quick, fox").with_match_type(MatchType::Phrase)),
        "(json_extract(data, '$.code') LIKE '%quick%' ESCAPE '\\' AND json_extract(data, '$.code') LIKE '%fox%' ESCAPE '\\')"
    );
    assert_eq!(
        term_sql(QueryTerm::new("code", " ,, ").with_match_type(MatchType::Phrase)),
        "TRUE"
    );
}

#[test]
fn test_presence_and_collections() {
    assert_eq!(term_sql(QueryTerm::new("code", "*")), "json_extract(data, '$.code') IS NOT NULL");
    assert_eq!(term_sql(QueryTerm::new("tags.item", "*")), "json_array_length(data, '$.tags') > 0");
    assert_eq!(
        term_sql(QueryTerm::new("tags.item", "red")),
        "EXISTS(SELECT 1 FROM json_each(data, '$.tags') WHERE value = 'red')"
    );
    assert_eq!(
        term_sql(QueryTerm::new("labels.env", "prod")),
        "json_extract(data, '$.labels.env') = 'prod'"
    );
}

#[test]
fn test_ranges() {
    assert_eq!(
        term_sql(QueryTerm::range("count", NumericRange::long(Some(5), Some(10), true, false))),
        "json_extract(data, '$.count') BETWEEN 5 AND 9"
    );
    assert_eq!(
        term_sql(QueryTerm::range("count", NumericRange::long(Some(5), Some(6), false, false))),
        "json_extract(data, '$.count') BETWEEN 5 AND 6"
    );
    assert_eq!(
        term_sql(QueryTerm::range("count", NumericRange::long(Some(5), Some(7), false, false))),
        "json_extract(data, '$.count') = 6"
    );
    assert_eq!(
        term_sql(QueryTerm::range("score", NumericRange::double(Some(5.0), Some(10.0), true, false))),
        "(json_extract(data, '$.score') >= 5.0 AND json_extract(data, '$.score') < 10.0)"
    );
    assert_eq!(
        term_sql(QueryTerm::range("score", NumericRange::double(Some(1.0), Some(2.0), true, true))),
        "json_extract(data, '$.score') BETWEEN 1.0 AND 2.0"
    );
    assert_eq!(
        term_sql(QueryTerm::range("score", NumericRange::double(Some(1.5), None, false, true))),
        "json_extract(data, '$.score') > 1.5"
    );
    assert_eq!(
        term_sql(QueryTerm::range("count", NumericRange::long(None, None, true, true))),
        "TRUE"
    );
}

#[test]
fn test_negation_coalesces_nulls() {
    let query = QueryBuilder::create()
        .add_kind_field_clause("Item")
        .add_field_clause_with("code", "x", MatchType::Term, Occurrence::MustNot)
        .build();
    assert_eq!(
        convert(&query),
        "NOT COALESCE(json_extract(data, '$.code') = 'x', FALSE)"
    );

    let link = QueryBuilder::create()
        .add_field_clause_with("documentSelfLink", "/items/1", MatchType::Term, Occurrence::MustNot)
        .add_field_clause("code", "y")
        .build();
    assert_eq!(
        convert(&link),
        "(NOT documentselflink = '/items/1' AND json_extract(data, '$.code') = 'y')"
    );
}

#[test]
fn test_should_terms_coalesce_into_in() {
    let query = Query::group(vec![
        Query::term("code", "a").with_occurrence(Occurrence::Should),
        Query::term("code", "b").with_occurrence(Occurrence::Should),
        Query::term("code", "c").with_occurrence(Occurrence::Should),
    ]);
    assert_eq!(convert(&query), "json_extract(data, '$.code') IN ('a', 'b', 'c')");

    let tags = Query::group(vec![
        Query::term("tags.item", "a").with_occurrence(Occurrence::Should),
        Query::term("tags.item", "b").with_occurrence(Occurrence::Should),
    ]);
    assert_eq!(
        convert(&tags),
        "EXISTS(SELECT 1 FROM json_each(data, '$.tags') WHERE value IN ('a', 'b'))"
    );
}

#[test]
fn test_must_terms_on_one_property() {
    let conflicting = Query::group(vec![Query::term("code", "a"), Query::term("code", "b")]);
    assert_eq!(convert(&conflicting), "FALSE");

    let case_folded = Query::group(vec![Query::term("name", "Ab"), Query::term("name", "aB")]);
    assert_eq!(convert(&case_folded), "LOWER(json_extract(data, '$.name')) = 'ab'");

    let all_tags = Query::group(vec![Query::term("tags.item", "a"), Query::term("tags.item", "b")]);
    assert_eq!(
        convert(&all_tags),
        "(SELECT COUNT(DISTINCT value) FROM json_each(data, '$.tags') WHERE value IN ('a', 'b')) = 2"
    );

    let none_of = Query::group(vec![
        Query::kind("Item"),
        Query::term("code", "a").with_occurrence(Occurrence::MustNot),
        Query::term("code", "b").with_occurrence(Occurrence::MustNot),
    ]);
    assert_eq!(
        convert(&none_of),
        "NOT COALESCE(json_extract(data, '$.code') IN ('a', 'b'), FALSE)"
    );
}

#[test]
fn test_reduction_skips_tables() {
    assert_eq!(convert(&Query::kind("Other")), "FALSE");
    assert_eq!(convert(&Query::kind("Item")), "TRUE");
    assert_eq!(convert(&Query::term("ghost", "x")), "FALSE");

    let mut context = QueryRuntimeContext::default();
    let plain = QueryConverter::without_reduction()
        .convert(&Query::kind("Other"), &mut context, &table())
        .unwrap();
    assert_eq!(plain, "documentkind = 'Other'");
    assert_eq!(context.native_query.as_deref(), Some("documentkind = 'Other'"));
}

#[test]
fn test_malformed_query_is_conversion_error() {
    let mut context = QueryRuntimeContext::default();
    let err = QueryConverter::new()
        .convert(&Query::group(vec![Query::default()]), &mut context, &table())
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
    assert!(matches!(err, crate::error::SdxError::Conversion { .. }));
}

#[test]
fn test_kind_scope() {
    let query = Query::group(vec![
        Query::kind("A"),
        Query::kind("B").with_occurrence(Occurrence::Should),
        Query::kind("C").with_occurrence(Occurrence::MustNot),
    ]);
    let scope = kind_scope(&query);
    assert_eq!(scope.into_iter().collect::<Vec<_>>(), vec!["A", "B"]);
}

#[test]
fn test_sql_matches_evaluator_on_sqlite() {
    use rusqlite::Connection;
    use serde_json::json;

    let td = table();
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA case_sensitive_like = ON; CREATE TABLE t (data TEXT, documentselflink TEXT, documentkind TEXT);")
        .unwrap();
    let docs = vec![
        json!({"documentSelfLink": "/items/1", "documentKind": "Item", "name": "Alpha", "count": 5, "score": 5.0, "tags": ["a", "b"]}),
        json!({"documentSelfLink": "/items/2", "documentKind": "Item", "name": "beta", "count": 10, "score": 9.99, "tags": ["b"]}),
        json!({"documentSelfLink": "/items/3", "documentKind": "Item", "code": "x", "flag": true, "tags": []}),
        json!({"documentSelfLink": "/items/4", "documentKind": "Item", "name": "ALPHA", "count": 7, "flag": false}),
    ];
    for doc in &docs {
        conn.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3)",
            rusqlite::params![doc.to_string(), doc["documentSelfLink"].as_str(), "Item"],
        )
        .unwrap();
    }

    let queries = vec![
        Query::term("name", "alpha"),
        Query::from_term(QueryTerm::range("count", NumericRange::long(Some(5), Some(10), true, false))),
        Query::from_term(QueryTerm::range("score", NumericRange::double(Some(5.0), Some(10.0), true, false))),
        Query::term("code", "x").with_occurrence(Occurrence::MustNot),
        Query::group(vec![Query::term("tags.item", "a"), Query::term("tags.item", "b")]),
        Query::group(vec![
            Query::term("flag", "false").with_occurrence(Occurrence::Should),
            Query::term("name", "BETA").with_occurrence(Occurrence::Should),
        ]),
        Query::from_term(QueryTerm::new("name", "al*").with_match_type(MatchType::Wildcard)),
    ];
    for query in queries {
        let expr = QueryConverter::new().reduce(&query, &td).unwrap();
        let expected: Vec<String> = docs
            .iter()
            .filter(|d| expr.evaluate(d, Some(&td)))
            .map(|d| d["documentSelfLink"].as_str().unwrap().to_string())
            .collect();
        for converter in [QueryConverter::new(), QueryConverter::without_reduction()] {
            let mut context = QueryRuntimeContext::default();
            let sql = converter.convert(&query, &mut context, &td).unwrap();
            let mut stmt = conn
                .prepare(&format!("SELECT documentselflink FROM t WHERE {sql} ORDER BY documentselflink"))
                .unwrap();
            let actual: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .unwrap()
                .collect::<Result<_, _>>()
                .unwrap();
            assert_eq!(actual, expected, "{sql}");
        }
    }
}
