//! ORDER BY and keyset pagination clauses.

use crate::document::FIELD_NAME_SELF_LINK;
use crate::error::{SdxError, SdxResult};
use crate::query::eval::{resolve, text_form};
use crate::query::types::{QueryOption, QuerySpecification, QueryTerm, SortOrder};
use crate::schema::table::{DATA_COLUMN, json_extract_expr};
use crate::schema::TableDescription;
use crate::sql::escape::quote;
use serde_json::Value;

/// One resolved `ORDER BY` key.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    pub property_name: String,
    pub expr: String,
    pub descending: bool,
    pub case_insensitive: bool,
    pub numeric: bool,
}

/// Value of one sort key in a result row.
#[derive(Debug, Clone, PartialEq)]
enum KeyValue {
    Null,
    Literal(String),
}

impl SortField {
    fn direction(&self) -> &'static str {
        if self.descending { "DESC" } else { "ASC" }
    }

    /// selfLink is the only key that is never null.
    fn nullable(&self) -> bool {
        self.property_name != FIELD_NAME_SELF_LINK
    }

    /// Key of this field in a result row. `None` when the value has no SQL
    /// literal form.
    fn key(&self, row: &Value) -> Option<KeyValue> {
        let Some(value) = resolve(row, &self.property_name).into_iter().next() else {
            return Some(KeyValue::Null);
        };
        let literal = match value {
            Value::Null => return Some(KeyValue::Null),
            Value::Number(n) if self.numeric => n.to_string(),
            Value::Bool(b) if self.numeric => (if *b { "1" } else { "0" }).to_string(),
            other => {
                let text = text_form(other)?;
                quote(&if self.case_insensitive {
                    text.to_ascii_lowercase()
                } else {
                    text
                })
            }
        };
        Some(KeyValue::Literal(literal))
    }

    /// Rows sorting after `key` on this field alone. SQLite puts NULLs first
    /// under ASC and last under DESC.
    fn after(&self, key: &KeyValue) -> Option<String> {
        let expr = &self.expr;
        match (self.descending, key) {
            (false, KeyValue::Literal(lit)) => Some(format!("{expr} > {lit}")),
            (false, KeyValue::Null) => Some(format!("{expr} IS NOT NULL")),
            (true, KeyValue::Literal(lit)) if self.nullable() => {
                Some(format!("({expr} < {lit} OR {expr} IS NULL)"))
            }
            (true, KeyValue::Literal(lit)) => Some(format!("{expr} < {lit}")),
            (true, KeyValue::Null) => None,
        }
    }

    fn equal(&self, key: &KeyValue) -> String {
        match key {
            KeyValue::Literal(lit) => format!("{} = {lit}", self.expr),
            KeyValue::Null => format!("{} IS NULL", self.expr),
        }
    }
}

pub fn sort_field(term: &QueryTerm, order: SortOrder, table: &TableDescription) -> SdxResult<SortField> {
    let type_name = term.property_type.ok_or_else(|| {
        SdxError::validation(format!(
            "sort term '{}' requires a property type",
            term.property_name
        ))
    })?;
    let exact = table
        .column(&term.property_name)
        .filter(|cd| cd.property_name == term.property_name);
    let numeric = type_name.is_numeric();
    let (expr, case_insensitive) = match exact {
        Some(cd) if numeric => (cd.column_name.clone(), false),
        Some(cd) if cd.case_insensitive => (format!("LOWER({})", cd.column_name_as_text), true),
        Some(cd) => (cd.column_name_as_text.clone(), false),
        None => (json_extract_expr(DATA_COLUMN, &term.property_name), false),
    };
    Ok(SortField {
        property_name: term.property_name.clone(),
        expr,
        descending: order == SortOrder::Desc,
        case_insensitive,
        numeric,
    })
}

/// Sort keys of a query; selfLink always closes the list so pagination
/// is total.
pub fn sort_fields(spec: &QuerySpecification, table: &TableDescription) -> SdxResult<Vec<SortField>> {
    if spec.has_option(QueryOption::TopResults) && spec.explicit_limit().is_none() {
        return Err(SdxError::validation("TOP_RESULTS requires a result limit"));
    }

    let mut fields = Vec::new();
    if spec.has_option(QueryOption::Sort) {
        let term = spec
            .sort_term
            .as_ref()
            .ok_or_else(|| SdxError::validation("SORT requires a sort term"))?;
        fields.push(sort_field(term, term.sort_order.unwrap_or(spec.sort_order), table)?);
        for extra in &spec.additional_sort_terms {
            fields.push(sort_field(extra, extra.sort_order.unwrap_or_default(), table)?);
        }
    }

    let descending = match fields.first() {
        Some(primary) => primary.descending,
        None if spec.explicit_limit().is_some()
            || spec.has_option(QueryOption::OwnerSelection) =>
        {
            false
        }
        None => return Ok(fields),
    };
    if !fields.iter().any(|f| f.property_name == FIELD_NAME_SELF_LINK) {
        let order = if descending { SortOrder::Desc } else { SortOrder::Asc };
        fields.push(sort_field(
            &QueryTerm::sort(FIELD_NAME_SELF_LINK, crate::schema::TypeName::String),
            order,
            table,
        )?);
    }
    Ok(fields)
}

pub fn order_by_clause(fields: &[SortField]) -> String {
    if fields.is_empty() {
        return String::new();
    }
    let keys = fields
        .iter()
        .map(|f| format!("{} {}", f.expr, f.direction()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ORDER BY {keys}")
}

/// Rows strictly after `last` in sort order, null keys included. `None`
/// when a key of `last` cannot be written as a literal.
pub fn pagination_clause(fields: &[SortField], last: &Value) -> Option<String> {
    let keyed = fields
        .iter()
        .map(|f| f.key(last).map(|k| (f, k)))
        .collect::<Option<Vec<_>>>()?;
    let (first, _) = keyed.first()?;

    let literals = keyed
        .iter()
        .map(|(_, k)| match k {
            KeyValue::Literal(lit) => Some(lit.as_str()),
            KeyValue::Null => None,
        })
        .collect::<Option<Vec<_>>>();
    let same_direction = keyed.iter().all(|(f, _)| f.descending == first.descending);
    let nullable_tail = keyed[1..].iter().any(|(f, _)| f.nullable());
    if let Some(lits) = literals
        && same_direction
        && (!first.descending || !nullable_tail)
    {
        let op = if first.descending { "<" } else { ">" };
        let tuple = if keyed.len() == 1 {
            format!("{} {op} {}", first.expr, lits[0])
        } else {
            let exprs = keyed.iter().map(|(f, _)| f.expr.as_str()).collect::<Vec<_>>();
            format!("({}) {op} ({})", exprs.join(", "), lits.join(", "))
        };
        if first.descending && first.nullable() {
            return Some(format!("({tuple} OR {} IS NULL)", first.expr));
        }
        return Some(tuple);
    }

    // (a after x) OR (a = x AND b after y) OR ...
    let mut branches = Vec::with_capacity(keyed.len());
    let mut equal = Vec::with_capacity(keyed.len());
    for (f, key) in &keyed {
        if let Some(after) = f.after(key) {
            let mut conds = equal.clone();
            conds.push(after);
            branches.push(format!("({})", conds.join(" AND ")));
        }
        equal.push(f.equal(key));
    }
    if branches.is_empty() {
        return None;
    }
    Some(format!("({})", branches.join(" OR ")))
}

/// Group key of a GROUP_BY query.
pub fn group_field(spec: &QuerySpecification, table: &TableDescription) -> SdxResult<SortField> {
    let term = spec
        .group_by_term
        .as_ref()
        .ok_or_else(|| SdxError::validation("GROUP_BY requires a group-by term"))?;
    let order = spec
        .group_sort_term
        .as_ref()
        .and_then(|t| t.sort_order)
        .unwrap_or(spec.group_sort_order);
    sort_field(term, order, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use crate::schema::{DocumentDescription, DocumentType, PropertyDescription, TypeName};
    use serde_json::json;

    fn table() -> TableDescription {
        let ty = DocumentType::new(
            "Item",
            "Item",
            DocumentDescription::builder()
                .property("name", PropertyDescription::string().case_insensitive())
                .property("count", PropertyDescription::long())
                .build(),
        );
        TableDescription::build("/items", &ty).unwrap()
    }

    #[test]
    fn test_default_self_link_sort() {
        let td = table();
        let spec = QuerySpecification::new(Query::kind("Item")).with_result_limit(5);
        let fields = sort_fields(&spec, &td).unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(order_by_clause(&fields), " ORDER BY documentselflink ASC");

        let unlimited = QuerySpecification::new(Query::kind("Item"));
        assert!(sort_fields(&unlimited, &td).unwrap().is_empty());
    }

    #[test]
    fn test_sort_appends_self_link_with_primary_direction() {
        let td = table();
        let spec = QuerySpecification::new(Query::kind("Item"))
            .with_sort(QueryTerm::sort("count", TypeName::Long), SortOrder::Desc);
        let fields = sort_fields(&spec, &td).unwrap();
        assert_eq!(
            order_by_clause(&fields),
            " ORDER BY json_extract(data, '$.count') DESC, documentselflink DESC"
        );
    }

    #[test]
    fn test_sort_requires_type_and_top_results_limit() {
        let td = table();
        let mut untyped = QuerySpecification::new(Query::kind("Item"));
        untyped.options.insert(QueryOption::Sort);
        untyped.sort_term = Some(QueryTerm::new("count", ""));
        assert!(sort_fields(&untyped, &td).is_err());

        let top = QuerySpecification::new(Query::kind("Item")).with_option(QueryOption::TopResults);
        assert!(sort_fields(&top, &td).is_err());
    }

    #[test]
    fn test_case_insensitive_sort() {
        let field = sort_field(&QueryTerm::sort("name", TypeName::String), SortOrder::Asc, &table()).unwrap();
        assert_eq!(field.expr, "LOWER(json_extract(data, '$.name'))");
        assert!(field.case_insensitive);
    }

    #[test]
    fn test_pagination_tuple() {
        let td = table();
        let spec = QuerySpecification::new(Query::kind("Item"))
            .with_sort(QueryTerm::sort("count", TypeName::Long), SortOrder::Asc);
        let fields = sort_fields(&spec, &td).unwrap();
        let last = json!({"count": 7, "documentSelfLink": "/items/7"});
        assert_eq!(
            pagination_clause(&fields, &last).unwrap(),
            "(json_extract(data, '$.count'), documentselflink) > (7, '/items/7')"
        );

        let only_link = json!({"documentSelfLink": "/items/it's"});
        assert_eq!(
            pagination_clause(&fields, &only_link).unwrap(),
            "((json_extract(data, '$.count') IS NOT NULL) OR \
             (json_extract(data, '$.count') IS NULL AND documentselflink > '/items/it''s'))"
        );
    }

    #[test]
    fn test_pagination_descending_keeps_null_keys() {
        let td = table();
        let spec = QuerySpecification::new(Query::kind("Item"))
            .with_sort(QueryTerm::sort("count", TypeName::Long), SortOrder::Desc);
        let fields = sort_fields(&spec, &td).unwrap();
        let last = json!({"count": 7, "documentSelfLink": "/items/7"});
        assert_eq!(
            pagination_clause(&fields, &last).unwrap(),
            "((json_extract(data, '$.count'), documentselflink) < (7, '/items/7') \
             OR json_extract(data, '$.count') IS NULL)"
        );

        let null_key = json!({"documentSelfLink": "/items/3"});
        assert_eq!(
            pagination_clause(&fields, &null_key).unwrap(),
            "((json_extract(data, '$.count') IS NULL AND documentselflink < '/items/3'))"
        );
    }

    #[test]
    fn test_pagination_mixed_directions() {
        let td = table();
        let mut spec = QuerySpecification::new(Query::kind("Item"))
            .with_sort(QueryTerm::sort("count", TypeName::Long), SortOrder::Desc);
        spec.additional_sort_terms
            .push(QueryTerm::sort("name", TypeName::String).with_sort_order(SortOrder::Asc));
        let fields = sort_fields(&spec, &td).unwrap();
        let last = json!({"count": 3, "name": "Bob", "documentSelfLink": "/items/b"});
        let clause = pagination_clause(&fields, &last).unwrap();
        assert!(clause.starts_with(
            "(((json_extract(data, '$.count') < 3 OR json_extract(data, '$.count') IS NULL)) OR "
        ));
        assert!(clause.contains("LOWER(json_extract(data, '$.name')) > 'bob'"));
        assert!(clause.contains("json_extract(data, '$.count') = 3 AND "));
        assert!(clause.ends_with("documentselflink < '/items/b'))"));
    }
}
