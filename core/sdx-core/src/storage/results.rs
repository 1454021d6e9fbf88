//! Shaping fetched rows into a [`QueryResult`].

use crate::document::{BUILTIN_FIELDS, FIELD_NAME_SELF_LINK};
use crate::query::eval::resolve;
use crate::query::types::{QueryOption, QueryResult, QuerySpecification};
use crate::schema::table::{COLLECTION_ITEM_SUFFIX, PROPERTY_SEPARATOR};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Self-link of a stored document body.
pub(crate) fn self_link_of(document: &Value) -> Option<&str> {
    document.get(FIELD_NAME_SELF_LINK).and_then(Value::as_str)
}

/// Append `documents` to `result` according to the expand and link options.
pub(crate) fn process_documents(
    spec: &QuerySpecification,
    documents: Vec<Value>,
    result: &mut QueryResult,
) {
    for document in documents {
        let Some(link) = self_link_of(&document).map(str::to_string) else {
            continue;
        };
        if spec.has_option(QueryOption::SelectLinks) {
            let links = selected_links(spec, &document);
            if !links.is_empty() {
                result
                    .selected_links
                    .get_or_insert_with(BTreeSet::new)
                    .extend(links.values().cloned());
                result
                    .selected_links_per_document
                    .get_or_insert_with(BTreeMap::new)
                    .insert(link.clone(), links);
            }
        }
        if let Some(body) = expanded(spec, document) {
            result
                .documents
                .get_or_insert_with(BTreeMap::new)
                .insert(link.clone(), body);
        }
        result.document_links.push(link);
    }
    result.document_count = result.document_links.len() as u64;
}

fn expanded(spec: &QuerySpecification, document: Value) -> Option<Value> {
    if spec.has_option(QueryOption::ExpandContent) {
        return Some(document);
    }
    let builtin_only = spec.has_option(QueryOption::ExpandBuiltinContentOnly);
    let selected = spec.has_option(QueryOption::ExpandSelectedFields);
    if !builtin_only && !selected {
        return None;
    }
    let Value::Object(source) = document else {
        return None;
    };
    let mut body = Map::new();
    for field in BUILTIN_FIELDS {
        if let Some(v) = source.get(field) {
            body.insert(field.to_string(), v.clone());
        }
    }
    if selected {
        for term in &spec.select_terms {
            let top = term
                .property_name
                .split(PROPERTY_SEPARATOR)
                .next()
                .unwrap_or_default();
            if let Some(v) = source.get(top) {
                body.insert(top.to_string(), v.clone());
            }
        }
    }
    Some(Value::Object(body))
}

/// Links named by the link terms: `prop` for a string, `prop.item.<i>`
/// for the string elements of an array.
fn selected_links(spec: &QuerySpecification, document: &Value) -> BTreeMap<String, String> {
    let mut links = BTreeMap::new();
    for term in &spec.link_terms {
        for value in resolve(document, &term.property_name) {
            match value {
                Value::String(s) => {
                    links.insert(term.property_name.clone(), s.clone());
                }
                Value::Array(items) => {
                    for (i, item) in items.iter().enumerate() {
                        if let Some(s) = item.as_str() {
                            links.insert(
                                format!(
                                    "{}{PROPERTY_SEPARATOR}{COLLECTION_ITEM_SUFFIX}{PROPERTY_SEPARATOR}{i}",
                                    term.property_name
                                ),
                                s.to_string(),
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
    links
}
