//! In-memory term matching.
//!
//! Mirrors the SQL the converter emits: typed equality per declared column
//! type, ASCII case folding through `LOWER`, and LIKE over the text form
//! SQLite would produce for the JSON value.

use crate::query::types::{DoubleBounds, LongBounds, MatchType, NumericRange, QueryTerm};
use crate::schema::table::{COLLECTION_ITEM_SUFFIX, PROPERTY_SEPARATOR};
use crate::schema::{TableDescription, TypeName};
use serde_json::Value;

/// Column semantics a term is evaluated (and emitted) with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TermSemantics {
    pub type_name: TypeName,
    pub case_insensitive: bool,
    pub text_indexed: bool,
}

impl TermSemantics {
    pub(crate) fn resolve(term: &QueryTerm, table: Option<&TableDescription>) -> Self {
        match table.and_then(|t| t.column_or_parent(&term.property_name)) {
            Some(cd) if cd.property_name == term.property_name => Self {
                type_name: cd.type_name,
                case_insensitive: cd.case_insensitive,
                text_indexed: cd.text_indexed,
            },
            // dynamic keys below a map or undeclared paths compare as strings
            Some(cd) => Self {
                type_name: TypeName::String,
                case_insensitive: false,
                text_indexed: cd.text_indexed,
            },
            None => Self {
                type_name: TypeName::String,
                case_insensitive: false,
                text_indexed: false,
            },
        }
    }
}

pub(crate) fn is_collection_path(property_name: &str) -> bool {
    property_name
        .split(PROPERTY_SEPARATOR)
        .any(|s| s == COLLECTION_ITEM_SUFFIX)
}

pub(crate) fn term_matches(
    term: &QueryTerm,
    document: &Value,
    table: Option<&TableDescription>,
) -> bool {
    let semantics = TermSemantics::resolve(term, table);

    if let Some(range) = &term.range {
        return range_matches(range, &resolve(document, &term.property_name));
    }
    let Some(value) = term.match_value.as_deref() else {
        return false;
    };

    if term.match_type == MatchType::Phrase {
        let tokens = phrase_tokens(value);
        if tokens.is_empty() {
            return true;
        }
        return resolve(document, &term.property_name).iter().any(|v| {
            text_form(v).is_some_and(|text| tokens.iter().all(|tok| text.contains(tok)))
        });
    }

    let values = resolve(document, &term.property_name);
    if term.match_type == MatchType::Term && value == "*" {
        return if is_collection_path(&term.property_name) {
            collection_len(document, &term.property_name) > 0
        } else {
            values.iter().any(|v| !v.is_null())
        };
    }

    let fold = |s: &str| {
        if semantics.case_insensitive {
            s.to_ascii_lowercase()
        } else {
            s.to_string()
        }
    };
    let needle = fold(value);
    values.iter().any(|v| match term.match_type {
        MatchType::Term if semantics.text_indexed => {
            text_form(v).is_some_and(|t| fold(&t).contains(&needle))
        }
        MatchType::Term => scalar_equals(v, value, semantics),
        MatchType::Prefix => text_form(v).is_some_and(|t| fold(&t).starts_with(&needle)),
        MatchType::Wildcard => text_form(v).is_some_and(|t| glob_matches(&needle, &fold(&t))),
        MatchType::Phrase => false,
    })
}

/// Values addressed by a property path; `item` segments fan out over arrays.
pub(crate) fn resolve<'a>(document: &'a Value, property_name: &str) -> Vec<&'a Value> {
    let mut current = vec![document];
    for segment in property_name.split(PROPERTY_SEPARATOR) {
        let mut next = Vec::new();
        for value in current {
            if segment == COLLECTION_ITEM_SUFFIX {
                if let Value::Array(items) = value {
                    next.extend(items.iter());
                    continue;
                }
            }
            if let Some(child) = value.get(segment) {
                next.push(child);
            }
        }
        current = next;
    }
    current
}

fn collection_len(document: &Value, property_name: &str) -> usize {
    let array_path = property_name
        .split(PROPERTY_SEPARATOR)
        .take_while(|s| *s != COLLECTION_ITEM_SUFFIX)
        .collect::<Vec<_>>()
        .join(".");
    resolve(document, &array_path)
        .first()
        .and_then(|v| v.as_array())
        .map_or(0, Vec::len)
}

/// Text SQLite produces for a JSON value extracted and cast to TEXT.
pub(crate) fn text_form(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.1}"),
            _ => n.to_string(),
        }),
        other => serde_json::to_string(other).ok(),
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn scalar_equals(value: &Value, literal: &str, semantics: TermSemantics) -> bool {
    if value.is_null() {
        return false;
    }
    if semantics.case_insensitive {
        return text_form(value)
            .is_some_and(|t| t.to_ascii_lowercase() == literal.to_ascii_lowercase());
    }
    let text_equal = || text_form(value).is_some_and(|t| t == literal);
    match semantics.type_name {
        TypeName::Long | TypeName::Date => match literal.parse::<i64>() {
            Ok(n) => match value {
                Value::Number(num) => match num.as_i64() {
                    Some(i) => i == n,
                    None => num.as_f64() == Some(n as f64),
                },
                Value::Bool(_) => numeric_value(value) == Some(n as f64),
                _ => false,
            },
            Err(_) => text_equal(),
        },
        TypeName::Double => match literal.parse::<f64>() {
            Ok(f) if f.is_finite() => numeric_value(value) == Some(f),
            _ => text_equal(),
        },
        TypeName::Boolean => match literal {
            "true" => numeric_value(value) == Some(1.0),
            "false" => numeric_value(value) == Some(0.0),
            _ => text_equal(),
        },
        _ => value.as_str() == Some(literal),
    }
}

fn range_matches(range: &NumericRange, values: &[&Value]) -> bool {
    if range.is_floating() {
        match range.double_bounds() {
            DoubleBounds::Unbounded => true,
            DoubleBounds::Equal(target) => values
                .iter()
                .any(|v| numeric_value(v).is_some_and(|f| f == target)),
            DoubleBounds::Range { min, max } => values.iter().any(|v| {
                numeric_value(v).is_some_and(|f| {
                    let above = min.is_none_or(|b| if b.inclusive { f >= b.value } else { f > b.value });
                    let below = max.is_none_or(|b| if b.inclusive { f <= b.value } else { f < b.value });
                    above && below
                })
            }),
        }
    } else {
        match range.long_bounds() {
            Err(_) => false,
            Ok(LongBounds::Unbounded) => true,
            Ok(LongBounds::Equal(target)) => values.iter().any(|v| long_cmp(v, target, target)),
            Ok(LongBounds::Between(lo, hi)) => values.iter().any(|v| long_cmp(v, lo, hi)),
        }
    }
}

fn long_cmp(value: &Value, lo: i64, hi: i64) -> bool {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => lo <= i && i <= hi,
            None => n.as_f64().is_some_and(|f| lo as f64 <= f && f <= hi as f64),
        },
        Value::Bool(_) => numeric_value(value).is_some_and(|f| lo as f64 <= f && f <= hi as f64),
        _ => false,
    }
}

/// Word tokens of a phrase (`\W` split, empties dropped).
pub(crate) fn phrase_tokens(value: &str) -> Vec<&str> {
    value
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .collect()
}

/// `*` matches any run, `?` exactly one character.
pub(crate) fn glob_matches(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) && p[pi] != '*' {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|c| *c == '*')
}
