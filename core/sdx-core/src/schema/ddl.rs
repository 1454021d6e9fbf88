//! DDL for document tables.

use crate::document::FIELD_NAME_SELF_LINK;
use crate::schema::table::{ColumnType, DATA_COLUMN, IndexType, NATIVE_COLUMNS, TableDescription};

/// `CREATE TABLE` followed by one `CREATE INDEX` per indexed column.
///
/// gin indexes have no SQLite counterpart and are returned separately so the
/// caller can report them.
pub fn create_table_statements(td: &TableDescription) -> (Vec<String>, Vec<String>) {
    let mut columns: Vec<String> = NATIVE_COLUMNS
        .iter()
        .map(|native| {
            let mut def = format!(
                "{} {}",
                native.column,
                ColumnType::for_type(native.type_name).sql_type()
            );
            if native.field == FIELD_NAME_SELF_LINK {
                def.push_str(" PRIMARY KEY");
            }
            if native.not_null {
                def.push_str(" NOT NULL");
            }
            if native.column == "documentexpirationtimemicros" {
                def.push_str(" DEFAULT 0");
            }
            def
        })
        .collect();
    columns.push(format!("{DATA_COLUMN} TEXT NOT NULL"));

    let mut statements = vec![format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        td.table_name,
        columns.join(", ")
    )];
    let mut skipped = Vec::new();

    for cd in td.columns() {
        match cd.index_type {
            IndexType::None => {}
            // primary key already covers it
            _ if cd.is_self_link() => {}
            IndexType::Gin => skipped.push(cd.property_name.clone()),
            IndexType::BTree | IndexType::Hash => {
                statements.push(format!(
                    "CREATE INDEX IF NOT EXISTS {}_{} ON {} ({})",
                    td.table_name,
                    index_suffix(&cd.property_name),
                    td.table_name,
                    cd.index_expr()
                ));
            }
        }
    }
    (statements, skipped)
}

fn index_suffix(property_name: &str) -> String {
    property_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
