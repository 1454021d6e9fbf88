//! Table and column descriptions derived from a [`DocumentType`].

use crate::document::{
    FIELD_NAME_AUTH_PRINCIPAL_LINK, FIELD_NAME_EXPIRATION_TIME_MICROS, FIELD_NAME_KIND,
    FIELD_NAME_OWNER, FIELD_NAME_SELF_LINK, FIELD_NAME_TRANSACTION_ID, FIELD_NAME_UPDATE_ACTION,
    FIELD_NAME_UPDATE_TIME_MICROS, FIELD_NAME_VERSION, is_builtin_field,
};
use crate::error::{SdxError, SdxResult};
use crate::schema::description::{DocumentType, IndexingOption, PropertyDescription, TypeName};
use crate::sql::escape::escape_sql_string;
use std::collections::BTreeMap;

/// Path segment naming the elements of a collection (`tags.item`).
pub const COLLECTION_ITEM_SUFFIX: &str = "item";
pub const PROPERTY_SEPARATOR: char = '.';
/// Column holding the full JSON document.
pub const DATA_COLUMN: &str = "data";

pub const TABLE_PREFIX: &str = "docs_";
pub const CORE_TABLE_PREFIX: &str = "docs_core_";
const CORE_PATH_PREFIX: &str = "/core";

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Json,
    Blob,
}

impl ColumnType {
    pub fn for_type(type_name: TypeName) -> Self {
        match type_name {
            TypeName::Long | TypeName::Date => ColumnType::Integer,
            TypeName::Double => ColumnType::Real,
            TypeName::Boolean | TypeName::String | TypeName::Enum | TypeName::Uri => {
                ColumnType::Text
            }
            TypeName::Podo | TypeName::Collection | TypeName::Map => ColumnType::Json,
            TypeName::Bytes => ColumnType::Blob,
        }
    }

    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text | ColumnType::Json => "TEXT",
            ColumnType::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    None,
    BTree,
    Hash,
    Gin,
}

/// Built-in fields stored in their own SQL columns.
pub(crate) struct NativeColumn {
    pub field: &'static str,
    pub column: &'static str,
    pub type_name: TypeName,
    pub indexed: bool,
    pub not_null: bool,
}

pub(crate) const NATIVE_COLUMNS: [NativeColumn; 8] = [
    NativeColumn {
        field: FIELD_NAME_SELF_LINK,
        column: "documentselflink",
        type_name: TypeName::String,
        indexed: true,
        not_null: true,
    },
    NativeColumn {
        field: FIELD_NAME_VERSION,
        column: "documentversion",
        type_name: TypeName::Long,
        indexed: false,
        not_null: true,
    },
    NativeColumn {
        field: FIELD_NAME_KIND,
        column: "documentkind",
        type_name: TypeName::String,
        indexed: true,
        not_null: true,
    },
    NativeColumn {
        field: FIELD_NAME_UPDATE_ACTION,
        column: "documentupdateaction",
        type_name: TypeName::String,
        indexed: true,
        not_null: true,
    },
    NativeColumn {
        field: FIELD_NAME_UPDATE_TIME_MICROS,
        column: "documentupdatetimemicros",
        type_name: TypeName::Long,
        indexed: true,
        not_null: true,
    },
    NativeColumn {
        field: FIELD_NAME_EXPIRATION_TIME_MICROS,
        column: "documentexpirationtimemicros",
        type_name: TypeName::Long,
        indexed: true,
        not_null: true,
    },
    NativeColumn {
        field: FIELD_NAME_AUTH_PRINCIPAL_LINK,
        column: "documentauthprincipallink",
        type_name: TypeName::String,
        indexed: false,
        not_null: false,
    },
    NativeColumn {
        field: FIELD_NAME_TRANSACTION_ID,
        column: "documenttransactionid",
        type_name: TypeName::String,
        indexed: false,
        not_null: false,
    },
];

/// Comma separated list of every stored column, `data` first.
pub(crate) fn all_columns_list() -> String {
    let mut cols = vec![DATA_COLUMN];
    cols.extend(NATIVE_COLUMNS.iter().map(|c| c.column));
    cols.join(", ")
}

/// One property path mapped onto a SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDescription {
    pub property_name: String,
    /// Typed SQL expression (native column or `json_extract`)
    pub column_name: String,
    /// Same value as text, for LIKE and string equality
    pub column_name_as_text: String,
    pub column_type: ColumnType,
    pub type_name: TypeName,
    pub index_type: IndexType,
    pub case_insensitive: bool,
    pub text_indexed: bool,
    pub native: bool,
    /// Native columns are -1, otherwise the number of separators in the path
    pub level: i32,
    pub parent: Option<String>,
    pub children: Vec<String>,
}

impl ColumnDescription {
    fn native(native: &NativeColumn) -> Self {
        Self {
            property_name: native.field.to_string(),
            column_name: native.column.to_string(),
            column_name_as_text: native.column.to_string(),
            column_type: ColumnType::for_type(native.type_name),
            type_name: native.type_name,
            index_type: if native.indexed {
                IndexType::BTree
            } else {
                IndexType::None
            },
            case_insensitive: false,
            text_indexed: false,
            native: true,
            level: -1,
            parent: None,
            children: Vec::new(),
        }
    }

    fn json(property_name: &str, description: &PropertyDescription, parent: Option<&str>) -> Self {
        let column_type = ColumnType::for_type(description.type_name);
        let column_name = json_extract_expr(DATA_COLUMN, property_name);
        let column_name_as_text = text_expr(&column_name, column_type);
        let level = property_name.matches(PROPERTY_SEPARATOR).count() as i32;
        let index_type = if level == 0 && !is_builtin_field(property_name) {
            if description.type_name.is_container() {
                if description.has_indexing(IndexingOption::Expand)
                    || description.has_indexing(IndexingOption::Links)
                {
                    IndexType::Gin
                } else {
                    IndexType::None
                }
            } else if description.type_name == TypeName::Bytes {
                IndexType::None
            } else {
                IndexType::BTree
            }
        } else {
            IndexType::None
        };
        Self {
            property_name: property_name.to_string(),
            column_name,
            column_name_as_text,
            column_type,
            type_name: description.type_name,
            index_type,
            // map keys are matched exactly
            case_insensitive: description.has_indexing(IndexingOption::CaseInsensitive)
                && description.type_name != TypeName::Map,
            text_indexed: description.has_indexing(IndexingOption::Text),
            native: false,
            level,
            parent: parent.map(str::to_string),
            children: Vec::new(),
        }
    }

    pub fn is_self_link(&self) -> bool {
        self.property_name == FIELD_NAME_SELF_LINK
    }

    pub fn is_kind(&self) -> bool {
        self.property_name == FIELD_NAME_KIND
    }

    /// Expression an index is built on.
    pub fn index_expr(&self) -> String {
        if self.case_insensitive {
            format!("LOWER({})", self.column_name_as_text)
        } else {
            self.column_name.clone()
        }
    }
}

/// Immutable per-type schema shared by all query and DAO operations.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub table_name: String,
    pub factory_link: String,
    pub document_kind: String,
    pub type_name: String,
    columns: BTreeMap<String, ColumnDescription>,
}

impl TableDescription {
    pub fn build(factory_link: &str, document_type: &DocumentType) -> SdxResult<Self> {
        if !factory_link.starts_with('/') || factory_link.len() < 2 {
            return Err(SdxError::Schema(format!(
                "factory link '{factory_link}' must be an absolute path"
            )));
        }
        if document_type.name.trim().is_empty() {
            return Err(SdxError::Schema(format!(
                "document type for {factory_link} has no name"
            )));
        }
        if document_type.kind.trim().is_empty() {
            return Err(SdxError::Schema(format!(
                "document type {} has no kind",
                document_type.name
            )));
        }

        let mut columns = BTreeMap::new();
        for native in &NATIVE_COLUMNS {
            columns.insert(native.field.to_string(), ColumnDescription::native(native));
        }
        let owner = PropertyDescription::string();
        let mut owner_cd = ColumnDescription::json(FIELD_NAME_OWNER, &owner, None);
        owner_cd.index_type = IndexType::None;
        columns.insert(FIELD_NAME_OWNER.to_string(), owner_cd);

        for (name, description) in &document_type.description.properties {
            if is_builtin_field(name) {
                continue;
            }
            add_property(&mut columns, name, description, None, false)?;
        }

        Ok(Self {
            table_name: derive_table_name(factory_link, document_type),
            factory_link: factory_link.trim_end_matches('/').to_string(),
            document_kind: document_type.kind.clone(),
            type_name: document_type.name.clone(),
            columns,
        })
    }

    pub fn column(&self, property_name: &str) -> Option<&ColumnDescription> {
        self.columns.get(property_name)
    }

    /// Column for a path, falling back to the closest declared ancestor
    /// (`labels.env` resolves to the `labels` map).
    pub fn column_or_parent(&self, property_name: &str) -> Option<&ColumnDescription> {
        let mut path = property_name;
        loop {
            if let Some(cd) = self.columns.get(path) {
                return Some(cd);
            }
            match path.rfind(PROPERTY_SEPARATOR) {
                Some(idx) => path = &path[..idx],
                None => return None,
            }
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnDescription> {
        self.columns.values()
    }

    pub fn factory_link_with_slash(&self) -> String {
        format!("{}/", self.factory_link)
    }
}

fn add_property(
    columns: &mut BTreeMap<String, ColumnDescription>,
    name: &str,
    description: &PropertyDescription,
    parent: Option<&str>,
    inherit_case_insensitive: bool,
) -> SdxResult<()> {
    if name.split(PROPERTY_SEPARATOR).any(str::is_empty) {
        return Err(SdxError::Schema(format!("invalid property path '{name}'")));
    }
    let mut cd = ColumnDescription::json(name, description, parent);
    if inherit_case_insensitive && cd.type_name.is_text() {
        cd.case_insensitive = true;
    }
    let case_insensitive = cd.case_insensitive || inherit_case_insensitive;

    let mut children = Vec::new();
    match description.type_name {
        TypeName::Podo => {
            for (field, field_description) in &description.fields {
                let child = format!("{name}{PROPERTY_SEPARATOR}{field}");
                add_property(columns, &child, field_description, Some(name), false)?;
                children.push(child);
            }
        }
        TypeName::Collection => {
            if let Some(element) = &description.element {
                let mut element = (**element).clone();
                if description.has_indexing(IndexingOption::Text) {
                    element.indexing.insert(IndexingOption::Text);
                }
                let child = format!("{name}{PROPERTY_SEPARATOR}{COLLECTION_ITEM_SUFFIX}");
                add_property(columns, &child, &element, Some(name), case_insensitive)?;
                children.push(child);
            }
        }
        _ => {}
    }
    cd.children = children;
    columns.insert(name.to_string(), cd);
    Ok(())
}

/// Table name for a type: prefix by factory location, then the lowercased
/// type name (or override). A type called `State` borrows its declaring type.
pub fn derive_table_name(factory_link: &str, document_type: &DocumentType) -> String {
    let base = match &document_type.table_name_override {
        Some(name) => name.clone(),
        None if document_type.name.eq_ignore_ascii_case("state") => document_type
            .declaring_type
            .clone()
            .unwrap_or_else(|| document_type.name.clone()),
        None => document_type.name.clone(),
    };
    let prefix = if factory_link == CORE_PATH_PREFIX
        || factory_link.starts_with(&format!("{CORE_PATH_PREFIX}/"))
    {
        CORE_TABLE_PREFIX
    } else {
        TABLE_PREFIX
    };
    let sanitized: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{prefix}{sanitized}")
}

/// SQLite JSON path for a property path; collection item segments are
/// dropped so `tags.item` addresses the array itself.
pub fn json_path(property_name: &str) -> String {
    let mut path = String::from("$");
    for segment in property_name
        .split(PROPERTY_SEPARATOR)
        .filter(|s| *s != COLLECTION_ITEM_SUFFIX)
    {
        path.push('.');
        let simple = !segment.is_empty()
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if simple {
            path.push_str(segment);
        } else {
            path.push('"');
            path.push_str(&segment.replace('"', "\\\""));
            path.push('"');
        }
    }
    path
}

/// `json_extract(<source>, '<path>')` for a property path.
pub fn json_extract_expr(source: &str, property_name: &str) -> String {
    format!(
        "json_extract({source}, '{}')",
        escape_sql_string(&json_path(property_name))
    )
}

fn text_expr(expr: &str, column_type: ColumnType) -> String {
    match column_type {
        ColumnType::Text | ColumnType::Json => expr.to_string(),
        _ => format!("CAST({expr} AS TEXT)"),
    }
}

/// Text projection of an arbitrary typed expression.
pub(crate) fn text_expr_for(expr: &str, type_name: TypeName) -> String {
    text_expr(expr, ColumnType::for_type(type_name))
}
