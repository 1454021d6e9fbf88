//! Statically declared document descriptions.
//!
//! A [`DocumentDescription`] is the property tree of one document type,
//! built once at startup through [`DocumentDescriptionBuilder`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Declared value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TypeName {
    Long,
    Double,
    Boolean,
    String,
    Enum,
    Uri,
    Date,
    Bytes,
    /// Plain nested object with declared fields
    Podo,
    Collection,
    Map,
}

impl TypeName {
    /// Sorted and compared as numbers rather than text.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeName::Long | TypeName::Double | TypeName::Date | TypeName::Boolean
        )
    }

    pub fn is_container(&self) -> bool {
        matches!(self, TypeName::Podo | TypeName::Collection | TypeName::Map)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, TypeName::String | TypeName::Enum | TypeName::Uri)
    }
}

/// Indexing hints attached to a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexingOption {
    CaseInsensitive,
    /// Full-text style substring matching
    Text,
    Expand,
    Links,
    Sort,
    ExcludeFromSignature,
}

/// Description of one property, recursively describing nested structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescription {
    pub type_name: TypeName,
    #[serde(default)]
    pub indexing: BTreeSet<IndexingOption>,
    /// Declared fields of a PODO
    #[serde(default)]
    pub fields: BTreeMap<String, PropertyDescription>,
    /// Element (COLLECTION) or value (MAP) description
    #[serde(default)]
    pub element: Option<Box<PropertyDescription>>,
}

impl PropertyDescription {
    pub fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            indexing: BTreeSet::new(),
            fields: BTreeMap::new(),
            element: None,
        }
    }

    pub fn long() -> Self {
        Self::new(TypeName::Long)
    }

    pub fn double() -> Self {
        Self::new(TypeName::Double)
    }

    pub fn boolean() -> Self {
        Self::new(TypeName::Boolean)
    }

    pub fn string() -> Self {
        Self::new(TypeName::String)
    }

    pub fn uri() -> Self {
        Self::new(TypeName::Uri)
    }

    pub fn date() -> Self {
        Self::new(TypeName::Date)
    }

    pub fn podo() -> Self {
        Self::new(TypeName::Podo)
    }

    pub fn collection(element: PropertyDescription) -> Self {
        Self {
            element: Some(Box::new(element)),
            ..Self::new(TypeName::Collection)
        }
    }

    pub fn map(value: PropertyDescription) -> Self {
        Self {
            element: Some(Box::new(value)),
            ..Self::new(TypeName::Map)
        }
    }

    pub fn with_indexing(mut self, option: IndexingOption) -> Self {
        self.indexing.insert(option);
        self
    }

    pub fn case_insensitive(self) -> Self {
        self.with_indexing(IndexingOption::CaseInsensitive)
    }

    /// Add a declared field to a PODO description.
    pub fn field(mut self, name: impl Into<String>, description: PropertyDescription) -> Self {
        self.fields.insert(name.into(), description);
        self
    }

    pub fn has_indexing(&self, option: IndexingOption) -> bool {
        self.indexing.contains(&option)
    }
}

/// Property tree of one document type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDescription {
    pub properties: BTreeMap<String, PropertyDescription>,
}

impl DocumentDescription {
    pub fn builder() -> DocumentDescriptionBuilder {
        DocumentDescriptionBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct DocumentDescriptionBuilder {
    properties: BTreeMap<String, PropertyDescription>,
}

impl DocumentDescriptionBuilder {
    pub fn property(mut self, name: impl Into<String>, description: PropertyDescription) -> Self {
        self.properties.insert(name.into(), description);
        self
    }

    pub fn build(self) -> DocumentDescription {
        DocumentDescription {
            properties: self.properties,
        }
    }
}

/// Metadata the registry needs besides the property tree.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentType {
    /// Simple type name, e.g. `ExampleState`
    pub name: String,
    /// Kind tag stored in `documentKind`
    pub kind: String,
    /// Enclosing type, used when the state type is just called `State`
    pub declaring_type: Option<String>,
    pub table_name_override: Option<String>,
    pub description: DocumentDescription,
}

impl DocumentType {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        description: DocumentDescription,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            declaring_type: None,
            table_name_override: None,
            description,
        }
    }

    pub fn with_declaring_type(mut self, declaring: impl Into<String>) -> Self {
        self.declaring_type = Some(declaring.into());
        self
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name_override = Some(table_name.into());
        self
    }
}
