//! Service documents and their built-in fields.

use crate::error::{SdxError, SdxResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub const FIELD_NAME_SELF_LINK: &str = "documentSelfLink";
pub const FIELD_NAME_VERSION: &str = "documentVersion";
pub const FIELD_NAME_KIND: &str = "documentKind";
pub const FIELD_NAME_UPDATE_ACTION: &str = "documentUpdateAction";
pub const FIELD_NAME_UPDATE_TIME_MICROS: &str = "documentUpdateTimeMicros";
pub const FIELD_NAME_EXPIRATION_TIME_MICROS: &str = "documentExpirationTimeMicros";
pub const FIELD_NAME_OWNER: &str = "documentOwner";
pub const FIELD_NAME_AUTH_PRINCIPAL_LINK: &str = "documentAuthPrincipalLink";
pub const FIELD_NAME_TRANSACTION_ID: &str = "documentTransactionId";

/// Built-in fields present on every document, in column order.
pub const BUILTIN_FIELDS: [&str; 9] = [
    FIELD_NAME_SELF_LINK,
    FIELD_NAME_VERSION,
    FIELD_NAME_KIND,
    FIELD_NAME_UPDATE_ACTION,
    FIELD_NAME_UPDATE_TIME_MICROS,
    FIELD_NAME_EXPIRATION_TIME_MICROS,
    FIELD_NAME_OWNER,
    FIELD_NAME_AUTH_PRINCIPAL_LINK,
    FIELD_NAME_TRANSACTION_ID,
];

pub fn is_builtin_field(name: &str) -> bool {
    BUILTIN_FIELDS.contains(&name)
}

/// Operation verb, also recorded as a document's update action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "GET",
            Action::Post => "POST",
            Action::Patch => "PATCH",
            Action::Put => "PUT",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A versioned document identified by its self-link.
///
/// Built-in fields are typed; the type-specific payload is kept as a JSON
/// object flattened next to them, which is exactly what the `data` column
/// stores.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServiceDocument {
    #[serde(rename = "documentSelfLink", default)]
    pub self_link: String,
    #[serde(rename = "documentVersion", default)]
    pub version: i64,
    #[serde(rename = "documentKind", default)]
    pub kind: String,
    #[serde(
        rename = "documentUpdateAction",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub update_action: Option<Action>,
    #[serde(rename = "documentUpdateTimeMicros", default)]
    pub update_time_micros: i64,
    #[serde(rename = "documentExpirationTimeMicros", default)]
    pub expiration_time_micros: i64,
    #[serde(rename = "documentOwner", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(
        rename = "documentAuthPrincipalLink",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_principal_link: Option<String>,
    #[serde(
        rename = "documentTransactionId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub content: Map<String, Value>,
}

impl ServiceDocument {
    pub fn new(self_link: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            self_link: self_link.into(),
            kind: kind.into(),
            update_action: Some(Action::Post),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(name.into(), value.into());
        self
    }

    pub fn with_expiration(mut self, expiration_time_micros: i64) -> Self {
        self.expiration_time_micros = expiration_time_micros;
        self
    }

    pub fn with_update_action(mut self, action: Action) -> Self {
        self.update_action = Some(action);
        self
    }

    /// Expired documents have a non-zero expiration at or before `now_micros`.
    pub fn is_expired(&self, now_micros: i64) -> bool {
        self.expiration_time_micros != 0 && self.expiration_time_micros <= now_micros
    }

    pub fn is_deleted(&self) -> bool {
        self.update_action == Some(Action::Delete)
    }

    /// Copy marked as deleted, used to notify continuous queries.
    pub fn clone_as_deleted(&self) -> Self {
        let mut copy = self.clone();
        copy.update_action = Some(Action::Delete);
        copy
    }

    /// Fails when a field every stored row needs is missing.
    pub fn validate_for_index(&self) -> SdxResult<()> {
        if self.self_link.is_empty() {
            return Err(SdxError::validation("documentSelfLink is required"));
        }
        if self.kind.is_empty() {
            return Err(SdxError::validation(format!(
                "documentKind is required for {}",
                self.self_link
            )));
        }
        if self.update_action.is_none() {
            return Err(SdxError::validation(format!(
                "documentUpdateAction is required for {}",
                self.self_link
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> SdxResult<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_json_string(&self) -> SdxResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json_str(raw: &str) -> SdxResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Current wall clock in microseconds since the epoch.
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Parent of a hierarchical link: `/a/b/c` -> `/a/b`.
pub fn parent_path(link: &str) -> Option<&str> {
    let trimmed = link.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) | None => None,
        Some(idx) => Some(&trimmed[..idx]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serialized_shape() {
        let doc = ServiceDocument::new("/examples/a", "Example")
            .with_version(3)
            .with_field("name", "alpha");
        let value = doc.to_json().unwrap();
        assert_eq!(value["documentSelfLink"], json!("/examples/a"));
        assert_eq!(value["documentVersion"], json!(3));
        assert_eq!(value["documentUpdateAction"], json!("POST"));
        assert_eq!(value["name"], json!("alpha"));
        assert!(value.get("documentOwner").is_none());
    }

    #[test]
    fn test_json_round_trip_keeps_payload() {
        let raw = r#"{"documentSelfLink":"/x/1","documentKind":"K","documentVersion":1,
            "documentUpdateAction":"PATCH","tags":["a","b"],"count":7}"#;
        let doc = ServiceDocument::from_json_str(raw).unwrap();
        assert_eq!(doc.update_action, Some(Action::Patch));
        assert_eq!(doc.content["tags"], json!(["a", "b"]));
        assert_eq!(doc.content["count"], json!(7));
    }

    #[test]
    fn test_expiration() {
        let doc = ServiceDocument::new("/x/1", "K");
        assert!(!doc.is_expired(i64::MAX));
        let doc = doc.with_expiration(100);
        assert!(doc.is_expired(100));
        assert!(!doc.is_expired(99));
    }

    #[test]
    fn test_validate_for_index() {
        assert!(ServiceDocument::new("/x/1", "K").validate_for_index().is_ok());
        assert!(ServiceDocument::new("", "K").validate_for_index().is_err());
        assert!(ServiceDocument::new("/x/1", "").validate_for_index().is_err());
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/core/examples/a"), Some("/core/examples"));
        assert_eq!(parent_path("/examples/a"), Some("/examples"));
        assert_eq!(parent_path("/examples"), None);
        assert_eq!(parent_path("/examples/a/"), Some("/examples"));
    }
}
