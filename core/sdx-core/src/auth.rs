//! Authorization seam consumed by queries and queue fairness.

use crate::document::Action;
use crate::query::Query;

pub const SYSTEM_USER_LINK: &str = "/core/authz/system-user";
pub const GUEST_USER_LINK: &str = "/core/authz/guest-user";

/// Caller identity attached to an operation.
pub trait AuthorizationContext: Send + Sync {
    /// The trusted system identity bypasses resource scoping.
    fn is_system_user(&self) -> bool;

    fn subject_id(&self) -> &str;

    /// Query describing the documents the caller may see for `action`;
    /// `None` grants nothing.
    fn resource_query(&self, action: Action) -> Option<Query>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAuthContext;

impl AuthorizationContext for SystemAuthContext {
    fn is_system_user(&self) -> bool {
        true
    }

    fn subject_id(&self) -> &str {
        SYSTEM_USER_LINK
    }

    fn resource_query(&self, _action: Action) -> Option<Query> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GuestAuthContext;

impl AuthorizationContext for GuestAuthContext {
    fn is_system_user(&self) -> bool {
        false
    }

    fn subject_id(&self) -> &str {
        GUEST_USER_LINK
    }

    fn resource_query(&self, _action: Action) -> Option<Query> {
        None
    }
}

/// An authenticated subject with a fixed resource query.
#[derive(Debug, Clone)]
pub struct SubjectAuthContext {
    pub subject: String,
    pub resource_query: Option<Query>,
}

impl SubjectAuthContext {
    pub fn new(subject: impl Into<String>, resource_query: Option<Query>) -> Self {
        Self {
            subject: subject.into(),
            resource_query,
        }
    }
}

impl AuthorizationContext for SubjectAuthContext {
    fn is_system_user(&self) -> bool {
        false
    }

    fn subject_id(&self) -> &str {
        &self.subject
    }

    fn resource_query(&self, _action: Action) -> Option<Query> {
        self.resource_query.clone()
    }
}
