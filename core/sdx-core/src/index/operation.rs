//! Operations delivered to the index by the framework dispatcher.

use crate::auth::{AuthorizationContext, GUEST_USER_LINK, SYSTEM_USER_LINK};
use crate::document::{Action, ServiceDocument};
use crate::error::SdxResult;
use crate::query::{QueryResult, QueryTask};
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

/// Invoked exactly once with the outcome of an operation.
pub type Completion = Box<dyn FnOnce(SdxResult<OperationResponse>) + Send>;

#[derive(Debug, Clone)]
pub enum OperationBody {
    Empty,
    /// Index a document version (POST) or its deletion (DELETE)
    UpdateIndex {
        document: ServiceDocument,
        force_index_update: bool,
    },
    QueryTask(Box<QueryTask>),
    /// Periodic expiration tick
    Maintenance,
    /// Latest version of a document, or the children of a factory when
    /// `link` ends with `/*`
    Get { link: String, expand: bool },
    /// Next fetch of a page service
    QueryPage {
        page_link: String,
        result_limit: Option<usize>,
    },
}

#[derive(Debug, Clone)]
pub enum OperationResponse {
    Empty,
    Document(Option<ServiceDocument>),
    Documents(QueryResult),
    QueryTask(Box<QueryTask>),
}

impl OperationResponse {
    pub fn into_query_task(self) -> Option<QueryTask> {
        match self {
            OperationResponse::QueryTask(task) => Some(*task),
            _ => None,
        }
    }
}

pub struct Operation {
    pub action: Action,
    pub body: OperationBody,
    pub auth: Option<Arc<dyn AuthorizationContext>>,
    /// Arrived from another node
    pub remote: bool,
    /// Deadline in epoch micros; 0 never expires
    pub expiration_micros: i64,
    completion: Option<Completion>,
}

impl Operation {
    pub fn new(action: Action, body: OperationBody) -> Self {
        Self {
            action,
            body,
            auth: None,
            remote: false,
            expiration_micros: 0,
            completion: None,
        }
    }

    pub fn with_auth(self, auth: impl AuthorizationContext + 'static) -> Self {
        self.with_auth_arc(Some(Arc::new(auth)))
    }

    pub fn with_auth_arc(mut self, auth: Option<Arc<dyn AuthorizationContext>>) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = remote;
        self
    }

    pub fn with_expiration(mut self, expiration_micros: i64) -> Self {
        self.expiration_micros = expiration_micros;
        self
    }

    pub fn with_completion<F>(mut self, completion: F) -> Self
    where
        F: FnOnce(SdxResult<OperationResponse>) + Send + 'static,
    {
        self.completion = Some(Box::new(completion));
        self
    }

    /// Route the completion into a channel, for callers that block on the
    /// result.
    pub fn channel(self) -> (Self, Receiver<SdxResult<OperationResponse>>) {
        let (tx, rx) = mpsc::channel();
        let op = self.with_completion(move |result| {
            // receiver gone means nobody waits
            let _ = tx.send(result);
        });
        (op, rx)
    }

    pub fn is_expired(&self, now_micros: i64) -> bool {
        self.expiration_micros > 0 && self.expiration_micros <= now_micros
    }

    /// Fairness key of the operation's caller.
    pub fn subject(&self, authorization_enabled: bool) -> String {
        match &self.auth {
            Some(auth) if auth.is_system_user() => SYSTEM_USER_LINK.to_string(),
            Some(auth) if authorization_enabled => auth.subject_id().to_string(),
            _ => GUEST_USER_LINK.to_string(),
        }
    }

    pub fn complete(mut self, result: SdxResult<OperationResponse>) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("action", &self.action)
            .field("body", &self.body)
            .field("subject", &self.auth.as_ref().map(|a| a.subject_id().to_string()))
            .field("remote", &self.remote)
            .field("expiration_micros", &self.expiration_micros)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{SubjectAuthContext, SystemAuthContext};
    use crate::error::SdxError;

    #[test]
    fn test_subject_fallbacks() {
        let op = Operation::new(Action::Get, OperationBody::Empty);
        assert_eq!(op.subject(true), GUEST_USER_LINK);

        let op = op.with_auth(SubjectAuthContext::new("/users/a", None));
        assert_eq!(op.subject(true), "/users/a");
        assert_eq!(op.subject(false), GUEST_USER_LINK);

        let op = op.with_auth(SystemAuthContext);
        assert_eq!(op.subject(true), SYSTEM_USER_LINK);
    }

    #[test]
    fn test_channel_completion() {
        let (op, rx) = Operation::new(Action::Get, OperationBody::Empty).channel();
        op.complete(Err(SdxError::Rejected("full".into())));
        assert!(matches!(rx.recv().unwrap(), Err(SdxError::Rejected(_))));
    }

    #[test]
    fn test_expiration() {
        let op = Operation::new(Action::Get, OperationBody::Empty);
        assert!(!op.is_expired(i64::MAX));
        assert!(op.with_expiration(10).is_expired(10));
    }
}
