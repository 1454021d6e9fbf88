//! Cluster membership seam: owner selection and broadcasts.

use crate::document::ServiceDocument;
use crate::error::SdxResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Node selector used for index duties.
pub const DEFAULT_NODE_SELECTOR: &str = "/core/node-selectors/default";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOwnerResponse {
    pub key: String,
    pub owner_node_id: String,
    pub is_local_owner: bool,
    pub available_node_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastRequest {
    /// Ask every node who owns `key`
    SelectOwner { key: String },
    /// Best-effort delete of the service owning an expired document
    DeleteDocument {
        self_link: String,
        document: ServiceDocument,
    },
}

/// Per-node outcome of a broadcast, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastResult {
    pub json_responses: BTreeMap<String, Value>,
    pub failures: BTreeMap<String, String>,
}

pub trait ClusterMembership: Send + Sync {
    fn local_node_id(&self) -> &str;

    fn select_owner(&self, selector: &str, key: &str) -> SdxResult<SelectOwnerResponse>;

    fn broadcast(&self, selector: &str, request: BroadcastRequest) -> SdxResult<BroadcastResult>;
}

/// Single-node membership: the local node owns every key.
#[derive(Debug, Clone)]
pub struct LocalCluster {
    node_id: String,
}

impl LocalCluster {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
        }
    }
}

impl Default for LocalCluster {
    fn default() -> Self {
        Self::new("local")
    }
}

impl ClusterMembership for LocalCluster {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    fn select_owner(&self, _selector: &str, key: &str) -> SdxResult<SelectOwnerResponse> {
        Ok(SelectOwnerResponse {
            key: key.to_string(),
            owner_node_id: self.node_id.clone(),
            is_local_owner: true,
            available_node_count: 1,
        })
    }

    fn broadcast(&self, selector: &str, request: BroadcastRequest) -> SdxResult<BroadcastResult> {
        let response = match request {
            BroadcastRequest::SelectOwner { key } => {
                serde_json::to_value(self.select_owner(selector, &key)?)?
            }
            BroadcastRequest::DeleteDocument { .. } => Value::Null,
        };
        let mut result = BroadcastResult::default();
        result.json_responses.insert(self.node_id.clone(), response);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_cluster_owns_everything() {
        let cluster = LocalCluster::new("n1");
        let owner = cluster.select_owner(DEFAULT_NODE_SELECTOR, "/any").unwrap();
        assert!(owner.is_local_owner);
        assert_eq!(owner.available_node_count, 1);

        let result = cluster
            .broadcast(DEFAULT_NODE_SELECTOR, BroadcastRequest::SelectOwner { key: "k".into() })
            .unwrap();
        let parsed: SelectOwnerResponse =
            serde_json::from_value(result.json_responses["n1"].clone()).unwrap();
        assert_eq!(parsed.owner_node_id, "n1");
        assert!(result.failures.is_empty());
    }
}
