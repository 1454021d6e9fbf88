//! 통합 테스트 공통 헬퍼
#![allow(dead_code)]

use parking_lot::Mutex;
use sdx_core::cluster::{
    BroadcastRequest, BroadcastResult, ClusterMembership, SelectOwnerResponse,
};
use sdx_core::index::{DocumentIndexService, NoopNotifier, QueryNotification, TaskNotifier};
use sdx_core::schema::{DocumentDescription, DocumentType, PropertyDescription, SchemaRegistry};
use sdx_core::{IndexConfig, SdxResult, ServiceDocument};
use serde_json::Value;
use std::sync::Arc;

pub const ITEMS: &str = "/items";

pub fn small_config() -> IndexConfig {
    let mut config = IndexConfig::default();
    config.query_thread_count = 2;
    config.update_thread_count = 2;
    config
}

pub fn item_type() -> DocumentType {
    DocumentType::new(
        "ItemState",
        "Item",
        DocumentDescription::builder()
            .property("name", PropertyDescription::string().case_insensitive())
            .property("code", PropertyDescription::string())
            .property("count", PropertyDescription::long())
            .property("score", PropertyDescription::double())
            .property("flag", PropertyDescription::boolean())
            .property("color", PropertyDescription::string())
            .property("tags", PropertyDescription::collection(PropertyDescription::string()))
            .build(),
    )
}

pub fn item(id: u32) -> ServiceDocument {
    ServiceDocument::new(format!("{ITEMS}/{id}"), "Item").with_version(1)
}

pub fn service_with(
    config: IndexConfig,
    cluster: Arc<dyn ClusterMembership>,
    notifier: Arc<dyn TaskNotifier>,
) -> SdxResult<DocumentIndexService> {
    let index = DocumentIndexService::new(config, Arc::new(SchemaRegistry::new()), cluster, notifier)?;
    index.register_document_type(ITEMS, &item_type())?;
    Ok(index)
}

pub fn service() -> SdxResult<DocumentIndexService> {
    service_with(
        small_config(),
        Arc::new(sdx_core::cluster::LocalCluster::default()),
        Arc::new(NoopNotifier),
    )
}

/// Membership whose answers are fixed by the test; records broadcasts.
pub struct RecordingCluster {
    pub node_id: String,
    pub owner_node_id: String,
    pub available_node_count: usize,
    pub peer_owner_node_id: String,
    pub broadcasts: Mutex<Vec<BroadcastRequest>>,
}

impl RecordingCluster {
    pub fn single(node_id: &str) -> Self {
        Self {
            node_id: node_id.to_string(),
            owner_node_id: node_id.to_string(),
            available_node_count: 1,
            peer_owner_node_id: node_id.to_string(),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn deletes(&self) -> Vec<String> {
        self.broadcasts
            .lock()
            .iter()
            .filter_map(|b| match b {
                BroadcastRequest::DeleteDocument { self_link, .. } => Some(self_link.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ClusterMembership for RecordingCluster {
    fn local_node_id(&self) -> &str {
        &self.node_id
    }

    fn select_owner(&self, _selector: &str, key: &str) -> SdxResult<SelectOwnerResponse> {
        Ok(SelectOwnerResponse {
            key: key.to_string(),
            owner_node_id: self.owner_node_id.clone(),
            is_local_owner: self.owner_node_id == self.node_id,
            available_node_count: self.available_node_count,
        })
    }

    fn broadcast(&self, _selector: &str, request: BroadcastRequest) -> SdxResult<BroadcastResult> {
        let mut result = BroadcastResult::default();
        if let BroadcastRequest::SelectOwner { key } = &request {
            for i in 0..self.available_node_count {
                let response = SelectOwnerResponse {
                    key: key.clone(),
                    owner_node_id: if i == 0 {
                        self.owner_node_id.clone()
                    } else {
                        self.peer_owner_node_id.clone()
                    },
                    is_local_owner: i == 0,
                    available_node_count: self.available_node_count,
                };
                result
                    .json_responses
                    .insert(format!("node-{i}"), serde_json::to_value(response)?);
            }
        } else {
            result.json_responses.insert(self.node_id.clone(), Value::Null);
        }
        self.broadcasts.lock().push(request);
        Ok(result)
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<QueryNotification>>,
}

impl TaskNotifier for RecordingNotifier {
    fn notify(&self, notification: QueryNotification) {
        self.notifications.lock().push(notification);
    }
}
