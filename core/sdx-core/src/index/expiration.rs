//! Expiration sweep: 만료 문서 삭제 및 소유권 확인

use crate::cluster::{BroadcastRequest, DEFAULT_NODE_SELECTOR, SelectOwnerResponse};
use crate::document::ServiceDocument;
use crate::error::SdxResult;
use crate::index::service::{IndexInner, SELF_LINK};
use crate::index::stats::IndexStats;
use std::time::Instant;
use tracing::{debug, info, warn};

impl IndexInner {
    /// Whether this node owns the expiration duty. With more than one
    /// available node every peer must agree on the local node.
    pub(crate) fn is_expiration_owner(&self) -> SdxResult<bool> {
        let owner = self.cluster.select_owner(DEFAULT_NODE_SELECTOR, SELF_LINK)?;
        if !owner.is_local_owner {
            return Ok(false);
        }
        if owner.available_node_count <= 1 {
            return Ok(true);
        }

        let result = self.cluster.broadcast(
            DEFAULT_NODE_SELECTOR,
            BroadcastRequest::SelectOwner {
                key: SELF_LINK.to_string(),
            },
        )?;
        if !result.failures.is_empty() {
            warn!(failures = result.failures.len(), "owner validation broadcast failed");
            return Ok(false);
        }
        if result.json_responses.len() < owner.available_node_count {
            warn!(
                responses = result.json_responses.len(),
                expected = owner.available_node_count,
                "owner validation incomplete"
            );
            return Ok(false);
        }
        let local = self.cluster.local_node_id();
        for (node, body) in &result.json_responses {
            let response: SelectOwnerResponse = serde_json::from_value(body.clone())?;
            if response.owner_node_id != local {
                warn!(%node, owner = %response.owner_node_id, "peers disagree on expiration owner");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete expired rows table by table, bounded per table by the search
    /// threshold and overall by the maintenance deadline.
    pub(crate) fn expire_documents(&self, now: i64) -> SdxResult<usize> {
        let deadline = Instant::now() + self.config.maintenance_deadline();
        let limit = self.config.expired_document_search_threshold;
        let mut expired = 0;

        'tables: for td in self.dao.registry().tables() {
            if Instant::now() >= deadline {
                break;
            }
            for document in self.dao.find_expired(&td, now, limit)? {
                if Instant::now() >= deadline {
                    break 'tables;
                }
                if !self.dao.delete_document(&td, &document.self_link)? {
                    continue;
                }
                expired += 1;
                IndexStats::increment(&self.stats.expired_documents);
                self.apply_active_queries(&document.clone_as_deleted());
                self.broadcast_delete(document);
            }
        }

        if expired > 0 {
            info!(expired, "expired documents removed");
        }
        Ok(expired)
    }

    /// Best-effort stop of the service owning an expired document.
    fn broadcast_delete(&self, document: ServiceDocument) {
        let self_link = document.self_link.clone();
        let request = BroadcastRequest::DeleteDocument {
            self_link: self_link.clone(),
            document,
        };
        match self.cluster.broadcast(DEFAULT_NODE_SELECTOR, request) {
            Ok(result) => {
                IndexStats::increment(&self.stats.service_delete_broadcasts);
                if !result.failures.is_empty() {
                    debug!(%self_link, failures = result.failures.len(), "service delete not acknowledged everywhere");
                }
            }
            Err(e) => warn!(%self_link, error = %e, "service delete broadcast failed"),
        }
    }
}
