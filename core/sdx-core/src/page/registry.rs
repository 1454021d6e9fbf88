//! Page registry: 페이지 서비스 생성/조회/만료

use crate::document::now_micros;
use crate::page::service::QueryPageService;
use crate::page::{PageFactory, QUERY_PAGE_PREFIX, QueryPage};
use crate::query::QuerySpecification;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Live page services keyed by link.
pub struct PageRegistry {
    pages: DashMap<String, Arc<QueryPageService>>,
    last_id: AtomicI64,
    ttl_floor_micros: i64,
}

impl PageRegistry {
    pub fn new(ttl_floor: Duration) -> Self {
        Self {
            pages: DashMap::new(),
            last_id: AtomicI64::new(0),
            ttl_floor_micros: ttl_floor.as_micros() as i64,
        }
    }

    /// 단조 증가 ID (마이크로초 기반)
    fn next_id(&self) -> i64 {
        let mut last = self.last_id.load(Ordering::Acquire);
        loop {
            let id = now_micros().max(last + 1);
            match self
                .last_id
                .compare_exchange(last, id, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return id,
                Err(current) => last = current,
            }
        }
    }

    pub fn get(&self, link: &str) -> Option<Arc<QueryPageService>> {
        self.pages.get(link).map(|e| e.value().clone())
    }

    pub fn remove(&self, link: &str) -> bool {
        let removed = self.pages.remove(link).is_some();
        if removed {
            debug!(page = %link, "page service stopped");
        }
        removed
    }

    /// Drop every page whose lifetime ended before `now`; returns how many.
    pub fn expire(&self, now: i64) -> usize {
        let before = self.pages.len();
        self.pages.retain(|_, page| !page.is_expired(now));
        let expired = before.saturating_sub(self.pages.len());
        if expired > 0 {
            debug!(expired, "expired page services");
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

impl PageFactory for PageRegistry {
    fn create_page(
        &self,
        mut spec: QuerySpecification,
        page: QueryPage,
        parent_expiration_micros: i64,
    ) -> String {
        let link = format!("{QUERY_PAGE_PREFIX}/{}", self.next_id());
        let expiration = parent_expiration_micros.max(now_micros() + self.ttl_floor_micros);
        spec.context.page = Some(QueryPage {
            link: link.clone(),
            ..page
        });
        spec.context.limit_override = None;
        self.pages.insert(
            link.clone(),
            Arc::new(QueryPageService::new(link.clone(), spec, expiration)),
        );
        debug!(page = %link, expiration, "page service created");
        link
    }
}
