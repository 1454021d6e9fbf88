//! # SDX: Service Document Index
//!
//! SDX는 버전 관리되는 JSON 문서를 임베디드 SQLite 위에 색인하고, Lucene 스타일의
//! 불리언 쿼리를 SQL로 변환하여 실행하는 문서 인덱스입니다.
//!
//! ## 주요 특징
//!
//! - **Schema Registry**: 정적으로 선언된 문서 설명 → 테이블/컬럼/인덱스
//! - **Query Converter**: 쿼리 축소(reduction) 후 WHERE 절 생성
//! - **Document DAO**: 버전 조건부 upsert, keyset 페이지네이션, group-by
//! - **Index Service**: 주체별 라운드로빈 큐, 스레드 풀, 연속 쿼리, 만료 처리
//! - **Page Service**: 페이지네이션 상태를 들고 있는 일회성 서비스
//!
//! ## 빠른 시작
//!
//! ```rust
//! use std::sync::Arc;
//! use sdx_core::cluster::LocalCluster;
//! use sdx_core::document::ServiceDocument;
//! use sdx_core::index::{DocumentIndexService, NoopNotifier};
//! use sdx_core::query::{Query, QuerySpecification};
//! use sdx_core::schema::{DocumentDescription, DocumentType, PropertyDescription, SchemaRegistry};
//! use sdx_core::IndexConfig;
//!
//! # fn main() -> sdx_core::SdxResult<()> {
//! let mut config = IndexConfig::default();
//! config.query_thread_count = 2;
//! config.update_thread_count = 2;
//! let index = DocumentIndexService::new(
//!     config,
//!     Arc::new(SchemaRegistry::new()),
//!     Arc::new(LocalCluster::default()),
//!     Arc::new(NoopNotifier),
//! )?;
//!
//! let description = DocumentDescription::builder()
//!     .property("name", PropertyDescription::string())
//!     .build();
//! index.register_document_type("/examples", &DocumentType::new("Example", "Example", description))?;
//!
//! index.index_document(ServiceDocument::new("/examples/1", "Example").with_field("name", "a"))?;
//!
//! let task = index.query(QuerySpecification::new(Query::kind("Example")))?;
//! assert_eq!(task.results.unwrap().document_links, vec!["/examples/1"]);
//! index.stop();
//! # Ok(())
//! # }
//! ```
//!
//! ## 쿼리 실행 파이프라인
//!
//! ```text
//! QuerySpecification → resolve tables (kind scope) → reduce → emit WHERE
//!          → single table | UNION ALL → count | group-by | paged rows
//! ```
//!
//! ## 모듈 구조
//!
//! - [`schema`]: 문서 설명, 테이블 설명, DDL
//! - [`query`]: 쿼리 모델, 빌더, 인메모리 평가
//! - [`sql`]: 쿼리 축소, WHERE/ORDER BY/페이지네이션 절 생성
//! - [`storage`]: 커넥션 풀, Document DAO
//! - [`index`]: 인덱스 서비스 ([`index::DocumentIndexService`])
//! - [`page`]: 쿼리 페이지 서비스

pub mod auth;
pub mod cluster;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod page;
pub mod query;
pub mod schema;
pub mod sql;
pub mod storage;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{DatabaseConfig, IndexConfig};
pub use document::{Action, ServiceDocument};
pub use error::{SdxError, SdxResult};
pub use index::DocumentIndexService;
