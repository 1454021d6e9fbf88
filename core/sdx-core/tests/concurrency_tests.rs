// 동시성 통합 테스트: 같은 문서에 대한 버전 경합

mod common;

use common::{ITEMS, item_type};
use sdx_core::cluster::LocalCluster;
use sdx_core::index::NoopNotifier;
use sdx_core::schema::SchemaRegistry;
use sdx_core::{DatabaseConfig, DocumentIndexService, IndexConfig, SdxResult, ServiceDocument};
use std::sync::Arc;
use std::thread;

const WRITERS: i64 = 32;

#[test]
fn test_concurrent_upsert_keeps_highest_version() -> SdxResult<()> {
    let dir = tempfile::tempdir()?;
    let mut config = IndexConfig::default();
    config.query_thread_count = 4;
    config.update_thread_count = 4;
    config.database = DatabaseConfig::file(dir.path().join("race.db"));
    let index = DocumentIndexService::new(
        config,
        Arc::new(SchemaRegistry::new()),
        Arc::new(LocalCluster::default()),
        Arc::new(NoopNotifier),
    )?;
    index.register_document_type(ITEMS, &item_type())?;

    // highest versions first so most lower writes lose
    let handles: Vec<_> = (1..=WRITERS)
        .rev()
        .map(|version| {
            let index = index.clone();
            thread::spawn(move || {
                index.index_document(
                    ServiceDocument::new("/items/race", "Item")
                        .with_version(version)
                        .with_field("count", version),
                )
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer panicked")?;
    }

    let stored = index.get_document("/items/race")?.expect("document stored");
    assert_eq!(stored.version, WRITERS);
    assert_eq!(stored.content["count"], WRITERS);
    let stats = index.stats();
    assert_eq!(stats.commits + stats.ignored_upserts, WRITERS as u64);
    assert_eq!(stats.failures, 0);
    index.stop();
    Ok(())
}
