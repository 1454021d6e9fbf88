//! 문서 색인 및 페이지 조회 예제
//!
//! 실행: RUST_LOG=debug cargo run --example basic_index --features logging

use sdx_core::cluster::LocalCluster;
use sdx_core::index::NoopNotifier;
use sdx_core::query::{Query, QueryBuilder, QueryOption, QuerySpecification, QueryTerm, SortOrder};
use sdx_core::schema::{DocumentDescription, DocumentType, PropertyDescription, SchemaRegistry, TypeName};
use sdx_core::{DocumentIndexService, IndexConfig, ServiceDocument};
use std::sync::Arc;

fn main() -> sdx_core::SdxResult<()> {
    let config = IndexConfig::from_env()?;
    sdx_core::logging::init_for(&config);
    let index = DocumentIndexService::new(
        config,
        Arc::new(SchemaRegistry::new()),
        Arc::new(LocalCluster::default()),
        Arc::new(NoopNotifier),
    )?;

    let description = DocumentDescription::builder()
        .property("name", PropertyDescription::string().case_insensitive())
        .property("count", PropertyDescription::long())
        .build();
    index.register_document_type("/books", &DocumentType::new("BookState", "Book", description))?;

    println!("=== 문서 색인 ===");
    for (i, name) in ["Dune", "Emma", "Ulysses", "Beloved", "Solaris"].iter().enumerate() {
        index.index_document(
            ServiceDocument::new(format!("/books/{i}"), "Book")
                .with_version(1)
                .with_field("name", *name)
                .with_field("count", (i as i64 + 1) * 10),
        )?;
    }

    println!("\n=== 페이지 조회 (count 내림차순, 2개씩) ===");
    let query = QueryBuilder::create().add_kind_field_clause("Book").build();
    let spec = QuerySpecification::new(query)
        .with_option(QueryOption::ExpandContent)
        .with_sort(QueryTerm::sort("count", TypeName::Long), SortOrder::Desc)
        .with_result_limit(2);
    let mut next = index.query(spec)?.results.and_then(|r| r.next_page_link);
    while let Some(link) = next {
        let page = index.fetch_page(&link, None)?;
        let results = page.results.unwrap_or_default();
        println!("{link}: {:?}", results.document_links);
        next = results.next_page_link;
    }

    println!("\n=== 단건 조회 ===");
    let count = index.query(QuerySpecification::new(Query::kind("Book")).with_option(QueryOption::Count))?;
    println!("documents: {}", count.results.map_or(0, |r| r.document_count));
    println!("stats: {}", serde_json::to_string_pretty(&index.stats())?);

    index.stop();
    Ok(())
}
