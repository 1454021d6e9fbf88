// 쿼리 변환 및 페이지 조회 벤치마크
//
// Section 1: 쿼리 축소 + WHERE 절 생성 (축소 적용 vs 미적용)
// Section 2: 인덱스 서비스 경유 keyset 페이지네이션

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sdx_core::cluster::LocalCluster;
use sdx_core::index::NoopNotifier;
use sdx_core::query::{
    NumericRange, Occurrence, Query, QueryBuilder, QueryOption, QueryRuntimeContext,
    QuerySpecification, QueryTerm,
};
use sdx_core::schema::{
    DocumentDescription, DocumentType, PropertyDescription, SchemaRegistry, TableDescription,
};
use sdx_core::sql::QueryConverter;
use sdx_core::{DocumentIndexService, IndexConfig, ServiceDocument};
use std::sync::Arc;

fn item_type() -> DocumentType {
    DocumentType::new(
        "ItemState",
        "Item",
        DocumentDescription::builder()
            .property("name", PropertyDescription::string().case_insensitive())
            .property("count", PropertyDescription::long())
            .property("color", PropertyDescription::string())
            .property("tags", PropertyDescription::collection(PropertyDescription::string()))
            .build(),
    )
}

/// Kind term plus `width` SHOULD terms on one property and a range.
fn wide_query(width: usize) -> Query {
    QueryBuilder::create()
        .add_kind_field_clause("Item")
        .add_in_clause(
            "color",
            (0..width).map(|i| format!("c{i}")),
            Occurrence::Must,
        )
        .add_clause(Query::from_term(QueryTerm::range(
            "count",
            NumericRange::long(Some(10), Some(100), true, false),
        )))
        .add_clause(Query::term("tags.item", "hot").with_occurrence(Occurrence::MustNot))
        .build()
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 1: 쿼리 변환
// ═══════════════════════════════════════════════════════════════════════════

fn bench_convert(c: &mut Criterion) {
    let td = TableDescription::build("/items", &item_type()).expect("table");
    let mut group = c.benchmark_group("convert");

    for width in [1usize, 8, 64] {
        let query = wide_query(width);
        group.bench_with_input(BenchmarkId::new("reduced", width), &query, |b, q| {
            let converter = QueryConverter::new();
            b.iter(|| {
                let mut context = QueryRuntimeContext::default();
                converter
                    .convert(black_box(q), &mut context, &td)
                    .expect("convert")
            })
        });
        group.bench_with_input(BenchmarkId::new("plain", width), &query, |b, q| {
            let converter = QueryConverter::without_reduction();
            b.iter(|| {
                let mut context = QueryRuntimeContext::default();
                converter
                    .convert(black_box(q), &mut context, &td)
                    .expect("convert")
            })
        });
    }

    group.finish();
}

// ═══════════════════════════════════════════════════════════════════════════
// Section 2: 페이지네이션
// ═══════════════════════════════════════════════════════════════════════════

fn bench_paging(c: &mut Criterion) {
    let mut config = IndexConfig::default();
    config.query_thread_count = 2;
    config.update_thread_count = 2;
    let index = DocumentIndexService::new(
        config,
        Arc::new(SchemaRegistry::new()),
        Arc::new(LocalCluster::default()),
        Arc::new(NoopNotifier),
    )
    .expect("index");
    index
        .register_document_type("/items", &item_type())
        .expect("register");
    for i in 0..2_000 {
        index
            .index_document(
                ServiceDocument::new(format!("/items/{i:05}"), "Item")
                    .with_version(1)
                    .with_field("count", i)
                    .with_field("color", format!("c{}", i % 8)),
            )
            .expect("index document");
    }

    let mut group = c.benchmark_group("paging");
    group.sample_size(20);
    group.bench_function("walk_100_per_page", |b| {
        b.iter(|| {
            let spec = QuerySpecification::new(Query::kind("Item"))
                .with_option(QueryOption::ExpandContent)
                .with_result_limit(100);
            let task = index.query(spec).expect("query");
            let mut next = task.results.and_then(|r| r.next_page_link);
            let mut pages = 0;
            while let Some(link) = next {
                let page = index.fetch_page(&link, None).expect("page");
                next = page.results.and_then(|r| r.next_page_link);
                pages += 1;
            }
            black_box(pages)
        })
    });
    group.finish();
    index.stop();
}

criterion_group!(benches, bench_convert, bench_paging);
criterion_main!(benches);
