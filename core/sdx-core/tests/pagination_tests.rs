// 페이지네이션 통합 테스트: keyset/offset 페이지, group-by, 일회성 쿼리

mod common;

use common::{item, service};
use sdx_core::query::{Query, QueryOption, QuerySpecification, QueryTask, QueryTerm, SortOrder};
use sdx_core::schema::TypeName;
use sdx_core::{DocumentIndexService, SdxError, SdxResult};

fn seed(index: &DocumentIndexService, n: u32) -> SdxResult<()> {
    for i in 1..=n {
        index.index_document(
            item(i)
                .with_field("count", i % 3)
                .with_field("color", if i % 2 == 0 { "red" } else { "blue" }),
        )?;
    }
    Ok(())
}

/// Follow next page links from a first response; returns the links per page.
fn drain(index: &DocumentIndexService, first: QueryTask) -> SdxResult<Vec<Vec<String>>> {
    let mut pages = Vec::new();
    let mut next = first.results.and_then(|r| r.next_page_link);
    while let Some(link) = next {
        let task = index.fetch_page(&link, None)?;
        let results = task.results.unwrap_or_default();
        pages.push(results.document_links);
        next = results.next_page_link;
    }
    Ok(pages)
}

#[test]
fn test_pagination_completeness() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 7)?;

    let first = index.query(QuerySpecification::new(Query::kind("Item")).with_result_limit(2))?;
    assert!(first.results.as_ref().unwrap().document_links.is_empty());

    let pages = drain(&index, first)?;
    assert_eq!(pages.len(), 4);
    assert_eq!(pages.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 2, 1]);
    let all: Vec<String> = pages.into_iter().flatten().collect();
    let expected: Vec<String> = (1..=7).map(|i| format!("/items/{i}")).collect();
    assert_eq!(all, expected);
    index.stop();
    Ok(())
}

#[test]
fn test_descending_sort_pages() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 5)?;
    let spec = QuerySpecification::new(Query::kind("Item"))
        .with_result_limit(2)
        .with_sort(QueryTerm::sort("count", TypeName::Long), SortOrder::Desc);
    let first = index.query(spec)?;
    let all: Vec<String> = drain(&index, first)?.into_iter().flatten().collect();
    // count = i % 3, ties broken by self link in the same direction
    assert_eq!(all, vec!["/items/5", "/items/2", "/items/4", "/items/1", "/items/3"]);
    Ok(())
}

#[test]
fn test_sort_pages_include_missing_keys() -> SdxResult<()> {
    let index = service()?;
    for i in 1..=6 {
        let document = if i % 2 == 0 { item(i).with_field("count", i) } else { item(i) };
        index.index_document(document)?;
    }
    let sorted = |order| -> SdxResult<Vec<String>> {
        let spec = QuerySpecification::new(Query::kind("Item"))
            .with_result_limit(2)
            .with_sort(QueryTerm::sort("count", TypeName::Long), order);
        let first = index.query(spec)?;
        Ok(drain(&index, first)?.into_iter().flatten().collect())
    };
    // nulls sort first ascending and last descending
    assert_eq!(
        sorted(SortOrder::Asc)?,
        vec!["/items/1", "/items/3", "/items/5", "/items/2", "/items/4", "/items/6"]
    );
    assert_eq!(
        sorted(SortOrder::Desc)?,
        vec!["/items/6", "/items/4", "/items/2", "/items/5", "/items/3", "/items/1"]
    );
    index.stop();
    Ok(())
}

#[test]
fn test_offset_pages() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 5)?;
    let mut spec = QuerySpecification::new(Query::kind("Item")).with_result_limit(2);
    spec.offset = Some(1);
    let first = index.query(spec)?;
    let all: Vec<String> = drain(&index, first)?.into_iter().flatten().collect();
    assert_eq!(all, vec!["/items/2", "/items/3", "/items/4", "/items/5"]);
    Ok(())
}

#[test]
fn test_previous_links_and_forward_only() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 5)?;
    let first = index.query(QuerySpecification::new(Query::kind("Item")).with_result_limit(2))?;
    let page1_link = first.results.unwrap().next_page_link.unwrap();
    let page1 = index.fetch_page(&page1_link, None)?.results.unwrap();
    assert!(page1.prev_page_link.is_none());
    let page2 = index
        .fetch_page(page1.next_page_link.as_deref().unwrap(), None)?
        .results
        .unwrap();
    assert_eq!(page2.prev_page_link.as_deref(), Some(page1_link.as_str()));

    let forward = index.query(
        QuerySpecification::new(Query::kind("Item"))
            .with_result_limit(2)
            .with_option(QueryOption::ForwardOnly),
    )?;
    let link = forward.results.unwrap().next_page_link.unwrap();
    let page1 = index.fetch_page(&link, None)?.results.unwrap();
    let page2 = index
        .fetch_page(page1.next_page_link.as_deref().unwrap(), None)?
        .results
        .unwrap();
    assert!(page2.prev_page_link.is_none());
    Ok(())
}

#[test]
fn test_limit_override_applies_to_one_fetch() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 6)?;
    let first = index.query(QuerySpecification::new(Query::kind("Item")).with_result_limit(2))?;
    let link = first.results.unwrap().next_page_link.unwrap();
    let big = index.fetch_page(&link, Some(3))?.results.unwrap();
    assert_eq!(big.document_links.len(), 3);
    let next = index
        .fetch_page(big.next_page_link.as_deref().unwrap(), None)?
        .results
        .unwrap();
    assert_eq!(next.document_links, vec!["/items/4", "/items/5"]);
    Ok(())
}

#[test]
fn test_single_use_page_removed_when_drained() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 3)?;
    let first = index.query(
        QuerySpecification::new(Query::kind("Item"))
            .with_result_limit(5)
            .with_option(QueryOption::SingleUse),
    )?;
    let link = first.results.unwrap().next_page_link.unwrap();
    let page = index.fetch_page(&link, None)?.results.unwrap();
    assert_eq!(page.document_links.len(), 3);
    assert!(page.next_page_link.is_none());
    assert!(matches!(index.fetch_page(&link, None), Err(SdxError::NotFound(_))));
    Ok(())
}

#[test]
fn test_group_by_pages() -> SdxResult<()> {
    let index = service()?;
    seed(&index, 5)?;
    index.index_document(item(9))?;

    let mut spec = QuerySpecification::new(Query::kind("Item")).with_option(QueryOption::GroupBy);
    spec.group_by_term = Some(QueryTerm::sort("color", TypeName::String));
    spec.group_result_limit = Some(2);
    let task = index.query(spec)?;
    let results = task.results.unwrap();
    let groups = results.next_page_links_per_group.unwrap();
    // nulls sort first
    assert_eq!(
        groups.keys().cloned().collect::<Vec<_>>(),
        vec!["DocumentsWithoutResults".to_string(), "blue".to_string()]
    );
    let without = index.fetch_page(&groups["DocumentsWithoutResults"], None)?;
    assert_eq!(without.results.unwrap().document_links, vec!["/items/9"]);
    let mut blue = index
        .fetch_page(&groups["blue"], None)?
        .results
        .unwrap()
        .document_links;
    blue.sort();
    assert_eq!(blue, vec!["/items/1", "/items/3", "/items/5"]);

    let next = index
        .fetch_page(results.next_page_link.as_deref().unwrap(), None)?
        .results
        .unwrap();
    let groups = next.next_page_links_per_group.unwrap();
    assert_eq!(groups.keys().cloned().collect::<Vec<_>>(), vec!["red".to_string()]);
    assert!(next.next_page_link.is_none());
    Ok(())
}
