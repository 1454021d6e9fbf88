// 스키마 통합 테스트: 중첩 속성, 재등록과 페이지 컨텍스트

mod common;

use common::{ITEMS, item, item_type, service};
use sdx_core::query::{Query, QueryOption, QuerySpecification};
use sdx_core::schema::{DocumentDescription, DocumentType, PropertyDescription};
use sdx_core::{SdxError, SdxResult};
use serde_json::json;

fn place_type() -> DocumentType {
    DocumentType::new(
        "PlaceState",
        "Place",
        DocumentDescription::builder()
            .property(
                "address",
                PropertyDescription::podo()
                    .field("city", PropertyDescription::string().case_insensitive())
                    .field("zip", PropertyDescription::long()),
            )
            .build(),
    )
    .with_table_name("places")
}

#[test]
fn test_nested_property_is_queryable() -> SdxResult<()> {
    let index = service()?;
    let td = index.register_document_type("/core/places", &place_type())?;
    assert_eq!(td.table_name, "docs_core_places");
    assert!(td.column("address.city").is_some_and(|c| c.case_insensitive));

    for (i, city) in ["Oslo", "Bergen", "oslo"].iter().enumerate() {
        let mut place = sdx_core::ServiceDocument::new(format!("/core/places/{i}"), "Place").with_version(1);
        place.content.insert("address".into(), json!({"city": city, "zip": i}));
        index.index_document(place)?;
    }

    let task = index.query(QuerySpecification::new(Query::term("address.city", "OSLO")))?;
    assert_eq!(
        task.results.unwrap().document_links,
        vec!["/core/places/0", "/core/places/2"]
    );
    assert_eq!(
        index.registry().table_for_self_link("/core/places/1").map(|t| t.document_kind.clone()),
        Some("Place".to_string())
    );
    Ok(())
}

#[test]
fn test_missing_kind_fails_registration() -> SdxResult<()> {
    let index = service()?;
    let nameless = DocumentType::new("ThingState", " ", DocumentDescription::builder().build());
    let err = index.register_document_type("/things", &nameless).unwrap_err();
    assert!(matches!(err, SdxError::Schema(_)), "{err}");
    Ok(())
}

#[test]
fn test_reregistration_retries_first_page_only() -> SdxResult<()> {
    let index = service()?;
    for i in 1..=3 {
        index.index_document(item(i))?;
    }
    let spec = QuerySpecification::new(Query::kind("Item")).with_result_limit(1);
    let first = index.query(spec)?.results.unwrap().next_page_link.unwrap();

    index.register_document_type(ITEMS, &item_type())?;
    let page = index.fetch_page(&first, None)?;
    let results = page.results.unwrap();
    assert_eq!(results.document_links, vec!["/items/1"]);
    let second = results.next_page_link.unwrap();

    index.register_document_type(ITEMS, &item_type())?;
    let err = index.fetch_page(&second, None).unwrap_err();
    assert!(matches!(err, SdxError::StaleQueryContext(_)), "{err}");

    // forward-only queries never retry, not even on the first page
    let spec = QuerySpecification::new(Query::kind("Item"))
        .with_option(QueryOption::ForwardOnly)
        .with_result_limit(1);
    let first = index.query(spec)?.results.unwrap().next_page_link.unwrap();
    index.register_document_type(ITEMS, &item_type())?;
    assert!(matches!(
        index.fetch_page(&first, None),
        Err(SdxError::StaleQueryContext(_))
    ));
    Ok(())
}
