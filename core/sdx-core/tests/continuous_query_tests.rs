// 연속 쿼리 통합 테스트: 등록, 알림, 해제

mod common;

use common::{RecordingNotifier, item, service_with, small_config};
use sdx_core::auth::SubjectAuthContext;
use sdx_core::cluster::LocalCluster;
use sdx_core::index::{Operation, OperationBody};
use sdx_core::query::{Query, QueryOption, QuerySpecification, QueryTask, TaskStage};
use sdx_core::schema::{DocumentDescription, DocumentType};
use sdx_core::{Action, SdxError, SdxResult, ServiceDocument};
use std::sync::Arc;

fn continuous(stage: TaskStage) -> Operation {
    let spec = QuerySpecification::new(Query::kind("Item"))
        .with_option(QueryOption::Continuous)
        .with_option(QueryOption::ExpandContent);
    let task = QueryTask::new(spec)
        .with_self_link("/core/query-tasks/watch")
        .with_stage(stage);
    Operation::new(Action::Patch, OperationBody::QueryTask(Box::new(task)))
        .with_auth(SubjectAuthContext::new(
            "/users/watcher",
            Some(Query::kind("Item")),
        ))
}

#[test]
fn test_guest_subject_without_authorization() -> SdxResult<()> {
    let notifier = Arc::new(RecordingNotifier::default());
    let index = service_with(small_config(), Arc::new(LocalCluster::default()), notifier.clone())?;
    index.execute(continuous(TaskStage::Started))?;
    index.index_document(item(7))?;
    let notifications = notifier.notifications.lock();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].subject, sdx_core::auth::GUEST_USER_LINK);
    Ok(())
}

#[test]
fn test_one_notification_per_matching_write() -> SdxResult<()> {
    let notifier = Arc::new(RecordingNotifier::default());
    let mut config = small_config();
    config.update_thread_count = 1;
    config.authorization_enabled = true;
    let index = service_with(config, Arc::new(LocalCluster::default()), notifier.clone())?;
    index.register_document_type(
        "/tools",
        &DocumentType::new("Tool", "Tool", DocumentDescription::builder().build()),
    )?;

    assert!(matches!(
        index.execute(continuous(TaskStage::Created)),
        Err(SdxError::Validation(_))
    ));
    index.execute(continuous(TaskStage::Started))?;
    assert_eq!(index.stats().active_query_filters, 1);

    index.index_document(item(1).with_field("name", "watched"))?;
    {
        let notifications = notifier.notifications.lock();
        assert_eq!(notifications.len(), 1);
        let note = &notifications[0];
        assert_eq!(note.task_link, "/core/query-tasks/watch");
        assert_eq!(note.subject, "/users/watcher");
        let results = note.task.results.as_ref().unwrap();
        assert_eq!(results.document_links, vec!["/items/1"]);
        assert_eq!(results.documents.as_ref().unwrap()["/items/1"]["name"], "watched");
    }

    index.index_document(ServiceDocument::new("/tools/1", "Tool"))?;
    // stale version is not a write
    index.index_document(item(1))?;
    assert_eq!(notifier.notifications.lock().len(), 1);

    index.execute(continuous(TaskStage::Cancelled))?;
    assert_eq!(index.stats().active_query_filters, 0);
    index.index_document(item(2))?;
    assert_eq!(notifier.notifications.lock().len(), 1);
    Ok(())
}
