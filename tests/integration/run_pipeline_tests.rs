/*!
 * End-to-end runs against the fake translator and in-memory storage
 */

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use doctrans::errors::{InputError, RunPhase, SubmissionError};
use doctrans::service::{Method, ServiceResponse};
use doctrans::storage::MemoryStorage;
use doctrans::{EventSink, RunError, RunEvent, TranslationJob};

use crate::common::{
    FakeTranslator, create_temp_dir, create_test_file, job_status, successful_run, test_orchestrator,
};

fn drain(receiver: &mut tokio::sync::mpsc::Receiver<RunEvent>) -> Vec<RunEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_run_should_translate_valid_files_and_discard_others() {
    let temp = create_temp_dir().unwrap();
    let docs = temp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    let inputs = vec![
        create_test_file(&docs, "a.txt", "alpha").unwrap(),
        create_test_file(&docs, "b.docx", "bravo").unwrap(),
        create_test_file(&docs, "c.TXT", "charlie").unwrap(),
        create_test_file(&docs, "d.exe", "delta").unwrap(),
    ];
    let output = temp.path().join("out");
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(3)));
    let orchestrator = test_orchestrator(translator.clone(), storage.clone());
    let (sink, mut receiver) = EventSink::channel(32);

    let summary = orchestrator
        .run(
            TranslationJob::new("fr", inputs.clone()).with_output_dir(&output),
            sink,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.uploaded.succeeded.len(), 3);
    assert_eq!(summary.discarded, vec![inputs[3].clone()]);
    let downloaded: BTreeSet<String> = summary.downloaded.succeeded.iter().cloned().collect();
    let translated: BTreeSet<String> = translator.translated().into_iter().collect();
    assert_eq!(downloaded, translated);
    assert_eq!(downloaded.len(), 3);
    assert_eq!(std::fs::read_to_string(output.join("b.docx")).unwrap(), "[fr] bravo");
    assert!(!output.join("d.exe").exists());
    assert_eq!(summary.final_status.status, "Succeeded");
    assert!(summary.cleanup_failures.is_empty());
    assert!(storage.container_names().is_empty());

    let events = drain(&mut receiver);
    let status_events = events.iter().filter(|e| matches!(e, RunEvent::Status(_))).count();
    assert_eq!(status_events, 3);
    assert!(matches!(events[events.len() - 2], RunEvent::DownloadComplete { .. }));
    assert_eq!(events.last(), Some(&RunEvent::RunComplete));
}

#[tokio::test]
async fn test_run_should_submit_one_folder_input_per_run() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "report.docx", "text").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));
    let run_id = Uuid::new_v4();
    let orchestrator = test_orchestrator(translator.clone(), storage).with_category(Some("legal".to_string()));

    orchestrator
        .run(
            TranslationJob::new("de", vec![input])
                .with_run_id(run_id)
                .with_output_dir(temp.path().join("out")),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let request = translator.submitted().unwrap();
    assert_eq!(request.inputs.len(), 1);
    let input = &request.inputs[0];
    assert_eq!(input.storage_type, "folder");
    assert!(input.source.source_url.starts_with(&format!("memory://doctr{}src?", run_id)));
    assert_eq!(input.targets.len(), 1);
    assert_eq!(input.targets[0].language, "de");
    assert!(input.targets[0].target_url.starts_with(&format!("memory://doctr{}tgt?", run_id)));
    assert_eq!(input.targets[0].category.as_deref(), Some("legal"));
    assert!(input.targets[0].glossaries.is_none());
}

#[tokio::test]
async fn test_run_should_default_output_next_to_sources() {
    let temp = create_temp_dir().unwrap();
    let docs = temp.path().join("docs");
    std::fs::create_dir(&docs).unwrap();
    create_test_file(&docs, "one.txt", "one").unwrap();
    create_test_file(&docs, "two.txt", "two").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(2)));

    let summary = test_orchestrator(translator, storage)
        .run(
            TranslationJob::new("fr", vec![docs.clone()]),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let expected = temp.path().join("docs.fr");
    assert_eq!(summary.output_dir, expected);
    assert_eq!(std::fs::read_to_string(expected.join("two.txt")).unwrap(), "[fr] two");
}

#[tokio::test]
async fn test_rejected_submission_should_fail_and_still_clean_up() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));
    translator.respond_to_submit(ServiceResponse::new(
        400,
        r#"{"error":{"code":"InvalidRequest","message":"Target language is invalid"}}"#,
    ));

    let error = test_orchestrator(translator.clone(), storage.clone())
        .run(
            TranslationJob::new("fr", vec![input]),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(error.phase(), RunPhase::Submission);
    assert!(matches!(error, RunError::Submission(SubmissionError::Rejected(_))));
    assert_eq!(error.error_detail().unwrap().code, "InvalidRequest");
    assert_eq!(translator.request_count(Method::Post), 1);
    assert_eq!(translator.request_count(Method::Get), 0);
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_exhausted_submission_should_not_poll() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));
    translator.respond_to_submit(ServiceResponse::new(503, "unavailable"));

    let error = test_orchestrator(translator.clone(), storage.clone())
        .run(
            TranslationJob::new("fr", vec![input]),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        RunError::Submission(SubmissionError::Exhausted { attempts: 3, .. })
    ));
    assert_eq!(translator.request_count(Method::Post), 3);
    assert_eq!(translator.request_count(Method::Get), 0);
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_failed_job_should_skip_download() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let output = temp.path().join("out");
    let storage = Arc::new(MemoryStorage::new());
    let mut failed = job_status("ValidationFailed", 1, 0, 0, "2024-05-01T10:00:05Z");
    failed.error = Some(doctrans::service::models::ErrorDetail {
        code: "InvalidRequest".to_string(),
        message: "Source container is empty".to_string(),
        ..Default::default()
    });
    let translator = Arc::new(FakeTranslator::new(storage.clone(), vec![failed]));

    let error = test_orchestrator(translator, storage.clone())
        .run(
            TranslationJob::new("fr", vec![input]).with_output_dir(&output),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert_eq!(error.phase(), RunPhase::Job);
    assert_eq!(error.error_detail().unwrap().message, "Source container is empty");
    assert!(!output.exists());
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_cancellation_should_cancel_remote_job_and_clean_up() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let running = job_status("Running", 1, 1, 0, "2024-05-01T10:00:02Z");
    let translator = Arc::new(FakeTranslator::new(storage.clone(), vec![running]));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let error = test_orchestrator(translator.clone(), storage.clone())
        .run(TranslationJob::new("fr", vec![input]), EventSink::disabled(), cancel)
        .await
        .unwrap_err();

    match error {
        RunError::Cancelled { last_status } => assert_eq!(last_status.unwrap().status, "Running"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(translator.request_count(Method::Delete), 1);
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_cancellation_should_clean_up_while_progress_channel_is_full() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let statuses = (0..5)
        .map(|i| job_status("Running", 1, 1, 0, &format!("2024-05-01T10:00:0{}Z", i)))
        .collect();
    let translator = Arc::new(FakeTranslator::new(storage.clone(), statuses));
    let (events, _receiver) = EventSink::channel(1);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        test_orchestrator(translator.clone(), storage.clone()).run(
            TranslationJob::new("fr", vec![input]),
            events,
            cancel,
        ),
    )
    .await
    .expect("run kept waiting on the progress channel after cancellation");

    assert!(matches!(result, Err(RunError::Cancelled { last_status: Some(_) })));
    assert_eq!(translator.request_count(Method::Delete), 1);
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_glossaries_should_be_uploaded_and_referenced() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let glossary = create_test_file(temp.path(), "terms.tsv", "alpha\talpha-fr\n").unwrap();
    let ignored = create_test_file(temp.path(), "terms.xyz", "nope").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));
    let run_id = Uuid::new_v4();

    let summary = test_orchestrator(translator.clone(), storage.clone())
        .run(
            TranslationJob::new("fr", vec![input])
                .with_run_id(run_id)
                .with_glossaries(vec![glossary, ignored])
                .with_output_dir(temp.path().join("out")),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.glossaries.succeeded, vec!["terms.tsv".to_string()]);
    let request = translator.submitted().unwrap();
    let glossaries = request.inputs[0].targets[0].glossaries.clone().unwrap();
    assert_eq!(glossaries.len(), 1);
    assert!(glossaries[0]
        .glossary_url
        .starts_with(&format!("memory://doctr{}gls/terms.tsv?", run_id)));
    assert_eq!(glossaries[0].format.as_deref(), Some("TSV"));
    assert_eq!(glossaries[0].storage_source, "folder");
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_no_translatable_documents_should_fail_before_remote_calls() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "setup.exe", "binary").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));

    let error = test_orchestrator(translator.clone(), storage.clone())
        .run(TranslationJob::new("fr", vec![input]), EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, RunError::Input(InputError::NoDocuments(1))));
    assert!(translator.requests().is_empty());
    assert_eq!(storage.transfer_count(), 0);
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_duplicate_basenames_should_fail_the_run() {
    let temp = create_temp_dir().unwrap();
    let first_dir = temp.path().join("first");
    let second_dir = temp.path().join("second");
    std::fs::create_dir(&first_dir).unwrap();
    std::fs::create_dir(&second_dir).unwrap();
    let first = create_test_file(&first_dir, "same.txt", "1").unwrap();
    let second = create_test_file(&second_dir, "same.txt", "2").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(2)));

    let error = test_orchestrator(translator.clone(), storage)
        .run(
            TranslationJob::new("fr", vec![first, second]),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match error {
        RunError::Input(InputError::NameCollision { name, .. }) => assert_eq!(name, "same.txt"),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(translator.requests().is_empty());
}

#[tokio::test]
async fn test_unsupported_language_should_fail_before_remote_calls() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));

    let error = test_orchestrator(translator.clone(), storage)
        .run(TranslationJob::new("xx", vec![input]), EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, RunError::Input(InputError::UnsupportedLanguage(ref l)) if l == "xx"));
    assert!(translator.requests().is_empty());
}

#[tokio::test]
async fn test_all_uploads_failing_should_stop_before_submission() {
    let temp = create_temp_dir().unwrap();
    let inputs = vec![
        create_test_file(temp.path(), "a.txt", "alpha").unwrap(),
        create_test_file(temp.path(), "b.txt", "bravo").unwrap(),
    ];
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_blob("a.txt");
    storage.fail_blob("b.txt");
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(2)));

    let error = test_orchestrator(translator.clone(), storage.clone())
        .run(TranslationJob::new("fr", inputs), EventSink::disabled(), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(error, RunError::Upload { failed: 2, total: 2 }));
    assert_eq!(translator.request_count(Method::Post), 0);
    assert!(storage.container_names().is_empty());
}

#[tokio::test]
async fn test_partial_upload_failure_should_still_submit() {
    let temp = create_temp_dir().unwrap();
    let inputs = vec![
        create_test_file(temp.path(), "a.txt", "alpha").unwrap(),
        create_test_file(temp.path(), "b.txt", "bravo").unwrap(),
    ];
    let storage = Arc::new(MemoryStorage::new());
    storage.fail_blob("b.txt");
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));

    let summary = test_orchestrator(translator, storage)
        .run(
            TranslationJob::new("fr", inputs).with_output_dir(temp.path().join("out")),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.uploaded.succeeded, vec!["a.txt".to_string()]);
    assert_eq!(summary.uploaded.failed[0].name, "b.txt");
    assert_eq!(summary.downloaded.succeeded, vec!["a.txt".to_string()]);
}

#[tokio::test]
async fn test_cleanup_failure_should_not_fail_the_run() {
    let temp = create_temp_dir().unwrap();
    let input = create_test_file(temp.path(), "a.txt", "alpha").unwrap();
    let storage = Arc::new(MemoryStorage::new());
    let run_id = Uuid::new_v4();
    let stuck = format!("doctr{}tgt", run_id);
    storage.fail_delete(stuck.clone());
    let translator = Arc::new(FakeTranslator::new(storage.clone(), successful_run(1)));

    let summary = test_orchestrator(translator, storage.clone())
        .run(
            TranslationJob::new("fr", vec![input])
                .with_run_id(run_id)
                .with_output_dir(temp.path().join("out")),
            EventSink::disabled(),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(summary.cleanup_failures.len(), 1);
    assert_eq!(summary.cleanup_failures[0].0, stuck);
    assert_eq!(storage.container_names(), vec![stuck]);
}

#[tokio::test]
async fn test_sweep_should_remove_stale_run_containers() {
    let storage = Arc::new(MemoryStorage::new());
    let old = chrono::Utc::now() - chrono::Duration::days(30);
    let stale = format!("doctr{}src", Uuid::new_v4());
    let fresh = format!("doctr{}tgt", Uuid::new_v4());
    storage.insert_container_at(stale.clone(), old);
    storage.insert_container_at(fresh.clone(), chrono::Utc::now());
    storage.insert_container_at("archive", old);
    let translator = Arc::new(FakeTranslator::new(storage.clone(), Vec::new()));

    let report = test_orchestrator(translator, storage.clone())
        .sweep_stale_containers()
        .await
        .unwrap();

    assert_eq!(report.deleted, vec![stale]);
    assert_eq!(storage.container_names(), vec!["archive".to_string(), fresh]);
}
