use lc_core::prelude::*;
use lc_media::MediaError;
use lc_test_utils::{fill_session, sample_files, ScriptedConfirm, TestBackends};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::time::Duration;

fn fast_config() -> ComposerConfig {
    ComposerConfig::new().with_autosave_interval(Duration::from_millis(100))
}

async fn ready_session(backends: &TestBackends, config: ComposerConfig, files: &[&str]) -> ComposerSession {
    let session = backends.session("u42", config);
    session.start().await;
    fill_session(&session).await.unwrap();
    for file in sample_files(files) {
        session.stage(file).await.unwrap();
    }
    session
}

#[tokio::test(start_paused = true)]
async fn successful_submit_resets_everything() {
    let backends = TestBackends::new();
    let session = ready_session(&backends, fast_config(), &["a.jpg", "b.jpg"]).await;
    session.save_draft().await.unwrap();
    let mut events = session.subscribe();

    let receipt = session.submit(&CancellationToken::new()).await.unwrap();
    assert_eq!(receipt.images, 2);
    assert_eq!(receipt.uploaded, 2);
    assert!(receipt.draft_cleared);

    let record = backends.records.get(&receipt.record_id).unwrap();
    assert_eq!(record.get("category"), Some(&json!("commercial")));
    assert_eq!(record.get("property_type"), Some(&json!("office")));
    assert_eq!(record.get("price"), Some(&json!(2400)));
    assert_eq!(record.primary_image.as_ref(), record.images.first());
    assert!(record.images[0].as_str().ends_with("a.jpg"));

    match events.try_recv().unwrap() {
        ComposerEvent::RecordCreated { record_id, owner_id } => {
            assert_eq!(record_id, receipt.record_id);
            assert_eq!(owner_id, OwnerId::new("u42"));
        }
        other => panic!("unexpected event {other:?}"),
    }

    assert!(!session.drafts().exists(session.owner()).await.unwrap());
    assert_eq!(session.current_step().await, StepId::FIRST);
    assert!(session.staged().await.is_empty());
    assert!(matches!(session.banner().current(), Some(Notice::Success(_))));

    // Autosave must not bring the draft back for the emptied form
    tokio::time::sleep(Duration::from_millis(3_100)).await;
    assert!(!session.drafts().exists(session.owner()).await.unwrap());
    assert_eq!(session.banner().current(), None);
}

#[tokio::test]
async fn upload_failure_keeps_form_and_leaves_no_remote_files() {
    let backends = TestBackends::new();
    backends.uploader.fail_on("b.jpg");
    let session = ready_session(&backends, ComposerConfig::new(), &["a.jpg", "b.jpg", "c.jpg"]).await;

    let err = session.submit(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ComposerError::Submission(SubmissionError::Upload(_))));

    assert!(backends.uploader.stored().is_empty());
    assert!(backends.records.is_empty());
    assert_eq!(session.current_step().await, StepId(5));
    assert_eq!(session.staged().await.len(), 3);
    assert!(matches!(session.banner().current(), Some(Notice::Error(_))));
}

#[tokio::test]
async fn create_failure_reports_backend_message() {
    let backends = TestBackends::new();
    backends.records.fail_with(Some("listing limit reached".to_string()));
    let session = ready_session(&backends, ComposerConfig::new(), &["a.jpg"]).await;
    session.save_draft().await.unwrap();

    let err = session.submit(&CancellationToken::new()).await.unwrap_err();
    let ComposerError::Submission(SubmissionError::Create { message }) = err else {
        panic!("expected create failure, got {err:?}");
    };
    assert_eq!(message, "listing limit reached");

    assert!(backends.uploader.stored().is_empty());
    assert!(session.drafts().exists(session.owner()).await.unwrap());
    assert_eq!(
        session.wizard_snapshot().await.fields.get("title"),
        Some(&FieldValue::text("Corner office"))
    );
}

#[tokio::test]
async fn keep_partial_retry_uploads_only_the_missing_file() {
    let backends = TestBackends::new();
    backends.uploader.fail_on("b.jpg");
    let config = ComposerConfig::new().with_upload_policy(UploadPolicy::KeepPartial);
    let session = ready_session(&backends, config, &["a.jpg", "b.jpg", "c.jpg"]).await;

    assert!(session.submit(&CancellationToken::new()).await.is_err());
    assert_eq!(backends.uploader.stored().len(), 2);
    let attempts = backends.uploader.upload_count();

    backends.uploader.recover("b.jpg");
    let receipt = session.submit(&CancellationToken::new()).await.unwrap();
    assert_eq!(backends.uploader.upload_count(), attempts + 1);
    assert_eq!((receipt.uploaded, receipt.reused, receipt.images), (1, 2, 3));

    let record = backends.records.get(&receipt.record_id).unwrap();
    let names: Vec<bool> = ["a.jpg", "b.jpg", "c.jpg"]
        .iter()
        .zip(&record.images)
        .map(|(name, r)| r.as_str().ends_with(name))
        .collect();
    assert_eq!(names, vec![true, true, true]);
}

#[tokio::test]
async fn residential_categories_are_grouped() {
    let backends = TestBackends::new();
    let session = ready_session(&backends, ComposerConfig::new(), &[]).await;
    session.set_field("category", FieldValue::text("Apartment")).await.unwrap();

    let receipt = session.submit(&CancellationToken::new()).await.unwrap();
    assert_eq!(receipt.images, 0);
    let record = backends.records.get(&receipt.record_id).unwrap();
    assert_eq!(record.get("category"), Some(&json!("residential")));
    assert_eq!(record.get("property_type"), Some(&json!("Apartment")));
    assert_eq!(record.get("furnished"), Some(&json!(false)));
    assert!(record.primary_image.is_none());
}

#[tokio::test(start_paused = true)]
async fn autosave_failure_shows_a_warning() {
    let backends = TestBackends::new();
    let session = backends.session("u42", fast_config());
    session.start().await;
    session.set_field("title", FieldValue::text("Loft")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backends.store.writes(), 1);

    backends.store.fail_writes(true);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(matches!(session.banner().current(), Some(Notice::Warning(_))));
    assert!(session.autosave_stats().unwrap().failures >= 1);

    // The form itself is untouched
    assert_eq!(
        session.wizard_snapshot().await.fields.get("title"),
        Some(&FieldValue::text("Loft"))
    );
}

#[tokio::test]
async fn declined_load_keeps_current_entries() {
    let backends = TestBackends::new().with_confirm(ScriptedConfirm::new([false], true));
    let session = backends.session("u42", ComposerConfig::new());
    session.start().await;
    session.set_field("title", FieldValue::text("Stored")).await.unwrap();
    session.save_draft().await.unwrap();
    session.set_field("title", FieldValue::text("Typed since")).await.unwrap();

    assert!(session.load_draft().await.unwrap_err().is_declined());
    assert_eq!(backends.confirm.asked().len(), 1);
    assert_eq!(
        session.wizard_snapshot().await.fields.get("title"),
        Some(&FieldValue::text("Typed since"))
    );

    // Second prompt falls back to yes
    session.load_draft().await.unwrap();
    assert_eq!(
        session.wizard_snapshot().await.fields.get("title"),
        Some(&FieldValue::text("Stored"))
    );
}

#[tokio::test]
async fn resumed_session_gets_the_saved_draft() {
    let backends = TestBackends::new();
    let first = ready_session(&backends, ComposerConfig::new(), &["a.jpg"]).await;
    first.jump_to(StepId(3)).await.unwrap();
    first.save_draft().await.unwrap();
    assert!(first.cancel().await.is_some());

    let second = backends.session("u42", ComposerConfig::new());
    let summary = second.start().await.unwrap();
    assert_eq!(summary.current_step, StepId(3));

    second.load_draft().await.unwrap();
    assert_eq!(second.current_step().await, StepId(3));
    assert_eq!(second.staged().await.len(), 1);
    assert!(backends.confirm.asked().is_empty());
}

#[tokio::test]
async fn cleared_draft_starts_the_form_over() {
    let backends = TestBackends::new();
    let session = ready_session(&backends, ComposerConfig::new(), &["a.jpg"]).await;
    session.save_draft().await.unwrap();

    session.clear_draft().await.unwrap();
    assert!(!session.drafts().exists(session.owner()).await.unwrap());
    assert_eq!(session.current_step().await, StepId::FIRST);
    assert!(session.staged().await.is_empty());
}

#[tokio::test]
async fn unstaging_unknown_media_is_an_error() {
    let backends = TestBackends::new();
    let session = backends.session("u42", ComposerConfig::new());
    session.start().await;
    let id = session.stage(sample_files(&["a.jpg"]).remove(0)).await.unwrap();

    session.unstage(id).await.unwrap();
    assert!(matches!(
        session.unstage(id).await,
        Err(ComposerError::Media(MediaError::NotStaged(_)))
    ));
}

async fn partially_uploaded_session(backends: &TestBackends) -> ComposerSession {
    backends.uploader.fail_on("b.jpg");
    let config = ComposerConfig::new().with_upload_policy(UploadPolicy::KeepPartial);
    let session = ready_session(backends, config, &["a.jpg", "b.jpg", "c.jpg"]).await;
    assert!(session.submit(&CancellationToken::new()).await.is_err());
    assert_eq!(backends.uploader.stored().len(), 2);
    session
}

fn stored_names(backends: &TestBackends) -> Vec<String> {
    let mut names: Vec<String> = backends
        .uploader
        .stored()
        .iter()
        .filter_map(|r| r.as_str().rsplit('-').next().map(str::to_string))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn unstaging_a_kept_upload_deletes_it_remotely() {
    let backends = TestBackends::new();
    let session = partially_uploaded_session(&backends).await;

    let a = session.staged().await[0].clone();
    assert_eq!(a.source.name, "a.jpg");
    assert!(a.uploaded.is_some());

    session.unstage(a.local_id).await.unwrap();
    assert_eq!(stored_names(&backends), vec!["c.jpg".to_string()]);
}

#[tokio::test]
async fn clearing_the_draft_deletes_kept_uploads() {
    let backends = TestBackends::new();
    let session = partially_uploaded_session(&backends).await;
    session.save_draft().await.unwrap();

    session.clear_draft().await.unwrap();
    assert!(backends.uploader.stored().is_empty());
    assert!(session.staged().await.is_empty());
}

#[tokio::test]
async fn loading_a_draft_keeps_uploads_it_still_refers_to() {
    let backends = TestBackends::new();
    let session = partially_uploaded_session(&backends).await;
    session.save_draft().await.unwrap();

    session.load_draft().await.unwrap();
    assert_eq!(stored_names(&backends), vec!["a.jpg".to_string(), "c.jpg".to_string()]);
    let kept = session.staged().await.iter().filter(|m| m.uploaded.is_some()).count();
    assert_eq!(kept, 2);
}

#[tokio::test]
async fn loading_an_older_draft_deletes_uploads_it_replaces() {
    let backends = TestBackends::new();
    let session = backends.session("u42", ComposerConfig::new().with_upload_policy(UploadPolicy::KeepPartial));
    session.start().await;
    fill_session(&session).await.unwrap();
    session.save_draft().await.unwrap();

    for file in sample_files(&["a.jpg", "b.jpg"]) {
        session.stage(file).await.unwrap();
    }
    backends.uploader.fail_on("b.jpg");
    assert!(session.submit(&CancellationToken::new()).await.is_err());
    assert_eq!(stored_names(&backends), vec!["a.jpg".to_string()]);

    session.load_draft().await.unwrap();
    assert!(session.staged().await.is_empty());
    assert!(backends.uploader.stored().is_empty());
}
