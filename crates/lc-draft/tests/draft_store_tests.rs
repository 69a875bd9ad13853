use lc_draft::{DraftSnapshot, DraftStore, FileStore, PersistenceError};
use lc_media::{LocalId, OwnerId, SourceFile, StagedMediaRef};
use lc_wizard::{FieldValue, StepId, StepWizard, WizardSchema};
use std::sync::Arc;

fn wizard_at_step_three() -> StepWizard {
    let mut w = StepWizard::new(Arc::new(WizardSchema::listing()));
    w.set_field("title", "X").unwrap();
    w.jump_to(StepId(3)).unwrap();
    w
}

#[tokio::test]
async fn owner_u42_resumes_at_step_three() {
    let dir = tempfile::tempdir().unwrap();
    let store = DraftStore::new(Arc::new(FileStore::new(dir.path())));
    let owner = OwnerId::new("u42");

    let wizard = wizard_at_step_three();
    let staged = vec![StagedMediaRef {
        local_id: LocalId::new(),
        source: SourceFile::new("/pics/hall.jpg", "image/jpeg", 2048),
        uploaded: None,
    }];
    store
        .save(
            &owner,
            DraftSnapshot {
                wizard: wizard.snapshot(),
                staged_media: staged.clone(),
            },
        )
        .await
        .unwrap();

    // A fresh store over the same directory stands in for a restarted process
    let reopened = DraftStore::new(Arc::new(FileStore::new(dir.path())));
    let draft = reopened.load(&owner).await.unwrap().unwrap();
    assert_eq!(draft.current_step, StepId(3));
    assert_eq!(draft.fields.get("title"), Some(&FieldValue::text("X")));
    assert_eq!(draft.staged_media, staged);

    let mut restored = StepWizard::new(Arc::new(WizardSchema::listing()));
    restored.restore(draft.into_snapshot().wizard);
    assert_eq!(restored.snapshot(), wizard.snapshot());
}

#[tokio::test]
async fn clear_then_exists_is_false() {
    let dir = tempfile::tempdir().unwrap();
    let store = DraftStore::new(Arc::new(FileStore::new(dir.path())));
    let owner = OwnerId::new("u1");

    store
        .save(
            &owner,
            DraftSnapshot {
                wizard: wizard_at_step_three().snapshot(),
                staged_media: vec![],
            },
        )
        .await
        .unwrap();
    store.clear(&owner).await.unwrap();
    assert!(!store.exists(&owner).await.unwrap());
}

#[tokio::test]
async fn unwritable_directory_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let store = DraftStore::new(Arc::new(FileStore::new(&blocker)));
    let err = store
        .save(
            &OwnerId::new("u1"),
            DraftSnapshot {
                wizard: wizard_at_step_three().snapshot(),
                staged_media: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PersistenceError::Io(_)));
}
