use std::collections::BTreeSet;

use super::common::*;
use crate::workflows::onboarding::domain::{
    ApplicationId, ExperienceDetails, PersonalDetails, StorageKey, UploadState,
};
use crate::workflows::onboarding::remote::{RemoteError, StartOutcome};
use crate::workflows::onboarding::{ResumeChoice, StartProgress, StepInput, WizardError, WizardStep};

const PRIOR_ID: &str = "app-000042";

async fn conflicted(backend: &std::sync::Arc<ScriptedBackend>) -> TestController {
    backend.queue_start(StartOutcome::Existing(existing(PRIOR_ID, 2)));
    let mut controller = controller(backend);
    let progress = controller
        .start(specialisation_details())
        .await
        .expect("start succeeds");
    assert_eq!(progress, StartProgress::ConflictFound(existing(PRIOR_ID, 2)));
    controller
}

#[tokio::test]
async fn conflict_blocks_progress_until_resolved() {
    let backend = ScriptedBackend::new();
    let mut controller = conflicted(&backend).await;

    assert!(controller.state().is_none());
    assert_eq!(
        controller.pending_conflict().map(|existing| &existing.application_id),
        Some(&ApplicationId(PRIOR_ID.to_string()))
    );
    assert_eq!(
        controller
            .advance(StepInput::Experience(experience(60)))
            .await,
        Err(WizardError::ConflictPending)
    );
    assert_eq!(
        controller.start(specialisation_details()).await,
        Err(WizardError::ConflictPending)
    );
    assert_eq!(controller.send_otp().await, Err(WizardError::ConflictPending));
    assert_eq!(backend.call_count(), 1);
    assert!(controller.snapshot().pending_conflict.is_some());
}

#[tokio::test]
async fn resuming_opens_the_step_after_the_last_completed_one() {
    let backend = ScriptedBackend::new();
    backend.store_record(stored_record(PRIOR_ID));
    let mut controller = conflicted(&backend).await;

    let step = controller
        .resolve_resume_conflict(ResumeChoice::Resume)
        .await
        .expect("resumed");

    assert_eq!(step, WizardStep::Verification);
    assert!(controller.pending_conflict().is_none());
    let record = stored_record(PRIOR_ID);
    let state = controller.state().expect("hydrated");
    assert_eq!(state.application_id, record.application_id);
    assert_eq!(state.current_step, WizardStep::Verification);
    assert_eq!(state.email, record.email);
    assert_eq!(state.specialisations, record.specialisations);
    assert_eq!(state.experience, record.experience);
    assert_eq!(state.resume.upload_state, UploadState::Idle);
    assert!(!state.email_verification.verified);
    assert_eq!(
        backend.calls().last(),
        Some(&Call::Fetch(ApplicationId(PRIOR_ID.to_string())))
    );
}

#[tokio::test]
async fn out_of_range_server_step_resumes_at_personal_details() {
    let backend = ScriptedBackend::new();
    let mut record = stored_record(PRIOR_ID);
    record.current_step = u8::MAX;
    backend.store_record(record);
    let mut controller = conflicted(&backend).await;

    let step = controller
        .resolve_resume_conflict(ResumeChoice::Resume)
        .await
        .expect("resumed");

    assert_eq!(step, WizardStep::PersonalDetails);
    assert_eq!(controller.current_step(), WizardStep::PersonalDetails);
}

#[tokio::test]
async fn resumed_upload_and_verification_carry_over() {
    let backend = ScriptedBackend::new();
    let mut record = stored_record(PRIOR_ID);
    record.current_step = 3;
    record.resume_url = Some(StorageKey("freelancer-resumes/000009-cv.pdf".to_string()));
    record.email_verified = true;
    backend.store_record(record);
    let mut controller = conflicted(&backend).await;

    let step = controller
        .resolve_resume_conflict(ResumeChoice::Resume)
        .await
        .expect("resumed");
    assert_eq!(step, WizardStep::PersonalDetails);

    controller.back().expect("back to step 3");
    let step = controller
        .advance(StepInput::Verification)
        .await
        .expect("resume and email already settled");
    assert_eq!(step, WizardStep::PersonalDetails);
}

#[tokio::test]
async fn resuming_a_submitted_record_lands_on_terminal_state() {
    let backend = ScriptedBackend::new();
    let mut record = stored_record(PRIOR_ID);
    record.current_step = 4;
    record.submitted = true;
    backend.store_record(record);
    let mut controller = conflicted(&backend).await;

    let step = controller
        .resolve_resume_conflict(ResumeChoice::Resume)
        .await
        .expect("resumed");
    assert_eq!(step, WizardStep::Submitted);
    assert_eq!(controller.back(), Err(WizardError::AlreadySubmitted));
}

#[tokio::test]
async fn failed_fetch_keeps_conflict_open() {
    let backend = ScriptedBackend::new();
    let mut controller = conflicted(&backend).await;

    let err = controller
        .resolve_resume_conflict(ResumeChoice::Resume)
        .await
        .expect_err("record missing");
    assert_eq!(err.to_string(), "application not found");
    assert!(controller.pending_conflict().is_some());
    assert!(controller.state().is_none());
}

#[tokio::test]
async fn mismatched_fetch_is_rejected_as_malformed() {
    let backend = ScriptedBackend::new();
    backend.store_record(stored_record("app-999999"));
    let mut controller = conflicted(&backend).await;

    let err = controller
        .resolve_resume_conflict(ResumeChoice::Resume)
        .await
        .expect_err("wrong record");
    assert!(matches!(
        err,
        WizardError::Remote(RemoteError::MalformedResponse(_))
    ));
    assert!(controller.state().is_none());
}

#[tokio::test]
async fn start_fresh_gets_a_new_id_and_drops_prior_fields() {
    let backend = ScriptedBackend::new();
    backend.store_record(stored_record(PRIOR_ID));
    let mut controller = conflicted(&backend).await;

    let step = controller
        .resolve_resume_conflict(ResumeChoice::StartFresh)
        .await
        .expect("fresh start");

    assert_eq!(step, WizardStep::Experience);
    assert_eq!(
        backend.calls().last(),
        Some(&Call::Start {
            email: EMAIL.to_string(),
            force_new: true,
        })
    );

    let state = controller.state().expect("state");
    assert_ne!(state.application_id, ApplicationId(PRIOR_ID.to_string()));
    assert_eq!(state.email, EMAIL);
    assert_eq!(
        state.specialisations,
        BTreeSet::from(["Economics".to_string(), "Statistics".to_string()])
    );
    assert_eq!(state.experience, ExperienceDetails::default());
    assert_eq!(state.resume.remote_reference, None);
    assert!(!state.email_verification.verified);
    assert_eq!(state.personal_details, PersonalDetails::default());
    assert!(!backend
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Fetch(_))));
}

#[tokio::test]
async fn start_fresh_rejects_a_reused_id() {
    let backend = ScriptedBackend::new();
    let mut controller = conflicted(&backend).await;
    backend.queue_start(StartOutcome::Fresh {
        application_id: ApplicationId(PRIOR_ID.to_string()),
        current_step: 1,
    });

    let err = controller
        .resolve_resume_conflict(ResumeChoice::StartFresh)
        .await
        .expect_err("id reused");
    assert!(matches!(
        err,
        WizardError::Remote(RemoteError::MalformedResponse(_))
    ));
    assert!(controller.pending_conflict().is_some());

    let step = controller
        .resolve_resume_conflict(ResumeChoice::StartFresh)
        .await
        .expect("second attempt gets a new id");
    assert_eq!(step, WizardStep::Experience);
}

#[tokio::test]
async fn resolving_without_a_conflict_is_an_error() {
    let backend = ScriptedBackend::new();
    let mut controller = controller(&backend);

    assert_eq!(
        controller
            .resolve_resume_conflict(ResumeChoice::Resume)
            .await,
        Err(WizardError::NoConflict)
    );
    assert_eq!(backend.call_count(), 0);
}
