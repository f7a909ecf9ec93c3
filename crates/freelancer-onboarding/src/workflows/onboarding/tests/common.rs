use std::collections::{BTreeSet, HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::workflows::onboarding::backend::{
    ApplicationRecord, ApplicationRepository, InMemoryApplicationRepository, InMemoryBlobStore,
    OnboardingBackend, RepositoryError,
};
use crate::workflows::onboarding::domain::{
    Address, ApplicationId, ExperienceDetails, Gender, PersonalDetails, PhoneNumber, ResumeFile,
    SpecialisationDetails, StorageKey,
};
use crate::workflows::onboarding::remote::{
    ExistingApplication, RemoteApplication, RemoteError, RemotePersistence, ResumeStorage,
    StartOutcome, StartRequest, StepSave,
};
use crate::workflows::onboarding::{StepInput, WizardController, WizardStep};

pub(super) const EMAIL: &str = "ana.ruiz@example.org";
pub(super) const VALID_OTP: &str = "482913";
pub(super) const FOLDER: &str = "freelancer-resumes";

/// `count` single-letter tokens separated by single spaces.
pub(super) fn words(count: usize) -> String {
    vec!["w"; count].join(" ")
}

pub(super) fn specialisation_details() -> SpecialisationDetails {
    SpecialisationDetails::new(EMAIL, ["Economics", "Statistics"])
}

pub(super) fn experience(word_count: usize) -> ExperienceDetails {
    ExperienceDetails {
        words_per_day: NonZeroU32::new(2000),
        linkedin: Some("https://www.linkedin.com/in/ana-ruiz".to_string()),
        published_work_links: vec![
            "https://journals.example.org/ruiz-2024".to_string(),
            "   ".to_string(),
        ],
        past_experience: words(word_count),
    }
}

pub(super) fn personal_details() -> PersonalDetails {
    PersonalDetails {
        full_name: "Ana Ruiz".to_string(),
        gender: Some(Gender::Female),
        phone: Some(PhoneNumber::new("+34", "612345678")),
        address: Address {
            country: Some("Spain".to_string()),
            city: Some("Valencia".to_string()),
            pin_code: Some("46001".to_string()),
            ..Address::default()
        },
    }
}

pub(super) fn resume_file() -> ResumeFile {
    ResumeFile::new("ana-ruiz-cv.pdf", b"%PDF-1.7 resume".to_vec())
}

pub(super) fn existing(id: &str, completed_step: u8) -> ExistingApplication {
    ExistingApplication {
        application_id: ApplicationId(id.to_string()),
        current_step: completed_step,
        specialisations: BTreeSet::from(["Economics".to_string()]),
        created_at: Utc
            .with_ymd_and_hms(2026, 9, 30, 8, 15, 0)
            .single()
            .expect("valid timestamp"),
    }
}

/// Server record with steps 1 and 2 completed.
pub(super) fn stored_record(id: &str) -> RemoteApplication {
    RemoteApplication {
        application_id: ApplicationId(id.to_string()),
        email: EMAIL.to_string(),
        specialisations: BTreeSet::from(["Economics".to_string()]),
        current_step: 2,
        experience: ExperienceDetails {
            words_per_day: NonZeroU32::new(1200),
            linkedin: Some("https://www.linkedin.com/in/ana-old".to_string()),
            published_work_links: vec!["https://blog.example.org/ana".to_string()],
            past_experience: words(64),
        },
        resume_url: None,
        email_verified: false,
        personal_details: PersonalDetails::default(),
        submitted: false,
        created_at: None,
    }
}

/// A backend call as observed by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Call {
    Start { email: String, force_new: bool },
    Fetch(ApplicationId),
    Save(StepSave),
    SendOtp,
    VerifyOtp(String),
    Submit(PersonalDetails),
}

/// Records every call and answers from a script. Operations listed in `failures`
/// fail with the stored error until [`ScriptedBackend::recover`] is called.
#[derive(Default)]
pub(super) struct ScriptedBackend {
    calls: Mutex<Vec<Call>>,
    start_outcomes: Mutex<VecDeque<StartOutcome>>,
    record: Mutex<Option<RemoteApplication>>,
    failures: Mutex<HashMap<&'static str, RemoteError>>,
    issued: AtomicUsize,
}

impl ScriptedBackend {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(super) fn queue_start(&self, outcome: StartOutcome) {
        self.start_outcomes.lock().expect("lock").push_back(outcome);
    }

    pub(super) fn store_record(&self, record: RemoteApplication) {
        *self.record.lock().expect("lock") = Some(record);
    }

    pub(super) fn fail(&self, operation: &'static str, err: RemoteError) {
        self.failures.lock().expect("lock").insert(operation, err);
    }

    pub(super) fn recover(&self, operation: &'static str) {
        self.failures.lock().expect("lock").remove(operation);
    }

    pub(super) fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    pub(super) fn call_count(&self) -> usize {
        self.calls.lock().expect("lock").len()
    }

    fn record_call(&self, operation: &'static str, call: Call) -> Result<(), RemoteError> {
        self.calls.lock().expect("lock").push(call);
        match self.failures.lock().expect("lock").get(operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemotePersistence for ScriptedBackend {
    async fn start(&self, request: StartRequest) -> Result<StartOutcome, RemoteError> {
        self.record_call(
            "start",
            Call::Start {
                email: request.email,
                force_new: request.force_new,
            },
        )?;
        let scripted = self.start_outcomes.lock().expect("lock").pop_front();
        Ok(scripted.unwrap_or_else(|| {
            let issued = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
            StartOutcome::Fresh {
                application_id: ApplicationId(format!("app-{issued:06}")),
                current_step: 1,
            }
        }))
    }

    async fn fetch(&self, id: &ApplicationId) -> Result<RemoteApplication, RemoteError> {
        self.record_call("fetch", Call::Fetch(id.clone()))?;
        self.record
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| RemoteError::Rejected {
                status: Some(404),
                message: "application not found".to_string(),
            })
    }

    async fn save_step(&self, _id: &ApplicationId, save: StepSave) -> Result<(), RemoteError> {
        self.record_call("save_step", Call::Save(save))
    }

    async fn send_otp(&self, _id: &ApplicationId) -> Result<(), RemoteError> {
        self.record_call("send_otp", Call::SendOtp)
    }

    async fn verify_otp(&self, _id: &ApplicationId, otp: &str) -> Result<(), RemoteError> {
        self.record_call("verify_otp", Call::VerifyOtp(otp.to_string()))?;
        if otp == VALID_OTP {
            Ok(())
        } else {
            Err(RemoteError::Rejected {
                status: Some(422),
                message: "invalid code".to_string(),
            })
        }
    }

    async fn submit(
        &self,
        _id: &ApplicationId,
        details: &PersonalDetails,
    ) -> Result<(), RemoteError> {
        self.record_call("submit", Call::Submit(details.clone()))
    }
}

/// Storage double that hands out sequential keys inside the requested folder.
#[derive(Default)]
pub(super) struct ScriptedStorage {
    uploads: Mutex<Vec<(String, String)>>,
    failure: Mutex<Option<RemoteError>>,
    stalled: bool,
}

impl ScriptedStorage {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Storage whose uploads never complete.
    pub(super) fn stalled() -> Arc<Self> {
        Arc::new(Self {
            stalled: true,
            ..Self::default()
        })
    }

    pub(super) fn fail_with(&self, err: RemoteError) {
        *self.failure.lock().expect("lock") = Some(err);
    }

    pub(super) fn recover(&self) {
        *self.failure.lock().expect("lock") = None;
    }

    /// `(folder, file name)` of every attempted upload.
    pub(super) fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ResumeStorage for ScriptedStorage {
    async fn upload(&self, file: &ResumeFile, folder: &str) -> Result<StorageKey, RemoteError> {
        let attempt = {
            let mut uploads = self.uploads.lock().expect("lock");
            uploads.push((folder.to_string(), file.file_name.clone()));
            uploads.len()
        };
        if self.stalled {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.failure.lock().expect("lock").clone() {
            return Err(err);
        }
        Ok(StorageKey(format!("{folder}/{attempt:06}-{}", file.file_name)))
    }
}

pub(super) type TestController = WizardController<ScriptedBackend, ScriptedStorage>;

pub(super) fn controller(backend: &Arc<ScriptedBackend>) -> TestController {
    WizardController::new(backend.clone(), ScriptedStorage::new(), FOLDER)
}

pub(super) fn controller_with_storage(
    backend: &Arc<ScriptedBackend>,
    storage: &Arc<ScriptedStorage>,
) -> TestController {
    WizardController::new(backend.clone(), storage.clone(), FOLDER)
}

/// Runs a fresh start and the experience step, leaving the wizard on step 3.
pub(super) async fn at_verification(controller: &mut TestController) {
    controller
        .start(specialisation_details())
        .await
        .expect("start succeeds");
    let step = controller
        .advance(StepInput::Experience(experience(60)))
        .await
        .expect("experience accepted");
    assert_eq!(step, WizardStep::Verification);
}

/// Completes step 3 and leaves the wizard on step 4.
pub(super) async fn at_personal_details(controller: &mut TestController) {
    at_verification(controller).await;
    controller
        .select_resume(resume_file())
        .expect("file selected");
    controller.upload_resume().await.expect("upload succeeds");
    controller.send_otp().await.expect("otp sent");
    controller.verify_otp(VALID_OTP).await.expect("otp verified");
    let step = controller
        .advance(StepInput::Verification)
        .await
        .expect("verification accepted");
    assert_eq!(step, WizardStep::PersonalDetails);
}

pub(super) type MemoryBackend = OnboardingBackend<InMemoryApplicationRepository, InMemoryBlobStore>;

pub(super) fn backend_service() -> Arc<MemoryBackend> {
    Arc::new(OnboardingBackend::new(
        Arc::new(InMemoryApplicationRepository::default()),
        Arc::new(InMemoryBlobStore::default()),
    ))
}

pub(super) struct UnavailableRepository;

impl ApplicationRepository for UnavailableRepository {
    fn insert(&self, _record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn modify<T, E>(
        &self,
        _id: &ApplicationId,
        _apply: impl FnOnce(&mut ApplicationRecord) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>,
    {
        Err(RepositoryError::Unavailable("database offline".to_string()).into())
    }

    fn fetch(&self, _id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn latest_incomplete(
        &self,
        _email: &str,
    ) -> Result<Option<ApplicationRecord>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
