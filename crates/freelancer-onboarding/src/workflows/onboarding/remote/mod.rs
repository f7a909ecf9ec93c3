//! The backend as seen by the wizard: a black box that acknowledges or rejects.

pub mod http;
pub mod wire;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    ApplicationId, ExperienceDetails, PersonalDetails, ResumeFile, SpecialisationDetails,
    StorageKey, WizardStep,
};

pub use http::HttpBackendClient;

/// Failure of any backend or upload call. Never fatal to the wizard.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The backend answered with an error; `message` is shown to the applicant as-is.
    #[error("{message}")]
    Rejected { status: Option<u16>, message: String },
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl RemoteError {
    pub fn rejected(message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status: None,
            message: message.into(),
        }
    }
}

/// Payload of the `start` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRequest {
    pub email: String,
    pub specialisations: BTreeSet<String>,
    /// Ask for a new application id even if an incomplete one exists for the email.
    pub force_new: bool,
}

impl StartRequest {
    pub fn new(details: &SpecialisationDetails, force_new: bool) -> Self {
        Self {
            email: details.email.clone(),
            specialisations: details.specialisations.clone(),
            force_new,
        }
    }
}

/// Outcome of `start`: either a new id, or a prior incomplete application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    Fresh {
        application_id: ApplicationId,
        current_step: u8,
    },
    Existing(ExistingApplication),
}

/// Summary of an incomplete application found for the same email.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ExistingApplication {
    pub application_id: ApplicationId,
    /// Last completed step according to the backend.
    pub current_step: u8,
    pub specialisations: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// A fully decoded application record as returned by `fetch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteApplication {
    pub application_id: ApplicationId,
    pub email: String,
    pub specialisations: BTreeSet<String>,
    /// Last completed step, always within 1..=4.
    pub current_step: u8,
    pub experience: ExperienceDetails,
    pub resume_url: Option<StorageKey>,
    pub email_verified: bool,
    pub personal_details: PersonalDetails,
    pub submitted: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Data saved for one step before the wizard may move past it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSave {
    Specialisations(BTreeSet<String>),
    Experience(ExperienceDetails),
    Resume { resume_url: StorageKey },
}

impl StepSave {
    pub fn step(&self) -> WizardStep {
        match self {
            StepSave::Specialisations(_) => WizardStep::Specialisation,
            StepSave::Experience(_) => WizardStep::Experience,
            StepSave::Resume { .. } => WizardStep::Verification,
        }
    }
}

/// Application record persistence owned by the backend.
#[async_trait]
pub trait RemotePersistence: Send + Sync {
    async fn start(&self, request: StartRequest) -> Result<StartOutcome, RemoteError>;

    async fn fetch(&self, id: &ApplicationId) -> Result<RemoteApplication, RemoteError>;

    async fn save_step(&self, id: &ApplicationId, save: StepSave) -> Result<(), RemoteError>;

    async fn send_otp(&self, id: &ApplicationId) -> Result<(), RemoteError>;

    async fn verify_otp(&self, id: &ApplicationId, otp: &str) -> Result<(), RemoteError>;

    async fn submit(&self, id: &ApplicationId, details: &PersonalDetails)
        -> Result<(), RemoteError>;
}

/// The upload endpoint: raw bytes in, storage key out.
#[async_trait]
pub trait ResumeStorage: Send + Sync {
    async fn upload(&self, file: &ResumeFile, folder: &str) -> Result<StorageKey, RemoteError>;
}
