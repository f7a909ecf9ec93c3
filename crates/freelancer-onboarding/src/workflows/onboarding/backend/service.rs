use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use super::repository::{ApplicationRecord, ApplicationRepository, BlobStore, RepositoryError};
use crate::workflows::onboarding::domain::{normalize_specialisations, ApplicationId, StorageKey};
use crate::workflows::onboarding::remote::wire::{
    ApplicationRecordBody, ExperienceRequestBody, FreshStartBody, ResumeRequestBody,
    SendOtpRequestBody, SpecialisationsRequestBody, StartRequestBody, StartResponseBody,
    SubmitRequestBody, UploadResponseBody, VerifyOtpRequestBody,
};
use crate::workflows::onboarding::remote::RemoteError;
use crate::workflows::onboarding::validation::{
    validate_email, validate_experience, validate_otp, validate_personal_details,
    ValidationError,
};

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

fn issue_otp() -> String {
    let code: u32 = rand::rng().random_range(0..1_000_000);
    format!("{code:06}")
}

/// Reference implementation of the application REST contract.
pub struct OnboardingBackend<R, B> {
    repository: Arc<R>,
    blobs: Arc<B>,
}

impl<R, B> OnboardingBackend<R, B>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    pub fn new(repository: Arc<R>, blobs: Arc<B>) -> Self {
        Self { repository, blobs }
    }

    /// Creates an application, or reports the latest incomplete one for the email
    /// unless `forceNew` is set. Abandoned applications are left in place.
    pub fn start(&self, request: StartRequestBody) -> Result<StartResponseBody, BackendError> {
        let email = request.email.trim().to_string();
        validate_email(&email)?;
        let specialisations = normalize_specialisations(request.specialisations);
        if specialisations.is_empty() {
            return Err(ValidationError::NoSpecialisation.into());
        }

        if !request.force_new {
            if let Some(existing) = self.repository.latest_incomplete(&email)? {
                debug!(application_id = %existing.application_id, "incomplete application exists");
                return Ok(StartResponseBody::from(&existing.summary()));
            }
        }

        let record =
            ApplicationRecord::new(next_application_id(), email, specialisations, Utc::now());
        let stored = self.repository.insert(record)?;
        info!(application_id = %stored.application_id, "application created");

        Ok(StartResponseBody::Fresh(FreshStartBody {
            application_id: stored.application_id.0,
            current_step: stored.completed_step,
        }))
    }

    pub fn fetch(&self, id: &ApplicationId) -> Result<ApplicationRecordBody, BackendError> {
        Ok(self.load(id)?.to_body())
    }

    pub fn save_specialisations(
        &self,
        id: &ApplicationId,
        request: SpecialisationsRequestBody,
    ) -> Result<(), BackendError> {
        ensure_same_id(id, &request.application_id)?;
        let specialisations = normalize_specialisations(request.specialisations);
        if specialisations.is_empty() {
            return Err(ValidationError::NoSpecialisation.into());
        }

        self.modify_open(id, |record| {
            record.specialisations = specialisations;
            Ok(())
        })
    }

    pub fn save_experience(
        &self,
        id: &ApplicationId,
        request: ExperienceRequestBody,
    ) -> Result<(), BackendError> {
        ensure_same_id(id, &request.application_id)?;
        let experience = request.into_details();
        validate_experience(&experience)?;

        self.modify_open(id, |record| {
            record.experience = experience;
            record.complete_step(2);
            Ok(())
        })
    }

    pub fn save_resume(
        &self,
        id: &ApplicationId,
        request: ResumeRequestBody,
    ) -> Result<(), BackendError> {
        ensure_same_id(id, &request.application_id)?;
        let resume_url = request.resume_url.trim().to_string();
        if resume_url.is_empty() {
            return Err(BackendError::BadUpload("resumeUrl is required".to_string()));
        }

        self.modify_open(id, |record| {
            require_completed(record, 2)?;
            record.resume_url = Some(StorageKey(resume_url));
            if record.email_verified {
                record.complete_step(3);
            }
            Ok(())
        })
    }

    /// Issues a fresh code, replacing any earlier unverified one.
    pub fn send_otp(
        &self,
        id: &ApplicationId,
        request: SendOtpRequestBody,
    ) -> Result<(), BackendError> {
        ensure_same_id(id, &request.application_id)?;
        self.modify_open(id, |record| {
            require_completed(record, 2)?;
            record.pending_otp = Some(issue_otp());
            Ok(())
        })?;
        debug!(application_id = %id, "verification code issued");
        Ok(())
    }

    pub fn verify_otp(
        &self,
        id: &ApplicationId,
        request: VerifyOtpRequestBody,
    ) -> Result<(), BackendError> {
        ensure_same_id(id, &request.application_id)?;
        validate_otp(&request.otp)?;

        let newly_verified = self.modify_open(id, |record| {
            if record.email_verified {
                return Ok(false);
            }
            let expected = record
                .pending_otp
                .as_deref()
                .ok_or(BackendError::OtpNotRequested)?;
            if expected != request.otp.trim() {
                return Err(BackendError::InvalidOtp);
            }

            record.pending_otp = None;
            record.email_verified = true;
            if record.resume_url.is_some() {
                record.complete_step(3);
            }
            Ok(true)
        })?;
        if newly_verified {
            info!(application_id = %id, "email verified");
        }
        Ok(())
    }

    pub fn submit(
        &self,
        id: &ApplicationId,
        request: SubmitRequestBody,
    ) -> Result<(), BackendError> {
        ensure_same_id(id, &request.application_id)?;
        let details = request.details.decode().map_err(|err| match err {
            RemoteError::MalformedResponse(message) => BackendError::BadRequest(message),
            other => BackendError::BadRequest(other.to_string()),
        })?;
        validate_personal_details(&details)?;

        self.modify_open(id, |record| {
            require_completed(record, 3)?;
            record.personal_details = details;
            record.submitted = true;
            record.complete_step(4);
            Ok(())
        })?;
        info!(application_id = %id, "application submitted");
        Ok(())
    }

    pub fn upload(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponseBody, BackendError> {
        if bytes.is_empty() {
            return Err(BackendError::BadUpload("uploaded file is empty".to_string()));
        }
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(BackendError::BadUpload("file name is required".to_string()));
        }

        let key = self.blobs.put(folder, file_name, bytes)?;
        debug!(storage_key = %key, "blob stored");
        Ok(UploadResponseBody { key: key.0 })
    }

    /// The code most recently issued for an application. There is no delivery channel,
    /// so local tooling reads it from here.
    pub fn issued_otp(&self, id: &ApplicationId) -> Result<Option<String>, BackendError> {
        Ok(self.load(id)?.pending_otp)
    }

    fn load(&self, id: &ApplicationId) -> Result<ApplicationRecord, BackendError> {
        self.repository.fetch(id)?.ok_or(BackendError::NotFound)
    }

    /// Read-modify-write of an unsubmitted record inside a single repository call.
    fn modify_open<T>(
        &self,
        id: &ApplicationId,
        apply: impl FnOnce(&mut ApplicationRecord) -> Result<T, BackendError>,
    ) -> Result<T, BackendError> {
        self.repository
            .modify(id, |record| {
                if record.submitted {
                    return Err(BackendError::AlreadySubmitted);
                }
                let outcome = apply(record)?;
                record.updated_at = Utc::now();
                Ok(outcome)
            })
            .map_err(|err| match err {
                BackendError::Repository(RepositoryError::NotFound) => BackendError::NotFound,
                other => other,
            })
    }
}

fn ensure_same_id(path_id: &ApplicationId, body_id: &str) -> Result<(), BackendError> {
    if path_id.0 != body_id.trim() {
        return Err(BackendError::BadRequest(format!(
            "applicationId '{body_id}' does not match the request path"
        )));
    }
    Ok(())
}

fn require_completed(record: &ApplicationRecord, step: u8) -> Result<(), BackendError> {
    if record.completed_step < step {
        return Err(BackendError::StepLocked { required: step });
    }
    Ok(())
}

/// Error raised by the reference backend. `Display` becomes the response `message`.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("application not found")]
    NotFound,
    #[error("application has already been submitted")]
    AlreadySubmitted,
    #[error("complete step {required} first")]
    StepLocked { required: u8 },
    #[error("request a verification code first")]
    OtpNotRequested,
    #[error("invalid code")]
    InvalidOtp,
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    BadUpload(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
