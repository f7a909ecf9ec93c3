use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::domain::{
    ApplicationId, ApplicationState, EmailVerification, ExperienceDetails, PersonalDetails,
    ResumeFile, ResumeUpload, SpecialisationDetails, StorageKey, UploadState, WizardStep,
};
use super::remote::{
    ExistingApplication, RemoteApplication, RemoteError, RemotePersistence, ResumeStorage,
    StartOutcome, StartRequest, StepSave,
};
use super::upload::{UploadCoordinator, UploadError};
use super::validation::{
    validate_experience, validate_otp, validate_personal_details, validate_specialisation,
    validate_verification, ValidationError,
};

/// Answer to "an incomplete application already exists for this email".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResumeChoice {
    Resume,
    StartFresh,
}

/// Result of a successful `start` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartProgress {
    Started { application_id: ApplicationId },
    /// Progress is blocked until [`WizardController::resolve_resume_conflict`] is called.
    ConflictFound(ExistingApplication),
}

/// Data submitted to leave the step that is currently displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepInput {
    /// Re-entering step 1 after navigating back.
    Specialisation(SpecialisationDetails),
    Experience(ExperienceDetails),
    /// Step 3 carries no form data; its saves happen through upload and OTP verification.
    Verification,
    PersonalDetails(PersonalDetails),
}

impl StepInput {
    pub fn step(&self) -> WizardStep {
        match self {
            StepInput::Specialisation(_) => WizardStep::Specialisation,
            StepInput::Experience(_) => WizardStep::Experience,
            StepInput::Verification => WizardStep::Verification,
            StepInput::PersonalDetails(_) => WizardStep::PersonalDetails,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("start the application first")]
    NotStarted,
    #[error("the application has already been started")]
    AlreadyStarted,
    #[error("choose whether to resume the existing application or start fresh")]
    ConflictPending,
    #[error("there is no existing application to resume")]
    NoConflict,
    #[error("{found} cannot be submitted while {expected} is open")]
    StepMismatch {
        expected: WizardStep,
        found: WizardStep,
    },
    #[error("only available on {required}, currently on {current}")]
    NotOnStep {
        required: WizardStep,
        current: WizardStep,
    },
    #[error("the application has already been submitted")]
    AlreadySubmitted,
    #[error("the email address cannot be changed; start a fresh application instead")]
    EmailChanged,
    #[error("already on the first step")]
    AtFirstStep,
}

/// Read projection handed to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WizardSnapshot {
    pub step: WizardStep,
    pub furthest_step: WizardStep,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_id: Option<ApplicationId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub upload_state: UploadState,
    pub resume_registered: bool,
    pub otp_requested: bool,
    pub email_verified: bool,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_conflict: Option<ExistingApplication>,
}

struct PendingConflict {
    existing: ExistingApplication,
    details: SpecialisationDetails,
}

/// Drives one applicant through the four steps.
///
/// Every operation validates locally, awaits at most one backend acknowledgment and only
/// then mutates state; a failure leaves the wizard exactly as it was. Operations take
/// `&mut self`, so only one can be in flight per controller.
pub struct WizardController<R, S> {
    remote: Arc<R>,
    uploads: UploadCoordinator<S>,
    state: Option<ApplicationState>,
    view_step: WizardStep,
    pending_conflict: Option<PendingConflict>,
}

impl<R, S> WizardController<R, S>
where
    R: RemotePersistence + 'static,
    S: ResumeStorage + 'static,
{
    pub fn new(remote: Arc<R>, storage: Arc<S>, upload_folder: impl Into<String>) -> Self {
        Self::with_uploads(remote, UploadCoordinator::new(storage, upload_folder))
    }

    pub fn with_uploads(remote: Arc<R>, uploads: UploadCoordinator<S>) -> Self {
        Self {
            remote,
            uploads,
            state: None,
            view_step: WizardStep::Specialisation,
            pending_conflict: None,
        }
    }

    pub fn state(&self) -> Option<&ApplicationState> {
        self.state.as_ref()
    }

    /// The step currently displayed. May trail the furthest unlocked step after `back`.
    pub fn current_step(&self) -> WizardStep {
        self.view_step
    }

    pub fn pending_conflict(&self) -> Option<&ExistingApplication> {
        self.pending_conflict.as_ref().map(|pending| &pending.existing)
    }

    pub fn snapshot(&self) -> WizardSnapshot {
        let state = self.state.as_ref();
        let resume = state.map(|state| &state.resume);
        let verification = state
            .map(|state| state.email_verification)
            .unwrap_or_default();

        WizardSnapshot {
            step: self.view_step,
            furthest_step: state
                .map(|state| state.current_step)
                .unwrap_or(WizardStep::Specialisation),
            application_id: state.map(|state| state.application_id.clone()),
            email: state.map(|state| state.email.clone()),
            upload_state: resume
                .map(|resume| resume.upload_state)
                .unwrap_or_default(),
            resume_registered: resume.is_some_and(|resume| resume.remote_reference.is_some()),
            otp_requested: verification.otp_requested,
            email_verified: verification.verified,
            submitted: state.is_some_and(|state| state.submitted),
            pending_conflict: self.pending_conflict().cloned(),
        }
    }

    /// Step 1: registers the email and specialisations with the backend.
    pub async fn start(
        &mut self,
        details: SpecialisationDetails,
    ) -> Result<StartProgress, WizardError> {
        if let Some(state) = &self.state {
            return Err(if state.submitted {
                WizardError::AlreadySubmitted
            } else {
                WizardError::AlreadyStarted
            });
        }
        if self.pending_conflict.is_some() {
            return Err(WizardError::ConflictPending);
        }
        validate_specialisation(&details)?;

        debug!(email = %details.email, "starting application");
        let outcome = self
            .remote
            .start(StartRequest::new(&details, false))
            .await
            .map_err(|err| remote_failure("start", err))?;

        match outcome {
            StartOutcome::Fresh { application_id, .. } => {
                self.begin(application_id.clone(), details);
                Ok(StartProgress::Started { application_id })
            }
            StartOutcome::Existing(existing) => {
                info!(
                    application_id = %existing.application_id,
                    completed_step = existing.current_step,
                    "existing incomplete application found"
                );
                self.pending_conflict = Some(PendingConflict {
                    existing: existing.clone(),
                    details,
                });
                Ok(StartProgress::ConflictFound(existing))
            }
        }
    }

    /// Settles a pending conflict and returns the step now displayed.
    pub async fn resolve_resume_conflict(
        &mut self,
        choice: ResumeChoice,
    ) -> Result<WizardStep, WizardError> {
        let pending = self
            .pending_conflict
            .as_ref()
            .ok_or(WizardError::NoConflict)?;
        let existing_id = pending.existing.application_id.clone();

        match choice {
            ResumeChoice::Resume => {
                let record = self
                    .remote
                    .fetch(&existing_id)
                    .await
                    .map_err(|err| remote_failure("fetch", err))?;
                if record.application_id != existing_id {
                    return Err(malformed(format!(
                        "fetched application {} while resuming {}",
                        record.application_id, existing_id
                    )));
                }

                let state = hydrate(record);
                info!(
                    application_id = %state.application_id,
                    step = %state.current_step,
                    "resumed existing application"
                );
                self.view_step = state.current_step;
                self.state = Some(state);
                self.pending_conflict = None;
            }
            ResumeChoice::StartFresh => {
                let request = StartRequest::new(&pending.details, true);
                let outcome = self
                    .remote
                    .start(request)
                    .await
                    .map_err(|err| remote_failure("start", err))?;

                let application_id = match outcome {
                    StartOutcome::Fresh { application_id, .. }
                        if application_id != existing_id =>
                    {
                        application_id
                    }
                    StartOutcome::Fresh { .. } => {
                        return Err(malformed(format!(
                            "backend reused abandoned application {existing_id}"
                        )))
                    }
                    StartOutcome::Existing(_) => {
                        return Err(malformed(
                            "backend reported an existing application for a forced start"
                                .to_string(),
                        ))
                    }
                };

                info!(
                    %application_id,
                    abandoned = %existing_id,
                    "started fresh application"
                );
                if let Some(pending) = self.pending_conflict.take() {
                    self.begin(application_id, pending.details);
                }
            }
        }

        Ok(self.view_step)
    }

    /// Leaves the displayed step once its gate passes and the backend acknowledges it.
    pub async fn advance(&mut self, input: StepInput) -> Result<WizardStep, WizardError> {
        self.ensure_open()?;
        let found = input.step();
        if found != self.view_step {
            return Err(WizardError::StepMismatch {
                expected: self.view_step,
                found,
            });
        }

        let application_id = self.application_id()?.clone();
        match input {
            StepInput::Specialisation(details) => {
                validate_specialisation(&details)?;
                let state = self.state_ref()?;
                if !details.email.eq_ignore_ascii_case(&state.email) {
                    return Err(WizardError::EmailChanged);
                }

                if details.specialisations != state.specialisations {
                    let save = StepSave::Specialisations(details.specialisations.clone());
                    self.save(&application_id, save).await?;
                    self.state_mut()?.specialisations = details.specialisations;
                }
                self.move_forward()
            }
            StepInput::Experience(experience) => {
                validate_experience(&experience)?;
                self.save(&application_id, StepSave::Experience(experience.clone()))
                    .await?;
                self.state_mut()?.experience = experience;
                self.move_forward()
            }
            StepInput::Verification => {
                let state = self.state_ref()?;
                validate_verification(&state.resume, &state.email_verification)?;
                self.move_forward()
            }
            StepInput::PersonalDetails(details) => {
                validate_personal_details(&details)?;
                self.remote
                    .submit(&application_id, &details)
                    .await
                    .map_err(|err| remote_failure("submit", err))?;

                let state = self.state_mut()?;
                state.personal_details = details;
                state.submitted = true;
                state.current_step = WizardStep::Submitted;
                self.view_step = WizardStep::Submitted;
                info!(%application_id, "application submitted");
                Ok(WizardStep::Submitted)
            }
        }
    }

    /// Shows the previous step. Purely local; saved values stay in memory.
    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        if self.state.as_ref().is_some_and(|state| state.submitted) {
            return Err(WizardError::AlreadySubmitted);
        }
        let previous = self.view_step.previous().ok_or(WizardError::AtFirstStep)?;
        self.view_step = previous;
        Ok(previous)
    }

    /// Requests a new verification code. Repeat calls simply request another code.
    pub async fn send_otp(&mut self) -> Result<(), WizardError> {
        self.ensure_on(WizardStep::Verification)?;
        let application_id = self.application_id()?.clone();

        self.remote
            .send_otp(&application_id)
            .await
            .map_err(|err| remote_failure("send_otp", err))?;

        self.state_mut()?.email_verification.otp_requested = true;
        debug!(%application_id, "verification code requested");
        Ok(())
    }

    pub async fn verify_otp(&mut self, code: &str) -> Result<(), WizardError> {
        self.ensure_on(WizardStep::Verification)?;
        validate_otp(code)?;
        if self.state_ref()?.email_verification.verified {
            return Ok(());
        }
        let application_id = self.application_id()?.clone();

        self.remote
            .verify_otp(&application_id, code.trim())
            .await
            .map_err(|err| remote_failure("verify_otp", err))?;

        self.state_mut()?.email_verification.verified = true;
        info!(%application_id, "email verified");
        Ok(())
    }

    /// Picks the resume to upload next; does not contact the backend.
    pub fn select_resume(&mut self, file: ResumeFile) -> Result<(), WizardError> {
        self.ensure_open()?;
        let state = self.state.as_mut().ok_or(WizardError::NotStarted)?;
        self.uploads.select_file(&mut state.resume, file);
        Ok(())
    }

    pub async fn upload_resume(&mut self) -> Result<StorageKey, WizardError> {
        self.ensure_on(WizardStep::Verification)?;
        let state = self.state.as_mut().ok_or(WizardError::NotStarted)?;
        let application_id = state.application_id.clone();

        let key = self
            .uploads
            .upload(self.remote.as_ref(), &application_id, &mut state.resume)
            .await?;
        Ok(key)
    }

    fn begin(&mut self, application_id: ApplicationId, details: SpecialisationDetails) {
        let state = ApplicationState::started(application_id, details);
        info!(application_id = %state.application_id, "application started");
        self.view_step = state.current_step;
        self.state = Some(state);
        self.pending_conflict = None;
    }

    async fn save(
        &self,
        application_id: &ApplicationId,
        save: StepSave,
    ) -> Result<(), WizardError> {
        let step = save.step();
        debug!(%application_id, %step, "saving step");
        self.remote
            .save_step(application_id, save)
            .await
            .map_err(|err| remote_failure("save_step", err))
    }

    fn move_forward(&mut self) -> Result<WizardStep, WizardError> {
        let next = self.view_step.next();
        let state = self.state_mut()?;
        state.unlock(next);
        info!(application_id = %state.application_id, step = %next, "step acknowledged");
        self.view_step = next;
        Ok(next)
    }

    fn ensure_open(&self) -> Result<(), WizardError> {
        if self.pending_conflict.is_some() {
            return Err(WizardError::ConflictPending);
        }
        match &self.state {
            None => Err(WizardError::NotStarted),
            Some(state) if state.submitted => Err(WizardError::AlreadySubmitted),
            Some(_) => Ok(()),
        }
    }

    fn ensure_on(&self, required: WizardStep) -> Result<(), WizardError> {
        self.ensure_open()?;
        if self.view_step != required {
            return Err(WizardError::NotOnStep {
                required,
                current: self.view_step,
            });
        }
        Ok(())
    }

    fn application_id(&self) -> Result<&ApplicationId, WizardError> {
        Ok(&self.state_ref()?.application_id)
    }

    fn state_ref(&self) -> Result<&ApplicationState, WizardError> {
        self.state.as_ref().ok_or(WizardError::NotStarted)
    }

    fn state_mut(&mut self) -> Result<&mut ApplicationState, WizardError> {
        self.state.as_mut().ok_or(WizardError::NotStarted)
    }
}

/// Rebuilds local state from a fetched record, opening the step after the last completed one.
fn hydrate(record: RemoteApplication) -> ApplicationState {
    let current_step = if record.submitted {
        WizardStep::Submitted
    } else {
        WizardStep::from_number(record.current_step.saturating_add(1).min(4))
            .unwrap_or(WizardStep::PersonalDetails)
    };

    let resume = ResumeUpload {
        local_file: None,
        upload_state: if record.resume_url.is_some() {
            UploadState::Uploaded
        } else {
            UploadState::Idle
        },
        remote_reference: record.resume_url,
    };

    ApplicationState {
        application_id: record.application_id,
        email: record.email,
        specialisations: record.specialisations,
        current_step,
        experience: record.experience,
        resume,
        email_verification: EmailVerification {
            otp_requested: record.email_verified,
            verified: record.email_verified,
        },
        personal_details: record.personal_details,
        submitted: record.submitted,
        created_at: record.created_at,
    }
}

fn remote_failure(operation: &'static str, err: RemoteError) -> WizardError {
    warn!(operation, error = %err, "backend call failed");
    WizardError::Remote(err)
}

fn malformed(message: String) -> WizardError {
    warn!(%message, "unexpected backend response");
    WizardError::Remote(RemoteError::MalformedResponse(message))
}
