use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{ApplicationId, ResumeFile, ResumeUpload, StorageKey, UploadState};
use super::remote::{RemoteError, RemotePersistence, ResumeStorage, StepSave};

/// Why a resume upload did not complete.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    #[error("select a resume file first")]
    NoFileSelected,
    #[error("resume upload already in progress")]
    InFlight,
    /// Phase 1: the bytes never reached storage.
    #[error(transparent)]
    Storage(RemoteError),
    /// Phase 2: stored, but the application record did not accept the key.
    #[error(transparent)]
    Registration(RemoteError),
}

/// Moves a selected resume to storage, then registers the storage key on the application.
///
/// Both phases are retried together by calling [`UploadCoordinator::upload`] again; a
/// repeated phase 1 may produce a new key, which is fine.
pub struct UploadCoordinator<S> {
    storage: Arc<S>,
    folder: String,
}

impl<S> UploadCoordinator<S>
where
    S: ResumeStorage + 'static,
{
    pub fn new(storage: Arc<S>, folder: impl Into<String>) -> Self {
        Self {
            storage,
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Replaces the pending selection. A previously registered reference is kept
    /// until a replacement upload succeeds.
    pub fn select_file(&self, resume: &mut ResumeUpload, file: ResumeFile) {
        resume.local_file = Some(file);
        resume.upload_state = UploadState::Idle;
    }

    pub async fn upload<R>(
        &self,
        remote: &R,
        application_id: &ApplicationId,
        resume: &mut ResumeUpload,
    ) -> Result<StorageKey, UploadError>
    where
        R: RemotePersistence + ?Sized,
    {
        if resume.upload_state == UploadState::Uploading {
            return Err(UploadError::InFlight);
        }
        let file = resume
            .local_file
            .clone()
            .ok_or(UploadError::NoFileSelected)?;

        let attempt = UploadAttempt::begin(resume);

        let key = match self.storage.upload(&file, &self.folder).await {
            Ok(key) => key,
            Err(err) => {
                warn!(%application_id, error = %err, "resume storage upload failed");
                attempt.fail();
                return Err(UploadError::Storage(err));
            }
        };

        let registration = StepSave::Resume {
            resume_url: key.clone(),
        };
        if let Err(err) = remote.save_step(application_id, registration).await {
            warn!(
                %application_id,
                storage_key = %key,
                error = %err,
                "resume stored but registration failed"
            );
            attempt.fail();
            return Err(UploadError::Registration(err));
        }

        info!(%application_id, storage_key = %key, "resume uploaded and registered");
        attempt.complete(key.clone());
        Ok(key)
    }
}

/// Marks the resume as uploading; restores the prior state if dropped unsettled,
/// e.g. when the caller abandons the upload future.
struct UploadAttempt<'a> {
    resume: &'a mut ResumeUpload,
    previous: UploadState,
    settled: bool,
}

impl<'a> UploadAttempt<'a> {
    fn begin(resume: &'a mut ResumeUpload) -> Self {
        let previous = resume.upload_state;
        resume.upload_state = UploadState::Uploading;
        Self {
            resume,
            previous,
            settled: false,
        }
    }

    fn fail(mut self) {
        self.resume.upload_state = UploadState::Failed;
        self.settled = true;
    }

    fn complete(mut self, key: StorageKey) {
        self.resume.remote_reference = Some(key);
        self.resume.upload_state = UploadState::Uploaded;
        self.settled = true;
    }
}

impl Drop for UploadAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.resume.upload_state = self.previous;
        }
    }
}
