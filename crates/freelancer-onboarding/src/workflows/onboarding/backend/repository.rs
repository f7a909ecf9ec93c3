use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::onboarding::domain::{
    ApplicationId, ExperienceDetails, PersonalDetails, StorageKey,
};
use crate::workflows::onboarding::remote::wire::{
    ApplicationRecordBody, ExperienceRequestBody, PersonalDetailsBody,
};
use crate::workflows::onboarding::remote::ExistingApplication;

/// Server-side record of one application attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application_id: ApplicationId,
    pub email: String,
    pub specialisations: BTreeSet<String>,
    /// Last completed step, 1..=4.
    pub completed_step: u8,
    pub experience: ExperienceDetails,
    pub resume_url: Option<StorageKey>,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub pending_otp: Option<String>,
    pub personal_details: PersonalDetails,
    pub submitted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationRecord {
    pub fn new(
        application_id: ApplicationId,
        email: String,
        specialisations: BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            application_id,
            email,
            specialisations,
            completed_step: 1,
            experience: ExperienceDetails::default(),
            resume_url: None,
            email_verified: false,
            pending_otp: None,
            personal_details: PersonalDetails::default(),
            submitted: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete_step(&mut self, step: u8) {
        self.completed_step = self.completed_step.max(step.min(4));
    }

    pub fn summary(&self) -> ExistingApplication {
        ExistingApplication {
            application_id: self.application_id.clone(),
            current_step: self.completed_step,
            specialisations: self.specialisations.clone(),
            created_at: self.created_at,
        }
    }

    pub fn to_body(&self) -> ApplicationRecordBody {
        let experience = ExperienceRequestBody::new(&self.application_id, &self.experience);
        let has_details = !self.personal_details.full_name.trim().is_empty();

        ApplicationRecordBody {
            application_id: self.application_id.0.clone(),
            email: self.email.clone(),
            specialisations: self.specialisations.iter().cloned().collect(),
            current_step: self.completed_step,
            words_per_day: experience.words_per_day,
            linkedin: experience.linkedin,
            published_work_links: experience.published_work_links,
            past_experience: Some(experience.past_experience).filter(|text| !text.is_empty()),
            resume_url: self.resume_url.as_ref().map(|key| key.0.clone()),
            email_verified: self.email_verified,
            personal: if has_details {
                PersonalDetailsBody::from_details(&self.personal_details)
            } else {
                PersonalDetailsBody::default()
            },
            submitted: self.submitted,
            created_at: Some(self.created_at),
        }
    }
}

/// Storage abstraction so the backend service can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    /// Applies `apply` to the stored record while holding the store's lock. The record is
    /// written back only when `apply` succeeds.
    fn modify<T, E>(
        &self,
        id: &ApplicationId,
        apply: impl FnOnce(&mut ApplicationRecord) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    /// Most recently created unsubmitted record for the email, compared case-insensitively.
    fn latest_incomplete(&self, email: &str) -> Result<Option<ApplicationRecord>, RepositoryError>;
}

/// Destination for uploaded resume bytes.
pub trait BlobStore: Send + Sync {
    fn put(
        &self,
        folder: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<StorageKey, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
