//! Multi-step freelancer application wizard.
//!
//! [`WizardController`] owns the applicant's [`ApplicationState`] and only moves forward
//! after [`validation`] passes and the backend has acknowledged the step.

pub mod backend;
pub mod controller;
pub mod domain;
pub mod remote;
pub mod upload;
pub mod validation;

#[cfg(test)]
mod tests;

pub use controller::{
    ResumeChoice, StartProgress, StepInput, WizardController, WizardError, WizardSnapshot,
};
pub use domain::{
    Address, ApplicationId, ApplicationState, EmailVerification, ExperienceDetails, Gender,
    PersonalDetails, PhoneNumber, ResumeFile, ResumeUpload, SpecialisationDetails, StorageKey,
    UploadState, WizardStep,
};
pub use remote::{
    ExistingApplication, HttpBackendClient, RemoteApplication, RemoteError, RemotePersistence,
    ResumeStorage, StartOutcome, StartRequest, StepSave,
};
pub use upload::{UploadCoordinator, UploadError};
pub use validation::{ValidationError, MIN_PAST_EXPERIENCE_WORDS};
