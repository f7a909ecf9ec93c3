//! Per-step gates checked before any network call.
//!
//! Every function here is pure: it looks at a slice of the application state and
//! either accepts it or names the reason it cannot advance.

use super::domain::{
    EmailVerification, ExperienceDetails, PersonalDetails, ResumeUpload, SpecialisationDetails,
};

/// Minimum number of whitespace-separated words in `past_experience`.
pub const MIN_PAST_EXPERIENCE_WORDS: usize = 50;

/// Reasons a step cannot advance. `Display` is the message shown next to the control.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("enter a valid email address")]
    InvalidEmail,
    #[error("select at least one specialisation")]
    NoSpecialisation,
    #[error("describe your past experience in at least {required} words ({found} so far)")]
    PastExperienceTooShort { required: usize, found: usize },
    #[error("resume not saved")]
    ResumeNotSaved,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("enter the verification code")]
    EmptyOtp,
    #[error("full name is required")]
    MissingFullName,
}

/// Counts words by splitting on runs of whitespace.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().filter(|word| !word.is_empty()).count()
}

/// Accepts addresses shaped like `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or(ValidationError::InvalidEmail)?;
    if local.is_empty() || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|label| label.is_empty()) {
        return Err(ValidationError::InvalidEmail);
    }

    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

/// Step 1: a well-formed email and at least one specialisation.
pub fn validate_specialisation(details: &SpecialisationDetails) -> Result<(), ValidationError> {
    validate_email(&details.email)?;
    if details.specialisations.is_empty() {
        return Err(ValidationError::NoSpecialisation);
    }
    Ok(())
}

/// Step 2: the past-experience word count gate.
pub fn validate_experience(experience: &ExperienceDetails) -> Result<(), ValidationError> {
    let found = count_words(&experience.past_experience);
    if found < MIN_PAST_EXPERIENCE_WORDS {
        return Err(ValidationError::PastExperienceTooShort {
            required: MIN_PAST_EXPERIENCE_WORDS,
            found,
        });
    }
    Ok(())
}

/// Step 3: the resume must be uploaded and the email verified, checked in that order.
pub fn validate_verification(
    resume: &ResumeUpload,
    verification: &EmailVerification,
) -> Result<(), ValidationError> {
    if !resume.is_saved() {
        return Err(ValidationError::ResumeNotSaved);
    }
    if !verification.verified {
        return Err(ValidationError::EmailNotVerified);
    }
    Ok(())
}

/// Step 4: a non-blank full name.
pub fn validate_personal_details(details: &PersonalDetails) -> Result<(), ValidationError> {
    if details.full_name.trim().is_empty() {
        return Err(ValidationError::MissingFullName);
    }
    Ok(())
}

pub fn validate_otp(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::EmptyOtp);
    }
    Ok(())
}
