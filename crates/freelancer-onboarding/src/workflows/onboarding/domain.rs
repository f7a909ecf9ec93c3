use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-issued identifier for one application attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(pub String);

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key returned by the upload endpoint, later submitted as `resumeUrl`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(pub String);

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The four ordered wizard steps plus the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Specialisation,
    Experience,
    Verification,
    PersonalDetails,
    Submitted,
}

impl WizardStep {
    pub const fn number(self) -> u8 {
        match self {
            WizardStep::Specialisation => 1,
            WizardStep::Experience => 2,
            WizardStep::Verification => 3,
            WizardStep::PersonalDetails => 4,
            WizardStep::Submitted => 5,
        }
    }

    /// Maps a form step number (1..=4) back to its step.
    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(WizardStep::Specialisation),
            2 => Some(WizardStep::Experience),
            3 => Some(WizardStep::Verification),
            4 => Some(WizardStep::PersonalDetails),
            _ => None,
        }
    }

    pub const fn next(self) -> Self {
        match self {
            WizardStep::Specialisation => WizardStep::Experience,
            WizardStep::Experience => WizardStep::Verification,
            WizardStep::Verification => WizardStep::PersonalDetails,
            WizardStep::PersonalDetails | WizardStep::Submitted => WizardStep::Submitted,
        }
    }

    pub const fn previous(self) -> Option<Self> {
        match self {
            WizardStep::Specialisation | WizardStep::Submitted => None,
            WizardStep::Experience => Some(WizardStep::Specialisation),
            WizardStep::Verification => Some(WizardStep::Experience),
            WizardStep::PersonalDetails => Some(WizardStep::Verification),
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            WizardStep::Specialisation => "specialisation",
            WizardStep::Experience => "experience",
            WizardStep::Verification => "verification",
            WizardStep::PersonalDetails => "personal_details",
            WizardStep::Submitted => "submitted",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.number(), self.label())
    }
}

/// Step 1 input. The email is write-once per application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialisationDetails {
    pub email: String,
    pub specialisations: BTreeSet<String>,
}

impl SpecialisationDetails {
    /// Builds the step input, trimming entries and dropping blanks.
    pub fn new<I, S>(email: impl Into<String>, specialisations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            email: email.into().trim().to_string(),
            specialisations: normalize_specialisations(specialisations),
        }
    }
}

pub(crate) fn normalize_specialisations<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

/// Step 2 fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperienceDetails {
    pub words_per_day: Option<NonZeroU32>,
    pub linkedin: Option<String>,
    /// May hold blank rows while the applicant is editing.
    pub published_work_links: Vec<String>,
    pub past_experience: String,
}

impl ExperienceDetails {
    /// Links as they are sent to the backend: trimmed, blanks removed, order kept.
    pub fn published_links(&self) -> Vec<String> {
        self.published_work_links
            .iter()
            .map(|link| link.trim())
            .filter(|link| !link.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A resume picked on the applicant's device.
#[derive(Clone, PartialEq, Eq)]
pub struct ResumeFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ResumeFile {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for ResumeFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResumeFile")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Idle,
    Uploading,
    Uploaded,
    Failed,
}

/// Resume selection and its two-phase upload progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeUpload {
    #[serde(skip)]
    pub local_file: Option<ResumeFile>,
    /// Last reference the backend acknowledged. Survives a new selection until a
    /// replacement upload completes.
    pub remote_reference: Option<StorageKey>,
    pub upload_state: UploadState,
}

impl ResumeUpload {
    pub fn is_saved(&self) -> bool {
        self.upload_state == UploadState::Uploaded
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailVerification {
    pub otp_requested: bool,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    PreferNotToSay,
}

impl Gender {
    pub const fn label(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::NonBinary => "non_binary",
            Gender::PreferNotToSay => "prefer_not_to_say",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "non_binary" | "non-binary" | "nonbinary" => Some(Gender::NonBinary),
            "prefer_not_to_say" | "undisclosed" => Some(Gender::PreferNotToSay),
            _ => None,
        }
    }
}

/// Phone number split into its dialling prefix and national part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneNumber {
    pub country_code: String,
    pub national_number: String,
}

impl PhoneNumber {
    pub fn new(country_code: impl Into<String>, national_number: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into().trim().to_string(),
            national_number: national_number.into().trim().to_string(),
        }
    }

    /// `"<country code> <national number>"`, the `phone_number` wire form.
    pub fn to_wire(&self) -> String {
        format!("{} {}", self.country_code, self.national_number)
    }

    pub fn from_wire(value: &str) -> Option<Self> {
        let (code, national) = value.trim().split_once(char::is_whitespace)?;
        let national = national.trim();
        if code.is_empty() || national.is_empty() {
            return None;
        }
        Some(Self::new(code, national))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub pin_code: Option<String>,
    pub street_address: Option<String>,
}

/// Step 4 fields. Only the full name is required.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonalDetails {
    pub full_name: String,
    pub gender: Option<Gender>,
    pub phone: Option<PhoneNumber>,
    pub address: Address,
}

/// Everything the wizard knows about one in-progress application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub application_id: ApplicationId,
    pub email: String,
    pub specialisations: BTreeSet<String>,
    /// Furthest step the backend has unlocked. Only ever moves forward.
    pub current_step: WizardStep,
    pub experience: ExperienceDetails,
    pub resume: ResumeUpload,
    pub email_verification: EmailVerification,
    pub personal_details: PersonalDetails,
    pub submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ApplicationState {
    /// State right after a fresh start was acknowledged: step 1 is complete.
    pub fn started(application_id: ApplicationId, details: SpecialisationDetails) -> Self {
        Self {
            application_id,
            email: details.email,
            specialisations: details.specialisations,
            current_step: WizardStep::Experience,
            experience: ExperienceDetails::default(),
            resume: ResumeUpload::default(),
            email_verification: EmailVerification::default(),
            personal_details: PersonalDetails::default(),
            submitted: false,
            created_at: None,
        }
    }

    /// Moves `current_step` forward to `step`; never backwards.
    pub(crate) fn unlock(&mut self, step: WizardStep) {
        if step > self.current_step {
            self.current_step = step;
        }
    }
}
