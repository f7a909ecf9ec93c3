//! JSON bodies exchanged with the backend.
//!
//! Responses are decoded into these shapes first and only then converted into domain
//! types, so a missing or out-of-range field surfaces as
//! [`RemoteError::MalformedResponse`] instead of leaking into the wizard.

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ExistingApplication, RemoteApplication, RemoteError, StartOutcome};
use crate::workflows::onboarding::domain::{
    normalize_specialisations, Address, ApplicationId, ExperienceDetails, Gender,
    PersonalDetails, PhoneNumber, StorageKey,
};

pub const APPLICATIONS_ROUTE: &str = "/api/v1/freelancer/applications";
pub const UPLOADS_ROUTE: &str = "/api/v1/uploads";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequestBody {
    pub email: String,
    pub specialisations: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub force_new: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartResponseBody {
    Existing(ExistingEnvelope),
    Fresh(FreshStartBody),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingEnvelope {
    pub existing_application: ExistingApplicationBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshStartBody {
    pub application_id: String,
    pub current_step: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingApplicationBody {
    pub application_id: String,
    pub current_step: u8,
    #[serde(default)]
    pub specialisations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl StartResponseBody {
    pub fn decode(self) -> Result<StartOutcome, RemoteError> {
        match self {
            StartResponseBody::Fresh(body) => Ok(StartOutcome::Fresh {
                application_id: decode_id(body.application_id)?,
                current_step: decode_step(body.current_step)?,
            }),
            StartResponseBody::Existing(ExistingEnvelope {
                existing_application: body,
            }) => Ok(StartOutcome::Existing(ExistingApplication {
                application_id: decode_id(body.application_id)?,
                current_step: decode_step(body.current_step)?,
                specialisations: normalize_specialisations(body.specialisations),
                created_at: body.created_at,
            })),
        }
    }
}

impl From<&ExistingApplication> for StartResponseBody {
    fn from(existing: &ExistingApplication) -> Self {
        StartResponseBody::Existing(ExistingEnvelope {
            existing_application: ExistingApplicationBody {
                application_id: existing.application_id.0.clone(),
                current_step: existing.current_step,
                specialisations: existing.specialisations.iter().cloned().collect(),
                created_at: existing.created_at,
            },
        })
    }
}

/// Full application record returned by `fetch`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationRecordBody {
    pub application_id: String,
    pub email: String,
    #[serde(default)]
    pub specialisations: Vec<String>,
    pub current_step: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub published_work_links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub past_experience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(flatten)]
    pub personal: PersonalDetailsBody,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ApplicationRecordBody {
    pub fn decode(self) -> Result<RemoteApplication, RemoteError> {
        let application_id = decode_id(self.application_id)?;
        let email = self.email.trim().to_string();
        if email.is_empty() {
            return Err(RemoteError::MalformedResponse(
                "application record has no email".to_string(),
            ));
        }

        let experience = ExperienceDetails {
            words_per_day: self.words_per_day.and_then(NonZeroU32::new),
            linkedin: non_blank(self.linkedin),
            published_work_links: self.published_work_links,
            past_experience: self.past_experience.unwrap_or_default(),
        };

        let resume_url = non_blank(self.resume_url).map(StorageKey);

        Ok(RemoteApplication {
            application_id,
            email,
            specialisations: normalize_specialisations(self.specialisations),
            current_step: decode_step(self.current_step)?,
            experience,
            resume_url,
            email_verified: self.email_verified,
            personal_details: self.personal.decode()?,
            submitted: self.submitted,
            created_at: self.created_at,
        })
    }
}

/// Step 4 fields. Key names follow the backend's mixed casing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetailsBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(
        rename = "phone_number",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
}

impl PersonalDetailsBody {
    pub fn from_details(details: &PersonalDetails) -> Self {
        Self {
            full_name: Some(details.full_name.trim().to_string()),
            gender: details.gender.map(|gender| gender.label().to_string()),
            phone_number: details.phone.as_ref().map(PhoneNumber::to_wire),
            country: details.address.country.clone(),
            state: details.address.state.clone(),
            city: details.address.city.clone(),
            pin_code: details.address.pin_code.clone(),
            street_address: details.address.street_address.clone(),
        }
    }

    pub fn decode(self) -> Result<PersonalDetails, RemoteError> {
        let gender = match non_blank(self.gender) {
            Some(raw) => Some(Gender::parse(&raw).ok_or_else(|| {
                RemoteError::MalformedResponse(format!("unknown gender '{raw}'"))
            })?),
            None => None,
        };

        let phone = match non_blank(self.phone_number) {
            Some(raw) => Some(PhoneNumber::from_wire(&raw).ok_or_else(|| {
                RemoteError::MalformedResponse(format!("unreadable phone number '{raw}'"))
            })?),
            None => None,
        };

        Ok(PersonalDetails {
            full_name: self.full_name.unwrap_or_default(),
            gender,
            phone,
            address: Address {
                country: non_blank(self.country),
                state: non_blank(self.state),
                city: non_blank(self.city),
                pin_code: non_blank(self.pin_code),
                street_address: non_blank(self.street_address),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecialisationsRequestBody {
    pub application_id: String,
    pub specialisations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperienceRequestBody {
    pub application_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub words_per_day: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default)]
    pub published_work_links: Vec<String>,
    pub past_experience: String,
}

impl ExperienceRequestBody {
    pub fn new(id: &ApplicationId, experience: &ExperienceDetails) -> Self {
        Self {
            application_id: id.0.clone(),
            words_per_day: experience.words_per_day.map(NonZeroU32::get),
            linkedin: non_blank(experience.linkedin.clone()),
            published_work_links: experience.published_links(),
            past_experience: experience.past_experience.clone(),
        }
    }

    pub fn into_details(self) -> ExperienceDetails {
        ExperienceDetails {
            words_per_day: self.words_per_day.and_then(NonZeroU32::new),
            linkedin: non_blank(self.linkedin),
            published_work_links: self.published_work_links,
            past_experience: self.past_experience,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeRequestBody {
    pub application_id: String,
    pub resume_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpRequestBody {
    pub application_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequestBody {
    pub application_id: String,
    pub otp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequestBody {
    pub application_id: String,
    #[serde(flatten)]
    pub details: PersonalDetailsBody,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponseBody {
    pub key: String,
}

impl UploadResponseBody {
    pub fn decode(self) -> Result<StorageKey, RemoteError> {
        match non_blank(Some(self.key)) {
            Some(key) => Ok(StorageKey(key)),
            None => Err(RemoteError::MalformedResponse(
                "upload returned an empty storage key".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckBody {
    pub ok: bool,
}

impl AckBody {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

fn decode_id(raw: String) -> Result<ApplicationId, RemoteError> {
    match non_blank(Some(raw)) {
        Some(id) => Ok(ApplicationId(id)),
        None => Err(RemoteError::MalformedResponse(
            "missing application id".to_string(),
        )),
    }
}

fn decode_step(step: u8) -> Result<u8, RemoteError> {
    if (1..=4).contains(&step) {
        Ok(step)
    } else {
        Err(RemoteError::MalformedResponse(format!(
            "current step {step} is outside 1..=4"
        )))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn start_response_distinguishes_existing_application() {
        let body: StartResponseBody = serde_json::from_value(json!({
            "existingApplication": {
                "applicationId": "app-000007",
                "currentStep": 2,
                "specialisations": ["Economics"],
                "createdAt": "2026-03-01T09:30:00Z"
            }
        }))
        .expect("decodes");

        match body.decode().expect("valid") {
            StartOutcome::Existing(existing) => {
                assert_eq!(existing.application_id.0, "app-000007");
                assert_eq!(existing.current_step, 2);
                assert!(existing.specialisations.contains("Economics"));
            }
            other => panic!("expected existing application, got {other:?}"),
        }
    }

    #[test]
    fn start_response_rejects_out_of_range_step() {
        let body: StartResponseBody =
            serde_json::from_value(json!({ "applicationId": "app-1", "currentStep": 9 }))
                .expect("shape decodes");

        assert!(matches!(
            body.decode(),
            Err(RemoteError::MalformedResponse(_))
        ));
    }

    #[test]
    fn record_fills_defaults_for_missing_optional_fields() {
        let body: ApplicationRecordBody = serde_json::from_value(json!({
            "applicationId": "app-2",
            "email": "lin@example.edu",
            "currentStep": 1
        }))
        .expect("decodes");

        let record = body.decode().expect("valid");
        assert!(record.specialisations.is_empty());
        assert_eq!(record.experience, ExperienceDetails::default());
        assert_eq!(record.resume_url, None);
        assert!(!record.email_verified);
        assert_eq!(record.personal_details, PersonalDetails::default());
    }

    #[test]
    fn record_with_unknown_gender_is_malformed() {
        let body: ApplicationRecordBody = serde_json::from_value(json!({
            "applicationId": "app-3",
            "email": "lin@example.edu",
            "currentStep": 4,
            "fullName": "Lin Zhou",
            "gender": "robot"
        }))
        .expect("decodes");

        assert!(matches!(
            body.decode(),
            Err(RemoteError::MalformedResponse(message)) if message.contains("robot")
        ));
    }

    #[test]
    fn submit_body_uses_backend_key_names() {
        let details = PersonalDetails {
            full_name: "Lin Zhou".to_string(),
            gender: Some(Gender::Female),
            phone: Some(PhoneNumber::new("+86", "13800138000")),
            address: Address {
                pin_code: Some("200000".to_string()),
                street_address: Some("1 Bund Rd".to_string()),
                ..Address::default()
            },
        };
        let body = SubmitRequestBody {
            application_id: "app-4".to_string(),
            details: PersonalDetailsBody::from_details(&details),
        };

        let value = serde_json::to_value(&body).expect("serializes");
        assert_eq!(value["applicationId"], "app-4");
        assert_eq!(value["fullName"], "Lin Zhou");
        assert_eq!(value["phone_number"], "+86 13800138000");
        assert_eq!(value["pinCode"], "200000");
        assert_eq!(value["streetAddress"], "1 Bund Rd");
        assert!(value.get("country").is_none());
    }

    #[test]
    fn experience_body_strips_blank_links() {
        let experience = ExperienceDetails {
            words_per_day: NonZeroU32::new(1500),
            linkedin: Some("  ".to_string()),
            published_work_links: vec!["".to_string(), "https://a.example.org".to_string()],
            past_experience: "Thesis editing".to_string(),
        };

        let body = ExperienceRequestBody::new(&ApplicationId("app-5".to_string()), &experience);
        assert_eq!(body.words_per_day, Some(1500));
        assert_eq!(body.linkedin, None);
        assert_eq!(body.published_work_links, vec!["https://a.example.org"]);
    }
}
