use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use tracing::warn;

use super::repository::{ApplicationRepository, BlobStore, RepositoryError};
use super::service::{BackendError, OnboardingBackend};
use crate::workflows::onboarding::domain::ApplicationId;
use crate::workflows::onboarding::remote::wire::{
    AckBody, ApplicationRecordBody, ErrorBody, ExperienceRequestBody, ResumeRequestBody,
    SendOtpRequestBody, SpecialisationsRequestBody, StartRequestBody, StartResponseBody,
    SubmitRequestBody, UploadResponseBody, VerifyOtpRequestBody, APPLICATIONS_ROUTE,
    UPLOADS_ROUTE,
};

/// Largest resume accepted by the upload route.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

type Backend<R, B> = Arc<OnboardingBackend<R, B>>;

/// Router exposing the application and upload endpoints the wizard talks to.
pub fn onboarding_router<R, B>(backend: Arc<OnboardingBackend<R, B>>) -> Router
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    let application = |tail: &str| format!("{APPLICATIONS_ROUTE}/:application_id{tail}");

    Router::new()
        .route(APPLICATIONS_ROUTE, post(start_handler::<R, B>))
        .route(&application(""), get(fetch_handler::<R, B>))
        .route(
            &application("/specialisations"),
            put(specialisations_handler::<R, B>),
        )
        .route(&application("/experience"), put(experience_handler::<R, B>))
        .route(&application("/resume"), put(resume_handler::<R, B>))
        .route(&application("/otp"), post(send_otp_handler::<R, B>))
        .route(&application("/otp/verify"), post(verify_otp_handler::<R, B>))
        .route(&application("/submit"), post(submit_handler::<R, B>))
        .route(
            UPLOADS_ROUTE,
            post(upload_handler::<R, B>).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(backend)
}

pub(crate) async fn start_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Json(request): Json<StartRequestBody>,
) -> Result<Response, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    let body = backend.start(request)?;
    let status = match body {
        StartResponseBody::Fresh(_) => StatusCode::CREATED,
        StartResponseBody::Existing(_) => StatusCode::OK,
    };
    Ok((status, Json(body)).into_response())
}

pub(crate) async fn fetch_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
) -> Result<Json<ApplicationRecordBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.fetch(&ApplicationId(application_id)).map(Json)
}

pub(crate) async fn specialisations_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
    Json(request): Json<SpecialisationsRequestBody>,
) -> Result<Json<AckBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.save_specialisations(&ApplicationId(application_id), request)?;
    Ok(Json(AckBody::ok()))
}

pub(crate) async fn experience_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
    Json(request): Json<ExperienceRequestBody>,
) -> Result<Json<AckBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.save_experience(&ApplicationId(application_id), request)?;
    Ok(Json(AckBody::ok()))
}

pub(crate) async fn resume_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
    Json(request): Json<ResumeRequestBody>,
) -> Result<Json<AckBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.save_resume(&ApplicationId(application_id), request)?;
    Ok(Json(AckBody::ok()))
}

pub(crate) async fn send_otp_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
    Json(request): Json<SendOtpRequestBody>,
) -> Result<Json<AckBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.send_otp(&ApplicationId(application_id), request)?;
    Ok(Json(AckBody::ok()))
}

pub(crate) async fn verify_otp_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
    Json(request): Json<VerifyOtpRequestBody>,
) -> Result<Json<AckBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.verify_otp(&ApplicationId(application_id), request)?;
    Ok(Json(AckBody::ok()))
}

pub(crate) async fn submit_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    Path(application_id): Path<String>,
    Json(request): Json<SubmitRequestBody>,
) -> Result<Json<AckBody>, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    backend.submit(&ApplicationId(application_id), request)?;
    Ok(Json(AckBody::ok()))
}

/// Accepts a multipart form with a `folder` text field and a `file` part.
pub(crate) async fn upload_handler<R, B>(
    State(backend): State<Backend<R, B>>,
    mut multipart: Multipart,
) -> Result<Response, BackendError>
where
    R: ApplicationRepository + 'static,
    B: BlobStore + 'static,
{
    let mut folder = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        match field.name() {
            Some("folder") => {
                folder = field.text().await.map_err(bad_multipart)?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| BackendError::BadUpload("missing file part".to_string()))?;
    let body: UploadResponseBody = backend.upload(&folder, &file_name, bytes)?;
    Ok((StatusCode::CREATED, Json(body)).into_response())
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> BackendError {
    BackendError::BadUpload(format!("unreadable upload: {err}"))
}

impl BackendError {
    pub fn status(&self) -> StatusCode {
        match self {
            BackendError::Validation(_)
            | BackendError::OtpNotRequested
            | BackendError::InvalidOtp => StatusCode::UNPROCESSABLE_ENTITY,
            BackendError::NotFound | BackendError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            BackendError::AlreadySubmitted
            | BackendError::StepLocked { .. }
            | BackendError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            BackendError::BadRequest(_) | BackendError::BadUpload(_) => StatusCode::BAD_REQUEST,
            BackendError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "backend request failed");
        }
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
