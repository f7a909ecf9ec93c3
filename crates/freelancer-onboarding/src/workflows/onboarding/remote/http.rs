use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::wire::{
    ApplicationRecordBody, ErrorBody, ExperienceRequestBody, PersonalDetailsBody,
    ResumeRequestBody, SendOtpRequestBody, SpecialisationsRequestBody, StartRequestBody,
    StartResponseBody, SubmitRequestBody, UploadResponseBody, VerifyOtpRequestBody,
    APPLICATIONS_ROUTE, UPLOADS_ROUTE,
};
use super::{
    RemoteApplication, RemoteError, RemotePersistence, ResumeStorage, StartOutcome,
    StartRequest, StepSave,
};
use crate::config::BackendConfig;
use crate::workflows::onboarding::domain::{
    ApplicationId, PersonalDetails, ResumeFile, StorageKey,
};

/// reqwest client for the REST contract; serves both the record calls and uploads.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    client: Client,
    base_url: Url,
}

impl HttpBackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, RemoteError> {
        let base_url = Url::parse(&config.base_url).map_err(|err| {
            RemoteError::Transport(format!("invalid backend url '{}': {err}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Transport(format!(
                "backend url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport)?;

        Ok(Self { client, base_url })
    }

    fn endpoint(&self, route: &str, tail: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Transport("backend url cannot carry a path".into()))?;
            segments.pop_if_empty();
            segments.extend(route.split('/').filter(|segment| !segment.is_empty()));
            segments.extend(tail);
        }
        Ok(url)
    }

    fn application(&self, id: &ApplicationId, tail: &[&str]) -> Result<Url, RemoteError> {
        let mut segments = Vec::with_capacity(tail.len() + 1);
        segments.push(id.0.as_str());
        segments.extend_from_slice(tail);
        self.endpoint(APPLICATIONS_ROUTE, &segments)
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<Response, RemoteError> {
        debug!(%url, "POST backend");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await
    }

    async fn put_json<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<Response, RemoteError> {
        debug!(%url, "PUT backend");
        let response = self
            .client
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        ensure_success(response).await
    }
}

#[async_trait]
impl RemotePersistence for HttpBackendClient {
    async fn start(&self, request: StartRequest) -> Result<StartOutcome, RemoteError> {
        let url = self.endpoint(APPLICATIONS_ROUTE, &[])?;
        let body = StartRequestBody {
            email: request.email,
            specialisations: request.specialisations.into_iter().collect(),
            force_new: request.force_new,
        };
        let response = self.post_json(url, &body).await?;
        read_json::<StartResponseBody>(response).await?.decode()
    }

    async fn fetch(&self, id: &ApplicationId) -> Result<RemoteApplication, RemoteError> {
        let url = self.application(id, &[])?;
        debug!(%url, "GET backend");
        let response = self.client.get(url).send().await.map_err(transport)?;
        let response = ensure_success(response).await?;
        read_json::<ApplicationRecordBody>(response).await?.decode()
    }

    async fn save_step(&self, id: &ApplicationId, save: StepSave) -> Result<(), RemoteError> {
        match save {
            StepSave::Specialisations(specialisations) => {
                let url = self.application(id, &["specialisations"])?;
                let body = SpecialisationsRequestBody {
                    application_id: id.0.clone(),
                    specialisations: specialisations.into_iter().collect(),
                };
                self.put_json(url, &body).await?;
            }
            StepSave::Experience(experience) => {
                let url = self.application(id, &["experience"])?;
                let body = ExperienceRequestBody::new(id, &experience);
                self.put_json(url, &body).await?;
            }
            StepSave::Resume { resume_url } => {
                let url = self.application(id, &["resume"])?;
                let body = ResumeRequestBody {
                    application_id: id.0.clone(),
                    resume_url: resume_url.0,
                };
                self.put_json(url, &body).await?;
            }
        }
        Ok(())
    }

    async fn send_otp(&self, id: &ApplicationId) -> Result<(), RemoteError> {
        let url = self.application(id, &["otp"])?;
        let body = SendOtpRequestBody {
            application_id: id.0.clone(),
        };
        self.post_json(url, &body).await?;
        Ok(())
    }

    async fn verify_otp(&self, id: &ApplicationId, otp: &str) -> Result<(), RemoteError> {
        let url = self.application(id, &["otp", "verify"])?;
        let body = VerifyOtpRequestBody {
            application_id: id.0.clone(),
            otp: otp.trim().to_string(),
        };
        self.post_json(url, &body).await?;
        Ok(())
    }

    async fn submit(
        &self,
        id: &ApplicationId,
        details: &PersonalDetails,
    ) -> Result<(), RemoteError> {
        let url = self.application(id, &["submit"])?;
        let body = SubmitRequestBody {
            application_id: id.0.clone(),
            details: PersonalDetailsBody::from_details(details),
        };
        self.post_json(url, &body).await?;
        Ok(())
    }
}

#[async_trait]
impl ResumeStorage for HttpBackendClient {
    async fn upload(&self, file: &ResumeFile, folder: &str) -> Result<StorageKey, RemoteError> {
        let url = self.endpoint(UPLOADS_ROUTE, &[])?;
        let mime = mime_guess::from_path(&file.file_name).first_or_octet_stream();
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(mime.essence_str())
            .map_err(transport)?;
        let form = Form::new().text("folder", folder.to_string()).part("file", part);

        debug!(%url, file = %file.file_name, size = file.bytes.len(), "uploading resume");
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;
        let response = ensure_success(response).await?;
        read_json::<UploadResponseBody>(response).await?.decode()
    }
}

fn transport(err: reqwest::Error) -> RemoteError {
    RemoteError::Transport(err.to_string())
}

/// Turns a non-2xx response into [`RemoteError::Rejected`] carrying the server's message.
async fn ensure_success(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let raw = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&raw)
        .map(|body| body.message)
        .ok()
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| format!("request failed with status {}", status.as_u16()));

    Err(RemoteError::Rejected {
        status: Some(status.as_u16()),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|err| RemoteError::MalformedResponse(err.to_string()))
}
