use crate::infra::{in_memory_backend, MemoryBackend};
use clap::Args;
use freelancer_onboarding::config::AppConfig;
use freelancer_onboarding::error::AppError;
use freelancer_onboarding::workflows::onboarding::backend::onboarding_router;
use freelancer_onboarding::workflows::onboarding::{
    Address, ApplicationId, ExperienceDetails, Gender, HttpBackendClient, PersonalDetails,
    PhoneNumber, ResumeChoice, ResumeFile, SpecialisationDetails, StartProgress, StepInput,
    WizardController, WizardError, WizardSnapshot, WizardStep,
};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;

const SAMPLE_RESUME: &[u8] = b"%PDF-1.7\n% sample resume generated by the onboarding demo\n";

const SAMPLE_EXPERIENCE: &str = "Eight years editing doctoral theses and journal submissions in \
    development economics and applied statistics. I have reviewed regression write-ups for \
    clarity, rebuilt literature reviews around a single argument, checked citation styles \
    against APA and Chicago guides, and coached first-time authors through reviewer responses. \
    Recent work includes a World Bank working paper and three accepted journal articles.";

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Drive a running backend instead of an in-process one
    #[arg(long)]
    pub(crate) backend_url: Option<String>,
    /// Applicant email used for step 1
    #[arg(long, default_value = "demo.applicant@example.org")]
    pub(crate) email: String,
    /// Verification code; required with --backend-url since codes are not delivered
    #[arg(long)]
    pub(crate) otp: Option<String>,
    /// Resume file to upload (defaults to a generated sample PDF)
    #[arg(long)]
    pub(crate) resume: Option<PathBuf>,
    /// Discard an incomplete application for the email instead of resuming it
    #[arg(long)]
    pub(crate) start_fresh: bool,
}

/// Walks one application as far as it can go and returns the final wizard snapshot.
/// Stops early, without error, only when a verification code must be supplied by hand.
pub(crate) async fn run_demo(args: DemoArgs) -> Result<WizardSnapshot, AppError> {
    let DemoArgs {
        backend_url,
        email,
        otp,
        resume,
        start_fresh,
    } = args;

    let mut config = AppConfig::load()?;
    let local_backend = match backend_url {
        Some(url) => {
            config.backend.base_url = url.trim_end_matches('/').to_string();
            None
        }
        None => {
            let backend = in_memory_backend();
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
            config.backend.base_url = format!("http://{}", listener.local_addr()?);
            let app = onboarding_router(backend.clone());
            tokio::spawn(async move {
                if let Err(err) = axum::serve(listener, app).await {
                    eprintln!("in-process backend stopped: {err}");
                }
            });
            Some(backend)
        }
    };

    let client = Arc::new(HttpBackendClient::new(&config.backend)?);
    let mut wizard = WizardController::new(
        client.clone(),
        client,
        config.backend.upload_folder.clone(),
    );

    println!("Freelancer application demo");
    println!("- Backend: {}", config.backend.base_url);

    let details = SpecialisationDetails::new(&email, ["Economics", "Statistics"]);
    let application_id = match wizard.start(details).await? {
        StartProgress::Started { application_id } => {
            println!("- Step 1 saved, application {application_id}");
            application_id
        }
        StartProgress::ConflictFound(existing) => {
            println!(
                "- Found incomplete application {} (completed step {}, started {})",
                existing.application_id,
                existing.current_step,
                existing.created_at.format("%Y-%m-%d %H:%M UTC")
            );
            let choice = if start_fresh {
                ResumeChoice::StartFresh
            } else {
                ResumeChoice::Resume
            };
            let step = wizard.resolve_resume_conflict(choice).await?;
            let state = wizard
                .state()
                .ok_or(AppError::Wizard(WizardError::NotStarted))?;
            println!("  {choice:?} -> now on {step}");
            state.application_id.clone()
        }
    };

    let walked = walk_remaining_steps(
        &mut wizard,
        &application_id,
        local_backend.as_deref(),
        otp,
        resume,
    )
    .await;

    let snapshot = wizard.snapshot();
    let rendered = serde_json::to_string_pretty(&snapshot)
        .unwrap_or_else(|err| format!("snapshot unavailable: {err}"));
    println!("\nWizard snapshot\n{rendered}");

    walked?;
    Ok(snapshot)
}

type Wizard = WizardController<HttpBackendClient, HttpBackendClient>;

async fn walk_remaining_steps(
    wizard: &mut Wizard,
    application_id: &ApplicationId,
    local_backend: Option<&MemoryBackend>,
    otp: Option<String>,
    resume: Option<PathBuf>,
) -> Result<(), AppError> {
    if wizard.current_step() == WizardStep::Experience {
        let step = wizard
            .advance(StepInput::Experience(sample_experience()))
            .await?;
        println!("- Step 2 saved, now on {step}");
    }

    if wizard.current_step() == WizardStep::Verification {
        let file = match resume {
            Some(path) => {
                let bytes = std::fs::read(&path)?;
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "resume.pdf".to_string());
                ResumeFile::new(name, bytes)
            }
            None => ResumeFile::new("sample-resume.pdf", SAMPLE_RESUME.to_vec()),
        };
        wizard.select_resume(file)?;
        let key = wizard.upload_resume().await?;
        println!("- Resume stored as {key}");

        if !wizard.snapshot().email_verified {
            wizard.send_otp().await?;
            let code = match (otp, local_backend) {
                (Some(code), _) => code,
                (None, Some(backend)) => backend
                    .issued_otp(application_id)
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                (None, None) => {
                    println!("  Verification code sent; rerun with --otp <code> to continue");
                    return Ok(());
                }
            };
            wizard.verify_otp(&code).await?;
            println!("- Email verified");
        }

        let step = wizard.advance(StepInput::Verification).await?;
        println!("- Step 3 complete, now on {step}");
    }

    if wizard.current_step() == WizardStep::PersonalDetails {
        wizard
            .advance(StepInput::PersonalDetails(sample_personal_details()))
            .await?;
        println!("- Application {application_id} submitted");
    }

    Ok(())
}

fn sample_experience() -> ExperienceDetails {
    ExperienceDetails {
        words_per_day: NonZeroU32::new(2500),
        linkedin: Some("https://www.linkedin.com/in/demo-applicant".to_string()),
        published_work_links: vec!["https://papers.example.org/demo-applicant".to_string()],
        past_experience: SAMPLE_EXPERIENCE.to_string(),
    }
}

fn sample_personal_details() -> PersonalDetails {
    PersonalDetails {
        full_name: "Demo Applicant".to_string(),
        gender: Some(Gender::PreferNotToSay),
        phone: Some(PhoneNumber::new("+44", "7700900123")),
        address: Address {
            country: Some("United Kingdom".to_string()),
            city: Some("Leeds".to_string()),
            ..Address::default()
        },
    }
}
