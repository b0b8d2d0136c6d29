use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voxai::api::{ApiClient, LoginRequest};
use voxai::config::ClientConfig;
use voxai::session::{SessionContext, SessionStore};
use voxai::speech::SpeechSynthesizer;
use voxai::ui::{AppState, BoxedRecognitionEngine};

const EMAIL_ENV: &str = "VOXAI_EMAIL";
const PASSWORD_ENV: &str = "VOXAI_PASSWORD";

/// Sign in with credentials from the environment when no token is stored
fn sign_in_from_env(config: &ClientConfig, store: &SessionStore, session: &mut SessionContext) -> Result<()> {
    let (Ok(email), Ok(password)) = (std::env::var(EMAIL_ENV), std::env::var(PASSWORD_ENV)) else {
        warn!(
            "Not signed in; set {} and {} to sign in",
            EMAIL_ENV, PASSWORD_ENV
        );
        return Ok(());
    };

    let api = ApiClient::new(config)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to create runtime")?;
    let auth = runtime.block_on(api.login(&LoginRequest::new(email, password)))?;

    session.sign_in(auth.access_token, auth.user);
    store.save(session)?;
    Ok(())
}

#[cfg(feature = "local-tts")]
fn synthesizer(config: &ClientConfig) -> SpeechSynthesizer {
    match voxai::speech::VitsVoice::new(&config.speech) {
        Ok(voice) => SpeechSynthesizer::new(Some(Box::new(voice))),
        Err(e) => {
            warn!("On-device voice unavailable: {}", e);
            SpeechSynthesizer::unsupported()
        }
    }
}

#[cfg(not(feature = "local-tts"))]
fn synthesizer(_config: &ClientConfig) -> SpeechSynthesizer {
    SpeechSynthesizer::unsupported()
}

#[cfg(feature = "local-stt")]
fn recognition(config: &ClientConfig) -> Option<BoxedRecognitionEngine> {
    match voxai::speech::microphone_dictation(&config.speech) {
        Ok(engine) => Some(Box::new(engine)),
        Err(e) => {
            warn!("Dictation unavailable: {}", e);
            None
        }
    }
}

#[cfg(not(feature = "local-stt"))]
fn recognition(_config: &ClientConfig) -> Option<BoxedRecognitionEngine> {
    None
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voxai=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting VoxAI client");

    let config = ClientConfig::discover()?;
    config.validate()?;

    let store = SessionStore::new(config.session_file());
    let mut session = store.load()?;
    if !session.is_authenticated() {
        sign_in_from_env(&config, &store, &mut session)?;
    }
    if !session.onboarding_complete {
        info!("First run, welcome to VoxAI");
        session.complete_onboarding();
        store.save(&session)?;
    }

    let synthesizer = synthesizer(&config);
    let recognition = recognition(&config);
    let state = AppState::connect(config, session)?.with_speech(recognition, synthesizer);

    voxai::ui::run(state).map_err(|e| anyhow::anyhow!("UI error: {}", e))
}
