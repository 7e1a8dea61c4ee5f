//! Minimal wiring of the shareguide service with scripted dev providers.
//!
//! Serves one hard-coded template under the session token `demo`:
//!
//! ```text
//! SHAREGUIDE_ENVIRONMENT=dev \
//! SHAREGUIDE_DB_CONNECTION_STRING=unused \
//!   cargo run --example shareguide-service-example
//! websocat ws://127.0.0.1:4321/ws/demo
//! ```
//!
//! The demo repository is in-memory; the DB connection string is parsed but
//! never dialed.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use parking_lot::Mutex;
use shareguide_service::ShareguideServiceBuilder;
use shareguide_service::config::ShareguideConfig;
use shareguide_service::services::clock::SystemClock;
use shareguide_service::services::repository::{SessionRepository, SessionRow, session_status};
use shareguide_service::services::session_store::InMemorySessionStore;
use shareguide_service::services::tts::{SpeechSynthesizer, TtsError};
use shareguide_service::services::vision::{VisionAnalyzer, VisionRequest};
use shareguide_types::analysis::{ExtractedField, FrameAnalysis};
use shareguide_types::template::{ExtractionField, Template, TemplateStep};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// The configuration for the example server.
#[derive(Parser, Debug)]
struct ExampleConfig {
    /// The bind addr of the AXUM server.
    #[clap(long, env = "SHAREGUIDE_BIND_ADDR", default_value = "0.0.0.0:4321")]
    bind_addr: SocketAddr,

    /// The shareguide service config.
    #[clap(flatten)]
    service_config: ShareguideConfig,
}

/// Vision stand-in that "reads" a fixed handle off every frame.
struct ScriptedVision;

#[async_trait]
impl VisionAnalyzer for ScriptedVision {
    async fn analyze(&self, request: VisionRequest<'_>) -> eyre::Result<FrameAnalysis> {
        tracing::info!("analyzing frame against: {}", request.success_criteria);
        Ok(FrameAnalysis {
            description: "a profile page with a visible handle".to_owned(),
            detected_elements: vec!["profile header".to_owned()],
            matches_success_criteria: true,
            confidence: 0.9,
            suggested_action: None,
            extracted_data: Some(vec![ExtractedField::new("Handle", "@demo")]),
            url_verified: request.expected_domain.map(|_| true),
            visual_continuity: request.previous_frame_description.map(|_| true),
        })
    }
}

/// TTS stand-in that returns silence.
struct SilentTts;

#[async_trait]
impl SpeechSynthesizer for SilentTts {
    async fn speak(&self, text: &str) -> Result<String, TtsError> {
        tracing::info!("speaking: {text}");
        Ok(String::new())
    }
}

/// In-memory repository seeded with one demo session.
struct DemoRepository {
    template: Template,
    session: Mutex<SessionRow>,
}

impl DemoRepository {
    fn new() -> Self {
        let template = Template {
            id: Uuid::new_v4(),
            name: "demo verification".to_owned(),
            platform: "instagram".to_owned(),
            steps: vec![TemplateStep {
                instruction: "Open your profile page".to_owned(),
                success_criteria: "the profile page with the @-handle is visible".to_owned(),
                link: None,
                extraction_fields: Some(vec![ExtractionField {
                    name: "Handle".to_owned(),
                    description: "the @-handle shown on the profile".to_owned(),
                    required: true,
                }]),
                require_link_click: false,
                expected_domain: None,
                challenges: None,
                hints: Some(vec!["It is in the top bar".to_owned()]),
            }],
        };
        let session = SessionRow {
            id: Uuid::new_v4(),
            token: "demo".to_owned(),
            template_id: template.id,
            status: session_status::PENDING.to_owned(),
            current_step: 0,
            metadata: None,
            expires_at_ms: None,
        };
        Self {
            template,
            session: Mutex::new(session),
        }
    }
}

#[async_trait]
impl SessionRepository for DemoRepository {
    async fn find_session(&self, token: &str) -> eyre::Result<Option<SessionRow>> {
        let session = self.session.lock();
        Ok((session.token == token).then(|| session.clone()))
    }

    async fn find_template(&self, id: Uuid) -> eyre::Result<Option<Template>> {
        Ok((self.template.id == id).then(|| self.template.clone()))
    }

    async fn update_progress(&self, _token: &str, current_step: usize) -> eyre::Result<()> {
        self.session.lock().current_step = current_step as i32;
        Ok(())
    }

    async fn save_metadata(
        &self,
        _token: &str,
        metadata: &serde_json::Value,
    ) -> eyre::Result<()> {
        self.session.lock().metadata = Some(metadata.clone());
        Ok(())
    }

    async fn complete_session(
        &self,
        _token: &str,
        metadata: &serde_json::Value,
    ) -> eyre::Result<()> {
        let mut session = self.session.lock();
        session.status = session_status::COMPLETED.to_owned();
        session.metadata = Some(metadata.clone());
        tracing::info!("demo session completed: {metadata}");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shareguide_service=debug,info".into()),
        )
        .init();
    shareguide_service::metrics::describe_metrics();

    let config = ExampleConfig::parse();
    tracing::info!("starting shareguide example on {}", config.bind_addr);

    let clock = Arc::new(SystemClock);
    let store = Arc::new(InMemorySessionStore::new(
        config.service_config.environment,
        config.service_config.session_store_ttl,
        clock,
    ));
    let cancellation_token = CancellationToken::new();

    let router = ShareguideServiceBuilder::init(
        config.service_config,
        Arc::new(DemoRepository::new()),
        store,
        Arc::new(ScriptedVision),
        Arc::new(SilentTts),
        cancellation_token.clone(),
    )?
    .build();

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("received ctrl-c, shutting down");
            shutdown_token.cancel();
        }
    });
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;
    tracing::info!("good night!");
    Ok(())
}
