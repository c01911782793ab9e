mod agents;
mod api;
mod backend;
mod config;
mod conversations;
mod error;
mod knowledge;
mod runs;

use anyhow::Context;
use axum::body::Body;
use axum::extract::Request;
use clap::Parser;
use dotenvy::dotenv;
use sentry::integrations::tower::{NewSentryLayer, SentryHttpLayer};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::agents::file_repository::FileAgentRepository;
use crate::agents::repository::AgentRepository;
use crate::api::changes::ResourceChangeEvent;
use crate::backend::ModelBackend;
use crate::backend::completions::CompletionsBackend;
use crate::backend::openai::OpenAiBackend;
use crate::config::BackendKind;
use crate::conversations::file_repository::FileConversationRepository;
use crate::conversations::repository::ConversationRepository;
use crate::knowledge::file_repository::FileKnowledgeRepository;
use crate::knowledge::repository::KnowledgeRepository;
use crate::runs::coordinator::RunCoordinator;
use crate::runs::locks::ThreadLocks;

#[derive(Parser)]
#[command(name = "agentdeck", about = "Agent and knowledge dashboard backend")]
enum Cli {
    /// Start the HTTP server (default when no subcommand is given)
    #[command(alias = "run")]
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();

    // Default to Serve when no subcommand is given, but still allow
    // --help and --version to work.
    let args: Vec<String> = std::env::args().collect();
    let cli = if args.len() <= 1 { Cli::Serve } else { Cli::parse() };

    match cli {
        Cli::Serve => run_server().await,
    }
}

async fn run_server() -> Result<(), Box<dyn Error>> {
    let config = config::Config::from_env();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agentdeck=info,tower_http=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_tree::HierarchicalLayer::new(2)
                .with_targets(true)
                .with_bracketed_fields(false),
        )
        .with(sentry::integrations::tracing::layer().event_filter(
            |metadata| match *metadata.level() {
                tracing::Level::ERROR => sentry::integrations::tracing::EventFilter::Event,
                tracing::Level::WARN | tracing::Level::INFO => {
                    sentry::integrations::tracing::EventFilter::Breadcrumb
                }
                _ => sentry::integrations::tracing::EventFilter::Ignore,
            },
        ))
        .init();

    let _guard = sentry::init((
        config.sentry_dsn.clone().unwrap_or_default(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: Some(config.environment.clone().into()),
            send_default_pii: true,
            traces_sample_rate: 0.2,
            enable_logs: true,
            ..Default::default()
        },
    ));

    let jwt_secret = config
        .jwt_secret
        .clone()
        .context("JWT_SECRET must be set; the API fails closed without it")?;

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")?;

    let model_backend: Arc<dyn ModelBackend> = match config.backend {
        BackendKind::OpenAiAssistants => {
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is required for the openai backend")?;
            Arc::new(OpenAiBackend::new(
                http_client.clone(),
                config.openai_base_url.clone(),
                api_key,
            ))
        }
        BackendKind::Completions => {
            let api_key = config
                .openai_api_key
                .clone()
                .context("OPENAI_API_KEY is required for the completions backend")?;
            Arc::new(CompletionsBackend::new(
                http_client.clone(),
                config.openai_base_url.clone(),
                api_key,
                config.completions_model.clone(),
            ))
        }
    };

    let base_dir = config.data_dir.clone().unwrap_or_else(|| {
        dirs::home_dir()
            .unwrap_or_else(|| std::path::PathBuf::from("."))
            .join(".agentdeck")
    });

    let agent_repo: Arc<dyn AgentRepository> = Arc::new(FileAgentRepository::new(&base_dir));
    agent_repo.load_all().await.context("failed to load agents")?;

    let knowledge_repo: Arc<dyn KnowledgeRepository> =
        Arc::new(FileKnowledgeRepository::new(&base_dir));
    knowledge_repo.load_all().await.context("failed to load knowledge documents")?;

    let conversation_repo: Arc<dyn ConversationRepository> =
        Arc::new(FileConversationRepository::new(&base_dir));
    conversation_repo.load_all().await.context("failed to load conversation records")?;

    let (changes_tx, _) = tokio::sync::broadcast::channel::<ResourceChangeEvent>(256);

    let coordinator = Arc::new(RunCoordinator::new(model_backend, &config));
    tracing::info!(
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        poll_deadline_secs = config.poll_deadline.as_secs(),
        max_polls = config.max_polls,
        "run coordinator configured"
    );

    let app_state = api::AppState {
        agent_repo,
        knowledge_repo,
        conversation_repo,
        coordinator,
        thread_locks: Arc::new(ThreadLocks::new()),
        changes_tx,
        jwt_secret,
    };

    let app = api::create_app(app_state)
        .layer(SentryHttpLayer::new().enable_transaction())
        .layer(NewSentryLayer::<Request<Body>>::new_from_top());

    let port = config.port;
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    println!("Listening on http://{addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
