//! Voice Agent Server Entry Point

use anyhow::Context;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_agent_config::{load_settings, Settings};
use voice_agent_core::{LanguageModel, SpeechToText, TextToSpeech};
use voice_agent_llm::{OpenAIBackend, OpenAIConfig};
use voice_agent_reminders::{LoggingNotifier, ReminderScheduler};
use voice_agent_server::speech::HttpSpeechConfig;
use voice_agent_server::{
    create_router, init_metrics, AppState, HttpSpeechToText, HttpTextToSpeech,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.* > config/default.* > defaults
    let env = std::env::var("VOICE_AGENT_ENV").ok();
    let config = match load_settings(env.as_deref()) {
        Ok(settings) => {
            // Tracing not yet initialized, use eprintln for early logging
            eprintln!(
                "Loaded configuration from files (env: {})",
                env.as_deref().unwrap_or("default")
            );
            settings
        },
        Err(e) => {
            eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
            Settings::default()
        },
    };

    init_tracing(&config);
    config.validate().context("invalid configuration")?;

    tracing::info!("Starting Voice Agent Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let metrics_handle = if config.observability.metrics_enabled {
        let handle = init_metrics();
        if handle.is_some() {
            tracing::info!("Initialized Prometheus metrics at /metrics");
        }
        handle
    } else {
        None
    };

    let persistence = voice_agent_persistence::init(&config.persistence)
        .context("failed to initialize persistence")?;
    tracing::info!(backend = ?config.persistence.backend, "Persistence initialized");

    let llm: Arc<dyn LanguageModel> = Arc::new(
        OpenAIBackend::new(OpenAIConfig::from_settings(&config.llm))
            .context("failed to create LLM backend")?,
    );
    tracing::info!(model = %llm.model_name(), endpoint = %config.llm.endpoint, "LLM backend ready");

    let speech = HttpSpeechConfig::from_settings(&config.speech);
    let stt = HttpSpeechToText::new(speech.clone()).context("failed to create STT client")?;
    stt.check_health().await;
    let stt: Arc<dyn SpeechToText> = Arc::new(stt);
    let tts: Arc<dyn TextToSpeech> =
        Arc::new(HttpTextToSpeech::new(speech).context("failed to create TTS client")?);

    let (reminders, reminder_worker) = if config.reminders.enabled {
        let scheduler = Arc::new(ReminderScheduler::new(
            persistence.appointments.clone(),
            Arc::new(LoggingNotifier),
            &config.reminders,
            &config.scheduling,
        ));
        match scheduler.load_pending(Utc::now()).await {
            Ok(count) => tracing::info!(count, "Loaded pending reminders"),
            Err(e) => tracing::warn!(error = %e, "Failed to load pending reminders (non-fatal)"),
        }
        let worker = scheduler.start();
        (Some(scheduler), Some(worker))
    } else {
        tracing::info!("Reminders disabled");
        (None, None)
    };

    let state = AppState::new(config.clone(), persistence, llm, stt, tts, reminders)
        .with_metrics(metrics_handle);
    let sessions = Arc::clone(&state.sessions);
    let cleanup_shutdown = sessions.start_cleanup_task();

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on SIGTERM/SIGINT
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = cleanup_shutdown.send(true);
    sessions.stop_all().await;
    if let Some((shutdown_tx, handle)) = reminder_worker {
        let _ = shutdown_tx.send(true);
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn env_filter(config: &Settings) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voice_agent={},tower_http=debug", level).into()
    })
}

/// Initialize tracing (with optional OpenTelemetry when feature enabled)
#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let subscriber = tracing_subscriber::registry().with(env_filter(config));
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint)
            .build();
        match exporter {
            Ok(exporter) => {
                let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "voice-agent"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]))
                    .build();
                let tracer = provider.tracer("voice-agent");
                opentelemetry::global::set_tracer_provider(provider);

                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                subscriber.with(fmt_layer).with(otel_layer).init();
                tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                return;
            },
            Err(e) => eprintln!("Failed to initialize OpenTelemetry: {}. Falling back.", e),
        }
    }
    subscriber.with(fmt_layer).init();
}

/// Initialize tracing (console only - telemetry feature disabled)
#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let subscriber = tracing_subscriber::registry().with(env_filter(config));
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
