use {
    activity_sink::{
        AppState,
        adapters::http,
        config::Config,
        domain::{broker::DeadLetterSink, error::PipelineError},
        infra::{
            jetstream::{self, JetStreamDeadLetter, JetStreamPull, JetStreamPush},
            postgres::activity_log_repo::PgLogStore,
        },
        services::{
            consumer::{DecodeErrorPolicy, PullHandler, PushHandler, Rejecter},
            log_service::LogService,
            registry::ConsumerRegistry,
            worker::{run_pull_consumer, run_push_consumer},
        },
    },
    sqlx::postgres::PgPoolOptions,
    std::{sync::Arc, time::Duration},
    tokio::signal,
    tracing_subscriber::EnvFilter,
};

#[tokio::main]
async fn main() -> Result<(), PipelineError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(3))
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| PipelineError::Database(sqlx::Error::Migrate(Box::new(e))))?;

    let store = PgLogStore::new(pool.clone(), config.write_timeout, config.batch_mode);
    let log_service = LogService::new(Arc::new(store));

    let js = jetstream::connect(&config).await?;
    let dead_letter: Option<Arc<dyn DeadLetterSink>> = match config.decode_policy {
        DecodeErrorPolicy::DeadLetter => Some(Arc::new(JetStreamDeadLetter::new(
            js.clone(),
            config.dead_letter_subject.clone(),
        ))),
        _ => None,
    };
    let rejecter = Rejecter::new(config.decode_policy, dead_letter);

    let stream = jetstream::ensure_stream(&js, &config.push.subscription).await?;
    let push_consumer = jetstream::ensure_push_consumer(&stream, &config.push).await?;
    let pull_consumer = jetstream::ensure_pull_consumer(&stream, &config.pull).await?;

    let mut registry = ConsumerRegistry::new();

    let push_handler = PushHandler::new(log_service.clone(), rejecter.clone())
        .skip_older_than(config.skip_older_than);
    let push_source = JetStreamPush::subscribe(&push_consumer).await?;
    let durable = config.push.subscription.durable.clone();
    let shutdown = registry.shutdown_signal();
    registry.spawn(
        durable.clone(),
        run_push_consumer(durable, push_handler, push_source, shutdown),
    );

    let pull_handler = PullHandler::new(log_service.clone(), rejecter, config.pull.batch_size);
    let durable = config.pull.subscription.durable.clone();
    let shutdown = registry.shutdown_signal();
    registry.spawn(
        durable.clone(),
        run_pull_consumer(
            durable,
            pull_handler,
            JetStreamPull::new(pull_consumer),
            config.pull.fetch_size,
            shutdown,
        ),
    );

    let app = http::router(AppState { log_service }, Duration::from_secs(10));
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .map_err(|e| PipelineError::Config(format!("bind {}: {e}", config.http_addr)))?;
    tracing::info!(addr = %config.http_addr, "listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    registry.shutdown().await;
    pool.close().await;

    served.map_err(|e| PipelineError::Config(format!("http server: {e}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => tracing::info!("received ctrl+c, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
