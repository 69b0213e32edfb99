use std::{process, sync::Arc, time::Duration};

use magpie::{
    application::{
        auth::AdminAuth,
        bookmarks::BookmarkService,
        error::AppError,
        export::render_markdown,
        store::BookmarkStore,
    },
    config,
    infra::{
        error::InfraError,
        http::{self, ApiRateLimiter, ApiState, api::models::export_document},
        store::{file::JsonFileBookmarkStore, redb::RedbBookmarkStore},
        telemetry,
    },
};
use time::OffsetDateTime;
use tokio::net::TcpListener;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Export(args) => run_export(settings, args).await,
        config::Command::Reindex(_) => run_reindex(settings).await,
    }
}

fn open_store(storage: &config::StorageSettings) -> Result<Arc<dyn BookmarkStore>, AppError> {
    let store: Arc<dyn BookmarkStore> = match storage.backend {
        config::StorageBackend::Redb => Arc::new(RedbBookmarkStore::open(&storage.path)?),
        config::StorageBackend::JsonFile => Arc::new(JsonFileBookmarkStore::open(&storage.path)?),
    };
    info!(
        backend = ?storage.backend,
        path = %storage.path.display(),
        "storage ready"
    );
    Ok(store)
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = open_store(&settings.storage)?;
    let bookmarks = Arc::new(BookmarkService::new(store));

    if settings.auth.admin_token.is_none() {
        warn!("no admin token configured, only the public read surface will answer");
    }
    let auth = Arc::new(AdminAuth::new(settings.auth.admin_token.as_deref()));

    let rate_limiter = Arc::new(ApiRateLimiter::new(
        Duration::from_secs(u64::from(settings.api_rate_limit.window_seconds.get())),
        settings.api_rate_limit.max_requests.get(),
    ));

    let state = ApiState {
        bookmarks,
        auth,
        rate_limiter,
    };

    serve_http(&settings, state).await
}

async fn run_export(settings: config::Settings, args: config::ExportArgs) -> Result<(), AppError> {
    let store = open_store(&settings.storage)?;
    let bookmarks = BookmarkService::new(store);

    let records = bookmarks.export_all().await?;
    let exported_at = OffsetDateTime::now_utc();
    let total = records.len();

    let body = match args.format {
        config::ExportFormatArg::Json => {
            let document = export_document(records, exported_at);
            serde_json::to_string_pretty(&document)
                .map_err(|err| AppError::unexpected(format!("failed to encode export: {err}")))?
        }
        config::ExportFormatArg::Markdown => render_markdown(&records, exported_at),
    };

    tokio::fs::write(&args.file, body)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        file = %args.file.display(),
        total,
        format = ?args.format,
        "export written"
    );
    Ok(())
}

async fn run_reindex(settings: config::Settings) -> Result<(), AppError> {
    if settings.storage.backend != config::StorageBackend::Redb {
        return Err(AppError::validation(
            "reindex only applies to the redb backend",
        ));
    }

    let store = open_store(&settings.storage)?;
    let bookmarks = BookmarkService::new(store);

    bookmarks.rebuild_indexes().await?;
    Ok(())
}

async fn serve_http(settings: &config::Settings, state: ApiState) -> Result<(), AppError> {
    let router = http::build_api_router(state);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            let _ = shutdown_rx.await;
        },
    );
    let mut serving = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut serving => return finish_serving(joined),
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                return Err(AppError::unexpected(format!(
                    "failed to listen for shutdown signal: {err}"
                )));
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(());
        }
    }

    // Bounded drain: in-flight requests get the configured window, then the
    // listener task is aborted outright.
    tokio::select! {
        joined = &mut serving => finish_serving(joined),
        _ = tokio::time::sleep(settings.server.graceful_shutdown) => {
            warn!("graceful shutdown window elapsed, aborting open connections");
            serving.abort();
            Ok(())
        }
    }
}

fn finish_serving(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}
