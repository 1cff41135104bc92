use std::process;
use std::sync::Arc;

use permaflush::{
    catalog::Capabilities,
    config,
    error::AppError,
    flush::{Flusher, RequestContext},
    hooks::{HookBus, bind_api_saves, bind_watched_events},
    http::{self, HttpState},
    rewrite::HttpRewriteRules,
    scheduler::FlushScheduler,
    settings::{SettingsService, SettingsStore, TomlSettingsStore},
    telemetry,
};
use tracing::{Dispatch, Level, dispatcher, error, info};
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
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Flush(_) => run_flush(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let flusher = build_flusher(&settings)?;
    let capabilities = Capabilities::from(&settings.capabilities);

    let store: Arc<dyn SettingsStore> =
        Arc::new(TomlSettingsStore::new(settings.store.state_file.clone()));
    let (settings_service, period_rx) = SettingsService::connect(store, capabilities).await?;
    let settings_service = Arc::new(settings_service);

    let bus = Arc::new(HookBus::new());
    let flush_settings = settings_service.load().await?;
    bind_watched_events(
        &bus,
        &flush_settings.watched_events,
        &settings_service.catalog(),
        flusher.clone(),
    );
    bind_api_saves(&bus, &settings.host.content_types, flusher.clone());

    let scheduler = FlushScheduler::new(flusher.clone(), period_rx);
    scheduler.activate();

    let router = http::build_router(HttpState {
        settings: settings_service,
        bus,
        flusher,
    });

    let listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(|err| AppError::unexpected(format!("failed to bind admin listener: {err}")))?;
    info!(addr = %settings.server.admin_addr, "Admin listener bound");

    let result = axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    scheduler.deactivate();
    result
}

async fn run_flush(settings: config::Settings) -> Result<(), AppError> {
    let flusher = build_flusher(&settings)?;

    let mut ctx = RequestContext::new();
    let outcome = flusher.flush(&mut ctx).await;
    if !outcome.is_success() {
        return Err(AppError::unexpected("flush request was not accepted"));
    }

    info!("Permalink flush completed");
    Ok(())
}

fn build_flusher(settings: &config::Settings) -> Result<Arc<Flusher>, AppError> {
    let flush_url = settings
        .host
        .flush_url
        .as_ref()
        .ok_or_else(|| AppError::unexpected("host flush url is not configured"))?;

    let rules = Arc::new(HttpRewriteRules::new(flush_url.clone()));
    Ok(Arc::new(Flusher::new(rules)))
}
