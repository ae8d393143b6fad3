use std::{io, process, sync::Arc};

use ogcard::{
    application::{
        capture::PageCapturer,
        error::AppError,
        pipeline::{Pipeline, PipelineConfig},
        render::SiteRenderer,
        store::ArticleSource,
    },
    config,
    infra::{
        articles::FsArticleStore, browser::CommandPageCapturer, error::InfraError,
        process::CommandTemplate, renderer::CommandSiteRenderer, telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(code) => code,
        Err(error) => {
            report_application_error(&error);
            error.exit_code()
        }
    };
    process::exit(code);
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<i32, AppError> {
    let (_cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    telemetry::init(&settings.logging)?;

    let store: Arc<dyn ArticleSource> = Arc::new(FsArticleStore::new(settings.articles_path()));
    let renderer: Arc<dyn SiteRenderer> = Arc::new(CommandSiteRenderer::new(CommandTemplate::new(
        settings.renderer.program.clone(),
        settings.renderer.args.clone(),
    )));
    let capturer: Arc<dyn PageCapturer> = Arc::new(CommandPageCapturer::new(
        CommandTemplate::new(settings.browser.program.clone(), settings.browser.args.clone()),
    ));
    let pipeline = Pipeline::new(PipelineConfig::from(&settings), store, renderer, capturer);

    info!(
        target = "ogcard",
        op = "main::run",
        site_root = %settings.site.root.display(),
        articles = %settings.articles_path().display(),
        asset_dir = %settings.asset_dir().display(),
        concurrency = settings.capture.concurrency.get(),
        "Starting social card run"
    );

    // Losing the race drops the run future, which removes the scratch area.
    tokio::select! {
        report = pipeline.run() => {
            let report = report?;
            println!("{report}");
            Ok(report.outcome().exit_code())
        }
        signal = wait_for_shutdown_signal() => {
            let signal = signal.map_err(InfraError::Signals)?;
            Err(AppError::Interrupted { signal })
        }
    }
}

async fn wait_for_shutdown_signal() -> io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => Ok("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT")
    }
}
