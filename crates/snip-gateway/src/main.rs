use anyhow::Context;
use clap::Parser;
use snip_gateway::cipher::UserCipher;
use snip_gateway::config::CLI;
use snip_gateway::{telemetry, App, AppState};
use snip_generator::RandomGenerator;
use snip_storage::{Opened, ReplayReport, Store};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = CLI::parse();
    telemetry::init(&config.log_level)?;

    let cipher = match config.secret_key.as_deref() {
        Some(secret) => UserCipher::from_secret(secret).context("invalid secret key")?,
        None => {
            warn!("no secret key configured, identity cookies will not survive a restart");
            UserCipher::random()
        }
    };

    let Opened { store, replay } = Store::open(&config.store_config(), RandomGenerator::new())
        .await
        .context("failed to open storage")?;
    info!(backend = %store.backend(), "storage ready");
    if let Some(report) = &replay {
        log_replay(report);
    }

    let state = AppState::new(store.clone(), config.public_base_url(), cipher);
    let listener = tokio::net::TcpListener::bind(&config.run_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.run_addr))?;
    info!(
        listen_addr = %listener.local_addr()?,
        base_url = %config.public_base_url(),
        "starting snip server"
    );

    axum::serve(listener, App::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close(&store).await;
    Ok(())
}

fn log_replay(report: &ReplayReport) {
    info!(
        path = %report.path.display(),
        loaded = report.loaded,
        skipped = report.skipped.len(),
        "journal replayed"
    );
    for skipped in &report.skipped {
        warn!(
            path = %report.path.display(),
            line = skipped.line,
            reason = %skipped.reason,
            "skipped journal line"
        );
    }
}

async fn close(store: &Store) {
    match store.close().await {
        Ok(()) => info!(backend = %store.backend(), "storage closed"),
        Err(err) => error!(backend = %store.backend(), error = %err, "failed to close storage"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
