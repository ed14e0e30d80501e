mod bootstrap;
mod render;

use std::sync::Arc;

use anyhow::Result;
use dashboard_core::models::DataSource;
use dashboard_core::settings::Settings;
use dashboard_data::client::ApiClient;
use dashboard_runtime::session::{DashboardSession, RangeLoad, SessionError};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load_with_last_used();

    bootstrap::ensure_directories()?;
    bootstrap::setup_logging(&settings.log_level)?;

    tracing::info!("Chess Dashboard v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "User: {}, Range: {}, API: {}",
        settings.guest.as_deref().unwrap_or(&settings.username),
        settings.range,
        settings.api_url
    );

    let range = settings.time_range()?;
    let client = Arc::new(ApiClient::new(settings.api_url.clone())?);
    let mut session = DashboardSession::new(bootstrap::session_config(&settings), client);

    let status = session.start().await;
    println!(
        "{}",
        render::status_line(status, session.snapshot_generated_at(), &settings.timezone)
    );

    if let Some(guest) = &settings.guest {
        session.switch_to_guest(guest).await?;
    }

    if let Some(stats) = session.stats() {
        print!("{}", render::stats_block(session.username(), stats));
    }

    let source = match (session.is_guest(), settings.refresh) {
        (true, _) => DataSource::GuestDirect,
        (false, true) => DataSource::DatabaseRefresh,
        (false, false) => DataSource::DatabaseRead,
    };
    let mut progress_rx = session.orchestrator().subscribe_progress();
    let progress_task = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let progress = *progress_rx.borrow_and_update();
            if let Some(p) = progress {
                eprintln!("{}", render::progress_line(&p, source));
            }
        }
    });

    let cancel = session.cancel_token();
    let result = {
        let load = session.load_range(&range, settings.refresh);
        tokio::pin!(load);

        // Ctrl+C cancels the fetch; the load then finishes with `Cancelled`.
        tokio::select! {
            result = &mut load => result,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received; cancelling range fetch");
                cancel.cancel();
                load.await
            }
        }
    };
    progress_task.abort();

    match result {
        Ok(RangeLoad::Loaded(view)) => {
            print!("{}", render::range_block(&range.to_string(), &view));
        }
        Ok(RangeLoad::Cancelled) => println!("Fetch cancelled"),
        Err(SessionError::Offline) => {
            println!("Server is offline and no cached data covers {range}");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
