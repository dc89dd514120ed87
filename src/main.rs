#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use fcm_relay::adapters::push::FcmGateway;
use fcm_relay::config::Config;
use fcm_relay::{AppBuilder, telemetry};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    fcm_relay::setup_panic_hook();

    let boot_span = tracing::info_span!("boot_server");
    let (listener, app_router, shutdown_rx) = async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        fcm_relay::spawn_signal_handler(shutdown_tx);

        let gateway = Arc::new(FcmGateway::from_config(&config.fcm).await?);
        let app_router = AppBuilder::new(config.clone()).with_push_gateway(gateway).build()?;

        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(address = %addr, "listening");

        Ok::<_, anyhow::Error>((listener, app_router, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    let mut server_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app_router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            let _ = server_rx.wait_for(|&s| s).await;
        })
        .into_future();

    let mut deadline_rx = shutdown_rx;
    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    tokio::select! {
        res = server => {
            if let Err(e) = res {
                tracing::error!(error = %e, "Server error");
            }
        }
        () = async {
            let _ = deadline_rx.wait_for(|&s| s).await;
            tokio::time::sleep(drain_timeout).await;
        } => {
            tracing::warn!("Timeout waiting for in-flight requests to finish.");
        }
    }

    telemetry_guard.shutdown();
    Ok(())
}
