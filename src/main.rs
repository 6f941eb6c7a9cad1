use color_eyre::{eyre::eyre, Result};
use mouse_gremlin::config::AppConfig;
use mouse_gremlin::controller::CollectorHandle;
use mouse_gremlin::mapping::{DispatchContext, MappingManager};
use mouse_gremlin::output::{
    LocalOutput, MouseController, MqttRemote, OutputSink, PointerDevice, RemoteOutput, RoutingState,
};
use mouse_gremlin::wiggle::WiggleController;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(AppConfig::default_path);
    let config = AppConfig::load(&config_path).await?;
    setup_logging_env(config.level()?);
    info!("Using config {}", config_path.display());

    let shutdown = CancellationToken::new();
    let routing = Arc::new(RoutingState::new(config.routing.local, false));

    // Local output
    let mouse = if config.routing.local {
        match local_pointer() {
            Ok(device) => Some(Arc::new(MouseController::spawn(device, config.output.tick()))),
            Err(e) => {
                warn!("Local output disabled: {}", e);
                None
            }
        }
    } else {
        None
    };

    // Remote output; the connection pump raises the remote routing flag
    let (remote, remote_pump) = if config.remote.enabled {
        let (remote, pump) = MqttRemote::connect(
            &config.remote,
            routing.clone(),
            config.routing.remote,
            shutdown.child_token(),
        )
        .map_err(|e| eyre!("Failed to set up remote output: {}", e))?;
        (Some(Arc::new(remote)), Some(pump))
    } else {
        if config.routing.remote {
            warn!("Remote routing requested but [remote] is not enabled");
        }
        (None, None)
    };

    let sink = Arc::new(OutputSink::new(
        mouse.clone().map(|m| m as Arc<dyn LocalOutput>),
        remote.map(|r| r as Arc<dyn RemoteOutput>),
    ));
    routing.retain_available(&sink);
    let wiggle = Arc::new(
        WiggleController::new(sink.clone(), routing.clone(), config.wiggle.clone())
            .map_err(|e| eyre!("Invalid wiggle settings: {}", e))?,
    );
    let context = Arc::new(DispatchContext {
        sink,
        routing,
        wiggle: wiggle.clone(),
        sim: None,
    });
    let manager = MappingManager::from_entries(&config.mappings, context);

    let (event_tx, event_rx) = mpsc::channel(1000);
    let mut collector =
        CollectorHandle::spawn(Some(config.controller.clone()), event_tx, shutdown.child_token())
            .await
            .map_err(|e| eyre!("Failed to spawn input collector: {}", e))?;

    let mut dispatch = tokio::task::spawn_blocking(move || manager.run(event_rx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| eyre!("Failed to listen for ctrl-c: {}", e))?;
            info!("Shutdown requested");
        }
        result = &mut dispatch => {
            if let Err(e) = result {
                error!("Dispatch loop ended unexpectedly: {}", e);
            }
        }
    }

    shutdown.cancel();
    let collector_result = tokio::task::spawn_blocking(move || collector.shutdown()).await?;
    if let Err(e) = collector_result {
        warn!("Input collector shutdown failed: {}", e);
    }
    if !dispatch.is_finished() {
        // the collector dropped its sender, so the loop drains and returns
        if let Err(e) = dispatch.await {
            warn!("Dispatch loop panicked: {}", e);
        }
    }

    let wiggle_result = tokio::task::spawn_blocking(move || wiggle.stop()).await?;
    if let Err(e) = wiggle_result {
        warn!("Wiggle shutdown failed: {}", e);
    }
    if let Some(mouse) = mouse {
        mouse.shutdown().await;
    }
    if let Some(pump) = remote_pump {
        if let Err(e) = pump.await {
            warn!("Remote connection task panicked: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

#[cfg(target_os = "linux")]
fn local_pointer() -> Result<Box<dyn PointerDevice>> {
    let pointer = mouse_gremlin::output::uinput::UinputPointer::create()
        .map_err(|e| eyre!("Failed to create virtual pointer: {}", e))?;
    Ok(Box::new(pointer))
}

#[cfg(not(target_os = "linux"))]
fn local_pointer() -> Result<Box<dyn PointerDevice>> {
    Err(eyre!("no virtual pointer backend on this platform"))
}
