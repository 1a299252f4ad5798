use lift_dispatch::api;
use lift_dispatch::config::{self, SimulatorMode};
use lift_dispatch::dispatch::service::{ControlSurface, DispatchService};
use lift_dispatch::simulator::http::HttpSimulatorFactory;
use lift_dispatch::simulator::mock::MockSimulatorFactory;
use lift_dispatch::state::AppState;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::Level;

fn init_tracing(level: &str) {
    let max_level = Level::from_str(level).unwrap_or(Level::INFO);
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(max_level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "lift-dispatch starting"
    );

    let state = Arc::new(RwLock::new(AppState::new()));
    let settings = config.dispatch_settings()?;
    let policy = config.policy_settings();

    let control: Arc<dyn ControlSurface> = match config.simulator_mode() {
        SimulatorMode::Http => {
            tracing::info!(
                endpoint = config.simulator_endpoint(),
                timeout_ms = config.simulator_timeout().as_millis(),
                "Using simulation server"
            );
            let factory =
                HttpSimulatorFactory::new(config.simulator_endpoint(), config.simulator_timeout());
            Arc::new(DispatchService::new(
                factory,
                policy,
                settings,
                Arc::clone(&state),
            ))
        }
        SimulatorMode::Mock => {
            let scenario = config.mock_scenario();
            tracing::info!(
                floors = scenario.floor_count,
                elevators = scenario.elevator_count,
                passengers = scenario.traffic.len(),
                "Using in-memory simulator"
            );
            Arc::new(DispatchService::new(
                MockSimulatorFactory::new(scenario),
                policy,
                settings,
                Arc::clone(&state),
            ))
        }
    };

    if config.autostart() {
        let starter = Arc::clone(&control);
        let reply = tokio::task::spawn_blocking(move || starter.start()).await?;
        if reply.success {
            tracing::info!("Controller started at boot");
        } else {
            tracing::warn!(message = %reply.message, "Controller autostart failed");
        }
    }

    let api_state = {
        let guard = state.read().map_err(|_| "state lock poisoned")?;
        api::ApiState::new(&guard, Arc::clone(&control))
    };
    let app = api::router(api_state);
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let reply = tokio::task::spawn_blocking(move || control.stop()).await?;
    if reply.success {
        tracing::info!("Controller stopped on shutdown");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
