//! Autogate demo controller.
//!
//! Wires the mock peripherals, plays one visitor through the gate and shuts
//! everything down in order.
//!
//! ```text
//! autogate [CONFIG.json]
//! ```
//!
//! Without a file the defaults apply; `GATE_*` and `AUTOGATE_*` environment
//! variables override either. Log verbosity follows `RUST_LOG` (default
//! `info`).

use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use autogate_core::AppConfig;
use autogate_hardware::mock::MockRig;
use autogate_hardware::{BuzzerPlayRequest, ButtonEvent, GateState, Peripherals, StatusLightState};

fn load_config() -> Result<AppConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => AppConfig::from_json_file(&path)
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => AppConfig::default(),
    };
    config
        .apply_env(std::env::vars())
        .context("invalid configuration override in environment")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Autogate {}", autogate_core::VERSION);
    let config = load_config()?;

    let (mut peripherals, rig) = tokio::task::spawn_blocking(move || MockRig::build(&config))
        .await
        .context("peripheral setup task failed")?
        .context("failed to initialize peripherals")?;

    let outcome = visitor(&peripherals, &rig).await;

    let stats = peripherals.stats();
    let shutdown = tokio::task::spawn_blocking(move || {
        peripherals.shutdown()?;
        Ok::<_, autogate_core::Error>(peripherals.stats())
    })
    .await
    .context("shutdown task failed")?;

    info!("Session: {}", serde_json::to_string(&stats)?);
    match shutdown {
        Ok(after) => info!("After shutdown: {}", serde_json::to_string(&after)?),
        Err(e) => warn!("Shutdown reported: {}", e),
    }
    outcome
}

/// One visit: card scan, gate cycle, collision button check.
async fn visitor(peripherals: &Peripherals, rig: &MockRig) -> Result<()> {
    let lights = peripherals.status_lights().context("no status lights")?;
    let screen = peripherals.screen().context("no screen")?;
    let gate = peripherals.gate().context("no gate")?;
    let buzzer = peripherals.buzzer().context("no buzzer")?;
    let rfid = peripherals.rfid().context("no card reader")?;
    let button = peripherals.button().context("no button")?;
    let ultrasonic = peripherals.ultrasonic().context("no range finder")?;

    lights.set_state(StatusLightState::Ready)?;
    screen.write_text("APROXIME O CARTAO")?;

    let mut scans = rfid.attach_async().await?;
    rig.reader.present(vec![0x04, 0xa2, 0x2b, 0x9c]);
    let scan = tokio::time::timeout(Duration::from_secs(5), scans.next())
        .await
        .context("no card presented")?
        .context("card reader stopped")?;
    scans.close().await;
    info!(uid = %scan.uid, "Visitor identified");

    lights.set_state(StatusLightState::Allow)?;
    screen.write_text(&format!("ACESSO LIBERADO\n{}", scan.uid))?;
    buzzer
        .play_async(BuzzerPlayRequest::new(1320.0, Duration::from_millis(150)), true)
        .await?;

    gate.set_state_async(GateState::Open, true).await?;
    gate.drain_async().await?;
    info!(distance_cm = ultrasonic.distance_cm()?, "Gate open");

    // Someone leans on the gate while it is open.
    let mut presses = button.attach_async().await?;
    rig.button.press();
    rig.button.bounce(3);
    rig.button.release();
    let mut edges = Vec::new();
    while let Ok(Some(edge)) =
        tokio::time::timeout(Duration::from_millis(200), presses.next()).await
    {
        edges.push(edge);
        if edge == ButtonEvent::Released {
            break;
        }
    }
    presses.close().await;
    info!(?edges, "Collision button");

    gate.set_state_async(GateState::Close, true).await?;
    gate.drain_async().await?;
    buzzer.drain_async().await?;

    lights.set_state(StatusLightState::None)?;
    screen.clear()?;
    Ok(())
}
