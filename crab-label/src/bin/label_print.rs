//! label-print: send a test label or read card tracks through the local agent
//!
//! ```text
//! label-print <printer>                 print a test label
//! label-print <printer> --msr [secs]    read magnetic stripe data
//! ```
//!
//! Agent settings come from the environment (see `AgentConfig::from_env`),
//! `.env` is loaded first. `LOG_LEVEL` and `LOG_JSON` control logging.

use anyhow::{Context, bail};
use crab_label::outcome::legacy;
use crab_label::{
    AgentConfig, BlockOption, CommandAccumulator, DeviceFont, MsrTracks, PrintRequestCoordinator,
    QrCode, QrEcc, logger,
};

const DEFAULT_MSR_TIMEOUT_SECS: u64 = 20;

fn test_label(label: &mut CommandAccumulator) -> anyhow::Result<()> {
    label.set_width(812)?;
    label.clear_buffer();
    label.draw_block((10, 10), (800, 400), BlockOption::Box, 4)?;
    label.draw_device_font(&DeviceFont {
        width_mul: 2,
        height_mul: 2,
        ..DeviceFont::new("crab-label test", 40, 40)
    })?;
    label.draw_qr_code(&QrCode {
        ecc: QrEcc::H,
        ..QrCode::new("https://github.com", 40, 120)
    })?;
    label.print_buffer();
    Ok(())
}

fn report(result: &str, tracks: Option<&MsrTracks>) {
    if result.is_empty() {
        tracing::info!("Request accepted");
        return;
    }
    println!("{result}");
    if let Some(tracks) = tracks {
        println!("Track1: {}", tracks.track1);
        println!("Track2: {}", tracks.track2);
        println!("Track3: {}", tracks.track3);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let json = std::env::var("LOG_JSON")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);
    logger::init_logger(&level, json)?;

    let mut args = std::env::args().skip(1);
    let Some(printer) = args.next() else {
        bail!("usage: label-print <printer> [--msr [timeout_secs]]");
    };

    let config = AgentConfig::from_env().context("Invalid agent configuration")?;
    tracing::info!(server = %config.server_url, mode = ?config.mode, "Using print agent");
    let coordinator = PrintRequestCoordinator::new(config)?;

    let outcome = match args.next().as_deref() {
        Some("--msr") => {
            let timeout = match args.next() {
                Some(t) => t.parse().context("timeout must be a number of seconds")?,
                None => DEFAULT_MSR_TIMEOUT_SECS,
            };
            coordinator
                .request_msr_data(&printer, timeout, legacy::callback(report))
                .await
        }
        Some(other) => bail!("unknown argument: {other}"),
        None => {
            let mut label = CommandAccumulator::new();
            test_label(&mut label)?;
            let request_id = std::process::id() as u64;
            coordinator
                .print_label(&printer, &mut label, request_id, legacy::callback(report))
                .await?
        }
    };

    coordinator.shutdown();
    if !outcome.is_success() {
        bail!("request did not succeed: {outcome:?}");
    }
    Ok(())
}
