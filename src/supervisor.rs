// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! Supervised mode orchestration.
//!
//! Brings up all three boards of a device: uploads the bitstream, fans out
//! worker and temperature tasks per chip, keeps the front LEDs reflecting
//! mining health and runs the stats reporter in the foreground. Only a board
//! that fails to open aborts startup; everything later is retried in place
//! by the owning task.

use crate::config;
use crate::error;
use crate::leds::{self, LedPair, Mode};
use crate::misc;
use crate::monitor;
use crate::pll;
use crate::pool::{self, PoolClient};
use crate::stats::{self, Stats, TemperatureRegistry};
use crate::uart::{self, Bus, Channel};
use crate::work::Worker;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

pub struct Options {
    pub dc: String,
    pub chip_count: u8,
    pub iterations: u32,
    pub job_timeout: Duration,
    /// Bitstream file name inside the package work directory
    pub bitstream: String,
    /// Chip frequency in MHz, applied to every chip before mining starts
    pub frequency: Option<u32>,
}

pub async fn run(options: Options) -> error::Result<()> {
    let device_id = misc::device_id();
    let device_name = misc::device_name(&options.dc);
    info!("started device {} ({})", device_name, device_id);

    let leds = LedPair::on_gpio();
    leds.red.set_mode(Mode::Off);
    leds.green.set_mode(Mode::Blinking);
    leds::start_ticker(leds.clone());

    info!("uploading bitstream");
    upload_bitstream(&options.bitstream).await;

    let client = Arc::new(PoolClient::new());
    info!("loading initial pool parameters");
    let initial = client.fetch_params_retry().await;
    let (params_sender, params) = watch::channel(initial);
    pool::start_params_refresh(client.clone(), params_sender);

    let stats = Stats::new(device_id, device_name.clone(), options.dc.clone());
    let temperatures = TemperatureRegistry::new();
    stats::start_sampler(stats.clone());

    let (shares, share_queue) = mpsc::channel(config::SHARE_QUEUE_DEPTH);
    pool::start_share_reporter(client.clone(), share_queue);

    for (board, path) in config::BOARD_PORTS.iter().enumerate() {
        info!("[{:2}] connecting to board {}", board, path);
        let channel = Arc::new(Channel::open(path, uart::DEFAULT_BAUD_RATE)?);
        info!("[{:2}] board {} ready", board, channel.tag());
        let channel: Arc<dyn Bus> = channel;
        if let Some(frequency) = options.frequency {
            for chip_id in 1..=options.chip_count {
                if let Err(e) = pll::set_frequency(channel.as_ref(), chip_id, frequency).await {
                    warn!("[{:2}] chip {}: PLL programming failed: {}", board, chip_id, e);
                }
            }
        }
        for chip_id in 1..=options.chip_count {
            let worker = Worker {
                bus: channel.clone(),
                params: params.clone(),
                stats: stats.clone(),
                shares: shares.clone(),
                device: device_name.clone(),
                iterations: options.iterations,
                job_timeout: options.job_timeout,
                board,
                chip_id,
            };
            tokio::spawn(worker.run());
            monitor::start_monitor(
                channel.clone(),
                chip_id,
                format!("{}:{}", board, chip_id),
                temperatures.clone(),
            );
        }
    }

    start_health_watcher(stats.clone(), leds);

    stats::run_reporter(stats, temperatures, client).await;
    Ok(())
}

/// Run the external upload utility and stream its output into the log. An
/// upload failure is reported but mining is still attempted; the boards may
/// already carry a bitstream from a previous run.
async fn upload_bitstream(bitstream: &str) {
    let utility = Path::new(config::SOFTWARE_DIR).join("utility");
    let bitstream_path = Path::new(config::SOFTWARE_DIR).join("work").join(bitstream);

    let mut child = match Command::new(&utility)
        .arg("upload")
        .arg(&bitstream_path)
        .current_dir(config::SOFTWARE_DIR)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!("cannot start {}: {}", utility.display(), e);
            return;
        }
    };

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!("upload: {}", line);
            }
        });
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("upload: {}", line);
            }
        });
    }

    match child.wait().await {
        Ok(status) if status.success() => info!("bitstream upload finished"),
        Ok(status) => warn!("bitstream upload exited with {}", status),
        Err(e) => warn!("bitstream upload failed: {}", e),
    }
}

/// After the warm-up grace period, keep the LEDs reflecting whether the
/// device still produces hashes.
fn start_health_watcher(stats: Arc<Stats>, leds: Arc<LedPair>) {
    tokio::spawn(async move {
        tokio::time::sleep(config::LED_WARMUP).await;
        loop {
            if stats.hashrate().await < config::HASHRATE_HEALTH_THRESHOLD {
                leds.red.set_mode(Mode::Blinking);
                leds.green.set_mode(Mode::Off);
            } else {
                leds.green.set_mode(Mode::Blinking);
                leds.red.set_mode(Mode::Off);
            }
            tokio::time::sleep(config::LED_HEALTH_PERIOD).await;
        }
    });
}
