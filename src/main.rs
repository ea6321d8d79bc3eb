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

use imperium::chain::{self, CandidateBlock};
use imperium::config;
use imperium::misc;
use imperium::pool::{self, PoolClient};
use imperium::stats::{self, Stats, TemperatureRegistry};
use imperium::supervisor;
use imperium::uart::{self, Bus, Channel};
use imperium::work::Worker;

use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, watch};
use tokio_serial::SerialPortBuilderExt;
use tracing::{error, info};

use std::convert::TryInto;
use std::process::exit;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let matches = clap::App::new("imperium")
        .version(imperium::VERSION)
        .arg(
            clap::Arg::with_name("port")
                .long("port")
                .help("UART port name")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("iterations")
                .long("iterations")
                .help("Iterations count per job")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("config")
                .long("config")
                .help("Debug input file with a fixed candidate block (hex)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("timeout")
                .long("timeout")
                .help("Job timeout in seconds")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("dc")
                .long("dc")
                .help("Datacenter tag")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("supervised")
                .long("supervised")
                .help("Run the full supervised device"),
        )
        .arg(
            clap::Arg::with_name("chip")
                .long("chip")
                .help("Number of chips per board")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("bitstream")
                .long("bitstream")
                .help("Bitstream file name")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("frequency")
                .long("frequency")
                .help("Program the chip PLLs to this frequency (in MHz)")
                .takes_value(true),
        )
        .arg(
            clap::Arg::with_name("test")
                .long("test")
                .help("Dump raw serial input"),
        )
        .get_matches();

    // verbose by default when poking a single block from a debug file
    let default_filter = if matches.is_present("config") {
        "imperium=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let port = matches.value_of("port");
    let dc = matches.value_of("dc").unwrap_or(config::DEFAULT_DC);
    let iterations = parse_flag(&matches, "iterations", config::DEFAULT_ITERATIONS);
    let timeout_secs = parse_flag(&matches, "timeout", config::DEFAULT_JOB_TIMEOUT_SECS);
    let chip_count = parse_flag(&matches, "chip", config::DEFAULT_CHIP_COUNT);
    let frequency = matches
        .value_of("frequency")
        .map(|raw| match raw.parse::<u32>() {
            Ok(mhz) => mhz,
            Err(_) => {
                error!("invalid value for --frequency: {}", raw);
                exit(1);
            }
        });

    if matches.is_present("test") {
        let port = port.unwrap_or_else(|| {
            error!("no port specified");
            exit(1);
        });
        dump_serial(port).await;
        return;
    }

    if matches.is_present("supervised") {
        info!("running in supervised mode");
        let options = supervisor::Options {
            dc: dc.to_string(),
            chip_count,
            iterations: config::SUPERVISED_ITERATIONS,
            job_timeout: Duration::from_secs(config::SUPERVISED_JOB_TIMEOUT_SECS),
            bitstream: matches
                .value_of("bitstream")
                .unwrap_or(config::DEFAULT_BITSTREAM)
                .to_string(),
            frequency,
        };
        if let Err(e) = supervisor::run(options).await {
            error!("supervisor failed: {}", e);
            exit(1);
        }
        return;
    }

    let port = port.unwrap_or_else(|| {
        error!("no port specified");
        exit(1);
    });
    info!("connecting to {}", port);
    let channel = match Channel::open(port, uart::DEFAULT_BAUD_RATE) {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            error!("cannot open {}: {}", port, e);
            exit(1);
        }
    };
    info!("{} ready", channel.tag());

    if let Some(path) = matches.value_of("config") {
        run_debug(
            channel,
            path,
            iterations,
            Duration::from_secs(timeout_secs),
        )
        .await;
        return;
    }

    run_mining(
        channel,
        dc,
        chip_count,
        iterations,
        Duration::from_secs(timeout_secs),
        frequency,
    )
    .await;
}

fn parse_flag<T: std::str::FromStr>(matches: &clap::ArgMatches, name: &str, default: T) -> T {
    match matches.value_of(name) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            error!("invalid value for --{}: {}", name, raw);
            exit(1);
        }),
    }
}

/// Raw dump mode for bring-up: print every byte the port produces
async fn dump_serial(path: &str) {
    info!("connecting to {}", path);
    let mut port = match tokio_serial::new(path, uart::DEFAULT_BAUD_RATE).open_native_async() {
        Ok(port) => port,
        Err(e) => {
            error!("cannot open {}: {}", path, e);
            exit(1);
        }
    };
    let mut byte = [0u8; 1];
    loop {
        match port.read(&mut byte).await {
            Ok(0) => continue,
            Ok(_) => info!("{:02x}", byte[0]),
            Err(e) => {
                error!("read failed: {}", e);
                exit(1);
            }
        }
    }
}

/// Run one fixed candidate block from a debug file in a loop, verbosely
async fn run_debug(channel: Arc<Channel>, path: &str, iterations: u32, timeout: Duration) {
    info!("loading debug block from {}", path);
    let block = match load_debug_block(path) {
        Ok(block) => block,
        Err(e) => {
            error!("invalid debug config: {}", e);
            exit(1);
        }
    };

    loop {
        let query = chain::perform_job(channel.as_ref(), 1, &block, iterations, timeout).await;
        match query {
            Ok(result) => {
                info!("nonce value : {}", hex::encode(result.value));
                info!("random      : {}", hex::encode(result.random));
                info!("expires     : {}", result.expires);
            }
            Err(e) => {
                error!("{}", e);
                exit(1);
            }
        }
    }
}

fn load_debug_block(path: &str) -> Result<CandidateBlock, String> {
    let raw = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let raw = raw.trim();
    if raw.len() != 2 * chain::BLOCK_SIZE {
        return Err(format!(
            "expected {} hex characters, got {}",
            2 * chain::BLOCK_SIZE,
            raw.len()
        ));
    }
    let bytes = hex::decode(raw).map_err(|e| e.to_string())?;
    Ok(CandidateBlock::from_bytes(
        bytes[..].try_into().expect("BUG: block size"),
    ))
}

/// Single-board mining: the supervised data path without bitstream upload,
/// LEDs and the board fan-out.
async fn run_mining(
    channel: Arc<Channel>,
    dc: &str,
    chip_count: u8,
    iterations: u32,
    job_timeout: Duration,
    frequency: Option<u32>,
) {
    let device_id = misc::device_id();
    let device_name = misc::device_name(dc);
    info!("started device {} ({})", device_name, device_id);

    let client = Arc::new(PoolClient::new());
    info!("loading initial pool parameters");
    let initial = client.fetch_params_retry().await;
    let (params_sender, params) = watch::channel(initial);
    pool::start_params_refresh(client.clone(), params_sender);

    let stats = Stats::new(device_id, device_name.clone(), dc.to_string());
    let temperatures = TemperatureRegistry::new();
    stats::start_sampler(stats.clone());

    let (shares, share_queue) = mpsc::channel(config::SHARE_QUEUE_DEPTH);
    pool::start_share_reporter(client.clone(), share_queue);

    let bus: Arc<dyn Bus> = channel;
    if let Some(mhz) = frequency {
        for chip_id in 1..=chip_count {
            if let Err(e) = imperium::pll::set_frequency(bus.as_ref(), chip_id, mhz).await {
                error!("chip {}: PLL programming failed: {}", chip_id, e);
            }
        }
    }
    for chip_id in 1..=chip_count {
        let worker = Worker {
            bus: bus.clone(),
            params: params.clone(),
            stats: stats.clone(),
            shares: shares.clone(),
            device: device_name.clone(),
            iterations,
            job_timeout,
            board: 0,
            chip_id,
        };
        tokio::spawn(worker.run());
        imperium::monitor::start_monitor(
            bus.clone(),
            chip_id,
            format!("0:{}", chip_id),
            temperatures.clone(),
        );
    }

    stats::run_reporter(stats, temperatures, client).await;
}
