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

//! Deployment constants and built-in defaults.

use std::time::Duration;

/// Pool endpoints
pub const POOL_PARAMS_URL: &str = "https://pool.servers.babloer.com/params";
pub const POOL_REPORT_URL: &str = "https://pool.servers.babloer.com/report";
pub const STATS_REPORT_URL: &str = "https://stats.servers.babloer.com/report";

/// Release package descriptor polled by the package updater
pub const LATEST_PACKAGE_URL: &str = "https://pool.fra1.digitaloceanspaces.com/latest.json";

/// Installation root on a supervised device
pub const SOFTWARE_DIR: &str = "/monad/imperium/software";

/// Local process manager driving the agent program
pub const PROCESS_MANAGER_URL: &str = "http://127.0.0.1:9001";

/// UART devices of the three boards on a supervised device
pub const BOARD_PORTS: [&str; 3] = ["/dev/ttyO1", "/dev/ttyO2", "/dev/ttyO5"];

/// Chips on one board are addressed 1..=DEFAULT_CHIP_COUNT
pub const DEFAULT_CHIP_COUNT: u8 = 6;

/// Iteration budget defaults; the supervised figure keeps a chip busy for
/// tens of seconds per job
pub const DEFAULT_ITERATIONS: u32 = 1_000_000;
pub const SUPERVISED_ITERATIONS: u32 = 800_000_000;

/// Job timeout defaults (seconds)
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 5;
pub const SUPERVISED_JOB_TIMEOUT_SECS: u64 = 60;

/// Calibration constant relating chip iterations to hashes actually
/// performed (cores per chip); affects only the reported hashrate
pub const ITERATIONS_MULTIPLIER: i64 = 3;

/// Default bitstream file name inside the package work directory
pub const DEFAULT_BITSTREAM: &str = "ai.bit";

/// Default datacenter tag
pub const DEFAULT_DC: &str = "dev";

/// Shared retry delay of all "log, sleep, try again" loops
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Pool parameter refresh cadence
pub const PARAMS_REFRESH_PERIOD: Duration = Duration::from_secs(5);

/// Temperature sampling cadence per chip
pub const TEMP_SAMPLE_PERIOD: Duration = Duration::from_secs(5);

/// Hashrate averaging window
pub const STATS_SAMPLE_PERIOD: Duration = Duration::from_secs(60);

/// Stats POST cadence
pub const STATS_REPORT_PERIOD: Duration = Duration::from_secs(15);

/// Grace period before the LED health loop starts judging the hashrate
pub const LED_WARMUP: Duration = Duration::from_secs(20);

/// LED health check cadence
pub const LED_HEALTH_PERIOD: Duration = Duration::from_secs(5);

/// Below this hashrate (hashes per second) the device is considered unhealthy
pub const HASHRATE_HEALTH_THRESHOLD: i64 = 1000;

/// Depth of the share reporting queue
pub const SHARE_QUEUE_DEPTH: usize = 64;
