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

//! In-memory hashrate accounting and the periodic stats reporter.

use crate::config;
use crate::pool::{PoolClient, StatsBody, TemperatureBody};

use futures::lock::Mutex;
use tracing::{debug, warn};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

struct Counters {
    /// Iterations attributed since the last sample
    mined: i64,
    /// Last sampled hashrate in hashes per second
    hashrate: i64,
    sampled_at: Instant,
}

/// Device-wide mining statistics, shared by all workers and the sampler
pub struct Stats {
    /// Device identifier reported to the stats endpoint
    pub id: String,
    /// Human readable device name
    pub name: String,
    /// Datacenter tag
    pub dc: String,
    counters: Mutex<Counters>,
}

impl Stats {
    pub fn new(id: String, name: String, dc: String) -> Arc<Self> {
        Arc::new(Self {
            id,
            name,
            dc,
            counters: Mutex::new(Counters {
                mined: 0,
                hashrate: 0,
                sampled_at: Instant::now(),
            }),
        })
    }

    /// Attribute `count` hashes to this device
    pub async fn apply_mined(&self, count: i64) {
        let mut counters = self.counters.lock().await;
        counters.mined += count;
    }

    /// Last sampled hashrate in hashes per second
    pub async fn hashrate(&self) -> i64 {
        self.counters.lock().await.hashrate
    }

    /// Convert the accumulated counter into a rate and reset the window
    pub async fn sample(&self) {
        let mut counters = self.counters.lock().await;
        let elapsed = counters.sampled_at.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            counters.hashrate = (counters.mined as f64 / elapsed) as i64;
        }
        counters.mined = 0;
        counters.sampled_at = Instant::now();
        debug!("sampled hashrate: {} H/s", counters.hashrate);
    }
}

/// Temperature readings of all chips, keyed by a board/chip tag
pub struct TemperatureRegistry {
    readings: Mutex<BTreeMap<String, f32>>,
}

impl TemperatureRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            readings: Mutex::new(BTreeMap::new()),
        })
    }

    pub async fn record(&self, tag: String, value: f32) {
        self.readings.lock().await.insert(tag, value);
    }

    pub async fn snapshot(&self) -> Vec<TemperatureBody> {
        self.readings
            .lock()
            .await
            .iter()
            .map(|(id, value)| TemperatureBody {
                id: id.clone(),
                value: *value,
            })
            .collect()
    }
}

/// Spawn the background hashrate sampler
pub fn start_sampler(stats: Arc<Stats>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(config::STATS_SAMPLE_PERIOD).await;
            stats.sample().await;
        }
    });
}

/// Periodically POST statistics to the pool. Transport errors are logged and
/// forgotten, the next tick retries. This future never resolves and is meant
/// to keep the process foreground busy.
pub async fn run_reporter(
    stats: Arc<Stats>,
    temperatures: Arc<TemperatureRegistry>,
    client: Arc<PoolClient>,
) {
    loop {
        let body = StatsBody {
            id: stats.id.clone(),
            name: stats.name.clone(),
            dc: stats.dc.clone(),
            hashrate: stats.hashrate().await as f64 / 1_000_000_000.0,
            temperature: temperatures.snapshot().await,
        };
        if let Err(e) = client.report_stats(&body).await {
            warn!("stats report failed: {}", e);
        }
        tokio::time::sleep(config::STATS_REPORT_PERIOD).await;
    }
}
