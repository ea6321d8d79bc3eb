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

//! Pool HTTP API client, parameter refresh and share reporting.
//!
//! Workers never talk HTTP themselves: they read the latest parameter
//! snapshot from a watch channel and push qualifying results into a bounded
//! queue drained by the share reporter. A share is retried forever; the pool
//! deduplicates idempotently and a dropped share is lost revenue.

use crate::config;
use crate::error::{self, ErrorKind};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use std::time::Duration;

/// The most recent fully loaded pool parameter snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PoolParams {
    /// Opaque work identifier, echoed back in reports
    pub key: String,
    /// Pool supplied block prefix
    pub header: Vec<u8>,
    /// Pool supplied middle section
    pub seed: Vec<u8>,
}

/// One difficulty-qualifying result on its way to the pool
#[derive(Debug, Clone)]
pub struct Share {
    pub device: String,
    pub key: String,
    pub random: Vec<u8>,
    pub value: Vec<u8>,
    pub expires: u32,
}

#[derive(Deserialize)]
struct ParamsBody {
    key: String,
    header: String,
    seed: String,
}

#[derive(Serialize)]
struct ShareBody {
    device: String,
    key: String,
    random: String,
    value: String,
    expires: u32,
}

#[derive(Serialize)]
pub struct TemperatureBody {
    pub id: String,
    pub value: f32,
}

#[derive(Serialize)]
pub struct StatsBody {
    pub id: String,
    pub name: String,
    pub dc: String,
    /// Hashrate in GH/s
    pub hashrate: f64,
    pub temperature: Vec<TemperatureBody>,
}

pub struct PoolClient {
    client: reqwest::Client,
}

impl PoolClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("BUG: HTTP client construction failed");
        Self { client }
    }

    /// Fetch and decode the current pool parameters
    pub async fn fetch_params(&self) -> error::Result<PoolParams> {
        let body: ParamsBody = self
            .client
            .get(config::POOL_PARAMS_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let header = base64::decode(&body.header)
            .map_err(|e| ErrorKind::Remote(format!("header field: {}", e)))?;
        let seed = base64::decode(&body.seed)
            .map_err(|e| ErrorKind::Remote(format!("seed field: {}", e)))?;

        Ok(PoolParams {
            key: body.key,
            header,
            seed,
        })
    }

    /// Fetch parameters, blocking until the pool answers
    pub async fn fetch_params_retry(&self) -> PoolParams {
        loop {
            match self.fetch_params().await {
                Ok(params) => return params,
                Err(e) => {
                    warn!("parameter fetch failed: {}", e);
                    tokio::time::sleep(config::RETRY_DELAY).await;
                }
            }
        }
    }

    /// POST one share to the pool; the response body is ignored
    pub async fn report_share(&self, share: &Share) -> error::Result<()> {
        let body = ShareBody {
            device: share.device.clone(),
            key: share.key.clone(),
            random: base64::encode(&share.random),
            value: base64::encode(&share.value),
            expires: share.expires,
        };
        self.client
            .post(config::POOL_REPORT_URL)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// POST device statistics; callers treat failures as ignorable
    pub async fn report_stats(&self, body: &StatsBody) -> error::Result<()> {
        self.client
            .post(config::STATS_REPORT_URL)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Spawn the background refresher: every refresh period the latest snapshot
/// is published over the watch channel. Readers always see a complete
/// snapshot, never a torn one.
pub fn start_params_refresh(client: std::sync::Arc<PoolClient>, sender: watch::Sender<PoolParams>) {
    tokio::spawn(async move {
        loop {
            let params = client.fetch_params_retry().await;
            if sender.send(params).is_err() {
                // all mining tasks are gone, nothing left to refresh for
                return;
            }
            tokio::time::sleep(config::PARAMS_REFRESH_PERIOD).await;
        }
    });
}

/// Spawn the share reporter draining the bounded share queue. Each share is
/// retried with a fixed delay until the pool acknowledges it.
pub fn start_share_reporter(client: std::sync::Arc<PoolClient>, mut shares: mpsc::Receiver<Share>) {
    tokio::spawn(async move {
        while let Some(share) = shares.recv().await {
            loop {
                match client.report_share(&share).await {
                    Ok(()) => {
                        info!("share reported (key {})", share.key);
                        break;
                    }
                    Err(e) => {
                        warn!("share report failed, retrying: {}", e);
                        tokio::time::sleep(config::RETRY_DELAY).await;
                    }
                }
            }
        }
        debug!("share queue closed");
    });
}
