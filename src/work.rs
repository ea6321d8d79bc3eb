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

//! Per-chip mining loop.
//!
//! One worker per chip: take the latest parameter snapshot, randomize the
//! block tail, run a job and feed the result into accounting and reporting.
//! Everything below hardware open failures is recoverable; the worker logs,
//! sleeps and tries again.

use crate::chain::{self, CandidateBlock};
use crate::config;
use crate::error;
use crate::pool::{PoolParams, Share};
use crate::stats::Stats;
use crate::uart::Bus;

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use std::sync::Arc;
use std::time::Duration;

/// Everything one worker task needs
pub struct Worker {
    pub bus: Arc<dyn Bus>,
    pub params: watch::Receiver<PoolParams>,
    pub stats: Arc<Stats>,
    pub shares: mpsc::Sender<Share>,
    /// Device name reported with every share
    pub device: String,
    pub iterations: u32,
    pub job_timeout: Duration,
    /// Board index, only used for log context
    pub board: usize,
    pub chip_id: u8,
}

impl Worker {
    fn tag(&self) -> String {
        format!("{}:{}", self.board, self.chip_id)
    }

    /// Run the mining loop forever
    pub async fn run(mut self) {
        let tag = self.tag();
        info!("[{}] worker started", tag);
        loop {
            if let Err(e) = self.attempt().await {
                warn!("[{}] {}", tag, e);
                tokio::time::sleep(config::RETRY_DELAY).await;
            }
        }
    }

    /// One job attempt: build a block, run it, account and maybe report
    async fn attempt(&mut self) -> error::Result<()> {
        // the snapshot is pinned for the whole attempt; a parameter refresh
        // only affects the next one
        let params = self.params.borrow().clone();

        let mut random = [0u8; 32];
        OsRng.fill_bytes(&mut random);
        let block = CandidateBlock::assemble(&params.header, &params.seed, &random)?;

        let result = chain::perform_job(
            self.bus.as_ref(),
            self.chip_id,
            &block,
            self.iterations,
            self.job_timeout,
        )
        .await?;

        self.stats
            .apply_mined(self.iterations as i64 * config::ITERATIONS_MULTIPLIER)
            .await;

        if chain::meets_difficulty(&result.value) {
            info!(
                "[{}] share found: {}",
                self.tag(),
                hex::encode(&result.value)
            );
            let share = Share {
                device: self.device.clone(),
                key: params.key,
                random: result.random.to_vec(),
                value: result.value.to_vec(),
                expires: result.expires,
            };
            if self.shares.send(share).await.is_err() {
                warn!("[{}] share reporter is gone", self.tag());
            }
        } else {
            debug!(
                "[{}] result below difficulty: {}",
                self.tag(),
                hex::encode(&result.value)
            );
        }
        Ok(())
    }
}
