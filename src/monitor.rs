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

//! Per-chip temperature sampling.

use crate::config;
use crate::error::{self, Frame as FrameError};
use crate::stats::TemperatureRegistry;
use crate::uart::{Bus, TYPE_CHAIN};

use tracing::{debug, warn};

use std::convert::TryInto;
use std::sync::Arc;

/// Register write triggering a temperature conversion readout
pub const TEMP_REQUEST: [u8; 5] = [0x7C, 0x0E, 0x00, 0x00, 0x00];

/// Convert the raw sensor word to degrees Celsius
pub fn temperature_from_raw(raw: u16) -> f32 {
    raw as f32 * 502.9098 / 65536.0 - 273.819
}

/// Sample the on-die sensor of one chip
pub async fn read_temperature<T: Bus + ?Sized>(bus: &T, chip_id: u8) -> error::Result<f32> {
    let response = bus.request(chip_id, TYPE_CHAIN, &TEMP_REQUEST).await?;
    if response.data.len() < 3 {
        Err(FrameError::Invalid)?
    }
    let raw = u16::from_be_bytes(response.data[1..3].try_into().expect("BUG: raw temp size"));
    Ok(temperature_from_raw(raw))
}

/// Spawn the sampling task for one chip. Readings land in the shared
/// registry the stats reporter snapshots from; failures only get logged.
pub fn start_monitor(
    bus: Arc<dyn Bus>,
    chip_id: u8,
    tag: String,
    registry: Arc<TemperatureRegistry>,
) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(config::TEMP_SAMPLE_PERIOD).await;
            match read_temperature(bus.as_ref(), chip_id).await {
                Ok(celsius) => {
                    debug!("[{}] temperature {:.1} C", tag, celsius);
                    registry.record(tag.clone(), celsius).await;
                }
                Err(e) => warn!("[{}] temperature read failed: {}", tag, e),
            }
        }
    });
}
