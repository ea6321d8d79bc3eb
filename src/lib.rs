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

//! Host-side mining agent for UART-attached SHA-256 accelerator boards.
//!
//! A device carries several boards, each board several chips behind one
//! serial line. The host precomputes SHA-256 midstates over the fixed part
//! of a candidate block, dispatches search jobs over a byte-stuffed and
//! CRC-protected frame protocol, re-verifies every answer locally and
//! reports qualifying shares to the pool.

pub mod chain;
pub mod config;
pub mod error;
pub mod leds;
pub mod misc;
pub mod monitor;
pub mod pll;
pub mod pool;
pub mod sha256;
pub mod stats;
pub mod supervisor;
pub mod uart;
pub mod updater;
pub mod work;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
