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

//! Front panel status LEDs.
//!
//! Each color is a tiny state machine (`Off`, `Solid`, `Blinking`) driven by
//! a 1 Hz ticker. LED writes must never take the miner down, a missing or
//! unexported GPIO is logged and skipped.

use tracing::debug;

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// GPIO numbers of the front panel LEDs
pub const LED_GREEN_GPIO: u64 = 23;
pub const LED_RED_GPIO: u64 = 45;

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Off,
    Solid,
    Blinking,
}

impl Mode {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Mode::Solid,
            2 => Mode::Blinking,
            _ => Mode::Off,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Mode::Off => 0,
            Mode::Solid => 1,
            Mode::Blinking => 2,
        }
    }
}

/// Sink for LED level writes; the hardware implementation goes through sysfs
pub trait PinWriter: Send + Sync {
    fn set(&self, on: bool);
}

/// sysfs-backed GPIO pin, write failures are logged and skipped
pub struct SysfsPin {
    pin: sysfs_gpio::Pin,
}

impl SysfsPin {
    pub fn new(gpio: u64) -> Self {
        let pin = sysfs_gpio::Pin::new(gpio);
        // the pin is normally exported by the system image already
        if let Err(e) = pin.export() {
            debug!("GPIO {} export failed: {}", gpio, e);
        }
        let _ = pin.set_direction(sysfs_gpio::Direction::Out);
        Self { pin }
    }
}

impl PinWriter for SysfsPin {
    fn set(&self, on: bool) {
        if let Err(e) = self.pin.set_value(if on { 1 } else { 0 }) {
            debug!("GPIO {} write failed, skipping: {}", self.pin.get_pin_num(), e);
        }
    }
}

/// One LED color
pub struct Led {
    mode: AtomicU8,
    lit: AtomicBool,
    pin: Arc<dyn PinWriter>,
}

impl Led {
    pub fn new(pin: Arc<dyn PinWriter>) -> Self {
        Self {
            mode: AtomicU8::new(Mode::Off.as_u8()),
            lit: AtomicBool::new(false),
            pin,
        }
    }

    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Relaxed))
    }

    /// Change the mode; `Solid` and `Off` are written out immediately,
    /// `Blinking` is left to the ticker.
    pub fn set_mode(&self, mode: Mode) {
        let previous = Mode::from_u8(self.mode.swap(mode.as_u8(), Ordering::Relaxed));
        if previous == mode {
            return;
        }
        match mode {
            Mode::Off => self.write(false),
            Mode::Solid => self.write(true),
            Mode::Blinking => (),
        }
    }

    /// One 1 Hz step of the state machine
    pub fn tick(&self) {
        match self.mode() {
            Mode::Blinking => {
                let was_lit = self.lit.load(Ordering::Relaxed);
                self.write(!was_lit);
            }
            // level was written on the transition, keep it refreshed anyway
            Mode::Solid => self.write(true),
            Mode::Off => self.write(false),
        }
    }

    fn write(&self, on: bool) {
        self.lit.store(on, Ordering::Relaxed);
        self.pin.set(on);
    }
}

/// Both front panel LEDs
pub struct LedPair {
    pub green: Led,
    pub red: Led,
}

impl LedPair {
    /// LEDs backed by the device GPIOs
    pub fn on_gpio() -> Arc<Self> {
        Arc::new(Self {
            green: Led::new(Arc::new(SysfsPin::new(LED_GREEN_GPIO))),
            red: Led::new(Arc::new(SysfsPin::new(LED_RED_GPIO))),
        })
    }
}

/// Spawn the 1 Hz ticker driving both LEDs
pub fn start_ticker(leds: Arc<LedPair>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(TICK_PERIOD).await;
            leds.green.tick();
            leds.red.tick();
        }
    });
}
