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

//! Chip PLL register file access and frequency presets.
//!
//! Every chip exposes its clock generator registers through `TYPE_CONTROL`
//! requests. A frequency change is an ordered sequence of masked register
//! writes which must be bracketed by powering the PLL down and restoring the
//! original power register, otherwise the chip locks up.

use crate::error::{self, Frame as FrameError};
use crate::uart::{Bus, TYPE_CONTROL};

use once_cell::sync::Lazy;
use tracing::debug;

use std::collections::HashMap;
use std::convert::TryInto;

/// Register file opcodes
pub const PLL_WRITE: u8 = 0x0A;
pub const PLL_READ: u8 = 0x0B;
pub const PLL_LOCK: u8 = 0x0C;

/// A register together with the mask of bits a preset must preserve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PllRegister {
    pub addr: u8,
    pub mask: u16,
}

/// One step of a frequency preset: write `value` into the unmasked bits
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterUpdate {
    pub reg: PllRegister,
    pub value: u16,
}

/// Register description of one chip family
pub struct PllFamily {
    /// Power register, written to 0xFFFF while a preset is being applied
    pub power_addr: u8,
    /// Frequency (MHz) to preset mapping
    pub presets: HashMap<u32, [RegisterUpdate; PRESET_LENGTH]>,
}

/// Masked update rule: masked bits keep the old register content, the rest
/// take the new value.
pub fn masked_value(old: u16, mask: u16, value: u16) -> u16 {
    (old & mask) | (value & !mask)
}

/// Read one PLL register
pub async fn read_register<T: Bus + ?Sized>(bus: &T, chip_id: u8, addr: u8) -> error::Result<u16> {
    let response = bus.request(chip_id, TYPE_CONTROL, &[PLL_READ, addr]).await?;
    if response.data.len() < 2 {
        Err(FrameError::Invalid)?
    }
    Ok(u16::from_be_bytes(
        response.data[..2].try_into().expect("BUG: register size"),
    ))
}

/// Write one PLL register
pub async fn write_register<T: Bus + ?Sized>(
    bus: &T,
    chip_id: u8,
    addr: u8,
    value: u16,
) -> error::Result<()> {
    let mut request = [PLL_WRITE, addr, 0, 0];
    request[2..].copy_from_slice(&value.to_be_bytes());
    bus.request(chip_id, TYPE_CONTROL, &request).await?;
    Ok(())
}

/// Query the PLL lock status byte
pub async fn lock_status<T: Bus + ?Sized>(bus: &T, chip_id: u8) -> error::Result<u8> {
    let response = bus.request(chip_id, TYPE_CONTROL, &[PLL_LOCK]).await?;
    if response.data.is_empty() {
        Err(FrameError::Invalid)?
    }
    Ok(response.data[0])
}

/// Read-modify-write one register according to its preset mask
pub async fn update_register<T: Bus + ?Sized>(
    bus: &T,
    chip_id: u8,
    update: RegisterUpdate,
) -> error::Result<()> {
    let old = read_register(bus, chip_id, update.reg.addr).await?;
    let new = masked_value(old, update.reg.mask, update.value);
    write_register(bus, chip_id, update.reg.addr, new).await
}

/// Apply a preset with the mandatory power-down/restore bracket
pub async fn apply_preset<T: Bus + ?Sized>(
    bus: &T,
    chip_id: u8,
    updates: &[RegisterUpdate],
    family: &PllFamily,
) -> error::Result<()> {
    let power = read_register(bus, chip_id, family.power_addr).await?;
    write_register(bus, chip_id, family.power_addr, 0xFFFF).await?;
    for update in updates {
        update_register(bus, chip_id, *update).await?;
    }
    write_register(bus, chip_id, family.power_addr, power).await
}

/// Program a chip to `frequency` MHz using the 7-series preset table. An
/// unlisted frequency is ignored.
pub async fn set_frequency<T: Bus + ?Sized>(
    bus: &T,
    chip_id: u8,
    frequency: u32,
) -> error::Result<()> {
    let preset = match SEVEN_SERIES.presets.get(&frequency) {
        Some(preset) => preset,
        None => return Ok(()),
    };
    debug!("chip {}: applying {} MHz PLL preset", chip_id, frequency);
    apply_preset(bus, chip_id, preset, &SEVEN_SERIES).await
}

const DIV_CLK: PllRegister = PllRegister {
    addr: 0x16,
    mask: 0xC000,
};
const CLK_REG1: PllRegister = PllRegister {
    addr: 0x0A,
    mask: 0x1000,
};
const CLK_REG2: PllRegister = PllRegister {
    addr: 0x0B,
    mask: 0xFC00,
};
const CLK_FB_OUT1: PllRegister = PllRegister {
    addr: 0x14,
    mask: 0x1000,
};
const CLK_FB_OUT2: PllRegister = PllRegister {
    addr: 0x15,
    mask: 0x8000,
};
const FILT_REG1: PllRegister = PllRegister {
    addr: 0x4E,
    mask: 0x66FF,
};
const FILT_REG2: PllRegister = PllRegister {
    addr: 0x4F,
    mask: 0x666F,
};
const LOCK1: PllRegister = PllRegister {
    addr: 0x18,
    mask: 0xFC00,
};
const LOCK2: PllRegister = PllRegister {
    addr: 0x19,
    mask: 0x8000,
};
const LOCK3: PllRegister = PllRegister {
    addr: 0x1A,
    mask: 0x8000,
};

/// Register order shared by every preset row
pub const PRESET_REGISTERS: [PllRegister; 10] = [
    DIV_CLK, CLK_REG1, CLK_REG2, CLK_FB_OUT1, CLK_FB_OUT2, FILT_REG1, FILT_REG2, LOCK1, LOCK2,
    LOCK3,
];

pub const PRESET_LENGTH: usize = PRESET_REGISTERS.len();

fn preset(values: [u16; PRESET_LENGTH]) -> [RegisterUpdate; PRESET_LENGTH] {
    let mut updates = [RegisterUpdate {
        reg: DIV_CLK,
        value: 0,
    }; PRESET_LENGTH];
    for (update, (reg, value)) in updates
        .iter_mut()
        .zip(PRESET_REGISTERS.iter().zip(values.iter()))
    {
        *update = RegisterUpdate {
            reg: *reg,
            value: *value,
        };
    }
    updates
}

/// The supported chip family. Presets were captured from the vendor clocking
/// wizard for 10 MHz steps; register order matters.
pub static SEVEN_SERIES: Lazy<PllFamily> = Lazy::new(|| {
    let mut presets = HashMap::new();
    let rows: [(u32, [u16; PRESET_LENGTH]); 76] = [
        (50, [0x2083, 0x0186, 0x0000, 0x03cf, 0x0000, 0x0800, 0x8800, 0x0145, 0x7c01, 0x7fe9]),
        (60, [0x2083, 0x0186, 0x0000, 0x0492, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (70, [0x2083, 0x0186, 0x0000, 0x0555, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (80, [0x2083, 0x0186, 0x0000, 0x0618, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (90, [0x2083, 0x0186, 0x0000, 0x06db, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (100, [0x2083, 0x0186, 0x0000, 0x079e, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (110, [0x2083, 0x0145, 0x0000, 0x06dc, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (120, [0x2083, 0x0145, 0x0000, 0x079e, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (130, [0x2083, 0x0104, 0x0000, 0x069a, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (140, [0x2083, 0x0104, 0x0000, 0x071c, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (150, [0x2083, 0x0104, 0x0000, 0x079e, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (160, [0x2083, 0x0082, 0x0000, 0x0410, 0x0000, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (170, [0x2083, 0x0082, 0x0000, 0x0451, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (180, [0x2083, 0x0082, 0x0000, 0x0492, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (190, [0x2083, 0x0082, 0x0000, 0x04d3, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (200, [0x2083, 0x0082, 0x0000, 0x0514, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (210, [0x2083, 0x0082, 0x0000, 0x0555, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (220, [0x2083, 0x0082, 0x0000, 0x0596, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (230, [0x2083, 0x0082, 0x0000, 0x05d7, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (240, [0x2083, 0x0082, 0x0000, 0x0618, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (250, [0x2083, 0x0082, 0x0000, 0x0659, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (260, [0x2083, 0x0082, 0x0000, 0x069a, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (270, [0x2083, 0x0082, 0x0000, 0x06db, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (280, [0x2083, 0x0082, 0x0000, 0x071c, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (290, [0x2083, 0x0082, 0x0000, 0x075d, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (300, [0x2083, 0x0082, 0x0000, 0x079e, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (310, [0x2083, 0x0041, 0x0000, 0x03d0, 0x0080, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (320, [0x2083, 0x0041, 0x0000, 0x0410, 0x0000, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (330, [0x2083, 0x0041, 0x0000, 0x0411, 0x0080, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (340, [0x2083, 0x0041, 0x0000, 0x0451, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (350, [0x2083, 0x0041, 0x0000, 0x0452, 0x0080, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (360, [0x2083, 0x0041, 0x0000, 0x0492, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (370, [0x2083, 0x0041, 0x0000, 0x0493, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (380, [0x2083, 0x0041, 0x0000, 0x04d3, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (390, [0x2083, 0x0041, 0x0000, 0x04d4, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (400, [0x2083, 0x0041, 0x0000, 0x0514, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (410, [0x2083, 0x0041, 0x0000, 0x0515, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (420, [0x2083, 0x0041, 0x0000, 0x0555, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (430, [0x2083, 0x0041, 0x0000, 0x0556, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (440, [0x2083, 0x0041, 0x0000, 0x0596, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (450, [0x2083, 0x0041, 0x0000, 0x0597, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (460, [0x2083, 0x0041, 0x0000, 0x05d7, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (470, [0x2083, 0x0041, 0x0000, 0x05d8, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (480, [0x2083, 0x0041, 0x0000, 0x0618, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (490, [0x2083, 0x0041, 0x0000, 0x0619, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (500, [0x2083, 0x0041, 0x0000, 0x0659, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (510, [0x2083, 0x0041, 0x0000, 0x065a, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (520, [0x2083, 0x0041, 0x0000, 0x069a, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (530, [0x2083, 0x0041, 0x0000, 0x069b, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (540, [0x2083, 0x0041, 0x0000, 0x06db, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (550, [0x2083, 0x0041, 0x0000, 0x06dc, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (560, [0x2083, 0x0041, 0x0000, 0x071c, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (570, [0x2083, 0x0041, 0x0000, 0x071d, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (580, [0x2083, 0x0041, 0x0000, 0x075d, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (590, [0x2083, 0x0041, 0x0000, 0x075e, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (600, [0x2083, 0x0041, 0x0000, 0x079e, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (610, [0x0145, 0x0041, 0x0040, 0x079f, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (620, [0x0145, 0x0041, 0x0040, 0x07df, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (630, [0x0145, 0x0041, 0x0040, 0x07e0, 0x0080, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (640, [0x0145, 0x0041, 0x0040, 0x0820, 0x0000, 0x0800, 0x0800, 0x00fa, 0x7c01, 0x7fe9]),
        (650, [0x2083, 0x0041, 0x0040, 0x03cf, 0x4c00, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (660, [0x2083, 0x0041, 0x0040, 0x0411, 0x0080, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (670, [0x2083, 0x0041, 0x0040, 0x0410, 0x4800, 0x0800, 0x9000, 0x012c, 0x7c01, 0x7fe9]),
        (680, [0x2083, 0x0041, 0x0040, 0x0451, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (690, [0x2083, 0x0041, 0x0040, 0x0410, 0x4c00, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (700, [0x2083, 0x0041, 0x0040, 0x0452, 0x0080, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (710, [0x2083, 0x0041, 0x0040, 0x0451, 0x4800, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (720, [0x2083, 0x0041, 0x0040, 0x0492, 0x0000, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (730, [0x2083, 0x0041, 0x0040, 0x0451, 0x4c00, 0x0800, 0x9000, 0x0113, 0x7c01, 0x7fe9]),
        (740, [0x2083, 0x0041, 0x0040, 0x0493, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (750, [0x2083, 0x0041, 0x0040, 0x0492, 0x4800, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (760, [0x2083, 0x0041, 0x0040, 0x04d3, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (770, [0x2083, 0x0041, 0x0040, 0x0492, 0x4c00, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (780, [0x2083, 0x0041, 0x0040, 0x04d4, 0x0080, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (790, [0x2083, 0x0041, 0x0040, 0x04d3, 0x4800, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
        (800, [0x2083, 0x0041, 0x0040, 0x0514, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9]),
    ];
    for (frequency, values) in rows.iter() {
        presets.insert(*frequency, preset(*values));
    }
    PllFamily {
        power_addr: 0x28,
        presets,
    }
});

#[cfg(test)]
mod test {
    use super::*;
    use crate::uart::Frame;

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    #[test]
    fn test_masked_value() {
        // masked bits come from the old value, the rest from the new one
        assert_eq!(masked_value(0xFFFF, 0xF000, 0x0ABC), 0xFABC);
        assert_eq!(masked_value(0x0000, 0xF000, 0xFFFF), 0x0FFF);
        assert_eq!(masked_value(0x1234, 0x0000, 0x5678), 0x5678);
        assert_eq!(masked_value(0x1234, 0xFFFF, 0x5678), 0x1234);
        for (old, mask, value) in &[
            (0x8001u16, 0xC000u16, 0x2083u16),
            (0x55AA, 0x66FF, 0x0800),
            (0x0000, 0x8000, 0x4C00),
        ] {
            let result = masked_value(*old, *mask, *value);
            assert_eq!(result & mask, old & mask);
            assert_eq!(result & !mask, value & !mask);
        }
    }

    #[test]
    fn test_preset_table_shape() {
        // 10 MHz steps over the whole supported range
        assert_eq!(SEVEN_SERIES.presets.len(), 76);
        for frequency in (50..=800).step_by(10) {
            let preset = SEVEN_SERIES
                .presets
                .get(&frequency)
                .unwrap_or_else(|| panic!("missing {} MHz preset", frequency));
            for (update, reg) in preset.iter().zip(PRESET_REGISTERS.iter()) {
                assert_eq!(update.reg, *reg);
            }
        }
        assert!(SEVEN_SERIES.presets.get(&55).is_none());
        assert_eq!(SEVEN_SERIES.power_addr, 0x28);
    }

    /// Register-level fake: responds to reads from a register map and records
    /// every write in order.
    struct FakeRegisters {
        query_id: AtomicU32,
        registers: StdMutex<[u16; 256]>,
        log: StdMutex<Vec<(u8, u16)>>,
    }

    impl FakeRegisters {
        fn new() -> Self {
            Self {
                query_id: AtomicU32::new(0),
                registers: StdMutex::new([0u16; 256]),
                log: StdMutex::new(Vec::new()),
            }
        }

        fn set(&self, addr: u8, value: u16) {
            self.registers.lock().unwrap()[addr as usize] = value;
        }

        fn writes(&self) -> Vec<(u8, u16)> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Bus for FakeRegisters {
        fn next_query_id(&self) -> u32 {
            self.query_id.fetch_add(1, Ordering::SeqCst)
        }

        async fn write(&self, _chip_id: u8, _req_type: u8, _data: &[u8]) -> error::Result<()> {
            Ok(())
        }

        async fn request(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<Frame> {
            assert_eq!(req_type, TYPE_CONTROL);
            match data[0] {
                PLL_READ => {
                    let value = self.registers.lock().unwrap()[data[1] as usize];
                    Ok(Frame {
                        chip_id,
                        data: value.to_be_bytes().to_vec(),
                    })
                }
                PLL_WRITE => {
                    let value = u16::from_be_bytes([data[2], data[3]]);
                    self.registers.lock().unwrap()[data[1] as usize] = value;
                    self.log.lock().unwrap().push((data[1], value));
                    Ok(Frame {
                        chip_id,
                        data: vec![],
                    })
                }
                PLL_LOCK => Ok(Frame {
                    chip_id,
                    data: vec![0x01],
                }),
                other => panic!("unexpected PLL opcode {:#04x}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_register_round_trip() {
        let chip = FakeRegisters::new();
        write_register(&chip, 1, 0x16, 0x2083).await.expect("write");
        assert_eq!(read_register(&chip, 1, 0x16).await.expect("read"), 0x2083);
        assert_eq!(lock_status(&chip, 1).await.expect("lock"), 0x01);
    }

    /// Programming 200 MHz must produce exactly: power down, ten masked
    /// updates in table order, power restore.
    #[tokio::test]
    async fn test_apply_200_mhz_sequence() {
        let chip = FakeRegisters::new();
        chip.set(0x28, 0x1234);

        set_frequency(&chip, 1, 200).await.expect("set frequency");

        let values_200: [u16; PRESET_LENGTH] = [
            0x2083, 0x0082, 0x0000, 0x0514, 0x0000, 0x0800, 0x9000, 0x00fa, 0x7c01, 0x7fe9,
        ];
        let mut expected = vec![(0x28u8, 0xFFFFu16)];
        for (reg, value) in PRESET_REGISTERS.iter().zip(values_200.iter()) {
            // registers start at zero, so the masked bits stay zero
            expected.push((reg.addr, value & !reg.mask));
        }
        expected.push((0x28, 0x1234));

        assert_eq!(chip.writes(), expected);
    }

    #[tokio::test]
    async fn test_unlisted_frequency_is_ignored() {
        let chip = FakeRegisters::new();
        set_frequency(&chip, 1, 123).await.expect("set frequency");
        assert!(chip.writes().is_empty());
    }
}
