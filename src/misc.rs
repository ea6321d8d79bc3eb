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

//! Device identity helpers.

use std::fs;
use std::net::UdpSocket;

/// MAC address of the first real network interface, used as the stable
/// device id towards the stats endpoint.
pub fn device_id() -> String {
    let entries = match fs::read_dir("/sys/class/net") {
        Ok(entries) => entries,
        Err(_) => return "unknown".to_string(),
    };
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name == "lo" {
            continue;
        }
        if let Ok(address) = fs::read_to_string(entry.path().join("address")) {
            let address = address.trim();
            if !address.is_empty() && address != "00:00:00:00:00:00" {
                return address.to_string();
            }
        }
    }
    "unknown".to_string()
}

/// Primary IPv4 address of the device. No packet is actually sent, the
/// connect only selects the outgoing interface.
pub fn local_ip() -> Option<String> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

/// Device name of the form `{dc}-{ip with dashes}`
pub fn device_name(dc: &str) -> String {
    match local_ip() {
        Some(ip) => format!("{}-{}", dc, ip.replace('.', "-")),
        None => format!("{}-unknown", dc),
    }
}
