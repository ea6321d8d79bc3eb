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

//! Release package updater.
//!
//! Polls the release descriptor, downloads and extracts new packages into a
//! staging directory and atomically renames them over the work directory
//! while the agent is stopped through the local process manager. The work
//! directory is the only persistent state this software keeps.

use crate::config;
use crate::error::{self, ErrorKind};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, warn};

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Published release pointer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    pub version: String,
    pub url: String,
}

pub struct Updater {
    client: reqwest::Client,
    base: PathBuf,
}

impl Updater {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("BUG: HTTP client construction failed");
        Self {
            client,
            base: base.into(),
        }
    }

    fn work_dir(&self) -> PathBuf {
        self.base.join("work")
    }

    fn tmp_dir(&self) -> PathBuf {
        self.base.join("tmp")
    }

    fn staged_dir(&self) -> PathBuf {
        self.tmp_dir().join("extracted")
    }

    /// Version of the package currently in the work directory, if any
    pub fn current_version(&self) -> Option<String> {
        let raw = std::fs::read_to_string(self.work_dir().join("config.json")).ok()?;
        let descriptor: ReleaseDescriptor = serde_json::from_str(&raw).ok()?;
        Some(descriptor.version)
    }

    pub async fn fetch_descriptor(&self) -> error::Result<ReleaseDescriptor> {
        let descriptor = self
            .client
            .get(config::LATEST_PACKAGE_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(descriptor)
    }

    pub async fn fetch_descriptor_retry(&self) -> ReleaseDescriptor {
        loop {
            match self.fetch_descriptor().await {
                Ok(descriptor) => return descriptor,
                Err(e) => {
                    warn!("release descriptor fetch failed: {}", e);
                    tokio::time::sleep(config::RETRY_DELAY).await;
                }
            }
        }
    }

    /// Download and extract a package into the staging directory and stamp
    /// it with its descriptor.
    pub async fn download_package(&self, descriptor: &ReleaseDescriptor) -> error::Result<()> {
        let tmp = self.tmp_dir();
        if tmp.exists() {
            tokio::fs::remove_dir_all(&tmp).await?;
        }
        tokio::fs::create_dir_all(&tmp).await?;

        info!("downloading {}", descriptor.url);
        let body = self
            .client
            .get(&descriptor.url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        let archive = tmp.join("output.zip");
        tokio::fs::write(&archive, &body).await?;

        unzip(&archive, &self.staged_dir()).await?;

        let stamp = serde_json::to_vec(descriptor)?;
        tokio::fs::write(self.staged_dir().join("config.json"), stamp).await?;
        Ok(())
    }

    /// Atomically replace the work directory with the staged package
    pub async fn apply_package(&self) -> error::Result<()> {
        let work = self.work_dir();
        if work.exists() {
            tokio::fs::remove_dir_all(&work).await?;
        }
        tokio::fs::rename(self.staged_dir(), &work).await?;
        Ok(())
    }

    pub async fn stop_agent(&self) -> error::Result<()> {
        info!("stopping agent");
        self.program_command("stop").await?;
        tokio::time::sleep(config::RETRY_DELAY).await;
        Ok(())
    }

    pub async fn start_agent(&self) -> error::Result<()> {
        info!("starting agent");
        self.program_command("start").await?;
        tokio::time::sleep(config::RETRY_DELAY).await;
        Ok(())
    }

    async fn program_command(&self, action: &str) -> error::Result<()> {
        self.client
            .post(&format!(
                "{}/program/{}/agent",
                config::PROCESS_MANAGER_URL,
                action
            ))
            .body(Vec::new())
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Update loop: install a newer package whenever the descriptor changes,
    /// cycling the agent around the switch. Errors of a single cycle abort
    /// the process, the system supervisor restarts us clean.
    pub async fn run(&self) -> error::Result<()> {
        let current = self.current_version();
        match &current {
            Some(version) => info!("installed package version {}", version),
            None => info!("no installed package"),
        }

        let mut active = self.fetch_descriptor_retry().await;
        info!("latest package version {}", active.version);
        if current.as_ref() != Some(&active.version) {
            self.download_package(&active).await?;
            self.stop_agent().await?;
            self.apply_package().await?;
        }
        self.start_agent().await?;

        loop {
            tokio::time::sleep(config::RETRY_DELAY).await;
            let next = self.fetch_descriptor_retry().await;
            if next.version == active.version {
                continue;
            }
            info!("found new version {}", next.version);
            self.download_package(&next).await?;
            self.stop_agent().await?;
            self.apply_package().await?;
            self.start_agent().await?;
            active = next;
        }
    }
}

/// Extract a ZIP archive with the system unzip utility
async fn unzip(archive: &Path, dest: &Path) -> error::Result<()> {
    let status = Command::new("unzip")
        .arg("-o")
        .arg(archive)
        .arg("-d")
        .arg(dest)
        .status()
        .await?;
    if !status.success() {
        Err(ErrorKind::General(format!(
            "unzip of {} exited with {}",
            archive.display(),
            status
        )))?
    }
    Ok(())
}
