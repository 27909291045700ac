/*
 * This file is part of Pifand.
 *
 * Copyright (C) 2025 Pifand contributors
 *
 * Pifand is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Pifand is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Pifand. If not, see <https://www.gnu.org/licenses/>.
 */

//! CPU temperature via the VideoCore firmware tool.
//!
//! `vcgencmd measure_temp` prints a single line of the form `temp=48.3'C`;
//! anything else is an error. Readings are never cached, every call runs
//! the command again.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TempError {
    #[error("could not run {cmd}: {source}")]
    CommandFailed {
        cmd: String,
        #[source]
        source: io::Error,
    },
    #[error("unexpected measure_temp output: {0:?}")]
    Malformed(String),
}

/// One scalar reading per call. A seam so the supervisor loop can be
/// driven by scripted samples in tests.
#[cfg_attr(test, mockall::automock)]
pub trait TemperatureSource {
    fn read(&self) -> Result<f64, TempError>;
}

/// Parses the exact `temp=<float>'C` shape, tolerating surrounding
/// whitespace and the trailing newline the tool emits.
pub fn parse_measure_temp(output: &str) -> Result<f64, TempError> {
    let line = output.trim();
    let celsius = line
        .strip_prefix("temp=")
        .and_then(|rest| rest.strip_suffix("'C"))
        .ok_or_else(|| TempError::Malformed(output.to_string()))?;
    celsius
        .parse::<f64>()
        .map_err(|_| TempError::Malformed(output.to_string()))
}

#[derive(Debug, Clone)]
pub struct Vcgencmd {
    path: PathBuf,
}

impl Vcgencmd {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Preflight check so a missing tool is reported at startup instead of
    /// on the first poll.
    pub fn is_available(&self) -> bool {
        self.path.is_file()
    }
}

impl TemperatureSource for Vcgencmd {
    fn read(&self) -> Result<f64, TempError> {
        let output = Command::new(&self.path)
            .arg("measure_temp")
            .output()
            .map_err(|source| TempError::CommandFailed {
                cmd: format!("{} measure_temp", self.path.display()),
                source,
            })?;
        parse_measure_temp(&String::from_utf8_lossy(&output.stdout))
    }
}
