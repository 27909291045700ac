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

//! Layered runtime configuration: built-in defaults, then the optional
//! JSON config file, then command-line overrides. Later layers win. The
//! result is one immutable `Config` handed to the supervisor; nothing
//! mutates it after startup.
//!
//! A broken or partial config file never stops the controller from
//! starting: each missing key warns and falls back to its default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::control::Thresholds;

pub const DEFAULT_FAN_GPIO: u32 = 25;
pub const DEFAULT_SETPOINT_HIGH: f64 = 65.0;
pub const DEFAULT_SETPOINT_LOW: f64 = 55.0;
pub const DEFAULT_SLEEP_SEC: u64 = 10;
pub const DEFAULT_VCGENCMD_PATH: &str = "/usr/bin/vcgencmd";

/// What the process should do with the fan, from `--fan-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanMode {
    /// Single write high, release the pin, exit.
    ForceOn,
    /// Single write low, release the pin, exit.
    ForceOff,
    /// Run the hysteresis poll loop.
    Auto,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub fan_gpio: u32,
    pub setpoint_high: f64,
    pub setpoint_low: f64,
    pub sleep_sec: u64,
    pub vcgencmd_path: PathBuf,
    pub verbose: bool,
    pub debug: bool,
    pub log_to_file: bool,
    pub force_fan_on: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fan_gpio: DEFAULT_FAN_GPIO,
            setpoint_high: DEFAULT_SETPOINT_HIGH,
            setpoint_low: DEFAULT_SETPOINT_LOW,
            sleep_sec: DEFAULT_SLEEP_SEC,
            vcgencmd_path: PathBuf::from(DEFAULT_VCGENCMD_PATH),
            verbose: true,
            debug: true,
            log_to_file: false,
            force_fan_on: false,
        }
    }
}

/// On-disk shape. Every key is optional so a partial file merges over the
/// defaults instead of failing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub fan_gpio: Option<u32>,
    pub setpoint_high: Option<f64>,
    pub setpoint_low: Option<f64>,
    pub sleep_sec: Option<u64>,
    pub vcgencmd_path: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub debug: Option<bool>,
    pub log_to_file: Option<bool>,
    pub force_fan_on: Option<bool>,
}

pub fn config_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("pifand").join("config.json");
    }
    if let Ok(home) = env::var("HOME") {
        return Path::new(&home)
            .join(".config")
            .join("pifand")
            .join("config.json");
    }
    PathBuf::from("/etc/pifand/config.json")
}

impl Config {
    /// Defaults merged with the config file at the standard path. Warnings
    /// are returned rather than printed so the caller can gate them on the
    /// merged verbosity; `-q` has not been applied yet at load time.
    pub fn load() -> (Self, Vec<String>) {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        let mut cfg = Config::default();
        let mut warnings = Vec::new();
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<ConfigFile>(&data) {
                Ok(file) => warnings.extend(cfg.apply_file(&file)),
                Err(e) => {
                    warnings.push(format!(
                        "ignoring malformed config file {}: {}",
                        path.display(),
                        e
                    ));
                }
            },
            Err(_) => {
                warnings.push(format!(
                    "config file not found at {}, using defaults",
                    path.display()
                ));
            }
        }
        (cfg, warnings)
    }

    /// Merges the file layer, returning one warning per key that fell back
    /// to its default.
    pub fn apply_file(&mut self, file: &ConfigFile) -> Vec<String> {
        let mut warnings = Vec::new();
        macro_rules! merge {
            ($field:ident, $key:literal) => {
                match &file.$field {
                    Some(v) => self.$field = v.clone(),
                    None => warnings.push(format!(
                        "config key '{}' not set, using default {:?}",
                        $key, self.$field
                    )),
                }
            };
        }
        merge!(fan_gpio, "fan_gpio");
        merge!(setpoint_high, "setpoint_high");
        merge!(setpoint_low, "setpoint_low");
        merge!(sleep_sec, "sleep_sec");
        merge!(vcgencmd_path, "vcgencmd_path");
        merge!(verbose, "verbose");
        merge!(debug, "debug");
        merge!(log_to_file, "log_to_file");
        merge!(force_fan_on, "force_fan_on");
        warnings
    }

    pub fn apply_cli(&mut self, args: &CliArgs) {
        if let Some(pin) = args.pin {
            if !args.quiet {
                eprintln!(
                    "pifand: -p parameter found, changing GPIO pin from {} to {}",
                    self.fan_gpio, pin
                );
            }
            self.fan_gpio = pin;
        }
        if args.verbose {
            self.verbose = true;
            self.debug = false;
        }
        if args.debug {
            self.verbose = true;
            self.debug = true;
        }
        // -q overrides -v and -d
        if args.quiet {
            self.verbose = false;
            self.debug = false;
        }
        if args.logging {
            self.log_to_file = true;
        }
    }

    /// Whole-config invariants, checked once after the merge. Unlike a
    /// missing key, a violated invariant is fatal.
    pub fn validate(&self) -> Result<(), String> {
        Thresholds::new(self.setpoint_high, self.setpoint_low)?;
        if self.sleep_sec == 0 {
            return Err("sleep_sec must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Result<Thresholds, String> {
        Thresholds::new(self.setpoint_high, self.setpoint_low)
    }
}

/// Parsed command line. Mirrors the flags of the original scripts plus the
/// read-only status and one-shot temperature modes.
#[derive(Debug, Default, PartialEq)]
pub struct CliArgs {
    pub fan_mode: Option<FanMode>,
    pub pin: Option<u32>,
    pub status: bool,
    pub check_temp: bool,
    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub logging: bool,
    pub help: bool,
    pub version: bool,
}

pub fn usage() -> String {
    "Usage: pifand [OPTIONS]\n\
     Control a Raspberry Pi cooling fan via GPIO hysteresis setpoints.\n\n\
     Options:\n\
       -f, --fan-mode <on|off|auto>  force fan on/off once, or run the control loop (default auto)\n\
       -p, --pin <n>                 BCM GPIO control pin (default 25)\n\
       -s, --status                  report pin ownership and fan state, then exit\n\
       -t, --check-temp              print the current CPU temperature, then exit\n\
       -v, --verbose                 log fan transitions\n\
       -d, --debug                   log every temperature reading\n\
       -q, --quiet                   suppress all logging (overrides -v/-d)\n\
           --logging                 append JSON events to the log file\n\
       -h, --help                    show this help\n\
           --version                 show version"
        .to_string()
}

pub fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut out = CliArgs::default();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-f" | "--fan-mode" => {
                let mode = it
                    .next()
                    .ok_or_else(|| format!("{} requires a value (on|off|auto)", arg))?;
                out.fan_mode = Some(match mode.as_str() {
                    "on" => FanMode::ForceOn,
                    "off" => FanMode::ForceOff,
                    "auto" => FanMode::Auto,
                    other => {
                        return Err(format!(
                            "invalid fan mode {:?} (expected on|off|auto)",
                            other
                        ))
                    }
                });
            }
            "-p" | "--pin" => {
                let pin = it
                    .next()
                    .ok_or_else(|| format!("{} requires a pin number", arg))?;
                out.pin = Some(
                    pin.parse::<u32>()
                        .map_err(|_| format!("invalid pin number {:?}", pin))?,
                );
            }
            "-s" | "--status" => out.status = true,
            "-t" | "--check-temp" => out.check_temp = true,
            "-v" | "--verbose" => out.verbose = true,
            "-d" | "--debug" => out.debug = true,
            "-q" | "--quiet" => out.quiet = true,
            "--logging" => out.logging = true,
            "-h" | "--help" => out.help = true,
            "--version" => out.version = true,
            other => return Err(format!("unknown option {:?}", other)),
        }
    }
    Ok(out)
}
