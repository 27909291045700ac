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

mod config;
mod control;
mod gpio;
mod logger;
mod service;
mod temp;

#[cfg(test)]
mod test_utils;

use anyhow::{Context, Result};
use serde_json::json;

use config::{parse_args, usage, Config, FanMode};
use control::FanState;
use gpio::{Gpio, GpioError, PinFunction};
use temp::{TemperatureSource, Vcgencmd};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("pifand: {}", e);
            eprintln!("{}", usage());
            std::process::exit(1);
        }
    };

    if cli.help {
        println!("{}", usage());
        return;
    }
    if cli.version {
        println!("pifand {}", VERSION);
        return;
    }

    // Claiming and driving the pin needs root; the read-only modes do not.
    let wants_control = !cli.status && !cli.check_temp;
    if wants_control && unsafe { libc::geteuid() } != 0 {
        eprintln!("Error: pifand requires root privileges to drive the fan control pin.");
        eprintln!("Please run with: sudo pifand");
        std::process::exit(1);
    }

    let (mut cfg, config_warnings) = Config::load();
    cfg.apply_cli(&cli);

    // No console chatter when running in the background, same as the
    // original scripts' foreground check.
    if unsafe { libc::isatty(libc::STDOUT_FILENO) } == 0 {
        cfg.verbose = false;
        cfg.debug = false;
    }

    // Load-time warnings surface only once the merged verbosity is known,
    // so -q silences them too.
    if cfg.verbose {
        for warning in &config_warnings {
            eprintln!("pifand: {}", warning);
        }
    }

    if let Err(e) = cfg.validate() {
        eprintln!("pifand: invalid configuration: {}", e);
        std::process::exit(1);
    }

    if cfg.log_to_file {
        logger::init_logging();
        logger::log_event("startup", json!({ "args": &args }));
    }

    let result = if cli.status {
        pin_status(&cfg)
    } else if cli.check_temp {
        check_temp(&cfg)
    } else {
        match cli.fan_mode {
            Some(FanMode::ForceOn) => service::run_forced(&cfg, FanState::On),
            Some(FanMode::ForceOff) => service::run_forced(&cfg, FanState::Off),
            Some(FanMode::Auto) | None => {
                if cfg.force_fan_on {
                    eprintln!(
                        "pifand: warning: force_fan_on is set, fan stays ON with no temperature control"
                    );
                    service::run_forced(&cfg, FanState::On)
                } else {
                    service::run_service(&cfg)
                }
            }
        }
    };

    match result {
        Ok(()) => {
            if cfg.verbose {
                println!("Bye ...");
            }
        }
        Err(e) => {
            if let Some(GpioError::PinBusy(pin)) = e.downcast_ref::<GpioError>() {
                // Advisory lock held elsewhere: refusing to start is not a
                // fault, so exit clean without touching the pin.
                eprintln!(
                    "pifand: GPIO pin {} is already driven by another fan controller, nothing to do",
                    pin
                );
                logger::log_event("pin_busy", json!({ "pin": pin }));
                logger::flush();
                return;
            }
            eprintln!("pifand: error: {:#}", e);
            logger::log_event("fatal_error", json!({ "error": e.to_string() }));
            logger::flush();
            std::process::exit(1);
        }
    }
}

/// `--status`: report who owns the pin without acquiring it.
fn pin_status(cfg: &Config) -> Result<()> {
    let gpio = Gpio::new();
    let pin = cfg.fan_gpio;
    match gpio.pin_function(pin)? {
        PinFunction::Output => {
            let level = gpio.read_level(pin)?;
            println!(
                "GPIO {} is claimed as an output (fan controller running), fan is {}",
                pin,
                if level { "ON" } else { "OFF" }
            );
        }
        function => {
            println!("GPIO {} is {}; no fan controller owns it", pin, function);
        }
    }
    Ok(())
}

/// `--check-temp`: one reading, printed in the vcgencmd style.
fn check_temp(cfg: &Config) -> Result<()> {
    let source = Vcgencmd::new(&cfg.vcgencmd_path);
    let temp_c = source.read().with_context(|| {
        format!(
            "could not read temperature with {} measure_temp",
            cfg.vcgencmd_path.display()
        )
    })?;
    println!("CPU at {}'C", temp_c);
    Ok(())
}
