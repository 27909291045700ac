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

//! Lifecycle supervisor: runs the poll/decide/actuate loop and guarantees
//! the pin is released on every way out.
//!
//! STARTING: preflight vcgencmd, acquire the pin (busy check first), force
//! the fan off. RUNNING: read, step, sleep. STOPPING: triggered by
//! SIGINT/SIGTERM or an unreadable sensor; release the pin, flush the log.
//! The sleep is sliced so a termination request never waits out the
//! remaining interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use serde_json::json;

use crate::config::Config;
use crate::control::{FanState, HysteresisController};
use crate::gpio::{FanPin, Gpio};
use crate::logger;
use crate::temp::{TemperatureSource, Vcgencmd};

/// Set by the signal handler, polled by the loop. Process-global because
/// signal handlers cannot carry state.
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Granularity of the shutdown check inside a sleeping poll interval.
const SHUTDOWN_POLL_MS: u64 = 100;

/// SIGINT and SIGTERM both request a graceful stop.
pub fn register_signal_handlers() -> Result<()> {
    ctrlc::set_handler(|| SHUTDOWN.store(true, Ordering::SeqCst))
        .context("failed to register SIGINT/SIGTERM handler")
}

/// Sleeps for `duration` in short slices, returning early (false) when the
/// shutdown flag is raised.
pub fn sleep_interruptible(duration: Duration, shutdown: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(Duration::from_millis(SHUTDOWN_POLL_MS)));
    }
}

/// The RUNNING phase. Exits Ok when shutdown is requested; exits Err on
/// the first failed temperature read, leaving the fan in its last state
/// (the last known-good state beats guessing).
pub fn control_loop(
    ctl: &mut HysteresisController,
    pin: &mut dyn FanPin,
    source: &dyn TemperatureSource,
    interval: Duration,
    cfg: &Config,
    shutdown: &AtomicBool,
) -> Result<()> {
    while !shutdown.load(Ordering::SeqCst) {
        let temp_c = source.read().with_context(|| {
            format!(
                "could not read temperature with {} measure_temp; \
                 run 'which vcgencmd' and update vcgencmd_path",
                cfg.vcgencmd_path.display()
            )
        })?;

        if let Some(state) = ctl.step(temp_c) {
            pin.set_level(state.as_level())?;
            match state {
                FanState::On => {
                    if cfg.verbose {
                        eprintln!(
                            "pifand: turn fan ON ... {} deg C setpoint_high reached",
                            cfg.setpoint_high
                        );
                    }
                    logger::log_event("fan_on", json!({ "temp_c": temp_c }));
                }
                FanState::Off => {
                    if cfg.verbose {
                        eprintln!(
                            "pifand: turn fan OFF .. {} deg C setpoint_low reached",
                            cfg.setpoint_low
                        );
                    }
                    logger::log_event("fan_off", json!({ "temp_c": temp_c }));
                }
            }
        }

        if cfg.debug {
            eprintln!(
                "pifand: fan is {} .. CPU at {} C .. sleep {} sec",
                ctl.state(),
                temp_c,
                interval.as_secs()
            );
        }

        if !sleep_interruptible(interval, shutdown) {
            break;
        }
    }
    Ok(())
}

/// The full STARTING -> RUNNING -> STOPPING lifecycle for `--fan-mode auto`.
pub fn run_service(cfg: &Config) -> Result<()> {
    let thresholds = cfg.thresholds().map_err(|e| anyhow!(e))?;

    let source = Vcgencmd::new(&cfg.vcgencmd_path);
    if !source.is_available() {
        return Err(anyhow!(
            "{} not found; locate it with 'which vcgencmd' and set vcgencmd_path",
            cfg.vcgencmd_path.display()
        ));
    }

    // Handlers must be live before the pin is claimed: a signal landing
    // between acquire and a later registration would kill the process while
    // it owns the pin, stranding the advisory lock.
    register_signal_handlers()?;

    let mut pin = Gpio::new()
        .acquire(cfg.fan_gpio)
        .context("could not claim fan control pin")?;
    if cfg.verbose {
        eprintln!(
            "pifand: initializing fan to OFF using GPIO pin {}",
            cfg.fan_gpio
        );
    }
    let mut ctl = HysteresisController::new(thresholds);
    logger::log_event(
        "service_start",
        json!({
            "pin": cfg.fan_gpio,
            "setpoint_high": cfg.setpoint_high,
            "setpoint_low": cfg.setpoint_low,
            "sleep_sec": cfg.sleep_sec,
        }),
    );

    let interval = Duration::from_secs(cfg.sleep_sec);
    let result = control_loop(&mut ctl, &mut pin, &source, interval, cfg, &SHUTDOWN);

    if cfg.verbose {
        eprintln!("pifand: shutdown, cleaning up GPIO pin {}", cfg.fan_gpio);
    }
    logger::log_event("shutdown", json!({ "graceful": result.is_ok() }));
    if let Err(e) = pin.release() {
        eprintln!("pifand: warning: failed to release GPIO pin: {}", e);
    }
    logger::flush();
    result
}

/// One-shot `--fan-mode on|off` and the `force_fan_on` config switch: a
/// single write, release, exit. The loop is never entered.
pub fn run_forced(cfg: &Config, state: FanState) -> Result<()> {
    // Even the one-shot path owns the pin briefly; defer signal death so
    // the write/release pair always completes.
    register_signal_handlers()?;

    let mut pin = Gpio::new()
        .acquire(cfg.fan_gpio)
        .context("could not claim fan control pin")?;
    pin.write(state.as_level())?;
    if cfg.verbose {
        eprintln!(
            "pifand: fan forced {} on GPIO pin {}, no temperature control",
            state, cfg.fan_gpio
        );
    }
    logger::log_event("fan_forced", json!({ "state": state.to_string() }));
    logger::flush();
    pin.release()?;
    Ok(())
}
