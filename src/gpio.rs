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

//! Sysfs GPIO access for the single fan control pin (BCM numbering).
//!
//! The pin's direction attribute doubles as an advisory lock: a pin that
//! already reads `out` is treated as owned by a live controller and
//! `acquire` refuses it. This is advisory only. A crashed owner leaves the
//! direction set and must be cleared by hand (`echo N > unexport`).

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("GPIO {0} is already configured as an output; another fan controller appears to be running")]
    PinBusy(u32),
    #[error("unexpected contents in {0}: {1:?}")]
    Parse(String, String),
}

/// What a pin is currently doing, from its sysfs direction attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFunction {
    /// Not exported; nothing owns it.
    Unexported,
    Input,
    Output,
}

impl fmt::Display for PinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinFunction::Unexported => write!(f, "unexported"),
            PinFunction::Input => write!(f, "input"),
            PinFunction::Output => write!(f, "output"),
        }
    }
}

fn read_trimmed<P: AsRef<Path>>(path: P) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Access to one sysfs GPIO tree. The root is configurable so tests can
/// point it at a scratch directory instead of `/sys/class/gpio`.
#[derive(Debug, Clone)]
pub struct Gpio {
    root: PathBuf,
}

impl Default for Gpio {
    fn default() -> Self {
        Self::new()
    }
}

impl Gpio {
    pub fn new() -> Self {
        Self::with_root(SYSFS_GPIO_ROOT)
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    fn pin_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    /// Reports the pin's current function without claiming it. Used by the
    /// status mode and by `acquire` for the busy check.
    pub fn pin_function(&self, pin: u32) -> Result<PinFunction, GpioError> {
        let direction = self.pin_dir(pin).join("direction");
        let contents = match fs::read_to_string(&direction) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PinFunction::Unexported),
            Err(e) => return Err(e.into()),
        };
        match contents.trim() {
            "in" => Ok(PinFunction::Input),
            "out" => Ok(PinFunction::Output),
            other => Err(GpioError::Parse(
                direction.display().to_string(),
                other.to_string(),
            )),
        }
    }

    /// Reads the pin level without a handle. Diagnostic use only; the
    /// control loop always goes through its `PinHandle`.
    pub fn read_level(&self, pin: u32) -> Result<bool, GpioError> {
        let value = self.pin_dir(pin).join("value");
        match read_trimmed(&value)?.as_str() {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(GpioError::Parse(
                value.display().to_string(),
                other.to_string(),
            )),
        }
    }

    /// Claims `pin` as an output and forces it low.
    ///
    /// Refuses with `PinBusy` when the pin already reads `out`, without
    /// touching anything: an output direction means another controller is
    /// presumed live (see module docs). An exported input pin is free and
    /// gets repurposed.
    pub fn acquire(&self, pin: u32) -> Result<PinHandle, GpioError> {
        if self.pin_function(pin)? == PinFunction::Output {
            return Err(GpioError::PinBusy(pin));
        }

        let dir = self.pin_dir(pin);
        if !dir.exists() {
            fs::write(self.root.join("export"), pin.to_string())?;
            // The kernel materializes gpio<N> on export; roots backed by a
            // plain directory (tests) do not.
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
            }
        }
        fs::write(dir.join("direction"), "out")?;
        fs::write(dir.join("value"), "0")?;

        Ok(PinHandle {
            root: self.root.clone(),
            pin,
            released: false,
        })
    }
}

/// Write access to the fan line as the control loop sees it. A seam so
/// tests can observe exactly which actuations the loop performs.
#[cfg_attr(test, mockall::automock)]
pub trait FanPin {
    fn set_level(&mut self, level: bool) -> Result<(), GpioError>;
}

impl FanPin for PinHandle {
    fn set_level(&mut self, level: bool) -> Result<(), GpioError> {
        self.write(level)
    }
}

/// Exclusive ownership of one output pin. Dropping the handle releases the
/// pin, so every exit path (including panics and early `?` returns) gives
/// it back; `release` does the same explicitly and reports errors.
#[derive(Debug)]
pub struct PinHandle {
    root: PathBuf,
    pin: u32,
    released: bool,
}

impl PinHandle {
    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Sets the physical level. Safe to call repeatedly with the same
    /// level; sysfs value writes are idempotent.
    pub fn write(&mut self, level: bool) -> Result<(), GpioError> {
        let value = self.root.join(format!("gpio{}", self.pin)).join("value");
        fs::write(value, if level { "1" } else { "0" })?;
        Ok(())
    }

    pub fn read_level(&self) -> Result<bool, GpioError> {
        Gpio::with_root(self.root.clone()).read_level(self.pin)
    }

    /// Unexports the pin, returning it to the unclaimed state another
    /// controller instance can acquire. Same effect as RPi.GPIO's
    /// `cleanup()`: the line reverts to its unconfigured default.
    pub fn release(mut self) -> Result<(), GpioError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), GpioError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        fs::write(self.root.join("unexport"), self.pin.to_string())?;
        Ok(())
    }
}

impl Drop for PinHandle {
    fn drop(&mut self) {
        let _ = self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{export_pin, fake_gpio_root};

    #[test]
    fn test_pin_function_unexported() {
        let root = fake_gpio_root();
        let gpio = Gpio::with_root(root.path());
        assert_eq!(gpio.pin_function(25).unwrap(), PinFunction::Unexported);
    }

    #[test]
    fn test_pin_function_input_and_output() {
        let root = fake_gpio_root();
        export_pin(root.path(), 25, "in\n", "0\n");
        export_pin(root.path(), 24, "out\n", "1\n");
        let gpio = Gpio::with_root(root.path());
        assert_eq!(gpio.pin_function(25).unwrap(), PinFunction::Input);
        assert_eq!(gpio.pin_function(24).unwrap(), PinFunction::Output);
    }

    #[test]
    fn test_pin_function_garbage_direction() {
        let root = fake_gpio_root();
        export_pin(root.path(), 25, "sideways\n", "0\n");
        let gpio = Gpio::with_root(root.path());
        assert!(matches!(
            gpio.pin_function(25),
            Err(GpioError::Parse(_, _))
        ));
    }

    #[test]
    fn test_acquire_refuses_busy_pin_without_writes() {
        let root = fake_gpio_root();
        export_pin(root.path(), 25, "out\n", "1\n");
        let gpio = Gpio::with_root(root.path());
        match gpio.acquire(25) {
            Err(GpioError::PinBusy(25)) => {}
            other => panic!("expected PinBusy, got {:?}", other),
        }
        // Refusal is non-destructive: level and export file untouched.
        let value = fs::read_to_string(root.path().join("gpio25/value")).unwrap();
        assert_eq!(value.trim(), "1");
        let export = fs::read_to_string(root.path().join("export")).unwrap();
        assert!(export.is_empty());
    }

    #[test]
    fn test_acquire_unexported_pin_configures_output_low() {
        let root = fake_gpio_root();
        let gpio = Gpio::with_root(root.path());
        let handle = gpio.acquire(25).unwrap();
        assert_eq!(handle.pin(), 25);
        assert_eq!(
            fs::read_to_string(root.path().join("gpio25/direction"))
                .unwrap()
                .trim(),
            "out"
        );
        assert!(!handle.read_level().unwrap());
        // A second instance now sees the pin as busy.
        assert!(matches!(gpio.acquire(25), Err(GpioError::PinBusy(25))));
    }

    #[test]
    fn test_acquire_repurposes_exported_input_pin() {
        let root = fake_gpio_root();
        export_pin(root.path(), 25, "in\n", "1\n");
        let gpio = Gpio::with_root(root.path());
        let handle = gpio.acquire(25).unwrap();
        assert_eq!(gpio.pin_function(25).unwrap(), PinFunction::Output);
        assert!(!gpio.read_level(25).unwrap());
        drop(handle);
    }

    #[test]
    fn test_write_is_idempotent() {
        let root = fake_gpio_root();
        let gpio = Gpio::with_root(root.path());
        let mut handle = gpio.acquire(25).unwrap();
        handle.write(true).unwrap();
        handle.write(true).unwrap();
        handle.write(true).unwrap();
        assert!(handle.read_level().unwrap());
        handle.write(false).unwrap();
        handle.write(false).unwrap();
        assert!(!handle.read_level().unwrap());
    }

    #[test]
    fn test_release_unexports_pin() {
        let root = fake_gpio_root();
        let gpio = Gpio::with_root(root.path());
        let mut handle = gpio.acquire(25).unwrap();
        handle.write(true).unwrap();
        handle.release().unwrap();
        assert_eq!(
            fs::read_to_string(root.path().join("unexport"))
                .unwrap()
                .trim(),
            "25"
        );
    }

    #[test]
    fn test_drop_releases_once() {
        let root = fake_gpio_root();
        let gpio = Gpio::with_root(root.path());
        {
            let mut handle = gpio.acquire(25).unwrap();
            handle.write(true).unwrap();
            // dropped here without an explicit release
        }
        assert_eq!(
            fs::read_to_string(root.path().join("unexport"))
                .unwrap()
                .trim(),
            "25"
        );
    }
}
