/*
 * Test utilities and fixtures for Pifand
 *
 * Shared helpers for building fake sysfs GPIO trees and quiet
 * configurations, used by the per-module test suites.
 */

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use crate::config::Config;
use crate::control::{HysteresisController, Thresholds};

/// Lays out a fake sysfs gpio tree with empty export/unexport files,
/// standing in for `/sys/class/gpio`.
pub fn fake_gpio_root() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("export"), "").unwrap();
    fs::write(dir.path().join("unexport"), "").unwrap();
    dir
}

/// Simulates a pin the kernel has already exported.
pub fn export_pin(root: &Path, pin: u32, direction: &str, value: &str) {
    let dir = root.join(format!("gpio{}", pin));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("direction"), direction).unwrap();
    fs::write(dir.join("value"), value).unwrap();
}

/// Default configuration with console output silenced.
pub fn quiet_config() -> Config {
    Config {
        verbose: false,
        debug: false,
        ..Config::default()
    }
}

/// Controller with the stock 65/55 setpoints.
pub fn test_controller() -> HysteresisController {
    HysteresisController::new(Thresholds::new(65.0, 55.0).unwrap())
}
