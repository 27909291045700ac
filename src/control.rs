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

//! Two-setpoint hysteresis decision logic for the fan.
//!
//! The fan turns on once the temperature reaches `high` and stays on until
//! it drops to `low`. Between the two setpoints the state is whatever it
//! last was; that dead zone is what keeps the fan from chattering around a
//! single threshold.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanState {
    Off,
    On,
}

impl FanState {
    /// The GPIO level that drives the fan into this state.
    pub fn as_level(self) -> bool {
        matches!(self, FanState::On)
    }
}

impl fmt::Display for FanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FanState::Off => write!(f, "OFF"),
            FanState::On => write!(f, "ON"),
        }
    }
}

/// Fan on/off setpoints in degrees Celsius. `high` must exceed `low`.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub high: f64,
    pub low: f64,
}

impl Thresholds {
    pub fn new(high: f64, low: f64) -> Result<Self, String> {
        if high.is_nan() || low.is_nan() {
            return Err("setpoints cannot be NaN".to_string());
        }
        if high <= low {
            return Err(format!(
                "setpoint_high ({}) must be greater than setpoint_low ({})",
                high, low
            ));
        }
        Ok(Self { high, low })
    }
}

/// Holds the current fan state and applies the hysteresis rule once per
/// poll cycle. The controller is memoryless beyond the state itself.
#[derive(Debug)]
pub struct HysteresisController {
    thresholds: Thresholds,
    state: FanState,
}

impl HysteresisController {
    /// Starts in `Off`; the actual pin is forced low at acquisition, so the
    /// controller never assumes a prior physical state.
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            state: FanState::Off,
        }
    }

    pub fn state(&self) -> FanState {
        self.state
    }

    /// Evaluates one temperature sample. Returns the new state when a
    /// transition occurred, `None` otherwise. Callers must only touch the
    /// pin on `Some`, so an unchanged state costs zero writes.
    ///
    /// Both boundaries are inclusive: a sample equal to `low` turns a
    /// running fan off, a sample equal to `high` turns a stopped fan on.
    pub fn step(&mut self, temp_c: f64) -> Option<FanState> {
        match self.state {
            FanState::On if temp_c <= self.thresholds.low => {
                self.state = FanState::Off;
                Some(FanState::Off)
            }
            FanState::Off if temp_c >= self.thresholds.high => {
                self.state = FanState::On;
                Some(FanState::On)
            }
            _ => None,
        }
    }
}
