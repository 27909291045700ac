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

//! Pifand - hysteresis CPU fan controller for the Raspberry Pi
//!
//! Polls the CPU temperature and switches a case fan on a GPIO pin
//! between two setpoints, with clean teardown on SIGINT/SIGTERM.

pub mod config;
pub mod control;
pub mod gpio;
pub mod logger;
pub mod service;
pub mod temp;

#[cfg(test)]
pub mod test_utils;
