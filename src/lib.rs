//! airnode firmware library.
//!
//! A battery-powered air-quality node: wake, sample the gas sensor
//! through a fusion engine, checkpoint its calibration, sleep as deeply
//! as the schedule allows.
//!
//! Exposes the pure-logic modules for integration testing. All
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod app;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod fusion;
pub mod power;
pub mod scheduler;

pub mod adapters;

pub mod pins;
