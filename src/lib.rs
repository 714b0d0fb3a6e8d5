//! Host side of the BLE scroll wheel.
//!
//! Finds the wheel, keeps one UART session alive, turns `SCR:` notifications
//! into high-resolution wheel events and forwards operator text back to
//! the device.

pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod session;
