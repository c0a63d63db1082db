// src/serial/mod.rs
//
// Serial console capture subsystem.
//
// Features:
// - Candidate device discovery (/dev/ttyUSB*, /dev/ttyACM*)
// - Timed, byte-bounded raw capture sessions with guaranteed port cleanup
// - Optional transmit of a prompt string before reading

pub mod capture;
pub mod discover;

pub use capture::{tool_serial_capture, SUPPORTED_BAUD_RATES};
pub use discover::{discover_devices, tool_serial_devices};
