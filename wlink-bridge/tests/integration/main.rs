//! Integration tests for the bridge core.
//!
//! Everything runs against a mock network adapter and a recording
//! notification sink; no Bluetooth or NetworkManager needed.

mod dispatcher_tests;
mod peripheral_tests;
