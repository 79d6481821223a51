//! Tagged stdout reporting.
//!
//! The tagged line stream is the tool's externally observed output —
//! unattended callers grep it — so it goes straight to stdout rather
//! than through the tracing pipeline. Debug-level detail still flows
//! through `tracing`.

use std::fmt::Display;

pub fn info(msg: impl Display) {
    println!("[INFO] {msg}");
}

pub fn step(msg: impl Display) {
    println!("[STEP] {msg}");
}

pub fn error(msg: impl Display) {
    println!("[ERROR] {msg}");
}

pub fn success(msg: impl Display) {
    println!("[SUCCESS] {msg}");
}
