#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod analysis;
pub mod arrival;
pub mod clock;
pub mod config;
pub mod intensity;
