pub mod action;
pub mod core;
pub mod endpoints;
pub mod error;
pub mod frontend;
pub mod gate;
pub mod logging;
pub mod mpv;
pub mod preview;
pub mod progress;
pub mod search;
