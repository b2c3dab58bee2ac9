//! packetgate: multi-transport amateur-radio BBS gateway.
//!
//! Bridges AX.25 packet-radio and telnet operators into a single session
//! model, authenticates by callsign, and brokers a command-and-chat dialogue
//! with an LLM assistant backed by ham-radio tools.

pub mod activity;
pub mod auth;
pub mod banner;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod files;
pub mod gateway;
pub mod logging;
pub mod radio;
pub mod sweeper;

pub use config::Config;
pub use gateway::{ConnRef, Gateway, Transport};
