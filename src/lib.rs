//! Clamster: a per-guild playlist bot for Discord voice channels.

pub mod audio;
pub mod bot;
pub mod config;
pub mod error;
pub mod notify;
pub mod sources;
pub mod storage;
