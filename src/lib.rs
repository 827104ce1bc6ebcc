//! Lifecycle controller for a single supervised Minecraft server.
//!
//! [`server::MinecraftServer`] owns the child process, its console and RCON
//! channels, and the files the game server keeps next to its jar.
//! [`server::ServerController`] wraps it so operations run one at a time.

pub mod backup;
pub mod config;
pub mod error;
pub mod instance;
pub mod logger;
pub mod manifests;
pub mod parser;
pub mod players;
pub mod properties;
pub mod rcon;
pub mod server;
pub mod settings;
mod utils;

pub use error::{Result, ServerError};
pub use server::{MinecraftServer, ServerController, ServerStatus, StartOutcome};
pub use settings::{Settings, SettingsStore};
