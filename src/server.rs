mod commands;
mod domain;
mod lifecycle;
mod status;
mod world;


pub use domain::{MinecraftServer, ServerController, ServerProperties, ServerStatus, Versions};
pub use lifecycle::StartOutcome;
pub use world::{EULA_FILE, PROPERTIES_FILE};
