pub mod client;
pub mod logger;
pub mod progress;
