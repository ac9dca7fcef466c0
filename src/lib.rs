pub mod agents;
pub mod client;
pub mod config;
pub mod errors;
pub mod models;
pub mod stream;
pub mod turn;

pub use agents::{Agent, WeatherAgent};
pub use client::OllamaClient;
pub use config::{ClientConfig, ConfigSnapshot};
pub use errors::{AgentError, AgentResult, OllamaError, OllamaResult, Phase};
pub use stream::{ChatStream, GenerateStream, LineStream, StreamRecord};
