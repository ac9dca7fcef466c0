mod weather;

pub use weather::WeatherAgent;

use crate::errors::AgentResult;

/// A capability that can answer certain chat inputs without calling the model
pub trait Agent: Send + Sync {
    /// Get the name of the agent
    fn name(&self) -> &str;

    /// Get a description of what the agent can do
    fn description(&self) -> &str;

    /// Whether the agent wants to answer this input
    fn can_handle(&self, input: &str) -> bool;

    /// Produce the answer for an input accepted by `can_handle`
    fn execute(&self, input: &str) -> AgentResult<String>;
}
