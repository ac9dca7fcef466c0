//! Agent probing for a single chat turn.
//!
//! A turn moves through `AgentProbe -> ModelCall -> Done`. This module owns the
//! probe; the model call lives on the client. Whichever path answers, the turn
//! appends exactly one assistant message to the caller's history.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::agents::Agent;
use crate::models::message::{Message, Role};

/// Outcome of probing the registered agents for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Probe {
    /// An agent answered; the model must not be called.
    Answered { agent: String, message: Message },
    /// No agent answered; fall through to the model.
    ModelCall,
}

/// Offer the last message of `history` to each agent in registration order.
///
/// Only a `user` message is offered. The first agent that accepts the text and
/// executes successfully answers the turn; an agent that fails is logged and
/// skipped without retry.
pub fn probe(agents: &[Arc<dyn Agent>], history: &[Message], use_agents: bool) -> Probe {
    if !use_agents || agents.is_empty() {
        return Probe::ModelCall;
    }

    let Some(last) = history.last() else {
        return Probe::ModelCall;
    };
    if last.role != Role::User {
        debug!(role = ?last.role, "last message is not from the user, skipping agents");
        return Probe::ModelCall;
    }

    for agent in agents {
        if !agent.can_handle(&last.content) {
            continue;
        }
        match agent.execute(&last.content) {
            Ok(text) => {
                debug!(agent = agent.name(), "agent answered the turn");
                return Probe::Answered {
                    agent: agent.name().to_string(),
                    message: Message::assistant(text),
                };
            }
            Err(err) => {
                warn!(agent = agent.name(), error = %err, "agent execution failed, trying next");
            }
        }
    }

    Probe::ModelCall
}


#[cfg(test)]
mod tests {
    use super::test_agents::ScriptedAgent;
    use super::*;
    use std::sync::atomic::Ordering;

    fn history(text: &str) -> Vec<Message> {
        vec![Message::system("You are helpful."), Message::user(text)]
    }

    #[test]
    fn test_disabled_or_empty_goes_to_model() {
        let agents: Vec<Arc<dyn Agent>> =
            vec![Arc::new(ScriptedAgent::answering("weather", "weather", "sunny"))];
        assert_eq!(probe(&agents, &history("weather?"), false), Probe::ModelCall);
        assert_eq!(probe(&[], &history("weather?"), true), Probe::ModelCall);
    }

    #[test]
    fn test_first_matching_agent_answers() {
        let first = ScriptedAgent::answering("first", "weather", "from first");
        let second = ScriptedAgent::answering("second", "weather", "from second");
        let second_calls = second.calls();
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(first), Arc::new(second)];

        match probe(&agents, &history("What's the weather in Paris?"), true) {
            Probe::Answered { agent, message } => {
                assert_eq!(agent, "first");
                assert_eq!(message.role, Role::Assistant);
                assert_eq!(message.content, "from first");
            }
            Probe::ModelCall => panic!("expected an agent answer"),
        }
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_agent_is_skipped_once() {
        let broken = ScriptedAgent::failing("broken", "weather");
        let broken_calls = broken.calls();
        let backup = ScriptedAgent::answering("backup", "weather", "cloudy");
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(broken), Arc::new(backup)];

        let outcome = probe(&agents, &history("weather today?"), true);
        assert!(matches!(outcome, Probe::Answered { ref agent, .. } if agent == "backup"));
        assert_eq!(broken_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_all_failing_falls_through() {
        let agents: Vec<Arc<dyn Agent>> = vec![
            Arc::new(ScriptedAgent::failing("a", "weather")),
            Arc::new(ScriptedAgent::failing("b", "weather")),
        ];
        assert_eq!(probe(&agents, &history("weather?"), true), Probe::ModelCall);
    }

    #[test]
    fn test_non_matching_agent_is_not_executed() {
        let agent = ScriptedAgent::answering("weather", "weather", "sunny");
        let calls = agent.calls();
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(agent)];

        assert_eq!(probe(&agents, &history("tell me a story"), true), Probe::ModelCall);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_only_user_messages_are_probed() {
        let agent = ScriptedAgent::answering("weather", "weather", "sunny");
        let calls = agent.calls();
        let agents: Vec<Arc<dyn Agent>> = vec![Arc::new(agent)];
        let history = vec![
            Message::user("hi"),
            Message::assistant("The weather is nice today."),
        ];

        assert_eq!(probe(&agents, &history, true), Probe::ModelCall);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
