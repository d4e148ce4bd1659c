//! Sources of agent preferences and discussion opinions
//!
//! The voting core never talks to a language model directly. It asks a
//! [`PreferenceOracle`] which option an agent would like, and an
//! [`OpinionSource`] what the agent says during discussion. [`LlmOracle`]
//! answers both through an [`LlmClient`] and falls back to canned values
//! whenever the model or the network misbehaves.

use crate::catalog::Policy;
use crate::error::Result;
use crate::llm_client::LlmClient;
use crate::openrouter::{CompletionRequest, Message};
use crate::roster::AgentProfile;
use crate::types::{AgentId, OptionId, PolicyId};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Supplies the option an agent would vote for if budget allowed
#[async_trait]
pub trait PreferenceOracle: Send + Sync {
    /// Preferred option of `agent` on `policy`
    async fn preferred_option(&self, agent: &AgentProfile, policy: &Policy) -> Result<OptionId>;
}

/// Supplies an agent's free-text opinion during discussion
#[async_trait]
pub trait OpinionSource: Send + Sync {
    /// Opinion of `agent` on `policy`
    async fn opinion(&self, agent: &AgentProfile, policy: &Policy) -> Result<String>;
}

/// Extract an option id from a model reply.
///
/// Accepts an explicit "option N" mention anywhere in the reply, or a reply
/// whose first word is the bare digit. Digits inside amounts such as
/// "1.5 million" or "$3" never count.
pub fn parse_option_reply(reply: &str) -> Option<OptionId> {
    static OPTION: OnceLock<Option<Regex>> = OnceLock::new();
    let re = OPTION
        .get_or_init(|| Regex::new(r"(?i)\boption\s*#?\s*([1-3])(?:$|[^\d.,]|[.,](?:$|\D))").ok())
        .as_ref()?;

    let digit = match re.captures(reply).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => reply
            .split_whitespace()
            .next()?
            .trim_matches(|c: char| matches!(c, '*' | '(' | ')' | '.' | ':' | ',' | '!' | '#' | '"' | '\'')),
    };
    match digit {
        "1" => Some(OptionId::ONE),
        "2" => Some(OptionId::TWO),
        "3" => Some(OptionId::THREE),
        _ => None,
    }
}

/// Canned discussion text used when no model answer is available
pub fn canned_opinion(agent: &AgentProfile, policy: &Policy) -> String {
    format!(
        "As {}, I believe {} deserves careful thought given our limited budget.",
        agent.role,
        policy.title.to_lowercase()
    )
}

/// Deterministic oracle for tests and offline play
#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    default_option: OptionId,
    options: HashMap<(AgentId, PolicyId), OptionId>,
    opinions: HashMap<(AgentId, PolicyId), String>,
}

impl ScriptedOracle {
    /// Every agent prefers `default_option` unless scripted otherwise
    pub fn new(default_option: OptionId) -> Self {
        Self {
            default_option,
            options: HashMap::new(),
            opinions: HashMap::new(),
        }
    }

    /// Script one agent's preference on one policy
    pub fn with_option(mut self, agent: impl Into<String>, policy: PolicyId, option: OptionId) -> Self {
        self.options.insert((AgentId::new(agent), policy), option);
        self
    }

    /// Script one agent's preference on every policy in `policies`
    pub fn with_agent_options(
        mut self,
        agent: impl Into<String>,
        policies: impl IntoIterator<Item = (PolicyId, OptionId)>,
    ) -> Self {
        let agent = AgentId::new(agent);
        for (policy, option) in policies {
            self.options.insert((agent.clone(), policy), option);
        }
        self
    }

    /// Script one agent's opinion on one policy
    pub fn with_opinion(mut self, agent: impl Into<String>, policy: PolicyId, text: impl Into<String>) -> Self {
        self.opinions.insert((AgentId::new(agent), policy), text.into());
        self
    }
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new(OptionId::TWO)
    }
}

#[async_trait]
impl PreferenceOracle for ScriptedOracle {
    async fn preferred_option(&self, agent: &AgentProfile, policy: &Policy) -> Result<OptionId> {
        Ok(self
            .options
            .get(&(agent.id.clone(), policy.id))
            .copied()
            .unwrap_or(self.default_option))
    }
}

#[async_trait]
impl OpinionSource for ScriptedOracle {
    async fn opinion(&self, agent: &AgentProfile, policy: &Policy) -> Result<String> {
        Ok(self
            .opinions
            .get(&(agent.id.clone(), policy.id))
            .cloned()
            .unwrap_or_else(|| canned_opinion(agent, policy)))
    }
}

/// Oracle backed by a chat-completion model
pub struct LlmOracle {
    client: Arc<dyn LlmClient>,
    model: String,
    fallback_option: OptionId,
    temperature: f32,
}

impl LlmOracle {
    /// Create an oracle that asks `model` through `client`
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            fallback_option: OptionId::TWO,
            temperature: 0.7,
        }
    }

    /// Option used when the model reply is unusable
    pub fn with_fallback_option(mut self, option: OptionId) -> Self {
        self.fallback_option = option;
        self
    }

    /// Set the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn describe(policy: &Policy) -> String {
        let options = policy
            .options
            .iter()
            .map(|o| format!("Option {} (costs {} units): {}", o.id, o.weight, o.text))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Policy {}: {}\n{}\n\n{}", policy.id, policy.title, policy.description, options)
    }

    async fn ask(&self, agent: &AgentProfile, prompt: String, max_tokens: u32) -> Result<String> {
        let request = CompletionRequest::new(
            &self.model,
            vec![Message::system(agent.system_prompt()), Message::user(prompt)],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(max_tokens);

        let response = self.client.complete(request).await?;
        Ok(response.first_content().unwrap_or_default().trim().to_string())
    }
}

#[async_trait]
impl PreferenceOracle for LlmOracle {
    async fn preferred_option(&self, agent: &AgentProfile, policy: &Policy) -> Result<OptionId> {
        let prompt = format!(
            "{}\n\nWhich option do you vote for? Answer with the option number only (1, 2 or 3).",
            Self::describe(policy)
        );

        match self.ask(agent, prompt, 10).await {
            Ok(reply) => match parse_option_reply(&reply) {
                Some(option) => Ok(option),
                None => {
                    tracing::warn!(
                        agent = %agent.id,
                        policy = %policy.id,
                        reply = %reply,
                        "Malformed preference reply, using fallback"
                    );
                    Ok(self.fallback_option)
                }
            },
            Err(e) => {
                tracing::warn!(
                    agent = %agent.id,
                    policy = %policy.id,
                    client = self.client.client_type(),
                    error = %e,
                    "Preference request failed, using fallback"
                );
                Ok(self.fallback_option)
            }
        }
    }
}

#[async_trait]
impl OpinionSource for LlmOracle {
    async fn opinion(&self, agent: &AgentProfile, policy: &Policy) -> Result<String> {
        let prompt = format!(
            "{}\n\nGive your opinion on this policy in two or three sentences, in character.",
            Self::describe(policy)
        );

        match self.ask(agent, prompt, 200).await {
            Ok(reply) if !reply.is_empty() => Ok(reply),
            Ok(_) => {
                tracing::warn!(agent = %agent.id, policy = %policy.id, "Empty opinion, using canned text");
                Ok(canned_opinion(agent, policy))
            }
            Err(e) => {
                tracing::warn!(
                    agent = %agent.id,
                    policy = %policy.id,
                    error = %e,
                    "Opinion request failed, using canned text"
                );
                Ok(canned_opinion(agent, policy))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PolicyCatalog;
    use crate::config::OpenRouterConfig;
    use crate::openrouter::OpenRouterClient;
    use crate::roster::persona_pool;

    fn fixtures() -> (AgentProfile, Policy) {
        let catalog = PolicyCatalog::builtin();
        let policy = catalog.policy(PolicyId::new(1).unwrap()).unwrap().clone();
        (persona_pool()[0].clone(), policy)
    }

    fn oracle_for(server: &mockito::Server) -> LlmOracle {
        let url = url::Url::parse(&server.url()).unwrap();
        let config = OpenRouterConfig::new("test-key").unwrap().with_base_url(url);
        let client = OpenRouterClient::new(config).unwrap();
        LlmOracle::new(Arc::new(client), "test/model")
    }

    fn completion(content: &str) -> String {
        serde_json::json!({
            "id": "cmpl-1",
            "model": "test/model",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
        .to_string()
    }

    #[test]
    fn test_parse_option_reply() {
        assert_eq!(parse_option_reply("2"), Some(OptionId::TWO));
        assert_eq!(parse_option_reply("Option 3."), Some(OptionId::THREE));
        assert_eq!(parse_option_reply("**2**"), Some(OptionId::TWO));
        assert_eq!(parse_option_reply("I pick option 1, because it is cheap."), Some(OptionId::ONE));
        assert_eq!(parse_option_reply("OPTION #3"), Some(OptionId::THREE));
        assert_eq!(parse_option_reply("12"), None);
        assert_eq!(parse_option_reply("option 4"), None);
        assert_eq!(parse_option_reply("no idea"), None);
    }

    #[test]
    fn test_parse_option_reply_ignores_amounts() {
        assert_eq!(parse_option_reply("1.5 million for teacher training"), None);
        assert_eq!(parse_option_reply("It would cost $3 million."), None);
        assert_eq!(parse_option_reply("$3"), None);
        assert_eq!(parse_option_reply("Spend 2 units here"), None);
        assert_eq!(parse_option_reply("option 1.5"), None);
    }

    #[tokio::test]
    async fn test_scripted_oracle() {
        let (agent, policy) = fixtures();
        let oracle = ScriptedOracle::new(OptionId::ONE)
            .with_option(agent.id.as_str(), policy.id, OptionId::THREE)
            .with_opinion(agent.id.as_str(), policy.id, "Yes.");

        assert_eq!(oracle.preferred_option(&agent, &policy).await.unwrap(), OptionId::THREE);
        assert_eq!(oracle.opinion(&agent, &policy).await.unwrap(), "Yes.");

        let other = persona_pool()[1].clone();
        assert_eq!(oracle.preferred_option(&other, &policy).await.unwrap(), OptionId::ONE);
        assert!(oracle.opinion(&other, &policy).await.unwrap().contains(&other.role));
    }

    #[tokio::test]
    async fn test_llm_oracle_parses_reply() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("Option 3"))
            .create_async()
            .await;

        let (agent, policy) = fixtures();
        let oracle = oracle_for(&server);
        assert_eq!(oracle.preferred_option(&agent, &policy).await.unwrap(), OptionId::THREE);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_llm_oracle_malformed_reply_falls_back() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("I abstain"))
            .create_async()
            .await;

        let (agent, policy) = fixtures();
        let oracle = oracle_for(&server).with_fallback_option(OptionId::ONE);
        assert_eq!(oracle.preferred_option(&agent, &policy).await.unwrap(), OptionId::ONE);
    }

    #[tokio::test]
    async fn test_llm_oracle_http_failure_falls_back() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .expect_at_least(2)
            .create_async()
            .await;

        let (agent, policy) = fixtures();
        let oracle = oracle_for(&server);
        assert_eq!(oracle.preferred_option(&agent, &policy).await.unwrap(), OptionId::TWO);
        assert_eq!(oracle.opinion(&agent, &policy).await.unwrap(), canned_opinion(&agent, &policy));
    }

    #[tokio::test]
    async fn test_llm_oracle_opinion() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion("  We must include every child.  "))
            .create_async()
            .await;

        let (agent, policy) = fixtures();
        let oracle = oracle_for(&server);
        assert_eq!(oracle.opinion(&agent, &policy).await.unwrap(), "We must include every child.");
    }
}
