//! Planner adapter: turns one user request plus the operation menu into one
//! raw completion. Exactly one blocking round-trip per turn; the text comes
//! back unmodified and malformed output is the validator's problem, not
//! ours. Transport failures propagate to the turn boundary.

use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use color_eyre::eyre::eyre;

use crate::config::{OllamaConfig, OpenAIConfig, PlannerConfig, PlannerProvider};

/// The fixed behavioral contract sent on every call.
pub const SYSTEM_PROMPT: &str = r#"You are a tool-using data analyst working over one loaded dataset.
You must respond with ONLY one JSON object on a single line, no prose.

JSON schema:
{
  "tool": "<operation_name>",
  "args": { ... JSON-safe arguments ... },
  "reason": "<brief why this operation & args>",
  "next": "<optional follow-up user question to ask after executing>"
}

Rules:
- Choose exactly ONE operation per turn from the available operation list I will give you.
- If a dataset must be loaded, call load_data first with {"path":"<csv_path>"}.
- When summarizing data, use summary with {"numeric_only": true|false}.
- For categories, top_categories with {"columns":[...], "top_n": N}.
- For correlations, correlations with {"columns":[...]} or omit to use all numeric.
- For outliers, outliers with {"columns":[...], "z": 3.0}.
- For time trends, time_trend with {"column":"...", "freq":"M"} or "Y".
- If the user asks a question that needs seeing rows, use head with {"n": 5}.
- If you lack a dataset path and none is loaded, ask the user for a CSV path in "next".
- Output strictly valid JSON. Do not include backticks or comments."#;

#[derive(Debug, Clone)]
pub struct Planner {
    provider: PlannerProvider,
    openai: OpenAIConfig,
    ollama: OllamaConfig,
    http: HttpClient,
}

impl Planner {
    pub fn from_config(cfg: &PlannerConfig) -> color_eyre::Result<Self> {
        let http = HttpClient::builder()
            .user_agent(concat!("datachat/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            provider: cfg.provider,
            openai: cfg.openai.clone(),
            ollama: cfg.ollama.clone(),
            http,
        })
    }

    /// One request, one completion, raw text back.
    pub fn propose(&self, user_text: &str, operations: &[String]) -> color_eyre::Result<String> {
        let prompt = build_user_prompt(user_text, operations);
        match self.provider {
            PlannerProvider::Ollama => self.complete_ollama(&prompt),
            PlannerProvider::OpenAI => self.complete_openai(&prompt),
        }
    }

    fn complete_ollama(&self, prompt: &str) -> color_eyre::Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            stream: bool,
            options: Options,
        }
        #[derive(Serialize)]
        struct Options {
            temperature: f64,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            #[serde(default)]
            message: Option<ResponseMessage>,
        }
        #[derive(Deserialize)]
        struct ResponseMessage {
            #[serde(default)]
            content: String,
        }

        let url = format!("{}/api/chat", self.ollama.host.trim_end_matches('/'));
        let req = ChatRequest {
            model: &self.ollama.model,
            messages: messages(prompt),
            stream: false,
            options: Options { temperature: 0.2 },
        };
        let res = self
            .http
            .post(url)
            .json(&req)
            .send()
            .map_err(|e| eyre!("Ollama chat request failed: {e}"))?;
        if !res.status().is_success() {
            return Err(eyre!("Ollama chat HTTP error: {}", res.status()));
        }
        let parsed: ChatResponse = res
            .json()
            .map_err(|e| eyre!("Ollama chat parse failed: {e}"))?;
        Ok(parsed
            .message
            .map(|m| m.content.trim().to_string())
            .unwrap_or_default())
    }

    fn complete_openai(&self, prompt: &str) -> color_eyre::Result<String> {
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f64,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ResponseMessage,
        }
        #[derive(Deserialize)]
        struct ResponseMessage {
            #[serde(default)]
            content: String,
        }

        if self.openai.api_key.trim().is_empty() {
            return Err(eyre!("OpenAI API key is not set (OPENAI_API_KEY)"));
        }
        let url = format!(
            "{}/chat/completions",
            self.openai.base_url.trim_end_matches('/')
        );
        let req = ChatRequest {
            model: &self.openai.model,
            messages: messages(prompt),
            temperature: 0.2,
        };
        let res = self
            .http
            .post(url)
            .bearer_auth(&self.openai.api_key)
            .json(&req)
            .send()
            .map_err(|e| eyre!("OpenAI chat request failed: {e}"))?;
        if !res.status().is_success() {
            return Err(eyre!("OpenAI chat HTTP error: {}", res.status()));
        }
        let parsed: ChatResponse = res
            .json()
            .map_err(|e| eyre!("OpenAI chat parse failed: {e}"))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| eyre!("OpenAI returned an empty completion"))
    }
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

fn messages(prompt: &str) -> Vec<Message<'_>> {
    vec![
        Message { role: "system", content: SYSTEM_PROMPT },
        Message { role: "user", content: prompt },
    ]
}

fn build_user_prompt(user_text: &str, operations: &[String]) -> String {
    format!(
        "Available operations: [{}].\nUser request: {}\nReturn only the JSON as specified.",
        operations.join(", "),
        user_text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    #[test]
    fn user_prompt_carries_menu_and_request() {
        let names = Registry::new().names();
        let prompt = build_user_prompt("show me outliers in price", &names);
        for name in &names {
            assert!(prompt.contains(name.as_str()), "menu missing {name}");
        }
        assert!(prompt.contains("show me outliers in price"));
        assert!(prompt.ends_with("Return only the JSON as specified."));
    }

    #[test]
    fn contract_demands_a_single_json_object() {
        assert!(SYSTEM_PROMPT.contains("ONLY one JSON object on a single line"));
        assert!(SYSTEM_PROMPT.contains("\"tool\""));
        assert!(SYSTEM_PROMPT.contains("exactly ONE operation per turn"));
    }

    #[test]
    fn planner_builds_from_default_config() {
        let cfg = PlannerConfig::default();
        assert!(Planner::from_config(&cfg).is_ok());
    }
}
