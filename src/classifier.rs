// =============================================================================
// classifier.rs - ASKING A LANGUAGE MODEL WHETHER SOMEONE IS LYING
// =============================================================================
//
// A claim goes in as JSON inside a fixed instruction prompt. A free-text reply
// comes back, and we fish three labelled sections out of it:
//
//   Prediction:         fraud or legitimate (or something creative)
//   Reasoning:          everything up to the next label, across lines
//   Probability Score:  0..1, hopefully
//
// A label the model forgot to write becomes "Cannot be determined". Language
// models do not follow response formats reliably, and a missing section is
// not worth crashing a review over.
// =============================================================================

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, SleuthError};

pub const UNDETERMINED: &str = "Cannot be determined";

static PREDICTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Prediction:\s*(.*)").expect("prediction pattern compiles"));
static REASONING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Reasoning:\s*(.*?)Probability Score:").expect("reasoning pattern compiles")
});
static PROBABILITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Probability Score:\s*(.*)").expect("probability pattern compiles"));

/// A claim as submitted by the claimant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimSubmission {
    pub full_name: String,
    pub contact_number: String,
    pub email_address: String,
    pub incident_date: String,
    pub claim_type: String,
    pub claim_amount: String,
    pub incident_description: String,
    pub policy_number: String,
    pub issuer_name: String,
    pub payment_method: String,
    pub bank_acc_number: String,
    pub supporting_document_url: Option<String>,
    pub incident_photo_url: Option<String>,
}

/// The claim as the model sees it. Same fields, amount carries its currency.
#[derive(Serialize)]
struct PromptClaim<'a> {
    full_name: &'a str,
    contact_number: &'a str,
    email_address: &'a str,
    incident_date: &'a str,
    claim_type: &'a str,
    claim_amount: String,
    incident_description: &'a str,
    policy_number: &'a str,
    issuer_name: &'a str,
    payment_method: &'a str,
    bank_acc_number: &'a str,
    supporting_document_url: Option<&'a str>,
    incident_photo_url: Option<&'a str>,
}

pub fn build_fraud_prompt(claim: &ClaimSubmission) -> Result<String> {
    let view = PromptClaim {
        full_name: &claim.full_name,
        contact_number: &claim.contact_number,
        email_address: &claim.email_address,
        incident_date: &claim.incident_date,
        claim_type: &claim.claim_type,
        claim_amount: format!("rupees{}", claim.claim_amount),
        incident_description: &claim.incident_description,
        policy_number: &claim.policy_number,
        issuer_name: &claim.issuer_name,
        payment_method: &claim.payment_method,
        bank_acc_number: &claim.bank_acc_number,
        supporting_document_url: claim.supporting_document_url.as_deref(),
        incident_photo_url: claim.incident_photo_url.as_deref(),
    };

    Ok(format!(
        "You are an expert in Indian insurance fraud detection. Analyze the following claim information and determine whether it is fraudulent or legitimate.\n\
         Claim Information:\n{}\n\n\
         Please provide a thorough analysis, including specific indicators or patterns that influenced your decision. Additionally, assign a probability score reflecting your confidence in the prediction.\n\n\
         Response Format:\n\
         Prediction: (fraud or legitimate)\n\
         Reasoning: (detailed explanation of the rationale behind your prediction)\n\
         Probability Score: (a numerical value between 0 and 1, with 1 being absolute certainty of fraud)",
        serde_json::to_string(&view)?
    ))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FraudVerdict {
    pub prediction: String,
    pub reasoning: String,
    pub probability_score: String,
}

impl FraudVerdict {
    /// Anything that smells like "fraud" (or "fraudulent", or "Fraud?") raises
    /// the flag.
    pub fn is_flagged(&self) -> bool {
        self.prediction.to_lowercase().contains("fr")
    }
}

pub fn parse_verdict(reply: &str) -> FraudVerdict {
    let section = |re: &Regex| {
        re.captures(reply)
            .map(|caps| caps[1].trim().to_string())
            .unwrap_or_else(|| UNDETERMINED.to_string())
    };

    FraudVerdict {
        prediction: section(&PREDICTION),
        reasoning: section(&REASONING),
        probability_score: section(&PROBABILITY),
    }
}

/// Something that turns a prompt into a completion.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: String,
}

impl ChatCompletionsClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        if config.llm_api_key.is_empty() {
            warn!("ECOURTS_SLEUTH_LLM_API_KEY is empty; the endpoint will most likely refuse us");
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60).max(config.http_timeout))
            .build()?;

        Ok(Self {
            http,
            endpoint: config.llm_endpoint.clone(),
            api_key: config.llm_api_key.clone(),
            model: config.llm_model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0,
            "max_tokens": 512,
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SleuthError::Llm(format!("{status}: {}", text.trim())));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| SleuthError::Llm("completion had no choices".into()))
    }
}

/// Prompt, ask, parse.
pub async fn classify_claim(llm: &dyn LlmClient, claim: &ClaimSubmission) -> Result<FraudVerdict> {
    let prompt = build_fraud_prompt(claim)?;
    debug!(prompt_len = prompt.len(), "Sending claim for classification");

    let reply = llm.complete(&prompt).await?;
    let verdict = parse_verdict(&reply);
    info!(
        claimant = %claim.full_name,
        prediction = %verdict.prediction,
        flagged = verdict.is_flagged(),
        "Claim classified"
    );
    Ok(verdict)
}
