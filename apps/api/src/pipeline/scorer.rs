//! LLM Scorer: turns (job description, candidate summary) into a fixed-schema verdict.
//!
//! Degrade, don't fail: `score` always returns a complete [`ScoreResult`]. When the
//! model is unreachable, throttled, misconfigured, or replies with something that
//! isn't the expected JSON, every numeric field gets the configured fallback value
//! and the summary carries a marker saying which subsystem was at fault.
//!
//! `AppState` holds an `Arc<dyn CandidateScorer>`; tests swap in scripted providers.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use super::prompts::{build_scoring_prompt, scoring_system};
use crate::llm_client::prompts::truncate_chars;
use crate::llm_client::{strip_json_fences, CompletionProvider, LlmError};

pub const PARSE_FAILURE_MARKER: &str = "[parse-failure]";
pub const RATE_LIMITED_MARKER: &str = "[rate-limited]";
pub const UNAVAILABLE_MARKER: &str = "[scoring-unavailable]";
pub const MISSING_SUMMARY: &str = "No summary provided by the scoring model.";

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ScoringConfig {
    /// Substituted into all five numeric fields of a degraded result.
    pub fallback_score: u8,
    pub jd_char_budget: usize,
    pub summary_char_budget: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fallback_score: 50,
            jd_char_budget: 2000,
            summary_char_budget: 2000,
        }
    }
}

/// Why a result carries fallback values, if it does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Degradation {
    #[default]
    None,
    ParseFailure,
    RateLimited,
    Unavailable,
}

impl Degradation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Degradation::None => "none",
            Degradation::ParseFailure => "parse_failure",
            Degradation::RateLimited => "rate_limited",
            Degradation::Unavailable => "unavailable",
        }
    }

    fn marker(&self) -> Option<&'static str> {
        match self {
            Degradation::None => None,
            Degradation::ParseFailure => Some(PARSE_FAILURE_MARKER),
            Degradation::RateLimited => Some(RATE_LIMITED_MARKER),
            Degradation::Unavailable => Some(UNAVAILABLE_MARKER),
        }
    }
}

impl FromStr for Degradation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Degradation::None),
            "parse_failure" => Ok(Degradation::ParseFailure),
            "rate_limited" => Ok(Degradation::RateLimited),
            "unavailable" => Ok(Degradation::Unavailable),
            other => Err(format!("unknown degradation: {other}")),
        }
    }
}

/// The fixed-schema verdict. All five scores are on the canonical 0–100 scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub skill_match: u8,
    pub project_relevance: u8,
    pub problem_solving: u8,
    pub tools: u8,
    pub overall_fit: u8,
    pub summary: String,
    pub degradation: Degradation,
}

impl ScoreResult {
    pub fn degraded(kind: Degradation, fallback_score: u8, detail: &str) -> Self {
        let score = fallback_score.min(100);
        let marker = kind.marker().unwrap_or_default();
        let explanation = match kind {
            Degradation::None | Degradation::ParseFailure => {
                "The scoring model replied, but not in the expected format"
            }
            Degradation::RateLimited => "The scoring model provider throttled this request",
            Degradation::Unavailable => "The scoring service could not be reached",
        };
        let mut summary = format!(
            "{marker} {explanation}; fallback scores of {score} were substituted and do not reflect this candidate."
        );
        if !detail.is_empty() {
            summary.push_str(&format!(" ({detail})"));
        }
        Self {
            skill_match: score,
            project_relevance: score,
            problem_solving: score,
            tools: score,
            overall_fit: score,
            summary: summary.trim().to_string(),
            degradation: kind,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degradation != Degradation::None
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Scores one candidate. Infallible by contract: failures become degraded results.
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    async fn score(&self, job_description: &str, candidate_summary: &str) -> ScoreResult;
}

// ────────────────────────────────────────────────────────────────────────────
// LlmScorer
// ────────────────────────────────────────────────────────────────────────────

pub struct LlmScorer {
    provider: Arc<dyn CompletionProvider>,
    config: ScoringConfig,
}

impl LlmScorer {
    pub fn new(provider: Arc<dyn CompletionProvider>, config: ScoringConfig) -> Self {
        Self { provider, config }
    }

    fn degrade(&self, kind: Degradation, detail: &str) -> ScoreResult {
        ScoreResult::degraded(kind, self.config.fallback_score, detail)
    }
}

#[async_trait]
impl CandidateScorer for LlmScorer {
    async fn score(&self, job_description: &str, candidate_summary: &str) -> ScoreResult {
        let jd = truncate_chars(job_description, self.config.jd_char_budget);
        let summary = truncate_chars(candidate_summary, self.config.summary_char_budget);
        let prompt = build_scoring_prompt(&jd, &summary);

        let raw = match self.provider.complete(&prompt, &scoring_system()).await {
            Ok(raw) => raw,
            Err(e) => {
                let kind = classify_llm_error(&e);
                warn!(
                    "Scoring call to {} failed ({}): {}",
                    self.provider.model(),
                    kind.as_str(),
                    e
                );
                return self.degrade(kind, "");
            }
        };

        match parse_verdict(&raw) {
            Ok(result) => result,
            Err(e) => {
                warn!("Scoring reply could not be parsed: {}", e);
                debug!("Unparseable scoring reply: {}", truncate_chars(&raw, 500));
                self.degrade(Degradation::ParseFailure, "")
            }
        }
    }
}

/// Maps a provider error to the degradation it should be reported as.
pub fn classify_llm_error(error: &LlmError) -> Degradation {
    match error {
        e if e.is_rate_limit() => Degradation::RateLimited,
        LlmError::EmptyContent => Degradation::ParseFailure,
        _ => Degradation::Unavailable,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Verdict parsing
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq)]
pub enum VerdictError {
    #[error("no JSON object found in reply")]
    NoObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing or non-numeric field \"{0}\"")]
    MissingField(&'static str),
}

const FIELD_SKILL_MATCH: &str = "Skill Match";
const FIELD_PROJECT_RELEVANCE: &str = "Project Relevance";
const FIELD_PROBLEM_SOLVING: &str = "Problem Solving";
const FIELD_TOOLS: &str = "Tools";
const FIELD_OVERALL_FIT: &str = "Overall Fit";
const FIELD_SUMMARY: &str = "Summary";

/// Parses a model reply into a non-degraded [`ScoreResult`].
///
/// Tolerates `<think>` preambles, code fences and prose around the object. Keys
/// match case- and separator-insensitively (`"Skill Match"` == `"skill_match"`).
pub fn parse_verdict(raw: &str) -> Result<ScoreResult, VerdictError> {
    let without_think = strip_think_blocks(raw);
    let unfenced = strip_json_fences(&without_think);
    let object_text = first_json_object(unfenced).ok_or(VerdictError::NoObject)?;

    let value: Value =
        serde_json::from_str(object_text).map_err(|e| VerdictError::InvalidJson(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(VerdictError::NoObject);
    };

    let score = |field: &'static str| {
        lookup(&map, field)
            .and_then(score_value)
            .ok_or(VerdictError::MissingField(field))
    };

    let summary = lookup(&map, FIELD_SUMMARY)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(MISSING_SUMMARY)
        .to_string();

    Ok(ScoreResult {
        skill_match: score(FIELD_SKILL_MATCH)?,
        project_relevance: score(FIELD_PROJECT_RELEVANCE)?,
        problem_solving: score(FIELD_PROBLEM_SOLVING)?,
        tools: score(FIELD_TOOLS)?,
        overall_fit: score(FIELD_OVERALL_FIT)?,
        summary,
        degradation: Degradation::None,
    })
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn lookup<'a>(map: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    map.get(field).or_else(|| {
        let wanted = normalize_key(field);
        map.iter()
            .find(|(key, _)| normalize_key(key) == wanted)
            .map(|(_, value)| value)
    })
}

/// Accepts `85`, `85.4`, `"85"`, `"85%"`, `"85/100"` and `"8.5/10"`; clamps to 0–100.
fn score_value(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => parse_numeric_string(s)?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.clamp(0.0, 100.0).round() as u8)
}

fn parse_numeric_string(s: &str) -> Option<f64> {
    let s = s.trim().trim_end_matches('%').trim();
    match s.split_once('/') {
        Some((numerator, denominator)) => {
            let n: f64 = numerator.trim().parse().ok()?;
            let d: f64 = denominator.trim().parse().ok()?;
            (d > 0.0).then(|| n / d * 100.0)
        }
        None => s.parse().ok(),
    }
}

/// Removes `<think>...</think>` reasoning blocks some models emit before the answer.
fn strip_think_blocks(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("<think>") {
        out.push_str(&rest[..start]);
        match rest[start..].find("</think>") {
            Some(end) => rest = &rest[start + end + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// The first balanced `{...}` in `text`, skipping braces inside JSON strings.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays canned responses in order.
    struct ScriptedProvider {
        replies: Mutex<Vec<Result<String, LlmError>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<String, LlmError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into_iter().rev().collect()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _prompt: &str, _system: &str) -> Result<String, LlmError> {
            self.replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(Err(LlmError::EmptyContent))
        }
    }

    const GOOD_REPLY: &str = r#"{
        "Skill Match": 82,
        "Project Relevance": 75,
        "Problem Solving": 70,
        "Tools": 88,
        "Overall Fit": 80,
        "Summary": "Strong Python and PostgreSQL background."
    }"#;

    fn scorer(replies: Vec<Result<String, LlmError>>) -> LlmScorer {
        LlmScorer::new(ScriptedProvider::new(replies), ScoringConfig::default())
    }

    fn assert_complete(result: &ScoreResult) {
        for value in [
            result.skill_match,
            result.project_relevance,
            result.problem_solving,
            result.tools,
            result.overall_fit,
        ] {
            assert!(value <= 100);
        }
        assert!(!result.summary.is_empty());
    }

    #[tokio::test]
    async fn test_well_formed_reply_is_parsed() {
        let result = scorer(vec![Ok(GOOD_REPLY.to_string())])
            .score("JD", "summary")
            .await;
        assert_eq!(result.skill_match, 82);
        assert_eq!(result.overall_fit, 80);
        assert_eq!(result.degradation, Degradation::None);
        assert_eq!(result.summary, "Strong Python and PostgreSQL background.");
    }

    #[tokio::test]
    async fn test_not_json_reply_degrades_to_fallback() {
        let result = scorer(vec![Ok("not json".to_string())])
            .score("JD", "summary")
            .await;
        assert_complete(&result);
        assert_eq!(result.degradation, Degradation::ParseFailure);
        assert!(result.summary.contains(PARSE_FAILURE_MARKER));
        for value in [
            result.skill_match,
            result.project_relevance,
            result.problem_solving,
            result.tools,
            result.overall_fit,
        ] {
            assert_eq!(value, 50);
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_labelled() {
        let result = scorer(vec![Err(LlmError::RateLimited { retries: 3 })])
            .score("JD", "summary")
            .await;
        assert_complete(&result);
        assert_eq!(result.degradation, Degradation::RateLimited);
        assert!(result.summary.starts_with(RATE_LIMITED_MARKER));
    }

    #[tokio::test]
    async fn test_timeout_and_auth_failures_are_unavailable() {
        let timeout = scorer(vec![Err(LlmError::Timeout(std::time::Duration::from_secs(60)))])
            .score("JD", "summary")
            .await;
        assert_eq!(timeout.degradation, Degradation::Unavailable);
        assert!(timeout.summary.contains(UNAVAILABLE_MARKER));

        let unauthorized = scorer(vec![Err(LlmError::Unauthorized { status: 401 })])
            .score("JD", "summary")
            .await;
        assert_eq!(unauthorized.degradation, Degradation::Unavailable);
        assert_complete(&unauthorized);
    }

    #[tokio::test]
    async fn test_fallback_score_is_configurable() {
        let scorer = LlmScorer::new(
            ScriptedProvider::new(vec![Err(LlmError::NotConfigured("no key".into()))]),
            ScoringConfig {
                fallback_score: 65,
                ..ScoringConfig::default()
            },
        );
        let result = scorer.score("JD", "summary").await;
        assert_eq!(result.overall_fit, 65);
        assert_eq!(result.degradation, Degradation::Unavailable);
    }

    #[test]
    fn test_parse_tolerates_think_fences_and_prose() {
        let raw = format!(
            "<think>weighing the candidate {{}}</think>Here is my verdict:\n```json\n{GOOD_REPLY}\n```\nThanks!"
        );
        let result = parse_verdict(&raw).unwrap();
        assert_eq!(result.tools, 88);
    }

    #[test]
    fn test_parse_accepts_numeric_strings_and_clamps() {
        let raw = r#"{"skill_match": "85/100", "project relevance": "7/10", "Problem Solving": "64.6",
                     "Tools": 140, "Overall Fit": -3, "Summary": "ok"}"#;
        let result = parse_verdict(raw).unwrap();
        assert_eq!(result.skill_match, 85);
        assert_eq!(result.project_relevance, 70);
        assert_eq!(result.problem_solving, 65);
        assert_eq!(result.tools, 100);
        assert_eq!(result.overall_fit, 0);
    }

    #[test]
    fn test_parse_missing_field_fails() {
        let raw = r#"{"Skill Match": 80, "Project Relevance": 70, "Problem Solving": 60, "Tools": 50, "Summary": "x"}"#;
        assert_eq!(
            parse_verdict(raw),
            Err(VerdictError::MissingField(FIELD_OVERALL_FIT))
        );
    }

    #[test]
    fn test_parse_empty_summary_gets_placeholder() {
        let raw = r#"{"Skill Match": 1, "Project Relevance": 2, "Problem Solving": 3, "Tools": 4, "Overall Fit": 5, "Summary": "  "}"#;
        assert_eq!(parse_verdict(raw).unwrap().summary, MISSING_SUMMARY);
    }

    #[test]
    fn test_first_json_object_skips_braces_in_strings() {
        let text = r#"prefix {"a": "}{", "b": {"c": 1}} suffix {"d": 2}"#;
        assert_eq!(
            first_json_object(text),
            Some(r#"{"a": "}{", "b": {"c": 1}}"#)
        );
    }

    #[test]
    fn test_degradation_round_trips_through_str() {
        for kind in [
            Degradation::None,
            Degradation::ParseFailure,
            Degradation::RateLimited,
            Degradation::Unavailable,
        ] {
            assert_eq!(kind.as_str().parse::<Degradation>(), Ok(kind));
        }
    }
}
