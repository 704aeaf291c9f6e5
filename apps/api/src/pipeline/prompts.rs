// LLM prompt constants for candidate scoring.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

/// System prompt for candidate scoring.
pub fn scoring_system() -> String {
    format!("You are a technical recruiter evaluating resumes against job descriptions. {JSON_ONLY_SYSTEM}")
}

/// Scoring prompt template. Replace `{jd}` and `{resume_summary}` before sending.
pub const SCORING_PROMPT_TEMPLATE: &str = r#"Evaluate the candidate's resume against the job description.

Job Description:
{jd}

Candidate Summary (most relevant resume excerpts):
{resume_summary}

Return a single JSON object with EXACTLY these keys (no extra fields):
{
  "Skill Match": <integer 0-100>,
  "Project Relevance": <integer 0-100>,
  "Problem Solving": <integer 0-100>,
  "Tools": <integer 0-100>,
  "Overall Fit": <integer 0-100>,
  "Summary": "<5-6 sentences covering technical skills alignment, relevant experience, project relevance, problem-solving ability, tools proficiency and overall fit>"
}

Rules:
- Every score is an integer between 0 and 100, where 100 is a perfect match.
- Judge only from the excerpts shown. Do not invent experience the candidate does not list.
- The summary must describe this candidate specifically, not the job."#;

/// Fills both placeholders in a single pass over the template, so placeholder
/// text inside either input is never substituted again.
pub fn build_scoring_prompt(jd: &str, resume_summary: &str) -> String {
    let mut out =
        String::with_capacity(SCORING_PROMPT_TEMPLATE.len() + jd.len() + resume_summary.len());
    let mut rest = SCORING_PROMPT_TEMPLATE;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{jd}") {
            out.push_str(jd);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{resume_summary}") {
            out.push_str(resume_summary);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_substitutes_both_placeholders() {
        let prompt = build_scoring_prompt("Rust backend role", "Built tokio services");
        assert!(prompt.contains("Rust backend role"));
        assert!(prompt.contains("Built tokio services"));
        assert!(!prompt.contains("{jd}"));
        assert!(!prompt.contains("{resume_summary}"));
        assert!(prompt.contains("\"Overall Fit\""));
    }

    #[test]
    fn test_placeholder_text_in_inputs_is_left_alone() {
        let prompt = build_scoring_prompt("Mention {resume_summary} in the cover note", "Rust, tokio");
        assert!(prompt.contains("Mention {resume_summary} in the cover note"));
        assert_eq!(prompt.matches("Rust, tokio").count(), 1);

        let prompt = build_scoring_prompt("Go developer", "Wrote a {jd} parser");
        assert!(prompt.contains("Wrote a {jd} parser"));
        assert_eq!(prompt.matches("Go developer").count(), 1);
    }
}
