//! Best-effort candidate identity (name, email, phone) pulled from resume text.
//!
//! These are heuristics: a missing or wrong value never fails anything, it only
//! changes how a candidate is labelled in results.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub const UNKNOWN_CANDIDATE: &str = "Unknown Candidate";

/// Only the top of a resume is searched for the name line.
const NAME_SEARCH_LINES: usize = 8;

const MIN_PHONE_DIGITS: usize = 10;
const MAX_PHONE_DIGITS: usize = 15;

/// Whole words (or word sequences) that mark a line as a header, not a name.
const HEADER_NOISE: &[&str] = &[
    "resume",
    "résumé",
    "cv",
    "curriculum vitae",
    "phone",
    "email",
    "e-mail",
    "address",
    "mobile",
    "linkedin",
    "github",
];

const JOB_TITLE_WORDS: &[&str] = &[
    "software",
    "engineer",
    "developer",
    "manager",
    "analyst",
    "designer",
    "consultant",
    "intern",
    "architect",
    "scientist",
    "specialist",
    "administrator",
    "lead",
    "senior",
    "junior",
    "summary",
    "profile",
    "objective",
    "experience",
    "education",
    "skills",
];

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("valid email regex")
    })
}

fn phone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\+?\d[\d \t\-().]{8,16}\d").expect("valid phone regex")
    })
}

/// `2018 - 2021`, `2009-2012-2015`: employment and study ranges.
fn year_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:(?:19|20)\d{2}[\s\-]*)+$").expect("valid year run regex")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateIdentity {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl CandidateIdentity {
    pub fn from_text(text: &str) -> Self {
        let email = find_email(text);
        let name = find_name(text)
            .or_else(|| email.as_deref().and_then(name_from_email))
            .unwrap_or_else(|| UNKNOWN_CANDIDATE.to_string());
        Self {
            name,
            email,
            phone: find_phone(text),
        }
    }
}

pub fn find_email(text: &str) -> Option<String> {
    email_regex().find(text).map(|m| m.as_str().to_string())
}

pub fn find_phone(text: &str) -> Option<String> {
    phone_regex()
        .find_iter(text)
        .map(|m| m.as_str().trim().to_string())
        .find(|candidate| {
            let digits = candidate.chars().filter(char::is_ascii_digit).count();
            (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits)
                && !year_run_regex().is_match(candidate)
        })
}

/// First line near the top that looks like a personal name: two to four purely
/// alphabetic words, no header noise, no job-title vocabulary.
pub fn find_name(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(NAME_SEARCH_LINES)
        .find(|line| looks_like_name(line))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn looks_like_name(line: &str) -> bool {
    if contains_header_noise(line) {
        return false;
    }

    let words: Vec<&str> = line.split_whitespace().collect();
    if !(2..=4).contains(&words.len()) {
        return false;
    }

    words.iter().all(|word| {
        let bare = word.trim_end_matches('.');
        !bare.is_empty()
            && bare
                .chars()
                .all(|c| c.is_alphabetic() || c == '-' || c == '\'')
            && bare.chars().next().is_some_and(char::is_alphabetic)
            && !JOB_TITLE_WORDS.contains(&bare.to_lowercase().as_str())
    })
}

fn contains_header_noise(line: &str) -> bool {
    let words: Vec<String> = line
        .split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();

    HEADER_NOISE.iter().any(|noise| {
        let noise: Vec<&str> = noise.split(' ').collect();
        words
            .windows(noise.len())
            .any(|window| window.iter().zip(&noise).all(|(word, n)| word == n))
    })
}

/// `jane.doe@example.com` → `Jane Doe`.
fn name_from_email(email: &str) -> Option<String> {
    let local = email.split('@').next()?;
    let parts: Vec<String> = local
        .split(|c: char| matches!(c, '.' | '_' | '-' | '+'))
        .filter(|part| !part.is_empty() && part.chars().all(char::is_alphabetic))
        .map(capitalize)
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_found_on_first_line() {
        let text = "Jane Doe\nSenior Backend Engineer\njane.doe@example.com\n+1 415-555-0134";
        let identity = CandidateIdentity::from_text(text);
        assert_eq!(identity.name, "Jane Doe");
        assert_eq!(identity.email.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(identity.phone.as_deref(), Some("+1 415-555-0134"));
    }

    #[test]
    fn test_header_noise_and_titles_are_skipped() {
        let text = "Curriculum Vitae\nSoftware Engineer\nMaria Lopez Garcia\nSkills";
        assert_eq!(find_name(text).as_deref(), Some("Maria Lopez Garcia"));
    }

    #[test]
    fn test_name_falls_back_to_email_local_part() {
        let text = "RESUME\nContact: john_smith@example.org\nExperience: 5 years";
        let identity = CandidateIdentity::from_text(text);
        assert_eq!(identity.name, "John Smith");
    }

    #[test]
    fn test_unknown_candidate_when_nothing_matches() {
        let identity = CandidateIdentity::from_text("12345\n!!!");
        assert_eq!(identity.name, UNKNOWN_CANDIDATE);
        assert!(identity.email.is_none());
    }

    #[test]
    fn test_name_search_is_limited_to_top_lines() {
        let mut text = String::new();
        for i in 0..NAME_SEARCH_LINES {
            text.push_str(&format!("line {i}\n"));
        }
        text.push_str("Late Name\n");
        assert!(find_name(&text).is_none());
    }

    #[test]
    fn test_short_digit_runs_are_not_phones() {
        assert!(find_phone("Graduated 2019, GPA 3.8").is_none());
        assert!(find_phone("Call 555-0134").is_none());
    }

    #[test]
    fn test_year_ranges_are_not_phones() {
        let text = "Acme Corp, 2018 - 2021\nPhone: +1 415 555 0134";
        assert_eq!(find_phone(text).as_deref(), Some("+1 415 555 0134"));
        assert!(find_phone("Globex 2009-2012-2015").is_none());
        assert_eq!(
            find_phone("Mobile: +1 (415) 555-0134").as_deref(),
            Some("+1 (415) 555-0134")
        );
    }

    #[test]
    fn test_noise_words_only_match_whole_words() {
        assert_eq!(find_name("Ivan Cvetkovic\nBackend").as_deref(), Some("Ivan Cvetkovic"));
        assert_eq!(find_name("Resume Of\nAna Emailova").as_deref(), Some("Ana Emailova"));
        assert!(find_name("Curriculum Vitae").is_none());
    }
}
