//! Prompt construction and reply parsing for the logic backend
//!
//! Replies are read with the structured `logic-assessment/v1` JSON contract
//! first. The `SCORE: X/10` pattern match is a best-effort adapter for
//! models that ignore the contract and answer in free text.

use crate::evaluator::clamp_logic_score;
use codegrade_common::types::{Concern, TestCase};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt::Write;

pub const CONTRACT_VERSION: &str = "logic-assessment/v1";
/// Only the first few test cases are shown to the model
pub const MAX_PROMPT_TEST_CASES: usize = 3;
const MAX_PROMPT_CODE_CHARS: usize = 12_000;
/// How far back to look for a negation before a concern keyword
const NEGATION_WINDOW_CHARS: usize = 24;

lazy_static! {
    static ref LEGACY_SCORE: Regex =
        Regex::new(r"(?i)score\s*[:=]?\s*\**\s*(\d+(?:\.\d+)?)\s*/\s*10(?:\.0*)?(?:[^\d.]|$)").unwrap();
    static ref HARD_CODED: Regex = Regex::new(
        r"(?i)hard[\s_-]?cod(?:ed|ing|es|e)\b|special[\s-]?cas(?:es|ed|ing|e)\s+(?:the\s+)?(?:expected|test)|prints?\s+(?:the\s+)?expected\s+outputs?\s+directly"
    )
    .unwrap();
    static ref INEFFICIENT: Regex =
        Regex::new(r"(?i)\binefficien(?:t|cy)\b|brute[\s-]?force|\bO\(\s*n\s*\^\s*[2-9]\s*\)|\bO\(\s*2\s*\^\s*n\s*\)").unwrap();
    static ref SYNTAX_ERROR: Regex = Regex::new(r"(?i)\bsyntax\s+errors?\b").unwrap();
    static ref NEGATED: Regex = Regex::new(r"(?i)\b(?:not|no|never|without|isn't|aren't)\b[\w\s-]*$").unwrap();
}

/// Reply as understood by the analyzer; `score` is already clamped
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReply {
    pub score: f64,
    pub rationale: String,
    pub concerns: BTreeSet<Concern>,
}

#[derive(Deserialize)]
struct StructuredReply {
    #[serde(default)]
    schema: Option<String>,
    score: f64,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    concerns: Vec<String>,
}

pub fn build_prompt(code: &str, language: &str, test_cases: &[TestCase]) -> String {
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are grading a student's {} submission for ALGORITHMIC APPROACH, not for output correctness.",
        language
    );
    prompt.push_str(
        "\nRubric (score out of 10):\n\
         - 10: correct, clean and efficient approach\n\
         - 7-9: correct algorithm, even if the code has syntax errors or small bugs\n\
         - 5-6: mostly right idea with significant gaps\n\
         - 2-4: wrong approach, but shows some understanding of the problem\n\
         - 0-1: blank, nonsense, or unrelated code\n\
         Award partial credit for a correct approach even when the code would not compile.\n\
         If the code prints the expected outputs directly instead of computing them, say it is hard-coded.\n",
    );

    let code: String = code.chars().take(MAX_PROMPT_CODE_CHARS).collect();
    let _ = write!(prompt, "\nCode ({}):\n```\n{}\n```\n", language, code);

    if !test_cases.is_empty() {
        prompt.push_str("\nSample test cases:\n");
        for (i, tc) in test_cases.iter().take(MAX_PROMPT_TEST_CASES).enumerate() {
            let _ = writeln!(
                prompt,
                "{}. input: {:?} expected output: {:?}",
                i + 1,
                tc.input,
                tc.expected
            );
        }
    }

    let _ = write!(
        prompt,
        "\nRespond with ONLY a JSON object of this exact shape:\n\
         {{\"schema\": \"{}\", \"score\": <number 0-10>, \"rationale\": \"<short explanation>\", \
         \"concerns\": [<zero or more of \"hard_coded\", \"inefficient\", \"syntax_error\">]}}\n\
         If you cannot produce JSON, end your answer with a line of the form SCORE: X/10.\n",
        CONTRACT_VERSION
    );

    prompt
}

fn concern_tag(tag: &str) -> Option<Concern> {
    match tag.trim().to_ascii_lowercase().replace(&['-', ' '][..], "_").as_str() {
        "hard_coded" | "hardcoded" => Some(Concern::HardCoded),
        "inefficient" | "inefficiency" => Some(Concern::Inefficient),
        "syntax_error" | "syntax_errors" => Some(Concern::SyntaxError),
        _ => None,
    }
}

fn mentions(pattern: &Regex, text: &str) -> bool {
    pattern.find_iter(text).any(|m| {
        let before = &text[..m.start()];
        let window_start = before
            .char_indices()
            .rev()
            .nth(NEGATION_WINDOW_CHARS - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        !NEGATED.is_match(&before[window_start..])
    })
}

/// Concern tags raised by keywords in free text. Negated mentions
/// ("not hard-coded") are ignored.
pub fn detect_concerns(text: &str) -> BTreeSet<Concern> {
    let mut concerns = BTreeSet::new();
    if mentions(&HARD_CODED, text) {
        concerns.insert(Concern::HardCoded);
    }
    if mentions(&INEFFICIENT, text) {
        concerns.insert(Concern::Inefficient);
    }
    if mentions(&SYNTAX_ERROR, text) {
        concerns.insert(Concern::SyntaxError);
    }
    concerns
}

fn parse_structured(text: &str) -> Option<ParsedReply> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let reply: StructuredReply = serde_json::from_str(&text[start..=end]).ok()?;
    if reply.schema.as_deref().is_some_and(|s| s != CONTRACT_VERSION) {
        return None;
    }

    let mut concerns: BTreeSet<Concern> = reply.concerns.iter().filter_map(|c| concern_tag(c)).collect();
    concerns.extend(detect_concerns(&reply.rationale));

    Some(ParsedReply {
        score: clamp_logic_score(reply.score),
        rationale: reply.rationale.trim().to_string(),
        concerns,
    })
}

fn parse_legacy(text: &str) -> Option<ParsedReply> {
    let raw: f64 = LEGACY_SCORE.captures(text)?.get(1)?.as_str().parse().ok()?;
    Some(ParsedReply {
        score: clamp_logic_score(raw),
        rationale: text.trim().to_string(),
        concerns: detect_concerns(text),
    })
}

/// `None` when neither the JSON contract nor the legacy pattern matches
pub fn parse_reply(text: &str) -> Option<ParsedReply> {
    parse_structured(text).or_else(|| parse_legacy(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_caps_test_cases_and_names_contract() {
        let tests: Vec<TestCase> = (0..5).map(|i| TestCase::new(format!("in{}", i), format!("out{}", i))).collect();
        let prompt = build_prompt("print(1)", "python", &tests);
        assert!(prompt.contains("in2"));
        assert!(!prompt.contains("in3"));
        assert!(prompt.contains(CONTRACT_VERSION));
        assert!(prompt.contains("7-9: correct algorithm"));
        assert!(prompt.contains("print(1)"));
    }

    #[test]
    fn test_structured_reply() {
        let reply = parse_reply(
            r#"```json
{"schema":"logic-assessment/v1","score":8.26,"rationale":"Sound loop, brute force though.","concerns":["hard-coded"]}
```"#,
        )
        .unwrap();
        assert_eq!(reply.score, 8.3);
        assert_eq!(reply.rationale, "Sound loop, brute force though.");
        assert!(reply.concerns.contains(&Concern::HardCoded));
        assert!(reply.concerns.contains(&Concern::Inefficient));
    }

    #[test]
    fn test_structured_score_is_clamped() {
        let reply = parse_reply(r#"{"score": 14, "rationale": "great"}"#).unwrap();
        assert_eq!(reply.score, 10.0);
        let reply = parse_reply(r#"{"score": -2, "rationale": "bad"}"#).unwrap();
        assert_eq!(reply.score, 0.0);
    }

    #[test]
    fn test_unknown_schema_falls_back_to_legacy() {
        let text = r#"{"schema":"other/v9","score":3} SCORE: 6/10"#;
        assert_eq!(parse_reply(text).unwrap().score, 6.0);
    }

    #[test]
    fn test_legacy_score_variants() {
        assert_eq!(parse_reply("Looks fine.\nSCORE: 7/10").unwrap().score, 7.0);
        assert_eq!(parse_reply("**Score:** 8.5 / 10").unwrap().score, 8.5);
        assert_eq!(parse_reply("score=4/10").unwrap().score, 4.0);
        assert_eq!(parse_reply("SCORE: 12/10").unwrap().score, 10.0);
        assert_eq!(parse_reply("Final SCORE: 6/10.").unwrap().score, 6.0);
    }

    #[test]
    fn test_legacy_score_out_of_hundred_is_not_read_as_tenths() {
        assert!(parse_reply("SCORE: 85/100").is_none());
        assert!(parse_reply("score: 9 / 10.5").is_none());
    }

    #[test]
    fn test_unparseable_reply() {
        assert!(parse_reply("I think this is pretty good.").is_none());
        assert!(parse_reply("").is_none());
    }

    #[test]
    fn test_hard_coded_keywords() {
        assert!(detect_concerns("The solution is hard-coded for the samples").contains(&Concern::HardCoded));
        assert!(detect_concerns("It hardcodes the answers").contains(&Concern::HardCoded));
        assert!(detect_concerns("It special-cases the expected outputs").contains(&Concern::HardCoded));
        assert!(!detect_concerns("The answer is not hard-coded at all").contains(&Concern::HardCoded));
        assert!(detect_concerns("").is_empty());
    }

    #[test]
    fn test_other_concern_keywords() {
        let concerns = detect_concerns("Correct idea but a syntax error on line 3; O(n^2) brute force.");
        assert!(concerns.contains(&Concern::SyntaxError));
        assert!(concerns.contains(&Concern::Inefficient));
        assert!(!concerns.contains(&Concern::HardCoded));
    }
}
