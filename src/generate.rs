//! Prompt construction and response parsing for the AI generation
//! endpoints.
//!
//! Every generation call asks the model for a strict two-element JSON
//! array `[sessionName, payload]`. The reply is stripped of markdown
//! code fences and validated against the payload shape for the resource
//! being generated. A reply that fails to parse or does not match the
//! shape is rejected outright; nothing is persisted and no repair or
//! re-prompt is attempted.

use std::fmt::Display;

use serde_json::Value;

use crate::error::AppError;

/// Card/question count for signed-in callers.
pub const AUTHENTICATED_CARD_COUNT: u32 = 15;
/// Card/question count for the no-signup tier.
pub const PUBLIC_CARD_COUNT: u32 = 10;

#[derive(Debug, Clone)]
pub struct GeneratedSession {
    pub name: String,
    pub payload: Value,
}

pub fn flashcard_prompt(count: u32) -> String {
    format!(
        "You are a study assistant that writes flashcards.\n\
         Given the study material in the next message, create exactly {count} flashcards \
         covering its most important points.\n\
         Respond with ONLY a JSON array of exactly two elements and nothing else:\n\
         [\"short session name\", [{{\"question\": \"...\", \"answer\": \"...\"}}, ...]]\n\
         Do not wrap the JSON in markdown code fences."
    )
}

pub fn quiz_prompt(count: u32) -> String {
    format!(
        "You are a study assistant that writes multiple-choice quizzes.\n\
         Given the study material in the next message, create exactly {count} questions.\n\
         Each question needs at least four answer options labelled A through D, \
         the letter of the correct option, and a short explanation.\n\
         Respond with ONLY a JSON array of exactly two elements and nothing else:\n\
         [\"short session name\", [{{\"question\": \"...\", \"options\": [\"A) ...\", \"B) ...\", \
         \"C) ...\", \"D) ...\"], \"answer\": \"A\", \"explanation\": \"...\"}}, ...]]\n\
         Do not wrap the JSON in markdown code fences."
    )
}

pub fn summary_prompt() -> String {
    "You are a study assistant that writes concise summaries.\n\
     Summarize the study material in the next message, keeping key terms and definitions.\n\
     Respond with ONLY a JSON array of exactly two elements and nothing else:\n\
     [\"short session name\", \"the summary text\"]\n\
     Do not wrap the JSON in markdown code fences."
        .to_string()
}

pub fn chat_system_prompt(transcript: &str) -> String {
    format!(
        "You are a study assistant helping a student understand their material. \
         Answer questions using the material below. If the answer is not in the \
         material, say so instead of guessing.\n\nMaterial:\n{transcript}"
    )
}

/// Removes a surrounding markdown code fence, language tag included.
/// Models add one often enough despite the prompt that it has to be
/// tolerated.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

pub fn parse_flashcards(raw: &str) -> Result<GeneratedSession, AppError> {
    let (name, payload) = parse_pair(raw)?;
    let Some(cards) = payload.as_array() else {
        return Err(format_error("flashcards payload must be an array"));
    };
    for card in cards {
        let Some(card) = card.as_object() else {
            return Err(format_error("each flashcard must be an object"));
        };
        ensure_string_field(card, "question", "flashcard")?;
        ensure_string_field(card, "answer", "flashcard")?;
    }
    Ok(GeneratedSession { name, payload })
}

pub fn parse_quiz(raw: &str) -> Result<GeneratedSession, AppError> {
    let (name, payload) = parse_pair(raw)?;
    let Some(questions) = payload.as_array() else {
        return Err(format_error("quiz payload must be an array"));
    };
    for question in questions {
        let Some(question) = question.as_object() else {
            return Err(format_error("each quiz question must be an object"));
        };
        ensure_string_field(question, "question", "quiz question")?;
        ensure_string_field(question, "answer", "quiz question")?;
        ensure_string_field(question, "explanation", "quiz question")?;
        let Some(options) = question.get("options").and_then(Value::as_array) else {
            return Err(format_error("quiz question field `options` must be an array"));
        };
        if options.len() < 4 {
            return Err(format_error("quiz question needs at least four options"));
        }
        if options.iter().any(|option| !option.is_string()) {
            return Err(format_error("quiz options must all be strings"));
        }
        let answer = question.get("answer").and_then(Value::as_str).unwrap_or_default();
        if !answer_in_range(answer, options.len()) {
            return Err(format_error(
                "quiz answer letter must reference one of the options",
            ));
        }
    }
    Ok(GeneratedSession { name, payload })
}

// "B", "b", and "B) 4" all count as option index 1.
fn answer_in_range(answer: &str, option_count: usize) -> bool {
    let Some(letter) = answer.trim().chars().next() else {
        return false;
    };
    let letter = letter.to_ascii_uppercase();
    letter.is_ascii_uppercase() && (letter as usize - 'A' as usize) < option_count
}

pub fn parse_summary(raw: &str) -> Result<GeneratedSession, AppError> {
    let (name, payload) = parse_pair(raw)?;
    if !payload.is_string() {
        return Err(format_error("summary payload must be a string"));
    }
    Ok(GeneratedSession { name, payload })
}

fn parse_pair(raw: &str) -> Result<(String, Value), AppError> {
    let cleaned = strip_code_fences(raw);
    let value: Value = serde_json::from_str(cleaned)
        .map_err(|err| format_error(format!("invalid JSON: {err}")))?;
    let Value::Array(mut items) = value else {
        return Err(format_error("expected a two-element JSON array"));
    };
    if items.len() != 2 {
        return Err(format_error(format!(
            "expected exactly two elements, got {}",
            items.len()
        )));
    }
    let (Some(payload), Some(name)) = (items.pop(), items.pop()) else {
        return Err(format_error("expected a two-element JSON array"));
    };
    let Value::String(name) = name else {
        return Err(format_error("session name must be a string"));
    };
    Ok((name, payload))
}

fn ensure_string_field(
    object: &serde_json::Map<String, Value>,
    field: &str,
    what: &str,
) -> Result<(), AppError> {
    match object.get(field) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(format_error(format!("{what} field `{field}` must be a string"))),
        None => Err(format_error(format!("{what} is missing field `{field}`"))),
    }
}

fn format_error(detail: impl Display) -> AppError {
    AppError::internal(format!(
        "model response did not match the generation contract: {detail}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    fn flashcard_reply() -> String {
        json!([
            "Cell Biology",
            [
                {"question": "What organelle produces ATP?", "answer": "The mitochondrion"},
                {"question": "Where is DNA stored?", "answer": "The nucleus"}
            ]
        ])
        .to_string()
    }

    #[test]
    fn strips_fences_with_language_tag() {
        let raw = "```json\n[\"a\", []]\n```";
        assert_eq!(strip_code_fences(raw), "[\"a\", []]");
    }

    #[test]
    fn strips_bare_fences_and_whitespace() {
        let raw = "  ```\n[\"a\", []]\n```  ";
        assert_eq!(strip_code_fences(raw), "[\"a\", []]");
    }

    #[test]
    fn leaves_unfenced_text_alone() {
        assert_eq!(strip_code_fences(" [1, 2] "), "[1, 2]");
    }

    #[test]
    fn parses_a_valid_flashcard_reply() {
        let session = parse_flashcards(&flashcard_reply()).unwrap();
        assert_eq!(session.name, "Cell Biology");
        assert_eq!(session.payload.as_array().unwrap().len(), 2);
    }

    #[test]
    fn parses_a_fenced_flashcard_reply() {
        let fenced = format!("```json\n{}\n```", flashcard_reply());
        let session = parse_flashcards(&fenced).unwrap();
        assert_eq!(session.name, "Cell Biology");
    }

    #[test]
    fn rejects_non_json_replies() {
        let err = parse_flashcards("Sure! Here are your flashcards:").unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejects_wrong_arity() {
        let err = parse_flashcards(&json!(["only a name"]).to_string()).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let err = parse_flashcards(&json!(["name", [], "extra"]).to_string()).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejects_non_string_session_name() {
        let err = parse_flashcards(&json!([42, []]).to_string()).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn rejects_cards_with_missing_or_mistyped_fields() {
        let missing = json!(["name", [{"question": "q"}]]).to_string();
        assert!(parse_flashcards(&missing).is_err());
        let mistyped = json!(["name", [{"question": "q", "answer": 3}]]).to_string();
        assert!(parse_flashcards(&mistyped).is_err());
    }

    #[test]
    fn parses_a_valid_quiz_reply() {
        let raw = json!([
            "Quiz",
            [{
                "question": "2 + 2?",
                "options": ["A) 3", "B) 4", "C) 5", "D) 22"],
                "answer": "B",
                "explanation": "Basic arithmetic."
            }]
        ])
        .to_string();
        let session = parse_quiz(&raw).unwrap();
        assert_eq!(session.name, "Quiz");
    }

    #[test]
    fn rejects_quiz_with_too_few_options() {
        let raw = json!([
            "Quiz",
            [{
                "question": "2 + 2?",
                "options": ["A) 3", "B) 4", "C) 5"],
                "answer": "B",
                "explanation": "Basic arithmetic."
            }]
        ])
        .to_string();
        assert!(parse_quiz(&raw).is_err());
    }

    #[test]
    fn rejects_quiz_with_non_string_options() {
        let raw = json!([
            "Quiz",
            [{
                "question": "2 + 2?",
                "options": ["A) 3", 4, "C) 5", "D) 6"],
                "answer": "B",
                "explanation": "Basic arithmetic."
            }]
        ])
        .to_string();
        assert!(parse_quiz(&raw).is_err());
    }

    #[test]
    fn rejects_quiz_answer_outside_the_options() {
        let raw = json!([
            "Quiz",
            [{
                "question": "2 + 2?",
                "options": ["A) 3", "B) 4", "C) 5", "D) 22"],
                "answer": "E",
                "explanation": "Basic arithmetic."
            }]
        ])
        .to_string();
        assert!(parse_quiz(&raw).is_err());
    }

    #[test]
    fn accepts_lowercase_and_decorated_answer_letters() {
        for answer in ["b", "B) 4"] {
            let raw = json!([
                "Quiz",
                [{
                    "question": "2 + 2?",
                    "options": ["A) 3", "B) 4", "C) 5", "D) 22"],
                    "answer": answer,
                    "explanation": "Basic arithmetic."
                }]
            ])
            .to_string();
            assert!(parse_quiz(&raw).is_ok(), "answer {answer:?} should parse");
        }
    }

    #[test]
    fn rejects_quiz_missing_explanation() {
        let raw = json!([
            "Quiz",
            [{
                "question": "2 + 2?",
                "options": ["A) 3", "B) 4", "C) 5", "D) 22"],
                "answer": "B"
            }]
        ])
        .to_string();
        assert!(parse_quiz(&raw).is_err());
    }

    #[test]
    fn parses_a_valid_summary_reply() {
        let raw = json!(["Notes", "Mitochondria make ATP."]).to_string();
        let session = parse_summary(&raw).unwrap();
        assert_eq!(session.payload, json!("Mitochondria make ATP."));
    }

    #[test]
    fn rejects_summary_with_non_string_payload() {
        let raw = json!(["Notes", ["not", "a", "string"]]).to_string();
        assert!(parse_summary(&raw).is_err());
    }

    #[test]
    fn prompts_embed_the_requested_count() {
        assert!(flashcard_prompt(AUTHENTICATED_CARD_COUNT).contains("15"));
        assert!(quiz_prompt(PUBLIC_CARD_COUNT).contains("10"));
    }
}
