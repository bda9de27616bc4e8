//! Answer scoring per question type

use quizbank_core::{AnswerKey, Question, QuizbankResult};
use serde_json::Value;
use std::collections::HashSet;

/// Judge a submitted answer against the question's key.
///
/// Choice questions take an array of option ids and need the exact set of
/// correct ids, in any order. True/false takes a boolean. Fill-in-the-blank
/// takes an array of strings matching every blank in order, case-sensitive.
/// Written answers are always accepted and graded by hand.
pub fn score(question: &Question, answer: &Value) -> QuizbankResult<bool> {
    match &question.answer {
        AnswerKey::Choice(_) => {
            let submitted = option_ids(answer)?;
            let correct: HashSet<i64> = question.answer.correct_option_ids().into_iter().collect();
            Ok(submitted == correct)
        }
        AnswerKey::TrueFalse(expected) => match answer {
            Value::Bool(value) => Ok(value == expected),
            _ => Err(shape_error("a boolean")),
        },
        AnswerKey::FillInTheBlank(blanks) => {
            let submitted = blank_texts(answer)?;
            Ok(submitted.len() == blanks.len()
                && submitted
                    .iter()
                    .zip(blanks)
                    .all(|(given, blank)| *given == blank.blank_text))
        }
        AnswerKey::Written(_) => Ok(true),
    }
}

fn option_ids(answer: &Value) -> QuizbankResult<HashSet<i64>> {
    let items = answer
        .as_array()
        .ok_or_else(|| shape_error("an array of option ids"))?;
    items
        .iter()
        .map(|item| item.as_i64().ok_or_else(|| shape_error("an array of option ids")))
        .collect()
}

fn blank_texts(answer: &Value) -> QuizbankResult<Vec<&str>> {
    let items = answer
        .as_array()
        .ok_or_else(|| shape_error("an array of strings"))?;
    items
        .iter()
        .map(|item| item.as_str().ok_or_else(|| shape_error("an array of strings")))
        .collect()
}

fn shape_error(expected: &str) -> quizbank_core::QuizbankError {
    quizbank_core::validation_error!(
        format!("answer must be {}", expected),
        "answer",
        "scoring"
    )
}
