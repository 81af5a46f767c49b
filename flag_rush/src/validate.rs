//! Structural validation and sanitization of client-supplied values.
//!
//! Policy checks (host-only, phase constraints) stay in the handlers; this
//! module only decides whether a value is shaped correctly and normalizes it.
//! Failures surface as `VALIDATION_ERROR` frames and never close the
//! connection.

use crate::constants::{
    MAX_ANSWER_LEN, MAX_USERNAME_LEN, MIN_USERNAME_LEN, RESERVED_USERNAMES,
};
use crate::errors::{AppError, AppResult};
use crate::room::SettingsPatch;

/// Sanitize and validate a username.
///
/// The value is trimmed, HTML-stripped, and whitespace-collapsed, then
/// checked against the allowed character classes (Unicode letters and digits
/// plus space, `-`, `_`, `.`), the length bounds, and the reserved-word list.
pub fn username(raw: &str) -> AppResult<String> {
    let cleaned = collapse_whitespace(&strip_html(raw));

    if cleaned.chars().count() < MIN_USERNAME_LEN
        || cleaned.chars().count() > MAX_USERNAME_LEN
    {
        return Err(AppError::validation(format!(
            "username must be {MIN_USERNAME_LEN}-{MAX_USERNAME_LEN} characters"
        )));
    }

    if !cleaned
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_' | '.'))
    {
        return Err(AppError::validation(
            "username contains unsupported characters",
        ));
    }

    let folded = cleaned.to_lowercase();
    if RESERVED_USERNAMES.iter().any(|w| folded.contains(w)) {
        return Err(AppError::validation("username contains a reserved word"));
    }

    Ok(cleaned)
}

/// Case-fold and validate an invite code: exactly six uppercase
/// alphanumerics.
pub fn invite_code(raw: &str) -> AppResult<String> {
    let code = raw.trim().to_uppercase();
    if code.len() != crate::constants::INVITE_CODE_LEN
        || !code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(AppError::validation("invite code must be 6 characters"));
    }
    Ok(code)
}

/// Sanitize an answer: strip `<>'"&`, collapse whitespace, truncate to the
/// ceiling. The result must be non-empty.
pub fn answer(raw: &str) -> AppResult<String> {
    let stripped: String = raw
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '\'' | '"' | '&'))
        .collect();
    let mut cleaned = collapse_whitespace(&stripped);
    if cleaned.chars().count() > MAX_ANSWER_LEN {
        cleaned = cleaned.chars().take(MAX_ANSWER_LEN).collect();
    }
    if cleaned.is_empty() {
        return Err(AppError::validation("answer must not be empty"));
    }
    Ok(cleaned)
}

/// Validate a settings patch beyond what deserialization enforces.
/// Enum fields are already constrained by serde; this re-checks the numeric
/// ranges so a structured error comes back instead of a parse failure.
pub fn settings_patch(patch: &SettingsPatch) -> AppResult<()> {
    if let Some(size) = patch.max_room_size
        && !(crate::constants::MIN_ROOM_SIZE..=crate::constants::MAX_ROOM_SIZE).contains(&size)
    {
        return Err(AppError::validation("maxRoomSize must be between 2 and 5"));
    }
    if let Some(time) = patch.time_per_question
        && !crate::constants::ALLOWED_QUESTION_TIMES.contains(&time)
    {
        return Err(AppError::validation(
            "timePerQuestion must be one of 10, 15, 20, 30",
        ));
    }
    Ok(())
}

/// Remove HTML tags and the residual angle brackets.
fn strip_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut in_tag = false;
    for c in value.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Trim and collapse runs of whitespace into single spaces.
fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
