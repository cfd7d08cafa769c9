use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

static PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9\s\-+()]{8,}$").expect("phone pattern"));

/// ストアに渡す前に拒否した入力
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("All fields are required")]
    MissingFields,
    #[error("Invalid email format")]
    InvalidEmail,
    #[error("Invalid phone format")]
    InvalidPhone,
    #[error("Invalid date format")]
    InvalidDate,
    #[error("Invalid location")]
    InvalidLocation,
    #[error("Selected date is not available")]
    DateUnavailable,
}

/// `local@domain.tld` 形式で空白を含まないこと
pub fn validate_email(s: &str) -> bool {
    EMAIL.is_match(s)
}

/// 数字、空白、`+-()` のみで8文字以上
pub fn validate_phone(s: &str) -> bool {
    PHONE.is_match(s)
}

/// 文字列から `<` と `>` を取り除く。文字列以外はそのまま返す
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(&s)),
        other => other,
    }
}

pub fn sanitize_str(s: &str) -> String {
    s.chars().filter(|c| !matches!(c, '<' | '>')).collect()
}

pub(crate) fn require(field: &str) -> Result<(), ValidationError> {
    if field.trim().is_empty() {
        return Err(ValidationError::MissingFields);
    }
    Ok(())
}
