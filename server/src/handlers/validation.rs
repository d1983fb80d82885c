//! Field checks applied to request bodies before they reach the services.

use url::Url;

use crate::utils::error::{AppError, AppResult};

pub fn required(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Trimmed, lowercased address with a plausible `local@domain.tld` shape.
pub fn email(value: &str) -> AppResult<String> {
    let email = required("email", value)?.to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(AppError::ValidationError("email is not valid".to_string()));
    }
    Ok(email)
}

pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn http_url(field: &str, value: &str) -> AppResult<String> {
    let raw = required(field, value)?;
    match Url::parse(&raw) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(url.to_string()),
        _ => Err(AppError::ValidationError(format!(
            "{} must be an http(s) URL",
            field
        ))),
    }
}
