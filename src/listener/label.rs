//! Storage-location labels derived from record type names

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("empty type name")]
    Empty,

    #[error("unbalanced generics in {0}")]
    UnbalancedGenerics(String),

    #[error("invalid characters in {0}")]
    InvalidCharacters(String),
}

/// `shop::model::OrderLine<u32>` -> `OrderLine`
pub fn short_name(raw: &str) -> Result<&str, LabelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(LabelError::Empty);
    }

    let base = match (trimmed.find('<'), trimmed.rfind('>')) {
        (None, None) => trimmed,
        (Some(lt), Some(gt)) if gt > lt && gt == trimmed.len() - 1 => &trimmed[..lt],
        _ => return Err(LabelError::UnbalancedGenerics(raw.to_string())),
    };

    let name = base.rsplit("::").next().unwrap_or(base).trim();
    if name.is_empty() {
        return Err(LabelError::Empty);
    }
    if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(LabelError::InvalidCharacters(raw.to_string()));
    }
    Ok(name)
}

/// Case-splits a type name into snake_case.
///
/// Acronym runs stay together: `HTTPRequestLog` -> `http_request_log`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn derive_storage_label(raw: &str) -> Result<String, LabelError> {
    short_name(raw).map(snake_case)
}
