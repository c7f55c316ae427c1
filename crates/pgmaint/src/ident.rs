/// True when `name` is safe to splice into SQL text as an identifier:
/// non-empty, ASCII letters, digits and underscores only.
pub fn is_valid_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Double-quote an identifier that already passed [`is_valid_identifier`].
pub fn quote_identifier(name: &str) -> String {
    debug_assert!(is_valid_identifier(name));
    format!("\"{name}\"")
}
