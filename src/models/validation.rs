use anyhow::{Result, anyhow};

/// Accepts E.164-style numbers: optional leading `+`, 8 to 15 digits.
/// Spaces, dashes and parentheses are tolerated and ignored.
pub fn validate_phone_number(phone: &str) -> Result<()> {
    let trimmed = phone.trim();

    if trimmed.is_empty() {
        return Err(anyhow!("Recipient phone cannot be empty"));
    }

    let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);

    let valid_chars = digits
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-' || c == '(' || c == ')');

    if !valid_chars {
        return Err(anyhow!("Recipient phone contains invalid characters"));
    }

    let digit_count = digits.chars().filter(|c| c.is_ascii_digit()).count();

    if digit_count < 8 {
        return Err(anyhow!("Recipient phone too short (minimum 8 digits)"));
    }

    if digit_count > 15 {
        return Err(anyhow!("Recipient phone too long (maximum 15 digits)"));
    }

    Ok(())
}

/// Strips formatting so gateways receive `+<digits>`.
pub fn normalize_phone_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("+{}", digits)
}
