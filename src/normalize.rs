/// Dialing prefix applied to national numbers. Uploads arrive as 0803...,
/// 803..., or already-international forms of the same number.
const INTL_PREFIX: &str = "+234";

/// Digit-extract a phone value and rewrite it in international format.
/// Returns None when no digits survive.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Spreadsheets mangle long numbers into scientific notation (8.03E+09).
    let expanded;
    let source = match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() && (trimmed.contains('e') || trimmed.contains('E')) => {
            expanded = format!("{:.0}", v);
            expanded.as_str()
        }
        _ => trimmed,
    };

    let digits: String = source.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if digits.starts_with("234") && digits.len() >= 12 {
        Some(format!("+{}", digits))
    } else if let Some(rest) = digits.strip_prefix('0') {
        Some(format!("{}{}", INTL_PREFIX, rest))
    } else {
        Some(format!("{}{}", INTL_PREFIX, digits))
    }
}

pub fn normalize_email(raw: &str) -> Option<String> {
    let v = raw.trim().to_ascii_lowercase();
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}
