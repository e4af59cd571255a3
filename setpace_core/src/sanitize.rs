//! Normalisation of typed numeric input.
//!
//! Entries are cleaned, never rejected: stray characters are stripped and a
//! decimal comma becomes a decimal point. An entry with no digits at all
//! yields `None` (an empty input).

/// Parse a set value (reps, seconds, meters). Every non-digit is dropped.
pub fn parse_value(input: &str) -> Option<u32> {
    let digits: String = input.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    // Saturate rather than fail on absurdly long inputs
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

/// Parse a weight. Accepts `62,5`, `62.5 kg`, `  60 `.
pub fn parse_weight(input: &str) -> Option<f64> {
    let mut cleaned = String::with_capacity(input.len());
    let mut seen_point = false;
    for c in input.chars() {
        match c {
            '0'..='9' => cleaned.push(c),
            '.' | ',' if !seen_point => {
                seen_point = true;
                cleaned.push('.');
            }
            _ => {}
        }
    }

    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_strips_non_digits() {
        assert_eq!(parse_value("12"), Some(12));
        assert_eq!(parse_value(" 12 reps"), Some(12));
        assert_eq!(parse_value("1x0"), Some(10));
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value("abc"), None);
    }

    #[test]
    fn test_value_saturates() {
        assert_eq!(parse_value("99999999999999"), Some(u32::MAX));
    }

    #[test]
    fn test_weight_decimal_comma() {
        assert_eq!(parse_weight("62,5"), Some(62.5));
        assert_eq!(parse_weight("62.5 kg"), Some(62.5));
        assert_eq!(parse_weight("60"), Some(60.0));
        assert_eq!(parse_weight(".5"), Some(0.5));
    }

    #[test]
    fn test_weight_keeps_first_separator_only() {
        assert_eq!(parse_weight("1.2.3"), Some(1.23));
        assert_eq!(parse_weight("1,2,5"), Some(1.25));
    }

    #[test]
    fn test_weight_without_digits_is_empty() {
        assert_eq!(parse_weight(""), None);
        assert_eq!(parse_weight("kg"), None);
        assert_eq!(parse_weight(","), None);
    }
}
