//! Token validation and recipient addressing.

/// Domain suffix of the transport's addressing scheme.
pub const RECIPIENT_DOMAIN: &str = "c.us";

/// Country code prefixed onto local-format numbers.
const DEFAULT_COUNTRY_CODE: &str = "254";

/// Instance tokens are caller-chosen: alphanumeric plus dash/underscore.
pub fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Reduce a caller-supplied phone number to international digits.
///
/// `0714179051` and bare nine-digit local numbers get the country code;
/// numbers already carrying it pass through untouched.
pub fn normalize_msisdn(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if digits.len() == 10 && digits.starts_with('0') {
        Some(format!("{DEFAULT_COUNTRY_CODE}{}", &digits[1..]))
    } else if digits.len() == 9 {
        Some(format!("{DEFAULT_COUNTRY_CODE}{digits}"))
    } else {
        Some(digits)
    }
}

/// Full transport address for a recipient: digits plus domain suffix.
pub fn normalize_recipient(raw: &str) -> Option<String> {
    normalize_msisdn(raw).map(|msisdn| format!("{msisdn}@{RECIPIENT_DOMAIN}"))
}
