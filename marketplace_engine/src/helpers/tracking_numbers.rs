use once_cell::sync::Lazy;
use regex::Regex;

// Carrier slugs follow AfterShip's naming, so webhook payloads can be matched without a lookup table.
static CARRIER_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("aramex", r"^\d{10,12}$"),
        ("dhl", r"^(\d{10,11}|JJD\d{18}|[A-Z]{3}\d{7})$"),
        ("fedex", r"^(\d{12}|\d{15}|\d{20}|\d{22})$"),
        ("ups", r"^1Z[0-9A-Z]{16}$"),
        ("usps", r"^(\d{20,22}|9\d{21,25}|[A-Z]{2}\d{9}US)$"),
        ("smsa-express", r"^\d{10,12}$"),
    ]
    .into_iter()
    .filter_map(|(carrier, pattern)| Regex::new(pattern).ok().map(|re| (carrier, re)))
    .collect()
});

static GENERIC_PATTERN: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[A-Z0-9-]{6,40}$").ok());

/// Maps the free-text carrier names sellers type in onto a canonical slug.
pub fn normalize_carrier(carrier: &str) -> String {
    let lower = carrier.trim().to_ascii_lowercase();
    let compact: String = lower.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    match compact.as_str() {
        "aramex" => "aramex",
        "dhl" | "dhlexpress" => "dhl",
        "fedex" | "federalexpress" => "fedex",
        "ups" | "unitedparcelservice" => "ups",
        "usps" | "unitedstatespostalservice" => "usps",
        "smsa" | "smsaexpress" => "smsa-express",
        _ => return lower,
    }
    .to_string()
}

/// Tracking numbers are stored and compared with whitespace stripped and letters upper-cased.
pub fn canonical_tracking_number(tracking_number: &str) -> String {
    tracking_number.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_uppercase()
}

pub fn is_valid_tracking_number(carrier: &str, tracking_number: &str) -> bool {
    let number = canonical_tracking_number(tracking_number);
    if number.is_empty() {
        return false;
    }
    let carrier = normalize_carrier(carrier);
    match CARRIER_PATTERNS.iter().find(|(c, _)| *c == carrier) {
        Some((_, re)) => re.is_match(&number),
        None => GENERIC_PATTERN.as_ref().map(|re| re.is_match(&number)).unwrap_or(false),
    }
}
