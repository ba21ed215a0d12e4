//! Per-platform confirmation-code extraction and best-effort guest-name
//! inference. The confirmation code is the only reconciliation key; guest
//! names are display data and never used for matching.

use std::sync::LazyLock;

use regex::Regex;

/// Pulls a platform-issued confirmation code out of a calendar event
/// description. One implementation per platform; adding a platform never
/// touches the reconciliation loop.
pub trait CodeExtractor: Send + Sync {
    fn extract(&self, description: &str) -> Option<String>;
}

/// Airbnb embeds the code as the reservation URL's last path segment,
/// e.g. `https://www.airbnb.com/hosting/reservations/details/HMN8ZKWAQE`.
struct Airbnb;

static AIRBNB_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"reservations/details/([A-Z0-9]+)").unwrap());

impl CodeExtractor for Airbnb {
    fn extract(&self, description: &str) -> Option<String> {
        AIRBNB_CODE
            .captures(description)
            .map(|c| c[1].to_string())
    }
}

/// Booking.com labels a numeric reservation id, e.g. `Booking ID: 4411223344`.
struct BookingCom;

static BOOKING_COM_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Booking ID:\s*(\d+)").unwrap());

impl CodeExtractor for BookingCom {
    fn extract(&self, description: &str) -> Option<String> {
        BOOKING_COM_CODE
            .captures(description)
            .map(|c| c[1].to_string())
    }
}

/// Extractor for a source label, or None for platforms we cannot reconcile.
pub fn extractor_for(source: &str) -> Option<&'static dyn CodeExtractor> {
    match source {
        "Airbnb" => Some(&Airbnb),
        "Booking.com" => Some(&BookingCom),
        _ => None,
    }
}

static NAME_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?:Booking for|Guest:|Reserved by|Reservation for)\s+([A-Za-z][A-Za-z ]*)")
            .unwrap(),
        Regex::new(r"([A-Za-z][A-Za-z ]*)'s reservation").unwrap(),
    ]
});

/// Best-effort guest name from the event title or description. Returns None
/// when nothing plausible matches; callers fall back to a synthesized
/// `Guest from {source}` placeholder.
pub fn guest_name(summary: &str, description: &str) -> Option<String> {
    for pattern in NAME_PATTERNS.iter() {
        for text in [summary, description] {
            if let Some(caps) = pattern.captures(text) {
                let name = caps[1].trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }

    // A short plain summary that isn't boilerplate is often just the name.
    let lower = summary.to_lowercase();
    if !summary.is_empty()
        && summary.len() < 50
        && !["booking", "reservation", "blocked"].iter().any(|x| lower.contains(x))
    {
        return Some(summary.trim().to_string());
    }

    None
}
