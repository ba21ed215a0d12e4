use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open stay interval `[check_in, check_out)`: the night of
/// `check_out` is not occupied by this booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        debug_assert!(check_in < check_out, "check_in must be before check_out");
        Self { check_in, check_out }
    }

    /// Number of nights covered by the stay.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    /// A day is "occupied" if `check_in <= day < check_out`.
    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.check_in <= day && day < self.check_out
    }

    /// Intersection with `other`, or None when disjoint.
    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.check_in.max(other.check_in);
        let end = self.check_out.min(other.check_out);
        if start < end {
            Some(DateRange { check_in: start, check_out: end })
        } else {
            None
        }
    }
}

/// A rentable unit. Toilet/towel counts are cleaning-supply defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: Ulid,
    pub number: String,
    pub building: Option<String>,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub toilets: u32,
    pub towels: u32,
    pub occupied: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub guest_name: String,
    pub contact: String,
    pub stay: DateRange,
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    /// Total headcount; kept in sync with adults + children + infants.
    pub number_of_guests: u32,
    pub price: f64,
    /// Platform the reservation came from ("Airbnb", "Booking.com", "Manual", ...).
    pub booking_source: String,
    pub payment_status: String,
    /// Platform-issued reservation id, the reconciliation join key.
    pub confirmation_code: Option<String>,
    /// When the reservation was made, distinct from the stay dates.
    pub booking_date: Option<NaiveDate>,
    pub notes: String,
    pub created_at: NaiveDateTime,
}

impl Booking {
    pub fn nights(&self) -> i64 {
        self.stay.nights()
    }
}

/// Per-unit record of an external calendar feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarSource {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub source_name: String,
    pub url: Option<String>,
    pub last_synced: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    Repair,
    Replace,
    Other,
}

/// Maintenance/complaint record. Cost feeds the monthly cost analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: Ulid,
    pub unit_id: Ulid,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub status: String,
    pub reported_by: String,
    pub kind: IssueKind,
    pub cost: Option<f64>,
    pub date_added: NaiveDate,
}

/// Everything known about one unit: attributes, bookings sorted by
/// check-in date, calendar sources, and maintenance issues.
#[derive(Debug, Clone)]
pub struct UnitState {
    pub unit: Unit,
    /// Sorted by `stay.check_in`.
    pub bookings: Vec<Booking>,
    pub sources: Vec<CalendarSource>,
    pub issues: Vec<Issue>,
}

impl UnitState {
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            bookings: Vec::new(),
            sources: Vec::new(),
            issues: Vec::new(),
        }
    }

    /// Insert a booking maintaining sort order by check-in date.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.stay.check_in, |b| b.stay.check_in)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    /// Bookings whose stay overlaps the query range. Uses binary search to
    /// skip bookings checking in at or after `range.check_out`.
    pub fn overlapping(&self, range: &DateRange) -> impl Iterator<Item = &Booking> {
        let right_bound = self
            .bookings
            .partition_point(|b| b.stay.check_in < range.check_out);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.stay.check_out > range.check_in)
    }

    pub fn source_by_name(&self, name: &str) -> Option<&CalendarSource> {
        self.sources.iter().find(|s| s.source_name == name)
    }

    pub fn source_mut(&mut self, id: Ulid) -> Option<&mut CalendarSource> {
        self.sources.iter_mut().find(|s| s.id == id)
    }

    /// Replace the source with the same (unit_id, source_name) key, or append.
    pub fn upsert_source(&mut self, source: CalendarSource) {
        if let Some(existing) = self
            .sources
            .iter_mut()
            .find(|s| s.source_name == source.source_name)
        {
            *existing = source;
        } else {
            self.sources.push(source);
        }
    }

    pub fn remove_source(&mut self, id: Ulid) -> Option<CalendarSource> {
        if let Some(pos) = self.sources.iter().position(|s| s.id == id) {
            Some(self.sources.remove(pos))
        } else {
            None
        }
    }

    pub fn remove_issue(&mut self, id: Ulid) -> Option<Issue> {
        if let Some(pos) = self.issues.iter().position(|i| i.id == id) {
            Some(self.issues.remove(pos))
        } else {
            None
        }
    }
}

/// The WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UnitCreated { unit: Unit },
    UnitUpdated { unit: Unit },
    UnitDeleted { id: Ulid },
    BookingAdded { booking: Booking },
    BookingUpdated { booking: Booking },
    BookingRemoved { id: Ulid, unit_id: Ulid },
    SourceUpserted { source: CalendarSource },
    SourceSynced { id: Ulid, unit_id: Ulid, at: NaiveDateTime },
    SourceDeleted { id: Ulid, unit_id: Ulid },
    IssueAdded { issue: Issue },
    IssueRemoved { id: Ulid, unit_id: Ulid },
}

// ── Query result types ───────────────────────────────────────────

/// One existing booking blocking a requested date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictingBooking {
    pub id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guest_name: String,
}

impl ConflictingBooking {
    pub fn from_booking(b: &Booking) -> Self {
        Self {
            id: b.id,
            check_in: b.stay.check_in,
            check_out: b.stay.check_out,
            guest_name: b.guest_name.clone(),
        }
    }
}
