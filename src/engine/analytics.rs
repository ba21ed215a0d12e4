use std::collections::HashMap;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

/// Snapshot counters for the operations dashboard, computed for a caller-
/// supplied "today" so the math is reproducible in tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardStats {
    pub unit_total: usize,
    /// Bookings with check_in <= today < check_out. With the no-overlap
    /// invariant this equals the number of occupied units.
    pub occupancy_current: usize,
    pub check_ins_today: usize,
    pub check_outs_today: usize,
    pub check_ins_tomorrow: usize,
    pub check_outs_tomorrow: usize,
    /// Total price of bookings checking in today: revenue recognized on
    /// the check-in day.
    pub revenue_today: f64,
}

/// The half-open window `[first of month, first of next month)`.
/// None for an out-of-range year/month.
pub fn month_window(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(DateRange::new(start, end))
}

/// Revenue a booking contributes to a month window, prorated by nights:
/// `price / total_nights * nights_in_window`. Bookings with no nights or no
/// price contribute nothing.
pub fn prorated_revenue(booking: &Booking, window: &DateRange) -> f64 {
    let total_nights = booking.nights();
    if total_nights <= 0 || booking.price <= 0.0 {
        return 0.0;
    }
    let nights_in_window = booking
        .stay
        .intersect(window)
        .map(|r| r.nights())
        .unwrap_or(0);
    booking.price / total_nights as f64 * nights_in_window as f64
}

impl Engine {
    pub async fn dashboard_stats(&self, today: NaiveDate) -> DashboardStats {
        let tomorrow = today + Days::new(1);
        let mut stats = DashboardStats {
            unit_total: self.unit_count(),
            occupancy_current: 0,
            check_ins_today: 0,
            check_outs_today: 0,
            check_ins_tomorrow: 0,
            check_outs_tomorrow: 0,
            revenue_today: 0.0,
        };

        for us in self.unit_states() {
            let guard = us.read().await;
            for booking in &guard.bookings {
                if booking.stay.contains_day(today) {
                    stats.occupancy_current += 1;
                }
                if booking.stay.check_in == today {
                    stats.check_ins_today += 1;
                    stats.revenue_today += booking.price;
                }
                if booking.stay.check_out == today {
                    stats.check_outs_today += 1;
                }
                if booking.stay.check_in == tomorrow {
                    stats.check_ins_tomorrow += 1;
                }
                if booking.stay.check_out == tomorrow {
                    stats.check_outs_tomorrow += 1;
                }
            }
        }

        stats
    }

    /// Per-unit revenue attributed to (year, month), prorated by the nights
    /// each booking actually spends inside the month.
    pub async fn monthly_revenue(
        &self,
        year: i32,
        month: u32,
    ) -> Result<HashMap<Ulid, f64>, EngineError> {
        let window =
            month_window(year, month).ok_or(EngineError::Validation("bad year/month"))?;

        let mut revenues: HashMap<Ulid, f64> = HashMap::new();
        for us in self.unit_states() {
            let guard = us.read().await;
            for booking in guard.overlapping(&window) {
                *revenues.entry(booking.unit_id).or_insert(0.0) +=
                    prorated_revenue(booking, &window);
            }
        }
        Ok(revenues)
    }

    /// Per-unit maintenance cost for issues whose date_added falls in the
    /// month, optionally restricted to one issue kind (Repair/Replace).
    pub async fn monthly_issue_costs(
        &self,
        year: i32,
        month: u32,
        kind: Option<IssueKind>,
    ) -> Result<HashMap<Ulid, f64>, EngineError> {
        let window =
            month_window(year, month).ok_or(EngineError::Validation("bad year/month"))?;

        let mut costs: HashMap<Ulid, f64> = HashMap::new();
        for us in self.unit_states() {
            let guard = us.read().await;
            for issue in &guard.issues {
                if !window.contains_day(issue.date_added) {
                    continue;
                }
                if let Some(kind) = kind
                    && issue.kind != kind
                {
                    continue;
                }
                if let Some(cost) = issue.cost {
                    *costs.entry(issue.unit_id).or_insert(0.0) += cost;
                }
            }
        }
        Ok(costs)
    }
}
