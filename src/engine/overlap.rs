use ulid::Ulid;

use crate::model::{Booking, DateRange, UnitState};

// ── Date-Range Overlap Checker ────────────────────────────────────

/// All bookings on the unit whose stay overlaps `range`, half-open:
/// a booking B conflicts iff `B.check_in < range.check_out && B.check_out >
/// range.check_in`. `exclude` skips one booking id, used when revalidating an
/// existing booking during edit. Pure, no side effects.
pub fn conflicting<'a>(
    us: &'a UnitState,
    range: &DateRange,
    exclude: Option<Ulid>,
) -> Vec<&'a Booking> {
    us.overlapping(range)
        .filter(|b| exclude != Some(b.id))
        .collect()
}
