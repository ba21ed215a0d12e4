use super::*;
use crate::model::*;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use ulid::Ulid;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("stayd_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn range(a: NaiveDate, b: NaiveDate) -> DateRange {
    DateRange::new(a, b)
}

fn mk_unit(id: Ulid) -> Unit {
    Unit {
        id,
        number: "A-12-3".into(),
        building: Some("Vista Residences".into()),
        bedrooms: 2,
        bathrooms: 2,
        toilets: 2,
        towels: 4,
        occupied: false,
    }
}

fn mk_booking(unit_id: Ulid, check_in: NaiveDate, check_out: NaiveDate, price: f64) -> Booking {
    Booking {
        id: Ulid::new(),
        unit_id,
        guest_name: "Lina Abdullah".into(),
        contact: "+60-12-3456789".into(),
        stay: range(check_in, check_out),
        adults: 2,
        children: 1,
        infants: 0,
        number_of_guests: 3,
        price,
        booking_source: "Manual".into(),
        payment_status: "Paid".into(),
        confirmation_code: None,
        booking_date: None,
        notes: String::new(),
        created_at: chrono::Utc::now().naive_utc(),
    }
}

fn mk_issue(unit_id: Ulid, kind: IssueKind, cost: Option<f64>, date: NaiveDate) -> Issue {
    Issue {
        id: Ulid::new(),
        unit_id,
        description: "Leaking tap".into(),
        category: "Plumbing".into(),
        priority: "Medium".into(),
        status: "Open".into(),
        reported_by: "Cleaner".into(),
        kind,
        cost,
        date_added: date,
    }
}

/// ICS feed in the shape Airbnb exports: one VEVENT per reservation with the
/// confirmation code inside the reservation URL.
fn airbnb_feed(entries: &[(&str, &str, NaiveDate, NaiveDate)]) -> Vec<u8> {
    let mut s = String::from("BEGIN:VCALENDAR\nVERSION:2.0\n");
    for (code, summary, start, end) in entries {
        s.push_str("BEGIN:VEVENT\n");
        s.push_str(&format!("DTSTART;VALUE=DATE:{}\n", start.format("%Y%m%d")));
        s.push_str(&format!("DTEND;VALUE=DATE:{}\n", end.format("%Y%m%d")));
        s.push_str(&format!("SUMMARY:{summary}\n"));
        s.push_str(&format!(
            "DESCRIPTION:Reservation URL: https://www.airbnb.com/hosting/reservations/details/{code}\n"
        ));
        s.push_str("END:VEVENT\n");
    }
    s.push_str("END:VCALENDAR\n");
    s.into_bytes()
}

async fn engine_with_unit(name: &str) -> (Engine, Ulid) {
    let engine = Engine::new(test_wal_path(name)).unwrap();
    let uid = Ulid::new();
    engine.create_unit(mk_unit(uid)).await.unwrap();
    (engine, uid)
}

// ── Units ────────────────────────────────────────────────

#[tokio::test]
async fn create_and_list_units() {
    let (engine, uid) = engine_with_unit("create_unit.wal").await;
    let units = engine.list_units().await;
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].id, uid);
}

#[tokio::test]
async fn duplicate_unit_rejected() {
    let (engine, uid) = engine_with_unit("dup_unit.wal").await;
    let result = engine.create_unit(mk_unit(uid)).await;
    assert!(matches!(result, Err(EngineError::AlreadyExists(_))));
}

#[tokio::test]
async fn delete_unit_drops_bookings_from_index() {
    let (engine, uid) = engine_with_unit("delete_unit.wal").await;
    let booking = mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 100.0);
    let bid = booking.id;
    engine.add_booking(booking).await.unwrap();

    engine.delete_unit(uid).await.unwrap();
    assert!(matches!(
        engine.get_booking(bid).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn availability_lifecycle() {
    let (engine, uid) = engine_with_unit("availability.wal").await;
    let query = range(d(2025, 1, 10), d(2025, 1, 15));

    // Empty unit: available.
    assert!(engine.is_available(uid, query, None).await.unwrap());

    // Insert [Jan 12, Jan 14): no longer available.
    let booking = mk_booking(uid, d(2025, 1, 12), d(2025, 1, 14), 200.0);
    let bid = booking.id;
    engine.add_booking(booking).await.unwrap();
    assert!(!engine.is_available(uid, query, None).await.unwrap());

    // Excluding the blocking booking itself: available again.
    assert!(engine.is_available(uid, query, Some(bid)).await.unwrap());
}

#[tokio::test]
async fn availability_unknown_unit_is_not_found() {
    let engine = Engine::new(test_wal_path("avail_unknown.wal")).unwrap();
    let result = engine
        .is_available(Ulid::new(), range(d(2025, 1, 1), d(2025, 1, 2)), None)
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn check_availability_reports_blockers() {
    let (engine, uid) = engine_with_unit("check_avail.wal").await;
    let booking = mk_booking(uid, d(2025, 1, 12), d(2025, 1, 14), 200.0);
    let bid = booking.id;
    engine.add_booking(booking).await.unwrap();

    let blockers = engine
        .check_availability(uid, range(d(2025, 1, 10), d(2025, 1, 15)), None)
        .await
        .unwrap();
    assert_eq!(blockers.len(), 1);
    assert_eq!(blockers[0].id, bid);
    assert_eq!(blockers[0].check_in, d(2025, 1, 12));
    assert_eq!(blockers[0].guest_name, "Lina Abdullah");
}

// ── Booking writes ───────────────────────────────────────

#[tokio::test]
async fn overlapping_booking_rejected_with_conflict_list() {
    let (engine, uid) = engine_with_unit("overlap_reject.wal").await;
    engine
        .add_booking(mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 100.0))
        .await
        .unwrap();

    let result = engine
        .add_booking(mk_booking(uid, d(2025, 1, 14), d(2025, 1, 18), 100.0))
        .await;
    match result {
        Err(EngineError::Conflict(blockers)) => {
            assert_eq!(blockers.len(), 1);
            assert_eq!(blockers[0].check_out, d(2025, 1, 15));
        }
        other => panic!("expected Conflict, got {other:?}"),
    }

    // Nothing was written.
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn back_to_back_bookings_allowed() {
    let (engine, uid) = engine_with_unit("back_to_back.wal").await;
    engine
        .add_booking(mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 100.0))
        .await
        .unwrap();
    engine
        .add_booking(mk_booking(uid, d(2025, 1, 15), d(2025, 1, 18), 100.0))
        .await
        .unwrap();
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 2);
}

#[tokio::test]
async fn committed_bookings_never_overlap() {
    let (engine, uid) = engine_with_unit("invariant.wal").await;
    // Throw a pile of candidate stays at the engine; whatever commits must
    // be pairwise disjoint.
    for day in [1u32, 3, 2, 8, 5, 12, 10, 4, 20, 19] {
        let _ = engine
            .add_booking(mk_booking(uid, d(2025, 3, day), d(2025, 3, day + 4), 50.0))
            .await;
    }
    let committed = engine.list_bookings(uid).await.unwrap();
    assert!(!committed.is_empty());
    for a in &committed {
        for b in &committed {
            if a.id != b.id {
                assert!(
                    !a.stay.overlaps(&b.stay),
                    "{:?} overlaps {:?}",
                    a.stay,
                    b.stay
                );
            }
        }
    }
}

#[tokio::test]
async fn concurrent_writes_for_same_range_commit_exactly_once() {
    let (engine, uid) = engine_with_unit("race.wal").await;
    let engine = Arc::new(engine);

    let e1 = engine.clone();
    let e2 = engine.clone();
    let b1 = mk_booking(uid, d(2025, 6, 1), d(2025, 6, 5), 100.0);
    let b2 = mk_booking(uid, d(2025, 6, 3), d(2025, 6, 8), 100.0);
    let (r1, r2) = tokio::join!(e1.add_booking(b1), e2.add_booking(b2));

    // The unit write lock serializes check-then-commit, so exactly one wins.
    assert_eq!(r1.is_ok() as u8 + r2.is_ok() as u8, 1);
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn update_revalidates_dates_excluding_self() {
    let (engine, uid) = engine_with_unit("update_booking.wal").await;
    let booking = mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 100.0);
    let mut edited = booking.clone();
    engine.add_booking(booking).await.unwrap();

    // Shifting its own range is fine even though it overlaps itself.
    edited.stay = range(d(2025, 1, 12), d(2025, 1, 16));
    engine.update_booking(edited.clone()).await.unwrap();

    // But it cannot land on another booking.
    engine
        .add_booking(mk_booking(uid, d(2025, 1, 20), d(2025, 1, 25), 100.0))
        .await
        .unwrap();
    edited.stay = range(d(2025, 1, 22), d(2025, 1, 26));
    assert!(matches!(
        engine.update_booking(edited).await,
        Err(EngineError::Conflict(_))
    ));
}

#[tokio::test]
async fn invalid_date_order_rejected() {
    let (engine, uid) = engine_with_unit("bad_dates.wal").await;
    let mut booking = mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 100.0);
    booking.stay = DateRange {
        check_in: d(2025, 1, 15),
        check_out: d(2025, 1, 15),
    };
    assert!(matches!(
        engine.add_booking(booking).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn remove_booking_frees_the_dates() {
    let (engine, uid) = engine_with_unit("remove_booking.wal").await;
    let booking = mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 100.0);
    let bid = booking.id;
    engine.add_booking(booking).await.unwrap();

    engine.remove_booking(bid).await.unwrap();
    assert!(engine
        .is_available(uid, range(d(2025, 1, 10), d(2025, 1, 15)), None)
        .await
        .unwrap());
}

// ── Calendar sources ─────────────────────────────────────

#[tokio::test]
async fn source_upsert_is_idempotent() {
    let (engine, uid) = engine_with_unit("source_upsert.wal").await;
    let first = engine
        .upsert_calendar_source(uid, "Airbnb", None)
        .await
        .unwrap();
    let second = engine
        .upsert_calendar_source(uid, "Airbnb", Some("https://example.com/cal.ics".into()))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let sources = engine.list_calendar_sources(uid).await.unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].url.as_deref(), Some("https://example.com/cal.ics"));
}

#[tokio::test]
async fn source_sync_stamp_and_delete() {
    let (engine, uid) = engine_with_unit("source_stamp.wal").await;
    let source = engine
        .upsert_calendar_source(uid, "Booking.com", Some("https://example.com/b.ics".into()))
        .await
        .unwrap();

    let at = chrono::Utc::now().naive_utc();
    engine.mark_source_synced(source.id, at).await.unwrap();
    let sources = engine.list_calendar_sources(uid).await.unwrap();
    assert_eq!(sources[0].last_synced, Some(at));

    engine.delete_calendar_source(source.id).await.unwrap();
    assert!(engine.list_calendar_sources(uid).await.unwrap().is_empty());
}

// ── ICS reconciliation ───────────────────────────────────

#[tokio::test]
async fn reconcile_adds_new_bookings() {
    let (engine, uid) = engine_with_unit("reconcile_add.wal").await;
    let feed = airbnb_feed(&[
        ("HMABCDEF01", "Reserved", d(2025, 2, 1), d(2025, 2, 5)),
        ("HMABCDEF02", "Reserved", d(2025, 2, 10), d(2025, 2, 12)),
    ]);

    let outcome = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome { added: 2, updated: 0, cancelled: 0 }
    );

    let bookings = engine.list_bookings(uid).await.unwrap();
    assert_eq!(bookings.len(), 2);
    let b = &bookings[0];
    assert_eq!(b.confirmation_code.as_deref(), Some("HMABCDEF01"));
    assert_eq!(b.booking_source, "Airbnb");
    assert_eq!(b.payment_status, "Pending");
    assert_eq!(b.number_of_guests, 2);
    assert_eq!(b.price, 0.0);
    assert_eq!(b.nights(), 4);
}

#[tokio::test]
async fn reconcile_is_idempotent() {
    let (engine, uid) = engine_with_unit("reconcile_idem.wal").await;
    let feed = airbnb_feed(&[("HMIDEMPOT1", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);

    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    let second = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(second, ReconcileOutcome::default());
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reconcile_updates_changed_dates() {
    let (engine, uid) = engine_with_unit("reconcile_update.wal").await;
    let feed = airbnb_feed(&[("HMSHIFTED1", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    // Guest extended their stay by two nights.
    let feed = airbnb_feed(&[("HMSHIFTED1", "Reserved", d(2025, 2, 1), d(2025, 2, 7))]);
    let outcome = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome { added: 0, updated: 1, cancelled: 0 }
    );

    let bookings = engine.list_bookings(uid).await.unwrap();
    assert_eq!(bookings[0].stay.check_out, d(2025, 2, 7));
    assert_eq!(bookings[0].nights(), 6);
    assert!(bookings[0].notes.contains("Updated from Airbnb calendar"));
}

#[tokio::test]
async fn reconcile_cancels_codes_missing_from_feed() {
    let (engine, uid) = engine_with_unit("reconcile_cancel.wal").await;
    let feed = airbnb_feed(&[
        ("HMKEEPME01", "Reserved", d(2025, 2, 1), d(2025, 2, 5)),
        ("HMGONESOON", "Reserved", d(2025, 3, 1), d(2025, 3, 5)),
    ]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    let feed = airbnb_feed(&[("HMKEEPME01", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    let outcome = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome { added: 0, updated: 0, cancelled: 1 }
    );

    let bookings = engine.list_bookings(uid).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].confirmation_code.as_deref(), Some("HMKEEPME01"));
}

#[tokio::test]
async fn reconcile_preserves_manual_guest_name_edits() {
    let (engine, uid) = engine_with_unit("reconcile_guest.wal").await;
    let feed = airbnb_feed(&[("HMRENAMED1", "Reservation", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    // "Reservation" is boilerplate, so the synthesized placeholder was used.
    let mut booking = engine.list_bookings(uid).await.unwrap().remove(0);
    assert_eq!(booking.guest_name, "Guest from Airbnb");

    // Host fills in the real name by hand.
    booking.guest_name = "Siti Rahman".into();
    engine.update_booking(booking).await.unwrap();

    // Next sync moves the dates but must not clobber the manual name.
    let feed = airbnb_feed(&[("HMRENAMED1", "Reservation", d(2025, 2, 2), d(2025, 2, 6))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    let booking = engine.list_bookings(uid).await.unwrap().remove(0);
    assert_eq!(booking.guest_name, "Siti Rahman");
    assert_eq!(booking.stay.check_in, d(2025, 2, 2));
}

#[tokio::test]
async fn reconcile_overwrites_placeholder_guest_name() {
    let (engine, uid) = engine_with_unit("reconcile_placeholder.wal").await;
    let feed = airbnb_feed(&[("HMNAMELESS", "Reservation", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    // Feed later carries a proper name alongside new dates.
    let feed = airbnb_feed(&[(
        "HMNAMELESS",
        "Booking for John Doe",
        d(2025, 2, 1),
        d(2025, 2, 6),
    )]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    let booking = engine.list_bookings(uid).await.unwrap().remove(0);
    assert_eq!(booking.guest_name, "John Doe");
}

#[tokio::test]
async fn reconcile_skips_blackouts_and_codeless_events() {
    let (engine, uid) = engine_with_unit("reconcile_skip.wal").await;
    let mut feed = String::from("BEGIN:VCALENDAR\nVERSION:2.0\n");
    // Host blackout, not a reservation.
    feed.push_str("BEGIN:VEVENT\nDTSTART;VALUE=DATE:20250201\nDTEND;VALUE=DATE:20250205\nSUMMARY:Airbnb (Not available)\nDESCRIPTION:Blocked by host\nEND:VEVENT\n");
    feed.push_str("BEGIN:VEVENT\nDTSTART;VALUE=DATE:20250210\nDTEND;VALUE=DATE:20250212\nSUMMARY:Unavailable\nDESCRIPTION:https://www.airbnb.com/hosting/reservations/details/HMSKIPPED1\nEND:VEVENT\n");
    // No extractable code, cannot be reconciled.
    feed.push_str("BEGIN:VEVENT\nDTSTART;VALUE=DATE:20250220\nDTEND;VALUE=DATE:20250222\nSUMMARY:Reserved\nDESCRIPTION:no url here\nEND:VEVENT\n");
    feed.push_str("END:VCALENDAR\n");

    let outcome = engine
        .reconcile_feed(feed.as_bytes(), uid, "Airbnb")
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::default());
    assert!(engine.list_bookings(uid).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_dedupes_by_code_last_event_wins() {
    let (engine, uid) = engine_with_unit("reconcile_dedupe.wal").await;
    let feed = airbnb_feed(&[
        ("HMTWICE001", "Reserved", d(2025, 2, 1), d(2025, 2, 5)),
        ("HMTWICE001", "Reserved", d(2025, 2, 3), d(2025, 2, 8)),
    ]);
    let outcome = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(outcome.added, 1);

    let bookings = engine.list_bookings(uid).await.unwrap();
    assert_eq!(bookings[0].stay, range(d(2025, 2, 3), d(2025, 2, 8)));
}

#[tokio::test]
async fn reconcile_trusts_feed_over_overlap_check() {
    // External feeds are authoritative for their own unit: an imported
    // reservation lands even across a manually entered stay.
    let (engine, uid) = engine_with_unit("reconcile_trust.wal").await;
    engine
        .add_booking(mk_booking(uid, d(2025, 2, 2), d(2025, 2, 4), 100.0))
        .await
        .unwrap();

    let feed = airbnb_feed(&[("HMFORCED01", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    let outcome = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(outcome.added, 1);
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 2);
}

#[tokio::test]
async fn reconcile_leaves_other_sources_alone() {
    let (engine, uid) = engine_with_unit("reconcile_scoped.wal").await;
    // A Booking.com reservation with its own code.
    let mut other = mk_booking(uid, d(2025, 5, 1), d(2025, 5, 5), 300.0);
    other.booking_source = "Booking.com".into();
    other.confirmation_code = Some("99887766".into());
    engine.add_booking(other).await.unwrap();

    // An empty Airbnb feed cancels nothing outside its source.
    let feed = airbnb_feed(&[]);
    let outcome = engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    assert_eq!(outcome.cancelled, 0);
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn reconcile_malformed_feed_writes_nothing() {
    let (engine, uid) = engine_with_unit("reconcile_parse_err.wal").await;
    let feed = b"BEGIN:VCALENDAR\nBEGIN:VEVENT\nDTSTART;VALUE=DATE:20250201\n";
    let result = engine.reconcile_feed(feed, uid, "Airbnb").await;
    assert!(matches!(result, Err(EngineError::Parse(_))));
    assert!(engine.list_bookings(uid).await.unwrap().is_empty());
}

#[tokio::test]
async fn reconcile_unknown_source_rejected() {
    let (engine, uid) = engine_with_unit("reconcile_bad_source.wal").await;
    let feed = airbnb_feed(&[("HMX", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    let result = engine.reconcile_feed(&feed, uid, "Craigslist").await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[tokio::test]
async fn reconcile_unknown_unit_rejected() {
    let engine = Engine::new(test_wal_path("reconcile_no_unit.wal")).unwrap();
    let feed = airbnb_feed(&[("HMX", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    let result = engine.reconcile_feed(&feed, Ulid::new(), "Airbnb").await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn reconcile_booking_com_labeled_ids() {
    let (engine, uid) = engine_with_unit("reconcile_bcom.wal").await;
    let feed = "BEGIN:VCALENDAR\nVERSION:2.0\nBEGIN:VEVENT\n\
DTSTART;VALUE=DATE:20250401\nDTEND;VALUE=DATE:20250404\n\
SUMMARY:Guest: Maria Silva\nDESCRIPTION:Booking ID: 4411223344\nEND:VEVENT\nEND:VCALENDAR\n";
    let outcome = engine
        .reconcile_feed(feed.as_bytes(), uid, "Booking.com")
        .await
        .unwrap();
    assert_eq!(outcome.added, 1);

    let booking = engine.list_bookings(uid).await.unwrap().remove(0);
    assert_eq!(booking.confirmation_code.as_deref(), Some("4411223344"));
    assert_eq!(booking.guest_name, "Maria Silva");
}

// ── Bulk import ──────────────────────────────────────────

#[tokio::test]
async fn import_updates_matched_bookings() {
    let (engine, uid) = engine_with_unit("import_update.wal").await;
    let feed = airbnb_feed(&[("HMCSVCODE1", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    let outcome = engine
        .import_bookings(vec![BookingImport {
            confirmation_code: "HMCSVCODE1".into(),
            guest_name: Some("Chen Wei".into()),
            price: Some("RM1,250.00".into()),
            payment_status: Some("Paid".into()),
            adults: Some(2),
            children: Some(1),
            ..Default::default()
        }])
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ImportOutcome { updated: 1, skipped: 0, errors: 0 }
    );

    let booking = engine.list_bookings(uid).await.unwrap().remove(0);
    assert_eq!(booking.guest_name, "Chen Wei");
    assert_eq!(booking.price, 1250.0);
    assert_eq!(booking.payment_status, "Paid");
    assert_eq!(booking.number_of_guests, 3);
}

#[tokio::test]
async fn import_unknown_code_is_skipped_not_created() {
    let (engine, uid) = engine_with_unit("import_skip.wal").await;
    let outcome = engine
        .import_bookings(vec![BookingImport {
            confirmation_code: "HMNOSUCH01".into(),
            guest_name: Some("Nobody".into()),
            ..Default::default()
        }])
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ImportOutcome { updated: 0, skipped: 1, errors: 0 }
    );
    assert!(engine.list_bookings(uid).await.unwrap().is_empty());
}

#[tokio::test]
async fn import_empty_code_counts_as_error_and_batch_continues() {
    let (engine, uid) = engine_with_unit("import_continue.wal").await;
    let feed = airbnb_feed(&[("HMBATCH001", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    let outcome = engine
        .import_bookings(vec![
            BookingImport { confirmation_code: "  ".into(), ..Default::default() },
            BookingImport {
                confirmation_code: "HMBATCH001".into(),
                payment_status: Some("Paid".into()),
                ..Default::default()
            },
        ])
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ImportOutcome { updated: 1, skipped: 0, errors: 1 }
    );
}

#[tokio::test]
async fn import_bad_dates_keep_existing_stay() {
    let (engine, uid) = engine_with_unit("import_bad_dates.wal").await;
    let feed = airbnb_feed(&[("HMDATES001", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    // Unparseable check-in, and a reversed pair: both leave the stay alone.
    engine
        .import_bookings(vec![BookingImport {
            confirmation_code: "HMDATES001".into(),
            check_in_date: Some("whenever".into()),
            check_out_date: Some("2025-02-09".into()),
            ..Default::default()
        }])
        .await
        .unwrap();
    engine
        .import_bookings(vec![BookingImport {
            confirmation_code: "HMDATES001".into(),
            check_in_date: Some("2025-02-09".into()),
            check_out_date: Some("2025-02-01".into()),
            ..Default::default()
        }])
        .await
        .unwrap();

    let booking = engine.list_bookings(uid).await.unwrap().remove(0);
    assert_eq!(booking.stay, range(d(2025, 2, 1), d(2025, 2, 5)));
}

#[tokio::test]
async fn import_parses_date_pair_and_booking_date() {
    let (engine, uid) = engine_with_unit("import_dates.wal").await;
    let feed = airbnb_feed(&[("HMDATES002", "Reserved", d(2025, 2, 1), d(2025, 2, 5))]);
    engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();

    engine
        .import_bookings(vec![BookingImport {
            confirmation_code: "HMDATES002".into(),
            check_in_date: Some("02/03/2025".into()),
            check_out_date: Some("02/07/2025".into()),
            booking_date: Some("Jan 3, 2025".into()),
            ..Default::default()
        }])
        .await
        .unwrap();

    let booking = engine.list_bookings(uid).await.unwrap().remove(0);
    // DD/MM/YYYY wins over MM/DD/YYYY when both could match.
    assert_eq!(booking.stay, range(d(2025, 3, 2), d(2025, 7, 2)));
    assert_eq!(booking.booking_date, Some(d(2025, 1, 3)));
}

// ── Issues & analytics ───────────────────────────────────

#[tokio::test]
async fn dashboard_stats_counts() {
    let (engine, uid) = engine_with_unit("dashboard.wal").await;
    let uid2 = Ulid::new();
    let mut second = mk_unit(uid2);
    second.number = "A-12-4".into();
    engine.create_unit(second).await.unwrap();

    let today = d(2025, 6, 10);
    // Staying across today.
    engine
        .add_booking(mk_booking(uid, d(2025, 6, 8), d(2025, 6, 12), 400.0))
        .await
        .unwrap();
    // Checks in today.
    engine
        .add_booking(mk_booking(uid2, d(2025, 6, 10), d(2025, 6, 14), 250.0))
        .await
        .unwrap();
    // Already checked out, counts nowhere.
    engine
        .add_booking(mk_booking(uid, d(2025, 6, 1), d(2025, 6, 8), 100.0))
        .await
        .unwrap();

    let stats = engine.dashboard_stats(today).await;
    assert_eq!(stats.unit_total, 2);
    assert_eq!(stats.occupancy_current, 2);
    assert_eq!(stats.check_ins_today, 1);
    assert_eq!(stats.revenue_today, 250.0);
    assert_eq!(stats.check_outs_today, 0);
    assert_eq!(stats.check_ins_tomorrow, 0);
    assert_eq!(stats.check_outs_tomorrow, 0);
}

#[tokio::test]
async fn monthly_revenue_prorates_across_boundary() {
    let (engine, uid) = engine_with_unit("revenue.wal").await;
    engine
        .add_booking(mk_booking(uid, d(2025, 1, 29), d(2025, 2, 3), 300.0))
        .await
        .unwrap();

    let jan = engine.monthly_revenue(2025, 1).await.unwrap();
    let feb = engine.monthly_revenue(2025, 2).await.unwrap();
    assert_eq!(jan[&uid], 180.0);
    assert_eq!(feb[&uid], 120.0);

    let mar = engine.monthly_revenue(2025, 3).await.unwrap();
    assert!(mar.is_empty());
}

#[tokio::test]
async fn monthly_revenue_rejects_bad_month() {
    let engine = Engine::new(test_wal_path("revenue_bad.wal")).unwrap();
    assert!(matches!(
        engine.monthly_revenue(2025, 13).await,
        Err(EngineError::Validation(_))
    ));
}

#[tokio::test]
async fn monthly_issue_costs_filter_by_kind() {
    let (engine, uid) = engine_with_unit("issue_costs.wal").await;
    engine
        .add_issue(mk_issue(uid, IssueKind::Repair, Some(120.0), d(2025, 4, 5)))
        .await
        .unwrap();
    engine
        .add_issue(mk_issue(uid, IssueKind::Replace, Some(380.0), d(2025, 4, 20)))
        .await
        .unwrap();
    // Costless and out-of-month issues do not count.
    engine
        .add_issue(mk_issue(uid, IssueKind::Repair, None, d(2025, 4, 7)))
        .await
        .unwrap();
    engine
        .add_issue(mk_issue(uid, IssueKind::Repair, Some(999.0), d(2025, 5, 1)))
        .await
        .unwrap();

    let all = engine.monthly_issue_costs(2025, 4, None).await.unwrap();
    assert_eq!(all[&uid], 500.0);

    let repairs = engine
        .monthly_issue_costs(2025, 4, Some(IssueKind::Repair))
        .await
        .unwrap();
    assert_eq!(repairs[&uid], 120.0);

    let replacements = engine
        .monthly_issue_costs(2025, 4, Some(IssueKind::Replace))
        .await
        .unwrap();
    assert_eq!(replacements[&uid], 380.0);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let uid = Ulid::new();
    let bid;
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_unit(mk_unit(uid)).await.unwrap();
        let booking = mk_booking(uid, d(2025, 1, 10), d(2025, 1, 15), 500.0);
        bid = booking.id;
        engine.add_booking(booking).await.unwrap();
        engine
            .upsert_calendar_source(uid, "Airbnb", Some("https://example.com/a.ics".into()))
            .await
            .unwrap();
        engine
            .add_issue(mk_issue(uid, IssueKind::Repair, Some(75.0), d(2025, 1, 11)))
            .await
            .unwrap();
    }

    let engine = Engine::new(path).unwrap();
    let booking = engine.get_booking(bid).await.unwrap();
    assert_eq!(booking.price, 500.0);
    assert!(!engine
        .is_available(uid, range(d(2025, 1, 10), d(2025, 1, 15)), None)
        .await
        .unwrap());
    assert_eq!(engine.list_calendar_sources(uid).await.unwrap().len(), 1);
    assert_eq!(engine.list_issues(uid).await.unwrap().len(), 1);
}

#[tokio::test]
async fn compacted_wal_replays_to_same_state() {
    let path = test_wal_path("compact_replay.wal");
    let uid = Ulid::new();
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_unit(mk_unit(uid)).await.unwrap();
        // Churn, then one surviving booking.
        for day in [1u32, 10, 20] {
            let b = mk_booking(uid, d(2025, 7, day), d(2025, 7, day + 2), 100.0);
            let id = b.id;
            engine.add_booking(b).await.unwrap();
            engine.remove_booking(id).await.unwrap();
        }
        engine
            .add_booking(mk_booking(uid, d(2025, 8, 1), d(2025, 8, 5), 640.0))
            .await
            .unwrap();
        engine.compact_wal().await.unwrap();
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    let engine = Engine::new(path).unwrap();
    let bookings = engine.list_bookings(uid).await.unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].price, 640.0);
}

#[tokio::test]
async fn reconcile_batch_is_atomic_on_replay() {
    // A reconciliation pass lands as one flushed batch; replay after the
    // pass sees either all of it or none of it.
    let path = test_wal_path("reconcile_atomic.wal");
    let uid = Ulid::new();
    {
        let engine = Engine::new(path.clone()).unwrap();
        engine.create_unit(mk_unit(uid)).await.unwrap();
        let feed = airbnb_feed(&[
            ("HMATOMIC01", "Reserved", d(2025, 2, 1), d(2025, 2, 5)),
            ("HMATOMIC02", "Reserved", d(2025, 2, 10), d(2025, 2, 12)),
            ("HMATOMIC03", "Reserved", d(2025, 2, 20), d(2025, 2, 22)),
        ]);
        engine.reconcile_feed(&feed, uid, "Airbnb").await.unwrap();
    }

    let engine = Engine::new(path).unwrap();
    assert_eq!(engine.list_bookings(uid).await.unwrap().len(), 3);
}
