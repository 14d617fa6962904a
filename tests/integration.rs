//! Service-level tests against an in-memory database.

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use tutorhub::{
    auth::{self, Caller},
    db,
    discovery::{self, SearchFilters},
    error::ApiError,
    locations::{self, NewLocation},
    meetings::{self, ProposeMeeting, ReviewInput, View},
    messages,
    models::{HourlyRate, Level, Role},
    profiles::{self, student::NewStudent, tutor::NewTutor},
};

async fn test_pool() -> SqlitePool {
    let options = "sqlite::memory:"
        .parse::<SqliteConnectOptions>()
        .unwrap()
        .foreign_keys(true);
    // one connection so every query sees the same in-memory database
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    db::init_schema(&pool).await.unwrap();
    pool
}

async fn account(pool: &SqlitePool, username: &str) -> Caller {
    let account = auth::register_account(pool, username, username).await.unwrap();
    auth::caller_by_account(pool, account.id).await.unwrap()
}

async fn refresh(pool: &SqlitePool, caller: &Caller) -> Caller {
    auth::caller_by_account(pool, caller.account.id).await.unwrap()
}

fn student_payload() -> NewStudent {
    NewStudent {
        date_of_birth: None,
        gender: String::new(),
        locations: Vec::new(),
    }
}

fn tutor_payload() -> NewTutor {
    NewTutor {
        date_of_birth: None,
        gender: String::new(),
        hourly_rate: Some(HourlyRate::from_cents(3000).unwrap()),
        subjects: vec!["math".into()],
        level: Some(Level::Bachelor),
        available: true,
        locations: Vec::new(),
    }
}

async fn student(pool: &SqlitePool, username: &str) -> Caller {
    let caller = account(pool, username).await;
    profiles::student::create_student_profile(pool, &caller, student_payload())
        .await
        .unwrap();
    refresh(pool, &caller).await
}

async fn tutor(pool: &SqlitePool, username: &str, payload: NewTutor) -> Caller {
    let caller = account(pool, username).await;
    profiles::tutor::create_tutor_profile(pool, &caller, payload)
        .await
        .unwrap();
    refresh(pool, &caller).await
}

async fn matched_pair(pool: &SqlitePool) -> (Caller, Caller) {
    let s = student(pool, "alice").await;
    let t = tutor(pool, "bob", tutor_payload()).await;
    profiles::student::add_to_my_tutors(pool, &s, t.tutor_id().unwrap())
        .await
        .unwrap();
    (s, t)
}

fn loc(latitude: f64, longitude: f64) -> NewLocation {
    NewLocation {
        address: "1 Test Street".into(),
        google_id: String::new(),
        latitude,
        longitude,
    }
}

fn next_week() -> (OffsetDateTime, OffsetDateTime) {
    let start = OffsetDateTime::now_utc() + Duration::days(7);
    (start, start + Duration::hours(1))
}

fn last_week() -> (OffsetDateTime, OffsetDateTime) {
    let start = OffsetDateTime::now_utc() - Duration::days(7);
    (start, start + Duration::hours(1))
}

fn proposal(counterpart_id: Uuid, window: (OffsetDateTime, OffsetDateTime)) -> ProposeMeeting {
    ProposeMeeting {
        counterpart_id,
        starts_at: window.0,
        ends_at: window.1,
        location: None,
    }
}

async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(sql).fetch_one(pool).await.unwrap();
    n
}

#[tokio::test]
async fn accounts_start_without_role_or_profile() {
    let pool = test_pool().await;
    let caller = account(&pool, "casper").await;
    assert!(caller.account.role.is_none());
    assert!(caller.profile.is_none());
    assert!(matches!(caller.profile(), Err(ApiError::Forbidden(_))));
}

#[tokio::test]
async fn claiming_a_second_profile_is_rejected() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;

    let err = profiles::tutor::create_tutor_profile(&pool, &s, tutor_payload())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(err.to_string(), "profile already exists");
    // no stray tutor row from the failed claim
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM tutors").await, 0);
}

#[tokio::test]
async fn profile_deletion_releases_the_role() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;
    let student_id = s.student_id().unwrap();

    profiles::student::delete_student_profile(&pool, &s, student_id)
        .await
        .unwrap();

    let reset = refresh(&pool, &s).await;
    assert!(reset.account.role.is_none());
    assert!(reset.profile.is_none());

    // the account can start over with the other role
    profiles::tutor::create_tutor_profile(&pool, &reset, tutor_payload())
        .await
        .unwrap();
}

#[tokio::test]
async fn deleting_a_profile_you_do_not_own_is_refused() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;
    let other = student(&pool, "mallory").await;

    let err = profiles::student::delete_student_profile(&pool, &other, s.student_id().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));

    let missing = profiles::student::delete_student_profile(&pool, &s, Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(missing, ApiError::NotFound(_)));
}

#[tokio::test]
async fn profile_deletion_takes_locations_and_nulls_the_thread_side() {
    let pool = test_pool().await;
    let caller = account(&pool, "alice").await;
    profiles::student::create_student_profile(
        &pool,
        &caller,
        NewStudent {
            locations: vec![loc(48.85, 2.35)],
            ..student_payload()
        },
    )
    .await
    .unwrap();
    let s = refresh(&pool, &caller).await;
    let t = tutor(&pool, "bob", tutor_payload()).await;
    let tutor_id = t.tutor_id().unwrap();

    profiles::student::add_to_my_tutors(&pool, &s, tutor_id)
        .await
        .unwrap();
    messages::send_message(&pool, &s, tutor_id, "hello").await.unwrap();

    profiles::student::delete_student_profile(&pool, &s, s.student_id().unwrap())
        .await
        .unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM locations").await, 0);
    // the conversation survives with the student side nulled out
    let threads = messages::list_threads(&pool, &t).await.unwrap();
    assert_eq!(threads.len(), 1);
    assert!(threads[0].student_id.is_none());
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM messages").await, 1);
}

#[tokio::test]
async fn adding_a_tutor_is_idempotent_and_opens_the_thread() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;
    let t = tutor(&pool, "bob", tutor_payload()).await;
    let tutor_id = t.tutor_id().unwrap();

    profiles::student::add_to_my_tutors(&pool, &s, tutor_id)
        .await
        .unwrap();
    profiles::student::add_to_my_tutors(&pool, &s, tutor_id)
        .await
        .unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM student_tutors").await, 1);
    assert_eq!(messages::list_threads(&pool, &s).await.unwrap().len(), 1);

    let unknown = profiles::student::add_to_my_tutors(&pool, &s, Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(unknown, ApiError::NotFound(_)));
}

#[tokio::test]
async fn removing_a_tutor_keeps_the_thread() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let tutor_id = t.tutor_id().unwrap();

    profiles::student::remove_from_my_tutors(&pool, &s, tutor_id)
        .await
        .unwrap();

    assert_eq!(count(&pool, "SELECT COUNT(*) FROM student_tutors").await, 0);
    assert_eq!(messages::list_threads(&pool, &s).await.unwrap().len(), 1);
}

#[tokio::test]
async fn locations_crud_stays_within_the_owning_profile() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;

    let saved = locations::add_location(&pool, &s, &loc(48.85, 2.35))
        .await
        .unwrap();
    assert_eq!(locations::list_locations(&pool, &s).await.unwrap().len(), 1);

    let mut blank = loc(48.85, 2.35);
    blank.address = "   ".into();
    let err = locations::update_location(&pool, &s, saved.id, &blank)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let mut revised = loc(48.86, 2.36);
    revised.address = "2 Moved Street".into();
    let updated = locations::update_location(&pool, &s, saved.id, &revised)
        .await
        .unwrap();
    assert_eq!(updated.address, "2 Moved Street");
    let listed = &locations::list_locations(&pool, &s).await.unwrap()[0];
    assert_eq!(listed.latitude, 48.86);

    locations::delete_location(&pool, &s, saved.id).await.unwrap();
    assert!(locations::list_locations(&pool, &s).await.unwrap().is_empty());
}

#[tokio::test]
async fn another_profiles_location_reads_as_missing() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;
    let other = student(&pool, "mallory").await;
    let t = tutor(&pool, "bob", tutor_payload()).await;
    let saved = locations::add_location(&pool, &s, &loc(48.85, 2.35))
        .await
        .unwrap();

    for caller in [&other, &t] {
        let err = locations::update_location(&pool, caller, saved.id, &loc(0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err = locations::delete_location(&pool, caller, saved.id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    // the failed attempts left the row untouched
    let kept = &locations::list_locations(&pool, &s).await.unwrap()[0];
    assert_eq!(kept.address, "1 Test Street");
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM locations").await, 1);
}

#[tokio::test]
async fn invalid_locations_are_rejected_and_roll_back() {
    let pool = test_pool().await;
    let caller = account(&pool, "alice").await;

    let mut blank = loc(48.85, 2.35);
    blank.address = "   ".into();
    let err = profiles::student::create_student_profile(
        &pool,
        &caller,
        NewStudent {
            locations: vec![blank],
            ..student_payload()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "address must not be empty");

    let err = profiles::student::create_student_profile(
        &pool,
        &caller,
        NewStudent {
            locations: vec![loc(95.0, 2.35)],
            ..student_payload()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "coordinates out of range");

    // both creates rolled back whole, role claim included
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM students").await, 0);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM locations").await, 0);
    assert!(refresh(&pool, &caller).await.account.role.is_none());

    // the standalone surface rejects the same payloads
    let s = student(&pool, "bob").await;
    let err = locations::add_location(&pool, &s, &loc(48.85, 200.0))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn propose_stamps_only_the_proposing_side() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;

    let created = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), next_week()))
        .await
        .unwrap();
    assert!(created.meeting.student_accepted_at.is_some());
    assert!(created.meeting.tutor_accepted_at.is_none());
    assert!(!created.is_accepted);
    assert!(!created.is_cancelled);
}

#[tokio::test]
async fn the_tutor_side_can_propose_too() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;

    let created =
        meetings::propose_meeting(&pool, &t, proposal(s.student_id().unwrap(), next_week()))
            .await
            .unwrap();
    assert!(created.meeting.tutor_accepted_at.is_some());
    assert!(created.meeting.student_accepted_at.is_none());
}

#[tokio::test]
async fn propose_rejects_an_inverted_interval() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let (start, _) = next_week();

    let backwards = ProposeMeeting {
        counterpart_id: t.tutor_id().unwrap(),
        starts_at: start,
        ends_at: start - Duration::hours(1),
        location: None,
    };
    let err = meetings::propose_meeting(&pool, &s, backwards).await.unwrap_err();
    assert_eq!(err.to_string(), "start date must be before end date");

    let empty = ProposeMeeting {
        counterpart_id: t.tutor_id().unwrap(),
        starts_at: start,
        ends_at: start,
        location: None,
    };
    assert!(matches!(
        meetings::propose_meeting(&pool, &s, empty).await,
        Err(ApiError::Validation(_))
    ));
}

#[tokio::test]
async fn propose_requires_a_matched_counterpart() {
    let pool = test_pool().await;
    let s = student(&pool, "alice").await;
    let t = tutor(&pool, "bob", tutor_payload()).await;

    let err = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), next_week()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "tutor not in my tutors");

    let err = meetings::propose_meeting(&pool, &t, proposal(s.student_id().unwrap(), next_week()))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "student not in my students");
}

#[tokio::test]
async fn a_proposal_can_carry_a_venue() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;

    let mut payload = proposal(t.tutor_id().unwrap(), next_week());
    payload.location = Some(loc(48.86, 2.35));
    let created = meetings::propose_meeting(&pool, &s, payload).await.unwrap();

    let venue = created.location.expect("venue should be attached");
    assert_eq!(venue.address, "1 Test Street");
    // meeting venues belong to nobody
    assert_eq!(
        count(
            &pool,
            "SELECT COUNT(*) FROM locations \
             WHERE student_id IS NULL AND tutor_id IS NULL"
        )
        .await,
        1
    );
}

#[tokio::test]
async fn acceptance_completes_once_both_sides_stamp() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let created = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), next_week()))
        .await
        .unwrap();

    meetings::accept_meeting(&pool, &t, created.meeting.id)
        .await
        .unwrap();

    let listed = meetings::list_meetings(&pool, &t, None).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_accepted);
    assert!(listed[0].meeting.student_accepted_at.is_some());
    assert!(listed[0].meeting.tutor_accepted_at.is_some());
}

#[tokio::test]
async fn cancel_and_reopen_touch_only_your_own_side() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let created = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), next_week()))
        .await
        .unwrap();
    let id = created.meeting.id;

    meetings::cancel_meeting(&pool, &t, id).await.unwrap();
    meetings::cancel_meeting(&pool, &s, id).await.unwrap();

    let m = &meetings::list_meetings(&pool, &s, None).await.unwrap()[0];
    assert!(m.meeting.student_cancelled_at.is_some());
    assert!(m.meeting.tutor_cancelled_at.is_some());
    assert!(m.is_cancelled);

    // the student reopening clears the student stamp only
    assert!(meetings::reopen_meeting(&pool, &s, id).await.unwrap());
    let m = &meetings::list_meetings(&pool, &s, None).await.unwrap()[0];
    assert!(m.meeting.student_cancelled_at.is_none());
    assert!(m.meeting.tutor_cancelled_at.is_some());
    assert!(m.is_cancelled);

    assert!(meetings::reopen_meeting(&pool, &t, id).await.unwrap());
    let m = &meetings::list_meetings(&pool, &s, None).await.unwrap()[0];
    assert!(!m.is_cancelled);
}

#[tokio::test]
async fn reopening_an_open_side_is_a_no_op() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let created = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), next_week()))
        .await
        .unwrap();

    assert!(!meetings::reopen_meeting(&pool, &s, created.meeting.id).await.unwrap());
}

#[tokio::test]
async fn another_pairs_meeting_reads_as_missing() {
    let pool = test_pool().await;
    let (s1, t1) = matched_pair(&pool).await;
    let created =
        meetings::propose_meeting(&pool, &s1, proposal(t1.tutor_id().unwrap(), next_week()))
            .await
            .unwrap();

    let outsider = student(&pool, "mallory").await;
    let err = meetings::accept_meeting(&pool, &outsider, created.meeting.id)
        .await
        .unwrap_err();
    // scope violations are not-found, never forbidden
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn meeting_views_partition_by_purpose() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let tutor_id = t.tutor_id().unwrap();

    let old = meetings::propose_meeting(
        &pool,
        &s,
        proposal(tutor_id, (last_week().0 - Duration::days(7), last_week().1 - Duration::days(7))),
    )
    .await
    .unwrap();
    let recent = meetings::propose_meeting(&pool, &s, proposal(tutor_id, last_week()))
        .await
        .unwrap();
    let upcoming = meetings::propose_meeting(&pool, &s, proposal(tutor_id, next_week()))
        .await
        .unwrap();
    let cancelled = meetings::propose_meeting(
        &pool,
        &s,
        proposal(tutor_id, (next_week().0 + Duration::days(1), next_week().1 + Duration::days(1))),
    )
    .await
    .unwrap();
    meetings::accept_meeting(&pool, &t, cancelled.meeting.id).await.unwrap();
    meetings::cancel_meeting(&pool, &t, cancelled.meeting.id).await.unwrap();

    // past is shared and runs newest ended first
    let past: Vec<Uuid> = meetings::list_meetings(&pool, &s, Some(View::Past))
        .await
        .unwrap()
        .iter()
        .map(|m| m.meeting.id)
        .collect();
    assert_eq!(past, vec![recent.meeting.id, old.meeting.id]);

    // the proposer accepted already, so the upcoming one is their future
    let future: Vec<Uuid> = meetings::list_meetings(&pool, &s, Some(View::Future))
        .await
        .unwrap()
        .iter()
        .map(|m| m.meeting.id)
        .collect();
    assert_eq!(future, vec![upcoming.meeting.id]);
    assert!(meetings::list_meetings(&pool, &s, Some(View::Requests))
        .await
        .unwrap()
        .is_empty());

    // the counterpart still has it pending
    let requests: Vec<Uuid> = meetings::list_meetings(&pool, &t, Some(View::Requests))
        .await
        .unwrap()
        .iter()
        .map(|m| m.meeting.id)
        .collect();
    assert_eq!(requests, vec![upcoming.meeting.id]);
    assert!(meetings::list_meetings(&pool, &t, Some(View::Future))
        .await
        .unwrap()
        .is_empty());

    // a cancelled upcoming meeting is in nobody's future or requests
    for caller in [&s, &t] {
        for view in [View::Future, View::Requests] {
            assert!(!meetings::list_meetings(&pool, caller, Some(view))
                .await
                .unwrap()
                .iter()
                .any(|m| m.meeting.id == cancelled.meeting.id));
        }
    }
}

#[tokio::test]
async fn reviews_wait_for_the_meeting_to_end() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let upcoming = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), next_week()))
        .await
        .unwrap();

    let err = meetings::upsert_review(
        &pool,
        &s,
        upcoming.meeting.id,
        ReviewInput {
            rating: 4,
            comment: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "cannot review meetings in the future");
}

#[tokio::test]
async fn only_the_student_side_reviews() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let past = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), last_week()))
        .await
        .unwrap();

    let err = meetings::upsert_review(
        &pool,
        &t,
        past.meeting.id,
        ReviewInput {
            rating: 4,
            comment: String::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn review_ratings_stay_between_zero_and_five() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let past = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), last_week()))
        .await
        .unwrap();

    for bad in [-1, 6] {
        let err = meetings::upsert_review(
            &pool,
            &s,
            past.meeting.id,
            ReviewInput {
                rating: bad,
                comment: String::new(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    for ok in [0, 5] {
        meetings::upsert_review(
            &pool,
            &s,
            past.meeting.id,
            ReviewInput {
                rating: ok,
                comment: String::new(),
            },
        )
        .await
        .unwrap();
    }
}

#[tokio::test]
async fn reviews_upsert_and_feed_the_rating_aggregate() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let tutor_id = t.tutor_id().unwrap();
    let past = meetings::propose_meeting(&pool, &s, proposal(tutor_id, last_week()))
        .await
        .unwrap();

    assert_eq!(
        profiles::tutor::tutor_detail_card(&pool, tutor_id).await.unwrap().rating,
        0.0
    );

    meetings::upsert_review(
        &pool,
        &s,
        past.meeting.id,
        ReviewInput {
            rating: 4,
            comment: "solid".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(
        profiles::tutor::tutor_detail_card(&pool, tutor_id).await.unwrap().rating,
        4.0
    );

    // a second submission overwrites instead of stacking
    meetings::upsert_review(
        &pool,
        &s,
        past.meeting.id,
        ReviewInput {
            rating: 2,
            comment: "changed my mind".into(),
        },
    )
    .await
    .unwrap();
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM reviews").await, 1);
    assert_eq!(
        profiles::tutor::tutor_detail_card(&pool, tutor_id).await.unwrap().rating,
        2.0
    );
}

#[tokio::test]
async fn deleting_an_absent_review_is_a_no_op() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let past = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), last_week()))
        .await
        .unwrap();

    assert!(!meetings::delete_review(&pool, &s, past.meeting.id).await.unwrap());

    meetings::upsert_review(
        &pool,
        &s,
        past.meeting.id,
        ReviewInput {
            rating: 3,
            comment: String::new(),
        },
    )
    .await
    .unwrap();
    assert!(meetings::delete_review(&pool, &s, past.meeting.id).await.unwrap());
    assert_eq!(
        profiles::tutor::tutor_detail_card(&pool, t.tutor_id().unwrap())
            .await
            .unwrap()
            .rating,
        0.0
    );
}

#[tokio::test]
async fn search_applies_the_price_ceiling() {
    let pool = test_pool().await;
    tutor(
        &pool,
        "cheap",
        NewTutor {
            hourly_rate: Some(HourlyRate::from_cents(3000).unwrap()),
            ..tutor_payload()
        },
    )
    .await;
    tutor(
        &pool,
        "pricey",
        NewTutor {
            hourly_rate: Some(HourlyRate::from_cents(4500).unwrap()),
            ..tutor_payload()
        },
    )
    .await;
    tutor(
        &pool,
        "unpriced",
        NewTutor {
            hourly_rate: None,
            ..tutor_payload()
        },
    )
    .await;

    let filters = SearchFilters {
        hourly_rate: Some(HourlyRate::from_major(35.0).unwrap()),
        ..Default::default()
    };
    let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].display_name, "cheap");
}

#[tokio::test]
async fn search_matches_subjects_exactly() {
    let pool = test_pool().await;
    tutor(
        &pool,
        "bob",
        NewTutor {
            subjects: vec!["math".into(), "physics".into()],
            ..tutor_payload()
        },
    )
    .await;
    tutor(
        &pool,
        "carol",
        NewTutor {
            subjects: vec!["mathematics".into()],
            ..tutor_payload()
        },
    )
    .await;

    let filters = SearchFilters {
        subject: Some("math".into()),
        ..Default::default()
    };
    let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].display_name, "bob");
}

#[tokio::test]
async fn a_blank_subject_filter_is_skipped() {
    let pool = test_pool().await;
    tutor(&pool, "bob", tutor_payload()).await;

    for subject in ["", "   "] {
        let filters = SearchFilters {
            subject: Some(subject.into()),
            ..Default::default()
        };
        let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
        assert_eq!(cards.len(), 1, "subject {subject:?} must not filter");
    }

    // surrounding whitespace is trimmed before matching
    let filters = SearchFilters {
        subject: Some(" math ".into()),
        ..Default::default()
    };
    assert_eq!(
        discovery::search_tutors(&pool, &filters).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn search_level_cascades_upward() {
    let pool = test_pool().await;
    for (name, level) in [
        ("bachelor", Level::Bachelor),
        ("master", Level::Master),
        ("phd", Level::Phd),
    ] {
        tutor(
            &pool,
            name,
            NewTutor {
                level: Some(level),
                ..tutor_payload()
            },
        )
        .await;
    }

    let filters = SearchFilters {
        level: Some(Level::Master),
        ..Default::default()
    };
    let mut names: Vec<String> = discovery::search_tutors(&pool, &filters)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.display_name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["master", "phd"]);

    let filters = SearchFilters {
        level: Some(Level::Phd),
        ..Default::default()
    };
    let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].display_name, "phd");
}

#[tokio::test]
async fn search_never_returns_unavailable_tutors() {
    let pool = test_pool().await;
    tutor(
        &pool,
        "away",
        NewTutor {
            available: false,
            ..tutor_payload()
        },
    )
    .await;
    tutor(&pool, "around", tutor_payload()).await;

    let cards = discovery::search_tutors(&pool, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].display_name, "around");
}

#[tokio::test]
async fn search_applies_the_proximity_radius() {
    let pool = test_pool().await;
    let (lat, lon) = (48.85, 2.35);
    // about one degree of latitude per 111.195 km
    tutor(
        &pool,
        "near",
        NewTutor {
            locations: vec![loc(lat + 9.0 / 111.195, lon)],
            ..tutor_payload()
        },
    )
    .await;
    tutor(
        &pool,
        "far",
        NewTutor {
            locations: vec![loc(lat + 11.0 / 111.195, lon)],
            ..tutor_payload()
        },
    )
    .await;

    let filters = SearchFilters {
        near: Some(format!("{lon},{lat}")),
        ..Default::default()
    };
    let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].display_name, "near");
    let distance = cards[0].distance_km.expect("distance should be annotated");
    assert!((distance - 9.0).abs() < 0.05, "got {distance}");
}

#[tokio::test]
async fn a_malformed_point_switches_the_proximity_filter_off() {
    let pool = test_pool().await;
    tutor(
        &pool,
        "bob",
        NewTutor {
            locations: vec![loc(48.85, 2.35)],
            ..tutor_payload()
        },
    )
    .await;
    tutor(&pool, "nowhere", tutor_payload()).await;

    let filters = SearchFilters {
        near: Some("not-a-point".into()),
        ..Default::default()
    };
    let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
    assert_eq!(cards.len(), 2);
    assert!(cards.iter().all(|c| c.distance_km.is_none()));
}

#[tokio::test]
async fn search_applies_the_rating_floor() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    tutor(&pool, "unrated", tutor_payload()).await;
    let past = meetings::propose_meeting(&pool, &s, proposal(t.tutor_id().unwrap(), last_week()))
        .await
        .unwrap();
    meetings::upsert_review(
        &pool,
        &s,
        past.meeting.id,
        ReviewInput {
            rating: 3,
            comment: String::new(),
        },
    )
    .await
    .unwrap();

    assert_eq!(
        discovery::search_tutors(&pool, &SearchFilters::default())
            .await
            .unwrap()
            .len(),
        2
    );

    let filters = SearchFilters {
        rating: Some(2.0),
        ..Default::default()
    };
    let cards = discovery::search_tutors(&pool, &filters).await.unwrap();
    assert_eq!(cards.len(), 1);
    assert_eq!(cards[0].display_name, "bob");
    assert_eq!(cards[0].rating, 3.0);
}

#[tokio::test]
async fn messages_come_back_in_send_order_to_both_sides() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let tutor_id = t.tutor_id().unwrap();
    let student_id = s.student_id().unwrap();

    messages::send_message(&pool, &s, tutor_id, "hi").await.unwrap();
    messages::send_message(&pool, &t, student_id, "hello").await.unwrap();
    messages::send_message(&pool, &s, tutor_id, "when can we start?")
        .await
        .unwrap();

    let from_student = messages::list_messages(&pool, &s, tutor_id).await.unwrap();
    let from_tutor = messages::list_messages(&pool, &t, student_id).await.unwrap();

    let contents: Vec<&str> = from_student.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "hello", "when can we start?"]);
    let senders: Vec<Role> = from_student.iter().map(|m| m.sent_by).collect();
    assert_eq!(senders, vec![Role::Student, Role::Tutor, Role::Student]);

    assert_eq!(from_student.len(), from_tutor.len());
    for (a, b) in from_student.iter().zip(from_tutor.iter()) {
        assert_eq!(a.id, b.id);
    }
}

#[tokio::test]
async fn strangers_cannot_read_or_write_the_conversation() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    messages::send_message(&pool, &s, t.tutor_id().unwrap(), "hi")
        .await
        .unwrap();

    let outsider = student(&pool, "mallory").await;
    let err = messages::list_messages(&pool, &outsider, t.tutor_id().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let err = messages::send_message(&pool, &outsider, t.tutor_id().unwrap(), "let me in")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
    // and no thread came into being for the outsider
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM message_threads").await, 1);
}

#[tokio::test]
async fn blank_messages_are_rejected() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;

    let err = messages::send_message(&pool, &s, t.tutor_id().unwrap(), "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn an_existing_thread_outlives_the_match() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let tutor_id = t.tutor_id().unwrap();
    messages::send_message(&pool, &s, tutor_id, "hi").await.unwrap();

    profiles::student::remove_from_my_tutors(&pool, &s, tutor_id)
        .await
        .unwrap();

    // history stays writable for the old pair
    messages::send_message(&pool, &t, s.student_id().unwrap(), "still here")
        .await
        .unwrap();
    let thread = messages::list_messages(&pool, &s, tutor_id).await.unwrap();
    assert_eq!(thread.len(), 2);
}

#[tokio::test]
async fn first_contacts_converge_on_the_pairs_single_thread() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let existing = messages::list_threads(&pool, &s).await.unwrap()[0].id;

    // each side's first send re-runs the get-or-create against the row the
    // match already opened
    let first = messages::send_message(&pool, &s, t.tutor_id().unwrap(), "hi")
        .await
        .unwrap();
    let second = messages::send_message(&pool, &t, s.student_id().unwrap(), "hello")
        .await
        .unwrap();

    assert_eq!(first.thread_id, existing);
    assert_eq!(second.thread_id, existing);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM message_threads").await, 1);
}

#[tokio::test]
async fn booking_flow_end_to_end() {
    let pool = test_pool().await;
    let (s, t) = matched_pair(&pool).await;
    let tutor_id = t.tutor_id().unwrap();

    let created = meetings::propose_meeting(
        &pool,
        &s,
        ProposeMeeting {
            counterpart_id: tutor_id,
            starts_at: datetime!(2021-03-05 12:00 UTC),
            ends_at: datetime!(2021-03-05 13:00 UTC),
            location: None,
        },
    )
    .await
    .unwrap();
    assert!(created.meeting.student_accepted_at.is_some());
    assert!(created.meeting.tutor_accepted_at.is_none());

    meetings::accept_meeting(&pool, &t, created.meeting.id)
        .await
        .unwrap();
    let accepted = &meetings::list_meetings(&pool, &t, Some(View::Past)).await.unwrap()[0];
    assert!(accepted.is_accepted);

    meetings::upsert_review(
        &pool,
        &s,
        created.meeting.id,
        ReviewInput {
            rating: 3,
            comment: "good session".into(),
        },
    )
    .await
    .unwrap();

    assert_eq!(
        profiles::tutor::tutor_detail_card(&pool, tutor_id).await.unwrap().rating,
        3.0
    );
}
