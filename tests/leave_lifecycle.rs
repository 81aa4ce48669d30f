mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use chrono::Duration;
use uuid::Uuid;

use common::{date, local, parent_user, staff, started_class_with_student, Fixture, Harness};
use makeup_api::{
    error::AppError,
    models::{
        attendance::AttendanceStatus,
        class::ScheduleStatus,
        makeup::{CancelLeaveBody, LeaveRequestBody, MakeupSchedule, MakeupStatus, MakeupType, RequestedBy},
    },
    services::{leave::LeaveService, makeup::MakeupService, notifications::Notice},
};

fn leave_body(f: &Fixture, reason: &str) -> LeaveRequestBody {
    LeaveRequestBody {
        student_id: Some(f.student_id.to_string()),
        class_id: Some(f.class_id.to_string()),
        schedule_id: Some(f.schedule_id.to_string()),
        reason: Some(reason.into()),
        kind: Some("scheduled".into()),
    }
}

fn cancel_body(f: &Fixture, makeup_id: Uuid) -> CancelLeaveBody {
    CancelLeaveBody {
        makeup_id: Some(makeup_id.to_string()),
        student_id: Some(f.student_id.to_string()),
        class_id: Some(f.class_id.to_string()),
        schedule_id: Some(f.schedule_id.to_string()),
    }
}

#[tokio::test]
async fn leave_to_completed_makeup() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let parent = parent_user(f.parent_id);

    let makeup = LeaveService::create(&h.ctx(), &parent, leave_body(&f, "ไม่สบาย"))
        .await
        .unwrap();

    assert_eq!(makeup.status, MakeupStatus::Pending);
    assert_eq!(makeup.kind, MakeupType::Scheduled);
    assert_eq!(makeup.requested_by, RequestedBy::Parent);
    assert_eq!(makeup.parent_id, f.parent_id);
    assert_eq!(makeup.original_session_number, 5);
    assert_eq!(makeup.original_session_date, local(2025, 3, 11, 9, 0));
    assert_eq!(makeup.request_date, h.now());

    let schedule = h.store.schedule(f.schedule_id);
    let entry = schedule.attendance_for(f.student_id).unwrap();
    assert_eq!(entry.status, AttendanceStatus::Absent);
    assert_eq!(entry.note, "ไม่สบาย");
    assert_eq!(entry.checked_by, f.parent_id.to_string());

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "U-parent-1");
    assert!(matches!(sent[0].1, Notice::LeaveRecorded { .. }));

    let admin = staff();
    let slot = MakeupSchedule {
        date: date(2025, 3, 15),
        start_time: "13:00".into(),
        end_time: "14:30".into(),
    };
    let scheduled = MakeupService::schedule(&h.ctx(), &admin, makeup.id, slot.clone())
        .await
        .unwrap();
    assert_eq!(scheduled.status, MakeupStatus::Scheduled);
    assert_eq!(scheduled.makeup_schedule, Some(slot));
    assert_eq!(scheduled.scheduled_at, Some(h.now()));
    assert!(matches!(
        h.notifier.sent().last().map(|(_, n)| n.kind()),
        Some("makeup_scheduled")
    ));

    h.clock.advance(Duration::days(5));
    let completed = MakeupService::complete(&h.ctx(), &admin, makeup.id)
        .await
        .unwrap();
    assert_eq!(completed.status, MakeupStatus::Completed);
    assert_eq!(completed.completed_at, Some(h.now()));

    let again = MakeupService::complete(&h.ctx(), &admin, makeup.id).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn second_active_leave_for_same_session_is_rejected() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let parent = parent_user(f.parent_id);

    LeaveService::create(&h.ctx(), &parent, leave_body(&f, "ไปต่างจังหวัด"))
        .await
        .unwrap();
    let dup = LeaveService::create(&h.ctx(), &parent, leave_body(&f, "ไปต่างจังหวัด")).await;

    let err = dup.unwrap_err();
    assert!(matches!(err, AppError::DuplicateRequest));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.store.makeup_count(), 1);
}

#[tokio::test]
async fn duplicate_check_also_covers_scheduled_requests() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let makeup = LeaveService::create(&h.ctx(), &staff(), leave_body(&f, ""))
        .await
        .unwrap();
    MakeupService::schedule(
        &h.ctx(),
        &staff(),
        makeup.id,
        MakeupSchedule {
            date: date(2025, 3, 12),
            start_time: "15:00".into(),
            end_time: "16:00".into(),
        },
    )
    .await
    .unwrap();

    let dup = LeaveService::create(&h.ctx(), &staff(), leave_body(&f, "")).await;
    assert!(matches!(dup, Err(AppError::DuplicateRequest)));
}

#[tokio::test]
async fn concurrent_creates_for_one_session_admit_exactly_one() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let ctx = h.ctx();
    let parent = parent_user(f.parent_id);
    let teacher = staff();

    // Both pass the duplicate pre-check; the store's uniqueness rule decides.
    let (first, second) = tokio::join!(
        LeaveService::create(&ctx, &parent, leave_body(&f, "ไม่สบาย")),
        LeaveService::create(&ctx, &teacher, leave_body(&f, "แจ้งโดยครู")),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(AppError::DuplicateRequest)))
            .count(),
        1
    );
    let winner = results.iter().find_map(|r| r.as_ref().ok()).unwrap();
    let stored = h.store.makeups.lock().unwrap().values().cloned().collect::<Vec<_>>();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, winner.id);
}

#[tokio::test]
async fn session_starting_now_counts_as_past() {
    let h = Harness::at(local(2025, 3, 11, 9, 0));
    let f = started_class_with_student(&h);

    let at_start = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, "")).await;
    assert!(matches!(at_start, Err(AppError::PastDate)));

    h.clock.advance(Duration::hours(3));
    let after = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, "")).await;
    assert!(matches!(after, Err(AppError::PastDate)));

    assert_eq!(h.store.makeup_count(), 0);
    assert!(h.store.schedule(f.schedule_id).attendance.is_empty());
}

#[tokio::test]
async fn one_second_before_start_is_still_upcoming() {
    let h = Harness::at(local(2025, 3, 11, 9, 0) - Duration::seconds(1));
    let f = started_class_with_student(&h);

    let result = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, "")).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn cancel_deletes_request_and_clears_absence() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let parent = parent_user(f.parent_id);

    let makeup = LeaveService::create(&h.ctx(), &parent, leave_body(&f, "ไม่สบาย"))
        .await
        .unwrap();
    assert!(h.store.schedule(f.schedule_id).attendance_for(f.student_id).is_some());

    LeaveService::cancel(&h.ctx(), &parent, cancel_body(&f, makeup.id))
        .await
        .unwrap();

    assert!(h.store.makeup(makeup.id).is_none());
    assert!(h.store.schedule(f.schedule_id).attendance_for(f.student_id).is_none());

    // Cancelled requests are gone, so a second cancel sees nothing pending.
    let again = LeaveService::cancel(&h.ctx(), &parent, cancel_body(&f, makeup.id)).await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));

    // The session is free again.
    assert!(LeaveService::create(&h.ctx(), &parent, leave_body(&f, "")).await.is_ok());
}

#[tokio::test]
async fn cancel_after_session_started_is_rejected() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let parent = parent_user(f.parent_id);
    let makeup = LeaveService::create(&h.ctx(), &parent, leave_body(&f, ""))
        .await
        .unwrap();

    h.clock.set(local(2025, 3, 11, 9, 0));
    let result = LeaveService::cancel(&h.ctx(), &parent, cancel_body(&f, makeup.id)).await;

    assert!(matches!(result, Err(AppError::PastDate)));
    assert_eq!(h.store.makeup(makeup.id).unwrap().status, MakeupStatus::Pending);
}

#[tokio::test]
async fn cancel_of_scheduled_request_is_rejected() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let parent = parent_user(f.parent_id);
    let makeup = LeaveService::create(&h.ctx(), &parent, leave_body(&f, ""))
        .await
        .unwrap();
    MakeupService::schedule(
        &h.ctx(),
        &staff(),
        makeup.id,
        MakeupSchedule {
            date: date(2025, 3, 14),
            start_time: "10:00".into(),
            end_time: "11:00".into(),
        },
    )
    .await
    .unwrap();

    let result = LeaveService::cancel(&h.ctx(), &parent, cancel_body(&f, makeup.id)).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
    assert!(h.store.makeup(makeup.id).is_some());
}

#[tokio::test]
async fn cancel_with_mismatched_identifiers_is_rejected() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let parent = parent_user(f.parent_id);
    let makeup = LeaveService::create(&h.ctx(), &parent, leave_body(&f, ""))
        .await
        .unwrap();

    let mut body = cancel_body(&f, makeup.id);
    body.schedule_id = Some(Uuid::new_v4().to_string());
    let result = LeaveService::cancel(&h.ctx(), &parent, body).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(h.store.makeup(makeup.id).is_some());
}

#[tokio::test]
async fn parent_cannot_act_for_another_family() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    let stranger = parent_user(h.add_parent(Some("U-other")));

    let create = LeaveService::create(&h.ctx(), &stranger, leave_body(&f, "")).await;
    assert!(matches!(create, Err(AppError::Forbidden)));

    let makeup = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, ""))
        .await
        .unwrap();
    let cancel = LeaveService::cancel(&h.ctx(), &stranger, cancel_body(&f, makeup.id)).await;
    assert!(matches!(cancel, Err(AppError::Forbidden)));
    assert!(h.store.makeup(makeup.id).is_some());
}

#[tokio::test]
async fn missing_references_are_not_found() {
    let h = Harness::new();
    let f = started_class_with_student(&h);

    let mut no_enrollment = leave_body(&f, "");
    no_enrollment.student_id = Some(Uuid::new_v4().to_string());
    let err = LeaveService::create(&h.ctx(), &staff(), no_enrollment)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "enrollment" }));
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let mut no_schedule = leave_body(&f, "");
    no_schedule.schedule_id = Some(Uuid::new_v4().to_string());
    let err = LeaveService::create(&h.ctx(), &staff(), no_schedule)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound { entity: "schedule" }));
}

#[tokio::test]
async fn cancelled_session_cannot_be_excused() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    h.store
        .schedules
        .lock()
        .unwrap()
        .get_mut(&f.schedule_id)
        .unwrap()
        .status = ScheduleStatus::Cancelled;

    let result = LeaveService::create(&h.ctx(), &staff(), leave_body(&f, "")).await;
    assert!(matches!(result, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn blank_or_malformed_fields_fail_validation() {
    let h = Harness::new();
    let f = started_class_with_student(&h);

    let mut missing = leave_body(&f, "");
    missing.class_id = None;
    assert!(matches!(
        LeaveService::create(&h.ctx(), &staff(), missing).await,
        Err(AppError::Validation(_))
    ));

    let mut bad_type = leave_body(&f, "");
    bad_type.kind = Some("weekly".into());
    assert!(matches!(
        LeaveService::create(&h.ctx(), &staff(), bad_type).await,
        Err(AppError::Validation(_))
    ));

    let long_reason = "ก".repeat(501);
    assert!(matches!(
        LeaveService::create(&h.ctx(), &staff(), leave_body(&f, &long_reason)).await,
        Err(AppError::Validation(_))
    ));

    let mut ad_hoc = leave_body(&f, "");
    ad_hoc.kind = Some("ad-hoc".into());
    let makeup = LeaveService::create(&h.ctx(), &staff(), ad_hoc).await.unwrap();
    assert_eq!(makeup.kind, MakeupType::AdHoc);
    assert_eq!(makeup.requested_by, RequestedBy::Staff);
}

#[tokio::test]
async fn attendance_failure_does_not_undo_the_leave() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    h.store.attendance_down.store(true, Ordering::SeqCst);

    let makeup = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, ""))
        .await
        .unwrap();

    assert_eq!(h.store.makeup(makeup.id).unwrap().status, MakeupStatus::Pending);
    assert!(h.store.schedule(f.schedule_id).attendance.is_empty());

    LeaveService::cancel(&h.ctx(), &parent_user(f.parent_id), cancel_body(&f, makeup.id))
        .await
        .unwrap();
    assert!(h.store.makeup(makeup.id).is_none());
}

#[tokio::test]
async fn parent_without_line_account_still_gets_a_leave() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    h.store
        .parents
        .lock()
        .unwrap()
        .get_mut(&f.parent_id)
        .unwrap()
        .line_user_id = None;

    let result = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, "")).await;

    assert!(result.is_ok());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn class_lookup_outage_still_confirms_the_leave() {
    let h = Harness::new();
    let f = started_class_with_student(&h);
    h.store.class_lookup_down.store(true, Ordering::SeqCst);

    let makeup = LeaveService::create(&h.ctx(), &parent_user(f.parent_id), leave_body(&f, ""))
        .await
        .unwrap();

    assert_eq!(makeup.status, MakeupStatus::Pending);
    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].1 {
        Notice::LeaveRecorded {
            student_name,
            class_name,
            ..
        } => {
            assert_eq!(student_name, "Ploy");
            assert!(class_name.is_empty());
        }
        other => panic!("unexpected notice {other:?}"),
    }
}
