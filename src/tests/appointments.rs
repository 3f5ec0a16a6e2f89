use axum::http::Method;
use axum::http::StatusCode;
use chrono::DateTime;
use chrono::Duration;
use chrono::DurationRound;
use chrono::Utc;
use serde_json::json;

use crate::storage::Storage;
use crate::tests::helper;

/// A whole minute in the future, so durations come out exact
fn in_hours(hours: i64) -> DateTime<Utc> {
    Utc::now().duration_trunc(Duration::minutes(1)).unwrap() + Duration::hours(hours)
}

#[tokio::test]
async fn test_create_appointment() {
    let mut test_app = helper::setup_test_app().await;
    let app = &mut test_app.router;

    let access_token = helper::login(app).await;
    let start = in_hours(48);

    // default duration without an end
    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({ "title": "  Dentist ", "location": "Main street 1", "startDateTime": start }),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    let appointment = &body["data"];
    assert_eq!("Dentist", appointment["title"]);
    assert_eq!("SCHEDULED", appointment["status"]);
    assert_eq!(60, appointment["duration"]);
    assert_eq!(false, appointment["reminderSent"]);
    assert!(appointment["reminderSentAt"].is_null());
    assert!(appointment["description"].is_null());

    // explicit end
    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({
            "title": "Checkup",
            "startDateTime": start,
            "endDateTime": start + Duration::minutes(45),
        }),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    assert_eq!(45, body["data"]["duration"]);

    // explicit duration
    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({ "title": "Call", "startDateTime": start, "duration": 15 }),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    assert_eq!(15, body["data"]["duration"]);

    // default duration follows the preferences
    let (status_code, _) = helper::request(
        app,
        Method::PUT,
        "/api/users/me/preferences",
        Some(&access_token),
        Some(json!({ "defaultAppointmentDuration": 30 })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({ "title": "Standup", "startDateTime": start }),
    )
    .await;
    assert_eq!(StatusCode::CREATED, status_code);
    assert_eq!(30, body["data"]["duration"]);
}

#[tokio::test]
async fn test_create_invalid_appointment() {
    let mut test_app = helper::setup_test_app().await;
    let app = &mut test_app.router;

    let access_token = helper::login(app).await;
    let start = in_hours(48);

    // empty title
    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({ "title": "   ", "startDateTime": start }),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("`title` can not be empty", helper::get_error_message(&body));

    // end before start
    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({
            "title": "Dentist",
            "startDateTime": start,
            "endDateTime": start - Duration::minutes(10),
        }),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "End date time must be after the start date time",
        helper::get_error_message(&body)
    );

    // duration does not match
    let (status_code, body) = helper::create_appointment(
        app,
        &access_token,
        json!({
            "title": "Dentist",
            "startDateTime": start,
            "endDateTime": start + Duration::minutes(10),
            "duration": 20,
        }),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "Duration does not match the start and end date time",
        helper::get_error_message(&body)
    );
}

#[tokio::test]
async fn test_list_appointments() {
    let mut test_app = helper::setup_test_app().await;
    let app = &mut test_app.router;

    let admin_token = helper::login(app).await;
    let (user_id, user_token) =
        helper::create_user_and_login(app, &admin_token, "jane@example.com", "user").await;

    let later = in_hours(72);
    let sooner = in_hours(24);

    for (title, start) in [("Later", later), ("Sooner", sooner)] {
        let (status_code, _) = helper::create_appointment(
            app,
            &user_token,
            json!({ "title": title, "startDateTime": start }),
        )
        .await;
        assert_eq!(StatusCode::CREATED, status_code);
    }

    // ordered by start
    let (status_code, body) =
        helper::request(app, Method::GET, "/api/appointments", Some(&user_token), None).await;
    assert_eq!(StatusCode::OK, status_code);
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|appointment| appointment["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(vec!["Sooner", "Later"], titles);

    // filter on start
    let from = in_hours(48).to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let (status_code, body) = helper::request(
        app,
        Method::GET,
        &format!("/api/appointments?from={from}&status=SCHEDULED"),
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(1, body["data"].as_array().unwrap().len());
    assert_eq!("Later", body["data"][0]["title"]);

    // invalid status filter
    let (status_code, _) = helper::request(
        app,
        Method::GET,
        "/api/appointments?status=UNKNOWN",
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);

    // the admin has none
    let (status_code, body) =
        helper::request(app, Method::GET, "/api/appointments", Some(&admin_token), None).await;
    assert_eq!(StatusCode::OK, status_code);
    assert!(body["data"].as_array().unwrap().is_empty());

    // but can look at the ones of the user
    let (status_code, body) = helper::request(
        app,
        Method::GET,
        &format!("/api/appointments?userId={user_id}"),
        Some(&admin_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(2, body["data"].as_array().unwrap().len());

    // the other way around is not allowed
    let (_, body) =
        helper::request(app, Method::GET, "/api/users/me", Some(&admin_token), None).await;
    let admin_id = helper::get_id(&body["data"]);

    let (status_code, _) = helper::request(
        app,
        Method::GET,
        &format!("/api/appointments?userId={admin_id}"),
        Some(&user_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
}

#[tokio::test]
async fn test_appointment_access() {
    let mut test_app = helper::setup_test_app().await;
    let app = &mut test_app.router;

    let admin_token = helper::login(app).await;
    let (_, jane_token) =
        helper::create_user_and_login(app, &admin_token, "jane@example.com", "user").await;
    let (_, john_token) =
        helper::create_user_and_login(app, &admin_token, "john@example.com", "user").await;

    let (_, body) = helper::create_appointment(
        app,
        &jane_token,
        json!({ "title": "Dentist", "startDateTime": in_hours(48) }),
    )
    .await;
    let uri = format!("/api/appointments/{}", helper::get_id(&body["data"]));

    let (status_code, _) = helper::request(app, Method::GET, &uri, Some(&jane_token), None).await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, _) = helper::request(app, Method::GET, &uri, Some(&admin_token), None).await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, body) =
        helper::request(app, Method::GET, &uri, Some(&john_token), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);
    assert_eq!("FORBIDDEN", helper::get_error_code(&body));

    let (status_code, _) =
        helper::request(app, Method::DELETE, &uri, Some(&john_token), None).await;
    assert_eq!(StatusCode::FORBIDDEN, status_code);

    // soft-deleted appointments are gone
    let (status_code, _) =
        helper::request(app, Method::DELETE, &uri, Some(&jane_token), None).await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    let (status_code, body) =
        helper::request(app, Method::GET, &uri, Some(&jane_token), None).await;
    assert_eq!(StatusCode::NOT_FOUND, status_code);
    assert_eq!("Appointment not found", helper::get_error_message(&body));

    // not an ID
    let (status_code, body) = helper::request(
        app,
        Method::GET,
        "/api/appointments/not-an-id",
        Some(&jane_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!("Invalid path parameter", helper::get_error_message(&body));
}

#[tokio::test]
async fn test_reschedule_resets_reminder() {
    let mut test_app = helper::setup_test_app().await;

    let access_token = helper::login(&mut test_app.router).await;
    let start = in_hours(23);

    let (_, body) = helper::create_appointment(
        &mut test_app.router,
        &access_token,
        json!({ "title": "Dentist", "startDateTime": start, "duration": 30 }),
    )
    .await;
    let appointment_id = helper::get_id(&body["data"]);
    let uri = format!("/api/appointments/{appointment_id}");

    // as if the reminder job got to it
    let appointment = test_app
        .storage
        .find_single_appointment_by_id(&appointment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(
        test_app
            .storage
            .claim_reminder(&appointment, Utc::now())
            .await
            .unwrap()
    );

    // a new title keeps the reminder
    let (status_code, body) = helper::request(
        &mut test_app.router,
        Method::PATCH,
        &uri,
        Some(&access_token),
        Some(json!({ "title": "Dentist checkup", "location": "Room 3" })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!("Dentist checkup", body["data"]["title"]);
    assert_eq!("Room 3", body["data"]["location"]);
    assert_eq!(true, body["data"]["reminderSent"]);

    // clearing the location
    let (status_code, body) = helper::request(
        &mut test_app.router,
        Method::PATCH,
        &uri,
        Some(&access_token),
        Some(json!({ "location": null })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert!(body["data"]["location"].is_null());
    assert_eq!(true, body["data"]["reminderSent"]);

    // a new start resets it and keeps the length
    let new_start = start + Duration::hours(24);
    let (status_code, body) = helper::request(
        &mut test_app.router,
        Method::PATCH,
        &uri,
        Some(&access_token),
        Some(json!({ "startDateTime": new_start })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(false, body["data"]["reminderSent"]);
    assert!(body["data"]["reminderSentAt"].is_null());
    assert_eq!(30, body["data"]["duration"]);

    let appointment = test_app
        .storage
        .find_single_appointment_by_id(&appointment_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!appointment.reminder_sent);
    assert_eq!(new_start, appointment.start_date_time);
    assert_eq!(new_start + Duration::minutes(30), appointment.end_date_time);
}

#[tokio::test]
async fn test_status_transitions() {
    let mut test_app = helper::setup_test_app().await;

    let access_token = helper::login(&mut test_app.router).await;

    let (_, body) = helper::create_appointment(
        &mut test_app.router,
        &access_token,
        json!({ "title": "Dentist", "startDateTime": in_hours(48) }),
    )
    .await;
    let appointment_id = helper::get_id(&body["data"]);
    let uri = format!("/api/appointments/{appointment_id}/status");

    let (status_code, body) = helper::request(
        &mut test_app.router,
        Method::PUT,
        &uri,
        Some(&access_token),
        Some(json!({ "status": "IN_PROGRESS" })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!("IN_PROGRESS", body["data"]["status"]);

    // no way back
    let (status_code, body) = helper::request(
        &mut test_app.router,
        Method::PUT,
        &uri,
        Some(&access_token),
        Some(json!({ "status": "SCHEDULED" })),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
    assert_eq!(
        "Can not change status from InProgress to Scheduled",
        helper::get_error_message(&body)
    );

    // only scheduled appointments can be updated
    let (status_code, _) = helper::request(
        &mut test_app.router,
        Method::PATCH,
        &format!("/api/appointments/{appointment_id}"),
        Some(&access_token),
        Some(json!({ "title": "Too late" })),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);

    // cancelling notifies the owner
    let (status_code, body) = helper::request(
        &mut test_app.router,
        Method::PUT,
        &uri,
        Some(&access_token),
        Some(json!({ "status": "CANCELLED" })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!("CANCELLED", body["data"]["status"]);

    let (_, body) = helper::request(
        &mut test_app.router,
        Method::GET,
        "/api/notifications",
        Some(&access_token),
        None,
    )
    .await;
    let notifications = body["data"].as_array().unwrap();
    assert_eq!(1, notifications.len());
    assert_eq!("appointment_cancelled", notifications[0]["type"]);
    assert_eq!("appointment", notifications[0]["entityType"]);
    assert_eq!(
        Some(appointment_id.to_string().as_str()),
        notifications[0]["entityId"].as_str()
    );

    // cancelled is final
    let (status_code, _) = helper::request(
        &mut test_app.router,
        Method::PUT,
        &uri,
        Some(&access_token),
        Some(json!({ "status": "COMPLETED" })),
    )
    .await;
    assert_eq!(StatusCode::BAD_REQUEST, status_code);
}

#[tokio::test]
async fn test_appointment_stats() {
    let mut test_app = helper::setup_test_app().await;
    let app = &mut test_app.router;

    let access_token = helper::login(app).await;

    let mut ids = Vec::new();
    for title in ["One", "Two", "Three"] {
        let (_, body) = helper::create_appointment(
            app,
            &access_token,
            json!({ "title": title, "startDateTime": in_hours(48) }),
        )
        .await;
        ids.push(helper::get_id(&body["data"]));
    }

    let (status_code, _) = helper::request(
        app,
        Method::PUT,
        &format!("/api/appointments/{}/status", ids[0]),
        Some(&access_token),
        Some(json!({ "status": "NO_SHOW" })),
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);

    let (status_code, _) = helper::request(
        app,
        Method::DELETE,
        &format!("/api/appointments/{}", ids[1]),
        Some(&access_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::NO_CONTENT, status_code);

    let (status_code, body) = helper::request(
        app,
        Method::GET,
        "/api/appointments/stats",
        Some(&access_token),
        None,
    )
    .await;
    assert_eq!(StatusCode::OK, status_code);
    assert_eq!(
        json!({
            "total": 2,
            "scheduled": 1,
            "inProgress": 0,
            "completed": 0,
            "cancelled": 0,
            "noShow": 1,
            "upcoming": 1,
        }),
        body["data"]
    );
}
