mod common;

use axum::http::StatusCode;
use common::{call, published_course, register, test_app};
use serde_json::json;

#[tokio::test]
async fn health_reports_service() {
    let app = test_app();
    let (status, body) = call(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "lms-server");
}

#[tokio::test]
async fn accounts_and_authentication() {
    let app = test_app();
    let (status, _) = call(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "name": "Root", "email": "root@example.com", "role": "admin" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = register(&app, "Ada", "student").await;
    let (status, me) = call(&app, "GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "ada@example.com");
    assert!(me.get("api_token_hash").is_none());

    let (status, body) = call(&app, "GET", "/api/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
    let (status, _) = call(&app, "GET", "/api/me", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(
        &app,
        "POST",
        "/api/users",
        None,
        Some(json!({ "name": "Ada Again", "email": "ada@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn drafts_are_hidden_from_the_catalog() {
    let app = test_app();
    let owner = register(&app, "Ines", "instructor").await;
    let (status, draft) = call(
        &app,
        "POST",
        "/api/courses",
        Some(&owner),
        Some(json!({ "title": "Work in progress" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let draft_id = draft["id"].as_str().unwrap();

    let (_, catalog) = call(&app, "GET", "/api/courses", None, None).await;
    assert_eq!(catalog.as_array().unwrap().len(), 0);
    let (status, _) = call(&app, "GET", &format!("/api/courses/{draft_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&app, "GET", &format!("/api/courses/{draft_id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "PUT",
        &format!("/api/courses/{draft_id}"),
        Some(&owner),
        Some(json!({ "is_published": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, catalog) = call(&app, "GET", "/api/courses?q=progress", None, None).await;
    assert_eq!(catalog.as_array().unwrap().len(), 1);
    assert_eq!(catalog[0]["enrollment_count"], 0);
}

#[tokio::test]
async fn students_cannot_author_courses() {
    let app = test_app();
    let student = register(&app, "Sam", "student").await;
    let (status, _) = call(
        &app,
        "POST",
        "/api/courses",
        Some(&student),
        Some(json!({ "title": "Mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(&app, "POST", "/api/courses", Some(&student), Some(json!({ "price": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn free_course_from_enrollment_to_certificate() {
    let app = test_app();
    let owner = register(&app, "Ines", "instructor").await;
    let student = register(&app, "Grace", "student").await;
    let course_id = published_course(&app, &owner, "Rust 101", 0).await;

    let (status, material) = call(
        &app,
        "POST",
        &format!("/api/courses/{course_id}/materials"),
        Some(&owner),
        Some(json!({ "title": "Basics" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let material_id = material["id"].as_str().unwrap().to_string();

    let (status, video) = call(
        &app,
        "POST",
        &format!("/api/materials/{material_id}/details"),
        Some(&owner),
        Some(json!({ "title": "Intro", "kind": "video", "content_url": "https://example.com/intro.mp4" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let video_id = video["id"].as_str().unwrap().to_string();

    let (status, quiz) = call(
        &app,
        "POST",
        &format!("/api/materials/{material_id}/quizzes"),
        Some(&owner),
        Some(json!({
            "title": "Check",
            "passing_score": 100,
            "questions": [{ "prompt": "1 + 1?", "options": ["1", "2"], "answer_index": 1 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let quiz_id = quiz["id"].as_str().unwrap().to_string();

    // Learners see the questions but not the answer key
    let (_, detail) = call(&app, "GET", &format!("/api/courses/{course_id}"), None, None).await;
    let question = &detail["materials"][0]["quizzes"][0]["questions"][0];
    assert_eq!(question["prompt"], "1 + 1?");
    assert!(question.get("answer_index").is_none());

    let (status, _) = call(&app, "POST", &format!("/api/courses/{course_id}/enroll"), Some(&student), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(&app, "POST", &format!("/api/courses/{course_id}/enroll"), Some(&student), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, progress) = call(&app, "POST", &format!("/api/details/{video_id}/complete"), Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["progress"], 50);
    assert_eq!(progress["status"], "active");

    let review = json!({ "rating": 5, "comment": "Loved it" });
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/courses/{course_id}/reviews"),
        Some(&student),
        Some(review.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "POST", &format!("/api/courses/{course_id}/certificate"), Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, result) = call(
        &app,
        "POST",
        &format!("/api/quizzes/{quiz_id}/submit"),
        Some(&student),
        Some(json!({ "answers": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["passed"], true);
    assert_eq!(result["progress"]["progress"], 100);
    assert_eq!(result["progress"]["status"], "completed");

    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/courses/{course_id}/reviews"),
        Some(&student),
        Some(review.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = call(
        &app,
        "POST",
        &format!("/api/courses/{course_id}/reviews"),
        Some(&student),
        Some(review),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, catalog) = call(&app, "GET", "/api/courses", None, None).await;
    assert_eq!(catalog[0]["review_count"], 1);
    assert_eq!(catalog[0]["average_rating"], 5.0);
    assert_eq!(catalog[0]["enrollment_count"], 1);

    let (status, first) = call(&app, "POST", &format!("/api/courses/{course_id}/certificate"), Some(&student), None).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, second) = call(&app, "POST", &format!("/api/courses/{course_id}/certificate"), Some(&student), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["certificate_number"], second["certificate_number"]);
    let number = first["certificate_number"].as_str().unwrap();
    assert!(number.starts_with("CERT-"));

    let (status, verified) = call(&app, "GET", &format!("/api/certificates/{number}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["course_title"], "Rust 101");
    assert_eq!(verified["student_name"], "Grace");

    let (_, enrollments) = call(&app, "GET", "/api/enrollments", Some(&student), None).await;
    assert_eq!(enrollments[0]["course_title"], "Rust 101");
    assert_eq!(enrollments[0]["status"], "completed");
}

#[tokio::test]
async fn assignments_reach_the_instructor() {
    let app = test_app();
    let owner = register(&app, "Ines", "instructor").await;
    let student = register(&app, "Lin", "student").await;
    let course_id = published_course(&app, &owner, "Projects", 0).await;
    let (_, material) = call(
        &app,
        "POST",
        &format!("/api/courses/{course_id}/materials"),
        Some(&owner),
        Some(json!({ "title": "Week 1" })),
    )
    .await;
    let material_id = material["id"].as_str().unwrap();
    let (_, assignment) = call(
        &app,
        "POST",
        &format!("/api/materials/{material_id}/details"),
        Some(&owner),
        Some(json!({ "title": "Build a CLI", "kind": "assignment" })),
    )
    .await;
    let assignment_id = assignment["id"].as_str().unwrap();
    call(&app, "POST", &format!("/api/courses/{course_id}/enroll"), Some(&student), None).await;

    let (status, _) = call(&app, "POST", &format!("/api/details/{assignment_id}/complete"), Some(&student), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, progress) = call(
        &app,
        "POST",
        &format!("/api/details/{assignment_id}/complete"),
        Some(&student),
        Some(json!({ "submission_url": "https://github.com/lin/cli" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["progress"], 100);

    let (status, submissions) =
        call(&app, "GET", &format!("/api/courses/{course_id}/submissions"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submissions[0]["submission_url"], "https://github.com/lin/cli");
    let (status, _) = call(&app, "GET", &format!("/api/courses/{course_id}/submissions"), Some(&student), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deleting_a_course_hides_it() {
    let app = test_app();
    let owner = register(&app, "Ines", "instructor").await;
    let other = register(&app, "Other", "instructor").await;
    let course_id = published_course(&app, &owner, "Short lived", 0).await;

    let (status, _) = call(&app, "DELETE", &format!("/api/courses/{course_id}"), Some(&other), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&app, "DELETE", &format!("/api/courses/{course_id}"), Some(&owner), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(&app, "GET", &format!("/api/courses/{course_id}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
