// tests/quiz_flow_tests.rs
//
// End-to-end coverage of the attempt lifecycle, grading and the
// completion cascade: enroll -> start -> submit -> certificate/badge.

use lms_backend::{config::Config, routes, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;

async fn spawn_app() -> (String, PgPool) {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "quiz_flow_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (address, pool)
}

struct SeededQuiz {
    course_id: i64,
    quiz_id: i64,
    question_a: i64,
    question_b: i64,
}

/// Seeds a published single-lesson course with a two-question quiz
/// (5 points each, passing score 70). Correct answers are "A" and "B".
async fn seed_course_with_quiz(
    pool: &PgPool,
    max_attempts: Option<i32>,
    time_limit_minutes: Option<i32>,
    lesson_is_free: bool,
) -> SeededQuiz {
    let slug = format!("course-{}", uuid::Uuid::new_v4().simple());

    let course_id: i64 = sqlx::query_scalar(
        "INSERT INTO courses (title, slug, is_published) VALUES ('Test Course', $1, TRUE) RETURNING id",
    )
    .bind(&slug)
    .fetch_one(pool)
    .await
    .unwrap();

    let lesson_id: i64 = sqlx::query_scalar(
        "INSERT INTO lessons (course_id, title, is_published, is_free) VALUES ($1, 'Lesson 1', TRUE, $2) RETURNING id",
    )
    .bind(course_id)
    .bind(lesson_is_free)
    .fetch_one(pool)
    .await
    .unwrap();

    let quiz_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO quizzes (lesson_id, title, passing_score, max_attempts, time_limit_minutes)
        VALUES ($1, 'Lesson 1 Quiz', 70, $2, $3)
        RETURNING id
        "#,
    )
    .bind(lesson_id)
    .bind(max_attempts)
    .bind(time_limit_minutes)
    .fetch_one(pool)
    .await
    .unwrap();

    let question_a: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (quiz_id, question_type, prompt, options, correct_answer, points, position)
        VALUES ($1, 'multiple_choice', 'Pick A', '["A","B","C"]'::jsonb, '"A"'::jsonb, 5, 0)
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .fetch_one(pool)
    .await
    .unwrap();

    let question_b: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (quiz_id, question_type, prompt, options, correct_answer, points, position)
        VALUES ($1, 'multiple_choice', 'Pick B', '["A","B","C"]'::jsonb, '"B"'::jsonb, 5, 1)
        RETURNING id
        "#,
    )
    .bind(quiz_id)
    .fetch_one(pool)
    .await
    .unwrap();

    SeededQuiz {
        course_id,
        quiz_id,
        question_a,
        question_b,
    }
}

async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, String) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Register failed");

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": username, "password": password }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");

    let token = login["token"].as_str().expect("Token not found").to_string();
    (username, token)
}

async fn enroll(client: &reqwest::Client, address: &str, token: &str, course_id: i64) {
    let resp = client
        .post(format!("{}/api/courses/{}/enroll", address, course_id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Enroll failed");
    assert!(resp.status().is_success());
}

async fn start_attempt(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    quiz_id: i64,
) -> reqwest::Response {
    client
        .post(format!("{}/api/quizzes/{}/attempt", address, quiz_id))
        .bearer_auth(token)
        .send()
        .await
        .expect("Start attempt request failed")
}

fn answers_body(attempt_id: i64, answers: &[(i64, serde_json::Value)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (question_id, value) in answers {
        map.insert(question_id.to_string(), value.clone());
    }
    serde_json::json!({ "attempt_id": attempt_id, "answers": map })
}

async fn submit_attempt(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    quiz_id: i64,
    body: &serde_json::Value,
) -> reqwest::Response {
    client
        .put(format!("{}/api/quizzes/{}/attempt", address, quiz_id))
        .bearer_auth(token)
        .json(body)
        .send()
        .await
        .expect("Submit attempt request failed")
}

#[tokio::test]
async fn test_pass_quiz_triggers_completion_cascade() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    // Start
    let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let attempt_id = start["attempt"]["id"].as_i64().unwrap();
    assert_eq!(start["attempt"]["attempt_number"], 1);
    assert!(start["time_remaining_ms"].is_null());

    // Delivered questions must not leak answers.
    let questions = start["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    for q in questions {
        assert!(q.get("correct_answer").is_none());
        assert!(q.get("explanation").is_none());
    }

    // Submit both answers correctly
    let body = answers_body(
        attempt_id,
        &[
            (seeded.question_a, serde_json::json!("A")),
            (seeded.question_b, serde_json::json!("B")),
        ],
    );
    let resp = submit_attempt(&client, &address, &token, seeded.quiz_id, &body).await;
    assert_eq!(resp.status().as_u16(), 200);
    let result: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(result["results"]["score"], 10);
    assert_eq!(result["results"]["percentage"], 100);
    assert_eq!(result["results"]["passed"], true);

    // Single-lesson course: the cascade must complete the enrollment and
    // issue the certificate and badge.
    let enrollments: serde_json::Value = client
        .get(format!("{}/api/profile/enrollments", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(enrollments[0]["status"], "completed");
    assert_eq!(enrollments[0]["progress"], 100);

    let certificates: serde_json::Value = client
        .get(format!("{}/api/profile/certificates", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(certificates.as_array().unwrap().len(), 1);

    let badges: serde_json::Value = client
        .get(format!("{}/api/profile/badges", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(badges.as_array().unwrap().len(), 1);
    assert_eq!(badges[0]["code"], "course-completion");

    // Per-lesson progress reflects the completed lesson.
    let progress: serde_json::Value = client
        .get(format!(
            "{}/api/courses/{}/progress",
            address, seeded.course_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress.as_array().unwrap().len(), 1);
    assert_eq!(progress[0]["is_completed"], true);

    // The certificate is publicly verifiable by its number.
    let number = certificates[0]["certificate_number"].as_str().unwrap();
    let verify = client
        .get(format!("{}/api/certificates/{}", address, number))
        .send()
        .await
        .unwrap();
    assert_eq!(verify.status().as_u16(), 200);
}

#[tokio::test]
async fn test_cascade_is_idempotent_across_reattempts() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    for _ in 0..2 {
        let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
            .await
            .json()
            .await
            .unwrap();
        let attempt_id = start["attempt"]["id"].as_i64().unwrap();
        let body = answers_body(
            attempt_id,
            &[
                (seeded.question_a, serde_json::json!("A")),
                (seeded.question_b, serde_json::json!("B")),
            ],
        );
        let resp = submit_attempt(&client, &address, &token, seeded.quiz_id, &body).await;
        assert_eq!(resp.status().as_u16(), 200);
    }

    // Passing the final lesson twice must not duplicate issuance.
    let certificates: serde_json::Value = client
        .get(format!("{}/api/profile/certificates", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(certificates.as_array().unwrap().len(), 1);

    let badges: serde_json::Value = client
        .get(format!("{}/api/profile/badges", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(badges.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_failing_score_leaves_enrollment_active() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let attempt_id = start["attempt"]["id"].as_i64().unwrap();

    // 1 of 2 correct: 5/10 = 50% < 70%.
    let body = answers_body(
        attempt_id,
        &[
            (seeded.question_a, serde_json::json!("A")),
            (seeded.question_b, serde_json::json!("C")),
        ],
    );
    let result: serde_json::Value = submit_attempt(&client, &address, &token, seeded.quiz_id, &body)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["results"]["score"], 5);
    assert_eq!(result["results"]["percentage"], 50);
    assert_eq!(result["results"]["passed"], false);

    let enrollments: serde_json::Value = client
        .get(format!("{}/api/profile/enrollments", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(enrollments[0]["status"], "active");

    let certificates: serde_json::Value = client
        .get(format!("{}/api/profile/certificates", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(certificates.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_start_requires_enrollment() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;
    let (_, token) = register_and_login(&client, &address).await;

    let resp = start_attempt(&client, &address, &token, seeded.quiz_id).await;
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn test_free_lesson_admits_unenrolled_learner() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, true).await;
    let (_, token) = register_and_login(&client, &address).await;

    let resp = start_attempt(&client, &address, &token, seeded.quiz_id).await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn test_start_is_idempotent_resume() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    let first: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let second: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(first["attempt"]["id"], second["attempt"]["id"]);
    assert_eq!(second["attempt"]["attempt_number"], 1);
}

#[tokio::test]
async fn test_max_attempts_enforced() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, Some(1), None, false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let attempt_id = start["attempt"]["id"].as_i64().unwrap();

    let body = answers_body(attempt_id, &[(seeded.question_a, serde_json::json!("C"))]);
    let resp = submit_attempt(&client, &address, &token, seeded.quiz_id, &body).await;
    assert_eq!(resp.status().as_u16(), 200);

    // One terminal attempt at max_attempts = 1: a second start is refused.
    let resp = start_attempt(&client, &address, &token, seeded.quiz_id).await;
    assert_eq!(resp.status().as_u16(), 400);
    let err: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "Maximum attempts exceeded");
}

#[tokio::test]
async fn test_double_submit_rejected() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let attempt_id = start["attempt"]["id"].as_i64().unwrap();

    let body = answers_body(attempt_id, &[(seeded.question_a, serde_json::json!("A"))]);
    let first = submit_attempt(&client, &address, &token, seeded.quiz_id, &body).await;
    assert_eq!(first.status().as_u16(), 200);

    let second = submit_attempt(&client, &address, &token, seeded.quiz_id, &body).await;
    assert_eq!(second.status().as_u16(), 400);
    let err: serde_json::Value = second.json().await.unwrap();
    assert_eq!(err["error"], "Attempt already submitted");
}

#[tokio::test]
async fn test_late_submit_rejected_and_next_start_expires() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, Some(10), false).await;
    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let attempt_id = start["attempt"]["id"].as_i64().unwrap();
    assert!(start["time_remaining_ms"].as_i64().unwrap() <= 10 * 60 * 1000);

    // Backdate the attempt past the 10 minute limit.
    sqlx::query("UPDATE quiz_attempts SET started_at = NOW() - INTERVAL '11 minutes' WHERE id = $1")
        .bind(attempt_id)
        .execute(&pool)
        .await
        .unwrap();

    // Submitting at elapsed 11 minutes is refused.
    let body = answers_body(attempt_id, &[(seeded.question_a, serde_json::json!("A"))]);
    let resp = submit_attempt(&client, &address, &token, seeded.quiz_id, &body).await;
    assert_eq!(resp.status().as_u16(), 400);
    let err: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(err["error"], "Time limit exceeded");

    // The next start expires the stale attempt and opens a fresh one.
    let restart: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    assert_ne!(restart["attempt"]["id"].as_i64().unwrap(), attempt_id);
    assert_eq!(restart["attempt"]["attempt_number"], 2);

    // History shows the first attempt expired with a forced zero score.
    let history: serde_json::Value = client
        .get(format!(
            "{}/api/quizzes/{}/attempt?attempt_id={}",
            address, seeded.quiz_id, attempt_id
        ))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["status"], "expired");
    assert_eq!(history["score"], 0);
    assert_eq!(history["is_passed"], false);
    assert_eq!(history["time_spent_seconds"], 600);
}

#[tokio::test]
async fn test_essay_defers_cascade_until_manual_grade() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let seeded = seed_course_with_quiz(&pool, None, None, false).await;

    // Add an essay question worth 10 points: auto score alone can no
    // longer decide the attempt.
    let essay_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO questions (quiz_id, question_type, prompt, correct_answer, points, position)
        VALUES ($1, 'essay', 'Explain ownership.', 'null'::jsonb, 10, 2)
        RETURNING id
        "#,
    )
    .bind(seeded.quiz_id)
    .fetch_one(&pool)
    .await
    .unwrap();

    let (_, token) = register_and_login(&client, &address).await;
    enroll(&client, &address, &token, seeded.course_id).await;

    let start: serde_json::Value = start_attempt(&client, &address, &token, seeded.quiz_id)
        .await
        .json()
        .await
        .unwrap();
    let attempt_id = start["attempt"]["id"].as_i64().unwrap();

    let body = answers_body(
        attempt_id,
        &[
            (seeded.question_a, serde_json::json!("A")),
            (seeded.question_b, serde_json::json!("B")),
            (essay_id, serde_json::json!("Ownership means...")),
        ],
    );
    let result: serde_json::Value = submit_attempt(&client, &address, &token, seeded.quiz_id, &body)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result["results"]["pending_manual_grading"], true);
    assert_eq!(result["attempt"]["requires_manual_grading"], true);

    // No certificate while the verdict is provisional.
    let certificates: serde_json::Value = client
        .get(format!("{}/api/profile/certificates", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(certificates.as_array().unwrap().len(), 0);

    // Staff confirm the essay points; the cascade fires on the pass.
    let (grader_name, _) = register_and_login(&client, &address).await;
    sqlx::query("UPDATE users SET role = 'instructor' WHERE username = $1")
        .bind(&grader_name)
        .execute(&pool)
        .await
        .unwrap();
    // Re-login to pick up the instructor role in the token.
    let staff_login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "username": grader_name, "password": "password123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let staff_token = staff_login["token"].as_str().unwrap();

    let graded: serde_json::Value = client
        .put(format!("{}/api/manage/attempts/{}/grade", address, attempt_id))
        .bearer_auth(staff_token)
        .json(&serde_json::json!({ "scores": { essay_id.to_string(): 10 } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(graded["results"]["passed"], true);
    assert_eq!(graded["results"]["score"], 20);

    let certificates: serde_json::Value = client
        .get(format!("{}/api/profile/certificates", address))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(certificates.as_array().unwrap().len(), 1);
}
