// tests/quiz_flow_tests.rs

use chrono::Utc;
use classhub::{config::Config, routes, state::AppState};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL and the pool for direct seeding/inspection.
async fn spawn_app() -> (String, SqlitePool) {
    // A single pooled connection keeps the in-memory database alive and
    // shared across requests.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
    };

    let state = AppState {
        pool: pool.clone(),
        config,
    };

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (address, pool)
}

async fn seed_user(pool: &SqlitePool, role: &str, level: i64) -> i64 {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO users (username, role, level, created_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(username)
    .bind(role)
    .bind(level)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .expect("Failed to seed user")
}

async fn create_course(client: &reqwest::Client, address: &str) -> String {
    let code = format!("C{}", &uuid::Uuid::new_v4().to_string()[..6]);
    let resp = client
        .post(format!("{}/api/courses", address))
        .json(&serde_json::json!({
            "title": format!("Course {}", code),
            "code": code,
            "credit": 3,
            "level": 100,
            "semester": "First"
        }))
        .send()
        .await
        .expect("Failed to create course");
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["slug"].as_str().unwrap().to_string()
}

async fn create_quiz(
    client: &reqwest::Client,
    address: &str,
    course_slug: &str,
    extra: serde_json::Value,
) -> (i64, String) {
    let mut payload = serde_json::json!({
        "title": format!("Quiz {}", &uuid::Uuid::new_v4().to_string()[..6]),
        "category": "practice",
        "pass_mark": 50
    });
    for (k, v) in extra.as_object().cloned().unwrap_or_default() {
        payload[k] = v;
    }
    let resp = client
        .post(format!("{}/api/courses/{}/quizzes", address, course_slug))
        .json(&payload)
        .send()
        .await
        .expect("Failed to create quiz");
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["id"].as_i64().unwrap(),
        body["slug"].as_str().unwrap().to_string(),
    )
}

async fn create_mc_question(client: &reqwest::Client, address: &str, quiz_id: i64) -> i64 {
    let resp = client
        .post(format!("{}/api/quizzes/{}/questions", address, quiz_id))
        .json(&serde_json::json!({
            "kind": "multiple_choice",
            "content": format!("Question {}", &uuid::Uuid::new_v4().to_string()[..6]),
            "choices": [
                {"text": "Right", "correct": true},
                {"text": "Wrong", "correct": false}
            ]
        }))
        .send()
        .await
        .expect("Failed to create question");
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

/// Picks the choice id with the given text from a take-response question.
fn choice_id(question: &serde_json::Value, text: &str) -> i64 {
    question["choices"]
        .as_array()
        .unwrap()
        .iter()
        .find(|c| c["text"] == text)
        .unwrap_or_else(|| panic!("choice '{}' not present", text))["id"]
        .as_i64()
        .unwrap()
}

#[tokio::test]
async fn full_quiz_flow_half_correct_passes_at_fifty() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(&client, &address, &course_slug, serde_json::json!({})).await;
    for _ in 0..4 {
        create_mc_question(&client, &address, quiz_id).await;
    }

    // Start: first question, nothing answered yet.
    let start: serde_json::Value = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(start["status"], "in_progress");
    assert_eq!(start["progress"]["answered"], 0);
    assert_eq!(start["progress"]["total"], 4);

    // Answer: two right, then two wrong.
    let mut current = start;
    let mut last = serde_json::Value::Null;
    for i in 0..4 {
        let question = &current["question"];
        let question_id = question["id"].as_i64().unwrap();
        let guess = if i < 2 {
            choice_id(question, "Right")
        } else {
            choice_id(question, "Wrong")
        };
        let resp = client
            .post(format!("{}/api/take/{}", address, quiz_slug))
            .json(&serde_json::json!({
                "user_id": user_id,
                "question_id": question_id,
                "guess": guess.to_string()
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 200);
        last = resp.json().await.unwrap();
        if i < 3 {
            assert_eq!(last["status"], "in_progress");
            assert_eq!(last["progress"]["answered"], i + 1);
            // Answers are shown per question unless the quiz defers them.
            assert_eq!(last["previous"]["correct"], i < 2);
            current = last.clone();
        }
    }

    assert_eq!(last["status"], "complete");
    assert_eq!(last["score"], 2);
    assert_eq!(last["max_score"], 4);
    assert_eq!(last["percent"], 50);
    assert_eq!(last["passed"], true);

    // Not an exam paper and the caller is a student: the sitting is gone.
    let sittings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sittings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(sittings, 0);

    // The ledger kept the cumulative record regardless.
    let progress: serde_json::Value = client
        .get(format!("{}/api/progress?user_id={}", address, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["summary"][0]["quiz_id"].as_i64().unwrap(), quiz_id);
    assert_eq!(progress["summary"][0]["correct"], 2);
    assert_eq!(progress["summary"][0]["possible"], 4);
}

#[tokio::test]
async fn sitting_survives_interruption_and_resumes() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(&client, &address, &course_slug, serde_json::json!({})).await;
    for _ in 0..3 {
        create_mc_question(&client, &address, quiz_id).await;
    }

    let start: serde_json::Value = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let first_question = start["question"]["id"].as_i64().unwrap();
    let guess = choice_id(&start["question"], "Right");
    client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": first_question,
            "guess": guess.to_string()
        }))
        .send()
        .await
        .unwrap();

    // "Coming back later" is just another start call: same sitting, one
    // question down.
    let resumed: serde_json::Value = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(resumed["status"], "in_progress");
    assert_eq!(resumed["progress"]["answered"], 1);
    assert_eq!(resumed["sitting_id"], start["sitting_id"]);
    assert_ne!(resumed["question"]["id"].as_i64().unwrap(), first_question);
}

#[tokio::test]
async fn out_of_order_answer_is_rejected() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(&client, &address, &course_slug, serde_json::json!({})).await;
    let q1 = create_mc_question(&client, &address, quiz_id).await;
    let q2 = create_mc_question(&client, &address, quiz_id).await;

    client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap();

    // q2 is not the head of the queue.
    let resp = client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": q2,
            "guess": "1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);

    // The rejected submission changed nothing; q1 still answers fine.
    let resp = client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": q1,
            "guess": "garbage"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn questionless_quiz_cannot_be_started() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (_quiz_id, quiz_slug) =
        create_quiz(&client, &address, &course_slug, serde_json::json!({})).await;

    let resp = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn single_attempt_quiz_reports_exhaustion_on_second_take() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(
        &client,
        &address,
        &course_slug,
        serde_json::json!({"single_attempt": true}),
    )
    .await;
    create_mc_question(&client, &address, quiz_id).await;

    let start: serde_json::Value = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let question_id = start["question"]["id"].as_i64().unwrap();
    let guess = choice_id(&start["question"], "Right");
    let done: serde_json::Value = client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": question_id,
            "guess": guess.to_string()
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(done["status"], "complete");

    // single_attempt forces exam_paper, so the record is retained.
    let retained: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sittings WHERE complete = 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(retained, 1);

    // A second take is a normal outcome, not an error.
    let again = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap();
    assert_eq!(again.status().as_u16(), 200);
    let body: serde_json::Value = again.json().await.unwrap();
    assert_eq!(body["status"], "attempts_exhausted");
}

#[tokio::test]
async fn concurrent_starts_create_exactly_one_sitting() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(&client, &address, &course_slug, serde_json::json!({})).await;
    create_mc_question(&client, &address, quiz_id).await;

    let url = format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id);
    let (a, b) = tokio::join!(client.get(&url).send(), client.get(&url).send());
    assert_eq!(a.unwrap().status().as_u16(), 200);
    assert_eq!(b.unwrap().status().as_u16(), 200);

    let active: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sittings WHERE complete = 0")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn answers_at_end_hides_outcomes_until_the_result() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(
        &client,
        &address,
        &course_slug,
        serde_json::json!({"answers_at_end": true}),
    )
    .await;
    create_mc_question(&client, &address, quiz_id).await;
    create_mc_question(&client, &address, quiz_id).await;

    let start: serde_json::Value = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let question_id = start["question"]["id"].as_i64().unwrap();
    let guess = choice_id(&start["question"], "Right");
    let mid: serde_json::Value = client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": question_id,
            "guess": guess.to_string()
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mid["status"], "in_progress");
    assert!(mid.get("previous").is_none());

    let question_id = mid["question"]["id"].as_i64().unwrap();
    let guess = choice_id(&mid["question"], "Wrong");
    let done: serde_json::Value = client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": question_id,
            "guess": guess.to_string()
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(done["status"], "complete");
    let review = done["questions"].as_array().unwrap();
    assert_eq!(review.len(), 2);
    assert_eq!(review[0]["correct"], true);
    assert_eq!(review[1]["correct"], false);
    assert_eq!(done["incorrect_questions"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn draft_quiz_is_hidden_from_students() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let student = seed_user(&pool, "student", 100).await;
    let lecturer = seed_user(&pool, "lecturer", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(
        &client,
        &address,
        &course_slug,
        serde_json::json!({"draft": true}),
    )
    .await;
    create_mc_question(&client, &address, quiz_id).await;

    let resp = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, student))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = client
        .get(format!(
            "{}/api/take/{}?user_id={}&role=lecturer",
            address, quiz_slug, lecturer
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn quiz_pass_mark_is_validated_at_persistence() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let course_slug = create_course(&client, &address).await;

    let resp = client
        .post(format!("{}/api/courses/{}/quizzes", address, course_slug))
        .json(&serde_json::json!({
            "title": "Broken",
            "category": "practice",
            "pass_mark": 150
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn duplicate_quiz_titles_get_disambiguated_slugs() {
    let (address, _pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let course_slug = create_course(&client, &address).await;

    let mk = |client: &reqwest::Client| {
        client
            .post(format!("{}/api/courses/{}/quizzes", address, course_slug))
            .json(&serde_json::json!({
                "title": "Midterm Review",
                "category": "practice",
                "pass_mark": 40
            }))
            .send()
    };
    let first: serde_json::Value = mk(&client).await.unwrap().json().await.unwrap();
    let second: serde_json::Value = mk(&client).await.unwrap().json().await.unwrap();

    assert_eq!(first["slug"], "midterm-review");
    let second_slug = second["slug"].as_str().unwrap();
    assert!(second_slug.starts_with("midterm-review-"));
    assert_ne!(second_slug, "midterm-review");
}

#[tokio::test]
async fn abandoning_early_finalizes_against_the_full_denominator() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let user_id = seed_user(&pool, "student", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(&client, &address, &course_slug, serde_json::json!({})).await;
    for _ in 0..4 {
        create_mc_question(&client, &address, quiz_id).await;
    }

    let start: serde_json::Value = client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, user_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let question_id = start["question"]["id"].as_i64().unwrap();
    let guess = choice_id(&start["question"], "Right");
    client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": user_id,
            "question_id": question_id,
            "guess": guess.to_string()
        }))
        .send()
        .await
        .unwrap();

    // One of four answered; walk away.
    let resp = client
        .post(format!("{}/api/take/{}/finalize", address, quiz_slug))
        .json(&serde_json::json!({"user_id": user_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "complete");
    assert_eq!(body["score"], 1);
    assert_eq!(body["max_score"], 4);
    assert_eq!(body["percent"], 25);
    assert_eq!(body["passed"], false);

    // Not an exam paper: nothing is retained, and a new take starts over.
    let sittings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sittings")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(sittings, 0);
}

#[tokio::test]
async fn essay_marking_toggle_credits_and_debits() {
    let (address, pool) = spawn_app().await;
    let client = reqwest::Client::new();
    let student = seed_user(&pool, "student", 100).await;
    let lecturer = seed_user(&pool, "lecturer", 100).await;

    let course_slug = create_course(&client, &address).await;
    let (quiz_id, quiz_slug) = create_quiz(
        &client,
        &address,
        &course_slug,
        serde_json::json!({"exam_paper": true}),
    )
    .await;

    let resp = client
        .post(format!("{}/api/quizzes/{}/questions", address, quiz_id))
        .json(&serde_json::json!({
            "kind": "essay",
            "content": "Explain the borrow checker."
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let essay_id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_i64()
        .unwrap();

    client
        .get(format!("{}/api/take/{}?user_id={}", address, quiz_slug, student))
        .send()
        .await
        .unwrap();
    let done: serde_json::Value = client
        .post(format!("{}/api/take/{}", address, quiz_slug))
        .json(&serde_json::json!({
            "user_id": student,
            "question_id": essay_id,
            "guess": "It prevents aliased mutation."
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(done["status"], "complete");
    assert_eq!(done["score"], 0);

    // The lecturer finds the retained sitting in the marking list.
    let marking: serde_json::Value = client
        .get(format!(
            "{}/api/marking?user_id={}&role=lecturer",
            address, lecturer
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let sitting_id = marking[0]["sitting_id"].as_i64().unwrap();

    // Accept the essay: un-flag it, crediting a point.
    let toggled: serde_json::Value = client
        .post(format!("{}/api/marking/{}/toggle", address, sitting_id))
        .json(&serde_json::json!({"question_id": essay_id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["incorrect"], false);
    assert_eq!(toggled["current_score"], 1);
    assert_eq!(toggled["percent"], 100);

    // Change of heart: flagging a complete sitting debits the point.
    let toggled: serde_json::Value = client
        .post(format!("{}/api/marking/{}/toggle", address, sitting_id))
        .json(&serde_json::json!({"question_id": essay_id}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(toggled["incorrect"], true);
    assert_eq!(toggled["current_score"], 0);

    // Detail view reflects the recorded essay answer.
    let detail: serde_json::Value = client
        .get(format!("{}/api/marking/{}", address, sitting_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["questions"][0]["answered"], true);
    assert_eq!(
        detail["questions"][0]["your_answer"],
        "It prevents aliased mutation."
    );
}
