use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode},
};
use serde_json::{Value, json};
use time::OffsetDateTime;
use time::macros::datetime;
use tokio::sync::Mutex;
use tower::ServiceExt;

use quizcache::application::questions::QuestionService;
use quizcache::application::repos::{QuestionsRepo, RepoError, ShownUpdate};
use quizcache::cache::{CacheConfig, MemoryLevelStore};
use quizcache::domain::entities::{QuestionOption, StoredQuestion};
use quizcache::domain::types::Level;
use quizcache::infra::http::{HttpState, REQUEST_ID_HEADER, build_router};

#[derive(Default)]
struct InMemoryQuestionsRepo {
    questions: Vec<(Level, StoredQuestion)>,
    writes: Mutex<Vec<(i64, OffsetDateTime)>>,
    offline: bool,
}

#[async_trait]
impl QuestionsRepo for InMemoryQuestionsRepo {
    async fn fetch_batch(
        &self,
        level: Level,
        limit: u32,
    ) -> Result<Vec<StoredQuestion>, RepoError> {
        if self.offline {
            return Err(RepoError::from_persistence("connection refused"));
        }
        Ok(self
            .questions
            .iter()
            .filter(|(candidate, _)| *candidate == level)
            .map(|(_, question)| question.clone())
            .take(limit as usize)
            .collect())
    }

    async fn apply_shown_update(
        &self,
        id: i64,
        shown_at: OffsetDateTime,
    ) -> Result<ShownUpdate, RepoError> {
        self.writes.lock().await.push((id, shown_at));
        Ok(ShownUpdate::Applied)
    }
}

fn question(id: i64) -> StoredQuestion {
    StoredQuestion {
        id,
        question_text: format!("She ___ to school every day ({id})"),
        options: vec![
            QuestionOption {
                option_id: 0,
                option_text: "go".into(),
            },
            QuestionOption {
                option_id: 1,
                option_text: "goes".into(),
            },
        ],
        correct_option_id: 1,
        explanation: "Third person singular takes -s.".into(),
        last_shown: None,
    }
}

fn app(repo: Arc<InMemoryQuestionsRepo>) -> (Router, Arc<QuestionService>) {
    let questions = Arc::new(QuestionService::new(
        repo,
        Arc::new(MemoryLevelStore::new()),
        CacheConfig::default(),
    ));
    let router = build_router(HttpState {
        questions: questions.clone(),
    });
    (router, questions)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

#[tokio::test]
async fn get_and_update_walk_through_a_level() {
    let repo = Arc::new(InMemoryQuestionsRepo {
        questions: vec![(Level::B1, question(10)), (Level::B1, question(11))],
        ..Default::default()
    });
    let (router, _) = app(repo.clone());

    let (status, body) = send(&router, get("/testroutes/gettests?level=B1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 10);
    assert_eq!(body["options"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["shown"], false);

    let (status, body) = send(
        &router,
        post_json(
            "/testroutes/updatestatus",
            json!({ "level": "B1", "id": 10, "shown_at": "2024-04-01T09:00:00Z" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "message": "status updated" }));

    let (_, body) = send(&router, get("/testroutes/gettests?level=B1")).await;
    assert_eq!(body["id"], 11);
    assert!(repo.writes.lock().await.is_empty());
}

#[tokio::test]
async fn legacy_field_names_are_accepted() {
    let repo = Arc::new(InMemoryQuestionsRepo {
        questions: vec![(Level::A1, question(1))],
        ..Default::default()
    });
    let (router, questions) = app(repo.clone());

    let (status, _) = send(&router, get("/testroutes/gettests?Level=A1")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &router,
        post_json(
            "/testroutes/updatestatus",
            json!({ "Level": "A1", "ID": 1, "datetime_shown": "2024-04-01T09:00:00+00:00" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    questions.shutdown_flush_all().await.expect("flush");
    assert_eq!(
        repo.writes.lock().await.as_slice(),
        &[(1, datetime!(2024-04-01 09:00 UTC))]
    );
}

#[tokio::test]
async fn unknown_level_is_a_bad_request() {
    let (router, _) = app(Arc::new(InMemoryQuestionsRepo::default()));

    for uri in ["/testroutes/gettests?level=D4", "/testroutes/gettests"] {
        let (status, body) = send(&router, get(uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "invalid_level");
    }

    let (status, body) = send(
        &router,
        post_json("/testroutes/updatestatus", json!({ "level": "Z1", "id": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_level");
}

#[tokio::test]
async fn empty_level_is_not_found() {
    let (router, _) = app(Arc::new(InMemoryQuestionsRepo::default()));

    let (status, body) = send(&router, get("/testroutes/gettests?level=C1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "no_questions");
}

#[tokio::test]
async fn unreachable_store_is_service_unavailable() {
    let repo = Arc::new(InMemoryQuestionsRepo {
        offline: true,
        ..Default::default()
    });
    let (router, _) = app(repo);

    let (status, body) = send(&router, get("/testroutes/gettests?level=A2")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "store_unavailable");
    assert!(body["error"].get("hint").is_none());
}

#[tokio::test]
async fn uncached_id_still_reports_success() {
    let (router, _) = app(Arc::new(InMemoryQuestionsRepo::default()));

    let (status, body) = send(
        &router,
        post_json("/testroutes/updatestatus", json!({ "level": "B2", "id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "status updated");
}

#[tokio::test]
async fn malformed_updates_are_rejected() {
    let (router, _) = app(Arc::new(InMemoryQuestionsRepo::default()));

    let cases = [
        json!({ "level": "B1", "id": 0 }),
        json!({ "level": "B1", "id": "ten" }),
        json!({ "level": "B1" }),
        json!({ "level": "B1", "id": 4, "shown_at": "2024-04-01T09:00:00+02:00" }),
        json!({ "level": "B1", "id": 4, "shown_at": "2024-04-01 09:00" }),
    ];

    for body in cases {
        let (status, response) =
            send(&router, post_json("/testroutes/updatestatus", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"]["code"], "bad_request", "{body}");
    }
}
