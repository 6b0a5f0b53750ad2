use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use kawaii_recsys::{
    api::{create_router, AppState},
    data::{load_dataset, Catalog, Dataset, DatasetFiles},
    models::{Anime, Rating, PLACEHOLDER_IMAGE_URL},
    services::{
        recommenders::{NeuralParams, SvdParams},
        RecommendationEngine, StaticProvider,
    },
};

fn anime(anime_id: u32, name: &str, genre: &str, members: u64) -> Anime {
    Anime {
        anime_id,
        name: name.to_string(),
        genre: genre.to_string(),
        kind: Some("TV".to_string()),
        episodes: Some(12),
        rating: Some(8.0),
        members: Some(members),
    }
}

fn dataset() -> Dataset {
    let catalog = Catalog::new(vec![
        anime(1, "Cowboy Bebop", "Action, Adventure, Sci-Fi, Space", 900),
        anime(2, "Trigun", "Action, Comedy, Sci-Fi", 800),
        anime(3, "Samurai Champloo", "Action, Adventure, Comedy, Samurai", 700),
        anime(4, "Honey and Clover", "Comedy, Drama, Romance, Josei", 400),
        anime(5, "Nana", "Comedy, Drama, Music, Romance, Shoujo", 350),
        anime(6, "Lovely Complex", "Comedy, Romance, Shoujo", 300),
    ]);

    let mut ratings = Vec::new();
    let mut rate = |user_id, anime_id, rating| {
        ratings.push(Rating {
            user_id,
            anime_id,
            rating,
        })
    };
    for user in 1..=3 {
        rate(user, 1, 10.0);
        rate(user, 2, 9.0);
        rate(user, 5, 4.0);
    }
    for user in 4..=6 {
        rate(user, 4, 9.0);
        rate(user, 5, 10.0);
        rate(user, 1, 5.0);
    }
    rate(1, 3, 9.0);
    rate(4, 6, 8.0);

    Dataset::new(catalog, ratings)
}

fn train_state(dataset: Dataset) -> AppState {
    let svd = SvdParams {
        n_factors: 4,
        n_epochs: 30,
        ..SvdParams::default()
    };
    let neural = NeuralParams {
        embedding_dim: 4,
        hidden_layers: vec![8],
        epochs: 2,
        batch_size: 8,
        ..NeuralParams::default()
    };
    let engine = RecommendationEngine::train(Arc::new(dataset), &svd, &neural).unwrap();
    AppState::new(Arc::new(engine), Arc::new(StaticProvider), None)
}

fn create_state() -> AppState {
    train_state(dataset())
}

fn create_test_server() -> TestServer {
    TestServer::new(create_router(create_state())).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dataset"]["anime_count"], 6);
    assert_eq!(body["dataset"]["rating_count"], 20);
    assert_eq!(body["dataset"]["user_count"], 6);
    assert_eq!(body["metadata_provider"], "placeholder");
    assert_eq!(body["cache_enabled"], false);
    // Built in memory, so there are no files to report on
    assert_eq!(body["dataset"]["anime_file"], Value::Null);
    assert_eq!(body["dataset"]["ratings_file"], Value::Null);
    assert_eq!(
        body["models"],
        json!({ "svd": true, "neural": true, "content": true })
    );
}

#[tokio::test]
async fn test_health_check_reports_dataset_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("anime.csv"),
        "anime_id,name,genre,type,episodes,rating,members\n\
         1,Cowboy Bebop,\"Action, Sci-Fi\",TV,26,8.8,900\n\
         2,Nana,\"Drama, Romance\",TV,47,8.6,350\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("rating.csv"),
        "user_id,anime_id,rating\n1,1,10\n1,2,4\n2,1,6\n2,2,9\n",
    )
    .unwrap();

    let files = DatasetFiles::in_dir(dir.path());
    let server = TestServer::new(create_router(train_state(load_dataset(&files).unwrap()))).unwrap();

    let body: Value = server.get("/health").await.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["dataset"]["anime_file"], true);
    assert_eq!(body["dataset"]["ratings_file"], true);

    std::fs::remove_file(dir.path().join("anime.csv")).unwrap();
    let body: Value = server.get("/health").await.json();
    assert_eq!(body["dataset"]["anime_file"], false);
    assert_eq!(body["dataset"]["ratings_file"], true);
}

#[tokio::test]
async fn test_search_anime() {
    let server = create_test_server();
    let response = server
        .get("/api/v1/anime")
        .add_query_param("q", "co")
        .await;
    response.assert_status_ok();

    let hits: Vec<Value> = response.json();
    let names: Vec<&str> = hits.iter().filter_map(|h| h["name"].as_str()).collect();
    assert_eq!(names, vec!["Cowboy Bebop", "Lovely Complex"]);
    assert_eq!(hits[0]["type"], "TV");
}

#[tokio::test]
async fn test_search_anime_rejects_bad_limit() {
    let server = create_test_server();
    let response = server
        .get("/api/v1/anime")
        .add_query_param("limit", 0)
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_anime() {
    let server = create_test_server();
    let response = server.get("/api/v1/anime/2").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["name"], "Trigun");
    assert_eq!(body["details"]["image_url"], PLACEHOLDER_IMAGE_URL);
}

#[tokio::test]
async fn test_get_unknown_anime() {
    let server = create_test_server();
    let response = server.get("/api/v1/anime/999").await;
    response.assert_status(StatusCode::NOT_FOUND);

    let body: Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("999"));
}

#[tokio::test]
async fn test_recommendations() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({
            "user_id": 4,
            "selected_anime": ["Nana"],
            "top_n": 3
        }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    let recs = body["recommendations"].as_array().unwrap();
    assert!(!recs.is_empty() && recs.len() <= 3);
    assert!(recs.iter().all(|r| r["name"] != "Nana"));
    assert!(recs.iter().all(|r| r["explanation"] == "SVD: 0.4, NN: 0.3, Content: 0.3"));
    assert!(recs.iter().all(|r| r["image_url"] == PLACEHOLDER_IMAGE_URL));

    let scores: Vec<f64> = recs
        .iter()
        .map(|r| r["final_score"].as_f64().unwrap())
        .collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let effective = &body["effective_weights"];
    let total = effective["svd"].as_f64().unwrap()
        + effective["neural"].as_f64().unwrap()
        + effective["content"].as_f64().unwrap();
    assert!((total - 1.0).abs() < 1e-6);
    assert!(!body["genre_distribution"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_recommendations_for_unknown_user_without_selection() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": 999 }))
        .await;
    response.assert_status_ok();

    // Only the factor model can score an unseen user with no favourites
    let body: Value = response.json();
    assert_eq!(body["effective_weights"]["svd"], 1.0);
    assert_eq!(body["recommendations"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_recommendations_rejects_invalid_top_n() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": 1, "top_n": 0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_recommendations_rejects_out_of_range_weight() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/recommendations")
        .json(&json!({ "user_id": 1, "svd_weight": 2.0 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_feedback_round_trip() {
    let server = create_test_server();

    let response = server
        .post("/api/v1/feedback")
        .json(&json!({ "user_id": 7, "anime_id": 3, "kind": "like" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    server
        .post("/api/v1/feedback")
        .json(&json!({ "user_id": 7, "anime_id": 6, "kind": "like" }))
        .await
        .assert_status(StatusCode::CREATED);

    // Changing a vote replaces it
    server
        .post("/api/v1/feedback")
        .json(&json!({ "user_id": 7, "anime_id": 3, "kind": "dislike" }))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/api/v1/feedback/7").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["entries"].as_array().unwrap().len(), 2);
    assert_eq!(body["liked"], json!([6]));
    assert_eq!(body["disliked"], json!([3]));
}

#[tokio::test]
async fn test_feedback_for_unknown_anime() {
    let server = create_test_server();
    let response = server
        .post("/api/v1/feedback")
        .json(&json!({ "user_id": 7, "anime_id": 999, "kind": "like" }))
        .await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server();
    let response = server
        .get("/health")
        .add_header("x-request-id", "client-trace-1")
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("x-request-id"), "client-trace-1");
}

#[tokio::test]
async fn test_invalid_request_id_is_replaced() {
    let server = create_test_server();
    let response = server
        .get("/health")
        .add_header("x-request-id", "x".repeat(200))
        .await;
    let id = response.header("x-request-id");
    assert_eq!(id.to_str().unwrap().len(), 36);
}

#[tokio::test]
async fn test_request_id_is_generated() {
    let server = create_test_server();
    let response = server.get("/health").await;
    let id = response.header("x-request-id");
    assert_eq!(id.to_str().unwrap().len(), 36);
}
