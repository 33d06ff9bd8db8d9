//! HTTP API tests against a server bound to an ephemeral port.

mod common;

use busbot::booking::BookingService;
use busbot::cli::commands::{router, AppState};
use busbot::pipeline::Pipeline;
use common::{Fixture, ScriptedGenerator, UnavailableStore, CATALOG, DIMENSIONS};
use serde_json::{json, Value};
use std::sync::Arc;

struct TestServer {
    base: String,
    client: reqwest::Client,
    fixture: Fixture,
}

impl TestServer {
    async fn start(generator: Arc<ScriptedGenerator>, ingest: bool) -> Self {
        let fixture = Fixture::new();
        let pipeline = fixture.pipeline(generator);
        if ingest {
            pipeline.ingest().await.unwrap();
        }
        Self::serve(fixture, pipeline).await
    }

    async fn serve(fixture: Fixture, pipeline: Pipeline) -> Self {
        let catalog = pipeline.catalog().unwrap();
        let state = Arc::new(AppState::new(
            pipeline,
            catalog,
            BookingService::in_memory().unwrap(),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            fixture,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(self.url(path)).send().await.unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }

    async fn delete(&self, path: &str) -> (u16, Value) {
        let response = self.client.delete(self.url(path)).send().await.unwrap();
        (response.status().as_u16(), response.json().await.unwrap())
    }
}

fn booking_request() -> Value {
    json!({
        "name": "Rahim Uddin",
        "phone": "+8801711000000",
        "bus_provider": "hanif",
        "from_district": "Dhaka",
        "to_district": "Rajshahi",
        "dropping_point": "Shaheb Bazar",
        "travel_date": "2026-11-02",
        "num_passengers": 2
    })
}

#[tokio::test]
async fn test_health_reports_index_size() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), true).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert!(body["indexed_segments"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_health_reports_index_failure() {
    let fixture = Fixture::new();
    let pipeline = fixture.pipeline_with(
        Arc::new(UnavailableStore),
        DIMENSIONS,
        ScriptedGenerator::replying("ok"),
    );
    let server = TestServer::serve(fixture, pipeline).await;

    let (status, body) = server.get("/health").await;
    assert_eq!(status, 500);
    assert_eq!(body["kind"], "internal");
    assert!(body["error"].as_str().unwrap().contains("malformed"));
}

#[tokio::test]
async fn test_ask_returns_grounded_answer() {
    let server = TestServer::start(ScriptedGenerator::replying("Call 01713-049530."), true).await;

    let (status, body) = server
        .post("/ask", json!({ "question": "What is the hotline of Hanif?", "top_k": 3 }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["answer"], "Call 01713-049530.");
    assert_eq!(body["grounded"], true);
    let sources = body["sources"].as_array().unwrap();
    assert!(!sources.is_empty() && sources.len() <= 3);
}

#[tokio::test]
async fn test_ask_without_context_is_not_an_error() {
    let server = TestServer::start(ScriptedGenerator::failing(), false).await;

    let (status, body) = server.post("/ask", json!({ "question": "Buses to Sylhet?" })).await;

    assert_eq!(status, 200);
    assert_eq!(body["grounded"], false);
    assert!(body["sources"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_ask_generation_outage_is_503() {
    let server = TestServer::start(ScriptedGenerator::failing(), true).await;

    let (status, body) = server.post("/ask", json!({ "question": "Buses to Sylhet?" })).await;

    assert_eq!(status, 503);
    assert_eq!(body["kind"], "generation_unavailable");
}

#[tokio::test]
async fn test_search_with_provider_in_query() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), true).await;

    let (status, body) = server
        .post("/search", json!({ "query": "Ena refund rules", "limit": 2 }))
        .await;

    assert_eq!(status, 200);
    assert_eq!(body["provider"], "ena");
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0]["score"].as_f64().unwrap() >= results[1]["score"].as_f64().unwrap());
}

#[tokio::test]
async fn test_zero_results_requested_is_400() {
    let generator = ScriptedGenerator::replying("ok");
    let server = TestServer::start(generator.clone(), true).await;

    let (status, body) = server
        .post("/ask", json!({ "question": "What is the hotline of Hanif?", "top_k": 0 }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = server
        .post("/search", json!({ "query": "Ena refund rules", "limit": 0 }))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_input");

    assert_eq!(generator.call_count(), 0);
}

#[tokio::test]
async fn test_catalog_endpoints() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), false).await;

    let (_, body) = server.get("/districts").await;
    assert_eq!(body["districts"].as_array().unwrap().len(), 3);

    let (_, body) = server
        .get("/available-providers?from_district=Dhaka&to_district=Sylhet")
        .await;
    assert_eq!(body["providers"], json!(["Hanif", "Ena"]));

    let (_, body) = server
        .get("/available-providers?from_district=Rajshahi&to_district=Chittagong")
        .await;
    assert!(body["providers"].as_array().unwrap().is_empty());
    assert!(body["message"].as_str().unwrap().contains("No bus providers"));

    let (_, body) = server.get("/dropping-points/rajshahi").await;
    assert_eq!(body["dropping_points"][0]["name"], "Shaheb Bazar");
    assert_eq!(body["dropping_points"][0]["price"], 450);

    let (status, body) = server.get("/providers/Hanif/policy").await;
    assert_eq!(status, 200);
    assert!(body["policy"].as_str().unwrap().contains("01713-049530"));

    let (status, body) = server.get("/providers/Shohagh/policy").await;
    assert_eq!(status, 404);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_booking_lifecycle() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), false).await;

    let (status, booking) = server.post("/bookings", booking_request()).await;
    assert_eq!(status, 201);
    assert_eq!(booking["booking_id"], "BK00001");
    assert_eq!(booking["bus_provider"], "Hanif");
    assert_eq!(booking["phone"], "01711000000");
    assert_eq!(booking["total_amount"], 900);
    assert_eq!(booking["status"], "active");

    let (status, body) = server.get("/bookings/phone/01711000000").await;
    assert_eq!(status, 200);
    assert_eq!(body["bookings"].as_array().unwrap().len(), 1);

    let (status, _) = server.delete("/bookings/BK00001").await;
    assert_eq!(status, 200);
    let (_, body) = server.get("/bookings/BK00001").await;
    assert_eq!(body["status"], "cancelled");

    // A cancelled booking cannot be cancelled again.
    let (status, _) = server.delete("/bookings/BK00001").await;
    assert_eq!(status, 404);

    let (status, _) = server.delete("/bookings/BK00001?permanent=true").await;
    assert_eq!(status, 200);
    let (status, _) = server.get("/bookings/BK00001").await;
    assert_eq!(status, 404);

    let (_, stats) = server.get("/stats").await;
    assert_eq!(stats["total_bookings"], 0);
}

#[tokio::test]
async fn test_invalid_booking_is_400() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), false).await;

    let mut request = booking_request();
    request["to_district"] = json!("Sylhet");
    request["dropping_point"] = json!("Kadamtali");
    request["bus_provider"] = json!("Green Line");

    let (status, body) = server.post("/bookings", request).await;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_input");

    let (_, stats) = server.get("/stats").await;
    assert_eq!(stats["total_bookings"], 0);
}

#[tokio::test]
async fn test_ingest_refreshes_catalog() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), true).await;

    let (_, body) = server.get("/providers").await;
    assert_eq!(body["providers"].as_array().unwrap().len(), 2);

    let mut catalog: Value = serde_json::from_str(CATALOG).unwrap();
    catalog["bus_providers"]
        .as_array_mut()
        .unwrap()
        .push(json!({ "name": "Green Line", "coverage_districts": ["Dhaka", "Sylhet"] }));
    server.fixture.write_catalog(&catalog.to_string());

    // Not visible before the next ingest.
    let (_, body) = server
        .get("/available-providers?from_district=Dhaka&to_district=Sylhet")
        .await;
    assert_eq!(body["providers"], json!(["Hanif", "Ena"]));

    let (status, _) = server.post("/ingest", json!({})).await;
    assert_eq!(status, 200);

    let (_, body) = server
        .get("/available-providers?from_district=Dhaka&to_district=Sylhet")
        .await;
    assert_eq!(body["providers"], json!(["Hanif", "Ena", "Green Line"]));

    let mut request = booking_request();
    request["bus_provider"] = json!("Green Line");
    request["to_district"] = json!("Sylhet");
    request["dropping_point"] = json!("Kadamtali");
    let (status, booking) = server.post("/bookings", request).await;
    assert_eq!(status, 201);
    assert_eq!(booking["bus_provider"], "Green Line");
}

#[tokio::test]
async fn test_ingest_keeps_catalog_when_file_breaks() {
    let server = TestServer::start(ScriptedGenerator::replying("ok"), false).await;

    server.fixture.write_catalog("{ not json");
    let (status, _) = server.post("/ingest", json!({})).await;
    assert_eq!(status, 200);

    let (_, body) = server.get("/districts").await;
    assert_eq!(body["districts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_smart_query_cancel_dialogue() {
    let generator = ScriptedGenerator::replying("ok");
    let server = TestServer::start(generator.clone(), false).await;
    let (_, booking) = server.post("/bookings", booking_request()).await;

    let (status, first) = server
        .post("/query/smart", json!({ "query": "Please cancel my ticket" }))
        .await;
    assert_eq!(status, 200);
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    assert!(first["message"].as_str().unwrap().contains("phone number"));

    let (status, second) = server
        .post(
            "/query/smart",
            json!({ "query": "+8801711000000", "session_id": session_id }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(
        second["message"],
        format!("Booking {} has been cancelled successfully.", booking["booking_id"].as_str().unwrap())
    );
    assert_eq!(generator.call_count(), 0);

    let (_, stored) = server.get("/bookings/BK00001").await;
    assert_eq!(stored["status"], "cancelled");

    let (status, history) = server.get(&format!("/chat/{}?limit=3", session_id)).await;
    assert_eq!(status, 200);
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "assistant");
    assert_eq!(messages[1]["message"], "+8801711000000");
    assert_eq!(messages[2]["phone"], "01711000000");

    let (status, _) = server.delete(&format!("/chat/{}", session_id)).await;
    assert_eq!(status, 200);
    let (_, history) = server.get(&format!("/chat/{}", session_id)).await;
    assert!(history["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_smart_query_answers_questions() {
    let server = TestServer::start(ScriptedGenerator::replying("Call 01713-049530."), true).await;

    let (status, body) = server
        .post(
            "/query/smart",
            json!({ "query": "What is the hotline of Hanif?", "session_id": "web-1" }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["session_id"], "web-1");
    assert_eq!(body["message"], "Call 01713-049530.");

    let (status, body) = server.post("/query/smart", json!({ "query": "  " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["kind"], "invalid_input");
}

#[tokio::test]
async fn test_smart_query_generation_outage_is_503() {
    let server = TestServer::start(ScriptedGenerator::failing(), true).await;

    let (status, body) = server
        .post("/query/smart", json!({ "query": "Buses to Sylhet?" }))
        .await;
    assert_eq!(status, 503);
    assert_eq!(body["kind"], "generation_unavailable");
}
