//! HTTP API of the auction completion relayer.

use axum::{
	body::Bytes,
	extract::State,
	http::StatusCode,
	response::{IntoResponse, Json, Response},
	routing::get,
	Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, instrument};
use velox_core::AuctionRelayer;

#[derive(Clone)]
struct AppState {
	relayer: Option<Arc<AuctionRelayer>>,
}

pub struct ApiServer {
	port: u16,
	relayer: Option<Arc<AuctionRelayer>>,
}

impl ApiServer {
	pub fn new(port: u16, relayer: Option<Arc<AuctionRelayer>>) -> Self {
		Self { port, relayer }
	}

	#[instrument(skip(self))]
	pub async fn run(self) -> anyhow::Result<()> {
		let app = router(self.relayer);
		let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", self.port)).await?;

		info!("API server listening on port {}", self.port);

		axum::serve(listener, app).await?;

		Ok(())
	}
}

pub fn router(relayer: Option<Arc<AuctionRelayer>>) -> Router {
	Router::new()
		.route("/health", get(|| async { StatusCode::OK }))
		.route(
			"/api/complete-auction",
			get(relayer_info).post(complete_auction),
		)
		.with_state(AppState { relayer })
		.layer(TraceLayer::new_for_http())
		.layer(CorsLayer::permissive())
}

fn failure(status: StatusCode, error: impl Into<String>) -> Response {
	(status, Json(json!({ "success": false, "error": error.into() }))).into_response()
}

/// Reads `intentId` as a number or a numeric string.
fn parse_intent_id(body: &[u8]) -> Option<u64> {
	let value: Value = serde_json::from_slice(body).ok()?;
	match value.get("intentId")? {
		Value::Number(n) => n.as_u64(),
		Value::String(s) => s.trim().parse().ok(),
		_ => None,
	}
}

async fn complete_auction(State(state): State<AppState>, body: Bytes) -> Response {
	let Some(intent_id) = parse_intent_id(&body) else {
		return failure(StatusCode::BAD_REQUEST, "Missing or invalid intentId");
	};
	let Some(relayer) = state.relayer else {
		return failure(StatusCode::INTERNAL_SERVER_ERROR, "Relayer not configured");
	};

	match relayer.complete(intent_id).await {
		Ok(completion) => Json(json!({
			"success": true,
			"intentId": completion.intent_id,
			"txHash": completion.tx_hash.to_string(),
		}))
		.into_response(),
		Err(e) => {
			error!(intent_id, "Auction completion failed: {}", e);
			failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
		}
	}
}

async fn relayer_info(State(state): State<AppState>) -> Response {
	let Some(relayer) = state.relayer else {
		return failure(StatusCode::INTERNAL_SERVER_ERROR, "Relayer not configured");
	};
	Json(json!({
		"walletId": relayer.wallet_id(),
		"walletAddress": relayer.wallet_address().map(|a| a.to_hex_literal()),
	}))
	.into_response()
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::{to_bytes, Body};
	use axum::http::Request;
	use tower::ServiceExt;
	use velox_config::ConfigLoader;
	use velox_core::VeloxClient;

	fn relayer() -> Arc<AuctionRelayer> {
		let config = ConfigLoader::from_toml(
			r#"
			[network]
			network = "bardock"
			rpc_url = "http://127.0.0.1:9/v1"
			timeout_secs = 1

			[storage]
			backend = "memory"

			[relayer]
			wallet_id = "relayer-1"
			private_key = "0x2222222222222222222222222222222222222222222222222222222222222222"
			"#,
		)
		.unwrap();
		let client = VeloxClient::from_config(config).unwrap();
		Arc::new(client.relayer().unwrap())
	}

	async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
		let response = app.oneshot(request).await.unwrap();
		let status = response.status();
		let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
		(status, serde_json::from_slice(&bytes).unwrap())
	}

	fn post(body: &str) -> Request<Body> {
		Request::post("/api/complete-auction")
			.header("content-type", "application/json")
			.body(Body::from(body.to_string()))
			.unwrap()
	}

	#[test]
	fn test_parse_intent_id() {
		assert_eq!(parse_intent_id(br#"{"intentId": 7}"#), Some(7));
		assert_eq!(parse_intent_id(br#"{"intentId": "8"}"#), Some(8));
		assert_eq!(parse_intent_id(br#"{"intentId": -1}"#), None);
		assert_eq!(parse_intent_id(br#"{"id": 7}"#), None);
		assert_eq!(parse_intent_id(b"not json"), None);
	}

	#[tokio::test]
	async fn test_missing_intent_id_is_bad_request() {
		let (status, body) = call(router(Some(relayer())), post("{}")).await;
		assert_eq!(status, StatusCode::BAD_REQUEST);
		assert_eq!(body["success"], false);
	}

	#[tokio::test]
	async fn test_relayer_failure_is_server_error() {
		let (status, body) = call(router(Some(relayer())), post(r#"{"intentId": 3}"#)).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
		assert_eq!(body["success"], false);
		assert!(body["error"].as_str().is_some());
	}

	#[tokio::test]
	async fn test_unconfigured_relayer() {
		let (status, _) = call(router(None), post(r#"{"intentId": 3}"#)).await;
		assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
	}

	#[tokio::test]
	async fn test_relayer_info() {
		let request = Request::get("/api/complete-auction").body(Body::empty()).unwrap();
		let (status, body) = call(router(Some(relayer())), request).await;
		assert_eq!(status, StatusCode::OK);
		assert_eq!(body["walletId"], "relayer-1");
		assert_eq!(body["walletAddress"].as_str().map(str::len), Some(66));
	}
}
