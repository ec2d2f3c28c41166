//! Posts rendered messages to the robot intake url.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, StatusCode};
use serde::Deserialize;
use serde_with::{serde_as, DurationSecondsWithFrac};
use thiserror::Error;
use url::Url;

use crate::{message::OutboundMessage, metrics::METRICS, settings::TargetPlatform};

fn default_timeout() -> Duration {
	Duration::from_secs(5)
}

#[serde_as]
#[derive(Debug, Clone, Deserialize)]
/// robot specific settings
pub struct RobotSettings {
	pub target: TargetPlatform,
	pub url: Url,
	/// upper bound for a single request to the robot
	#[serde_as(as = "DurationSecondsWithFrac<f64>")]
	#[serde(default = "default_timeout")]
	pub timeout: Duration,
}

/// Error occuring when delivering a message to the robot
#[derive(Error, Debug)]
pub enum DeliveryError {
	#[error("request to robot failed")]
	Request(#[from] reqwest::Error),
	#[error("robot answered with {status}: {body}")]
	Status { status: StatusCode, body: String },
	#[error("robot response is not json: {body}")]
	Decode {
		body: String,
		#[source]
		source: serde_json::Error,
	},
}

/// Something which can deliver messages to the robot
#[async_trait]
pub trait Deliver: Send + Sync {
	/// Delivers a message and returns the decoded response of the robot.
	async fn deliver(&self, message: &OutboundMessage) -> Result<serde_json::Value, DeliveryError>;
}

#[derive(Debug, Clone)]
/// http client for the configured robot
pub struct RobotClient {
	client: reqwest::Client,
	url: Url,
	target: TargetPlatform,
}

impl RobotClient {
	pub fn new(settings: &RobotSettings) -> Result<Self, DeliveryError> {
		let client = reqwest::Client::builder().timeout(settings.timeout).build()?;

		Ok(Self { client, url: settings.url.clone(), target: settings.target })
	}

	async fn post(&self, message: &OutboundMessage) -> Result<serde_json::Value, DeliveryError> {
		let _timer = METRICS.time_request(self.target);

		let response = self
			.client
			.post(self.url.clone())
			.header(CONTENT_TYPE, "application/json")
			.json(message)
			.send()
			.await?;

		let status = response.status();
		let body = response.text().await?;

		if !status.is_success() {
			return Err(DeliveryError::Status { status, body });
		}

		serde_json::from_str(&body).map_err(|source| DeliveryError::Decode { body, source })
	}
}

#[async_trait]
impl Deliver for RobotClient {
	async fn deliver(&self, message: &OutboundMessage) -> Result<serde_json::Value, DeliveryError> {
		METRICS.record_delivery(self.target);

		let result = self.post(message).await;
		if result.is_err() {
			METRICS.record_delivery_failure(self.target);
		}

		result
	}
}

#[cfg(test)]
mod tests {
	use std::net::{SocketAddr, TcpListener};

	use axum::{
		http::{header, HeaderMap},
		routing::post,
		Json, Router,
	};
	use bytes::Bytes;
	use serde_json::{json, Value};

	use super::*;
	use crate::message::{FeishuMessage, Span, WeChatMessage};

	/// echoes content type and decoded body back as json
	async fn echo(headers: HeaderMap, body: Bytes) -> Json<Value> {
		let content_type = headers.get(header::CONTENT_TYPE).and_then(|value| value.to_str().ok());
		let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

		Json(json!({ "content_type": content_type, "body": body }))
	}

	async fn rejected() -> (axum::http::StatusCode, &'static str) {
		(axum::http::StatusCode::BAD_REQUEST, "invalid webhook key")
	}

	async fn plain() -> &'static str {
		"ok"
	}

	async fn slow() -> Json<Value> {
		tokio::time::sleep(Duration::from_secs(2)).await;
		Json(json!({}))
	}

	/// serves a fake robot on an ephemeral port of localhost
	fn spawn_robot() -> SocketAddr {
		let listener = TcpListener::bind("127.0.0.1:0").unwrap();
		let addr = listener.local_addr().unwrap();

		let app = Router::new()
			.route("/echo", post(echo))
			.route("/rejected", post(rejected))
			.route("/plain", post(plain))
			.route("/slow", post(slow));

		tokio::spawn(axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service()));

		addr
	}

	fn client(addr: SocketAddr, path: &str, timeout: Duration) -> RobotClient {
		RobotClient::new(&RobotSettings {
			target: TargetPlatform::Feishu,
			url: Url::parse(&format!("http://{addr}{path}")).unwrap(),
			timeout,
		})
		.unwrap()
	}

	#[tokio::test]
	async fn posts_message_as_json() {
		let addr = spawn_robot();
		let message: OutboundMessage =
			FeishuMessage::post("DiskFull", vec![vec![Span::text("## DiskFull")]]).into();

		let response =
			client(addr, "/echo", Duration::from_secs(5)).deliver(&message).await.unwrap();

		assert_eq!(response["content_type"], "application/json");
		assert_eq!(response["body"], serde_json::to_value(&message).unwrap());
	}

	#[tokio::test]
	async fn error_status_is_a_status_error() {
		let addr = spawn_robot();
		let message = WeChatMessage::markdown("ping").into();

		match client(addr, "/rejected", Duration::from_secs(5)).deliver(&message).await {
			Err(DeliveryError::Status { status, body }) => {
				assert_eq!(status, StatusCode::BAD_REQUEST);
				assert_eq!(body, "invalid webhook key");
			}
			other => panic!("expected a status error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn non_json_response_is_a_decode_error() {
		let addr = spawn_robot();
		let message = WeChatMessage::markdown("ping").into();

		match client(addr, "/plain", Duration::from_secs(5)).deliver(&message).await {
			Err(DeliveryError::Decode { body, .. }) => assert_eq!(body, "ok"),
			other => panic!("expected a decode error, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn slow_robot_times_out() {
		let addr = spawn_robot();
		let message = WeChatMessage::markdown("ping").into();

		match client(addr, "/slow", Duration::from_millis(200)).deliver(&message).await {
			Err(DeliveryError::Request(err)) => assert!(err.is_timeout()),
			other => panic!("expected a timeout, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn unreachable_robot_is_an_error() {
		// nothing listens on the discard port of localhost
		let client = client(SocketAddr::from(([127, 0, 0, 1], 9)), "/hook", Duration::from_secs(1));

		let message = WeChatMessage::markdown("ping").into();

		assert!(client.deliver(&message).await.is_err());
	}

	#[test]
	fn timeout_keeps_fractional_seconds() {
		let settings: RobotSettings = serde_json::from_value(json!({
			"target": "feishu",
			"url": "https://open.feishu.cn/open-apis/bot/v2/hook/xxx"
		}))
		.unwrap();

		assert_eq!(settings.timeout, Duration::from_secs(5));
		assert_eq!(settings.target, TargetPlatform::Feishu);

		let settings: RobotSettings = serde_json::from_value(json!({
			"target": "weixin",
			"url": "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=k",
			"timeout": 1.5
		}))
		.unwrap();
		assert_eq!(settings.timeout, Duration::from_millis(1500));

		let settings: RobotSettings = serde_json::from_value(json!({
			"target": "weixin",
			"url": "https://qyapi.weixin.qq.com/cgi-bin/webhook/send?key=k",
			"timeout": 0.4
		}))
		.unwrap();
		assert_eq!(settings.timeout, Duration::from_millis(400));
	}
}
