//! The inbound webhook endpoint.
//!
//! Every request runs read -> decode -> format -> deliver. Failures are logged
//! here and, unless `surface_errors` is set, the caller always gets an empty
//! 200 regardless of what happened downstream.

use std::{
	any::Any,
	borrow::Cow,
	net::{IpAddr, Ipv4Addr, SocketAddr},
	sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
	extract::{rejection::BytesRejection, Extension},
	http::{Method, StatusCode},
	routing::any,
	Router,
};
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::{
	delivery::{Deliver, DeliveryError},
	dispatcher::{self, DecodeError},
	metrics::METRICS,
	settings::{PayloadKind, Settings, TargetPlatform},
};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReceiverSettings {
	pub bind_address: IpAddr,
	pub port: u16,
	/// route of the webhook
	pub path: String,
	/// answer failed requests with an error status instead of 200
	pub surface_errors: bool,
	pub payload_kind: PayloadKind,
	/// substring replacements applied to the raw body before decoding
	pub url_rewrites: Vec<UrlRewrite>,
}

impl Default for ReceiverSettings {
	fn default() -> Self {
		Self {
			bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
			port: 8081,
			path: String::from("/webhook"),
			surface_errors: false,
			payload_kind: PayloadKind::default(),
			url_rewrites: Vec::new(),
		}
	}
}

impl ReceiverSettings {
	pub fn to_socket_addr(&self) -> SocketAddr {
		SocketAddr::new(self.bind_address, self.port)
	}

	/// url to configure at the alert source
	pub fn listen_url(&self, host: IpAddr) -> String {
		format!("http://{}{}", SocketAddr::new(host, self.port), self.path)
	}
}

/// e.g. rewrite links to an internal grafana into its public address
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UrlRewrite {
	pub from: String,
	pub to: String,
}

/// Error occuring while relaying a single request
#[derive(Error, Debug)]
pub enum RelayError {
	#[error("method {0} is not allowed")]
	MethodNotAllowed(Method),
	#[error("request body is empty")]
	EmptyBody,
	#[error("failed to read request body: {0}")]
	ReadBody(String),
	#[error(transparent)]
	Decode(#[from] DecodeError),
	#[error("failed to deliver message to robot")]
	Delivery(#[from] DeliveryError),
	#[error("relaying panicked: {0}")]
	Panicked(String),
}

impl RelayError {
	/// label of the `webhook_dropped_total` meter
	fn reason(&self) -> &'static str {
		match self {
			Self::MethodNotAllowed(_) => "method",
			Self::EmptyBody | Self::ReadBody(_) => "read",
			Self::Decode(_) => "decode",
			Self::Delivery(_) => "delivery",
			Self::Panicked(_) => "panic",
		}
	}

	/// response status when errors are surfaced to the caller
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
			Self::EmptyBody | Self::ReadBody(_) => StatusCode::BAD_REQUEST,
			Self::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
			Self::Delivery(_) => StatusCode::BAD_GATEWAY,
			Self::Panicked(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

/// read only state shared by all requests
pub struct RelayState {
	target: TargetPlatform,
	payload_kind: PayloadKind,
	surface_errors: bool,
	url_rewrites: Vec<UrlRewrite>,
	robot: Arc<dyn Deliver>,
}

impl RelayState {
	pub fn new(settings: &Settings, robot: Arc<dyn Deliver>) -> Self {
		Self {
			target: settings.robot.target,
			payload_kind: settings.receiver.payload_kind,
			surface_errors: settings.receiver.surface_errors,
			url_rewrites: settings.receiver.url_rewrites.clone(),
			robot,
		}
	}

	/// Relays a single request to the robot.
	///
	/// # Arguments
	///
	/// * `method` - method of the inbound request, only POST is relayed
	///
	/// * `body` - the raw body or the reason it couldn't be read
	async fn relay(&self, method: Method, body: Result<Bytes, RelayError>) -> Result<(), RelayError> {
		if method != Method::POST {
			return Err(RelayError::MethodNotAllowed(method));
		}

		let body = body?;
		if body.is_empty() {
			return Err(RelayError::EmptyBody);
		}

		let body = self.rewrite(&body);
		tracing::debug!(payload = %String::from_utf8_lossy(&body), "received payload");

		let payload = dispatcher::classify_payload(&body, self.payload_kind)?;
		METRICS.record_received(payload.kind());

		let message = dispatcher::route(&payload, self.target);

		match self.robot.deliver(&message).await {
			Ok(response) => {
				tracing::info!(
					kind = %payload.kind(),
					summary = payload.summary(),
					%response,
					"relayed payload to {} robot",
					self.target
				);
				if let Ok(json) = serde_json::to_string(&message) {
					tracing::debug!(message = %json, "delivered message");
				}

				Ok(())
			}
			Err(err) => Err(err.into()),
		}
	}

	fn rewrite<'a>(&self, body: &'a [u8]) -> Cow<'a, [u8]> {
		if self.url_rewrites.is_empty() {
			return Cow::Borrowed(body);
		}

		let mut text = String::from_utf8_lossy(body).into_owned();
		for UrlRewrite { from, to } in &self.url_rewrites {
			text = text.replace(from.as_str(), to);
		}

		Cow::Owned(text.into_bytes())
	}

	fn respond(&self, result: Result<(), RelayError>) -> StatusCode {
		let err = match result {
			Ok(()) => return StatusCode::OK,
			Err(err) => err,
		};

		METRICS.record_dropped(err.reason());
		let status = if self.surface_errors { err.status_code() } else { StatusCode::OK };

		match err {
			RelayError::Delivery(_) | RelayError::Panicked(_) => {
				tracing::error!("dropping request: {:#}", anyhow::Error::new(err))
			}
			_ => tracing::warn!("dropping request: {:#}", anyhow::Error::new(err)),
		}

		status
	}
}

async fn webhook_receiver(
	Extension(state): Extension<Arc<RelayState>>,
	method: Method,
	body: Result<Bytes, BytesRejection>,
) -> StatusCode {
	let body = body.map_err(|err| RelayError::ReadBody(err.to_string()));

	// a panic only takes down the spawned task, not the connection or process
	let task_state = Arc::clone(&state);
	let result = match tokio::spawn(async move { task_state.relay(method, body).await }).await {
		Ok(result) => result,
		Err(err) if err.is_panic() => Err(RelayError::Panicked(panic_message(err.into_panic()))),
		Err(err) => Err(RelayError::Panicked(err.to_string())),
	};

	state.respond(result)
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
	if let Some(msg) = panic.downcast_ref::<&str>() {
		(*msg).to_owned()
	} else if let Some(msg) = panic.downcast_ref::<String>() {
		msg.clone()
	} else {
		String::from("unknown panic payload")
	}
}

/// router serving the webhook on `path` for every method, so wrong methods
/// are logged like every other dropped request
pub fn router(path: &str, state: Arc<RelayState>) -> Router {
	Router::new().route(path, any(webhook_receiver)).layer(Extension(state))
}

pub async fn run_relay_endpoint(settings: &ReceiverSettings, state: Arc<RelayState>) -> Result<()> {
	let addr = settings.to_socket_addr();
	let app = router(&settings.path, state);

	axum::Server::try_bind(&addr)
		.with_context(|| format!("failed to bind webhook endpoint to {addr}"))?
		.serve(app.into_make_service())
		.await
		.context("webhook endpoint crashed")?;

	Ok(())
}
