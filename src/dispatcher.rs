//! Decides what an inbound body is and which formatter renders it.

use serde::Deserialize;
use thiserror::Error;

use crate::{
	alert::AlertPayload,
	formatter,
	message::OutboundMessage,
	settings::{PayloadKind, TargetPlatform},
	source_event::SourceEvent,
};

/// a decoded inbound body
#[derive(Clone, Debug)]
pub enum Payload {
	Alert(Box<AlertPayload>),
	Source(SourceEvent),
}

impl Payload {
	pub fn kind(&self) -> PayloadKind {
		match self {
			Self::Alert(_) => PayloadKind::Alert,
			Self::Source(_) => PayloadKind::SourceEvent,
		}
	}

	/// short human readable description for logging
	pub fn summary(&self) -> &str {
		match self {
			Self::Alert(alert) => alert.title.as_str(),
			Self::Source(SourceEvent::Push(push)) => push.project.name.as_str(),
			Self::Source(SourceEvent::Merge(merge)) => merge.project.name.as_str(),
		}
	}
}

/// Error occuring when an inbound body doesn't match the accepted payload kind
#[derive(Error, Debug)]
pub enum DecodeError {
	#[error("body is not a valid alert payload")]
	Alert(#[source] serde_json::Error),
	#[error("body is not a valid gitlab hook")]
	SourceEvent(#[source] serde_json::Error),
	#[error("unsupported gitlab object kind {0:?}")]
	UnsupportedObjectKind(String),
}

/// the part of a gitlab hook which tells push and merge request hooks apart
#[derive(Deserialize)]
struct ObjectKind {
	object_kind: String,
}

/// Decodes a raw body as the payload kind the relay is configured to accept.
///
/// # Arguments
///
/// * `raw_body` - body of the inbound request
///
/// * `accepted` - configured payload kind, only this kind is attempted
pub fn classify_payload(raw_body: &[u8], accepted: PayloadKind) -> Result<Payload, DecodeError> {
	match accepted {
		PayloadKind::Alert => serde_json::from_slice::<AlertPayload>(raw_body)
			.map(|alert| Payload::Alert(Box::new(alert)))
			.map_err(DecodeError::Alert),
		PayloadKind::SourceEvent => {
			let ObjectKind { object_kind } =
				serde_json::from_slice(raw_body).map_err(DecodeError::SourceEvent)?;

			let event = match object_kind.as_str() {
				"push" | "tag_push" => SourceEvent::Push(
					serde_json::from_slice(raw_body).map_err(DecodeError::SourceEvent)?,
				),
				"merge_request" => SourceEvent::Merge(
					serde_json::from_slice(raw_body).map_err(DecodeError::SourceEvent)?,
				),
				_ => return Err(DecodeError::UnsupportedObjectKind(object_kind)),
			};

			Ok(Payload::Source(event))
		}
	}
}

/// Renders a decoded payload for the configured target platform.
pub fn route(payload: &Payload, target: TargetPlatform) -> OutboundMessage {
	match payload {
		Payload::Alert(alert) => formatter::format_alert(alert, target),
		Payload::Source(event) => formatter::format_source_event(event, target),
	}
}
