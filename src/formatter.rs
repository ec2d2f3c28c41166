//! Renders decoded payloads into robot messages.
//!
//! Alerts get a detailed rendering only on feishu. Weixin robots receive the
//! alert `message` as is.

use crate::{
	alert::{AlertPayload, Labels},
	message::{FeishuMessage, OutboundMessage, Span, WeChatMessage},
	settings::TargetPlatform,
	source_event::{format_merge_event, format_push_event, SourceEvent},
};

/// Formats an alert for the given target platform.
///
/// # Arguments
///
/// * `payload` - decoded alert
///
/// * `target` - platform of the configured robot
pub fn format_alert(payload: &AlertPayload, target: TargetPlatform) -> OutboundMessage {
	match target {
		TargetPlatform::WeChat => WeChatMessage::markdown(payload.message.as_str()).into(),
		TargetPlatform::Feishu => {
			let spans = alert_lines(payload).into_iter().map(Span::text).collect();

			FeishuMessage::post(payload.title.as_str(), vec![spans]).into()
		}
	}
}

/// Formats a gitlab hook for the given target platform.
pub fn format_source_event(event: &SourceEvent, target: TargetPlatform) -> OutboundMessage {
	let text = match event {
		SourceEvent::Push(push) => format_push_event(push),
		SourceEvent::Merge(merge) => format_merge_event(merge),
	};

	match target {
		TargetPlatform::WeChat => WeChatMessage::markdown(text).into(),
		TargetPlatform::Feishu => FeishuMessage::post("", vec![vec![Span::text(text)]]).into(),
	}
}

/// lines of the feishu alert rendering, one span each
pub fn alert_lines(payload: &AlertPayload) -> Vec<String> {
	let mut lines = vec![format!("## {}", payload.title)];

	lines.push(
		if payload.is_firing() { "Status: 🚨 Alerting" } else { "Status: ✅ Resolved" }.to_owned(),
	);

	if !payload.message.is_empty() {
		lines.push(format!("\n{}", payload.message));
	}

	if payload.alerts.is_empty() {
		return lines;
	}

	lines.push(String::from("\n### Alert details:"));
	for (i, alert) in payload.alerts.iter().enumerate() {
		lines.push(format!("\n---\n**Alert #{}**", i + 1));
		lines.push(
			if alert.is_firing() { "Status: 🚨 Triggered" } else { "Status: ✅ Resolved" }.to_owned(),
		);

		push_labels(&mut lines, "Labels:", &alert.labels);
		push_labels(&mut lines, "Annotations:", &alert.annotations);

		lines.push(format!("Start time: {}", alert.starts_at.display()));
		if !alert.ends_at.is_zero() {
			lines.push(format!("End time: {}", alert.ends_at.display()));
		}
	}

	lines
}

fn push_labels(lines: &mut Vec<String>, header: &str, labels: &Labels) {
	if labels.is_empty() {
		return;
	}

	lines.push(header.to_owned());
	lines.extend(labels.iter().map(|(key, value)| format!("  - {key}: {value}")));
}
