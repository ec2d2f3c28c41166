//! data structures for deserializing incoming grafana / alertmanager alerts
use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DefaultOnNull};

/// labels and annotations, sorted by key so rendered alerts are reproducible
pub type Labels = BTreeMap<String, String>;

/// rendering used for every timestamp shown to humans
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// what grafana sends for alerts which didn't end yet
const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

/// [ZERO_TIME] as unix timestamp
const ZERO_UNIX: i64 = -62_135_596_800;

#[serde_as]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
/// data received by the webhook receiver. Everything besides `status` is
/// optional, missing and `null` fields fall back to their zero value.
#[allow(clippy::missing_docs_in_private_items)]
pub struct AlertPayload {
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub receiver: String,
	pub status: String,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub alerts: Vec<AlertItem>,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub group_labels: Labels,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub common_labels: Labels,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub common_annotations: Labels,
	#[serde(default, rename = "externalURL")]
	#[serde_as(as = "DefaultOnNull")]
	pub external_url: String,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub version: String,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub group_key: String,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub truncated_alerts: i64,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub org_id: i64,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub title: String,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub state: String,
	#[serde(default)]
	#[serde_as(as = "DefaultOnNull")]
	pub message: String,
}

impl AlertPayload {
	pub fn is_firing(&self) -> bool {
		self.status == "firing"
	}
}

#[serde_as]
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::missing_docs_in_private_items)]
pub struct AlertItem {
	#[serde_as(as = "DefaultOnNull")]
	pub status: String,
	#[serde_as(as = "DefaultOnNull")]
	pub labels: Labels,
	#[serde_as(as = "DefaultOnNull")]
	pub annotations: Labels,
	pub starts_at: Timestamp,
	pub ends_at: Timestamp,
	#[serde(rename = "generatorURL")]
	#[serde_as(as = "DefaultOnNull")]
	pub generator_url: String,
	/// identifies repeated notifications about the same alert instance
	#[serde_as(as = "DefaultOnNull")]
	pub fingerprint: String,
}

impl AlertItem {
	pub fn is_firing(&self) -> bool {
		self.status == "firing"
	}
}

/// A point in time which may be the zero timestamp `0001-01-01T00:00:00Z`.
///
/// `null`, a missing field and the zero timestamp all decode to the zero
/// value. The utc offset is kept so times render the way the sender
/// wrote them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timestamp(Option<DateTime<FixedOffset>>);

impl Timestamp {
	pub fn is_zero(&self) -> bool {
		self.0.is_none()
	}

	/// renders as `YYYY-MM-DD HH:MM:SS`
	pub fn display(&self) -> impl fmt::Display + '_ {
		DisplayTimestamp(self)
	}
}

impl From<DateTime<FixedOffset>> for Timestamp {
	fn from(time: DateTime<FixedOffset>) -> Self {
		// only the exact zero instant, independent of the offset it was written in
		if time.timestamp() == ZERO_UNIX && time.timestamp_subsec_nanos() == 0 {
			Self(None)
		} else {
			Self(Some(time))
		}
	}
}

struct DisplayTimestamp<'a>(&'a Timestamp);

impl fmt::Display for DisplayTimestamp<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.0 .0 {
			Some(time) => write!(f, "{}", time.format(TIME_FORMAT)),
			None => f.write_str("0001-01-01 00:00:00"),
		}
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let time = Option::<DateTime<FixedOffset>>::deserialize(deserializer)?;

		Ok(time.map(Self::from).unwrap_or_default())
	}
}

impl Serialize for Timestamp {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		match self.0 {
			Some(time) => serializer.serialize_str(&time.to_rfc3339()),
			None => serializer.serialize_str(ZERO_TIME),
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn only_status_is_required() {
		let payload: AlertPayload = serde_json::from_value(json!({ "status": "resolved" })).unwrap();

		assert!(!payload.is_firing());
		assert!(payload.alerts.is_empty());
		assert!(payload.message.is_empty());
		assert_eq!(payload.org_id, 0);

		assert!(serde_json::from_value::<AlertPayload>(json!({ "title": "x" })).is_err());
	}

	#[test]
	fn decodes_grafana_payload() {
		let payload: AlertPayload = serde_json::from_value(json!({
			"receiver": "ops",
			"status": "firing",
			"orgId": 1,
			"truncatedAlerts": 0,
			"externalURL": "http://localhost:3000/",
			"groupKey": "{}:{alertname=\"DiskFull\"}",
			"alerts": [{
				"status": "firing",
				"labels": { "severity": "critical", "alertname": "DiskFull" },
				"annotations": {},
				"startsAt": "2024-01-01T08:30:00+08:00",
				"endsAt": "0001-01-01T00:00:00Z",
				"generatorURL": "http://localhost:3000/alerting/grafana/abc/view",
				"fingerprint": "57c6d9296de2ad39"
			}],
			"title": "[FIRING:1] DiskFull",
			"message": "disk at 95%"
		}))
		.unwrap();

		assert!(payload.is_firing());
		assert_eq!(payload.org_id, 1);
		assert_eq!(payload.external_url, "http://localhost:3000/");

		let alert = &payload.alerts[0];
		assert_eq!(alert.fingerprint, "57c6d9296de2ad39");
		assert_eq!(alert.labels.keys().collect::<Vec<_>>(), ["alertname", "severity"]);
		assert_eq!(alert.starts_at.display().to_string(), "2024-01-01 08:30:00");
		assert!(alert.ends_at.is_zero());
	}

	#[test]
	fn null_and_missing_timestamps_are_zero() {
		let alert: AlertItem =
			serde_json::from_value(json!({ "status": "firing", "endsAt": null })).unwrap();

		assert!(alert.starts_at.is_zero());
		assert!(alert.ends_at.is_zero());
		assert_eq!(alert.starts_at.display().to_string(), "0001-01-01 00:00:00");
		assert_eq!(serde_json::to_value(alert.ends_at).unwrap(), json!(ZERO_TIME));
	}

	#[test]
	fn only_the_exact_zero_instant_is_zero() {
		let alert: AlertItem = serde_json::from_value(json!({
			"startsAt": "0001-01-01T08:00:00+08:00",
			"endsAt": "0001-01-01T05:00:00Z"
		}))
		.unwrap();

		assert!(alert.starts_at.is_zero());
		assert!(!alert.ends_at.is_zero());
		assert_eq!(alert.ends_at.display().to_string(), "0001-01-01 05:00:00");
	}

	#[test]
	fn null_fields_fall_back_to_zero_values() {
		let payload: AlertPayload = serde_json::from_value(json!({
			"status": "firing",
			"receiver": null,
			"groupLabels": null,
			"commonLabels": null,
			"commonAnnotations": null,
			"externalURL": null,
			"truncatedAlerts": null,
			"orgId": null,
			"title": null,
			"message": null,
			"alerts": [{
				"status": "firing",
				"labels": null,
				"annotations": null,
				"generatorURL": null,
				"fingerprint": null
			}]
		}))
		.unwrap();

		assert!(payload.message.is_empty());
		assert!(payload.common_annotations.is_empty());
		assert_eq!(payload.org_id, 0);
		assert!(payload.alerts[0].labels.is_empty());
		assert!(payload.alerts[0].fingerprint.is_empty());

		let payload: AlertPayload =
			serde_json::from_value(json!({ "status": "firing", "alerts": null })).unwrap();
		assert!(payload.alerts.is_empty());
	}
}
