//! prometheus meters of the relay

use once_cell::sync::Lazy;
use prometheus::{
	exponential_buckets, histogram_opts, opts, register_histogram_vec, register_int_counter_vec,
	HistogramVec, IntCounterVec,
};

use crate::settings::{PayloadKind, TargetPlatform};

/// meters registered in the default prometheus registry
#[allow(clippy::expect_used)]
pub(crate) static METRICS: Lazy<RelayMetrics> =
	Lazy::new(|| RelayMetrics::new().expect("failed to register prometheus meters"));

#[derive(Debug)]
pub(crate) struct RelayMetrics {
	/// decoded inbound payloads
	received: IntCounterVec,
	/// inbound requests which didn't result in a delivered message
	dropped: IntCounterVec,
	/// requests made to the robot
	deliveries: IntCounterVec,
	/// failed requests made to the robot
	delivery_failures: IntCounterVec,
	/// time spent waiting for the robot
	request_duration: HistogramVec,
}

impl RelayMetrics {
	fn new() -> Result<Self, prometheus::Error> {
		let received = register_int_counter_vec!(
			opts!("webhook_received_total", "total number of decoded inbound payloads")
				.namespace("hookrelay"),
			&["kind"]
		)?;

		let dropped = register_int_counter_vec!(
			opts!("webhook_dropped_total", "inbound requests which were dropped")
				.namespace("hookrelay"),
			&["reason"]
		)?;

		let deliveries = register_int_counter_vec!(
			opts!("robot_deliveries_total", "total number of requests made to the robot")
				.namespace("hookrelay"),
			&["target"]
		)?;

		let delivery_failures = register_int_counter_vec!(
			opts!("robot_delivery_failures_total", "failed requests made to the robot")
				.namespace("hookrelay"),
			&["target"]
		)?;

		let request_duration = register_histogram_vec!(
			histogram_opts!(
				"robot_request_duration_seconds",
				"total time of a robot request in seconds",
				exponential_buckets(0.01, 2., 10)?
			)
			.namespace("hookrelay"),
			&["target"]
		)?;

		Ok(Self { received, dropped, deliveries, delivery_failures, request_duration })
	}

	pub(crate) fn record_received(&self, kind: PayloadKind) {
		self.received.with_label_values(&[kind.as_str()]).inc();
	}

	pub(crate) fn record_dropped(&self, reason: &str) {
		self.dropped.with_label_values(&[reason]).inc();
	}

	pub(crate) fn record_delivery(&self, target: TargetPlatform) {
		self.deliveries.with_label_values(&[target.as_str()]).inc();
	}

	pub(crate) fn record_delivery_failure(&self, target: TargetPlatform) {
		self.delivery_failures.with_label_values(&[target.as_str()]).inc();
	}

	/// starts a timer which observes the request duration when dropped
	pub(crate) fn time_request(&self, target: TargetPlatform) -> prometheus::HistogramTimer {
		self.request_duration.with_label_values(&[target.as_str()]).start_timer()
	}
}
