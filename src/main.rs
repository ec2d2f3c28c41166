//! webhook relay forwarding grafana alerts (or gitlab hooks) into a weixin or
//! feishu robot
//!
//! Features:
//! - renders alerts with their labels, annotations and timings on feishu
//! - gitlab push and merge request hooks, selected by configuration
//! - fire and forget: the webhook source never sees delivery failures unless
//!   `surface_errors` is enabled

use std::{
	net::{IpAddr, Ipv4Addr, UdpSocket},
	sync::Arc,
};

use anyhow::{Context, Result};
use delivery::RobotClient;
use relay_endpoint::RelayState;
use settings::Settings;

mod alert;
mod delivery;
mod dispatcher;
mod formatter;
mod log;
mod message;
mod metrics;
mod relay_endpoint;
mod settings;
mod source_event;
mod telemetry_endpoint;

/// log panics through tracing. A panic while relaying a request is caught by
/// the endpoint, so the process keeps running.
fn setup_panic_handler() {
	let default_panic = std::panic::take_hook();
	std::panic::set_hook(Box::new(move |info| {
		tracing::error!("panic: {info}");
		default_panic(info);
	}));
}

/// The ipv4 address of the interface carrying the default route, used for
/// display only. Connecting a udp socket only selects the outgoing interface,
/// nothing is sent. Hosts without a default route get an error here, and the
/// banner falls back to the bind address. On hosts with several interfaces
/// this may differ from the first non loopback address.
fn external_ipv4() -> Result<Ipv4Addr> {
	let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).context("failed to bind udp socket")?;
	socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).context("connected to the network?")?;

	match socket.local_addr()?.ip() {
		IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Ok(ip),
		ip => anyhow::bail!("no external ipv4 address, got {ip}"),
	}
}

fn log_startup(settings: &Settings) {
	let ip = match external_ipv4() {
		Ok(ip) => IpAddr::V4(ip),
		Err(err) => {
			tracing::warn!("failed to resolve external ip: {err:#}");
			settings.receiver.bind_address
		}
	};

	tracing::info!("hook ip: {ip}");
	tracing::info!("hook port: {}", settings.receiver.port);
	tracing::info!("hook path: {}", settings.receiver.path);
	tracing::info!("payload kind: {}", settings.receiver.payload_kind);
	tracing::info!("target: {}", settings.robot.target);
	tracing::info!("robot url: {}", settings.robot.url);
	tracing::info!("webhook listen address: {}", settings.receiver.listen_url(ip));
}

/// the entry point of the program
#[tokio::main]
pub async fn main() -> Result<()> {
	// tracing isn't setup yet, errors are printed by the returned Result
	let settings = Settings::load().context("failed to load config and command line arguments")?;

	log::setup_logging(&settings.log).context("could not setup logging")?;

	setup_panic_handler();

	log_startup(&settings);

	let robot = RobotClient::new(&settings.robot).context("failed to construct robot client")?;
	let state = Arc::new(RelayState::new(&settings, Arc::new(robot)));

	if let Some(telemetry) = settings.telemetry_endpoint.clone() {
		tokio::spawn(async move {
			if let Err(err) = telemetry_endpoint::run_telemetry_endpoint(&telemetry).await {
				tracing::error!("{err:#}");
			}
		});
	}

	relay_endpoint::run_relay_endpoint(&settings.receiver, state).await
}
