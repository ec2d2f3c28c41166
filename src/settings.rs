use std::{ffi::OsString, fmt, time::Duration};

use anyhow::{ensure, Context, Result};
use clap::{Arg, ArgMatches, Command};
use config::{builder::DefaultState, Config, ConfigBuilder, Environment};
use serde::Deserialize;

use crate::{
	delivery::RobotSettings, log::LogSettings, relay_endpoint::ReceiverSettings,
	telemetry_endpoint::TelemetryEndpointSettings,
};

/// prefix of environment variables overriding config keys, e.g.
/// `HOOKRELAY_ROBOT__URL`
const ENV_PREFIX: &str = "HOOKRELAY";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
/// chat platform of the configured robot
pub enum TargetPlatform {
	#[serde(rename = "weixin")]
	WeChat,
	#[serde(rename = "feishu")]
	Feishu,
}

impl TargetPlatform {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::WeChat => "weixin",
			Self::Feishu => "feishu",
		}
	}
}

impl fmt::Display for TargetPlatform {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// which kind of inbound payload the relay accepts
pub enum PayloadKind {
	/// grafana / alertmanager alerts
	#[default]
	Alert,
	/// gitlab push and merge request hooks
	SourceEvent,
}

impl PayloadKind {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Alert => "alert",
			Self::SourceEvent => "source-event",
		}
	}
}

impl fmt::Display for PayloadKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Process wide configuration. Built once at startup and never modified.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	#[serde(default)]
	pub receiver: ReceiverSettings,
	pub robot: RobotSettings,
	#[serde(default)]
	pub log: LogSettings,
	#[serde(default)]
	pub telemetry_endpoint: Option<TelemetryEndpointSettings>,
}

impl Settings {
	/// parse the command line of the process and merge it with config file and
	/// environment
	pub fn load() -> Result<Self> {
		Self::load_from(std::env::args_os())
	}

	pub fn load_from<I, T>(args: I) -> Result<Self>
	where
		I: IntoIterator<Item = T>,
		T: Into<OsString> + Clone,
	{
		let opts = command().get_matches_from(normalize_args(args));

		let settings: Self = merge_sources(&opts)?
			.build()
			.context("can't load config")?
			.try_deserialize()
			.context("invalid config")?;

		settings.validate()?;

		Ok(settings)
	}

	/// checks which can't be expressed by deserialization alone
	pub fn validate(&self) -> Result<()> {
		ensure!(
			self.receiver.path.starts_with('/'),
			"webhook path {:?} must start with '/'",
			self.receiver.path
		);
		ensure!(
			matches!(self.robot.url.scheme(), "http" | "https"),
			"robot url {} must be http or https",
			self.robot.url
		);
		ensure!(self.robot.timeout > Duration::ZERO, "robot timeout must be positive");
		ensure!(
			self.receiver.url_rewrites.iter().all(|rewrite| !rewrite.from.is_empty()),
			"url rewrites need a non empty `from`"
		);

		Ok(())
	}
}

fn command() -> Command<'static> {
	Command::new(clap::crate_name!())
		.version(clap::crate_version!())
		.about(clap::crate_description!())
		.arg_required_else_help(true)
		.after_help(
			"Configure the webhook url of the alert source (or gitlab: project -> Settings -> \
			 Webhooks) as http://[deploy ip:port]/webhook",
		)
		.args(&[
			Arg::new("port")
				.help("port of the webhook receiver")
				.index(1)
				.validator(|port| port.parse::<u16>()),
			Arg::new("target")
				.help("platform of the robot")
				.index(2)
				.possible_values(["weixin", "feishu"])
				.ignore_case(true),
			Arg::new("robot_url").help("intake url of the robot").index(3),
			Arg::new("config")
				.help("path of config file")
				.takes_value(true)
				.short('c')
				.long("config"),
			Arg::new("level")
				.help("log level")
				.possible_values(["Error", "Warn", "Info", "Debug", "Trace"])
				.ignore_case(true)
				.takes_value(true)
				.long("log"),
			Arg::new("path").help("path of the webhook route").takes_value(true).long("path"),
			Arg::new("payload_kind")
				.help("accepted inbound payloads")
				.possible_values(["alert", "source-event"])
				.takes_value(true)
				.long("payload-kind"),
			Arg::new("surface_errors")
				.help("answer failed requests with 4xx/5xx instead of 200")
				.long("surface-errors"),
		])
}

/// `version` and `help` are accepted as bare words, like `--version` and
/// `--help`
fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
	I: IntoIterator<Item = T>,
	T: Into<OsString> + Clone,
{
	let mut args: Vec<OsString> = args.into_iter().map(Into::into).collect();

	if args.len() == 2 {
		match args[1].to_str() {
			Some("version") => args[1] = OsString::from("--version"),
			Some("help") => args[1] = OsString::from("--help"),
			_ => {}
		}
	}

	args
}

/// config file < environment < command line
fn merge_sources(opts: &ArgMatches) -> Result<ConfigBuilder<DefaultState>> {
	let mut builder = Config::builder();

	if let Some(path) = opts.value_of("config") {
		builder = builder.add_source(config::File::with_name(path));
	}

	builder = builder
		.add_source(Environment::with_prefix(ENV_PREFIX).prefix_separator("_").separator("__"));

	let overrides = [
		("receiver.port", "port"),
		("robot.target", "target"),
		("robot.url", "robot_url"),
		("log.level", "level"),
		("receiver.path", "path"),
		("receiver.payload_kind", "payload_kind"),
	];
	for (key, arg) in overrides {
		if let Some(value) = opts.value_of(arg) {
			let value = if arg == "target" { value.to_lowercase() } else { value.to_owned() };
			builder = builder.set_override(key, value)?;
		}
	}

	if opts.is_present("surface_errors") {
		builder = builder.set_override("receiver.surface_errors", true)?;
	}

	Ok(builder)
}
