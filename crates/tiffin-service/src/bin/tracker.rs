//! Order tracking client.
//!
//! Polls a marketplace server for a customer's orders and logs every
//! snapshot the synchronizer publishes until interrupted. Given a
//! marketplace configuration file, the poll interval and server address
//! come from its `tracking` and `api` sections unless overridden.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tiffin_config::{Config, TrackingConfig};
use tiffin_core::tracking::SyncStatus;
use tiffin_core::{HttpOrderSource, OrderTracker, TrackingSnapshot};

/// Command-line arguments for the tracking client.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Marketplace configuration file
	#[arg(long)]
	config: Option<PathBuf>,

	/// Base URL of the marketplace API [default: from config, else http://127.0.0.1:3000]
	#[arg(short, long)]
	url: Option<String>,

	/// Only track orders of this customer
	#[arg(short, long)]
	customer: Option<String>,

	/// Seconds between fetches [default: tracking.poll_interval_seconds, else 10]
	#[arg(short, long)]
	interval: Option<u64>,

	/// Order to focus on first
	#[arg(long)]
	order: Option<String>,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

const DEFAULT_URL: &str = "http://127.0.0.1:3000";

/// Picks the server URL and poll interval.
///
/// Command-line values win over the configuration file, which wins over the
/// built-in defaults.
fn resolve(args: &Args, config: Option<&Config>) -> Result<(String, Duration), String> {
	let url = match (&args.url, config.and_then(|c| c.api.as_ref())) {
		(Some(url), _) => url.clone(),
		(None, Some(api)) => format!("http://{}:{}", api.host, api.port),
		(None, None) => DEFAULT_URL.to_string(),
	};

	let seconds = args
		.interval
		.or(config.map(|c| c.tracking.poll_interval_seconds))
		.unwrap_or(TrackingConfig::default().poll_interval_seconds);
	if seconds == 0 {
		return Err("poll interval must be at least 1 second".into());
	}

	Ok((url, Duration::from_secs(seconds)))
}

fn report(snapshot: &TrackingSnapshot) {
	match &snapshot.status {
		SyncStatus::Loading => tracing::info!("Waiting for first fetch"),
		SyncStatus::Failed(error) => tracing::error!(%error, "Could not load orders"),
		SyncStatus::Ready => {
			if let Some(error) = &snapshot.last_error {
				tracing::warn!(%error, "Showing last good data");
			}
			match snapshot.selected_order() {
				Some(tracked) => tracing::info!(
					order_id = %tracked.order.id,
					stage = %tracked.tracking.stage,
					label = tracked.tracking.stage.label(),
					progress = tracked.tracking.progress,
					orders = snapshot.orders.len(),
					"Tracking"
				),
				None => tracing::info!(orders = snapshot.orders.len(), "No active order"),
			}
		},
	}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
	fmt().with_env_filter(env_filter).with_target(false).init();

	let config = match &args.config {
		Some(path) => {
			let path = path
				.to_str()
				.ok_or("Configuration path is not valid UTF-8")?;
			Some(Config::from_file(path).await?)
		},
		None => None,
	};
	let (url, interval) = resolve(&args, config.as_ref())?;

	let source = HttpOrderSource::new(&url, args.customer.clone(), interval)?;
	let tracker = OrderTracker::new(Arc::new(source), interval);
	let mut updates = tracker.subscribe();
	let handle = tracker.start()?;
	tracing::info!(url = %url, interval_seconds = interval.as_secs(), "Tracking started");

	let mut pending_selection = args.order;

	loop {
		tokio::select! {
			changed = updates.changed() => {
				if changed.is_err() {
					break;
				}
				let mut snapshot = updates.borrow_and_update().clone();
				if snapshot.status == SyncStatus::Ready {
					if let Some(order_id) = pending_selection.take() {
						if tracker.select(&order_id) {
							snapshot = updates.borrow_and_update().clone();
						} else {
							tracing::warn!(%order_id, "Order not found, keeping default selection");
						}
					}
				}
				report(&snapshot);
			}

			_ = tokio::signal::ctrl_c() => {
				break;
			}
		}
	}

	handle.stop().await;
	tracing::info!("Tracking stopped");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(extra: &str) -> Config {
		format!(
			r#"
[marketplace]
id = "tracker-test"

[storage]
primary = "memory"
[storage.implementations.memory]
{}
"#,
			extra
		)
		.parse()
		.unwrap()
	}

	#[test]
	fn test_defaults_without_config() {
		let args = Args::parse_from(["tiffin-tracker"]);
		let (url, interval) = resolve(&args, None).unwrap();
		assert_eq!(url, DEFAULT_URL);
		assert_eq!(interval, Duration::from_secs(10));
	}

	#[test]
	fn test_config_supplies_interval_and_address() {
		let config = config(
			r#"
[tracking]
poll_interval_seconds = 3

[api]
enabled = true
host = "0.0.0.0"
port = 8080
"#,
		);
		let args = Args::parse_from(["tiffin-tracker", "--config", "tiffin.toml"]);
		let (url, interval) = resolve(&args, Some(&config)).unwrap();
		assert_eq!(url, "http://0.0.0.0:8080");
		assert_eq!(interval, Duration::from_secs(3));
	}

	#[test]
	fn test_flags_override_config() {
		let config = config("[tracking]\npoll_interval_seconds = 3\n");
		let args = Args::parse_from([
			"tiffin-tracker",
			"--interval",
			"30",
			"--url",
			"http://tiffin.local",
		]);
		let (url, interval) = resolve(&args, Some(&config)).unwrap();
		assert_eq!(url, "http://tiffin.local");
		assert_eq!(interval, Duration::from_secs(30));
	}

	#[test]
	fn test_zero_interval_rejected() {
		let args = Args::parse_from(["tiffin-tracker", "--interval", "0"]);
		assert!(resolve(&args, None).is_err());
	}
}
