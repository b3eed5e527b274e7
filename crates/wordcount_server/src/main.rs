#![forbid(unsafe_code)]

mod bot;
mod config;
mod util;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use wordcount_platform::irc::{IrcAdapter, IrcConfig};
use wordcount_platform::{ChatTransport, TransportControl, bounded_transport_channels};

use crate::bot::state::{load_state, save_state};
use crate::bot::{Bot, run_event_loop};

const CONTROL_CHANNEL_CAPACITY: usize = 64;
const EVENTS_CHANNEL_CAPACITY: usize = 256;
const TRANSPORT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn usage_and_exit() -> ! {
	eprintln!(
		"Usage: wordcount_server [--config <path>]\n\
\n\
Options:\n\
\t--config  Config file (default: ~/.wordcount/config.toml)\n\
\t--help    Show this help\n\
"
	);
	std::process::exit(2)
}

fn parse_args() -> Option<PathBuf> {
	let mut config_path = None;

	let mut it = std::env::args().skip(1);
	while let Some(arg) = it.next() {
		match arg.as_str() {
			"--help" | "-h" => usage_and_exit(),
			"--config" | "-c" => {
				let v = it.next().unwrap_or_else(|| usage_and_exit());
				if v.trim().is_empty() {
					eprintln!("--config must be non-empty");
					usage_and_exit();
				}
				config_path = Some(PathBuf::from(v));
			}
			other => {
				eprintln!("Unknown argument: {other}");
				usage_and_exit();
			}
		}
	}

	config_path
}

fn init_tracing() {
	let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wordcount_server=debug".to_string());

	let otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
		.ok()
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty());
	let base = tracing_subscriber::registry()
		.with(tracing_subscriber::EnvFilter::new(filter))
		.with(tracing_subscriber::fmt::layer().with_target(false));

	if let Some(endpoint) = otlp_endpoint {
		use opentelemetry::global;
		use opentelemetry::trace::TracerProvider as _;
		use opentelemetry_otlp::WithExportConfig;

		match opentelemetry_otlp::SpanExporter::builder()
			.with_tonic()
			.with_endpoint(endpoint.clone())
			.build()
		{
			Ok(exporter) => {
				let tracer_provider = opentelemetry_sdk::trace::SdkTracerProvider::builder()
					.with_batch_exporter(exporter)
					.build();
				let tracer = tracer_provider.tracer("wordcount_server");
				global::set_tracer_provider(tracer_provider);

				let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
				base.with(otel_layer).init();
				info!(endpoint = %endpoint, "otlp tracing enabled");
			}
			Err(e) => {
				base.init();
				warn!(error = %e, "failed to initialize otlp tracing");
			}
		}
	} else {
		base.init();
	}
}

fn init_metrics(bind: Option<&str>) {
	let Some(bind) = bind else {
		return;
	};

	match bind.parse::<std::net::SocketAddr>() {
		Ok(addr) => {
			if let Err(e) = metrics_exporter_prometheus::PrometheusBuilder::new()
				.with_http_listener(addr)
				.install()
			{
				warn!(error = %e, "failed to start metrics exporter");
			} else {
				info!(%addr, "metrics exporter listening");
			}
		}
		Err(e) => {
			warn!(error = %e, %bind, "invalid metrics bind address (expected host:port)");
		}
	}
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();

	let config_path = match parse_args() {
		Some(path) => path,
		None => crate::config::default_config_path()?,
	};
	let cfg = crate::config::load_config_from_path(&config_path)?;
	info!(path = %config_path.display(), "loaded config (toml + env overrides)");

	init_metrics(cfg.metrics_bind.as_deref());

	let mut bot = Bot::new(cfg.bot.clone());
	if let Some(path) = cfg.state_path.as_deref() {
		let state = load_state(path, cfg.bot.channel_defaults())
			.with_context(|| format!("load state from {}", path.display()))?;
		match state {
			Some(state) => bot.restore(state),
			None => info!(path = %path.display(), "no state file yet"),
		}
	}

	let mut irc_cfg = IrcConfig::new(cfg.irc.endpoint.clone(), cfg.irc.nickname.clone());
	irc_cfg.password = cfg.irc.password.clone();

	let (control_tx, control_rx, events_tx, events_rx) =
		bounded_transport_channels(CONTROL_CHANNEL_CAPACITY, EVENTS_CHANNEL_CAPACITY);

	let transport: Box<dyn ChatTransport> = Box::new(IrcAdapter::new(irc_cfg));
	let transport_name = transport.name();
	let transport_task = tokio::spawn(async move {
		if let Err(e) = transport.run(control_rx, events_tx).await {
			warn!(transport = transport_name, error = %e, "transport exited with error");
		}
	});

	info!(transport = transport_name, "starting bot");
	run_event_loop(&mut bot, events_rx, control_tx.clone(), async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			warn!(error = %e, "failed to listen for ctrl-c; running until the transport stops");
			std::future::pending::<()>().await;
		}
	})
	.await;

	let _ = control_tx.send(TransportControl::Shutdown).await;
	if tokio::time::timeout(TRANSPORT_SHUTDOWN_GRACE, transport_task).await.is_err() {
		warn!("transport did not stop in time");
	}

	if let Some(path) = cfg.state_path.as_deref() {
		info!(path = %path.display(), "dumping state");
		save_state(path, &bot.snapshot())?;
	}

	Ok(())
}
