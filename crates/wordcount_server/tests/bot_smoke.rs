#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context as _, anyhow};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::process::{Child, Command};
use tokio::time::timeout;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

static LOG_INIT: OnceLock<()> = OnceLock::new();

fn init_test_logging() {
	LOG_INIT.get_or_init(|| {
		if std::env::var_os("WORDCOUNT_TEST_LOG").is_none() {
			return;
		}

		let _ = tracing_subscriber::fmt()
			.with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
			.with_target(false)
			.try_init();
	});
}

fn write_config(dir: &Path, host: &str, state: &Path) -> anyhow::Result<PathBuf> {
	let path = dir.join("config.toml");
	let toml = format!(
		"host = '{host}'\n\
		 nickname = 'countbot'\n\
		 home_channel = '#home'\n\
		 channels = ['#chan']\n\
		 admins = ['admin']\n\
		 state = '{}'\n",
		state.display()
	);
	std::fs::write(&path, toml).context("write config")?;
	Ok(path)
}

fn spawn_bot(config: &Path) -> anyhow::Result<Child> {
	let log = if std::env::var_os("WORDCOUNT_TEST_LOG").is_some() {
		Stdio::inherit()
	} else {
		Stdio::null()
	};

	Command::new(env!("CARGO_BIN_EXE_wordcount_server"))
		.arg("--config")
		.arg(config)
		.env("RUST_LOG", "debug")
		.env_remove("OTEL_EXPORTER_OTLP_ENDPOINT")
		.stdin(Stdio::null())
		.stdout(Stdio::null())
		.stderr(log)
		.kill_on_drop(true)
		.spawn()
		.context("spawn wordcount_server")
}

struct FakeIrc {
	lines: tokio::io::Lines<BufReader<OwnedReadHalf>>,
	writer: OwnedWriteHalf,
}

impl FakeIrc {
	async fn accept(listener: &TcpListener) -> anyhow::Result<Self> {
		let (stream, peer) = timeout(STEP_TIMEOUT, listener.accept())
			.await
			.context("bot did not connect")??;
		tracing::info!(%peer, "fake irc: accepted");

		let (read, writer) = stream.into_split();
		Ok(Self {
			lines: BufReader::new(read).lines(),
			writer,
		})
	}

	async fn send(&mut self, line: &str) -> anyhow::Result<()> {
		tracing::debug!(line, "fake irc: send");
		self.writer.write_all(format!("{line}\r\n").as_bytes()).await?;
		Ok(())
	}

	async fn next_line(&mut self) -> anyhow::Result<String> {
		let line = self
			.lines
			.next_line()
			.await?
			.ok_or_else(|| anyhow!("bot closed the connection"))?;
		tracing::debug!(line, "fake irc: recv");
		Ok(line)
	}

	/// Read lines until one equals `expected`.
	async fn expect(&mut self, expected: &str) -> anyhow::Result<()> {
		let wait = async {
			loop {
				if self.next_line().await? == expected {
					return Ok::<(), anyhow::Error>(());
				}
			}
		};
		timeout(STEP_TIMEOUT, wait)
			.await
			.with_context(|| format!("timed out waiting for {expected:?}"))?
	}
}

#[tokio::test]
async fn bot_joins_counts_and_answers() -> anyhow::Result<()> {
	init_test_logging();

	let listener = TcpListener::bind("127.0.0.1:0").await.context("bind fake irc")?;
	let addr = listener.local_addr()?;

	let dir = tempfile::tempdir()?;
	let config = write_config(dir.path(), &addr.to_string(), &dir.path().join("state.json"))?;
	let mut bot = spawn_bot(&config)?;

	let mut irc = FakeIrc::accept(&listener).await?;
	irc.expect("NICK countbot").await?;
	irc.expect("USER countbot 0 * :countbot").await?;

	irc.send(":irc.test 001 countbot :Welcome").await?;
	irc.expect("CAP REQ :twitch.tv/membership").await?;
	irc.expect("JOIN #home").await?;
	irc.expect("JOIN #chan").await?;

	irc.send(":countbot!countbot@test JOIN #home").await?;
	irc.expect("PRIVMSG #home :Joined to #home.").await?;
	irc.send(":countbot!countbot@test JOIN #chan").await?;
	irc.expect("PRIVMSG #home :Joined to #chan.").await?;

	irc.send("PING :keepalive").await?;
	irc.expect("PONG :keepalive").await?;

	irc.send(":alice!alice@test PRIVMSG #chan :cat cat dog").await?;
	irc.send(":bob!bob@test PRIVMSG #Chan :Cat").await?;
	irc.send(":carol!carol@test PRIVMSG #chan :!count").await?;
	irc.expect("PRIVMSG #chan :Word-counts within the last 5min: cat: 2, dog: 1").await?;

	irc.send(":carol!carol@test PRIVMSG #chan :!clearcount").await?;
	irc.expect("PRIVMSG #chan :@carol: You don't have permissions to do that.").await?;

	irc.send(":admin!admin@test PRIVMSG #home :!channels").await?;
	irc.expect("PRIVMSG #home :Joined channels: #chan, #home").await?;

	bot.kill().await?;
	Ok(())
}

#[tokio::test]
async fn help_flag_exits_with_usage_code() -> anyhow::Result<()> {
	let status = timeout(
		STEP_TIMEOUT,
		Command::new(env!("CARGO_BIN_EXE_wordcount_server"))
			.arg("--help")
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.status(),
	)
	.await??;
	assert_eq!(status.code(), Some(2));
	Ok(())
}

#[tokio::test]
async fn unusable_state_file_aborts_startup() -> anyhow::Result<()> {
	init_test_logging();

	let listener = TcpListener::bind("127.0.0.1:0").await?;
	let addr = listener.local_addr()?;

	let dir = tempfile::tempdir()?;
	let state = dir.path().join("state.json");
	std::fs::write(&state, serde_json::json!({ "version": "0.9" }).to_string())?;
	let config = write_config(dir.path(), &addr.to_string(), &state)?;

	let status = timeout(STEP_TIMEOUT, spawn_bot(&config)?.wait()).await??;
	assert!(!status.success());

	// Startup failed before any connection attempt.
	assert!(timeout(Duration::from_millis(200), listener.accept()).await.is_err());
	Ok(())
}

#[tokio::test]
async fn missing_nickname_aborts_startup() -> anyhow::Result<()> {
	let dir = tempfile::tempdir()?;
	let config = dir.path().join("config.toml");
	std::fs::write(&config, "home_channel = '#home'\n")?;

	let status = timeout(
		STEP_TIMEOUT,
		Command::new(env!("CARGO_BIN_EXE_wordcount_server"))
			.arg("--config")
			.arg(&config)
			.env_remove("WORDCOUNT_NICKNAME")
			.stdout(Stdio::null())
			.stderr(Stdio::null())
			.status(),
	)
	.await??;
	assert!(!status.success());
	Ok(())
}
