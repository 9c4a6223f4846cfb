use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    current_queue_id,
    testing::{wait_until_async, RecordingDelegate},
    CallbackQueue, ChannelController, ChannelState, Controller, ControllerStateDelegate,
    TaskQueue, ThreadQueue,
};
use shared::domain::ChannelId;
use tracing::{info, warn};

mod config;

use config::{load_settings, QueueKind};

/// Drives a channel controller through a list of states and prints what its
/// delegate observed.
#[derive(Parser, Debug)]
#[command(name = "controller-demo")]
struct Args {
    /// Comma separated: inactive, local, remote, synced, failed[:reason].
    #[arg(long, value_delimiter = ',', default_value = "local,remote")]
    states: Vec<String>,
    #[arg(long, default_value = "messaging:demo")]
    channel: ChannelId,
    #[arg(long, value_enum)]
    queue: Option<QueueKind>,
    #[arg(long)]
    label: Option<String>,
    #[arg(long)]
    config: Option<PathBuf>,
}

struct LoggingDelegate {
    channel: ChannelId,
    recorder: Arc<RecordingDelegate<ChannelState>>,
}

impl ControllerStateDelegate<ChannelState> for LoggingDelegate {
    fn on_state_change(&self, controller: &Controller<ChannelState>, state: &ChannelState) {
        info!(
            channel = %self.channel,
            ?state,
            queue = ?current_queue_id(),
            "channel state changed"
        );
        self.recorder.on_state_change(controller, state);
    }
}

fn parse_channel_state(raw: &str) -> Result<ChannelState> {
    let raw = raw.trim();
    let (name, detail) = match raw.split_once(':') {
        Some((name, detail)) => (name, Some(detail)),
        None => (raw, None),
    };

    let state = match (name.to_ascii_lowercase().as_str(), detail) {
        ("inactive", None) => ChannelState::Inactive,
        ("local", None) => ChannelState::LocalDataFetched,
        ("remote", None) => ChannelState::RemoteDataFetched,
        ("synced", None) => ChannelState::Synced,
        ("failed", reason) => ChannelState::Failed {
            reason: reason.unwrap_or("unspecified").to_string(),
        },
        _ => bail!("unknown channel state '{raw}'"),
    };
    Ok(state)
}

fn build_queue(kind: QueueKind, label: &str) -> Result<Arc<dyn CallbackQueue>> {
    let queue: Arc<dyn CallbackQueue> = match kind {
        QueueKind::Thread => Arc::new(ThreadQueue::new(label)),
        QueueKind::Task => Arc::new(
            TaskQueue::new(label).context("failed to start task-backed callback queue")?,
        ),
    };
    Ok(queue)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(kind) = args.queue {
        settings.queue_kind = kind;
    }
    if let Some(label) = args.label {
        settings.queue_label = label;
    }

    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    let states = args
        .states
        .iter()
        .map(|raw| parse_channel_state(raw))
        .collect::<Result<Vec<_>>>()?;

    let queue = build_queue(settings.queue_kind, &settings.queue_label)?;
    info!(queue = %queue.label(), kind = ?settings.queue_kind, "callback queue ready");

    let channel = ChannelController::with_callback_queue(args.channel.clone(), queue);
    let recorder = RecordingDelegate::expecting_queue(channel.callback_queue().id());
    let delegate = Arc::new(LoggingDelegate {
        channel: args.channel,
        recorder: Arc::clone(&recorder),
    });
    channel.set_delegate(&delegate);

    for state in &states {
        channel.set_state(state.clone());
    }

    let timeout = Duration::from_millis(settings.delivery_timeout_ms);
    let expected = states.len();
    if !wait_until_async(timeout, || recorder.len() >= expected).await {
        bail!(
            "only {} of {expected} notifications arrived within {timeout:?}",
            recorder.len()
        );
    }
    if recorder.misplaced_deliveries() > 0 {
        warn!(
            misplaced = recorder.misplaced_deliveries(),
            "notifications ran outside the callback queue"
        );
    }

    println!("{}", serde_json::to_string_pretty(&recorder.states())?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_state_names() {
        assert_eq!(parse_channel_state("local").expect("local"), ChannelState::LocalDataFetched);
        assert_eq!(parse_channel_state(" Remote ").expect("remote"), ChannelState::RemoteDataFetched);
        assert_eq!(parse_channel_state("synced").expect("synced"), ChannelState::Synced);
        assert_eq!(parse_channel_state("inactive").expect("inactive"), ChannelState::Inactive);
    }

    #[test]
    fn failed_state_carries_optional_reason() {
        assert_eq!(
            parse_channel_state("failed:socket closed").expect("failed"),
            ChannelState::Failed {
                reason: "socket closed".into()
            }
        );
        assert_eq!(
            parse_channel_state("failed").expect("failed"),
            ChannelState::Failed {
                reason: "unspecified".into()
            }
        );
    }

    #[test]
    fn rejects_unknown_states() {
        assert!(parse_channel_state("loading").is_err());
        assert!(parse_channel_state("local:extra").is_err());
    }

    #[test]
    fn cli_splits_states_and_parses_channel() {
        let args = Args::try_parse_from([
            "controller-demo",
            "--states",
            "local,remote,synced",
            "--channel",
            "team:ops",
            "--queue",
            "task",
        ])
        .expect("args");

        assert_eq!(args.states, vec!["local", "remote", "synced"]);
        assert_eq!(args.channel, ChannelId::new("team", "ops"));
        assert_eq!(args.queue, Some(QueueKind::Task));
    }

    #[test]
    fn thread_queue_builds_outside_a_runtime() {
        let queue = build_queue(QueueKind::Thread, "cli").expect("queue");
        assert_eq!(queue.label(), "cli");
        assert!(build_queue(QueueKind::Task, "cli").is_err());
    }
}
