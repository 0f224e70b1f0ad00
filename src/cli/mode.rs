//! 通知模式命令：mode on / off / status

use anyhow::Result;
use clap::Subcommand;

use super::output::{format_output, status_line};
use crate::notification::Notifier;
use crate::session::{KeyValueStore, SessionManager};

#[derive(Subcommand)]
pub enum ModeAction {
    /// Turn session notification mode on
    On {
        /// Topic for this session (defaults to the configured one)
        topic: Option<String>,
    },
    /// Turn session notification mode off and print a summary
    Off,
    /// Show the current session state
    Status,
}

pub fn handle_mode<S: KeyValueStore>(
    notifier: &Notifier,
    session: &SessionManager<S>,
    action: ModeAction,
    json: bool,
) -> Result<bool> {
    match action {
        ModeAction::On { topic } => {
            let state = session.enable(topic)?;
            let topic = session.effective_topic(&notifier.config());
            if json {
                println!("{}", format_output(&state));
            } else {
                println!("{}", status_line(true, "Notification mode ON"));
                if topic.is_empty() {
                    println!("  No topic configured, run `ntfy setup <topic>`");
                } else {
                    println!("  Topic: {}", topic);
                }
            }
        }
        ModeAction::Off => {
            let summary = session.disable()?;
            if json {
                println!("{}", format_output(&summary));
            } else {
                println!("{}", status_line(true, "Notification mode OFF"));
                println!("  Tasks completed: {}", summary.task_count);
                println!("  Notifications sent: {}", summary.notification_count);
            }
        }
        ModeAction::Status => {
            let state = session.state();
            if json {
                println!("{}", format_output(&state));
            } else if state.notification_mode {
                println!("Notification mode: ON");
                println!("  Topic: {}", session.effective_topic(&notifier.config()));
                if let Some(start) = state.session_start {
                    println!("  Since: {}", start.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"));
                }
                println!("  Tasks: {}", state.task_count);
                println!("  Notifications: {}", state.notification_count);
            } else {
                println!("Notification mode: OFF");
            }
        }
    }
    Ok(true)
}
