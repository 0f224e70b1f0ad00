//! 交互命令：ask / input
//!
//! 回复打印到 stdout，方便脚本里 `answer=$(ntfy ask ...)`。

use anyhow::Result;
use clap::Args;
use std::time::Duration;

use crate::notification::{AskState, Notifier, Question, Responder};

#[derive(Args)]
pub struct AskArgs {
    pub title: String,
    pub message: String,

    /// Reply option (repeatable); defaults to Yes / No
    #[arg(long = "option", short = 'o')]
    pub options: Vec<String>,

    /// Seconds to wait for a reply
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    #[arg(long)]
    pub topic: Option<String>,
}

#[derive(Args)]
pub struct InputArgs {
    pub prompt: String,

    /// Extra context shown above the prompt
    #[arg(long, default_value = "")]
    pub context: String,

    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    #[arg(long)]
    pub topic: Option<String>,
}

pub fn handle_ask(notifier: &Notifier, args: AskArgs) -> Result<bool> {
    let options = if args.options.is_empty() {
        vec!["Yes".to_string(), "No".to_string()]
    } else {
        args.options
    };
    let question = Question::new(args.title, args.message, options)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_topic(args.topic);

    eprintln!("Waiting up to {}s for a reply...", args.timeout);
    let state = Responder::new(notifier).ask_with(&question);
    Ok(report_state(state))
}

pub fn handle_input(notifier: &Notifier, args: InputArgs) -> Result<bool> {
    eprintln!("Waiting up to {}s for input...", args.timeout);
    let state = Responder::new(notifier).get_user_input(
        &args.prompt,
        &args.context,
        Duration::from_secs(args.timeout),
        args.topic.as_deref(),
    );
    Ok(report_state(state))
}

fn report_state(state: AskState) -> bool {
    match state {
        AskState::Responded(answer) => {
            println!("{}", answer);
            true
        }
        AskState::TimedOut => {
            eprintln!("✗ No response (timed out)");
            false
        }
        AskState::Cancelled => {
            eprintln!("✗ Cancelled");
            false
        }
        AskState::Failed(error) => {
            eprintln!("✗ {}", error);
            false
        }
        AskState::Idle | AskState::Sent => false,
    }
}
