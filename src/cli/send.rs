//! 发送类命令：send / notify 以及各种便捷类型

use anyhow::Result;
use clap::Args;

use super::output::{print_report, status_line};
use crate::notification::{DeliveryOptions, MessageExtras, NotificationRequest, Notifier, Priority};

/// 单次发送（不重试）
#[derive(Args)]
pub struct SendArgs {
    /// Message body
    pub message: String,

    #[arg(long, short, default_value = "Notification")]
    pub title: String,

    /// min, low, default, high, urgent (or 1-5)
    #[arg(long, short)]
    pub priority: Option<Priority>,

    /// Comma-separated emoji tags
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    /// URL opened when the notification is tapped
    #[arg(long)]
    pub click: Option<String>,

    /// URL of an attachment
    #[arg(long)]
    pub attach: Option<String>,

    #[arg(long)]
    pub filename: Option<String>,

    /// Delivery delay, e.g. "30m" or "tomorrow 10am"
    #[arg(long)]
    pub delay: Option<String>,

    /// Also forward to this email address
    #[arg(long)]
    pub email: Option<String>,

    #[arg(long)]
    pub icon: Option<String>,

    #[arg(long)]
    pub markdown: bool,

    /// Override the configured topic
    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub bypass_rate_limit: bool,
}

/// 可靠投递（去重 + 重试 + 历史）
#[derive(Args)]
pub struct NotifyArgs {
    pub title: String,
    pub message: String,

    #[arg(long, short)]
    pub priority: Option<Priority>,

    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,

    #[arg(long, default_value_t = crate::notification::DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Send even if an identical notification went out recently
    #[arg(long)]
    pub allow_duplicate: bool,

    #[arg(long)]
    pub topic: Option<String>,
}

#[derive(Args)]
pub struct CompleteArgs {
    pub task: String,
    #[arg(default_value = "")]
    pub details: String,
    /// Human-readable duration, e.g. "3m 20s"
    #[arg(long)]
    pub duration: Option<String>,
}

#[derive(Args)]
pub struct ActionArgs {
    pub action: String,
    #[arg(default_value = "")]
    pub details: String,
    /// Options listed in the message (repeatable)
    #[arg(long = "option")]
    pub options: Vec<String>,
}

#[derive(Args)]
pub struct BlockedArgs {
    pub blocker: String,
    #[arg(default_value = "")]
    pub details: String,
    #[arg(long)]
    pub suggestion: Option<String>,
}

#[derive(Args)]
pub struct ErrorArgs {
    /// Error kind, e.g. "Build"
    pub kind: String,
    pub details: String,
}

#[derive(Args)]
pub struct TitledArgs {
    pub title: String,
    pub message: String,
}

pub fn handle_send(notifier: &Notifier, args: SendArgs) -> Result<bool> {
    let mut request = NotificationRequest::new(args.title, args.message)
        .with_tags(args.tags)
        .with_bypass_rate_limit(args.bypass_rate_limit)
        .with_extras(MessageExtras {
            click: args.click,
            attach: args.attach,
            filename: args.filename,
            delay: args.delay,
            email: args.email,
            icon: args.icon,
            markdown: args.markdown,
        });
    if let Some(priority) = args.priority {
        request = request.with_priority(priority);
    }
    if let Some(topic) = args.topic {
        request = request.with_topic(topic);
    }

    let outcome = notifier.send_once(&request);
    if outcome.success {
        println!("{}", status_line(true, &outcome.message));
    } else {
        eprintln!("{}", status_line(false, &outcome.message));
    }
    Ok(outcome.success)
}

pub fn handle_notify(notifier: &Notifier, args: NotifyArgs, json: bool) -> Result<bool> {
    let mut request = NotificationRequest::new(args.title, args.message).with_tags(args.tags);
    if let Some(priority) = args.priority {
        request = request.with_priority(priority);
    }
    if let Some(topic) = args.topic {
        request = request.with_topic(topic);
    }
    let options = DeliveryOptions::default()
        .with_max_retries(args.max_retries)
        .allow_duplicate(args.allow_duplicate);

    let report = notifier.ensure_delivery(request, &options);
    Ok(print_report(&report, json))
}

pub fn handle_complete(notifier: &Notifier, args: CompleteArgs, json: bool) -> Result<bool> {
    let report = notifier.task_complete(&args.task, &args.details, args.duration.as_deref());
    Ok(print_report(&report, json))
}

pub fn handle_action(notifier: &Notifier, args: ActionArgs, json: bool) -> Result<bool> {
    let report = notifier.action_required(&args.action, &args.details, &args.options);
    Ok(print_report(&report, json))
}

pub fn handle_blocked(notifier: &Notifier, args: BlockedArgs, json: bool) -> Result<bool> {
    let report = notifier.blocked(&args.blocker, &args.details, args.suggestion.as_deref());
    Ok(print_report(&report, json))
}

pub fn handle_error(notifier: &Notifier, args: ErrorArgs, json: bool) -> Result<bool> {
    let report = notifier.error(&args.kind, &args.details);
    Ok(print_report(&report, json))
}

pub fn handle_info(notifier: &Notifier, args: TitledArgs, json: bool) -> Result<bool> {
    let report = notifier.info(&args.title, &args.message);
    Ok(print_report(&report, json))
}

pub fn handle_success(notifier: &Notifier, args: TitledArgs, json: bool) -> Result<bool> {
    let report = notifier.success(&args.title, &args.message);
    Ok(print_report(&report, json))
}
