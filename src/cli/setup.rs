// src/cli/setup.rs
//! Setup / status / test 命令

use anyhow::Result;
use clap::Args;

use super::output::{format_output, status_line};
use crate::notification::Notifier;

/// Setup 命令参数
#[derive(Args)]
pub struct SetupArgs {
    /// Topic name to publish to
    pub topic: String,

    /// ntfy server URL
    #[arg(long)]
    pub server: Option<String>,
}

/// 处理 setup 命令
pub fn handle_setup(notifier: &Notifier, args: SetupArgs) -> Result<bool> {
    let store = notifier.sender().config_store();
    let config = store.setup_topic(&args.topic, args.server.as_deref())?;

    println!("{}", status_line(true, &format!("Configured topic '{}'", config.topic)));
    println!("  Server: {}", config.server);
    println!("  Config file: {}", store.path().display());
    println!("\nSubscribe on your phone: {}", config.topic_url(&config.topic));
    Ok(true)
}

/// 处理 status 命令：配置摘要 + 连接检查
pub fn handle_status(notifier: &Notifier, json: bool) -> Result<bool> {
    let status = notifier.sender().config_store().status();
    let connection = notifier.sender().check_connection();
    let history_corrupt = notifier.history().is_corrupt();

    if json {
        let combined = serde_json::json!({
            "config": status,
            "connection": connection,
            "history_corrupt": history_corrupt,
        });
        println!("{}", format_output(&combined));
        return Ok(status.configured && connection.connected);
    }

    if status.configured {
        println!("Topic:  {}", status.topic);
    } else {
        println!("Topic:  (not configured, run `ntfy setup <topic>`)");
    }
    println!("Server: {}", status.server);
    println!("Auth:   {}", if status.auth_enabled { "enabled" } else { "disabled" });
    println!(
        "Rate limit: {} ({}/min, {:.1}s cooldown)",
        if status.rate_limit.enabled { "on" } else { "off" },
        status.rate_limit.max_per_minute,
        status.rate_limit.cooldown_seconds
    );
    let auto = &status.auto_notify;
    println!(
        "Auto notify: complete={} action={} error={} long_task={} (>= {}s) start={}",
        auto.on_task_complete,
        auto.on_action_required,
        auto.on_error,
        auto.on_long_task,
        auto.long_task_threshold_seconds,
        auto.on_task_start
    );
    match connection.latency_ms {
        Some(latency) => println!("{}", status_line(true, &format!("Server reachable ({:.0} ms)", latency))),
        None => println!("{}", status_line(false, &format!("Server check failed: {}", connection.status))),
    }
    if history_corrupt {
        println!(
            "{}",
            status_line(false, &format!("History file is corrupt: {}", notifier.history().path().display()))
        );
    }
    Ok(status.configured && connection.connected)
}

/// 处理 test 命令
pub fn handle_test(notifier: &Notifier) -> Result<bool> {
    let outcome = notifier.sender().send_test();
    if outcome.success {
        println!("{}", status_line(true, &outcome.message));
    } else {
        eprintln!("{}", status_line(false, &outcome.message));
    }
    Ok(outcome.success)
}
