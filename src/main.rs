//! ntfy Notify CLI
//!
//! 通过 ntfy 发送推送通知，等待手机上的回复

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::{fmt, EnvFilter};
use ntfy_notify::{
    cli::{
        ActionArgs, AskArgs, BlockedArgs, CompleteArgs, ErrorArgs, HistoryAction, InputArgs, ModeAction,
        NotifyArgs, SendArgs, SetupArgs, TitledArgs,
    },
    JsonFileStore, NotifierBuilder, NotifyPaths, SessionManager, SystemClock,
};

#[derive(Parser)]
#[command(name = "ntfy")]
#[command(about = "ntfy Notify - push notifications with retry, history and interactive replies")]
#[command(version)]
struct Cli {
    /// 输出 JSON 格式
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 配置 topic（和可选的服务器）
    Setup(SetupArgs),
    /// 查看配置并检查服务器连接
    Status,
    /// 发送测试通知
    Test,
    /// 单次发送（不重试、不去重）
    Send(SendArgs),
    /// 可靠投递：去重、重试、记录历史
    Notify(NotifyArgs),
    /// 任务完成
    Complete(CompleteArgs),
    /// 需要用户操作
    Action(ActionArgs),
    /// 任务卡住
    Blocked(BlockedArgs),
    /// 错误
    Error(ErrorArgs),
    /// 普通信息
    Info(TitledArgs),
    /// 成功
    Success(TitledArgs),
    /// 提问并等待回复（回复打印到 stdout）
    Ask(AskArgs),
    /// 请求自由文本输入
    Input(InputArgs),
    /// 会话通知模式
    Mode {
        #[command(subcommand)]
        action: ModeAction,
    },
    /// 通知历史
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug ntfy notify "Build" "done"
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ntfy_notify=info,ntfy=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    let paths = NotifyPaths::default_location();
    debug!(config = %paths.config.display(), "Using config file");
    let notifier = NotifierBuilder::new().paths(paths.clone()).build()?;

    let result = match cli.command {
        Commands::Setup(args) => ntfy_notify::cli::handle_setup(&notifier, args),
        Commands::Status => ntfy_notify::cli::handle_status(&notifier, json),
        Commands::Test => ntfy_notify::cli::handle_test(&notifier),
        Commands::Send(args) => ntfy_notify::cli::handle_send(&notifier, args),
        Commands::Notify(args) => ntfy_notify::cli::handle_notify(&notifier, args, json),
        Commands::Complete(args) => ntfy_notify::cli::handle_complete(&notifier, args, json),
        Commands::Action(args) => ntfy_notify::cli::handle_action(&notifier, args, json),
        Commands::Blocked(args) => ntfy_notify::cli::handle_blocked(&notifier, args, json),
        Commands::Error(args) => ntfy_notify::cli::handle_error(&notifier, args, json),
        Commands::Info(args) => ntfy_notify::cli::handle_info(&notifier, args, json),
        Commands::Success(args) => ntfy_notify::cli::handle_success(&notifier, args, json),
        Commands::Ask(args) => ntfy_notify::cli::handle_ask(&notifier, args),
        Commands::Input(args) => ntfy_notify::cli::handle_input(&notifier, args),
        Commands::Mode { action } => {
            let session = SessionManager::new(JsonFileStore::new(&paths.session), Arc::new(SystemClock));
            ntfy_notify::cli::handle_mode(&notifier, &session, action, json)
        }
        Commands::History { action } => ntfy_notify::cli::handle_history(&notifier, action, json),
    };

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("✗ {:#}", e);
            std::process::exit(1);
        }
    }
}
