//! 通知层 - 通过 ntfy 发送推送通知
//!
//! # 组成
//! 1. `Sender`：单次发送，负责 topic 解析、鉴权、限流
//! 2. `Notifier`：可靠投递，去重 + 重试 + 历史 + 兜底日志
//! 3. `Responder`：发送带按钮的问题并轮询回复
//! 4. `HistoryLog`：JSON 历史，支持查询、统计、导出
//!
//! # 使用示例
//! ```ignore
//! use ntfy_notify::notification::{NotifierBuilder, DeliveryOptions, NotificationRequest};
//!
//! let notifier = NotifierBuilder::new().build()?;
//! let report = notifier.ensure_delivery(
//!     NotificationRequest::new("Build", "Build finished"),
//!     &DeliveryOptions::default(),
//! );
//! ```

pub mod action;
pub mod builder;
pub mod deduplicator;
pub mod delivery;
pub mod fallback;
pub mod history;
pub mod interactive;
pub mod message;
pub mod priority;
pub mod relay;
pub mod sender;
pub mod throttle;

pub use action::{actions_header, Action};
pub use builder::NotifierBuilder;
pub use deduplicator::{dedup_key, NotificationDeduplicator, DEDUP_WINDOW};
pub use delivery::{BatchReport, DeliveryOptions, DeliveryReport, Notifier, DEFAULT_MAX_RETRIES};
pub use fallback::FallbackLog;
pub use history::{ExportFormat, HistoryFilter, HistoryLog, NotificationLogEntry, Statistics, StorageInfo};
pub use interactive::{match_reply, AskState, CancelToken, Question, Responder};
pub use message::{MessageExtras, NotificationRequest};
pub use priority::{classify_priority, classify_tags, Priority};
pub use relay::{FeedMessage, HttpRelay, PublishRequest, PublishedMessage, Relay, RelayError};
pub use sender::{ConnectionStatus, SendOutcome, Sender};
pub use throttle::{RateDecision, RateLimiter};
