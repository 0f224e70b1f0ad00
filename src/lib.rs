//! ntfy Notify - 通过 ntfy 发送推送通知，支持重试、去重、历史和交互式回复

pub mod cli;
pub mod clock;
pub mod config;
pub mod hooks;
pub mod notification;
pub mod session;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigStore, NotifyPaths};
pub use hooks::{format_duration, TaskEnd, TaskHooks, TaskOptions, ToolReport};
pub use notification::{
    AskState, DeliveryOptions, DeliveryReport, HistoryLog, NotificationRequest, Notifier,
    NotifierBuilder, Priority, Question, Relay, Responder,
};
pub use session::{JsonFileStore, KeyValueStore, MemoryStore, SessionActions, SessionManager, SessionState, TaskDone};
