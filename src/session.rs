//! 会话通知模式 - 开启后任务完成、需要决策、卡住时自动通知
//!
//! 状态保存在一个 [`KeyValueStore`] 里（默认 `session_state.json`），
//! 每次改动都是读-改-写。会话 topic 显式传给发送端，不改写配置文件。

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::notification::delivery::{DeliveryOptions, DeliveryReport, Notifier};
use crate::notification::interactive::{Question, Responder};
use crate::notification::message::NotificationRequest;
use crate::notification::priority::Priority;

const SESSION_KEY: &str = "session";
const DONE_OPTION: &str = "Done (no more actions)";

/// 键值存储
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// JSON 文件存储（整个文件是一个对象）
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_map(&self) -> Result<serde_json::Map<String, Value>> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Ok(serde_json::Map::new()),
        }
    }

    /// `session_state.json` -> `session_state.json.corrupt`
    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".corrupt");
        PathBuf::from(name)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.load_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut map = match self.load_map() {
            Ok(map) => map,
            Err(e) => {
                // 损坏的文件另存一份，状态重新开始
                let backup = self.backup_path();
                warn!(
                    path = %self.path.display(),
                    backup = %backup.display(),
                    error = %e,
                    "Session state file is corrupt, starting fresh"
                );
                fs::copy(&self.path, &backup)?;
                serde_json::Map::new()
            }
        };
        map.insert(key.to_string(), value);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(&map)?)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// 内存存储（测试用）
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value);
        Ok(())
    }
}

/// 会话状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub notification_mode: bool,
    /// 为空时使用配置里的 topic
    pub session_topic: Option<String>,
    pub session_start: Option<DateTime<Utc>>,
    pub task_count: u32,
    pub notification_count: u32,
}

/// 关闭通知模式时的会话摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub session_start: Option<DateTime<Utc>>,
    pub task_count: u32,
    pub notification_count: u32,
}

/// 会话管理器
pub struct SessionManager<S: KeyValueStore> {
    store: S,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> SessionManager<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 当前状态；读取失败时返回默认（关闭）
    pub fn state(&self) -> SessionState {
        match self.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "Failed to load session state, treating mode as off");
                SessionState::default()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state().notification_mode
    }

    /// 开启通知模式，计数清零
    pub fn enable(&self, topic: Option<String>) -> Result<SessionState> {
        let state = SessionState {
            notification_mode: true,
            session_topic: topic.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            session_start: Some(self.clock.now()),
            task_count: 0,
            notification_count: 0,
        };
        self.save(&state)?;
        info!(topic = ?state.session_topic, "Notification mode enabled");
        Ok(state)
    }

    /// 关闭通知模式，状态重置
    pub fn disable(&self) -> Result<SessionSummary> {
        let previous = self.state();
        self.save(&SessionState::default())?;
        info!(
            tasks = previous.task_count,
            notifications = previous.notification_count,
            "Notification mode disabled"
        );
        Ok(SessionSummary {
            session_start: previous.session_start,
            task_count: previous.task_count,
            notification_count: previous.notification_count,
        })
    }

    /// 会话 topic，否则配置 topic
    pub fn effective_topic(&self, config: &Config) -> String {
        self.state()
            .session_topic
            .unwrap_or_else(|| config.topic.clone())
    }

    pub fn increment_task_count(&self) -> Result<u32> {
        let mut state = self.state();
        state.task_count += 1;
        self.save(&state)?;
        Ok(state.task_count)
    }

    pub fn increment_notification_count(&self) -> Result<u32> {
        let mut state = self.state();
        state.notification_count += 1;
        self.save(&state)?;
        Ok(state.notification_count)
    }

    fn load(&self) -> Result<SessionState> {
        match self.store.get(SESSION_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(SessionState::default()),
        }
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        self.store.set(SESSION_KEY, serde_json::to_value(state)?)
    }
}

/// `task_done` 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDone {
    /// 没有后续步骤，或用户选择结束
    Done,
    /// 用户选择（或自动选择）的下一步
    Next(String),
    /// 等待超时
    NoResponse,
}

/// 会话感知的通知操作
///
/// 通知模式关闭时什么都不发（`force` 除外）。
pub struct SessionActions<'a, S: KeyValueStore> {
    session: &'a SessionManager<S>,
    notifier: &'a Notifier,
    poll_interval: Option<Duration>,
}

impl<'a, S: KeyValueStore> SessionActions<'a, S> {
    pub fn new(session: &'a SessionManager<S>, notifier: &'a Notifier) -> Self {
        Self {
            session,
            notifier,
            poll_interval: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn should_notify(&self) -> bool {
        self.session.is_enabled()
    }

    /// 可靠投递到会话 topic；模式关闭时返回 `None`
    pub fn session_notify(&self, title: &str, message: &str, force: bool) -> Option<DeliveryReport> {
        if !self.active(force, title) {
            return None;
        }
        self.count_notification();
        let mut request = NotificationRequest::new(title, message);
        if let Some(topic) = self.session_topic() {
            request = request.with_topic(topic);
        }
        Some(self.notifier.ensure_delivery(request, &DeliveryOptions::default()))
    }

    /// 在会话 topic 上提问
    pub fn session_ask(&self, question: Question, force: bool) -> Option<String> {
        if !self.active(force, &question.title) {
            return None;
        }
        self.count_notification();
        let question = question.with_topic(self.session_topic());
        self.responder().ask_with(&question).response()
    }

    /// 需要用户决策；默认选项 Continue / Cancel
    pub fn need_action(
        &self,
        title: &str,
        message: &str,
        options: Option<Vec<String>>,
        timeout: Duration,
        allow_text: bool,
        force: bool,
    ) -> Option<String> {
        let options = options.unwrap_or_else(|| vec!["Continue".to_string(), "Cancel".to_string()]);
        let mut message = message.to_string();
        if allow_text {
            message.push_str("\n\n(You can also type a custom response)");
        }
        let question = Question::new(format!("Action Required: {}", title), message, options)
            .with_timeout(timeout)
            .with_priority(Priority::Urgent)
            .with_tags(&["bell", "warning"])
            .with_free_text(allow_text);
        self.session_ask(question, force)
    }

    /// 任务完成；有后续步骤时让用户选择下一步
    pub fn task_done(
        &self,
        task: &str,
        summary: &str,
        next_steps: &[String],
        auto_proceed: bool,
        timeout: Duration,
        force: bool,
    ) -> TaskDone {
        if !self.active(force, task) {
            return TaskDone::Done;
        }
        if let Err(e) = self.session.increment_task_count() {
            warn!(error = %e, "Failed to update task count");
        }
        self.count_notification();

        let topic = self.session_topic();
        let title = format!("Complete: {}", task);

        if next_steps.is_empty() {
            let mut request = NotificationRequest::new(title, summary)
                .with_priority(Priority::High)
                .with_tags(["white_check_mark", "tada"]);
            if let Some(topic) = topic {
                request = request.with_topic(topic);
            }
            self.notifier.ensure_delivery(request, &DeliveryOptions::default());
            return TaskDone::Done;
        }

        let mut options = next_steps.to_vec();
        options.push(DONE_OPTION.to_string());
        let question = Question::new(title, format!("{}\n\nSuggested next steps available.", summary), options)
            .with_timeout(timeout)
            .with_priority(Priority::High)
            .with_tags(&["white_check_mark", "arrow_right"])
            .with_topic(topic);

        match self.responder().ask_with(&question).response() {
            Some(choice) if choice == DONE_OPTION => TaskDone::Done,
            Some(choice) => TaskDone::Next(choice),
            None if auto_proceed => {
                info!(step = %next_steps[0], "No response, auto-proceeding with first step");
                TaskDone::Next(next_steps[0].clone())
            }
            None => TaskDone::NoResponse,
        }
    }

    /// 请求批准某个操作；回复包含 "Yes" 才返回 true
    ///
    /// 不受通知模式控制，会话 topic 存在时发到会话 topic。
    pub fn ask_proceed(&self, action: &str, details: &str, timeout: Duration) -> bool {
        let mut message = format!("Should I proceed with: {}?", action);
        if !details.is_empty() {
            message.push_str(&format!("\n\n{}", details));
        }
        let question = Question::new(
            format!("Proceed: {}?", action),
            message,
            vec!["Yes, proceed".to_string(), "No, skip".to_string()],
        )
        .with_timeout(timeout)
        .with_priority(Priority::High)
        .with_tags(&["question", "arrow_right"]);
        self.session_ask(question, true)
            .is_some_and(|reply| reply.contains("Yes"))
    }

    /// 卡住了，等待指示；默认选项 Retry / Skip / Abort
    ///
    /// 不受通知模式控制。
    pub fn blocked(
        &self,
        issue: &str,
        details: &str,
        options: Option<Vec<String>>,
        timeout: Duration,
    ) -> Option<String> {
        let options = options.unwrap_or_else(|| {
            ["Retry", "Skip", "Abort"].iter().map(|s| s.to_string()).collect()
        });
        let question = Question::new(format!("Blocked: {}", issue), details, options)
            .with_timeout(timeout)
            .with_priority(Priority::Urgent)
            .with_tags(&["x", "stop_sign"]);
        self.session_ask(question, true)
    }

    /// 出错后询问下一步；返回小写的 `retry` / `skip` / `abort`
    ///
    /// `can_retry` 为 false 时不提供 Retry。不受通知模式控制。
    pub fn error_occurred(&self, error: &str, details: &str, can_retry: bool, timeout: Duration) -> Option<String> {
        let mut options = Vec::new();
        if can_retry {
            options.push("Retry".to_string());
        }
        options.extend(["Skip".to_string(), "Abort".to_string()]);
        let question = Question::new(format!("Error: {}", error), details, options)
            .with_timeout(timeout)
            .with_priority(Priority::Urgent)
            .with_tags(&["rotating_light", "skull"]);
        self.session_ask(question, true).map(|reply| reply.to_lowercase())
    }

    fn active(&self, force: bool, what: &str) -> bool {
        if force || self.should_notify() {
            return true;
        }
        debug!(what = %what, "Notification mode off, skipping");
        false
    }

    fn session_topic(&self) -> Option<String> {
        self.session.state().session_topic
    }

    fn count_notification(&self) {
        if let Err(e) = self.session.increment_notification_count() {
            warn!(error = %e, "Failed to update notification count");
        }
    }

    fn responder(&self) -> Responder<'a> {
        let responder = Responder::new(self.notifier);
        match self.poll_interval {
            Some(interval) => responder.with_poll_interval(interval),
            None => responder,
        }
    }
}
