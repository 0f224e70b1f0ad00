//! 配置存储 - `~/.config/ntfy-notify/config.json`
//!
//! 每次调用都重新读取文件（不缓存），用户配置按 key 深度合并到默认值之上。
//! 配置文件损坏时回退到默认值，原文件保持不动。

use crate::notification::priority::Priority;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_SERVER: &str = "https://ntfy.sh";

/// 自动通知开关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoNotifyConfig {
    pub on_task_start: bool,
    pub on_task_complete: bool,
    pub on_action_required: bool,
    pub on_error: bool,
    pub on_long_task: bool,
    pub long_task_threshold_seconds: u64,
}

impl Default for AutoNotifyConfig {
    fn default() -> Self {
        Self {
            on_task_start: false,
            on_task_complete: true,
            on_action_required: true,
            on_error: true,
            on_long_task: true,
            long_task_threshold_seconds: 60,
        }
    }
}

/// 限流配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub max_per_minute: u32,
    pub cooldown_seconds: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_minute: 10,
            cooldown_seconds: 5.0,
        }
    }
}

/// 历史记录配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub max_history: usize,
    pub log_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_history: 1000,
            log_file: "notification_history.json".to_string(),
        }
    }
}

/// 认证配置（token 优先于用户名密码）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,
    pub token: String,
    pub username: String,
    pub password: String,
}

/// 完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: String,
    pub topic: String,
    pub default_priority: Priority,
    pub auto_notify: AutoNotifyConfig,
    /// 按通知类型的优先级（task_complete / action_required / blocked / error / info / success）
    pub priorities: BTreeMap<String, Priority>,
    /// 按通知类型的 emoji 标签
    pub tags: BTreeMap<String, Vec<String>>,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
    pub authentication: AuthConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let priorities = [
            ("task_complete", Priority::High),
            ("action_required", Priority::Urgent),
            ("blocked", Priority::High),
            ("error", Priority::High),
            ("info", Priority::Default),
            ("success", Priority::Default),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let tags = [
            ("task_complete", &["white_check_mark", "computer"][..]),
            ("action_required", &["warning", "bell"][..]),
            ("blocked", &["x", "stop_sign"][..]),
            ("error", &["rotating_light", "skull"][..]),
            ("info", &["information_source"][..]),
            ("success", &["tada", "rocket"][..]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|t| t.to_string()).collect()))
        .collect();

        Self {
            server: DEFAULT_SERVER.to_string(),
            topic: String::new(),
            default_priority: Priority::Default,
            auto_notify: AutoNotifyConfig::default(),
            priorities,
            tags,
            rate_limit: RateLimitConfig::default(),
            logging: LoggingConfig::default(),
            authentication: AuthConfig::default(),
            platform: None,
        }
    }
}

impl Config {
    /// `{server}/{topic}`，去掉 server 末尾的 `/`
    pub fn topic_url(&self, topic: &str) -> String {
        format!("{}/{}", self.server.trim_end_matches('/'), topic)
    }

    /// 按通知类型查优先级
    pub fn priority_for(&self, kind: &str, fallback: Priority) -> Priority {
        self.priorities.get(kind).copied().unwrap_or(fallback)
    }

    /// 按通知类型查标签
    pub fn tags_for(&self, kind: &str, fallback: &[&str]) -> Vec<String> {
        self.tags
            .get(kind)
            .cloned()
            .unwrap_or_else(|| fallback.iter().map(|t| t.to_string()).collect())
    }
}

/// 配置状态摘要（`ntfy status`）
#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    pub configured: bool,
    pub topic: String,
    pub server: String,
    pub auth_enabled: bool,
    pub auto_notify: AutoNotifyConfig,
    pub rate_limit: RateLimitConfig,
}

/// 数据目录下各文件位置
#[derive(Debug, Clone)]
pub struct NotifyPaths {
    pub base_dir: PathBuf,
    pub config: PathBuf,
    pub fallback_log: PathBuf,
    pub session: PathBuf,
    pub exports: PathBuf,
}

impl NotifyPaths {
    /// 默认位置：`$NTFY_NOTIFY_HOME` 或 `~/.config/ntfy-notify`
    pub fn default_location() -> Self {
        let base_dir = std::env::var_os("NTFY_NOTIFY_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".config")
                    .join("ntfy-notify")
            });
        let mut paths = Self::under(base_dir);
        if let Some(config) = std::env::var_os("NTFY_NOTIFY_CONFIG") {
            paths.config = PathBuf::from(config);
        }
        paths
    }

    /// 所有文件放在指定目录下（测试用）
    pub fn under(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            config: base_dir.join("config.json"),
            fallback_log: base_dir.join("failed_notifications.log"),
            session: base_dir.join("session_state.json"),
            exports: base_dir.join("exports"),
            base_dir,
        }
    }

    /// 历史文件路径，由 `logging.log_file` 决定（相对路径基于数据目录）
    pub fn history(&self, logging: &LoggingConfig) -> PathBuf {
        let file = Path::new(&logging.log_file);
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.base_dir.join(file)
        }
    }
}

/// 配置存储
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/ntfy-notify/config.json`（`$NTFY_NOTIFY_CONFIG` 优先）
    pub fn default_location() -> Self {
        Self::new(NotifyPaths::default_location().config)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 加载配置（默认值 + 用户覆盖）
    pub fn load(&self) -> Config {
        if !self.path.exists() {
            return Config::default();
        }

        match self.try_load() {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        }
    }

    fn try_load(&self) -> Result<Config> {
        let content = fs::read_to_string(&self.path)?;
        let user: Value = serde_json::from_str(&content)?;
        if !user.is_object() {
            return Err(anyhow!("config root must be a JSON object"));
        }

        let mut merged = serde_json::to_value(Config::default())?;
        merge_json(&mut merged, user);
        let config = serde_json::from_value(merged)?;
        debug!(path = %self.path.display(), "Loaded config");
        Ok(config)
    }

    /// 保存配置
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// 设置 topic（以及可选的 server）
    pub fn setup_topic(&self, topic: &str, server: Option<&str>) -> Result<Config> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(anyhow!("topic must not be empty"));
        }

        let mut config = self.load();
        config.topic = topic.to_string();
        if let Some(server) = server {
            config.server = server.trim().to_string();
        }
        self.save(&config)?;
        Ok(config)
    }

    pub fn status(&self) -> ConfigStatus {
        let config = self.load();
        ConfigStatus {
            configured: !config.topic.is_empty(),
            topic: config.topic,
            server: config.server,
            auth_enabled: config.authentication.enabled,
            auto_notify: config.auto_notify,
            rate_limit: config.rate_limit,
        }
    }
}

/// 递归合并：对象按 key 合并，其他值直接覆盖
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_json(existing, value);
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.json"));
        let config = store.load();
        assert_eq!(config, Config::default());
        assert_eq!(config.server, "https://ntfy.sh");
        assert_eq!(config.rate_limit.max_per_minute, 10);
        assert!(!config.auto_notify.on_task_start);
        assert!(config.auto_notify.on_long_task);
        assert_eq!(config.auto_notify.long_task_threshold_seconds, 60);
    }

    #[test]
    fn test_user_values_merge_over_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"topic": "builds", "priorities": {"info": "low"}, "rate_limit": {"max_per_minute": 3}}"#,
        )
        .unwrap();

        let config = ConfigStore::new(&path).load();
        assert_eq!(config.topic, "builds");
        assert_eq!(config.priority_for("info", Priority::Default), Priority::Low);
        // 未覆盖的 key 保留默认值
        assert_eq!(config.priority_for("action_required", Priority::Default), Priority::Urgent);
        assert_eq!(config.rate_limit.max_per_minute, 3);
        assert!(config.rate_limit.enabled);
        assert_eq!(config.rate_limit.cooldown_seconds, 5.0);
    }

    #[test]
    fn test_corrupt_file_falls_back_and_is_left_in_place() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();

        let config = ConfigStore::new(&path).load();
        assert_eq!(config, Config::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn test_setup_topic_persists() {
        let dir = tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.json"));

        store.setup_topic("my-topic", Some("https://ntfy.example.com/")).unwrap();

        let status = store.status();
        assert!(status.configured);
        assert_eq!(status.topic, "my-topic");
        assert_eq!(store.load().topic_url("my-topic"), "https://ntfy.example.com/my-topic");
        assert!(store.setup_topic("  ", None).is_err());
    }

    #[test]
    fn test_numeric_priority_in_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"default_priority": 2}"#).unwrap();
        assert_eq!(ConfigStore::new(&path).load().default_priority, Priority::Low);
    }

    #[test]
    fn test_history_path_relative_to_base() {
        let paths = NotifyPaths::under("/tmp/ntfy-test");
        let logging = LoggingConfig::default();
        assert_eq!(
            paths.history(&logging),
            PathBuf::from("/tmp/ntfy-test/notification_history.json")
        );
    }

    #[test]
    fn test_merge_json_replaces_arrays() {
        let mut base = serde_json::json!({"tags": {"info": ["a", "b"]}, "server": "x"});
        merge_json(&mut base, serde_json::json!({"tags": {"info": ["c"]}}));
        assert_eq!(base["tags"]["info"], serde_json::json!(["c"]));
        assert_eq!(base["server"], "x");
    }
}
