//! 发送端 - 把 `NotificationRequest` 组装成 ntfy HTTP 请求并发布
//!
//! 每次发送都重新读取配置文件。没有 topic 时直接失败，不做网络请求。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::action::actions_header;
use super::message::NotificationRequest;
use super::priority::Priority;
use super::relay::{PublishRequest, PublishedMessage, Relay, RelayError};
use super::throttle::{RateDecision, RateLimiter};
use crate::clock::Clock;
use crate::config::{AuthConfig, Config, ConfigStore};

/// 单次发送结果
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
    pub response: Option<PublishedMessage>,
    /// 失败后重试是否可能成功（没有 topic 时为 false）
    pub retryable: bool,
}

impl SendOutcome {
    fn sent(message: String, response: PublishedMessage) -> Self {
        Self {
            success: true,
            message,
            response: Some(response),
            retryable: false,
        }
    }

    fn failed(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            message: message.into(),
            response: None,
            retryable,
        }
    }
}

/// 连接检查结果
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub server: String,
    pub latency_ms: Option<f64>,
    pub status: String,
}

/// ntfy 发送端
pub struct Sender {
    config: ConfigStore,
    relay: Arc<dyn Relay>,
    clock: Arc<dyn Clock>,
    limiter: Mutex<RateLimiter>,
}

impl Sender {
    pub fn new(config: ConfigStore, relay: Arc<dyn Relay>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            relay,
            clock,
            limiter: Mutex::new(RateLimiter::new()),
        }
    }

    pub fn config_store(&self) -> &ConfigStore {
        &self.config
    }

    /// 当前配置（每次重新读取）
    pub fn config(&self) -> Config {
        self.config.load()
    }

    pub fn relay(&self) -> &Arc<dyn Relay> {
        &self.relay
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// 发送一条通知
    pub fn send(&self, request: &NotificationRequest) -> SendOutcome {
        let config = self.config.load();

        let topic = match resolve_topic(&config, request.topic.as_deref()) {
            Some(topic) => topic,
            None => {
                warn!("No topic configured, notification not sent");
                return SendOutcome::failed("No topic configured. Run `ntfy setup <topic>` first.", false);
            }
        };

        if !request.bypass_rate_limit {
            let decision = {
                let mut limiter = self.limiter.lock().unwrap_or_else(|e| e.into_inner());
                limiter.check(&config.rate_limit, self.clock.instant())
            };
            if let RateDecision::Wait(wait) = decision {
                debug!(wait_secs = wait.as_secs_f64(), "Rate limited");
                return SendOutcome::failed(
                    format!("Rate limited. Wait {:.1} seconds.", wait.as_secs_f64()),
                    true,
                );
            }
        }

        let publish = build_publish_request(&config, &topic, request);

        match self.relay.publish(&publish) {
            Ok(response) => {
                {
                    let mut limiter = self.limiter.lock().unwrap_or_else(|e| e.into_inner());
                    limiter.record_send(self.clock.instant());
                }
                info!(topic = %topic, title = %request.title, "Notification sent");
                SendOutcome::sent(format!("Notification sent: {}", request.title), response)
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Notification send failed");
                SendOutcome::failed(e.to_string(), true)
            }
        }
    }

    /// 发送测试通知（高优先级，不受限流影响）
    pub fn send_test(&self) -> SendOutcome {
        let config = self.config.load();
        let message = format!(
            "If you see this, notifications are working!\n\nServer: {}\nTopic: {}\nTime: {}",
            config.server,
            config.topic,
            self.clock.now().with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        );
        let request = NotificationRequest::new("Test notification", message)
            .with_priority(Priority::High)
            .with_tags(["tada", "white_check_mark", "computer"])
            .with_bypass_rate_limit(true);
        self.send(&request)
    }

    /// 检查服务器是否可达（`GET {server}/v1/health`）
    pub fn check_connection(&self) -> ConnectionStatus {
        let config = self.config.load();
        match self.relay.health(&config.server) {
            Ok(latency) => ConnectionStatus {
                connected: true,
                server: config.server,
                latency_ms: Some((latency.as_secs_f64() * 100_000.0).round() / 100.0),
                status: "healthy".to_string(),
            },
            Err(RelayError::Status { status, .. }) => ConnectionStatus {
                connected: false,
                server: config.server,
                latency_ms: None,
                status: format!("unhealthy (HTTP {})", status),
            },
            Err(e) => ConnectionStatus {
                connected: false,
                server: config.server,
                latency_ms: None,
                status: e.to_string(),
            },
        }
    }
}

/// 请求里的 topic 优先，否则用配置里的；都为空返回 None
pub fn resolve_topic(config: &Config, requested: Option<&str>) -> Option<String> {
    requested
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let topic = config.topic.trim();
            (!topic.is_empty()).then(|| topic.to_string())
        })
}

/// `Authorization` 头：token 优先，否则用户名密码
pub fn authorization_header(auth: &AuthConfig) -> Option<String> {
    if !auth.enabled {
        return None;
    }
    if !auth.token.is_empty() {
        return Some(format!("Bearer {}", auth.token));
    }
    if !auth.username.is_empty() && !auth.password.is_empty() {
        let encoded = STANDARD.encode(format!("{}:{}", auth.username, auth.password));
        return Some(format!("Basic {}", encoded));
    }
    None
}

/// HTTP 头只能放 ASCII，其他字符直接丢弃
pub fn ascii_title(title: &str) -> String {
    title.chars().filter(char::is_ascii).collect()
}

/// 组装发布请求
pub fn build_publish_request(config: &Config, topic: &str, request: &NotificationRequest) -> PublishRequest {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut push = |name: &str, value: String| headers.push((name.to_string(), value));

    let title = ascii_title(&request.title);
    if !title.trim().is_empty() {
        push("Title", title);
    }

    let priority = request.priority.unwrap_or(config.default_priority);
    push("Priority", priority.as_str().to_string());

    if !request.tags.is_empty() {
        push("Tags", request.tags.join(","));
    }

    let extras = &request.extras;
    for (name, value) in [
        ("Click", &extras.click),
        ("Attach", &extras.attach),
        ("Filename", &extras.filename),
        ("Delay", &extras.delay),
        ("Email", &extras.email),
        ("Icon", &extras.icon),
    ] {
        if let Some(value) = value.as_ref().filter(|v| !v.is_empty()) {
            push(name, value.clone());
        }
    }
    if extras.markdown {
        push("Markdown", "yes".to_string());
    }

    if let Some(actions) = actions_header(&request.actions) {
        push("Actions", actions);
    }

    if let Some(auth) = authorization_header(&config.authentication) {
        push("Authorization", auth);
    }

    PublishRequest {
        url: config.topic_url(topic),
        headers,
        body: request.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notification::action::Action;
    use crate::notification::message::MessageExtras;
    use std::time::Duration;
    use tempfile::tempdir;

    /// 记录请求的内存 relay
    struct RecordingRelay {
        requests: Mutex<Vec<PublishRequest>>,
        fail_with: Option<RelayError>,
    }

    impl RecordingRelay {
        fn ok() -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_with: None,
            }
        }

        fn failing(err: RelayError) -> Self {
            Self {
                requests: Mutex::new(Vec::new()),
                fail_with: Some(err),
            }
        }

        fn count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Relay for RecordingRelay {
        fn publish(&self, request: &PublishRequest) -> Result<PublishedMessage, RelayError> {
            self.requests.lock().unwrap().push(request.clone());
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(PublishedMessage {
                    id: "msg1".to_string(),
                    time: 0,
                    topic: "t".to_string(),
                }),
            }
        }

        fn poll(&self, _url: &str, _auth: Option<&str>) -> Result<Vec<crate::notification::relay::FeedMessage>, RelayError> {
            Ok(Vec::new())
        }

        fn health(&self, _server: &str) -> Result<Duration, RelayError> {
            Ok(Duration::from_millis(42))
        }
    }

    fn store_with(dir: &std::path::Path, json: &str) -> ConfigStore {
        let path = dir.join("config.json");
        std::fs::write(&path, json).unwrap();
        ConfigStore::new(path)
    }

    #[test]
    fn test_missing_topic_fails_without_network() {
        let dir = tempdir().unwrap();
        let relay = Arc::new(RecordingRelay::ok());
        let sender = Sender::new(
            ConfigStore::new(dir.path().join("config.json")),
            relay.clone(),
            Arc::new(ManualClock::new()),
        );

        let outcome = sender.send(&NotificationRequest::new("Hi", "there"));
        assert!(!outcome.success);
        assert!(!outcome.retryable);
        assert!(outcome.message.contains("No topic configured"));
        assert_eq!(relay.count(), 0);
    }

    #[test]
    fn test_headers_built_from_request() {
        let dir = tempdir().unwrap();
        let store = store_with(dir.path(), r#"{"topic": "dev", "server": "https://ntfy.example.com/"}"#);
        let config = store.load();
        let request = NotificationRequest::new("Build ✅ done", "all green")
            .with_tags(["white_check_mark", "computer"])
            .with_extras(MessageExtras {
                click: Some("https://ci.example.com/1".to_string()),
                markdown: true,
                ..Default::default()
            })
            .with_actions(vec![Action::reply("Yes", "https://ntfy.example.com/dev")]);

        let publish = build_publish_request(&config, "dev", &request);
        assert_eq!(publish.url, "https://ntfy.example.com/dev");
        assert_eq!(publish.header("Title"), Some("Build  done"));
        assert_eq!(publish.header("Priority"), Some("default"));
        assert_eq!(publish.header("Tags"), Some("white_check_mark,computer"));
        assert_eq!(publish.header("Click"), Some("https://ci.example.com/1"));
        assert_eq!(publish.header("Markdown"), Some("yes"));
        assert_eq!(
            publish.header("Actions"),
            Some("http, Yes, https://ntfy.example.com/dev, body=YES")
        );
        assert_eq!(publish.header("Authorization"), None);
        assert_eq!(publish.body, "all green");
    }

    #[test]
    fn test_non_ascii_title_omitted() {
        let config = Config::default();
        let publish = build_publish_request(&config, "t", &NotificationRequest::new("完成", "x"));
        assert_eq!(publish.header("Title"), None);
    }

    #[test]
    fn test_authorization_header() {
        let mut auth = AuthConfig {
            enabled: true,
            token: "tk_abc".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        };
        assert_eq!(authorization_header(&auth).as_deref(), Some("Bearer tk_abc"));

        auth.token.clear();
        assert_eq!(authorization_header(&auth).as_deref(), Some("Basic dTpw"));

        auth.enabled = false;
        assert_eq!(authorization_header(&auth), None);
    }

    #[test]
    fn test_rate_limited_send_has_no_network_io() {
        let dir = tempdir().unwrap();
        let store = store_with(dir.path(), r#"{"topic": "dev"}"#);
        let relay = Arc::new(RecordingRelay::ok());
        let clock = Arc::new(ManualClock::new());
        let sender = Sender::new(store, relay.clone(), clock.clone());

        assert!(sender.send(&NotificationRequest::new("a", "1")).success);
        clock.advance(Duration::from_secs(2));

        let outcome = sender.send(&NotificationRequest::new("b", "2"));
        assert!(!outcome.success);
        assert_eq!(outcome.message, "Rate limited. Wait 3.0 seconds.");
        assert_eq!(relay.count(), 1);

        // bypass 跳过限流
        let outcome = sender.send(&NotificationRequest::new("c", "3").with_bypass_rate_limit(true));
        assert!(outcome.success);
        assert_eq!(relay.count(), 2);
    }

    #[test]
    fn test_failed_send_does_not_count_against_limit() {
        let dir = tempdir().unwrap();
        let store = store_with(dir.path(), r#"{"topic": "dev"}"#);
        let relay = Arc::new(RecordingRelay::failing(RelayError::Status {
            status: 500,
            body: "oops".to_string(),
        }));
        let sender = Sender::new(store, relay.clone(), Arc::new(ManualClock::new()));

        let first = sender.send(&NotificationRequest::new("a", "1"));
        assert_eq!(first.message, "HTTP 500: oops");
        assert!(first.retryable);

        // 没有冷却，第二次仍然发出请求
        let second = sender.send(&NotificationRequest::new("a", "1"));
        assert_eq!(second.message, "HTTP 500: oops");
        assert_eq!(relay.count(), 2);
    }

    #[test]
    fn test_check_connection() {
        let dir = tempdir().unwrap();
        let sender = Sender::new(
            ConfigStore::new(dir.path().join("config.json")),
            Arc::new(RecordingRelay::ok()),
            Arc::new(ManualClock::new()),
        );
        let status = sender.check_connection();
        assert!(status.connected);
        assert_eq!(status.server, "https://ntfy.sh");
        assert_eq!(status.latency_ms, Some(42.0));
    }

    #[test]
    fn test_request_topic_overrides_config() {
        let config = Config {
            topic: "from-config".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_topic(&config, Some("session")).as_deref(), Some("session"));
        assert_eq!(resolve_topic(&config, Some("  ")).as_deref(), Some("from-config"));
        assert_eq!(resolve_topic(&Config::default(), None), None);
    }
}
