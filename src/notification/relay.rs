//! ntfy relay 客户端
//!
//! `Relay` trait 是发送端与网络之间的接缝：生产环境用 [`HttpRelay`]（reqwest 阻塞客户端），
//! 测试用内存实现替换。

use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// 发布请求超时
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);
/// 轮询 / 健康检查超时
pub const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// 传输层错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RelayError {
    #[error("Request timed out")]
    Timeout,
    #[error("Could not connect to server")]
    Connect,
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("{0}")]
    Other(String),
}

impl RelayError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RelayError::Timeout
        } else if e.is_connect() {
            RelayError::Connect
        } else {
            RelayError::Other(e.to_string())
        }
    }
}

/// 发布请求（已经组装好的 URL、请求头和消息体）
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl PublishRequest {
    /// 按名字查请求头（大小写不敏感）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// relay 返回的已发布消息
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PublishedMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub topic: String,
}

/// 消息流中的一条消息（`/json?poll=1`）
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FeedMessage {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub actions: Option<Vec<serde_json::Value>>,
}

impl FeedMessage {
    /// 用户的纯文本回复：没有标题也没有按钮
    pub fn is_plain_reply(&self) -> bool {
        self.title.as_deref().map_or(true, str::is_empty)
            && self.actions.as_ref().map_or(true, Vec::is_empty)
    }
}

/// 发布/订阅 relay
pub trait Relay: Send + Sync {
    /// 发布一条消息
    fn publish(&self, request: &PublishRequest) -> Result<PublishedMessage, RelayError>;

    /// 拉取 topic 上的消息（一次性，不保持连接）
    fn poll(&self, url: &str, authorization: Option<&str>) -> Result<Vec<FeedMessage>, RelayError>;

    /// 健康检查，返回往返耗时
    fn health(&self, server: &str) -> Result<Duration, RelayError>;
}

/// 基于 reqwest 的 HTTP relay
#[derive(Debug, Clone)]
pub struct HttpRelay {
    client: Client,
    publish_timeout: Duration,
    poll_timeout: Duration,
}

impl HttpRelay {
    pub fn new() -> Result<Self, RelayError> {
        let client = Client::builder()
            .build()
            .map_err(|e| RelayError::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            publish_timeout: PUBLISH_TIMEOUT,
            poll_timeout: POLL_TIMEOUT,
        })
    }

    /// 自定义超时（测试用）
    pub fn with_timeouts(mut self, publish: Duration, poll: Duration) -> Self {
        self.publish_timeout = publish;
        self.poll_timeout = poll;
        self
    }
}

impl Relay for HttpRelay {
    fn publish(&self, request: &PublishRequest) -> Result<PublishedMessage, RelayError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(self.publish_timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(RelayError::from_reqwest)?;
        let status = response.status();
        let text = response.text().map_err(RelayError::from_reqwest)?;

        if status.as_u16() != 200 {
            return Err(RelayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(url = %request.url, "Published to relay");
        // 响应体不是 JSON 时也视为成功
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    fn poll(&self, url: &str, authorization: Option<&str>) -> Result<Vec<FeedMessage>, RelayError> {
        let mut builder = self.client.get(url).timeout(self.poll_timeout);
        if let Some(auth) = authorization {
            builder = builder.header("Authorization", auth);
        }

        let response = builder.send().map_err(RelayError::from_reqwest)?;
        let status = response.status();
        let text = response.text().map_err(RelayError::from_reqwest)?;

        if status.as_u16() != 200 {
            return Err(RelayError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(parse_feed(&text))
    }

    fn health(&self, server: &str) -> Result<Duration, RelayError> {
        let url = format!("{}/v1/health", server.trim_end_matches('/'));
        let started = Instant::now();
        let response = self
            .client
            .get(&url)
            .timeout(self.poll_timeout)
            .send()
            .map_err(RelayError::from_reqwest)?;
        let latency = started.elapsed();

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().unwrap_or_default();
            return Err(RelayError::Status { status, body });
        }
        Ok(latency)
    }
}

/// 解析 NDJSON 消息流，只保留 `message` 事件，跳过无法解析的行
pub fn parse_feed(text: &str) -> Vec<FeedMessage> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| serde_json::from_str::<FeedMessage>(line).ok())
        .filter(|msg| msg.event.is_empty() || msg.event == "message")
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_messages() {
        assert_eq!(RelayError::Timeout.to_string(), "Request timed out");
        assert_eq!(RelayError::Connect.to_string(), "Could not connect to server");
        let err = RelayError::Status {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }

    #[test]
    fn test_parse_feed_skips_garbage_and_keepalive() {
        let text = r#"{"id":"a1","time":100,"event":"message","message":"yes"}
not json
{"id":"k","time":101,"event":"keepalive"}

{"id":"a2","time":102,"event":"message","title":"Deploy?","message":"Proceed?","actions":[{"action":"http"}]}
"#;
        let feed = parse_feed(text);
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, "a1");
        assert!(feed[0].is_plain_reply());
        assert!(!feed[1].is_plain_reply());
    }

    #[test]
    fn test_publish_request_header_lookup() {
        let req = PublishRequest {
            url: "https://ntfy.sh/t".to_string(),
            headers: vec![("Title".to_string(), "Hi".to_string())],
            body: "x".to_string(),
        };
        assert_eq!(req.header("title"), Some("Hi"));
        assert_eq!(req.header("Priority"), None);
    }
}
