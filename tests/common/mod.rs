//! 集成测试共用的假 relay 和环境搭建

#![allow(dead_code)]

use ntfy_notify::clock::{Clock, ManualClock};
use ntfy_notify::config::{Config, NotifyPaths};
use ntfy_notify::notification::{FeedMessage, PublishRequest, PublishedMessage, Relay, RelayError};
use ntfy_notify::{HistoryLog, Notifier, NotifierBuilder};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// 发布结果脚本
pub enum PublishScript {
    AlwaysOk,
    AlwaysStatus(u16),
    /// 前 N 次失败，之后成功
    FailFirst(usize),
}

/// 内存 relay：记录发布请求，按虚拟时间放出预设回复
pub struct FakeRelay {
    clock: Arc<ManualClock>,
    script: PublishScript,
    published: Mutex<Vec<PublishRequest>>,
    replies: Mutex<Vec<(Duration, FeedMessage)>>,
    polls: Mutex<Vec<String>>,
    /// 每次 publish 时读取这个历史文件的条目数
    history_path: Mutex<Option<PathBuf>>,
    history_seen: Mutex<Vec<usize>>,
}

impl FakeRelay {
    pub fn new(clock: Arc<ManualClock>, script: PublishScript) -> Self {
        Self {
            clock,
            script,
            published: Mutex::new(Vec::new()),
            replies: Mutex::new(Vec::new()),
            polls: Mutex::new(Vec::new()),
            history_path: Mutex::new(None),
            history_seen: Mutex::new(Vec::new()),
        }
    }

    /// 之后每次 publish 都记录历史文件里已有的条目数
    pub fn watch_history(&self, path: impl Into<PathBuf>) {
        *self.history_path.lock().unwrap() = Some(path.into());
    }

    pub fn history_seen(&self) -> Vec<usize> {
        self.history_seen.lock().unwrap().clone()
    }

    /// 虚拟时间到达 `at` 后，轮询能看到这条纯文本回复
    pub fn reply_at(&self, at: Duration, text: &str) {
        self.replies.lock().unwrap().push((
            at,
            FeedMessage {
                id: format!("reply-{}", at.as_millis()),
                time: 0,
                event: "message".to_string(),
                title: None,
                message: Some(text.to_string()),
                actions: None,
            },
        ));
    }

    pub fn published(&self) -> Vec<PublishRequest> {
        self.published.lock().unwrap().clone()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    pub fn polls(&self) -> Vec<String> {
        self.polls.lock().unwrap().clone()
    }
}

impl Relay for FakeRelay {
    fn publish(&self, request: &PublishRequest) -> Result<PublishedMessage, RelayError> {
        if let Some(path) = self.history_path.lock().unwrap().as_ref() {
            let count = HistoryLog::new(path).entries().len();
            self.history_seen.lock().unwrap().push(count);
        }

        let mut published = self.published.lock().unwrap();
        published.push(request.clone());
        let attempt = published.len();

        let fail = match self.script {
            PublishScript::AlwaysOk => None,
            PublishScript::AlwaysStatus(status) => Some(status),
            PublishScript::FailFirst(n) if attempt <= n => Some(500),
            PublishScript::FailFirst(_) => None,
        };
        match fail {
            Some(status) => Err(RelayError::Status {
                status,
                body: "server error".to_string(),
            }),
            None => Ok(PublishedMessage {
                id: format!("msg-{}", attempt),
                time: self.clock.now().timestamp(),
                topic: "test-topic".to_string(),
            }),
        }
    }

    fn poll(&self, url: &str, _authorization: Option<&str>) -> Result<Vec<FeedMessage>, RelayError> {
        self.polls.lock().unwrap().push(url.to_string());
        let now = self.clock.elapsed();
        Ok(self
            .replies
            .lock()
            .unwrap()
            .iter()
            .filter(|(at, _)| *at <= now)
            .map(|(_, msg)| msg.clone())
            .collect())
    }

    fn health(&self, _server: &str) -> Result<Duration, RelayError> {
        Ok(Duration::from_millis(12))
    }
}

pub struct TestEnv {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub relay: Arc<FakeRelay>,
    pub notifier: Notifier,
}

/// 已配置 topic、关闭限流的测试环境
pub fn setup(script: PublishScript) -> TestEnv {
    setup_with(script, |config| config.rate_limit.enabled = false)
}

pub fn setup_with(script: PublishScript, adjust: impl FnOnce(&mut Config)) -> TestEnv {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new());
    let relay = Arc::new(FakeRelay::new(clock.clone(), script));

    let notifier = NotifierBuilder::new()
        .paths(NotifyPaths::under(dir.path()))
        .relay(relay.clone())
        .clock(clock.clone())
        .build()
        .unwrap();

    let store = notifier.sender().config_store();
    let mut config = store.setup_topic("test-topic", Some("https://ntfy.test")).unwrap();
    adjust(&mut config);
    store.save(&config).unwrap();

    TestEnv {
        dir,
        clock,
        relay,
        notifier,
    }
}
