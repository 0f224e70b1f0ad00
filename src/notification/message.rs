//! 通知请求 - 一次发送的全部参数

use serde::{Deserialize, Serialize};

use super::action::Action;
use super::priority::Priority;

/// 通知请求
///
/// 构建后不可变；`with_*` 方法消耗 `self` 返回新值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub message: String,
    /// 为空时使用配置里的 `default_priority`
    pub priority: Option<Priority>,
    /// 有序去重的标签
    pub tags: Vec<String>,
    /// 为空时使用配置里的 topic
    pub topic: Option<String>,
    pub bypass_rate_limit: bool,
    pub extras: MessageExtras,
    pub actions: Vec<Action>,
}

/// ntfy 的可选附加字段，原样转成请求头
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageExtras {
    pub click: Option<String>,
    pub attach: Option<String>,
    pub filename: Option<String>,
    /// 例如 `30min`、`9am`
    pub delay: Option<String>,
    pub email: Option<String>,
    pub icon: Option<String>,
    pub markdown: bool,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// 设置标签（保留首次出现的顺序，忽略重复和空白）
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.clear();
        for tag in tags {
            let tag = tag.into().trim().to_string();
            if !tag.is_empty() && !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_bypass_rate_limit(mut self, bypass: bool) -> Self {
        self.bypass_rate_limit = bypass;
        self
    }

    pub fn with_extras(mut self, extras: MessageExtras) -> Self {
        self.extras = extras;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}
