//! 交互式提问 - 发送带按钮的通知，然后轮询 topic 等待回复
//!
//! 状态机：`Idle → Sent → (Responded | TimedOut | Cancelled)`，发送失败时为 `Failed`。
//!
//! 注意：没有关联 ID。等待期间 topic 上任何匹配的回复都会被当作答案，
//! 同一 topic 上并发的两个提问可能互相抢答。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::action::Action;
use super::delivery::{numbered_options, Notifier};
use super::message::{MessageExtras, NotificationRequest};
use super::priority::Priority;
use super::relay::FeedMessage;
use super::sender::{authorization_header, resolve_topic};

/// 默认等待时长
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// 轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);
/// ntfy 单条通知最多 3 个按钮
pub const MAX_ACTION_BUTTONS: usize = 3;

/// 取消令牌，可在其他线程中调用 `cancel()` 提前结束等待
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 提问状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskState {
    Idle,
    Sent,
    /// 用户选择的原始选项（或自由文本）
    Responded(String),
    TimedOut,
    Cancelled,
    /// 通知本身没发出去
    Failed(String),
}

impl AskState {
    pub fn response(self) -> Option<String> {
        match self {
            AskState::Responded(answer) => Some(answer),
            _ => None,
        }
    }
}

/// 一次提问的全部参数
#[derive(Debug, Clone)]
pub struct Question {
    pub title: String,
    pub message: String,
    pub options: Vec<String>,
    pub timeout: Duration,
    pub priority: Priority,
    pub tags: Vec<String>,
    /// 为空时使用配置里的 topic
    pub topic: Option<String>,
    /// 不匹配任何选项的纯文本回复也接受
    pub accept_free_text: bool,
}

impl Question {
    pub fn new(title: impl Into<String>, message: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            options,
            timeout: DEFAULT_TIMEOUT,
            priority: Priority::High,
            tags: vec!["question".to_string(), "bell".to_string()],
            topic: None,
            accept_free_text: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_topic(mut self, topic: Option<String>) -> Self {
        self.topic = topic;
        self
    }

    pub fn with_free_text(mut self, accept: bool) -> Self {
        self.accept_free_text = accept;
        self
    }
}

/// 把回复匹配到选项
///
/// 先按文本匹配（大小写不敏感，`_` 与空格等价），再按 1 起始的序号匹配。
/// 返回原始选项字符串。
pub fn match_reply(reply: &str, options: &[String]) -> Option<String> {
    let reply = reply.trim();
    if reply.is_empty() {
        return None;
    }

    let normalize = |s: &str| s.trim().to_uppercase().replace('_', " ");
    let wanted = normalize(reply);
    if let Some(option) = options.iter().find(|opt| normalize(opt) == wanted) {
        return Some(option.clone());
    }

    match reply.parse::<usize>() {
        Ok(n) if n >= 1 && n <= options.len() => Some(options[n - 1].clone()),
        _ => None,
    }
}

/// 交互式提问
pub struct Responder<'a> {
    notifier: &'a Notifier,
    poll_interval: Duration,
    cancel: Option<CancelToken>,
    state: Mutex<AskState>,
}

impl<'a> Responder<'a> {
    pub fn new(notifier: &'a Notifier) -> Self {
        Self {
            notifier,
            poll_interval: POLL_INTERVAL,
            cancel: None,
            state: Mutex::new(AskState::Idle),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// 最近一次提问的状态
    pub fn state(&self) -> AskState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_state(&self, state: AskState) -> AskState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state.clone();
        state
    }

    /// 发送问题并等待回复
    pub fn ask_with(&self, question: &Question) -> AskState {
        let config = self.notifier.config();
        let Some(topic) = resolve_topic(&config, question.topic.as_deref()) else {
            return self.set_state(AskState::Failed(
                "No topic configured. Run `ntfy setup <topic>` first.".to_string(),
            ));
        };
        let topic_url = config.topic_url(&topic);

        let mut message = question.message.clone();
        if !question.options.is_empty() {
            message.push_str("\n\nReply with:\n");
            message.push_str(&numbered_options(&question.options));
        }
        let actions = question
            .options
            .iter()
            .take(MAX_ACTION_BUTTONS)
            .map(|opt| Action::reply(opt, &topic_url))
            .collect();

        let request = NotificationRequest::new(question.title.clone(), message)
            .with_priority(question.priority)
            .with_tags(question.tags.iter().cloned())
            .with_topic(topic.clone())
            .with_bypass_rate_limit(true)
            .with_actions(actions);

        let options = question.options.clone();
        let free_text = question.accept_free_text;
        self.send_and_wait(&request, &topic_url, question.timeout, |msg| {
            let text = msg.message.as_deref()?;
            match_reply(text, &options).or_else(|| {
                let text = text.trim();
                (free_text && !text.is_empty()).then(|| text.to_string())
            })
        })
    }

    /// 提问，超时返回 `None`
    pub fn ask(&self, title: &str, message: &str, options: &[&str], timeout: Duration) -> Option<String> {
        let question = Question::new(title, message, to_strings(options)).with_timeout(timeout);
        self.ask_with(&question).response()
    }

    /// 是 / 否
    pub fn ask_yes_no(&self, title: &str, message: &str, timeout: Duration) -> Option<String> {
        let question = Question::new(title, message, to_strings(&["Yes", "No"]))
            .with_timeout(timeout)
            .with_tags(&["question", "white_check_mark", "x"]);
        self.ask_with(&question).response()
    }

    /// 多选一
    pub fn ask_choice(&self, title: &str, message: &str, choices: &[&str], timeout: Duration) -> Option<String> {
        let question = Question::new(title, message, to_strings(choices))
            .with_timeout(timeout)
            .with_tags(&["question", "thinking"]);
        self.ask_with(&question).response()
    }

    /// 确认操作；只有明确选择 Confirm 才返回 true
    pub fn ask_confirm(&self, action: &str, details: &str, timeout: Duration) -> bool {
        let mut message = format!("Please confirm: {}", action);
        if !details.is_empty() {
            message.push_str(&format!("\n\n{}", details));
        }
        let question = Question::new(format!("Confirm: {}", action), message, to_strings(&["Confirm", "Cancel"]))
            .with_timeout(timeout)
            .with_priority(Priority::Urgent)
            .with_tags(&["warning", "bell"]);
        self.ask_with(&question).response().as_deref() == Some("Confirm")
    }

    /// 审批：Approve / Reject / Later
    pub fn ask_approval(&self, item: &str, description: &str, timeout: Duration) -> Option<String> {
        let question = Question::new(
            format!("Approval: {}", item),
            description,
            to_strings(&["Approve", "Reject", "Later"]),
        )
        .with_timeout(timeout)
        .with_priority(Priority::Urgent)
        .with_tags(&["clipboard", "bell"]);
        self.ask_with(&question).response()
    }

    /// 自由文本输入：返回第一条非空的纯文本回复
    pub fn get_user_input(&self, prompt: &str, context: &str, timeout: Duration, topic: Option<&str>) -> AskState {
        let config = self.notifier.config();
        let Some(topic) = resolve_topic(&config, topic) else {
            return self.set_state(AskState::Failed(
                "No topic configured. Run `ntfy setup <topic>` first.".to_string(),
            ));
        };
        let topic_url = config.topic_url(&topic);

        let mut message = if context.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", context, prompt)
        };
        message.push_str(&format!("\n\nType your response at:\n{}", topic_url));

        let title: String = prompt.chars().take(50).collect();
        let request = NotificationRequest::new(format!("Input Needed: {}", title), message)
            .with_priority(Priority::Urgent)
            .with_tags(["pencil", "bell"])
            .with_topic(topic)
            .with_bypass_rate_limit(true)
            .with_extras(MessageExtras {
                click: Some(topic_url.clone()),
                ..Default::default()
            });

        self.send_and_wait(&request, &topic_url, timeout, |msg| {
            msg.message
                .as_deref()
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        })
    }

    fn send_and_wait<F>(&self, request: &NotificationRequest, topic_url: &str, timeout: Duration, matcher: F) -> AskState
    where
        F: Fn(&FeedMessage) -> Option<String>,
    {
        let clock = self.notifier.clock();
        // 发送前记录时间，过滤掉更早的消息
        let since = clock.now().timestamp();

        self.set_state(AskState::Idle);
        let outcome = self.notifier.send_once(request);
        if !outcome.success {
            warn!(error = %outcome.message, "Failed to send question");
            return self.set_state(AskState::Failed(outcome.message));
        }
        self.set_state(AskState::Sent);
        let published_id = outcome.response.map(|r| r.id).unwrap_or_default();
        info!(title = %request.title, timeout_secs = timeout.as_secs(), "Question sent, waiting for reply");

        let config = self.notifier.config();
        let auth = authorization_header(&config.authentication);
        let poll_url = format!("{}/json?poll=1&since={}", topic_url, since);

        let state = self.wait_for_reply(&poll_url, auth.as_deref(), &published_id, timeout, matcher);
        self.set_state(state)
    }

    fn wait_for_reply<F>(
        &self,
        poll_url: &str,
        auth: Option<&str>,
        published_id: &str,
        timeout: Duration,
        matcher: F,
    ) -> AskState
    where
        F: Fn(&FeedMessage) -> Option<String>,
    {
        let clock = self.notifier.clock();
        let relay = self.notifier.sender().relay();
        let started = clock.instant();

        loop {
            if self.is_cancelled() {
                info!("Waiting for reply cancelled");
                return AskState::Cancelled;
            }

            let elapsed = clock.instant().duration_since(started);
            if elapsed >= timeout {
                info!(timeout_secs = timeout.as_secs(), "No reply received before timeout");
                return AskState::TimedOut;
            }

            match relay.poll(poll_url, auth) {
                Ok(messages) => {
                    let answer = messages
                        .iter()
                        .filter(|msg| msg.is_plain_reply())
                        .filter(|msg| published_id.is_empty() || msg.id != published_id)
                        .find_map(&matcher);
                    if let Some(answer) = answer {
                        info!(answer = %answer, "Reply received");
                        return AskState::Responded(answer);
                    }
                }
                Err(e) => warn!(error = %e, "Poll failed, will retry"),
            }

            let elapsed = clock.instant().duration_since(started);
            let remaining = timeout.saturating_sub(elapsed);
            if remaining.is_zero() {
                return AskState::TimedOut;
            }
            debug!(remaining_secs = remaining.as_secs(), "Still waiting for reply");
            clock.sleep(self.poll_interval.min(remaining));
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(items: &[&str]) -> Vec<String> {
        to_strings(items)
    }

    #[test]
    fn test_match_reply_text_case_insensitive() {
        let options = opts(&["Yes", "No"]);
        assert_eq!(match_reply("yes", &options).as_deref(), Some("Yes"));
        assert_eq!(match_reply(" NO ", &options).as_deref(), Some("No"));
        assert_eq!(match_reply("maybe", &options), None);
        assert_eq!(match_reply("", &options), None);
    }

    #[test]
    fn test_match_reply_canonical_value() {
        let options = opts(&["Not now", "Ship it"]);
        assert_eq!(match_reply("NOT_NOW", &options).as_deref(), Some("Not now"));
        assert_eq!(match_reply("ship it", &options).as_deref(), Some("Ship it"));
    }

    #[test]
    fn test_match_reply_ordinal() {
        let options = opts(&["Yes", "No"]);
        assert_eq!(match_reply("1", &options).as_deref(), Some("Yes"));
        assert_eq!(match_reply("2", &options).as_deref(), Some("No"));
        assert_eq!(match_reply("0", &options), None);
        assert_eq!(match_reply("3", &options), None);
    }

    #[test]
    fn test_numeric_option_text_wins_over_ordinal() {
        let options = opts(&["2", "1"]);
        assert_eq!(match_reply("1", &options).as_deref(), Some("1"));
    }

    #[test]
    fn test_cancel_token_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_ask_state_response() {
        assert_eq!(AskState::Responded("Yes".into()).response().as_deref(), Some("Yes"));
        assert_eq!(AskState::TimedOut.response(), None);
        assert_eq!(AskState::Idle.response(), None);
    }
}
