//! 发送限流 - 两次发送之间的冷却时间 + 每分钟上限
//!
//! 状态只在进程内存中，不跨进程共享。计数只在发送成功后更新。

use std::time::{Duration, Instant};

use crate::config::RateLimitConfig;

const MINUTE: Duration = Duration::from_secs(60);

/// 限流判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateDecision {
    Allowed,
    /// 需要等待的时长
    Wait(Duration),
}

/// 发送限流器
#[derive(Debug)]
pub struct RateLimiter {
    last_send: Option<Instant>,
    minute_start: Option<Instant>,
    sent_this_minute: u32,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            last_send: None,
            minute_start: None,
            sent_this_minute: 0,
        }
    }

    /// 检查当前是否允许发送
    ///
    /// 配置每次调用时传入，因为配置文件可能在两次调用之间被修改。
    pub fn check(&mut self, config: &RateLimitConfig, now: Instant) -> RateDecision {
        if !config.enabled {
            return RateDecision::Allowed;
        }

        // 分钟窗口过期则重置计数
        match self.minute_start {
            Some(start) if now.duration_since(start) <= MINUTE => {}
            _ => {
                self.minute_start = Some(now);
                self.sent_this_minute = 0;
            }
        }

        let cooldown = Duration::from_secs_f64(config.cooldown_seconds.max(0.0));
        if let Some(last) = self.last_send {
            let since_last = now.duration_since(last);
            if since_last < cooldown {
                return RateDecision::Wait(cooldown - since_last);
            }
        }

        if self.sent_this_minute >= config.max_per_minute {
            let elapsed = self
                .minute_start
                .map(|start| now.duration_since(start))
                .unwrap_or_default();
            return RateDecision::Wait(MINUTE.saturating_sub(elapsed));
        }

        RateDecision::Allowed
    }

    /// 记录一次成功发送
    pub fn record_send(&mut self, now: Instant) {
        self.last_send = Some(now);
        if self.minute_start.is_none() {
            self.minute_start = Some(now);
        }
        self.sent_this_minute += 1;
    }

    pub fn sent_this_minute(&self) -> u32 {
        self.sent_this_minute
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_per_minute: u32, cooldown_seconds: f64) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            max_per_minute,
            cooldown_seconds,
        }
    }

    #[test]
    fn test_first_send_allowed() {
        let mut limiter = RateLimiter::new();
        assert_eq!(limiter.check(&config(10, 5.0), Instant::now()), RateDecision::Allowed);
    }

    #[test]
    fn test_cooldown_between_sends() {
        let mut limiter = RateLimiter::new();
        let cfg = config(10, 5.0);
        let t0 = Instant::now();

        limiter.record_send(t0);

        match limiter.check(&cfg, t0 + Duration::from_secs(2)) {
            RateDecision::Wait(wait) => assert_eq!(wait, Duration::from_secs(3)),
            other => panic!("expected wait, got {:?}", other),
        }
        assert_eq!(limiter.check(&cfg, t0 + Duration::from_secs(5)), RateDecision::Allowed);
    }

    #[test]
    fn test_per_minute_cap() {
        let mut limiter = RateLimiter::new();
        let cfg = config(2, 0.0);
        let t0 = Instant::now();

        assert_eq!(limiter.check(&cfg, t0), RateDecision::Allowed);
        limiter.record_send(t0);
        limiter.record_send(t0 + Duration::from_secs(1));

        match limiter.check(&cfg, t0 + Duration::from_secs(10)) {
            RateDecision::Wait(wait) => assert_eq!(wait, Duration::from_secs(50)),
            other => panic!("expected wait, got {:?}", other),
        }

        // 新的一分钟重新计数
        assert_eq!(limiter.check(&cfg, t0 + Duration::from_secs(61)), RateDecision::Allowed);
        assert_eq!(limiter.sent_this_minute(), 0);
    }

    #[test]
    fn test_disabled_always_allows() {
        let mut limiter = RateLimiter::new();
        let cfg = RateLimitConfig {
            enabled: false,
            ..config(0, 100.0)
        };
        let t0 = Instant::now();
        limiter.record_send(t0);
        assert_eq!(limiter.check(&cfg, t0), RateDecision::Allowed);
    }
}
