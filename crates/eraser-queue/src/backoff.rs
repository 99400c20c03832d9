//! 指数退避策略
//!
//! 每次失败后 `next_attempt_at = now + delay(attempts)`，
//! 延迟按尝试次数单调不减，封顶于配置的最大间隔。

use std::time::Duration;

/// 退避策略（base * 2^(attempts-1)，封顶 max）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// 首次失败后的延迟
    pub base: Duration,
    /// 延迟上限
    pub max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(300),
        }
    }
}

impl BackoffPolicy {
    /// 第 `attempts` 次失败后的延迟（attempts 从 1 起）
    pub fn delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        let factor = 2u32.saturating_pow(exponent);
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = BackoffPolicy {
            base: Duration::from_secs(1),
            max: Duration::from_secs(8),
        };
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(policy.delay(4), Duration::from_secs(8));
        assert_eq!(policy.delay(5), Duration::from_secs(8));
        assert_eq!(policy.delay(60), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_is_monotone() {
        let policy = BackoffPolicy::default();
        let mut last = Duration::ZERO;
        for attempts in 1..64 {
            let delay = policy.delay(attempts);
            assert!(delay >= last, "backoff decreased at attempt {attempts}");
            last = delay;
        }
    }
}
