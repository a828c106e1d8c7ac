//! 画像読み込みの再試行ポリシー

use std::time::Duration;

/// 線形バックオフ: n回目の再試行は `unit × n` 後
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self { max_attempts, unit }
    }

    /// `attempt` 回目（1始まり）の再試行までの待ち時間。上限超過なら None
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        Some(self.unit * attempt)
    }

    /// 全再試行の待ち時間
    pub fn schedule(&self) -> Vec<Duration> {
        (1..=self.max_attempts).filter_map(|a| self.delay_for(a)).collect()
    }
}
