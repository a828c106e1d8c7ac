//! 参照画像の読み込み状態
//!
//! 失敗時は `RetryPolicy` に従って自動再試行し、上限に達したら
//! 手動再試行を待つ。実際の取得は呼び出し側が `FetchRequest` を受けて行い、
//! 結果を世代番号付きで返す。古い世代の結果は無視する。

use crate::clock::Clock;
use crate::retry::RetryPolicy;
use tracing::{debug, warn};

/// 読み込み状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// URLなし。取得しない
    Placeholder,
    /// 未開始
    Idle,
    Loading { attempt: u32 },
    /// 自動再試行待ち（`attempt` 回目を `due_ms` に発行する）
    WaitingRetry { attempt: u32, due_ms: u64 },
    Loaded,
    /// 自動再試行を使い切った
    Failed,
}

/// 取得要求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub generation: u64,
    /// 0 は初回、1.. は再試行回数
    pub attempt: u32,
}

pub struct ImageLoader<C: Clock> {
    url: Option<String>,
    policy: RetryPolicy,
    clock: C,
    state: LoadState,
    generation: u64,
}

/// キャッシュ回避用のトークンを付与する
pub fn cache_bust(url: &str, key: &str, ms: u64) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, sep, key, ms)
}

impl<C: Clock> ImageLoader<C> {
    /// `url` が None（または空）なら Placeholder
    pub fn new(url: Option<&str>, policy: RetryPolicy, clock: C) -> Self {
        let url = url.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string);
        let state = if url.is_some() {
            LoadState::Idle
        } else {
            LoadState::Placeholder
        };
        Self {
            url,
            policy,
            clock,
            state,
            generation: 0,
        }
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn is_placeholder(&self) -> bool {
        self.state == LoadState::Placeholder
    }

    /// 初回の取得要求（キャッシュ回避なし）
    pub fn start(&mut self) -> Option<FetchRequest> {
        if self.state != LoadState::Idle {
            return None;
        }
        let url = self.url.clone()?;
        Some(self.issue(url, 0))
    }

    /// 取得成功。古い世代なら false
    pub fn on_loaded(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = LoadState::Loaded;
        true
    }

    /// 取得失敗。次の再試行を予約するか Failed に移る
    pub fn on_failed(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        let LoadState::Loading { attempt } = self.state else {
            return false;
        };

        let next = attempt + 1;
        match self.policy.delay_for(next) {
            Some(delay) => {
                let due_ms = self.clock.now_ms() + delay.as_millis() as u64;
                debug!(url = ?self.url, attempt = next, delay_ms = delay.as_millis() as u64, "image retry scheduled");
                self.state = LoadState::WaitingRetry { attempt: next, due_ms };
            }
            None => {
                warn!(url = ?self.url, attempts = attempt, "image load failed");
                self.state = LoadState::Failed;
            }
        }
        true
    }

    /// 再試行の期限が来ていれば取得要求を返す
    pub fn poll(&mut self) -> Option<FetchRequest> {
        let LoadState::WaitingRetry { attempt, due_ms } = self.state else {
            return None;
        };
        let now = self.clock.now_ms();
        if now < due_ms {
            return None;
        }
        let url = cache_bust(self.url.as_deref()?, "retry", now);
        Some(self.issue(url, attempt))
    }

    /// 手動再試行。試行回数を0に戻し、待機中のタイマーは無効になる
    pub fn manual_retry(&mut self) -> Option<FetchRequest> {
        let base = self.url.clone()?;
        let url = cache_bust(&base, "manual", self.clock.now_ms());
        Some(self.issue(url, 0))
    }

    /// 次の再試行期限
    pub fn next_deadline(&self) -> Option<u64> {
        match self.state {
            LoadState::WaitingRetry { due_ms, .. } => Some(due_ms),
            _ => None,
        }
    }

    /// 次の再試行までの残り時間（ミリ秒）
    pub fn remaining_ms(&self) -> Option<u64> {
        self.next_deadline()
            .map(|due| due.saturating_sub(self.clock.now_ms()))
    }

    /// 表示用ラベル
    pub fn status_label(&self) -> String {
        match self.state {
            LoadState::Placeholder => "暂无图片".to_string(),
            LoadState::Idle | LoadState::Loading { attempt: 0 } => "加载中...".to_string(),
            LoadState::Loading { attempt } | LoadState::WaitingRetry { attempt, .. } => {
                format!("重试中 ({}/{})...", attempt, self.policy.max_attempts)
            }
            LoadState::Loaded => String::new(),
            LoadState::Failed => "图片加载失败，网络较慢，请稍后刷新".to_string(),
        }
    }

    fn issue(&mut self, url: String, attempt: u32) -> FetchRequest {
        self.generation += 1;
        self.state = LoadState::Loading { attempt };
        FetchRequest {
            url,
            generation: self.generation,
            attempt,
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        if generation != self.generation {
            debug!(generation, current = self.generation, "stale image result ignored");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn loader(url: Option<&str>) -> (ImageLoader<ManualClock>, ManualClock) {
        let clock = ManualClock::new(1_000);
        (ImageLoader::new(url, RetryPolicy::default(), clock.clone()), clock)
    }

    #[test]
    fn test_no_url_never_fetches() {
        let (mut l, _) = loader(None);
        assert!(l.is_placeholder());
        assert!(l.start().is_none());
        assert!(l.manual_retry().is_none());
        assert_eq!(l.status_label(), "暂无图片");

        let (blank, _) = loader(Some("  "));
        assert!(blank.is_placeholder());
    }

    #[test]
    fn test_failure_sequence_then_manual_retry() {
        let (mut l, clock) = loader(Some("https://img.example.com/a.jpg"));
        let first = l.start().unwrap();
        assert_eq!(first.url, "https://img.example.com/a.jpg");

        let mut current = first;
        for (attempt, delay) in [(1u32, 1_000u64), (2, 2_000), (3, 3_000)] {
            assert!(l.on_failed(current.generation));
            assert_eq!(l.status_label(), format!("重试中 ({}/3)...", attempt));

            clock.advance(delay - 1);
            assert!(l.poll().is_none());
            clock.advance(1);
            current = l.poll().expect("再試行の期限");
            assert_eq!(current.attempt, attempt);
            assert_eq!(
                current.url,
                format!("https://img.example.com/a.jpg?retry={}", clock.now_ms())
            );
        }

        assert!(l.on_failed(current.generation));
        assert_eq!(l.state(), LoadState::Failed);
        assert!(l.next_deadline().is_none());

        let manual = l.manual_retry().unwrap();
        assert_eq!(manual.attempt, 0);
        assert!(manual.url.contains("?manual="));

        // 手動再試行後は再び1秒から
        assert!(l.on_failed(manual.generation));
        assert_eq!(l.next_deadline(), Some(clock.now_ms() + 1_000));
        clock.advance(400);
        assert_eq!(l.remaining_ms(), Some(600));
    }

    #[test]
    fn test_manual_retry_invalidates_stale_results() {
        let (mut l, _) = loader(Some("https://img.example.com/a.jpg?w=200"));
        let first = l.start().unwrap();
        let manual = l.manual_retry().unwrap();
        assert!(manual.url.contains("?w=200&manual="));

        assert!(!l.on_failed(first.generation));
        assert!(!l.on_loaded(first.generation));
        assert!(l.on_loaded(manual.generation));
        assert_eq!(l.state(), LoadState::Loaded);
    }

    #[test]
    fn test_cache_bust_separator() {
        assert_eq!(cache_bust("http://a/b.png", "retry", 5), "http://a/b.png?retry=5");
        assert_eq!(cache_bust("http://a/b.png?x=1", "retry", 5), "http://a/b.png?x=1&retry=5");
    }
}
