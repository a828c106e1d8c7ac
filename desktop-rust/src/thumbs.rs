//! カードごとの参照画像の読み込み状態
//!
//! 取得要求を出すのは表示中のカードだけ。テクスチャはUI側が持つ。

use std::collections::HashMap;

use store_review_common::{Clock, FetchRequest, ImageLoader, LoadState, RetryPolicy};

pub struct ThumbBook<C: Clock + Clone> {
    policy: RetryPolicy,
    clock: C,
    slots: HashMap<String, ImageLoader<C>>,
}

impl<C: Clock + Clone> ThumbBook<C> {
    pub fn new(policy: RetryPolicy, clock: C) -> Self {
        Self {
            policy,
            clock,
            slots: HashMap::new(),
        }
    }

    /// 初めて表示されたカードなら初回の取得要求を返す
    pub fn ensure(&mut self, item_id: &str, url: Option<&str>) -> Option<FetchRequest> {
        let loader = self
            .slots
            .entry(item_id.to_string())
            .or_insert_with(|| ImageLoader::new(url, self.policy, self.clock.clone()));
        loader.start()
    }

    /// 期限の来た再試行
    pub fn due_retries(&mut self) -> Vec<(String, FetchRequest)> {
        self.slots
            .iter_mut()
            .filter_map(|(id, loader)| loader.poll().map(|req| (id.clone(), req)))
            .collect()
    }

    /// 成功を反映する。古い世代なら false（テクスチャを作らない）
    pub fn loaded(&mut self, item_id: &str, generation: u64) -> bool {
        self.slots
            .get_mut(item_id)
            .map(|l| l.on_loaded(generation))
            .unwrap_or(false)
    }

    pub fn failed(&mut self, item_id: &str, generation: u64) {
        if let Some(loader) = self.slots.get_mut(item_id) {
            loader.on_failed(generation);
        }
    }

    pub fn manual_retry(&mut self, item_id: &str) -> Option<FetchRequest> {
        self.slots.get_mut(item_id)?.manual_retry()
    }

    pub fn state(&self, item_id: &str) -> Option<LoadState> {
        self.slots.get(item_id).map(|l| l.state())
    }

    pub fn label(&self, item_id: &str) -> String {
        self.slots
            .get(item_id)
            .map(|l| l.status_label())
            .unwrap_or_else(|| "加载中...".to_string())
    }

    /// 一番近い再試行までの残り時間
    pub fn next_wakeup_ms(&self) -> Option<u64> {
        self.slots.values().filter_map(|l| l.remaining_ms()).min()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}
