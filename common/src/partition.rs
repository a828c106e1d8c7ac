//! 未完了/完了の振り分けと表示ウィンドウ
//!
//! 未完了ウィンドウは先頭からN店舗だけを表示する。門店が完了すると
//! 次の再描画でフィルタから外れ、グループ化をやり直すことで
//! 次の未表示門店が自然に入ってくる（「次のページ」操作はない）。

use crate::completion::{group_by_store, StoreGroup};
use crate::types::{InspectionItem, StoreAggregate, ALL_OPERATORS};
use std::collections::HashSet;

/// 未完了ウィンドウの既定店舗数
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// 未完了ウィンドウ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingWindow {
    /// 表示する門店（グループ化した順）
    pub groups: Vec<StoreGroup>,
    /// ウィンドウ外で待機している門店数
    pub hidden_stores: usize,
}

impl PendingWindow {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// 表示中の全項目（カード順）
    pub fn items(&self) -> impl Iterator<Item = &InspectionItem> {
        self.groups.iter().flat_map(|g| g.items.iter())
    }
}

/// 完了門店と「現場結果なし」を除いた未完了ウィンドウ
pub fn pending_window(
    items: &[InspectionItem],
    completed: &[StoreAggregate],
    window_size: usize,
) -> PendingWindow {
    let completed_ids: HashSet<&str> = completed.iter().map(|s| s.store_id.as_str()).collect();

    let pending = items
        .iter()
        .filter(|i| !completed_ids.contains(i.store_id.as_str()))
        .filter(|i| !i.no_field_result);

    let mut groups = group_by_store(pending);
    let hidden_stores = groups.len().saturating_sub(window_size);
    groups.truncate(window_size);

    PendingWindow {
        groups,
        hidden_stores,
    }
}

/// 完了一覧（オペレーター指定時は担当分のみ）
pub fn completed_view<'a>(completed: &'a [StoreAggregate], operator: Option<&str>) -> Vec<&'a StoreAggregate> {
    completed
        .iter()
        .filter(|s| match operator {
            Some(op) if op != ALL_OPERATORS => s.operator == op,
            _ => true,
        })
        .collect()
}

/// 完全一致検索の結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub keyword: String,
    pub items: Vec<InspectionItem>,
}

impl SearchResult {
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// 件数ラベル
    pub fn label(&self) -> String {
        format!("搜索结果: {} 条", self.items.len())
    }
}

/// 門店ID・門店名の完全一致検索。完了状態とウィンドウを無視する。
/// 空のキーワードは検索なし（None）
pub fn exact_search(items: &[InspectionItem], keyword: &str) -> Option<SearchResult> {
    let keyword = keyword.trim();
    if keyword.is_empty() {
        return None;
    }

    let matched = items
        .iter()
        .filter(|i| i.store_id == keyword || i.store_name == keyword)
        .cloned()
        .collect();

    Some(SearchResult {
        keyword: keyword.to_string(),
        items: matched,
    })
}
