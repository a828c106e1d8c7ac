//! 審核セッション状態
//!
//! 項目スナップショット・結果ミラー・フィルタ・検索・開いている描述欄を
//! 一つの状態オブジェクトにまとめる。書き込みは単一のイベント列からのみ行い、
//! 表示層は `view_model()` と `drain_events()` を購読する。
//!
//! 送信は二段階: `begin_*` で仮書き込み → サーバー応答後 `confirm_*` か `abort_*`

use crate::clock::Clock;
use crate::completion::{completion_stats, evaluate, is_store_complete};
use crate::error::{Error, Result};
use crate::ledger::{LedgerMirror, Ticket};
use crate::partition::{completed_view, exact_search, pending_window, DEFAULT_WINDOW_SIZE};
use crate::review::{plan_submit, reevaluate_after_verdict, validate_remark, ItemReviewState, SubmitPlan};
use crate::types::{InspectionItem, ReviewResult, ReviewStats, ReviewVerdict, StoreAggregate, ALL_OPERATORS};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, info};

/// セッション設定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// 未完了ウィンドウの店舗数
    pub window_size: usize,
    /// 門店完了から再描画までの遅延（0なら即時）
    pub completion_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            completion_delay: Duration::from_millis(500),
        }
    }
}

/// 表示中のタブ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Pending,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// 表示層へ通知するイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// 一時的な通知
    Notice { level: NoticeLevel, message: String },
    /// 門店が完了した（再描画は遅延後）
    StoreCompleted { store_id: String, store_name: String },
    /// 完了一覧を再計算した
    Rerendered,
}

/// 判定ボタン押下の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStep {
    /// 仮書き込み済み。サーバーへ送信する
    Staged(Ticket),
    /// 描述欄の表示切替のみ
    Toggled,
}

/// カード1枚分の表示情報
#[derive(Debug, Clone, PartialEq)]
pub struct ItemCard {
    pub item: InspectionItem,
    pub verdict: Option<ReviewVerdict>,
    pub state: ItemReviewState,
    pub editor_open: bool,
    /// 送信中（ボタンを無効化する）
    pub in_flight: bool,
}

/// 門店カード
#[derive(Debug, Clone, PartialEq)]
pub struct StoreCard {
    pub store_id: String,
    pub store_name: String,
    pub operator: String,
    /// 完了済みで遅延再描画を待っている
    pub exiting: bool,
    pub items: Vec<ItemCard>,
}

/// 表示層が描画するスナップショット
#[derive(Debug, Clone, PartialEq)]
pub enum ViewModel {
    Pending {
        stores: Vec<StoreCard>,
        hidden_stores: usize,
    },
    Completed {
        stores: Vec<StoreAggregate>,
    },
    Search {
        keyword: String,
        label: String,
        items: Vec<ItemCard>,
    },
}

impl ViewModel {
    /// キーボード操作の対象となるカード（未完了ウィンドウのみ、表示順）
    pub fn pending_card_ids(&self) -> Vec<String> {
        match self {
            ViewModel::Pending { stores, .. } => stores
                .iter()
                .flat_map(|s| s.items.iter().map(|c| c.item.id.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduledRender {
    store_id: String,
    due_ms: u64,
}

pub struct ReviewSession<C: Clock> {
    clock: C,
    config: SessionConfig,
    items: Vec<InspectionItem>,
    ledger: LedgerMirror,
    operator: Option<String>,
    view: View,
    search: Option<String>,
    /// 描述欄の表示を既定から反転させている項目
    toggled_editors: HashSet<String>,
    completed: Vec<StoreAggregate>,
    scheduled: Vec<ScheduledRender>,
    events: VecDeque<SessionEvent>,
    revision: u64,
}

impl<C: Clock> ReviewSession<C> {
    pub fn new(clock: C, config: SessionConfig) -> Self {
        Self {
            clock,
            config,
            items: Vec::new(),
            ledger: LedgerMirror::new(),
            operator: None,
            view: View::Pending,
            search: None,
            toggled_editors: HashSet::new(),
            completed: Vec::new(),
            scheduled: Vec::new(),
            events: VecDeque::new(),
            revision: 0,
        }
    }

    /// 項目と判定一覧を読み込み、完了一覧を計算し直す
    pub fn load(&mut self, items: Vec<InspectionItem>, verdicts: Vec<ReviewVerdict>) {
        self.items = items;
        self.ledger.replace_all(verdicts);
        self.toggled_editors.clear();
        self.scheduled.clear();
        self.completed = evaluate(&self.items, &self.ledger);
        info!(
            items = self.items.len(),
            reviewed = self.ledger.reviewed_count(),
            completed = self.completed.len(),
            "session loaded"
        );
        self.touch();
    }

    /// 新しい審核周期（全判定がサーバー側で消去された後）
    pub fn reset_cycle(&mut self) {
        self.items.clear();
        self.ledger.clear();
        self.toggled_editors.clear();
        self.scheduled.clear();
        self.completed.clear();
        self.search = None;
        self.touch();
    }

    pub fn items(&self) -> &[InspectionItem] {
        &self.items
    }

    pub fn item(&self, item_id: &str) -> Option<&InspectionItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn ledger(&self) -> &LedgerMirror {
        &self.ledger
    }

    pub fn completed(&self) -> &[StoreAggregate] {
        &self.completed
    }

    pub fn operator(&self) -> Option<&str> {
        self.operator.as_deref()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn search_keyword(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 観測可能な変化のたびに増える
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// オペレーター変更（検索は解除）。「全部」はフィルタなし
    pub fn set_operator(&mut self, operator: Option<&str>) {
        self.operator = operator
            .map(str::trim)
            .filter(|op| !op.is_empty() && *op != ALL_OPERATORS)
            .map(str::to_string);
        self.search = None;
        self.touch();
    }

    /// タブ切替（検索は解除）
    pub fn switch_view(&mut self, view: View) {
        self.view = view;
        self.search = None;
        self.touch();
    }

    /// 完全一致検索。空のキーワードは検索解除
    pub fn set_search(&mut self, keyword: &str) {
        let keyword = keyword.trim();
        self.search = if keyword.is_empty() {
            None
        } else {
            Some(keyword.to_string())
        };
        self.touch();
    }

    pub fn clear_search(&mut self) {
        self.set_search("");
    }

    /// 描述待ちの不合格は既定で開いている
    pub fn is_editor_open(&self, item_id: &str) -> bool {
        let awaiting_remark =
            ItemReviewState::from_verdict(self.ledger.confirmed(item_id)) == ItemReviewState::FailPendingRemark;
        awaiting_remark != self.toggled_editors.contains(item_id)
    }

    /// 判定ボタン押下。既存の描述がある「不合格」は表示切替のみ
    pub fn begin_submit(&mut self, item_id: &str, result: ReviewResult) -> Result<SubmitStep> {
        self.require_item(item_id)?;

        match plan_submit(result, self.ledger.confirmed(item_id)) {
            SubmitPlan::ToggleEditor => {
                self.toggle_editor(item_id);
                Ok(SubmitStep::Toggled)
            }
            SubmitPlan::Send(result) => {
                self.require_idle(item_id)?;
                let ticket = self.ledger.stage_result(item_id, result);
                self.touch();
                Ok(SubmitStep::Staged(ticket))
            }
        }
    }

    /// サーバーが判定を受理した
    pub fn confirm_submit(&mut self, ticket: &Ticket, timestamp: &str) -> Result<()> {
        let result = self.ledger.confirm(ticket, timestamp)?.result;
        let item_id = ticket.item_id().to_string();

        // 合格は閉じ、不合格は描述待ちとして既定どおり開く
        self.toggled_editors.remove(&item_id);
        self.notice(NoticeLevel::Success, &format!("审核成功: {}", result));

        if let Some(store_id) = self.store_of(&item_id) {
            if self.is_listed_complete(&store_id) {
                // 完了一覧での編集は即時に反映する
                self.rerender();
            } else if reevaluate_after_verdict(result) {
                self.check_store_completion(&store_id);
            } else {
                self.unschedule(&store_id);
            }
        }
        self.touch();
        Ok(())
    }

    /// 送信失敗。ローカル状態は変えずに通知のみ
    pub fn abort_submit(&mut self, ticket: &Ticket, reason: &str) {
        self.ledger.rollback(ticket);
        self.notice(NoticeLevel::Error, &format!("提交失败: {}", reason));
        self.touch();
    }

    /// 問題描述の保存開始。空なら通知してネットワークには出さない
    pub fn begin_remark(&mut self, item_id: &str, text: &str) -> Result<Ticket> {
        self.require_item(item_id)?;
        self.require_idle(item_id)?;

        let remark = match validate_remark(text) {
            Ok(remark) => remark,
            Err(e) => {
                self.notice(NoticeLevel::Warning, "请输入问题描述");
                self.touch();
                return Err(e);
            }
        };
        let ticket = self.ledger.stage_remark(item_id, &remark)?;
        self.touch();
        Ok(ticket)
    }

    /// サーバーが問題描述を受理した
    pub fn confirm_remark(&mut self, ticket: &Ticket, timestamp: &str) -> Result<()> {
        self.ledger.confirm(ticket, timestamp)?;
        let item_id = ticket.item_id().to_string();
        self.toggled_editors.remove(&item_id);
        self.notice(NoticeLevel::Success, "问题描述已保存");

        if let Some(store_id) = self.store_of(&item_id) {
            if self.is_listed_complete(&store_id) {
                self.rerender();
            } else {
                self.check_store_completion(&store_id);
            }
        }
        self.touch();
        Ok(())
    }

    pub fn abort_remark(&mut self, ticket: &Ticket, reason: &str) {
        self.ledger.rollback(ticket);
        self.notice(NoticeLevel::Error, &format!("保存失败: {}", reason));
        self.touch();
    }

    /// 期限の来た遅延再描画を処理する。再描画したら true
    pub fn tick(&mut self) -> bool {
        let now = self.clock.now_ms();
        let (due, waiting): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.scheduled).into_iter().partition(|s| s.due_ms <= now);
        self.scheduled = waiting;
        if due.is_empty() {
            return false;
        }
        for render in &due {
            if is_store_complete(&render.store_id, &self.items, &self.ledger) {
                self.announce_completion(&render.store_id);
            }
        }
        self.rerender();
        true
    }

    /// 次の遅延再描画の期限
    pub fn next_deadline(&self) -> Option<u64> {
        self.scheduled.iter().map(|s| s.due_ms).min()
    }

    /// 門店単位の統計（ローカル計算）
    pub fn stats(&self) -> ReviewStats {
        completion_stats(&self.items, &self.ledger, self.operator.as_deref())
    }

    pub fn view_model(&self) -> ViewModel {
        if let Some(keyword) = &self.search {
            let result = exact_search(&self.items, keyword).unwrap_or_default();
            return ViewModel::Search {
                keyword: keyword.clone(),
                label: result.label(),
                items: result.items.iter().map(|i| self.card(i)).collect(),
            };
        }

        match self.view {
            View::Pending => {
                let window = pending_window(&self.items, &self.completed, self.config.window_size);
                let stores = window
                    .groups
                    .iter()
                    .map(|g| StoreCard {
                        store_id: g.store_id.clone(),
                        store_name: g.store_name.clone(),
                        operator: g.operator.clone(),
                        exiting: self.is_exiting(&g.store_id),
                        items: g.items.iter().map(|i| self.card(i)).collect(),
                    })
                    .collect();
                ViewModel::Pending {
                    stores,
                    hidden_stores: window.hidden_stores,
                }
            }
            View::Completed => ViewModel::Completed {
                stores: completed_view(&self.completed, self.operator.as_deref())
                    .into_iter()
                    .cloned()
                    .collect(),
            },
        }
    }

    fn card(&self, item: &InspectionItem) -> ItemCard {
        let verdict = self.ledger.confirmed(&item.id).cloned();
        ItemCard {
            state: ItemReviewState::from_verdict(verdict.as_ref()),
            verdict,
            editor_open: self.is_editor_open(&item.id),
            in_flight: self.ledger.tentative(&item.id).is_some(),
            item: item.clone(),
        }
    }

    fn require_item(&self, item_id: &str) -> Result<()> {
        if self.item(item_id).is_none() {
            // 再描画で消えたカードへの操作は無視する
            debug!(item_id, "stale card reference ignored");
            return Err(Error::NotFound(item_id.to_string()));
        }
        Ok(())
    }

    fn require_idle(&self, item_id: &str) -> Result<()> {
        if self.ledger.tentative(item_id).is_some() {
            debug!(item_id, "write already in flight");
            return Err(Error::InFlight(item_id.to_string()));
        }
        Ok(())
    }

    fn toggle_editor(&mut self, item_id: &str) {
        if !self.toggled_editors.remove(item_id) {
            self.toggled_editors.insert(item_id.to_string());
        }
        self.touch();
    }

    fn store_of(&self, item_id: &str) -> Option<String> {
        self.item(item_id).map(|i| i.store_id.clone())
    }

    fn is_listed_complete(&self, store_id: &str) -> bool {
        self.completed.iter().any(|s| s.store_id == store_id)
    }

    fn is_exiting(&self, store_id: &str) -> bool {
        self.scheduled.iter().any(|s| s.store_id == store_id)
            && is_store_complete(store_id, &self.items, &self.ledger)
    }

    /// 遅延中に未完了へ戻った門店は再描画の予定から外す
    fn unschedule(&mut self, store_id: &str) {
        let before = self.scheduled.len();
        self.scheduled.retain(|s| s.store_id != store_id);
        if self.scheduled.len() != before {
            debug!(store_id, "store no longer complete, completion cancelled");
        }
    }

    fn check_store_completion(&mut self, store_id: &str) {
        if !is_store_complete(store_id, &self.items, &self.ledger) {
            self.unschedule(store_id);
            return;
        }
        if self.scheduled.iter().any(|s| s.store_id == store_id) {
            return;
        }

        if self.config.completion_delay.is_zero() {
            self.announce_completion(store_id);
            self.rerender();
        } else {
            let due_ms = self.clock.now_ms() + self.config.completion_delay.as_millis() as u64;
            self.scheduled.push(ScheduledRender {
                store_id: store_id.to_string(),
                due_ms,
            });
        }
    }

    fn announce_completion(&mut self, store_id: &str) {
        let store_name = self
            .items
            .iter()
            .find(|i| i.store_id == store_id)
            .map(|i| i.store_name.clone())
            .unwrap_or_default();
        info!(store_id, store_name = %store_name, "store review completed");
        self.notice(NoticeLevel::Success, &format!("门店 {} 已完成审核", store_name));
        self.events.push_back(SessionEvent::StoreCompleted {
            store_id: store_id.to_string(),
            store_name,
        });
    }

    fn rerender(&mut self) {
        self.completed = evaluate(&self.items, &self.ledger);
        self.events.push_back(SessionEvent::Rerendered);
        self.touch();
    }

    /// 外部（通信層など）からの通知
    pub fn notify(&mut self, level: NoticeLevel, message: &str) {
        self.notice(level, message);
        self.touch();
    }

    fn notice(&mut self, level: NoticeLevel, message: &str) {
        self.events.push_back(SessionEvent::Notice {
            level,
            message: message.to_string(),
        });
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}
