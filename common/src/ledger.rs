//! 審核結果のローカルミラー
//!
//! サーバーで確定した判定と、送信中の仮書き込みを分けて保持する。
//! 完了判定が参照するのは確定済みの判定のみ。

use crate::error::{Error, Result};
use crate::types::{ReviewResult, ReviewVerdict};
use std::collections::HashMap;
use tracing::debug;

/// 仮書き込みの識別子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    id: u64,
    item_id: String,
}

impl Ticket {
    pub fn item_id(&self) -> &str {
        &self.item_id
    }
}

/// 仮書き込みの内容
#[derive(Debug, Clone, PartialEq)]
pub enum TentativeWrite {
    Result(ReviewResult),
    Remark(String),
}

#[derive(Debug, Default, Clone)]
pub struct LedgerMirror {
    confirmed: HashMap<String, ReviewVerdict>,
    tentative: HashMap<String, (u64, TentativeWrite)>,
    next_ticket: u64,
}

impl LedgerMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// サーバーから取得した一覧で置き換える
    pub fn replace_all(&mut self, verdicts: Vec<ReviewVerdict>) {
        self.confirmed = verdicts
            .into_iter()
            .map(|v| (v.item_id.clone(), v))
            .collect();
        self.tentative.clear();
    }

    /// 新しい審核周期の開始
    pub fn clear(&mut self) {
        self.confirmed.clear();
        self.tentative.clear();
    }

    pub fn confirmed(&self, item_id: &str) -> Option<&ReviewVerdict> {
        self.confirmed.get(item_id)
    }

    pub fn tentative(&self, item_id: &str) -> Option<&TentativeWrite> {
        self.tentative.get(item_id).map(|(_, w)| w)
    }

    /// 確定済みの判定件数
    pub fn reviewed_count(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }

    pub fn verdicts(&self) -> impl Iterator<Item = &ReviewVerdict> {
        self.confirmed.values()
    }

    /// 判定の仮書き込み。同じ項目の未確定書き込みは置き換える
    pub fn stage_result(&mut self, item_id: &str, result: ReviewResult) -> Ticket {
        self.stage(item_id, TentativeWrite::Result(result))
    }

    /// 問題描述の仮書き込み。確定済みの判定がなければ NotFound
    pub fn stage_remark(&mut self, item_id: &str, remark: &str) -> Result<Ticket> {
        if !self.confirmed.contains_key(item_id) {
            return Err(Error::NotFound(item_id.to_string()));
        }
        Ok(self.stage(item_id, TentativeWrite::Remark(remark.to_string())))
    }

    fn stage(&mut self, item_id: &str, write: TentativeWrite) -> Ticket {
        self.next_ticket += 1;
        let id = self.next_ticket;
        self.tentative.insert(item_id.to_string(), (id, write));
        Ticket {
            id,
            item_id: item_id.to_string(),
        }
    }

    /// サーバー応答後に仮書き込みを確定する
    pub fn confirm(&mut self, ticket: &Ticket, timestamp: &str) -> Result<&ReviewVerdict> {
        if !self.holds(ticket) {
            return Err(Error::UnknownTicket(ticket.id));
        }
        let (_, write) = self
            .tentative
            .remove(&ticket.item_id)
            .ok_or(Error::UnknownTicket(ticket.id))?;

        match write {
            TentativeWrite::Result(result) => {
                // サーバー側は判定送信時に問題描述をリセットする
                let verdict = ReviewVerdict {
                    item_id: ticket.item_id.clone(),
                    result,
                    remark: String::new(),
                    reviewed_at: timestamp.to_string(),
                };
                self.confirmed.insert(ticket.item_id.clone(), verdict);
            }
            TentativeWrite::Remark(remark) => {
                let verdict = self
                    .confirmed
                    .get_mut(&ticket.item_id)
                    .ok_or_else(|| Error::NotFound(ticket.item_id.clone()))?;
                verdict.remark = remark;
                verdict.reviewed_at = timestamp.to_string();
            }
        }

        debug!(item_id = %ticket.item_id, ticket = ticket.id, "ledger write confirmed");
        self.confirmed
            .get(&ticket.item_id)
            .ok_or_else(|| Error::NotFound(ticket.item_id.clone()))
    }

    /// 送信失敗時に仮書き込みを破棄する。置き換え済みなら false
    pub fn rollback(&mut self, ticket: &Ticket) -> bool {
        if !self.holds(ticket) {
            return false;
        }
        self.tentative.remove(&ticket.item_id);
        debug!(item_id = %ticket.item_id, ticket = ticket.id, "ledger write rolled back");
        true
    }

    /// チケットが現在の仮書き込みを指しているか
    fn holds(&self, ticket: &Ticket) -> bool {
        matches!(self.tentative.get(&ticket.item_id), Some((id, _)) if *id == ticket.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_is_invisible_until_confirmed() {
        let mut ledger = LedgerMirror::new();
        let ticket = ledger.stage_result("a", ReviewResult::Pass);

        assert!(ledger.confirmed("a").is_none());
        assert_eq!(
            ledger.tentative("a"),
            Some(&TentativeWrite::Result(ReviewResult::Pass))
        );

        ledger.confirm(&ticket, "2025-03-01 10:00:00").expect("確定失敗");
        let verdict = ledger.confirmed("a").expect("判定なし");
        assert_eq!(verdict.result, ReviewResult::Pass);
        assert_eq!(verdict.reviewed_at, "2025-03-01 10:00:00");
        assert!(ledger.tentative("a").is_none());
    }

    #[test]
    fn test_rollback_leaves_confirmed_untouched() {
        let mut ledger = LedgerMirror::new();
        let first = ledger.stage_result("a", ReviewResult::Pass);
        ledger.confirm(&first, "t1").unwrap();

        let second = ledger.stage_result("a", ReviewResult::Fail);
        assert!(ledger.rollback(&second));
        assert_eq!(ledger.confirmed("a").unwrap().result, ReviewResult::Pass);
        assert!(ledger.tentative("a").is_none());
    }

    #[test]
    fn test_superseded_ticket_cannot_confirm() {
        let mut ledger = LedgerMirror::new();
        let old = ledger.stage_result("a", ReviewResult::Pass);
        let new = ledger.stage_result("a", ReviewResult::Fail);

        assert!(matches!(ledger.confirm(&old, "t"), Err(Error::UnknownTicket(_))));
        assert!(!ledger.rollback(&old));
        ledger.confirm(&new, "t").unwrap();
        assert_eq!(ledger.confirmed("a").unwrap().result, ReviewResult::Fail);
    }

    #[test]
    fn test_remark_requires_confirmed_verdict() {
        let mut ledger = LedgerMirror::new();
        assert!(matches!(
            ledger.stage_remark("missing", "x"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_remark_updates_timestamp() {
        let mut ledger = LedgerMirror::new();
        let t = ledger.stage_result("a", ReviewResult::Fail);
        ledger.confirm(&t, "2025-03-01 10:00:00").unwrap();
        assert_eq!(ledger.confirmed("a").unwrap().remark, "");

        let t = ledger.stage_remark("a", "封条破损").unwrap();
        ledger.confirm(&t, "2025-03-01 10:05:00").unwrap();

        let verdict = ledger.confirmed("a").unwrap();
        assert_eq!(verdict.remark, "封条破损");
        assert_eq!(verdict.reviewed_at, "2025-03-01 10:05:00");
    }

    #[test]
    fn test_pass_twice_is_idempotent() {
        let mut once = LedgerMirror::new();
        let t = once.stage_result("a", ReviewResult::Pass);
        once.confirm(&t, "ts").unwrap();

        let mut twice = LedgerMirror::new();
        for _ in 0..2 {
            let t = twice.stage_result("a", ReviewResult::Pass);
            twice.confirm(&t, "ts").unwrap();
        }

        assert_eq!(once.confirmed("a"), twice.confirmed("a"));
        assert_eq!(once.reviewed_count(), twice.reviewed_count());
    }

    #[test]
    fn test_replace_all_drops_tentative_writes() {
        let mut ledger = LedgerMirror::new();
        ledger.stage_result("a", ReviewResult::Pass);
        ledger.replace_all(vec![ReviewVerdict::new("b", ReviewResult::Fail)]);

        assert!(ledger.tentative("a").is_none());
        assert_eq!(ledger.reviewed_count(), 1);
        ledger.clear();
        assert!(ledger.is_empty());
    }
}
