//! 項目ごとの審核状態遷移
//!
//! 未審核 → 合格（終端）
//! 未審核 → 不合格・描述待ち → 不合格・完了

use crate::error::{Error, Result};
use crate::types::{ReviewResult, ReviewVerdict};

/// 項目の審核状態（確定済みの判定から導出）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemReviewState {
    Unreviewed,
    Pass,
    FailPendingRemark,
    FailComplete,
}

impl ItemReviewState {
    pub fn from_verdict(verdict: Option<&ReviewVerdict>) -> Self {
        match verdict {
            None => ItemReviewState::Unreviewed,
            Some(v) => match v.result {
                ReviewResult::Pass => ItemReviewState::Pass,
                ReviewResult::Fail if v.has_remark() => ItemReviewState::FailComplete,
                ReviewResult::Fail => ItemReviewState::FailPendingRemark,
            },
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, ItemReviewState::Pass | ItemReviewState::FailComplete)
    }
}

/// 判定ボタン押下時の動作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPlan {
    /// サーバーへ送信する
    Send(ReviewResult),
    /// 描述入力欄の表示切替のみ（再送しない）
    ToggleEditor,
}

/// 既に描述がある不合格項目への「不合格」は表示切替だけ
pub fn plan_submit(result: ReviewResult, confirmed: Option<&ReviewVerdict>) -> SubmitPlan {
    match (result, confirmed) {
        (ReviewResult::Fail, Some(v)) if v.result == ReviewResult::Fail && v.has_remark() => {
            SubmitPlan::ToggleEditor
        }
        _ => SubmitPlan::Send(result),
    }
}

/// 確定後に門店の完了判定を走らせるか（不合格は描述を待つ）
pub fn reevaluate_after_verdict(result: ReviewResult) -> bool {
    result == ReviewResult::Pass
}

/// 問題描述の検証。前後の空白を除き、空ならエラー
pub fn validate_remark(text: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyRemark);
    }
    Ok(trimmed.to_string())
}
