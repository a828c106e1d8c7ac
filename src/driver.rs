//! 審核セッションとサーバーの仲介
//!
//! 仮書き込み → サーバー応答待ち → 確定 / 破棄。
//! 通信失敗はセッションの通知になり、ローカル状態は変わらない。

use crate::api::{ReviewApi, UploadOutcome};
use crate::error::{AppError, Result};
use calamine::{open_workbook, Reader, Xlsx};
use std::path::Path;
use store_review_common::{
    Clock, Error as CoreError, NoticeLevel, ReviewResult, ReviewSession, ReviewStats, SubmitStep, SystemClock,
};
use tracing::{debug, info, warn};

/// サーバー形式の時刻（確定時にローカルで付与）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// 操作の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// サーバーが受理し確定した
    Sent,
    /// 描述欄の表示切替のみ
    Toggled,
    /// 入力検証で拒否（通信なし）
    Rejected,
    /// 再描画で消えた項目など。何もしない
    Ignored,
    /// 通信・サーバーエラー。再試行可能
    Failed(String),
}

pub struct ReviewDriver<A: ReviewApi, C: Clock = SystemClock> {
    api: A,
    session: ReviewSession<C>,
}

impl<A: ReviewApi, C: Clock> ReviewDriver<A, C> {
    pub fn new(api: A, session: ReviewSession<C>) -> Self {
        Self { api, session }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn session(&self) -> &ReviewSession<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ReviewSession<C> {
        &mut self.session
    }

    /// オペレーターを切り替えて項目と判定を読み込み直す
    pub async fn load(&mut self, operator: Option<&str>) -> Result<()> {
        self.session.set_operator(operator);
        let operator = self.session.operator().map(str::to_string);

        let loaded = async {
            let items = self.api.list_items(operator.as_deref()).await?;
            let verdicts = self.api.list_reviews().await?;
            Ok::<_, AppError>((items, verdicts))
        }
        .await;

        match loaded {
            Ok((items, verdicts)) => {
                self.session.load(items, verdicts);
                Ok(())
            }
            Err(e) => {
                self.session.notify(NoticeLevel::Error, "加载数据失败，请刷新页面重试");
                Err(e)
            }
        }
    }

    /// 判定を送信する
    pub async fn submit(&mut self, item_id: &str, result: ReviewResult) -> Result<Outcome> {
        let ticket = match self.session.begin_submit(item_id, result) {
            Ok(SubmitStep::Staged(ticket)) => ticket,
            Ok(SubmitStep::Toggled) => return Ok(Outcome::Toggled),
            Err(CoreError::NotFound(_) | CoreError::InFlight(_)) => return Ok(Outcome::Ignored),
            Err(e) => return Err(e.into()),
        };

        match self.api.submit_verdict(item_id, result).await {
            Ok(()) => {
                self.session.confirm_submit(&ticket, &now_timestamp())?;
                info!(item_id, result = %result, "verdict confirmed");
                Ok(Outcome::Sent)
            }
            Err(e) => {
                warn!(item_id, error = %e, transient = e.is_transient(), "verdict submission failed");
                let reason = failure_reason(&e);
                self.session.abort_submit(&ticket, &reason);
                Ok(Outcome::Failed(reason))
            }
        }
    }

    /// 問題描述を保存する
    pub async fn save_remark(&mut self, item_id: &str, text: &str) -> Result<Outcome> {
        let ticket = match self.session.begin_remark(item_id, text) {
            Ok(ticket) => ticket,
            Err(CoreError::EmptyRemark) => return Ok(Outcome::Rejected),
            Err(CoreError::NotFound(id)) => {
                debug!(item_id = %id, "remark target has no verdict");
                return Ok(Outcome::Ignored);
            }
            Err(CoreError::InFlight(_)) => return Ok(Outcome::Ignored),
            Err(e) => return Err(e.into()),
        };

        match self.api.submit_remark(item_id, text.trim()).await {
            Ok(()) => {
                self.session.confirm_remark(&ticket, &now_timestamp())?;
                info!(item_id, "remark confirmed");
                Ok(Outcome::Sent)
            }
            Err(e) => {
                warn!(item_id, error = %e, transient = e.is_transient(), "remark submission failed");
                let reason = failure_reason(&e);
                self.session.abort_remark(&ticket, &reason);
                Ok(Outcome::Failed(reason))
            }
        }
    }

    /// サーバーの統計。取得できなければローカル計算
    pub async fn stats(&self) -> ReviewStats {
        match self.api.stats(self.session.operator()).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "stats endpoint failed, computing locally");
                self.session.stats()
            }
        }
    }

    /// 遅延再描画の処理
    pub fn tick(&mut self) -> bool {
        self.session.tick()
    }

    /// 新しい項目表で新周期を始める（全判定が消える）
    pub async fn upload_cycle(&mut self, file: &Path, operator: &str) -> Result<UploadOutcome> {
        let rows = check_workbook(file)?;
        info!(file = %file.display(), rows, "uploading item workbook");

        let outcome = match self.api.upload_items(file, operator).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.session.notify(NoticeLevel::Error, &format!("上传失败: {}", failure_reason(&e)));
                return Err(e);
            }
        };

        self.session.reset_cycle();
        let current = self.session.operator().map(str::to_string);
        self.load(current.as_deref()).await?;
        self.session.notify(NoticeLevel::Success, &outcome.message);
        Ok(outcome)
    }
}

/// サーバーの error 文言はそのまま、それ以外は表示用の文言
pub fn failure_reason(e: &AppError) -> String {
    match e {
        AppError::Api(message) => message.clone(),
        other => other.to_string(),
    }
}

/// アップロード前の確認: .xlsx で、先頭シートに見出し + 1行以上ある。データ行数を返す
pub fn check_workbook(file: &Path) -> Result<usize> {
    let is_xlsx = file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if !is_xlsx {
        return Err(AppError::InvalidUpload("只支持.xlsx文件".into()));
    }
    if !file.exists() {
        return Err(AppError::InvalidUpload(format!("ファイルが見つかりません: {}", file.display())));
    }

    let mut workbook: Xlsx<_> = open_workbook(file).map_err(|e: calamine::XlsxError| AppError::Workbook(e.to_string()))?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AppError::Workbook("シートがありません".into()))?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| AppError::Workbook(e.to_string()))?;

    let rows = range.height().saturating_sub(1);
    if rows == 0 {
        return Err(AppError::Workbook(format!("シート「{}」にデータ行がありません", first)));
    }
    Ok(rows)
}
