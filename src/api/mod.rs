//! 審核サーバーAPI
//!
//! エンジンからは不透明な要求/応答の境界として扱う。失敗は通信エラーも
//! サーバーの success=false も同じ `AppError` として返す。

pub mod http;

pub use http::HttpReviewApi;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use store_review_common::{
    FilterOptions, InspectionItem, ResultPage, ReviewResult, ReviewStats, ReviewVerdict, SearchFilters,
};

/// 新周期アップロードの結果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOutcome {
    pub message: String,
    pub total_items: usize,
}

#[async_trait]
pub trait ReviewApi: Send + Sync {
    async fn list_operators(&self) -> Result<Vec<String>>;

    /// `operator` が None なら全件
    async fn list_items(&self, operator: Option<&str>) -> Result<Vec<InspectionItem>>;

    async fn list_reviews(&self) -> Result<Vec<ReviewVerdict>>;

    async fn submit_verdict(&self, item_id: &str, result: ReviewResult) -> Result<()>;

    async fn submit_remark(&self, item_id: &str, remark: &str) -> Result<()>;

    async fn stats(&self, operator: Option<&str>) -> Result<ReviewStats>;

    /// サーバー生成のCSV（BOM付き）
    async fn export_csv(&self) -> Result<Vec<u8>>;

    /// 新しい項目表をアップロードして新周期を開始する（全判定が消える）
    async fn upload_items(&self, file: &Path, operator: &str) -> Result<UploadOutcome>;

    async fn filter_options(&self) -> Result<FilterOptions>;

    async fn provinces(&self, war_zone: &str) -> Result<Vec<String>>;

    async fn cities(&self, province: &str) -> Result<Vec<String>>;

    async fn search(&self, filters: &SearchFilters) -> Result<ResultPage>;
}
