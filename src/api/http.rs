//! reqwest による ReviewApi 実装

use super::{ReviewApi, UploadOutcome};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use store_review_common::{
    FilterOptions, InspectionItem, ResultPage, ReviewResult, ReviewStats, ReviewVerdict, SearchFilters,
    ALL_OPERATORS,
};
use tracing::{debug, warn};

pub struct HttpReviewApi {
    client: Client,
    base_url: String,
}

impl HttpReviewApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<(StatusCode, String)> {
        let response = self.client.get(self.url(path)).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(path, status = status.as_u16(), "GET");
        Ok((status, body))
    }

    /// 成否フラグのない一覧系エンドポイント
    async fn get_plain<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let (status, body) = self.get_text(path, query).await?;
        if !status.is_success() {
            return Err(AppError::Api(error_message(status, &body)));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// `{success, data}` 形式のエンドポイント
    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let (status, body) = self.get_text(path, query).await?;
        let value = check_success(status, &body)?;
        Ok(serde_json::from_value(value.get("data").cloned().unwrap_or(Value::Null))?)
    }

    async fn post_checked(&self, path: &str, payload: Value) -> Result<Value> {
        let response = self.client.post(self.url(path)).json(&payload).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(path, status = status.as_u16(), "POST");
        check_success(status, &body)
    }
}

/// 「全部」はフィルタなし
fn operator_query(operator: Option<&str>) -> Vec<(&'static str, String)> {
    match operator.map(str::trim) {
        Some(op) if !op.is_empty() && op != ALL_OPERATORS => vec![("operator", op.to_string())],
        _ => Vec::new(),
    }
}

/// 本文の success が true のときだけ成功とみなす
pub(crate) fn check_success(status: StatusCode, body: &str) -> Result<Value> {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) if status.is_success() => return Err(AppError::Json(e)),
        Err(_) => return Err(AppError::Api(error_message(status, body))),
    };

    if value.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(value);
    }
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error_message(status, body));
    warn!(status = status.as_u16(), error = %message, "server rejected request");
    Err(AppError::Api(message))
}

fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(b) => b.error,
        Err(_) => format!("HTTP {}", status.as_u16()),
    }
}

#[derive(Deserialize)]
struct ProvinceList {
    #[serde(default)]
    provinces: Vec<String>,
}

#[derive(Deserialize)]
struct CityList {
    #[serde(default)]
    cities: Vec<String>,
}

#[async_trait]
impl ReviewApi for HttpReviewApi {
    async fn list_operators(&self) -> Result<Vec<String>> {
        self.get_plain("/api/operators", &[]).await
    }

    async fn list_items(&self, operator: Option<&str>) -> Result<Vec<InspectionItem>> {
        self.get_plain("/api/items", &operator_query(operator)).await
    }

    async fn list_reviews(&self) -> Result<Vec<ReviewVerdict>> {
        self.get_plain("/api/reviews", &[]).await
    }

    async fn submit_verdict(&self, item_id: &str, result: ReviewResult) -> Result<()> {
        self.post_checked(
            "/api/review",
            json!({ "item_id": item_id, "审核结果": result.as_str() }),
        )
        .await?;
        Ok(())
    }

    async fn submit_remark(&self, item_id: &str, remark: &str) -> Result<()> {
        self.post_checked(
            "/api/review/problem",
            json!({ "item_id": item_id, "问题描述": remark }),
        )
        .await?;
        Ok(())
    }

    async fn stats(&self, operator: Option<&str>) -> Result<ReviewStats> {
        self.get_plain("/api/stats", &operator_query(operator)).await
    }

    async fn export_csv(&self) -> Result<Vec<u8>> {
        let response = self.client.get(self.url("/api/export")).send().await?;
        let status = response.status();
        debug!(status = status.as_u16(), "GET /api/export");

        if status == StatusCode::BAD_REQUEST {
            return Err(AppError::NothingToExport);
        }
        if !status.is_success() {
            let body = response.text().await?;
            return Err(AppError::Api(error_message(status, &body)));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload_items(&self, file: &Path, operator: &str) -> Result<UploadOutcome> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "items.xlsx".to_string());

        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new()
            .text("operator", operator.to_string())
            .part("file", part);

        let response = self
            .client
            .post(self.url("/api/admin/upload"))
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "POST /api/admin/upload");

        let value = check_success(status, &body)?;
        Ok(serde_json::from_value(value)?)
    }

    async fn filter_options(&self) -> Result<FilterOptions> {
        self.get_data("/api/filters", &[]).await
    }

    async fn provinces(&self, war_zone: &str) -> Result<Vec<String>> {
        let list: ProvinceList = self
            .get_data("/api/filters/provinces", &[("war_zone", war_zone.to_string())])
            .await?;
        Ok(list.provinces)
    }

    async fn cities(&self, province: &str) -> Result<Vec<String>> {
        let list: CityList = self
            .get_data("/api/filters/cities", &[("province", province.to_string())])
            .await?;
        Ok(list.cities)
    }

    async fn search(&self, filters: &SearchFilters) -> Result<ResultPage> {
        self.get_data("/api/search", &filters.query_pairs()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_flag_required() {
        assert!(check_success(StatusCode::OK, r#"{"success": true}"#).is_ok());

        let err = check_success(StatusCode::OK, r#"{"success": false, "error": "保存失败"}"#).unwrap_err();
        assert!(matches!(err, AppError::Api(ref m) if m == "保存失败"));

        // success がなければ失敗扱い
        assert!(check_success(StatusCode::OK, r#"{"ok": 1}"#).is_err());
    }

    #[test]
    fn test_error_status_with_body() {
        let err = check_success(StatusCode::NOT_FOUND, r#"{"success": false, "error": "审核记录不存在"}"#)
            .unwrap_err();
        assert!(matches!(err, AppError::Api(ref m) if m == "审核记录不存在"));

        let err = check_success(StatusCode::BAD_GATEWAY, "<html>").unwrap_err();
        assert!(matches!(err, AppError::Api(ref m) if m == "HTTP 502"));
    }

    #[test]
    fn test_operator_query_skips_all() {
        assert!(operator_query(None).is_empty());
        assert!(operator_query(Some(ALL_OPERATORS)).is_empty());
        assert_eq!(operator_query(Some("张三")), vec![("operator", "张三".to_string())]);
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let api = HttpReviewApi::new("http://localhost:5000/", Duration::from_secs(5)).unwrap();
        assert_eq!(api.url("/api/items"), "http://localhost:5000/api/items");
    }
}
