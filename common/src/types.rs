//! 審核データの型定義
//!
//! サーバーのJSONフィールド名（中国語キー）にserdeでマッピングする:
//! - InspectionItem: 門店ごとの検査項目
//! - ReviewVerdict: 検査項目に対する合格/不合格の判定
//! - StoreAggregate: 完了した門店の集計（派生値、保存しない）
//! - ResultRow: 検索API・トリアージ用の結果レコード

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// 「全部」オペレーター（フィルタなし）
pub const ALL_OPERATORS: &str = "全部";

/// 検査項目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InspectionItem {
    /// 門店編号_検査項目名 形式の一意ID
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(rename = "门店编号", default, deserialize_with = "string_or_number")]
    pub store_id: String,

    #[serde(rename = "门店名称", default)]
    pub store_name: String,

    #[serde(rename = "负责运营", default)]
    pub operator: String,

    #[serde(rename = "所属区域", default)]
    pub region: String,

    #[serde(rename = "检查项名称", default)]
    pub item_name: String,

    #[serde(rename = "检查项分类", default)]
    pub category: String,

    /// 標準図URL（空文字は画像なし）
    #[serde(rename = "标准图", default, deserialize_with = "string_or_null")]
    pub image_url: String,

    /// 現場結果なし（上流で自動的に不合格扱い）
    #[serde(rename = "无现场结果", default)]
    pub no_field_result: bool,
}

impl InspectionItem {
    /// 表示用の参照画像URL。未設定なら None
    pub fn reference_url(&self) -> Option<&str> {
        let url = self.image_url.trim();
        if url.is_empty() || url == "null" || url == "undefined" {
            None
        } else {
            Some(url)
        }
    }

    /// 画像ビューアのキャプション
    pub fn caption(&self) -> String {
        format!("{} - {}", self.store_name, self.item_name)
    }

    /// 担当オペレーター（未設定なら「未分配」）
    pub fn operator_label(&self) -> &str {
        if self.operator.trim().is_empty() {
            "未分配"
        } else {
            &self.operator
        }
    }
}

/// 審核結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewResult {
    #[serde(rename = "合格")]
    Pass,
    #[serde(rename = "不合格")]
    Fail,
}

impl ReviewResult {
    /// サーバーに送る値
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewResult::Pass => "合格",
            ReviewResult::Fail => "不合格",
        }
    }
}

impl fmt::Display for ReviewResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pass" | "ok" | "p" | "合格" => Ok(ReviewResult::Pass),
            "fail" | "ng" | "f" | "不合格" => Ok(ReviewResult::Fail),
            _ => Err(format!("Unknown result: {}. Use pass or fail", s)),
        }
    }
}

/// 検査項目ごとの判定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    #[serde(deserialize_with = "string_or_number")]
    pub item_id: String,

    #[serde(rename = "审核结果")]
    pub result: ReviewResult,

    /// 問題描述（不合格時に必須、保存前は空でもよい）
    #[serde(rename = "问题描述", default, deserialize_with = "string_or_null")]
    pub remark: String,

    /// 最終更新時刻（サーバー形式の文字列、空は未設定）
    #[serde(rename = "审核时间", default, deserialize_with = "string_or_null")]
    pub reviewed_at: String,
}

impl ReviewVerdict {
    pub fn new(item_id: impl Into<String>, result: ReviewResult) -> Self {
        Self {
            item_id: item_id.into(),
            result,
            remark: String::new(),
            reviewed_at: String::new(),
        }
    }

    /// 空白を除いた問題描述があるか
    pub fn has_remark(&self) -> bool {
        !self.remark.trim().is_empty()
    }

    pub fn timestamp(&self) -> Option<&str> {
        if self.reviewed_at.is_empty() {
            None
        } else {
            Some(&self.reviewed_at)
        }
    }
}

/// 完了した門店の集計
#[derive(Debug, Clone, PartialEq)]
pub struct StoreAggregate {
    pub store_id: String,
    pub store_name: String,
    pub operator: String,
    pub items: Vec<InspectionItem>,
    /// 項目の判定時刻の最大値（文字列比較）
    pub last_activity: Option<String>,
    pub pass_count: usize,
    pub fail_count: usize,
}

/// 審核統計（門店単位）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total: usize,
    pub reviewed: usize,
    pub percentage: f64,
}

/// 検索結果レコード（結果ビューア・トリアージ用）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub store_id: String,
    pub store_name: String,
    #[serde(deserialize_with = "string_or_null")]
    pub war_zone: String,
    #[serde(deserialize_with = "string_or_null")]
    pub province: String,
    #[serde(deserialize_with = "string_or_null")]
    pub city: String,
    #[serde(deserialize_with = "string_or_null")]
    pub area: String,
    #[serde(deserialize_with = "string_or_null")]
    pub store_tag: String,
    pub item_name: String,
    #[serde(deserialize_with = "string_or_null")]
    pub item_category: String,
    #[serde(deserialize_with = "string_or_null")]
    pub image_url: String,
    #[serde(deserialize_with = "string_or_null")]
    pub review_result: String,
    #[serde(deserialize_with = "string_or_null")]
    pub problem_note: String,
    #[serde(deserialize_with = "string_or_null")]
    pub review_time: String,
}

impl ResultRow {
    pub fn reference_url(&self) -> Option<&str> {
        let url = self.image_url.trim();
        if url.is_empty() || url == "null" || url == "undefined" {
            None
        } else {
            Some(url)
        }
    }

    /// クリップボード用のテキスト要約
    pub fn summary(&self) -> String {
        let dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
        let mut lines = vec![
            format!("门店: {} ({})", self.store_name, self.store_id),
            format!(
                "战区: {} | 省份: {} | 城市: {}",
                dash(&self.war_zone),
                dash(&self.province),
                dash(&self.city)
            ),
            format!("检查项: {}", self.item_name),
            format!("审核结果: {}", dash(&self.review_result)),
        ];
        if !self.problem_note.trim().is_empty() {
            lines.push(format!("问题描述: {}", self.problem_note.trim()));
        }
        lines.join("\n")
    }
}

/// 数値IDと文字列IDの両方を受け付ける
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// null を空文字として扱う
fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_deserialize_server_keys() {
        let json = r#"{
            "id": "S001_门头",
            "门店编号": "S001",
            "门店名称": "人民路店",
            "负责运营": "张三",
            "所属区域": "华东",
            "检查项名称": "门头",
            "标准图": "https://img.example.com/a.jpg",
            "无现场结果": false
        }"#;

        let item: InspectionItem = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(item.id, "S001_门头");
        assert_eq!(item.store_id, "S001");
        assert_eq!(item.operator, "张三");
        assert_eq!(item.reference_url(), Some("https://img.example.com/a.jpg"));
        assert!(!item.no_field_result);
    }

    #[test]
    fn test_item_numeric_store_id_and_null_image() {
        let json = r#"{"id": "1024_灯箱", "门店编号": 1024, "标准图": null}"#;

        let item: InspectionItem = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(item.store_id, "1024");
        assert_eq!(item.reference_url(), None);
        assert_eq!(item.operator_label(), "未分配");
    }

    #[test]
    fn test_verdict_deserialize() {
        let json = r#"{
            "item_id": "S001_门头",
            "门店名称": "人民路店",
            "审核结果": "不合格",
            "问题描述": "",
            "审核时间": "2025-03-01 10:00:00"
        }"#;

        let verdict: ReviewVerdict = serde_json::from_str(json).expect("デシリアライズ失敗");
        assert_eq!(verdict.result, ReviewResult::Fail);
        assert!(!verdict.has_remark());
        assert_eq!(verdict.timestamp(), Some("2025-03-01 10:00:00"));
    }

    #[test]
    fn test_verdict_whitespace_remark_is_not_a_remark() {
        let mut verdict = ReviewVerdict::new("a", ReviewResult::Fail);
        verdict.remark = "   ".to_string();
        assert!(!verdict.has_remark());
        verdict.remark = " 封条破损 ".to_string();
        assert!(verdict.has_remark());
    }

    #[test]
    fn test_review_result_from_str() {
        assert_eq!("pass".parse::<ReviewResult>(), Ok(ReviewResult::Pass));
        assert_eq!("不合格".parse::<ReviewResult>(), Ok(ReviewResult::Fail));
        assert!("maybe".parse::<ReviewResult>().is_err());
    }

    #[test]
    fn test_result_row_summary() {
        let row = ResultRow {
            id: "7".to_string(),
            store_id: "S9".to_string(),
            store_name: "北站店".to_string(),
            war_zone: "华北".to_string(),
            item_name: "灯箱".to_string(),
            review_result: "不合格".to_string(),
            problem_note: "灯管不亮".to_string(),
            ..Default::default()
        };

        let summary = row.summary();
        assert!(summary.contains("门店: 北站店 (S9)"));
        assert!(summary.contains("省份: -"));
        assert!(summary.contains("问题描述: 灯管不亮"));
    }
}
