//! 審核結果のエクスポート（CLI・デスクトップ共通）
//!
//! 判定済みの項目だけを項目順に並べた10列の表。

#[cfg(feature = "excel")]
pub mod excel_core;

use crate::ledger::LedgerMirror;
use crate::types::InspectionItem;

/// 列見出し（サーバーのCSVと同じ順）
pub const EXPORT_HEADERS: [&str; 10] = [
    "门店名称",
    "门店编号",
    "所属区域",
    "检查项名称",
    "检查项分类",
    "负责运营",
    "标准图",
    "审核结果",
    "问题描述",
    "审核时间",
];

/// エクスポート1行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    pub store_name: String,
    pub store_id: String,
    pub region: String,
    pub item_name: String,
    pub category: String,
    pub operator: String,
    pub image_url: String,
    pub result: String,
    pub remark: String,
    pub reviewed_at: String,
}

impl ExportRow {
    pub fn cells(&self) -> [&str; 10] {
        [
            &self.store_name,
            &self.store_id,
            &self.region,
            &self.item_name,
            &self.category,
            &self.operator,
            &self.image_url,
            &self.result,
            &self.remark,
            &self.reviewed_at,
        ]
    }
}

/// 項目と判定を結合する（未審核の項目は含めない）
pub fn merge_rows(items: &[InspectionItem], ledger: &LedgerMirror) -> Vec<ExportRow> {
    items
        .iter()
        .filter_map(|item| {
            let verdict = ledger.confirmed(&item.id)?;
            Some(ExportRow {
                store_name: item.store_name.clone(),
                store_id: item.store_id.clone(),
                region: item.region.clone(),
                item_name: item.item_name.clone(),
                category: item.category.clone(),
                operator: item.operator.clone(),
                image_url: item.image_url.clone(),
                result: verdict.result.as_str().to_string(),
                remark: verdict.remark.clone(),
                reviewed_at: verdict.reviewed_at.clone(),
            })
        })
        .collect()
}

/// 拡張子なしのファイル名（`date` は YYYY-MM-DD）
pub fn export_filename(date: &str) -> String {
    format!("审核结果_{}", date)
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// BOM付きCSV（Excelで文字化けしないように）
pub fn render_csv(rows: &[ExportRow]) -> String {
    let mut csv = String::from('\u{feff}');
    csv.push_str(&EXPORT_HEADERS.join(","));
    csv.push('\n');
    for row in rows {
        let line: Vec<String> = row.cells().iter().map(|c| escape_csv(c)).collect();
        csv.push_str(&line.join(","));
        csv.push('\n');
    }
    csv
}
