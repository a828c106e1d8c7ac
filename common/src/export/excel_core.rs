//! Excel生成（共通ライブラリ）
//!
//! 見出し行 + 判定1件1行の単一シート

use super::{ExportRow, EXPORT_HEADERS};
use rust_xlsxwriter::*;

/// 列幅（文字数）
const COLUMN_WIDTHS: [f64; 10] = [18.0, 12.0, 10.0, 18.0, 12.0, 10.0, 40.0, 10.0, 30.0, 20.0];

/// 審核結果のExcelをバッファに生成
pub fn generate_review_xlsx(rows: &[ExportRow]) -> Result<Vec<u8>, String> {
    let mut workbook = Workbook::new();

    let header_format = Format::new()
        .set_bold()
        .set_font_color(Color::RGB(0x333333))
        .set_background_color(Color::RGB(0xF5F5F5))
        .set_align(FormatAlign::Center)
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xAAAAAA));

    let value_format = Format::new()
        .set_align(FormatAlign::VerticalCenter)
        .set_text_wrap()
        .set_border(FormatBorder::Hair)
        .set_border_color(Color::RGB(0xCCCCCC));

    let fail_format = value_format.clone().set_font_color(Color::RGB(0xC0392B));

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name("审核结果")
        .map_err(|e| format!("シート名設定エラー: {}", e))?;

    for (col, width) in COLUMN_WIDTHS.iter().enumerate() {
        worksheet
            .set_column_width(col as u16, *width)
            .map_err(|e| format!("列幅設定エラー: {}", e))?;
    }

    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &header_format)
            .map_err(|e| format!("見出し書き込みエラー: {}", e))?;
    }
    worksheet
        .set_freeze_panes(1, 0)
        .map_err(|e| format!("固定設定エラー: {}", e))?;

    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        for (col, value) in row.cells().iter().enumerate() {
            // 審核結果列の不合格は赤字
            let format = if col == 7 && *value == "不合格" {
                &fail_format
            } else {
                &value_format
            };
            worksheet
                .write_string_with_format(r, col as u16, *value, format)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
        }
    }

    workbook
        .save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}
