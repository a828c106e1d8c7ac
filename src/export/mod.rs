//! 審核結果のファイル出力
//!
//! 既定はサーバー生成のCSVをそのまま保存する。`--local` では手元の
//! 項目と確定済み判定から CSV / Excel を作る。

use crate::api::ReviewApi;
use crate::cli::ExportFormat;
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use store_review_common::export::excel_core::generate_review_xlsx;
use store_review_common::{export_filename, render_csv, ExportRow};
use tracing::info;

/// 今日の日付（YYYY-MM-DD）
pub fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// 出力先がディレクトリ（または拡張子なし）なら既定のファイル名を付ける
pub fn output_path(output: &Path, date: &str, extension: &str) -> PathBuf {
    if output.is_dir() || output.extension().is_none() {
        output.join(format!("{}.{}", export_filename(date), extension))
    } else {
        output.to_path_buf()
    }
}

/// サーバーのCSVを保存する
pub async fn export_from_server<A: ReviewApi + ?Sized>(api: &A, output: &Path, date: &str) -> Result<PathBuf> {
    let bytes = api.export_csv().await?;
    let path = output_path(output, date, "csv");
    write_file(&path, &bytes)?;
    info!(path = %path.display(), bytes = bytes.len(), "server export saved");
    Ok(path)
}

/// 手元のデータから出力する
pub fn export_local(rows: &[ExportRow], format: ExportFormat, output: &Path, date: &str) -> Result<PathBuf> {
    if rows.is_empty() {
        return Err(AppError::NothingToExport);
    }

    let (bytes, extension) = match format {
        ExportFormat::Csv => (render_csv(rows).into_bytes(), "csv"),
        ExportFormat::Excel => (generate_review_xlsx(rows).map_err(AppError::Excel)?, "xlsx"),
    };
    let path = output_path(output, date, extension);
    write_file(&path, &bytes)?;
    info!(path = %path.display(), rows = rows.len(), "local export written");
    Ok(path)
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> ExportRow {
        ExportRow {
            store_name: "人民路店".into(),
            store_id: "S1".into(),
            region: "华东".into(),
            item_name: "门头".into(),
            category: "外观".into(),
            operator: "张三".into(),
            image_url: String::new(),
            result: "不合格".into(),
            remark: "灯不亮, 需维修".into(),
            reviewed_at: "2025-03-01 10:00:00".into(),
        }
    }

    #[test]
    fn test_output_path_for_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = output_path(dir.path(), "2025-03-01", "csv");
        assert_eq!(path, dir.path().join("审核结果_2025-03-01.csv"));

        let explicit = dir.path().join("out.csv");
        assert_eq!(output_path(&explicit, "2025-03-01", "csv"), explicit);
    }

    #[test]
    fn test_local_csv_has_bom_and_quotes() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_local(&[row()], ExportFormat::Csv, dir.path(), "2025-03-01").unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.starts_with('\u{feff}'));
        assert!(text.contains("\"灯不亮, 需维修\""));
    }

    #[test]
    fn test_local_excel_is_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = export_local(&[row()], ExportFormat::Excel, dir.path(), "2025-03-01").unwrap();
        assert_eq!(path.extension().unwrap(), "xlsx");
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }

    #[test]
    fn test_nothing_to_export() {
        let dir = tempfile::tempdir().unwrap();
        let err = export_local(&[], ExportFormat::Csv, dir.path(), "2025-03-01").unwrap_err();
        assert!(matches!(err, AppError::NothingToExport));
    }
}
