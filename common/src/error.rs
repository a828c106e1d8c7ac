//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// 不合格の問題描述が空
    #[error("Remark is required for a failed item")]
    EmptyRemark,

    #[error("Not found: {0}")]
    NotFound(String),

    /// 同じ項目への書き込みがまだサーバー応答待ち
    #[error("Write already in flight: {0}")]
    InFlight(String),

    /// 既に確定・破棄済みのチケット
    #[error("Unknown ticket: {0}")]
    UnknownTicket(u64),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_io() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = Error::Io(io_error);
        let display = format!("{}", error);
        assert!(display.contains("IO error"));
        assert!(display.contains("file not found"));
    }

    #[test]
    fn test_error_display_empty_remark() {
        let display = format!("{}", Error::EmptyRemark);
        assert_eq!(display, "Remark is required for a failed item");
    }

    #[test]
    fn test_error_display_not_found() {
        let error = Error::NotFound("S001_门头".to_string());
        assert_eq!(format!("{}", error), "Not found: S001_门头");
    }

    #[test]
    fn test_error_display_in_flight() {
        let error = Error::InFlight("S001_门头".to_string());
        assert_eq!(format!("{}", error), "Write already in flight: S001_门头");
    }

    #[test]
    fn test_error_from_json() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: Error = json_error.into();
        assert!(matches!(error, Error::Json(_)));
    }
}
