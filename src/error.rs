use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("設定エラー: {0}")]
    Config(String),

    /// サーバーが失敗を返した（success=false や非2xx）
    #[error("APIエラー: {0}")]
    Api(String),

    #[error("通信エラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Core(#[from] store_review_common::Error),

    #[error("アップロードできないファイル: {0}")]
    InvalidUpload(String),

    #[error("Excel読み込みエラー: {0}")]
    Workbook(String),

    #[error("Excel生成エラー: {0}")]
    Excel(String),

    #[error("エクスポートできる審核結果がありません")]
    NothingToExport,

    #[error("入力エラー: {0}")]
    Prompt(String),
}

impl AppError {
    /// ユーザーの再試行で回復しうる失敗か
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Api(_) | AppError::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
