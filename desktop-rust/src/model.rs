use std::path::PathBuf;

use store_review::api::UploadOutcome;
use store_review_common::{FilterOptions, InspectionItem, ResultPage, ReviewStats, ReviewVerdict, Ticket};

/// バックグラウンド処理の結果（失敗は表示用の文言）
pub enum BackendMessage {
    Operators(Result<Vec<String>, String>),
    Loaded(Result<(Vec<InspectionItem>, Vec<ReviewVerdict>), String>),
    Submitted { ticket: Ticket, outcome: Result<(), String> },
    RemarkSaved { ticket: Ticket, outcome: Result<(), String> },
    Stats(Result<ReviewStats, String>),
    Exported(Result<PathBuf, String>),
    Uploaded(Result<UploadOutcome, String>),
    Searched(Result<ResultPage, String>),
    FilterOptions(Result<FilterOptions, String>),
    Provinces(Result<Vec<String>, String>),
    Cities(Result<Vec<String>, String>),
    Thumb(ThumbData),
    /// 行のコピー。画像が取れなければ image は None
    CopyReady { text: String, image: Option<ClipImage> },
}

pub struct ThumbData {
    pub item_id: String,
    pub generation: u64,
    /// 取得・デコードに失敗したら None
    pub image: Option<ThumbPixels>,
}

pub struct ThumbPixels {
    pub size: [usize; 2],
    pub pixels: Vec<u8>,
}

/// クリップボードに載せる原寸のRGBA
pub struct ClipImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

/// 表示中のタブ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Pending,
    Completed,
    Triage,
}
