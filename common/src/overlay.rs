//! トリアージ用の「処理済み」マーク
//!
//! サーバーの判定とは独立したクライアント側の注記。起動時に一度だけ読み込み、
//! 変更のたびに集合全体を書き直す（後勝ち、マージなし）。

use crate::error::Result;
use crate::types::ResultRow;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// 処理済み集合の永続化先
pub trait OverlayStore {
    fn load(&self) -> Result<BTreeSet<String>>;
    fn save(&self, ids: &BTreeSet<String>) -> Result<()>;
}

/// メモリ上のストア（クローンは同じ中身を共有）
#[derive(Debug, Clone, Default)]
pub struct MemoryOverlayStore {
    ids: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryOverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存されている集合のコピー
    pub fn snapshot(&self) -> BTreeSet<String> {
        self.ids.lock().map(|ids| ids.clone()).unwrap_or_default()
    }
}

impl OverlayStore for MemoryOverlayStore {
    fn load(&self) -> Result<BTreeSet<String>> {
        Ok(self.snapshot())
    }

    fn save(&self, ids: &BTreeSet<String>) -> Result<()> {
        if let Ok(mut stored) = self.ids.lock() {
            *stored = ids.clone();
        }
        Ok(())
    }
}

/// クリップボードに載せる内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardPayload {
    pub text: String,
    /// 画像を添付できる場合のみ
    pub image_url: Option<String>,
}

impl ClipboardPayload {
    pub fn is_text_only(&self) -> bool {
        self.image_url.is_none()
    }
}

pub struct TriageOverlay<S: OverlayStore> {
    store: S,
    processed: BTreeSet<String>,
}

impl<S: OverlayStore> TriageOverlay<S> {
    /// 永続化先から読み込む。読めなければ空集合から始める
    pub fn open(store: S) -> Self {
        let processed = match store.load() {
            Ok(ids) => ids,
            Err(e) => {
                debug!(error = %e, "overlay load failed, starting empty");
                BTreeSet::new()
            }
        };
        Self { store, processed }
    }

    pub fn is_processed(&self, row_id: &str) -> bool {
        self.processed.contains(row_id)
    }

    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    /// 処理済みにする。既に処理済みなら false
    pub fn mark_processed(&mut self, row_id: &str) -> Result<bool> {
        if self.processed.contains(row_id) {
            return Ok(false);
        }
        let mut next = self.processed.clone();
        next.insert(row_id.to_string());
        self.commit(next)?;
        info!(row_id, total = self.processed.len(), "row marked processed");
        Ok(true)
    }

    /// 処理済みから戻す。未処理なら false
    pub fn restore(&mut self, row_id: &str) -> Result<bool> {
        if !self.processed.contains(row_id) {
            return Ok(false);
        }
        let mut next = self.processed.clone();
        next.remove(row_id);
        self.commit(next)?;
        info!(row_id, total = self.processed.len(), "row restored");
        Ok(true)
    }

    /// 保存に成功したときだけ差し替える
    fn commit(&mut self, next: BTreeSet<String>) -> Result<()> {
        self.store.save(&next)?;
        self.processed = next;
        Ok(())
    }

    /// (未処理, 処理済み) に分ける。各側は元の順を保つ
    pub fn split<'a>(&self, rows: &'a [ResultRow]) -> (Vec<&'a ResultRow>, Vec<&'a ResultRow>) {
        rows.iter().partition(|r| !self.processed.contains(&r.id))
    }
}

/// 未処理のページが空になり、まだ次のページがあるか
pub fn needs_next_page(pending_visible: usize, page: u32, total_pages: u32) -> bool {
    pending_visible == 0 && page < total_pages
}

/// 要約テキストと（対応していれば）画像。画像がなければテキストのみ
pub fn clipboard_payload(row: &ResultRow, image_supported: bool) -> ClipboardPayload {
    let image_url = if image_supported {
        row.reference_url().map(str::to_string)
    } else {
        None
    };
    ClipboardPayload {
        text: row.summary(),
        image_url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str) -> ResultRow {
        ResultRow {
            id: id.to_string(),
            store_id: "S1".to_string(),
            store_name: "北站店".to_string(),
            item_name: "灯箱".to_string(),
            review_result: "不合格".to_string(),
            image_url: format!("https://img.example.com/{}.jpg", id),
            ..Default::default()
        }
    }

    #[test]
    fn test_mark_and_restore_rewrite_store() {
        let store = MemoryOverlayStore::new();
        let mut overlay = TriageOverlay::open(store.clone());

        assert!(overlay.mark_processed("2").unwrap());
        assert!(!overlay.mark_processed("2").unwrap());
        assert!(overlay.mark_processed("1").unwrap());
        assert_eq!(store.snapshot().len(), 2);

        assert!(overlay.restore("2").unwrap());
        assert!(!overlay.restore("2").unwrap());
        assert_eq!(store.snapshot().into_iter().collect::<Vec<_>>(), vec!["1"]);
    }

    struct ReadOnlyStore;

    impl OverlayStore for ReadOnlyStore {
        fn load(&self) -> Result<BTreeSet<String>> {
            Ok(["1".to_string()].into_iter().collect())
        }

        fn save(&self, _ids: &BTreeSet<String>) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
        }
    }

    #[test]
    fn test_failed_save_keeps_previous_set() {
        let mut overlay = TriageOverlay::open(ReadOnlyStore);

        assert!(overlay.mark_processed("2").is_err());
        assert!(!overlay.is_processed("2"));

        assert!(overlay.restore("1").is_err());
        assert!(overlay.is_processed("1"));
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_reopen_reads_persisted_set() {
        let store = MemoryOverlayStore::new();
        TriageOverlay::open(store.clone()).mark_processed("9").unwrap();

        let reopened = TriageOverlay::open(store);
        assert!(reopened.is_processed("9"));
    }

    #[test]
    fn test_split_preserves_order() {
        let rows = vec![row("1"), row("2"), row("3")];
        let mut overlay = TriageOverlay::open(MemoryOverlayStore::new());
        overlay.mark_processed("2").unwrap();

        let (pending, done) = overlay.split(&rows);
        let ids = |v: &[&ResultRow]| v.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&pending), vec!["1", "3"]);
        assert_eq!(ids(&done), vec!["2"]);
    }

    #[test]
    fn test_needs_next_page() {
        assert!(needs_next_page(0, 1, 3));
        assert!(!needs_next_page(0, 3, 3));
        assert!(!needs_next_page(2, 1, 3));
    }

    #[test]
    fn test_clipboard_falls_back_to_text() {
        let r = row("5");
        let full = clipboard_payload(&r, true);
        assert_eq!(full.image_url.as_deref(), Some("https://img.example.com/5.jpg"));
        assert!(full.text.contains("门店: 北站店 (S1)"));

        assert!(clipboard_payload(&r, false).is_text_only());

        let mut no_image = r.clone();
        no_image.image_url.clear();
        assert!(clipboard_payload(&no_image, true).is_text_only());
    }
}
