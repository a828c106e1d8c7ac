//! 審核結果のトリアージ
//!
//! 検索結果を処理済みマークで未処理/処理済みに分ける。未処理が空になったら
//! 自動で次のページへ進む。

use crate::api::ReviewApi;
use crate::error::Result;
use store_review_common::{
    clipboard_payload, needs_next_page, ClipboardPayload, OverlayStore, ResultPage, ResultRow, SearchFilters,
    TriageOverlay,
};
use tracing::{debug, info};

/// 1ページ分の振り分け結果
#[derive(Debug, Clone, Default)]
pub struct TriagePage {
    pub page: ResultPage,
    pub pending: Vec<ResultRow>,
    pub done: Vec<ResultRow>,
    /// 未処理が空で次ページへ進んだ回数
    pub skipped_pages: u32,
}

/// 検索して振り分ける。`filters.page` は最終的に表示したページに更新される
pub async fn load_page<A, S>(api: &A, overlay: &TriageOverlay<S>, filters: &mut SearchFilters) -> Result<TriagePage>
where
    A: ReviewApi + ?Sized,
    S: OverlayStore,
{
    let mut skipped_pages = 0;
    loop {
        let page = api.search(filters).await?;
        let (pending, done) = overlay.split(&page.results);
        let pending: Vec<ResultRow> = pending.into_iter().cloned().collect();
        let done: Vec<ResultRow> = done.into_iter().cloned().collect();

        if needs_next_page(pending.len(), page.page, page.total_pages) {
            debug!(page = page.page, total_pages = page.total_pages, "page fully processed, advancing");
            filters.page = page.page + 1;
            skipped_pages += 1;
            continue;
        }

        filters.page = page.page.max(1);
        return Ok(TriagePage {
            page,
            pending,
            done,
            skipped_pages,
        });
    }
}

/// 条件に合う結果から行を探す（全ページ）
pub async fn find_row<A: ReviewApi + ?Sized>(api: &A, filters: &SearchFilters, id: &str) -> Result<Option<ResultRow>> {
    let mut filters = filters.clone();
    filters.page = 1;
    loop {
        let page = api.search(&filters).await?;
        if let Some(row) = page.results.iter().find(|r| r.id == id) {
            return Ok(Some(row.clone()));
        }
        if !page.has_more() {
            return Ok(None);
        }
        filters.page = page.page + 1;
    }
}

/// CLIではテキストのみ
pub fn copy_payload(row: &ResultRow) -> ClipboardPayload {
    clipboard_payload(row, false)
}

pub fn mark<S: OverlayStore>(overlay: &mut TriageOverlay<S>, id: &str) -> Result<bool> {
    let changed = overlay.mark_processed(id)?;
    if changed {
        info!(id, "marked processed");
    }
    Ok(changed)
}

pub fn restore<S: OverlayStore>(overlay: &mut TriageOverlay<S>, id: &str) -> Result<bool> {
    Ok(overlay.restore(id)?)
}

pub fn print_page(view: &TriagePage) {
    if view.skipped_pages > 0 {
        println!("（処理済みのページを{}件スキップ）", view.skipped_pages);
    }
    println!(
        "ページ {}/{}  全{}件",
        view.page.page,
        view.page.total_pages.max(1),
        view.page.total_count
    );

    println!("\n■ 未処理 ({}件)", view.pending.len());
    for row in &view.pending {
        print_row(row);
    }
    println!("\n□ 処理済み ({}件)", view.done.len());
    for row in &view.done {
        print_row(row);
    }
}

fn print_row(row: &ResultRow) {
    let note = if row.problem_note.trim().is_empty() {
        String::new()
    } else {
        format!(" / {}", row.problem_note.trim())
    };
    println!(
        "  [{}] {} ({}) {} - {}{}",
        row.id, row.store_name, row.store_id, row.item_name, row.review_result, note
    );
}
