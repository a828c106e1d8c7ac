//! Store Review Common Library
//!
//! CLIとデスクトップ版で共有する審核エンジン（表示層に依存しない）

pub mod clock;
pub mod completion;
pub mod error;
pub mod export;
pub mod filters;
pub mod image_loader;
pub mod keyboard;
pub mod ledger;
pub mod overlay;
pub mod partition;
pub mod retry;
pub mod review;
pub mod session;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{completion_stats, evaluate, group_by_store, is_item_complete, is_store_complete, StoreGroup};
pub use error::{Error, Result};
pub use export::{export_filename, merge_rows, render_csv, ExportRow};
pub use filters::{FilterOptions, ResultPage, SearchFilters};
pub use image_loader::{FetchRequest, ImageLoader, LoadState};
pub use keyboard::{Key, KeyboardNav, NavCommand};
pub use ledger::{LedgerMirror, Ticket};
pub use overlay::{clipboard_payload, needs_next_page, ClipboardPayload, MemoryOverlayStore, OverlayStore, TriageOverlay};
pub use partition::{completed_view, exact_search, pending_window, PendingWindow, SearchResult};
pub use retry::RetryPolicy;
pub use review::{validate_remark, ItemReviewState, SubmitPlan};
pub use session::{
    ItemCard, NoticeLevel, ReviewSession, SessionConfig, SessionEvent, StoreCard, SubmitStep, View, ViewModel,
};
pub use types::{InspectionItem, ResultRow, ReviewResult, ReviewStats, ReviewVerdict, StoreAggregate, ALL_OPERATORS};
