//! 门店检查图片审核 CLI
//!
//! 審核エンジンは `store-review-common`。ここではサーバー通信・対話入力・
//! ファイル入出力を扱う。

pub mod api;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod export;
pub mod image_fetch;
pub mod interactive;
pub mod logging;
pub mod overlay_store;
pub mod triage;
