//! ログ初期化
//!
//! 進捗表示は stdout の println!、診断ログは stderr の tracing に分ける。

use tracing_subscriber::EnvFilter;

/// RUST_LOG があればそれを優先。なければ info（--verbose で debug）
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into());

    // 二重初期化（テスト等）は無視する
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
