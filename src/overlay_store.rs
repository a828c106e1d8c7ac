//! 処理済みマークのファイル保存
//!
//! 結果行IDの集合をJSONで保持する。バージョン不一致や壊れたファイルは
//! 空集合として読む。

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use store_review_common::{OverlayStore, Result};
use tracing::{debug, warn};

/// 保存ファイルの構造
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OverlayFile {
    /// バージョン（互換性チェック用）
    version: u32,
    processed: BTreeSet<String>,
}

impl OverlayFile {
    const CURRENT_VERSION: u32 = 1;
}

pub struct JsonOverlayStore {
    path: PathBuf,
}

impl JsonOverlayStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// ファイルを削除する。存在しなければ false
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path)?;
        Ok(true)
    }
}

impl OverlayStore for JsonOverlayStore {
    fn load(&self) -> Result<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }

        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "overlay file unreadable");
                return Ok(BTreeSet::new());
            }
        };

        match serde_json::from_reader::<_, OverlayFile>(BufReader::new(file)) {
            Ok(saved) if saved.version == OverlayFile::CURRENT_VERSION => {
                debug!(path = %self.path.display(), count = saved.processed.len(), "overlay loaded");
                Ok(saved.processed)
            }
            Ok(saved) => {
                warn!(version = saved.version, "overlay version mismatch, starting empty");
                Ok(BTreeSet::new())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "overlay file broken, starting empty");
                Ok(BTreeSet::new())
            }
        }
    }

    fn save(&self, ids: &BTreeSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let saved = OverlayFile {
            version: OverlayFile::CURRENT_VERSION,
            processed: ids.clone(),
        };
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &saved)?;
        Ok(())
    }
}
