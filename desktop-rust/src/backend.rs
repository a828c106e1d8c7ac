//! 通信用のバックグラウンドランタイム
//!
//! UIスレッドはセッションだけを持ち、サーバー呼び出しはここで実行して
//! 結果をチャネルで返す。受信側で確定/破棄する。

use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{Context, Result};
use eframe::egui;
use store_review::api::{HttpReviewApi, ReviewApi};
use store_review::config::Config;
use store_review::driver::failure_reason;
use store_review::error::AppError;
use store_review::image_fetch::{HttpImageSource, ImageSource};
use store_review_common::{FetchRequest, ReviewResult, SearchFilters, Ticket};
use tokio::runtime::Runtime;
use tracing::debug;

use crate::io::{decode_clip_image, decode_thumbnail, save_export};
use crate::model::{BackendMessage, ThumbData};

pub struct Backend {
    runtime: Runtime,
    api: Arc<HttpReviewApi>,
    images: Arc<HttpImageSource>,
    tx: Sender<BackendMessage>,
    /// 結果が届いたら再描画を要求する
    repaint: Arc<OnceLock<egui::Context>>,
}

impl Backend {
    pub fn new(config: &Config) -> Result<(Self, Receiver<BackendMessage>)> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("start tokio runtime")?;
        let api = HttpReviewApi::new(&config.server_url, config.timeout()).context("build http client")?;
        let images = HttpImageSource::new(config.timeout()).context("build image client")?;
        let (tx, rx) = mpsc::channel();

        Ok((
            Self {
                runtime,
                api: Arc::new(api),
                images: Arc::new(images),
                tx,
                repaint: Arc::new(OnceLock::new()),
            },
            rx,
        ))
    }

    pub fn attach(&self, ctx: egui::Context) {
        let _ = self.repaint.set(ctx);
    }

    pub fn server_url(&self) -> &str {
        self.api.base_url()
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = BackendMessage> + Send + 'static,
    {
        let tx = self.tx.clone();
        let repaint = self.repaint.clone();
        self.runtime.spawn(async move {
            let message = task.await;
            let _ = tx.send(message);
            if let Some(ctx) = repaint.get() {
                ctx.request_repaint();
            }
        });
    }

    pub fn operators(&self) {
        let api = self.api.clone();
        self.spawn(async move { BackendMessage::Operators(api.list_operators().await.map_err(|e| failure_reason(&e))) });
    }

    pub fn load(&self, operator: Option<String>) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = async {
                let items = api.list_items(operator.as_deref()).await?;
                let verdicts = api.list_reviews().await?;
                Ok::<_, AppError>((items, verdicts))
            }
            .await;
            BackendMessage::Loaded(result.map_err(|e| failure_reason(&e)))
        });
    }

    pub fn submit(&self, ticket: Ticket, result: ReviewResult) {
        let api = self.api.clone();
        self.spawn(async move {
            let outcome = api.submit_verdict(ticket.item_id(), result).await;
            BackendMessage::Submitted {
                ticket,
                outcome: outcome.map_err(|e| failure_reason(&e)),
            }
        });
    }

    pub fn save_remark(&self, ticket: Ticket, text: String) {
        let api = self.api.clone();
        self.spawn(async move {
            let outcome = api.submit_remark(ticket.item_id(), text.trim()).await;
            BackendMessage::RemarkSaved {
                ticket,
                outcome: outcome.map_err(|e| failure_reason(&e)),
            }
        });
    }

    pub fn stats(&self, operator: Option<String>) {
        let api = self.api.clone();
        self.spawn(async move {
            BackendMessage::Stats(api.stats(operator.as_deref()).await.map_err(|e| failure_reason(&e)))
        });
    }

    /// サーバーのCSVを保存する
    pub fn export(&self, path: PathBuf) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = match api.export_csv().await {
                Ok(bytes) => save_export(&path, &bytes).map(|_| path).map_err(|e| format!("{e:#}")),
                Err(e) => Err(failure_reason(&e)),
            };
            BackendMessage::Exported(result)
        });
    }

    pub fn upload(&self, file: PathBuf, operator: String) {
        let api = self.api.clone();
        self.spawn(async move {
            let result = match store_review::driver::check_workbook(&file) {
                Ok(_) => api.upload_items(&file, &operator).await,
                Err(e) => Err(e),
            };
            BackendMessage::Uploaded(result.map_err(|e| failure_reason(&e)))
        });
    }

    pub fn search(&self, filters: SearchFilters) {
        let api = self.api.clone();
        self.spawn(async move { BackendMessage::Searched(api.search(&filters).await.map_err(|e| failure_reason(&e))) });
    }

    pub fn filter_options(&self) {
        let api = self.api.clone();
        self.spawn(async move {
            BackendMessage::FilterOptions(api.filter_options().await.map_err(|e| failure_reason(&e)))
        });
    }

    pub fn provinces(&self, war_zone: String) {
        let api = self.api.clone();
        self.spawn(async move {
            BackendMessage::Provinces(api.provinces(&war_zone).await.map_err(|e| failure_reason(&e)))
        });
    }

    pub fn cities(&self, province: String) {
        let api = self.api.clone();
        self.spawn(async move { BackendMessage::Cities(api.cities(&province).await.map_err(|e| failure_reason(&e))) });
    }

    /// 1回分の取得。再試行の判断はUI側の ImageLoader が行う
    pub fn fetch_image(&self, item_id: String, request: FetchRequest) {
        let images = self.images.clone();
        self.spawn(async move {
            let image = match images.fetch(&request.url).await {
                Ok(bytes) => match decode_thumbnail(&bytes) {
                    Ok(thumb) => Some(thumb),
                    Err(e) => {
                        debug!(url = %request.url, error = %e, "thumbnail decode failed");
                        None
                    }
                },
                Err(e) => {
                    debug!(url = %request.url, error = %e, "thumbnail fetch failed");
                    None
                }
            };
            BackendMessage::Thumb(ThumbData {
                item_id,
                generation: request.generation,
                image,
            })
        });
    }

    /// 行のコピー用に画像を取る。失敗したらテキストだけ返す
    pub fn prepare_copy(&self, text: String, url: String) {
        let images = self.images.clone();
        self.spawn(async move {
            let fetched = match images.fetch(&url).await {
                Ok(bytes) => decode_clip_image(&bytes),
                Err(e) => Err(anyhow::Error::from(e)),
            };
            let image = match fetched {
                Ok(image) => Some(image),
                Err(e) => {
                    debug!(url = %url, error = %e, "clipboard image unavailable");
                    None
                }
            };
            BackendMessage::CopyReady { text, image }
        });
    }
}
