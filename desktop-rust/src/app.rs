use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, RichText};
use eframe::egui::{FontData, FontDefinitions, FontFamily};
use store_review::config::Config;
use store_review::driver::now_timestamp;
use store_review::overlay_store::JsonOverlayStore;
use store_review_common::export::excel_core::generate_review_xlsx;
use store_review_common::{
    clipboard_payload, merge_rows, needs_next_page, Clock, FilterOptions, ItemCard,
    ItemReviewState, Key, KeyboardNav, LoadState, NavCommand, NoticeLevel, ResultPage, ResultRow, ReviewResult,
    ReviewSession, ReviewStats, SearchFilters, SessionEvent, StoreAggregate, StoreCard, SubmitStep, SystemClock,
    TriageOverlay, View, ViewModel, ALL_OPERATORS,
};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::io::{default_export_name, save_export};
use crate::model::{BackendMessage, ClipImage, Tab, ThumbData};
use crate::thumbs::ThumbBook;

const TOAST_TTL: Duration = Duration::from_secs(3);
const THUMB_SIZE: egui::Vec2 = egui::vec2(160.0, 120.0);

struct Toast {
    level: NoticeLevel,
    message: String,
    until: Instant,
}

/// 結果ビューア（処理済みマークはローカル保存）
struct TriageState {
    overlay: TriageOverlay<JsonOverlayStore>,
    filters: SearchFilters,
    options: FilterOptions,
    provinces: Vec<String>,
    cities: Vec<String>,
    keyword_input: String,
    page: Option<ResultPage>,
    searching: bool,
    /// 未処理が無くて自動で進めたページ数
    skipped_pages: u32,
}

pub struct DesktopApp {
    config: Config,
    backend: Backend,
    rx: Receiver<BackendMessage>,
    session: ReviewSession<SystemClock>,
    nav: KeyboardNav,
    nav_revision: Option<u64>,
    scroll_to_focus: bool,
    tab: Tab,
    operators: Vec<String>,
    operator: String,
    search_input: String,
    drafts: HashMap<String, String>,
    stats: Option<ReviewStats>,
    loading: bool,
    toasts: Vec<Toast>,
    thumbs: ThumbBook<SystemClock>,
    textures: HashMap<String, egui::TextureHandle>,
    triage: TriageState,
    busy: Option<String>,
    /// 画像を載せられるクリップボード。使えない環境では None
    clipboard: Option<arboard::Clipboard>,
}

impl DesktopApp {
    pub fn new(config: Config, backend: Backend, rx: Receiver<BackendMessage>, overlay_path: PathBuf) -> Self {
        let session = ReviewSession::new(SystemClock, config.session_config());
        let thumbs = ThumbBook::new(config.retry_policy(), SystemClock);
        let operator = config.operator.clone().unwrap_or_else(|| ALL_OPERATORS.to_string());

        let mut app = Self {
            backend,
            rx,
            session,
            nav: KeyboardNav::new(),
            nav_revision: None,
            scroll_to_focus: false,
            tab: Tab::default(),
            operators: Vec::new(),
            operator,
            search_input: String::new(),
            drafts: HashMap::new(),
            stats: None,
            loading: false,
            toasts: Vec::new(),
            thumbs,
            textures: HashMap::new(),
            triage: TriageState {
                overlay: TriageOverlay::open(JsonOverlayStore::new(overlay_path)),
                filters: SearchFilters::default(),
                options: FilterOptions::default(),
                provinces: Vec::new(),
                cities: Vec::new(),
                keyword_input: String::new(),
                page: None,
                searching: false,
                skipped_pages: 0,
            },
            busy: None,
            clipboard: arboard::Clipboard::new()
                .map_err(|e| warn!(error = %e, "image clipboard unavailable"))
                .ok(),
            config,
        };
        info!(server = %app.backend.server_url(), "desktop session started");
        app.session.set_operator(Some(&app.operator));
        app.backend.operators();
        app.reload();
        app
    }

    fn operator_filter(&self) -> Option<String> {
        self.session.operator().map(str::to_string)
    }

    fn reload(&mut self) {
        self.loading = true;
        self.backend.load(self.operator_filter());
        self.backend.stats(self.operator_filter());
    }

    fn submit(&mut self, item_id: &str, result: ReviewResult) {
        match self.session.begin_submit(item_id, result) {
            Ok(SubmitStep::Staged(ticket)) => self.backend.submit(ticket, result),
            Ok(SubmitStep::Toggled) => {}
            Err(e) => debug!(item_id, error = %e, "submit ignored"),
        }
    }

    fn save_remark(&mut self, item_id: &str) {
        let text = self.drafts.get(item_id).cloned().unwrap_or_default();
        match self.session.begin_remark(item_id, &text) {
            Ok(ticket) => self.backend.save_remark(ticket, text),
            Err(e) => debug!(item_id, error = %e, "remark not sent"),
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: impl Into<String>) {
        self.toasts.push(Toast {
            level,
            message: message.into(),
            until: Instant::now() + TOAST_TTL,
        });
    }

    fn reset_images(&mut self) {
        self.thumbs.clear();
        self.textures.clear();
    }

    fn poll_messages(&mut self, ctx: &egui::Context) {
        while let Ok(msg) = self.rx.try_recv() {
            match msg {
                BackendMessage::Operators(Ok(list)) => self.operators = list,
                BackendMessage::Operators(Err(reason)) => warn!(%reason, "operator list unavailable"),
                BackendMessage::Loaded(result) => {
                    self.loading = false;
                    match result {
                        Ok((items, verdicts)) => {
                            self.session.load(items, verdicts);
                            self.drafts.clear();
                            self.reset_images();
                        }
                        Err(reason) => {
                            warn!(%reason, "load failed");
                            self.session.notify(NoticeLevel::Error, "加载数据失败，请刷新页面重试");
                        }
                    }
                }
                BackendMessage::Submitted { ticket, outcome } => match outcome {
                    Ok(()) => {
                        if let Err(e) = self.session.confirm_submit(&ticket, &now_timestamp()) {
                            debug!(item_id = ticket.item_id(), error = %e, "stale submit confirmation");
                        }
                        self.backend.stats(self.operator_filter());
                    }
                    Err(reason) => self.session.abort_submit(&ticket, &reason),
                },
                BackendMessage::RemarkSaved { ticket, outcome } => match outcome {
                    Ok(()) => {
                        match self.session.confirm_remark(&ticket, &now_timestamp()) {
                            Ok(()) => {
                                self.drafts.remove(ticket.item_id());
                            }
                            Err(e) => debug!(item_id = ticket.item_id(), error = %e, "stale remark confirmation"),
                        }
                        self.backend.stats(self.operator_filter());
                    }
                    Err(reason) => self.session.abort_remark(&ticket, &reason),
                },
                BackendMessage::Stats(Ok(stats)) => self.stats = Some(stats),
                BackendMessage::Stats(Err(reason)) => {
                    debug!(%reason, "server stats unavailable, using local count");
                    self.stats = Some(self.session.stats());
                }
                BackendMessage::Exported(result) => {
                    self.busy = None;
                    match result {
                        Ok(path) => self.notify(NoticeLevel::Success, format!("已导出: {}", path.display())),
                        Err(reason) => self.notify(NoticeLevel::Error, reason),
                    }
                }
                BackendMessage::Uploaded(result) => {
                    self.busy = None;
                    match result {
                        Ok(outcome) => {
                            info!(total = outcome.total_items, "new cycle uploaded");
                            self.session.reset_cycle();
                            self.reset_images();
                            self.drafts.clear();
                            self.notify(NoticeLevel::Success, outcome.message);
                            self.reload();
                        }
                        Err(reason) => self.notify(NoticeLevel::Error, format!("上传失败: {reason}")),
                    }
                }
                BackendMessage::Searched(result) => self.on_searched(result),
                BackendMessage::FilterOptions(Ok(options)) => self.triage.options = options,
                BackendMessage::Provinces(Ok(list)) => self.triage.provinces = list,
                BackendMessage::Cities(Ok(list)) => self.triage.cities = list,
                BackendMessage::FilterOptions(Err(reason))
                | BackendMessage::Provinces(Err(reason))
                | BackendMessage::Cities(Err(reason)) => self.notify(NoticeLevel::Warning, reason),
                BackendMessage::Thumb(data) => self.on_thumb(ctx, data),
                BackendMessage::CopyReady { text, image } => self.on_copy_ready(ctx, text, image),
            }
        }
    }

    fn on_thumb(&mut self, ctx: &egui::Context, data: ThumbData) {
        match data.image {
            Some(thumb) => {
                if self.thumbs.loaded(&data.item_id, data.generation) {
                    let image = egui::ColorImage::from_rgba_unmultiplied(thumb.size, &thumb.pixels);
                    let texture = ctx.load_texture(
                        format!("thumb-{}", data.item_id),
                        image,
                        egui::TextureOptions::default(),
                    );
                    self.textures.insert(data.item_id, texture);
                }
            }
            None => self.thumbs.failed(&data.item_id, data.generation),
        }
    }

    fn drain_session_events(&mut self) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::Notice { level, message } => self.notify(level, message),
                SessionEvent::StoreCompleted { store_name, .. } => debug!(store = %store_name, "store completed"),
                SessionEvent::Rerendered => {}
            }
        }
    }

    fn poll_thumbs(&mut self) {
        for (item_id, request) in self.thumbs.due_retries() {
            self.backend.fetch_image(item_id, request);
        }
    }

    fn schedule_repaint(&mut self, ctx: &egui::Context) {
        let now = SystemClock.now_ms();
        let mut wait: Option<u64> = self.session.next_deadline().map(|due| due.saturating_sub(now));
        if let Some(ms) = self.thumbs.next_wakeup_ms() {
            wait = Some(wait.map_or(ms, |w| w.min(ms)));
        }
        if !self.toasts.is_empty() {
            wait = Some(wait.map_or(500, |w| w.min(500)));
        }
        if let Some(ms) = wait {
            ctx.request_repaint_after(Duration::from_millis(ms.max(1)));
        }
    }

    fn sync_nav(&mut self) {
        let revision = self.session.revision();
        if self.nav_revision != Some(revision) {
            self.nav.refresh(self.session.view_model().pending_card_ids());
            self.nav_revision = Some(revision);
        }
    }

    fn handle_keys(&mut self, ctx: &egui::Context) {
        if self.tab != Tab::Pending {
            return;
        }
        let typing = ctx.wants_keyboard_input();
        let keys: Vec<Key> = ctx.input(|i| {
            [
                (egui::Key::ArrowUp, Key::Up),
                (egui::Key::ArrowDown, Key::Down),
                (egui::Key::ArrowLeft, Key::Left),
                (egui::Key::ArrowRight, Key::Right),
                (egui::Key::Enter, Key::Confirm),
                (egui::Key::F, Key::Reject),
            ]
            .into_iter()
            .filter(|(k, _)| i.key_pressed(*k))
            .map(|(_, key)| key)
            .collect()
        });

        for key in keys {
            // 前のキーで判定が確定していればカード一覧を取り直す
            self.sync_nav();
            if matches!(key, Key::Confirm | Key::Reject) && self.focused_in_flight() {
                continue;
            }
            match self.nav.handle(key, typing) {
                NavCommand::Focus(_) => self.scroll_to_focus = true,
                NavCommand::MarkPass { item_id, .. } => {
                    self.submit(&item_id, ReviewResult::Pass);
                    self.scroll_to_focus = true;
                }
                NavCommand::MarkFail { item_id } => self.submit(&item_id, ReviewResult::Fail),
                NavCommand::Ignored => {}
            }
        }
    }

    fn focused_in_flight(&self) -> bool {
        self.nav
            .focused_item()
            .is_some_and(|id| self.session.ledger().tentative(id).is_some())
    }

    fn change_operator(&mut self, operator: String) {
        if operator == self.operator {
            return;
        }
        self.operator = operator;
        self.session.set_operator(Some(&self.operator));
        self.reload();
    }

    fn export_server_csv(&mut self) {
        let name = default_export_name(&store_review::export::today(), "csv");
        let Some(path) = rfd::FileDialog::new()
            .add_filter("CSV", &["csv"])
            .set_file_name(name.as_str())
            .save_file()
        else {
            return;
        };
        self.busy = Some("导出中...".to_string());
        self.backend.export(path);
    }

    fn export_local_excel(&mut self) {
        let rows = merge_rows(self.session.items(), self.session.ledger());
        if rows.is_empty() {
            self.notify(NoticeLevel::Warning, "暂无审核结果可导出");
            return;
        }
        let bytes = match generate_review_xlsx(&rows) {
            Ok(bytes) => bytes,
            Err(reason) => {
                self.notify(NoticeLevel::Error, reason);
                return;
            }
        };
        let name = default_export_name(&store_review::export::today(), "xlsx");
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Excel", &["xlsx"])
            .set_file_name(name.as_str())
            .save_file()
        else {
            return;
        };
        match save_export(&path, &bytes) {
            Ok(()) => self.notify(NoticeLevel::Success, format!("已导出: {}", path.display())),
            Err(err) => self.notify(NoticeLevel::Error, format!("保存失败: {err:#}")),
        }
    }

    fn upload_cycle(&mut self) {
        let uploader = self
            .config
            .operator
            .clone()
            .filter(|op| !op.is_empty() && op != ALL_OPERATORS)
            .or_else(|| Some(self.operator.clone()).filter(|op| op != ALL_OPERATORS));
        let Some(uploader) = uploader else {
            self.notify(NoticeLevel::Warning, "请先选择操作人");
            return;
        };
        let Some(file) = rfd::FileDialog::new().add_filter("Excel", &["xlsx"]).pick_file() else {
            return;
        };
        let answer = rfd::MessageDialog::new()
            .set_title("上传新周期")
            .set_description("当前所有审核结果将被清空，确定开始新周期吗？")
            .set_buttons(rfd::MessageButtons::YesNo)
            .show();
        if !matches!(answer, rfd::MessageDialogResult::Yes) {
            return;
        }
        self.busy = Some("上传中...".to_string());
        self.backend.upload(file, uploader);
    }

    // ---- 結果ビューア ----

    fn triage_search(&mut self) {
        self.triage.searching = true;
        self.backend.search(self.triage.filters.clone());
    }

    fn on_searched(&mut self, result: Result<ResultPage, String>) {
        let page = match result {
            Ok(page) => page,
            Err(reason) => {
                self.triage.searching = false;
                self.notify(NoticeLevel::Error, reason);
                return;
            }
        };
        let pending = self.triage.overlay.split(&page.results).0.len();
        if needs_next_page(pending, page.page, page.total_pages) {
            debug!(page = page.page, "page fully processed, advancing");
            self.triage.skipped_pages += 1;
            self.triage.filters.page = page.page + 1;
            self.backend.search(self.triage.filters.clone());
            return;
        }
        self.triage.searching = false;
        self.triage.filters.page = page.page.max(1);
        self.triage.page = Some(page);
    }

    fn triage_mark(&mut self, row_id: &str, processed: bool) {
        let result = if processed {
            self.triage.overlay.mark_processed(row_id)
        } else {
            self.triage.overlay.restore(row_id)
        };
        if let Err(e) = result {
            self.notify(NoticeLevel::Error, format!("保存失败: {e}"));
            return;
        }
        if let Some(page) = &self.triage.page {
            let pending = self.triage.overlay.split(&page.results).0.len();
            if needs_next_page(pending, page.page, page.total_pages) {
                self.triage.skipped_pages = 0;
                self.triage.filters.page = page.page + 1;
                self.triage_search();
            }
        }
    }

    fn copy_row(&mut self, ctx: &egui::Context, row: &ResultRow) {
        let payload = clipboard_payload(row, self.clipboard.is_some());
        match payload.image_url {
            Some(url) => self.backend.prepare_copy(payload.text, url),
            None => self.copy_text(ctx, payload.text),
        }
    }

    /// 画像が取れていれば画像を、だめならテキストを載せる
    fn on_copy_ready(&mut self, ctx: &egui::Context, text: String, image: Option<ClipImage>) {
        let (Some(image), Some(clipboard)) = (image, self.clipboard.as_mut()) else {
            self.copy_text(ctx, text);
            return;
        };
        let data = arboard::ImageData {
            width: image.width,
            height: image.height,
            bytes: image.rgba.into(),
        };
        match clipboard.set_image(data) {
            Ok(()) => self.notify(NoticeLevel::Success, "已复制图片到剪贴板"),
            Err(e) => {
                warn!(error = %e, "image copy failed, falling back to text");
                self.copy_text(ctx, text);
            }
        }
    }

    fn copy_text(&mut self, ctx: &egui::Context, text: String) {
        ctx.output_mut(|o| o.copied_text = text);
        self.notify(NoticeLevel::Success, "已复制到剪贴板");
    }

    // ---- 描画 ----

    fn render_top(&mut self, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("文件", |ui| {
                if ui.button("刷新").clicked() {
                    self.reload();
                    ui.close_menu();
                }
                ui.separator();
                let idle = self.busy.is_none();
                if ui.add_enabled(idle, egui::Button::new("导出审核结果 (CSV)")).clicked() {
                    self.export_server_csv();
                    ui.close_menu();
                }
                if ui.add_enabled(idle, egui::Button::new("本地导出 (Excel)")).clicked() {
                    self.export_local_excel();
                    ui.close_menu();
                }
                ui.separator();
                if ui.add_enabled(idle, egui::Button::new("上传新周期...")).clicked() {
                    self.upload_cycle();
                    ui.close_menu();
                }
            });

            ui.separator();
            ui.label("操作人");
            let mut selected = self.operator.clone();
            egui::ComboBox::from_id_source("operator")
                .selected_text(selected.as_str())
                .show_ui(ui, |ui| {
                    ui.selectable_value(&mut selected, ALL_OPERATORS.to_string(), ALL_OPERATORS);
                    for op in &self.operators {
                        ui.selectable_value(&mut selected, op.clone(), op.as_str());
                    }
                });
            if selected != self.operator {
                self.change_operator(selected);
            }

            ui.separator();
            if let Some(stats) = &self.stats {
                ui.label(format!("进度 {}/{} ({:.1}%)", stats.reviewed, stats.total, stats.percentage));
            }
            if self.loading {
                ui.spinner();
            }
            if let Some(busy) = &self.busy {
                ui.label(RichText::new(busy).color(Color32::from_rgb(246, 196, 69)));
            }
        });

        ui.horizontal(|ui| {
            for (tab, label) in [(Tab::Pending, "待审核"), (Tab::Completed, "已完成"), (Tab::Triage, "结果查询")] {
                if ui.selectable_label(self.tab == tab, label).clicked() && self.tab != tab {
                    self.tab = tab;
                    match tab {
                        Tab::Pending => self.session.switch_view(View::Pending),
                        Tab::Completed => self.session.switch_view(View::Completed),
                        Tab::Triage => {
                            if self.triage.options == FilterOptions::default() {
                                self.backend.filter_options();
                            }
                            if self.triage.page.is_none() {
                                self.triage_search();
                            }
                        }
                    }
                }
            }

            if self.tab != Tab::Triage {
                ui.separator();
                let response = ui.add(egui::TextEdit::singleline(&mut self.search_input).hint_text("门店编号 / 门店名称"));
                let enter = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
                if ui.button("搜索").clicked() || enter {
                    let keyword = self.search_input.clone();
                    self.session.set_search(&keyword);
                }
                if self.session.search_keyword().is_some() && ui.button("清除").clicked() {
                    self.search_input.clear();
                    self.session.clear_search();
                }
            }
        });
    }

    fn render_review(&mut self, ui: &mut egui::Ui) {
        match self.session.view_model() {
            ViewModel::Pending { stores, hidden_stores } => {
                if stores.is_empty() {
                    ui.label(if self.loading { "加载中..." } else { "所有门店已完成审核" });
                    return;
                }
                ui.label(
                    RichText::new("←↑→↓ 移动  Enter 合格  F 不合格")
                        .color(Color32::from_gray(150))
                        .size(12.0),
                );
                egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                    for store in &stores {
                        self.render_store(ui, store);
                        ui.add_space(8.0);
                    }
                    if hidden_stores > 0 {
                        ui.label(RichText::new(format!("还有 {hidden_stores} 家门店待审核")).color(Color32::from_gray(170)));
                    }
                });
                self.scroll_to_focus = false;
            }
            ViewModel::Completed { stores } => {
                if stores.is_empty() {
                    ui.label("暂无已完成的门店");
                    return;
                }
                egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                    for store in &stores {
                        self.render_completed(ui, store);
                    }
                });
            }
            ViewModel::Search { label, items, .. } => {
                ui.label(RichText::new(label).strong());
                egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
                    for card in &items {
                        ui.label(RichText::new(&card.item.store_name).color(Color32::from_gray(170)).size(12.0));
                        self.render_item(ui, card, false);
                        ui.add_space(6.0);
                    }
                });
            }
        }
    }

    fn render_store(&mut self, ui: &mut egui::Ui, store: &StoreCard) {
        let frame = egui::Frame::none()
            .fill(if store.exiting { Color32::from_rgb(20, 40, 28) } else { Color32::from_rgb(24, 28, 40) })
            .stroke(egui::Stroke::new(1.0, Color32::from_gray(40)))
            .rounding(egui::Rounding::same(10.0))
            .inner_margin(egui::Margin::same(10.0));

        frame.show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.horizontal(|ui| {
                ui.label(RichText::new(&store.store_name).strong().size(16.0));
                ui.label(RichText::new(&store.store_id).color(Color32::from_gray(150)));
                ui.label(RichText::new(format!("操作人: {}", store.operator)).color(Color32::from_gray(170)));
                if store.exiting {
                    ui.label(RichText::new("✔ 已完成").color(Color32::from_rgb(80, 200, 120)));
                }
            });
            ui.separator();
            for card in &store.items {
                let focused = self.nav.focused_item() == Some(card.item.id.as_str());
                self.render_item(ui, card, focused);
                ui.add_space(4.0);
            }
        });
    }

    fn render_item(&mut self, ui: &mut egui::Ui, card: &ItemCard, focused: bool) {
        let item = &card.item;
        let frame = egui::Frame::none()
            .fill(if focused { Color32::from_rgb(31, 35, 48) } else { Color32::from_rgb(28, 32, 44) })
            .stroke(egui::Stroke::new(
                1.0,
                if focused { Color32::from_rgb(246, 196, 69) } else { Color32::from_gray(40) },
            ))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));

        let inner = frame.show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.horizontal(|ui| {
                self.render_thumb(ui, &item.id, item.reference_url(), &item.caption());
                ui.add_space(8.0);
                ui.vertical(|ui| {
                    ui.label(RichText::new(&item.item_name).strong());
                    ui.label(RichText::new(&item.category).color(Color32::from_gray(170)).size(12.0));
                    if item.no_field_result {
                        ui.label(RichText::new("无现场结果").color(Color32::from_rgb(230, 150, 60)).size(12.0));
                    }
                    ui.add_space(4.0);
                    self.render_verdict_buttons(ui, card);
                    if card.editor_open {
                        self.render_remark_editor(ui, card);
                    } else if let Some(verdict) = card.verdict.as_ref().filter(|v| v.has_remark()) {
                        ui.label(RichText::new(format!("问题描述: {}", verdict.remark.trim())).size(12.0));
                    }
                });
            });
        });

        if focused && self.scroll_to_focus {
            inner.response.scroll_to_me(Some(egui::Align::Center));
        }
        if inner.response.interact(egui::Sense::click()).clicked() {
            if let Some(idx) = self.nav.cards().iter().position(|id| id == &item.id) {
                self.nav.set_focus(idx);
            }
        }
    }

    fn render_verdict_buttons(&mut self, ui: &mut egui::Ui, card: &ItemCard) {
        let current = card.verdict.as_ref().map(|v| v.result);
        ui.horizontal(|ui| {
            let enabled = !card.in_flight;
            let pass = egui::Button::new("合格").selected(current == Some(ReviewResult::Pass));
            if ui.add_enabled(enabled, pass).clicked() {
                self.submit(&card.item.id, ReviewResult::Pass);
            }
            let fail = egui::Button::new("不合格").selected(current == Some(ReviewResult::Fail));
            if ui.add_enabled(enabled, fail).clicked() {
                self.submit(&card.item.id, ReviewResult::Fail);
            }
            if card.in_flight {
                ui.spinner();
            }
            match card.state {
                ItemReviewState::FailPendingRemark => {
                    ui.label(RichText::new("请输入问题描述").color(Color32::from_rgb(230, 150, 60)).size(12.0));
                }
                ItemReviewState::FailComplete | ItemReviewState::Pass | ItemReviewState::Unreviewed => {}
            }
        });
    }

    fn render_remark_editor(&mut self, ui: &mut egui::Ui, card: &ItemCard) {
        let id = card.item.id.clone();
        let initial = card.verdict.as_ref().map(|v| v.remark.clone()).unwrap_or_default();
        let draft = self.drafts.entry(id.clone()).or_insert(initial);
        let mut save = false;
        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(draft)
                    .hint_text("问题描述")
                    .desired_width(ui.available_width() - 60.0),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                save = true;
            }
            if ui.add_enabled(!card.in_flight, egui::Button::new("保存")).clicked() {
                save = true;
            }
        });
        if save {
            self.save_remark(&id);
        }
    }

    fn render_thumb(&mut self, ui: &mut egui::Ui, item_id: &str, url: Option<&str>, caption: &str) {
        if let Some(texture) = self.textures.get(item_id) {
            ui.add(egui::Image::new(texture).fit_to_exact_size(THUMB_SIZE))
                .on_hover_text(caption);
            return;
        }
        if let Some(request) = self.thumbs.ensure(item_id, url) {
            self.backend.fetch_image(item_id.to_string(), request);
        }
        let label = self.thumbs.label(item_id);
        let failed = self.thumbs.state(item_id) == Some(LoadState::Failed);
        let mut retry = false;
        ui.allocate_ui_with_layout(THUMB_SIZE, egui::Layout::top_down(egui::Align::Center), |ui| {
            ui.set_min_size(THUMB_SIZE);
            ui.add_space(THUMB_SIZE.y / 3.0);
            ui.label(RichText::new(label).color(Color32::from_gray(150)).size(12.0));
            if failed && ui.small_button("重新加载").clicked() {
                retry = true;
            }
        });
        if retry {
            if let Some(request) = self.thumbs.manual_retry(item_id) {
                self.backend.fetch_image(item_id.to_string(), request);
            }
        }
    }

    fn render_completed(&mut self, ui: &mut egui::Ui, store: &StoreAggregate) {
        let title = format!(
            "{} ({})  合格 {} / 不合格 {}  最后审核: {}",
            store.store_name,
            store.store_id,
            store.pass_count,
            store.fail_count,
            store.last_activity.as_deref().unwrap_or("-")
        );
        egui::CollapsingHeader::new(title)
            .id_source(format!("done-{}", store.store_id))
            .show(ui, |ui| {
                ui.label(RichText::new(format!("操作人: {}", store.operator)).color(Color32::from_gray(170)));
                for item in &store.items {
                    let verdict = self.session.ledger().confirmed(&item.id).cloned();
                    ui.horizontal(|ui| {
                        ui.label(&item.item_name);
                        match &verdict {
                            Some(v) if v.result == ReviewResult::Pass => {
                                ui.label(RichText::new("合格").color(Color32::from_rgb(80, 200, 120)));
                            }
                            Some(v) => {
                                ui.label(RichText::new("不合格").color(Color32::from_rgb(230, 90, 90)));
                                ui.label(RichText::new(v.remark.trim()).size(12.0));
                            }
                            None => {
                                ui.label("-");
                            }
                        }
                    });
                    if verdict.as_ref().is_some_and(|v| v.result == ReviewResult::Fail) {
                        let card = ItemCard {
                            item: item.clone(),
                            state: ItemReviewState::FailComplete,
                            editor_open: true,
                            in_flight: false,
                            verdict,
                        };
                        ui.indent(format!("edit-{}", item.id), |ui| self.render_remark_editor(ui, &card));
                    }
                }
            });
    }

    fn render_triage(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let mut search = false;
        ui.horizontal_wrapped(|ui| {
            if let Some(v) = combo(ui, "war_zone", "战区", &self.triage.filters.war_zone, &self.triage.options.war_zones) {
                self.triage.filters.set_war_zone(&v);
                self.triage.provinces.clear();
                self.triage.cities.clear();
                if !v.is_empty() {
                    self.backend.provinces(v);
                }
            }
            let province_enabled = self.triage.filters.province_enabled();
            ui.add_enabled_ui(province_enabled, |ui| {
                if let Some(v) = combo(ui, "province", "省份", &self.triage.filters.province, &self.triage.provinces) {
                    self.triage.filters.set_province(&v);
                    self.triage.cities.clear();
                    if !v.is_empty() {
                        self.backend.cities(v);
                    }
                }
            });
            let city_enabled = self.triage.filters.city_enabled();
            ui.add_enabled_ui(city_enabled, |ui| {
                if let Some(v) = combo(ui, "city", "城市", &self.triage.filters.city, &self.triage.cities) {
                    self.triage.filters.set_city(&v);
                }
            });
            if let Some(v) = combo(ui, "store_tag", "门店标签", &self.triage.filters.store_tag, &self.triage.options.store_tags) {
                self.triage.filters.set_store_tag(&v);
            }
            if let Some(v) = combo(
                ui,
                "review_result",
                "审核结果",
                &self.triage.filters.review_result,
                &self.triage.options.review_results,
            ) {
                self.triage.filters.set_review_result(&v);
            }
            ui.add(egui::TextEdit::singleline(&mut self.triage.keyword_input).hint_text("关键词").desired_width(140.0));
            if ui.button("查询").clicked() {
                search = true;
            }
            if ui.button("重置").clicked() {
                self.triage.filters.clear();
                self.triage.keyword_input.clear();
                self.triage.provinces.clear();
                self.triage.cities.clear();
                search = true;
            }
        });
        if search {
            let keyword = self.triage.keyword_input.clone();
            self.triage.filters.set_keyword(&keyword);
            self.triage.filters.page = 1;
            self.triage.skipped_pages = 0;
            self.triage_search();
        }
        ui.separator();

        if self.triage.searching {
            ui.spinner();
            return;
        }
        let Some(page) = self.triage.page.clone() else {
            ui.label("暂无数据");
            return;
        };

        ui.horizontal(|ui| {
            ui.label(format!("共 {} 条  第 {}/{} 页", page.total_count, page.page, page.total_pages.max(1)));
            if self.triage.skipped_pages > 0 {
                ui.label(
                    RichText::new(format!("已跳过 {} 页已处理记录", self.triage.skipped_pages))
                        .color(Color32::from_gray(150)),
                );
            }
            if ui.add_enabled(page.page > 1, egui::Button::new("上一页")).clicked() {
                self.triage.filters.page = page.page - 1;
                self.triage.skipped_pages = 0;
                self.triage_search();
            }
            if ui.add_enabled(page.has_more(), egui::Button::new("下一页")).clicked() {
                self.triage.filters.page = page.page + 1;
                self.triage.skipped_pages = 0;
                self.triage_search();
            }
        });

        let (pending, done): (Vec<ResultRow>, Vec<ResultRow>) = {
            let (p, d) = self.triage.overlay.split(&page.results);
            (p.into_iter().cloned().collect(), d.into_iter().cloned().collect())
        };

        egui::ScrollArea::vertical().auto_shrink([false, false]).show(ui, |ui| {
            if pending.is_empty() {
                ui.label("本页记录均已处理");
            }
            for row in &pending {
                self.render_row(ui, ctx, row, false);
            }
            if !done.is_empty() {
                egui::CollapsingHeader::new(format!("已处理 ({})", done.len()))
                    .id_source("triage-done")
                    .show(ui, |ui| {
                        for row in &done {
                            self.render_row(ui, ctx, row, true);
                        }
                    });
            }
        });
    }

    fn render_row(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, row: &ResultRow, processed: bool) {
        let frame = egui::Frame::none()
            .fill(if processed { Color32::from_rgb(30, 30, 30) } else { Color32::from_rgb(24, 28, 40) })
            .stroke(egui::Stroke::new(1.0, Color32::from_gray(40)))
            .rounding(egui::Rounding::same(8.0))
            .inner_margin(egui::Margin::same(8.0));
        frame.show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.horizontal(|ui| {
                ui.label(RichText::new(format!("{} / {}", row.store_name, row.item_name)).strong());
                let color = if row.review_result == ReviewResult::Fail.as_str() {
                    Color32::from_rgb(230, 90, 90)
                } else {
                    Color32::from_rgb(80, 200, 120)
                };
                ui.label(RichText::new(&row.review_result).color(color));
            });
            ui.label(
                RichText::new(format!("{} {} {} {}", row.war_zone, row.province, row.city, row.store_tag))
                    .color(Color32::from_gray(160))
                    .size(12.0),
            );
            if !row.problem_note.trim().is_empty() {
                ui.label(RichText::new(format!("问题描述: {}", row.problem_note.trim())).size(12.0));
            }
            ui.horizontal(|ui| {
                if let Some(url) = row.reference_url() {
                    ui.hyperlink_to("标准图", url);
                }
                if ui.small_button("复制").clicked() {
                    self.copy_row(ctx, row);
                }
                if processed {
                    if ui.small_button("恢复").clicked() {
                        self.triage_mark(&row.id, false);
                    }
                } else if ui.small_button("标记已处理").clicked() {
                    self.triage_mark(&row.id, true);
                }
            });
        });
        ui.add_space(4.0);
    }

    fn render_toasts(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        self.toasts.retain(|t| t.until > now);
        if self.toasts.is_empty() {
            return;
        }
        egui::TopBottomPanel::bottom("toasts").show(ctx, |ui| {
            for toast in &self.toasts {
                let color = match toast.level {
                    NoticeLevel::Success => Color32::from_rgb(80, 200, 120),
                    NoticeLevel::Warning => Color32::from_rgb(246, 196, 69),
                    NoticeLevel::Error => Color32::from_rgb(230, 90, 90),
                };
                ui.label(RichText::new(&toast.message).color(color));
            }
        });
    }
}

/// 「全部」付きの選択肢。変更されたら新しい値（空文字は全部）
fn combo(ui: &mut egui::Ui, id: &str, label: &str, current: &str, options: &[String]) -> Option<String> {
    let mut changed = None;
    ui.label(label);
    let text = if current.is_empty() { ALL_OPERATORS } else { current };
    egui::ComboBox::from_id_source(id).selected_text(text).show_ui(ui, |ui| {
        if ui.selectable_label(current.is_empty(), ALL_OPERATORS).clicked() && !current.is_empty() {
            changed = Some(String::new());
        }
        for option in options {
            if ui.selectable_label(current == option, option.as_str()).clicked() && current != option {
                changed = Some(option.clone());
            }
        }
    });
    changed
}

pub fn configure_fonts(ctx: &egui::Context) {
    let mut fonts = FontDefinitions::default();
    let candidates = [
        r"C:\Windows\Fonts\msyh.ttc",
        r"C:\Windows\Fonts\simhei.ttf",
        "/System/Library/Fonts/PingFang.ttc",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "/usr/share/fonts/truetype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
        "/usr/share/fonts/truetype/wqy/wqy-microhei.ttc",
    ];

    for path in candidates {
        if let Ok(data) = std::fs::read(path) {
            fonts.font_data.insert("cjk_fallback".to_string(), FontData::from_owned(data));
            fonts.families
                .entry(FontFamily::Proportional)
                .or_default()
                .insert(0, "cjk_fallback".to_string());
            fonts.families
                .entry(FontFamily::Monospace)
                .or_default()
                .insert(0, "cjk_fallback".to_string());
            ctx.set_fonts(fonts);
            return;
        }
    }
    warn!("no CJK font found, labels may not render");
}

impl eframe::App for DesktopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_messages(ctx);
        self.session.tick();
        self.poll_thumbs();
        self.drain_session_events();
        self.sync_nav();
        self.handle_keys(ctx);

        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            self.render_top(ui);
        });

        self.render_toasts(ctx);

        egui::CentralPanel::default().show(ctx, |ui| match self.tab {
            Tab::Pending | Tab::Completed => self.render_review(ui),
            Tab::Triage => self.render_triage(ui, ctx),
        });

        self.drain_session_events();
        self.schedule_repaint(ctx);
    }
}
