//! ReviewDriver の結合テスト（サーバーはメモリ上の偽物）

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use store_review::api::{ReviewApi, UploadOutcome};
use store_review::driver::{check_workbook, Outcome, ReviewDriver};
use store_review::error::{AppError, Result};
use store_review_common::export::excel_core::generate_review_xlsx;
use store_review_common::{
    ExportRow, FilterOptions, InspectionItem, ManualClock, NoticeLevel, ResultPage, ReviewResult, ReviewSession,
    ReviewStats, ReviewVerdict, SearchFilters, SessionConfig, SessionEvent, ViewModel,
};

#[derive(Default)]
struct FakeApi {
    items: Mutex<Vec<InspectionItem>>,
    verdicts: Mutex<Vec<ReviewVerdict>>,
    /// 次の書き込みを拒否する文言
    reject_with: Mutex<Option<String>>,
    fail_loads: Mutex<bool>,
    writes: Mutex<Vec<String>>,
    next_cycle: Mutex<Vec<InspectionItem>>,
}

impl FakeApi {
    fn with_items(items: Vec<InspectionItem>) -> Self {
        let api = Self::default();
        *api.items.lock().unwrap() = items;
        api
    }

    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn take_rejection(&self) -> Option<String> {
        self.reject_with.lock().unwrap().take()
    }
}

#[async_trait]
impl ReviewApi for FakeApi {
    async fn list_operators(&self) -> Result<Vec<String>> {
        Ok(vec!["张三".into(), "李四".into()])
    }

    async fn list_items(&self, operator: Option<&str>) -> Result<Vec<InspectionItem>> {
        if *self.fail_loads.lock().unwrap() {
            return Err(AppError::Api("HTTP 500".into()));
        }
        let items = self.items.lock().unwrap().clone();
        Ok(match operator {
            Some(op) => items.into_iter().filter(|i| i.operator == op).collect(),
            None => items,
        })
    }

    async fn list_reviews(&self) -> Result<Vec<ReviewVerdict>> {
        Ok(self.verdicts.lock().unwrap().clone())
    }

    async fn submit_verdict(&self, item_id: &str, result: ReviewResult) -> Result<()> {
        if let Some(message) = self.take_rejection() {
            return Err(AppError::Api(message));
        }
        self.writes.lock().unwrap().push(format!("verdict:{}:{}", item_id, result));
        Ok(())
    }

    async fn submit_remark(&self, item_id: &str, remark: &str) -> Result<()> {
        if let Some(message) = self.take_rejection() {
            return Err(AppError::Api(message));
        }
        self.writes.lock().unwrap().push(format!("remark:{}:{}", item_id, remark));
        Ok(())
    }

    async fn stats(&self, _operator: Option<&str>) -> Result<ReviewStats> {
        Err(AppError::Api("HTTP 404".into()))
    }

    async fn export_csv(&self) -> Result<Vec<u8>> {
        Err(AppError::NothingToExport)
    }

    async fn upload_items(&self, _file: &Path, operator: &str) -> Result<UploadOutcome> {
        let items = std::mem::take(&mut *self.next_cycle.lock().unwrap());
        *self.items.lock().unwrap() = items.clone();
        self.verdicts.lock().unwrap().clear();
        self.writes.lock().unwrap().push(format!("upload:{}", operator));
        Ok(UploadOutcome {
            message: format!("成功导入 {} 条检查项", items.len()),
            total_items: items.len(),
        })
    }

    async fn filter_options(&self) -> Result<FilterOptions> {
        Ok(FilterOptions::default())
    }

    async fn provinces(&self, _war_zone: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn cities(&self, _province: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn search(&self, _filters: &SearchFilters) -> Result<ResultPage> {
        Ok(ResultPage::default())
    }
}

fn item(store: &str, name: &str) -> InspectionItem {
    InspectionItem {
        id: format!("{}_{}", store, name),
        store_id: store.to_string(),
        store_name: format!("{}店", store),
        operator: "张三".to_string(),
        item_name: name.to_string(),
        ..Default::default()
    }
}

fn driver(api: FakeApi, delay_ms: u64) -> (ReviewDriver<FakeApi, ManualClock>, ManualClock) {
    let clock = ManualClock::new(10_000);
    let config = SessionConfig {
        window_size: 10,
        completion_delay: Duration::from_millis(delay_ms),
    };
    let session = ReviewSession::new(clock.clone(), config);
    (ReviewDriver::new(api, session), clock)
}

fn notices(events: &[SessionEvent], level: NoticeLevel) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Notice { level: l, message } if *l == level => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn pending_store_ids(driver: &ReviewDriver<FakeApi, ManualClock>) -> Vec<(String, bool)> {
    match driver.session().view_model() {
        ViewModel::Pending { stores, .. } => stores.into_iter().map(|s| (s.store_id, s.exiting)).collect(),
        other => panic!("pending view expected: {:?}", other),
    }
}

#[tokio::test]
async fn test_passing_every_item_completes_store_after_delay() {
    let api = FakeApi::with_items(vec![item("S1", "门头"), item("S1", "灯箱"), item("S2", "门头")]);
    let (mut driver, clock) = driver(api, 500);
    driver.load(None).await.unwrap();

    assert_eq!(driver.submit("S1_门头", ReviewResult::Pass).await.unwrap(), Outcome::Sent);
    assert_eq!(driver.submit("S1_灯箱", ReviewResult::Pass).await.unwrap(), Outcome::Sent);

    let events = driver.session_mut().drain_events();
    assert!(notices(&events, NoticeLevel::Success).contains(&"审核成功: 合格".to_string()));
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::StoreCompleted { .. })));

    // 遅延中はカードを残す
    assert_eq!(
        pending_store_ids(&driver),
        vec![("S1".to_string(), true), ("S2".to_string(), false)]
    );
    assert!(driver.session().completed().is_empty());

    clock.advance(499);
    assert!(!driver.tick());
    clock.advance(1);
    assert!(driver.tick());

    let events = driver.session_mut().drain_events();
    assert!(notices(&events, NoticeLevel::Success).contains(&"门店 S1店 已完成审核".to_string()));
    assert!(events
        .iter()
        .any(|e| matches!(e, SessionEvent::StoreCompleted { store_id, .. } if store_id == "S1")));
    assert_eq!(pending_store_ids(&driver), vec![("S2".to_string(), false)]);
    assert_eq!(driver.session().completed()[0].store_id, "S1");
    assert_eq!(driver.api().write_count(), 2);
}

#[tokio::test]
async fn test_rejected_write_leaves_state_untouched() {
    let api = FakeApi::with_items(vec![item("S1", "门头")]);
    *api.reject_with.lock().unwrap() = Some("数据库错误".to_string());
    let (mut driver, _) = driver(api, 0);
    driver.load(None).await.unwrap();

    let outcome = driver.submit("S1_门头", ReviewResult::Pass).await.unwrap();
    assert_eq!(outcome, Outcome::Failed("数据库错误".to_string()));

    let session = driver.session();
    assert!(session.ledger().confirmed("S1_门头").is_none());
    assert!(session.ledger().tentative("S1_门头").is_none());
    assert!(session.completed().is_empty());

    let events = driver.session_mut().drain_events();
    assert_eq!(notices(&events, NoticeLevel::Error), vec!["提交失败: 数据库错误".to_string()]);

    // 再試行は通る
    assert_eq!(driver.submit("S1_门头", ReviewResult::Pass).await.unwrap(), Outcome::Sent);
    assert_eq!(driver.session().completed().len(), 1);
}

#[tokio::test]
async fn test_fail_needs_remark_before_store_completes() {
    let api = FakeApi::with_items(vec![item("S1", "门头")]);
    let (mut driver, _) = driver(api, 0);
    driver.load(None).await.unwrap();

    assert_eq!(driver.submit("S1_门头", ReviewResult::Fail).await.unwrap(), Outcome::Sent);
    assert!(driver.session().is_editor_open("S1_门头"));
    assert!(driver.session().completed().is_empty());

    // 空の描述は送信しない
    assert_eq!(driver.save_remark("S1_门头", "   ").await.unwrap(), Outcome::Rejected);
    assert_eq!(driver.api().write_count(), 1);
    let events = driver.session_mut().drain_events();
    assert_eq!(notices(&events, NoticeLevel::Warning), vec!["请输入问题描述".to_string()]);

    assert_eq!(driver.save_remark("S1_门头", " 灯箱破损 ").await.unwrap(), Outcome::Sent);
    assert_eq!(
        driver.api().writes.lock().unwrap().last().cloned(),
        Some("remark:S1_门头:灯箱破损".to_string())
    );
    assert!(!driver.session().is_editor_open("S1_门头"));
    assert_eq!(driver.session().completed().len(), 1);
    assert_eq!(driver.session().completed()[0].fail_count, 1);
}

#[tokio::test]
async fn test_fail_on_remarked_item_only_toggles_editor() {
    let api = FakeApi::with_items(vec![item("S1", "门头"), item("S1", "灯箱")]);
    let mut verdict = ReviewVerdict::new("S1_门头", ReviewResult::Fail);
    verdict.remark = "招牌脏污".to_string();
    verdict.reviewed_at = "2025-03-01 09:00:00".to_string();
    *api.verdicts.lock().unwrap() = vec![verdict];

    let (mut driver, _) = driver(api, 0);
    driver.load(None).await.unwrap();

    assert_eq!(driver.submit("S1_门头", ReviewResult::Fail).await.unwrap(), Outcome::Toggled);
    assert!(driver.session().is_editor_open("S1_门头"));
    assert_eq!(driver.submit("S1_门头", ReviewResult::Fail).await.unwrap(), Outcome::Toggled);
    assert!(!driver.session().is_editor_open("S1_门头"));
    assert_eq!(driver.api().write_count(), 0);
}

#[tokio::test]
async fn test_unknown_item_is_ignored() {
    let api = FakeApi::with_items(vec![item("S1", "门头")]);
    let (mut driver, _) = driver(api, 0);
    driver.load(None).await.unwrap();

    assert_eq!(driver.submit("S9_门头", ReviewResult::Pass).await.unwrap(), Outcome::Ignored);
    assert_eq!(driver.save_remark("S9_门头", "x").await.unwrap(), Outcome::Ignored);
    assert_eq!(driver.api().write_count(), 0);
}

#[tokio::test]
async fn test_load_failure_is_reported() {
    let api = FakeApi::with_items(vec![item("S1", "门头")]);
    *api.fail_loads.lock().unwrap() = true;
    let (mut driver, _) = driver(api, 0);

    assert!(driver.load(None).await.is_err());
    let events = driver.session_mut().drain_events();
    assert_eq!(
        notices(&events, NoticeLevel::Error),
        vec!["加载数据失败，请刷新页面重试".to_string()]
    );
    assert!(driver.session().items().is_empty());
}

#[tokio::test]
async fn test_operator_filter_and_local_stats() {
    let mut other = item("S2", "门头");
    other.operator = "李四".to_string();
    let api = FakeApi::with_items(vec![item("S1", "门头"), other]);
    let (mut driver, _) = driver(api, 0);

    driver.load(Some("张三")).await.unwrap();
    assert_eq!(driver.session().items().len(), 1);
    assert_eq!(driver.session().operator(), Some("张三"));

    driver.load(Some("全部")).await.unwrap();
    assert_eq!(driver.session().items().len(), 2);
    assert_eq!(driver.session().operator(), None);

    driver.submit("S1_门头", ReviewResult::Pass).await.unwrap();
    // /api/stats が使えなければ手元で数える
    let stats = driver.stats().await;
    assert_eq!((stats.total, stats.reviewed), (2, 1));
    assert_eq!(stats.percentage, 50.0);
}

#[tokio::test]
async fn test_upload_starts_new_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("items.xlsx");
    let row = ExportRow {
        store_name: "北站店".into(),
        store_id: "S7".into(),
        region: String::new(),
        item_name: "门头".into(),
        category: String::new(),
        operator: "张三".into(),
        image_url: String::new(),
        result: String::new(),
        remark: String::new(),
        reviewed_at: String::new(),
    };
    std::fs::write(&file, generate_review_xlsx(&[row]).unwrap()).unwrap();
    assert_eq!(check_workbook(&file).unwrap(), 1);

    let api = FakeApi::with_items(vec![item("S1", "门头")]);
    *api.verdicts.lock().unwrap() = vec![ReviewVerdict::new("S1_门头", ReviewResult::Pass)];
    *api.next_cycle.lock().unwrap() = vec![item("S7", "门头")];
    let (mut driver, _) = driver(api, 0);
    driver.load(None).await.unwrap();
    assert_eq!(driver.session().completed().len(), 1);

    let outcome = driver.upload_cycle(&file, "窦").await.unwrap();
    assert_eq!(outcome.total_items, 1);
    assert!(driver.session().completed().is_empty());
    assert!(driver.session().ledger().is_empty());
    assert_eq!(driver.session().items()[0].id, "S7_门头");

    let events = driver.session_mut().drain_events();
    assert!(notices(&events, NoticeLevel::Success).contains(&"成功导入 1 条检查项".to_string()));
}

#[test]
fn test_workbook_must_be_xlsx() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("items.csv");
    std::fs::write(&csv, "a,b\n1,2\n").unwrap();
    let err = check_workbook(&csv).unwrap_err();
    assert!(matches!(err, AppError::InvalidUpload(ref m) if m == "只支持.xlsx文件"));

    let missing = dir.path().join("missing.xlsx");
    assert!(matches!(check_workbook(&missing), Err(AppError::InvalidUpload(_))));
}
