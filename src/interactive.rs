//! 対話式審核
//!
//! 未完了ウィンドウの先頭から、判定が必要なカードを1枚ずつ提示する。
//! 不合格は続けて問題描述を入力する。

use crate::api::ReviewApi;
use crate::driver::{Outcome, ReviewDriver};
use crate::error::{AppError, Result};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::time::Duration;
use store_review_common::{
    Clock, ItemCard, ItemReviewState, NoticeLevel, ReviewResult, SessionEvent, StoreCard, SystemClock, ViewModel,
};

/// 対話アクション
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    Pass,
    Fail,
    /// このカードをスキップ
    Skip,
    /// この門店の残りをスキップ
    SkipStore,
    Quit,
}

/// 入力を解釈する。不明な入力は None
pub fn parse_action(input: &str) -> Option<ReviewAction> {
    match input.trim() {
        "p" | "P" | "1" | "合格" => Some(ReviewAction::Pass),
        "f" | "F" | "2" | "不合格" => Some(ReviewAction::Fail),
        "" | "s" => Some(ReviewAction::Skip),
        "S" => Some(ReviewAction::SkipStore),
        "q" | "Q" => Some(ReviewAction::Quit),
        _ => None,
    }
}

/// 判定が必要な最初のカード（スキップ済みを除く）
pub fn next_card<'a>(stores: &'a [StoreCard], skipped: &HashSet<String>) -> Option<(&'a StoreCard, &'a ItemCard)> {
    stores
        .iter()
        .filter(|s| !s.exiting)
        .flat_map(|s| s.items.iter().map(move |c| (s, c)))
        .find(|(_, c)| {
            !skipped.contains(&c.item.id)
                && matches!(c.state, ItemReviewState::Unreviewed | ItemReviewState::FailPendingRemark)
        })
}

/// イベントを表示する
pub fn print_events(events: Vec<SessionEvent>) {
    for event in events {
        match event {
            SessionEvent::Notice { level, message } => {
                let mark = match level {
                    NoticeLevel::Success => "✔",
                    NoticeLevel::Warning => "⚠",
                    NoticeLevel::Error => "✖",
                };
                println!("  {} {}", mark, message);
            }
            SessionEvent::StoreCompleted { .. } | SessionEvent::Rerendered => {}
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub async fn run_interactive_review<A: ReviewApi>(driver: &mut ReviewDriver<A, SystemClock>) -> Result<()> {
    let mut skipped: HashSet<String> = HashSet::new();

    println!("操作: [p]合格 [f]不合格 [Enter/s]スキップ [S]門店をスキップ [q]終了");
    println!("---\n");

    loop {
        driver.tick();
        print_events(driver.session_mut().drain_events());

        let ViewModel::Pending { stores, hidden_stores } = driver.session().view_model() else {
            driver.session_mut().clear_search();
            driver.session_mut().switch_view(store_review_common::View::Pending);
            continue;
        };

        let Some((store, card)) = next_card(&stores, &skipped) else {
            // 完了した門店の再描画待ち
            if let Some(due) = driver.session().next_deadline() {
                let wait = due.saturating_sub(SystemClock.now_ms()).max(1);
                tokio::time::sleep(Duration::from_millis(wait)).await;
                continue;
            }
            if stores.is_empty() {
                println!("✓ 未完了の門店はありません");
            } else {
                println!("✓ 表示中のカードはすべてスキップ済みです（残り{}店）", hidden_stores);
            }
            break;
        };

        let item = card.item.clone();
        let state = card.state;
        let store_name = store.store_name.clone();
        let store_items: Vec<String> = store.items.iter().map(|c| c.item.id.clone()).collect();

        println!("[{}] {} / {}", store.store_id, store_name, item.item_name);
        if !item.category.is_empty() {
            println!("  分類: {}", item.category);
        }
        println!("  标准图: {}", item.reference_url().unwrap_or("暂无图片"));

        if state == ItemReviewState::FailPendingRemark {
            println!("  不合格（問題描述が未入力）");
            if !prompt_remark(driver, &item.id).await? {
                skipped.insert(item.id.clone());
            }
            println!();
            continue;
        }

        let action = prompt_action()?;
        match action {
            ReviewAction::Pass | ReviewAction::Fail => {
                let result = if action == ReviewAction::Pass {
                    ReviewResult::Pass
                } else {
                    ReviewResult::Fail
                };
                let pb = spinner("送信中...");
                let outcome = driver.submit(&item.id, result).await?;
                pb.finish_and_clear();
                print_events(driver.session_mut().drain_events());

                match outcome {
                    Outcome::Sent if result == ReviewResult::Fail => {
                        if !prompt_remark(driver, &item.id).await? {
                            skipped.insert(item.id.clone());
                        }
                    }
                    Outcome::Failed(_) => {
                        skipped.insert(item.id.clone());
                    }
                    _ => {}
                }
            }
            ReviewAction::Skip => {
                skipped.insert(item.id.clone());
            }
            ReviewAction::SkipStore => {
                println!("  → {} をスキップ", store_name);
                skipped.extend(store_items);
            }
            ReviewAction::Quit => {
                println!("終了します");
                break;
            }
        }
        println!();
    }

    print_events(driver.session_mut().drain_events());
    Ok(())
}

fn prompt_action() -> Result<ReviewAction> {
    loop {
        let input: String = Input::new()
            .with_prompt("判定")
            .allow_empty(true)
            .interact_text()
            .map_err(|e| AppError::Prompt(e.to_string()))?;

        match parse_action(&input) {
            Some(action) => return Ok(action),
            None => println!("  p / f / s / S / q のいずれかを入力してください"),
        }
    }
}

/// 問題描述を入力して保存する。保存できたら true
async fn prompt_remark<A: ReviewApi>(driver: &mut ReviewDriver<A, SystemClock>, item_id: &str) -> Result<bool> {
    let text: String = Input::new()
        .with_prompt("问题描述（空欄で後回し）")
        .allow_empty(true)
        .interact_text()
        .map_err(|e| AppError::Prompt(e.to_string()))?;

    if text.trim().is_empty() {
        println!("  → 後回し");
        return Ok(false);
    }

    let pb = spinner("保存中...");
    let outcome = driver.save_remark(item_id, &text).await?;
    pb.finish_and_clear();
    print_events(driver.session_mut().drain_events());
    Ok(outcome == Outcome::Sent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_review_common::InspectionItem;

    fn card(id: &str, state: ItemReviewState) -> ItemCard {
        ItemCard {
            item: InspectionItem {
                id: id.to_string(),
                ..Default::default()
            },
            verdict: None,
            state,
            editor_open: false,
            in_flight: false,
        }
    }

    fn store(id: &str, exiting: bool, items: Vec<ItemCard>) -> StoreCard {
        StoreCard {
            store_id: id.to_string(),
            store_name: id.to_string(),
            operator: String::new(),
            exiting,
            items,
        }
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_action("p"), Some(ReviewAction::Pass));
        assert_eq!(parse_action(" 不合格 "), Some(ReviewAction::Fail));
        assert_eq!(parse_action(""), Some(ReviewAction::Skip));
        assert_eq!(parse_action("S"), Some(ReviewAction::SkipStore));
        assert_eq!(parse_action("x"), None);
    }

    #[test]
    fn test_next_card_skips_done_and_exiting() {
        let stores = vec![
            store("A", true, vec![card("a1", ItemReviewState::Unreviewed)]),
            store(
                "B",
                false,
                vec![
                    card("b1", ItemReviewState::Pass),
                    card("b2", ItemReviewState::Unreviewed),
                    card("b3", ItemReviewState::FailPendingRemark),
                ],
            ),
        ];

        let (s, c) = next_card(&stores, &HashSet::new()).unwrap();
        assert_eq!((s.store_id.as_str(), c.item.id.as_str()), ("B", "b2"));

        let skipped: HashSet<String> = ["b2".to_string()].into_iter().collect();
        let (_, c) = next_card(&stores, &skipped).unwrap();
        assert_eq!(c.item.id, "b3");
    }
}
