use clap::Parser;
use dialoguer::Confirm;
use std::path::PathBuf;
use store_review::api::{HttpReviewApi, ReviewApi};
use store_review::driver::{Outcome, ReviewDriver};
use store_review::overlay_store::JsonOverlayStore;
use store_review::{cli, config, error, export, interactive, logging, triage};
use cli::{Cli, Commands, TriageAction};
use config::Config;
use error::{AppError, Result};
use store_review_common::{
    merge_rows, ItemCard, ItemReviewState, ReviewResult, ReviewSession, SearchFilters, StoreAggregate, SystemClock,
    TriageOverlay, View, ViewModel,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "command failed");
        eprintln!("✖ {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(server) = &cli.server {
        config.server_url = server.trim().trim_end_matches('/').to_string();
    }
    let operator = cli.operator.clone().or_else(|| config.operator.clone());

    match cli.command {
        Commands::Operators => {
            let api = connect(&config)?;
            let operators = api.list_operators().await?;
            println!("オペレーター ({}名):", operators.len());
            for op in operators {
                println!("  {}", op);
            }
        }

        Commands::Pending { window } => {
            if let Some(w) = window {
                config.window_size = w;
            }
            let driver = open_driver(&config, operator.as_deref()).await?;
            print_view(&driver.session().view_model());
        }

        Commands::Completed => {
            let mut driver = open_driver(&config, operator.as_deref()).await?;
            driver.session_mut().switch_view(View::Completed);
            print_view(&driver.session().view_model());
        }

        Commands::Search { keyword } => {
            let mut driver = open_driver(&config, operator.as_deref()).await?;
            driver.session_mut().set_search(&keyword);
            print_view(&driver.session().view_model());
        }

        Commands::Submit { item_id, result, remark } => {
            let mut driver = open_driver(&config, operator.as_deref()).await?;
            let outcome = driver.submit(&item_id, result).await?;
            interactive::print_events(driver.session_mut().drain_events());
            report_outcome(&item_id, &outcome);

            if let (Some(text), Outcome::Sent, ReviewResult::Fail) = (remark, &outcome, result) {
                let outcome = driver.save_remark(&item_id, &text).await?;
                interactive::print_events(driver.session_mut().drain_events());
                report_outcome(&item_id, &outcome);
            }
        }

        Commands::Remark { item_id, text } => {
            let mut driver = open_driver(&config, operator.as_deref()).await?;
            let outcome = driver.save_remark(&item_id, &text).await?;
            interactive::print_events(driver.session_mut().drain_events());
            report_outcome(&item_id, &outcome);
        }

        Commands::Review => {
            println!("📋 store-review - 対話審核\n");
            let mut driver = open_driver(&config, operator.as_deref()).await?;
            interactive::run_interactive_review(&mut driver).await?;
            let stats = driver.stats().await;
            println!("\n進捗: {}/{} 店 ({:.1}%)", stats.reviewed, stats.total, stats.percentage);
        }

        Commands::Stats => {
            let driver = open_driver(&config, operator.as_deref()).await?;
            let stats = driver.stats().await;
            println!("審核進捗{}:", operator.as_deref().map(|o| format!(" ({})", o)).unwrap_or_default());
            println!("  門店総数: {}", stats.total);
            println!("  審核完了: {}", stats.reviewed);
            println!("  進捗率: {:.1}%", stats.percentage);
        }

        Commands::Export { output, local, format } => {
            println!("📄 store-review - エクスポート\n");
            let output = output.unwrap_or_else(|| PathBuf::from("."));
            let date = export::today();

            let path = if local {
                // 全オペレーター分
                let driver = open_driver(&config, None).await?;
                let session = driver.session();
                let rows = merge_rows(session.items(), session.ledger());
                println!("- {}件を{}で出力中...", rows.len(), format);
                export::export_local(&rows, format, &output, &date)?
            } else {
                let api = connect(&config)?;
                println!("- サーバーからCSVを取得中...");
                export::export_from_server(&api, &output, &date).await?
            };
            println!("✔ 出力: {}", path.display());
        }

        Commands::Upload { file, yes } => {
            let uploader = operator
                .clone()
                .ok_or_else(|| AppError::Config("--operator でアップロード担当者を指定してください".into()))?;

            let rows = store_review::driver::check_workbook(&file)?;
            println!("{}: {}行", file.display(), rows);
            if !yes {
                let proceed = Confirm::new()
                    .with_prompt("現在の審核結果はすべて削除されます。新周期を開始しますか？")
                    .default(false)
                    .interact()
                    .map_err(|e| AppError::Prompt(e.to_string()))?;
                if !proceed {
                    println!("中止しました");
                    return Ok(());
                }
            }

            let mut driver = ReviewDriver::new(connect(&config)?, new_session(&config));
            let outcome = driver.upload_cycle(&file, &uploader).await;
            interactive::print_events(driver.session_mut().drain_events());
            let outcome = outcome?;
            println!("✔ 項目数: {}", outcome.total_items);
        }

        Commands::Triage { action } => {
            let api = connect(&config)?;
            run_triage(&api, config.overlay_file()?, action).await?;
        }

        Commands::Config { set_server, set_operator, show } => {
            let mut config = Config::load()?;

            if let Some(url) = set_server {
                config.set_server(url)?;
                println!("✔ サーバーを設定しました: {}", config.server_url);
            }

            if let Some(op) = set_operator {
                config.set_operator(op)?;
                println!("✔ オペレーターを設定しました");
            }

            if show {
                println!("設定:");
                println!("  サーバー: {}", config.server_url);
                println!("  オペレーター: {}", config.operator.as_deref().unwrap_or("全部"));
                println!("  表示門店数: {}", config.window_size);
                println!("  完了後の再描画: {}ms", config.completion_delay_ms);
                println!(
                    "  画像再試行: {}回 ({}ms単位)",
                    config.image_max_retries, config.image_retry_unit_ms
                );
                println!("  処理済みマーク: {}", config.overlay_file()?.display());
            }
        }
    }

    Ok(())
}

fn connect(config: &Config) -> Result<HttpReviewApi> {
    HttpReviewApi::new(&config.server_url, config.timeout())
}

fn new_session(config: &Config) -> ReviewSession<SystemClock> {
    ReviewSession::new(SystemClock, config.session_config())
}

async fn open_driver(config: &Config, operator: Option<&str>) -> Result<ReviewDriver<HttpReviewApi>> {
    let mut driver = ReviewDriver::new(connect(config)?, new_session(config));
    let loaded = driver.load(operator).await;
    interactive::print_events(driver.session_mut().drain_events());
    loaded?;
    Ok(driver)
}

async fn run_triage(api: &HttpReviewApi, overlay_path: PathBuf, action: TriageAction) -> Result<()> {
    let mut overlay = TriageOverlay::open(JsonOverlayStore::new(&overlay_path));

    match action {
        TriageAction::List {
            war_zone,
            province,
            city,
            store_tag,
            result,
            keyword,
            page,
            per_page,
        } => {
            let mut filters = SearchFilters::default();
            if let Some(v) = war_zone {
                filters.set_war_zone(&v);
            }
            if let Some(v) = province {
                filters.set_province(&v);
            }
            if let Some(v) = city {
                filters.set_city(&v);
            }
            if let Some(v) = store_tag {
                filters.set_store_tag(&v);
            }
            if let Some(v) = result {
                filters.set_review_result(&v);
            }
            if let Some(v) = keyword {
                filters.set_keyword(&v);
            }
            filters.page = page.max(1);
            filters.per_page = per_page.max(1);

            let view = triage::load_page(api, &overlay, &mut filters).await?;
            triage::print_page(&view);
        }

        TriageAction::Filters { war_zone, province } => {
            if let Some(zone) = war_zone {
                println!("省份 ({}):", zone);
                for p in api.provinces(&zone).await? {
                    println!("  {}", p);
                }
            } else if let Some(province) = province {
                println!("城市 ({}):", province);
                for c in api.cities(&province).await? {
                    println!("  {}", c);
                }
            } else {
                let options = api.filter_options().await?;
                println!("战区: {}", options.war_zones.join(", "));
                println!("门店标签: {}", options.store_tags.join(", "));
                println!("审核结果: {}", options.review_results.join(", "));
            }
        }

        TriageAction::Mark { id } => {
            if triage::mark(&mut overlay, &id)? {
                println!("✔ 処理済みにしました: {}", id);
            } else {
                println!("既に処理済みです: {}", id);
            }
        }

        TriageAction::Restore { id } => {
            if triage::restore(&mut overlay, &id)? {
                println!("✔ 未処理に戻しました: {}", id);
            } else {
                println!("処理済みではありません: {}", id);
            }
        }

        TriageAction::Copy { id, keyword } => {
            let mut filters = SearchFilters::default();
            if let Some(k) = keyword {
                filters.set_keyword(&k);
            }
            match triage::find_row(api, &filters, &id).await? {
                Some(row) => println!("{}", triage::copy_payload(&row).text),
                None => println!("見つかりません: {}", id),
            }
        }

        TriageAction::Clear => {
            let cleared = JsonOverlayStore::new(&overlay_path).clear()?;
            if cleared {
                println!("✔ 処理済みマークを削除しました");
            } else {
                println!("処理済みマークはありません");
            }
        }
    }
    Ok(())
}

fn report_outcome(item_id: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Sent => {}
        Outcome::Toggled => println!("  問題描述を入力してください: store-review remark {} <描述>", item_id),
        Outcome::Rejected => {}
        Outcome::Ignored => println!("  項目が見つかりません: {}", item_id),
        Outcome::Failed(_) => {}
    }
}

fn print_view(view: &ViewModel) {
    match view {
        ViewModel::Pending { stores, hidden_stores } => {
            if stores.is_empty() {
                println!("✓ 未完了の門店はありません");
                return;
            }
            for store in stores {
                println!("■ {} ({}) 担当: {}", store.store_name, store.store_id, store.operator);
                for card in &store.items {
                    print_card(card);
                }
                println!();
            }
            if *hidden_stores > 0 {
                println!("ほか {} 店", hidden_stores);
            }
        }
        ViewModel::Completed { stores } => {
            if stores.is_empty() {
                println!("審核完了の門店はありません");
                return;
            }
            for store in stores {
                print_completed(store);
            }
        }
        ViewModel::Search { label, items, .. } => {
            println!("{}", label);
            for card in items {
                print!("  {} / ", card.item.store_name);
                print_card(card);
            }
        }
    }
}

fn print_card(card: &ItemCard) {
    let state = match card.state {
        ItemReviewState::Unreviewed => "未审核".to_string(),
        ItemReviewState::Pass => "合格".to_string(),
        ItemReviewState::FailPendingRemark => "不合格（描述未入力）".to_string(),
        ItemReviewState::FailComplete => {
            let remark = card.verdict.as_ref().map(|v| v.remark.trim()).unwrap_or("");
            format!("不合格: {}", remark)
        }
    };
    println!("  [{}] {} - {}", card.item.id, card.item.item_name, state);
}

fn print_completed(store: &StoreAggregate) {
    println!(
        "✔ {} ({}) 担当: {}  合格 {} / 不合格 {}  最終: {}",
        store.store_name,
        store.store_id,
        store.operator,
        store.pass_count,
        store.fail_count,
        store.last_activity.as_deref().unwrap_or("-")
    );
}
