use clap::{Parser, Subcommand};
use std::path::PathBuf;
use store_review_common::ReviewResult;

#[derive(Parser)]
#[command(name = "store-review")]
#[command(about = "门店检查图片审核ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// 負責オペレーター（「全部」で全件）
    #[arg(long, global = true)]
    pub operator: Option<String>,

    /// 審核サーバーのURL（設定ファイルより優先）
    #[arg(long, global = true)]
    pub server: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// オペレーター一覧
    Operators,

    /// 未審核の門店を表示（先頭N店）
    Pending {
        /// 表示する門店数（省略時は設定値）
        #[arg(short, long)]
        window: Option<usize>,
    },

    /// 審核完了の門店を表示（新しい順）
    Completed,

    /// 門店名・門店編号の完全一致で検索
    Search {
        #[arg(required = true)]
        keyword: String,
    },

    /// 判定を送信
    Submit {
        /// 検査項目ID
        #[arg(required = true)]
        item_id: String,

        /// 判定 (pass/fail)
        #[arg(required = true)]
        result: ReviewResult,

        /// 不合格の問題描述（続けて保存する）
        #[arg(short, long)]
        remark: Option<String>,
    },

    /// 問題描述を保存
    Remark {
        #[arg(required = true)]
        item_id: String,

        #[arg(required = true)]
        text: String,
    },

    /// 対話的に審核
    Review,

    /// 進捗を表示
    Stats,

    /// 審核結果をエクスポート
    Export {
        /// 出力ファイル/ディレクトリ
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// サーバーではなく手元のデータから生成
        #[arg(long)]
        local: bool,

        /// --local 時の形式 (excel/csv)
        #[arg(short, long, default_value = "excel")]
        format: ExportFormat,
    },

    /// 新しい項目表（.xlsx）をアップロードして新周期を開始
    Upload {
        #[arg(required = true)]
        file: PathBuf,

        /// 確認を省略
        #[arg(short, long)]
        yes: bool,
    },

    /// 審核結果のトリアージ
    Triage {
        #[command(subcommand)]
        action: TriageAction,
    },

    /// 設定を表示/編集
    Config {
        /// サーバーURLを設定
        #[arg(long)]
        set_server: Option<String>,

        /// 既定のオペレーターを設定
        #[arg(long)]
        set_operator: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}

#[derive(Subcommand)]
pub enum TriageAction {
    /// 結果を検索して未処理/処理済みに分けて表示
    List {
        #[arg(long)]
        war_zone: Option<String>,

        #[arg(long)]
        province: Option<String>,

        #[arg(long)]
        city: Option<String>,

        #[arg(long)]
        store_tag: Option<String>,

        /// 審核結果 (合格/不合格)
        #[arg(long)]
        result: Option<String>,

        /// 門店名・門店編号のキーワード
        #[arg(short, long)]
        keyword: Option<String>,

        #[arg(short, long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "9")]
        per_page: u32,
    },

    /// 絞り込みの選択肢を表示
    Filters {
        /// この戦区の省份
        #[arg(long)]
        war_zone: Option<String>,

        /// この省份の城市
        #[arg(long)]
        province: Option<String>,
    },

    /// 処理済みにする
    Mark {
        #[arg(required = true)]
        id: String,
    },

    /// 処理済みから戻す
    Restore {
        #[arg(required = true)]
        id: String,
    },

    /// 結果の要約を表示（コピー用）
    Copy {
        #[arg(required = true)]
        id: String,

        /// 検索条件のキーワード
        #[arg(short, long)]
        keyword: Option<String>,
    },

    /// 処理済みマークを全て消す
    Clear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    #[default]
    Excel,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "excel" | "xlsx" => Ok(ExportFormat::Excel),
            _ => Err(format!("Unknown format: {}. Use csv or excel", s)),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Excel => write!(f, "excel"),
        }
    }
}
