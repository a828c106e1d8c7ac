//! 結果ビューアの絞り込み条件
//!
//! 战区 → 省份 → 城市 の連動: 上位を変えると下位はクリアされる。

use crate::types::ResultRow;
use serde::{Deserialize, Serialize};

/// 1ページの既定件数
pub const DEFAULT_PER_PAGE: u32 = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub war_zone: String,
    pub province: String,
    pub city: String,
    pub store_tag: String,
    /// 合格 / 不合格 / 空
    pub review_result: String,
    /// 門店ID・門店名
    pub keyword: String,
    pub page: u32,
    pub per_page: u32,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            war_zone: String::new(),
            province: String::new(),
            city: String::new(),
            store_tag: String::new(),
            review_result: String::new(),
            keyword: String::new(),
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl SearchFilters {
    pub fn set_war_zone(&mut self, war_zone: &str) {
        self.war_zone = war_zone.trim().to_string();
        self.province.clear();
        self.city.clear();
        self.page = 1;
    }

    pub fn set_province(&mut self, province: &str) {
        self.province = province.trim().to_string();
        self.city.clear();
        self.page = 1;
    }

    pub fn set_city(&mut self, city: &str) {
        self.city = city.trim().to_string();
        self.page = 1;
    }

    pub fn set_store_tag(&mut self, tag: &str) {
        self.store_tag = tag.trim().to_string();
        self.page = 1;
    }

    pub fn set_review_result(&mut self, result: &str) {
        self.review_result = result.trim().to_string();
        self.page = 1;
    }

    pub fn set_keyword(&mut self, keyword: &str) {
        self.keyword = keyword.trim().to_string();
        self.page = 1;
    }

    /// 全条件クリア（ページ設定は残す）
    pub fn clear(&mut self) {
        *self = Self {
            per_page: self.per_page,
            ..Self::default()
        };
    }

    /// 省份の選択肢を出せるか
    pub fn province_enabled(&self) -> bool {
        !self.war_zone.is_empty()
    }

    pub fn city_enabled(&self) -> bool {
        !self.province.is_empty()
    }

    /// 空でない条件だけのクエリパラメータ
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        for (key, value) in [
            ("war_zone", &self.war_zone),
            ("province", &self.province),
            ("city", &self.city),
            ("store_tag", &self.store_tag),
            ("review_result", &self.review_result),
            ("store_search", &self.keyword),
        ] {
            if !value.is_empty() {
                pairs.push((key, value.clone()));
            }
        }
        pairs.push(("page", self.page.max(1).to_string()));
        pairs.push(("per_page", self.per_page.to_string()));
        pairs
    }
}

/// 絞り込みの選択肢
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    pub war_zones: Vec<String>,
    pub provinces: Vec<String>,
    pub cities: Vec<String>,
    pub store_tags: Vec<String>,
    pub review_results: Vec<String>,
}

/// 検索結果の1ページ
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultPage {
    pub results: Vec<ResultRow>,
    pub count: usize,
    pub total_count: usize,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl ResultPage {
    pub fn has_more(&self) -> bool {
        self.page < self.total_pages
    }
}
