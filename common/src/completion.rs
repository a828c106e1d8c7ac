//! 門店完了判定
//!
//! 門店が完了 ⇔ 全項目に判定があり、不合格の項目すべてに
//! 空白以外の問題描述がある。確定済みの判定だけから再計算する純粋関数。

use crate::ledger::LedgerMirror;
use crate::types::{
    InspectionItem, ReviewResult, ReviewStats, ReviewVerdict, StoreAggregate, ALL_OPERATORS,
};
use std::cmp::Ordering;
use std::collections::HashMap;

/// 門店ごとの項目グループ
#[derive(Debug, Clone, PartialEq)]
pub struct StoreGroup {
    pub store_id: String,
    pub store_name: String,
    pub operator: String,
    pub items: Vec<InspectionItem>,
}

/// 項目単位の完了条件
pub fn is_item_complete(verdict: Option<&ReviewVerdict>) -> bool {
    match verdict {
        None => false,
        Some(v) => match v.result {
            ReviewResult::Pass => true,
            ReviewResult::Fail => v.has_remark(),
        },
    }
}

/// 門店IDでグループ化（最初に出現した順）
pub fn group_by_store<'a, I>(items: I) -> Vec<StoreGroup>
where
    I: IntoIterator<Item = &'a InspectionItem>,
{
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<StoreGroup> = Vec::new();

    for item in items {
        match index.get(item.store_id.as_str()) {
            Some(&i) => groups[i].items.push(item.clone()),
            None => {
                index.insert(item.store_id.as_str(), groups.len());
                groups.push(StoreGroup {
                    store_id: item.store_id.clone(),
                    store_name: item.store_name.clone(),
                    operator: item.operator.clone(),
                    items: vec![item.clone()],
                });
            }
        }
    }

    groups
}

/// 単一門店の完了判定（項目がなければ未完了）
pub fn is_store_complete(store_id: &str, items: &[InspectionItem], ledger: &LedgerMirror) -> bool {
    let mut store_items = items.iter().filter(|i| i.store_id == store_id).peekable();
    if store_items.peek().is_none() {
        return false;
    }
    store_items.all(|item| is_item_complete(ledger.confirmed(&item.id)))
}

/// 最終活動時刻: 全項目の判定時刻の文字列最大値。欠けている項目があれば None
fn last_activity(items: &[InspectionItem], ledger: &LedgerMirror) -> Option<String> {
    let mut latest: Option<&str> = None;
    for item in items {
        let ts = ledger.confirmed(&item.id)?.timestamp()?;
        if latest.map_or(true, |cur| ts > cur) {
            latest = Some(ts);
        }
    }
    latest.map(str::to_string)
}

/// 完了門店を最終活動時刻の降順で返す（時刻なしは末尾、同値は元の順）
pub fn evaluate(items: &[InspectionItem], ledger: &LedgerMirror) -> Vec<StoreAggregate> {
    let mut completed: Vec<StoreAggregate> = group_by_store(items)
        .into_iter()
        .filter(|g| !g.items.is_empty())
        .filter(|g| g.items.iter().all(|i| is_item_complete(ledger.confirmed(&i.id))))
        .map(|g| {
            let pass_count = g
                .items
                .iter()
                .filter(|i| matches!(ledger.confirmed(&i.id), Some(v) if v.result == ReviewResult::Pass))
                .count();
            let fail_count = g.items.len() - pass_count;
            StoreAggregate {
                last_activity: last_activity(&g.items, ledger),
                store_id: g.store_id,
                store_name: g.store_name,
                operator: g.operator,
                items: g.items,
                pass_count,
                fail_count,
            }
        })
        .collect();

    completed.sort_by(|a, b| compare_activity(a.last_activity.as_deref(), b.last_activity.as_deref()));
    completed
}

fn compare_activity(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(x),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

/// 門店単位の統計（統計APIが使えないときのローカル計算）
pub fn completion_stats(items: &[InspectionItem], ledger: &LedgerMirror, operator: Option<&str>) -> ReviewStats {
    let filtered: Vec<&InspectionItem> = items
        .iter()
        .filter(|i| match operator {
            Some(op) if op != ALL_OPERATORS => i.operator == op,
            _ => true,
        })
        .collect();

    let groups = group_by_store(filtered);
    let total = groups.len();
    let reviewed = groups
        .iter()
        .filter(|g| g.items.iter().all(|i| is_item_complete(ledger.confirmed(&i.id))))
        .count();
    let percentage = if total > 0 {
        (reviewed as f64 / total as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    ReviewStats {
        total,
        reviewed,
        percentage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn verdict(id: &str, result: ReviewResult, remark: &str, ts: &str) -> ReviewVerdict {
        ReviewVerdict {
            item_id: id.to_string(),
            result,
            remark: remark.to_string(),
            reviewed_at: ts.to_string(),
        }
    }

    #[test]
    fn test_fail_with_remark_completes_store() {
        let items = vec![item("S", "A"), item("S", "B")];
        let mut ledger = LedgerMirror::new();
        ledger.replace_all(vec![
            verdict("S_A", ReviewResult::Pass, "", "2025-03-01 10:00:00"),
            verdict("S_B", ReviewResult::Fail, "broken seal", "2025-03-01 10:01:00"),
        ]);

        let completed = evaluate(&items, &ledger);
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].store_id, "S");
        assert_eq!(completed[0].pass_count, 1);
        assert_eq!(completed[0].fail_count, 1);
        assert_eq!(completed[0].last_activity.as_deref(), Some("2025-03-01 10:01:00"));
    }

    #[test]
    fn test_fail_without_remark_is_incomplete() {
        let items = vec![item("S", "A"), item("S", "B")];
        let mut ledger = LedgerMirror::new();
        ledger.replace_all(vec![
            verdict("S_A", ReviewResult::Pass, "", "t"),
            verdict("S_B", ReviewResult::Fail, "  ", "t"),
        ]);

        assert!(evaluate(&items, &ledger).is_empty());
        assert!(!is_store_complete("S", &items, &ledger));
    }

    #[test]
    fn test_missing_verdict_is_incomplete() {
        let items = vec![item("S", "A"), item("S", "B")];
        let mut ledger = LedgerMirror::new();
        ledger.replace_all(vec![verdict("S_A", ReviewResult::Pass, "", "t")]);
        assert!(evaluate(&items, &ledger).is_empty());
    }

    #[test]
    fn test_unknown_store_is_not_complete() {
        let ledger = LedgerMirror::new();
        assert!(!is_store_complete("nope", &[], &ledger));
    }

    #[test]
    fn test_group_order_is_first_occurrence() {
        let items = vec![item("B", "1"), item("A", "1"), item("B", "2"), item("C", "1")];
        let ids: Vec<String> = group_by_store(&items).into_iter().map(|g| g.store_id).collect();
        assert_eq!(ids, vec!["B", "A", "C"]);
    }

    #[test]
    fn test_sorted_by_activity_descending_with_missing_last() {
        let items = vec![item("A", "1"), item("B", "1"), item("C", "1"), item("D", "1")];
        let mut ledger = LedgerMirror::new();
        ledger.replace_all(vec![
            verdict("A_1", ReviewResult::Pass, "", ""),
            verdict("B_1", ReviewResult::Pass, "", "2025-03-01 09:00:00"),
            verdict("C_1", ReviewResult::Pass, "", "2025-03-02 09:00:00"),
            verdict("D_1", ReviewResult::Pass, "", "2025-03-01 09:00:00"),
        ]);

        let ids: Vec<String> = evaluate(&items, &ledger).into_iter().map(|s| s.store_id).collect();
        // 同時刻のBとDは元の順を保つ
        assert_eq!(ids, vec!["C", "B", "D", "A"]);
    }

    #[test]
    fn test_timestamps_compare_as_strings() {
        let items = vec![item("A", "1"), item("B", "1")];
        let mut ledger = LedgerMirror::new();
        ledger.replace_all(vec![
            verdict("A_1", ReviewResult::Pass, "", "2025/10/1 9:00:00"),
            verdict("B_1", ReviewResult::Pass, "", "2025/9/1 9:00:00"),
        ]);

        let ids: Vec<String> = evaluate(&items, &ledger).into_iter().map(|s| s.store_id).collect();
        // "2025/9" > "2025/1" なので9月が先に来る
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn test_completion_stats_by_operator() {
        let mut items = vec![item("A", "1"), item("B", "1"), item("C", "1")];
        items[2].operator = "李四".to_string();
        let mut ledger = LedgerMirror::new();
        ledger.replace_all(vec![verdict("A_1", ReviewResult::Pass, "", "t")]);

        let all = completion_stats(&items, &ledger, None);
        assert_eq!((all.total, all.reviewed), (3, 1));
        assert_eq!(all.percentage, 33.3);

        let zhang = completion_stats(&items, &ledger, Some("张三"));
        assert_eq!((zhang.total, zhang.reviewed), (2, 1));
        assert_eq!(zhang.percentage, 50.0);

        let empty = completion_stats(&[], &ledger, Some(ALL_OPERATORS));
        assert_eq!(empty.percentage, 0.0);
    }
}
