use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;

use crate::age::AgeOrder;
use crate::aggregate::{MinSample, Tally, percentage};

const PALETTE: [&str; 12] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf", "#393b79", "#637939",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    RateDesc,
    CountDesc,
    AgeOrder,
}

impl SortOrder {
    pub const ACCEPTED: [&'static str; 3] = ["rate", "count", "age"];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rate" => Some(SortOrder::RateDesc),
            "count" => Some(SortOrder::CountDesc),
            "age" => Some(SortOrder::AgeOrder),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub key: String,
    pub label: String,
    pub value: f64,
    pub count: u64,
    pub total: u64,
    pub color: String,
}

pub fn color_for(position: usize) -> &'static str {
    PALETTE[position % PALETTE.len()]
}

/// Rate chart: `value` is the percentage (or the unavailable sentinel),
/// `count` the numerator and `total` the denominator.
pub fn rank_rates<L>(
    tallies: &BTreeMap<String, Tally>,
    order: SortOrder,
    min: MinSample,
    ages: &AgeOrder,
    label: L,
) -> Vec<ChartPoint>
where
    L: Fn(&str) -> String,
{
    let points = tallies
        .iter()
        .map(|(key, t)| ChartPoint {
            key: key.clone(),
            label: label(key),
            value: t.rate(min),
            count: t.numerator,
            total: t.denominator,
            color: String::new(),
        })
        .collect();
    finish(points, order, ages)
}

/// Distribution chart: `value` is the share of all counted rows.
pub fn rank_counts<L>(
    counts: &BTreeMap<String, u64>,
    order: SortOrder,
    ages: &AgeOrder,
    label: L,
) -> Vec<ChartPoint>
where
    L: Fn(&str) -> String,
{
    let total: u64 = counts.values().sum();
    let points = counts
        .iter()
        .map(|(key, &count)| ChartPoint {
            key: key.clone(),
            label: label(key),
            value: percentage(count, total),
            count,
            total,
            color: String::new(),
        })
        .collect();
    finish(points, order, ages)
}

fn finish(mut points: Vec<ChartPoint>, order: SortOrder, ages: &AgeOrder) -> Vec<ChartPoint> {
    points.sort_by(|a, b| compare(a, b, order, ages));
    for (i, p) in points.iter_mut().enumerate() {
        p.color = color_for(i).to_string();
    }
    points
}

fn compare(a: &ChartPoint, b: &ChartPoint, order: SortOrder, ages: &AgeOrder) -> Ordering {
    match order {
        SortOrder::RateDesc => b
            .value
            .total_cmp(&a.value)
            .then(b.total.cmp(&a.total))
            .then_with(|| a.key.cmp(&b.key)),
        SortOrder::CountDesc => b
            .count
            .cmp(&a.count)
            .then(b.total.cmp(&a.total))
            .then_with(|| a.key.cmp(&b.key)),
        SortOrder::AgeOrder => ages.compare(&a.key, &b.key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tallies(items: &[(&str, u64, u64)]) -> BTreeMap<String, Tally> {
        items
            .iter()
            .map(|(k, n, d)| (k.to_string(), Tally { numerator: *n, denominator: *d }))
            .collect()
    }

    #[test]
    fn rate_desc_puts_unavailable_last() {
        let t = tallies(&[("eco", 10, 100), ("kpn", 30, 60), ("aba", 5, 10)]);
        let pts = rank_rates(
            &t,
            SortOrder::RateDesc,
            MinSample::Enforced(30),
            &AgeOrder::default(),
            |k| k.to_uppercase(),
        );
        let keys: Vec<&str> = pts.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["kpn", "eco", "aba"]);
        assert_eq!(pts[0].value, 50.0);
        assert_eq!(pts[0].label, "KPN");
        assert_eq!(pts[2].value, -1.0);
    }

    #[test]
    fn count_desc_breaks_ties_by_key() {
        let counts: BTreeMap<String, u64> = [("b", 3), ("a", 3), ("c", 4)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        let pts = rank_counts(
            &counts,
            SortOrder::CountDesc,
            &AgeOrder::default(),
            str::to_string,
        );
        let keys: Vec<&str> = pts.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert_eq!(pts[0].total, 10);
        assert_eq!(pts[0].value, 40.0);
    }

    #[test]
    fn age_order_follows_vocabulary() {
        let t = tallies(&[
            ("65–74 years", 1, 40),
            ("Under 5 years", 1, 40),
            ("25–34 years", 1, 40),
        ]);
        let pts = rank_rates(
            &t,
            SortOrder::AgeOrder,
            MinSample::Disabled,
            &AgeOrder::default(),
            str::to_string,
        );
        let keys: Vec<&str> = pts.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["Under 5 years", "25–34 years", "65–74 years"]);
    }

    #[test]
    fn colors_are_stable_for_same_ranking() {
        let t = tallies(&[("eco", 10, 100), ("kpn", 30, 60), ("sau", 1, 50)]);
        let ages = AgeOrder::default();
        let min = MinSample::Enforced(30);
        let first = rank_rates(&t, SortOrder::RateDesc, min, &ages, str::to_string);
        let second = rank_rates(&t, SortOrder::RateDesc, min, &ages, str::to_string);
        assert_eq!(first, second);
        let colors: std::collections::HashSet<&str> =
            first.iter().map(|p| p.color.as_str()).collect();
        assert_eq!(colors.len(), 3);
    }
}
