use crate::core::models::work_item::WorkItem;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;
use thiserror::Error;

/// Built-in value predicates used to decide which work items are retained.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ValueFilter {
    #[default]
    All,
    Above { threshold: f64 },
    AtLeast { threshold: f64 },
    Below { threshold: f64 },
    AtMost { threshold: f64 },
    Between { min: f64, max: f64 },
}

impl ValueFilter {
    pub fn accepts(&self, value: f64) -> bool {
        match *self {
            ValueFilter::All => true,
            ValueFilter::Above { threshold } => value > threshold,
            ValueFilter::AtLeast { threshold } => value >= threshold,
            ValueFilter::Below { threshold } => value < threshold,
            ValueFilter::AtMost { threshold } => value <= threshold,
            ValueFilter::Between { min, max } => value >= min && value <= max,
        }
    }
}

/// Built-in orderings for the retained work list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
    ById,
    Source,
}

impl SortOrder {
    pub fn compare(&self, a: &WorkItem, b: &WorkItem) -> Ordering {
        match self {
            SortOrder::Ascending => a.value.total_cmp(&b.value),
            SortOrder::Descending => b.value.total_cmp(&a.value),
            SortOrder::ById => a.id.cmp(&b.id),
            SortOrder::Source => Ordering::Equal,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown sort order '{0}' (expected ascending, descending, by-id or source)")]
pub struct UnknownSortOrder(pub String);

impl FromStr for SortOrder {
    type Err = UnknownSortOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ascending" => Ok(SortOrder::Ascending),
            "descending" => Ok(SortOrder::Descending),
            "by-id" => Ok(SortOrder::ById),
            "source" => Ok(SortOrder::Source),
            other => Err(UnknownSortOrder(other.to_string())),
        }
    }
}

/// Keeps the items whose value satisfies `predicate`, preserving input order.
pub fn filter<P>(items: Vec<WorkItem>, predicate: P) -> Vec<WorkItem>
where
    P: Fn(f64) -> bool,
{
    items
        .into_iter()
        .filter(|item| predicate(item.value))
        .collect()
}

/// Stable sort of `items` by `comparator`.
pub fn sort<C>(mut items: Vec<WorkItem>, comparator: C) -> Vec<WorkItem>
where
    C: FnMut(&WorkItem, &WorkItem) -> Ordering,
{
    items.sort_by(comparator);
    items
}

pub fn filter_by(items: Vec<WorkItem>, value_filter: &ValueFilter) -> Vec<WorkItem> {
    filter(items, |value| value_filter.accepts(value))
}

pub fn sort_by(items: Vec<WorkItem>, order: SortOrder) -> Vec<WorkItem> {
    if order == SortOrder::Source {
        return items;
    }
    sort(items, |a, b| order.compare(a, b))
}
