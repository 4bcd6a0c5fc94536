//! Presentation views over a ranked dataset
//!
//! Shared by the HTTP API and the CLI: ranking pages, per-item detail with
//! attribute frequencies, and a plain-text table.

use std::fmt::Write as _;

use rarity_common::{Error, Result};
use serde::Serialize;
use serde_json::Value;

use crate::models::{attribute_label, RankedDataset, RankedItem};
use crate::services::IpfsGateway;

/// Items per ranking page
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// One row of a ranking page
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankingRow {
    pub rank: usize,
    pub id: u64,
    pub name: String,
    /// Image URL rewritten through the gateway
    pub image: String,
    /// Score truncated to two decimals
    pub score: f64,
    pub occurrences: u64,
}

/// A 1-based page of the ranking
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankingPage {
    pub page: usize,
    pub limit: usize,
    pub total_items: usize,
    pub has_next: bool,
    pub items: Vec<RankingRow>,
}

/// Attribute line of an item detail view
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AttributeDetail {
    pub key: String,
    pub label: String,
    pub value: Value,
    pub occurrences: u64,
    /// Share of items with this value, floored to two decimals
    pub percent: f64,
    pub score: f64,
}

/// Full view of one ranked item
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ItemDetail {
    pub id: u64,
    pub name: String,
    pub image: String,
    pub rank: usize,
    pub score: f64,
    pub occurrences: u64,
    pub total_items: usize,
    pub attributes: Vec<AttributeDetail>,
}

/// Score as displayed: truncated (not rounded) to two decimals
pub fn display_score(score: f64) -> f64 {
    (score * 100.0).trunc() / 100.0
}

/// `floor(occurrences / total * 10000) / 100`; zero for an empty collection
pub fn percent(occurrences: u64, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (occurrences as f64 / total as f64 * 10_000.0).floor() / 100.0
}

/// Slice page `page` (1-based) of `limit` items out of the ranking
pub fn paginate(
    dataset: &RankedDataset,
    page: usize,
    limit: usize,
    gateway: &IpfsGateway,
) -> Result<RankingPage> {
    if page == 0 {
        return Err(Error::InvalidInput("page must be at least 1".to_string()));
    }
    if limit == 0 {
        return Err(Error::InvalidInput("limit must be at least 1".to_string()));
    }

    let start = (page - 1).saturating_mul(limit);
    let items: Vec<RankingRow> = dataset
        .items
        .iter()
        .skip(start)
        .take(limit)
        .map(|item| row(item, gateway))
        .collect();

    Ok(RankingPage {
        page,
        limit,
        total_items: dataset.len(),
        has_next: start.saturating_add(limit) < dataset.len(),
        items,
    })
}

fn row(item: &RankedItem, gateway: &IpfsGateway) -> RankingRow {
    RankingRow {
        rank: item.rank,
        id: item.id,
        name: item.name.clone(),
        image: gateway.resolve(&item.image),
        score: display_score(item.score),
        occurrences: item.occurrences,
    }
}

/// Detail view of item `id`, or `None` if it is not in the dataset
pub fn item_detail(dataset: &RankedDataset, id: u64, gateway: &IpfsGateway) -> Option<ItemDetail> {
    let item = dataset.get(id)?;
    let total_items = dataset.len();

    let attributes = item
        .attributes
        .iter()
        .map(|(key, scored)| AttributeDetail {
            key: key.clone(),
            label: attribute_label(key).to_string(),
            value: scored.value.clone(),
            occurrences: scored.occurrences,
            percent: percent(scored.occurrences, total_items),
            score: display_score(scored.score),
        })
        .collect();

    Some(ItemDetail {
        id: item.id,
        name: item.name.clone(),
        image: gateway.resolve(&item.image),
        rank: item.rank,
        score: display_score(item.score),
        occurrences: item.occurrences,
        total_items,
        attributes,
    })
}

/// Plain-text table of a ranking page
pub fn render_page(page: &RankingPage) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:>6}  {:>8}  {:>10}  NAME", "RANK", "ID", "SCORE");
    for row in &page.items {
        let _ = writeln!(
            out,
            "{:>6}  {:>8}  {:>10.2}  {}",
            row.rank, row.id, row.score, row.name
        );
    }
    let _ = write!(
        out,
        "page {} ({} items total){}",
        page.page,
        page.total_items,
        if page.has_next { ", more available" } else { "" }
    );
    out
}
