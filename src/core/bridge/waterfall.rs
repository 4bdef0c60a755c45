//! Waterfall layout
//!
//! Prepares bridge components for a waterfall renderer: running totals, bar
//! extents, labels and colours. Drawing is left to the renderer.

use super::components::BridgeComponent;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BarColor {
    Total,
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterfallBar {
    /// 1-based position along the axis
    pub position: usize,
    pub label: String,
    pub is_total: bool,
    pub amount: f64,

    /// Cumulative sum of amounts up to and including this bar
    pub running_total: f64,

    /// Bar extent; totals start at zero
    pub start: f64,
    pub end: f64,

    /// Signed delta label (`+1.5`), empty for totals
    pub text_label: String,

    /// Cumulative label (`12.0`), empty for deltas
    pub total_text_label: String,

    /// Vertical anchor of the label
    pub label_position: f64,

    pub color: BarColor,
}

pub fn layout(items: &[BridgeComponent]) -> Vec<WaterfallBar> {
    let mut running_total = 0.0;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            running_total += item.amount;
            let start = if item.is_total {
                0.0
            } else {
                running_total - item.amount
            };
            let color = if item.is_total {
                BarColor::Total
            } else if item.amount < 0.0 {
                BarColor::Negative
            } else {
                BarColor::Positive
            };

            WaterfallBar {
                position: i + 1,
                label: item.label.clone(),
                is_total: item.is_total,
                amount: item.amount,
                running_total,
                start,
                end: running_total,
                text_label: if item.is_total {
                    String::new()
                } else {
                    format!("{:+.1}", item.amount)
                },
                total_text_label: if item.is_total {
                    format!("{:.1}", running_total)
                } else {
                    String::new()
                },
                label_position: if item.is_total {
                    running_total
                } else {
                    start + item.amount.abs() / 2.0
                },
                color,
            }
        })
        .collect()
}
