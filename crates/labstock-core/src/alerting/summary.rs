//! Alert summary aggregation

use std::collections::HashSet;

use crate::error::Result;
use crate::models::{AlertCounts, AlertSummary, Part, StockStatus};
use crate::repository::{AlertRepository, PartRepository};

/// Combine alert counts with live part state.
///
/// Part counts come from the parts themselves, so they stay correct when
/// alert rows lag behind.
pub fn aggregate(parts: &[Part], counts: AlertCounts) -> AlertSummary {
    let mut low = HashSet::new();
    let mut out = HashSet::new();

    for part in parts.iter().filter(|p| p.is_active) {
        match part.stock_status() {
            StockStatus::OutOfStock => {
                low.insert(part.id);
                out.insert(part.id);
            }
            StockStatus::LowStock => {
                low.insert(part.id);
            }
            StockStatus::InStock => {}
        }
    }

    AlertSummary {
        total_alerts: counts.total,
        active_alerts: counts.active.min(counts.total),
        resolved_alerts: counts.total.saturating_sub(counts.active),
        critical_parts_low: low.len() as u64,
        out_of_stock_parts: out.len() as u64,
    }
}

/// Compute the summary from both repositories
pub async fn summarize(
    parts: &dyn PartRepository,
    alerts: &dyn AlertRepository,
) -> Result<AlertSummary> {
    let (parts, counts) = futures::try_join!(parts.list(), alerts.counts())?;
    Ok(aggregate(&parts, counts))
}

/// Every active part that is currently low or out of stock
pub async fn low_stock_parts(parts: &dyn PartRepository) -> Result<Vec<Part>> {
    Ok(parts
        .list()
        .await?
        .into_iter()
        .filter(Part::is_low_stock)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPart;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn part(quantity: i32, minimum: i32) -> Part {
        NewPart::new(format!("P-{}", Uuid::new_v4()), "Part", quantity, minimum)
            .into_part(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_empty_inventory_is_all_zeros() {
        assert_eq!(aggregate(&[], AlertCounts::default()), AlertSummary::default());
    }

    #[test]
    fn test_counts_come_from_live_parts() {
        let parts = vec![part(0, 5), part(3, 5), part(5, 5), part(9, 5)];
        // stale alert table: nothing recorded yet
        let summary = aggregate(&parts, AlertCounts::default());

        assert_eq!(summary.critical_parts_low, 3);
        assert_eq!(summary.out_of_stock_parts, 1);
        assert_eq!(summary.active_alerts, 0);
    }

    #[test]
    fn test_inactive_parts_are_ignored() {
        let mut retired = part(0, 5);
        retired.is_active = false;
        let summary = aggregate(&[retired], AlertCounts::default());
        assert_eq!(summary.out_of_stock_parts, 0);
    }

    #[test]
    fn test_duplicate_part_rows_counted_once() {
        let p = part(0, 2);
        let summary = aggregate(&[p.clone(), p], AlertCounts { total: 3, active: 1 });
        assert_eq!(summary.critical_parts_low, 1);
        assert_eq!(summary.out_of_stock_parts, 1);
        assert_eq!(summary.resolved_alerts, 2);
    }

    proptest! {
        #[test]
        fn active_never_exceeds_total(total in 0u64..1000, active in 0u64..1000) {
            let summary = aggregate(&[], AlertCounts { total, active });
            prop_assert!(summary.active_alerts <= summary.total_alerts);
            prop_assert_eq!(summary.active_alerts + summary.resolved_alerts, summary.total_alerts);
        }
    }
}
