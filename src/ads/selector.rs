use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{AdPosition, AdRecord};

/// Read-only query over a snapshot of ad records.
#[derive(Debug, Clone, Copy)]
pub struct AdSelector<'a> {
    records: &'a [AdRecord],
}

impl<'a> AdSelector<'a> {
    pub fn new(records: &'a [AdRecord]) -> Self {
        Self { records }
    }

    /// Active ads for `position` that are due on this impression, highest
    /// priority first. Ads of equal priority keep their stored order.
    pub fn select(&self, position: AdPosition, impression: u64) -> Vec<&'a AdRecord> {
        let mut ads: Vec<&AdRecord> = self
            .records
            .iter()
            .filter(|ad| ad.active && ad.position == position)
            .filter(|ad| due(ad, impression))
            .collect();
        ads.sort_by_key(|ad| Reverse(ad.priority.rank()));
        ads
    }
}

fn due(ad: &AdRecord, impression: u64) -> bool {
    match ad.frequency_cap {
        Some(cap) if cap > 0 => impression % u64::from(cap) == 0,
        _ => true,
    }
}

/// Page views seen by this process. Starts at zero and is never persisted.
#[derive(Debug, Default)]
pub struct ImpressionCounter {
    views: AtomicU64,
}

impl ImpressionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a page view and return its impression number, starting at 0.
    pub fn record_view(&self) -> u64 {
        self.views.fetch_add(1, Ordering::SeqCst)
    }

    /// Impression number of the latest recorded view, 0 before the first.
    pub fn current(&self) -> u64 {
        self.views.load(Ordering::SeqCst).saturating_sub(1)
    }

    /// Views recorded so far.
    pub fn views(&self) -> u64 {
        self.views.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::{default_ads, Priority};

    fn ad(id: &str, position: AdPosition, priority: Priority) -> AdRecord {
        AdRecord {
            id: id.into(),
            name: id.into(),
            position,
            active: true,
            priority,
            payload: "<div></div>".into(),
            frequency_cap: None,
            view_threshold: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn ids(ads: Vec<&AdRecord>) -> Vec<&str> {
        ads.into_iter().map(|ad| ad.id.as_str()).collect()
    }

    #[test]
    fn sorts_by_priority() {
        let records = vec![
            ad("low", AdPosition::Top, Priority::Low),
            ad("high", AdPosition::Top, Priority::High),
            ad("normal", AdPosition::Top, Priority::Normal),
        ];
        let selected = AdSelector::new(&records).select(AdPosition::Top, 0);

        assert_eq!(ids(selected), vec!["high", "normal", "low"]);
    }

    #[test]
    fn equal_priority_keeps_order() {
        let records = vec![
            ad("a", AdPosition::Top, Priority::Normal),
            ad("b", AdPosition::Top, Priority::High),
            ad("c", AdPosition::Top, Priority::Normal),
        ];
        let selected = AdSelector::new(&records).select(AdPosition::Top, 0);

        assert_eq!(ids(selected), vec!["b", "a", "c"]);
    }

    #[test]
    fn filters_position_and_inactive() {
        let mut records = default_ads();
        records[0].active = false;

        assert!(AdSelector::new(&records).select(AdPosition::Top, 0).is_empty());
        assert_eq!(
            ids(AdSelector::new(&records).select(AdPosition::Bottom, 0)),
            vec!["ad-bottom"]
        );
        assert!(AdSelector::new(&records).select(AdPosition::Sticky, 0).is_empty());
    }

    #[test]
    fn frequency_cap_every_third_impression() {
        let mut capped = ad("capped", AdPosition::Middle, Priority::Normal);
        capped.frequency_cap = Some(3);
        let records = vec![capped];
        let selector = AdSelector::new(&records);

        let shown: Vec<u64> = (0..9)
            .filter(|i| !selector.select(AdPosition::Middle, *i).is_empty())
            .collect();
        assert_eq!(shown, vec![0, 3, 6]);
    }

    #[test]
    fn zero_cap_means_uncapped() {
        let mut uncapped = ad("zero", AdPosition::Middle, Priority::Normal);
        uncapped.frequency_cap = Some(0);
        let records = vec![uncapped];

        assert_eq!(AdSelector::new(&records).select(AdPosition::Middle, 7).len(), 1);
    }

    #[test]
    fn counter_numbers_views_from_zero() {
        let counter = ImpressionCounter::new();
        assert_eq!(counter.current(), 0);
        assert_eq!(counter.record_view(), 0);
        assert_eq!(counter.record_view(), 1);
        assert_eq!(counter.current(), 1);
        assert_eq!(counter.views(), 2);
    }
}
