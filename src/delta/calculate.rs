//! Fetch-volume decision for incremental scrapes.

use serde::Serialize;

/// Data older than this many days always triggers a full scrape.
pub const STALE_AFTER_DAYS: u64 = 30;

/// An incremental fetch covering more than this share of the collection is
/// escalated to a full scrape.
pub const FULL_SCRAPE_RATIO: f64 = 0.7;

/// Tuning knobs for [`calculate_items_to_fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaPolicy {
    /// Safety margin added to every incremental fetch.
    pub buffer: u64,
    /// Expected changed items per day since the last update.
    pub daily_factor: u64,
}

impl Default for DeltaPolicy {
    fn default() -> Self {
        Self {
            buffer: 10,
            daily_factor: 2,
        }
    }
}

/// Recommendation for how much of a remote collection to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaResult {
    pub items_to_fetch: u64,
    pub reason: String,
    pub is_full_scrape: bool,
    /// Net change since the last update; negative means deletions.
    pub new_items_estimate: i64,
    pub days_since_update: u64,
}

impl DeltaResult {
    pub(crate) fn full(online_count: u64, reason: impl Into<String>, estimate: i64, days: u64) -> Self {
        Self {
            items_to_fetch: online_count,
            reason: reason.into(),
            is_full_scrape: true,
            new_items_estimate: estimate,
            days_since_update: days,
        }
    }

    /// Human-readable summary.
    pub fn description(&self) -> String {
        if self.is_full_scrape {
            format!("Full scrape needed: {}", self.reason)
        } else {
            format!(
                "Incremental update: {} items ({} new, {})",
                self.items_to_fetch, self.new_items_estimate, self.reason
            )
        }
    }
}

fn signed(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Decide how many items to fetch given the remote count, the saved count
/// and the days since the last update.
///
/// Rules, first match wins:
/// 1. fewer items online than saved: full scrape
/// 2. older than [`STALE_AFTER_DAYS`]: full scrape
/// 3. nothing saved yet: full scrape
/// 4. otherwise `min(online, |diff| + buffer + daily_factor * days)`,
///    escalated to a full scrape above [`FULL_SCRAPE_RATIO`] of `online`
pub fn calculate_items_to_fetch(
    online_count: u64,
    saved_count: u64,
    days_since_update: u64,
    buffer: u64,
    daily_factor: u64,
) -> DeltaResult {
    let count_diff = signed(online_count) - signed(saved_count);

    if online_count < saved_count {
        return DeltaResult::full(online_count, "items removed from source", 0, days_since_update);
    }

    if days_since_update > STALE_AFTER_DAYS {
        return DeltaResult::full(
            online_count,
            format!("stale data ({} days)", days_since_update),
            count_diff,
            days_since_update,
        );
    }

    if saved_count == 0 {
        return DeltaResult::full(
            online_count,
            "initial scrape",
            signed(online_count),
            days_since_update,
        );
    }

    let wanted = count_diff
        .unsigned_abs()
        .saturating_add(buffer)
        .saturating_add(daily_factor.saturating_mul(days_since_update));
    let items_to_fetch = wanted.min(online_count);

    if items_to_fetch as f64 > online_count as f64 * FULL_SCRAPE_RATIO {
        return DeltaResult::full(
            online_count,
            "incremental would fetch >70%",
            count_diff,
            days_since_update,
        );
    }

    DeltaResult {
        items_to_fetch,
        reason: format!("+{} new, {}d stale", count_diff, days_since_update),
        is_full_scrape: false,
        new_items_estimate: count_diff,
        days_since_update,
    }
}

impl DeltaPolicy {
    /// [`calculate_items_to_fetch`] with this policy's buffer and factor.
    pub fn evaluate(&self, online_count: u64, saved_count: u64, days_since_update: u64) -> DeltaResult {
        calculate_items_to_fetch(
            online_count,
            saved_count,
            days_since_update,
            self.buffer,
            self.daily_factor,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_scrape() {
        let result = calculate_items_to_fetch(100, 0, 0, 10, 2);
        assert!(result.is_full_scrape);
        assert_eq!(result.items_to_fetch, 100);
        assert_eq!(result.new_items_estimate, 100);
        assert!(result.reason.contains("initial"));
    }

    #[test]
    fn test_items_removed() {
        let result = calculate_items_to_fetch(90, 100, 1, 10, 2);
        assert!(result.is_full_scrape);
        assert_eq!(result.items_to_fetch, 90);
        assert_eq!(result.new_items_estimate, 0);
        assert!(result.reason.contains("removed"));
    }

    #[test]
    fn test_stale_data() {
        let result = calculate_items_to_fetch(100, 100, 35, 10, 2);
        assert!(result.is_full_scrape);
        assert_eq!(result.items_to_fetch, 100);
        assert!(result.reason.contains("stale"));
        assert!(result.reason.contains("35"));
    }

    #[test]
    fn test_incremental() {
        let result = calculate_items_to_fetch(105, 100, 2, 10, 2);
        assert!(!result.is_full_scrape);
        assert_eq!(result.items_to_fetch, 19);
        assert_eq!(result.new_items_estimate, 5);
        assert_eq!(result.reason, "+5 new, 2d stale");
    }

    #[test]
    fn test_escalates_above_ratio() {
        // 10 + 10 + 2*5 = 30 of 40 online is 75%
        let result = calculate_items_to_fetch(40, 30, 5, 10, 2);
        assert!(result.is_full_scrape);
        assert_eq!(result.items_to_fetch, 40);
        assert!(result.reason.contains(">70%"));
    }

    #[test]
    fn test_thirty_days_is_not_stale() {
        let result = calculate_items_to_fetch(1000, 1000, 30, 10, 2);
        assert!(!result.is_full_scrape);
        assert_eq!(result.items_to_fetch, 70);
    }

    #[test]
    fn test_description() {
        let incremental = calculate_items_to_fetch(105, 100, 2, 10, 2);
        assert_eq!(
            incremental.description(),
            "Incremental update: 19 items (5 new, +5 new, 2d stale)"
        );

        let full = calculate_items_to_fetch(100, 0, 0, 10, 2);
        assert_eq!(full.description(), "Full scrape needed: initial scrape");
    }

    #[test]
    fn test_policy_defaults() {
        let policy = DeltaPolicy::default();
        assert_eq!(policy.evaluate(105, 100, 2).items_to_fetch, 19);
    }
}
