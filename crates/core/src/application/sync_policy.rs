//! Tenant sync policy: which accounting periods a tenant sync must consult.
//!
//! Documents for a period keep arriving during the first days of the next month,
//! so the previous period is re-consulted until day 5. A tenant that has never
//! synced gets a three-month backfill.

use crate::domain::{Period, Tenant};
use chrono::{DateTime, Datelike, Utc};

/// Last day of the month on which the previous period is still consulted
pub const LATE_ARRIVAL_DAY: u32 = 5;

/// Periods preceding the current one consulted on a first sync
pub const FIRST_SYNC_BACKFILL_MONTHS: usize = 3;

/// Periods to consult for `tenant` at `now`, current period first, then descending
pub fn periods_to_consult(tenant: &Tenant, now: DateTime<Utc>) -> Vec<Period> {
    let current = Period::from_datetime(now);
    let mut periods = vec![current];

    let lookback = if tenant.is_first_sync() {
        FIRST_SYNC_BACKFILL_MONTHS
    } else if now.day() <= LATE_ARRIVAL_DAY {
        1
    } else {
        0
    };

    let mut period = current;
    for _ in 0..lookback {
        period = period.previous();
        periods.push(period);
    }

    periods
}
