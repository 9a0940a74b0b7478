use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::daykey::{self, WEEKDAYS};
use crate::models::{AnalyticsData, DailyMetric, UsageEvent};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub day: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekdayBucket {
    pub day: &'static str,
    pub full_name: &'static str,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayPoint {
    pub x: &'static str,
    pub y: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeeklyActivity {
    pub messages: Vec<DayPoint>,
    pub accepted_lines: Vec<DayPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTokenSplit {
    pub day: String,
    pub subscription: u64,
    pub usage: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyCostSplit {
    pub day: String,
    pub subscription: f64,
    pub usage: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardViews {
    pub agent_requests: Vec<CalendarDay>,
    pub accepted_lines: Vec<CalendarDay>,
    pub weekdays: Vec<WeekdayBucket>,
    pub weekly: WeeklyActivity,
    pub tokens: Vec<DailyTokenSplit>,
    pub costs: Vec<DailyCostSplit>,
}

fn calendar_by<F>(analytics: &AnalyticsData, metric: F) -> Vec<CalendarDay>
where
    F: Fn(&DailyMetric) -> u64,
{
    let mut days: BTreeMap<String, u64> = BTreeMap::new();
    for entry in &analytics.daily_metrics {
        let Some(day) = daykey::day_key_of(&entry.date) else {
            continue;
        };
        *days.entry(day).or_insert(0) += metric(entry);
    }

    // Zero-valued days are dropped so "no activity" never renders as a cell.
    days.into_iter()
        .filter(|(_, value)| *value > 0)
        .map(|(day, value)| CalendarDay { day, value })
        .collect()
}

pub fn agent_requests_calendar(analytics: &AnalyticsData) -> Vec<CalendarDay> {
    calendar_by(analytics, |m| m.agent_requests)
}

pub fn accepted_lines_calendar(analytics: &AnalyticsData) -> Vec<CalendarDay> {
    calendar_by(analytics, |m| m.accepted_lines_added)
}

pub fn weekday_distribution(analytics: &AnalyticsData) -> Vec<WeekdayBucket> {
    let mut totals = [0u64; 7];
    for entry in &analytics.daily_metrics {
        let Some(dt) = daykey::parse_epoch_ms(&entry.date).and_then(daykey::local_datetime) else {
            continue;
        };
        totals[daykey::weekday_index(dt.weekday())] += entry.agent_requests;
    }

    WEEKDAYS
        .iter()
        .zip(totals)
        .map(|(&(day, full_name), value)| WeekdayBucket {
            day,
            full_name,
            value,
        })
        .collect()
}

// Two parallel series over today and the six preceding days; days with no
// metric stay at 0 so both series always hold exactly seven points.
pub fn last_seven_days(analytics: &AnalyticsData, today: NaiveDate) -> WeeklyActivity {
    let mut requests: BTreeMap<String, u64> = BTreeMap::new();
    let mut accepted: BTreeMap<String, u64> = BTreeMap::new();
    for entry in &analytics.daily_metrics {
        let Some(day) = daykey::day_key_of(&entry.date) else {
            continue;
        };
        *requests.entry(day.clone()).or_insert(0) += entry.agent_requests;
        *accepted.entry(day).or_insert(0) += entry.accepted_lines_added;
    }

    let mut weekly = WeeklyActivity::default();
    for offset in (0..7u64).rev() {
        let Some(date) = today.checked_sub_days(Days::new(offset)) else {
            continue;
        };
        let key = date.format("%Y-%m-%d").to_string();
        let name = daykey::weekday_short(date.weekday());
        weekly.messages.push(DayPoint {
            x: name,
            y: requests.get(&key).copied().unwrap_or(0),
        });
        weekly.accepted_lines.push(DayPoint {
            x: name,
            y: accepted.get(&key).copied().unwrap_or(0),
        });
    }
    weekly
}

pub fn trailing_window(events: &[UsageEvent], days: u32, now: DateTime<Local>) -> Vec<UsageEvent> {
    let Some(start_ms) = window_start_ms(days, now) else {
        return Vec::new();
    };
    events
        .iter()
        .filter(|event| event.epoch_ms().is_some_and(|ms| ms >= start_ms))
        .cloned()
        .collect()
}

// Window opens at local start-of-day `days` days back, so the current partial
// day is always fully included.
fn window_start_ms(days: u32, now: DateTime<Local>) -> Option<i64> {
    let start_day = now.date_naive().checked_sub_days(Days::new(u64::from(days)))?;
    let start = start_day.and_hms_opt(0, 0, 0)?;
    Local
        .from_local_datetime(&start)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

pub fn token_bar_series(events: &[UsageEvent]) -> Vec<DailyTokenSplit> {
    let mut days: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for event in events {
        let Some(day) = daykey::day_key_of(&event.timestamp) else {
            continue;
        };
        let bucket = days.entry(day).or_insert((0, 0));
        let Some(usage) = event.token_usage else {
            continue;
        };
        let tokens = usage.total_tokens();
        let kind = event.billing_kind();
        if kind.is_subscription() {
            bucket.0 += tokens;
        } else if kind.is_usage_based() {
            bucket.1 += tokens;
        }
    }

    days.into_iter()
        .map(|(day, (subscription, usage))| DailyTokenSplit {
            day,
            subscription,
            usage,
        })
        .collect()
}

pub fn cost_bar_series(events: &[UsageEvent]) -> Vec<DailyCostSplit> {
    let mut days: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for event in events {
        let Some(day) = daykey::day_key_of(&event.timestamp) else {
            continue;
        };
        let bucket = days.entry(day).or_insert((0.0, 0.0));
        let Some(cents) = event.token_usage.as_ref().and_then(|u| u.total_cents) else {
            continue;
        };
        let kind = event.billing_kind();
        if kind.is_subscription() {
            bucket.0 += cents;
        } else if kind.is_usage_based() {
            bucket.1 += cents;
        }
    }

    days.into_iter()
        .map(|(day, (subscription, usage))| DailyCostSplit {
            day,
            subscription,
            usage,
        })
        .collect()
}

pub fn build_views(
    analytics: Option<&AnalyticsData>,
    events: &[UsageEvent],
    bar_window_days: u32,
    now: DateTime<Local>,
) -> DashboardViews {
    let windowed = trailing_window(events, bar_window_days, now);
    DashboardViews {
        agent_requests: analytics.map(agent_requests_calendar).unwrap_or_default(),
        accepted_lines: analytics.map(accepted_lines_calendar).unwrap_or_default(),
        weekdays: analytics.map(weekday_distribution).unwrap_or_default(),
        weekly: analytics
            .map(|a| last_seven_days(a, now.date_naive()))
            .unwrap_or_default(),
        tokens: token_bar_series(&windowed),
        costs: cost_bar_series(&windowed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TokenUsage, KIND_INCLUDED_IN_PRO, KIND_USAGE_BASED};

    const DAY_MS: i64 = 86_400_000;
    // 2024-01-01T12:00:00Z; noon keeps the local day stable across offsets.
    const BASE_MS: i64 = 1_704_110_400_000;

    fn metric(date_ms: i64, agent_requests: u64, accepted_lines_added: u64) -> DailyMetric {
        DailyMetric {
            date: date_ms.to_string(),
            agent_requests,
            accepted_lines_added,
            ..DailyMetric::default()
        }
    }

    fn analytics(metrics: Vec<DailyMetric>) -> AnalyticsData {
        AnalyticsData {
            daily_metrics: metrics,
            ..AnalyticsData::default()
        }
    }

    fn token_event(ms: i64, kind: &str, usage: TokenUsage) -> UsageEvent {
        UsageEvent {
            timestamp: ms.to_string(),
            model: "auto".into(),
            kind: kind.into(),
            token_usage: Some(usage),
            ..UsageEvent::default()
        }
    }

    #[test]
    fn calendar_keeps_nonzero_days_and_drops_zero_days() {
        let data = analytics(vec![
            metric(1_704_067_200_000, 4, 0),
            metric(1_704_067_200_000 + DAY_MS, 0, 9),
        ]);

        let requests = agent_requests_calendar(&data);
        let expected_day = daykey::day_key_local(1_704_067_200_000).expect("day key");
        assert_eq!(
            requests,
            vec![CalendarDay {
                day: expected_day,
                value: 4
            }]
        );

        // The zero-valued requests day surfaces only in the accepted-lines view.
        let accepted = accepted_lines_calendar(&data);
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].value, 9);
    }

    #[test]
    fn calendar_sums_duplicate_entries_for_one_day() {
        let data = analytics(vec![metric(BASE_MS, 2, 0), metric(BASE_MS + 60_000, 3, 0)]);
        let requests = agent_requests_calendar(&data);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].value, 5);
    }

    #[test]
    fn calendar_drops_malformed_dates() {
        let mut bad = metric(BASE_MS, 7, 0);
        bad.date = "yesterday".into();
        let data = analytics(vec![bad]);
        assert!(agent_requests_calendar(&data).is_empty());
    }

    #[test]
    fn weekday_distribution_sums_same_weekday_across_weeks() {
        let data = analytics(vec![
            metric(BASE_MS, 5, 0),
            metric(BASE_MS + 7 * DAY_MS, 3, 0),
        ]);
        let buckets = weekday_distribution(&data);
        assert_eq!(buckets.len(), 7);

        let expected_index = daykey::local_datetime(BASE_MS)
            .map(|dt| daykey::weekday_index(dt.weekday()))
            .expect("weekday");
        for (index, bucket) in buckets.iter().enumerate() {
            let expected = if index == expected_index { 8 } else { 0 };
            assert_eq!(bucket.value, expected, "bucket {}", bucket.day);
        }
        assert_eq!(buckets[0].day, "Mon");
        assert_eq!(buckets[0].full_name, "Monday");
        assert_eq!(buckets[6].day, "Sun");
    }

    #[test]
    fn last_seven_days_always_yields_seven_points_per_series() {
        let now = Local::now();
        let data = analytics(vec![metric(now.timestamp_millis(), 6, 11)]);
        let weekly = last_seven_days(&data, now.date_naive());

        assert_eq!(weekly.messages.len(), 7);
        assert_eq!(weekly.accepted_lines.len(), 7);
        // Today is the final point of each series.
        assert_eq!(weekly.messages[6].y, 6);
        assert_eq!(weekly.accepted_lines[6].y, 11);
        assert_eq!(
            weekly.messages[6].x,
            daykey::weekday_short(now.date_naive().weekday())
        );
        assert!(weekly.messages[..6].iter().all(|p| p.y == 0));
    }

    #[test]
    fn token_series_routes_kinds_into_their_buckets() {
        let usage = TokenUsage {
            input_tokens: 100,
            output_tokens: 50,
            ..TokenUsage::default()
        };
        let rows = token_bar_series(&[token_event(BASE_MS, KIND_USAGE_BASED, usage)]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].usage, 150);
        assert_eq!(rows[0].subscription, 0);
    }

    #[test]
    fn token_series_counts_all_four_token_fields() {
        let usage = TokenUsage {
            input_tokens: 1,
            output_tokens: 2,
            cache_write_tokens: 3,
            cache_read_tokens: 4,
            ..TokenUsage::default()
        };
        let rows = token_bar_series(&[token_event(BASE_MS, KIND_INCLUDED_IN_PRO, usage)]);
        assert_eq!(rows[0].subscription, 10);
    }

    #[test]
    fn unrecognized_kind_feeds_neither_bucket_but_keeps_the_day() {
        let usage = TokenUsage {
            input_tokens: 500,
            ..TokenUsage::default()
        };
        let rows = token_bar_series(&[token_event(BASE_MS, "USAGE_EVENT_KIND_MYSTERY", usage)]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subscription, 0);
        assert_eq!(rows[0].usage, 0);
    }

    #[test]
    fn cost_series_splits_same_day_by_kind() {
        let sub = TokenUsage {
            total_cents: Some(200.0),
            ..TokenUsage::default()
        };
        let usage = TokenUsage {
            total_cents: Some(50.0),
            ..TokenUsage::default()
        };
        let rows = cost_bar_series(&[
            token_event(BASE_MS, KIND_INCLUDED_IN_PRO, sub),
            token_event(BASE_MS + 3_600_000, KIND_USAGE_BASED, usage),
        ]);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].subscription, 200.0);
        assert_eq!(rows[0].usage, 50.0);
    }

    #[test]
    fn events_without_cost_are_excluded_from_the_cost_series_sums() {
        let priced = TokenUsage {
            total_cents: Some(75.0),
            ..TokenUsage::default()
        };
        let unpriced = TokenUsage {
            input_tokens: 10_000,
            ..TokenUsage::default()
        };
        let rows = cost_bar_series(&[
            token_event(BASE_MS, KIND_USAGE_BASED, priced),
            token_event(BASE_MS, KIND_USAGE_BASED, unpriced),
        ]);
        assert_eq!(rows[0].usage, 75.0);
    }

    #[test]
    fn bar_series_rows_sort_ascending_by_day_key() {
        let usage = TokenUsage {
            input_tokens: 1,
            ..TokenUsage::default()
        };
        let rows = token_bar_series(&[
            token_event(BASE_MS + 2 * DAY_MS, KIND_USAGE_BASED, usage),
            token_event(BASE_MS, KIND_USAGE_BASED, usage),
            token_event(BASE_MS + DAY_MS, KIND_USAGE_BASED, usage),
        ]);
        let days: Vec<&str> = rows.iter().map(|r| r.day.as_str()).collect();
        let mut sorted = days.clone();
        sorted.sort();
        assert_eq!(days, sorted);
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn trailing_window_keeps_recent_events_and_drops_old_or_malformed() {
        let now = Local::now();
        let recent = token_event(now.timestamp_millis(), KIND_USAGE_BASED, TokenUsage::default());
        let old = token_event(
            now.timestamp_millis() - 20 * DAY_MS,
            KIND_USAGE_BASED,
            TokenUsage::default(),
        );
        let malformed = UsageEvent {
            timestamp: "not-an-epoch".into(),
            ..UsageEvent::default()
        };

        let kept = trailing_window(&[recent, old, malformed], 14, now);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].timestamp, now.timestamp_millis().to_string());
    }

    #[test]
    fn build_views_without_analytics_still_produces_event_series() {
        let now = Local::now();
        let usage = TokenUsage {
            input_tokens: 5,
            ..TokenUsage::default()
        };
        let events = vec![token_event(now.timestamp_millis(), KIND_USAGE_BASED, usage)];

        let views = build_views(None, &events, 14, now);
        assert!(views.agent_requests.is_empty());
        assert!(views.weekdays.is_empty());
        assert_eq!(views.tokens.len(), 1);
        assert_eq!(views.tokens[0].usage, 5);
    }
}
