use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Days, Local, TimeZone};
use tokio::task::JoinHandle;

use crate::api::pagination::{fetch_all_usage_events, FetchProgress, USAGE_EVENTS_PAGE_SIZE};
use crate::api::{DashboardApi, QueryRange};
use crate::cache::EventCache;
use crate::models::{AnalyticsData, UsageEvent};
use crate::views::{self, DashboardViews};

// 2024-01-01T00:00:00Z; the dashboard keeps data no further back than this.
pub const ANALYTICS_RANGE_START_MS: i64 = 1_704_067_200_000;

#[derive(Debug, Clone, Default)]
pub struct ActivityState {
    pub analytics: Option<AnalyticsData>,
    pub analytics_loading: bool,
    pub analytics_error: Option<String>,
    pub events: Vec<UsageEvent>,
    pub events_loading: bool,
    pub events_error: Option<String>,
    pub events_from_cache: bool,
    pub progress: FetchProgress,
}

pub struct MountHandles {
    pub analytics: JoinHandle<()>,
    pub events: Option<JoinHandle<()>>,
}

// Coordinates the two fetch channels around one shared state snapshot. Each
// mount bumps the generation; tasks from superseded mounts check it before
// every state write and drop their results on a mismatch.
pub struct ActivityHub {
    api: Arc<dyn DashboardApi + Send + Sync>,
    cache: Arc<EventCache>,
    state: Arc<Mutex<ActivityState>>,
    generation: Arc<AtomicU64>,
    bar_window_days: u32,
}

fn lock_state(state: &Mutex<ActivityState>) -> MutexGuard<'_, ActivityState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActivityHub {
    pub fn new(
        api: Arc<dyn DashboardApi + Send + Sync>,
        cache: EventCache,
        bar_window_days: u32,
    ) -> Self {
        Self {
            api,
            cache: Arc::new(cache),
            state: Arc::new(Mutex::new(ActivityState::default())),
            generation: Arc::new(AtomicU64::new(0)),
            bar_window_days,
        }
    }

    pub fn mount(&self) -> MountHandles {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Local::now();

        // An empty cached list counts as a miss, same as an expired one.
        let cached = self
            .cache
            .load(now.timestamp_millis())
            .filter(|events| !events.is_empty());
        let cache_hit = cached.is_some();

        {
            let mut state = lock_state(&self.state);
            *state = ActivityState::default();
            state.analytics_loading = true;
            match cached {
                Some(events) => {
                    state.events = events;
                    state.events_from_cache = true;
                }
                None => state.events_loading = true,
            }
        }

        let range = query_range(now);

        let analytics = {
            let api = Arc::clone(&self.api);
            let state = Arc::clone(&self.state);
            let live = Arc::clone(&self.generation);
            tokio::spawn(async move {
                let result = api.user_analytics(range).await;
                if live.load(Ordering::SeqCst) != generation {
                    return;
                }
                let mut state = lock_state(&state);
                match result {
                    Ok(data) => {
                        state.analytics = Some(data);
                        state.analytics_error = None;
                    }
                    Err(e) => state.analytics_error = Some(e.to_string()),
                }
                state.analytics_loading = false;
            })
        };

        let events = if cache_hit {
            None
        } else {
            let api = Arc::clone(&self.api);
            let state = Arc::clone(&self.state);
            let cache = Arc::clone(&self.cache);
            let live = Arc::clone(&self.generation);
            Some(tokio::spawn(async move {
                let progress_state = Arc::clone(&state);
                let progress_live = Arc::clone(&live);
                let result = fetch_all_usage_events(
                    api.as_ref(),
                    range,
                    USAGE_EVENTS_PAGE_SIZE,
                    |accumulated, progress| {
                        if progress_live.load(Ordering::SeqCst) != generation {
                            return;
                        }
                        let mut state = lock_state(&progress_state);
                        state.events = accumulated.to_vec();
                        state.progress = progress;
                    },
                )
                .await;

                if live.load(Ordering::SeqCst) != generation {
                    return;
                }
                match result {
                    Ok(events) => {
                        cache.save(Local::now().timestamp_millis(), &events);
                        let mut state = lock_state(&state);
                        state.events = events;
                        state.events_error = None;
                        state.events_loading = false;
                    }
                    Err(e) => {
                        let mut state = lock_state(&state);
                        state.events_error = Some(e.to_string());
                        state.events_loading = false;
                    }
                }
            }))
        };

        MountHandles { analytics, events }
    }

    pub fn snapshot(&self) -> ActivityState {
        lock_state(&self.state).clone()
    }

    pub fn views(&self) -> DashboardViews {
        let state = self.snapshot();
        views::build_views(
            state.analytics.as_ref(),
            &state.events,
            self.bar_window_days,
            Local::now(),
        )
    }
}

pub fn query_range(now: DateTime<Local>) -> QueryRange {
    QueryRange {
        start_ms: ANALYTICS_RANGE_START_MS,
        end_ms: end_of_tomorrow_ms(now),
    }
}

// End of tomorrow local time, so today's partial data is covered in every
// timezone.
fn end_of_tomorrow_ms(now: DateTime<Local>) -> i64 {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|date| date.and_hms_milli_opt(23, 59, 59, 999))
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or_else(|| now.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{DailyMetric, TokenUsage, UsageEventsPage, KIND_USAGE_BASED};
    use crate::storage::Storage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn event(model: &str) -> UsageEvent {
        UsageEvent {
            timestamp: Local::now().timestamp_millis().to_string(),
            model: model.into(),
            kind: KIND_USAGE_BASED.into(),
            token_usage: Some(TokenUsage {
                input_tokens: 10,
                ..TokenUsage::default()
            }),
            ..UsageEvent::default()
        }
    }

    fn single_page(models: &[&str]) -> UsageEventsPage {
        UsageEventsPage {
            total_usage_events_count: models.len() as u64,
            usage_events_display: models.iter().map(|m| event(m)).collect(),
        }
    }

    fn analytics_with_days(days: usize) -> AnalyticsData {
        AnalyticsData {
            daily_metrics: (0..days)
                .map(|i| DailyMetric {
                    date: (Local::now().timestamp_millis() - i as i64 * 86_400_000).to_string(),
                    agent_requests: 1,
                    ..DailyMetric::default()
                })
                .collect(),
            ..AnalyticsData::default()
        }
    }

    struct StubApi {
        analytics: Option<AnalyticsData>,
        pages: std::sync::Mutex<VecDeque<UsageEventsPage>>,
    }

    impl StubApi {
        fn new(analytics: Option<AnalyticsData>, pages: Vec<UsageEventsPage>) -> Self {
            Self {
                analytics,
                pages: std::sync::Mutex::new(pages.into()),
            }
        }
    }

    #[async_trait]
    impl DashboardApi for StubApi {
        async fn user_analytics(&self, _range: QueryRange) -> Result<AnalyticsData, AppError> {
            self.analytics.clone().ok_or(AppError::Status(500))
        }

        async fn usage_events_page(
            &self,
            _range: QueryRange,
            _page: u32,
            _page_size: u32,
        ) -> Result<UsageEventsPage, AppError> {
            self.pages
                .lock()
                .expect("pages")
                .pop_front()
                .ok_or(AppError::Status(500))
        }
    }

    fn hub_with(api: StubApi) -> ActivityHub {
        let cache = EventCache::new(Storage::open_in_memory().expect("open storage"));
        ActivityHub::new(Arc::new(api), cache, 14)
    }

    async fn settle(handles: MountHandles) {
        handles.analytics.await.expect("analytics task");
        if let Some(events) = handles.events {
            events.await.expect("events task");
        }
    }

    #[tokio::test]
    async fn mount_fetches_both_channels_and_caches_events() {
        let api = StubApi::new(Some(analytics_with_days(2)), vec![single_page(&["e1", "e2"])]);
        let hub = hub_with(api);

        settle(hub.mount()).await;

        let state = hub.snapshot();
        assert!(state.analytics.is_some());
        assert!(!state.analytics_loading);
        assert_eq!(state.events.len(), 2);
        assert!(!state.events_loading);
        assert!(state.analytics_error.is_none());
        assert!(state.events_error.is_none());
        assert_eq!(state.progress.fetched, 2);

        // Cached now, so a remount skips the event sweep entirely.
        let handles = hub.mount();
        assert!(handles.events.is_none());
        settle(handles).await;
        let state = hub.snapshot();
        assert!(state.events_from_cache);
        assert_eq!(state.events.len(), 2);
    }

    #[tokio::test]
    async fn analytics_failure_does_not_block_events() {
        let api = StubApi::new(None, vec![single_page(&["e1"])]);
        let hub = hub_with(api);

        settle(hub.mount()).await;

        let state = hub.snapshot();
        assert!(state.analytics.is_none());
        let error = state.analytics_error.expect("analytics error recorded");
        assert!(error.contains("500"));
        assert_eq!(state.events.len(), 1);
        assert!(state.events_error.is_none());
    }

    #[tokio::test]
    async fn events_failure_keeps_its_own_channel() {
        let api = StubApi::new(Some(analytics_with_days(1)), vec![]);
        let hub = hub_with(api);

        settle(hub.mount()).await;

        let state = hub.snapshot();
        assert!(state.analytics.is_some());
        let error = state.events_error.expect("events error recorded");
        assert!(error.contains("500"));
        assert!(state.events.is_empty());
        assert!(!state.events_loading);
    }

    #[tokio::test]
    async fn failed_sweep_leaves_the_cache_empty() {
        let api = StubApi::new(Some(analytics_with_days(1)), vec![]);
        let cache = EventCache::new(Storage::open_in_memory().expect("open storage"));
        let hub = ActivityHub::new(Arc::new(api), cache, 14);

        settle(hub.mount()).await;

        // Remount refetches because nothing was cached.
        let handles = hub.mount();
        assert!(handles.events.is_some());
        settle(handles).await;
    }

    struct GatedApi {
        gate: Arc<Notify>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DashboardApi for GatedApi {
        async fn user_analytics(&self, _range: QueryRange) -> Result<AnalyticsData, AppError> {
            Ok(AnalyticsData::default())
        }

        async fn usage_events_page(
            &self,
            _range: QueryRange,
            _page: u32,
            _page_size: u32,
        ) -> Result<UsageEventsPage, AppError> {
            let index = self.calls.fetch_add(1, Ordering::SeqCst);
            if index == 0 {
                // First sweep parks here until the test releases it.
                self.gate.notified().await;
                Ok(single_page(&["stale"]))
            } else {
                Ok(single_page(&["fresh"]))
            }
        }
    }

    #[tokio::test]
    async fn superseded_sweep_results_are_discarded() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(GatedApi {
            gate: Arc::clone(&gate),
            calls: AtomicUsize::new(0),
        });
        let cache = EventCache::new(Storage::open_in_memory().expect("open storage"));
        let hub = ActivityHub::new(api.clone(), cache, 14);

        let first = hub.mount();
        // Let the first sweep reach its gated page request.
        while api.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let second = hub.mount();
        settle(second).await;
        let state = hub.snapshot();
        assert_eq!(state.events.len(), 1);
        assert_eq!(state.events[0].model, "fresh");

        // Release the stale sweep; its completion must not overwrite state.
        gate.notify_one();
        settle(first).await;
        let state = hub.snapshot();
        assert_eq!(state.events[0].model, "fresh");
        assert!(!state.events_loading);
    }

    #[tokio::test]
    async fn views_reflect_partial_state() {
        let api = StubApi::new(None, vec![single_page(&["e1"])]);
        let hub = hub_with(api);

        settle(hub.mount()).await;

        let views = hub.views();
        assert!(views.agent_requests.is_empty());
        assert_eq!(views.tokens.len(), 1);
        assert_eq!(views.tokens[0].usage, 10);
    }

    #[test]
    fn query_range_starts_at_the_fixed_epoch_and_ends_after_now() {
        let now = Local::now();
        let range = query_range(now);
        assert_eq!(range.start_ms, ANALYTICS_RANGE_START_MS);
        assert!(range.end_ms > now.timestamp_millis());
    }
}
