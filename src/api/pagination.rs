use crate::api::{DashboardApi, QueryRange};
use crate::error::AppError;
use crate::models::UsageEvent;

pub const USAGE_EVENTS_PAGE_SIZE: u32 = 600;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchProgress {
    pub fetched: usize,
    pub total: usize,
}

impl FetchProgress {
    pub fn percent(&self) -> Option<u32> {
        if self.total == 0 {
            return None;
        }
        Some(((self.fetched as f64 / self.total as f64) * 100.0).round() as u32)
    }
}

// Drains the usage-events feed page by page. The first page carries the
// authoritative total; a zero-length page terminates the sweep even when that
// total never converges. Progress fires after every page so callers can show
// partial data, but a failed page fails the whole sweep with no partial
// return.
pub async fn fetch_all_usage_events<A, F>(
    api: &A,
    range: QueryRange,
    page_size: u32,
    mut on_progress: F,
) -> Result<Vec<UsageEvent>, AppError>
where
    A: DashboardApi + ?Sized + Sync,
    F: FnMut(&[UsageEvent], FetchProgress),
{
    let mut accumulated: Vec<UsageEvent> = Vec::new();
    let mut page = 1u32;
    let mut total = 0usize;
    let mut fetched = 0usize;

    loop {
        let batch = api.usage_events_page(range, page, page_size).await?;
        let count = batch.usage_events_display.len();
        accumulated.extend(batch.usage_events_display);

        if page == 1 {
            total = batch.total_usage_events_count as usize;
        }
        fetched += count;

        on_progress(&accumulated, FetchProgress { fetched, total });

        page += 1;
        if fetched >= total || count == 0 {
            break;
        }
    }

    Ok(accumulated)
}
