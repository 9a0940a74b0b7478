use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::error::AppError;
use crate::models::{AnalyticsData, UsageEventsPage};

pub mod pagination;

pub const DEFAULT_BASE_URL: &str = "https://cursor.com";
pub const SESSION_COOKIE_NAME: &str = "WorkosCursorSessionToken";

const ANALYTICS_PATH: &str = "/api/dashboard/get-user-analytics";
const USAGE_EVENTS_PATH: &str = "/api/dashboard/get-filtered-usage-events";

#[derive(Debug, Clone, Copy)]
pub struct QueryRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

#[async_trait]
pub trait DashboardApi {
    async fn user_analytics(&self, range: QueryRange) -> Result<AnalyticsData, AppError>;

    async fn usage_events_page(
        &self,
        range: QueryRange,
        page: u32,
        page_size: u32,
    ) -> Result<UsageEventsPage, AppError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyticsRequest {
    team_id: i64,
    user_id: i64,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UsageEventsRequest {
    team_id: i64,
    start_date: String,
    end_date: String,
    page: u32,
    page_size: u32,
}

#[derive(Debug)]
pub struct HttpDashboardClient {
    client: Client,
    base_url: Url,
    session_cookie: Option<String>,
}

impl HttpDashboardClient {
    pub fn new(base_url: &str, session_cookie: Option<String>) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid base URL '{base_url}': {e}")))?;
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url,
            session_cookie,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AppError> {
        self.base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("Invalid endpoint path '{path}': {e}")))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, AppError>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let mut request = self
            .client
            .post(self.endpoint(path)?)
            .header("Cache-Control", "no-cache, no-store, must-revalidate")
            .header("Pragma", "no-cache")
            .json(body);
        if let Some(cookie) = &self.session_cookie {
            request = request.header(reqwest::header::COOKIE, cookie_header(cookie));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

fn cookie_header(value: &str) -> String {
    format!("{SESSION_COOKIE_NAME}={value}")
}

#[async_trait]
impl DashboardApi for HttpDashboardClient {
    async fn user_analytics(&self, range: QueryRange) -> Result<AnalyticsData, AppError> {
        self.post_json(
            ANALYTICS_PATH,
            &AnalyticsRequest {
                team_id: 0,
                user_id: 0,
                start_date: range.start_ms.to_string(),
                end_date: range.end_ms.to_string(),
            },
        )
        .await
    }

    async fn usage_events_page(
        &self,
        range: QueryRange,
        page: u32,
        page_size: u32,
    ) -> Result<UsageEventsPage, AppError> {
        self.post_json(
            USAGE_EVENTS_PATH,
            &UsageEventsRequest {
                team_id: 0,
                start_date: range.start_ms.to_string(),
                end_date: range.end_ms.to_string(),
                page,
                page_size,
            },
        )
        .await
    }
}
