//! RescueTime: hourly activity rows from the analytic data API, 14 days per request.
//!
//! RescueTime has no "first date" endpoint, so an empty dataset starts from a
//! configured floor date.

use chrono::NaiveDate;
use url::Url;

use super::{DataSource, SourceKind, StartPoint};
use crate::artifact::ArtifactSpec;
use crate::dataset::{DateKey, Granularity, Layout, Window};
use crate::rate_limit::{RealmQuota, quotas};

pub const DEFAULT_API_URL: &str = "https://www.rescuetime.com/api/oauth/data";
pub const TOKEN_URL: &str = "https://www.rescuetime.com/oauth/token";

/// Days covered by one request.
pub const WINDOW_DAYS: u32 = 14;

const ARTIFACT: ArtifactSpec = ArtifactSpec {
    basename: "rescuetime.json",
    description: "RescueTime productivity data.",
    tags: &["RescueTime", "productivity"],
    match_tag: "RescueTime",
};

#[derive(Debug, Clone)]
pub struct RescueTime {
    api_url: String,
    first_date: NaiveDate,
}

impl Default for RescueTime {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            first_date: Self::default_first_date(),
        }
    }
}

impl RescueTime {
    /// RescueTime's public launch; no account has data before it.
    pub fn default_first_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2008, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    #[must_use]
    pub fn with_first_date(mut self, first_date: NaiveDate) -> Self {
        self.first_date = first_date;
        self
    }
}

impl DataSource for RescueTime {
    fn kind(&self) -> SourceKind {
        SourceKind::RescueTime
    }

    fn layout(&self) -> Layout {
        Layout::Table {
            date_column: 0,
            key: DateKey::DateTime("%Y-%m-%dT%H:%M:%S"),
        }
    }

    fn granularity(&self) -> Granularity {
        Granularity::Day
    }

    fn window(&self) -> Window {
        Window::days(WINDOW_DAYS)
    }

    fn artifact(&self) -> &ArtifactSpec {
        &ARTIFACT
    }

    fn start_point(&self, _access_token: &str) -> StartPoint {
        StartPoint::Fixed(self.first_date)
    }

    fn page_url(&self, start: NaiveDate, access_token: &str) -> String {
        let end = self.window().last_day(start);
        let begin = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();
        let params = [
            ("access_token", access_token),
            ("format", "json"),
            ("perspective", "interval"),
            ("restrict_kind", "activity"),
            ("interval", "hour"),
            ("restrict_begin", begin.as_str()),
            ("restrict_end", end.as_str()),
        ];

        match Url::parse_with_params(&self.api_url, &params) {
            Ok(url) => url.to_string(),
            // A bad base URL fails at request time as a transport error.
            Err(_) => self.api_url.clone(),
        }
    }

    fn default_quota(&self) -> RealmQuota {
        RealmQuota::per_minute(quotas::RESCUETIME_PER_MINUTE)
    }
}
