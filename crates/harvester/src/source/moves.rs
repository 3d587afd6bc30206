//! Moves: daily storylines with GPS track points, fetched one ISO week at a time.

use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use url::Url;

use super::{DataSource, SourceKind, StartPoint};
use crate::artifact::ArtifactSpec;
use crate::dataset::{DateKey, Granularity, Layout, Window};
use crate::rate_limit::{RealmQuota, quotas};

pub const DEFAULT_API_BASE: &str = "https://api.moves-app.com/api/1.1";
pub const TOKEN_URL: &str = "https://api.moves-app.com/oauth/v1/access_token";

const ARTIFACT: ArtifactSpec = ArtifactSpec {
    basename: "moves-storyline-data.json",
    description: "Moves GPS maps, locations, and steps data.",
    tags: &["GPS", "Moves", "steps"],
    match_tag: "Moves",
};

#[derive(Debug, Clone)]
pub struct Moves {
    api_base: String,
}

impl Default for Moves {
    fn default() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }
}

impl Moves {
    /// Point the source at another API root (trailing slashes are ignored).
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        let api_base: String = api_base.into();
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> String {
        let base = format!("{}{}", self.api_base, path);
        match Url::parse_with_params(&base, params) {
            Ok(url) => url.to_string(),
            // A bad base URL fails at request time as a transport error.
            Err(_) => base,
        }
    }
}

impl DataSource for Moves {
    fn kind(&self) -> SourceKind {
        SourceKind::Moves
    }

    fn layout(&self) -> Layout {
        Layout::Records {
            date_field: "date",
            key: DateKey::Date("%Y%m%d"),
        }
    }

    fn granularity(&self) -> Granularity {
        Granularity::IsoWeek
    }

    fn window(&self) -> Window {
        Window::weeks(1)
    }

    fn artifact(&self) -> &ArtifactSpec {
        &ARTIFACT
    }

    fn start_point(&self, access_token: &str) -> StartPoint {
        StartPoint::Profile {
            url: self.endpoint("/user/profile", &[("access_token", access_token)]),
        }
    }

    fn parse_profile(&self, profile: &Value) -> Option<NaiveDate> {
        let first = profile.get("profile")?.get("firstDate")?.as_str()?;
        NaiveDate::parse_from_str(first, "%Y%m%d").ok()
    }

    fn page_url(&self, start: NaiveDate, access_token: &str) -> String {
        let week = start.iso_week();
        self.endpoint(
            &format!("/user/storyline/daily/{}-W{}", week.year(), week.week()),
            &[("trackPoints", "true"), ("access_token", access_token)],
        )
    }

    fn default_quota(&self) -> RealmQuota {
        RealmQuota::per_minute(quotas::MOVES_PER_MINUTE)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn page_url_uses_unpadded_iso_week() {
        let moves = Moves::default();
        assert_eq!(
            moves.page_url(date(2016, 6, 6), "tok"),
            "https://api.moves-app.com/api/1.1/user/storyline/daily/2016-W23?trackPoints=true&access_token=tok"
        );
        assert_eq!(
            moves.page_url(date(2016, 2, 1), "tok"),
            "https://api.moves-app.com/api/1.1/user/storyline/daily/2016-W5?trackPoints=true&access_token=tok"
        );
    }

    #[test]
    fn page_url_uses_iso_year_at_year_boundary() {
        let moves = Moves::default();
        assert!(
            moves
                .page_url(date(2016, 1, 1), "tok")
                .contains("/daily/2015-W53?")
        );
    }

    #[test]
    fn start_point_is_profile_lookup() {
        let moves = Moves::with_api_base("http://moves.test/api/");
        assert_eq!(
            moves.start_point("tok"),
            StartPoint::Profile {
                url: "http://moves.test/api/user/profile?access_token=tok".to_string()
            }
        );
    }

    #[test]
    fn access_token_is_query_encoded() {
        let moves = Moves::with_api_base("http://moves.test");
        let token = "a+b/c=d&e";

        let page = moves.page_url(date(2016, 6, 6), token);
        assert_eq!(
            page,
            "http://moves.test/user/storyline/daily/2016-W23?trackPoints=true&access_token=a%2Bb%2Fc%3Dd%26e"
        );
        let parsed = Url::parse(&page).unwrap();
        let sent: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            sent,
            vec![
                ("trackPoints".to_string(), "true".to_string()),
                ("access_token".to_string(), token.to_string()),
            ]
        );

        let StartPoint::Profile { url } = moves.start_point(token) else {
            panic!("expected profile lookup");
        };
        let parsed = Url::parse(&url).unwrap();
        assert_eq!(
            parsed.query_pairs().find(|(k, _)| k == "access_token").map(|(_, v)| v.into_owned()),
            Some(token.to_string())
        );
    }

    #[test]
    fn parse_profile_reads_first_date() {
        let moves = Moves::default();
        assert_eq!(
            moves.parse_profile(&json!({"userId": 1, "profile": {"firstDate": "20160512"}})),
            Some(date(2016, 5, 12))
        );
        assert_eq!(moves.parse_profile(&json!({"profile": {}})), None);
        assert_eq!(
            moves.parse_profile(&json!({"profile": {"firstDate": "May 12"}})),
            None
        );
    }

    #[test]
    fn artifact_metadata() {
        let spec = Moves::default().artifact().clone();
        assert_eq!(spec.basename, "moves-storyline-data.json");
        assert_eq!(spec.tags, &["GPS", "Moves", "steps"]);
        assert_eq!(spec.match_tag, "Moves");
    }
}
