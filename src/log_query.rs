use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::db::{LogEntry, User};
use crate::error::ApiError;
use crate::exercise::parse_date;

/// Entries before this date are never returned unless `from` asks for them.
pub const FLOOR_DATE: NaiveDate = match NaiveDate::from_ymd_opt(1990, 1, 1) {
    Some(date) => date,
    None => panic!("invalid floor date"),
};
pub const CEILING_DATE: NaiveDate = match NaiveDate::from_ymd_opt(2030, 12, 31) {
    Some(date) => date,
    None => panic!("invalid ceiling date"),
};
pub const DEFAULT_LIMIT: u32 = 9999;

/// Query string of `GET /api/users/:_id/logs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogParams {
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<String>,
}

/// Resolved bounds for a log lookup: `from <= date <= to`, newest first,
/// at most `limit` entries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub limit: u32,
}

impl Default for LogQuery {
    fn default() -> Self {
        LogQuery {
            from: FLOOR_DATE,
            to: CEILING_DATE,
            limit: DEFAULT_LIMIT,
        }
    }
}

fn present(param: &Option<String>) -> Option<&str> {
    param.as_deref().map(str::trim).filter(|p| !p.is_empty())
}

impl LogQuery {
    pub fn from_params(params: &LogParams) -> Result<Self, ApiError> {
        let mut query = LogQuery::default();

        if let Some(raw) = present(&params.from) {
            query.from = parse_date(raw).ok_or(ApiError::InvalidDate)?;
        }
        if let Some(raw) = present(&params.to) {
            query.to = parse_date(raw).ok_or(ApiError::InvalidDate)?;
        }
        if let Some(raw) = present(&params.limit) {
            query.limit = raw.parse::<u32>().map_err(|_| ApiError::InvalidLimit)?;
        }

        Ok(query)
    }
}

/// A user together with the entries selected by a [`LogQuery`].
#[derive(Debug, Clone, Serialize)]
pub struct UserLog {
    #[serde(flatten)]
    pub user: User,
    pub count: usize,
    pub log: Vec<LogEntry>,
}

impl UserLog {
    pub fn new(user: User, log: Vec<LogEntry>) -> Self {
        UserLog {
            user,
            count: log.len(),
            log,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(from: Option<&str>, to: Option<&str>, limit: Option<&str>) -> LogParams {
        LogParams {
            from: from.map(String::from),
            to: to.map(String::from),
            limit: limit.map(String::from),
        }
    }

    #[test]
    fn test_defaults() {
        let query = LogQuery::from_params(&LogParams::default()).unwrap();
        assert_eq!(query.from, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
        assert_eq!(query.to, NaiveDate::from_ymd_opt(2030, 12, 31).unwrap());
        assert_eq!(query.limit, 9999);
        assert_eq!(query.from, FLOOR_DATE);
        assert_eq!(query.to, CEILING_DATE);

        let blank = LogQuery::from_params(&params(Some(""), Some(" "), Some(""))).unwrap();
        assert_eq!(blank, query);
    }

    #[test]
    fn test_explicit_bounds() {
        let query =
            LogQuery::from_params(&params(Some("2023-01-15"), Some("2023-02-15"), Some("2")))
                .unwrap();
        assert_eq!(query.from, NaiveDate::from_ymd_opt(2023, 1, 15).unwrap());
        assert_eq!(query.to, NaiveDate::from_ymd_opt(2023, 2, 15).unwrap());
        assert_eq!(query.limit, 2);
    }

    #[test]
    fn test_bad_params() {
        assert!(matches!(
            LogQuery::from_params(&params(Some("yesterday"), None, None)),
            Err(ApiError::InvalidDate)
        ));
        assert!(matches!(
            LogQuery::from_params(&params(None, Some("2023-02-31"), None)),
            Err(ApiError::InvalidDate)
        ));
        assert!(matches!(
            LogQuery::from_params(&params(None, None, Some("-1"))),
            Err(ApiError::InvalidLimit)
        ));
        assert!(matches!(
            LogQuery::from_params(&params(None, None, Some("ten"))),
            Err(ApiError::InvalidLimit)
        ));
    }

    #[test]
    fn test_count_matches_returned_entries() {
        let user = User {
            id: "abc".to_string(),
            username: "alice".to_string(),
        };
        let entry = LogEntry {
            description: "run".to_string(),
            duration: 30,
            date: NaiveDate::from_ymd_opt(2023, 1, 15).unwrap(),
        };

        let log = UserLog::new(user, vec![entry.clone(), entry]);
        let json = serde_json::to_value(&log).unwrap();

        assert_eq!(json["count"], 2);
        assert_eq!(json["username"], "alice");
        assert_eq!(json["_id"], "abc");
        assert_eq!(json["log"][0]["date"], "Sun Jan 15 2023");
        assert_eq!(json["log"][0]["duration"], 30);
    }
}
