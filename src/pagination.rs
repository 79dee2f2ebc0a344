use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// Common list-endpoint query parameters. Both camelCase and snake_case
/// spellings of the sort parameters are accepted.
///
/// This struct is `#[serde(flatten)]`-ed into per-resource query types, and
/// flattened query-string values always arrive as strings, so the numeric
/// fields stay `String` here and are parsed in the accessors. Unparseable
/// values fall back to the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    #[serde(alias = "sortBy")]
    pub sort_by: Option<String>,
    #[serde(alias = "sortOrder")]
    pub sort_order: Option<String>,
}

impl ListParams {
    pub fn page(&self) -> i64 {
        self.page
            .as_deref()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(1)
            .max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit
            .as_deref()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_LIMIT)
            .clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// Sort column checked against the resource's allow-list; anything else
    /// falls back to the default column.
    pub fn sort_column<'a>(&'a self, allowed: &[&'a str], default: &'a str) -> &'a str {
        match self.sort_by.as_deref() {
            Some(candidate) if allowed.contains(&candidate) => candidate,
            _ => default,
        }
    }

    pub fn descending(&self) -> bool {
        !matches!(
            self.sort_order.as_deref().map(str::to_lowercase).as_deref(),
            Some("asc")
        )
    }
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            page,
            limit,
            total,
            total_pages,
        }
    }
}
