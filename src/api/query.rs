//! Common query parameter structs for pagination and filtering

use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Helper to deserialize numbers from query string (which are always strings)
fn deserialize_from_str<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Default,
    T::Err: std::fmt::Display,
{
    use serde::de::Error;
    let s: Option<String> = Option::deserialize(deserializer)?;
    match s {
        Some(s) if !s.is_empty() => s.parse().map_err(D::Error::custom),
        _ => Ok(T::default()),
    }
}

/// `GET /api/consultations?q=&page=`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConsultationSearchParams {
    /// Patient name substring
    pub q: Option<String>,
    /// 1-based page; missing or 0 means the first page
    #[serde(default, deserialize_with = "deserialize_from_str")]
    pub page: u32,
}

impl ConsultationSearchParams {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    /// Search text, `None` when empty or whitespace
    pub fn query(&self) -> Option<&str> {
        self.q.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Window length in days
#[derive(Debug, Deserialize, Clone)]
pub struct DaysParams {
    #[serde(default = "default_days", deserialize_with = "deserialize_from_str")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

impl Default for DaysParams {
    fn default() -> Self {
        Self {
            days: default_days(),
        }
    }
}

impl DaysParams {
    /// 0 falls back to the default window
    pub fn days(&self) -> u32 {
        if self.days == 0 {
            default_days()
        } else {
            self.days.min(365)
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitParams {
    #[serde(default = "default_limit", deserialize_with = "deserialize_from_str")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    10
}

impl Default for LimitParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
        }
    }
}

impl LimitParams {
    /// Capped at 100; 0 falls back to the default
    pub fn limit(&self) -> u32 {
        if self.limit == 0 {
            default_limit()
        } else {
            self.limit.min(100)
        }
    }
}

/// Page metadata for paginated list responses
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PageMeta {
    pub total: u64,
    pub per_page: u32,
    pub page: u32,
    pub last_page: u32,
}

/// Paginated response wrapper
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Paginated<T> {
    /// `last_page` is at least 1, even for an empty result
    pub fn new(data: Vec<T>, total: u64, per_page: u32, page: u32) -> Self {
        let per_page_u64 = u64::from(per_page.max(1));
        let last_page = total.div_ceil(per_page_u64).max(1);
        Self {
            data,
            meta: PageMeta {
                total,
                per_page,
                page,
                last_page: u32::try_from(last_page).unwrap_or(u32::MAX),
            },
        }
    }
}
