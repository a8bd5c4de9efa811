use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::models::Activity;
use crate::{CoreError, CoreResult};

/// Raw listing parameters as they arrive on the query string.
#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub search: Option<String>,
    pub location: Option<String>,
    pub price: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListingLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for ListingLimits {
    fn default() -> Self {
        Self { default_limit: 12, max_limit: 100 }
    }
}

/// Named price ranges. Both ends are inclusive, so 25, 50 and 100 each sit in two buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceBucket {
    #[default]
    All,
    UpTo25,
    From25To50,
    From50To100,
    From100,
}

impl PriceBucket {
    /// Inclusive (min, max) bounds, `None` meaning unbounded.
    pub fn bounds(&self) -> (Option<f64>, Option<f64>) {
        match self {
            PriceBucket::All => (None, None),
            PriceBucket::UpTo25 => (None, Some(25.0)),
            PriceBucket::From25To50 => (Some(25.0), Some(50.0)),
            PriceBucket::From50To100 => (Some(50.0), Some(100.0)),
            PriceBucket::From100 => (Some(100.0), None),
        }
    }

    pub fn contains(&self, price: f64) -> bool {
        let (min, max) = self.bounds();
        min.map_or(true, |m| price >= m) && max.map_or(true, |m| price <= m)
    }
}

impl FromStr for PriceBucket {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "all" => Ok(PriceBucket::All),
            "0-25" => Ok(PriceBucket::UpTo25),
            "25-50" => Ok(PriceBucket::From25To50),
            "50-100" => Ok(PriceBucket::From50To100),
            "100+" => Ok(PriceBucket::From100),
            other => Err(CoreError::validation(format!("unknown price range '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActivitySort {
    #[default]
    Title,
    PriceLow,
    PriceHigh,
    Location,
}

impl ActivitySort {
    /// Unknown values fall back to title order.
    pub fn from_param(raw: &str) -> Self {
        match raw {
            "price_low" => ActivitySort::PriceLow,
            "price_high" => ActivitySort::PriceHigh,
            "location" => ActivitySort::Location,
            _ => ActivitySort::Title,
        }
    }
}

/// A validated listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub location: Option<String>,
    pub price: PriceBucket,
    pub sort: ActivitySort,
}

impl Default for ActivityQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: ListingLimits::default().default_limit,
            search: None,
            location: None,
            price: PriceBucket::All,
            sort: ActivitySort::Title,
        }
    }
}

impl ActivityQuery {
    pub fn from_params(params: ListingParams, limits: ListingLimits) -> CoreResult<Self> {
        let page = parse_positive(params.page.as_deref(), "page")?.unwrap_or(1);
        let limit = parse_positive(params.limit.as_deref(), "limit")?.unwrap_or(limits.default_limit);
        if limit > limits.max_limit {
            return Err(CoreError::validation(format!("limit must be at most {}", limits.max_limit)));
        }

        let price = match non_empty(params.price) {
            Some(p) => p.parse()?,
            None => PriceBucket::All,
        };
        let sort = non_empty(params.sort)
            .map(|s| ActivitySort::from_param(&s))
            .unwrap_or_default();

        Ok(Self {
            page,
            limit,
            search: non_empty(params.search),
            location: non_empty(params.location),
            price,
            sort,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.limit as i64
    }

    /// Listing eligibility and filters, evaluated in memory.
    pub fn matches(&self, activity: &Activity) -> bool {
        if activity.available_slots < 1 {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            if !activity.title.to_lowercase().contains(&term)
                && !activity.description.to_lowercase().contains(&term)
            {
                return false;
            }
        }
        if let Some(loc) = &self.location {
            if !activity.location.to_lowercase().contains(&loc.to_lowercase()) {
                return false;
            }
        }
        self.price.contains(activity.price)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_positive(raw: Option<&str>, name: &str) -> CoreResult<Option<u32>> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => match v.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(Some(n)),
            _ => Err(CoreError::validation(format!("{} must be a positive integer", name))),
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

impl Pagination {
    pub fn new(query: &ActivityQuery, returned: usize, total: i64) -> Self {
        Self {
            page: query.page,
            limit: query.limit,
            total,
            has_more: query.offset() + (returned as i64) < total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityPage {
    pub activities: Vec<Activity>,
    pub pagination: Pagination,
}
