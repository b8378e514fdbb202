use estate_types::models::{ListingType, PropertyStatus, PropertyType};
use tracing::debug;

use crate::page::PageSpec;
use crate::sort::SortSpec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("unknown filter parameter '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for filter parameter '{key}'")]
    InvalidValue { key: String, value: String },
}

/// URL parameter names, in the order they are written to a query string.
pub mod keys {
    pub const Q: &str = "q";
    pub const TYPE: &str = "type";
    pub const LISTING_TYPE: &str = "listing_type";
    pub const STATUS: &str = "status";
    pub const CITY: &str = "city";
    pub const MIN_PRICE: &str = "min_price";
    pub const MAX_PRICE: &str = "max_price";
    pub const BEDS: &str = "beds";
    pub const BATHS: &str = "baths";
    pub const SORT: &str = "sort";
    pub const PAGE: &str = "page";
    pub const PER_PAGE: &str = "per_page";

    pub const ALL: &[&str] = &[
        Q, TYPE, LISTING_TYPE, STATUS, CITY, MIN_PRICE, MAX_PRICE, BEDS, BATHS, SORT, PAGE,
        PER_PAGE,
    ];
}

/// Empty strings and the `all`/`null` sentinels mean "no constraint".
pub fn is_unset(value: &str) -> bool {
    let v = value.trim();
    v.is_empty() || v.eq_ignore_ascii_case("all") || v == "null"
}

/// Search criteria for the property listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyFilter {
    pub q: Option<String>,
    pub property_type: Option<PropertyType>,
    pub listing_type: Option<ListingType>,
    pub status: Option<PropertyStatus>,
    pub city: Option<String>,
    pub min_price: Option<i64>,
    pub max_price: Option<i64>,
    pub min_beds: Option<u32>,
    pub min_baths: Option<u32>,
    pub sort: SortSpec,
    pub page: PageSpec,
}

impl PropertyFilter {
    /// Parse a URL query string (with or without the leading `?`).
    /// Unknown keys and unparsable values are skipped.
    pub fn from_query_string(qs: &str) -> Self {
        let mut filter = Self::default();
        let qs = qs.strip_prefix('?').unwrap_or(qs);

        let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(qs) {
            Ok(pairs) => pairs,
            Err(e) => {
                debug!("Ignoring malformed query string '{}': {}", qs, e);
                return filter;
            }
        };

        for (key, value) in pairs {
            if let Err(e) = filter.set(&key, Some(&value)) {
                debug!("Ignoring filter parameter: {}", e);
            }
        }
        filter
    }

    /// Serialize to a query string containing only set, non-default
    /// parameters, in `keys::ALL` order.
    pub fn to_query_string(&self) -> String {
        let pairs: Vec<(&str, String)> = keys::ALL
            .iter()
            .filter_map(|key| self.get(key).map(|value| (*key, value)))
            .collect();
        // String pairs always serialize.
        serde_urlencoded::to_string(pairs).unwrap_or_default()
    }

    /// Set or clear a single parameter. `None` or an unset sentinel clears it.
    pub fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), FilterError> {
        let value = value.map(str::trim).filter(|v| !is_unset(v));
        let invalid = |v: &str| FilterError::InvalidValue {
            key: key.to_string(),
            value: v.to_string(),
        };

        match key {
            keys::Q => self.q = value.map(str::to_string),
            keys::CITY => self.city = value.map(str::to_string),
            keys::TYPE => self.property_type = parse_opt(value, invalid)?,
            keys::LISTING_TYPE => self.listing_type = parse_opt(value, invalid)?,
            keys::STATUS => self.status = parse_opt(value, invalid)?,
            keys::MIN_PRICE => self.min_price = parse_non_negative(value, invalid)?,
            keys::MAX_PRICE => self.max_price = parse_non_negative(value, invalid)?,
            keys::BEDS => self.min_beds = parse_opt(value, invalid)?,
            keys::BATHS => self.min_baths = parse_opt(value, invalid)?,
            keys::SORT => self.sort = parse_opt(value, invalid)?.unwrap_or_default(),
            keys::PAGE => {
                let page: Option<u32> = parse_opt(value, invalid)?;
                self.page = PageSpec::new(page.unwrap_or(1), self.page.per_page);
            }
            keys::PER_PAGE => {
                let per_page: Option<u32> = parse_opt(value, invalid)?;
                self.page = PageSpec::new(
                    self.page.page,
                    per_page.unwrap_or(PageSpec::default().per_page),
                );
            }
            other => return Err(FilterError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    /// Canonical string value of a parameter, or `None` if it is unset or at
    /// its default.
    pub fn get(&self, key: &str) -> Option<String> {
        let defaults = PageSpec::default();
        match key {
            keys::Q => self.q.clone(),
            keys::CITY => self.city.clone(),
            keys::TYPE => self.property_type.map(|v| v.to_string()),
            keys::LISTING_TYPE => self.listing_type.map(|v| v.to_string()),
            keys::STATUS => self.status.map(|v| v.to_string()),
            keys::MIN_PRICE => self.min_price.map(|v| v.to_string()),
            keys::MAX_PRICE => self.max_price.map(|v| v.to_string()),
            keys::BEDS => self.min_beds.map(|v| v.to_string()),
            keys::BATHS => self.min_baths.map(|v| v.to_string()),
            keys::SORT => (!self.sort.is_default()).then(|| self.sort.to_string()),
            keys::PAGE => (self.page.page != defaults.page).then(|| self.page.page.to_string()),
            keys::PER_PAGE => {
                (self.page.per_page != defaults.per_page).then(|| self.page.per_page.to_string())
            }
            _ => None,
        }
    }

    /// Number of search criteria set, not counting sort and paging.
    pub fn active_criteria(&self) -> usize {
        [
            self.q.is_some(),
            self.property_type.is_some(),
            self.listing_type.is_some(),
            self.status.is_some(),
            self.city.is_some(),
            self.min_price.is_some(),
            self.max_price.is_some(),
            self.min_beds.is_some(),
            self.min_baths.is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }
}

fn parse_opt<T: std::str::FromStr>(
    value: Option<&str>,
    invalid: impl Fn(&str) -> FilterError,
) -> Result<Option<T>, FilterError> {
    value
        .map(|v| v.parse::<T>().map_err(|_| invalid(v)))
        .transpose()
}

fn parse_non_negative(
    value: Option<&str>,
    invalid: impl Fn(&str) -> FilterError,
) -> Result<Option<i64>, FilterError> {
    match parse_opt::<i64>(value, &invalid)? {
        Some(n) if n < 0 => Err(invalid(value.unwrap_or_default())),
        other => Ok(other),
    }
}

/// Filter state bound to a listing page's URL.
///
/// Every change to a search parameter sends the view back to page 1. The
/// owner re-reads `query_string()` after each successful change to update
/// the address bar and issue a new query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    filter: PropertyFilter,
}

impl FilterState {
    pub fn from_query_string(qs: &str) -> Self {
        Self {
            filter: PropertyFilter::from_query_string(qs),
        }
    }

    pub fn filter(&self) -> &PropertyFilter {
        &self.filter
    }

    pub fn query_string(&self) -> String {
        self.filter.to_query_string()
    }

    /// Set one parameter. Returns whether the state changed. Changing anything
    /// other than `page` resets the page to 1.
    pub fn set(&mut self, key: &str, value: Option<&str>) -> Result<bool, FilterError> {
        if key == keys::PAGE {
            let page = match value.map(str::trim).filter(|v| !is_unset(v)) {
                Some(v) => v.parse::<u32>().map_err(|_| FilterError::InvalidValue {
                    key: key.to_string(),
                    value: v.to_string(),
                })?,
                None => 1,
            };
            return Ok(self.set_page(page));
        }

        let mut next = self.filter.clone();
        next.set(key, value)?;
        if next == self.filter {
            return Ok(false);
        }

        next.page = PageSpec::new(1, next.page.per_page);
        self.filter = next;
        Ok(true)
    }

    /// Move to another page without touching the criteria.
    pub fn set_page(&mut self, page: u32) -> bool {
        let next = PageSpec::new(page, self.filter.page.per_page);
        let changed = next != self.filter.page;
        self.filter.page = next;
        changed
    }

    /// Reset every parameter to its default.
    pub fn clear(&mut self) -> bool {
        let changed = self.filter != PropertyFilter::default();
        self.filter = PropertyFilter::default();
        changed
    }
}
