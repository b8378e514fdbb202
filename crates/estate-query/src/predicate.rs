use std::fmt;

use crate::filter::PropertyFilter;
use crate::page::PageSpec;
use crate::sort::SortSpec;

/// Filterable property columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Title,
    Description,
    Address,
    City,
    State,
    Country,
    PropertyType,
    ListingType,
    Status,
    Price,
    Bedrooms,
    Bathrooms,
}

impl Field {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Description => "description",
            Self::Address => "address",
            Self::City => "city",
            Self::State => "state",
            Self::Country => "country",
            Self::PropertyType => "property_type",
            Self::ListingType => "listing_type",
            Self::Status => "status",
            Self::Price => "price",
            Self::Bedrooms => "bedrooms",
            Self::Bathrooms => "bathrooms",
        }
    }
}

/// Columns searched by the free-text `q` parameter.
pub const TEXT_SEARCH_FIELDS: &[Field] = &[
    Field::Title,
    Field::Description,
    Field::Address,
    Field::City,
    Field::State,
    Field::Country,
];

/// Double-quoted string literal for filter expressions.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// One search constraint. A query's predicates are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Exact match on a text column.
    Eq(Field, String),
    Gte(Field, i64),
    Lte(Field, i64),
    /// Case-insensitive substring match on any of the fields.
    AnyContains(Vec<Field>, String),
}

impl fmt::Display for Predicate {
    /// PocketBase-style filter syntax, used for logging.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq(field, value) => write!(f, "{} = {}", field.column(), quoted(value)),
            Self::Gte(field, n) => write!(f, "{} >= {}", field.column(), n),
            Self::Lte(field, n) => write!(f, "{} <= {}", field.column(), n),
            Self::AnyContains(fields, needle) => {
                let needle = quoted(needle);
                let parts: Vec<String> = fields
                    .iter()
                    .map(|field| format!("{} ~ {}", field.column(), needle))
                    .collect();
                write!(f, "({})", parts.join(" || "))
            }
        }
    }
}

/// A translated listing query: filter predicates, ordering, and page.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub predicates: Vec<Predicate>,
    pub sort: SortSpec,
    pub page: PageSpec,
}

impl Query {
    /// The predicates as a single `&&`-joined filter expression.
    pub fn filter_expression(&self) -> String {
        self.predicates
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(" && ")
    }
}

/// Translate filter state into a query. Each set criterion yields exactly one
/// predicate. Unset criteria yield none.
pub fn translate(filter: &PropertyFilter) -> Query {
    let mut predicates = Vec::with_capacity(filter.active_criteria());

    if let Some(q) = &filter.q {
        predicates.push(Predicate::AnyContains(TEXT_SEARCH_FIELDS.to_vec(), q.clone()));
    }
    if let Some(t) = filter.property_type {
        predicates.push(Predicate::Eq(Field::PropertyType, t.as_str().into()));
    }
    if let Some(t) = filter.listing_type {
        predicates.push(Predicate::Eq(Field::ListingType, t.as_str().into()));
    }
    if let Some(s) = filter.status {
        predicates.push(Predicate::Eq(Field::Status, s.as_str().into()));
    }
    if let Some(city) = &filter.city {
        predicates.push(Predicate::Eq(Field::City, city.clone()));
    }
    if let Some(min) = filter.min_price {
        predicates.push(Predicate::Gte(Field::Price, min));
    }
    if let Some(max) = filter.max_price {
        predicates.push(Predicate::Lte(Field::Price, max));
    }
    if let Some(beds) = filter.min_beds {
        predicates.push(Predicate::Gte(Field::Bedrooms, beds as i64));
    }
    if let Some(baths) = filter.min_baths {
        predicates.push(Predicate::Gte(Field::Bathrooms, baths as i64));
    }

    Query {
        predicates,
        sort: filter.sort,
        page: filter.page,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::keys;

    /// Every subset of these assignments must translate to exactly one
    /// predicate per assignment.
    const ASSIGNMENTS: &[(&str, &str)] = &[
        (keys::Q, "garden"),
        (keys::TYPE, "house"),
        (keys::LISTING_TYPE, "rent"),
        (keys::STATUS, "active"),
        (keys::CITY, "Austin"),
        (keys::MIN_PRICE, "100000"),
        (keys::MAX_PRICE, "500000"),
        (keys::BEDS, "2"),
        (keys::BATHS, "1"),
    ];

    #[test]
    fn one_predicate_per_set_criterion() {
        for mask in 0u32..(1 << ASSIGNMENTS.len()) {
            let mut filter = PropertyFilter::default();
            for (i, (key, value)) in ASSIGNMENTS.iter().enumerate() {
                let value = if mask & (1 << i) != 0 { *value } else { "all" };
                filter.set(key, Some(value)).unwrap();
            }
            let query = translate(&filter);
            assert_eq!(query.predicates.len(), mask.count_ones() as usize, "mask {:b}", mask);
        }
    }

    #[test]
    fn sort_and_page_add_no_predicates() {
        let filter = PropertyFilter::from_query_string("sort=price&page=5&per_page=30");
        let query = translate(&filter);
        assert!(query.predicates.is_empty());
        assert_eq!(query.page.page, 5);
        assert_eq!(query.page.per_page, 30);
        assert_eq!(query.filter_expression(), "");
    }

    #[test]
    fn price_range_maps_to_bounds() {
        let filter = PropertyFilter::from_query_string("min_price=100000&max_price=500000");
        let query = translate(&filter);
        assert_eq!(
            query.predicates,
            vec![
                Predicate::Gte(Field::Price, 100_000),
                Predicate::Lte(Field::Price, 500_000),
            ]
        );
        assert_eq!(query.filter_expression(), "price >= 100000 && price <= 500000");
    }

    #[test]
    fn free_text_spans_location_fields() {
        let filter = PropertyFilter::from_query_string("q=say+%22hi%22");
        let query = translate(&filter);
        let expr = query.filter_expression();
        assert!(expr.starts_with("(title ~ \"say \\\"hi\\\"\" || description ~"));
        assert!(expr.contains("country ~"));
    }
}
