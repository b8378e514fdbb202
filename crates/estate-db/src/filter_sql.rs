use estate_query::{Direction, Predicate, SortField, SortSpec};
use rusqlite::types::Value as SqlValue;

/// Append SQL conditions for `predicates` to `conditions`, binding values as
/// numbered parameters after those already in `params`. Column names come
/// from a closed enum and are never taken from input.
pub fn push_predicates(
    predicates: &[Predicate],
    conditions: &mut Vec<String>,
    params: &mut Vec<SqlValue>,
) {
    for predicate in predicates {
        let condition = match predicate {
            Predicate::Eq(field, value) => {
                let n = bind(params, SqlValue::Text(value.clone()));
                format!("p.{} = ?{}", field.column(), n)
            }
            Predicate::Gte(field, v) => {
                let n = bind(params, SqlValue::Integer(*v));
                format!("p.{} >= ?{}", field.column(), n)
            }
            Predicate::Lte(field, v) => {
                let n = bind(params, SqlValue::Integer(*v));
                format!("p.{} <= ?{}", field.column(), n)
            }
            Predicate::AnyContains(fields, needle) => {
                let n = bind(params, SqlValue::Text(format!("%{}%", escape_like(needle))));
                let parts: Vec<String> = fields
                    .iter()
                    .map(|f| format!("p.{} LIKE ?{} ESCAPE '\\'", f.column(), n))
                    .collect();
                format!("({})", parts.join(" OR "))
            }
        };
        conditions.push(condition);
    }
}

/// Push a parameter and return its 1-based index.
pub fn bind(params: &mut Vec<SqlValue>, value: SqlValue) -> usize {
    params.push(value);
    params.len()
}

/// `WHERE a AND b ...`, or an empty string with no conditions.
pub fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// ORDER BY for a listing. Newer rows break ties so pages are stable.
pub fn order_by(sort: &SortSpec) -> String {
    let column = match sort.field {
        SortField::Created => "p.created",
        SortField::Updated => "p.updated",
        SortField::Price => "p.price",
        SortField::Bedrooms => "p.bedrooms",
        SortField::Bathrooms => "p.bathrooms",
        SortField::SquareFeet => "p.square_feet",
        SortField::Title => "p.title COLLATE NOCASE",
    };
    let direction = match sort.direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    };
    format!("ORDER BY {} {}, p.rowid DESC", column, direction)
}

/// Escape LIKE wildcards for use with `ESCAPE '\'`.
pub(crate) fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
