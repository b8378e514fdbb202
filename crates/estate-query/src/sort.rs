use std::fmt;
use std::str::FromStr;

use crate::filter::FilterError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Created,
    Updated,
    Price,
    Bedrooms,
    Bathrooms,
    SquareFeet,
    Title,
}

impl SortField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Price => "price",
            Self::Bedrooms => "bedrooms",
            Self::Bathrooms => "bathrooms",
            Self::SquareFeet => "square_feet",
            Self::Title => "title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Asc,
    Desc,
}

/// Ordering for a listing query. Written as `field` or `-field`, where the
/// leading `-` means descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortSpec {
    pub field: SortField,
    pub direction: Direction,
}

impl SortSpec {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }

    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

impl Default for SortSpec {
    /// Newest listings first.
    fn default() -> Self {
        Self::desc(SortField::Created)
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.direction == Direction::Desc {
            f.write_str("-")?;
        }
        f.write_str(self.field.as_str())
    }
}

impl FromStr for SortSpec {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (direction, name) = match s.strip_prefix('-') {
            Some(rest) => (Direction::Desc, rest),
            None => (Direction::Asc, s.strip_prefix('+').unwrap_or(s)),
        };

        let field = match name {
            "created" => SortField::Created,
            "updated" => SortField::Updated,
            "price" => SortField::Price,
            "bedrooms" => SortField::Bedrooms,
            "bathrooms" => SortField::Bathrooms,
            "square_feet" => SortField::SquareFeet,
            "title" => SortField::Title,
            _ => {
                return Err(FilterError::InvalidValue {
                    key: "sort".into(),
                    value: s.into(),
                });
            }
        };

        Ok(Self { field, direction })
    }
}
