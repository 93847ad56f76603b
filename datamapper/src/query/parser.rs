//! Parsing of `alias__column__op` keys and `-column` order keys.

pub const SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Like,
    ILike,
    NotLike,
    NotILike,
    Contains,
    StartsWith,
    EndsWith,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub const ALL: [Operator; 14] = [
        Operator::Eq,
        Operator::NotEq,
        Operator::Like,
        Operator::ILike,
        Operator::NotLike,
        Operator::NotILike,
        Operator::Contains,
        Operator::StartsWith,
        Operator::EndsWith,
        Operator::In,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::NotEq => "not_eq",
            Operator::Like => "like",
            Operator::ILike => "ilike",
            Operator::NotLike => "not_like",
            Operator::NotILike => "not_ilike",
            Operator::Contains => "contains",
            Operator::StartsWith => "startswith",
            Operator::EndsWith => "endswith",
            Operator::In => "in",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.suffix() == suffix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Split `"alias__column"` into `("column", Some("alias"))`.
pub fn parse_column(value: &str) -> (&str, Option<&str>) {
    match value.rsplit_once(SEPARATOR) {
        Some((alias, column)) => (column, Some(alias)),
        None => (value, None),
    }
}

/// `"-name"` sorts descending, anything else ascending.
pub fn parse_order(value: &str) -> (&str, Direction) {
    match value.strip_prefix('-') {
        Some(rest) => (rest, Direction::Desc),
        None => (value, Direction::Asc),
    }
}

/// Split an operator suffix off a filter key. Keys without a known suffix
/// compare for equality.
pub fn parse_where(value: &str) -> (&str, Operator) {
    if let Some((rest, suffix)) = value.rsplit_once(SEPARATOR) {
        if let Some(op) = Operator::from_suffix(suffix) {
            return (rest, op);
        }
    }
    (value, Operator::Eq)
}
