//! # Request Parameter Parser
//!
//! Splits a REST query string into reserved keys and filters.
//!
//! Reserved on every method: `select`, `table`. Reserved on GET only:
//! `order=<column>[.asc|.desc]` and `limit=<n>`. Every other key is a
//! filter `<column>=[<op>.]<value>`, in query-string order.

use axum::http::Method;

use crate::query::{DataError, DataResult};

/// Parsed query-string parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParams {
    /// Output columns (default `*`)
    pub select: String,

    /// `(column, raw value)` filters, query-string order
    pub filters: Vec<(String, String)>,

    /// `(column, ascending)`
    pub order: Option<(String, bool)>,

    pub limit: Option<u64>,
}

impl Default for RequestParams {
    fn default() -> Self {
        Self {
            select: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }
}

impl RequestParams {
    /// Parse `pairs` for a request with `method`
    pub fn parse(method: &Method, pairs: Vec<(String, String)>) -> DataResult<Self> {
        let reads = method == Method::GET;
        let mut result = RequestParams::default();

        for (key, value) in pairs {
            match key.as_str() {
                "select" => {
                    if !value.trim().is_empty() {
                        result.select = value;
                    }
                }
                "table" => {}
                "order" if reads => result.order = Some(parse_order(&value)?),
                "limit" if reads => result.limit = Some(parse_limit(&value)?),
                _ => result.filters.push((key, value)),
            }
        }

        Ok(result)
    }
}

/// Parse `column[.asc|.desc]`
pub fn parse_order(value: &str) -> DataResult<(String, bool)> {
    let (column, ascending) = match value.rsplit_once('.') {
        Some((column, direction)) => {
            let ascending = match direction.to_lowercase().as_str() {
                "asc" => true,
                "desc" => false,
                _ => {
                    return Err(DataError::InvalidQueryParam(format!(
                        "Invalid order direction: {}",
                        direction
                    )))
                }
            };
            (column, ascending)
        }
        None => (value, true),
    };

    let column = column.trim();
    if column.is_empty() {
        return Err(DataError::InvalidQueryParam("order requires a column".to_string()));
    }
    Ok((column.to_string(), ascending))
}

fn parse_limit(value: &str) -> DataResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| DataError::InvalidQueryParam(format!("Invalid limit: {}", value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_get_params() {
        let params = RequestParams::parse(
            &Method::GET,
            pairs(&[
                ("status", "eq.ativo"),
                ("select", "id,name"),
                ("order", "name.desc"),
                ("limit", "5"),
                ("price", "gte.10"),
            ]),
        )
        .unwrap();

        assert_eq!(params.select, "id,name");
        assert_eq!(
            params.filters,
            pairs(&[("status", "eq.ativo"), ("price", "gte.10")])
        );
        assert_eq!(params.order, Some(("name".to_string(), false)));
        assert_eq!(params.limit, Some(5));
    }

    #[test]
    fn test_defaults_and_reserved_table() {
        let params = RequestParams::parse(&Method::GET, pairs(&[("table", "x")])).unwrap();
        assert_eq!(params, RequestParams::default());
    }

    #[test]
    fn test_order_without_direction() {
        let params = RequestParams::parse(&Method::GET, pairs(&[("order", "name")])).unwrap();
        assert_eq!(params.order, Some(("name".to_string(), true)));
    }

    #[test]
    fn test_invalid_order_and_limit() {
        for bad in [("order", "name.sideways"), ("order", ".asc"), ("limit", "-1"), ("limit", "ten")] {
            let err = RequestParams::parse(&Method::GET, pairs(&[bad])).unwrap_err();
            assert!(matches!(err, DataError::InvalidQueryParam(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_write_methods_treat_limit_as_filter() {
        let params = RequestParams::parse(
            &Method::PATCH,
            pairs(&[("id", "eq.1"), ("limit", "3"), ("select", "*")]),
        )
        .unwrap();
        assert_eq!(params.filters, pairs(&[("id", "eq.1"), ("limit", "3")]));
        assert_eq!(params.limit, None);
    }
}
