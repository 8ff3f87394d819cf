use serde_json::Value;

pub const ORDER_BY_KEY: &str = "$key";
pub const ORDER_BY_PRIORITY: &str = "$priority";
pub const ORDER_BY_VALUE: &str = "$value";

/// Accumulated query modifiers. A pure value: every method returns an
/// updated copy and nothing here touches the network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    order_by: Option<String>,
    start_at: Option<Value>,
    end_at: Option<Value>,
    equal_to: Option<Value>,
    limit_to_first: Option<u32>,
    limit_to_last: Option<u32>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by_child(mut self, path: impl Into<String>) -> Self {
        self.order_by = Some(path.into());
        self
    }

    pub fn order_by_key(self) -> Self {
        self.order_by_child(ORDER_BY_KEY)
    }

    pub fn order_by_priority(self) -> Self {
        self.order_by_child(ORDER_BY_PRIORITY)
    }

    pub fn order_by_value(self) -> Self {
        self.order_by_child(ORDER_BY_VALUE)
    }

    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    pub fn limit_to_first(mut self, limit: u32) -> Self {
        self.limit_to_first = Some(limit);
        self
    }

    pub fn limit_to_last(mut self, limit: u32) -> Self {
        self.limit_to_last = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// REST query parameters: bounds and `orderBy` are JSON encoded, limits
    /// are plain integers.
    pub(crate) fn to_rest_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(order_by) = &self.order_by {
            params.push(("orderBy", Value::String(order_by.clone()).to_string()));
        }
        if let Some(value) = &self.start_at {
            params.push(("startAt", value.to_string()));
        }
        if let Some(value) = &self.end_at {
            params.push(("endAt", value.to_string()));
        }
        if let Some(value) = &self.equal_to {
            params.push(("equalTo", value.to_string()));
        }
        if let Some(limit) = self.limit_to_first {
            params.push(("limitToFirst", limit.to_string()));
        }
        if let Some(limit) = self.limit_to_last {
            params.push(("limitToLast", limit.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rest_params_encoding() {
        let params = QueryParams::new()
            .order_by_child("height")
            .start_at(3)
            .end_at("z")
            .limit_to_first(10)
            .to_rest_params();

        assert_eq!(
            params,
            vec![
                ("orderBy", "\"height\"".to_string()),
                ("startAt", "3".to_string()),
                ("endAt", "\"z\"".to_string()),
                ("limitToFirst", "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_sentinel_orderings() {
        assert_eq!(
            QueryParams::new().order_by_key().to_rest_params(),
            vec![("orderBy", "\"$key\"".to_string())]
        );
        assert_eq!(
            QueryParams::new().order_by_value().to_rest_params()[0].1,
            "\"$value\""
        );
        assert_eq!(
            QueryParams::new().order_by_priority().to_rest_params()[0].1,
            "\"$priority\""
        );
    }

    #[test]
    fn test_empty() {
        assert!(QueryParams::new().is_empty());
        assert!(QueryParams::new().to_rest_params().is_empty());
        assert!(!QueryParams::new().limit_to_last(1).is_empty());
    }
}
