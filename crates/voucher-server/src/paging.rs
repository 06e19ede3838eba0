use serde::Deserialize;

use voucher_shared::constants::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

use crate::error::ServerError;

/// `?page=&limit=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    /// `page >= 1`, `1 <= limit <= 100`.
    pub fn resolve(&self) -> Result<(u32, u32), ServerError> {
        let page = self.page.unwrap_or(1);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page < 1 {
            return Err(ServerError::Validation("page must be at least 1".into()));
        }
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ServerError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        Ok((page, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(PageQuery::default().resolve().unwrap(), (1, 20));
        assert_eq!(PageQuery::new(3, 100).resolve().unwrap(), (3, 100));
        assert!(PageQuery::new(0, 10).resolve().is_err());
        assert!(PageQuery::new(1, 0).resolve().is_err());
        assert!(PageQuery::new(1, 101).resolve().is_err());
    }
}
