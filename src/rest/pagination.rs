// rest/pagination.rs — page/limit query params and the list envelope.

use axum::http::Uri;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::AppConfig;

/// Raw query params accepted by paginated endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn from_query(query: &PageQuery, config: &AppConfig) -> Self {
        // page=0 is kept as-is and renders an empty page; see limit_i64.
        let page = query.page.unwrap_or(1);
        let limit = query
            .limit
            .unwrap_or(config.page_size)
            .clamp(1, config.max_page_size);
        Self { page, limit }
    }

    /// LIMIT to hand to the database. Page 0 is out of range by definition
    /// and yields no rows while the envelope still reports the full count.
    pub fn limit_i64(&self) -> i64 {
        if self.page == 0 {
            0
        } else {
            self.limit as i64
        }
    }

    /// OFFSET, saturating so absurd page numbers cannot overflow — they
    /// land past the end and produce an empty page.
    pub fn offset_i64(&self) -> i64 {
        self.page
            .saturating_sub(1)
            .saturating_mul(self.limit)
            .min(i64::MAX as u64) as i64
    }
}

/// Standard list envelope: `{count, next, previous, results}` with absolute
/// page URLs. `page=1` is rendered without an explicit page param.
pub fn envelope(
    site_url: &str,
    uri: &Uri,
    count: i64,
    pagination: &Pagination,
    results: Vec<Value>,
) -> Value {
    let has_next = pagination.page.saturating_mul(pagination.limit) < count as u64;
    let next = has_next.then(|| page_url(site_url, uri, pagination.page.saturating_add(1)));
    let previous = (pagination.page > 1).then(|| page_url(site_url, uri, pagination.page - 1));
    json!({
        "count": count,
        "next": next,
        "previous": previous,
        "results": results,
    })
}

/// Rebuild the request URL with the page param swapped for `page`.
/// Other query params pass through verbatim (still percent-encoded).
fn page_url(site_url: &str, uri: &Uri, page: u64) -> String {
    let mut params: Vec<String> = uri
        .query()
        .unwrap_or("")
        .split('&')
        .filter(|p| !p.is_empty() && !p.starts_with("page="))
        .map(str::to_string)
        .collect();
    if page > 1 {
        params.push(format!("page={page}"));
    }
    if params.is_empty() {
        format!("{site_url}{}", uri.path())
    } else {
        format!("{site_url}{}?{}", uri.path(), params.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AppConfig {
        let dir = tempfile::tempdir().unwrap();
        AppConfig::new(None, Some(dir.path().to_path_buf()), None, None)
    }

    #[test]
    fn defaults_and_clamping() {
        let cfg = test_config();
        let p = Pagination::from_query(&PageQuery::default(), &cfg);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, cfg.page_size);

        let p = Pagination::from_query(
            &PageQuery {
                page: None,
                limit: Some(10_000),
            },
            &cfg,
        );
        assert_eq!(p.limit, cfg.max_page_size);
    }

    #[test]
    fn offset_math() {
        let p = Pagination { page: 3, limit: 6 };
        assert_eq!(p.offset_i64(), 12);
        assert_eq!(p.limit_i64(), 6);
    }

    #[test]
    fn page_zero_yields_empty_page() {
        let p = Pagination { page: 0, limit: 6 };
        assert_eq!(p.limit_i64(), 0);
        assert_eq!(p.offset_i64(), 0);
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let p = Pagination {
            page: u64::MAX,
            limit: 100,
        };
        assert_eq!(p.offset_i64(), i64::MAX);
        assert_eq!(p.limit_i64(), 100);
        // The envelope math must not overflow either.
        let uri: Uri = "/api/users/".parse().unwrap();
        let env = envelope("http://x", &uri, 1, &p, vec![]);
        assert_eq!(env["next"], Value::Null);
        assert!(env["previous"].is_string());
    }

    #[test]
    fn envelope_links() {
        let uri: Uri = "/api/recipes/?tags=dinner&page=2&limit=2".parse().unwrap();
        let p = Pagination { page: 2, limit: 2 };
        let env = envelope("http://localhost:8000", &uri, 5, &p, vec![]);
        assert_eq!(env["count"], 5);
        assert_eq!(
            env["next"],
            "http://localhost:8000/api/recipes/?tags=dinner&limit=2&page=3"
        );
        // page 1 link drops the page param
        assert_eq!(
            env["previous"],
            "http://localhost:8000/api/recipes/?tags=dinner&limit=2"
        );
    }

    #[test]
    fn envelope_on_single_page() {
        let uri: Uri = "/api/tags/".parse().unwrap();
        let p = Pagination { page: 1, limit: 6 };
        let env = envelope("http://localhost:8000", &uri, 3, &p, vec![]);
        assert_eq!(env["next"], Value::Null);
        assert_eq!(env["previous"], Value::Null);
    }

    #[test]
    fn envelope_exact_boundary_has_no_next() {
        let uri: Uri = "/api/recipes/".parse().unwrap();
        let p = Pagination { page: 2, limit: 3 };
        let env = envelope("http://x", &uri, 6, &p, vec![]);
        assert_eq!(env["next"], Value::Null);
        assert_eq!(env["previous"], "http://x/api/recipes/");
    }
}
