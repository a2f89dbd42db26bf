//! Page cursor and list filters.
//!
//! # Design
//! A `Page` is a plain `Copy` value handed to each list call rather than
//! state stored on the service, so concurrent callers sharing a client never
//! see each other's cursor.

use url::Url;

use crate::http::QueryParams;
use crate::types::Links;

pub const DEFAULT_PAGE_NUMBER: i64 = 0;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Size sent when a non-positive size is requested.
pub const FALLBACK_PAGE_SIZE: i64 = 100;

pub const PAGE_NUMBER_PARAM: &str = "page[number]";
pub const PAGE_SIZE_PARAM: &str = "page[size]";

/// Page cursor. Out-of-range values are clamped when rendered, not when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: i64,
    pub size: i64,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: DEFAULT_PAGE_NUMBER,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_number(self, number: i64) -> Self {
        Self { number, ..self }
    }

    pub fn with_size(self, size: i64) -> Self {
        Self { size, ..self }
    }

    /// The page after this one, same size.
    pub fn next(self) -> Self {
        self.with_number(self.number.max(0).saturating_add(1))
    }

    /// Render as `page[number]` and `page[size]`.
    ///
    /// Negative numbers become 0. A size of 0 or less becomes 100, not the
    /// default of 10.
    pub fn params(&self) -> QueryParams {
        let number = self.number.max(0);
        let size = if self.size <= 0 { FALLBACK_PAGE_SIZE } else { self.size };

        let mut params = QueryParams::new();
        params.add(PAGE_NUMBER_PARAM, number.to_string());
        params.add(PAGE_SIZE_PARAM, size.to_string());
        params
    }

    /// Parse the page cursor out of a link such as
    /// `/v1/organisation/accounts?page%5Bnumber%5D=1&page%5Bsize%5D=1`.
    ///
    /// Returns `None` unless both values are integers; servers may use
    /// symbolic numbers like `first` or `last`.
    pub fn from_link(link: &str) -> Option<Self> {
        let base = Url::parse("http://link.invalid/").ok()?;
        let url = base.join(link).ok()?;
        let mut number = None;
        let mut size = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                PAGE_NUMBER_PARAM => number = value.parse().ok(),
                PAGE_SIZE_PARAM => size = value.parse().ok(),
                _ => {}
            }
        }
        Some(Self {
            number: number?,
            size: size?,
        })
    }
}

impl Links {
    pub fn next_page(&self) -> Option<Page> {
        self.next.as_deref().and_then(Page::from_link)
    }

    pub fn prev_page(&self) -> Option<Page> {
        self.prev.as_deref().and_then(Page::from_link)
    }
}

/// Page cursor plus `filter[{attribute}]` constraints for a list call.
///
/// Filters are AND-combined by the server; multiple values for one
/// attribute are sent comma separated and match any of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub page: Page,
    filters: Vec<(String, Vec<String>)>,
}

impl ListOptions {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            filters: Vec::new(),
        }
    }

    pub fn filter<I, S>(mut self, attribute: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        if !values.is_empty() {
            self.filters.push((attribute.to_string(), values));
        }
        self
    }

    pub fn params(&self) -> QueryParams {
        let mut params = self.page.params();
        for (attribute, values) in &self.filters {
            params.add(format!("filter[{attribute}]"), values.join(","));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_render_zero_and_ten() {
        let params = Page::default().params();
        assert_eq!(params.get(PAGE_NUMBER_PARAM), Some("0"));
        assert_eq!(params.get(PAGE_SIZE_PARAM), Some("10"));
    }

    #[test]
    fn number_without_size_keeps_default_size() {
        let params = Page::new().with_number(3).params();
        assert_eq!(params.get(PAGE_NUMBER_PARAM), Some("3"));
        assert_eq!(params.get(PAGE_SIZE_PARAM), Some("10"));
    }

    #[test]
    fn negative_number_clamps_to_zero() {
        let params = Page::new().with_number(-5).params();
        assert_eq!(params.get(PAGE_NUMBER_PARAM), Some("0"));
    }

    #[test]
    fn non_positive_size_falls_back_to_one_hundred() {
        for size in [0, -1, i64::MIN] {
            let params = Page::new().with_size(size).params();
            assert_eq!(params.get(PAGE_SIZE_PARAM), Some("100"), "size {size}");
        }
    }

    #[test]
    fn builders_return_new_values() {
        let base = Page::new();
        let other = base.with_number(7).with_size(25);
        assert_eq!(base, Page::default());
        assert_eq!(other, Page { number: 7, size: 25 });
        assert_eq!(other.next(), Page { number: 8, size: 25 });
    }

    #[test]
    fn parses_encoded_link() {
        let page = Page::from_link("/v1/organisation/accounts?page%5Bnumber%5D=1&page%5Bsize%5D=1").unwrap();
        assert_eq!(page, Page { number: 1, size: 1 });
    }

    #[test]
    fn symbolic_link_numbers_are_not_pages() {
        assert_eq!(Page::from_link("/v1/organisation/accounts?page%5Bnumber%5D=last&page%5Bsize%5D=1"), None);
        assert_eq!(Page::from_link("/v1/organisation/accounts"), None);
    }

    #[test]
    fn links_expose_next_and_prev() {
        let links = Links {
            next: Some("/v1/organisation/accounts?page[number]=2&page[size]=5".to_string()),
            prev: None,
            ..Links::default()
        };
        assert_eq!(links.next_page(), Some(Page { number: 2, size: 5 }));
        assert_eq!(links.prev_page(), None);
    }

    #[test]
    fn filters_render_as_csv() {
        let options = ListOptions::new(Page::new().with_size(5))
            .filter("country", ["GB", "FR", "DE"])
            .filter("bank_id", Vec::<String>::new());
        let params = options.params();
        assert_eq!(params.get("filter[country]"), Some("GB,FR,DE"));
        assert_eq!(params.get("filter[bank_id]"), None);
        assert_eq!(params.get(PAGE_SIZE_PARAM), Some("5"));
    }
}
