use serde::{Deserialize, Serialize};
use validator::ValidationErrors;

use crate::utils::validation::{check, permitted_value};

/// Sort tokens accepted by the post listings.
pub const POST_SORT_SAFELIST: &[&str] = &["id", "title", "published_at", "-id", "-title", "-published_at"];

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const DEFAULT_SORT: &str = "id";

const MAX_PAGE: i64 = 10_000_000;
const MAX_PAGE_SIZE: i64 = 100;

/// Closed set of columns a listing may be ordered by.
///
/// Query text is only ever built from these fixed fragments, never from the
/// caller's sort string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    Id,
    Title,
    PublishedAt,
}

impl SortColumn {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Self::Id),
            "title" => Some(Self::Title),
            "published_at" => Some(Self::PublishedAt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Title => "title",
            Self::PublishedAt => "published_at",
        }
    }

    /// Column qualified with the `p` alias used by the joined post queries.
    pub fn qualified(self) -> &'static str {
        match self {
            Self::Id => "p.id",
            Self::Title => "p.title",
            Self::PublishedAt => "p.published_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Validated listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    pub page: i64,
    pub page_size: i64,
    /// The safelisted token as supplied, e.g. `-published_at`.
    pub sort: String,
    column: SortColumn,
    direction: SortDirection,
}

impl Filters {
    /// Validates page, page size and sort against `safelist`, reporting every
    /// violation at once.
    pub fn validate(page: i64, page_size: i64, sort: &str, safelist: &[&str]) -> Result<Self, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match Self::collect(&mut errors, page, page_size, sort, safelist) {
            Some(filters) if errors.errors().is_empty() => Ok(filters),
            _ => Err(errors),
        }
    }

    fn collect(
        errors: &mut ValidationErrors,
        page: i64,
        page_size: i64,
        sort: &str,
        safelist: &[&str],
    ) -> Option<Self> {
        check(errors, page > 0, "page", "must be greater than zero");
        check(errors, page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        check(errors, page_size > 0, "page_size", "must be greater than zero");
        check(errors, page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

        let parsed = parse_sort(sort, safelist);
        check(errors, parsed.is_some(), "sort", "invalid sort value");

        parsed.map(|(column, direction)| Self {
            page,
            page_size,
            sort: sort.to_string(),
            column,
            direction,
        })
    }

    pub fn sort_column(&self) -> SortColumn {
        self.column
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.direction
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }
}

fn parse_sort(sort: &str, safelist: &[&str]) -> Option<(SortColumn, SortDirection)> {
    if !permitted_value(sort, safelist) {
        return None;
    }
    let (name, direction) = match sort.strip_prefix('-') {
        Some(name) => (name, SortDirection::Desc),
        None => (sort, SortDirection::Asc),
    };
    SortColumn::from_name(name).map(|column| (column, direction))
}

/// Raw listing query string, as decoded by the HTTP layer.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub title: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

impl ListParams {
    /// Applies defaults and validates, returning the title query and filters.
    pub fn into_filters(self, safelist: &[&str]) -> Result<(String, Filters), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let page = read_int(&mut errors, self.page.as_deref(), "page", DEFAULT_PAGE);
        let page_size = read_int(&mut errors, self.page_size.as_deref(), "page_size", DEFAULT_PAGE_SIZE);
        let sort = self.sort.filter(|s| !s.is_empty());
        let sort = sort.as_deref().unwrap_or(DEFAULT_SORT);

        match Filters::collect(&mut errors, page, page_size, sort, safelist) {
            Some(filters) if errors.errors().is_empty() => Ok((self.title.unwrap_or_default(), filters)),
            _ => Err(errors),
        }
    }
}

fn read_int(errors: &mut ValidationErrors, raw: Option<&str>, field: &'static str, default: i64) -> i64 {
    match raw.filter(|s| !s.is_empty()) {
        None => default,
        Some(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                check(errors, false, field, "must be an integer value");
                default
            }
        },
    }
}

/// Pagination details returned alongside a page of results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub last_page: i64,
    pub total_records: i64,
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records == 0 {
        return Metadata::default();
    }

    Metadata {
        current_page: page,
        page_size,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}
