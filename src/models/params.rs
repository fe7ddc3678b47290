// src/models/params.rs

use serde::{Deserialize, Deserializer};
use validator::Validate;

/// Choices offered by the grid-size selectors.
pub const GRID_CHOICES: [usize; 6] = [1, 2, 3, 4, 5, 6];

/// Choices offered by the attempt selector; `None` means every attempt.
pub const TRIAL_CHOICES: [Option<i64>; 4] = [None, Some(1), Some(2), Some(3)];

/// Display options for one render, taken from the query string.
///
/// Parameters only shape the working view; the dataset itself is never
/// touched.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct DisplayParams {
    /// Keep questions numbered at or below this value.
    #[serde(default, deserialize_with = "optional_number")]
    #[validate(range(min = 1))]
    pub maxq: Option<i64>,

    /// Keep only this attempt index. `all` or blank keeps every attempt.
    #[serde(default, deserialize_with = "optional_number")]
    #[validate(range(min = 1))]
    pub trial: Option<i64>,

    /// User to highlight in every panel; blank for none.
    #[serde(default)]
    #[validate(length(max = 100))]
    pub username: String,

    #[serde(default, deserialize_with = "checkbox")]
    pub show_percent: bool,

    #[serde(default, deserialize_with = "checkbox")]
    pub include_maxscore: bool,

    #[serde(default = "default_nrow")]
    #[validate(range(min = 1, max = 6))]
    pub nrow: usize,

    #[serde(default = "default_ncol")]
    #[validate(range(min = 1, max = 6))]
    pub ncol: usize,
}

fn default_nrow() -> usize {
    2
}

fn default_ncol() -> usize {
    3
}

impl Default for DisplayParams {
    fn default() -> Self {
        Self {
            maxq: None,
            trial: None,
            username: String::new(),
            show_percent: false,
            include_maxscore: false,
            nrow: default_nrow(),
            ncol: default_ncol(),
        }
    }
}

impl DisplayParams {
    /// Number of grid cells, i.e. the most panels one render can hold.
    pub fn capacity(&self) -> usize {
        self.nrow * self.ncol
    }

    /// The highlighted user, if any. Matched against dataset usernames
    /// exactly, so surrounding whitespace is significant.
    pub fn highlighted_user(&self) -> Option<&str> {
        (!self.username.is_empty()).then_some(self.username.as_str())
    }
}

fn optional_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.eq_ignore_ascii_case("all") => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{}'", v))),
    }
}

/// HTML checkboxes submit `on` when ticked and nothing otherwise.
fn checkbox<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(matches!(
        raw.as_deref().map(str::trim),
        Some("on") | Some("true") | Some("1") | Some("yes")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(query: &str) -> DisplayParams {
        let uri: axum::http::Uri = format!("/?{}", query).parse().unwrap();
        axum::extract::Query::<DisplayParams>::try_from_uri(&uri)
            .unwrap()
            .0
    }

    #[test]
    fn empty_query_uses_defaults() {
        let params = parse("");
        assert_eq!(params, DisplayParams::default());
        assert_eq!(params.capacity(), 6);
        assert_eq!(params.highlighted_user(), None);
    }

    #[test]
    fn form_values_are_understood() {
        let params = parse("maxq=12&trial=all&username=+alice+&show_percent=on&nrow=1&ncol=4");
        assert_eq!(params.maxq, Some(12));
        assert_eq!(params.trial, None);
        assert_eq!(params.highlighted_user(), Some(" alice "));
        assert!(params.show_percent);
        assert!(!params.include_maxscore);
        assert_eq!((params.nrow, params.ncol), (1, 4));
    }

    #[test]
    fn blank_maxq_and_numeric_trial() {
        let params = parse("maxq=&trial=2&include_maxscore=true");
        assert_eq!(params.maxq, None);
        assert_eq!(params.trial, Some(2));
        assert!(params.include_maxscore);
    }

    #[test]
    fn grid_bounds_are_validated() {
        assert!(parse("nrow=6&ncol=6").validate().is_ok());
        assert!(parse("nrow=0").validate().is_err());
        assert!(parse("ncol=7").validate().is_err());
        assert!(parse("trial=0").validate().is_err());
    }
}
