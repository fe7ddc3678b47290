// src/models/record.rs

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use chrono::{DateTime, FixedOffset, NaiveDate};
use flate2::read::MultiGzDecoder;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::AppError, models::panel::QuestionOption, utils::stats};

/// One posted quiz result, as stored in the dataset file.
///
/// Every column may be blank in the source file, so everything is optional
/// here; unparsable and non-finite numbers (`nan`, `inf`) are read as missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuizRecord {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, deserialize_with = "finite_number")]
    pub qnumber: Option<f64>,

    #[serde(default, deserialize_with = "finite_number")]
    pub score: Option<f64>,

    #[serde(default, deserialize_with = "finite_number")]
    pub scoremax: Option<f64>,

    #[serde(default, deserialize_with = "finite_number")]
    pub trycount: Option<f64>,

    /// Rows answered with a reference are excluded from every analysis.
    #[serde(
        default,
        deserialize_with = "deserialize_flag",
        serialize_with = "serialize_flag"
    )]
    pub hasreference: bool,

    /// Kept as text; parsed on demand by [`QuizRecord::parsed_datetime`].
    #[serde(default)]
    pub datetime: Option<String>,
}

impl QuizRecord {
    /// True when score, scoremax, qnumber and trycount are all present.
    pub fn is_complete(&self) -> bool {
        self.score.is_some()
            && self.scoremax.is_some()
            && self.qnumber.is_some()
            && self.trycount.is_some()
    }

    pub fn parsed_datetime(&self) -> Option<DateTime<FixedOffset>> {
        self.datetime.as_deref().and_then(parse_datetime)
    }
}

fn finite_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = csv::invalid_option(deserializer)?;
    Ok(value.filter(|v| v.is_finite()))
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(false),
        Some(v) if v.eq_ignore_ascii_case("true") || v == "1" || v == "1.0" => Ok(true),
        Some(v) if v.eq_ignore_ascii_case("false") || v == "0" || v == "0.0" => Ok(false),
        Some(v) => Err(serde::de::Error::custom(format!(
            "invalid hasreference value '{}'",
            v
        ))),
    }
}

fn serialize_flag<S>(value: &bool, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(if *value { "True" } else { "False" })
}

/// Parses the timezone-aware timestamps found in the dataset,
/// e.g. `2022-05-01 21:03:00+09:00` or `2022-05-01T12:03:00.123Z`.
pub fn parse_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z"))
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%z"))
        .ok()
}

/// The whole dataset, held in memory once loaded.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<QuizRecord>,
}

impl Dataset {
    pub fn new(records: Vec<QuizRecord>) -> Self {
        Self { records }
    }

    /// Reads a CSV file, transparently gunzipping it when it starts with the
    /// gzip magic bytes.
    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::NotFound(format!("Dataset file '{}' not found", path.display()))
            }
            _ => AppError::from(e),
        })?;
        let mut reader = BufReader::new(file);
        let is_gzip = reader.fill_buf()?.starts_with(&[0x1f, 0x8b]);

        if is_gzip {
            Self::from_reader(MultiGzDecoder::new(reader))
        } else {
            Self::from_reader(reader)
        }
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AppError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let records = csv_reader
            .deserialize()
            .collect::<Result<Vec<QuizRecord>, csv::Error>>()?;
        Ok(Self { records })
    }

    pub fn records(&self) -> &[QuizRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows eligible for analysis: not answered with a reference and
    /// carrying every required field.
    pub fn analysis_records(&self) -> impl Iterator<Item = &QuizRecord> {
        self.records
            .iter()
            .filter(|r| !r.hasreference && r.is_complete())
    }

    /// The most recent row timestamp.
    pub fn latest_datetime(&self) -> Option<DateTime<FixedOffset>> {
        self.records
            .iter()
            .filter_map(QuizRecord::parsed_datetime)
            .max()
    }

    /// `YYYY/MM/DD HH:MM:SS` of the most recent row, in `offset`.
    pub fn data_as_of(&self, offset: FixedOffset) -> Option<String> {
        self.latest_datetime().map(|dt| {
            dt.with_timezone(&offset)
                .format("%Y/%m/%d %H:%M:%S")
                .to_string()
        })
    }

    /// One entry per question number, highest first, labelled with the day
    /// (in `offset`) on which most of its rows were posted.
    pub fn question_options(&self, offset: FixedOffset) -> Vec<QuestionOption> {
        let mut dates: BTreeMap<i64, Vec<NaiveDate>> = BTreeMap::new();
        for record in &self.records {
            let (Some(qnumber), Some(datetime)) = (record.qnumber, record.parsed_datetime()) else {
                continue;
            };
            dates
                .entry(qnumber as i64)
                .or_default()
                .push(datetime.with_timezone(&offset).date_naive());
        }

        dates
            .into_iter()
            .rev()
            .filter_map(|(qnumber, days)| {
                stats::mode(days).map(|date| QuestionOption {
                    qnumber,
                    date: date.format("%Y/%m/%d").to_string(),
                })
            })
            .collect()
    }

    /// The analysis rows serialized back to CSV, for download.
    pub fn export_csv(&self) -> Result<Vec<u8>, AppError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in self.analysis_records() {
            writer.serialize(record)?;
        }
        // An empty export still carries the header row.
        if self.analysis_records().next().is_none() {
            writer.write_record([
                "username",
                "qnumber",
                "score",
                "scoremax",
                "trycount",
                "hasreference",
                "datetime",
            ])?;
        }
        writer
            .into_inner()
            .map_err(|e| AppError::InternalServerError(e.to_string()))
    }
}
