// Forecast domain models
use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::Deserialize;

/// One forecast step as published by the rain graph.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSample")]
pub struct Sample {
    /// Time exactly as the page delivered it.
    pub time_text: String,
    pub time: DateTime<FixedOffset>,
    /// Local wall-clock reading when the page gave no offset.
    pub wall_clock: Option<NaiveDateTime>,
    pub precipitation_rate: f64,
    pub cumulative_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSample {
    time: String,
    #[serde(rename = "precipitationrate")]
    precipitation_rate: f64,
    #[serde(default)]
    c: Option<f64>,
}

impl TryFrom<RawSample> for Sample {
    type Error = String;

    fn try_from(raw: RawSample) -> Result<Self, Self::Error> {
        let (time, wall_clock) = parse_sample_time(&raw.time)
            .ok_or_else(|| format!("invalid sample time {:?}", raw.time))?;
        if raw.precipitation_rate < 0.0 {
            return Err(format!("negative precipitation rate {}", raw.precipitation_rate));
        }
        Ok(Self {
            time_text: raw.time,
            time,
            wall_clock,
            precipitation_rate: raw.precipitation_rate,
            cumulative_amount: raw.c,
        })
    }
}

impl Sample {
    #[cfg(test)]
    pub fn new(time: &str, precipitation_rate: f64, cumulative_amount: Option<f64>) -> Option<Self> {
        let (parsed, wall_clock) = parse_sample_time(time)?;
        Some(Self {
            time_text: time.to_string(),
            time: parsed,
            wall_clock,
            precipitation_rate,
            cumulative_amount,
        })
    }

    pub fn is_raining(&self) -> bool {
        self.precipitation_rate > 0.0
    }
}

/// Times without an offset are taken as UTC for the instant and keep their
/// wall-clock reading for display.
fn parse_sample_time(text: &str) -> Option<(DateTime<FixedOffset>, Option<NaiveDateTime>)> {
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some((time, None));
    }
    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    Some((naive.and_utc().fixed_offset(), Some(naive)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesBlock {
    #[serde(default)]
    pub data: Vec<Sample>,
}

/// Both raw series of one page, keyed by their renamed resolution tags.
#[derive(Debug, Clone, Deserialize)]
pub struct RawSeriesBundle {
    pub data2h: SeriesBlock,
    pub data24h: SeriesBlock,
}

/// Output namespace a dataset is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    FiveMinutes,
    Hourly,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::FiveMinutes, Channel::Hourly];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::FiveMinutes => "data_5min",
            Channel::Hourly => "data_1h",
        }
    }

    pub fn key(&self, field: &str) -> String {
        format!("{}.{}", self.as_str(), field)
    }

    /// Picks the raw series feeding this channel.
    pub fn samples<'a>(&self, bundle: &'a RawSeriesBundle) -> &'a [Sample] {
        match self {
            Channel::FiveMinutes => &bundle.data2h.data,
            Channel::Hourly => &bundle.data24h.data,
        }
    }
}
