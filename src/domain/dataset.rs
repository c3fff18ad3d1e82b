// Derived rain datasets published per channel
use crate::domain::forecast::{Channel, Sample};
use chrono::{DateTime, Datelike, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const NO_RAIN_EXPECTED: &str = "-1";

const WEEKDAYS_EN: [&str; 7] = ["Su", "Mo", "Tu", "We", "Th", "Fr", "Sa"];
const WEEKDAYS_DE: [&str; 7] = ["So", "Mo", "Di", "Mi", "Do", "Fr", "Sa"];

#[derive(Debug, Error, PartialEq)]
pub enum BuildError {
    #[error("series for {0} contains no samples")]
    EmptySeries(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    De,
}

/// How times are rendered into labels and onset strings.
#[derive(Debug, Clone, Copy)]
pub struct DisplayFormat {
    pub language: Language,
    pub timezone: Tz,
}

impl Default for DisplayFormat {
    fn default() -> Self {
        Self {
            language: Language::En,
            timezone: Tz::UTC,
        }
    }
}

impl DisplayFormat {
    pub fn new(language: Language, timezone: Tz) -> Self {
        Self { language, timezone }
    }

    /// Offset-less page times are shown as read; others are converted.
    fn local(&self, sample: &Sample) -> DateTime<Tz> {
        sample
            .wall_clock
            .and_then(|naive| self.timezone.from_local_datetime(&naive).earliest())
            .unwrap_or_else(|| sample.time.with_timezone(&self.timezone))
    }

    /// `data_1h` gets the weekday prefix, every other channel only the time.
    pub fn label(&self, sample: &Sample, channel: Channel) -> String {
        let local = self.local(sample);
        match channel {
            Channel::Hourly => {
                let weekdays = match self.language {
                    Language::En => &WEEKDAYS_EN,
                    Language::De => &WEEKDAYS_DE,
                };
                let day = weekdays[local.weekday().num_days_from_sunday() as usize];
                format!("{} {}", day, local.format("%H:%M"))
            }
            Channel::FiveMinutes => local.format("%H:%M").to_string(),
        }
    }

    pub fn iso(&self, sample: &Sample) -> String {
        self.local(sample)
            .format("%Y-%m-%dT%H:%M:%S%:z")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EchartPoint {
    pub ts: i64,
    #[serde(serialize_with = "serialize_rate")]
    pub val: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedDataset {
    pub is_raining_now: bool,
    pub timestamp: String,
    pub actual_rain: f64,
    pub chart_rain: Vec<ChartPoint>,
    pub echart_rain: Vec<EchartPoint>,
    pub rain_data: Vec<f64>,
    pub rain_starts_at: String,
    pub start_rain_amount: f64,
}

impl DerivedDataset {
    /// Build the channel dataset from a chronological series in one pass.
    pub fn build(
        samples: &[Sample],
        channel: Channel,
        format: &DisplayFormat,
    ) -> Result<Self, BuildError> {
        let first = samples
            .first()
            .ok_or(BuildError::EmptySeries(channel.as_str()))?;

        let mut dataset = Self {
            is_raining_now: first.is_raining(),
            timestamp: first.time_text.clone(),
            actual_rain: first.precipitation_rate,
            chart_rain: Vec::with_capacity(samples.len()),
            echart_rain: Vec::with_capacity(samples.len()),
            rain_data: Vec::with_capacity(samples.len()),
            rain_starts_at: NO_RAIN_EXPECTED.to_string(),
            start_rain_amount: 0.0,
        };

        let mut onset_found = false;
        for sample in samples {
            let rate = sample.precipitation_rate;
            dataset.rain_data.push(rate);

            if !onset_found && sample.is_raining() {
                onset_found = true;
                dataset.rain_starts_at = format.iso(sample);
                dataset.start_rain_amount = sample.cumulative_amount.unwrap_or(0.0);
            }

            dataset.chart_rain.push(ChartPoint {
                label: format.label(sample, channel),
                value: rate.to_string(),
            });
            dataset.echart_rain.push(EchartPoint {
                ts: sample.time.timestamp_millis(),
                val: rate,
            });
        }

        Ok(dataset)
    }

    pub fn encoded_chart_rain(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.chart_rain)
    }

    pub fn encoded_echart_rain(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.echart_rain)
    }

    pub fn encoded_rain_data(&self) -> serde_json::Result<String> {
        let values: Vec<Value> = self.rain_data.iter().copied().map(rate_value).collect();
        serde_json::to_string(&values)
    }
}

/// Integral rates are written as integers (`0`, not `0.0`).
pub fn rate_value(rate: f64) -> Value {
    if rate.fract() == 0.0 && rate.abs() < i64::MAX as f64 {
        Value::from(rate as i64)
    } else {
        Value::from(rate)
    }
}

fn serialize_rate<S: serde::Serializer>(rate: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    rate_value(*rate).serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: &str, rate: f64, amount: Option<f64>) -> Sample {
        Sample::new(time, rate, amount).unwrap()
    }

    fn example_series() -> Vec<Sample> {
        vec![
            sample("2024-01-01T00:00:00Z", 0.0, None),
            sample("2024-01-01T00:05:00Z", 2.5, Some(1.1)),
            sample("2024-01-01T00:10:00Z", 0.0, None),
        ]
    }

    #[test]
    fn test_build_example_series() {
        let dataset =
            DerivedDataset::build(&example_series(), Channel::FiveMinutes, &DisplayFormat::default())
                .unwrap();

        assert!(!dataset.is_raining_now);
        assert_eq!(dataset.timestamp, "2024-01-01T00:00:00Z");
        assert_eq!(dataset.actual_rain, 0.0);
        assert_eq!(dataset.rain_starts_at, "2024-01-01T00:05:00+00:00");
        assert_eq!(dataset.start_rain_amount, 1.1);
        assert_eq!(dataset.rain_data, vec![0.0, 2.5, 0.0]);
        assert_eq!(dataset.encoded_rain_data().unwrap(), "[0,2.5,0]");
        assert_eq!(
            dataset.encoded_chart_rain().unwrap(),
            r#"[{"label":"00:00","value":"0"},{"label":"00:05","value":"2.5"},{"label":"00:10","value":"0"}]"#
        );
        assert_eq!(
            dataset.encoded_echart_rain().unwrap(),
            r#"[{"ts":1704067200000,"val":0},{"ts":1704067500000,"val":2.5},{"ts":1704067800000,"val":0}]"#
        );
    }

    #[test]
    fn test_dry_series_has_no_onset() {
        let series = vec![
            sample("2024-01-01T00:00:00Z", 0.0, Some(3.0)),
            sample("2024-01-01T01:00:00Z", 0.0, None),
        ];
        let dataset =
            DerivedDataset::build(&series, Channel::Hourly, &DisplayFormat::default()).unwrap();

        assert_eq!(dataset.rain_starts_at, NO_RAIN_EXPECTED);
        assert_eq!(dataset.start_rain_amount, 0.0);
    }

    #[test]
    fn test_onset_is_first_rainy_sample_only() {
        let series = vec![
            sample("2024-01-01T00:00:00Z", 0.0, None),
            sample("2024-01-01T00:05:00Z", 0.3, None),
            sample("2024-01-01T00:10:00Z", 4.0, Some(2.0)),
        ];
        let dataset =
            DerivedDataset::build(&series, Channel::FiveMinutes, &DisplayFormat::default())
                .unwrap();

        assert_eq!(dataset.rain_starts_at, "2024-01-01T00:05:00+00:00");
        // Missing amount on the onset sample stays 0 even though a later one has it.
        assert_eq!(dataset.start_rain_amount, 0.0);
    }

    #[test]
    fn test_raining_now_depends_on_first_sample_only() {
        let series = vec![
            sample("2024-01-01T00:00:00Z", 0.7, Some(0.1)),
            sample("2024-01-01T00:05:00Z", 0.0, None),
        ];
        let dataset =
            DerivedDataset::build(&series, Channel::FiveMinutes, &DisplayFormat::default())
                .unwrap();

        assert!(dataset.is_raining_now);
        assert_eq!(dataset.actual_rain, 0.7);
        assert_eq!(dataset.rain_starts_at, "2024-01-01T00:00:00+00:00");
        assert_eq!(dataset.start_rain_amount, 0.1);
    }

    #[test]
    fn test_sequence_lengths_match_input() {
        let series: Vec<Sample> = (0..12)
            .map(|i| sample(&format!("2024-01-01T{:02}:00:00Z", i), (i % 3) as f64, None))
            .collect();
        let dataset =
            DerivedDataset::build(&series, Channel::Hourly, &DisplayFormat::default()).unwrap();

        assert_eq!(dataset.chart_rain.len(), series.len());
        assert_eq!(dataset.echart_rain.len(), series.len());
        assert_eq!(dataset.rain_data.len(), series.len());
    }

    #[test]
    fn test_label_format_per_channel() {
        let format = DisplayFormat::default();
        let step = sample("2024-01-01T00:05:00Z", 0.0, None);

        assert_eq!(format.label(&step, Channel::Hourly), "Mo 00:05");
        assert_eq!(format.label(&step, Channel::FiveMinutes), "00:05");
    }

    #[test]
    fn test_german_labels_in_local_time() {
        let format = DisplayFormat::new(Language::De, chrono_tz::Europe::Berlin);
        let step = sample("2024-01-06T23:30:00Z", 0.0, None);

        assert_eq!(format.label(&step, Channel::Hourly), "So 00:30");
        assert_eq!(format.iso(&step), "2024-01-07T00:30:00+01:00");
    }

    #[test]
    fn test_times_without_offset_keep_their_wall_clock() {
        let format = DisplayFormat::new(Language::De, chrono_tz::Europe::Berlin);
        let series = vec![
            sample("2024-01-01T12:00:00", 0.0, None),
            sample("2024-01-01T12:05:00", 1.5, Some(0.2)),
        ];
        let dataset = DerivedDataset::build(&series, Channel::Hourly, &format).unwrap();

        assert_eq!(dataset.chart_rain[0].label, "Mo 12:00");
        assert_eq!(dataset.rain_starts_at, "2024-01-01T12:05:00+01:00");
        assert_eq!(dataset.echart_rain[0].ts, 1_704_110_400_000);
        assert_eq!(format.label(&series[1], Channel::FiveMinutes), "12:05");
    }

    #[test]
    fn test_build_is_deterministic() {
        let format = DisplayFormat::default();
        let first = DerivedDataset::build(&example_series(), Channel::Hourly, &format).unwrap();
        let second = DerivedDataset::build(&example_series(), Channel::Hourly, &format).unwrap();

        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_empty_series_is_rejected() {
        let result = DerivedDataset::build(&[], Channel::FiveMinutes, &DisplayFormat::default());
        assert_eq!(result, Err(BuildError::EmptySeries("data_5min")));
    }
}
