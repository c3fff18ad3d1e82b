// Forecast service - one fetch cycle from page render to published states
use crate::application::page_extractor::{ExtractError, PageExtractor};
use crate::application::render_session::RenderSession;
use crate::application::scheduler::FetchCycle;
use crate::application::state_sink::StateSink;
use crate::domain::dataset::{rate_value, BuildError, DerivedDataset, DisplayFormat};
use crate::domain::forecast::{Channel, Sample};
use crate::domain::series::{parse_series, SeriesError};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Series(#[from] SeriesError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("failed to encode dataset: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Sink(#[from] anyhow::Error),
}

/// Where the forecast page lives: `<base_url>/<locale>/city/<routing key>`.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub base_url: String,
    pub locale: String,
}

impl PageSource {
    pub fn new(base_url: &str, locale: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            locale: locale.trim_matches('/').to_string(),
        }
    }

    pub fn url(&self, routing_key: &str) -> String {
        format!("{}/{}/city/{}", self.base_url, self.locale, routing_key)
    }
}

#[derive(Clone)]
pub struct ForecastService {
    session: Arc<dyn RenderSession>,
    sink: Arc<dyn StateSink>,
    extractor: PageExtractor,
    source: PageSource,
    format: DisplayFormat,
}

impl ForecastService {
    pub fn new(
        session: Arc<dyn RenderSession>,
        sink: Arc<dyn StateSink>,
        source: PageSource,
        format: DisplayFormat,
    ) -> Self {
        Self {
            session,
            sink,
            extractor: PageExtractor::default(),
            source,
            format,
        }
    }

    /// Fetch, parse and publish. Returns the channels whose datasets were
    /// written completely; a failing channel does not stop the other one.
    pub async fn run_cycle(&self, routing_key: &str) -> Result<Vec<Channel>, CycleError> {
        let url = self.source.url(routing_key);
        tracing::debug!("Reading data from {}", url);

        let page = self.extractor.extract(self.session.as_ref(), &url).await?;

        for channel in Channel::ALL {
            self.sink
                .set_state(&channel.key("labeltext"), Value::from(page.caption.clone()))
                .await?;
        }

        let bundle = parse_series(&page.script_lines)?;

        let mut published = Vec::new();
        for channel in Channel::ALL {
            tracing::debug!("creating {} states", channel.as_str());
            match self.publish_channel(channel, channel.samples(&bundle)).await {
                Ok(()) => published.push(channel),
                Err(e) => tracing::error!("publishing {} failed: {}", channel.as_str(), e),
            }
        }

        Ok(published)
    }

    async fn publish_channel(
        &self,
        channel: Channel,
        samples: &[Sample],
    ) -> Result<(), CycleError> {
        let dataset = DerivedDataset::build(samples, channel, &self.format)?;
        let chart_rain = dataset.encoded_chart_rain()?;
        tracing::debug!("Rain ({}): {}", channel.as_str(), chart_rain);

        let writes = [
            ("isRainingNow", Value::from(dataset.is_raining_now)),
            ("timestamp", Value::from(dataset.timestamp.clone())),
            ("actualRain", rate_value(dataset.actual_rain)),
            ("chartRain", Value::from(chart_rain)),
            ("echartRain", Value::from(dataset.encoded_echart_rain()?)),
            ("raindata", Value::from(dataset.encoded_rain_data()?)),
            ("rainStartsAt", Value::from(dataset.rain_starts_at.clone())),
            ("startRain", rate_value(dataset.start_rain_amount)),
        ];

        for (field, value) in writes {
            self.sink.set_state(&channel.key(field), value).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl FetchCycle for ForecastService {
    async fn fetch(&self, routing_key: &str) {
        match self.run_cycle(routing_key).await {
            Ok(published) => tracing::debug!("fetch cycle done, {} channels published", published.len()),
            Err(CycleError::Series(SeriesError::SeriesNotFound)) => {
                tracing::warn!("no weather data found in page");
            }
            Err(CycleError::Extract(e @ ExtractError::NavigationTimeout(_))) => {
                tracing::warn!("{}", e);
            }
            Err(e) => tracing::error!("fetch cycle failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::render_session::testing::{FakePage, FakeSession};
    use crate::application::state_sink::testing::RecordingSink;
    use serde_json::json;

    const SERIES_LINE: &str = concat!(
        r#"  series: {"2h":{"data":["#,
        r#"{"time":"2024-01-01T00:00:00Z","precipitationrate":0},"#,
        r#"{"time":"2024-01-01T00:05:00Z","precipitationrate":2.5,"c":1.1},"#,
        r#"{"time":"2024-01-01T00:10:00Z","precipitationrate":0}],"unit":{"mm":1}},"#,
        r#""24h":{"data":[{"time":"2024-01-01T01:00:00Z","precipitationrate":1,"c":0.5},"#,
        r#"{"time":"2024-01-01T02:00:00Z","precipitationrate":0}],"unit":{"mm":1}}},"#
    );

    fn fake_page(lines: &[&str]) -> FakePage {
        FakePage {
            marker_after_polls: Some(0),
            script_lines: Some(lines.iter().map(|s| s.to_string()).collect()),
            caption: Some("Dry for the next 2 hours".into()),
        }
    }

    fn service(session: FakeSession, sink: Arc<RecordingSink>) -> ForecastService {
        ForecastService::new(
            Arc::new(session),
            sink,
            PageSource::new("https://www.meteox.com/", "en-gb"),
            DisplayFormat::default(),
        )
    }

    #[test]
    fn test_page_url() {
        let source = PageSource::new("https://www.meteox.com/", "/en-gb/");
        assert_eq!(source.url("2759794"), "https://www.meteox.com/en-gb/city/2759794");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_publishes_both_channels() {
        let sink = Arc::new(RecordingSink::default());
        let session = FakeSession::new(fake_page(&["RainGraph.create({", SERIES_LINE, "});"]));
        let counters = session.counters.clone();

        let published = service(session, sink.clone()).run_cycle("2759794").await.unwrap();

        assert_eq!(published, vec![Channel::FiveMinutes, Channel::Hourly]);
        assert_eq!(sink.get("data_5min.labeltext"), Some(json!("Dry for the next 2 hours")));
        assert_eq!(sink.get("data_1h.labeltext"), Some(json!("Dry for the next 2 hours")));

        assert_eq!(sink.get("data_5min.isRainingNow"), Some(json!(false)));
        assert_eq!(sink.get("data_5min.timestamp"), Some(json!("2024-01-01T00:00:00Z")));
        assert_eq!(sink.get("data_5min.actualRain"), Some(json!(0)));
        assert_eq!(sink.get("data_5min.raindata"), Some(json!("[0,2.5,0]")));
        assert_eq!(sink.get("data_5min.rainStartsAt"), Some(json!("2024-01-01T00:05:00+00:00")));
        assert_eq!(sink.get("data_5min.startRain"), Some(json!(1.1)));

        assert_eq!(sink.get("data_1h.isRainingNow"), Some(json!(true)));
        assert_eq!(sink.get("data_1h.startRain"), Some(json!(0.5)));
        assert_eq!(
            sink.get("data_1h.chartRain"),
            Some(json!(r#"[{"label":"Mo 01:00","value":"1"},{"label":"Mo 02:00","value":"0"}]"#))
        );
        assert_eq!(
            sink.get("data_1h.echartRain"),
            Some(json!(r#"[{"ts":1704070800000,"val":1},{"ts":1704074400000,"val":0}]"#))
        );

        assert_eq!(counters.currently_open(), 0);
        assert_eq!(counters.max_open.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_series_writes_only_caption() {
        let sink = Arc::new(RecordingSink::default());
        let session = FakeSession::new(fake_page(&["RainGraph.create({", "  series: {\"2h\": {}"]));

        let result = service(session, sink.clone()).run_cycle("1").await;

        assert!(matches!(result, Err(CycleError::Series(SeriesError::SeriesNotFound))));
        assert_eq!(sink.keys(), vec!["data_5min.labeltext", "data_1h.labeltext"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_timeout_writes_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let mut page = fake_page(&[SERIES_LINE]);
        page.marker_after_polls = None;
        let session = FakeSession::new(page);
        let counters = session.counters.clone();

        let result = service(session, sink.clone()).run_cycle("1").await;

        assert!(matches!(
            result,
            Err(CycleError::Extract(ExtractError::NavigationTimeout(_)))
        ));
        assert!(sink.keys().is_empty());
        assert_eq!(counters.currently_open(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_series_is_parse_error() {
        let sink = Arc::new(RecordingSink::default());
        let session = FakeSession::new(fake_page(&[r#"series: {"2h":{"data":[{"time":}]},"24h":{"x":{}}}},"#]));

        let result = service(session, sink.clone()).run_cycle("1").await;

        assert!(matches!(result, Err(CycleError::Series(SeriesError::ParseError(_)))));
        assert_eq!(sink.keys().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_aborts_only_that_channel() {
        let sink = Arc::new(RecordingSink::failing_on("data_5min.chartRain"));
        let session = FakeSession::new(fake_page(&[SERIES_LINE]));

        let published = service(session, sink.clone()).run_cycle("1").await.unwrap();

        assert_eq!(published, vec![Channel::Hourly]);
        assert_eq!(sink.get("data_5min.actualRain"), Some(json!(0)));
        assert_eq!(sink.get("data_5min.raindata"), None);
        assert_eq!(sink.get("data_1h.raindata"), Some(json!("[1,0]")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_cycles_publish_identical_states() {
        let first = Arc::new(RecordingSink::default());
        let second = Arc::new(RecordingSink::default());

        service(FakeSession::new(fake_page(&[SERIES_LINE])), first.clone())
            .run_cycle("1")
            .await
            .unwrap();
        service(FakeSession::new(fake_page(&[SERIES_LINE])), second.clone())
            .run_cycle("1")
            .await
            .unwrap();

        assert_eq!(*first.writes.lock().unwrap(), *second.writes.lock().unwrap());
    }
}
