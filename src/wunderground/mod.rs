pub mod models;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{
    config::Config,
    reading_cache::Snapshot,
    report::{ReportError, Reporter},
};

use self::models::Observation;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Uploads observations to a Weather Underground personal weather station
/// using the `updateraw` protocol.
///
/// Protocol reference:
/// <https://support.weather.com/s/article/PWS-Upload-Protocol>
#[derive(Debug)]
pub struct StationClient {
    http: Client,
    update_url: String,
    station_id: String,
    password: String,
    software_type: String,
    calculate_dewpoint: bool,
    observation: Observation,
}

impl StationClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            update_url: config.wu_update_url.clone(),
            station_id: config.station_id.clone(),
            password: config.station_password.clone(),
            software_type: config.software_type.clone(),
            calculate_dewpoint: config.calculate_dewpoint,
            observation: Observation::default(),
        })
    }

    /// The observation the next push will send.
    #[allow(dead_code)]
    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    fn query(&self) -> Vec<(&str, &str)> {
        let mut query = vec![
            ("ID", self.station_id.as_str()),
            ("PASSWORD", self.password.as_str()),
            ("dateutc", "now"),
            ("action", "updateraw"),
            ("softwaretype", self.software_type.as_str()),
        ];
        query.extend(self.observation.fields());
        query
    }
}

#[async_trait]
impl Reporter for StationClient {
    fn update(&mut self, snapshot: Snapshot) {
        let mut observation = Observation::from_snapshot(snapshot);
        if self.calculate_dewpoint {
            observation.fill_dewpoint();
        }
        self.observation = observation;
    }

    async fn push(&mut self) -> Result<(), ReportError> {
        if self.observation.is_empty() {
            return Err(ReportError::NoReadings);
        }

        debug!(station_id = %self.station_id, url = %self.update_url, "Sending station update");

        let body = self
            .http
            .get(&self.update_url)
            .query(&self.query())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        // The endpoint answers 200 with a plain-text verdict.
        let body = body.trim();
        if body.starts_with("success") {
            Ok(())
        } else {
            Err(ReportError::Rejected(body.to_owned()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use wiremock::{
        matchers::{method, path, query_param, query_param_is_missing},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    const UPDATE_PATH: &str = "/weatherstation/updateweatherstation.php";

    fn config(update_url: String, calculate_dewpoint: bool) -> Config {
        Config {
            mqtt_broker: "localhost:1883".into(),
            station_id: "KTEST1".into(),
            station_password: "secret".into(),
            software_type: "pws_aggregator".into(),
            calculate_dewpoint,
            wu_update_url: update_url,
            sensor_map_path: PathBuf::from("unused"),
            sensor_lifetime: Duration::from_secs(300),
            cache_check_interval: Duration::from_secs(60),
            report_period: Duration::from_secs(120),
        }
    }

    fn snapshot(pairs: &[(&str, &str)]) -> Snapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn push_sends_credentials_and_readings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPDATE_PATH))
            .and(query_param("ID", "KTEST1"))
            .and(query_param("PASSWORD", "secret"))
            .and(query_param("dateutc", "now"))
            .and(query_param("action", "updateraw"))
            .and(query_param("softwaretype", "pws_aggregator"))
            .and(query_param("tempf", "70.5"))
            .and(query_param("humidity", "40"))
            .and(query_param_is_missing("dewptf"))
            .respond_with(ResponseTemplate::new(200).set_body_string("success\n"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = StationClient::new(&config(format!("{}{UPDATE_PATH}", server.uri()), false)).unwrap();
        client.update(snapshot(&[("tempf", "70.5"), ("humidity", "40")]));
        client.push().await.unwrap();
    }

    #[tokio::test]
    async fn push_includes_calculated_dewpoint_when_enabled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPDATE_PATH))
            .and(query_param("dewptf", "68.0"))
            .respond_with(ResponseTemplate::new(200).set_body_string("success"))
            .expect(1)
            .mount(&server)
            .await;

        let mut client = StationClient::new(&config(format!("{}{UPDATE_PATH}", server.uri()), true)).unwrap();
        client.update(snapshot(&[("tempf", "68"), ("humidity", "100")]));
        assert_eq!(client.observation().get("dewptf"), Some("68.0"));
        client.push().await.unwrap();
    }

    #[tokio::test]
    async fn rejection_body_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPDATE_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("INVALIDPASSWORDID|Password or key and/or id are incorrect\n"),
            )
            .mount(&server)
            .await;

        let mut client = StationClient::new(&config(format!("{}{UPDATE_PATH}", server.uri()), false)).unwrap();
        client.update(snapshot(&[("tempf", "70")]));
        let err = client.push().await.unwrap_err();
        assert!(matches!(err, ReportError::Rejected(ref body) if body.starts_with("INVALIDPASSWORDID")));
    }

    #[tokio::test]
    async fn server_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(UPDATE_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut client = StationClient::new(&config(format!("{}{UPDATE_PATH}", server.uri()), false)).unwrap();
        client.update(snapshot(&[("tempf", "70")]));
        assert!(matches!(client.push().await.unwrap_err(), ReportError::Http(_)));
    }

    #[tokio::test]
    async fn empty_observation_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("success"))
            .expect(0)
            .mount(&server)
            .await;

        let mut client = StationClient::new(&config(format!("{}{UPDATE_PATH}", server.uri()), false)).unwrap();
        client.update(Snapshot::new());
        assert!(matches!(client.push().await.unwrap_err(), ReportError::NoReadings));
    }

    #[test]
    fn update_replaces_previous_observation() {
        let mut client = StationClient::new(&config("http://localhost".into(), false)).unwrap();
        client.update(snapshot(&[("tempf", "70"), ("humidity", "40")]));
        client.update(snapshot(&[("tempf", "71")]));

        assert_eq!(client.observation().get("tempf"), Some("71"));
        assert_eq!(client.observation().get("humidity"), None);
    }
}
