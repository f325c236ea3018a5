use reqwest::StatusCode;
use tracing::info;

use crate::config::Units;
use crate::error::Result;
use crate::http_client::{Exchange, HttpClient};

/// Owns the session's client and the most recent exchange, and turns raw
/// timings and sizes into the operator's units.
pub struct Dispatcher {
    client: Box<dyn HttpClient>,
    last: Option<Exchange>,
    units: Units,
    exchanges: u64,
}

impl Dispatcher {
    pub fn new(client: Box<dyn HttpClient>, units: Units) -> Self {
        Self {
            client,
            last: None,
            units,
            exchanges: 0,
        }
    }

    pub async fn get(&mut self, url: &str) -> Result<&Exchange> {
        let exchange = self.client.get(url).await?;
        self.exchanges += 1;
        Ok(self.last.insert(exchange))
    }

    pub async fn post(&mut self, url: &str, form: &[(&str, &str)]) -> Result<&Exchange> {
        let exchange = self.client.post(url, form).await?;
        self.exchanges += 1;
        Ok(self.last.insert(exchange))
    }

    pub fn set_ajax(&mut self, on: bool) {
        self.client.set_ajax(on);
    }

    pub fn ajax(&self) -> bool {
        self.client.ajax()
    }

    /// Start a new session with the same settings. The last exchange is not
    /// carried over; the exchange count is.
    pub fn restart(self) -> Result<Self> {
        info!(exchanges = self.exchanges, "restarting HTTP session");
        Ok(Self {
            client: self.client.restart()?,
            last: None,
            units: self.units,
            exchanges: self.exchanges,
        })
    }

    /// End the session, returning how many exchanges it completed.
    pub fn close(self) -> u64 {
        info!(exchanges = self.exchanges, "HTTP session closed");
        self.exchanges
    }

    pub fn units(&self) -> Units {
        self.units
    }

    /// Total time of the last exchange in the configured time unit.
    pub fn response_time(&self) -> Option<f64> {
        self.last
            .as_ref()
            .map(|e| self.units.time.normalize(e.timing.total))
    }

    /// Size of the last response body in the configured size unit.
    pub fn response_size(&self) -> Option<f64> {
        self.last
            .as_ref()
            .map(|e| self.units.size.normalize(e.size() as f64))
    }
}

/// Reason phrase for a status code, `Unknown` for unregistered codes.
pub fn status_message(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::{SizeUnit, TimeUnit};
    use crate::fakes::FakeClient;

    #[tokio::test]
    async fn normalises_the_last_exchange() {
        let client = FakeClient::new();
        client.route(
            "/users/edit",
            FakeClient::json(r#"{"ok":true}"#).with_total(Duration::from_millis(1500)),
        );

        let units = Units {
            time: TimeUnit::Millis,
            size: SizeUnit::KB,
        };
        let mut dispatcher = Dispatcher::new(Box::new(client.clone()), units);
        assert!(dispatcher.response_time().is_none());
        assert!(dispatcher.response_size().is_none());

        let exchange = dispatcher.get("http://app.test/users/edit").await.unwrap();
        assert_eq!(exchange.status, 200);

        assert_eq!(dispatcher.response_time(), Some(1500.0));
        assert_eq!(dispatcher.response_size(), Some(11.0 / 1024.0));
    }

    #[tokio::test]
    async fn restart_drops_the_last_exchange() {
        let client = FakeClient::new();
        let mut dispatcher = Dispatcher::new(Box::new(client.clone()), Units::default());
        dispatcher.set_ajax(true);
        dispatcher.get("http://app.test/").await.unwrap();

        let dispatcher = dispatcher.restart().unwrap();
        assert!(dispatcher.response_time().is_none());
        assert!(!dispatcher.ajax());
        assert_eq!(client.restarts(), 1);
    }

    #[tokio::test]
    async fn close_reports_every_exchange_of_the_session() {
        let client = FakeClient::new();
        client.route("/gone", FakeClient::failing());
        let mut dispatcher = Dispatcher::new(Box::new(client.clone()), Units::default());

        dispatcher.get("http://app.test/").await.unwrap();
        dispatcher.post("http://app.test/login", &[("user", "admin")]).await.unwrap();
        assert!(dispatcher.get("http://app.test/gone").await.is_err());
        let mut dispatcher = dispatcher.restart().unwrap();
        dispatcher.get("http://app.test/users/edit").await.unwrap();

        assert_eq!(dispatcher.close(), 3);
    }

    #[test]
    fn status_messages() {
        assert_eq!(status_message(200), "OK");
        assert_eq!(status_message(404), "Not Found");
        assert_eq!(status_message(299), "Unknown");
    }
}
