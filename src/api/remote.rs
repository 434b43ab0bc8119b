//! Purpose: Implement the car accessor contract against a JSON document HTTP service.
//! Exports: `RemoteStore`, `RemoteOptions`, `DEFAULT_TIMEOUT`.
//! Role: Remote backend; maps CRUD calls onto `/cars` requests (json-server style).
//! Invariants: Construction probes `HEAD /` and fails with `Unavailable` unless it gets 200.
//! Invariants: Each mutation succeeds only on its expected status (201 create, 200 update,
//! any 2xx delete); everything else is an error carrying the status.
//! Invariants: Transport failures and status failures are logged with distinct messages.
#![allow(clippy::result_large_err)]

use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{Span, debug, error, info_span, warn};
use url::Url;

use super::local::not_found;
use crate::core::accessor::{CarDataAccessor, StoreResult};
use crate::core::car::Car;
use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const COLLECTION: &str = "cars";

#[derive(Clone, Debug)]
pub struct RemoteOptions {
    pub timeout: Duration,
    pub span: Option<Span>,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            span: None,
        }
    }
}

impl RemoteOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }
}

#[derive(Clone)]
pub struct RemoteStore {
    base_url: Url,
    agent: ureq::Agent,
    span: Span,
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl RemoteStore {
    /// Connects with default options.
    pub fn connect(base_url: impl Into<String>) -> StoreResult<Self> {
        Self::connect_with(base_url, RemoteOptions::default())
    }

    pub fn connect_with(base_url: impl Into<String>, options: RemoteOptions) -> StoreResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let span = options
            .span
            .unwrap_or_else(|| info_span!("remote_store", url = %base_url));
        let agent = ureq::AgentBuilder::new().timeout(options.timeout).build();
        let store = Self {
            base_url,
            agent,
            span,
        };
        store.check_server()?;
        Ok(store)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Liveness probe; `Unavailable` unless the server answers `HEAD /` with 200.
    pub fn check_server(&self) -> StoreResult<()> {
        let _enter = self.span.enter();
        let unavailable = || {
            Error::new(ErrorKind::Unavailable)
                .with_message(format!("car server at {} is not ready", self.base_url))
                .with_hint("Start the document server (e.g. `carpanel serve`) or check --url.")
        };
        match self.agent.request_url("HEAD", &self.base_url).call() {
            Ok(resp) if resp.status() == 200 => {
                debug!("car server is ready");
                Ok(())
            }
            Ok(resp) | Err(ureq::Error::Status(_, resp)) => {
                let status = resp.status();
                error!(status, "server error during liveness probe");
                Err(unavailable().with_status(status))
            }
            Err(ureq::Error::Transport(err)) => {
                error!(error = %err, "communication error during liveness probe");
                Err(unavailable().with_source(err))
            }
        }
    }

    fn collection_url(&self) -> StoreResult<Url> {
        build_url(&self.base_url, &[COLLECTION])
    }

    fn car_url(&self, id: u32) -> StoreResult<Url> {
        build_url(&self.base_url, &[COLLECTION, &id.to_string()])
    }

    /// Sends one request; any HTTP status comes back as `Ok`, transport failures as `Err`.
    fn send(&self, method: &str, url: &Url, body: Option<&Car>) -> StoreResult<ureq::Response> {
        let request = self
            .agent
            .request_url(method, url)
            .set("Accept", "application/json");
        let result = match body {
            None => request.call(),
            Some(car) => {
                let payload = serde_json::to_string(car).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode car json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };
        match result {
            Ok(resp) | Err(ureq::Error::Status(_, resp)) => {
                debug!(method, url = %url, status = resp.status(), "request completed");
                Ok(resp)
            }
            Err(ureq::Error::Transport(err)) => {
                error!(method, url = %url, error = %err, "communication error");
                Err(Error::new(ErrorKind::Remote)
                    .with_message(format!("{method} {url} failed"))
                    .with_source(err))
            }
        }
    }

    fn unexpected_status(&self, method: &str, url: &Url, status: u16) -> Error {
        warn!(method, url = %url, status, "unexpected status code");
        Error::new(ErrorKind::Remote)
            .with_message(format!("{method} {url} returned status {status}"))
            .with_status(status)
    }
}

impl CarDataAccessor for RemoteStore {
    fn backend(&self) -> &'static str {
        "json"
    }

    fn list_all(&self) -> StoreResult<Vec<Car>> {
        let _enter = self.span.enter();
        let mut url = self.collection_url()?;
        url.query_pairs_mut()
            .append_pair("_sort", "id")
            .append_pair("_order", "asc");
        let resp = self.send("GET", &url, None)?;
        match resp.status() {
            200 => {
                let mut cars: Vec<Car> = read_json(resp)?;
                cars.sort_by_key(|car| car.id);
                Ok(cars)
            }
            404 => {
                warn!(url = %url, "car collection not found");
                Err(Error::new(ErrorKind::Remote)
                    .with_message("car collection not found")
                    .with_status(404))
            }
            status => Err(self.unexpected_status("GET", &url, status)),
        }
    }

    fn create(&self, car: &Car) -> StoreResult<()> {
        let _enter = self.span.enter();
        let url = self.collection_url()?;
        let resp = self.send("POST", &url, Some(car))?;
        match resp.status() {
            201 => {
                debug!(id = car.id, "created car");
                Ok(())
            }
            status => Err(self.unexpected_status("POST", &url, status)),
        }
    }

    fn delete(&self, id: u32) -> StoreResult<()> {
        let _enter = self.span.enter();
        let url = self.car_url(id)?;
        let resp = self.send("DELETE", &url, None)?;
        match resp.status() {
            200..=299 => {
                debug!(id, "deleted car");
                Ok(())
            }
            404 => {
                warn!(id, "car to delete not found");
                Err(not_found(id).with_status(404))
            }
            status => Err(self.unexpected_status("DELETE", &url, status)),
        }
    }

    fn find_by_id(&self, id: u32) -> StoreResult<Option<Car>> {
        let _enter = self.span.enter();
        let mut url = self.collection_url()?;
        url.query_pairs_mut().append_pair("id", &id.to_string());
        let resp = self.send("GET", &url, None)?;
        match resp.status() {
            200 => {
                let cars: Vec<Car> = read_json(resp)?;
                Ok(cars.into_iter().find(|car| car.id == id))
            }
            status => Err(self.unexpected_status("GET", &url, status)),
        }
    }

    fn update(&self, car: &Car) -> StoreResult<()> {
        let _enter = self.span.enter();
        let url = self.car_url(car.id)?;
        let resp = self.send("PUT", &url, Some(car))?;
        match resp.status() {
            200 => {
                debug!(id = car.id, "updated car");
                Ok(())
            }
            404 => {
                warn!(id = car.id, "car to update not found");
                Err(not_found(car.id).with_status(404))
            }
            status => Err(self.unexpected_status("PUT", &url, status)),
        }
    }
}

fn normalize_base_url(raw: String) -> StoreResult<Url> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("invalid server url {raw:?}"))
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("server url must use http or https scheme")
        );
    }
    if url.path() != "/" && !url.path().is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("server url must not include a path"));
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

fn build_url(base_url: &Url, segments: &[&str]) -> StoreResult<Url> {
    let mut url = base_url.clone();
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            Error::new(ErrorKind::Usage).with_message("server url cannot be a base")
        })?;
        path.clear();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

fn read_json<R>(response: ureq::Response) -> StoreResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        error!(error = %err, "failed to read response body");
        Error::new(ErrorKind::Remote)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        error!(error = %err, "malformed car documents");
        Error::new(ErrorKind::Corrupt)
            .with_message("invalid car documents in response")
            .with_source(err)
    })
}
