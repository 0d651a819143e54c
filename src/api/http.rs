use std::time::Duration;

use log::debug;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use url::Url;

use super::{
    AnalyzeRequest, AnalyzeResponse, AuthApi, HealthResponse, LegacySimulateRequest,
    SimulationBackend, TokenResponse, UploadedSimulateRequest,
};
use crate::config::Timeouts;
use crate::error::{Error, Result};
use crate::request::CancelToken;
use crate::waveform::SimulationResult;

/// Blocking JSON client for the simulation and authentication services.
///
/// Cookies set by the server are retained for the lifetime of the client.
pub struct HttpClient {
    base: Url,
    client: Client,
    timeouts: Timeouts,
}

impl HttpClient {
    pub fn new(base_url: &str, timeouts: Timeouts) -> Result<Self> {
        let base = Url::parse(base_url)?;
        let client = Client::builder()
            .cookie_store(true)
            .user_agent(concat!("spicewave/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base,
            client,
            timeouts,
        })
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn endpoint(&self, path: &str) -> Result<Url> {
        endpoint(&self.base, path)
    }

    fn post<B, R>(&self, path: &str, body: &B, timeout: Duration) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!("POST {url}");
        let res = self
            .client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()?;
        decode(res)
    }

    fn simulate_with<B>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<SimulationResult>
    where
        B: Serialize + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let res: SimulationResult = self.post(path, body, timeout)?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        res.validate()?;
        Ok(res)
    }
}

/// Joins `path` onto `base`, keeping any path prefix `base` already has.
pub(crate) fn endpoint(base: &Url, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Ok(Url::parse(&joined)?)
}

fn decode<R: DeserializeOwned>(res: reqwest::blocking::Response) -> Result<R> {
    let status = res.status();
    let text = res.text()?;
    if !status.is_success() {
        return Err(status_error(status, &text));
    }
    serde_json::from_str(&text).map_err(|e| Error::MalformedResponse(e.to_string()))
}

/// Maps a failed response to an error, extracting the server's message.
pub(crate) fn status_error(status: StatusCode, body: &str) -> Error {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["msg", "error", "detail"]
            .iter()
            .find_map(|k| v.get(k).and_then(Value::as_str).map(str::to_string))
    });
    if status == StatusCode::UNAUTHORIZED {
        Error::Unauthorized { message }
    } else {
        Error::Backend {
            status: status.as_u16(),
            message,
        }
    }
}

impl SimulationBackend for HttpClient {
    fn analyze(&self, req: &AnalyzeRequest) -> Result<AnalyzeResponse> {
        self.post("analyze", req, self.timeouts.analyze())
    }

    fn simulate_uploaded(
        &self,
        req: &UploadedSimulateRequest,
        cancel: &CancelToken,
    ) -> Result<SimulationResult> {
        self.simulate_with("simulate_uploaded", req, self.timeouts.simulate(), cancel)
    }

    fn simulate(
        &self,
        req: &LegacySimulateRequest,
        cancel: &CancelToken,
    ) -> Result<SimulationResult> {
        self.simulate_with("simulate", req, self.timeouts.legacy(), cancel)
    }

    fn health(&self) -> Result<HealthResponse> {
        let url = self.endpoint("health")?;
        debug!("GET {url}");
        let res = self
            .client
            .get(url)
            .timeout(self.timeouts.verify())
            .send()?;
        decode(res)
    }
}

impl AuthApi for HttpClient {
    fn verify_token(&self, token: &str) -> Result<TokenResponse> {
        self.post(
            "auth/verify-token",
            &serde_json::json!({ "token": token }),
            self.timeouts.verify(),
        )
    }

    fn refresh(&self) -> Result<TokenResponse> {
        self.post(
            "auth/refresh",
            &serde_json::json!({}),
            self.timeouts.verify(),
        )
    }
}
