use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::state::{ArmStatus, DefectSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmCommand {
    Start,
    Stop,
    Reset,
}

impl ArmCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArmCommand::Start => "start",
            ArmCommand::Stop => "stop",
            ArmCommand::Reset => "reset",
        }
    }

    /// Past tense for operator-facing notification text.
    pub fn past_tense(&self) -> &'static str {
        match self {
            ArmCommand::Start => "started",
            ArmCommand::Stop => "stopped",
            ArmCommand::Reset => "reset",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: StatusCode },
    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Deserialize)]
struct ArmStatusBody {
    status: ArmStatus,
}

/// REST collaborator client: the initial snapshot fetches and the arm
/// control commands. A non-2xx response is an `ApiError`, never a panic.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base: Url) -> Result<Self, ApiError> {
        // Bounded so a hung endpoint cannot stall the initial seed.
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, base })
    }

    pub async fn fetch_metrics(&self) -> Result<DefectSnapshot, ApiError> {
        let url = self.base.join("api/metrics")?;
        let response = check(self.http.get(url).send().await?)?;
        Ok(response.json().await?)
    }

    pub async fn fetch_arm_status(&self) -> Result<ArmStatus, ApiError> {
        let url = self.base.join("api/robotic-arm/status")?;
        let response = check(self.http.get(url).send().await?)?;
        let body: ArmStatusBody = response.json().await?;
        Ok(body.status)
    }

    pub async fn arm_command(&self, command: ArmCommand) -> Result<ArmStatus, ApiError> {
        let url = self
            .base
            .join(&format!("api/robotic-arm/{}", command.as_str()))?;
        let response = check(self.http.post(url).send().await?)?;
        let body: ArmStatusBody = response.json().await?;
        Ok(body.status)
    }
}

fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status {
            endpoint: response.url().path().to_string(),
            status,
        })
    }
}
