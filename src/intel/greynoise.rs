use std::net::IpAddr;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::{ Deserialize, Serialize };
use tracing::debug;

use super::{ na, Check, CheckError, CheckType, IntelChecker, IpInfo };
use crate::http::HttpClient;

const NAME: &str = "greynoise.io";
const DEFAULT_URL: &str = "https://api.greynoise.io/v3/community/";
const NOT_OBSERVED: &str =
    "IP not observed scanning the internet or contained in RIOT data set.";

#[derive(Deserialize)]
struct Config {
    #[serde(default = "default_url")]
    url: String,
    #[serde(default)]
    api_key: String,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config { url: default_url(), api_key: "".to_string() }
    }
}

/// Community API answer.
#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct Grey {
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub noise: bool,
    #[serde(default)]
    pub riot: bool,
    #[serde(default)]
    pub classification: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub last_seen: String,
    #[serde(default)]
    pub message: String,
}

impl IpInfo for Grey {
    fn json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    fn summary(&self) -> String {
        format!("IP {}, riot: {}, message: {}", self.ip, self.riot, na(&self.message))
    }
}

impl Grey {
    fn not_observed(ip: IpAddr) -> Grey {
        Grey {
            ip: ip.to_string(),
            noise: false,
            riot: false,
            classification: na(""),
            name: na(""),
            link: na(""),
            last_seen: na(""),
            message: NOT_OBSERVED.to_string(),
        }
    }
}

#[derive(Default)]
pub struct GreyNoise {
    config: Config,
    client: HttpClient,
}

impl GreyNoise {
    pub fn new(client: HttpClient) -> GreyNoise {
        GreyNoise { config: Config::default(), client }
    }

    pub fn with_url(mut self, url: &str) -> GreyNoise {
        self.config.url = url.to_string();
        self
    }
}

#[async_trait]
impl IntelChecker for GreyNoise {
    async fn check_ip(&self, ip: IpAddr) -> Result<Check, CheckError> {
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), ip);
        let mut headers = vec![("accept", "application/json")];
        if !self.config.api_key.is_empty() {
            headers.push(("key", self.config.api_key.as_str()));
        }

        let mut response: Grey = match self.client.get_json(&url, &headers, &[]).await {
            Ok(v) => v,
            Err(e) if e.is_not_found() => {
                debug!("{} has no record of {}", NAME, ip);
                return Ok(Check::new(NAME, CheckType::InfoAndIsMalicious, Grey::not_observed(ip)));
            }
            Err(e) => {
                return Err(CheckError::upstream(NAME, e));
            }
        };
        if response.ip.is_empty() {
            response.ip = ip.to_string();
        }
        let malicious = response.classification == "malicious";
        Ok(Check::new(NAME, CheckType::InfoAndIsMalicious, response).malicious(malicious))
    }

    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, config: String) -> Result<()> {
        let c = serde_json::from_str(&config)?;
        self.config = c;
        Ok(())
    }
}
