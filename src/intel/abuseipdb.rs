use std::net::IpAddr;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::{ Deserialize, Serialize };
use tracing::debug;

use super::{ na, Check, CheckError, CheckType, IntelChecker, IpInfo };
use crate::http::HttpClient;

const NAME: &str = "abuseipdb.com";
const DEFAULT_URL: &str = "https://api.abuseipdb.com/api/v2/check";

#[derive(Deserialize)]
struct Config {
    #[serde(default = "default_url")]
    url: String,
    #[serde(default)]
    api_key: String,
    #[serde(default = "default_max_age_days")]
    max_age_days: u32,
    /// Confidence score from which an address counts as malicious.
    #[serde(default = "default_malicious_score")]
    malicious_score: u8,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_max_age_days() -> u32 {
    90
}

fn default_malicious_score() -> u8 {
    80
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: default_url(),
            api_key: "".to_string(),
            max_age_days: default_max_age_days(),
            malicious_score: default_malicious_score(),
        }
    }
}

#[derive(Deserialize)]
struct Response {
    data: Abuse,
}

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Abuse {
    #[serde(default)]
    pub ip_address: String,
    #[serde(default)]
    pub abuse_confidence_score: u8,
    #[serde(default)]
    pub total_reports: u32,
    #[serde(default)]
    pub is_tor: bool,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub isp: Option<String>,
    #[serde(default)]
    pub usage_type: Option<String>,
    #[serde(default)]
    pub last_reported_at: Option<String>,
}

impl IpInfo for Abuse {
    fn json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    fn summary(&self) -> String {
        format!(
            "IP {}, abuse confidence: {}%, reports: {}, isp: {}, country: {}",
            self.ip_address,
            self.abuse_confidence_score,
            self.total_reports,
            na(self.isp.as_deref().unwrap_or("")),
            na(self.country_code.as_deref().unwrap_or(""))
        )
    }
}

#[derive(Default)]
pub struct AbuseIpDb {
    config: Config,
    client: HttpClient,
}

impl AbuseIpDb {
    pub fn new(client: HttpClient) -> AbuseIpDb {
        AbuseIpDb { config: Config::default(), client }
    }

    pub fn with_url(mut self, url: &str) -> AbuseIpDb {
        self.config.url = url.to_string();
        self
    }
}

#[async_trait]
impl IntelChecker for AbuseIpDb {
    async fn check_ip(&self, ip: IpAddr) -> Result<Check, CheckError> {
        let addr = ip.to_string();
        let max_age = self.config.max_age_days.to_string();
        let headers = [
            ("Key", self.config.api_key.as_str()),
            ("Accept", "application/json"),
        ];
        let query = [
            ("ipAddress", addr.as_str()),
            ("maxAgeInDays", max_age.as_str()),
        ];

        let res: Result<Response, _> = self.client.get_json(&self.config.url, &headers, &query).await;
        let mut data = match res {
            Ok(v) => v.data,
            Err(e) if e.is_not_found() => {
                debug!("{} has no record of {}", NAME, ip);
                let info = Abuse {
                    ip_address: addr,
                    country_code: Some(na("")),
                    isp: Some(na("")),
                    usage_type: Some(na("")),
                    last_reported_at: Some(na("")),
                    ..Default::default()
                };
                return Ok(Check::new(NAME, CheckType::InfoAndIsMalicious, info));
            }
            Err(e) => {
                return Err(CheckError::upstream(NAME, e));
            }
        };
        if data.ip_address.is_empty() {
            data.ip_address = addr;
        }
        let malicious = data.abuse_confidence_score >= self.config.malicious_score;
        Ok(Check::new(NAME, CheckType::InfoAndIsMalicious, data).malicious(malicious))
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
