use std::net::IpAddr;
use anyhow::Result;
use async_trait::async_trait;
use serde_derive::{ Deserialize, Serialize };
use tracing::debug;

use super::{ na, Check, CheckError, CheckType, IntelChecker, IpInfo };
use crate::http::HttpClient;

const NAME: &str = "wise";
const IP_PLACEHOLDER: &str = "${ip}";

#[derive(Deserialize)]
struct Config {
    /// URL template, `${ip}` is replaced with the queried address.
    url: String,
}

impl Default for Config {
    fn default() -> Self {
        Config { url: "http://wise:8081/ip/${ip}".to_string() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct WiseHit {
    pub field: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct WiseResult {
    pub ip: String,
    pub hits: Vec<WiseHit>,
}

impl IpInfo for WiseResult {
    fn json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    fn summary(&self) -> String {
        let fields: Vec<&str> = self.hits
            .iter()
            .map(|h| h.field.as_str())
            .collect();
        format!("IP {}, hits: {}, fields: {}", self.ip, self.hits.len(), na(&fields.join(", ")))
    }
}

#[derive(Default)]
pub struct Wise {
    config: Config,
    client: HttpClient,
}

impl Wise {
    pub fn new(client: HttpClient) -> Wise {
        Wise { config: Config::default(), client }
    }

    pub fn with_url(mut self, url: &str) -> Wise {
        self.config.url = url.to_string();
        self
    }
}

#[async_trait]
impl IntelChecker for Wise {
    async fn check_ip(&self, ip: IpAddr) -> Result<Check, CheckError> {
        let url = self.config.url.replace(IP_PLACEHOLDER, &ip.to_string());
        let hits: Vec<WiseHit> = match
            self.client.get_json(&url, &[("accept", "application/json")], &[]).await
        {
            Ok(v) => v,
            Err(e) if e.is_not_found() => {
                debug!("{} has no record of {}", NAME, ip);
                vec![]
            }
            Err(e) => {
                return Err(CheckError::upstream(NAME, e));
            }
        };
        let malicious = !hits.is_empty();
        let info = WiseResult { ip: ip.to_string(), hits };
        Ok(Check::new(NAME, CheckType::IsMalicious, info).malicious(malicious))
    }

    fn name(&self) -> &str {
        NAME
    }

    fn initialize(&mut self, config: String) -> Result<()> {
        let c: Config = serde_json::from_str(&config)?;
        if !c.url.contains(IP_PLACEHOLDER) {
            return Err(anyhow::anyhow!("wise url must contain {}", IP_PLACEHOLDER));
        }
        self.config = c;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_initialize() {
        let mut w = Wise::default();
        assert!(w.initialize(r#"{"url": "http://wise/ip/"}"#.to_string()).is_err());
        assert!(w.initialize("{}".to_string()).is_err());
        assert!(w.initialize(r#"{"url": "http://wise/ip/${ip}"}"#.to_string()).is_ok());
    }

    #[tokio::test]
    async fn test_hits() {
        let mut server = mockito::Server::new_async().await;
        let _m1 = server
            .mock("GET", "/ip/5.6.7.8")
            .with_status(200)
            .with_body(r#"[{"field": "alienvault.id", "value": "1234"}, {"field": "threatstream.severity"}]"#)
            .create_async().await;
        let _m2 = server
            .mock("GET", "/ip/9.9.9.9")
            .with_status(200)
            .with_body("[]")
            .create_async().await;
        let w = Wise::default().with_url(&(server.url() + "/ip/${ip}"));

        let res = w.check_ip("5.6.7.8".parse().unwrap()).await.unwrap();
        assert_eq!(res.check_type, CheckType::IsMalicious);
        assert!(res.ip_addr_is_malicious);
        assert_eq!(
            res.ip_addr_info.summary(),
            "IP 5.6.7.8, hits: 2, fields: alienvault.id, threatstream.severity"
        );

        let res = w.check_ip("9.9.9.9".parse().unwrap()).await.unwrap();
        assert!(!res.ip_addr_is_malicious);
        assert_eq!(res.ip_addr_info.summary(), "IP 9.9.9.9, hits: 0, fields: n/a");
    }

    #[tokio::test]
    async fn test_not_found_and_errors() {
        let mut server = mockito::Server::new_async().await;
        let _m1 = server.mock("GET", "/ip/1.1.1.1").with_status(404).create_async().await;
        let _m2 = server.mock("GET", "/ip/2.2.2.2").with_status(503).create_async().await;
        let w = Wise::default().with_url(&(server.url() + "/ip/${ip}"));

        let res = w.check_ip("1.1.1.1".parse().unwrap()).await.unwrap();
        assert!(!res.ip_addr_is_malicious);
        assert!(res.ip_addr_info.summary().contains("fields: n/a"));

        let err = w.check_ip("2.2.2.2".parse().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("503 Service Unavailable"));
    }
}
