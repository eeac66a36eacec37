use std::{ fmt, fs, net::IpAddr, path::Path };
use anyhow::{ Context, Result };
use async_trait::async_trait;
use glob::glob;
use serde::{ ser::{ Error as _, SerializeStruct }, Deserialize, Serialize, Serializer };
use thiserror::Error;
use tracing::{ info, warn };

use crate::http::{ FetchError, HttpClient };

pub mod abuseipdb;
pub mod greynoise;
pub mod wise;

const INTEL_GLOB: &str = "intel_*.json";

/// Placeholder rendered for any display field a provider left empty.
pub const NOT_AVAILABLE: &str = "n/a";

pub fn na(s: &str) -> String {
    if s.is_empty() { NOT_AVAILABLE.to_string() } else { s.to_string() }
}

/// What a check is able to assert about an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckType {
    InfoOnly,
    IsMalicious,
    InfoAndIsMalicious,
}

impl CheckType {
    pub fn can_be_malicious(&self) -> bool {
        matches!(self, CheckType::IsMalicious | CheckType::InfoAndIsMalicious)
    }
}

/// Provider specific details attached to a check.
pub trait IpInfo: fmt::Debug + Send + Sync {
    fn json(&self) -> serde_json::Result<Vec<u8>>;
    fn summary(&self) -> String;
}

#[derive(Debug)]
pub struct Check {
    pub description: String,
    pub check_type: CheckType,
    pub ip_addr_is_malicious: bool,
    pub ip_addr_info: Box<dyn IpInfo>,
}

impl Check {
    pub fn new(description: &str, check_type: CheckType, info: impl IpInfo + 'static) -> Check {
        Check {
            description: description.to_string(),
            check_type,
            ip_addr_is_malicious: false,
            ip_addr_info: Box::new(info),
        }
    }

    pub fn malicious(mut self, verdict: bool) -> Check {
        self.ip_addr_is_malicious = verdict;
        self
    }

    /// Verdict as consumers should read it, ignoring the flag on info-only checks.
    pub fn is_malicious(&self) -> bool {
        self.check_type.can_be_malicious() && self.ip_addr_is_malicious
    }
}

impl Serialize for Check {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let raw = self.ip_addr_info.json().map_err(S::Error::custom)?;
        let info: serde_json::Value = serde_json::from_slice(&raw).map_err(S::Error::custom)?;
        let mut s = serializer.serialize_struct("Check", 5)?;
        s.serialize_field("description", &self.description)?;
        s.serialize_field("type", &self.check_type)?;
        s.serialize_field("malicious", &self.is_malicious())?;
        s.serialize_field("summary", &self.ip_addr_info.summary())?;
        s.serialize_field("info", &info)?;
        s.end()
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{provider}: {source}")] Upstream {
        provider: String,
        #[source]
        source: FetchError,
    },
    #[error("{0}: lookup cancelled before the check completed")] Cancelled(String),
    #[error("{0}: check terminated unexpectedly")] Aborted(String),
}

impl CheckError {
    pub fn upstream(provider: &str, source: FetchError) -> CheckError {
        CheckError::Upstream { provider: provider.to_string(), source }
    }
}

#[async_trait]
pub trait IntelChecker: Send + Sync {
    async fn check_ip(&self, ip: IpAddr) -> Result<Check, CheckError>;
    fn name(&self) -> &str;
    fn initialize(&mut self, config: String) -> Result<()>;
}

#[derive(Deserialize, Clone)]
pub struct IntelSource {
    pub name: String,
    #[serde(rename(deserialize = "type"))]
    pub source_type: String,
    pub enabled: bool,
    pub plugin: String,
    pub config: String,
}

#[derive(Deserialize)]
pub struct IntelSources {
    pub intel_sources: Vec<IntelSource>,
}

fn new_checker(plugin: &str, client: &HttpClient) -> Option<Box<dyn IntelChecker>> {
    match plugin {
        "GreyNoise" => Some(Box::new(greynoise::GreyNoise::new(client.clone()))),
        "AbuseIPDB" => Some(Box::new(abuseipdb::AbuseIpDb::new(client.clone()))),
        "Wise" => Some(Box::new(wise::Wise::new(client.clone()))),
        _ => None,
    }
}

/// Reads every `intel_*.json` under `cfg_dir` and builds the enabled checkers
/// in file then entry order.
pub fn load_intel(cfg_dir: &Path, client: &HttpClient) -> Result<Vec<Box<dyn IntelChecker>>> {
    let glob_pattern = cfg_dir.to_string_lossy().to_string() + "/" + INTEL_GLOB;
    let mut checkers: Vec<Box<dyn IntelChecker>> = vec![];
    for file_path in glob(&glob_pattern)?.flatten() {
        info!("reading {:?}", file_path);
        let s = fs::read_to_string(&file_path)?;
        let loaded: IntelSources = serde_json
            ::from_str(&s)
            .context(format!("cannot parse {:?}", file_path))?;
        for s in loaded.intel_sources {
            if !s.enabled {
                continue;
            }
            let Some(mut c) = new_checker(&s.plugin, client) else {
                warn!("skipping intel source {}: unknown plugin {}", s.name, s.plugin);
                continue;
            };
            c.initialize(s.config).context(format!("cannot initialize intel source {}", s.name))?;
            checkers.push(c);
        }
    }
    if !checkers.is_empty() {
        info!("loaded {} intel plugins", checkers.len());
    }
    Ok(checkers)
}

#[cfg(test)]
mod test {
    use std::env;
    use tracing_test::traced_test;

    use super::*;
    use crate::utils;

    #[derive(Debug, Serialize)]
    struct Dummy {
        ip: String,
    }

    impl IpInfo for Dummy {
        fn json(&self) -> serde_json::Result<Vec<u8>> {
            serde_json::to_vec(self)
        }
        fn summary(&self) -> String {
            format!("IP {}", self.ip)
        }
    }

    #[test]
    fn test_na() {
        assert_eq!(na(""), "n/a");
        assert_eq!(na("scanner"), "scanner");
        assert_eq!(na(" "), " ");
    }

    #[test]
    fn test_check_type() {
        assert!(!CheckType::InfoOnly.can_be_malicious());
        assert!(CheckType::IsMalicious.can_be_malicious());
        assert!(CheckType::InfoAndIsMalicious.can_be_malicious());
    }

    #[test]
    fn test_check_verdict_and_json() {
        let c = Check::new("dummy", CheckType::InfoOnly, Dummy { ip: "1.2.3.4".to_string() }).malicious(
            true
        );
        assert!(c.ip_addr_is_malicious);
        assert!(!c.is_malicious());

        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["description"], "dummy");
        assert_eq!(v["type"], "InfoOnly");
        assert_eq!(v["malicious"], false);
        assert_eq!(v["summary"], "IP 1.2.3.4");
        assert_eq!(v["info"]["ip"], "1.2.3.4");

        let c = Check::new("dummy", CheckType::IsMalicious, Dummy { ip: "1.2.3.4".to_string() }).malicious(
            true
        );
        assert_eq!(serde_json::to_value(&c).unwrap()["malicious"], true);
    }

    #[test]
    #[traced_test]
    fn test_load_intel() {
        let dir = utils::config_dir(true).unwrap();
        let checkers = load_intel(&dir, &HttpClient::default()).unwrap();
        let names: Vec<&str> = checkers
            .iter()
            .map(|c| c.name())
            .collect();
        // the sample AbuseIPDB entry is disabled
        assert_eq!(names, vec!["greynoise.io", "wise"]);
        assert!(logs_contain("loaded 2 intel plugins"));
    }

    #[test]
    fn test_load_intel_errors() {
        let dir = env::temp_dir().join(format!("ipcheck-intel-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        assert!(load_intel(&dir, &HttpClient::default()).unwrap().is_empty());

        let bad_config =
            r#"{ "intel_sources": [
                { "name": "gn", "type": "IP", "enabled": true, "plugin": "GreyNoise", "config": "not json" }
            ] }"#;
        fs::write(dir.join("intel_bad.json"), bad_config).unwrap();
        assert!(load_intel(&dir, &HttpClient::default()).is_err());

        let unknown =
            r#"{ "intel_sources": [
                { "name": "x", "type": "IP", "enabled": true, "plugin": "Shodan", "config": "{}" }
            ] }"#;
        fs::write(dir.join("intel_bad.json"), unknown).unwrap();
        assert!(load_intel(&dir, &HttpClient::default()).unwrap().is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }
}
