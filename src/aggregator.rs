use std::{
    future::Future,
    net::{ AddrParseError, IpAddr },
    panic::AssertUnwindSafe,
    sync::Arc,
    time::Duration,
};

use futures_lite::FutureExt;
use serde::{ Serialize, Serializer };
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{ debug, info, warn };

use crate::intel::{ Check, CheckError, IntelChecker };

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no intel providers registered")] NoProviders,
    #[error("invalid IP address {input:?}: {source}")] InvalidAddress {
        input: String,
        #[source]
        source: AddrParseError,
    },
}

#[derive(Debug, Serialize)]
pub struct Failure {
    pub provider: String,
    #[serde(serialize_with = "error_string")]
    pub error: CheckError,
}

fn error_string<S>(e: &CheckError, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
    serializer.serialize_str(&e.to_string())
}

/// Outcome of one lookup, checks and failures both in registration order.
#[derive(Debug, Serialize)]
pub struct Report {
    pub ip: IpAddr,
    pub checks: Vec<Check>,
    pub failures: Vec<Failure>,
}

impl Report {
    pub fn is_malicious(&self) -> bool {
        self.checks.iter().any(|c| c.is_malicious())
    }
}

pub struct Aggregator {
    checkers: Vec<Arc<dyn IntelChecker>>,
    deadline: Option<Duration>,
}

impl Aggregator {
    pub fn new(checkers: Vec<Box<dyn IntelChecker>>) -> Aggregator {
        Aggregator {
            checkers: checkers.into_iter().map(Arc::from).collect(),
            deadline: None,
        }
    }

    /// Abandon providers still running after `d`.
    pub fn with_deadline(mut self, d: Duration) -> Aggregator {
        self.deadline = Some(d);
        self
    }

    pub fn len(&self) -> usize {
        self.checkers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkers.is_empty()
    }

    pub async fn lookup(&self, ip: &str) -> Result<Report, AggregateError> {
        self.lookup_until(ip, std::future::pending()).await
    }

    /// Queries every provider concurrently. Providers that have not finished when
    /// `cancel` resolves or the deadline passes are reported as cancelled.
    pub async fn lookup_until<F>(&self, ip: &str, cancel: F) -> Result<Report, AggregateError>
        where F: Future<Output = ()>
    {
        if self.checkers.is_empty() {
            return Err(AggregateError::NoProviders);
        }
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|source| AggregateError::InvalidAddress { input: ip.to_string(), source })?;

        let mut slots: Vec<Option<Result<Check, CheckError>>> = self.checkers
            .iter()
            .map(|_| None)
            .collect();
        let mut set = JoinSet::new();
        for (idx, c) in self.checkers.iter().enumerate() {
            let c = Arc::clone(c);
            set.spawn(async move {
                let res = match AssertUnwindSafe(c.check_ip(addr)).catch_unwind().await {
                    Ok(res) => res,
                    Err(_) => Err(CheckError::Aborted(c.name().to_string())),
                };
                (idx, res)
            });
        }
        debug!("dispatched {} intel checks for {}", self.checkers.len(), addr);

        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(cancel);
        tokio::pin!(expired);

        let mut cancelled = false;
        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    Some(Ok((idx, res))) => slots[idx] = Some(res),
                    Some(Err(e)) => warn!("intel check task failed: {}", e),
                    None => break,
                },
                _ = &mut cancel => {
                    cancelled = true;
                    break;
                },
                _ = &mut expired => {
                    cancelled = true;
                    break;
                },
            }
        }
        if cancelled {
            warn!("lookup of {} stopped with {} intel checks still running", addr, set.len());
            set.abort_all();
        }

        let mut report = Report { ip: addr, checks: vec![], failures: vec![] };
        for (c, slot) in self.checkers.iter().zip(slots) {
            let provider = c.name().to_string();
            let outcome = slot.unwrap_or_else(|| {
                if cancelled {
                    Err(CheckError::Cancelled(provider.clone()))
                } else {
                    Err(CheckError::Aborted(provider.clone()))
                }
            });
            match outcome {
                Ok(check) => report.checks.push(check),
                Err(error) => {
                    warn!("{} check for {} failed: {}", provider, addr, error);
                    report.failures.push(Failure { provider, error });
                }
            }
        }
        info!(
            ip = %addr,
            checks = report.checks.len(),
            failures = report.failures.len(),
            malicious = report.is_malicious(),
            "lookup complete"
        );
        Ok(report)
    }
}
