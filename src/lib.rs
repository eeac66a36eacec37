//! Concurrent IP reputation lookups across threat intel providers.
//!
//! Each provider is an [`intel::IntelChecker`] producing a uniform
//! [`intel::Check`]; the [`aggregator::Aggregator`] runs them side by side and
//! collects a [`aggregator::Report`] that tolerates individual provider failures.

pub mod aggregator;
pub mod http;
pub mod intel;
pub mod logger;
pub mod utils;

pub use aggregator::{ AggregateError, Aggregator, Report };
pub use intel::{ Check, CheckError, CheckType, IntelChecker, IpInfo };
