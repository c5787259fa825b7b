//! The persisted shape of a logged fault.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::fault::FaultInfo;
use crate::request::Request;

pub const MESSAGE_MAX: usize = 512;
pub const SOURCE_FILE_MAX: usize = 510;
pub const METHOD_MAX: usize = 255;
pub const USER_NAME_MAX: usize = 50;
pub const CLIENT_IP_MAX: usize = 20;

const UNKNOWN: &str = "Unknown";
const ANONYMOUS: &str = "Anonymous";

/// Who was calling, captured before the downstream handler ran.
///
/// The audit task only ever sees this copy, never the request itself.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CallerSnapshot {
    pub user_name: Option<String>,
    pub client_ip: Option<IpAddr>,
}

impl CallerSnapshot {
    pub fn of(req: &Request) -> Self {
        Self {
            user_name: req.identity().and_then(|i| i.name()).map(str::to_owned),
            client_ip: req.remote_addr().map(|a| a.ip()),
        }
    }

    /// `(user_name, client_ip)` as stored.
    ///
    /// Without an address the caller cannot be placed at all, so a missing
    /// name reads as `Unknown` rather than `Anonymous`.
    fn resolve(&self) -> (String, String) {
        let name = self.user_name.as_deref().filter(|n| !n.trim().is_empty());
        match self.client_ip {
            None => (name.unwrap_or(UNKNOWN).to_owned(), UNKNOWN.to_owned()),
            Some(ip) => (name.unwrap_or(ANONYMOUS).to_owned(), ip.to_string()),
        }
    }
}

/// One logged fault. Immutable once built.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionRecord {
    id: Uuid,
    occurred_at: DateTime<Utc>,
    message: String,
    source_file: String,
    method: String,
    line_number: u32,
    user_name: String,
    client_ip: String,
}

impl ExceptionRecord {
    /// Builds a record with a fresh id and the current time. Every text
    /// field is cut to its column limit.
    pub fn new(caller: &CallerSnapshot, message: &str, info: &FaultInfo) -> Self {
        let (user_name, client_ip) = caller.resolve();
        Self {
            id: Uuid::now_v7(),
            occurred_at: Utc::now(),
            message: truncate(message, MESSAGE_MAX),
            source_file: truncate(&info.source_file, SOURCE_FILE_MAX),
            method: truncate(&info.qualified_method(), METHOD_MAX),
            line_number: info.line_number,
            user_name: truncate(&user_name, USER_NAME_MAX),
            client_ip: truncate(&client_ip, CLIENT_IP_MAX),
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn occurred_at(&self) -> DateTime<Utc> { self.occurred_at }
    pub fn message(&self) -> &str { &self.message }
    pub fn source_file(&self) -> &str { &self.source_file }
    pub fn method(&self) -> &str { &self.method }
    pub fn line_number(&self) -> u32 { self.line_number }
    pub fn user_name(&self) -> &str { &self.user_name }
    pub fn client_ip(&self) -> &str { &self.client_ip }
}

/// First `max` chars of `s`, no marker.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => s[..end].to_owned(),
        None => s.to_owned(),
    }
}
