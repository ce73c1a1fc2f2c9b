//! The adapters for the voter registry authority.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use canvass_core::flow::{clean_national_id, Authority, NoAuthority};
use canvass_core::{AuthorityRecord, LocationClaim, VerificationResult};
use serde_json::Value as JSValue;

use crate::canvass::config_reader::LoadedConfig;
use crate::canvass::*;

pub const DEFAULT_TOKEN_ENV: &str = "VERIFIK_TOKEN";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
// Shorter tokens are placeholders left in a sample configuration.
const MIN_TOKEN_LEN: usize = 20;

// Numbers are accepted too: some registries answer the polling table as a number.
fn js_text(js: Option<&JSValue>) -> Option<String> {
    match js {
        Some(JSValue::String(s)) => Some(s.clone()),
        Some(JSValue::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads a registry answer. The fields are looked up in the `data` object when
/// there is one, otherwise at the top level.
pub fn record_from_json(js: &JSValue) -> AuthorityRecord {
    let data = match js.get("data") {
        Some(d) if d.is_object() => d,
        _ => js,
    };
    AuthorityRecord {
        department: js_text(data.get("department")),
        municipality: js_text(data.get("municipality")),
        voting_station: js_text(data.get("votingStation")),
        polling_table: js_text(data.get("pollingTable")),
        address: js_text(data.get("address")),
    }
}

/// Looks up national IDs over HTTP:
/// `GET <url>?documentNumber=<id>` with a bearer token.
pub struct HttpAuthority {
    agent: ureq::Agent,
    url: String,
    token: Option<String>,
}

impl HttpAuthority {
    pub fn new(url: &str, token: Option<String>, timeout_ms: u64) -> HttpAuthority {
        let timeout = Duration::from_millis(timeout_ms.max(100));
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .build();
        HttpAuthority {
            agent,
            url: url.to_string(),
            token,
        }
    }
}

impl Authority for HttpAuthority {
    fn verify(&self, national_id: &str, _claim: &LocationClaim) -> VerificationResult {
        let token = match self.token.as_deref().map(str::trim) {
            Some(t) if t.chars().count() >= MIN_TOKEN_LEN => t,
            _ => {
                warn!("HttpAuthority: the authority token is missing or invalid");
                return VerificationResult::AuthorityError(
                    "authority token missing or invalid".to_string(),
                );
            }
        };
        let document_number = clean_national_id(national_id);
        debug!("HttpAuthority: looking up {}", document_number);
        let response = self
            .agent
            .get(&self.url)
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {}", token))
            .query("documentNumber", &document_number)
            .call();
        match response {
            Ok(resp) if resp.status() == 200 => {
                match serde_json::from_reader::<_, JSValue>(resp.into_reader()) {
                    Ok(js) => VerificationResult::Found(record_from_json(&js)),
                    Err(e) => VerificationResult::AuthorityError(format!(
                        "could not read the authority answer: {}",
                        e
                    )),
                }
            }
            Ok(resp) => {
                VerificationResult::AuthorityError(format!("HTTP status {}", resp.status()))
            }
            Err(ureq::Error::Status(404, _)) => VerificationResult::NotFound,
            Err(ureq::Error::Status(status, _)) => {
                warn!("HttpAuthority: status {} for {}", status, document_number);
                VerificationResult::AuthorityError(format!("HTTP status {}", status))
            }
            Err(ureq::Error::Transport(transport)) => {
                warn!("HttpAuthority: transport error: {}", transport);
                VerificationResult::AuthorityError(format!("connection error: {}", transport))
            }
        }
    }
}

/// A registry kept in a JSON file: an object from national ID to record.
pub struct FileAuthority {
    records: HashMap<String, AuthorityRecord>,
}

impl FileAuthority {
    pub fn from_path(path: &Path) -> CanvassResult<FileAuthority> {
        let p = path.display().to_string();
        let contents = fs::read_to_string(path).context(OpeningFileSnafu { path: p.clone() })?;
        let js: HashMap<String, JSValue> =
            serde_json::from_str(&contents).context(ParsingJsonSnafu { path: p })?;
        let records = js
            .iter()
            .map(|(nid, v)| (clean_national_id(nid), record_from_json(v)))
            .collect();
        Ok(FileAuthority { records })
    }
}

impl Authority for FileAuthority {
    fn verify(&self, national_id: &str, _claim: &LocationClaim) -> VerificationResult {
        match self.records.get(&clean_national_id(national_id)) {
            Some(record) => VerificationResult::Found(record.clone()),
            None => VerificationResult::NotFound,
        }
    }
}

/// Builds the authority named by the configuration.
pub fn build_authority(loaded: &LoadedConfig) -> CanvassResult<Box<dyn Authority>> {
    let settings = &loaded.config.authority;
    match settings.provider.as_str() {
        "http" => {
            let url = settings.url.as_deref().context(AuthorityConfigSnafu {
                message: "the http provider needs a url",
            })?;
            let token_env = settings.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
            let token = std::env::var(token_env).ok();
            if token.is_none() {
                warn!("The environment variable {} is not set", token_env);
            }
            let timeout_ms = settings.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
            info!("Using the http authority {}", url);
            Ok(Box::new(HttpAuthority::new(url, token, timeout_ms)))
        }
        "file" => {
            let path = settings.file_path.as_deref().context(AuthorityConfigSnafu {
                message: "the file provider needs a filePath",
            })?;
            let p = loaded.resolve(path);
            info!("Using the file authority {:?}", p);
            Ok(Box::new(FileAuthority::from_path(&p)?))
        }
        "" | "none" => Ok(Box::new(NoAuthority)),
        x => whatever!("Provider not implemented {:?}", x),
    }
}
