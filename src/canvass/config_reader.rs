use std::fs;
use std::path::{Path, PathBuf};

use canvass_core::territory::ListingFormat;
use canvass_core::{FlowSettings, ImportRules};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::canvass::*;

pub const DEFAULT_STORE_FILE: &str = "records.json";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TerritorySource {
    #[serde(rename = "filePath")]
    pub file_path: String,
    pub delimiter: Option<String>,
    #[serde(rename = "headerLabel")]
    pub header_label: Option<String>,
}

impl TerritorySource {
    pub fn listing_format(&self) -> CanvassResult<ListingFormat> {
        let mut format = ListingFormat::default();
        if let Some(d) = &self.delimiter {
            let mut chars = d.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => format.delimiter = c,
                _ => whatever!("the listing delimiter must be a single character, got {:?}", d),
            }
        }
        if let Some(label) = &self.header_label {
            format.header_labels = vec![label.clone()];
        }
        Ok(format)
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthoritySettings {
    /// `http`, `file` or `none`.
    #[serde(default)]
    pub provider: String,
    pub url: Option<String>,
    /// The environment variable holding the bearer token.
    #[serde(rename = "tokenEnv")]
    pub token_env: Option<String>,
    #[serde(rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreSettings {
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize, Default)]
pub struct CanvassConfig {
    #[serde(rename = "territorySource")]
    pub territory_source: Option<TerritorySource>,
    #[serde(default)]
    pub authority: AuthoritySettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub verification: FlowSettings,
    #[serde(rename = "importRules", default)]
    pub import_rules: ImportRules,
}

/// A configuration with the directory its relative paths are resolved against.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct LoadedConfig {
    pub config: CanvassConfig,
    pub root: PathBuf,
}

impl LoadedConfig {
    /// The configuration used when no file is given.
    pub fn in_current_dir() -> LoadedConfig {
        LoadedConfig {
            config: CanvassConfig::default(),
            root: PathBuf::from("."),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub fn store_path(&self) -> PathBuf {
        self.resolve(
            self.config
                .store
                .file_path
                .as_deref()
                .unwrap_or(DEFAULT_STORE_FILE),
        )
    }

    pub fn listing_path(&self) -> Option<PathBuf> {
        self.config
            .territory_source
            .as_ref()
            .map(|ts| self.resolve(&ts.file_path))
    }
}

pub fn read_config(path: &str) -> CanvassResult<LoadedConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: CanvassConfig =
        serde_json::from_str(&contents).context(ParsingJsonSnafu { path })?;
    debug!("read_config: {:?}", config);
    let root = Path::new(path)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Using configuration {:?}, root directory {:?}", path, root);
    Ok(LoadedConfig { config, root })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_full_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canvass.json");
        let mut f = fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{
                "territorySource": {{"filePath": "divipole.csv", "delimiter": ";"}},
                "authority": {{"provider": "http", "url": "https://registry.example/lookup", "timeoutMs": 5000}},
                "store": {{"filePath": "/var/lib/canvass/records.json"}},
                "verification": {{"verifyOnImport": true}},
                "importRules": {{"minAge": 16}}
            }}"#
        )
        .unwrap();

        let loaded = read_config(path.to_str().unwrap()).unwrap();
        let config = &loaded.config;
        assert_eq!(config.authority.provider, "http");
        assert_eq!(config.authority.timeout_ms, Some(5000));
        assert_eq!(config.authority.token_env, None);
        assert!(config.verification.enabled);
        assert!(config.verification.verify_on_import);
        assert_eq!(config.import_rules.min_age, 16);
        assert_eq!(config.import_rules.max_age, 120);

        assert_eq!(loaded.listing_path(), Some(dir.path().join("divipole.csv")));
        assert_eq!(
            loaded.store_path(),
            PathBuf::from("/var/lib/canvass/records.json")
        );
        let format = config
            .territory_source
            .as_ref()
            .unwrap()
            .listing_format()
            .unwrap();
        assert_eq!(format.delimiter, ';');
        assert_eq!(format.header_labels, ListingFormat::default().header_labels);
    }

    #[test]
    fn empty_configuration_has_defaults() {
        let config: CanvassConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, CanvassConfig::default());
        assert_eq!(config.import_rules, ImportRules::DEFAULT_RULES);
        assert_eq!(config.verification, FlowSettings::DEFAULT_SETTINGS);
        assert_eq!(
            LoadedConfig::in_current_dir().store_path(),
            PathBuf::from(".").join(DEFAULT_STORE_FILE)
        );
    }

    #[test]
    fn rejects_long_delimiters() {
        let source = TerritorySource {
            file_path: "x.csv".to_string(),
            delimiter: Some("::".to_string()),
            header_label: None,
        };
        assert!(source.listing_format().is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let res = read_config("/nonexistent/canvass.json");
        assert!(matches!(res, Err(CanvassError::OpeningFile { .. })));
    }
}
