//! Catalog server configuration
//!
//! Loaded from TOML. Example:
//!
//! ```toml
//! catalog_dir = "/var/opt/SUNWsamfs/catalog"
//! table_increment = 100
//!
//! [defaults]
//! label_barcode = true
//! export_unavail = false
//!
//! [[devices]]
//! eq = 20
//! kind = "library"
//! family_set = "stk20"
//! media = "li"
//!
//! [[devices]]
//! eq = 30
//! kind = "historian"
//! ```

use crate::core::error::{CatalogError, Result};
use crate::core::header::CatalogType;
use crate::core::media;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Entries added each time a catalog grows
pub const CATALOG_TABLE_INCR: u32 = 100;

pub const DEFAULT_TABLE_NAME: &str = "CatalogTable";
pub const DEFAULT_SOCKET_NAME: &str = "catserver.sock";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Library,
    Historian,
    Manual,
}

impl From<DeviceKind> for CatalogType {
    fn from(kind: DeviceKind) -> Self {
        match kind {
            DeviceKind::Library => CatalogType::Library,
            DeviceKind::Historian => CatalogType::Historian,
            DeviceKind::Manual => CatalogType::Manual,
        }
    }
}

/// One piece of equipment that owns a catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub eq: u16,
    pub kind: DeviceKind,

    /// Catalog file name; absolute, or relative to the catalog directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Family set name, used to name a library catalog when `name` is unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_set: Option<String>,

    /// Default media type written into a new catalog header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<String>,
}

impl DeviceConfig {
    pub fn new(eq: u16, kind: DeviceKind) -> Self {
        DeviceConfig {
            eq,
            kind,
            name: None,
            family_set: None,
            media: None,
        }
    }
}

/// Site policy flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Derive the VSN of unlabeled media from its barcode
    pub label_barcode: bool,
    /// Take the low-order barcode characters for the VSN
    pub barcode_low: bool,
    /// Mark media exported to the historian unavailable
    pub export_unavail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub catalog_dir: PathBuf,

    /// Catalog table file; defaults to `<catalog_dir>/CatalogTable`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_path: Option<PathBuf>,

    /// Unix socket for remote clients; defaults to `<catalog_dir>/catserver.sock`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_path: Option<PathBuf>,

    #[serde(default = "default_increment")]
    pub table_increment: u32,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn default_increment() -> u32 {
    CATALOG_TABLE_INCR
}

impl ServerConfig {
    pub fn new<P: AsRef<Path>>(catalog_dir: P) -> Self {
        ServerConfig {
            catalog_dir: catalog_dir.as_ref().to_path_buf(),
            table_path: None,
            socket_path: None,
            table_increment: CATALOG_TABLE_INCR,
            defaults: Defaults::default(),
            devices: Vec::new(),
        }
    }

    pub fn with_device(mut self, device: DeviceConfig) -> Self {
        self.devices.push(device);
        self
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: ServerConfig =
            toml::from_str(text).map_err(|e| CatalogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&text)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CatalogError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.table_increment == 0 {
            return Err(CatalogError::Config("table_increment must be positive".into()));
        }

        let historians = self
            .devices
            .iter()
            .filter(|d| d.kind == DeviceKind::Historian)
            .count();
        if historians != 1 {
            return Err(CatalogError::Config(format!(
                "exactly one historian required, found {}",
                historians
            )));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if !seen.insert(device.eq) {
                return Err(CatalogError::Config(format!(
                    "equipment {} configured twice",
                    device.eq
                )));
            }
            if device.kind == DeviceKind::Library
                && device.name.is_none()
                && device.family_set.is_none()
            {
                return Err(CatalogError::Config(format!(
                    "library {} needs a catalog name or family set",
                    device.eq
                )));
            }
            if let Some(m) = &device.media {
                if !media::is_valid_code(m) {
                    return Err(CatalogError::InvalidMediaType(m.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn table_path(&self) -> PathBuf {
        self.table_path
            .clone()
            .unwrap_or_else(|| self.catalog_dir.join(DEFAULT_TABLE_NAME))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| self.catalog_dir.join(DEFAULT_SOCKET_NAME))
    }

    /// Catalog file for a device
    ///
    /// An absolute `name` is used verbatim and a relative one is joined to the
    /// catalog directory. Otherwise libraries use their family set name, the
    /// historian `hist<eq>` and manual drives `man<eq>`.
    pub fn catalog_path(&self, device: &DeviceConfig) -> PathBuf {
        if let Some(name) = &device.name {
            let name = Path::new(name);
            if name.is_absolute() {
                return name.to_path_buf();
            }
            return self.catalog_dir.join(name);
        }
        match device.kind {
            DeviceKind::Library => self
                .catalog_dir
                .join(device.family_set.as_deref().unwrap_or_default()),
            DeviceKind::Historian => self.catalog_dir.join(format!("hist{}", device.eq)),
            DeviceKind::Manual => self.catalog_dir.join(format!("man{}", device.eq)),
        }
    }

    /// Entry count of a newly created empty catalog
    pub fn initial_entries(&self, kind: DeviceKind) -> u32 {
        match kind {
            DeviceKind::Manual => 1,
            _ => self.table_increment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
catalog_dir = "/var/cat"

[defaults]
label_barcode = true

[[devices]]
eq = 20
kind = "library"
family_set = "stk20"
media = "li"

[[devices]]
eq = 21
kind = "library"
name = "/other/lib21"

[[devices]]
eq = 30
kind = "historian"

[[devices]]
eq = 40
kind = "manual"
name = "drive40"
"#;

    #[test]
    fn test_parse_and_name_catalogs() {
        let config = ServerConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.table_increment, CATALOG_TABLE_INCR);
        assert!(config.defaults.label_barcode);
        assert!(!config.defaults.barcode_low);
        assert_eq!(config.table_path(), PathBuf::from("/var/cat/CatalogTable"));

        let paths: Vec<PathBuf> = config
            .devices
            .iter()
            .map(|d| config.catalog_path(d))
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/var/cat/stk20"),
                PathBuf::from("/other/lib21"),
                PathBuf::from("/var/cat/hist30"),
                PathBuf::from("/var/cat/drive40"),
            ]
        );
        assert_eq!(config.initial_entries(DeviceKind::Manual), 1);
        assert_eq!(config.initial_entries(DeviceKind::Library), 100);
    }

    #[test]
    fn test_historian_required() {
        let config = ServerConfig::new("/tmp").with_device(DeviceConfig {
            family_set: Some("lib".into()),
            ..DeviceConfig::new(1, DeviceKind::Library)
        });
        assert!(matches!(config.validate(), Err(CatalogError::Config(_))));
    }

    #[test]
    fn test_duplicate_eq_rejected() {
        let config = ServerConfig::new("/tmp")
            .with_device(DeviceConfig::new(1, DeviceKind::Historian))
            .with_device(DeviceConfig::new(1, DeviceKind::Manual));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = ServerConfig::from_toml(SAMPLE).unwrap();
        let text = config.to_toml().unwrap();
        assert_eq!(ServerConfig::from_toml(&text).unwrap(), config);
    }
}
