// config lets you read a separate config file, overridden by the environment
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::construct::{DataSetId, DuplicateLabels};
use crate::datatype::Instant;
use crate::error::Result;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path of the SQLite file, or `:memory:`.
    pub database: String,
    pub data_set: DataSetId,
    /// Instant used for reads and as the start of written values. The
    /// current time when absent.
    pub query_instant: Option<Instant>,
    pub duplicate_labels: DuplicateLabels,
    pub busy_timeout_ms: u64,
    pub listen: String,
}

impl Settings {
    /// Defaults, then the optional file `name` (any extension the config crate
    /// understands), then `CANOPY_*` environment variables.
    pub fn load(name: &str) -> Result<Self> {
        let settings = Config::builder()
            .set_default("database", "canopy.db")?
            .set_default("data_set", 1i64)?
            .set_default("duplicate_labels", "overwrite")?
            .set_default("busy_timeout_ms", 5000i64)?
            .set_default("listen", "127.0.0.1:8080")?
            .add_source(File::with_name(name).required(false))
            .add_source(Environment::with_prefix("CANOPY").try_parsing(true))
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_without_a_file() {
        let settings = Settings::load("definitely-not-a-canopy-settings-file").unwrap();
        assert_eq!(settings.data_set, 1);
        assert_eq!(settings.duplicate_labels, DuplicateLabels::Overwrite);
        assert_eq!(settings.busy_timeout_ms, 5000);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"database": ":memory:", "data_set": 7, "query_instant": 42, "duplicate_labels": "reject"}}"#
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.database, ":memory:");
        assert_eq!(settings.data_set, 7);
        assert_eq!(settings.query_instant, Some(42));
        assert_eq!(settings.duplicate_labels, DuplicateLabels::Reject);
    }
}
