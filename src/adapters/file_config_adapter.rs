//! INI file configuration adapter.

use crate::domain::error::GraphError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
    source: String,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, GraphError> {
        let source = path.as_ref().display().to_string();
        let mut config = Ini::new();
        config
            .load(path.as_ref())
            .map_err(|reason| GraphError::ConfigParse {
                file: source.clone(),
                reason,
            })?;
        Ok(Self { config, source })
    }

    pub fn from_string(content: &str) -> Result<Self, GraphError> {
        let source = "<string>".to_string();
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| GraphError::ConfigParse {
                file: source.clone(),
                reason,
            })?;
        Ok(Self { config, source })
    }

    /// Where the configuration was read from, for messages.
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, GraphError> {
        self.config
            .getint(section, key)
            .map_err(|e| GraphError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected an integer: {}", e),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn reads_sections_and_keys() {
        let adapter = FileConfigAdapter::from_string(
            "[feed]\nsymbol = EURUSD\nticks = data/ticks.csv\n[candles]\nwidth_ms = 60000\n",
        )
        .unwrap();
        assert_eq!(adapter.get_string("feed", "symbol").as_deref(), Some("EURUSD"));
        assert_eq!(adapter.get_string("feed", "ticks").as_deref(), Some("data/ticks.csv"));
        assert!(adapter.has("candles", "width_ms"));
        assert!(!adapter.has("candles", "height_ms"));
        assert_eq!(adapter.get_string("nowhere", "symbol"), None);
        assert_eq!(adapter.source(), "<string>");
    }

    #[test]
    fn integers_are_strict() {
        let adapter =
            FileConfigAdapter::from_string("[graph]\nmax_hops = 12\ncache_max_slots = many\n")
                .unwrap();
        assert_eq!(adapter.get_int("graph", "max_hops").unwrap(), Some(12));
        assert_eq!(adapter.get_int("graph", "history_max_size").unwrap(), None);

        let err = adapter.get_int("graph", "cache_max_slots").unwrap_err();
        assert!(matches!(
            err,
            GraphError::ConfigInvalid { ref section, ref key, .. }
                if section == "graph" && key == "cache_max_slots"
        ));
    }

    #[test]
    fn negative_integers_parse() {
        let adapter = FileConfigAdapter::from_string("[candles]\nwidth_ms = -5\n").unwrap();
        assert_eq!(adapter.get_int("candles", "width_ms").unwrap(), Some(-5));
    }

    #[test]
    fn loads_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "[feed]\nhistory = /data/candles.csv\n").unwrap();
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("feed", "history").as_deref(),
            Some("/data/candles.csv")
        );
        assert_eq!(adapter.source(), file.path().display().to_string());
    }

    #[test]
    fn missing_file_is_a_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/graph.ini");
        assert!(matches!(result, Err(GraphError::ConfigParse { ref file, .. }) if file.contains("graph.ini")));
    }
}
