//! Symbol universe for the blotter: the configured default set plus the
//! filesystem-backed hot-reload file, grounded on
//! `original_source/services/blotter/service.py` (`SymbolConfig`,
//! `_load_symbols_from_file`, `_sync_symbols`).

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolSpec {
    pub symbol: String,
    pub exchange: String,
    pub currency: String,
    pub sec_type: String,
    pub primary_exchange: Option<String>,
}

impl SymbolSpec {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            exchange: "SMART".to_string(),
            currency: "USD".to_string(),
            sec_type: "STK".to_string(),
            primary_exchange: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SymbolFileEntry {
    Bare(String),
    Detailed {
        symbol: String,
        #[serde(default)]
        exchange: Option<String>,
        #[serde(default)]
        currency: Option<String>,
        #[serde(default, rename = "secType")]
        sec_type: Option<String>,
        #[serde(default, rename = "primaryExchange")]
        primary_exchange: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SymbolFileShape {
    List(Vec<SymbolFileEntry>),
    Wrapped { symbols: Vec<SymbolFileEntry> },
}

/// Polls `path`'s mtime and re-parses its JSON content when it changes.
/// Malformed content is logged and the previous symbol set is kept — this
/// is a "Configuration" error per SPEC_FULL.md §7, never fatal.
pub struct SymbolFileWatcher {
    path: PathBuf,
    last_mtime: Option<SystemTime>,
    defaults: SymbolSpec,
}

impl SymbolFileWatcher {
    pub fn new(path: impl Into<PathBuf>, defaults: SymbolSpec) -> Self {
        Self {
            path: path.into(),
            last_mtime: None,
            defaults,
        }
    }

    /// Returns `Some(new_set)` if the file's mtime advanced since the last
    /// poll and it parsed to a non-empty symbol list; `None` otherwise
    /// (file missing, unchanged, empty, or malformed).
    pub fn poll(&mut self) -> Option<Vec<SymbolSpec>> {
        let mtime = match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(_) => return None,
        };
        let changed = self.last_mtime.map(|prev| mtime > prev).unwrap_or(true);
        if !changed {
            return None;
        }
        self.last_mtime = Some(mtime);

        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "unable to read symbol file");
                return None;
            }
        };
        if raw.trim().is_empty() {
            return None;
        }
        parse_symbol_file(&raw, &self.defaults)
            .map_err(|err| error!(path = %self.path.display(), %err, "invalid symbol file"))
            .ok()
            .flatten()
    }
}

fn parse_symbol_file(raw: &str, defaults: &SymbolSpec) -> anyhow::Result<Option<Vec<SymbolSpec>>> {
    let shape: SymbolFileShape = serde_json::from_str(raw)?;
    let entries = match shape {
        SymbolFileShape::List(entries) => entries,
        SymbolFileShape::Wrapped { symbols } => symbols,
    };

    let mut seen = std::collections::HashSet::new();
    let mut result = Vec::new();
    for entry in entries {
        let spec = match entry {
            SymbolFileEntry::Bare(symbol) => {
                let symbol = symbol.trim().to_uppercase();
                if symbol.is_empty() {
                    continue;
                }
                SymbolSpec::new(symbol)
            }
            SymbolFileEntry::Detailed {
                symbol,
                exchange,
                currency,
                sec_type,
                primary_exchange,
            } => {
                let symbol = symbol.trim().to_uppercase();
                if symbol.is_empty() {
                    continue;
                }
                SymbolSpec {
                    symbol,
                    exchange: exchange.unwrap_or_else(|| defaults.exchange.clone()),
                    currency: currency.unwrap_or_else(|| defaults.currency.clone()),
                    sec_type: sec_type.unwrap_or_else(|| defaults.sec_type.clone()),
                    primary_exchange: primary_exchange.or_else(|| defaults.primary_exchange.clone()),
                }
            }
        };
        if seen.insert(spec.symbol.clone()) {
            result.push(spec);
        }
    }

    if result.is_empty() {
        debug!("symbol file parsed to an empty set; keeping current symbols");
        Ok(None)
    } else {
        Ok(Some(result))
    }
}

/// A symbol set diff: what to subscribe to and what to drop.
pub struct SymbolDiff {
    pub to_add: Vec<SymbolSpec>,
    pub to_remove: Vec<String>,
}

pub fn diff_symbols(current: &[SymbolSpec], desired: &[SymbolSpec]) -> SymbolDiff {
    let desired_names: std::collections::HashSet<&str> = desired.iter().map(|s| s.symbol.as_str()).collect();
    let current_names: std::collections::HashSet<&str> = current.iter().map(|s| s.symbol.as_str()).collect();

    let to_add = desired
        .iter()
        .filter(|s| !current_names.contains(s.symbol.as_str()))
        .cloned()
        .collect();
    let to_remove = current
        .iter()
        .filter(|s| !desired_names.contains(s.symbol.as_str()))
        .map(|s| s.symbol.clone())
        .collect();

    SymbolDiff { to_add, to_remove }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn defaults() -> SymbolSpec {
        SymbolSpec::new("AAPL")
    }

    #[test]
    fn bare_string_list_parses() {
        let result = parse_symbol_file(r#"["aapl", "msft"]"#, &defaults()).unwrap().unwrap();
        assert_eq!(result.iter().map(|s| s.symbol.as_str()).collect::<Vec<_>>(), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn detailed_object_list_parses_with_field_defaults() {
        let result = parse_symbol_file(
            r#"[{"symbol": "tsla", "exchange": "NASDAQ"}]"#,
            &defaults(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(result[0].symbol, "TSLA");
        assert_eq!(result[0].exchange, "NASDAQ");
        assert_eq!(result[0].currency, "USD");
    }

    #[test]
    fn duplicate_symbols_are_deduped_keeping_first() {
        let result = parse_symbol_file(r#"["aapl", "AAPL"]"#, &defaults()).unwrap().unwrap();
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse_symbol_file("not json", &defaults()).is_err());
    }

    #[test]
    fn empty_list_yields_none() {
        assert!(parse_symbol_file("[]", &defaults()).unwrap().is_none());
    }

    #[test]
    fn watcher_only_reparses_on_mtime_change() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"["aapl"]"#).unwrap();
        let mut watcher = SymbolFileWatcher::new(file.path(), defaults());
        let first = watcher.poll();
        assert!(first.is_some());
        let second = watcher.poll();
        assert!(second.is_none(), "unchanged mtime should not reparse");
    }

    #[test]
    fn diff_reports_additions_and_removals() {
        let current = vec![SymbolSpec::new("AAPL"), SymbolSpec::new("MSFT")];
        let desired = vec![SymbolSpec::new("MSFT"), SymbolSpec::new("TSLA")];
        let diff = diff_symbols(&current, &desired);
        assert_eq!(diff.to_add.iter().map(|s| s.symbol.as_str()).collect::<Vec<_>>(), vec!["TSLA"]);
        assert_eq!(diff.to_remove, vec!["AAPL".to_string()]);
    }
}
