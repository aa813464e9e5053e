//! Off-thread CSV tick recorder, grounded on
//! `original_source/services/blotter/service.py` (`_enqueue_record`,
//! `_record_worker`, `_append_record`): one row per tick, one file per
//! symbol per day, written from a dedicated blocking task so a slow disk
//! never stalls the hot path.

use std::io::Write;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use crate::models::Tick;

struct Record {
    symbol: String,
    ts: DateTime<Utc>,
    mid: f64,
    spread_bp: f64,
    imb: f64,
    features: Vec<f64>,
}

/// Queues ticks for CSV recording and drains them on a blocking task.
/// Writer errors are logged and dropped; they never propagate to the
/// blotter's hot path.
pub struct TickRecorder {
    tx: mpsc::UnboundedSender<Record>,
}

impl TickRecorder {
    /// Spawns the writer task rooted at `root`. `root` is created lazily on
    /// first write.
    pub fn spawn(root: PathBuf) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Record>();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                let root = root.clone();
                let result = tokio::task::spawn_blocking(move || append_record(&root, &record)).await;
                if let Ok(Err(err)) = result {
                    warn!(%err, "failed to write recorded tick");
                }
            }
        });
        Self { tx }
    }

    /// Enqueues `tick` for recording under `symbol`. A full or closed queue
    /// (writer task gone) is logged and dropped, never blocking the caller.
    pub fn record(&self, symbol: &str, tick: &Tick) {
        let record = Record {
            symbol: symbol.to_string(),
            ts: tick.ts,
            mid: tick.mid,
            spread_bp: tick.spread_bp,
            imb: tick.imb,
            features: tick.features.clone(),
        };
        if self.tx.send(record).is_err() {
            warn!(symbol, "tick recorder queue closed; dropping record");
        }
    }
}

fn append_record(root: &std::path::Path, record: &Record) -> anyhow::Result<()> {
    std::fs::create_dir_all(root)?;
    let day = record.ts.format("%Y-%m-%d");
    let path = root.join(format!("{}_{day}.csv", record.symbol));
    let write_header = !path.exists();

    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    if write_header {
        writeln!(file, "ts,mid,spreadBp,imb,features")?;
    }
    let features = record
        .features
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(";");
    writeln!(
        file,
        "{},{},{},{},{}",
        record.ts.to_rfc3339(),
        record.mid,
        record.spread_bp,
        record.imb,
        features
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tick;

    fn sample_tick() -> Tick {
        Tick {
            symbol: "AAPL".to_string(),
            ts: Utc::now(),
            mid: 100.0,
            spread_bp: 5.0,
            imb: 0.1,
            depth: None,
            trades: None,
            features: vec![0.1, 0.2, 0.3],
        }
    }

    #[tokio::test]
    async fn records_a_row_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = TickRecorder::spawn(dir.path().to_path_buf());
        let tick = sample_tick();
        recorder.record("AAPL", &tick);
        drop(recorder);
        // give the spawned writer task a chance to drain the queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let day = tick.ts.format("%Y-%m-%d");
        let path = dir.path().join(format!("AAPL_{day}.csv"));
        let contents = std::fs::read_to_string(path).unwrap();
        assert!(contents.starts_with("ts,mid,spreadBp,imb,features\n"));
        assert!(contents.contains("0.1;0.2;0.3"));
    }
}
