use std::fs::File;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use railbench::core::sampler::{
    CollectConfig, OutputFormat, SampleEngine, START_TIME_METADATA_KEY,
};
use railbench::error::Result;
use railbench::hw::{SampleBlock, SupplySession};
use railbench::sync::anchor;

use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;

/// Serves fixed 10-sample blocks, then raises the stop flag to end the run.
struct ScriptedSession {
    stop: Arc<AtomicBool>,
    blocks_to_serve: usize,
    served: usize,
    stopped: bool,
    anchor: f64,
}

impl ScriptedSession {
    fn new(stop: Arc<AtomicBool>, blocks_to_serve: usize, anchor: f64) -> Self {
        Self {
            stop,
            blocks_to_serve,
            served: 0,
            stopped: false,
            anchor,
        }
    }
}

impl SupplySession for ScriptedSession {
    fn set_voltage(&mut self, _volts: f64) -> Result<()> {
        Ok(())
    }

    fn select_main_channels(&mut self) -> Result<()> {
        Ok(())
    }

    fn start_sampling(&mut self) -> Result<f64> {
        Ok(self.anchor)
    }

    fn read_block(&mut self, _max_samples: usize) -> Result<SampleBlock> {
        let mut block = SampleBlock::default();
        for i in 0..10 {
            let n = (self.served * 10 + i) as f64;
            block.timestamp.push(n / 5_000.0);
            block.current_ma.push(n);
            block.voltage_v.push(4.2);
        }
        self.served += 1;
        if self.served >= self.blocks_to_serve {
            self.stop.store(true, Ordering::Relaxed);
        }
        Ok(block)
    }

    fn stop_sampling(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}

#[test]
fn test_csv_collection_decimates_and_writes_anchor() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("measurements.csv");
    let stop = Arc::new(AtomicBool::new(false));
    let mut session = ScriptedSession::new(Arc::clone(&stop), 2, 1_720_000_000.125);

    let mut config = CollectConfig::new(output.clone(), OutputFormat::Csv);
    config.granularity = 3;

    let start_time = SampleEngine::new(&mut session).collect(&config, &stop).unwrap();
    assert_eq!(start_time, 1_720_000_000.125);
    assert!(session.stopped);

    // 2 blocks of 10 samples at stride 3 keep ceil(10/3) = 4 rows each
    let contents = std::fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "timestamp,current,voltage");
    assert_eq!(lines.len(), 1 + 8);
    assert!(lines[1].starts_with("0,0,"));

    // the anchor beside the output matches the returned start time exactly
    let anchor_text =
        std::fs::read_to_string(dir.path().join(anchor::ANCHOR_FILENAME)).unwrap();
    assert_eq!(anchor_text, anchor::format_anchor(start_time));
    assert_eq!(anchor::read_anchor(dir.path()).unwrap(), start_time);
}

#[test]
fn test_parquet_collection_embeds_start_time_metadata() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("measurements.parquet");
    let stop = Arc::new(AtomicBool::new(false));
    let mut session = ScriptedSession::new(Arc::clone(&stop), 3, 42.5);

    let config = CollectConfig::new(output.clone(), OutputFormat::Parquet);
    SampleEngine::new(&mut session).collect(&config, &stop).unwrap();

    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&output).unwrap()).unwrap();
    let metadata = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .expect("file-level metadata present")
        .clone();
    let start_time = metadata
        .iter()
        .find(|kv| kv.key == START_TIME_METADATA_KEY)
        .expect("start_time key present");
    assert_eq!(start_time.value.as_deref(), Some("42.5"));

    let rows: usize = builder
        .build()
        .unwrap()
        .map(|batch| batch.unwrap().num_rows())
        .sum();
    assert_eq!(rows, 30);

    // parquet runs carry the anchor inside the file, not beside it
    assert!(!dir.path().join(anchor::ANCHOR_FILENAME).exists());
}

#[test]
fn test_preset_stop_flag_produces_an_empty_but_valid_output() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("measurements.csv");
    let stop = Arc::new(AtomicBool::new(true));
    let mut session = ScriptedSession::new(Arc::clone(&stop), 100, 7.0);

    let config = CollectConfig::new(output.clone(), OutputFormat::Csv);
    SampleEngine::new(&mut session).collect(&config, &stop).unwrap();

    assert!(session.stopped);
    assert_eq!(session.served, 0);
    let contents = std::fs::read_to_string(&output).unwrap();
    assert_eq!(contents.lines().count(), 1);
}

#[test]
fn test_collection_replaces_a_previous_output_file() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("measurements.csv");
    std::fs::write(&output, "stale data from a previous run").unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let mut session = ScriptedSession::new(Arc::clone(&stop), 1, 1.0);
    let config = CollectConfig::new(output.clone(), OutputFormat::Csv);
    SampleEngine::new(&mut session).collect(&config, &stop).unwrap();

    let contents = std::fs::read_to_string(&output).unwrap();
    assert!(!contents.contains("stale"));
    assert_eq!(contents.lines().count(), 1 + 10);
}
