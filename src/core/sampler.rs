//! The fixed-rate power sampling loop.
//!
//! Pulls raw sample blocks from the supply driver, stride-decimates them, and
//! persists a durable time series with a recorded start-time anchor. The
//! driver's sampling mode is always stopped and the output closed on loop
//! exit, whether the loop ended by duration, interrupt, or error.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use arrow::array::Float64Array;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use parquet::format::KeyValue;

use crate::error::{Result, RigError};
use crate::hw::supply::{SampleBlock, SupplySession, MAX_SAMPLES_PER_POLL};
use crate::sync::anchor;

/// Upper bound on the decimation stride: the block size the driver returns
/// per poll.
pub const MAX_GRANULARITY: usize = MAX_SAMPLES_PER_POLL;

/// Buffered parquet rows are flushed every this many appended blocks.
const PARQUET_FLUSH_BATCHES: usize = 50;

/// Parquet file-level metadata key carrying the sampling-start anchor.
pub const START_TIME_METADATA_KEY: &str = "start_time";

/// Durable output encodings for the sample series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "csv" => Ok(OutputFormat::Csv),
            "parquet" => Ok(OutputFormat::Parquet),
            other => Err(RigError::config(format!("unknown output format '{other}'"))),
        }
    }
}

/// Parameters of one `collect` invocation.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Optional bound on total collection time; `None` runs until interrupt.
    pub duration: Option<Duration>,
    /// Decimation stride: keep every g-th row. 1 keeps everything.
    pub granularity: usize,
    /// Optional sleep between polls, for rate control.
    pub throttle: Duration,
}

impl CollectConfig {
    pub fn new(output: PathBuf, format: OutputFormat) -> Self {
        Self {
            output,
            format,
            duration: None,
            granularity: 1,
            throttle: Duration::ZERO,
        }
    }

    /// Preconditions are validated before any actuation.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_GRANULARITY).contains(&self.granularity) {
            return Err(RigError::InvalidGranularity(self.granularity));
        }
        let extension = self
            .output
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if extension != self.format.extension() {
            return Err(RigError::FormatMismatch {
                format: self.format.to_string(),
                path: self.output.display().to_string(),
            });
        }
        Ok(())
    }
}

/// Keep every `stride`-th row of a raw block. Pure decimation: no averaging,
/// no reordering. Output columns are fixed as (timestamp, current, voltage).
pub(crate) fn decimate(block: &SampleBlock, stride: usize) -> Vec<[f64; 3]> {
    (0..block.len())
        .step_by(stride)
        .map(|i| [block.timestamp[i], block.current_ma[i], block.voltage_v[i]])
        .collect()
}

enum SeriesWriter {
    Csv(csv::Writer<File>),
    Parquet {
        writer: ArrowWriter<File>,
        buffer: Vec<[f64; 3]>,
        blocks_buffered: usize,
    },
}

impl SeriesWriter {
    fn create(config: &CollectConfig, start_time: f64) -> Result<Self> {
        match config.format {
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(File::create(&config.output)?);
                writer.write_record(["timestamp", "current", "voltage"])?;
                Ok(SeriesWriter::Csv(writer))
            }
            OutputFormat::Parquet => {
                // the anchor rides as file metadata rather than a column, so
                // a constant is not repeated per row
                let properties = WriterProperties::builder()
                    .set_key_value_metadata(Some(vec![KeyValue::new(
                        START_TIME_METADATA_KEY.to_string(),
                        anchor::format_anchor(start_time),
                    )]))
                    .build();
                let writer = ArrowWriter::try_new(
                    File::create(&config.output)?,
                    Self::schema(),
                    Some(properties),
                )?;
                Ok(SeriesWriter::Parquet {
                    writer,
                    buffer: Vec::new(),
                    blocks_buffered: 0,
                })
            }
        }
    }

    fn schema() -> std::sync::Arc<Schema> {
        std::sync::Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Float64, false),
            Field::new("current", DataType::Float64, false),
            Field::new("voltage", DataType::Float64, false),
        ]))
    }

    fn append(&mut self, rows: &[[f64; 3]]) -> Result<()> {
        match self {
            SeriesWriter::Csv(writer) => {
                for row in rows {
                    writer.write_record([
                        row[0].to_string(),
                        row[1].to_string(),
                        row[2].to_string(),
                    ])?;
                }
                return Ok(());
            }
            SeriesWriter::Parquet {
                buffer,
                blocks_buffered,
                ..
            } => {
                buffer.extend_from_slice(rows);
                *blocks_buffered += 1;
                if *blocks_buffered < PARQUET_FLUSH_BATCHES {
                    return Ok(());
                }
            }
        }
        self.flush_parquet()
    }

    fn flush_parquet(&mut self) -> Result<()> {
        let SeriesWriter::Parquet {
            writer,
            buffer,
            blocks_buffered,
        } = self
        else {
            return Ok(());
        };
        if buffer.is_empty() {
            *blocks_buffered = 0;
            return Ok(());
        }
        let batch = RecordBatch::try_new(
            Self::schema(),
            vec![
                Arc::new(Float64Array::from_iter_values(
                    buffer.iter().map(|row| row[0]),
                )),
                Arc::new(Float64Array::from_iter_values(
                    buffer.iter().map(|row| row[1]),
                )),
                Arc::new(Float64Array::from_iter_values(
                    buffer.iter().map(|row| row[2]),
                )),
            ],
        )?;
        writer.write(&batch)?;
        buffer.clear();
        *blocks_buffered = 0;
        Ok(())
    }

    /// Flush anything buffered and close the file. Runs on every exit path.
    fn finish(mut self) -> Result<()> {
        self.flush_parquet()?;
        match self {
            SeriesWriter::Csv(mut writer) => {
                writer.flush()?;
                Ok(())
            }
            SeriesWriter::Parquet { writer, .. } => {
                writer.close()?;
                Ok(())
            }
        }
    }
}

/// The sampling loop over one open supply session.
pub struct SampleEngine<'a> {
    session: &'a mut dyn SupplySession,
}

impl<'a> SampleEngine<'a> {
    pub fn new(session: &'a mut dyn SupplySession) -> Self {
        Self { session }
    }

    /// Run the collection loop. Returns the sampling-start anchor.
    ///
    /// `stop` is the external clean-stop signal (ctrl-c); raising it flushes
    /// buffers and closes the output like a normal end of run.
    pub fn collect(&mut self, config: &CollectConfig, stop: &AtomicBool) -> Result<f64> {
        config.validate()?;

        // measurements are never appended across invocations
        if config.output.exists() {
            fs::remove_file(&config.output)?;
        }

        // report only the two channels this loop needs
        self.session.select_main_channels()?;

        let start_time = self.session.start_sampling()?;

        // csv output carries the anchor as a sibling file; parquet embeds it
        // as file metadata inside the writer below
        if config.format == OutputFormat::Csv {
            let batch_dir = config
                .output
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            anchor::write_anchor(&batch_dir, start_time)?;
        }

        let mut writer = match SeriesWriter::create(config, start_time) {
            Ok(writer) => writer,
            Err(e) => {
                // the driver must not be left in sampling mode
                let _ = self.session.stop_sampling();
                return Err(e);
            }
        };

        let started = Instant::now();
        let loop_result = loop {
            if stop.load(Ordering::Relaxed) {
                log::info!("Collecting measurements was interrupted.");
                break Ok(());
            }
            if let Some(duration) = config.duration {
                if started.elapsed() >= duration {
                    break Ok(());
                }
            }

            let block = match self.session.read_block(MAX_SAMPLES_PER_POLL) {
                Ok(block) => block,
                Err(e) => break Err(e),
            };
            let rows = decimate(&block, config.granularity);
            if let Err(e) = writer.append(&rows) {
                break Err(e);
            }

            if !config.throttle.is_zero() {
                thread::sleep(config.throttle);
            }
        };

        // stop sampling and close the output on every exit path
        let stop_result = self.session.stop_sampling();
        let close_result = writer.finish();

        loop_result.and(stop_result).and(close_result)?;
        Ok(start_time)
    }
}

/// Install a ctrl-c handler that raises the engine's clean-stop flag.
pub fn install_interrupt_flag() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .map_err(|e| RigError::config(format!("failed to install interrupt handler: {e}")))?;
    Ok(flag)
}
