//! File and in-memory persistence sinks

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use super::{PersistenceSink, SessionTarget, SinkError, SinkFormat};
use crate::types::{Channel, Record, RECORD_FIELD_COUNT};

const TIME_LABEL: &str = "Time[ms]";

/// Shortest round-trip form, always with a decimal point for integral values.
///
/// Exponents carry an explicit sign and at least two digits (`1e+16`,
/// `1.5e-05`) and NaN is written `nan`, matching files produced by the
/// earlier recorder scripts.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let repr = format!("{value:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

fn spaces(out: &mut String, width: usize) {
    out.extend(std::iter::repeat(' ').take(width));
}

/// Header line (without terminator) for a layout.
pub(crate) fn header_line(format: SinkFormat) -> String {
    let labels = std::iter::once(TIME_LABEL).chain(Channel::ALL.iter().map(|c| c.label()));
    let separator = match format {
        SinkFormat::Csv => ",",
        SinkFormat::Text => ",  ",
    };
    labels.collect::<Vec<_>>().join(separator)
}

/// One data line (without terminator) for a layout.
pub(crate) fn record_line(record: &Record, format: SinkFormat) -> String {
    let values = record.fields().map(format_value);
    match format {
        SinkFormat::Csv => values.join(","),
        SinkFormat::Text => aligned_line(&values),
    }
}

/// Pads after each value so every column starts at a fixed offset: 14 for
/// pressure1, then 19 apart.
fn aligned_line(values: &[String; RECORD_FIELD_COUNT]) -> String {
    let mut out = String::with_capacity(200);
    out.push_str(&values[0]);
    out.push_str(", ");
    spaces(&mut out, 14_usize.saturating_sub(values[0].len() + 2));
    out.push_str(&values[1]);
    out.push(',');
    for i in 1..=8 {
        spaces(&mut out, 20_usize.saturating_sub(values[i].len() + 2));
        out.push_str(&values[i + 1]);
        out.push(',');
    }
    spaces(&mut out, 14_usize.saturating_sub(values[9].len() + 2));
    out.push_str(&values[10]);
    out
}

// ============================================================================
// FileSink
// ============================================================================

/// Buffered session file writer.
///
/// The header is written on open; each record becomes one line. Data reaches
/// the OS on [`flush`](PersistenceSink::flush) and on close.
pub struct FileSink {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    format: SinkFormat,
    records_written: u64,
}

impl FileSink {
    /// Create the session file, its parent directory and the header.
    ///
    /// Fails with [`SinkError::AlreadyExists`] if the file exists and the
    /// target does not allow overwriting.
    pub fn open(target: &SessionTarget) -> Result<Self, SinkError> {
        if let Some(parent) = target.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if target.overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let file = options.open(&target.path).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => SinkError::AlreadyExists(target.path.clone()),
            _ => SinkError::Io(e),
        })?;

        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", header_line(target.format))?;
        writer.flush()?;

        tracing::info!(path = %target.path.display(), format = %target.format, "Session file opened");

        Ok(Self {
            writer: Some(writer),
            path: target.path.clone(),
            format: target.format,
            records_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SinkFormat {
        self.format
    }
}

impl PersistenceSink for FileSink {
    fn write(&mut self, record: &Record) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writeln!(writer, "{}", record_line(record, self.format))?;
        self.records_written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.flush()?;
        writer.get_ref().sync_all()?;
        tracing::info!(
            path = %self.path.display(),
            records = self.records_written,
            "Session file closed"
        );
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.records_written
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.path.display(), self.format)
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writer.flush() {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to flush session file on drop");
            }
        }
    }
}

// ============================================================================
// InMemorySink
// ============================================================================

/// Keeps records in shared memory.
///
/// Clones share state, so a test can keep one clone while the driver owns
/// another. [`failing_after`](InMemorySink::failing_after) injects a write
/// failure once a number of records has been accepted.
#[derive(Clone, Default)]
pub struct InMemorySink {
    state: Arc<Mutex<MemoryState>>,
    fail_after: Option<u64>,
}

#[derive(Default)]
struct MemoryState {
    records: Vec<Record>,
    closed: bool,
    flushes: u64,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `n` records, then fail every further write.
    pub fn failing_after(n: u64) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of everything written so far.
    pub fn records(&self) -> Vec<Record> {
        self.state().records.clone()
    }

    pub fn flush_count(&self) -> u64 {
        self.state().flushes
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl PersistenceSink for InMemorySink {
    fn write(&mut self, record: &Record) -> Result<(), SinkError> {
        let fail_after = self.fail_after;
        let mut state = self.state();
        if state.closed {
            return Err(SinkError::Closed);
        }
        if fail_after.is_some_and(|n| state.records.len() as u64 >= n) {
            return Err(SinkError::Io(std::io::Error::other("injected write failure")));
        }
        state.records.push(*record);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        let mut state = self.state();
        if state.closed {
            return Err(SinkError::Closed);
        }
        state.flushes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.state().closed = true;
        Ok(())
    }

    fn records_written(&self) -> u64 {
        self.state().records.len() as u64
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: f64) -> Record {
        Record::from_fields([t, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 0.5, 0.25])
    }

    #[test]
    fn test_csv_header_and_values() {
        assert_eq!(
            header_line(SinkFormat::Csv),
            "Time[ms],Pressure1[kPa],Pressure2[kPa],Pressure3[kPa],Pressure4[kPa],\
             Pressure5[kPa],Pressure6[kPa],Pressure7[kPa],Pressure8[kPa],FSR_L,FSR_R"
        );
        assert_eq!(
            record_line(&sample(12.0), SinkFormat::Csv),
            "12.0,1.0,2.0,3.0,4.0,5.0,6.0,7.0,8.0,0.5,0.25"
        );
    }

    #[test]
    fn test_value_exponent_and_nan_form() {
        assert_eq!(format_value(1e16), "1e+16");
        assert_eq!(format_value(1.5e-5), "1.5e-05");
        assert_eq!(format_value(-2.5e-120), "-2.5e-120");
        assert_eq!(format_value(1.0e300), "1e+300");
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(f64::NAN), "nan");
        assert_eq!(format_value(f64::NEG_INFINITY), "-inf");

        // Exponent forms still read back through the parser
        let mut record = sample(3.0);
        record.pressure[0] = 1e16;
        record.fsr_left = 1.5e-5;
        let line = record_line(&record, SinkFormat::Text);
        assert!(line.contains("1e+16,"));
        assert_eq!(crate::acquisition::parse_line(&line).unwrap(), record);
    }

    #[test]
    fn test_text_header() {
        let header = header_line(SinkFormat::Text);
        assert!(header.starts_with("Time[ms],  Pressure1[kPa],  Pressure2[kPa]"));
        assert!(header.ends_with("Pressure8[kPa],  FSR_L,  FSR_R"));
    }

    #[test]
    fn test_text_columns_line_up() {
        let short = record_line(&sample(12.0), SinkFormat::Text);
        let mut wide = sample(123_456.5);
        wide.pressure[0] = -1234.125;
        let wide = record_line(&wide, SinkFormat::Text);

        assert!(short.starts_with("12.0,         1.0,               2.0,"));
        assert!(short.ends_with("8.0,               0.5,         0.25"));

        // Value start offsets are independent of the previous value's width
        let starts = |line: &str| -> Vec<usize> {
            let mut out = vec![0];
            let bytes = line.as_bytes();
            for i in 1..bytes.len() {
                if bytes[i] != b' ' && bytes[i] != b',' && (bytes[i - 1] == b' ') {
                    out.push(i);
                }
            }
            out
        };
        assert_eq!(starts(&short), starts(&wide));
        assert_eq!(starts(&short)[1], 14);
        assert_eq!(starts(&short)[2], 33);
    }

    #[test]
    fn test_file_sink_writes_header_then_records() {
        let dir = tempfile::tempdir().unwrap();
        let target = SessionTarget::new(dir.path().join("nested/session.csv"), SinkFormat::Csv);

        let mut sink = FileSink::open(&target).unwrap();
        sink.write(&sample(1.0)).unwrap();
        sink.write(&sample(2.0)).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.records_written(), 2);
        sink.close().unwrap();

        let contents = std::fs::read_to_string(&target.path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Time[ms],"));
        assert!(lines[2].starts_with("2.0,"));
    }

    #[test]
    fn test_file_sink_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let target = SessionTarget::new(dir.path().join("s.csv"), SinkFormat::Csv);
        let mut sink = FileSink::open(&target).unwrap();
        sink.close().unwrap();
        sink.close().unwrap();

        assert!(matches!(sink.write(&sample(1.0)), Err(SinkError::Closed)));
        assert!(matches!(sink.flush(), Err(SinkError::Closed)));
    }

    #[test]
    fn test_file_sink_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.csv");
        std::fs::write(&path, "precious\n").unwrap();

        let target = SessionTarget::new(&path, SinkFormat::Csv);
        assert!(matches!(FileSink::open(&target), Err(SinkError::AlreadyExists(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "precious\n");

        let mut sink = FileSink::open(&target.with_overwrite(true)).unwrap();
        sink.close().unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().starts_with("Time[ms]"));
    }

    #[test]
    fn test_in_memory_sink_shares_records_between_clones() {
        let observer = InMemorySink::new();
        let mut sink = observer.clone();
        sink.write(&sample(1.0)).unwrap();
        assert_eq!(observer.records(), vec![sample(1.0)]);

        sink.close().unwrap();
        assert!(observer.is_closed());
        assert!(matches!(sink.write(&sample(2.0)), Err(SinkError::Closed)));
    }

    #[test]
    fn test_in_memory_sink_injected_failure() {
        let mut sink = InMemorySink::failing_after(1);
        sink.write(&sample(1.0)).unwrap();
        assert!(matches!(sink.write(&sample(2.0)), Err(SinkError::Io(_))));
        assert_eq!(sink.records_written(), 1);
    }
}
