use anyhow::Result;
use gpx::Gpx;
use gpx_tracker::track_store::{FsTrackFileStore, TrackFileStore};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};

/// Filesystem store that remembers every path it saved to.
#[derive(Default)]
pub struct RecordingStore {
    inner: FsTrackFileStore,
    saves: Mutex<Vec<PathBuf>>,
}

impl RecordingStore {
    pub fn saves(&self) -> Vec<PathBuf> {
        self.saves.lock().unwrap().clone()
    }

    pub fn saves_to(&self, path: &Path) -> usize {
        self.saves.lock().unwrap().iter().filter(|p| *p == path).count()
    }
}

impl TrackFileStore for RecordingStore {
    fn load(&self, path: &Path) -> Result<Gpx> {
        self.inner.load(path)
    }

    fn save(&self, path: &Path, gpx: &Gpx) -> Result<()> {
        self.saves.lock().unwrap().push(path.to_path_buf());
        self.inner.save(path, gpx)
    }
}

pub fn point_count(gpx: &Gpx) -> usize {
    gpx.tracks
        .iter()
        .flat_map(|t| t.segments.iter())
        .map(|s| s.points.len())
        .sum()
}

thread_local! {
    // tests run on their own threads, so records never mix between tests
    static LOG_RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct CapturingLogger;

impl Log for CapturingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        LOG_RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger;
static LOGGER_INIT: Once = Once::new();

/// Runs `f` and returns what it logged on the current thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
    LOGGER_INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(LevelFilter::Trace);
    });
    LOG_RECORDS.with(|records| records.borrow_mut().clear());
    let result = f();
    let records = LOG_RECORDS.with(|records| records.borrow_mut().drain(..).collect());
    (result, records)
}

pub fn count_level(records: &[(Level, String)], level: Level) -> usize {
    records.iter().filter(|(l, _)| *l == level).count()
}
