use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use geo_types::Point;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use time::OffsetDateTime;

/// Coverage points never keep more than this many decimal digits worth of
/// precision (roughly 11m at the equator).
pub const MIN_COVERAGE_RESOLUTION: u32 = 4;
pub const DUPLICATE_THRESHOLD_DEGREES: f64 = 0.0001;
pub const DEFAULT_ANONYMIZED_TRACK_NAME: &str = "anonymized-track";
const CREATOR: &str = "gpx_tracker";

#[derive(Clone, Debug, PartialEq)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    /// `None` for anonymized points.
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, timestamp: DateTime<Utc>) -> Self {
        TrackPoint {
            latitude,
            longitude,
            altitude,
            timestamp: Some(timestamp),
        }
    }

    pub fn anonymized(latitude: f64, longitude: f64, altitude: f64) -> Self {
        TrackPoint {
            latitude,
            longitude,
            altitude,
            timestamp: None,
        }
    }

    fn to_waypoint(&self) -> Result<Waypoint> {
        let mut waypoint = Waypoint::new(Point::new(self.longitude, self.latitude));
        waypoint.elevation = Some(self.altitude);
        waypoint.time = match self.timestamp {
            Some(timestamp) => {
                let nanos = timestamp
                    .timestamp_nanos_opt()
                    .ok_or_else(|| anyhow!("timestamp out of range: {timestamp}"))?;
                Some(OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))?.into())
            }
            None => None,
        };
        Ok(waypoint)
    }

    pub fn from_waypoint(waypoint: &Waypoint) -> Result<Self> {
        let timestamp = match &waypoint.time {
            Some(time) => Some(DateTime::<Utc>::from(DateTime::parse_from_rfc3339(
                &time.format()?,
            )?)),
            None => None,
        };
        Ok(TrackPoint {
            latitude: waypoint.point().y(),
            longitude: waypoint.point().x(),
            altitude: waypoint.elevation.unwrap_or(0.0),
            timestamp,
        })
    }
}

/// Where track files live. Every write is a full load, mutate, save cycle,
/// so this is the only place that touches storage.
///
/// Nothing serializes two cycles on the same path: overlapping writers can
/// lose a point (last save wins).
pub trait TrackFileStore {
    /// Returns an empty document when nothing has been saved at `path` yet.
    fn load(&self, path: &Path) -> Result<Gpx>;
    fn save(&self, path: &Path, gpx: &Gpx) -> Result<()>;
}

pub fn empty_gpx() -> Gpx {
    let mut gpx: Gpx = Default::default();
    gpx.version = GpxVersion::Gpx11;
    gpx.creator = Some(CREATOR.to_string());
    gpx
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FsTrackFileStore;

impl TrackFileStore for FsTrackFileStore {
    fn load(&self, path: &Path) -> Result<Gpx> {
        if !path.exists() {
            return Ok(empty_gpx());
        }
        let file =
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mut gpx = gpx::read(BufReader::new(file))
            .with_context(|| format!("failed to parse {}", path.display()))?;
        // the writer only supports 1.1, older files get upgraded on save
        gpx.version = GpxVersion::Gpx11;
        Ok(gpx)
    }

    fn save(&self, path: &Path, gpx: &Gpx) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        gpx::write(gpx, &mut writer)
            .with_context(|| format!("failed to write {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }
}

pub fn get_or_create_track<'a>(gpx: &'a mut Gpx, track_name: &str) -> &'a mut Track {
    let index = match gpx
        .tracks
        .iter()
        .position(|track| track.name.as_deref() == Some(track_name))
    {
        Some(index) => index,
        None => {
            let mut track = Track::new();
            track.name = Some(track_name.to_string());
            gpx.tracks.push(track);
            gpx.tracks.len() - 1
        }
    };
    &mut gpx.tracks[index]
}

/// Only the first segment of a track is ever written to.
pub fn add_point_to_track(track: &mut Track, waypoint: Waypoint) {
    if track.segments.is_empty() {
        track.segments.push(TrackSegment::new());
    }
    track.segments[0].points.push(waypoint);
}

pub fn is_duplicate_point(gpx: &Gpx, latitude: f64, longitude: f64) -> bool {
    gpx.tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .any(|point| {
            let point = point.point();
            (point.y() - latitude).abs() < DUPLICATE_THRESHOLD_DEGREES
                && (point.x() - longitude).abs() < DUPLICATE_THRESHOLD_DEGREES
        })
}

pub fn effective_resolution(resolution: u32) -> u32 {
    if resolution < MIN_COVERAGE_RESOLUTION {
        warn!(
            "Resolution {resolution} is too low. Setting to minimum resolution of {MIN_COVERAGE_RESOLUTION}."
        );
        MIN_COVERAGE_RESOLUTION
    } else {
        resolution
    }
}

// Every finite f64 has at most this many digits after the decimal point.
const MAX_FRACTION_DIGITS: u32 = 1074;

/// Rounds the exact binary value to the nearest `resolution`-digit decimal.
/// Scaling by `10^resolution` first would round some inputs into the
/// neighbouring grid cell.
pub fn round_to_resolution(value: f64, resolution: u32) -> f64 {
    if !value.is_finite() || resolution >= MAX_FRACTION_DIGITS {
        return value;
    }
    format!("{value:.prec$}", prec = resolution as usize)
        .parse()
        .unwrap_or(value)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoverageOutcome {
    Saved,
    Duplicate,
}

pub struct TrackStore<S = FsTrackFileStore> {
    store: S,
}

impl Default for TrackStore<FsTrackFileStore> {
    fn default() -> Self {
        TrackStore::new(FsTrackFileStore)
    }
}

impl<S: TrackFileStore> TrackStore<S> {
    pub fn new(store: S) -> Self {
        TrackStore { store }
    }

    pub fn file_store(&self) -> &S {
        &self.store
    }

    /// Appends `point` to the track named `track_name` in `file_path`.
    /// Best effort: failures are logged and reported only as `false`.
    pub fn add_location(&self, point: &TrackPoint, track_name: &str, file_path: &Path) -> bool {
        match self.try_add_location(point, track_name, file_path) {
            Ok(()) => {
                debug!("Location saved to {}", file_path.display());
                true
            }
            Err(e) => {
                error!("Failed to add location to GPX: {e:#}");
                false
            }
        }
    }

    pub fn try_add_location(
        &self,
        point: &TrackPoint,
        track_name: &str,
        file_path: &Path,
    ) -> Result<()> {
        let mut gpx = self.store.load(file_path)?;
        self.append_and_save(&mut gpx, point, track_name, file_path)
    }

    fn append_and_save(
        &self,
        gpx: &mut Gpx,
        point: &TrackPoint,
        track_name: &str,
        file_path: &Path,
    ) -> Result<()> {
        let waypoint = point.to_waypoint()?;
        add_point_to_track(get_or_create_track(gpx, track_name), waypoint);
        self.store.save(file_path, gpx)
    }

    /// Coarsens the position, then appends it without a timestamp unless the
    /// file already holds a point close to it. Altitude is kept as is.
    /// Best effort: failures are logged and otherwise ignored.
    pub fn anonymize_and_save(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        file_path: &Path,
        track_name: Option<&str>,
        resolution: u32,
    ) {
        if let Err(e) = self.try_anonymize_and_save(
            latitude,
            longitude,
            altitude,
            file_path,
            track_name,
            resolution,
        ) {
            error!("Error during anonymization process: {e:#}");
        }
    }

    pub fn try_anonymize_and_save(
        &self,
        latitude: f64,
        longitude: f64,
        altitude: f64,
        file_path: &Path,
        track_name: Option<&str>,
        resolution: u32,
    ) -> Result<CoverageOutcome> {
        let resolution = effective_resolution(resolution);
        let latitude = round_to_resolution(latitude, resolution);
        let longitude = round_to_resolution(longitude, resolution);

        let mut gpx = self.store.load(file_path)?;
        if is_duplicate_point(&gpx, latitude, longitude) {
            return Ok(CoverageOutcome::Duplicate);
        }

        let point = TrackPoint::anonymized(latitude, longitude, altitude);
        let track_name = track_name.unwrap_or(DEFAULT_ANONYMIZED_TRACK_NAME);
        self.append_and_save(&mut gpx, &point, track_name, file_path)?;
        debug!("Anonymized location saved to {}", file_path.display());
        Ok(CoverageOutcome::Saved)
    }

    /// All points of `track_name` in file order, empty if the track does not
    /// exist.
    pub fn load_track_points(&self, file_path: &Path, track_name: &str) -> Result<Vec<TrackPoint>> {
        let gpx = self.store.load(file_path)?;
        gpx.tracks
            .iter()
            .filter(|track| track.name.as_deref() == Some(track_name))
            .take(1)
            .flat_map(|track| track.segments.iter())
            .flat_map(|segment| segment.points.iter())
            .map(TrackPoint::from_waypoint)
            .collect()
    }
}
