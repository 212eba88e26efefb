use crate::config::TrackerConfig;
use crate::position_event::{MeshPacket, Position};
use crate::track_store::{FsTrackFileStore, TrackFileStore, TrackPoint, TrackStore};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;

pub const PLUGIN_NAME: &str = "gpxtracker";
pub const GLOBAL_COVERAGE_TRACK_NAME: &str = "global_coverage";

/// What the relay host calls into. Handlers must not fail: a plugin error
/// would stall message processing for every other plugin.
pub trait MessagePlugin {
    fn plugin_name(&self) -> &'static str;

    fn handle_meshtastic_message(&self, packet: &Value);

    fn handle_room_message(&self, room_id: &str, full_message: &str);
}

pub struct GpxTrackerPlugin<S = FsTrackFileStore> {
    config: TrackerConfig,
    track_store: TrackStore<S>,
}

impl GpxTrackerPlugin<FsTrackFileStore> {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_store(config, FsTrackFileStore)
    }
}

impl<S: TrackFileStore> GpxTrackerPlugin<S> {
    pub fn with_store(config: TrackerConfig, store: S) -> Self {
        if config.allowed_device_ids.is_empty() {
            warn!("[CONFIG_WARNING] Allowed device IDs list is empty. No locations will be logged.");
        }
        if let Err(e) = std::fs::create_dir_all(&config.gpx_directory) {
            error!(
                "Failed to prepare GPX directory '{}': {e}",
                config.gpx_directory.display()
            );
        }
        GpxTrackerPlugin {
            config,
            track_store: TrackStore::new(store),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn track_store(&self) -> &TrackStore<S> {
        &self.track_store
    }

    /// Same as `handle_meshtastic_message` with an explicit clock. `now`
    /// picks today's track and stamps the per-device point.
    pub fn handle_packet_at(&self, packet: &Value, now: DateTime<Utc>) {
        let Some(packet) = MeshPacket::from_value(packet) else {
            return;
        };
        let Some(position) = packet.reportable_position() else {
            return;
        };
        if let Err(e) = self.record_position(&packet, position, now) {
            error!("Error handling Meshtastic message: {e:#}");
        }
    }

    fn record_position(
        &self,
        packet: &MeshPacket,
        position: &Position,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let report = packet.position_report(position)?;
        let track_name = now.format("%Y-%m-%d").to_string();

        if self.config.is_device_allowed(&report.device_id) {
            let file_path = self.config.device_file_path(&report.device_id);
            let point = TrackPoint::new(report.latitude, report.longitude, report.altitude, now);
            if self.track_store.add_location(&point, &track_name, &file_path) {
                info!(
                    "Processed data from Device={}: Latitude={}, Longitude={}, Altitude={}, track_name={}, Path={}",
                    report.device_id,
                    report.latitude,
                    report.longitude,
                    report.altitude,
                    track_name,
                    file_path.display()
                );
            }
        } else {
            debug!(
                "Device ID {} is not in the allowed list. Ignoring message.",
                report.device_id
            );
        }

        // independent of the allow-list
        if self.config.log_global_coverage {
            debug!("Coverage logging enabled. Anonymizing and saving location for global track.");
            self.track_store.anonymize_and_save(
                report.latitude,
                report.longitude,
                report.altitude,
                &self.config.coverage_file_path(),
                Some(GLOBAL_COVERAGE_TRACK_NAME),
                self.config.coverage_resolution,
            );
        }
        Ok(())
    }
}

impl<S: TrackFileStore> MessagePlugin for GpxTrackerPlugin<S> {
    fn plugin_name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn handle_meshtastic_message(&self, packet: &Value) {
        self.handle_packet_at(packet, Utc::now());
    }

    fn handle_room_message(&self, _room_id: &str, _full_message: &str) {}
}
