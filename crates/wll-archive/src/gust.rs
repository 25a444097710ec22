//! Wind gust aggregation over an archive period
//!
//! The WLL reports gusts only over short rolling windows. Every loop record
//! instead carries the maximum instantaneous wind seen since the last
//! archive boundary, merged into the gust fields of its wind mapping.

use tracing::{debug, info, warn};
use wll_core::Record;
use wll_mapping::WindTargets;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GustMax {
    pub speed: f64,
    pub dir: Option<f64>,
}

#[derive(Debug, Clone)]
struct GustState {
    targets: WindTargets,
    max: Option<GustMax>,
}

/// Running per-period maximum for each wind mapping
#[derive(Debug, Clone)]
pub struct WindGustAggregator {
    quads: Vec<GustState>,
    log_success: bool,
    log_failure: bool,
}

impl WindGustAggregator {
    pub fn new(targets: Vec<WindTargets>, log_success: bool, log_failure: bool) -> Self {
        if targets.is_empty() {
            if log_failure {
                warn!("No wind mappings available; gust aggregation disabled");
            }
        } else if log_success {
            info!("Aggregating gusts for {} wind mappings", targets.len());
        }

        Self {
            quads: targets
                .into_iter()
                .map(|targets| GustState { targets, max: None })
                .collect(),
            log_success,
            log_failure,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.quads.is_empty()
    }

    /// Update running maxima from a loop record and merge them into it
    pub fn new_loop_record(&mut self, record: &mut Record) {
        for quad in &mut self.quads {
            let targets = &quad.targets;

            let (Some(speed), Some(dir)) = (record.get(&targets.speed), record.get(&targets.dir))
            else {
                if self.log_success {
                    debug!(
                        "Wind observations {}:{} not in record",
                        targets.speed, targets.dir
                    );
                }
                continue;
            };

            let Some(speed) = speed else {
                if self.log_failure {
                    info!("Current wind speed is set but N/A. Skipping calculation");
                }
                continue;
            };

            // a maximum without direction is replaced by the next reading
            let replace = match quad.max {
                None => true,
                Some(max) => max.dir.is_none() || speed >= max.speed,
            };
            if replace {
                if self.log_success {
                    debug!("New wind vector {:.2}:{:?} larger than {:?}", speed, dir, quad.max);
                }
                quad.max = Some(GustMax { speed, dir });
            }

            if let Some(max) = quad.max {
                record.set(targets.gust_speed.clone(), Some(max.speed));
                record.set(targets.gust_dir.clone(), max.dir);
            }
        }
    }

    /// Clear all maxima at an archive boundary
    pub fn end_archive_period(&mut self) {
        if self.log_success {
            debug!("End of archive period, clearing max gust values");
        }
        for quad in &mut self.quads {
            quad.max = None;
        }
    }

    /// Running maximum for the wind mapping writing `speed_field`
    pub fn current_max(&self, speed_field: &str) -> Option<GustMax> {
        self.quads
            .iter()
            .find(|q| q.targets.speed == speed_field)
            .and_then(|q| q.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator() -> WindGustAggregator {
        WindGustAggregator::new(
            vec![WindTargets {
                dir: "windDir".into(),
                speed: "windSpeed".into(),
                gust_dir: "windGustDir".into(),
                gust_speed: "windGust".into(),
            }],
            false,
            true,
        )
    }

    fn loop_record(speed: Option<f64>, dir: f64) -> Record {
        let mut record = Record::new();
        record.set("windSpeed", speed);
        record.set("windDir", Some(dir));
        record
    }

    #[test]
    fn test_running_max() {
        let mut gusts = aggregator();
        let mut maxima = Vec::new();

        for (i, speed) in [3.0, 7.0, 2.0, 9.0, 5.0].into_iter().enumerate() {
            let mut record = loop_record(Some(speed), i as f64 * 10.0);
            gusts.new_loop_record(&mut record);
            maxima.push((record.value("windGust"), record.value("windGustDir")));
        }

        assert_eq!(
            maxima,
            vec![
                (Some(3.0), Some(0.0)),
                (Some(7.0), Some(10.0)),
                (Some(7.0), Some(10.0)),
                (Some(9.0), Some(30.0)),
                (Some(9.0), Some(30.0)),
            ]
        );
    }

    #[test]
    fn test_reset_at_archive_boundary() {
        let mut gusts = aggregator();
        gusts.new_loop_record(&mut loop_record(Some(9.0), 90.0));
        gusts.end_archive_period();
        assert_eq!(gusts.current_max("windSpeed"), None);

        let mut record = loop_record(Some(4.0), 180.0);
        gusts.new_loop_record(&mut record);
        assert_eq!(record.value("windGust"), Some(4.0));
        assert_eq!(record.value("windGustDir"), Some(180.0));
    }

    #[test]
    fn test_null_speed_is_skipped() {
        let mut gusts = aggregator();
        gusts.new_loop_record(&mut loop_record(Some(6.0), 45.0));

        let mut record = loop_record(None, 50.0);
        gusts.new_loop_record(&mut record);

        assert!(!record.contains("windGust"));
        assert_eq!(
            gusts.current_max("windSpeed"),
            Some(GustMax {
                speed: 6.0,
                dir: Some(45.0)
            })
        );
    }

    #[test]
    fn test_record_without_wind_is_untouched() {
        let mut gusts = aggregator();
        let mut record = Record::new();
        record.set("outTemp", Some(70.0));

        gusts.new_loop_record(&mut record);
        assert_eq!(record.observations.len(), 1);
    }

    #[test]
    fn test_without_wind_mappings() {
        let mut gusts = WindGustAggregator::new(Vec::new(), false, false);
        assert!(!gusts.is_active());

        let mut record = loop_record(Some(3.0), 0.0);
        gusts.new_loop_record(&mut record);
        assert!(!record.contains("windGust"));
    }
}
