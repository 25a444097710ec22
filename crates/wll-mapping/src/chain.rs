//! Ordered mapper chain
//!
//! All mappers are described first and then allocated in one pass over a
//! shared [`Reservation`], in declaration order.

use crate::mapper::role;
use crate::{
    ConfigError, LogFlags, Mapper, MapperKind, MappingDefinition, MappingError, Reservation,
    SensorSet,
};
use tracing::{debug, info};
use wll_core::{ObservationPacket, Record};

/// Output fields of one wind mapper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindTargets {
    pub dir: String,
    pub speed: String,
    pub gust_dir: String,
    pub gust_speed: String,
}

#[derive(Debug, Clone, Default)]
pub struct MapperChain {
    mappers: Vec<Mapper>,
}

impl MapperChain {
    pub fn from_kinds(kinds: Vec<MapperKind>, log: LogFlags) -> Result<Self, ConfigError> {
        let mut reservation = Reservation::new();
        let mut mappers = Vec::with_capacity(kinds.len());

        for kind in kinds {
            let targets = reservation.allocate(&kind.to_string(), &kind.target_request())?;
            mappers.push(Mapper::new(kind, targets, log));
        }

        debug!("Created {} mappers", mappers.len());
        Ok(Self { mappers })
    }

    pub fn from_definitions(
        definitions: &[MappingDefinition],
        log: LogFlags,
    ) -> Result<Self, ConfigError> {
        let kinds = definitions
            .iter()
            .map(MappingDefinition::to_kind)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_kinds(kinds, log)
    }

    pub fn from_sensors(sensors: &SensorSet, log: LogFlags) -> Result<Self, ConfigError> {
        Self::from_kinds(sensors.mapper_kinds(), log)
    }

    /// Run every mapper over `packet` into a fresh record
    ///
    /// The record is not stamped; the caller adds time and unit system.
    pub fn apply(&mut self, packet: &ObservationPacket) -> Result<Record, MappingError> {
        let mut record = Record::new();
        for mapper in &mut self.mappers {
            mapper.apply(packet, &mut record)?;
        }
        Ok(record)
    }

    pub fn mappers(&self) -> &[Mapper] {
        &self.mappers
    }

    pub fn len(&self) -> usize {
        self.mappers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappers.is_empty()
    }

    pub fn declared_targets(&self) -> Vec<&str> {
        self.mappers
            .iter()
            .flat_map(|m| m.declared_targets())
            .collect()
    }

    /// Target quads of all wind mappers, for gust aggregation
    pub fn wind_targets(&self) -> Vec<WindTargets> {
        self.mappers
            .iter()
            .filter(|m| matches!(m.kind(), MapperKind::Wind { .. }))
            .filter_map(|m| {
                let targets = m.targets();
                Some(WindTargets {
                    dir: targets.get(role::WIND_DIR)?.to_string(),
                    speed: targets.get(role::WIND_SPEED)?.to_string(),
                    gust_dir: targets.get(role::GUST_DIR)?.to_string(),
                    gust_speed: targets.get(role::GUST_SPEED)?.to_string(),
                })
            })
            .collect()
    }

    /// Log which device observation lands in which output field
    pub fn log_summary(&self) {
        info!("Mapping {} mappers", self.mappers.len());
        for mapper in &self.mappers {
            let table: Vec<String> = mapper
                .map_table()
                .iter()
                .map(|(label, field)| format!("{label} -> {field}"))
                .collect();
            info!(
                "  {} ({}): {}",
                mapper.name(),
                mapper.source_label(),
                table.join(", ")
            );
        }
    }
}
