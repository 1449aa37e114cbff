//! Snapshot assembly
//!
//! A snapshot is one consistent view of the controller built from the three
//! register groups of a single poll cycle, decoded into engineering values
//! and extended with derived fields. Snapshots are immutable once built.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::error::{HeatSrvError, Result};
use crate::protocol::{Command, LuxtronikClient, ReadKind};
use crate::registers::{self, FieldValue, Unit};

/// Identifier of the derived coefficient-of-performance field.
pub const FIELD_COP: &str = "cop";
/// Identifier of the derived supply minus return temperature field.
pub const FIELD_FLOW_DELTA: &str = "flow_temperature_delta";
/// Identifier of the derived source inlet minus outlet temperature field.
pub const FIELD_BRINE_DELTA: &str = "brine_temperature_delta";

/// One decoded field inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldReading {
    pub value: FieldValue,
    pub unit: Unit,
}

/// One consistent view of the controller state.
#[derive(Debug, Clone)]
pub struct Snapshot {
    fields: BTreeMap<&'static str, FieldReading>,
    /// Monotonic capture time, used by the update tracker
    pub taken_at: Instant,
    /// Wall-clock capture time, attached to forwarded updates
    pub taken_at_utc: DateTime<Utc>,
}

impl Snapshot {
    pub fn get(&self, id: &str) -> Option<&FieldReading> {
        self.fields.get(id)
    }

    pub fn numeric(&self, id: &str) -> Option<f64> {
        self.fields.get(id).and_then(|r| r.value.as_numeric())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldReading)> {
        self.fields.iter().map(|(id, r)| (*id, r))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decode one register group's payload into (field id, reading) pairs.
///
/// Registers beyond the payload length are skipped with a warning rather
/// than failing the snapshot; controller firmware revisions differ in how
/// many registers they publish.
pub fn decode_group(kind: ReadKind, payload: &[i32]) -> Vec<(&'static str, FieldReading)> {
    let mut readings = Vec::new();
    for def in registers::fields_in(kind) {
        match payload.get(def.index) {
            Some(raw) => readings.push((
                def.id,
                FieldReading {
                    value: def.decode(*raw),
                    unit: def.unit,
                },
            )),
            None => {
                tracing::warn!(
                    field = def.id,
                    index = def.index,
                    len = payload.len(),
                    "register beyond payload, skipping"
                );
            },
        }
    }
    readings
}

/// Add the derived fields to a decoded field map.
///
/// COP is omitted entirely when electrical power consumption is zero; a
/// missing field states "not computable" where any sentinel number would lie.
fn add_derived(fields: &mut BTreeMap<&'static str, FieldReading>) {
    let numeric = |fields: &BTreeMap<&'static str, FieldReading>, id: &str| {
        fields.get(id).and_then(|r| r.value.as_numeric())
    };

    let heat = numeric(fields, "heat_output");
    let power = numeric(fields, "electrical_power_consumption");
    if let (Some(heat), Some(power)) = (heat, power) {
        if power != 0.0 {
            fields.insert(
                FIELD_COP,
                FieldReading {
                    value: FieldValue::Numeric(heat / power),
                    unit: Unit::None,
                },
            );
        }
    }

    let supply = numeric(fields, "supply_temperature");
    let ret = numeric(fields, "return_temperature");
    if let (Some(supply), Some(ret)) = (supply, ret) {
        fields.insert(
            FIELD_FLOW_DELTA,
            FieldReading {
                value: FieldValue::Numeric(supply - ret),
                unit: Unit::Kelvin,
            },
        );
    }

    let inlet = numeric(fields, "source_inlet_temperature");
    let outlet = numeric(fields, "source_outlet_temperature");
    if let (Some(inlet), Some(outlet)) = (inlet, outlet) {
        fields.insert(
            FIELD_BRINE_DELTA,
            FieldReading {
                value: FieldValue::Numeric(inlet - outlet),
                unit: Unit::Kelvin,
            },
        );
    }
}

/// Build a snapshot from already-fetched group payloads.
pub fn from_payloads(
    parameters: &[i32],
    calculated: &[i32],
    visibility: &[i32],
) -> Snapshot {
    let mut fields = BTreeMap::new();
    for (kind, payload) in [
        (ReadKind::Parameters, parameters),
        (ReadKind::CalculatedValues, calculated),
        (ReadKind::VisibilityFlags, visibility),
    ] {
        fields.extend(decode_group(kind, payload));
    }
    add_derived(&mut fields);

    Snapshot {
        fields,
        taken_at: Instant::now(),
        taken_at_utc: Utc::now(),
    }
}

/// Fetch all three register groups over one connection and assemble a
/// snapshot. Any group failure abandons the cycle; a snapshot never mixes
/// data from different cycles.
pub async fn build(client: &mut LuxtronikClient) -> Result<Snapshot> {
    let mut payloads: [Vec<i32>; 3] = Default::default();
    for (slot, kind) in payloads.iter_mut().zip(ReadKind::ALL) {
        *slot = client
            .execute(&Command::read(kind))
            .await
            .map_err(|e| HeatSrvError::SnapshotUnavailable(e.to_string()))?;
    }

    let [parameters, calculated, visibility] = payloads;
    let snapshot = from_payloads(&parameters, &calculated, &visibility);
    debug!(fields = snapshot.len(), "snapshot built");
    Ok(snapshot)
}
