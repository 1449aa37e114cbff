//! Register table for the heat pump controller
//!
//! Every published field is addressed by (register group, index) within that
//! group's response payload and carries a decode rule turning the raw i32
//! into an engineering value. Writable parameters additionally carry the set
//! of raw values the controller accepts.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Serialize;

use crate::protocol::ReadKind;

/// Engineering unit of a decoded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Celsius,
    Kelvin,
    LitersPerHour,
    Hertz,
    Watts,
    /// Enum labels, flags and ratios
    None,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Celsius => "°C",
            Unit::Kelvin => "K",
            Unit::LitersPerHour => "l/h",
            Unit::Hertz => "Hz",
            Unit::Watts => "W",
            Unit::None => "",
        }
    }
}

/// Decode rule from raw register value to engineering value.
#[derive(Debug, Clone, Copy)]
pub enum DecodeKind {
    /// Raw value divided by a fixed divider (temperatures use 10)
    Scaled(f64),
    /// Enumerated state mapped through a label table
    Enum(&'static [(i32, &'static str)]),
    /// 0/1 register decoded as a boolean
    Flag,
}

/// Decoded engineering value of a field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Numeric(f64),
    Label(String),
    Flag(bool),
}

impl FieldValue {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FieldValue::Numeric(v) => Some(*v),
            _ => None,
        }
    }
}

/// Operating state of the compressor (calculated values index 80).
pub const OPERATING_STATES: &[(i32, &str)] = &[
    (0, "heating"),
    (1, "hot_water"),
    (2, "pool_photovoltaic"),
    (3, "cooling"),
    (4, "no_requirement"),
];

/// Mode selector values shared by the heating and hot water mode parameters.
pub const MODE_SELECTORS: &[(i32, &str)] = &[
    (0, "automatic"),
    (1, "second_heat_source"),
    (2, "party"),
    (3, "holidays"),
    (4, "off"),
];

/// One published field of the controller.
#[derive(Debug, Clone, Copy)]
pub struct FieldDefinition {
    /// Stable identifier used on the output boundary
    pub id: &'static str,
    /// Register group the field lives in
    pub kind: ReadKind,
    /// Index into the group's response payload
    pub index: usize,
    pub decode: DecodeKind,
    pub unit: Unit,
}

impl FieldDefinition {
    /// Decode a raw register value. Unknown enum codes decode to a synthetic
    /// label rather than failing the snapshot.
    pub fn decode(&self, raw: i32) -> FieldValue {
        match self.decode {
            DecodeKind::Scaled(divider) => FieldValue::Numeric(f64::from(raw) / divider),
            DecodeKind::Enum(table) => {
                match table.iter().find(|(code, _)| *code == raw) {
                    Some((_, label)) => FieldValue::Label((*label).to_string()),
                    None => {
                        tracing::warn!(field = self.id, raw, "unknown enum code");
                        FieldValue::Label(format!("unknown-{raw}"))
                    },
                }
            },
            DecodeKind::Flag => FieldValue::Flag(raw != 0),
        }
    }
}

const fn temperature(id: &'static str, kind: ReadKind, index: usize) -> FieldDefinition {
    FieldDefinition {
        id,
        kind,
        index,
        decode: DecodeKind::Scaled(10.0),
        unit: Unit::Celsius,
    }
}

/// All fields read from the controller, in publication order.
pub static FIELDS: &[FieldDefinition] = &[
    temperature("supply_temperature", ReadKind::CalculatedValues, 10),
    temperature("return_temperature", ReadKind::CalculatedValues, 11),
    temperature("return_temperature_target", ReadKind::CalculatedValues, 12),
    temperature("outside_temperature", ReadKind::CalculatedValues, 15),
    temperature("outside_temperature_avg", ReadKind::CalculatedValues, 16),
    temperature("dhw_temperature", ReadKind::CalculatedValues, 17),
    temperature("source_inlet_temperature", ReadKind::CalculatedValues, 19),
    temperature("source_outlet_temperature", ReadKind::CalculatedValues, 20),
    temperature("mixing_circuit1_temperature", ReadKind::CalculatedValues, 21),
    temperature("mixing_circuit1_target", ReadKind::CalculatedValues, 22),
    temperature("mixing_circuit2_temperature", ReadKind::CalculatedValues, 24),
    temperature("mixing_circuit2_target", ReadKind::CalculatedValues, 25),
    FieldDefinition {
        id: "operating_state",
        kind: ReadKind::CalculatedValues,
        index: 80,
        decode: DecodeKind::Enum(OPERATING_STATES),
        unit: Unit::None,
    },
    FieldDefinition {
        id: "flow_rate",
        kind: ReadKind::CalculatedValues,
        index: 173,
        decode: DecodeKind::Scaled(1.0),
        unit: Unit::LitersPerHour,
    },
    temperature("room_temperature", ReadKind::CalculatedValues, 227),
    temperature("room_temperature_target", ReadKind::CalculatedValues, 228),
    FieldDefinition {
        id: "compressor_frequency",
        kind: ReadKind::CalculatedValues,
        index: 231,
        decode: DecodeKind::Scaled(1.0),
        unit: Unit::Hertz,
    },
    FieldDefinition {
        id: "heat_output",
        kind: ReadKind::CalculatedValues,
        index: 257,
        decode: DecodeKind::Scaled(1.0),
        unit: Unit::Watts,
    },
    FieldDefinition {
        id: "electrical_power_consumption",
        kind: ReadKind::CalculatedValues,
        index: 268,
        decode: DecodeKind::Scaled(1.0),
        unit: Unit::Watts,
    },
    FieldDefinition {
        id: "temperature_offset",
        kind: ReadKind::Parameters,
        index: 1,
        decode: DecodeKind::Scaled(10.0),
        unit: Unit::Kelvin,
    },
    FieldDefinition {
        id: "heating_mode",
        kind: ReadKind::Parameters,
        index: 3,
        decode: DecodeKind::Enum(MODE_SELECTORS),
        unit: Unit::None,
    },
    FieldDefinition {
        id: "hot_water_mode",
        kind: ReadKind::Parameters,
        index: 4,
        decode: DecodeKind::Enum(MODE_SELECTORS),
        unit: Unit::None,
    },
    temperature("dhw_temperature_target", ReadKind::Parameters, 105),
    FieldDefinition {
        id: "cooling_enabled",
        kind: ReadKind::Parameters,
        index: 108,
        decode: DecodeKind::Flag,
        unit: Unit::None,
    },
];

/// Look up a field by its identifier.
pub fn field(id: &str) -> Option<&'static FieldDefinition> {
    static INDEX: OnceLock<HashMap<&'static str, &'static FieldDefinition>> = OnceLock::new();
    INDEX
        .get_or_init(|| FIELDS.iter().map(|f| (f.id, f)).collect())
        .get(id)
        .copied()
}

/// Fields belonging to one register group.
pub fn fields_in(kind: ReadKind) -> impl Iterator<Item = &'static FieldDefinition> {
    FIELDS.iter().filter(move |f| f.kind == kind)
}

/// Raw values the controller accepts for a writable parameter.
#[derive(Debug, Clone, Copy)]
pub enum AllowedValues {
    /// Inclusive range with a fixed step between permitted values
    Range { min: i32, max: i32, step: i32 },
    /// Explicit value set
    Set(&'static [i32]),
}

impl AllowedValues {
    pub fn contains(&self, value: i32) -> bool {
        match self {
            AllowedValues::Range { min, max, step } => {
                value >= *min && value <= *max && (value - min) % step == 0
            },
            AllowedValues::Set(values) => values.contains(&value),
        }
    }
}

/// A parameter register the service is allowed to write.
#[derive(Debug, Clone, Copy)]
pub struct WritableParameter {
    /// Field identifier of the parameter as it appears in snapshots
    pub id: &'static str,
    /// Register index in the parameters group
    pub index: i32,
    pub allowed: AllowedValues,
}

impl WritableParameter {
    /// Check a raw value against the permitted set before it goes on the wire.
    pub fn validate(&self, value: i32) -> crate::error::Result<()> {
        if self.allowed.contains(value) {
            Ok(())
        } else {
            Err(crate::error::HeatSrvError::validation(format!(
                "value {value} not permitted for parameter {} ({:?})",
                self.id, self.allowed
            )))
        }
    }
}

/// All parameters the service may write, raw values in register units.
pub static WRITABLE_PARAMETERS: &[WritableParameter] = &[
    WritableParameter {
        id: "temperature_offset",
        index: 1,
        allowed: AllowedValues::Range {
            min: -50,
            max: 50,
            step: 5,
        },
    },
    WritableParameter {
        id: "heating_mode",
        index: 3,
        allowed: AllowedValues::Range {
            min: 0,
            max: 4,
            step: 1,
        },
    },
    WritableParameter {
        id: "hot_water_mode",
        index: 4,
        allowed: AllowedValues::Range {
            min: 0,
            max: 4,
            step: 1,
        },
    },
    WritableParameter {
        id: "dhw_temperature_target",
        index: 105,
        allowed: AllowedValues::Range {
            min: 300,
            max: 650,
            step: 5,
        },
    },
    WritableParameter {
        id: "cooling_enabled",
        index: 108,
        allowed: AllowedValues::Set(&[0, 1]),
    },
];

/// Look up a writable parameter by field identifier.
pub fn writable(id: &str) -> Option<&'static WritableParameter> {
    WRITABLE_PARAMETERS.iter().find(|p| p.id == id)
}
