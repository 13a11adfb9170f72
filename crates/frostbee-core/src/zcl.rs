//! Zigbee Cluster Library identifiers for the frostbee endpoint
//!
//! The device exposes a single Home Automation endpoint with the temperature
//! sensor device id. Only the attributes the report cycle writes are modelled
//! here; the rest of each cluster belongs to the network stack.

/// Endpoint carrying all frostbee clusters.
pub const ENDPOINT: u8 = 1;

/// Home Automation profile.
pub const PROFILE_ID: u16 = 0x0104;

/// HA temperature sensor device.
pub const DEVICE_ID: u16 = 0x0302;

/// Basic cluster manufacturer name.
pub const MANUFACTURER_NAME: &str = "Frostbee";

/// Basic cluster model identifier.
pub const MODEL_IDENTIFIER: &str = "FBE_TH_1";

/// ZCL "invalid measurement" for int16 measured values.
pub const TEMPERATURE_UNKNOWN: i16 = i16::MIN;

/// ZCL "invalid measurement" for uint16 measured values.
pub const HUMIDITY_UNKNOWN: u16 = u16::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClusterId {
    Basic = 0x0000,
    PowerConfig = 0x0001,
    Identify = 0x0003,
    TemperatureMeasurement = 0x0402,
    RelativeHumidity = 0x0405,
}

impl ClusterId {
    /// Clusters implemented in the server role, in descriptor order.
    pub const SERVER: [ClusterId; 5] = [
        ClusterId::Basic,
        ClusterId::Identify,
        ClusterId::PowerConfig,
        ClusterId::TemperatureMeasurement,
        ClusterId::RelativeHumidity,
    ];

    /// Clusters implemented in the client role.
    pub const CLIENT: [ClusterId; 1] = [ClusterId::Identify];

    pub const fn id(self) -> u16 {
        self as u16
    }
}

/// Reportable attributes owned by the report cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    /// MeasuredValue, int16, 0.01 °C.
    Temperature,
    /// MeasuredValue, uint16, 0.01 %RH.
    Humidity,
    /// BatteryVoltage, uint8, 100 mV.
    BatteryVoltage,
    /// BatteryPercentageRemaining, uint8, 0.5 %.
    BatteryPercentage,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Temperature,
        Attribute::Humidity,
        Attribute::BatteryVoltage,
        Attribute::BatteryPercentage,
    ];

    pub const fn cluster(self) -> ClusterId {
        match self {
            Self::Temperature => ClusterId::TemperatureMeasurement,
            Self::Humidity => ClusterId::RelativeHumidity,
            Self::BatteryVoltage | Self::BatteryPercentage => ClusterId::PowerConfig,
        }
    }

    pub const fn id(self) -> u16 {
        match self {
            Self::Temperature | Self::Humidity => 0x0000,
            Self::BatteryVoltage => 0x0020,
            Self::BatteryPercentage => 0x0021,
        }
    }
}

/// Typed attribute payload as handed to the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeValue {
    I16(i16),
    U16(u16),
    U8(u8),
}
