//! Generator identification data model (spec §3, §4.2, §6).

/// Canonical identifier for the originating slicer/dialect, encoded as a
/// bit-set so filters can combine several flavours with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flavour {
    PrusaSlicer,
    OrcaSlicer,
    SuperSlicer,
    RatOsDialect,
    Unknown,
}

/// A set of [`Flavour`] values, represented as a bitmask so action filters
/// can "or" several flavours together cheaply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlavourSet(u8);

impl Flavour {
    fn bit(self) -> u8 {
        match self {
            Flavour::PrusaSlicer => 1 << 0,
            Flavour::OrcaSlicer => 1 << 1,
            Flavour::SuperSlicer => 1 << 2,
            Flavour::RatOsDialect => 1 << 3,
            Flavour::Unknown => 1 << 4,
        }
    }
}

impl FlavourSet {
    pub const fn empty() -> Self {
        FlavourSet(0)
    }

    pub fn of(flavours: &[Flavour]) -> Self {
        let mut set = Self::empty();
        for f in flavours {
            set = set.with(*f);
        }
        set
    }

    #[must_use]
    pub fn with(self, flavour: Flavour) -> Self {
        FlavourSet(self.0 | flavour.bit())
    }

    pub fn contains(self, flavour: Flavour) -> bool {
        self.0 & flavour.bit() != 0
    }
}

impl std::ops::BitOr for FlavourSet {
    type Output = FlavourSet;
    fn bitor(self, rhs: FlavourSet) -> FlavourSet {
        FlavourSet(self.0 | rhs.0)
    }
}

/// Per-tool extruder temperature captured from `EXTRUDER_OTHER_LAYER_TEMP`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolTemp {
    pub tool: u32,
    pub temp: u32,
}

/// Generator identification, populated once early in the stream and then
/// read-only (spec §3).
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct GeneratorIdentification {
    pub generator_name: String,
    #[serde(with = "version_opt")]
    pub generator_version: Option<semver::Version>,
    pub flavour: Option<Flavour>,
    pub generator_timestamp: Option<String>,
    pub ratos_dialect_version: Option<String>,
    #[serde(with = "version_opt")]
    pub post_processor_version: Option<semver::Version>,
    pub post_processor_timestamp: Option<String>,
    pub processed_for_idex: Option<bool>,
    pub file_format_version: Option<u32>,
}

/// `serde(with = ...)` helper for `Option<semver::Version>`, since `semver`
/// only derives `Serialize`/`Deserialize` for bare `Version`, not `Option`.
mod version_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<semver::Version>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.as_ref().map(|v| v.to_string()).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<semver::Version>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            Some(s) => semver::Version::parse(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

impl GeneratorIdentification {
    /// True when this identification carries a "processed by" line (spec
    /// §7: "already processed" is a distinct kind, not an error).
    pub fn is_processed(&self) -> bool {
        self.post_processor_version.is_some()
    }
}
