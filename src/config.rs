//! Startup configuration consumed before stream creation.
//!
//! The command-line parser is an excluded collaborator: the core never
//! sees argv, only a flat key-value snapshot using the legacy flag names
//! (`dev`, `nx`, `ny`, `fam`, `fbeg`, `fsiz`). Unknown keys are ignored so
//! a snapshot may carry options for other collaborators.

use crate::error::{PlotError, PlotResult};

/// Family-file output settings.
///
/// When enabled, a device that writes files splits its output into a
/// numbered family of files, advancing to the next member once the size
/// cap is reached. The core stores and validates the settings; acting on
/// them is the device's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FamilySettings {
    /// Whether family output is on.
    pub enabled: bool,
    /// One-based number of the current family member file.
    pub member: u32,
    /// Size cap per member file, in bytes.
    pub bytes_max: u64,
}

impl Default for FamilySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            member: 1,
            bytes_max: 1_000_000,
        }
    }
}

/// The configuration snapshot handed to stream creation.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct PlotConfig {
    /// Requested device name, resolved to a backend by the caller.
    pub device_name: Option<String>,
    /// Subpage grid columns.
    pub nx: usize,
    /// Subpage grid rows.
    pub ny: usize,
    /// Family-file output settings.
    pub family: FamilySettings,
}

impl PlotConfig {
    /// Builds a configuration from flat key-value pairs.
    ///
    /// Recognized keys: `dev` (device name), `nx` / `ny` (subpage grid),
    /// `fam` (family output on/off), `fbeg` (first family member), `fsiz`
    /// (member size cap in megabytes). Unrecognized keys are skipped with
    /// a debug log entry.
    ///
    /// # Errors
    ///
    /// Returns [`PlotError::InvalidArgument`] when a recognized key's
    /// value does not parse or is out of range.
    pub fn from_pairs<'a, I>(pairs: I) -> PlotResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        const OP: &str = "config";
        let mut config = Self::default();
        for (key, value) in pairs {
            match key {
                "dev" => config.device_name = Some(value.to_owned()),
                "nx" => config.nx = parse_count(OP, key, value)?,
                "ny" => config.ny = parse_count(OP, key, value)?,
                "fam" => {
                    config.family.enabled = match value {
                        "1" | "true" | "on" => true,
                        "0" | "false" | "off" => false,
                        other => {
                            return Err(PlotError::invalid_argument(
                                OP,
                                format!("fam must be a boolean, got {other:?}"),
                            ));
                        }
                    };
                }
                "fbeg" => {
                    config.family.member = value.parse::<u32>().map_err(|_| {
                        PlotError::invalid_argument(
                            OP,
                            format!("fbeg must be a positive integer, got {value:?}"),
                        )
                    })?;
                    if config.family.member == 0 {
                        return Err(PlotError::invalid_argument(
                            OP,
                            "fbeg is one-based and must be at least 1",
                        ));
                    }
                }
                "fsiz" => {
                    let megabytes = value.parse::<f64>().map_err(|_| {
                        PlotError::invalid_argument(
                            OP,
                            format!("fsiz must be a size in megabytes, got {value:?}"),
                        )
                    })?;
                    if !megabytes.is_finite() || megabytes <= 0.0 {
                        return Err(PlotError::invalid_argument(
                            OP,
                            format!("fsiz must be positive, got {megabytes}"),
                        ));
                    }
                    config.family.bytes_max = (megabytes * 1.0e6) as u64;
                }
                other => {
                    tracing::debug!(key = other, "ignoring unrecognized configuration key");
                }
            }
        }
        Ok(config)
    }

    /// Subpage grid as `(nx, ny)`, substituting 1 for unset axes.
    #[must_use]
    pub fn subpages(&self) -> (usize, usize) {
        (self.nx.max(1), self.ny.max(1))
    }
}

fn parse_count(op: &'static str, key: &str, value: &str) -> PlotResult<usize> {
    let count = value.parse::<usize>().map_err(|_| {
        PlotError::invalid_argument(op, format!("{key} must be a positive integer, got {value:?}"))
    })?;
    if count == 0 {
        return Err(PlotError::invalid_argument(
            op,
            format!("{key} must be at least 1"),
        ));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs_reads_the_legacy_keys() {
        let config = PlotConfig::from_pairs([
            ("dev", "mem"),
            ("nx", "2"),
            ("ny", "3"),
            ("fam", "on"),
            ("fbeg", "4"),
            ("fsiz", "2.5"),
        ])
        .unwrap();
        assert_eq!(config.device_name.as_deref(), Some("mem"));
        assert_eq!(config.subpages(), (2, 3));
        assert!(config.family.enabled);
        assert_eq!(config.family.member, 4);
        assert_eq!(config.family.bytes_max, 2_500_000);
    }

    #[test]
    fn test_unknown_keys_are_skipped() {
        let config = PlotConfig::from_pairs([("geometry", "800x600"), ("nx", "2")]).unwrap();
        assert_eq!(config.subpages(), (2, 1));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        assert!(PlotConfig::from_pairs([("nx", "zero")]).is_err());
        assert!(PlotConfig::from_pairs([("nx", "0")]).is_err());
        assert!(PlotConfig::from_pairs([("fam", "maybe")]).is_err());
        assert!(PlotConfig::from_pairs([("fbeg", "0")]).is_err());
        assert!(PlotConfig::from_pairs([("fsiz", "-1")]).is_err());
    }

    #[test]
    fn test_defaults_are_a_single_subpage_without_family_output() {
        let config = PlotConfig::default();
        assert_eq!(config.subpages(), (1, 1));
        assert!(!config.family.enabled);
        assert_eq!(config.family.member, 1);
    }
}
