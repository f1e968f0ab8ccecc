// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Workers;
use crate::{
    discovery::SkipPolicy,
    errors::{ConfigParseError, ConfigParseErrorKind, ProfileNotFound},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};
use tracing::warn;

/// The embedded default config sets every key of the default profile, and user configs are
/// layered over it, so a resolved profile is always complete.
const DEFAULTS_SET: &str = "default-config.toml sets every key";

/// Configuration for the conformance runner.
///
/// Settings are organized into profiles. Every profile inherits unspecified settings from the
/// `default` profile, which in turn falls back to the built-in defaults.
#[derive(Clone, Debug)]
pub struct ConformanceConfig {
    profiles: BTreeMap<String, ProfileDeserialize>,
}

impl ConformanceConfig {
    /// The default location of the config, relative to the working directory.
    pub const CONFIG_PATH: &'static str = ".config/conformance.toml";

    /// The built-in defaults.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the config from `config_file`, or from [`CONFIG_PATH`](Self::CONFIG_PATH) if not
    /// given, layered over the built-in defaults.
    ///
    /// A missing file at the default location is fine. An explicitly specified file must exist.
    /// Unknown keys are reported as warnings.
    pub fn from_sources(config_file: Option<&Utf8Path>) -> Result<Self, ConfigParseError> {
        let (path, required) = match config_file {
            Some(path) => (path, true),
            None => (Utf8Path::new(Self::CONFIG_PATH), false),
        };
        let source = File::new(path.as_str(), FileFormat::Toml).required(required);
        Self::from_builder(path, Self::default_builder().add_source(source))
    }

    /// Parses the config from a TOML string layered over the built-in defaults.
    ///
    /// `source_name` is used for error messages.
    pub fn from_toml_str(source_name: &Utf8Path, toml: &str) -> Result<Self, ConfigParseError> {
        let source = File::from_str(toml, FileFormat::Toml);
        Self::from_builder(source_name, Self::default_builder().add_source(source))
    }

    /// Returns the names of all defined profiles, sorted.
    pub fn profile_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.profiles.keys().map(String::as_str)
    }

    /// Resolves a profile, filling in unspecified settings from the `default` profile.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<ConformanceProfile, ProfileNotFound> {
        let name = name.as_ref();
        let custom = self
            .profiles
            .get(name)
            .ok_or_else(|| ProfileNotFound::new(name, self.profiles.keys()))?;
        let default = self
            .profiles
            .get(Self::DEFAULT_PROFILE)
            .ok_or_else(|| ProfileNotFound::new(Self::DEFAULT_PROFILE, self.profiles.keys()))?;

        let resolved = custom.clone().or(default.clone());
        Ok(ConformanceProfile {
            name: name.to_owned(),
            engine: resolved.engine.expect(DEFAULTS_SET),
            test_root: resolved.test_root.expect(DEFAULTS_SET),
            results_path: resolved.results_path.expect(DEFAULTS_SET),
            workers: resolved.workers.expect(DEFAULTS_SET),
            timeout: resolved.timeout.expect(DEFAULTS_SET),
            sample_interval: resolved.sample_interval.expect(DEFAULTS_SET),
            skip: resolved.skip.expect(DEFAULTS_SET),
            skip_prefixes: resolved.skip_prefixes.expect(DEFAULTS_SET),
            engine_timings: resolved.engine_timings.expect(DEFAULTS_SET),
        })
    }

    fn default_builder() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn from_builder(
        config_file: &Utf8Path,
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigParseError> {
        let (config, ignored) = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;

        if !ignored.is_empty() {
            let keys = ignored.into_iter().collect::<Vec<_>>().join(", ");
            warn!("ignoring unknown configuration keys in {config_file}: {keys}");
        }

        Ok(Self {
            profiles: config.profile,
        })
    }

    /// Returns the deserialized config and the set of ignored paths.
    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<(ConfigDeserialize, BTreeSet<String>), ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: ConfigDeserialize =
            serde_path_to_error::deserialize(ignored_de).map_err(|error| {
                // serde_path_to_error already tracks the key, so drop the one in the config
                // error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        Ok((config, ignored))
    }
}

/// A fully resolved profile.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConformanceProfile {
    name: String,
    engine: Utf8PathBuf,
    test_root: Utf8PathBuf,
    results_path: Utf8PathBuf,
    workers: Workers,
    timeout: Duration,
    sample_interval: Duration,
    skip: bool,
    skip_prefixes: Vec<String>,
    engine_timings: bool,
}

impl ConformanceProfile {
    /// The profile's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine binary.
    pub fn engine(&self) -> &Utf8Path {
        &self.engine
    }

    /// The root of the test corpus.
    pub fn test_root(&self) -> &Utf8Path {
        &self.test_root
    }

    /// The persisted result file.
    pub fn results_path(&self) -> &Utf8Path {
        &self.results_path
    }

    /// The worker count setting.
    pub fn workers(&self) -> Workers {
        self.workers
    }

    /// The per-test deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The memory sampling interval.
    pub fn sample_interval(&self) -> Duration {
        self.sample_interval
    }

    /// Whether engine phase timings are collected.
    pub fn engine_timings(&self) -> bool {
        self.engine_timings
    }

    /// The skip policy.
    pub fn skip_policy(&self) -> SkipPolicy {
        if self.skip {
            SkipPolicy::new(self.skip_prefixes.iter().cloned())
        } else {
            SkipPolicy::disabled()
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConfigDeserialize {
    #[serde(default)]
    profile: BTreeMap<String, ProfileDeserialize>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProfileDeserialize {
    #[serde(default)]
    engine: Option<Utf8PathBuf>,
    #[serde(default)]
    test_root: Option<Utf8PathBuf>,
    #[serde(default)]
    results_path: Option<Utf8PathBuf>,
    #[serde(default)]
    workers: Option<Workers>,
    #[serde(default, with = "humantime_serde::option")]
    timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    sample_interval: Option<Duration>,
    #[serde(default)]
    skip: Option<bool>,
    #[serde(default)]
    skip_prefixes: Option<Vec<String>>,
    #[serde(default)]
    engine_timings: Option<bool>,
}

impl ProfileDeserialize {
    /// Fills unset keys from `other`.
    fn or(self, other: Self) -> Self {
        Self {
            engine: self.engine.or(other.engine),
            test_root: self.test_root.or(other.test_root),
            results_path: self.results_path.or(other.results_path),
            workers: self.workers.or(other.workers),
            timeout: self.timeout.or(other.timeout),
            sample_interval: self.sample_interval.or(other.sample_interval),
            skip: self.skip.or(other.skip),
            skip_prefixes: self.skip_prefixes.or(other.skip_prefixes),
            engine_timings: self.engine_timings.or(other.engine_timings),
        }
    }
}
