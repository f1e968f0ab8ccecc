// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::WorkersParseError;
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr, sync::LazyLock};
use tracing::warn;

/// The number of workers per logical CPU for `num-cpus`.
pub const WORKERS_PER_CPU: usize = 8;

/// Gets the number of available CPUs and caches the value.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// The `workers` config key and `--workers` option.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Workers {
    /// A fixed number of workers.
    Count(usize),

    /// [`WORKERS_PER_CPU`] workers per logical CPU.
    NumCpus,
}

impl Workers {
    /// Returns the actual number of workers.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(workers) => workers,
            Self::NumCpus => default_count(),
        }
    }

    fn relative_to_default(offset: i64) -> Self {
        Self::Count((default_count() as i64 + offset).max(1) as usize)
    }
}

fn default_count() -> usize {
    get_num_cpus() * WORKERS_PER_CPU
}

impl FromStr for Workers {
    type Err = WorkersParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<i64>() {
            Err(error) => Err(WorkersParseError::new(format!("{error} parsing `{s}`"))),
            Ok(0) => Err(WorkersParseError::new("workers may not be 0")),
            Ok(n) if n < 0 => Ok(Self::relative_to_default(n)),
            Ok(n) => Ok(Self::Count(n as usize)),
        }
    }
}

impl fmt::Display for Workers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(workers) => write!(f, "{workers}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for Workers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = Workers;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "a non-zero integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(Workers::NumCpus)
                } else {
                    Err(E::invalid_value(serde::de::Unexpected::Str(v), &self))
                }
            }

            // TOML integers are i64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(Workers::Count(v as usize)),
                    Ordering::Less => Ok(Workers::relative_to_default(v)),
                    Ordering::Equal => Err(E::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Err(E::invalid_value(serde::de::Unexpected::Unsigned(v), &self)),
                    v => Ok(Workers::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}
