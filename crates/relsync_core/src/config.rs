//! Engine configuration.

use crate::dialect::DialectKind;
use crate::error::{CoreError, CoreResult};
use relsync_storage::DEFAULT_CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which fields the graph writer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProfile {
    /// Every field.
    #[default]
    Full,
    /// Instances that are not new emit only their key, discriminator and
    /// changed fields. References are still followed, so new instances
    /// reachable from them are written in full.
    Dirty,
}

impl fmt::Display for WireProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            WireProfile::Full => "full",
            WireProfile::Dirty => "dirty",
        })
    }
}

impl FromStr for WireProfile {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(WireProfile::Full),
            "dirty" => Ok(WireProfile::Dirty),
            other => Err(CoreError::invalid_config(format!(
                "unknown wire profile {other:?}"
            ))),
        }
    }
}

/// Per-call controls of the graph writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireOptions {
    /// Follow outward references (the referenced row).
    pub include_referencing: bool,
    /// Follow inward references (collections of referencing rows).
    pub include_referenced: bool,
    /// Reference depth; at this depth only scalar fields are written.
    pub max_depth: u32,
    /// Field selection.
    pub profile: WireProfile,
}

impl Default for WireOptions {
    fn default() -> Self {
        Self {
            include_referencing: true,
            include_referenced: true,
            max_depth: 3,
            profile: WireProfile::Full,
        }
    }
}

/// Header carrying [`WireOptions::include_referencing`].
pub const HEADER_INCLUDE_REFERENCING: &str = "x-include-referencing";
/// Header carrying [`WireOptions::include_referenced`].
pub const HEADER_INCLUDE_REFERENCED: &str = "x-include-referenced";
/// Header carrying [`WireOptions::max_depth`].
pub const HEADER_MAX_DEPTH: &str = "x-max-depth";
/// Header carrying [`WireOptions::profile`].
pub const HEADER_WIRE_PROFILE: &str = "x-wire-profile";

impl WireOptions {
    /// Overrides options from request headers.
    ///
    /// Header names are matched case-insensitively; names this engine does
    /// not know are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] for a known header with an
    /// unparsable value.
    pub fn with_headers<'h, I>(mut self, headers: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = (&'h str, &'h str)>,
    {
        for (name, value) in headers {
            match name.trim().to_ascii_lowercase().as_str() {
                HEADER_INCLUDE_REFERENCING => self.include_referencing = parse_flag(name, value)?,
                HEADER_INCLUDE_REFERENCED => self.include_referenced = parse_flag(name, value)?,
                HEADER_MAX_DEPTH => {
                    self.max_depth = value.trim().parse().map_err(|_| {
                        CoreError::invalid_config(format!("{name}: {value:?} is not a depth"))
                    })?;
                }
                HEADER_WIRE_PROFILE => self.profile = value.parse()?,
                _ => {}
            }
        }
        Ok(self)
    }

    /// Header pairs describing these options.
    #[must_use]
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        vec![
            (HEADER_INCLUDE_REFERENCING, self.include_referencing.to_string()),
            (HEADER_INCLUDE_REFERENCED, self.include_referenced.to_string()),
            (HEADER_MAX_DEPTH, self.max_depth.to_string()),
            (HEADER_WIRE_PROFILE, self.profile.to_string()),
        ]
    }
}

fn parse_flag(name: &str, value: &str) -> CoreResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CoreError::invalid_config(format!(
            "{name}: {value:?} is not a boolean"
        ))),
    }
}

/// Configuration of a [`Workspace`](crate::Workspace).
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend dialect used for command text.
    pub dialect: DialectKind,

    /// Default graph writer depth.
    pub max_depth: u32,

    /// Default graph writer profile.
    pub profile: WireProfile,

    /// Whether the graph writer follows outward references by default.
    pub include_referencing: bool,

    /// Whether the graph writer follows inward references by default.
    pub include_referenced: bool,

    /// Chunk size for blob copies.
    pub blob_chunk_size: usize,

    /// Entries the change buffer keeps before dropping the oldest.
    pub change_buffer_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: DialectKind::Postgres,
            max_depth: 3,
            profile: WireProfile::Full,
            include_referencing: true,
            include_referenced: true,
            blob_chunk_size: DEFAULT_CHUNK_SIZE,
            change_buffer_capacity: 10_000,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend dialect.
    #[must_use]
    pub const fn dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    /// Sets the default graph writer depth.
    #[must_use]
    pub const fn max_depth(mut self, depth: u32) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the default graph writer profile.
    #[must_use]
    pub const fn profile(mut self, profile: WireProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Sets whether outward references are followed by default.
    #[must_use]
    pub const fn include_referencing(mut self, value: bool) -> Self {
        self.include_referencing = value;
        self
    }

    /// Sets whether inward references are followed by default.
    #[must_use]
    pub const fn include_referenced(mut self, value: bool) -> Self {
        self.include_referenced = value;
        self
    }

    /// Sets the blob copy chunk size.
    #[must_use]
    pub const fn blob_chunk_size(mut self, size: usize) -> Self {
        self.blob_chunk_size = size;
        self
    }

    /// Sets the change buffer capacity.
    #[must_use]
    pub const fn change_buffer_capacity(mut self, capacity: usize) -> Self {
        self.change_buffer_capacity = capacity;
        self
    }

    /// Default graph writer options.
    #[must_use]
    pub fn wire_options(&self) -> WireOptions {
        WireOptions {
            include_referencing: self.include_referencing,
            include_referenced: self.include_referenced,
            max_depth: self.max_depth,
            profile: self.profile,
        }
    }
}
