//! Output raster formats
//!
//! Each format fixes the full-resolution export size and a preview size of
//! the same aspect ratio.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Output format identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Desktop,
    Phone,
}

/// Pixel dimensions for one format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatSpec {
    pub width: u32,
    pub height: u32,
    pub preview_width: u32,
    pub preview_height: u32,
}

const DESKTOP: FormatSpec = FormatSpec {
    width: 3840,
    height: 2160,
    preview_width: 800,
    preview_height: 450,
};

const PHONE: FormatSpec = FormatSpec {
    width: 1170,
    height: 2532,
    preview_width: 390,
    preview_height: 844,
};

impl OutputFormat {
    pub const ALL: [OutputFormat; 2] = [OutputFormat::Desktop, OutputFormat::Phone];

    pub fn spec(self) -> FormatSpec {
        match self {
            OutputFormat::Desktop => DESKTOP,
            OutputFormat::Phone => PHONE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Desktop => "desktop",
            OutputFormat::Phone => "phone",
        }
    }
}

/// Canvas sizes per format, normally [`OutputFormat::spec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTable {
    desktop: FormatSpec,
    phone: FormatSpec,
}

impl FormatTable {
    /// Every format rendered at the same size
    pub fn uniform(spec: FormatSpec) -> Self {
        Self {
            desktop: spec,
            phone: spec,
        }
    }

    pub fn get(&self, format: OutputFormat) -> FormatSpec {
        match format {
            OutputFormat::Desktop => self.desktop,
            OutputFormat::Phone => self.phone,
        }
    }

    /// Replace one format's sizes
    pub fn with(mut self, format: OutputFormat, spec: FormatSpec) -> Self {
        match format {
            OutputFormat::Desktop => self.desktop = spec,
            OutputFormat::Phone => self.phone = spec,
        }
        self
    }
}

impl Default for FormatTable {
    fn default() -> Self {
        Self {
            desktop: DESKTOP,
            phone: PHONE,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "desktop" => Ok(OutputFormat::Desktop),
            "phone" => Ok(OutputFormat::Phone),
            other => Err(Error::InvalidInput(format!("Unknown format: {}", other))),
        }
    }
}
