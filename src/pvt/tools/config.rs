use std::path::Path;

use serde::Deserialize;

use crate::pvt::tools::error::{Result, ToolError};

/// Default cap for the in-memory export buffer before it spills to disk.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 10_000 * 1000;
/// Sheet name of the exported workbook.
pub const DEFAULT_SHEET_NAME: &str = "combined_data";

const MAX_SHEET_NAME_LEN: usize = 31;

/// Process-wide settings handed explicitly to the loader, exporter, and
/// session collaborators.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub export: ExportConfig,
    pub sheets: SheetsConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub max_buffer_bytes: usize,
    pub sheet_name: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
            sheet_name: DEFAULT_SHEET_NAME.to_string(),
        }
    }
}

/// Identifies the spreadsheet that backs the API-sourced PVT table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub spreadsheet_id: Option<String>,
    pub worksheet: Option<String>,
}

impl SheetsConfig {
    /// Browser URL of the configured spreadsheet.
    pub fn spreadsheet_url(&self) -> Option<String> {
        self.spreadsheet_id
            .as_deref()
            .map(|id| format!("https://docs.google.com/spreadsheets/d/{id}"))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub root_url: String,
    pub logout_endpoint: String,
}

impl ToolConfig {
    pub fn from_toml(input: &str) -> Result<Self> {
        let config: ToolConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolError::MissingInput(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path)?;
        Self::from_toml(&source)
    }

    pub fn validate(&self) -> Result<()> {
        if self.export.max_buffer_bytes == 0 {
            return Err(ToolError::InvalidConfig(
                "export.max_buffer_bytes must be positive".into(),
            ));
        }

        let sheet_name = self.export.sheet_name.trim();
        if sheet_name.is_empty() || sheet_name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(ToolError::InvalidConfig(format!(
                "export.sheet_name must be 1 to {MAX_SHEET_NAME_LEN} characters"
            )));
        }

        Ok(())
    }
}
