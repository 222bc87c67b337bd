use maplit::hashmap;
use std::fmt;
use strfmt::strfmt;

use crate::error::{Error, Result};
use crate::tile::Tile;

const PLACEHOLDERS: &[&str] = &["{x}", "{y}", "{z}"];

/// A tile URL template with the replacement specifiers `{x}`, `{y}` and `{z}`.
#[derive(Clone, PartialEq, Eq)]
pub struct UrlFormat {
    format_str: String,
}

impl UrlFormat {
    /// Parses a template, checking that it contains every placeholder and
    /// nothing else `strfmt` would try to substitute.
    pub fn parse(format_str: impl Into<String>) -> Result<Self> {
        let format_str = format_str.into();
        let invalid = |reason: String| Error::InvalidUrlTemplate {
            template: format_str.clone(),
            reason,
        };

        if let Some(missing) = PLACEHOLDERS.iter().find(|p| !format_str.contains(*p)) {
            return Err(invalid(format!("missing placeholder {}", missing)));
        }

        let url = Self {
            format_str: format_str.clone(),
        };
        url.tile_url(&Tile::new(0, 0, 0))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(url)
    }

    pub fn tile_url(&self, tile: &Tile) -> Result<String, strfmt::FmtError> {
        let vars = hashmap! {
            "x".to_owned() => tile.x.to_string(),
            "y".to_owned() => tile.y.to_string(),
            "z".to_owned() => tile.z.to_string(),
        };

        strfmt(&self.format_str, &vars)
    }
}

impl fmt::Debug for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlFormat")
            .field("format_str", &self.format_str)
            .finish()
    }
}

impl fmt::Display for UrlFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_str)
    }
}
