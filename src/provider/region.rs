//! Structured lookup results.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ip::format_ip;
use crate::{Error, Result};

/// Number of pipe-separated fields in a region string.
pub const REGION_FIELDS: usize = 5;

/// A named place: display name plus optional code and numeric id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub code: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u32,
}

fn is_zero(id: &u32) -> bool {
    *id == 0
}

impl Name {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.code.is_empty() && self.id == 0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.name.is_empty(), self.code.is_empty(), self.id) {
            (false, false, _) => write!(f, "{}({})", self.name, self.code),
            (false, true, 0) => f.write_str(&self.name),
            (false, true, id) => write!(f, "{}({})", self.name, id),
            (true, false, _) => f.write_str(&self.code),
            (true, true, 0) => Ok(()),
            (true, true, id) => write!(f, "{}", id),
        }
    }
}

/// Where an address is and who routes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    #[serde(default, skip_serializing_if = "Name::is_empty")]
    pub continent: Name,
    #[serde(default, skip_serializing_if = "Name::is_empty")]
    pub country: Name,
    #[serde(default, skip_serializing_if = "Name::is_empty")]
    pub subdivision: Name,
    #[serde(default, skip_serializing_if = "Name::is_empty")]
    pub city: Name,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub isp: String,
}

impl Region {
    /// Non-empty parts joined with `", "`, broadest first.
    pub fn info_text(&self) -> String {
        let names = [&self.continent, &self.country, &self.subdivision, &self.city];
        names
            .iter()
            .map(|n| n.to_string())
            .chain(std::iter::once(self.isp.clone()))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>15}: {}", self.ip, self.info_text())
    }
}

/// Split a raw `country|region|province|city|isp` record into a [`Region`].
///
/// The record is split into at most five fields; the last keeps any
/// embedded `|`. Fields are blanked left to right: `"0"` becomes empty, and
/// a field equal to the (already blanked) field before it becomes empty.
pub fn parse_region(ip: u32, raw: &str) -> Result<Region> {
    let mut fields: Vec<&str> = raw.splitn(REGION_FIELDS, '|').collect();
    if fields.len() < REGION_FIELDS {
        return Err(Error::BadRecord(format!(
            "region {:?} has {} fields, expected {}",
            raw,
            fields.len(),
            REGION_FIELDS
        )));
    }

    for i in 0..fields.len() {
        if fields[i] == "0" || (i > 0 && fields[i] == fields[i - 1]) {
            fields[i] = "";
        }
    }

    Ok(Region {
        ip: format_ip(ip),
        country: Name::new(fields[0]),
        continent: Name::new(fields[1]),
        subdivision: Name::new(fields[2]),
        city: Name::new(fields[3]),
        isp: fields[4].to_string(),
    })
}
