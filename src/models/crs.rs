//! Coordinate reference system identifiers.

use std::fmt;

use crate::error::{GapError, Result};

/// EPSG codes of the geographic (degree based) systems we know how to describe
const GEOGRAPHIC_EPSG: &[u32] = &[4326, 4269, 4258, 4283, 4674, 4755];

/// Highest zone of the NAD83 UTM family (EPSG 26901..=26923)
const NAD83_UTM_MAX_ZONE: u32 = 23;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReferenceSystem {
    Epsg(u32),
    /// Raw PROJ.4 definition
    Proj4(String),
}

impl ReferenceSystem {
    pub const WGS84: ReferenceSystem = ReferenceSystem::Epsg(4326);

    /// Parse `EPSG:4326`, `urn:ogc:def:crs:EPSG::32748`, `OGC:1.3:CRS84` or a `+proj=` string
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with("+proj=") {
            return Ok(ReferenceSystem::Proj4(trimmed.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(ReferenceSystem::WGS84);
        }

        let code = upper
            .rsplit(':')
            .next()
            .filter(|_| upper.contains("EPSG"))
            .and_then(|c| c.parse::<u32>().ok())
            .ok_or_else(|| {
                GapError::ReferenceSystem(format!("unrecognised reference system '{}'", input))
            })?;

        Ok(ReferenceSystem::Epsg(code))
    }

    /// UTM zone on the given datum family.
    ///
    /// NAD83 UTM codes exist for northern zones 1 to 23 only; elsewhere the
    /// WGS84 zone is used.
    pub fn utm(zone: u32, south: bool, nad83: bool) -> Self {
        let code = match (nad83 && zone <= NAD83_UTM_MAX_ZONE, south) {
            (true, false) => 26900 + zone,
            (_, true) => 32700 + zone,
            (false, false) => 32600 + zone,
        };
        ReferenceSystem::Epsg(code)
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            ReferenceSystem::Epsg(code) => Some(*code),
            ReferenceSystem::Proj4(_) => None,
        }
    }

    /// Degree-based systems must never be used for metric buffering
    pub fn is_geographic(&self) -> bool {
        match self {
            ReferenceSystem::Epsg(code) => GEOGRAPHIC_EPSG.contains(code),
            ReferenceSystem::Proj4(def) => {
                def.contains("+proj=longlat")
                    || def.contains("+proj=latlong")
                    || def.contains("+proj=lonlat")
            }
        }
    }

    pub fn is_nad83(&self) -> bool {
        match self {
            ReferenceSystem::Epsg(code) => *code == 4269 || (26901..=26923).contains(code),
            ReferenceSystem::Proj4(def) => def.contains("+datum=NAD83"),
        }
    }

    /// PROJ.4 definition understood by proj4rs
    pub fn proj4(&self) -> Result<String> {
        let def = match self {
            ReferenceSystem::Proj4(def) => return Ok(def.clone()),
            ReferenceSystem::Epsg(4326) => "+proj=longlat +datum=WGS84 +no_defs +type=crs".into(),
            ReferenceSystem::Epsg(4269) => "+proj=longlat +datum=NAD83 +no_defs +type=crs".into(),
            ReferenceSystem::Epsg(4258 | 4283 | 4674) => {
                "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs +type=crs".into()
            }
            ReferenceSystem::Epsg(4755) => {
                "+proj=longlat +ellps=WGS84 +towgs84=0,0,0,0,0,0,0 +no_defs +type=crs".into()
            }
            ReferenceSystem::Epsg(3857) => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 \
                 +x_0=0 +y_0=0 +k=1 +units=m +no_defs +type=crs"
                .into(),
            ReferenceSystem::Epsg(code @ 32601..=32660) => format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs +type=crs",
                code - 32600
            ),
            ReferenceSystem::Epsg(code @ 32701..=32760) => format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs +type=crs",
                code - 32700
            ),
            ReferenceSystem::Epsg(code @ 26901..=26923) => format!(
                "+proj=utm +zone={} +datum=NAD83 +units=m +no_defs +type=crs",
                code - 26900
            ),
            ReferenceSystem::Epsg(code) => {
                return Err(GapError::ReferenceSystem(format!(
                    "no definition available for EPSG:{}",
                    code
                )))
            }
        };
        Ok(def)
    }
}

impl fmt::Display for ReferenceSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceSystem::Epsg(code) => write!(f, "EPSG:{}", code),
            ReferenceSystem::Proj4(def) => f.write_str(def),
        }
    }
}
