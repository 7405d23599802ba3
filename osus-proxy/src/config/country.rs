/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! osu! country codes.
//!
//! Bancho identifies countries by a single byte.  The byte is an index into
//! a fixed table of ISO 3166-1 alpha-2 codes (with a few legacy GeoIP
//! entries such as `EU`, `A2` and `O1`).  Index `0` means "unknown".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Alpha-2 code per osu! country byte.
const COUNTRY_CODES: &[&str] = &[
    "XX", "OC", "EU", "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AN", "AO",
    "AQ", "AR", "AS", "AT", "AU", "AW", "AZ", "BA", "BB", "BD", "BE", "BF",
    "BG", "BH", "BI", "BJ", "BM", "BN", "BO", "BR", "BS", "BT", "BV", "BW",
    "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM",
    "CN", "CO", "CR", "CU", "CV", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM",
    "DO", "DZ", "EC", "EE", "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK",
    "FM", "FO", "FR", "FX", "GA", "GB", "GD", "GE", "GF", "GH", "GI", "GL",
    "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IN", "IO", "IQ", "IR", "IS",
    "IT", "JM", "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR",
    "KW", "KY", "KZ", "LA", "LB", "LC", "LI", "LK", "LR", "LS", "LT", "LU",
    "LV", "LY", "MA", "MC", "MD", "MG", "MH", "MK", "ML", "MM", "MN", "MO",
    "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM",
    "PA", "PE", "PF", "PG", "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT",
    "PW", "PY", "QA", "RE", "RO", "RU", "RW", "SA", "SB", "SC", "SD", "SE",
    "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "ST", "SV",
    "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TM", "TN", "TO",
    "TL", "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ",
    "VA", "VC", "VE", "VG", "VI", "VN", "VU", "WF", "WS", "YE", "YT", "RS",
    "ZA", "ZM", "ME", "ZW", "XX", "A2", "O1", "AX", "GG", "IM", "JE", "BL",
    "MF",
];

/// A country as bancho encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Country(u8);

impl Country {
    pub const UNKNOWN: Country = Country(0);

    /// Look up a country by its osu! byte.  Out-of-table values are `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        ((code as usize) < COUNTRY_CODES.len()).then_some(Self(code))
    }

    /// Look up a country by alpha-2 code, case-insensitively.
    pub fn from_alpha2(alpha2: &str) -> Option<Self> {
        COUNTRY_CODES
            .iter()
            .position(|c| c.eq_ignore_ascii_case(alpha2))
            .map(|i| Self(i as u8))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn alpha2(self) -> &'static str {
        COUNTRY_CODES[self.0 as usize]
    }

    /// Every known country, in code order, excluding [`Country::UNKNOWN`].
    pub fn all() -> impl Iterator<Item = Country> {
        (1..COUNTRY_CODES.len()).map(|i| Country(i as u8))
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alpha2())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCountry(pub String);

impl fmt::Display for UnknownCountry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown country code '{}'", self.0)
    }
}

impl std::error::Error for UnknownCountry {}

impl FromStr for Country {
    type Err = UnknownCountry;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_alpha2(s.trim()).ok_or_else(|| UnknownCountry(s.to_string()))
    }
}

impl Serialize for Country {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.alpha2())
    }
}

impl<'de> Deserialize<'de> for Country {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_codes() {
        assert_eq!(Country::from_alpha2("jp").unwrap().code(), 111);
        assert_eq!(Country::from_alpha2("US").unwrap().code(), 225);
        assert_eq!(Country::from_alpha2("kr").unwrap().code(), 119);
        assert_eq!(Country::from_alpha2("zw").unwrap().code(), 243);
    }

    #[test]
    fn from_code_bounds() {
        assert_eq!(Country::from_code(0), Some(Country::UNKNOWN));
        assert_eq!(Country::from_code(111).unwrap().alpha2(), "JP");
        assert_eq!(Country::from_code(40).unwrap().alpha2(), "CD");
        assert_eq!(Country::from_code(252).unwrap().alpha2(), "MF");
        assert_eq!(Country::from_code(253), None);
        assert_eq!(Country::from_code(255), None);
    }

    #[test]
    fn all_excludes_unknown_and_is_code_ordered() {
        let all: Vec<_> = Country::all().collect();
        assert_eq!(all.first().unwrap().alpha2(), "OC");
        assert!(!all.contains(&Country::UNKNOWN));
        assert!(all.windows(2).all(|w| w[0].code() < w[1].code()));
    }

    #[test]
    fn table_follows_legacy_geoip_order() {
        assert_eq!(COUNTRY_CODES.len(), 253);
        let cc = Country::from_alpha2("CC").unwrap().code();
        assert_eq!(Country::from_alpha2("CD").unwrap().code(), cc + 1);
        assert_eq!(Country::from_alpha2("CF").unwrap().code(), cc + 2);
        assert_eq!(Country::from_alpha2("de").unwrap().code(), 56);
        assert_eq!(Country::from_alpha2("gb").unwrap().code(), 77);
    }

    #[test]
    fn parse_rejects_unknown_codes() {
        assert!("QQ".parse::<Country>().is_err());
        assert_eq!(" de ".parse::<Country>().unwrap().to_string(), "DE");
    }
}
