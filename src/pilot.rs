//! The fixed set of pilot currencies the service supports.

use serde::Serialize;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Commodity {
    pub name: &'static str,
    /// Yahoo futures symbol, None when no single contract tracks it.
    pub symbol: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PilotCountry {
    /// ISO 4217 currency code; the primary key everywhere in the service.
    pub code: &'static str,
    pub currency_name: &'static str,
    pub country: &'static str,
    pub iso3: &'static str,
    pub fx_symbol: &'static str,
    pub commodities: &'static [Commodity],
    /// Lower-case terms that mark a headline as being about this country.
    pub keywords: &'static [&'static str],
    /// Extra encyclopedia pages with dated crisis timelines.
    pub timeline_pages: &'static [&'static str],
    /// FRED series carrying the central bank policy (or interbank) rate.
    pub policy_rate_series: Option<&'static str>,
}

impl PilotCountry {
    /// True when `code` names this country's currency or ISO3 code.
    pub fn matches_code(&self, code: &str) -> bool {
        code.eq_ignore_ascii_case(self.code) || code.eq_ignore_ascii_case(self.iso3)
    }
}

const fn commodity(name: &'static str, symbol: Option<&'static str>) -> Commodity {
    Commodity { name, symbol }
}

pub static PILOT_COUNTRIES: &[PilotCountry] = &[
    PilotCountry {
        code: "GHS",
        currency_name: "Ghanaian Cedi",
        country: "Ghana",
        iso3: "GHA",
        fx_symbol: "USDGHS=X",
        commodities: &[commodity("Gold", Some("GC=F")), commodity("Cocoa", Some("CC=F"))],
        keywords: &["ghana", "cedi", "bank of ghana", "accra", "cocoa"],
        timeline_pages: &["2022 Ghanaian economic crisis"],
        policy_rate_series: Some("INTDSRGHM193N"),
    },
    PilotCountry {
        code: "ARS",
        currency_name: "Argentine Peso",
        country: "Argentina",
        iso3: "ARG",
        fx_symbol: "USDARS=X",
        commodities: &[commodity("Soybeans", Some("ZS=F")), commodity("Corn", Some("ZC=F"))],
        keywords: &["argentina", "peso", "bcra", "buenos aires", "milei"],
        timeline_pages: &["Argentine debt restructuring"],
        policy_rate_series: Some("INTDSRARM193N"),
    },
    PilotCountry {
        code: "TRY",
        currency_name: "Turkish Lira",
        country: "Turkey",
        iso3: "TUR",
        fx_symbol: "USDTRY=X",
        commodities: &[commodity("Steel", Some("HG=F")), commodity("Textiles", None)],
        keywords: &["turkey", "lira", "turkish", "cbrt", "ankara"],
        timeline_pages: &["2018 Turkish currency and debt crisis"],
        policy_rate_series: Some("INTDSRTRM193N"),
    },
    PilotCountry {
        code: "EGP",
        currency_name: "Egyptian Pound",
        country: "Egypt",
        iso3: "EGY",
        fx_symbol: "USDEGP=X",
        commodities: &[
            commodity("Natural Gas", Some("NG=F")),
            commodity("Petroleum", Some("CL=F")),
        ],
        keywords: &["egypt", "egyptian pound", "central bank of egypt", "cairo", "suez"],
        timeline_pages: &[],
        policy_rate_series: Some("INTDSREGM193N"),
    },
    PilotCountry {
        code: "PKR",
        currency_name: "Pakistani Rupee",
        country: "Pakistan",
        iso3: "PAK",
        fx_symbol: "USDPKR=X",
        commodities: &[commodity("Textiles", None), commodity("Rice", Some("ZR=F"))],
        keywords: &["pakistan", "rupee", "state bank of pakistan", "islamabad", "karachi"],
        timeline_pages: &["2022–present Pakistani economic crisis"],
        policy_rate_series: Some("INTDSRPKM193N"),
    },
    PilotCountry {
        code: "LKR",
        currency_name: "Sri Lankan Rupee",
        country: "Sri Lanka",
        iso3: "LKA",
        fx_symbol: "USDLKR=X",
        commodities: &[commodity("Tea", None), commodity("Textiles", None)],
        keywords: &["sri lanka", "sri lankan rupee", "central bank of sri lanka", "colombo"],
        timeline_pages: &["2019–present Sri Lankan economic crisis"],
        policy_rate_series: Some("INTDSRLKM193N"),
    },
    PilotCountry {
        code: "LBP",
        currency_name: "Lebanese Pound",
        country: "Lebanon",
        iso3: "LBN",
        fx_symbol: "USDLBP=X",
        commodities: &[commodity("Gold", Some("GC=F")), commodity("Diamonds", None)],
        keywords: &["lebanon", "lebanese pound", "banque du liban", "beirut"],
        timeline_pages: &["Lebanese liquidity crisis"],
        policy_rate_series: Some("INTDSRLBM193N"),
    },
    PilotCountry {
        code: "COP",
        currency_name: "Colombian Peso",
        country: "Colombia",
        iso3: "COL",
        fx_symbol: "USDCOP=X",
        commodities: &[commodity("Oil", Some("CL=F")), commodity("Coffee", Some("KC=F"))],
        keywords: &["colombia", "colombian peso", "banco de la republica", "bogota"],
        timeline_pages: &[],
        policy_rate_series: Some("COLIRSTCI01STM"),
    },
];

/// Resolve a currency code, ISO3 code or country name to its pilot entry.
pub fn lookup(key: &str) -> Result<&'static PilotCountry> {
    let key = key.trim();
    PILOT_COUNTRIES
        .iter()
        .find(|c| c.matches_code(key) || c.country.eq_ignore_ascii_case(key))
        .ok_or_else(|| AppError::UnsupportedCountry(key.to_string()))
}
