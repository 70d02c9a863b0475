use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Supported trading venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Okx,
    Bybit,
    Deribit,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::Okx, Venue::Bybit, Venue::Deribit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Okx => "okx",
            Venue::Bybit => "bybit",
            Venue::Deribit => "deribit",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Venue {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "okx" => Ok(Venue::Okx),
            "bybit" => Ok(Venue::Bybit),
            "deribit" => Ok(Venue::Deribit),
            _ => Err(ConfigError::UnsupportedVenue(s.to_string())),
        }
    }
}

/// A canonical `BASE-QUOTE` instrument, uppercase. Venue-specific
/// naming (concatenated pairs, perpetual suffixes) is derived from
/// this form by each adapter, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    base: String,
    quote: String,
}

impl Symbol {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self, ConfigError> {
        let base = base.into().to_uppercase();
        let quote = quote.into().to_uppercase();
        if base.is_empty() || quote.is_empty() {
            return Err(ConfigError::InvalidSymbol {
                symbol: format!("{base}-{quote}"),
                reason: "base and quote must be non-empty".to_string(),
            });
        }
        if !base.chars().all(char::is_alphanumeric) || !quote.chars().all(char::is_alphanumeric) {
            return Err(ConfigError::InvalidSymbol {
                symbol: format!("{base}-{quote}"),
                reason: "base and quote must be alphanumeric".to_string(),
            });
        }
        Ok(Symbol { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }
}

/// Well-known symbols
impl Symbol {
    pub fn btc_usdt() -> Self {
        Symbol {
            base: "BTC".to_string(),
            quote: "USDT".to_string(),
        }
    }

    pub fn eth_usdt() -> Self {
        Symbol {
            base: "ETH".to_string(),
            quote: "USDT".to_string(),
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

impl FromStr for Symbol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((base, quote)) = s.split_once('-') else {
            return Err(ConfigError::InvalidSymbol {
                symbol: s.to_string(),
                reason: "expected BASE-QUOTE form".to_string(),
            });
        };
        Symbol::new(base, quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_venue_round_trip() {
        for venue in Venue::ALL {
            assert_eq!(venue.as_str().parse::<Venue>().unwrap(), venue);
        }
        assert_eq!("OKX".parse::<Venue>().unwrap(), Venue::Okx);
        assert!("binance".parse::<Venue>().is_err());
    }

    #[test]
    fn test_symbol_normalizes_to_uppercase() {
        let sym: Symbol = "btc-usdt".parse().unwrap();
        assert_eq!(sym.base(), "BTC");
        assert_eq!(sym.quote(), "USDT");
        assert_eq!(sym.to_string(), "BTC-USDT");
    }

    #[test]
    fn test_symbol_rejects_malformed() {
        assert!("BTCUSDT".parse::<Symbol>().is_err());
        assert!("-USDT".parse::<Symbol>().is_err());
        assert!("BTC-".parse::<Symbol>().is_err());
        assert!("BTC-US/DT".parse::<Symbol>().is_err());
    }
}
