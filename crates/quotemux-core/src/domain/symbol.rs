use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{ProviderId, ValidationError};

const MAX_SYMBOL_LEN: usize = 24;

/// Canonical instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Stock,
    Etf,
    Crypto,
    Forex,
    Futures,
    Option,
    Bond,
    Index,
}

impl AssetClass {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
            Self::Crypto => "crypto",
            Self::Forex => "forex",
            Self::Futures => "futures",
            Self::Option => "option",
            Self::Bond => "bond",
            Self::Index => "index",
        }
    }
}

impl Display for AssetClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized market symbol/ticker, uppercased, marker characters allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Symbol(String);

impl Symbol {
    /// Parse and normalize a raw ticker to uppercase.
    ///
    /// Marker characters used by provider conventions (`=X`, `^`, `-USD`,
    /// `X:`) are accepted here; classification interprets them.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptySymbol);
        }

        let normalized = trimmed.to_ascii_uppercase();
        let len = normalized.chars().count();
        if len > MAX_SYMBOL_LEN {
            return Err(ValidationError::SymbolTooLong {
                len,
                max: MAX_SYMBOL_LEN,
            });
        }

        for (index, ch) in normalized.chars().enumerate() {
            let valid = ch.is_ascii_alphanumeric()
                || matches!(ch, '.' | '-' | '=' | '^' | ':' | '/');
            if !valid {
                return Err(ValidationError::SymbolInvalidChar { ch, index });
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Symbol {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for Symbol {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<Symbol> for String {
    fn from(value: Symbol) -> Self {
        value.0
    }
}

/// Quote currencies recognized as crypto pair suffixes (`BTC-USD`, `ETH-EUR`).
const CRYPTO_QUOTE_CURRENCIES: [&str; 6] = ["USD", "USDT", "USDC", "EUR", "GBP", "BTC"];

/// Membership list of widely traded ETFs whose tickers are shaped like stocks.
const KNOWN_ETFS: [&str; 16] = [
    "SPY", "QQQ", "IWM", "DIA", "VTI", "VOO", "GLD", "SLV", "XLF", "XLE", "XLK", "ARKK", "EEM",
    "TLT", "HYG", "VNQ",
];

/// Membership list of crypto bases usable without an explicit pair marker.
const KNOWN_CRYPTO_BASES: [&str; 12] = [
    "BTC", "ETH", "SOL", "ADA", "XRP", "DOGE", "DOT", "AVAX", "LTC", "LINK", "BNB", "UNI",
];

/// Membership list of index roots commonly quoted without the `^` marker.
const KNOWN_INDEX_ROOTS: [&str; 8] = [
    "GSPC", "DJI", "IXIC", "RUT", "VIX", "SPX", "NDX", "FTSE",
];

/// Classify a raw ticker into its asset class.
///
/// Total and pure: every input maps to exactly one class, unrecognized
/// shapes default to [`AssetClass::Stock`]. Rules run most-specific-first
/// and the first match wins:
///
/// 1. explicit markers (`=X`, `=F`, leading `^`, Polygon `X:`/`C:`/`I:`/`O:`
///    prefixes, `-<quote currency>` pairs, OCC option shape);
/// 2. membership lists (ETFs, crypto bases, index roots) and the treasury
///    tenor shape (`US10Y`);
/// 3. six plain letters read as a forex pair;
/// 4. everything else is a stock.
pub fn classify(raw: &str) -> AssetClass {
    let symbol = raw.trim().to_ascii_uppercase();

    // 1. Explicit suffix/prefix markers.
    if symbol.ends_with("=X") {
        return AssetClass::Forex;
    }
    if symbol.ends_with("=F") {
        return AssetClass::Futures;
    }
    if symbol.starts_with('^') {
        return AssetClass::Index;
    }
    if let Some((prefix, _)) = symbol.split_once(':') {
        match prefix {
            "X" => return AssetClass::Crypto,
            "C" => return AssetClass::Forex,
            "I" => return AssetClass::Index,
            "O" => return AssetClass::Option,
            _ => {}
        }
    }
    if let Some((_, quote)) = symbol.rsplit_once('-') {
        if CRYPTO_QUOTE_CURRENCIES.contains(&quote) {
            return AssetClass::Crypto;
        }
    }
    if is_occ_option(&symbol) {
        return AssetClass::Option;
    }

    // 2. Known-symbol membership and tenor shapes.
    if KNOWN_ETFS.contains(&symbol.as_str()) {
        return AssetClass::Etf;
    }
    if KNOWN_CRYPTO_BASES.contains(&symbol.as_str()) {
        return AssetClass::Crypto;
    }
    if KNOWN_INDEX_ROOTS.contains(&symbol.as_str()) {
        return AssetClass::Index;
    }
    if is_treasury_tenor(&symbol) {
        return AssetClass::Bond;
    }

    // 3. Shape-based: six plain letters read as a currency pair.
    if symbol.len() == 6 && symbol.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return AssetClass::Forex;
    }

    // 4. Default.
    AssetClass::Stock
}

/// OCC option shape: 1-6 letter root, 6-digit date, C/P, 8-digit strike.
fn is_occ_option(symbol: &str) -> bool {
    let bytes = symbol.as_bytes();
    if bytes.len() < 16 || bytes.len() > 21 {
        return false;
    }

    let root_len = bytes.len() - 15;
    if root_len > 6 || !bytes[..root_len].iter().all(u8::is_ascii_alphabetic) {
        return false;
    }

    let date = &bytes[root_len..root_len + 6];
    let side = bytes[root_len + 6];
    let strike = &bytes[root_len + 7..];

    date.iter().all(u8::is_ascii_digit)
        && matches!(side, b'C' | b'P')
        && strike.len() == 8
        && strike.iter().all(u8::is_ascii_digit)
}

/// Treasury tenor shape: country code + tenor + Y (`US10Y`, `DE2Y`).
fn is_treasury_tenor(symbol: &str) -> bool {
    let bytes = symbol.as_bytes();
    if bytes.len() < 4 || bytes.len() > 6 || !symbol.ends_with('Y') {
        return false;
    }

    let digits = &bytes[2..bytes.len() - 1];
    bytes[..2].iter().all(u8::is_ascii_alphabetic)
        && !digits.is_empty()
        && digits.iter().all(u8::is_ascii_digit)
}

/// A classified security: normalized symbol plus the asset class the
/// classification rules assigned it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecurityIdentifier {
    symbol: Symbol,
    asset_class: AssetClass,
}

impl SecurityIdentifier {
    /// Validate and classify a raw ticker in one step.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let symbol = Symbol::parse(raw)?;
        let asset_class = classify(symbol.as_str());
        Ok(Self {
            symbol,
            asset_class,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub const fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// Canonical marker-free root of the symbol.
    ///
    /// Stripping markers first is what makes `encode` idempotent: encoding
    /// an already provider-encoded symbol never double-appends (`=X=X`,
    /// `-USD-USD`).
    pub fn base(&self) -> &str {
        let mut base = self.symbol.as_str();

        if let Some((prefix, rest)) = base.split_once(':') {
            if matches!(prefix, "X" | "C" | "I" | "O") {
                base = rest;
            }
        }
        base = base.strip_prefix('^').unwrap_or(base);
        base = base
            .strip_suffix("=X")
            .or_else(|| base.strip_suffix("=F"))
            .unwrap_or(base);

        if self.asset_class == AssetClass::Crypto {
            if let Some((head, quote)) = base.rsplit_once('-') {
                if CRYPTO_QUOTE_CURRENCIES.contains(&quote) {
                    base = head;
                }
            }
            // Polygon-style fused pair: X:BTCUSD carries the quote inline.
            if self.symbol.as_str().starts_with("X:") {
                for quote in CRYPTO_QUOTE_CURRENCIES {
                    if base.len() > quote.len() {
                        if let Some(head) = base.strip_suffix(quote) {
                            return head;
                        }
                    }
                }
            }
        }

        base
    }

    /// Quote currency of a crypto pair. Detected from the `-<quote>` marker
    /// or a Polygon fused pair; a bare base reads against USD.
    fn crypto_quote(&self) -> &'static str {
        let raw = self.symbol.as_str();
        let fused = raw.strip_prefix("X:");
        let pair = fused.unwrap_or(raw);

        if let Some((_, quote)) = pair.rsplit_once('-') {
            for &known in &CRYPTO_QUOTE_CURRENCIES {
                if known == quote {
                    return known;
                }
            }
        }
        if fused.is_some() {
            for &known in &CRYPTO_QUOTE_CURRENCIES {
                if pair.len() > known.len() && pair.ends_with(known) {
                    return known;
                }
            }
        }
        "USD"
    }

    /// Build the provider-native symbol for this security.
    ///
    /// Returns [`ValidationError::UnsupportedCombination`] when the provider
    /// has no native form for the asset class, never a malformed string.
    pub fn encode(&self, provider: ProviderId) -> Result<String, ValidationError> {
        let base = self.base();
        let unsupported = || ValidationError::UnsupportedCombination {
            asset_class: self.asset_class,
            provider,
        };

        let encoded = match (provider, self.asset_class) {
            (ProviderId::Yahoo, AssetClass::Stock | AssetClass::Etf) => base.to_owned(),
            (ProviderId::Yahoo, AssetClass::Forex) => format!("{}=X", forex_pair(base)),
            (ProviderId::Yahoo, AssetClass::Crypto) => {
                format!("{base}-{}", self.crypto_quote())
            }
            (ProviderId::Yahoo, AssetClass::Futures) => format!("{base}=F"),
            (ProviderId::Yahoo, AssetClass::Index) => format!("^{base}"),
            (ProviderId::Yahoo, AssetClass::Option) => base.to_owned(),
            (ProviderId::Yahoo, AssetClass::Bond) => {
                format!("^{}", yahoo_treasury_root(base).ok_or_else(unsupported)?)
            }

            (ProviderId::Polygon, AssetClass::Stock | AssetClass::Etf) => base.to_owned(),
            (ProviderId::Polygon, AssetClass::Crypto) => {
                format!("X:{base}{}", self.crypto_quote())
            }
            (ProviderId::Polygon, AssetClass::Forex) => format!("C:{}", forex_pair(base)),
            (ProviderId::Polygon, AssetClass::Index) => format!("I:{base}"),
            (ProviderId::Polygon, AssetClass::Option) => format!("O:{base}"),
            (ProviderId::Polygon, AssetClass::Futures | AssetClass::Bond) => {
                return Err(unsupported())
            }

            (ProviderId::Alphavantage, AssetClass::Stock | AssetClass::Etf) => base.to_owned(),
            (ProviderId::Alphavantage, AssetClass::Forex) => forex_pair(base).into_owned(),
            (ProviderId::Alphavantage, AssetClass::Crypto) => base.to_owned(),
            (ProviderId::Alphavantage, _) => return Err(unsupported()),
        };

        Ok(encoded)
    }
}

/// Normalize a forex base to a 6-letter pair; a bare 3-letter currency is
/// read against USD.
fn forex_pair(base: &str) -> std::borrow::Cow<'_, str> {
    if base.len() == 3 {
        std::borrow::Cow::Owned(format!("{base}USD"))
    } else {
        std::borrow::Cow::Borrowed(base)
    }
}

/// Yahoo quotes treasury yields under CBOE index roots.
fn yahoo_treasury_root(base: &str) -> Option<&'static str> {
    match base {
        "US30Y" => Some("TYX"),
        "US10Y" => Some("TNX"),
        "US5Y" => Some("FVX"),
        "US13W" | "US3M" => Some("IRX"),
        _ => None,
    }
}
