//! Signal text grammar (sig-parser boundary).
//!
//! Converts free-form webhook text into a [`Signal`]. Pure and
//! deterministic: no I/O, no clock, identical input always yields an
//! identical result.
//!
//! ## Grammar (whitespace-separated tokens, keywords case-insensitive)
//!
//! | Position | Token                | Notes                                 |
//! |----------|----------------------|---------------------------------------|
//! | 1        | `BUY` \| `SELL`      | anything else → `MissingAction`       |
//! | 2        | instrument symbol    | 1+ ASCII alphanumerics, uppercased    |
//! | any      | `@<price>`           | optional entry; also `[@<price>]`     |
//! | any      | `SL <price>`         | optional stop loss                    |
//! | any      | `TP <price>`         | optional take profit                  |
//!
//! All prices must be positive decimals. Unrecognized trailing tokens
//! are ignored so upstream signal providers can
//! append commentary without breaking intake. Newlines are ordinary
//! whitespace.

use rust_decimal::Decimal;
use sig_schemas::{Action, Signal};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Which optional level keyword a malformed value belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    StopLoss,
    TakeProfit,
}

impl Level {
    pub fn keyword(&self) -> &'static str {
        match self {
            Level::StopLoss => "SL",
            Level::TakeProfit => "TP",
        }
    }
}

/// Rejection reasons, one per grammar rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// First token absent or not `BUY`/`SELL`.
    MissingAction,
    /// Second token absent or not purely alphanumeric.
    MissingInstrument,
    /// An `@...` token whose price is absent, malformed, or non-positive.
    InvalidEntryPrice { raw: String },
    /// `SL`/`TP` keyword without a following positive decimal.
    InvalidLevel { which: Level, raw: Option<String> },
}

impl ParseError {
    /// Stable machine-readable name of the failed grammar rule.
    pub fn rule(&self) -> &'static str {
        match self {
            ParseError::MissingAction => "missing_action",
            ParseError::MissingInstrument => "missing_instrument",
            ParseError::InvalidEntryPrice { .. } => "invalid_entry_price",
            ParseError::InvalidLevel {
                which: Level::StopLoss,
                ..
            } => "invalid_stop_loss",
            ParseError::InvalidLevel {
                which: Level::TakeProfit,
                ..
            } => "invalid_take_profit",
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::MissingAction => {
                write!(f, "signal must start with BUY or SELL")
            }
            ParseError::MissingInstrument => {
                write!(f, "expected an alphanumeric instrument after the action")
            }
            ParseError::InvalidEntryPrice { raw } => {
                write!(f, "entry price '{raw}' is not a positive decimal")
            }
            ParseError::InvalidLevel { which, raw } => match raw {
                Some(raw) => write!(
                    f,
                    "{} value '{raw}' is not a positive decimal",
                    which.keyword()
                ),
                None => write!(f, "{} keyword given without a value", which.keyword()),
            },
        }
    }
}

impl std::error::Error for ParseError {}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse raw signal text into a [`Signal`].
///
/// # Errors
/// One [`ParseError`] per violated grammar rule; the first violation in
/// token order wins. Empty or whitespace-only input is `MissingAction`.
pub fn parse(text: &str) -> Result<Signal, ParseError> {
    let mut tokens = text.split_whitespace();

    let action = match tokens.next() {
        Some(tok) if tok.eq_ignore_ascii_case("BUY") => Action::Buy,
        Some(tok) if tok.eq_ignore_ascii_case("SELL") => Action::Sell,
        _ => return Err(ParseError::MissingAction),
    };

    let instrument = match tokens.next() {
        Some(tok) if !tok.is_empty() && tok.chars().all(|c| c.is_ascii_alphanumeric()) => {
            tok.to_ascii_uppercase()
        }
        _ => return Err(ParseError::MissingInstrument),
    };

    let mut entry_price: Option<Decimal> = None;
    let mut stop_loss: Option<Decimal> = None;
    let mut take_profit: Option<Decimal> = None;

    while let Some(tok) = tokens.next() {
        if let Some(raw) = entry_token(tok) {
            let price = positive_decimal(raw?).ok_or_else(|| ParseError::InvalidEntryPrice {
                raw: tok.to_string(),
            })?;
            // First occurrence wins; well-formed repeats are ignored.
            entry_price.get_or_insert(price);
        } else if tok.eq_ignore_ascii_case("SL") {
            let value = level_value(tokens.next(), Level::StopLoss)?;
            stop_loss.get_or_insert(value);
        } else if tok.eq_ignore_ascii_case("TP") {
            let value = level_value(tokens.next(), Level::TakeProfit)?;
            take_profit.get_or_insert(value);
        }
        // Any other token is ignored (lenient trailing text).
    }

    Ok(Signal {
        action,
        instrument,
        entry_price,
        stop_loss,
        take_profit,
    })
}

/// Recognize an entry-price token: `@<raw>` or the bracketed `[@<raw>]`
/// form. Returns `None` for tokens that are not entry attempts at all,
/// `Some(Err(..))` for a bracketed token missing its closing bracket.
fn entry_token(tok: &str) -> Option<Result<&str, ParseError>> {
    if let Some(rest) = tok.strip_prefix("[@") {
        return Some(rest.strip_suffix(']').ok_or_else(|| {
            ParseError::InvalidEntryPrice {
                raw: tok.to_string(),
            }
        }));
    }
    tok.strip_prefix('@').map(Ok)
}

fn positive_decimal(raw: &str) -> Option<Decimal> {
    raw.parse::<Decimal>().ok().filter(|d| *d > Decimal::ZERO)
}

fn level_value(tok: Option<&str>, which: Level) -> Result<Decimal, ParseError> {
    match tok {
        Some(raw) => positive_decimal(raw).ok_or(ParseError::InvalidLevel {
            which,
            raw: Some(raw.to_string()),
        }),
        None => Err(ParseError::InvalidLevel { which, raw: None }),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn full_signal_with_entry_sl_tp() {
        let s = parse("BUY EURUSD @1.0850 SL 1.0820 TP 1.0900").unwrap();
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.instrument, "EURUSD");
        assert_eq!(s.entry_price, Some(dec("1.0850")));
        assert_eq!(s.stop_loss, Some(dec("1.0820")));
        assert_eq!(s.take_profit, Some(dec("1.0900")));
    }

    #[test]
    fn market_order_without_entry_price() {
        let s = parse("SELL BTCUSD SL 60000 TP 70000").unwrap();
        assert_eq!(s.action, Action::Sell);
        assert_eq!(s.instrument, "BTCUSD");
        assert_eq!(s.entry_price, None);
        assert_eq!(s.stop_loss, Some(dec("60000")));
        assert_eq!(s.take_profit, Some(dec("70000")));
    }

    #[test]
    fn newlines_are_ordinary_whitespace() {
        let s = parse("BUY EURUSD @1.0850\nSL 1.0820\nTP 1.0900").unwrap();
        assert_eq!(s.entry_price, Some(dec("1.0850")));
        assert_eq!(s.stop_loss, Some(dec("1.0820")));
        assert_eq!(s.take_profit, Some(dec("1.0900")));
    }

    #[test]
    fn keywords_are_case_insensitive_and_instrument_uppercased() {
        let s = parse("buy eurusd sl 1.0820 tp 1.0900").unwrap();
        assert_eq!(s.action, Action::Buy);
        assert_eq!(s.instrument, "EURUSD");
        assert_eq!(s.stop_loss, Some(dec("1.0820")));
    }

    #[test]
    fn sl_and_tp_are_each_optional_in_either_order() {
        let only_tp = parse("BUY XAUUSD TP 2400").unwrap();
        assert_eq!(only_tp.stop_loss, None);
        assert_eq!(only_tp.take_profit, Some(dec("2400")));

        let tp_first = parse("BUY XAUUSD TP 2400 SL 2300").unwrap();
        assert_eq!(tp_first.stop_loss, Some(dec("2300")));

        let bare = parse("SELL XAUUSD").unwrap();
        assert_eq!(bare.stop_loss, None);
        assert_eq!(bare.take_profit, None);
        assert_eq!(bare.entry_price, None);
    }

    #[test]
    fn bracketed_entry_price_form() {
        let s = parse("BUY EURUSD [@1.0860] SL 1.0850 TP 1.0890").unwrap();
        assert_eq!(s.entry_price, Some(dec("1.0860")));
    }

    #[test]
    fn unknown_action_is_missing_action() {
        assert_eq!(parse("HOLD EURUSD"), Err(ParseError::MissingAction));
    }

    #[test]
    fn empty_and_whitespace_only_are_missing_action() {
        assert_eq!(parse(""), Err(ParseError::MissingAction));
        assert_eq!(parse("  \n\t "), Err(ParseError::MissingAction));
    }

    #[test]
    fn action_without_instrument() {
        assert_eq!(parse("BUY"), Err(ParseError::MissingInstrument));
        // Second token present but not alphanumeric.
        assert_eq!(parse("BUY @1.0850"), Err(ParseError::MissingInstrument));
    }

    #[test]
    fn malformed_entry_price_fails() {
        assert!(matches!(
            parse("BUY EURUSD @abc"),
            Err(ParseError::InvalidEntryPrice { .. })
        ));
        assert!(matches!(
            parse("BUY EURUSD @"),
            Err(ParseError::InvalidEntryPrice { .. })
        ));
        // Zero and negative prices are rejected.
        assert!(matches!(
            parse("BUY EURUSD @0"),
            Err(ParseError::InvalidEntryPrice { .. })
        ));
        assert!(matches!(
            parse("BUY EURUSD @-1.05"),
            Err(ParseError::InvalidEntryPrice { .. })
        ));
        // Bracketed form missing its closing bracket.
        assert!(matches!(
            parse("BUY EURUSD [@1.0860"),
            Err(ParseError::InvalidEntryPrice { .. })
        ));
    }

    #[test]
    fn level_keyword_without_valid_number() {
        assert_eq!(
            parse("BUY EURUSD SL"),
            Err(ParseError::InvalidLevel {
                which: Level::StopLoss,
                raw: None,
            })
        );
        assert!(matches!(
            parse("BUY EURUSD SL abc"),
            Err(ParseError::InvalidLevel {
                which: Level::StopLoss,
                ..
            })
        ));
        assert!(matches!(
            parse("BUY EURUSD TP -5"),
            Err(ParseError::InvalidLevel {
                which: Level::TakeProfit,
                ..
            })
        ));
    }

    #[test]
    fn unrecognized_trailing_tokens_are_ignored() {
        // Commentary after the structured fields must not fail the parse.
        let s = parse("BUY EURUSD @1.0850 SL 1.0820 TP 1.0900 strong setup!!!").unwrap();
        assert_eq!(s.instrument, "EURUSD");
        assert_eq!(s.take_profit, Some(dec("1.0900")));
    }

    #[test]
    fn instrument_with_digits_parses() {
        let s = parse("SELL BTC2X TP 100").unwrap();
        assert_eq!(s.instrument, "BTC2X");
    }

    #[test]
    fn first_duplicate_value_wins() {
        let s = parse("BUY EURUSD @1.10 @9.99 SL 1.00 SL 5.00").unwrap();
        assert_eq!(s.entry_price, Some(dec("1.10")));
        assert_eq!(s.stop_loss, Some(dec("1.00")));
    }

    #[test]
    fn parse_is_deterministic_and_round_trips_decimals() {
        let a = parse("BUY EURUSD @1.0850 SL 1.0820 TP 1.0900").unwrap();
        let b = parse("BUY EURUSD @1.0850 SL 1.0820 TP 1.0900").unwrap();
        assert_eq!(a, b);
        // Decimal scale is preserved exactly as written.
        assert_eq!(a.entry_price.unwrap().to_string(), "1.0850");
    }
}
