//! Quick price replies answered from the quote cache.

use aurora_market::QuoteSnapshot;
use once_cell::sync::Lazy;
use regex::Regex;

/// Longer messages are questions for a model, not price lookups.
pub const QUICK_REPLY_MAX_WORDS: usize = 6;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]+").expect("valid regex"));

/// Common names mapped to ticker symbols.
const SYMBOL_NAMES: &[(&str, &str)] = &[
    ("bitcoin", "BTC"),
    ("ethereum", "ETH"),
    ("ether", "ETH"),
    ("solana", "SOL"),
    ("binance", "BNB"),
    ("dogecoin", "DOGE"),
];

/// Words that make a short message a price question.
const PRICE_WORDS: &[&str] = &[
    "price", "prices", "cost", "worth", "value", "quote", "quotes", "rate", "much", "trading",
];

/// Words allowed between bare tickers ("btc and eth?").
const CONNECTIVES: &[&str] = &["and", "or", "vs", "the"];

fn lowercase_words(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD_RE
        .find_iter(text)
        .map(|word| word.as_str().to_ascii_lowercase())
}

/// Ticker for a lowercase word: a known coin name or the word itself.
fn symbol_for(word: &str) -> String {
    SYMBOL_NAMES
        .iter()
        .find(|(name, _)| *name == word)
        .map(|(_, symbol)| symbol.to_string())
        .unwrap_or_else(|| word.to_ascii_uppercase())
}

/// Ticker symbols mentioned in `text`, in order of first mention.
pub fn mentioned_symbols(text: &str) -> Vec<String> {
    let mut symbols: Vec<String> = Vec::new();
    for word in lowercase_words(text) {
        let symbol = symbol_for(&word);
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

/// A price keyword, or nothing but cached tickers and connectives.
fn asks_for_price(text: &str, snapshot: &QuoteSnapshot) -> bool {
    let words: Vec<String> = lowercase_words(text).collect();
    if words.iter().any(|w| PRICE_WORDS.contains(&w.as_str())) {
        return true;
    }
    !words.is_empty()
        && words.iter().all(|w| {
            CONNECTIVES.contains(&w.as_str()) || snapshot.get(&symbol_for(w)).is_some()
        })
}

/// Answer a short price question naming cached symbols, or `None` to fall
/// through to the providers.
pub fn price_reply(text: &str, snapshot: &QuoteSnapshot) -> Option<String> {
    if snapshot.is_empty()
        || text.split_whitespace().count() > QUICK_REPLY_MAX_WORDS
        || !asks_for_price(text, snapshot)
    {
        return None;
    }

    let lines: Vec<String> = mentioned_symbols(text)
        .iter()
        .filter_map(|symbol| snapshot.get(symbol))
        .map(|record| {
            format!(
                "{}: ${} ({:+.2}% in 24h)",
                record.symbol,
                format_price(record.price),
                record.change_24h
            )
        })
        .collect();

    if lines.is_empty() {
        return None;
    }

    let mut reply = lines.join("\n");
    if snapshot.stale {
        match snapshot.fetched_at {
            Some(at) => reply.push_str(&format!(
                "\n\nPrices may be outdated (last updated {} UTC).",
                at.format("%H:%M")
            )),
            None => reply.push_str("\n\nPrices may be outdated."),
        }
    }
    Some(reply)
}

/// Price with thousands separators; sub-dollar prices keep six decimals.
pub fn format_price(price: f64) -> String {
    let decimals = if price.abs() >= 1.0 { 2 } else { 6 };
    let formatted = format!("{:.*}", decimals, price.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, ""));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if price < 0.0 { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}", sign, grouped)
    } else {
        format!("{}{}.{}", sign, grouped, frac_part)
    }
}
