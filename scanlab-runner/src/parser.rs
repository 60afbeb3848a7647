//! Scanner output parser (HTML report or plain-text console output).
//!
//! HTML: section header rows carry a class such as `th-strongbuy` or
//! `section-sell`; each following row's first cell holds the ticker.
//!
//! Text: a line naming a section (`STRONG BUY`, `EARLY BUY`, `DIVIDEND`,
//! `SELL` with a section marker) switches the current section; uppercase
//! 2-5 letter words on the lines that follow are tickers, minus a stop list.

use scanlab_core::domain::Section;
use scanlab_core::scan::{ParsedScan, ScanParser};
use scanlab_core::EngineError;
use tracing::debug;

/// Words that look like tickers in scanner prose but never are.
const TEXT_STOP_WORDS: &[&str] = &[
    "BUY", "SELL", "HOLD", "STRONG", "EARLY", "DIVIDEND", "TIER", "TOP", "PSAR", "RSI", "OBV",
    "DMI", "ADX", "MACD", "PRSI", "ATR", "SBI", "THE", "AND", "FOR", "WITH", "FROM", "INTO",
    "ZONE", "SIGNAL", "PRICE", "DAYS", "STOCKS", "MODE", "MARKET", "SCAN", "REPORT", "SECTION",
    "CONFIRMED", "FRESH", "SIGNALS", "POSITIONS", "TICKER", "YIELD", "OPEN", "CLOSE", "HIGH",
    "LOW", "VOLUME", "PRIMARY", "LOGIC", "TREND", "SCORE", "ALIGNMENT", "ACCUMULATION", "BUYS",
    "SELLS", "HOLDS", "FILTER", "FILTERS", "SCANNED", "ANALYZED", "TRUE", "FALSE", "NULL", "NONE",
    "CLASS", "STYLE", "DIV", "TABLE", "COLOR", "WHITE", "GREEN", "RED", "BLUE", "BACKGROUND",
    "PADDING", "MARGIN", "FONT", "SIZE", "WEIGHT", "BOLD", "BORDER", "LEFT",
];

/// Column headers and filler that can land in a first table cell.
const CELL_STOP_WORDS: &[&str] = &[
    "TICKER", "SYMBOL", "STOCK", "NAME", "PRICE", "THE", "AND", "FOR", "BUY", "SELL",
];

const STAR_GLYPHS: &[char] = &['\u{2b50}', '\u{2605}', '\u{2606}'];

/// Where parsed tickers go. `Untracked` covers sections the engine ignores
/// (plain Buy, Hold) so their tickers don't leak into a neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Section(Section),
    Untracked,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOutputParser;

impl ScanOutputParser {
    pub fn new() -> Self {
        Self
    }

    pub fn is_html(raw: &str) -> bool {
        let lower = raw.to_ascii_lowercase();
        lower.contains("<html") || lower.contains("<table")
    }
}

impl ScanParser for ScanOutputParser {
    fn parse(&self, raw: &str) -> Result<ParsedScan, EngineError> {
        let (scan, saw_header) = if Self::is_html(raw) {
            parse_html(raw)
        } else {
            parse_text(raw)
        };
        if !saw_header {
            return Err(EngineError::Collaborator(
                "scanner output has no recognizable sections".into(),
            ));
        }
        debug!(
            strong = scan.section(Section::StrongBuy).len(),
            early = scan.section(Section::EarlyBuy).len(),
            dividend = scan.section(Section::Dividend).len(),
            sell = scan.section(Section::Sell).len(),
            "parsed scan"
        );
        Ok(scan)
    }
}

// ─── HTML ────────────────────────────────────────────────────────────

fn class_target(class_attr: &str) -> Option<Target> {
    class_attr.split_whitespace().find_map(|class| {
        let name = class
            .strip_prefix("th-")
            .or_else(|| class.strip_prefix("section-"))?;
        Some(match name {
            "strongbuy" => Target::Section(Section::StrongBuy),
            "earlybuy" => Target::Section(Section::EarlyBuy),
            "dividend" => Target::Section(Section::Dividend),
            "sell" => Target::Section(Section::Sell),
            "buy" | "hold" => Target::Untracked,
            _ => return None,
        })
    })
}

/// Value of `class="…"` (or single-quoted) inside a tag body.
fn class_attribute(tag: &str) -> Option<&str> {
    let lower = tag.to_ascii_lowercase();
    let at = lower.find("class=")? + "class=".len();
    let rest = &tag[at..];
    let quote = rest.chars().next()?;
    if quote == '"' || quote == '\'' {
        let body = &rest[1..];
        body.find(quote).map(|end| &body[..end])
    } else {
        rest.split(|c: char| c.is_whitespace() || c == '>').next()
    }
}

fn parse_html(raw: &str) -> (ParsedScan, bool) {
    let mut scan = ParsedScan::new();
    let mut target: Option<Target> = None;
    let mut saw_header = false;
    let mut cell_index = 0usize;
    let mut capture: Option<String> = None;

    for chunk in raw.split('<').skip(1) {
        let (tag, text) = chunk.split_once('>').unwrap_or((chunk, ""));
        let name: String = tag
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '/')
            .collect::<String>()
            .to_ascii_lowercase();

        match name.as_str() {
            "/td" => {
                if let (Some(cell), Some(Target::Section(section))) = (capture.take(), target) {
                    if let Some(ticker) = extract_ticker(&cell) {
                        scan.push(section, &ticker);
                    }
                }
            }
            "tr" => {
                cell_index = 0;
                capture = None;
                if let Some(t) = class_attribute(tag).and_then(class_target) {
                    target = Some(t);
                    saw_header = true;
                }
            }
            "td" => {
                cell_index += 1;
                capture = (cell_index == 1).then(String::new);
            }
            _ => {
                if !name.starts_with('/') {
                    if let Some(t) = class_attribute(tag).and_then(class_target) {
                        target = Some(t);
                        saw_header = true;
                    }
                }
            }
        }

        if let Some(buf) = capture.as_mut() {
            buf.push_str(text);
        }
    }
    (scan, saw_header)
}

/// Leading 1-5 letter symbol of a table cell, after dropping star glyphs
/// and whitespace. Six or more letters in a row is a word, not a ticker.
fn extract_ticker(cell: &str) -> Option<String> {
    let cleaned: String = cell
        .chars()
        .filter(|c| !c.is_whitespace() && !STAR_GLYPHS.contains(c))
        .collect::<String>()
        .to_uppercase();
    let letters: String = cleaned.chars().take_while(|c| c.is_ascii_uppercase()).collect();
    if letters.is_empty() || letters.len() > 5 {
        return None;
    }
    (!CELL_STOP_WORDS.contains(&letters.as_str())).then_some(letters)
}

// ─── Text ────────────────────────────────────────────────────────────

fn line_target(line: &str, upper: &str, current: Option<Target>) -> Option<Target> {
    let has = |w: &str| upper.contains(w);
    if (has("STRONG") && has("BUY")) || has("SECTION-STRONGBUY") || has("TH-STRONGBUY") {
        return Some(Target::Section(Section::StrongBuy));
    }
    if (has("EARLY") && has("BUY")) || has("SECTION-EARLYBUY") || has("TH-EARLYBUY") {
        return Some(Target::Section(Section::EarlyBuy));
    }
    if has("DIVIDEND") || line.contains('\u{1f4b0}') {
        return Some(Target::Section(Section::Dividend));
    }
    if has("SECTION-HOLD") || (has("HOLD") && line.contains('\u{23f8}')) {
        return Some(Target::Untracked);
    }
    if has("SECTION-SELL")
        || (has("SELL")
            && (has("SECTION") || has("ZONE") || line.contains('\u{1f534}') || upper.starts_with("SELL")))
    {
        return Some(Target::Section(Section::Sell));
    }
    let in_buy_family = matches!(
        current,
        Some(Target::Section(Section::StrongBuy | Section::EarlyBuy))
    );
    if has("BUY") && !has("SELL") && !in_buy_family {
        return Some(Target::Untracked);
    }
    None
}

fn parse_text(raw: &str) -> (ParsedScan, bool) {
    let mut scan = ParsedScan::new();
    let mut target: Option<Target> = None;
    let mut saw_header = false;

    for line in raw.lines() {
        let line = line.trim();
        let upper = line.to_uppercase();

        if let Some(t) = line_target(line, &upper, target) {
            target = Some(t);
            saw_header = true;
            continue;
        }
        if line.is_empty() || line.starts_with('=') || line.starts_with('-') {
            continue;
        }
        let Some(Target::Section(section)) = target else {
            continue;
        };
        for word in upper.split(|c: char| !(c.is_alphanumeric() || c == '_')) {
            let is_symbol = (2..=5).contains(&word.len()) && word.chars().all(|c| c.is_ascii_uppercase());
            if is_symbol && !TEXT_STOP_WORDS.contains(&word) {
                scan.push(section, word);
            }
        }
    }
    (scan, saw_header)
}
