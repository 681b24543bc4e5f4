//! Pass 6: inflation adjuster.
//!
//! Authors mark historical dollar amounts with a year pseudo-link:
//! `[$5.00]($1975)`. The pass rewrites each into a span carrying the
//! original amount plus its present-day equivalent, computed from the
//! CPI-U annual series.

use crate::ast::{Attr, Block, Inline, inlines_to_text, walk_inlines_mut};

/// Reference year for "present-day" equivalents.
pub const CURRENT_YEAR: u32 = 2024;

/// (year, CPI-U annual average). Ratio against the reference year gives
/// the multiplier.
const CPI: &[(u32, f64)] = &[
    (1913, 9.9), (1914, 10.0), (1915, 10.1), (1916, 10.9), (1917, 12.8),
    (1918, 15.1), (1919, 17.3), (1920, 20.0), (1921, 17.9), (1922, 16.8),
    (1923, 17.1), (1924, 17.1), (1925, 17.5), (1926, 17.7), (1927, 17.4),
    (1928, 17.1), (1929, 17.1), (1930, 16.7), (1931, 15.2), (1932, 13.7),
    (1933, 13.0), (1934, 13.4), (1935, 13.7), (1936, 13.9), (1937, 14.4),
    (1938, 14.1), (1939, 13.9), (1940, 14.0), (1941, 14.7), (1942, 16.3),
    (1943, 17.3), (1944, 17.6), (1945, 18.0), (1946, 19.5), (1947, 22.3),
    (1948, 24.1), (1949, 23.8), (1950, 24.1), (1951, 26.0), (1952, 26.5),
    (1953, 26.7), (1954, 26.9), (1955, 26.8), (1956, 27.2), (1957, 28.1),
    (1958, 28.9), (1959, 29.1), (1960, 29.6), (1961, 29.9), (1962, 30.2),
    (1963, 30.6), (1964, 31.0), (1965, 31.5), (1966, 32.4), (1967, 33.4),
    (1968, 34.8), (1969, 36.7), (1970, 38.8), (1971, 40.5), (1972, 41.8),
    (1973, 44.4), (1974, 49.3), (1975, 53.8), (1976, 56.9), (1977, 60.6),
    (1978, 65.2), (1979, 72.6), (1980, 82.4), (1981, 90.9), (1982, 96.5),
    (1983, 99.6), (1984, 103.9), (1985, 107.6), (1986, 109.6), (1987, 113.6),
    (1988, 118.3), (1989, 124.0), (1990, 130.7), (1991, 136.2), (1992, 140.3),
    (1993, 144.5), (1994, 148.2), (1995, 152.4), (1996, 156.9), (1997, 160.5),
    (1998, 163.0), (1999, 166.6), (2000, 172.2), (2001, 177.1), (2002, 179.9),
    (2003, 184.0), (2004, 188.9), (2005, 195.3), (2006, 201.6), (2007, 207.3),
    (2008, 215.3), (2009, 214.5), (2010, 218.1), (2011, 224.9), (2012, 229.6),
    (2013, 233.0), (2014, 236.7), (2015, 237.0), (2016, 240.0), (2017, 245.1),
    (2018, 251.1), (2019, 255.7), (2020, 258.8), (2021, 271.0), (2022, 292.7),
    (2023, 304.7), (2024, 313.7),
];

fn cpi_for(year: u32) -> Option<f64> {
    CPI.iter().find(|(y, _)| *y == year).map(|(_, v)| *v)
}

pub fn run(blocks: &mut [Block]) {
    walk_inlines_mut(blocks, &mut |inline| {
        let Inline::Link(_, children, (target, _)) = inline else {
            return;
        };
        let Some(year) = parse_year_target(target) else {
            return;
        };
        let original_text = inlines_to_text(children);
        let Some(amount) = parse_dollar_amount(&original_text) else {
            return;
        };
        let Some(adjusted) = adjust(amount, year) else {
            // Unknown year: leave the text, drop the pseudo-link.
            *inline = Inline::Str(original_text);
            return;
        };

        let mut attr = Attr::empty();
        attr.add_class("inflation-adjusted");
        attr.set_kv("data-amount", &format!("{amount}"));
        attr.set_kv("data-year", &format!("{year}"));
        *inline = Inline::Span(
            attr,
            vec![Inline::Str(format!(
                "{original_text} ({year}; ≈{} in {CURRENT_YEAR})",
                format_usd(adjusted)
            ))],
        );
    });
}

/// `$1975` → 1975. Anything else is not an inflation pseudo-link.
fn parse_year_target(target: &str) -> Option<u32> {
    let digits = target.strip_prefix('$')?;
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

/// `$5`, `$5.00`, `$1,200` → the numeric amount.
fn parse_dollar_amount(text: &str) -> Option<f64> {
    let trimmed = text.trim().strip_prefix('$')?;
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    if value >= 0.0 { Some(value) } else { None }
}

pub(crate) fn adjust(amount: f64, year: u32) -> Option<f64> {
    let then = cpi_for(year)?;
    let now = cpi_for(CURRENT_YEAR)?;
    Some(amount * now / then)
}

/// Cents below $100, whole dollars with separators above.
pub(crate) fn format_usd(value: f64) -> String {
    if value < 100.0 {
        format!("${value:.2}")
    } else {
        let whole = value.round() as i64;
        let mut digits = whole.to_string();
        let mut grouped = String::new();
        while digits.len() > 3 {
            let tail = digits.split_off(digits.len() - 3);
            grouped = if grouped.is_empty() {
                tail
            } else {
                format!("{tail},{grouped}")
            };
        }
        if grouped.is_empty() {
            format!("${digits}")
        } else {
            format!("${digits},{grouped}")
        }
    }
}
