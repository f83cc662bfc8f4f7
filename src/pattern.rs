//! Filename date-pattern compiler.
//!
//! Raw data filenames look like `{site}_{timestamp}{extension}` where the
//! timestamp follows a user-facing token string such as `yyyymmddHHMM`.
//! This module turns that token string into the two forms every later stage
//! needs: a glob for directory scans and a strftime pattern for parsing the
//! timestamp back out of a filename.

use crate::config::Compression;
use crate::constants::{ASCII_EXTENSION, GZIP_EXTENSION};
use crate::error::{FluxRunError, Result};
use chrono::NaiveDateTime;
use chrono::format::{self, Parsed, StrftimeItems};
use glob::Pattern;

/// Placeholders understood in the token string, longest first
const PLACEHOLDERS: [(&str, &str); 5] = [
    ("yyyy", "%Y"),
    ("mm", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("MM", "%M"),
];

/// One piece of a tokenized format string
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Placeholder { width: usize, strftime: &'static str },
    Literal(char),
}

fn tokenize(tokens: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut rest = tokens;

    'outer: while let Some(c) = rest.chars().next() {
        for (placeholder, strftime) in PLACEHOLDERS {
            if rest.starts_with(placeholder) {
                out.push(Token::Placeholder {
                    width: placeholder.len(),
                    strftime,
                });
                rest = &rest[placeholder.len()..];
                continue 'outer;
            }
        }
        out.push(Token::Literal(c));
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Final `.xxx` suffix of the token string, if any
fn token_extension(tokens: &str) -> Option<&str> {
    let dot = tokens.rfind('.')?;
    let ext = &tokens[dot..];
    (dot > 0 && ext.len() > 1).then_some(ext)
}

/// Glob and parse pattern for one family of files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPattern {
    /// Shell glob matched against bare filenames
    pub glob: String,
    /// strftime pattern for the full filename
    pub parse: String,
}

impl CompiledPattern {
    fn build(site: &str, tokens: &[Token], suffix: &str) -> Self {
        let mut glob = format!("{}_", Pattern::escape(site));
        let mut parse = format!("{}_", site.replace('%', "%%"));

        for token in tokens {
            match token {
                Token::Placeholder { width, strftime } => {
                    glob.push_str(&"?".repeat(*width));
                    parse.push_str(strftime);
                }
                Token::Literal(c) => {
                    glob.push_str(&Pattern::escape(&c.to_string()));
                    if *c == '%' {
                        parse.push_str("%%");
                    } else {
                        parse.push(*c);
                    }
                }
            }
        }

        glob.push_str(&Pattern::escape(suffix));
        parse.push_str(&suffix.replace('%', "%%"));

        Self { glob, parse }
    }

    /// Compile the glob for matching
    pub fn matcher(&self) -> Result<Pattern> {
        Pattern::new(&self.glob).map_err(|e| {
            FluxRunError::settings(format!("Invalid filename pattern '{}': {}", self.glob, e))
        })
    }

    /// Parse the timestamp out of a filename
    ///
    /// Missing time fields default to zero: a pattern without minutes gives
    /// the full hour, one without time fields gives midnight.
    pub fn parse_timestamp(&self, filename: &str) -> Option<NaiveDateTime> {
        let mut parsed = Parsed::new();
        format::parse(&mut parsed, filename, StrftimeItems::new(&self.parse)).ok()?;

        if parsed.hour_div_12().is_none() && parsed.hour_mod_12().is_none() {
            parsed.set_hour(0).ok()?;
        }
        if parsed.minute().is_none() {
            parsed.set_minute(0).ok()?;
        }

        let date = parsed.to_naive_date().ok()?;
        let time = parsed.to_naive_time().ok()?;
        Some(date.and_time(time))
    }

    /// Render the filename that carries `timestamp`
    pub fn format(&self, timestamp: &NaiveDateTime) -> String {
        timestamp.format(&self.parse).to_string()
    }
}

/// Patterns for source files and for their staged (uncompressed) copies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePatterns {
    /// Files as they sit in the input directory
    pub source: CompiledPattern,
    /// Files after decompression into the staging directory
    pub staged: CompiledPattern,
    prototype: String,
}

impl FilenamePatterns {
    /// Compile the token string for `site`
    ///
    /// Without an extension in the token string, `.csv` is assumed. gzip
    /// compression adds `.gz` to the source pattern only.
    pub fn compile(tokens: &str, site: &str, compression: Compression) -> Self {
        let parsed = tokenize(tokens);
        let ascii_suffix = match token_extension(tokens) {
            Some(_) => "",
            None => ASCII_EXTENSION,
        };

        let staged = CompiledPattern::build(site, &parsed, ascii_suffix);
        let source = match compression {
            Compression::None => staged.clone(),
            Compression::Gzip => {
                CompiledPattern::build(site, &parsed, &format!("{}{}", ascii_suffix, GZIP_EXTENSION))
            }
        };

        Self {
            source,
            staged,
            prototype: format!("{}_{}{}", site, tokens, ascii_suffix),
        }
    }

    /// Filename prototype in EddyPro's own token notation
    pub fn prototype(&self) -> &str {
        &self.prototype
    }
}
