//! Code grammar validation
//!
//! Turns raw OCR text into an extracted code. The grammar is a set of
//! case-insensitive prefixes, a fixed-length digit run and an optional
//! separator followed by a second digit run, e.g. `SGRO` + 10 digits or
//! `RO` + 13 digits + `_` + 6 digits. OCR output often carries garbage
//! around the code, so the leftmost match anywhere in the text wins.

use regex::Regex;
use serde::Serialize;

use crate::config::GrammarConfig;
use crate::error::{Result, ScanError};

/// A validated, upper-cased code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedCode(String);

impl ExtractedCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ExtractedCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compiled matcher for one grammar
#[derive(Debug, Clone)]
pub struct CodeValidator {
    pattern: Regex,
    whitelist: String,
}

impl CodeValidator {
    pub fn new(grammar: &GrammarConfig) -> Result<Self> {
        if grammar.prefixes.is_empty() {
            return Err(ScanError::InvalidGrammar("no prefixes configured".to_string()));
        }
        if grammar.digits == 0 {
            return Err(ScanError::InvalidGrammar("digit run length is zero".to_string()));
        }

        let prefixes = grammar
            .prefixes
            .iter()
            .map(|p| regex::escape(p.trim()))
            .collect::<Vec<_>>()
            .join("|");

        // Prefix is case-insensitive, digits are ASCII only
        let mut pattern = format!("(?i:{})[0-9]{{{}}}", prefixes, grammar.digits);
        match (&grammar.separator, grammar.second_digits) {
            (Some(sep), Some(n)) if !sep.is_empty() && n > 0 => {
                pattern.push_str(&format!("{}[0-9]{{{}}}", regex::escape(sep), n));
            }
            (None, None) => {}
            _ => {
                return Err(ScanError::InvalidGrammar(
                    "separator and second digit run must be set together".to_string(),
                ))
            }
        }

        let pattern = Regex::new(&pattern).map_err(|e| ScanError::InvalidGrammar(e.to_string()))?;

        Ok(Self {
            pattern,
            whitelist: build_whitelist(grammar),
        })
    }

    /// Characters the OCR engine may emit for this grammar
    pub fn whitelist(&self) -> &str {
        &self.whitelist
    }

    /// Find the leftmost code in whitespace-stripped text
    pub fn extract(&self, text: &str) -> Option<ExtractedCode> {
        self.pattern
            .find(text)
            .map(|m| ExtractedCode(m.as_str().to_uppercase()))
    }
}

/// Remove every whitespace character, including ones inside the text
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

fn build_whitelist(grammar: &GrammarConfig) -> String {
    let mut whitelist: String = ('A'..='Z').collect();
    if grammar.allow_lowercase {
        whitelist.extend('a'..='z');
    }
    whitelist.extend('0'..='9');

    // Prefixes match case-insensitively but codes are read upper-cased
    for c in grammar.prefixes.iter().flat_map(|p| p.trim().chars()) {
        c.to_uppercase().for_each(|u| push_unique(&mut whitelist, u));
        if grammar.allow_lowercase {
            c.to_lowercase().for_each(|l| push_unique(&mut whitelist, l));
        }
    }
    if let Some(sep) = &grammar.separator {
        for c in sep.chars() {
            push_unique(&mut whitelist, c);
        }
    }
    whitelist
}

fn push_unique(whitelist: &mut String, c: char) {
    if !whitelist.contains(c) {
        whitelist.push(c);
    }
}
