//! Input validation utilities

use crate::constants::MAX_UNIT_NAME_LENGTH;

/// Keywords that cannot name a crate (strict and reserved, all editions)
const RESERVED_WORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "Self", "static", "struct", "super", "trait", "true", "try", "type",
    "typeof", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Crates every unit links implicitly
const RESERVED_CRATES: &[&str] = &["std", "core", "alloc", "test", "proc_macro"];

/// Validate that a unit name can be used as a crate name and file stem
pub fn validate_unit_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Unit name must not be empty");
    }
    if name.len() as u64 > MAX_UNIT_NAME_LENGTH {
        return Err("Unit name is too long");
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("Unit name can only contain ASCII letters, digits, and underscores");
    }
    if !name
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
    {
        return Err("Unit name must start with a letter or underscore");
    }
    if name == "_" {
        return Err("Unit name must not be a lone underscore");
    }
    if RESERVED_WORDS.contains(&name) {
        return Err("Unit name must not be a keyword");
    }
    if RESERVED_CRATES.contains(&name) {
        return Err("Unit name must not shadow a built-in crate");
    }
    Ok(())
}
