//! Execution Profile Discovery
//!
//! Extracts the profile names declared in a workflow's `nextflow.config`.
//!
//! # Recognized Format
//!
//! ```text
//! profiles {
//!     standard { process.executor = 'local' }
//!     'docker' { docker.enabled = true }
//!     // slurm { ... }   <- commented out, ignored
//!     "singularity" {
//!         singularity.enabled = true
//!     }
//! }
//! ```
//!
//! Discovery never fails: a missing file, a missing block or unbalanced
//! braces all yield the single `standard` profile the engine assumes.

use std::collections::BTreeSet;
use std::fs;

use log::{debug, warn};

use super::instance::{WorkflowInstance, CONFIG_FILE, DEFAULT_PROFILE};

const PROFILES_KEYWORD: &str = "profiles";

/// Lexical state shared by both passes over the config text.
///
/// Braces inside `//` and `/* */` comments and inside quoted strings do not
/// count towards nesting depth. Quoted strings end at the closing quote or
/// at the end of the line, and `\` escapes the next character.
#[derive(Debug, Default)]
struct Lexer {
    comment: Option<Comment>,
    quote: Option<char>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Comment {
    Line,
    Block,
}

/// What a character means for brace tracking.
#[derive(Debug, PartialEq)]
enum Lexeme {
    Open,
    Close,
    /// Ordinary text, including quotes and quoted content.
    Text,
    /// Comment content, comment markers and comment-ending newlines.
    Skip,
}

impl Lexer {
    fn in_code(&self) -> bool {
        self.comment.is_none() && self.quote.is_none()
    }

    fn classify(&mut self, ch: char, next: Option<char>) -> (Lexeme, usize) {
        match self.comment {
            Some(Comment::Line) => {
                if ch == '\n' {
                    self.comment = None;
                }
                return (Lexeme::Skip, 1);
            }
            Some(Comment::Block) => {
                if ch == '*' && next == Some('/') {
                    self.comment = None;
                    return (Lexeme::Skip, 2);
                }
                return (Lexeme::Skip, 1);
            }
            None => {}
        }

        if let Some(quote) = self.quote {
            match ch {
                '\\' if next.is_some_and(|c| c != '\n') => return (Lexeme::Text, 2),
                '\n' => self.quote = None,
                c if c == quote => self.quote = None,
                _ => {}
            }
            return (Lexeme::Text, 1);
        }

        match ch {
            '/' if next == Some('/') => {
                self.comment = Some(Comment::Line);
                (Lexeme::Skip, 2)
            }
            '/' if next == Some('*') => {
                self.comment = Some(Comment::Block);
                (Lexeme::Skip, 2)
            }
            '\'' | '"' => {
                self.quote = Some(ch);
                (Lexeme::Text, 1)
            }
            '{' => (Lexeme::Open, 1),
            '}' => (Lexeme::Close, 1),
            _ => (Lexeme::Text, 1),
        }
    }
}

/// Returns the default profile set.
fn default_profiles() -> Vec<String> {
    vec![DEFAULT_PROFILE.to_string()]
}

/// Finds the byte offset of the `{` opening the first `profiles {` block.
///
/// Occurrences inside comments or quoted strings are ignored.
fn find_profiles_open(text: &str) -> Option<usize> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut lexer = Lexer::default();
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let in_code = lexer.in_code();
        let (_, advance) = lexer.classify(ch, next);

        if in_code && text[offset..].starts_with(PROFILES_KEYWORD) {
            let after = offset + PROFILES_KEYWORD.len();
            let rest = &text[after..];
            let trimmed = rest.trim_start();
            if trimmed.starts_with('{') {
                return Some(after + (rest.len() - trimmed.len()));
            }
        }
        i += advance;
    }
    None
}

/// Returns the contents strictly between the brace at `open` and its match.
fn matching_block(text: &str, open: usize) -> Option<&str> {
    let chars: Vec<(usize, char)> = text[open..].char_indices().collect();
    let mut lexer = Lexer::default();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let (offset, ch) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);
        let (lexeme, advance) = lexer.classify(ch, next);

        match lexeme {
            Lexeme::Open => depth += 1,
            Lexeme::Close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[open + 1..open + offset]);
                }
            }
            Lexeme::Text | Lexeme::Skip => {}
        }
        i += advance;
    }
    None
}

/// Strips whitespace and one layer of surrounding quotes from a name token.
fn normalize_name(token: &str) -> &str {
    let name = token.trim();
    let name = name.strip_prefix(['\'', '"']).unwrap_or(name);
    name.strip_suffix(['\'', '"']).unwrap_or(name)
}

/// Collects names declared at the top level of a profiles block body.
fn top_level_names(block: &str) -> BTreeSet<String> {
    let chars: Vec<char> = block.chars().collect();
    let mut lexer = Lexer::default();
    let mut names = BTreeSet::new();
    let mut depth = 0usize;
    let mut token = String::new();
    let mut i = 0;

    while i < chars.len() {
        let (lexeme, advance) = lexer.classify(chars[i], chars.get(i + 1).copied());

        match lexeme {
            Lexeme::Open => {
                if depth == 0 {
                    let name = normalize_name(&token);
                    if !name.is_empty() {
                        names.insert(name.to_string());
                    }
                }
                depth += 1;
                token.clear();
            }
            Lexeme::Close => {
                depth = depth.saturating_sub(1);
                token.clear();
            }
            Lexeme::Text if depth == 0 => token.push(chars[i]),
            Lexeme::Text | Lexeme::Skip => {}
        }
        i += advance;
    }
    names
}

/// Extracts profile names from configuration text.
///
/// The result is sorted and always contains `standard`.
///
/// # Example
///
/// ```
/// use glacier::workflow::profiles::discover_profiles;
///
/// let config = "profiles {\n  docker { docker.enabled = true }\n  // slurm {}\n  test {}\n}";
/// assert_eq!(discover_profiles(config), vec!["docker", "standard", "test"]);
/// ```
pub fn discover_profiles(config_text: &str) -> Vec<String> {
    let Some(open) = find_profiles_open(config_text) else {
        debug!("No profiles block found; using default profile");
        return default_profiles();
    };

    let Some(block) = matching_block(config_text, open) else {
        warn!("Could not find end of profiles block; using default profile");
        return default_profiles();
    };

    let mut names = top_level_names(block);
    names.insert(DEFAULT_PROFILE.to_string());
    names.into_iter().collect()
}

/// Lists the profiles offered by an instance's workflow definition.
///
/// Reads `nextflow.config` from the workflow version directory; an absent
/// or unreadable file yields the default profile.
pub fn available_profiles(instance: &WorkflowInstance) -> Vec<String> {
    let config_path = instance.project_path().join(CONFIG_FILE);

    match fs::read_to_string(&config_path) {
        Ok(text) => discover_profiles(&text),
        Err(e) => {
            debug!(
                "Config file {} not readable ({}); using default profile",
                config_path.display(),
                e
            );
            default_profiles()
        }
    }
}
