// File: src/errors.rs
//
// Error handling and reporting for Lucy.
// Provides a structured error type with source location information
// and pretty-printed error messages.

use colored::Colorize;
use std::fmt;

/// Source location information for tracking where code appears in a file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub file: Option<String>,
}

#[allow(dead_code)]
impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column, file: None }
    }

    pub fn with_file(line: usize, column: usize, file: String) -> Self {
        Self { line, column, file: Some(file) }
    }

    pub fn unknown() -> Self {
        Self { line: 0, column: 0, file: None }
    }

    pub fn from_location(loc: crate::ast::Location) -> Self {
        Self { line: loc.line, column: loc.column, file: None }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:{}:{}", file, self.line, self.column)
        } else {
            write!(f, "{}:{}", self.line, self.column)
        }
    }
}

/// The error taxonomy of the language: one kind per stage of the pipeline,
/// each carrying the specific error codes that stage can raise.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    /// Lexical — an unrecognized character.
    LexerError,
    /// Parse — `UNEXPECTED_TOKEN`.
    UnexpectedToken,
    /// Parse — assignment target is not an identifier or member expression.
    AssigningToRvalue,
    /// Parse — `goto`'s operand is not a call expression.
    GotoUnexpectedExpression,
    /// Codegen — a node shape the generator does not know how to lower.
    UnexpectedAstNode,
    /// Codegen — `break` outside any loop.
    UnsyntacticBreak,
    /// Codegen — `continue` outside any loop.
    UnsyntacticContinue,
    /// Runtime — wrong operand kinds, uncallable value, unhashable key, non-bool
    /// in a boolean-only position.
    TypeError,
    /// Runtime — wrong argument count at a call site.
    CallError,
    /// Runtime — `global`/store walk found no enclosing binding to alias.
    NonlocalError,
    /// Runtime — unresolved import path.
    ImportError,
    /// Runtime — a host (`ExtendFunction`) call raised or returned a non-Value.
    ExtendFunctionError,
    /// Runtime — `assert(x)` where `x` is `null` or `false`.
    AssertError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::LexerError => write!(f, "Lexer Error"),
            ErrorKind::UnexpectedToken => write!(f, "Unexpected Token"),
            ErrorKind::AssigningToRvalue => write!(f, "Assigning To Rvalue"),
            ErrorKind::GotoUnexpectedExpression => write!(f, "Goto Unexpected Expression"),
            ErrorKind::UnexpectedAstNode => write!(f, "Unexpected Ast Node"),
            ErrorKind::UnsyntacticBreak => write!(f, "Unsyntactic Break"),
            ErrorKind::UnsyntacticContinue => write!(f, "Unsyntactic Continue"),
            ErrorKind::TypeError => write!(f, "Type Error"),
            ErrorKind::CallError => write!(f, "Call Error"),
            ErrorKind::NonlocalError => write!(f, "Nonlocal Error"),
            ErrorKind::ImportError => write!(f, "Import Error"),
            ErrorKind::ExtendFunctionError => write!(f, "Extend Function Error"),
            ErrorKind::AssertError => write!(f, "Assert Error"),
        }
    }
}

/// A structured error with location information. Every stage of the pipeline
/// raises this same type; Lucy has no try/catch, so one flat error boundary
/// is all the host driver ever needs to handle (see error-handling design).
#[derive(Debug, Clone)]
pub struct LucyError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: SourceLocation,
    pub source_line: Option<String>,
    pub suggestion: Option<String>,
    pub help: Option<String>,
    pub note: Option<String>,
}

#[allow(dead_code)]
impl LucyError {
    pub fn new(kind: ErrorKind, message: String, location: SourceLocation) -> Self {
        Self {
            kind,
            message,
            location,
            source_line: None,
            suggestion: None,
            help: None,
            note: None,
        }
    }

    pub fn with_source(mut self, source_line: String) -> Self {
        self.source_line = Some(source_line);
        self
    }

    pub fn with_suggestion(mut self, suggestion: String) -> Self {
        self.suggestion = Some(suggestion);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.note = Some(note);
        self
    }

    pub fn lexer_error(message: String, location: SourceLocation) -> Self {
        Self::new(ErrorKind::LexerError, message, location)
    }

    pub fn unexpected_token(expected: &str, actual: &str, location: SourceLocation) -> Self {
        Self::new(
            ErrorKind::UnexpectedToken,
            format!("expected {expected}, found {actual}"),
            location,
        )
    }

    pub fn type_error(message: String, location: SourceLocation) -> Self {
        Self::new(ErrorKind::TypeError, message, location)
    }

    pub fn call_error(message: String, location: SourceLocation) -> Self {
        Self::new(ErrorKind::CallError, message, location)
    }

    pub fn undefined_name(name: &str, location: SourceLocation, candidates: &[String]) -> Self {
        let mut err = Self::new(
            ErrorKind::NonlocalError,
            format!("no binding named '{name}'"),
            location,
        );
        if let Some(suggestion) = find_closest_match(name, candidates) {
            err = err.with_suggestion(suggestion.to_string());
        }
        err
    }
}

impl fmt::Display for LucyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind_str = format!("{}", self.kind);
        writeln!(f, "{}: {}", kind_str.red().bold(), self.message.bold())?;

        let location_str = format!("  --> {}", self.location);
        writeln!(f, "{}", location_str.bright_blue())?;

        if let Some(ref source) = self.source_line {
            let line_num = self.location.line;
            let col_num = self.location.column;

            writeln!(f, "   {}", "|".bright_blue())?;
            writeln!(
                f,
                "{} {} {}",
                format!("{:3}", line_num).bright_blue(),
                "|".bright_blue(),
                source
            )?;
            writeln!(
                f,
                "   {} {}{}",
                "|".bright_blue(),
                " ".repeat(col_num.saturating_sub(1)),
                "^".red().bold()
            )?;
            writeln!(f, "   {}", "|".bright_blue())?;
        }

        if let Some(ref help) = self.help {
            writeln!(
                f,
                "   {} {}",
                "=".bright_yellow(),
                format!("help: {help}").bright_yellow()
            )?;
        }

        if let Some(ref suggestion) = self.suggestion {
            writeln!(
                f,
                "   {} {}",
                "=".bright_green(),
                format!("Did you mean '{suggestion}'?").bright_green()
            )?;
        }

        if let Some(ref note) = self.note {
            writeln!(f, "   {} {}", "=".bright_cyan(), format!("note: {note}").bright_cyan())?;
        }

        Ok(())
    }
}

/// Computes the Levenshtein distance between two strings.
/// Used for "Did you mean?" suggestions.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let len1 = s1.chars().count();
    let len2 = s2.chars().count();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate().take(len1 + 1) {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            matrix[i][j] = std::cmp::min(
                std::cmp::min(matrix[i - 1][j] + 1, matrix[i][j - 1] + 1),
                matrix[i - 1][j - 1] + cost,
            );
        }
    }

    matrix[len1][len2]
}

/// Find the closest match from a list of candidates using Levenshtein distance.
/// Returns None if no good match is found (distance > 3).
pub fn find_closest_match<'a>(target: &str, candidates: &'a [String]) -> Option<&'a str> {
    if candidates.is_empty() {
        return None;
    }

    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(target, candidate);
        if distance <= 3 && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.as_str());
        }
    }

    best_match
}

impl std::error::Error for LucyError {}
