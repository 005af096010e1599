// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Language parsers producing per-file structural summaries.
//!
//! Each parser implements the `LanguageParser` trait and turns raw content
//! into a [`FileAst`]. A syntactically broken file never fails the pipeline:
//! the parser returns an AST with `parse_error` set and an empty body.
//!
//! # Supported Languages
//!
//! - **TypeScript/JavaScript** (`ts`, `tsx`, `js`, `jsx`, `mjs`, `cjs`):
//!   ES modules, CommonJS require, dynamic imports, re-exports, functions,
//!   classes, interfaces and type aliases.
//!
//! # Adding a New Language
//!
//! 1. Create a new file in `src/indexer/languages/`
//! 2. Implement the `LanguageParser` trait
//! 3. Register in `ParserRegistry::new()`

pub mod lexer;
pub mod typescript;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Source-file kinds the indexer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageKind {
    TypeScript,
    Tsx,
    JavaScript,
    Jsx,
}

impl LanguageKind {
    /// Detect the kind from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ts" | "mts" | "cts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "js" | "mjs" | "cjs" => Some(Self::JavaScript),
            "jsx" => Some(Self::Jsx),
            _ => None,
        }
    }

    /// Detect the kind from a path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Where an import points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportKind {
    /// Relative or absolute path inside the project
    Internal,
    /// Third-party package
    External,
    /// Runtime built-in module (`fs`, `node:path`, ...)
    Builtin,
}

/// One import statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    /// Local names bound by the import
    pub names: Vec<String>,
    /// Module specifier as written
    pub source: String,
    /// 1-indexed line
    pub line: u32,
    pub kind: ImportKind,
    /// Whether a default binding is imported
    pub is_default: bool,
    /// `import type ...` / `export type ... from`
    pub is_type_only: bool,
}

/// Kind of exported binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    Function,
    Class,
    Variable,
    Interface,
    Type,
    Enum,
    Namespace,
    ReExport,
    Other,
}

/// One exported name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportInfo {
    pub name: String,
    pub line: u32,
    pub is_default: bool,
    pub kind: ExportKind,
}

/// A top-level function or function-valued binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub params: Vec<String>,
    pub is_async: bool,
    pub is_exported: bool,
}

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

/// A class method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub params: Vec<String>,
    pub is_async: bool,
    pub is_static: bool,
    pub visibility: Visibility,
}

/// A top-level class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub methods: Vec<MethodInfo>,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub is_exported: bool,
    pub is_abstract: bool,
}

/// A top-level interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub name: String,
    pub line_start: u32,
    pub line_end: u32,
    pub extends: Vec<String>,
    pub is_exported: bool,
}

/// A top-level type alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeAliasInfo {
    pub name: String,
    pub line: u32,
    pub is_exported: bool,
}

/// Structural summary of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAst {
    pub imports: Vec<ImportInfo>,
    pub exports: Vec<ExportInfo>,
    pub functions: Vec<FunctionInfo>,
    pub classes: Vec<ClassInfo>,
    pub interfaces: Vec<InterfaceInfo>,
    pub type_aliases: Vec<TypeAliasInfo>,
    pub parse_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_error_message: Option<String>,
}

impl FileAst {
    /// An AST for a file that failed to parse.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            parse_error: true,
            parse_error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Names this file declares at top level, with their line and kind.
    pub fn declarations(&self) -> Vec<(&str, u32, &'static str)> {
        let mut out = Vec::new();
        for f in &self.functions {
            out.push((f.name.as_str(), f.line_start, "function"));
        }
        for c in &self.classes {
            out.push((c.name.as_str(), c.line_start, "class"));
            for m in &c.methods {
                out.push((m.name.as_str(), m.line_start, "method"));
            }
        }
        for i in &self.interfaces {
            out.push((i.name.as_str(), i.line_start, "interface"));
        }
        for t in &self.type_aliases {
            out.push((t.name.as_str(), t.line, "type"));
        }
        out
    }
}

/// Trait for language-specific parsing.
///
/// Implementations should be stateless and thread-safe.
pub trait LanguageParser: Send + Sync {
    /// Kinds this parser handles.
    fn kinds(&self) -> &[LanguageKind];

    /// Parse source content into a structural summary.
    fn parse(&self, content: &str, kind: LanguageKind) -> FileAst;

    /// Resolve an internal import specifier to an indexed file.
    ///
    /// `from_file` and every entry of `known_files` are project-relative,
    /// `/`-separated paths. Returns `None` for external/builtin imports and
    /// for internal ones that match no known file.
    fn resolve_import(
        &self,
        import: &ImportInfo,
        from_file: &str,
        known_files: &HashSet<String>,
    ) -> Option<String>;
}

/// Registry of language parsers.
pub struct ParserRegistry {
    parsers: Vec<Box<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// Create a new registry with all built-in parsers.
    pub fn new() -> Self {
        Self {
            parsers: vec![Box::new(typescript::TypeScriptParser::new())],
        }
    }

    /// Get the parser for a kind.
    pub fn parser_for(&self, kind: LanguageKind) -> Option<&dyn LanguageParser> {
        self.parsers
            .iter()
            .find(|p| p.kinds().contains(&kind))
            .map(|p| p.as_ref())
    }

    /// Get the parser for a file path.
    pub fn parser_for_path(&self, path: &Path) -> Option<&dyn LanguageParser> {
        LanguageKind::from_path(path).and_then(|kind| self.parser_for(kind))
    }

    /// Parse content of the given kind.
    pub fn parse(&self, content: &str, kind: LanguageKind) -> FileAst {
        match self.parser_for(kind) {
            Some(parser) => parser.parse(content, kind),
            None => FileAst::failed(format!("No parser registered for {:?}", kind)),
        }
    }

    /// Parse a file, detecting its kind from the path.
    pub fn parse_path(&self, path: &Path, content: &str) -> Option<FileAst> {
        let kind = LanguageKind::from_path(path)?;
        Some(self.parse(content, kind))
    }

    /// Resolve an import of `from_file` against the known file set.
    pub fn resolve_import(
        &self,
        import: &ImportInfo,
        from_file: &str,
        known_files: &HashSet<String>,
    ) -> Option<String> {
        self.parser_for_path(Path::new(from_file))
            .and_then(|p| p.resolve_import(import, from_file, known_files))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse content with the built-in parsers.
pub fn parse_file(content: &str, kind: LanguageKind) -> FileAst {
    ParserRegistry::new().parse(content, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(LanguageKind::from_extension("ts"), Some(LanguageKind::TypeScript));
        assert_eq!(LanguageKind::from_extension("TSX"), Some(LanguageKind::Tsx));
        assert_eq!(LanguageKind::from_extension("mjs"), Some(LanguageKind::JavaScript));
        assert_eq!(LanguageKind::from_extension("cjs"), Some(LanguageKind::JavaScript));
        assert_eq!(LanguageKind::from_extension("jsx"), Some(LanguageKind::Jsx));
        assert_eq!(LanguageKind::from_extension("rs"), None);
    }

    #[test]
    fn test_registry_covers_all_kinds() {
        let registry = ParserRegistry::new();
        for kind in [
            LanguageKind::TypeScript,
            LanguageKind::Tsx,
            LanguageKind::JavaScript,
            LanguageKind::Jsx,
        ] {
            assert!(registry.parser_for(kind).is_some());
        }
        assert!(registry.parser_for_path(Path::new("README.md")).is_none());
    }

    #[test]
    fn test_failed_ast_has_empty_body() {
        let ast = FileAst::failed("boom");
        assert!(ast.parse_error);
        assert_eq!(ast.parse_error_message.as_deref(), Some("boom"));
        assert!(ast.imports.is_empty());
        assert!(ast.functions.is_empty());
    }

    #[test]
    fn test_parse_file_reports_parse_error() {
        let ast = parse_file("function broken() {", LanguageKind::TypeScript);
        assert!(ast.parse_error);
        assert!(ast.functions.is_empty());
    }

    #[test]
    fn test_declarations_lists_members() {
        let ast = parse_file(
            "export class A {\n  run() {\n  }\n}\nfunction b() {}\n",
            LanguageKind::TypeScript,
        );
        let names: Vec<&str> = ast.declarations().iter().map(|d| d.0).collect();
        assert!(names.contains(&"A"));
        assert!(names.contains(&"run"));
        assert!(names.contains(&"b"));
    }
}
