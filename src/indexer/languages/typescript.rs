// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! TypeScript/JavaScript parser.
//!
//! Extracts from TypeScript and JavaScript sources:
//! - `import` statements (ES modules, side-effect, dynamic) and `require()` calls
//! - `export` declarations, lists, defaults and re-exports
//! - top-level functions, classes (with methods), interfaces and type aliases
//!
//! Regexes run over the comment-stripped view of the file; block extents
//! come from the lexer's skeleton so braces inside strings never count.

use regex::{Captures, Regex};
use std::collections::HashSet;

use super::lexer::MaskedSource;
use super::{
    ClassInfo, ExportInfo, ExportKind, FileAst, FunctionInfo, ImportInfo, ImportKind,
    InterfaceInfo, LanguageKind, LanguageParser, MethodInfo, TypeAliasInfo, Visibility,
};

/// Extensions tried, in order, when resolving an extension-less specifier.
const RESOLVE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx", ".mjs", ".cjs"];

/// Node.js core modules.
const NODE_BUILTINS: &[&str] = &[
    "assert",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "domain",
    "events",
    "fs",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "repl",
    "stream",
    "string_decoder",
    "sys",
    "timers",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Identifiers that look like method heads but are statements.
const NON_METHOD_NAMES: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "new", "function", "super", "await",
    "typeof", "with", "do", "else", "throw", "delete", "void",
];

/// Parser for TypeScript and JavaScript source files.
pub struct TypeScriptParser {
    /// import x from 'y'; import { a, b as c } from 'y'; import type { T } from 'y'
    import_from_regex: Regex,
    /// import 'y'
    import_side_effect_regex: Regex,
    /// import('y')
    import_dynamic_regex: Regex,
    /// const x = require('y'), const { a } = require('y'), require('y')
    require_regex: Regex,
    /// export { x } from 'y'; export * from 'y'; export * as ns from 'y'
    export_from_regex: Regex,
    /// export { x, y as z }
    export_list_regex: Regex,
    /// export function/class/const/let/var/interface/type/enum/namespace name
    export_decl_regex: Regex,
    /// export default ...
    export_default_regex: Regex,
    /// module.exports = ...; exports.x = ...
    cjs_export_regex: Regex,
    /// function name(...)
    function_regex: Regex,
    /// const name = (...) => / async function / x =>
    arrow_regex: Regex,
    /// class Name extends X implements Y {
    class_regex: Regex,
    /// method heads inside a class body line
    method_regex: Regex,
    /// name = (...) => inside a class body line
    property_arrow_regex: Regex,
    /// interface Name extends X {
    interface_regex: Regex,
    /// type Name = ...
    type_alias_regex: Regex,
    /// extends Base
    extends_regex: Regex,
    /// implements A, B
    implements_regex: Regex,
}

impl TypeScriptParser {
    /// Create a new TypeScript/JavaScript parser.
    pub fn new() -> Self {
        Self {
            import_from_regex: Regex::new(
                r#"(?m)^[ \t]*import\s+(type\s+)?([\w$*{}\s,]+?)\s*from\s*['"]([^'"\n]+)['"]"#,
            )
            .unwrap(),
            import_side_effect_regex: Regex::new(r#"(?m)^[ \t]*import\s*['"]([^'"\n]+)['"]"#)
                .unwrap(),
            import_dynamic_regex: Regex::new(r#"\bimport\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#).unwrap(),
            require_regex: Regex::new(
                r#"(?:\b(?:const|let|var)\s+([\w$]+|\{[^}]*\})\s*=\s*)?\brequire\s*\(\s*['"]([^'"\n]+)['"]\s*\)"#,
            )
            .unwrap(),
            export_from_regex: Regex::new(
                r#"(?m)^[ \t]*export\s+(type\s+)?(\*(?:\s+as\s+[\w$]+)?|\{[^}]*\})\s*from\s*['"]([^'"\n]+)['"]"#,
            )
            .unwrap(),
            export_list_regex: Regex::new(r#"(?m)^[ \t]*export\s+(?:type\s+)?\{([^}]*)\}"#).unwrap(),
            export_decl_regex: Regex::new(
                r#"(?m)^[ \t]*export\s+(?:declare\s+)?(?:abstract\s+)?(?:async\s+)?(function\s*\*?\s*|(?:class|const|let|var|interface|type|enum|namespace|module)\s+)([\w$]+)"#,
            )
            .unwrap(),
            export_default_regex: Regex::new(
                r#"(?m)^[ \t]*export\s+default\s+(?:(?:abstract\s+)?(?:async\s+)?(function|class)\b\s*\*?\s*([\w$]+)?|([\w$]+))?"#,
            )
            .unwrap(),
            cjs_export_regex: Regex::new(
                r#"(?m)^[ \t]*(?:module\.exports|exports)(?:\.([\w$]+))?\s*=[^=]"#,
            )
            .unwrap(),
            function_regex: Regex::new(
                r#"(?m)^[ \t]*(export\s+)?(?:default\s+)?(?:declare\s+)?(async\s+)?function\s*\*?\s*([\w$]+)"#,
            )
            .unwrap(),
            arrow_regex: Regex::new(
                r#"(?m)^[ \t]*(export\s+)?(?:declare\s+)?(?:const|let|var)\s+([\w$]+)\s*(?::[^=\n]+)?=\s*(async\s+)?(?:(function)\b|(?:<[^>\n]*>\s*)?\(([^)]*)\)\s*(?::[^=\n]+)?=>|([\w$]+)\s*=>)"#,
            )
            .unwrap(),
            class_regex: Regex::new(
                r#"(?m)^[ \t]*(export\s+)?(?:default\s+)?(?:declare\s+)?(abstract\s+)?class\s+([\w$]+)([^{]*)\{"#,
            )
            .unwrap(),
            method_regex: Regex::new(
                r#"^[ \t]*((?:(?:public|private|protected|static|async|readonly|abstract|override|declare)\s+)*)(?:(?:get|set)\s+)?(?:\*\s*)?(#?[\w$]+)\s*\??\s*(?:<[^>]*>)?\s*\("#,
            )
            .unwrap(),
            property_arrow_regex: Regex::new(
                r#"^[ \t]*((?:(?:public|private|protected|static|readonly)\s+)*)(#?[\w$]+)\s*(?::[^=]+)?=\s*(async\s+)?(?:\(([^)]*)\)|([\w$]+))\s*(?::[^=]+)?=>"#,
            )
            .unwrap(),
            interface_regex: Regex::new(
                r#"(?m)^[ \t]*(export\s+)?(?:declare\s+)?interface\s+([\w$]+)\s*(?:<[^{]*?>)?\s*(?:extends\s+([^{]+?))?\s*\{"#,
            )
            .unwrap(),
            type_alias_regex: Regex::new(
                r#"(?m)^[ \t]*(export\s+)?(?:declare\s+)?type\s+([\w$]+)\s*(?:<[^=\n]*>)?\s*="#,
            )
            .unwrap(),
            extends_regex: Regex::new(r#"\bextends\s+([\w$.]+)"#).unwrap(),
            implements_regex: Regex::new(r#"\bimplements\s+([^{]+)"#).unwrap(),
        }
    }

    /// Classify an import specifier.
    pub fn classify_import(source: &str) -> ImportKind {
        if source.starts_with('.') || source.starts_with('/') {
            ImportKind::Internal
        } else if source.starts_with("node:") {
            ImportKind::Builtin
        } else {
            let head = source.split('/').next().unwrap_or(source);
            if NODE_BUILTINS.contains(&head) {
                ImportKind::Builtin
            } else {
                ImportKind::External
            }
        }
    }

    fn parse_imports(&self, masked: &MaskedSource) -> Vec<ImportInfo> {
        let text = masked.without_comments.as_str();
        let mut imports = Vec::new();

        for cap in self.import_from_regex.captures_iter(text) {
            let Some(source) = cap.get(3) else { continue };
            if !in_code(masked, source.start() - 1) {
                continue;
            }
            let (names, is_default) = parse_import_clause(cap.get(2).map_or("", |m| m.as_str()));
            imports.push(ImportInfo {
                names,
                source: source.as_str().to_string(),
                line: masked.line_of(source.start()),
                kind: Self::classify_import(source.as_str()),
                is_default,
                is_type_only: cap.get(1).is_some(),
            });
        }

        for cap in self.import_side_effect_regex.captures_iter(text) {
            let Some(source) = cap.get(1) else { continue };
            if !in_code(masked, source.start() - 1) {
                continue;
            }
            imports.push(ImportInfo {
                names: Vec::new(),
                source: source.as_str().to_string(),
                line: masked.line_of(source.start()),
                kind: Self::classify_import(source.as_str()),
                is_default: false,
                is_type_only: false,
            });
        }

        for cap in self.import_dynamic_regex.captures_iter(text) {
            let Some(source) = cap.get(1) else { continue };
            if !in_code(masked, cap.get(0).map_or(0, |m| m.start())) {
                continue;
            }
            imports.push(ImportInfo {
                names: Vec::new(),
                source: source.as_str().to_string(),
                line: masked.line_of(source.start()),
                kind: Self::classify_import(source.as_str()),
                is_default: false,
                is_type_only: false,
            });
        }

        for cap in self.require_regex.captures_iter(text) {
            let Some(source) = cap.get(2) else { continue };
            if !in_code(masked, source.start() - 1) {
                continue;
            }
            let (names, is_default) = match cap.get(1).map(|m| m.as_str()) {
                Some(binding) if binding.starts_with('{') => {
                    (parse_destructuring(binding), false)
                }
                Some(binding) => (vec![binding.to_string()], true),
                None => (Vec::new(), false),
            };
            imports.push(ImportInfo {
                names,
                source: source.as_str().to_string(),
                line: masked.line_of(source.start()),
                kind: Self::classify_import(source.as_str()),
                is_default,
                is_type_only: false,
            });
        }

        for cap in self.export_from_regex.captures_iter(text) {
            let Some(source) = cap.get(3) else { continue };
            if !in_code(masked, source.start() - 1) {
                continue;
            }
            let clause = cap.get(2).map_or("", |m| m.as_str());
            let names = if clause.starts_with('{') {
                split_specifiers(clause.trim_start_matches('{').trim_end_matches('}'))
                    .into_iter()
                    .map(|(original, _)| original)
                    .collect()
            } else {
                Vec::new()
            };
            imports.push(ImportInfo {
                names,
                source: source.as_str().to_string(),
                line: masked.line_of(source.start()),
                kind: Self::classify_import(source.as_str()),
                is_default: false,
                is_type_only: cap.get(1).is_some(),
            });
        }

        imports.sort_by_key(|i| i.line);
        imports
    }

    fn parse_exports(&self, masked: &MaskedSource) -> Vec<ExportInfo> {
        let text = masked.without_comments.as_str();
        let mut exports = Vec::new();

        for cap in self.export_decl_regex.captures_iter(text) {
            let (Some(keyword), Some(name)) = (cap.get(1), cap.get(2)) else {
                continue;
            };
            if !in_code(masked, name.start()) {
                continue;
            }
            let kind = match keyword.as_str().trim().trim_end_matches('*').trim() {
                "function" => ExportKind::Function,
                "class" => ExportKind::Class,
                "const" | "let" | "var" => ExportKind::Variable,
                "interface" => ExportKind::Interface,
                "type" => ExportKind::Type,
                "enum" => ExportKind::Enum,
                "namespace" | "module" => ExportKind::Namespace,
                _ => ExportKind::Other,
            };
            exports.push(ExportInfo {
                name: name.as_str().to_string(),
                line: masked.line_of(name.start()),
                is_default: false,
                kind,
            });
        }

        for cap in self.export_default_regex.captures_iter(text) {
            let Some(whole) = cap.get(0) else { continue };
            let keyword_at = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            if !in_code(masked, keyword_at) {
                continue;
            }
            let (name, kind) = match (cap.get(1), cap.get(2), cap.get(3)) {
                (Some(decl), name, _) => (
                    name.map_or("default", |m| m.as_str()),
                    if decl.as_str() == "class" {
                        ExportKind::Class
                    } else {
                        ExportKind::Function
                    },
                ),
                (None, _, Some(ident)) if !NON_METHOD_NAMES.contains(&ident.as_str()) => {
                    (ident.as_str(), ExportKind::Other)
                }
                _ => ("default", ExportKind::Other),
            };
            exports.push(ExportInfo {
                name: name.to_string(),
                line: masked.line_of(keyword_at),
                is_default: true,
                kind,
            });
        }

        for cap in self.export_list_regex.captures_iter(text) {
            let (Some(whole), Some(list)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            if !in_code(masked, list.start() - 1) {
                continue;
            }
            let reexport = text[whole.end()..].trim_start().starts_with("from");
            for (_, exported) in split_specifiers(list.as_str()) {
                exports.push(ExportInfo {
                    is_default: exported == "default",
                    name: exported,
                    line: masked.line_of(list.start()),
                    kind: if reexport {
                        ExportKind::ReExport
                    } else {
                        ExportKind::Other
                    },
                });
            }
        }

        for cap in self.export_from_regex.captures_iter(text) {
            let (Some(clause), Some(source)) = (cap.get(2), cap.get(3)) else {
                continue;
            };
            if !clause.as_str().starts_with('*') || !in_code(masked, source.start() - 1) {
                continue;
            }
            let name = clause
                .as_str()
                .split_whitespace()
                .last()
                .filter(|n| *n != "*")
                .unwrap_or("*");
            exports.push(ExportInfo {
                name: name.to_string(),
                line: masked.line_of(clause.start()),
                is_default: false,
                kind: ExportKind::ReExport,
            });
        }

        for cap in self.cjs_export_regex.captures_iter(text) {
            let Some(whole) = cap.get(0) else { continue };
            let keyword_at = whole.start() + (whole.as_str().len() - whole.as_str().trim_start().len());
            if !in_code(masked, keyword_at) || masked.depth_at_line(masked.line_of(keyword_at)) != 0 {
                continue;
            }
            let (name, is_default) = match cap.get(1) {
                Some(name) => (name.as_str().to_string(), false),
                None => ("default".to_string(), true),
            };
            exports.push(ExportInfo {
                name,
                line: masked.line_of(keyword_at),
                is_default,
                kind: ExportKind::Other,
            });
        }

        exports.sort_by_key(|e| e.line);
        exports
    }

    fn parse_functions(&self, masked: &MaskedSource) -> Vec<FunctionInfo> {
        let text = masked.without_comments.as_str();
        let mut functions = Vec::new();

        for cap in self.function_regex.captures_iter(text) {
            let Some(name) = cap.get(3) else { continue };
            if !is_top_level(masked, name.start()) {
                continue;
            }
            functions.push(FunctionInfo {
                name: name.as_str().to_string(),
                line_start: masked.line_of(name.start()),
                line_end: masked.block_end_line(name.end()),
                params: params_after(masked, name.end()),
                is_async: cap.get(2).is_some(),
                is_exported: cap.get(1).is_some(),
            });
        }

        for cap in self.arrow_regex.captures_iter(text) {
            let (Some(name), Some(whole)) = (cap.get(2), cap.get(0)) else {
                continue;
            };
            if !is_top_level(masked, name.start()) {
                continue;
            }
            let params = if let Some(keyword) = cap.get(4) {
                params_after(masked, keyword.end())
            } else if let Some(list) = cap.get(5) {
                split_params(list.as_str())
            } else {
                cap.get(6)
                    .map(|p| vec![p.as_str().to_string()])
                    .unwrap_or_default()
            };
            functions.push(FunctionInfo {
                name: name.as_str().to_string(),
                line_start: masked.line_of(name.start()),
                line_end: masked.block_end_line(whole.end()),
                params,
                is_async: cap.get(3).is_some(),
                is_exported: cap.get(1).is_some(),
            });
        }

        functions.sort_by_key(|f| f.line_start);
        functions
    }

    fn parse_classes(&self, masked: &MaskedSource) -> Vec<ClassInfo> {
        let text = masked.without_comments.as_str();
        let mut classes = Vec::new();

        for cap in self.class_regex.captures_iter(text) {
            let (Some(name), Some(whole)) = (cap.get(3), cap.get(0)) else {
                continue;
            };
            if !is_top_level(masked, name.start()) {
                continue;
            }
            let heritage = cap.get(4).map_or("", |m| m.as_str());
            let extends = self
                .extends_regex
                .captures(heritage)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            let implements = self
                .implements_regex
                .captures(heritage)
                .and_then(|c| c.get(1))
                .map(|m| split_type_list(m.as_str()))
                .unwrap_or_default();

            let open_brace = whole.end() - 1;
            let line_start = masked.line_of(name.start());
            let line_end = masked.block_end_line(open_brace);
            let body_depth = masked.depth_at_line(line_start) + 1;

            classes.push(ClassInfo {
                name: name.as_str().to_string(),
                line_start,
                line_end,
                methods: self.parse_methods(masked, line_start + 1, line_end, body_depth),
                extends,
                implements,
                is_exported: cap.get(1).is_some(),
                is_abstract: cap.get(2).is_some(),
            });
        }

        classes
    }

    fn parse_methods(
        &self,
        masked: &MaskedSource,
        first_line: u32,
        last_line: u32,
        body_depth: u32,
    ) -> Vec<MethodInfo> {
        let text = masked.without_comments.as_str();
        let mut methods = Vec::new();

        for line in first_line..last_line {
            if masked.depth_at_line(line) != body_depth {
                continue;
            }
            let start = masked.line_start(line);
            let end = masked.line_start(line + 1).min(text.len());
            let line_text = text[start..end].trim_end_matches('\n');

            if let Some(cap) = self.property_arrow_regex.captures(line_text) {
                if let Some(method) = self.method_from_property(masked, start, &cap) {
                    methods.push(method);
                    continue;
                }
            }
            if let Some(cap) = self.method_regex.captures(line_text) {
                let Some(name) = cap.get(2) else { continue };
                if NON_METHOD_NAMES.contains(&name.as_str()) || !in_code(masked, start + name.start()) {
                    continue;
                }
                let modifiers = cap.get(1).map_or("", |m| m.as_str());
                let name_end = start + name.end();
                methods.push(MethodInfo {
                    name: name.as_str().to_string(),
                    line_start: line,
                    line_end: masked.block_end_line(name_end),
                    params: params_after(masked, name_end),
                    is_async: has_modifier(modifiers, "async"),
                    is_static: has_modifier(modifiers, "static"),
                    visibility: visibility(modifiers, name.as_str()),
                });
            }
        }

        methods
    }

    fn method_from_property(
        &self,
        masked: &MaskedSource,
        line_offset: usize,
        cap: &Captures<'_>,
    ) -> Option<MethodInfo> {
        let name = cap.get(2)?;
        let whole = cap.get(0)?;
        if !in_code(masked, line_offset + name.start()) {
            return None;
        }
        let modifiers = cap.get(1).map_or("", |m| m.as_str());
        let params = match (cap.get(4), cap.get(5)) {
            (Some(list), _) => split_params(list.as_str()),
            (None, Some(single)) => vec![single.as_str().to_string()],
            _ => Vec::new(),
        };
        Some(MethodInfo {
            name: name.as_str().to_string(),
            line_start: masked.line_of(line_offset + name.start()),
            line_end: masked.block_end_line(line_offset + whole.end()),
            params,
            is_async: cap.get(3).is_some(),
            is_static: has_modifier(modifiers, "static"),
            visibility: visibility(modifiers, name.as_str()),
        })
    }

    fn parse_interfaces(&self, masked: &MaskedSource) -> Vec<InterfaceInfo> {
        let text = masked.without_comments.as_str();
        let mut interfaces = Vec::new();

        for cap in self.interface_regex.captures_iter(text) {
            let (Some(name), Some(whole)) = (cap.get(2), cap.get(0)) else {
                continue;
            };
            if !is_top_level(masked, name.start()) {
                continue;
            }
            interfaces.push(InterfaceInfo {
                name: name.as_str().to_string(),
                line_start: masked.line_of(name.start()),
                line_end: masked.block_end_line(whole.end() - 1),
                extends: cap
                    .get(3)
                    .map(|m| split_type_list(m.as_str()))
                    .unwrap_or_default(),
                is_exported: cap.get(1).is_some(),
            });
        }

        interfaces
    }

    fn parse_type_aliases(&self, masked: &MaskedSource) -> Vec<TypeAliasInfo> {
        let text = masked.without_comments.as_str();
        self.type_alias_regex
            .captures_iter(text)
            .filter_map(|cap| {
                let name = cap.get(2)?;
                if !is_top_level(masked, name.start()) {
                    return None;
                }
                Some(TypeAliasInfo {
                    name: name.as_str().to_string(),
                    line: masked.line_of(name.start()),
                    is_exported: cap.get(1).is_some(),
                })
            })
            .collect()
    }
}

impl Default for TypeScriptParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LanguageParser for TypeScriptParser {
    fn kinds(&self) -> &[LanguageKind] {
        &[
            LanguageKind::TypeScript,
            LanguageKind::Tsx,
            LanguageKind::JavaScript,
            LanguageKind::Jsx,
        ]
    }

    fn parse(&self, content: &str, _kind: LanguageKind) -> FileAst {
        let masked = MaskedSource::new(content);
        if let Some(message) = masked.error.clone() {
            return FileAst::failed(message);
        }

        FileAst {
            imports: self.parse_imports(&masked),
            exports: self.parse_exports(&masked),
            functions: self.parse_functions(&masked),
            classes: self.parse_classes(&masked),
            interfaces: self.parse_interfaces(&masked),
            type_aliases: self.parse_type_aliases(&masked),
            parse_error: false,
            parse_error_message: None,
        }
    }

    fn resolve_import(
        &self,
        import: &ImportInfo,
        from_file: &str,
        known_files: &HashSet<String>,
    ) -> Option<String> {
        if import.kind != ImportKind::Internal {
            return None;
        }

        let base = if import.source.starts_with('/') {
            normalize_segments("", &import.source)?
        } else {
            let from_dir = from_file.rsplit_once('/').map_or("", |(dir, _)| dir);
            normalize_segments(from_dir, &import.source)?
        };

        resolution_candidates(&base)
            .into_iter()
            .find(|candidate| known_files.contains(candidate))
    }
}

/// Whether the byte at `offset` is code (not inside a string or template).
fn in_code(masked: &MaskedSource, offset: usize) -> bool {
    let code = masked.skeleton.as_bytes().get(offset);
    code.is_some() && code == masked.without_comments.as_bytes().get(offset)
}

/// Code at block depth zero.
fn is_top_level(masked: &MaskedSource, offset: usize) -> bool {
    in_code(masked, offset) && masked.depth_at_line(masked.line_of(offset)) == 0
}

/// Parameter names of the first parenthesised list at or after `offset`.
fn params_after(masked: &MaskedSource, offset: usize) -> Vec<String> {
    masked
        .paren_span(offset)
        .map(|(start, end)| split_params(&masked.without_comments[start..end]))
        .unwrap_or_default()
}

/// Split a parameter list on top-level commas and keep each binding name.
fn split_params(list: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '(' | '[' | '{' | '<' => depth += 1,
            ')' | ']' | '}' | '>' => depth -= 1,
            ',' if depth == 0 => {
                params.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    params.push(current);

    params
        .iter()
        .filter_map(|p| {
            let p = p.trim().trim_start_matches("...");
            let p = p
                .trim_start_matches("public ")
                .trim_start_matches("private ")
                .trim_start_matches("protected ")
                .trim_start_matches("readonly ")
                .trim();
            let name = if p.starts_with('{') || p.starts_with('[') {
                let close = if p.starts_with('{') { '}' } else { ']' };
                p.find(close).map_or(p, |i| &p[..=i])
            } else {
                p.split([':', '=', '?']).next().unwrap_or(p)
            };
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Parse an import clause into bound local names and a default flag.
fn parse_import_clause(clause: &str) -> (Vec<String>, bool) {
    let clause = clause.trim();
    let mut names = Vec::new();
    let mut is_default = false;

    let (outside, inside) = match (clause.find('{'), clause.find('}')) {
        (Some(open), Some(close)) if close > open => (
            format!("{},{}", &clause[..open], &clause[close + 1..]),
            Some(&clause[open + 1..close]),
        ),
        _ => (clause.to_string(), None),
    };

    for part in outside.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if part.starts_with('*') {
            if let Some(ns) = part.split_whitespace().last().filter(|n| *n != "*") {
                names.push(ns.to_string());
            }
        } else {
            names.push(part.to_string());
            is_default = true;
        }
    }

    if let Some(inside) = inside {
        names.extend(split_specifiers(inside).into_iter().map(|(_, local)| local));
    }

    (names, is_default)
}

/// Split `{ a, b as c, type D }` contents into (original, alias) pairs.
fn split_specifiers(list: &str) -> Vec<(String, String)> {
    list.split(',')
        .filter_map(|spec| {
            let spec = spec.trim();
            let spec = spec.strip_prefix("type ").unwrap_or(spec).trim();
            if spec.is_empty() {
                return None;
            }
            match spec.split_once(" as ") {
                Some((original, alias)) => {
                    Some((original.trim().to_string(), alias.trim().to_string()))
                }
                None => Some((spec.to_string(), spec.to_string())),
            }
        })
        .collect()
}

/// Local names bound by `{ a, b: c }` destructuring.
fn parse_destructuring(binding: &str) -> Vec<String> {
    binding
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            let local = part.split_once(':').map_or(part, |(_, local)| local.trim());
            let local = local.split('=').next().unwrap_or(local).trim();
            (!local.is_empty()).then(|| local.to_string())
        })
        .collect()
}

/// Split `A, B<C, D>, E` on top-level commas, dropping type arguments.
fn split_type_list(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in list.chars() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                out.push(std::mem::take(&mut current));
                continue;
            }
            _ if depth > 0 => continue,
            _ => {}
        }
        if depth == 0 && c != '>' {
            current.push(c);
        }
    }
    out.push(current);
    out.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn has_modifier(modifiers: &str, modifier: &str) -> bool {
    modifiers.split_whitespace().any(|m| m == modifier)
}

fn visibility(modifiers: &str, name: &str) -> Visibility {
    if has_modifier(modifiers, "private") || name.starts_with('#') {
        Visibility::Private
    } else if has_modifier(modifiers, "protected") {
        Visibility::Protected
    } else {
        Visibility::Public
    }
}

/// Join `spec` onto `dir` and fold `.`/`..` segments.
///
/// Returns `None` when `..` climbs above the project root.
fn normalize_segments(dir: &str, spec: &str) -> Option<String> {
    let mut parts: Vec<&str> = dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in spec.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    Some(parts.join("/"))
}

/// Paths to try, in order, for a normalized specifier.
fn resolution_candidates(base: &str) -> Vec<String> {
    let mut candidates = vec![base.to_string()];

    if let Some(stem) = base.strip_suffix(".js") {
        candidates.push(format!("{}.ts", stem));
        candidates.push(format!("{}.tsx", stem));
    } else if let Some(stem) = base.strip_suffix(".jsx") {
        candidates.push(format!("{}.tsx", stem));
    } else if let Some(stem) = base.strip_suffix(".mjs") {
        candidates.push(format!("{}.mts", stem));
    }

    for ext in RESOLVE_EXTENSIONS {
        candidates.push(format!("{}{}", base, ext));
    }
    for ext in RESOLVE_EXTENSIONS {
        if base.is_empty() {
            candidates.push(format!("index{}", ext));
        } else {
            candidates.push(format!("{}/index{}", base, ext));
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> FileAst {
        TypeScriptParser::new().parse(content, LanguageKind::TypeScript)
    }

    fn known(files: &[&str]) -> HashSet<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    fn internal(source: &str) -> ImportInfo {
        ImportInfo {
            names: Vec::new(),
            source: source.to_string(),
            line: 1,
            kind: TypeScriptParser::classify_import(source),
            is_default: false,
            is_type_only: false,
        }
    }

    #[test]
    fn test_parse_es_imports() {
        let ast = parse(
            r#"
import React from 'react';
import { useState, useEffect as effect } from 'react';
import * as lodash from 'lodash';
import type { Config } from './config';
import Default, { named } from "./mixed";
"#,
        );

        assert_eq!(ast.imports.len(), 5);
        let react = &ast.imports[0];
        assert_eq!(react.source, "react");
        assert_eq!(react.names, vec!["React"]);
        assert!(react.is_default);
        assert_eq!(react.line, 2);
        assert_eq!(react.kind, ImportKind::External);

        assert_eq!(ast.imports[1].names, vec!["useState", "effect"]);
        assert!(!ast.imports[1].is_default);
        assert_eq!(ast.imports[2].names, vec!["lodash"]);

        let config = &ast.imports[3];
        assert!(config.is_type_only);
        assert_eq!(config.kind, ImportKind::Internal);

        assert_eq!(ast.imports[4].names, vec!["Default", "named"]);
        assert!(ast.imports[4].is_default);
    }

    #[test]
    fn test_parse_multiline_import() {
        let ast = parse("import {\n  a,\n  b,\n} from './ab';\n");
        assert_eq!(ast.imports.len(), 1);
        assert_eq!(ast.imports[0].names, vec!["a", "b"]);
        assert_eq!(ast.imports[0].line, 4);
    }

    #[test]
    fn test_side_effect_not_swallowed_by_following_import() {
        let ast = parse("import './styles.css';\nimport a from 'b';\n");
        assert_eq!(ast.imports.len(), 2);
        assert_eq!(ast.imports[0].source, "./styles.css");
        assert!(ast.imports[0].names.is_empty());
        assert_eq!(ast.imports[1].source, "b");
    }

    #[test]
    fn test_parse_dynamic_and_require() {
        let ast = parse(
            r#"
const fs = require('fs');
const { join, resolve: res } = require("node:path");
const lazy = () => import('./lazy');
"#,
        );
        assert_eq!(ast.imports.len(), 3);
        assert_eq!(ast.imports[0].kind, ImportKind::Builtin);
        assert_eq!(ast.imports[0].names, vec!["fs"]);
        assert_eq!(ast.imports[1].names, vec!["join", "res"]);
        assert_eq!(ast.imports[1].kind, ImportKind::Builtin);
        assert_eq!(ast.imports[2].source, "./lazy");
    }

    #[test]
    fn test_imports_in_comments_and_strings_ignored() {
        let ast = parse(
            "// import x from './commented';\n/* require('./block') */\nconst s = \"require('./string')\";\n",
        );
        assert!(ast.imports.is_empty());
    }

    #[test]
    fn test_reexports() {
        let ast = parse("export { a, b as c } from './ab';\nexport * as ns from './ns';\nexport * from './all';\n");
        assert_eq!(ast.imports.len(), 3);
        assert_eq!(ast.imports[0].names, vec!["a", "b"]);
        let names: Vec<&str> = ast.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "ns", "*"]);
        assert!(ast.exports.iter().all(|e| e.kind == ExportKind::ReExport));
    }

    #[test]
    fn test_exports() {
        let ast = parse(
            r#"export function run() {}
export const VALUE = 1;
export interface Shape {}
export type Id = string;
export enum Color { Red }
const a = 1, b = 2;
export { a, b as bee };
export default class App {}
"#,
        );
        let find = |n: &str| ast.exports.iter().find(|e| e.name == n).unwrap();
        assert_eq!(find("run").kind, ExportKind::Function);
        assert_eq!(find("VALUE").kind, ExportKind::Variable);
        assert_eq!(find("Shape").kind, ExportKind::Interface);
        assert_eq!(find("Id").kind, ExportKind::Type);
        assert_eq!(find("Color").kind, ExportKind::Enum);
        assert_eq!(find("bee").kind, ExportKind::Other);
        let app = find("App");
        assert!(app.is_default);
        assert_eq!(app.kind, ExportKind::Class);
        assert_eq!(app.line, 8);
    }

    #[test]
    fn test_default_export_expression() {
        let ast = parse("const x = 1;\nexport default x;\n");
        assert_eq!(ast.exports.len(), 1);
        assert_eq!(ast.exports[0].name, "x");
        assert!(ast.exports[0].is_default);

        let ast = parse("export default {\n  a: 1,\n};\n");
        assert_eq!(ast.exports[0].name, "default");
    }

    #[test]
    fn test_commonjs_exports() {
        let ast = parse("module.exports = main;\nexports.helper = helper;\n");
        assert_eq!(ast.exports.len(), 2);
        assert!(ast.exports[0].is_default);
        assert_eq!(ast.exports[1].name, "helper");
    }

    #[test]
    fn test_functions() {
        let ast = parse(
            r#"export async function load(path: string, opts = { retry: true }) {
  if (path) {
    return 1;
  }
}

const add = (a: number, b: number): number => a + b;

export const handler = async ({ id }, ...rest) => {
  return id;
};

function outer() {
  function inner() {}
}
"#,
        );
        let names: Vec<&str> = ast.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["load", "add", "handler", "outer"]);

        let load = &ast.functions[0];
        assert!(load.is_async);
        assert!(load.is_exported);
        assert_eq!((load.line_start, load.line_end), (1, 5));
        assert_eq!(load.params, vec!["path", "opts"]);

        let add = &ast.functions[1];
        assert_eq!((add.line_start, add.line_end), (7, 7));
        assert_eq!(add.params, vec!["a", "b"]);

        let handler = &ast.functions[2];
        assert!(handler.is_async);
        assert_eq!(handler.params, vec!["{ id }", "rest"]);
        assert_eq!((handler.line_start, handler.line_end), (9, 11));
    }

    #[test]
    fn test_classes_and_methods() {
        let ast = parse(
            r#"export abstract class Repo<T> extends Base implements Reader<T>, Writer {
  private items: T[] = [];

  constructor(private readonly db: Db) {
    super();
  }

  async find(id: string): Promise<T> {
    if (id) {
      return this.items[0];
    }
  }

  static create() {
    return null;
  }

  protected abstract validate(item: T): boolean;

  handle = async (event) => {
    return event;
  };

  get size() {
    return this.items.length;
  }
}
"#,
        );

        assert_eq!(ast.classes.len(), 1);
        let class = &ast.classes[0];
        assert_eq!(class.name, "Repo");
        assert!(class.is_exported);
        assert!(class.is_abstract);
        assert_eq!(class.extends.as_deref(), Some("Base"));
        assert_eq!(class.implements, vec!["Reader", "Writer"]);
        assert_eq!((class.line_start, class.line_end), (1, 27));

        let methods: Vec<&str> = class.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(
            methods,
            vec!["constructor", "find", "create", "validate", "handle", "size"]
        );

        let ctor = &class.methods[0];
        assert_eq!(ctor.params, vec!["db"]);
        assert_eq!((ctor.line_start, ctor.line_end), (4, 6));

        let find = &class.methods[1];
        assert!(find.is_async);
        assert_eq!((find.line_start, find.line_end), (8, 12));

        assert!(class.methods[2].is_static);
        assert_eq!(class.methods[3].visibility, Visibility::Protected);
        assert_eq!(class.methods[3].line_end, 18);
        assert!(class.methods[4].is_async);
        assert_eq!(class.methods[4].params, vec!["event"]);
    }

    #[test]
    fn test_interfaces_and_type_aliases() {
        let ast = parse(
            r#"export interface User extends Entity, Named<string> {
  id: string;
  meta: { tags: string[] };
}

type Handler<T> = (value: T) => void;
export type Id = string;
"#,
        );
        assert_eq!(ast.interfaces.len(), 1);
        let user = &ast.interfaces[0];
        assert_eq!(user.extends, vec!["Entity", "Named"]);
        assert_eq!((user.line_start, user.line_end), (1, 4));

        let aliases: Vec<(&str, bool)> = ast
            .type_aliases
            .iter()
            .map(|t| (t.name.as_str(), t.is_exported))
            .collect();
        assert_eq!(aliases, vec![("Handler", false), ("Id", true)]);
    }

    #[test]
    fn test_declarations_in_template_are_ignored() {
        let ast = parse("const tpl = `\nfunction fake() {}\n`;\n");
        assert_eq!(ast.functions.len(), 0);
    }

    #[test]
    fn test_parse_error_yields_empty_body() {
        let ast = parse("import a from './a';\nfunction broken( {\n");
        assert!(ast.parse_error);
        assert!(ast.parse_error_message.is_some());
        assert!(ast.imports.is_empty());
    }

    #[test]
    fn test_regex_literals_do_not_break_parse() {
        let ast = parse("const re = /[{]/;\nexport function f(s: string) {\n  return re.test(s);\n}\n");
        assert!(!ast.parse_error, "{:?}", ast.parse_error_message);
        assert_eq!(ast.functions[0].name, "f");
        assert_eq!(ast.functions[0].line_end, 4);

        let ast = parse(
            "import { b } from './b';\nexport function quoted(s: string) {\n  if (s.match(/'/)) {\n    return b;\n  }\n  return 0;\n}\n",
        );
        assert!(!ast.parse_error, "{:?}", ast.parse_error_message);
        assert_eq!(ast.imports.len(), 1);
        assert_eq!(ast.functions[0].line_end, 7);
    }

    #[test]
    fn test_jsx_apostrophe_does_not_break_parse() {
        let ast = TypeScriptParser::new().parse(
            "export function App() {\n  return <p>Don't panic</p>;\n}\n",
            LanguageKind::Tsx,
        );
        assert!(!ast.parse_error);
        assert_eq!(ast.functions[0].line_end, 3);
    }

    #[test]
    fn test_classify_imports() {
        assert_eq!(TypeScriptParser::classify_import("./local"), ImportKind::Internal);
        assert_eq!(TypeScriptParser::classify_import("../parent"), ImportKind::Internal);
        assert_eq!(TypeScriptParser::classify_import("/abs"), ImportKind::Internal);
        assert_eq!(TypeScriptParser::classify_import("react"), ImportKind::External);
        assert_eq!(TypeScriptParser::classify_import("@types/node"), ImportKind::External);
        assert_eq!(TypeScriptParser::classify_import("fs/promises"), ImportKind::Builtin);
        assert_eq!(TypeScriptParser::classify_import("node:fs"), ImportKind::Builtin);
    }

    #[test]
    fn test_resolve_import() {
        let parser = TypeScriptParser::new();
        let files = known(&[
            "src/a.ts",
            "src/utils/index.ts",
            "src/view.tsx",
            "src/legacy.js",
            "lib/b.ts",
        ]);

        assert_eq!(
            parser.resolve_import(&internal("./a"), "src/main.ts", &files),
            Some("src/a.ts".to_string())
        );
        assert_eq!(
            parser.resolve_import(&internal("./utils"), "src/main.ts", &files),
            Some("src/utils/index.ts".to_string())
        );
        assert_eq!(
            parser.resolve_import(&internal("./view.js"), "src/main.ts", &files),
            Some("src/view.tsx".to_string())
        );
        assert_eq!(
            parser.resolve_import(&internal("./legacy.js"), "src/main.ts", &files),
            Some("src/legacy.js".to_string())
        );
        assert_eq!(
            parser.resolve_import(&internal("../lib/b"), "src/main.ts", &files),
            Some("lib/b.ts".to_string())
        );
        assert_eq!(
            parser.resolve_import(&internal("/lib/b"), "src/main.ts", &files),
            Some("lib/b.ts".to_string())
        );
        assert_eq!(parser.resolve_import(&internal("./missing"), "src/main.ts", &files), None);
        assert_eq!(parser.resolve_import(&internal("../../x"), "src/main.ts", &files), None);
        assert_eq!(parser.resolve_import(&internal("react"), "src/main.ts", &files), None);
    }
}
