// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Project-wide symbol index: declared name to declaration sites.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use super::languages::FileAst;

/// One declaration site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub path: String,
    pub line: u32,
    /// function, class, method, interface or type
    pub kind: String,
}

/// Map from symbol name to every place it is declared.
pub type SymbolIndex = BTreeMap<String, Vec<SymbolLocation>>;

/// Build the index over every parsed file. Files with parse errors
/// contribute nothing.
pub fn build_symbol_index(asts: &HashMap<String, FileAst>) -> SymbolIndex {
    let mut index = SymbolIndex::new();

    for (path, ast) in asts {
        if ast.parse_error {
            continue;
        }
        for (name, line, kind) in ast.declarations() {
            index.entry(name.to_string()).or_default().push(SymbolLocation {
                path: path.clone(),
                line,
                kind: kind.to_string(),
            });
        }
    }

    for locations in index.values_mut() {
        locations.sort();
    }
    index
}
