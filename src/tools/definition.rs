// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool parameter schemas
//!
//! Each tool declares its parameters as `ParamSpec`s built with
//! [`ParamsBuilder`]. The same list drives validation and the schema text
//! shown to the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoomError, Result};

/// Parameter map carried by a tool call
pub type Params = serde_json::Map<String, Value>;

/// JSON type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Whether `value` has this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

/// Helper to declare a tool's parameters
#[derive(Debug, Default)]
pub struct ParamsBuilder {
    params: Vec<ParamSpec>,
}

impl ParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, param_type: ParamType, description: &str, required: bool) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required,
            default: None,
            enum_values: Vec::new(),
        });
        self
    }

    /// Add a string property
    pub fn string(self, name: &str, description: &str, required: bool) -> Self {
        self.push(name, ParamType::String, description, required)
    }

    /// Add an integer property
    pub fn integer(self, name: &str, description: &str, required: bool) -> Self {
        self.push(name, ParamType::Integer, description, required)
    }

    /// Add a boolean property
    pub fn boolean(self, name: &str, description: &str, required: bool) -> Self {
        self.push(name, ParamType::Boolean, description, required)
    }

    /// Add an array property
    pub fn array(self, name: &str, description: &str, required: bool) -> Self {
        self.push(name, ParamType::Array, description, required)
    }

    /// Set the default of the last added property
    pub fn default_value(mut self, value: Value) -> Self {
        if let Some(last) = self.params.last_mut() {
            last.default = Some(value);
        }
        self
    }

    /// Restrict the last added property to a fixed set of values
    pub fn one_of(mut self, values: &[&str]) -> Self {
        if let Some(last) = self.params.last_mut() {
            last.enum_values = values.iter().map(|v| v.to_string()).collect();
        }
        self
    }

    pub fn build(self) -> Vec<ParamSpec> {
        self.params
    }
}

/// Check `params` against `specs`; `None` means valid.
///
/// Missing required parameters, type mismatches and values outside an enum
/// are reported. A `null` counts as missing. Unknown names are ignored.
pub fn validate_against(specs: &[ParamSpec], params: &Params) -> Option<String> {
    let mut problems = Vec::new();

    for spec in specs {
        match params.get(&spec.name) {
            None | Some(Value::Null) => {
                if spec.required {
                    problems.push(format!("missing required parameter '{}'", spec.name));
                }
            }
            Some(value) => {
                if !spec.param_type.matches(value) {
                    problems.push(format!(
                        "parameter '{}' must be {}",
                        spec.name,
                        spec.param_type.as_str()
                    ));
                } else if !spec.enum_values.is_empty() {
                    let text = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                    if !spec.enum_values.contains(&text) {
                        problems.push(format!(
                            "parameter '{}' must be one of: {}",
                            spec.name,
                            spec.enum_values.join(", ")
                        ));
                    }
                }
            }
        }
    }

    if problems.is_empty() {
        None
    } else {
        Some(problems.join("; "))
    }
}

/// Render specs as one line per parameter for the model prompt.
pub fn describe_params(specs: &[ParamSpec]) -> String {
    specs
        .iter()
        .map(|spec| {
            let mut line = format!(
                "  - {} ({}{}): {}",
                spec.name,
                spec.param_type.as_str(),
                if spec.required { ", required" } else { "" },
                spec.description
            );
            if !spec.enum_values.is_empty() {
                line.push_str(&format!(" [one of: {}]", spec.enum_values.join(", ")));
            }
            if let Some(default) = &spec.default {
                line.push_str(&format!(" [default: {}]", default));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Required string parameter
pub fn require_str<'a>(params: &'a Params, name: &str) -> Result<&'a str> {
    opt_str(params, name)
        .ok_or_else(|| LoomError::ParamValidation(format!("missing required parameter '{}'", name)))
}

/// Optional string parameter
pub fn opt_str<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}

/// Required non-negative integer parameter
pub fn require_usize(params: &Params, name: &str) -> Result<usize> {
    opt_usize(params, name)
        .ok_or_else(|| LoomError::ParamValidation(format!("parameter '{}' must be a non-negative integer", name)))
}

/// Optional non-negative integer parameter
pub fn opt_usize(params: &Params, name: &str) -> Option<usize> {
    params
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

/// Optional boolean parameter
pub fn opt_bool(params: &Params, name: &str) -> Option<bool> {
    params.get(name).and_then(Value::as_bool)
}

/// Optional array of strings
pub fn opt_str_list(params: &Params, name: &str) -> Option<Vec<String>> {
    params.get(name).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}
