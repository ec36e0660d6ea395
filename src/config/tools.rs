// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Tool definitions
//!
//! A tool definition describes one external executable: how to invoke it and
//! the table of arguments it accepts. Argument metadata drives the whole
//! resolution: classification (input/output/option) decides node kinds, stub
//! flags decide node families, and construction rules decide how unset
//! filenames are derived.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::errors::FlowmakeError;

/// Definition of one external tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, referenced by pipeline tasks
    pub name: String,

    /// Tool description
    #[serde(default)]
    pub description: Option<String>,

    /// Executable to invoke
    pub executable: String,

    /// Text placed before the executable (e.g. "java -jar")
    #[serde(default)]
    pub precommand: Option<String>,

    /// Subcommand placed after the executable (e.g. "sort")
    #[serde(default)]
    pub modifier: Option<String>,

    /// Argument table in command-line order
    pub arguments: Vec<ArgumentDefinition>,
}

impl ToolDefinition {
    /// Look up an argument by long or short form
    pub fn argument(&self, name: &str) -> Option<&ArgumentDefinition> {
        self.arguments
            .iter()
            .find(|a| a.long_form == name || a.short_form.as_deref() == Some(name))
    }

    /// All long-form argument names, for error messages
    pub fn argument_names(&self) -> Vec<String> {
        self.arguments.iter().map(|a| a.long_form.clone()).collect()
    }

    /// The full command prefix: precommand, executable, modifier
    pub fn command_prefix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(ref pre) = self.precommand {
            parts.push(pre.as_str());
        }
        parts.push(self.executable.as_str());
        if let Some(ref modifier) = self.modifier {
            parts.push(modifier.as_str());
        }
        parts.join(" ")
    }
}

/// One argument of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArgumentDefinition {
    /// Long form (e.g. "--in"), the canonical name
    pub long_form: String,

    /// Short form (e.g. "-i")
    #[serde(default)]
    pub short_form: Option<String>,

    /// Input, output, or option
    pub kind: ArgumentKind,

    /// Whether the argument must be given a value
    #[serde(default)]
    pub required: bool,

    /// The argument may be repeated on the command line, one value each
    #[serde(default)]
    pub allow_multiple: bool,

    /// Override for the text placed on the command line (defaults to the
    /// long form)
    #[serde(default)]
    pub command_line: Option<String>,

    /// Known extensions; alternatives are pipe-separated (e.g. "sam|bam")
    #[serde(default)]
    pub extensions: Vec<String>,

    /// Stub argument: one base name materializing as a family of files
    #[serde(default)]
    pub stub: bool,

    /// Extensions of the stub family members
    #[serde(default)]
    pub stub_extensions: Vec<String>,

    /// How to pass this argument when the task reads from a stream
    #[serde(default)]
    pub input_stream: Option<StreamInstructions>,

    /// How to pass this argument when the task writes to a stream
    #[serde(default)]
    pub output_stream: Option<StreamInstructions>,

    /// Rule for deriving an unset value
    #[serde(default)]
    pub construction: Option<ConstructionRule>,
}

impl ArgumentDefinition {
    /// Whether values of this argument are files (inputs and outputs) as
    /// opposed to plain options
    pub fn is_file(&self) -> bool {
        matches!(self.kind, ArgumentKind::Input | ArgumentKind::Output)
    }

    /// The first extension alternative, used when appending
    pub fn primary_extension(&self) -> Option<&str> {
        self.extensions
            .first()
            .map(|e| e.split('|').next().unwrap_or(e))
    }

    /// All extension alternatives, flattened across pipe-separated entries
    pub fn extension_alternatives(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .flat_map(|e| e.split('|'))
            .collect()
    }
}

/// Classification of a tool argument
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentKind {
    /// A file the tool reads
    Input,
    /// A file the tool writes
    Output,
    /// A non-file parameter
    Option,
}

/// How an argument changes when its task streams
///
/// With neither field set the argument is passed unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamInstructions {
    /// Drop the argument entirely (the tool reads stdin / writes stdout)
    #[serde(default)]
    pub omit_argument: bool,

    /// Replace the value (e.g. "-" or "/dev/stdin")
    #[serde(default)]
    pub replace_value: Option<String>,
}

/// Rule for deriving an unset file or option value
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ConstructionRule {
    /// Derive from the value of a sibling argument of the same task
    FromArgument {
        /// Long form of the sibling argument supplying base values
        argument: String,

        /// Strip a known extension of the base argument first
        #[serde(default)]
        strip_extension: bool,

        /// Ordered text fragments appended after the base value
        #[serde(default)]
        add_text: Vec<TextFragment>,

        /// Separator between base value and fragments
        #[serde(default = "default_separator")]
        separator: String,
    },

    /// A literal filename, optionally placed in a directory taken from
    /// another argument
    DefineName {
        filename: String,

        /// Argument whose value supplies the directory
        #[serde(default)]
        path_argument: Option<String>,
    },
}

fn default_separator() -> String {
    "_".to_string()
}

/// One fragment of additional text in a `from_argument` rule
///
/// Either a literal `text`, or the value of a `task`/`argument` pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextFragment {
    #[serde(default)]
    pub text: Option<String>,

    /// Task supplying the value; defaults to the constructing task
    #[serde(default)]
    pub task: Option<String>,

    #[serde(default)]
    pub argument: Option<String>,

    /// Strip a known extension from the sourced value
    #[serde(default)]
    pub strip_extension: bool,
}

/// All tool definitions keyed by name
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    /// Build a registry, rejecting duplicate tool names
    pub fn new(definitions: Vec<ToolDefinition>) -> Result<Self, FlowmakeError> {
        let mut tools = HashMap::new();
        for def in definitions {
            if tools.contains_key(&def.name) {
                return Err(FlowmakeError::InvalidConfig {
                    reason: format!("Duplicate tool definition: '{}'", def.name),
                    help: None,
                });
            }
            tools.insert(def.name.clone(), def);
        }
        Ok(Self { tools })
    }

    /// Look up a tool by name
    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Look up a tool, converting absence into an error for the given task
    pub fn require(&self, name: &str, task: &str) -> Result<&ToolDefinition, FlowmakeError> {
        self.tools.get(name).ok_or_else(|| FlowmakeError::UnknownTool {
            task: task.to_string(),
            tool: name.to_string(),
        })
    }

    /// Look up an argument of a tool, converting absence into an error
    pub fn require_argument(
        &self,
        tool: &str,
        task: &str,
        argument: &str,
    ) -> Result<&ArgumentDefinition, FlowmakeError> {
        let def = self.require(tool, task)?;
        def.argument(argument).ok_or_else(|| {
            FlowmakeError::unknown_argument(tool, task, argument, &def.argument_names())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_definition() {
        let json = r#"
        {
            "name": "aligner",
            "executable": "bwa",
            "modifier": "mem",
            "arguments": [
                {
                    "long_form": "--in",
                    "short_form": "-i",
                    "kind": "input",
                    "required": true,
                    "extensions": ["fastq"]
                },
                {
                    "long_form": "--out",
                    "kind": "output",
                    "extensions": ["sam"]
                }
            ]
        }
        "#;

        let tool: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.name, "aligner");
        assert_eq!(tool.command_prefix(), "bwa mem");
        assert_eq!(tool.arguments.len(), 2);
        assert!(tool.argument("--in").unwrap().required);
    }

    #[test]
    fn test_argument_lookup_by_short_form() {
        let json = r#"
        {
            "name": "t",
            "executable": "t",
            "arguments": [
                {"long_form": "--region", "short_form": "-r", "kind": "option"}
            ]
        }
        "#;

        let tool: ToolDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(tool.argument("-r").unwrap().long_form, "--region");
        assert!(tool.argument("-x").is_none());
    }

    #[test]
    fn test_parse_construction_rule() {
        let json = r#"
        {
            "method": "from_argument",
            "argument": "--in",
            "strip_extension": true,
            "add_text": [{"text": "sorted"}]
        }
        "#;

        let rule: ConstructionRule = serde_json::from_str(json).unwrap();
        match rule {
            ConstructionRule::FromArgument {
                argument,
                strip_extension,
                add_text,
                separator,
            } => {
                assert_eq!(argument, "--in");
                assert!(strip_extension);
                assert_eq!(add_text.len(), 1);
                assert_eq!(separator, "_");
            }
            _ => panic!("Expected FromArgument"),
        }
    }

    #[test]
    fn test_extension_alternatives() {
        let json = r#"
        {"long_form": "--in", "kind": "input", "extensions": ["sam|bam", "cram"]}
        "#;

        let arg: ArgumentDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(arg.extension_alternatives(), vec!["sam", "bam", "cram"]);
        assert_eq!(arg.primary_extension(), Some("sam"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let tool = ToolDefinition {
            name: "dup".into(),
            description: None,
            executable: "dup".into(),
            precommand: None,
            modifier: None,
            arguments: vec![],
        };

        let result = ToolRegistry::new(vec![tool.clone(), tool]);
        assert!(matches!(result, Err(FlowmakeError::InvalidConfig { .. })));
    }
}
