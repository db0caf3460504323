//! Side-effect specs for known functions and methods.
//!
//! Static analysis cannot see through a call, so the analyzer consults a
//! table describing what known functions do: which argument positions they
//! mutate and what type they return. Returned types chain forward, letting a
//! later method call on the result resolve against that type's declared
//! methods. Everything absent from the table falls back to the conservative
//! default in the analyzer (assume mutation), so the table only ever makes
//! analysis more precise, never less sound.
//!
//! The JSON schema mirrors what callers supply: top-level keys are module
//! names, each with a `functions` list and a `types` map. A function entry
//! is either a bare name (known, no declared effects) or an object with
//! `updates`/`reads` argument positions and an optional `returns` type.
//! Position `0` names the receiver of a method call; positions from `1` name
//! arguments left to right. A built-in table covering the usual notebook
//! stack is embedded in the crate.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::AnalysisResult;

const DEFAULT_SPECS: &str = include_str!("specs/default.json");

/// Module name under which Python's built-in functions are declared.
pub const BUILTINS_MODULE: &str = "__builtins__";

// ============================================================================
// Schema
// ============================================================================

/// One argument position or keyword named by a spec's `updates`/`reads`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SpecEffect {
    /// `0` is the method receiver; `1` and up are positional arguments.
    Position(i64),
    /// A keyword argument, matched by name.
    Keyword(String),
}

/// Declared behavior of one function or method.
#[derive(Debug, Clone, Default)]
pub struct FunctionSpec {
    pub name: String,
    /// Argument positions the call mutates.
    pub updates: Vec<SpecEffect>,
    /// Argument positions the call reads. Reads are already implied by the
    /// call expression itself; the field is kept so caller-supplied tables
    /// round-trip without loss.
    pub reads: Vec<SpecEffect>,
    /// Type name (within the same module) of the call's result.
    pub returns: Option<String>,
}

impl FunctionSpec {
    fn named(name: String) -> Self {
        FunctionSpec {
            name,
            ..Default::default()
        }
    }

    /// True when the spec declares an update of the method receiver.
    pub fn updates_receiver(&self) -> bool {
        self.updates.contains(&SpecEffect::Position(0))
    }

    /// Zero-based indices of the positional arguments this call updates.
    pub fn updated_arg_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.updates.iter().filter_map(|effect| match effect {
            SpecEffect::Position(pos) if *pos >= 1 => Some(*pos as usize - 1),
            _ => None,
        })
    }

    /// Keywords of the keyword arguments this call updates.
    pub fn updated_keywords(&self) -> impl Iterator<Item = &str> {
        self.updates.iter().filter_map(|effect| match effect {
            SpecEffect::Keyword(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Declared methods of one type.
#[derive(Debug, Clone, Default)]
pub struct TypeSpec {
    pub methods: HashMap<String, FunctionSpec>,
}

/// Functions and types declared for one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleSpec {
    pub functions: HashMap<String, FunctionSpec>,
    pub types: HashMap<String, TypeSpec>,
}

// ============================================================================
// SpecTable
// ============================================================================

/// The full table of known modules.
#[derive(Debug, Clone, Default)]
pub struct SpecTable {
    modules: HashMap<String, ModuleSpec>,
}

impl SpecTable {
    /// A table with no entries. Every call resolves conservatively.
    pub fn empty() -> Self {
        SpecTable::default()
    }

    /// Parses a caller-supplied table from JSON.
    pub fn from_json(json: &str) -> AnalysisResult<Self> {
        let raw: HashMap<String, RawModuleSpec> = serde_json::from_str(json)?;
        Ok(SpecTable {
            modules: raw
                .into_iter()
                .map(|(name, spec)| (name, spec.into_module_spec()))
                .collect(),
        })
    }

    /// The embedded default table.
    pub fn builtin() -> &'static SpecTable {
        static TABLE: OnceLock<SpecTable> = OnceLock::new();
        TABLE.get_or_init(|| SpecTable::from_json(DEFAULT_SPECS).unwrap_or_default())
    }

    pub fn module(&self, name: &str) -> Option<&ModuleSpec> {
        self.modules.get(name)
    }

    /// Looks up a function declared by `module`. `Some` with empty `updates`
    /// means "known and effect-free", which is distinct from `None`.
    pub fn function(&self, module: &str, name: &str) -> Option<&FunctionSpec> {
        self.modules.get(module)?.functions.get(name)
    }

    /// Looks up a method on a qualified type name such as
    /// `pandas.DataFrame`.
    pub fn method(&self, qualified_type: &str, name: &str) -> Option<&FunctionSpec> {
        let (module, type_name) = qualified_type.rsplit_once('.')?;
        self.modules
            .get(module)?
            .types
            .get(type_name)?
            .methods
            .get(name)
    }

    /// True when `module` declares a type with this name.
    pub fn has_type(&self, module: &str, type_name: &str) -> bool {
        self.modules
            .get(module)
            .is_some_and(|spec| spec.types.contains_key(type_name))
    }

    /// The qualified result type of calling `name` from `module`, if any.
    /// A declared `returns` wins; otherwise a type sharing the function's
    /// name is taken as a constructor of that type.
    pub fn result_type(&self, module: &str, name: &str) -> Option<String> {
        if let Some(spec) = self.function(module, name) {
            if let Some(returns) = &spec.returns {
                return Some(qualify(module, returns));
            }
        }
        if self.has_type(module, name) {
            return Some(qualify(module, name));
        }
        None
    }
}

/// Joins a module and a type name into the qualified form used by
/// [`SpecTable::method`].
pub fn qualify(module: &str, type_name: &str) -> String {
    format!("{module}.{type_name}")
}

// ============================================================================
// Raw JSON shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawModuleSpec {
    #[serde(default)]
    functions: Vec<FunctionDescription>,
    #[serde(default)]
    types: HashMap<String, RawTypeSpec>,
}

impl RawModuleSpec {
    fn into_module_spec(self) -> ModuleSpec {
        ModuleSpec {
            functions: index_functions(self.functions),
            types: self
                .types
                .into_iter()
                .map(|(name, raw)| {
                    (
                        name,
                        TypeSpec {
                            methods: index_functions(raw.methods),
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTypeSpec {
    #[serde(default)]
    methods: Vec<FunctionDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FunctionDescription {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        updates: Vec<SpecEffect>,
        #[serde(default)]
        reads: Vec<SpecEffect>,
        #[serde(default)]
        returns: Option<String>,
    },
}

fn index_functions(descriptions: Vec<FunctionDescription>) -> HashMap<String, FunctionSpec> {
    descriptions
        .into_iter()
        .map(|description| {
            let spec = match description {
                FunctionDescription::Name(name) => FunctionSpec::named(name),
                FunctionDescription::Detailed {
                    name,
                    updates,
                    reads,
                    returns,
                } => FunctionSpec {
                    name,
                    updates,
                    reads,
                    returns,
                },
            };
            (spec.name.clone(), spec)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_names_and_detailed_entries() {
        let table = SpecTable::from_json(
            r#"{
                "__builtins__": {
                    "functions": ["print", {"name": "setattr", "updates": [1]}]
                }
            }"#,
        )
        .unwrap();

        let print = table.function(BUILTINS_MODULE, "print").unwrap();
        assert!(print.updates.is_empty());

        let setattr = table.function(BUILTINS_MODULE, "setattr").unwrap();
        assert_eq!(setattr.updated_arg_indices().collect::<Vec<_>>(), vec![0]);
        assert!(table.function(BUILTINS_MODULE, "missing").is_none());
    }

    #[test]
    fn method_lookup_uses_qualified_type_names() {
        let table = SpecTable::from_json(
            r#"{
                "pandas": {
                    "types": {
                        "DataFrame": {
                            "methods": ["head", {"name": "insert", "updates": [0]}]
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let head = table.method("pandas.DataFrame", "head").unwrap();
        assert!(!head.updates_receiver());

        let insert = table.method("pandas.DataFrame", "insert").unwrap();
        assert!(insert.updates_receiver());
        assert!(table.method("pandas.DataFrame", "mystery").is_none());
        assert!(table.method("DataFrame", "head").is_none());
    }

    #[test]
    fn result_type_prefers_declared_returns_then_type_names() {
        let table = SpecTable::from_json(
            r#"{
                "pandas": {
                    "functions": [{"name": "read_csv", "returns": "DataFrame"}],
                    "types": {"DataFrame": {"methods": []}}
                },
                "__builtins__": {
                    "types": {"C": {"methods": ["m"]}}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(
            table.result_type("pandas", "read_csv").as_deref(),
            Some("pandas.DataFrame")
        );
        // A type name doubles as its own constructor.
        assert_eq!(
            table.result_type(BUILTINS_MODULE, "C").as_deref(),
            Some("__builtins__.C")
        );
        assert!(table.result_type("pandas", "to_datetime").is_none());
    }

    #[test]
    fn keyword_effects_deserialize() {
        let table = SpecTable::from_json(
            r#"{"m": {"functions": [{"name": "f", "updates": ["out"], "reads": [1]}]}}"#,
        )
        .unwrap();
        let f = table.function("m", "f").unwrap();
        assert_eq!(f.updated_keywords().collect::<Vec<_>>(), vec!["out"]);
        assert_eq!(f.reads, vec![SpecEffect::Position(1)]);
    }

    #[test]
    fn builtin_table_covers_the_common_stack() {
        let table = SpecTable::builtin();
        assert!(table.function(BUILTINS_MODULE, "print").is_some());
        assert!(table.function("pandas", "read_csv").is_some());
        assert!(table.method("pandas.DataFrame", "head").is_some());
        assert!(table.function("matplotlib.pyplot", "scatter").is_some());
        assert!(table.function("sklearn.cluster", "KMeans").is_some());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(SpecTable::from_json("{not json").is_err());
    }
}
