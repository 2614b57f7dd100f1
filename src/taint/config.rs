// Copyright (c) 2024 <Wei Li>.
//
// This source code is licensed under the GNU license found in the
// LICENSE file in the root directory of this source tree.

//! YAML configuration for the taint analysis: sources, sinks, transfers and
//! sanitizers.
//!
//! Rules referencing methods or types absent from the program are logged
//! and skipped; malformed YAML fails fast. A directory path loads every
//! `*.yml`/`*.yaml` under it and merges the lists with deduplication.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use crate::ir::{MethodId, Program, TypeId};
use crate::pta::plugin::{BASE, RESULT};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse taint config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("failed to read taint config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} is neither a file nor a directory", path.display())]
    InvalidPath { path: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallSource {
    pub method: MethodId,
    pub index: i32,
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamSource {
    pub method: MethodId,
    pub index: usize,
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Sink {
    pub method: MethodId,
    pub index: i32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaintTransfer {
    pub method: MethodId,
    pub from: i32,
    pub to: i32,
    pub ty: TypeId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamSanitizer {
    pub method: MethodId,
    pub index: usize,
}

#[derive(Clone, Debug, Default)]
pub struct TaintConfig {
    pub call_sources: Vec<CallSource>,
    pub param_sources: Vec<ParamSource>,
    pub sinks: Vec<Sink>,
    pub transfers: Vec<TaintTransfer>,
    pub sanitizers: Vec<ParamSanitizer>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    sources: Vec<RawSource>,
    #[serde(default)]
    sinks: Vec<RawSink>,
    #[serde(default)]
    transfers: Vec<RawTransfer>,
    #[serde(default)]
    sanitizers: Vec<RawSanitizer>,
}

#[derive(Deserialize)]
struct RawSource {
    kind: Option<String>,
    method: String,
    index: IndexRef,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Deserialize)]
struct RawSink {
    method: String,
    index: IndexRef,
}

#[derive(Deserialize)]
struct RawTransfer {
    method: String,
    from: IndexRef,
    to: IndexRef,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Deserialize)]
struct RawSanitizer {
    method: String,
    index: IndexRef,
}

/// Call-site index encoding: `"base"` is the receiver, `"result"` the
/// result variable, a non-negative number an argument position.
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexRef {
    Num(i64),
    Str(String),
}

impl IndexRef {
    fn to_index(&self) -> Option<i32> {
        match self {
            IndexRef::Num(n) if *n >= 0 => Some(*n as i32),
            IndexRef::Num(_) => None,
            IndexRef::Str(s) => match s.as_str() {
                "base" => Some(BASE),
                "result" => Some(RESULT),
                _ => s.parse::<u32>().ok().map(|n| n as i32),
            },
        }
    }
}

impl TaintConfig {
    /// Loads a configuration from `path`. A file is parsed directly; a
    /// directory is walked recursively for YAML files whose contents are
    /// merged by concatenation with deduplication.
    pub fn load(path: &Path, program: &Program) -> Result<TaintConfig, ConfigError> {
        info!("Loading taint config from {}", path.display());
        if path.is_file() {
            Self::load_file(path, program)
        } else if path.is_dir() {
            let mut files = Vec::new();
            collect_yaml_files(path, &mut files)?;
            files.sort();
            let mut merged = TaintConfig::default();
            for file in files {
                merged.merge(Self::load_file(&file, program)?);
            }
            Ok(merged)
        } else {
            Err(ConfigError::InvalidPath {
                path: path.to_path_buf(),
            })
        }
    }

    fn load_file(path: &Path, program: &Program) -> Result<TaintConfig, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&text, program).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses one YAML document, resolving rules against the program.
    pub fn parse_str(text: &str, program: &Program) -> Result<TaintConfig, serde_yaml::Error> {
        let raw: RawConfig = serde_yaml::from_str(text)?;
        let mut config = TaintConfig::default();

        for source in raw.sources {
            match source.kind.as_deref() {
                Some("call") => {
                    if let Some((method, index, ty)) =
                        resolve_rule(program, &source.method, &source.index, Some(&source.ty))
                    {
                        if index >= 0 && index as usize >= program.method(method).param_tys.len() {
                            warn!(
                                "Ignoring call source on '{}': no argument {}",
                                source.method, index
                            );
                            continue;
                        }
                        config.call_sources.push(CallSource {
                            method,
                            index,
                            ty: ty.unwrap(),
                        });
                    }
                }
                Some("param") => {
                    if let Some((method, index, ty)) =
                        resolve_rule(program, &source.method, &source.index, Some(&source.ty))
                    {
                        if index < 0 || index as usize >= program.method(method).param_tys.len() {
                            warn!(
                                "Ignoring param source on '{}': no parameter {}",
                                source.method, index
                            );
                            continue;
                        }
                        config.param_sources.push(ParamSource {
                            method,
                            index: index as usize,
                            ty: ty.unwrap(),
                        });
                    }
                }
                Some(kind) => warn!("Unknown source kind \"{}\", ignoring entry", kind),
                None => warn!("Ignoring source entry without a \"kind\""),
            }
        }

        for sink in raw.sinks {
            if let Some((method, index, _)) = resolve_rule(program, &sink.method, &sink.index, None)
            {
                if index >= 0 && index as usize >= program.method(method).param_tys.len() {
                    warn!("Ignoring sink on '{}': no argument {}", sink.method, index);
                    continue;
                }
                config.sinks.push(Sink { method, index });
            }
        }

        for transfer in raw.transfers {
            let Some(method) = lookup_method(program, &transfer.method) else {
                continue;
            };
            let Some(ty) = lookup_type(program, &transfer.ty) else {
                continue;
            };
            let (Some(from), Some(to)) = (transfer.from.to_index(), transfer.to.to_index()) else {
                warn!(
                    "Ignoring transfer on '{}': bad from/to index",
                    transfer.method
                );
                continue;
            };
            config.transfers.push(TaintTransfer {
                method,
                from,
                to,
                ty,
            });
        }

        for sanitizer in raw.sanitizers {
            if let Some((method, index, _)) =
                resolve_rule(program, &sanitizer.method, &sanitizer.index, None)
            {
                if index < 0 || index as usize >= program.method(method).param_tys.len() {
                    warn!(
                        "Ignoring sanitizer on '{}': no parameter {}",
                        sanitizer.method, index
                    );
                    continue;
                }
                config.sanitizers.push(ParamSanitizer {
                    method,
                    index: index as usize,
                });
            }
        }

        Ok(config)
    }

    /// Concatenation with deduplication, per list.
    pub fn merge(&mut self, other: TaintConfig) {
        merge_distinct(&mut self.call_sources, other.call_sources);
        merge_distinct(&mut self.param_sources, other.param_sources);
        merge_distinct(&mut self.sinks, other.sinks);
        merge_distinct(&mut self.transfers, other.transfers);
        merge_distinct(&mut self.sanitizers, other.sanitizers);
    }

    pub fn is_empty(&self) -> bool {
        self.call_sources.is_empty()
            && self.param_sources.is_empty()
            && self.sinks.is_empty()
            && self.transfers.is_empty()
            && self.sanitizers.is_empty()
    }
}

fn merge_distinct<T: PartialEq>(dst: &mut Vec<T>, src: Vec<T>) {
    for item in src {
        if !dst.contains(&item) {
            dst.push(item);
        }
    }
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ConfigError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn lookup_method(program: &Program, signature: &str) -> Option<MethodId> {
    // resolution failures are logged by the hierarchy lookup
    program.method_by_signature(signature)
}

fn lookup_type(program: &Program, name: &str) -> Option<TypeId> {
    let ty = program.type_by_name(name);
    if ty.is_none() {
        warn!("Cannot resolve type '{}', ignoring rule", name);
    }
    ty
}

fn resolve_rule(
    program: &Program,
    signature: &str,
    index: &IndexRef,
    ty_name: Option<&str>,
) -> Option<(MethodId, i32, Option<TypeId>)> {
    let method = lookup_method(program, signature)?;
    let Some(index) = index.to_index() else {
        warn!("Ignoring rule on '{}': bad index", signature);
        return None;
    };
    let ty = match ty_name {
        Some(name) => Some(lookup_type(program, name)?),
        None => None,
    };
    Some((method, index, ty))
}

#[cfg(test)]
mod test {
    use super::TaintConfig;
    use crate::ir::Program;
    use crate::pta::plugin::RESULT;

    fn sample_program() -> Program {
        let mut p = Program::new();
        let object = p.add_class("java.lang.Object", None);
        let v = p.add_class("V", Some(object));
        let t = p.add_class("T", Some(object));
        p.add_method(t, "source", &[], Some(v));
        p.add_method(t, "sink", &[v], None);
        p.add_method(t, "sanitize", &[v], None);
        p
    }

    #[test]
    fn parses_and_resolves_rules() {
        let p = sample_program();
        let yaml = r#"
sources:
  - { kind: call, method: "<T: V source()>", index: "result", type: "V" }
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
sanitizers:
  - { method: "<T: void sanitize(V)>", index: "0" }
"#;
        let config = TaintConfig::parse_str(yaml, &p).unwrap();
        assert_eq!(config.call_sources.len(), 1);
        assert_eq!(config.call_sources[0].index, RESULT);
        assert_eq!(config.sinks.len(), 1);
        assert_eq!(config.sanitizers.len(), 1);
        assert!(config.transfers.is_empty());
    }

    #[test]
    fn skips_unknown_kinds_and_unresolved_signatures() {
        let p = sample_program();
        let yaml = r#"
sources:
  - { kind: teleport, method: "<T: V source()>", index: "result", type: "V" }
  - { kind: call, method: "<T: V missing()>", index: "result", type: "V" }
  - { kind: call, method: "<T: V source()>", index: "5", type: "V" }
sinks:
  - { method: "<T: void sink(V)>", index: "3" }
"#;
        let config = TaintConfig::parse_str(yaml, &p).unwrap();
        assert!(config.is_empty());
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let p = sample_program();
        assert!(TaintConfig::parse_str("sources: {not-a-list", &p).is_err());
    }

    #[test]
    fn merge_deduplicates() {
        let p = sample_program();
        let yaml = r#"
sinks:
  - { method: "<T: void sink(V)>", index: "0" }
"#;
        let mut a = TaintConfig::parse_str(yaml, &p).unwrap();
        let b = TaintConfig::parse_str(yaml, &p).unwrap();
        a.merge(b);
        assert_eq!(a.sinks.len(), 1);
    }
}
