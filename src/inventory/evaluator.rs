//! # Hierarchical Class Evaluator
//!
//! Given a root classes directory and one target, this module produces the
//! fully merged parameter view:
//!
//! 1. The target's classes expand depth-first, in order. Each class is a
//!    YAML document with optional `classes`, `applications` and
//!    `parameters` keys; a class is merged at its first occurrence only.
//! 2. Class names map to files below the classes directory
//!    (`a.b.c` -> `a/b/c.yml` or `.yaml`). Names with leading dots resolve
//!    relative to the including class's package, so a tenant cluster file
//!    can include `.common`.
//! 3. Class names may interpolate `${...}` references against the
//!    parameters merged so far (e.g. `global.cloud.y.${facts:region}`).
//!    A name whose reference cannot be resolved selects no layer and is
//!    skipped; this is how optional hierarchy levels degrade.
//! 4. Parameters deep-merge: mappings merge key-by-key with later classes
//!    overriding earlier ones at the leaf, everything else (scalars,
//!    sequences) is replaced. The target's own parameters merge last.
//! 5. `applications` entries accumulate append-unique; a `~name` entry
//!    removes a previously added one.
//! 6. After the merge, `${path:to:key}` references in string values are
//!    resolved against the merged tree. A string consisting of exactly one
//!    reference is replaced by the referenced value of any type, which is
//!    what lets an aliased component re-point its parameter block at the
//!    alias's subtree. References embedded in longer strings stringify
//!    scalars only.
//!
//! Missing class files are a hard error unless the evaluator is created
//! with `allow_missing_classes`, in which case they evaluate as empty.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::inventory::Target;

/// Upper bound on reference-resolution passes; anything deeper than this is
/// a reference cycle.
const MAX_REFERENCE_PASSES: usize = 32;

/// Evaluates targets against one classes directory.
pub struct Evaluator {
    classes_dir: PathBuf,
    allow_missing_classes: bool,
}

/// The result of evaluating one target.
#[derive(Debug)]
pub struct Evaluated {
    pub parameters: Value,
    pub applications: Vec<String>,
}

struct EvalState {
    params: Value,
    applications: Vec<String>,
    visited: BTreeSet<String>,
}

impl Evaluator {
    pub fn new(classes_dir: impl Into<PathBuf>, allow_missing_classes: bool) -> Self {
        Self {
            classes_dir: classes_dir.into(),
            allow_missing_classes,
        }
    }

    /// Merge all classes of `target`, then the target's own parameters,
    /// then resolve references.
    pub fn evaluate(&self, target: &Target) -> Result<Evaluated> {
        let mut state = EvalState {
            params: Value::Mapping(Default::default()),
            applications: Vec::new(),
            visited: BTreeSet::new(),
        };

        for class in &target.classes {
            self.expand_class(class, None, &mut state, &target.parameters)?;
        }

        merge_values(&mut state.params, &target.parameters, "");

        let parameters = resolve_references(&state.params)?;
        Ok(Evaluated {
            parameters,
            applications: state.applications,
        })
    }

    fn expand_class(
        &self,
        name: &str,
        package: Option<&str>,
        state: &mut EvalState,
        node_params: &Value,
    ) -> Result<()> {
        let name = match absolute_class_name(name, package) {
            Some(n) => n,
            None => {
                return Err(Error::configuration(format!(
                    "Relative class '{}' used outside of a package",
                    name
                )))
            }
        };

        let name = if name.contains("${") {
            match interpolate_class_name(&name, &state.params, node_params) {
                Some(n) => n,
                None => {
                    debug!("skipping class '{}': unresolvable reference in name", name);
                    return Ok(());
                }
            }
        } else {
            name
        };

        if !state.visited.insert(name.clone()) {
            return Ok(());
        }

        let file = match self.class_file(&name) {
            Some(f) => f,
            None => {
                if self.allow_missing_classes {
                    debug!("class '{}' not found, evaluating as empty", name);
                    return Ok(());
                }
                return Err(Error::MissingClass { class: name });
            }
        };

        let doc: Value = serde_yaml::from_str(&fs::read_to_string(&file)?)?;
        let own_package = class_package(&name);

        if let Some(classes) = doc.get("classes").and_then(Value::as_sequence) {
            for sub in classes {
                if let Some(sub) = sub.as_str() {
                    self.expand_class(sub, Some(&own_package), state, node_params)?;
                }
            }
        }

        if let Some(apps) = doc.get("applications").and_then(Value::as_sequence) {
            for app in apps {
                if let Some(app) = app.as_str() {
                    apply_application(&mut state.applications, app);
                }
            }
        }

        if let Some(params) = doc.get("parameters") {
            merge_values(&mut state.params, params, &name);
        }

        Ok(())
    }

    /// Resolve a class name to its file, accepting both `.yml` and
    /// `.yaml`.
    fn class_file(&self, name: &str) -> Option<PathBuf> {
        let base: PathBuf = name.split('.').fold(self.classes_dir.clone(), |p, seg| p.join(seg));
        for ext in ["yml", "yaml"] {
            let candidate = base.with_extension(ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Resolve leading dots against the including class's package.
///
/// One dot selects the same package (`.common` included from `t-foo.c1`
/// resolves to `t-foo.common`), each further dot climbs one package level.
fn absolute_class_name(name: &str, package: Option<&str>) -> Option<String> {
    let dots = name.len() - name.trim_start_matches('.').len();
    if dots == 0 {
        return Some(name.to_string());
    }
    let package = package?;
    let segments: Vec<&str> = if package.is_empty() {
        Vec::new()
    } else {
        package.split('.').collect()
    };
    if dots - 1 > segments.len() {
        return None;
    }
    let keep = segments.len() - (dots - 1);
    let mut result: Vec<&str> = segments[..keep].to_vec();
    result.push(&name[dots..]);
    Some(result.join("."))
}

/// Package of a class name: everything up to the last segment.
fn class_package(name: &str) -> String {
    match name.rfind('.') {
        Some(idx) => name[..idx].to_string(),
        None => String::new(),
    }
}

fn apply_application(applications: &mut Vec<String>, entry: &str) {
    if let Some(removed) = entry.strip_prefix('~') {
        applications.retain(|a| a != removed && a.split(" as ").next() != Some(removed));
    } else if !applications.iter().any(|a| a == entry) {
        applications.push(entry.to_string());
    }
}

/// Interpolate references in a class name against the parameters merged so
/// far, with the target's own parameters taking precedence.
///
/// Returns `None` when any reference cannot be resolved to a scalar; the
/// caller skips the class in that case.
fn interpolate_class_name(name: &str, params: &Value, node_params: &Value) -> Option<String> {
    let refs = find_references(name);
    let mut result = String::new();
    let mut last = 0;
    for r in refs {
        let value = lookup(node_params, &r.path).or_else(|| lookup(params, &r.path))?;
        let scalar = scalar_to_string(value)?;
        result.push_str(&name[last..r.start]);
        result.push_str(&scalar);
        last = r.end;
    }
    result.push_str(&name[last..]);
    Some(result)
}

/// Deep-merge `source` into `target`.
///
/// Mappings merge recursively; sequences and scalars are replaced by the
/// later layer. A type change between mapping and non-mapping is logged,
/// since it usually indicates a hierarchy mistake.
pub fn merge_values(target: &mut Value, source: &Value, context: &str) {
    match (target, source) {
        (Value::Mapping(target_map), Value::Mapping(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(key) {
                    Some(existing) => {
                        if existing.is_mapping() && !value.is_mapping() && !value.is_null() {
                            warn!(
                                "{}: replacing mapping at key {:?} with {}",
                                context,
                                key,
                                value_type_name(value)
                            );
                        }
                        if existing.is_mapping() && value.is_mapping() {
                            merge_values(existing, value, context);
                        } else {
                            *existing = value.clone();
                        }
                    }
                    None => {
                        target_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => {
            if !source.is_null() {
                *target = source.clone();
            }
        }
    }
}

/// Human-readable type name of a YAML value, for diagnostics.
pub fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Sequence(_) => "Sequence",
        Value::Mapping(_) => "Mapping",
        Value::Tagged(_) => "Tagged",
    }
}

struct Reference {
    start: usize,
    end: usize,
    path: String,
}

/// Scan a string for `${...}` references, honoring `\${` escapes.
fn find_references(s: &str) -> Vec<Reference> {
    let bytes = s.as_bytes();
    let mut refs = Vec::new();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'{' {
            if i > 0 && bytes[i - 1] == b'\\' {
                i += 2;
                continue;
            }
            if let Some(close) = s[i + 2..].find('}') {
                let end = i + 2 + close + 1;
                refs.push(Reference {
                    start: i,
                    end,
                    path: s[i + 2..end - 1].to_string(),
                });
                i = end;
                continue;
            }
        }
        i += 1;
    }
    refs
}

/// Walk a `:`-separated path through nested mappings.
fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split(':') {
        current = current.as_mapping()?.get(Value::String(segment.to_string()))?;
    }
    Some(current)
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn contains_references(value: &Value) -> bool {
    match value {
        Value::String(s) => !find_references(s).is_empty(),
        Value::Sequence(seq) => seq.iter().any(contains_references),
        Value::Mapping(map) => map.values().any(contains_references),
        _ => false,
    }
}

/// Resolve all `${...}` references in `params` against `params` itself.
///
/// Whole-value references (`"${foo}"`) are replaced by the referenced
/// value of any type; embedded references stringify scalars. Resolution
/// iterates to a fixpoint so references may point at values that are
/// themselves references; undefined references and cycles are errors.
pub fn resolve_references(params: &Value) -> Result<Value> {
    let mut current = params.clone();
    let mut remaining = usize::MAX;

    for _ in 0..MAX_REFERENCE_PASSES {
        if !contains_references(&current) {
            return Ok(unescape(&current));
        }
        let mut unresolved = 0usize;
        let next = resolve_pass(&current, &current.clone(), &mut unresolved)?;
        if unresolved == 0 {
            return Ok(unescape(&next));
        }
        if unresolved >= remaining {
            break;
        }
        remaining = unresolved;
        current = next;
    }

    let reference = first_reference(&current).unwrap_or_default();
    Err(Error::UnresolvedReference {
        reference,
        message: "reference cycle detected".to_string(),
    })
}

fn resolve_pass(value: &Value, root: &Value, unresolved: &mut usize) -> Result<Value> {
    match value {
        Value::String(s) => resolve_string(s, root, unresolved),
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.push(resolve_pass(item, root, unresolved)?);
            }
            Ok(Value::Sequence(out))
        }
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), resolve_pass(v, root, unresolved)?);
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_string(s: &str, root: &Value, unresolved: &mut usize) -> Result<Value> {
    let refs = find_references(s);
    if refs.is_empty() {
        return Ok(Value::String(s.to_string()));
    }

    let whole = refs.len() == 1 && refs[0].start == 0 && refs[0].end == s.len();
    if whole {
        let r = &refs[0];
        let target = lookup(root, &r.path).ok_or_else(|| Error::UnresolvedReference {
            reference: r.path.clone(),
            message: "key not found in parameters".to_string(),
        })?;
        if contains_references(target) {
            *unresolved += 1;
            return Ok(Value::String(s.to_string()));
        }
        return Ok(target.clone());
    }

    let mut result = String::new();
    let mut last = 0;
    for r in &refs {
        let target = lookup(root, &r.path).ok_or_else(|| Error::UnresolvedReference {
            reference: r.path.clone(),
            message: "key not found in parameters".to_string(),
        })?;
        if contains_references(target) {
            *unresolved += 1;
            return Ok(Value::String(s.to_string()));
        }
        let scalar = scalar_to_string(target).ok_or_else(|| Error::UnresolvedReference {
            reference: r.path.clone(),
            message: format!(
                "cannot embed {} into a string",
                value_type_name(target)
            ),
        })?;
        result.push_str(&s[last..r.start]);
        result.push_str(&scalar);
        last = r.end;
    }
    result.push_str(&s[last..]);
    Ok(Value::String(result))
}

fn unescape(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.replace("\\${", "${")),
        Value::Sequence(seq) => Value::Sequence(seq.iter().map(unescape).collect()),
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .map(|(k, v)| (k.clone(), unescape(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn first_reference(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => find_references(s).into_iter().next().map(|r| r.path),
        Value::Sequence(seq) => seq.iter().find_map(first_reference),
        Value::Mapping(map) => map.values().find_map(first_reference),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_class(dir: &Path, name: &str, content: &str) {
        let mut path = dir.to_path_buf();
        let segments: Vec<&str> = name.split('.').collect();
        for seg in &segments[..segments.len() - 1] {
            path = path.join(seg);
        }
        fs::create_dir_all(&path).unwrap();
        fs::write(
            path.join(format!("{}.yml", segments.last().unwrap())),
            content,
        )
        .unwrap();
    }

    fn target(classes: &[&str], parameters: &str) -> Target {
        Target {
            classes: classes.iter().map(|s| s.to_string()).collect(),
            parameters: serde_yaml::from_str(parameters).unwrap(),
        }
    }

    mod class_names {
        use super::*;

        #[test]
        fn test_absolute_class_name() {
            assert_eq!(absolute_class_name("a.b", None), Some("a.b".to_string()));
            assert_eq!(
                absolute_class_name(".common", Some("t-foo")),
                Some("t-foo.common".to_string())
            );
            assert_eq!(
                absolute_class_name("..top", Some("a.b")),
                Some("a.top".to_string())
            );
            assert_eq!(absolute_class_name(".x", None), None);
        }

        #[test]
        fn test_class_package() {
            assert_eq!(class_package("a.b.c"), "a.b");
            assert_eq!(class_package("single"), "");
        }
    }

    mod references {
        use super::*;

        #[test]
        fn test_find_references() {
            let refs = find_references("${a:b} and ${c}");
            assert_eq!(refs.len(), 2);
            assert_eq!(refs[0].path, "a:b");
            assert_eq!(refs[1].path, "c");
        }

        #[test]
        fn test_find_references_honors_escape() {
            let refs = find_references(r"\${not} ${yes}");
            assert_eq!(refs.len(), 1);
            assert_eq!(refs[0].path, "yes");
        }

        #[test]
        fn test_whole_value_reference_preserves_structure() {
            let params: Value = serde_yaml::from_str(
                "foo: \"${bar}\"\nbar:\n  nested:\n    key: value",
            )
            .unwrap();
            let resolved = resolve_references(&params).unwrap();
            assert_eq!(resolved["foo"]["nested"]["key"], "value");
        }

        #[test]
        fn test_embedded_reference_stringifies_scalars() {
            let params: Value =
                serde_yaml::from_str("msg: \"v${major}.${minor}\"\nmajor: 1\nminor: 21").unwrap();
            let resolved = resolve_references(&params).unwrap();
            assert_eq!(resolved["msg"], "v1.21");
        }

        #[test]
        fn test_chained_references_resolve() {
            let params: Value =
                serde_yaml::from_str("a: \"${b}\"\nb: \"${c}\"\nc: final").unwrap();
            let resolved = resolve_references(&params).unwrap();
            assert_eq!(resolved["a"], "final");
        }

        #[test]
        fn test_undefined_reference_is_error() {
            let params: Value = serde_yaml::from_str("a: \"${missing:key}\"").unwrap();
            let err = resolve_references(&params).unwrap_err();
            match err {
                Error::UnresolvedReference { reference, .. } => {
                    assert_eq!(reference, "missing:key")
                }
                other => panic!("expected UnresolvedReference, got {:?}", other),
            }
        }

        #[test]
        fn test_reference_cycle_is_error() {
            let params: Value = serde_yaml::from_str("a: \"${b}\"\nb: \"${a}\"").unwrap();
            let err = resolve_references(&params).unwrap_err();
            assert!(matches!(err, Error::UnresolvedReference { .. }));
        }

        #[test]
        fn test_embedding_mapping_is_error() {
            let params: Value =
                serde_yaml::from_str("a: \"prefix ${b}\"\nb:\n  k: v").unwrap();
            assert!(resolve_references(&params).is_err());
        }

        #[test]
        fn test_escaped_reference_survives_literally() {
            let params: Value = serde_yaml::from_str(r#"a: "\${literal}""#).unwrap();
            let resolved = resolve_references(&params).unwrap();
            assert_eq!(resolved["a"], "${literal}");
        }
    }

    mod merging {
        use super::*;

        #[test]
        fn test_merge_deep_override() {
            let mut target: Value =
                serde_yaml::from_str("components:\n  tc1:\n    url: tc1\n    version: gp").unwrap();
            let source: Value =
                serde_yaml::from_str("components:\n  tc1:\n    version: override").unwrap();
            merge_values(&mut target, &source, "test");
            assert_eq!(target["components"]["tc1"]["url"], "tc1");
            assert_eq!(target["components"]["tc1"]["version"], "override");
        }

        #[test]
        fn test_merge_adds_new_keys() {
            let mut target: Value = serde_yaml::from_str("a: 1").unwrap();
            let source: Value = serde_yaml::from_str("b: 2").unwrap();
            merge_values(&mut target, &source, "test");
            assert_eq!(target["a"], 1);
            assert_eq!(target["b"], 2);
        }

        #[test]
        fn test_merge_replaces_sequences() {
            let mut target: Value = serde_yaml::from_str("list: [a, b, c]").unwrap();
            let source: Value = serde_yaml::from_str("list: [x]").unwrap();
            merge_values(&mut target, &source, "test");
            assert_eq!(target["list"].as_sequence().unwrap().len(), 1);
        }

        #[test]
        fn test_merge_null_does_not_clobber() {
            let mut target: Value = serde_yaml::from_str("a:\n  k: v").unwrap();
            let source: Value = serde_yaml::from_str("a:").unwrap();
            merge_values(&mut target, &source, "test");
            assert_eq!(target["a"]["k"], "v");
        }
    }

    mod evaluation {
        use super::*;

        #[test]
        fn test_classes_merge_in_order() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "one", "parameters:\n  key: first\n  only_one: 1\n");
            write_class(tmp.path(), "two", "parameters:\n  key: second\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["one", "two"], "{}")).unwrap();
            assert_eq!(result.parameters["key"], "second");
            assert_eq!(result.parameters["only_one"], 1);
        }

        #[test]
        fn test_target_parameters_merge_last() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "one", "parameters:\n  key: class\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["one"], "key: node")).unwrap();
            assert_eq!(result.parameters["key"], "node");
        }

        #[test]
        fn test_nested_classes_expand_depth_first() {
            let tmp = TempDir::new().unwrap();
            write_class(
                tmp.path(),
                "entry",
                "classes:\n  - base\nparameters:\n  key: entry\n",
            );
            write_class(tmp.path(), "base", "parameters:\n  key: base\n  base_only: yes\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["entry"], "{}")).unwrap();
            // The including class's own parameters win over its includes.
            assert_eq!(result.parameters["key"], "entry");
            assert_eq!(result.parameters["base_only"], true);
        }

        #[test]
        fn test_class_merged_only_once() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "shared", "applications:\n  - app\n");
            write_class(tmp.path(), "a", "classes:\n  - shared\n");
            write_class(tmp.path(), "b", "classes:\n  - shared\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["a", "b"], "{}")).unwrap();
            assert_eq!(result.applications, vec!["app"]);
        }

        #[test]
        fn test_relative_class_resolves_in_package() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "t-foo.common", "parameters:\n  from_common: yes\n");
            write_class(
                tmp.path(),
                "t-foo.c1",
                "classes:\n  - .common\nparameters:\n  from_cluster: yes\n",
            );

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["t-foo.c1"], "{}")).unwrap();
            assert_eq!(result.parameters["from_common"], true);
            assert_eq!(result.parameters["from_cluster"], true);
        }

        #[test]
        fn test_interpolated_class_name() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "params", "parameters:\n  facts:\n    distribution: a\n");
            write_class(tmp.path(), "dist.a", "parameters:\n  from_dist: a\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev
                .evaluate(&target(&["params", "dist.${facts:distribution}"], "{}"))
                .unwrap();
            assert_eq!(result.parameters["from_dist"], "a");
        }

        #[test]
        fn test_unresolvable_class_name_is_skipped() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "params", "parameters: {}\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev
                .evaluate(&target(&["params", "cloud.${facts:region}"], "{}"))
                .unwrap();
            assert!(result.parameters.get("from_region").is_none());
        }

        #[test]
        fn test_missing_class_is_hard_error() {
            let tmp = TempDir::new().unwrap();
            let ev = Evaluator::new(tmp.path(), false);
            let err = ev.evaluate(&target(&["does.not.exist"], "{}")).unwrap_err();
            match err {
                Error::MissingClass { class } => assert_eq!(class, "does.not.exist"),
                other => panic!("expected MissingClass, got {:?}", other),
            }
        }

        #[test]
        fn test_missing_class_tolerated_with_leniency() {
            let tmp = TempDir::new().unwrap();
            let ev = Evaluator::new(tmp.path(), true);
            let result = ev.evaluate(&target(&["does.not.exist"], "{}")).unwrap();
            assert!(result.parameters.as_mapping().unwrap().is_empty());
        }

        #[test]
        fn test_yaml_extension_also_accepted() {
            let tmp = TempDir::new().unwrap();
            fs::write(tmp.path().join("alt.yaml"), "parameters:\n  alt: yes\n").unwrap();

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["alt"], "{}")).unwrap();
            assert_eq!(result.parameters["alt"], true);
        }

        #[test]
        fn test_applications_append_unique_and_remove() {
            let tmp = TempDir::new().unwrap();
            write_class(
                tmp.path(),
                "base",
                "applications:\n  - comp-a\n  - comp-b\n  - comp-c\n",
            );
            write_class(
                tmp.path(),
                "over",
                "applications:\n  - comp-b\n  - '~comp-c'\n  - comp-d\n",
            );

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["base", "over"], "{}")).unwrap();
            assert_eq!(result.applications, vec!["comp-a", "comp-b", "comp-d"]);
        }

        #[test]
        fn test_instance_reference_resolves_from_node_params() {
            let tmp = TempDir::new().unwrap();
            write_class(tmp.path(), "e", "parameters:\n  namespace: \"${_instance}\"\n");

            let ev = Evaluator::new(tmp.path(), false);
            let result = ev.evaluate(&target(&["e"], "_instance: my-target")).unwrap();
            assert_eq!(result.parameters["namespace"], "my-target");
        }

        #[test]
        fn test_alias_back_reference_repoints_parameter_block() {
            let tmp = TempDir::new().unwrap();
            write_class(
                tmp.path(),
                "defaults",
                "parameters:\n  foo_comp:\n    image: default\n",
            );

            // The aliased target overrides the component key with a
            // reference to the alias's own parameter subtree.
            let ev = Evaluator::new(tmp.path(), false);
            let params = "foo_comp: \"${foo_1}\"\nfoo_1:\n  image: aliased\n";
            let result = ev.evaluate(&target(&["defaults"], params)).unwrap();
            assert_eq!(result.parameters["foo_comp"]["image"], "aliased");
        }
    }
}
