//! Manipulation de l'arbre YAML de configuration
//!
//! Toutes les clés sont stockées en minuscules ; les chemins fournis par
//! l'appelant sont normalisés de la même façon.

use anyhow::{bail, Result};
use serde_yaml::{Mapping, Value};

fn key(segment: &str) -> Value {
    Value::String(segment.to_lowercase())
}

/// Valeur au bout de `path`
pub(crate) fn lookup<'a>(root: &'a Value, path: &[&str]) -> Result<&'a Value> {
    let mut node = root;
    for (depth, segment) in path.iter().enumerate() {
        let Value::Mapping(map) = node else {
            bail!("{} is not a section", path[..depth].join("."));
        };
        match map.get(segment.to_lowercase().as_str()) {
            Some(child) => node = child,
            None => bail!("{} is not set", path[..=depth].join(".")),
        }
    }
    Ok(node)
}

/// Écrit `value` au bout de `path`, en créant les sections intermédiaires
pub(crate) fn assign(root: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };

    let mut node = root;
    for segment in parents {
        let Value::Mapping(map) = node else {
            bail!("cannot create {}: parent is not a section", path.join("."));
        };
        node = map
            .entry(key(segment))
            .or_insert_with(|| Value::Mapping(Mapping::new()));
    }

    match node {
        Value::Mapping(map) => {
            map.insert(key(last), value);
            Ok(())
        }
        _ => bail!("cannot set {}: parent is not a section", path.join(".")),
    }
}

/// Recouvre `base` par `overlay`
///
/// Les sections sont fusionnées clé par clé, tout le reste est remplacé.
pub(crate) fn overlay(base: &mut Value, overlay_value: Value) {
    match (base, overlay_value) {
        (Value::Mapping(base_map), Value::Mapping(over_map)) => {
            for (k, v) in over_map {
                if let Some(existing) = base_map.get_mut(&k) {
                    overlay(existing, v);
                } else {
                    base_map.insert(k, v);
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Copie de l'arbre avec toutes les clés textuelles en minuscules
pub(crate) fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(k, v)| {
                    let k = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (k, lowercase_keys(v))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// Applique les variables `<prefix>SECTION__KEY=valeur`
///
/// La valeur est lue comme du YAML (`true`, `30`, `[a, b]`), sinon gardée
/// telle quelle.
pub(crate) fn apply_env<I>(root: &mut Value, prefix: &str, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (name, raw) in vars {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let path: Vec<&str> = rest.split("__").filter(|s| !s.is_empty()).collect();
        if path.is_empty() {
            continue;
        }
        let value = serde_yaml::from_str(&raw).unwrap_or(Value::String(raw.clone()));
        if let Err(e) = assign(root, &path, value) {
            tracing::warn!(variable = %name, "Ignoring environment override: {}", e);
        }
    }
}
