//! Nested-path accessor
//!
//! Paths are dot separated. Bracketed list indices are accepted and
//! normalized, so `panels[2].title` and `panels.2.title` address the same
//! value. Walking goes through live objects (including their prototype
//! chain), plain maps and lists.

use crate::error::BridgeError;
use crate::object::Prop;

/// Rewrite `a[0].b` as `a.0.b` and trim stray separators
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '[' => out.push('.'),
            ']' => {}
            c => out.push(c),
        }
    }
    out.split('.')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

fn segments(path: &str) -> Vec<String> {
    let normalized = normalize_path(path);
    if normalized.is_empty() {
        Vec::new()
    } else {
        normalized.split('.').map(str::to_string).collect()
    }
}

fn not_found(segment: &str, path: &str, detail: String) -> BridgeError {
    BridgeError::PropertyNotFound {
        segment: segment.to_string(),
        path: normalize_path(path),
        detail,
    }
}

/// Resolve one step; the error detail is filled for list misses
fn step(current: &Prop, segment: &str) -> Result<Prop, String> {
    match current {
        Prop::Object(obj) => obj.get(segment).ok_or_else(String::new),
        Prop::Map(map) => map.get(segment).cloned().ok_or_else(String::new),
        Prop::List(items) => {
            if segment == "length" {
                return Ok(Prop::from(items.len() as u64));
            }
            segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get(idx).cloned())
                .ok_or_else(|| format!(" (list length is {})", items.len()))
        }
        _ => Err(String::new()),
    }
}

/// Read the value at `path`
///
/// With `null_if_missing`, any missing segment yields `Prop::Null` instead of
/// a `PropertyNotFound` error.
pub fn get(root: &Prop, path: &str, null_if_missing: bool) -> Result<Prop, BridgeError> {
    let mut current = root.clone();
    for segment in segments(path) {
        match step(&current, &segment) {
            Ok(next) => current = next,
            Err(_) if null_if_missing => return Ok(Prop::Null),
            Err(detail) => return Err(not_found(&segment, path, detail)),
        }
    }
    Ok(current)
}

/// Assign `value` to the last segment of `path`
pub fn set(root: &mut Prop, path: &str, value: Prop) -> Result<(), BridgeError> {
    let segs = segments(path);
    if segs.is_empty() {
        return Err(BridgeError::invalid_payload("empty property path"));
    }
    set_in(root, &segs, value, path)
}

fn set_in(current: &mut Prop, segs: &[String], value: Prop, path: &str) -> Result<(), BridgeError> {
    let (segment, rest) = match segs.split_first() {
        Some(split) => split,
        None => return Err(BridgeError::invalid_payload("empty property path")),
    };

    if rest.is_empty() {
        return assign(current, segment, value, path);
    }

    match current {
        Prop::Object(obj) => {
            let mut child = obj
                .get(segment)
                .ok_or_else(|| not_found(segment, path, String::new()))?;
            set_in(&mut child, rest, value, path)?;
            // Objects are shared; plain data must be written back
            if !matches!(child, Prop::Object(_)) {
                obj.set(segment.clone(), child);
            }
            Ok(())
        }
        Prop::Map(map) => {
            let child = map
                .get_mut(segment)
                .ok_or_else(|| not_found(segment, path, String::new()))?;
            set_in(child, rest, value, path)
        }
        Prop::List(items) => {
            let len = items.len();
            let child = segment
                .parse::<usize>()
                .ok()
                .and_then(|idx| items.get_mut(idx))
                .ok_or_else(|| not_found(segment, path, format!(" (list length is {})", len)))?;
            set_in(child, rest, value, path)
        }
        _ => Err(not_found(segment, path, String::new())),
    }
}

fn assign(owner: &mut Prop, segment: &str, value: Prop, path: &str) -> Result<(), BridgeError> {
    match owner {
        Prop::Object(obj) => {
            obj.set(segment, value);
            Ok(())
        }
        Prop::Map(map) => {
            map.insert(segment.to_string(), value);
            Ok(())
        }
        Prop::List(items) => {
            let len = items.len();
            match segment.parse::<usize>() {
                Ok(idx) if idx < len => {
                    items[idx] = value;
                    Ok(())
                }
                Ok(idx) if idx == len => {
                    items.push(value);
                    Ok(())
                }
                _ => Err(not_found(segment, path, format!(" (list length is {})", len))),
            }
        }
        other => Err(BridgeError::invalid_payload(format!(
            "cannot assign '{}' on a {}",
            segment,
            other.type_name()
        ))),
    }
}

/// Shallow-merge the members of `value` into the object at `path`
pub fn update(root: &mut Prop, path: &str, value: Prop) -> Result<(), BridgeError> {
    let entries = match value {
        Prop::Map(map) => map,
        other => {
            return Err(BridgeError::invalid_payload(format!(
                "update value must be a map, got {}",
                other.type_name()
            )))
        }
    };

    let target = get(root, path, false)?;
    if !matches!(target, Prop::Object(_) | Prop::Map(_)) {
        return Err(BridgeError::invalid_payload(format!(
            "cannot update a {} at '{}'",
            target.type_name(),
            normalize_path(path)
        )));
    }

    let mut base = segments(path);
    for (key, v) in entries {
        base.push(key);
        set_in(root, &base, v, path)?;
        base.pop();
    }
    Ok(())
}

/// Call the method at `path` with `this` bound to its owner
pub async fn execute_method(root: &Prop, path: &str, args: Vec<Prop>) -> Result<Prop, BridgeError> {
    let mut segs = segments(path);
    let name = segs
        .pop()
        .ok_or_else(|| BridgeError::invalid_payload("empty method path"))?;

    let owner = get(root, &segs.join("."), false)?;
    let callee = step(&owner, &name).map_err(|detail| not_found(&name, path, detail))?;

    match callee {
        Prop::Method(method) => method.call(owner, args).await,
        other => Err(BridgeError::NotCallable(format!(
            "'{}' is {}",
            normalize_path(path),
            other.type_name()
        ))),
    }
}
