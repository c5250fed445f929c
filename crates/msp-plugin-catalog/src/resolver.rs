//! Install-order resolution over declared plugin dependencies.
//!
//! Resolution is a depth-first walk that emits a plugin after all of its
//! dependencies (post-order). Roots and sibling dependencies are visited in
//! catalog declaration order so the result is deterministic.

use std::collections::{HashMap, HashSet};

use crate::catalog::Catalog;
use crate::error::ResolveError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

struct Walk<'a, F> {
    catalog: &'a Catalog,
    is_installed: F,
    marks: HashMap<String, Mark>,
    stack: Vec<String>,
    order: Vec<String>,
}

impl<F> Walk<'_, F>
where
    F: Fn(&str) -> bool,
{
    fn visit(&mut self, id: &str) -> Result<(), ResolveError> {
        match self.marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = self.stack.iter().position(|s| s == id).unwrap_or(0);
                let mut path = self.stack[start..].to_vec();
                path.push(id.to_string());
                return Err(ResolveError::CycleDetected(path));
            }
            None => {}
        }

        let def = self
            .catalog
            .get(id)
            .ok_or_else(|| ResolveError::UnknownPlugin(id.to_string()))?;

        // Installed plugins are elided along with everything below them.
        if (self.is_installed)(id) {
            self.marks.insert(id.to_string(), Mark::Done);
            return Ok(());
        }

        self.marks.insert(id.to_string(), Mark::Visiting);
        self.stack.push(id.to_string());

        let mut deps: Vec<&str> = def.dependencies.iter().map(String::as_str).collect();
        deps.sort_by_key(|d| self.catalog.position(d).unwrap_or(usize::MAX));
        for dep in deps {
            self.visit(dep)?;
        }

        self.stack.pop();
        self.marks.insert(id.to_string(), Mark::Done);
        self.order.push(id.to_string());
        Ok(())
    }
}

/// Compute the order in which `requested` plugins and their missing
/// dependencies must be installed.
///
/// Every dependency precedes its dependents in the result. Plugins for which
/// `is_installed` returns true are left out, as is anything reachable only
/// through them. Requested ids are checked against the catalog before any
/// traversal happens.
///
/// # Errors
///
/// * `UnknownPlugin` - a requested id, or a dependency of one, is not in the catalog
/// * `CycleDetected` - the walk re-entered a plugin it was still expanding
pub fn resolve_install_order<S, F>(
    catalog: &Catalog,
    requested: &[S],
    is_installed: F,
) -> Result<Vec<String>, ResolveError>
where
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    let mut roots: Vec<(usize, &str)> = Vec::with_capacity(requested.len());
    for id in requested {
        let id = id.as_ref();
        let pos = catalog
            .position(id)
            .ok_or_else(|| ResolveError::UnknownPlugin(id.to_string()))?;
        roots.push((pos, id));
    }
    roots.sort_by_key(|(pos, _)| *pos);
    roots.dedup_by_key(|(pos, _)| *pos);

    let mut walk = Walk {
        catalog,
        is_installed,
        marks: HashMap::new(),
        stack: Vec::new(),
        order: Vec::new(),
    };
    for (_, id) in roots {
        walk.visit(id)?;
    }
    Ok(walk.order)
}

/// Installed plugins whose transitive dependencies include `target`.
///
/// Results keep the order of `installed_ids`. Ids missing from the catalog
/// are ignored.
pub fn installed_dependents<S: AsRef<str>>(
    catalog: &Catalog,
    target: &str,
    installed_ids: &[S],
) -> Vec<String> {
    installed_ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| *id != target && depends_on(catalog, id, target))
        .map(str::to_string)
        .collect()
}

fn depends_on(catalog: &Catalog, from: &str, target: &str) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending: Vec<&str> = vec![from];
    while let Some(id) = pending.pop() {
        let Some(def) = catalog.get(id) else {
            continue;
        };
        for dep in &def.dependencies {
            if dep == target {
                return true;
            }
            if seen.insert(dep.as_str()) {
                pending.push(dep.as_str());
            }
        }
    }
    false
}
