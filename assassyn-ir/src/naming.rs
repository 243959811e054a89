//! Deterministic name assignment: explicit name wins, otherwise a
//! type-derived prefix, with a numeric suffix appended only on collision.
//! Collisions are resolved by first-seen order, never by hashing, so two
//! runs over the same construction sequence always produce identical
//! names.

use assassyn_utils::Id;
use linked_hash_map::LinkedHashMap;

#[derive(Default)]
pub struct Namer {
    used: LinkedHashMap<String, u32>,
}

impl Namer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `explicit` is the name the caller supplied (e.g. `.set_name("foo")`
    /// at the call site); `None` falls back to `"expr"`, the generic
    /// prefix for unnamed dataflow results.
    pub fn name_expr(&mut self, explicit: Option<Id>) -> Id {
        let base = explicit.map(|id| id.as_str().to_string()).unwrap_or_else(|| "expr".to_string());
        self.uniquify(base)
    }

    pub fn name_module(&mut self, explicit: Option<Id>, flavor_prefix: &str) -> Id {
        let base = explicit
            .map(|id| to_pascal_instance(id.as_str()))
            .unwrap_or_else(|| flavor_prefix.to_string());
        self.uniquify(base)
    }

    fn uniquify(&mut self, base: String) -> Id {
        match self.used.get_mut(&base) {
            None => {
                self.used.insert(base.clone(), 0);
                Id::new(base)
            }
            Some(count) => {
                *count += 1;
                let suffixed = format!("{base}_{count}");
                self.used.insert(suffixed.clone(), 0);
                Id::new(suffixed)
            }
        }
    }
}

/// `foo_bar` -> `FooBarInstance`, matching the convention that instance
/// names read as PascalCase identifiers.
fn to_pascal_instance(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    for part in name.split(|c: char| c == '_' || c == '-') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out.push_str("Instance");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collisions_append_numeric_suffix_in_first_seen_order() {
        let mut namer = Namer::new();
        let a = namer.name_expr(Some(Id::new("add")));
        let b = namer.name_expr(Some(Id::new("add")));
        let c = namer.name_expr(Some(Id::new("add")));
        assert_eq!(a.as_str(), "add");
        assert_eq!(b.as_str(), "add_1");
        assert_eq!(c.as_str(), "add_2");
    }

    #[test]
    fn unnamed_exprs_share_the_generic_prefix() {
        let mut namer = Namer::new();
        let a = namer.name_expr(None);
        let b = namer.name_expr(None);
        assert_eq!(a.as_str(), "expr");
        assert_eq!(b.as_str(), "expr_1");
    }

    #[test]
    fn instance_names_are_pascal_case() {
        assert_eq!(to_pascal_instance("fetch_stage"), "FetchStageInstance");
    }
}
