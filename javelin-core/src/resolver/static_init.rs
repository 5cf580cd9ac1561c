//! Ordering of static initializers.
//!
//! A class's static initializer depends on every other class whose static
//! members or constructors it touches directly. Initializers run in an
//! order where each one follows all of its dependencies. Classes without
//! an initializer impose no constraint. Whatever cannot be ordered is a
//! cycle and is reported as a single diagnostic.

use std::collections::{BTreeSet, HashMap};

use crate::diagnostic::Diagnostic;
use crate::runtime::program::ProgramId;
use crate::span::Range;
use crate::types::{TypeId, TypeStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInitOrder {
    /// Classes and their initializer programs, in execution order.
    pub sequence: Vec<(TypeId, ProgramId)>,
    /// Classes left over because their dependencies form a cycle.
    pub cyclic: Vec<TypeId>,
}

impl StaticInitOrder {
    pub fn is_complete(&self) -> bool {
        self.cyclic.is_empty()
    }

    /// Aggregate diagnostic naming every class in the cycle.
    pub fn cycle_diagnostic(&self, types: &TypeStore) -> Option<Diagnostic> {
        if self.cyclic.is_empty() {
            return None;
        }
        let names: Vec<String> = self.cyclic.iter().map(|c| types.name(*c)).collect();
        Some(
            Diagnostic::error(
                format!(
                    "cyclic dependency between static initializers of {}",
                    names.join(", ")
                ),
                Range::EMPTY,
            )
            .with_code("E0212"),
        )
    }
}

/// Order `initializers` (in declaration order) given each class's direct
/// static dependencies.
pub fn order_static_initializers(
    initializers: &[(TypeId, ProgramId)],
    deps: &HashMap<TypeId, BTreeSet<TypeId>>,
) -> StaticInitOrder {
    let has_init: BTreeSet<TypeId> = initializers.iter().map(|(c, _)| *c).collect();
    let mut pending: Vec<(TypeId, ProgramId)> = initializers.to_vec();
    let mut done: BTreeSet<TypeId> = BTreeSet::new();
    let mut sequence = Vec::with_capacity(pending.len());

    loop {
        let before = pending.len();
        let mut i = 0;
        while i < pending.len() {
            let (class, _) = pending[i];
            let ready = deps.get(&class).is_none_or(|ds| {
                ds.iter()
                    .all(|d| *d == class || !has_init.contains(d) || done.contains(d))
            });
            if ready {
                let entry = pending.remove(i);
                done.insert(entry.0);
                sequence.push(entry);
            } else {
                i += 1;
            }
        }
        if pending.is_empty() || pending.len() == before {
            break;
        }
    }

    StaticInitOrder {
        sequence,
        cyclic: pending.into_iter().map(|(c, _)| c).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(edges: &[(u32, u32)]) -> HashMap<TypeId, BTreeSet<TypeId>> {
        let mut map: HashMap<TypeId, BTreeSet<TypeId>> = HashMap::new();
        for (from, to) in edges {
            map.entry(TypeId(*from)).or_default().insert(TypeId(*to));
        }
        map
    }

    fn inits(ids: &[u32]) -> Vec<(TypeId, ProgramId)> {
        ids.iter().map(|i| (TypeId(*i), ProgramId(*i))).collect()
    }

    #[test]
    fn chain_runs_dependencies_first() {
        // A(1) -> B(2) -> C(3)
        let order = order_static_initializers(&inits(&[1, 2, 3]), &deps(&[(1, 2), (2, 3)]));
        let classes: Vec<u32> = order.sequence.iter().map(|(c, _)| c.0).collect();
        assert_eq!(classes, vec![3, 2, 1]);
        assert!(order.is_complete());
    }

    #[test]
    fn classes_without_initializers_impose_nothing() {
        let order = order_static_initializers(&inits(&[1]), &deps(&[(1, 9)]));
        assert_eq!(order.sequence.len(), 1);
    }

    #[test]
    fn two_cycle_is_left_over() {
        let order =
            order_static_initializers(&inits(&[1, 2, 3]), &deps(&[(1, 2), (2, 1)]));
        let classes: Vec<u32> = order.sequence.iter().map(|(c, _)| c.0).collect();
        assert_eq!(classes, vec![3]);
        assert_eq!(order.cyclic, vec![TypeId(1), TypeId(2)]);
    }

    #[test]
    fn self_dependency_is_ignored() {
        let order = order_static_initializers(&inits(&[1]), &deps(&[(1, 1)]));
        assert!(order.is_complete());
    }
}
