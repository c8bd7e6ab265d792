//! Property-based tests for build ordering and version constraints.
//!
//! These tests use proptest to check invariants over randomly generated
//! dependency graphs and constraint sets.

use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};

use envdeps::core::EnvdepsError;
use envdeps::models::{Template, TemplateDependency};
use envdeps::resolver::build_order;
use envdeps::store::TemplateStore;
use envdeps::version::{ConstraintSet, Version, VersionConstraint, VersionOperator, satisfies};

fn node(i: usize) -> String {
    format!("t{i}")
}

/// Strategy for acyclic graphs: node `i` may only depend on nodes `j > i`.
fn dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
    (1usize..12).prop_flat_map(|n| {
        (0..n)
            .map(|i| prop::sample::subsequence((i + 1..n).collect::<Vec<_>>(), 0..=(n - i - 1)))
            .collect::<Vec<_>>()
    })
}

fn dag_store(edges: &[Vec<usize>]) -> TemplateStore {
    TemplateStore::with_templates(edges.iter().enumerate().map(|(i, deps)| {
        deps.iter()
            .fold(Template::new(node(i), "1.0"), |t, j| t.with_dependency(TemplateDependency::new(node(*j))))
    }))
}

fn reachable(edges: &[Vec<usize>]) -> BTreeSet<usize> {
    let mut seen = BTreeSet::from([0]);
    let mut stack = vec![0];
    while let Some(i) = stack.pop() {
        for &j in &edges[i] {
            if seen.insert(j) {
                stack.push(j);
            }
        }
    }
    seen
}

/// Strategy for `major.minor.patch` versions with small components.
fn version() -> impl Strategy<Value = (u64, u64, u64)> {
    (0u64..4, 0u64..4, 0u64..4)
}

fn render((major, minor, patch): (u64, u64, u64)) -> String {
    format!("{major}.{minor}.{patch}")
}

fn operator() -> impl Strategy<Value = VersionOperator> {
    prop::sample::select(vec![
        VersionOperator::GreaterOrEqual,
        VersionOperator::LessOrEqual,
        VersionOperator::Equal,
        VersionOperator::Greater,
        VersionOperator::Less,
    ])
}

fn constraints() -> impl Strategy<Value = Vec<VersionConstraint>> {
    prop::collection::vec(
        (operator(), version()).prop_map(|(op, v)| VersionConstraint::new(op, render(v))),
        1..5,
    )
}

proptest! {
    /// Every dependency precedes its dependents, each node appears once,
    /// and the order covers exactly the reachable nodes.
    #[test]
    fn build_order_is_topological(edges in dag()) {
        let store = dag_store(&edges);
        let order = build_order("t0", &store).unwrap();

        let position: HashMap<&str, usize> =
            order.iter().enumerate().map(|(p, name)| (name.as_str(), p)).collect();
        prop_assert_eq!(position.len(), order.len());
        prop_assert_eq!(order.last().map(String::as_str), Some("t0"));

        let expected: BTreeSet<String> = reachable(&edges).into_iter().map(node).collect();
        let actual: BTreeSet<String> = order.iter().cloned().collect();
        prop_assert_eq!(actual, expected);

        for name in &order {
            let i: usize = name[1..].parse().unwrap();
            for &j in &edges[i] {
                prop_assert!(position[node(j).as_str()] < position[name.as_str()]);
            }
        }
    }

    /// Closing a path back to the target is always reported as a cycle.
    #[test]
    fn back_edge_is_a_cycle(edges in dag()) {
        let last = *reachable(&edges).iter().max().unwrap();
        let mut edges = edges;
        edges[last].push(0);

        let err = build_order("t0", &dag_store(&edges)).unwrap_err();
        match err.downcast_ref::<EnvdepsError>() {
            Some(EnvdepsError::CircularDependency { path }) => {
                prop_assert!(path.len() >= 2);
                prop_assert_eq!(path.first(), path.last());
            }
            other => prop_assert!(false, "expected CircularDependency, got {:?}", other),
        }
    }

    /// `>=` and `<` partition every pair; `==` agrees with numeric equality.
    #[test]
    fn satisfies_matches_numeric_ordering(a in version(), b in version()) {
        let (installed, required) = (render(a), render(b));
        prop_assert_eq!(satisfies(&installed, &required, ">=").unwrap(), a >= b);
        prop_assert_eq!(satisfies(&installed, &required, "<").unwrap(), a < b);
        prop_assert_eq!(satisfies(&installed, &required, "==").unwrap(), a == b);
        prop_assert_eq!(
            satisfies(&installed, &required, ">").unwrap(),
            !satisfies(&installed, &required, "<=").unwrap()
        );
    }

    /// Omitted components compare as zero.
    #[test]
    fn short_versions_are_zero_padded(major in 0u64..100, minor in 0u64..100) {
        let short = format!("{major}.{minor}");
        let long = format!("{major}.{minor}.0");
        prop_assert!(satisfies(&short, &long, "==").unwrap());
        prop_assert_eq!(Version::parse(&format!("{major}")).unwrap(), Version::new(major, 0, 0));
    }

    /// A picked version satisfies every constraint in the set.
    #[test]
    fn picked_version_satisfies_all(list in constraints(), available in prop::collection::vec(version(), 0..6)) {
        let mut set = ConstraintSet::new();
        for c in &list {
            set.add(c).unwrap();
        }
        let available: Vec<String> = available.into_iter().map(render).collect();

        if let Some(picked) = set.pick(&available) {
            for c in &list {
                prop_assert!(c.matches_str(&picked).unwrap(), "{} does not satisfy {}", picked, c);
            }
        }
    }

    /// An unsatisfiable set admits no version at all.
    #[test]
    fn unsatisfiable_sets_admit_nothing(list in constraints()) {
        let mut set = ConstraintSet::new();
        for c in &list {
            set.add(c).unwrap();
        }
        if !set.is_satisfiable() {
            for major in 0..5 {
                for minor in 0..5 {
                    for patch in 0..5 {
                        let v = format!("{major}.{minor}.{patch}");
                        prop_assert!(!list.iter().all(|c| c.matches_str(&v).unwrap()), "{} satisfies all", v);
                    }
                }
            }
        }
    }
}
