//! Separation of a query document into its boolean shape and its atoms.
//!
//! Validation works on the flat atom list; compilation rebuilds the tree
//! from the shape once every atom has a predicate.

use std::collections::HashSet;

use super::document::{QueryAtom, QueryNode};

/// Index of an atom in the flattened list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomRef(pub usize);

/// The boolean structure of a document with atoms replaced by references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Atom(AtomRef),
    And(Vec<Shape>),
    Or(Vec<Shape>),
    Xor(Vec<Shape>),
    Not(Box<Shape>),
}

impl Shape {
    /// Folds the shape bottom-up.
    pub fn reduce<T, F, C, N>(&self, atom: &mut F, combine: &C, negate: &N) -> T
    where
        F: FnMut(AtomRef) -> T,
        C: Fn(Combinator, Vec<T>) -> T,
        N: Fn(T) -> T,
    {
        match self {
            Shape::Atom(r) => atom(*r),
            Shape::And(children) => {
                let values = reduce_all(children, atom, combine, negate);
                combine(Combinator::And, values)
            }
            Shape::Or(children) => {
                let values = reduce_all(children, atom, combine, negate);
                combine(Combinator::Or, values)
            }
            Shape::Xor(children) => {
                let values = reduce_all(children, atom, combine, negate);
                combine(Combinator::Xor, values)
            }
            Shape::Not(child) => negate(child.reduce(atom, combine, negate)),
        }
    }
}

fn reduce_all<T, F, C, N>(children: &[Shape], atom: &mut F, combine: &C, negate: &N) -> Vec<T>
where
    F: FnMut(AtomRef) -> T,
    C: Fn(Combinator, Vec<T>) -> T,
    N: Fn(T) -> T,
{
    children
        .iter()
        .map(|child| child.reduce(atom, combine, negate))
        .collect()
}

/// The list operators of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    And,
    Or,
    Xor,
}

/// Splits a document into its shape and its atoms in document order.
pub fn flatten(node: &QueryNode) -> (Shape, Vec<&QueryAtom>) {
    let mut atoms = Vec::new();
    let shape = flatten_into(node, &mut atoms);
    (shape, atoms)
}

fn flatten_into<'a>(node: &'a QueryNode, atoms: &mut Vec<&'a QueryAtom>) -> Shape {
    match node {
        QueryNode::Atom(atom) => {
            atoms.push(atom);
            Shape::Atom(AtomRef(atoms.len() - 1))
        }
        QueryNode::And(children) => Shape::And(flatten_children(children, atoms)),
        QueryNode::Or(children) => Shape::Or(flatten_children(children, atoms)),
        QueryNode::Xor(children) => Shape::Xor(flatten_children(children, atoms)),
        QueryNode::Not(child) => Shape::Not(Box::new(flatten_into(child, atoms))),
    }
}

fn flatten_children<'a>(children: &'a [QueryNode], atoms: &mut Vec<&'a QueryAtom>) -> Vec<Shape> {
    children
        .iter()
        .map(|child| flatten_into(child, atoms))
        .collect()
}

/// Buckets atoms so that no layer holds the same field key twice.
///
/// Each atom goes into the first layer that does not already hold its key.
pub fn layers(atoms: &[&QueryAtom]) -> Vec<Vec<AtomRef>> {
    let mut layers: Vec<(HashSet<&str>, Vec<AtomRef>)> = Vec::new();

    for (i, atom) in atoms.iter().enumerate() {
        let key = atom.key.as_str();
        match layers.iter_mut().find(|(keys, _)| !keys.contains(key)) {
            Some((keys, refs)) => {
                keys.insert(key);
                refs.push(AtomRef(i));
            }
            None => layers.push((HashSet::from([key]), vec![AtomRef(i)])),
        }
    }

    layers.into_iter().map(|(_, refs)| refs).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(key: &str, value: &str) -> QueryNode {
        QueryNode::atom(key, value)
    }

    #[test]
    fn test_flatten_preserves_shape() {
        let node = QueryNode::And(vec![
            atom("a", "1"),
            QueryNode::Not(Box::new(QueryNode::Or(vec![atom("b", "2"), atom("c", "3")]))),
        ]);
        let (shape, atoms) = flatten(&node);

        assert_eq!(
            shape,
            Shape::And(vec![
                Shape::Atom(AtomRef(0)),
                Shape::Not(Box::new(Shape::Or(vec![
                    Shape::Atom(AtomRef(1)),
                    Shape::Atom(AtomRef(2))
                ])))
            ])
        );
        let keys: Vec<&str> = atoms.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reduce_rebuilds_document() {
        let node = QueryNode::Xor(vec![
            atom("a", "1"),
            QueryNode::Not(Box::new(atom("b", "2"))),
        ]);
        let (shape, atoms) = flatten(&node);
        let rebuilt = shape.reduce(
            &mut |r: AtomRef| QueryNode::Atom(atoms[r.0].clone()),
            &|combinator: Combinator, children: Vec<QueryNode>| match combinator {
                Combinator::And => QueryNode::And(children),
                Combinator::Or => QueryNode::Or(children),
                Combinator::Xor => QueryNode::Xor(children),
            },
            &|child: QueryNode| QueryNode::Not(Box::new(child)),
        );
        assert_eq!(rebuilt, node);
    }

    #[test]
    fn test_layers_separate_repeated_keys() {
        let node = QueryNode::And(vec![
            atom("tests__gte", "1"),
            atom("tests__lte", "5"),
            atom("tests__gte", "2"),
            atom("country", "eng"),
            atom("tests__gte", "3"),
        ]);
        let (_, atoms) = flatten(&node);
        let layers = layers(&atoms);

        assert_eq!(
            layers,
            vec![
                vec![AtomRef(0), AtomRef(1), AtomRef(3)],
                vec![AtomRef(2)],
                vec![AtomRef(4)],
            ]
        );
    }

    #[test]
    fn test_layers_cover_every_atom_once() {
        let node = QueryNode::Or(vec![atom("x", "1"), atom("x", "1"), atom("y", "1")]);
        let (_, atoms) = flatten(&node);
        let mut seen: Vec<usize> = layers(&atoms).into_iter().flatten().map(|r| r.0).collect();
        seen.sort();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
