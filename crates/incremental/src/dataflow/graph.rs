//! Wiring: rule descriptors into per-stratum element graphs.

use crate::catalog::Catalog;
use crate::collection::RuleOp;
use crate::dataflow::node::{Element, ElementId, ElementKind};
use crate::operators::{ArgAggState, GroupState, JoinPredicate, JoinState, NotInState};
use crate::plan::{ColumnRef, Plan};
use crate::rule::RuleDescriptor;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use tidal_core::{Error, Result};
use tidal_lattice::FunctionClass;

/// The elements of one stratum.
#[derive(Clone, Debug, Default)]
pub struct Stratum {
    /// Element ids in creation order, which is a topological order.
    pub elements: Vec<ElementId>,
    /// Collections written with merge-now by this stratum's rules.
    pub targets: Vec<usize>,
    /// One scanner per collection read.
    pub scanners: HashMap<usize, ElementId>,
}

/// The wired element arena.
pub struct Dataflow {
    pub elements: Vec<Element>,
    pub strata: Vec<Stratum>,
}

impl Dataflow {
    /// Validates the rules against the catalog and builds the graph.
    pub fn wire(catalog: &Catalog, rules: &[RuleDescriptor]) -> Result<Self> {
        validate(catalog, rules)?;
        let nstrata = rules.iter().map(|r| r.stratum + 1).max().unwrap_or(0);
        let mut df = Dataflow {
            elements: Vec::new(),
            strata: (0..nstrata).map(|_| Stratum::default()).collect(),
        };
        for stratum in 0..nstrata {
            for (ri, rule) in rules.iter().enumerate().filter(|(_, r)| r.stratum == stratum) {
                let out = df.build(catalog, stratum, ri, &rule.body)?;
                let target = catalog.lookup(&rule.lhs)?;
                let label = format!("sink({} {})", rule.lhs, rule.op.symbol());
                let sink = df.add(
                    stratum,
                    Some(ri),
                    label,
                    ElementKind::Sink { target, op: rule.op },
                    &[out],
                );
                tracing::trace!(rule = %rule.name, sink, "wired rule");
                let targets = &mut df.strata[stratum].targets;
                if rule.op == RuleOp::MergeNow && !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        Ok(df)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn add(
        &mut self,
        stratum: usize,
        rule: Option<usize>,
        label: String,
        kind: ElementKind,
        inputs: &[ElementId],
    ) -> ElementId {
        let id = self.elements.len();
        let mut e = Element::new(id, stratum, label, kind, rule);
        for (port, &input) in inputs.iter().enumerate() {
            e.inputs.push(input);
            self.elements[input].outputs.push((id, port));
        }
        self.elements.push(e);
        self.strata[stratum].elements.push(id);
        id
    }

    fn build(&mut self, catalog: &Catalog, stratum: usize, rule: usize, plan: &Plan) -> Result<ElementId> {
        let label = plan.label();
        let r = Some(rule);
        let id = match plan {
            Plan::Scan(name) => {
                let collection = catalog.lookup(name)?;
                if let Some(&id) = self.strata[stratum].scanners.get(&collection) {
                    return Ok(id);
                }
                let id = self.add(stratum, None, label, ElementKind::Scanner { collection }, &[]);
                self.strata[stratum].scanners.insert(collection, id);
                id
            }
            Plan::Values(tuples) => self.add(stratum, r, label, ElementKind::Values(tuples.clone()), &[]),
            Plan::Map { input, f } => {
                let i = self.build(catalog, stratum, rule, input)?;
                self.add(stratum, r, label, ElementKind::Map(f.clone()), &[i])
            }
            Plan::FlatMap { input, f } => {
                let i = self.build(catalog, stratum, rule, input)?;
                self.add(stratum, r, label, ElementKind::FlatMap(f.clone()), &[i])
            }
            Plan::Filter { input, f } => {
                let i = self.build(catalog, stratum, rule, input)?;
                self.add(stratum, r, label, ElementKind::Filter(f.clone()), &[i])
            }
            Plan::Join { inputs, preds, outer } => {
                let resolved = resolve_predicates(catalog, inputs, preds)?;
                let state = if *outer {
                    let right_arity = arity(catalog, &inputs[1]).ok_or_else(|| {
                        Error::compile(format!(
                            "outer join: arity of right input {:?} is unknown",
                            inputs[1]
                        ))
                    })?;
                    JoinState::outer(resolved, right_arity)
                } else {
                    JoinState::new(inputs.len(), resolved)
                };
                let mut ids = Vec::with_capacity(inputs.len());
                for input in inputs {
                    ids.push(self.build(catalog, stratum, rule, input)?);
                }
                self.add(stratum, r, label, ElementKind::Join(state), &ids)
            }
            Plan::NotIn { input, other, preds } => {
                let i = self.build(catalog, stratum, rule, input)?;
                let o = self.build(catalog, stratum, rule, other)?;
                self.add(stratum, r, label, ElementKind::NotIn(NotInState::new(preds.clone())), &[i, o])
            }
            Plan::Group { input, keys, aggs } => {
                let i = self.build(catalog, stratum, rule, input)?;
                let state = GroupState::new(keys.clone(), aggs.clone());
                self.add(stratum, r, label, ElementKind::Group(state), &[i])
            }
            Plan::ArgAgg { input, kind, keys, column } => {
                let i = self.build(catalog, stratum, rule, input)?;
                let state = ArgAggState::new(*kind, keys.clone(), *column);
                self.add(stratum, r, label, ElementKind::ArgAgg(state), &[i])
            }
            Plan::Morph { input, func, f } => {
                let i = self.build(catalog, stratum, rule, input)?;
                let kind = ElementKind::Morph {
                    func: func.clone(),
                    f: f.clone(),
                };
                self.add(stratum, r, label, kind, &[i])
            }
        };
        Ok(id)
    }
}

/// Output arity of a plan, where it can be known without running it.
pub fn arity(catalog: &Catalog, plan: &Plan) -> Option<usize> {
    match plan {
        Plan::Scan(name) => match catalog.get(name)? {
            c if c.kind().is_lattice() => Some(1),
            c => c.as_relation().map(|r| r.schema().arity()),
        },
        Plan::Values(tuples) => tuples.first().map(|t| t.len()),
        Plan::Filter { input, .. } | Plan::NotIn { input, .. } | Plan::ArgAgg { input, .. } => {
            arity(catalog, input)
        }
        Plan::Join { inputs, .. } => inputs.iter().map(|p| arity(catalog, p)).sum(),
        Plan::Group { keys, aggs, .. } => Some(keys.len() + aggs.len()),
        Plan::Map { .. } | Plan::FlatMap { .. } | Plan::Morph { .. } => None,
    }
}

/// Names of join inputs: scanned collections, with repeats numbered
/// `rel`, `rel_1`, `rel_2`, ...
pub fn input_names(inputs: &[Plan]) -> Vec<Option<(String, String, usize)>> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    inputs
        .iter()
        .map(|p| match p {
            Plan::Scan(name) => {
                let n = seen.entry(name.as_str()).or_insert(0);
                let occurrence = *n;
                *n += 1;
                let alias = if occurrence == 0 {
                    name.clone()
                } else {
                    format!("{}_{}", name, occurrence)
                };
                Some((name.clone(), alias, occurrence))
            }
            _ => None,
        })
        .collect()
}

fn resolve_column(catalog: &Catalog, inputs: &[Plan], r: &ColumnRef) -> Result<(usize, usize)> {
    match r {
        ColumnRef::Positional { input, column } => {
            if *input >= inputs.len() {
                return Err(Error::compile(format!(
                    "join column {} refers to input {} of {}",
                    r,
                    input,
                    inputs.len()
                )));
            }
            Ok((*input, *column))
        }
        ColumnRef::Named {
            collection,
            occurrence,
            column,
        } => {
            let names = input_names(inputs);
            let port = names
                .iter()
                .position(|n| match n {
                    Some((name, alias, occ)) => {
                        (name == collection && occ == occurrence)
                            || (*occurrence == 0 && alias == collection)
                    }
                    None => false,
                })
                .ok_or_else(|| Error::compile(format!("join column {} names no join input", r)))?;
            let scanned = match &names[port] {
                Some((name, _, _)) => name,
                None => return Err(Error::compile(format!("join column {} names no join input", r))),
            };
            let schema = catalog
                .schema(scanned)
                .ok_or_else(|| Error::column_not_found(scanned.as_str(), column.as_str()))?;
            Ok((port, schema.require_column(column)?))
        }
    }
}

fn resolve_predicates(
    catalog: &Catalog,
    inputs: &[Plan],
    preds: &[(ColumnRef, ColumnRef)],
) -> Result<Vec<JoinPredicate>> {
    if inputs.len() < 2 {
        return Err(Error::compile("a join needs at least two inputs"));
    }
    preds
        .iter()
        .map(|(l, r)| {
            let left = resolve_column(catalog, inputs, l)?;
            let right = resolve_column(catalog, inputs, r)?;
            Ok(JoinPredicate::new(left, right))
        })
        .collect()
}

fn morph_functions<'a>(plan: &'a Plan, out: &mut Vec<(&'a str, Option<&'a str>)>) {
    match plan {
        Plan::Scan(_) | Plan::Values(_) => {}
        Plan::Morph { input, func, .. } => {
            let source = match input.as_ref() {
                Plan::Scan(name) => Some(name.as_str()),
                _ => None,
            };
            out.push((func.as_str(), source));
            morph_functions(input, out);
        }
        Plan::Map { input, .. }
        | Plan::FlatMap { input, .. }
        | Plan::Filter { input, .. }
        | Plan::Group { input, .. }
        | Plan::ArgAgg { input, .. } => morph_functions(input, out),
        Plan::Join { inputs, .. } => {
            for i in inputs {
                morph_functions(i, out);
            }
        }
        Plan::NotIn { input, other, .. } => {
            morph_functions(input, out);
            morph_functions(other, out);
        }
    }
}

/// Checks every rule against the catalog and the stratum assignment.
pub fn validate(catalog: &Catalog, rules: &[RuleDescriptor]) -> Result<()> {
    // highest stratum deriving each collection in the current tick
    let mut derived: HashMap<&str, usize> = HashMap::new();
    for rule in rules.iter().filter(|r| r.op == RuleOp::MergeNow) {
        let s = derived.entry(rule.lhs.as_str()).or_insert(rule.stratum);
        *s = (*s).max(rule.stratum);
    }

    for rule in rules {
        let kind = catalog
            .kind(&rule.lhs)
            .ok_or_else(|| Error::collection_not_found(rule.lhs.as_str()))?;
        if !kind.accepts(rule.op) {
            return Err(Error::illegal_operator(rule.lhs.as_str(), rule.op.symbol()));
        }
        if rule.body.has_blocking() && !rule.non_monotone {
            return Err(Error::compile(format!(
                "rule {}: negation or aggregation requires a non-monotone rule",
                rule.name
            )));
        }
        let mut morphs = Vec::new();
        morph_functions(&rule.body, &mut morphs);
        for (func, source) in morphs {
            let class = match source.and_then(|s| catalog.get(s)).and_then(|c| c.as_lattice()) {
                Some(cell) => cell.lattice_kind().classify(func),
                None if func == "merge" => FunctionClass::Morphism,
                None => FunctionClass::NonMonotone,
            };
            if class == FunctionClass::NonMonotone && !rule.non_monotone {
                return Err(Error::compile(format!(
                    "rule {}: {} is not monotone",
                    rule.name, func
                )));
            }
        }
        for source in rule.source_refs() {
            catalog.lookup(&source)?;
            if let Some(&ds) = derived.get(source.as_str()) {
                if ds > rule.stratum {
                    return Err(Error::compile(format!(
                        "rule {} in stratum {} reads {}, derived in stratum {}",
                        rule.name, rule.stratum, source, ds
                    )));
                }
                if rule.non_monotone && ds >= rule.stratum {
                    return Err(Error::compile(format!(
                        "non-monotone rule {} in stratum {} reads {}, derived in stratum {}",
                        rule.name, rule.stratum, source, ds
                    )));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::AggSpec;
    use crate::rule::Program;
    use alloc::vec;
    use tidal_core::tuple;
    use tidal_lattice::LatticeKind;

    fn program() -> Program {
        Program::new()
            .unwrap()
            .table("link", &["from", "to"], &["cost"])
            .unwrap()
            .table("path", &["from", "to", "nxt"], &["cost"])
            .unwrap()
            .scratch("cnt", &["from"], &["n"])
            .unwrap()
    }

    fn wire(p: &Program) -> Result<Dataflow> {
        Dataflow::wire(p.catalog(), p.rules())
    }

    #[test]
    fn test_scanners_shared_within_stratum() {
        let p = program()
            .merge_now("path", Plan::scan("link").map(|t, _| Ok(t.clone())))
            .unwrap()
            .merge_now(
                "path",
                Plan::join(
                    vec![Plan::scan("link"), Plan::scan("path")],
                    vec![(ColumnRef::new("link", "to"), ColumnRef::new("path", "from"))],
                )
                .map(|t, _| Ok(t.clone())),
            )
            .unwrap();
        let df = wire(&p).unwrap();
        assert_eq!(df.strata.len(), 1);
        assert_eq!(df.strata[0].scanners.len(), 2);
        // scan link, map, sink, scan path, join, map, sink
        assert_eq!(df.len(), 7);
        let path = p.catalog().lookup("path").unwrap();
        assert_eq!(df.strata[0].targets, vec![path]);
        // topological: inputs always precede their consumer
        for e in &df.elements {
            assert!(e.inputs.iter().all(|i| *i < e.id));
        }
    }

    #[test]
    fn test_resolve_named_columns() {
        let p = program();
        let inputs = vec![Plan::scan("link"), Plan::scan("link"), Plan::scan("path")];
        let preds = vec![
            (ColumnRef::new("link", "to"), ColumnRef::nth("link", 1, "from")),
            (ColumnRef::new("link_1", "to"), ColumnRef::at(2, 0)),
        ];
        let resolved = resolve_predicates(p.catalog(), &inputs, &preds).unwrap();
        assert_eq!(resolved[0], JoinPredicate::new((0, 1), (1, 0)));
        assert_eq!(resolved[1], JoinPredicate::new((1, 1), (2, 0)));
    }

    #[test]
    fn test_unknown_join_column() {
        let p = program()
            .merge_now(
                "path",
                Plan::join(
                    vec![Plan::scan("link"), Plan::scan("path")],
                    vec![(ColumnRef::new("link", "nope"), ColumnRef::new("path", "from"))],
                ),
            )
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::ColumnNotFound { .. })));
    }

    #[test]
    fn test_illegal_operators() {
        let p = program().delete("cnt", Plan::scan("link")).unwrap();
        assert!(matches!(wire(&p), Err(Error::IllegalOperator { .. })));

        let p = program().async_send("link", Plan::scan("link")).unwrap();
        assert!(matches!(wire(&p), Err(Error::IllegalOperator { .. })));

        let p = program()
            .channel("msg", &["@addr", "k"], &[])
            .unwrap()
            .merge_now("msg", Plan::scan("link"))
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::IllegalOperator { .. })));

        let p = program()
            .readonly("cfg", &["k"], &[])
            .unwrap()
            .merge_now("cfg", Plan::values([tuple![1]]))
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::IllegalOperator { .. })));
    }

    #[test]
    fn test_unknown_collections() {
        let p = program().merge_now("nope", Plan::scan("link")).unwrap();
        assert!(matches!(wire(&p), Err(Error::CollectionNotFound { .. })));
        let p = program().merge_now("path", Plan::scan("nope")).unwrap();
        assert!(matches!(wire(&p), Err(Error::CollectionNotFound { .. })));
    }

    #[test]
    fn test_aggregation_needs_flag_and_lower_stratum() {
        let body = || Plan::scan("path").group(vec![0], vec![AggSpec::count()]);
        let p = program()
            .merge_now("path", Plan::scan("link").map(|t, _| Ok(t.clone())))
            .unwrap()
            .merge_now("cnt", body())
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::Compile { .. })));

        let p = program()
            .merge_now("path", Plan::scan("link").map(|t, _| Ok(t.clone())))
            .unwrap()
            .rule(RuleDescriptor::new("cnt", RuleOp::MergeNow, body()).non_monotone())
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::Compile { .. })));

        let p = program()
            .merge_now("path", Plan::scan("link").map(|t, _| Ok(t.clone())))
            .unwrap()
            .rule(
                RuleDescriptor::new("cnt", RuleOp::MergeNow, body())
                    .non_monotone()
                    .stratum(1),
            )
            .unwrap();
        let df = wire(&p).unwrap();
        assert_eq!(df.strata.len(), 2);
    }

    #[test]
    fn test_reading_later_stratum_rejected() {
        let p = program()
            .rule(RuleDescriptor::new("path", RuleOp::MergeNow, Plan::scan("link")).stratum(1))
            .unwrap()
            .merge_now("link", Plan::scan("path"))
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::Compile { .. })));
    }

    #[test]
    fn test_non_monotone_morph_needs_flag() {
        let p = program()
            .lattice("m", LatticeKind::Max)
            .unwrap()
            .scratch("out", &["v"], &[])
            .unwrap()
            .merge_now("out", Plan::scan("m").morph("reveal", |_, _| Ok(vec![])))
            .unwrap();
        assert!(matches!(wire(&p), Err(Error::Compile { .. })));

        let p = program()
            .lattice("m", LatticeKind::Max)
            .unwrap()
            .lattice("b", LatticeKind::Bool)
            .unwrap()
            .merge_now("b", Plan::scan("m").morph("gt", |_, _| Ok(vec![])))
            .unwrap();
        assert!(wire(&p).is_ok());
    }

    #[test]
    fn test_outer_join_needs_right_arity() {
        let p = program()
            .merge_now(
                "path",
                Plan::outer_join(
                    Plan::scan("link"),
                    Plan::scan("link").map(|t, _| Ok(t.clone())),
                    vec![],
                ),
            )
            .unwrap();
        let rules: Vec<RuleDescriptor> = p
            .rules()
            .iter()
            .cloned()
            .map(|r| r.non_monotone())
            .collect();
        assert!(matches!(
            Dataflow::wire(p.catalog(), &rules),
            Err(Error::Compile { .. })
        ));
    }
}
