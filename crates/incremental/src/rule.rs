//! Rule descriptors and the program builder.
//!
//! A program is the declaration list plus the normalized rule set. Stratum
//! numbers and monotonicity flags are supplied by whoever builds the
//! program; wiring checks that they are consistent with the rule bodies.

use crate::catalog::Catalog;
use crate::collection::{CollectionKind, RuleOp};
use crate::plan::Plan;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use tidal_core::{Result, Schema, SchemaBuilder, Tuple};
use tidal_lattice::LatticeKind;

/// One normalized rule: `lhs op body`.
#[derive(Clone, Debug)]
pub struct RuleDescriptor {
    pub name: String,
    pub lhs: String,
    pub op: RuleOp,
    pub stratum: usize,
    pub non_monotone: bool,
    pub body: Plan,
}

impl RuleDescriptor {
    /// A monotone rule in stratum 0, named after its head and body.
    pub fn new(lhs: impl Into<String>, op: RuleOp, body: Plan) -> Self {
        let lhs = lhs.into();
        let name = format!("{} {} {:?}", lhs, op.symbol(), body);
        Self {
            name,
            lhs,
            op,
            stratum: 0,
            non_monotone: false,
            body,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stratum(mut self, stratum: usize) -> Self {
        self.stratum = stratum;
        self
    }

    /// Marks the rule as using negation, aggregation or non-monotone functions.
    pub fn non_monotone(mut self) -> Self {
        self.non_monotone = true;
        self
    }

    /// Collections read by the body.
    pub fn source_refs(&self) -> Vec<String> {
        self.body.source_refs()
    }
}

/// Declarations, bootstrap facts and rules.
#[derive(Debug)]
pub struct Program {
    pub(crate) catalog: Catalog,
    pub(crate) rules: Vec<RuleDescriptor>,
    pub(crate) bootstrap: Vec<(String, Vec<Tuple>)>,
}

impl Program {
    pub fn new() -> Result<Self> {
        Ok(Self {
            catalog: Catalog::new()?,
            rules: Vec::new(),
            bootstrap: Vec::new(),
        })
    }

    fn relation(mut self, name: &str, keys: &[&str], values: &[&str], kind: CollectionKind) -> Result<Self> {
        let schema = Schema::new(name, keys, values)?;
        self.catalog.declare(schema, kind)?;
        Ok(self)
    }

    /// Persistent table.
    pub fn table(self, name: &str, keys: &[&str], values: &[&str]) -> Result<Self> {
        self.relation(name, keys, values, CollectionKind::Table)
    }

    /// Collection emptied at every tick.
    pub fn scratch(self, name: &str, keys: &[&str], values: &[&str]) -> Result<Self> {
        self.relation(name, keys, values, CollectionKind::Scratch)
    }

    /// Network channel. A key column written `@name` holds the destination.
    pub fn channel(self, name: &str, keys: &[&str], values: &[&str]) -> Result<Self> {
        self.relation(name, keys, values, CollectionKind::Channel)
    }

    /// Timer source with schema `[key] => [val]`.
    pub fn periodic(self, name: &str, period_ms: u64) -> Result<Self> {
        self.relation(name, &["key"], &["val"], CollectionKind::Periodic { period_ms })
    }

    /// Collection filled only from outside the rule set.
    pub fn readonly(self, name: &str, keys: &[&str], values: &[&str]) -> Result<Self> {
        self.relation(name, keys, values, CollectionKind::ReadOnly)
    }

    /// Table mirrored into a key/value store by the runtime.
    pub fn persistent(self, name: &str, keys: &[&str], values: &[&str]) -> Result<Self> {
        self.relation(name, keys, values, CollectionKind::Persistent)
    }

    /// Declares a collection from a prepared schema.
    pub fn declare(mut self, schema: Schema, kind: CollectionKind) -> Result<Self> {
        self.catalog.declare(schema, kind)?;
        Ok(self)
    }

    /// Lattice-valued collection.
    pub fn lattice(mut self, name: &str, kind: LatticeKind) -> Result<Self> {
        self.catalog.declare_lattice(name, kind, false)?;
        Ok(self)
    }

    /// Lattice-valued collection reset at every tick.
    pub fn scratch_lattice(mut self, name: &str, kind: LatticeKind) -> Result<Self> {
        self.catalog.declare_lattice(name, kind, true)?;
        Ok(self)
    }

    /// Facts loaded into `collection` before the first tick's evaluation.
    pub fn bootstrap(mut self, collection: &str, tuples: impl IntoIterator<Item = Tuple>) -> Result<Self> {
        SchemaBuilder::new(collection)?;
        self.bootstrap
            .push((String::from(collection), tuples.into_iter().collect()));
        Ok(self)
    }

    pub fn rule(mut self, rule: RuleDescriptor) -> Result<Self> {
        self.rules.push(rule);
        Ok(self)
    }

    /// `lhs <= body`
    pub fn merge_now(self, lhs: &str, body: Plan) -> Result<Self> {
        self.rule(RuleDescriptor::new(lhs, RuleOp::MergeNow, body))
    }

    /// `lhs <+ body`
    pub fn merge_next_tick(self, lhs: &str, body: Plan) -> Result<Self> {
        self.rule(RuleDescriptor::new(lhs, RuleOp::MergeNextTick, body))
    }

    /// `lhs <~ body`
    pub fn async_send(self, lhs: &str, body: Plan) -> Result<Self> {
        self.rule(RuleDescriptor::new(lhs, RuleOp::Async, body))
    }

    /// `lhs <- body`
    pub fn delete(self, lhs: &str, body: Plan) -> Result<Self> {
        self.rule(RuleDescriptor::new(lhs, RuleOp::Delete, body))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &[RuleDescriptor] {
        &self.rules
    }

    /// Highest stratum number used by any rule.
    pub fn max_stratum(&self) -> usize {
        self.rules.iter().map(|r| r.stratum).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_builder() {
        let p = Program::new()
            .unwrap()
            .table("link", &["from", "to"], &["cost"])
            .unwrap()
            .scratch("reach", &["from", "to"], &[])
            .unwrap()
            .merge_now("reach", Plan::scan("link").map(|t, _| Ok(t.slice(0, 2))))
            .unwrap()
            .rule(
                RuleDescriptor::new("reach", RuleOp::MergeNow, Plan::scan("reach"))
                    .named("copy")
                    .stratum(2),
            )
            .unwrap();
        assert_eq!(p.rules().len(), 2);
        assert_eq!(p.rules()[0].name, "reach <= map(scan(link))");
        assert_eq!(p.rules()[1].name, "copy");
        assert_eq!(p.max_stratum(), 2);
        assert!(p.catalog().contains("link"));
    }

    #[test]
    fn test_periodic_schema() {
        let p = Program::new().unwrap().periodic("timer", 100).unwrap();
        let s = p.catalog().schema("timer").unwrap();
        assert_eq!(s.columns(), &["key", "val"]);
    }
}
