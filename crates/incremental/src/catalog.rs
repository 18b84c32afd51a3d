//! Collection declarations.

use crate::collection::{Collection, CollectionKind, LatticeCell, Relation};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use tidal_core::{Error, Result, Schema, SchemaBuilder};
use tidal_lattice::LatticeKind;

/// Loopback channel every program can write to in order to request another tick.
pub const LOCALTICK: &str = "localtick";
/// Scratch collection; any tuple in it stops the instance after the tick.
pub const HALT: &str = "halt";
/// Table of periodic timers: `[pername] => [period]`.
pub const PERIODICS_TBL: &str = "periodics_tbl";

/// Named collections of one program, in declaration order.
#[derive(Debug)]
pub struct Catalog {
    collections: Vec<Collection>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Creates a catalog holding the built-in collections.
    pub fn new() -> Result<Self> {
        let mut c = Self {
            collections: Vec::new(),
            index: HashMap::new(),
        };
        c.declare(Schema::new(LOCALTICK, &["col1"], &[])?, CollectionKind::Channel)?;
        c.declare(Schema::new(HALT, &["key"], &[])?, CollectionKind::Scratch)?;
        c.declare(
            Schema::new(PERIODICS_TBL, &["pername"], &["period"])?,
            CollectionKind::Table,
        )?;
        Ok(c)
    }

    /// Declares a relational collection.
    pub fn declare(&mut self, schema: Schema, kind: CollectionKind) -> Result<usize> {
        if kind.is_lattice() {
            return Err(Error::invalid_schema(format!(
                "{}: lattice collections are declared with declare_lattice",
                schema.name()
            )));
        }
        if kind != CollectionKind::Channel && schema.address().is_some() {
            return Err(Error::invalid_schema(format!(
                "{}: only channels may have an address column",
                schema.name()
            )));
        }
        let name = String::from(schema.name());
        self.add(name, Collection::Relation(Relation::new(schema, kind)))
    }

    /// Declares a lattice collection.
    pub fn declare_lattice(
        &mut self,
        name: &str,
        kind: LatticeKind,
        scratch: bool,
    ) -> Result<usize> {
        // validates the name like any other collection
        SchemaBuilder::new(name)?;
        self.add(
            String::from(name),
            Collection::Lattice(LatticeCell::new(name, kind, scratch)),
        )
    }

    fn add(&mut self, name: String, c: Collection) -> Result<usize> {
        if self.index.contains_key(&name) {
            return Err(Error::compile(format!("collection {} declared twice", name)));
        }
        let id = self.collections.len();
        self.collections.push(c);
        self.index.insert(name, id);
        Ok(id)
    }

    /// Index of a collection.
    pub fn lookup(&self, name: &str) -> Result<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| Error::collection_not_found(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.index.get(name).map(|&i| &self.collections[i])
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Collection> {
        match self.index.get(name) {
            Some(&i) => self.collections.get_mut(i),
            None => None,
        }
    }

    #[inline]
    pub fn by_id(&self, id: usize) -> &Collection {
        &self.collections[id]
    }

    #[inline]
    pub fn by_id_mut(&mut self, id: usize) -> &mut Collection {
        &mut self.collections[id]
    }

    /// Stored schema of a relational collection.
    pub fn schema(&self, name: &str) -> Option<&Schema> {
        self.get(name).and_then(|c| c.as_relation()).map(|r| r.schema())
    }

    pub fn kind(&self, name: &str) -> Option<CollectionKind> {
        self.get(name).map(|c| c.kind())
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Collection> {
        self.collections.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Collection> {
        self.collections.iter_mut()
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.iter().map(|c| c.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_present() {
        let c = Catalog::new().unwrap();
        assert_eq!(c.kind(LOCALTICK), Some(CollectionKind::Channel));
        assert_eq!(c.kind(HALT), Some(CollectionKind::Scratch));
        assert_eq!(c.schema(PERIODICS_TBL).unwrap().key_count(), 1);
        assert_eq!(c.len(), 3);
    }

    #[test]
    fn test_duplicate_declaration() {
        let mut c = Catalog::new().unwrap();
        let s = Schema::new("link", &["from", "to"], &["cost"]).unwrap();
        c.declare(s.clone(), CollectionKind::Table).unwrap();
        assert!(matches!(
            c.declare(s, CollectionKind::Scratch),
            Err(Error::Compile { .. })
        ));
        assert!(matches!(
            c.declare_lattice("link", LatticeKind::Max, false),
            Err(Error::Compile { .. })
        ));
    }

    #[test]
    fn test_lookup_unknown() {
        let c = Catalog::new().unwrap();
        assert!(matches!(
            c.lookup("nope"),
            Err(Error::CollectionNotFound { .. })
        ));
    }

    #[test]
    fn test_address_only_on_channels() {
        let mut c = Catalog::new().unwrap();
        let s = SchemaBuilder::new("t")
            .unwrap()
            .add_key("@addr")
            .unwrap()
            .add_value("v")
            .unwrap()
            .build()
            .unwrap();
        assert!(c.declare(s.clone(), CollectionKind::Table).is_err());
        c.declare(s, CollectionKind::Channel).unwrap();
    }
}
