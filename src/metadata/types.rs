//! Entity metadata types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Semantic type of a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    String,
    Integer,
    Decimal,
    Float,
    Boolean,
    Date,
    Timestamp,
    Blob,
}

/// A mapped column: the property name used in queries and the physical
/// column it lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub field: String,
    /// Physical column name; defaults to the field name.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    #[serde(default)]
    pub length: Option<u32>,
}

impl ColumnDef {
    pub fn new(field: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            field: field.into(),
            column: None,
            column_type,
            length: None,
        }
    }

    pub fn column_name(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.field)
    }
}

/// Kind of association between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// Joining along this relation can yield several rows per parent row.
    pub fn is_to_many(self) -> bool {
        matches!(self, RelationKind::OneToMany | RelationKind::ManyToMany)
    }
}

/// Association table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTable {
    pub name: String,
    /// Column referencing the owning entity's identifier.
    pub local: String,
    /// Column referencing the target entity's identifier.
    pub foreign: String,
}

impl JoinTable {
    pub fn new(
        name: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            local: local.into(),
            foreign: foreign.into(),
        }
    }
}

fn default_owning() -> bool {
    true
}

/// A relation from one entity to another.
///
/// For one-to-one, many-to-one and one-to-many relations the join predicate
/// is `parent.local = child.foreign`, with both names being physical
/// columns. Many-to-many relations go through [`JoinTable`] and join on the
/// identifiers of both entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub kind: RelationKind,
    pub target: String,
    #[serde(default)]
    pub local: String,
    #[serde(default)]
    pub foreign: String,
    #[serde(default = "default_owning")]
    pub owning: bool,
    #[serde(default)]
    pub join_table: Option<JoinTable>,
    /// Self-referencing many-to-many where either association column may
    /// point at the current row ("equal nest").
    #[serde(default)]
    pub equal: bool,
}

impl Relation {
    fn keyed(
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            local: local.into(),
            foreign: foreign.into(),
            owning: true,
            join_table: None,
            equal: false,
        }
    }

    pub fn one_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self::keyed(name, RelationKind::OneToOne, target, local, foreign)
    }

    pub fn many_to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self::keyed(name, RelationKind::ManyToOne, target, local, foreign)
    }

    /// Inverse side: `local` is usually the identifier, `foreign` the
    /// referencing column on the target.
    pub fn one_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        let mut relation = Self::keyed(name, RelationKind::OneToMany, target, local, foreign);
        relation.owning = false;
        relation
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        join_table: JoinTable,
    ) -> Self {
        let mut relation = Self::keyed(name, RelationKind::ManyToMany, target, "", "");
        relation.join_table = Some(join_table);
        relation
    }

    pub fn inverse(mut self) -> Self {
        self.owning = false;
        self
    }

    pub fn equal(mut self) -> Self {
        self.equal = true;
        self
    }
}

/// Inheritance mapping strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceKind {
    /// Whole hierarchy in one table.
    SingleTable,
    /// One table per class, joined on the identifier.
    Joined,
}

/// Inheritance definition, declared on the hierarchy root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inheritance {
    pub kind: InheritanceKind,
    /// Discriminator column on the root table.
    pub discriminator: String,
    /// Discriminator value -> concrete entity name.
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

impl Inheritance {
    pub fn single_table(discriminator: impl Into<String>) -> Self {
        Self {
            kind: InheritanceKind::SingleTable,
            discriminator: discriminator.into(),
            map: BTreeMap::new(),
        }
    }

    pub fn joined(discriminator: impl Into<String>) -> Self {
        Self {
            kind: InheritanceKind::Joined,
            discriminator: discriminator.into(),
            map: BTreeMap::new(),
        }
    }

    pub fn map(mut self, value: impl Into<String>, entity: impl Into<String>) -> Self {
        self.map.insert(value.into(), entity.into());
        self
    }
}

/// Everything the compiler needs to know about one mapped entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub name: String,
    pub table: String,
    #[serde(default)]
    pub columns: Vec<ColumnDef>,
    /// Identifier fields, in key order.
    #[serde(default)]
    pub identifier: Vec<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Direct supertype, for entities inside an inheritance hierarchy.
    #[serde(default)]
    pub parent: Option<String>,
    /// Present on the hierarchy root only.
    #[serde(default)]
    pub inheritance: Option<Inheritance>,
}

impl EntityMetadata {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            identifier: Vec::new(),
            relations: Vec::new(),
            parent: None,
            inheritance: None,
        }
    }

    pub fn column(mut self, field: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef::new(field, column_type));
        self
    }

    /// Add a column whose physical name differs from the field name.
    pub fn mapped_column(
        mut self,
        field: impl Into<String>,
        column: impl Into<String>,
        column_type: ColumnType,
    ) -> Self {
        let mut def = ColumnDef::new(field, column_type);
        def.column = Some(column.into());
        self.columns.push(def);
        self
    }

    pub fn identifier<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn inheritance(mut self, inheritance: Inheritance) -> Self {
        self.inheritance = Some(inheritance);
        self
    }

    /// Look up a column by field name, falling back to the physical name.
    pub fn find_column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.field == name)
            .or_else(|| self.columns.iter().find(|c| c.column_name() == name))
    }

    pub fn find_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_composite_identifier(&self) -> bool {
        self.identifier.len() > 1
    }
}
