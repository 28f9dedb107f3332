//! Host-type descriptors.
//!
//! The engine never reflects over real types. Whatever introspects the host
//! language hands over a [`HostCatalog`]: one [`HostType`] per record type,
//! with its members, backing fields, constructors and the declarative markers
//! already parsed into structured instructions.
//!
//! The catalog is plain data and round-trips through JSON, e.g.
//!
//! ```json
//! { "types": [
//!   { "name": "Blog",
//!     "members": [
//!       { "name": "Id", "type": { "kind": "scalar", "name": "int" } },
//!       { "name": "Posts", "type": { "kind": "collection", "target": "Post" } }
//!     ] } ] }
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::property::ValueGenerated;

// ============================================================================
// Value types
// ============================================================================

/// A scalar value type (`int`, `string`, `Guid?`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueType {
    pub name: String,
    #[serde(default)]
    pub nullable: bool,
}

impl ValueType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: false,
        }
    }

    pub fn nullable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nullable: true,
        }
    }

    /// Parse `"Guid?"`-style spellings.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        match text.strip_suffix('?') {
            Some(name) => Self::nullable(name.trim()),
            None => Self::new(text),
        }
    }

    /// Keys and foreign keys only care about the underlying type.
    pub fn is_compatible_with(&self, other: &ValueType) -> bool {
        self.name == other.name
    }

    pub fn as_nullable(&self) -> Self {
        Self::nullable(self.name.clone())
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self.name.as_str(),
            "byte" | "sbyte" | "short" | "ushort" | "int" | "uint" | "long" | "ulong"
        )
    }

    pub fn is_guid(&self) -> bool {
        self.name.eq_ignore_ascii_case("guid")
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}?", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

// ============================================================================
// Members
// ============================================================================

/// The shape of a host member as seen by the conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberType {
    Scalar {
        name: String,
        #[serde(default)]
        nullable: bool,
    },
    ScalarCollection {
        element: String,
    },
    Reference {
        target: String,
    },
    Collection {
        target: String,
    },
}

impl MemberType {
    /// The referenced host type, for reference and collection members.
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Reference { target } | Self::Collection { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection { .. })
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self {
            Self::Scalar { name, nullable } => Some(ValueType {
                name: name.clone(),
                nullable: *nullable,
            }),
            Self::ScalarCollection { element } => Some(ValueType::new(format!("{element}[]"))),
            _ => None,
        }
    }
}

/// Declarative instruction attached to a member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "snake_case")]
pub enum MemberMarker {
    Key,
    Required,
    NotMapped,
    /// On a navigation: names the FK property (or a comma-separated list).
    /// On a property: names the navigation it backs.
    ForeignKey {
        name: String,
    },
    InverseProperty {
        name: String,
    },
    BackingField {
        name: String,
    },
    DatabaseGenerated {
        option: ValueGenerated,
    },
}

/// Declarative instruction attached to a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", rename_all = "snake_case")]
pub enum TypeMarker {
    NotMapped,
    /// The type is a value object mapped as a complex type, never an entity.
    Complex,
    PrimaryKey {
        properties: Vec<String>,
    },
    Index {
        properties: Vec<String>,
        #[serde(default)]
        unique: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: MemberType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<MemberMarker>,
}

impl HostMember {
    pub fn new(name: impl Into<String>, ty: MemberType) -> Self {
        Self {
            name: name.into(),
            ty,
            markers: Vec::new(),
        }
    }

    pub fn scalar(name: impl Into<String>, value_type: &str) -> Self {
        let value_type = ValueType::parse(value_type);
        Self::new(
            name,
            MemberType::Scalar {
                name: value_type.name,
                nullable: value_type.nullable,
            },
        )
    }

    pub fn reference(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            MemberType::Reference {
                target: target.into(),
            },
        )
    }

    pub fn collection(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            MemberType::Collection {
                target: target.into(),
            },
        )
    }

    pub fn with_marker(mut self, marker: MemberMarker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn has_marker(&self, marker: &MemberMarker) -> bool {
        self.markers.contains(marker)
    }

    pub fn foreign_key_marker(&self) -> Option<&str> {
        self.markers.iter().find_map(|m| match m {
            MemberMarker::ForeignKey { name } => Some(name.as_str()),
            _ => None,
        })
    }

    pub fn inverse_property_marker(&self) -> Option<&str> {
        self.markers.iter().find_map(|m| match m {
            MemberMarker::InverseProperty { name } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// A field on the host type that may back a property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostParameter {
    pub name: String,
    /// Type spelling, e.g. `"int"`, `"Guid?"`, `"ILazyLoader"`.
    #[serde(rename = "type")]
    pub ty: String,
}

impl HostParameter {
    pub fn new(name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// One construction path of a host type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConstructor {
    #[serde(default)]
    pub parameters: Vec<HostParameter>,
}

impl HostConstructor {
    pub fn new(parameters: Vec<HostParameter>) -> Self {
        Self { parameters }
    }

    /// `Blog(string, int)`-style rendering used in diagnostics.
    pub fn signature(&self, type_name: &str) -> String {
        let params: Vec<&str> = self.parameters.iter().map(|p| p.ty.as_str()).collect();
        format!("{type_name}({})", params.join(", "))
    }
}

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostType {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
    #[serde(default)]
    pub members: Vec<HostMember>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<HostField>,
    /// Empty means a single implicit parameterless constructor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constructors: Vec<HostConstructor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub markers: Vec<TypeMarker>,
}

impl HostType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: None,
            members: Vec::new(),
            fields: Vec::new(),
            constructors: Vec::new(),
            markers: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn with_member(mut self, member: HostMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, ty: impl Into<String>) -> Self {
        self.fields.push(HostField {
            name: name.into(),
            ty: ty.into(),
        });
        self
    }

    pub fn with_constructor(mut self, constructor: HostConstructor) -> Self {
        self.constructors.push(constructor);
        self
    }

    pub fn with_marker(mut self, marker: TypeMarker) -> Self {
        self.markers.push(marker);
        self
    }

    pub fn member(&self, name: &str) -> Option<&HostMember> {
        self.members.iter().find(|m| m.name == name)
    }

    pub fn has_marker(&self, marker: &TypeMarker) -> bool {
        self.markers.contains(marker)
    }

    pub fn is_complex(&self) -> bool {
        self.has_marker(&TypeMarker::Complex)
    }

    /// Constructors, with the implicit parameterless one when none is listed.
    pub fn construction_paths(&self) -> Vec<HostConstructor> {
        if self.constructors.is_empty() {
            vec![HostConstructor::default()]
        } else {
            self.constructors.clone()
        }
    }
}

/// All host types known to a model, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCatalog {
    #[serde(with = "catalog_types")]
    types: BTreeMap<String, HostType>,
}

impl HostCatalog {
    pub fn new(types: impl IntoIterator<Item = HostType>) -> Self {
        Self {
            types: types.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }

    pub fn insert(&mut self, host_type: HostType) {
        self.types.insert(host_type.name.clone(), host_type);
    }

    pub fn get(&self, name: &str) -> Option<&HostType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostType> + '_ {
        self.types.values()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Host ancestors of `name`, nearest first. Stops on unknown names and on
    /// cycles in malformed catalogs.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut current = self.get(name).and_then(|t| t.base.clone());
        while let Some(base) = current {
            if base == name || out.contains(&base) {
                break;
            }
            current = self.get(&base).and_then(|t| t.base.clone());
            out.push(base);
        }
        out
    }

    /// `true` when `sub` is `sup` or derives from it.
    pub fn is_assignable_to(&self, sub: &str, sup: &str) -> bool {
        sub == sup || self.ancestors(sub).iter().any(|a| a == sup)
    }
}

mod catalog_types {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::HostType;

    pub fn serialize<S: Serializer>(
        types: &BTreeMap<String, HostType>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&HostType> = types.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, HostType>, D::Error> {
        let list = Vec::<HostType>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|t| (t.name.clone(), t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nullable_spelling() {
        assert_eq!(ValueType::parse("Guid?"), ValueType::nullable("Guid"));
        assert_eq!(ValueType::parse("int").to_string(), "int");
        assert!(ValueType::parse("int?").is_compatible_with(&ValueType::new("int")));
    }

    #[test]
    fn ancestors_are_nearest_first_and_cycle_safe() {
        let catalog = HostCatalog::new([
            HostType::new("A"),
            HostType::new("B").with_base("A"),
            HostType::new("C").with_base("B"),
            HostType::new("X").with_base("Y"),
            HostType::new("Y").with_base("X"),
        ]);
        assert_eq!(catalog.ancestors("C"), vec!["B".to_string(), "A".to_string()]);
        assert!(catalog.is_assignable_to("C", "A"));
        assert!(!catalog.is_assignable_to("A", "C"));
        assert_eq!(catalog.ancestors("X"), vec!["Y".to_string()]);
    }

    #[test]
    fn catalog_reads_json_list() {
        let json = r#"{ "types": [
            { "name": "Blog", "members": [
                { "name": "Id", "type": { "kind": "scalar", "name": "int" } },
                { "name": "Posts", "type": { "kind": "collection", "target": "Post" },
                  "markers": [ { "marker": "inverse_property", "name": "Blog" } ] }
            ] }
        ] }"#;
        let catalog: HostCatalog = serde_json::from_str(json).expect("catalog json");
        let blog = catalog.get("Blog").expect("Blog");
        assert_eq!(blog.members.len(), 2);
        assert_eq!(blog.members[1].inverse_property_marker(), Some("Blog"));
        assert_eq!(blog.construction_paths().len(), 1);
    }
}
