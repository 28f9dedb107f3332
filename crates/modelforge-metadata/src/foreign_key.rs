//! Foreign keys and the navigations that ride on them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::arena::{EntityTypeId, ForeignKeyId, KeyId, NavigationId, PropertyId, SkipNavigationId};
use crate::config_source::{ConfigurationSource, Facet};

/// What happens to dependents when their principal is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteBehavior {
    Cascade,
    #[default]
    ClientSetNull,
    Restrict,
    SetNull,
    NoAction,
}

impl fmt::Display for DeleteBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cascade => "cascade",
            Self::ClientSetNull => "client_set_null",
            Self::Restrict => "restrict",
            Self::SetNull => "set_null",
            Self::NoAction => "no_action",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// The dependent entity type.
    pub declaring_type: EntityTypeId,
    pub properties: Vec<PropertyId>,
    /// `None` while the properties are synthesized placeholders.
    pub properties_source: Option<ConfigurationSource>,
    pub principal_key: KeyId,
    pub principal_type: EntityTypeId,
    pub principal_end_source: Option<ConfigurationSource>,
    pub unique: Facet<bool>,
    pub required: Facet<bool>,
    pub required_dependent: Facet<bool>,
    pub ownership: Facet<bool>,
    pub delete_behavior: Facet<DeleteBehavior>,
    pub dependent_to_principal: Option<NavigationId>,
    pub principal_to_dependent: Option<NavigationId>,
    pub source: ConfigurationSource,
    pub annotations: Annotations,
}

impl ForeignKey {
    pub fn is_unique(&self) -> bool {
        self.unique.get()
    }

    pub fn is_ownership(&self) -> bool {
        self.ownership.get()
    }

    pub fn delete_behavior(&self) -> DeleteBehavior {
        self.delete_behavior.get()
    }

    pub fn is_self_referencing(&self) -> bool {
        self.declaring_type == self.principal_type
    }

    pub fn navigations(&self) -> impl Iterator<Item = NavigationId> {
        self.dependent_to_principal
            .into_iter()
            .chain(self.principal_to_dependent)
    }
}

/// A relationship reference backed directly by a foreign key.
#[derive(Debug, Clone)]
pub struct Navigation {
    pub name: String,
    pub declaring_type: EntityTypeId,
    pub target_type: EntityTypeId,
    pub foreign_key: ForeignKeyId,
    /// `true` when declared on the dependent and pointing at the principal.
    pub on_dependent: bool,
    pub collection: bool,
    pub source: ConfigurationSource,
    pub annotations: Annotations,
}

/// A relationship reference resolved through a join entity type.
#[derive(Debug, Clone)]
pub struct SkipNavigation {
    pub name: String,
    pub declaring_type: EntityTypeId,
    pub target_type: EntityTypeId,
    pub collection: bool,
    /// Foreign key on the join type whose principal is `declaring_type`.
    pub foreign_key: Facet<Option<ForeignKeyId>>,
    pub inverse: Facet<Option<SkipNavigationId>>,
    pub source: ConfigurationSource,
    pub annotations: Annotations,
}

impl SkipNavigation {
    pub fn foreign_key(&self) -> Option<ForeignKeyId> {
        self.foreign_key.get()
    }

    pub fn inverse(&self) -> Option<SkipNavigationId> {
        self.inverse.get()
    }
}
