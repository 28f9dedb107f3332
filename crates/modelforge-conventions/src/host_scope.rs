//! Lookups from schema types back to the host catalog.
//!
//! Results are cloned so callers can keep them while mutating the model.

use modelforge_metadata::{
    EntityTypeId, HostField, HostMember, Model, TypeBaseId,
};

/// Host type backing `ty`, if any.
pub(crate) fn host_type_name(model: &Model, ty: TypeBaseId) -> Option<String> {
    match ty {
        TypeBaseId::Entity(e) => model.entity_type(e)?.host_type.clone(),
        TypeBaseId::Complex(c) => Some(model.complex_type(c)?.host_type.clone()),
    }
}

/// Members `ty` is responsible for mapping. Entity types stop at the host
/// type of their mapped base; complex types see their whole host ancestry.
pub(crate) fn members_of(model: &Model, ty: TypeBaseId) -> Vec<HostMember> {
    match ty {
        TypeBaseId::Entity(e) => model
            .host_members_in_scope(e)
            .into_iter()
            .cloned()
            .collect(),
        TypeBaseId::Complex(_) => {
            let Some(host) = host_type_name(model, ty) else {
                return Vec::new();
            };
            std::iter::once(host.clone())
                .chain(model.host().ancestors(&host))
                .filter_map(|name| model.host().get(&name))
                .flat_map(|t| t.members.iter().cloned())
                .collect()
        }
    }
}

/// The host member `name` as seen from `ty`, including inherited members.
pub(crate) fn member_named(model: &Model, ty: TypeBaseId, name: &str) -> Option<HostMember> {
    let host = host_type_name(model, ty)?;
    std::iter::once(host.clone())
        .chain(model.host().ancestors(&host))
        .filter_map(|t| model.host().get(&t))
        .find_map(|t| t.member(name).cloned())
}

/// Fields of the host type of `ty` and all of its ancestors.
pub(crate) fn fields_of(model: &Model, ty: TypeBaseId) -> Vec<HostField> {
    let Some(host) = host_type_name(model, ty) else {
        return Vec::new();
    };
    std::iter::once(host.clone())
        .chain(model.host().ancestors(&host))
        .filter_map(|name| model.host().get(&name))
        .flat_map(|t| t.fields.iter().cloned())
        .collect()
}

/// `true` when the host type `name` exists and maps as an entity type.
pub(crate) fn is_entity_candidate(model: &Model, name: &str) -> bool {
    model.host().get(name).is_some_and(|t| !t.is_complex())
}

/// Entity types whose host members point at the host type of `target`.
pub(crate) fn referencing_entity_types(model: &Model, target: EntityTypeId) -> Vec<EntityTypeId> {
    let Some(target_host) = model.entity_type(target).and_then(|e| e.host_type.clone()) else {
        return Vec::new();
    };
    model
        .entity_type_ids()
        .into_iter()
        .filter(|id| *id != target)
        .filter(|id| {
            model
                .host_members_in_scope(*id)
                .iter()
                .any(|m| m.ty.target() == Some(target_host.as_str()))
        })
        .collect()
}

/// Case-insensitive name equality.
pub(crate) fn same_name(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
