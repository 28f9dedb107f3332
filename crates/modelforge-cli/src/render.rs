//! Human-readable rendering of a finalized model.

use std::fmt::Write;

use colored::Colorize;
use modelforge_metadata::{
    DiagnosticLevel, FinalizedEntityType, FinalizedModel, FinalizedProperty, ValueGenerated,
};

fn property_line(property: &FinalizedProperty, key: &[String]) -> String {
    let mut flags = Vec::new();
    if key.contains(&property.name) {
        flags.push("key".to_string());
    }
    if property.shadow {
        flags.push("shadow".to_string());
    }
    if property.nullable {
        flags.push("nullable".to_string());
    }
    if property.value_generated != ValueGenerated::Never {
        flags.push(format!("{:?}", property.value_generated));
    }
    if let Some(field) = &property.field {
        flags.push(format!("field {field}"));
    }
    let flags = if flags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flags.join(", "))
    };
    format!("{}: {}{flags}", property.name, property.value_type)
}

fn entity_type(out: &mut String, entity: &FinalizedEntityType) {
    let title = match &entity.base_type {
        Some(base) => format!("{} : {}", entity.name.bold(), base),
        None => entity.name.bold().to_string(),
    };
    let shadow = if entity.host_type.is_none() {
        " (shadow)".dimmed().to_string()
    } else {
        String::new()
    };
    let _ = writeln!(out, "{title}{shadow}");

    let key = entity.primary_key.clone().unwrap_or_default();
    for property in &entity.properties {
        let _ = writeln!(out, "  {}", property_line(property, &key));
    }
    for fk in &entity.foreign_keys {
        let via = fk
            .dependent_to_principal
            .as_deref()
            .map(|n| format!(" via {n}"))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "  {} ({}) -> {}({}){via} {}{} on delete {}",
            "fk".cyan(),
            fk.properties.join(", "),
            fk.principal,
            fk.principal_key.join(", "),
            if fk.unique { "one-to-one" } else { "many-to-one" },
            if fk.required { ", required" } else { "" },
            fk.delete_behavior
        );
    }
    for index in &entity.indexes {
        let _ = writeln!(
            out,
            "  {} ({}){}",
            "index".cyan(),
            index.properties.join(", "),
            if index.unique { " unique" } else { "" }
        );
    }
    for skip in &entity.skip_navigations {
        let _ = writeln!(
            out,
            "  {} {} -> {} through {}",
            "many".cyan(),
            skip.name,
            skip.target,
            skip.join_type.as_deref().unwrap_or("?")
        );
    }
    if let Some(binding) = &entity.constructor {
        let _ = writeln!(out, "  {} {}", "new".cyan(), binding.signature);
    }
}

/// Entity types in name order, followed by any warnings.
pub fn model(model: &FinalizedModel) -> String {
    let mut out = String::new();
    for entity in &model.entity_types {
        entity_type(&mut out, entity);
    }
    let warnings: Vec<_> = model
        .diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warning)
        .collect();
    if !warnings.is_empty() {
        let _ = writeln!(out);
        for warning in warnings {
            let _ = writeln!(out, "{} {warning}", "warning".yellow().bold());
        }
    }
    let _ = writeln!(
        out,
        "{} {} entity types",
        "ok".green().bold(),
        model.entity_types.len()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelforge_conventions::build_model;
    use modelforge_metadata::{HostCatalog, HostMember, HostType, ModelOptions};

    #[test]
    fn renders_keys_relationships_and_join_types() {
        colored::control::set_override(false);
        let catalog = HostCatalog::new(vec![
            HostType::new("Post")
                .with_member(HostMember::scalar("Id", "int"))
                .with_member(HostMember::collection("Tags", "Tag")),
            HostType::new("Tag")
                .with_member(HostMember::scalar("Id", "int"))
                .with_member(HostMember::collection("Posts", "Post")),
        ]);
        let finalized = build_model(catalog, &[], ModelOptions::default())
            .finalize_model()
            .unwrap();

        let text = model(&finalized);
        assert!(text.contains("PostTag (shadow)"));
        assert!(text.contains("Id: int [key, OnAdd]"));
        assert!(text.contains("many Tags -> Tag through PostTag"));
        assert!(text.contains("fk (PostId) -> Post(Id)"));
        assert!(text.ends_with("ok 3 entity types\n"));
    }
}
