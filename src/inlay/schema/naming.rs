//! Small inflection helpers for deriving model names from association names.

/// "projects" -> "Project", "delivery_notes" -> "DeliveryNote".
pub fn classify(name: &str) -> String {
    singularize(name)
        .split('_')
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect()
}

/// Naive English singularization, enough for association names:
/// "categories" -> "category", "projects" -> "project", "status" -> "status".
pub fn singularize(name: &str) -> String {
    if let Some(stem) = name.strip_suffix("ies") {
        format!("{}y", stem)
    } else if name.ends_with("ss") || name.ends_with("us") {
        name.to_string()
    } else if let Some(stem) = name.strip_suffix('s') {
        stem.to_string()
    } else {
        name.to_string()
    }
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
