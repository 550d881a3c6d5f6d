//! Case conversion for generated GraphQL names
//!
//! Field, query and enum names are derived from user-supplied class and field
//! names. Word boundaries are found at separators, lower-to-upper transitions,
//! acronym ends (`URLPath` -> `URL`, `Path`) and letter/digit transitions.

/// Split a name into its words
pub fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut result = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                result.push(std::mem::take(&mut current));
            }
            continue;
        }

        if let Some(prev) = current.chars().last() {
            let next = chars.get(i + 1).copied();
            let boundary = (prev.is_ascii_lowercase() && c.is_ascii_uppercase())
                || (prev.is_ascii_digit() != c.is_ascii_digit())
                || (prev.is_ascii_uppercase()
                    && c.is_ascii_uppercase()
                    && next.map_or(false, |n| n.is_ascii_lowercase()));
            if boundary {
                result.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }

    if !current.is_empty() {
        result.push(current);
    }
    result
}

/// Uppercase the first character, leave the rest untouched
pub fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `first_name` -> `firstName`, `NewsItem` -> `newsItem`
pub fn camel_case(s: &str) -> String {
    words(s)
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_ascii_lowercase();
            if i == 0 {
                lower
            } else {
                upper_first(&lower)
            }
        })
        .collect()
}

/// `createdAtAsc` -> `CREATED_AT_ASC`
pub fn screaming_snake_case(s: &str) -> String {
    words(s)
        .iter()
        .map(|word| word.to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}
