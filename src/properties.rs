//! `server.properties` codec.
//!
//! Lines are `name=value`; values are coerced to booleans, numbers, null (for
//! an empty value) or left as text. Parsed lists are sorted by name,
//! ignoring case.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: PropertyValue,
}

impl PropertyValue {
    pub fn coerce(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return PropertyValue::Null;
        }
        match raw {
            "true" => return PropertyValue::Bool(true),
            "false" => return PropertyValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<i64>() {
            return PropertyValue::Integer(n);
        }
        if looks_numeric(raw) {
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() {
                    return PropertyValue::Float(f);
                }
            }
        }
        PropertyValue::Text(raw.to_string())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

// "inf" and "NaN" parse as f64 but are level seeds and motd text, not numbers.
fn looks_numeric(raw: &str) -> bool {
    raw.chars().any(|c| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(n) => write!(f, "{n}"),
            // Debug keeps the fractional part ("1.0"), so the value re-parses as a float.
            PropertyValue::Float(x) => write!(f, "{x:?}"),
            PropertyValue::Text(s) => write!(f, "{s}"),
            PropertyValue::Null => Ok(()),
        }
    }
}

impl Property {
    pub fn new<S: Into<String>>(name: S, value: PropertyValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

pub fn parse(text: &str) -> Vec<Property> {
    let mut props: Vec<Property> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let (name, raw) = line.split_once('=').unwrap_or((line, ""));
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        set(&mut props, name, PropertyValue::coerce(raw));
    }

    props
}

pub fn serialize(props: &[Property]) -> String {
    let mut out = String::new();
    for prop in props {
        out.push_str(&prop.name);
        out.push('=');
        out.push_str(&prop.value.to_string());
        out.push('\n');
    }
    out
}

pub fn get<'a>(props: &'a [Property], name: &str) -> Option<&'a PropertyValue> {
    props.iter().find(|p| p.name == name).map(|p| &p.value)
}

/// Inserts or replaces `name`, keeping the list sorted and names unique.
pub fn set(props: &mut Vec<Property>, name: &str, value: PropertyValue) {
    if let Some(existing) = props.iter_mut().find(|p| p.name == name) {
        existing.value = value;
        return;
    }
    let key = name.to_lowercase();
    let at = props.partition_point(|p| p.name.to_lowercase() <= key);
    props.insert(at, Property::new(name, value));
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "#Minecraft server properties\n\
        #Sat Jan 01 00:00:00 UTC 2022\n\
        spawn-protection=16\n\
        motd=A Minecraft Server\n\
        level-seed=\n\
        Online-Mode=true\n\
        enable-rcon=false\n\
        difficulty=1\n\
        max-tick-time=60000\n";

    #[test]
    fn parse_coerces_and_sorts() {
        let props = parse(SAMPLE);
        let names: Vec<_> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "difficulty",
                "enable-rcon",
                "level-seed",
                "max-tick-time",
                "motd",
                "Online-Mode",
                "spawn-protection"
            ]
        );
        assert_eq!(get(&props, "enable-rcon"), Some(&PropertyValue::Bool(false)));
        assert_eq!(get(&props, "level-seed"), Some(&PropertyValue::Null));
        assert_eq!(get(&props, "spawn-protection"), Some(&PropertyValue::Integer(16)));
        assert_eq!(
            get(&props, "motd"),
            Some(&PropertyValue::Text("A Minecraft Server".into()))
        );
    }

    #[test]
    fn round_trip_is_stable() {
        let props = parse(SAMPLE);
        let text = serialize(&props);
        assert!(text.contains("level-seed=\n"));
        assert!(text.contains("enable-rcon=false\n"));
        assert_eq!(parse(&text), props);
    }

    #[test]
    fn coercion_is_stable_for_bools_and_numbers() {
        for raw in ["true", "false", "25565", "0.5", "1.0", "-3"] {
            let value = PropertyValue::coerce(raw);
            assert_eq!(PropertyValue::coerce(&value.to_string()), value, "{raw}");
        }
        assert_eq!(PropertyValue::coerce("25565").to_string(), "25565");
        assert_eq!(PropertyValue::coerce("true").to_string(), "true");
    }

    #[test]
    fn non_numeric_words_stay_text() {
        assert_eq!(PropertyValue::coerce("NaN"), PropertyValue::Text("NaN".into()));
        assert_eq!(PropertyValue::coerce("inf"), PropertyValue::Text("inf".into()));
        assert_eq!(
            PropertyValue::coerce("minecraft:normal"),
            PropertyValue::Text("minecraft:normal".into())
        );
    }

    #[test]
    fn set_replaces_and_inserts_in_order() {
        let mut props = parse("b=1\nd=2\n");
        set(&mut props, "c", PropertyValue::Bool(true));
        set(&mut props, "d", PropertyValue::Integer(5));
        set(&mut props, "A", PropertyValue::Null);
        let names: Vec<_> = props.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "b", "c", "d"]);
        assert_eq!(get(&props, "d"), Some(&PropertyValue::Integer(5)));
    }

    #[test]
    fn duplicate_names_keep_last_value() {
        let props = parse("level-name=world\nlevel-name=other\n");
        assert_eq!(props.len(), 1);
        assert_eq!(get(&props, "level-name"), Some(&PropertyValue::Text("other".into())));
    }
}
