//! MiniScript runtime intrinsics: global functions and the methods available
//! on string, list and map values.

use super::entity::{Entity, EntityKind, MapType, ParameterInfo, Signature, Type};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;

type Intrinsic = (&'static str, &'static [&'static str], Type, &'static str);

fn table(intrinsics: Vec<Intrinsic>) -> BTreeMap<String, Entity> {
    intrinsics
        .into_iter()
        .map(|(name, parameters, returns, documentation)| {
            let signature = Signature::new(
                parameters
                    .iter()
                    .map(|p| ParameterInfo {
                        name: p.to_string(),
                        default: None,
                    })
                    .collect(),
                returns,
            );
            let mut entity = Entity::new(name, EntityKind::Builtin, Type::Function(signature));
            entity.documentation = Some(documentation);
            (name.to_string(), entity)
        })
        .collect()
}

fn intrinsic(
    name: &'static str,
    parameters: &'static [&'static str],
    returns: Type,
    documentation: &'static str,
) -> Intrinsic {
    (name, parameters, returns, documentation)
}

fn list_of_any() -> Type {
    Type::List(Box::new(Type::Any))
}

static GLOBALS: Lazy<BTreeMap<String, Entity>> = Lazy::new(|| {
    table(vec![
        intrinsic("print", &["s"], Type::Null, "Print a value to the console."),
        intrinsic("len", &["self"], Type::Number, "Length of a string, list or map."),
        intrinsic("range", &["from", "to", "step"], list_of_any(), "List of numbers from `from` to `to`."),
        intrinsic("str", &["x"], Type::String, "Convert a value to a string."),
        intrinsic("val", &["self"], Type::Number, "Convert a string to a number."),
        intrinsic("abs", &["x"], Type::Number, "Absolute value."),
        intrinsic("floor", &["x"], Type::Number, "Round down to an integer."),
        intrinsic("ceil", &["x"], Type::Number, "Round up to an integer."),
        intrinsic("round", &["x", "decimalPlaces"], Type::Number, "Round to the given number of decimals."),
        intrinsic("sqrt", &["x"], Type::Number, "Square root."),
        intrinsic("rnd", &["seed"], Type::Number, "Random number in [0, 1)."),
        intrinsic("char", &["i"], Type::String, "Character for a code point."),
        intrinsic("time", &[], Type::Number, "Seconds since the program started."),
        intrinsic("wait", &["seconds"], Type::Null, "Pause execution."),
        intrinsic("typeof", &["x"], Type::String, "Name of a value's type."),
        intrinsic("hash", &["obj"], Type::Number, "Hash of a value."),
        intrinsic("globals", &[], Type::Map(MapType::default()), "The global variable map."),
        intrinsic("locals", &[], Type::Map(MapType::default()), "The local variable map."),
        intrinsic("outer", &[], Type::Map(MapType::default()), "The enclosing scope's variable map."),
    ])
});

static STRING_METHODS: Lazy<BTreeMap<String, Entity>> = Lazy::new(|| {
    table(vec![
        intrinsic("len", &[], Type::Number, "Number of characters."),
        intrinsic("upper", &[], Type::String, "Uppercase copy."),
        intrinsic("lower", &[], Type::String, "Lowercase copy."),
        intrinsic("indexOf", &["s", "after"], Type::Number, "Index of a substring, or null."),
        intrinsic("replace", &["oldval", "newval", "maxCount"], Type::String, "Replace occurrences."),
        intrinsic("split", &["delimiter", "maxCount"], list_of_any(), "Split into a list."),
        intrinsic("code", &[], Type::Number, "Code point of the first character."),
        intrinsic("val", &[], Type::Number, "Numeric value."),
        intrinsic("values", &[], list_of_any(), "List of characters."),
    ])
});

static LIST_METHODS: Lazy<BTreeMap<String, Entity>> = Lazy::new(|| {
    table(vec![
        intrinsic("len", &[], Type::Number, "Number of elements."),
        intrinsic("push", &["value"], Type::Null, "Append a value."),
        intrinsic("pop", &[], Type::Any, "Remove and return the last element."),
        intrinsic("pull", &[], Type::Any, "Remove and return the first element."),
        intrinsic("insert", &["index", "value"], Type::Null, "Insert a value at an index."),
        intrinsic("remove", &["index"], Type::Null, "Remove the element at an index."),
        intrinsic("indexOf", &["value", "after"], Type::Number, "Index of a value, or null."),
        intrinsic("hasIndex", &["index"], Type::Number, "Whether an index is valid."),
        intrinsic("indexes", &[], list_of_any(), "List of valid indexes."),
        intrinsic("join", &["delimiter"], Type::String, "Join elements into a string."),
        intrinsic("sort", &["byKey", "ascending"], Type::Null, "Sort in place."),
        intrinsic("shuffle", &[], Type::Null, "Shuffle in place."),
        intrinsic("sum", &[], Type::Number, "Sum of the elements."),
    ])
});

static MAP_METHODS: Lazy<BTreeMap<String, Entity>> = Lazy::new(|| {
    table(vec![
        intrinsic("len", &[], Type::Number, "Number of key/value pairs."),
        intrinsic("hasIndex", &["key"], Type::Number, "Whether a key is present."),
        intrinsic("indexes", &[], list_of_any(), "List of keys."),
        intrinsic("values", &[], list_of_any(), "List of values."),
        intrinsic("remove", &["key"], Type::Number, "Remove a key."),
        intrinsic("push", &["key"], Type::Null, "Set a key to 1."),
        intrinsic("pop", &[], Type::Any, "Remove and return an arbitrary key."),
        intrinsic("shuffle", &[], Type::Null, "Shuffle the values."),
        intrinsic("sum", &[], Type::Number, "Sum of the values."),
    ])
});

static NO_METHODS: Lazy<BTreeMap<String, Entity>> = Lazy::new(BTreeMap::new);

/// Global intrinsics, always visible regardless of position.
pub fn globals() -> &'static BTreeMap<String, Entity> {
    &GLOBALS
}

/// Methods every value of type `ty` responds to.
pub fn methods_of(ty: &Type) -> &'static BTreeMap<String, Entity> {
    match ty {
        Type::String => &STRING_METHODS,
        Type::List(_) => &LIST_METHODS,
        Type::Map(_) => &MAP_METHODS,
        Type::Any | Type::Null | Type::Number | Type::Function(_) => &NO_METHODS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_globals_are_builtin_functions() {
        let print = globals().get("print").cloned();
        let print = print.map(|e| (e.kind, e.ty.is_callable(), e.sources.is_empty()));
        assert_eq!(print, Some((EntityKind::Builtin, true, true)));
    }

    #[test]
    fn test_methods_by_type() {
        assert!(methods_of(&Type::String).contains_key("upper"));
        assert!(methods_of(&list_of_any()).contains_key("push"));
        assert!(methods_of(&Type::Map(MapType::default())).contains_key("indexes"));
        assert!(methods_of(&Type::Number).is_empty());
    }
}
