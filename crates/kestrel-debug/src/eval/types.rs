//! Static knowledge about type names: primitives, their boxes and the aliases
//! people type in expressions.

pub(crate) const OBJECT: &str = "java.lang.Object";
pub(crate) const STRING: &str = "java.lang.String";

const PRIMITIVE_BOXES: &[(&str, &str)] = &[
    ("boolean", "java.lang.Boolean"),
    ("byte", "java.lang.Byte"),
    ("short", "java.lang.Short"),
    ("int", "java.lang.Integer"),
    ("long", "java.lang.Long"),
    ("float", "java.lang.Float"),
    ("double", "java.lang.Double"),
    ("char", "java.lang.Character"),
];

/// Supertypes of `java.lang.String`, so strings that only exist locally can
/// still be matched against parameter types.
pub(crate) const STRING_SUPERTYPES: &[&str] = &[
    OBJECT,
    "java.lang.CharSequence",
    "java.lang.Comparable",
    "java.io.Serializable",
];

const KOTLIN_ALIASES: &[(&str, &str)] = &[
    ("Any", OBJECT),
    ("kotlin.Any", OBJECT),
    ("String", STRING),
    ("kotlin.String", STRING),
    ("CharSequence", "java.lang.CharSequence"),
    ("kotlin.CharSequence", "java.lang.CharSequence"),
    ("Number", "java.lang.Number"),
    ("kotlin.Number", "java.lang.Number"),
    ("Comparable", "java.lang.Comparable"),
    ("kotlin.Comparable", "java.lang.Comparable"),
    ("Boolean", "boolean"),
    ("kotlin.Boolean", "boolean"),
    ("Byte", "byte"),
    ("kotlin.Byte", "byte"),
    ("Short", "short"),
    ("kotlin.Short", "short"),
    ("Int", "int"),
    ("kotlin.Int", "int"),
    ("Long", "long"),
    ("kotlin.Long", "long"),
    ("Float", "float"),
    ("kotlin.Float", "float"),
    ("Double", "double"),
    ("kotlin.Double", "double"),
    ("Char", "char"),
    ("kotlin.Char", "char"),
    ("List", "java.util.List"),
    ("kotlin.collections.List", "java.util.List"),
    ("MutableList", "java.util.List"),
    ("Map", "java.util.Map"),
    ("kotlin.collections.Map", "java.util.Map"),
    ("Set", "java.util.Set"),
    ("kotlin.collections.Set", "java.util.Set"),
    ("Collection", "java.util.Collection"),
];

/// Map a name as written by the user to the name the target uses.
pub(crate) fn canonical_type_name(name: &str) -> &str {
    KOTLIN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, target)| *target)
        .unwrap_or(name)
}

pub(crate) fn is_primitive(name: &str) -> bool {
    PRIMITIVE_BOXES.iter().any(|(prim, _)| *prim == name)
}

pub(crate) fn boxed_name(primitive: &str) -> Option<&'static str> {
    PRIMITIVE_BOXES
        .iter()
        .find(|(prim, _)| *prim == primitive)
        .map(|(_, boxed)| *boxed)
}

/// Primitive held by a box type such as `java.lang.Integer`.
pub(crate) fn unboxed_name(boxed: &str) -> Option<&'static str> {
    PRIMITIVE_BOXES
        .iter()
        .find(|(_, name)| *name == boxed)
        .map(|(prim, _)| *prim)
}

/// Reference types a primitive of the given kind may be boxed into, with
/// their distance from the box type.
pub(crate) fn boxing_targets(primitive: &str) -> Vec<(&'static str, u32)> {
    let mut out = Vec::new();
    if let Some(boxed) = boxed_name(primitive) {
        out.push((boxed, 0));
    }
    if !matches!(primitive, "boolean" | "char") {
        out.push(("java.lang.Number", 1));
    }
    out.push(("java.lang.Comparable", 1));
    out.push(("java.io.Serializable", 1));
    out.push((OBJECT, supertype_distance(OBJECT, 1)));
    out
}

/// How far a supertype sits from the runtime type when ranking overloads.
/// `java.lang.Object` is always the least specific.
pub(crate) fn supertype_distance(name: &str, depth: u32) -> u32 {
    if name == OBJECT {
        OBJECT_DISTANCE
    } else {
        depth
    }
}

const OBJECT_DISTANCE: u32 = 64;

/// JVM widening primitive conversions (JLS 5.1.2).
pub(crate) fn primitive_widens(from: &str, to: &str) -> bool {
    let targets: &[&str] = match from {
        "byte" => &["short", "int", "long", "float", "double"],
        "short" | "char" => &["int", "long", "float", "double"],
        "int" => &["long", "float", "double"],
        "long" => &["float", "double"],
        "float" => &["double"],
        _ => &[],
    };
    targets.contains(&to)
}

/// Whether a user-written name refers to `actual`, accepting simple names
/// (`ArrayList` for `java.util.ArrayList`) and nested-class `$` separators.
pub(crate) fn names_match(actual: &str, wanted: &str) -> bool {
    let wanted = canonical_type_name(wanted);
    if actual == wanted {
        return true;
    }
    if wanted.contains('.') {
        return actual.replace('$', ".") == wanted;
    }
    simple_type_name(actual) == wanted
}

pub(crate) fn simple_type_name(full: &str) -> &str {
    let tail = full.rsplit('.').next().unwrap_or(full);
    tail.rsplit('$').next().unwrap_or(tail)
}
