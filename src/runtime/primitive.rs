use crate::descriptor::FieldType;

/// Name and type of every primitive class. `void` has no field type.
pub const PRIMITIVE_TYPES: [(&str, Option<FieldType>); 9] = [
    ("boolean", Some(FieldType::Boolean)),
    ("byte", Some(FieldType::Byte)),
    ("char", Some(FieldType::Char)),
    ("short", Some(FieldType::Short)),
    ("int", Some(FieldType::Int)),
    ("long", Some(FieldType::Long)),
    ("float", Some(FieldType::Float)),
    ("double", Some(FieldType::Double)),
    ("void", None),
];

/// `Some(type)` when `name` names a primitive class. The inner `None` is `void`.
pub fn primitive_type(name: &str) -> Option<Option<FieldType>> {
    PRIMITIVE_TYPES
        .iter()
        .find(|(primitive, _)| *primitive == name)
        .map(|(_, field_type)| field_type.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_primitive_names() {
        assert_eq!(primitive_type("int"), Some(Some(FieldType::Int)));
        assert_eq!(primitive_type("void"), Some(None));
        assert_eq!(primitive_type("java/lang/Integer"), None);
        assert_eq!(primitive_type("I"), None);
    }
}
