//! Well-known type aliases accepted without a local declaration.
//!
//! These resolve as primitives when they appear in type position and no
//! typedef of the same name exists; a local typedef shadows the table.

/// map a common alias to the primitive name it stands for. fixed-width
/// names keep their own spelling; the layout engine knows their widths.
pub fn lookup(name: &str) -> Option<&'static str> {
    Some(match name {
        "bool" => "_Bool",
        "int8_t" => "int8_t",
        "int16_t" => "int16_t",
        "int32_t" => "int32_t",
        "int64_t" => "int64_t",
        "uint8_t" => "uint8_t",
        "uint16_t" => "uint16_t",
        "uint32_t" => "uint32_t",
        "uint64_t" => "uint64_t",
        "intptr_t" => "intptr_t",
        "uintptr_t" => "uintptr_t",
        "ptrdiff_t" => "ptrdiff_t",
        "size_t" => "size_t",
        "ssize_t" => "ssize_t",
        "wchar_t" => "wchar_t",
        _ => return None,
    })
}

pub fn is_common(name: &str) -> bool {
    lookup(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_maps_to_underscore_bool() {
        assert_eq!(lookup("bool"), Some("_Bool"));
    }

    #[test]
    fn test_stdint_names_keep_their_spelling() {
        assert_eq!(lookup("uint32_t"), Some("uint32_t"));
        assert_eq!(lookup("size_t"), Some("size_t"));
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(lookup("foobarbazunknown"), None);
    }
}
