//! Qualifier placement and canonical-name round-trip checks.
//!
//! The binding rule under test: a qualifier written immediately left of a
//! `*` qualifies that pointer level, while a qualifier next to the base
//! type qualifies the base. Getting this backwards flips const-pointer and
//! pointer-to-const, so the whole table is spelled out.

use ffidecl::{DeclKind, Quals, RenderOpts, Session};

fn opts() -> RenderOpts {
    RenderOpts::default()
}

#[test]
fn test_constant_versus_variable_globals() {
    // input, expected "registers as a constant"
    let cases = [
        ("int a;", false),
        ("const int a;", true),
        ("int *a;", false),
        ("const int *a;", false),
        ("int const *a;", false),
        ("int *const a;", true),
        ("int a[5];", false),
        ("const int a[5];", false),
        ("int *a[5];", false),
        ("const int *a[5];", false),
        ("int const *a[5];", false),
        ("int *const a[5];", false),
        ("int a[5][6];", false),
        ("const int a[5][6];", false),
    ];
    for (input, expect_constant) in cases {
        let s = Session::new();
        s.cdef(&format!("extern {}", input)).unwrap();
        let as_constant = s.declaration(DeclKind::Constant, "a").is_some();
        let as_variable = s.declaration(DeclKind::Variable, "a").is_some();
        assert_eq!(as_constant, expect_constant, "{}", input);
        assert_eq!(as_variable, !expect_constant, "{}", input);
    }
}

#[test]
fn test_const_int_pointer_versus_const_pointer() {
    let s = Session::new();
    // pointer to constant int: not itself constant
    let (ty1, q1) = s.parse_type_and_quals("int const *").unwrap();
    assert_eq!(q1, Quals::NONE);
    assert_eq!(s.cname(ty1, &opts()).unwrap(), "int const *");

    // constant pointer to plain int
    let (ty2, q2) = s.parse_type_and_quals("int * const").unwrap();
    assert_eq!(q2, Quals::CONST);
    assert_eq!(s.cname(ty2, &opts()).unwrap(), "int *");

    assert_ne!(ty1, ty2);
}

#[test]
fn test_qualified_pointer_chains() {
    // input, canonical spelling, top-level qualifiers
    let cases = [
        ("char * * (* const)", "char * * *", Quals::CONST),
        ("char * (* const (*))", "char * * const *", Quals::NONE),
        ("char (* const (* (*)))", "char * const * *", Quals::NONE),
        ("char const * * *", "char const * * *", Quals::NONE),
        ("const char * * *", "char const * * *", Quals::NONE),
        ("char * * * const const", "char * * *", Quals::CONST),
        ("char * * volatile *", "char * * volatile *", Quals::NONE),
        (
            "char * volatile restrict * *",
            "char * __restrict volatile * *",
            Quals::NONE,
        ),
        (
            "char const volatile * * *",
            "char volatile const * * *",
            Quals::NONE,
        ),
    ];
    let s = Session::new();
    for (input, expected, expected_quals) in cases {
        let (ty, quals) = s.parse_type_and_quals(input).unwrap();
        assert_eq!(s.cname(ty, &opts()).unwrap(), expected, "{}", input);
        assert_eq!(quals, expected_quals, "{}", input);
    }
}

#[test]
fn test_function_types_with_qualified_pointer_args() {
    let s = Session::new();
    let (ty, quals) = s
        .parse_type_and_quals("int(char*const*, short****const*)")
        .unwrap();
    assert_eq!(quals, Quals::NONE);
    assert_eq!(
        s.cname(ty, &opts()).unwrap(),
        "int(char * const *, short * * * * const *)"
    );

    let (ty, _) = s
        .parse_type_and_quals("char*const*(short*const****)")
        .unwrap();
    assert_eq!(
        s.cname(ty, &opts()).unwrap(),
        "char * const *(short * const * * * *)"
    );
}

#[test]
fn test_parameter_top_level_qualifiers_do_not_change_identity() {
    let s = Session::new();
    let plain = s.parse_type("int(*)(int *a)").unwrap();
    let const_pointee = s.parse_type("int(*)(int const *a)").unwrap();
    let const_pointer = s.parse_type("int(*)(int * const a)").unwrap();
    let const_array = s.parse_type("int(*)(int const a[])").unwrap();

    // pointee qualifiers matter
    assert_ne!(plain, const_pointee);
    // a parameter's own top-level const does not
    assert_eq!(plain, const_pointer);
    // array decay turns element qualifiers into pointee qualifiers
    assert_eq!(const_pointee, const_array);
}

#[test]
fn test_structurally_equal_types_share_a_node() {
    let s = Session::new();
    let a = s.parse_type("int * *").unwrap();
    let b = s.parse_type("int * *").unwrap();
    assert_eq!(a, b);

    s.cdef("typedef int * * ipp_t;").unwrap();
    assert_eq!(s.typedef_type("ipp_t").unwrap(), a);
}

#[test]
fn test_render_parse_round_trip() {
    let inputs = [
        "int *",
        "char * const *",
        "char * __restrict volatile * *",
        "unsigned long long * const *",
        "int(*)(int, long)",
        "int(*)(int(*)(int), long(*)())",
        "void(*)(int, ...)",
        "char(*)[8]",
        "short[3]",
        "double(double)",
        "struct tm *",
        "int * const",
    ];
    let s = Session::new();
    s.cdef("struct tm;").unwrap();
    for input in inputs {
        let (ty, quals) = s.parse_type_and_quals(input).unwrap();
        let rendered = s.cname(ty, &opts()).unwrap();
        let (again, quals2) = s.parse_type_and_quals(&rendered).unwrap();
        assert_eq!(ty, again, "{} -> {}", input, rendered);
        // top-level qualifiers live outside the rendered type
        let _ = (quals, quals2);
    }
}

#[test]
fn test_typedef_carries_qualifiers_into_use() {
    let s = Session::new();
    s.cdef("typedef const int cint; extern cint x;").unwrap();
    // the const from the typedef makes the global a constant
    assert!(s.declaration(DeclKind::Constant, "x").is_some());
}
